//! Inventory and Equipment
//!
//! The inventory is a fixed row of 28 slots; slot indices are stable and
//! never renumber. Equipment is sparse: an absent slot means nothing worn.

use std::collections::BTreeMap;

use thiserror::Error;

/// Number of inventory slots.
pub const INVENTORY_SIZE: usize = 28;

/// Number of equipment slots (ids `0..EQUIPMENT_SLOTS`).
pub const EQUIPMENT_SLOTS: u8 = 14;

/// Equipment slot ids.
pub mod slots {
    /// Helmets and hats.
    pub const HEAD: u8 = 0;
    /// Capes.
    pub const CAPE: u8 = 1;
    /// Amulets.
    pub const AMULET: u8 = 2;
    /// Main hand.
    pub const WEAPON: u8 = 3;
    /// Torso.
    pub const BODY: u8 = 4;
    /// Off hand.
    pub const SHIELD: u8 = 5;
    /// Legs.
    pub const LEGS: u8 = 7;
    /// Gloves.
    pub const HANDS: u8 = 9;
    /// Boots.
    pub const FEET: u8 = 10;
    /// Rings.
    pub const RING: u8 = 12;
    /// Arrows, bolts.
    pub const AMMO: u8 = 13;
}

/// Inventory/equipment errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InventoryError {
    /// Inventory slot index out of range.
    #[error("inventory slot {0} out of range")]
    SlotOutOfRange(usize),
    /// Equipment slot id out of range.
    #[error("equipment slot {0} out of range")]
    EquipmentSlotOutOfRange(u8),
}

/// An item and how many of it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ItemStack {
    /// Item definition id.
    pub item_id: i32,
    /// Stack size.
    pub amount: i32,
}

impl ItemStack {
    /// Create a stack.
    pub const fn new(item_id: i32, amount: i32) -> Self {
        Self { item_id, amount }
    }
}

// =============================================================================
// INVENTORY
// =============================================================================

/// Fixed-size inventory.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Inventory {
    slots: [Option<ItemStack>; INVENTORY_SIZE],
}

impl Inventory {
    /// Empty inventory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Contents of a slot.
    pub fn get(&self, slot: usize) -> Option<ItemStack> {
        self.slots.get(slot).copied().flatten()
    }

    /// Overwrite a slot, returning what was there.
    pub fn set(&mut self, slot: usize, item: Option<ItemStack>) -> Result<Option<ItemStack>, InventoryError> {
        let entry = self
            .slots
            .get_mut(slot)
            .ok_or(InventoryError::SlotOutOfRange(slot))?;
        Ok(std::mem::replace(entry, item))
    }

    /// Put a stack in the first free slot. Returns the slot, or `None` if full.
    pub fn add(&mut self, item: ItemStack) -> Option<usize> {
        let slot = self.first_free()?;
        self.slots[slot] = Some(item);
        Some(slot)
    }

    /// Empty a slot and return its contents.
    pub fn take(&mut self, slot: usize) -> Option<ItemStack> {
        self.slots.get_mut(slot).and_then(Option::take)
    }

    /// Index of the first empty slot.
    pub fn first_free(&self) -> Option<usize> {
        self.slots.iter().position(Option::is_none)
    }

    /// Number of empty slots.
    pub fn free_slots(&self) -> usize {
        self.slots.iter().filter(|s| s.is_none()).count()
    }

    /// Iterate `(slot, contents)` for all 28 slots.
    pub fn iter(&self) -> impl Iterator<Item = (usize, Option<ItemStack>)> + '_ {
        self.slots.iter().copied().enumerate()
    }
}

// =============================================================================
// EQUIPMENT
// =============================================================================

/// Worn items by slot id.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Equipment {
    slots: BTreeMap<u8, i32>,
}

impl Equipment {
    /// Nothing equipped.
    pub fn new() -> Self {
        Self::default()
    }

    /// Item worn in a slot.
    pub fn get(&self, slot: u8) -> Option<i32> {
        self.slots.get(&slot).copied()
    }

    /// Wear an item, returning whatever it replaced.
    pub fn equip(&mut self, slot: u8, item_id: i32) -> Result<Option<i32>, InventoryError> {
        if slot >= EQUIPMENT_SLOTS {
            return Err(InventoryError::EquipmentSlotOutOfRange(slot));
        }
        Ok(self.slots.insert(slot, item_id))
    }

    /// Remove the item from a slot.
    pub fn unequip(&mut self, slot: u8) -> Option<i32> {
        self.slots.remove(&slot)
    }

    /// Iterate occupied slots in id order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, i32)> + '_ {
        self.slots.iter().map(|(slot, item)| (*slot, *item))
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when nothing is worn.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
