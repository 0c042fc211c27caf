//! Skills and Experience
//!
//! Every player carries the same 23 skills. A skill's level is a pure
//! function of its accumulated experience, and levels never go down.

use std::sync::OnceLock;

/// Number of distinct skills (ids `0..SKILL_COUNT`).
pub const SKILL_COUNT: usize = 23;

/// Level cap.
pub const MAX_LEVEL: u8 = 99;

/// Skill ids used by the combat level formula.
pub mod ids {
    /// Attack.
    pub const ATTACK: u8 = 0;
    /// Defence.
    pub const DEFENCE: u8 = 1;
    /// Strength.
    pub const STRENGTH: u8 = 2;
    /// Hitpoints.
    pub const HITPOINTS: u8 = 3;
    /// Ranged.
    pub const RANGED: u8 = 4;
    /// Prayer.
    pub const PRAYER: u8 = 5;
    /// Magic.
    pub const MAGIC: u8 = 6;
}

/// Cumulative points thresholds, indexed by `level - 1`.
fn points_table() -> &'static [u64; MAX_LEVEL as usize] {
    static TABLE: OnceLock<[u64; MAX_LEVEL as usize]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [0u64; MAX_LEVEL as usize];
        let mut sum = 0u64;
        for lvl in 1..=u64::from(MAX_LEVEL) {
            let term = lvl as f64 + 300.0 * 2f64.powf(lvl as f64 / 7.0);
            sum += term.floor() as u64;
            table[(lvl - 1) as usize] = sum / 4;
        }
        table
    })
}

/// Cumulative points for `level` (clamped to `1..=99`).
pub fn points_for_level(level: u8) -> u64 {
    let level = level.clamp(1, MAX_LEVEL);
    points_table()[usize::from(level - 1)]
}

/// Smallest level whose cumulative points cover `experience`, capped at 99.
pub fn level_for_experience(experience: f64) -> u8 {
    points_table()
        .iter()
        .position(|&points| points as f64 >= experience)
        .map(|idx| idx as u8 + 1)
        .unwrap_or(MAX_LEVEL)
}

/// A single skill.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Skill {
    /// Skill id (0-22).
    pub id: u8,
    /// Current level (>= 1).
    pub level: u8,
    /// Accumulated experience (>= 0).
    pub experience: f64,
}

impl Skill {
    /// Fresh skill at level 1 with no experience.
    pub const fn new(id: u8) -> Self {
        Self { id, level: 1, experience: 0.0 }
    }
}

/// The full skill set of one player.
#[derive(Clone, Debug, PartialEq)]
pub struct Skills {
    skills: [Skill; SKILL_COUNT],
}

impl Skills {
    /// All skills at level 1 with zero experience.
    pub fn new() -> Self {
        let mut skills = [Skill::new(0); SKILL_COUNT];
        for (id, skill) in skills.iter_mut().enumerate() {
            skill.id = id as u8;
        }
        Self { skills }
    }

    /// Look up a skill by id.
    pub fn get(&self, id: u8) -> Option<&Skill> {
        self.skills.get(usize::from(id))
    }

    /// Level of a skill, 1 for unknown ids.
    pub fn level(&self, id: u8) -> u8 {
        self.get(id).map(|s| s.level).unwrap_or(1)
    }

    /// Overwrite a skill with stored values. Ignores ids out of range.
    pub fn restore(&mut self, skill: Skill) -> bool {
        match self.skills.get_mut(usize::from(skill.id)) {
            Some(slot) => {
                *slot = Skill {
                    id: skill.id,
                    level: skill.level.clamp(1, MAX_LEVEL),
                    experience: skill.experience.max(0.0),
                };
                true
            }
            None => false,
        }
    }

    /// Add experience to a skill.
    ///
    /// Returns the new level if it went up. Negative or non-finite amounts
    /// are ignored, and a level is never lowered.
    pub fn add_experience(&mut self, id: u8, amount: f64) -> Option<u8> {
        if !amount.is_finite() || amount <= 0.0 {
            return None;
        }
        let skill = self.skills.get_mut(usize::from(id))?;
        skill.experience += amount;

        let new_level = level_for_experience(skill.experience);
        if new_level > skill.level {
            skill.level = new_level;
            Some(new_level)
        } else {
            None
        }
    }

    /// Iterate skills in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Skill> {
        self.skills.iter()
    }

    /// Combat level derived from the seven combat skills.
    pub fn combat_level(&self) -> u8 {
        let lvl = |id| f64::from(self.level(id));

        let base = 0.25 * (lvl(ids::DEFENCE) + lvl(ids::HITPOINTS) + (lvl(ids::PRAYER) / 2.0).floor());
        let melee = lvl(ids::ATTACK) + lvl(ids::STRENGTH);
        let range = (lvl(ids::RANGED) * 3.0 / 2.0).floor();
        let mage = (lvl(ids::MAGIC) * 3.0 / 2.0).floor();

        let combat = base + 0.325 * melee.max(range).max(mage);
        (combat.floor() as u8).max(1)
    }
}

impl Default for Skills {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_points_table_known_values() {
        // floor(1 + 300 * 2^(1/7)) = 332
        assert_eq!(points_for_level(1), 83);
        assert_eq!(points_for_level(0), 83);
        assert!(points_for_level(99) > 13_000_000);
    }

    #[test]
    fn test_level_boundaries() {
        assert_eq!(level_for_experience(0.0), 1);
        assert_eq!(level_for_experience(83.0), 1);
        assert_eq!(level_for_experience(83.5), 2);
        assert_eq!(level_for_experience(f64::MAX), MAX_LEVEL);
    }

    #[test]
    fn test_new_skill_set() {
        let skills = Skills::new();
        assert_eq!(skills.iter().count(), SKILL_COUNT);
        for (id, skill) in skills.iter().enumerate() {
            assert_eq!(skill.id as usize, id);
            assert_eq!(skill.level, 1);
            assert_eq!(skill.experience, 0.0);
        }
        assert!(skills.get(SKILL_COUNT as u8).is_none());
    }

    #[test]
    fn test_add_experience_reports_level_up() {
        let mut skills = Skills::new();
        assert_eq!(skills.add_experience(ids::ATTACK, 50.0), None);
        assert_eq!(skills.add_experience(ids::ATTACK, 50.0), Some(2));
        assert_eq!(skills.get(ids::ATTACK).unwrap().experience, 100.0);
    }

    #[test]
    fn test_add_experience_ignores_bad_amounts() {
        let mut skills = Skills::new();
        assert_eq!(skills.add_experience(ids::MAGIC, -10.0), None);
        assert_eq!(skills.add_experience(ids::MAGIC, f64::NAN), None);
        assert_eq!(skills.add_experience(99, 1000.0), None);
        assert_eq!(skills.get(ids::MAGIC).unwrap().experience, 0.0);
    }

    #[test]
    fn test_stored_level_is_never_lowered() {
        let mut skills = Skills::new();
        skills.restore(Skill { id: ids::PRAYER, level: 40, experience: 10.0 });
        assert_eq!(skills.add_experience(ids::PRAYER, 5.0), None);
        assert_eq!(skills.level(ids::PRAYER), 40);
    }

    #[test]
    fn test_combat_level() {
        let mut skills = Skills::new();
        assert_eq!(skills.combat_level(), 1);

        for id in [ids::ATTACK, ids::STRENGTH, ids::DEFENCE, ids::HITPOINTS, ids::PRAYER] {
            skills.restore(Skill { id, level: 99, experience: 0.0 });
        }
        // 0.25 * (99 + 99 + 49) + 0.325 * 198 = 61.75 + 64.35
        assert_eq!(skills.combat_level(), 126);
    }

    proptest! {
        #[test]
        fn prop_level_is_monotonic(a in 0.0f64..20_000_000.0, b in 0.0f64..20_000_000.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(level_for_experience(lo) <= level_for_experience(hi));
        }

        #[test]
        fn prop_adding_experience_never_lowers_level(gains in proptest::collection::vec(0.0f64..500_000.0, 1..40)) {
            let mut skills = Skills::new();
            let mut last = 1;
            for gain in gains {
                skills.add_experience(ids::STRENGTH, gain);
                let level = skills.level(ids::STRENGTH);
                prop_assert!(level >= last);
                last = level;
            }
        }
    }
}
