//! SQLite player store.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{schema, PlayerStore, StoreError};
use crate::core::position::Position;
use crate::game::inventory::ItemStack;
use crate::game::player::{Appearance, Player, PlayerId, MAX_VITAL};
use crate::game::skill::Skill;
use crate::network::auth::hash_password;

/// Store backed by a single SQLite connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file. `:memory:` opens a private
    /// in-memory database.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        if path == ":memory:" {
            return Self::open_memory();
        }

        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        schema::create_tables(&conn)?;
        debug!("Opened player database at {}", path);
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        schema::create_tables(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

fn to_millis(time: Option<DateTime<Utc>>) -> Option<i64> {
    time.map(|t| t.timestamp_millis())
}

fn from_millis(millis: Option<i64>) -> Option<DateTime<Utc>> {
    millis.and_then(|ms| Utc.timestamp_millis_opt(ms).single())
}

fn vital(value: i64) -> u8 {
    u8::try_from(value.clamp(0, i64::from(MAX_VITAL))).unwrap_or(MAX_VITAL)
}

impl PlayerStore for SqliteStore {
    fn authenticate(&self, username: &str, password: &str) -> Result<Option<PlayerId>, StoreError> {
        let conn = self.conn()?;
        let row: Option<(i64, String)> = conn
            .query_row(
                "SELECT id, password_hash FROM players WHERE username = ?1",
                params![username],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        Ok(row
            .filter(|(_, stored)| *stored == hash_password(password))
            .map(|(id, _)| PlayerId(id)))
    }

    fn find_by_username(&self, username: &str) -> Result<Option<PlayerId>, StoreError> {
        let conn = self.conn()?;
        let id = conn
            .query_row(
                "SELECT id FROM players WHERE username = ?1",
                params![username],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id.map(PlayerId))
    }

    fn create(&self, username: &str, password: &str) -> Result<PlayerId, StoreError> {
        let conn = self.conn()?;
        let now = Utc::now().timestamp_millis();

        conn.execute(
            "INSERT INTO players (username, password_hash, created_at) VALUES (?1, ?2, ?3)",
            params![username, hash_password(password), now],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation => {
                StoreError::UsernameTaken(username.to_string())
            }
            other => other.into(),
        })?;

        Ok(PlayerId(conn.last_insert_rowid()))
    }

    fn load(&self, id: PlayerId) -> Result<Option<Player>, StoreError> {
        let conn = self.conn()?;

        let mut player = Player::new(format!("db_{}", Uuid::new_v4()), None);
        let found = conn
            .query_row(
                "SELECT username, x, y, z, health, run_energy,
                        gender, head, body, legs, feet, hands, hair_color, body_color,
                        created_at, last_login
                 FROM players WHERE id = ?1",
                params![id.0],
                |row| {
                    player.id = Some(id);
                    player.username = Some(row.get(0)?);
                    player.set_position(Position::new(row.get(1)?, row.get(2)?, row.get(3)?));
                    player.set_health(vital(row.get(4)?));
                    player.set_run_energy(vital(row.get(5)?));
                    player.appearance = Appearance {
                        gender: row.get(6)?,
                        head: row.get(7)?,
                        body: row.get(8)?,
                        legs: row.get(9)?,
                        feet: row.get(10)?,
                        hands: row.get(11)?,
                        hair_color: row.get(12)?,
                        body_color: row.get(13)?,
                    };
                    player.created_at = from_millis(row.get(14)?);
                    player.last_login = from_millis(row.get(15)?);
                    Ok(())
                },
            )
            .optional()?;
        if found.is_none() {
            return Ok(None);
        }

        let mut stmt = conn.prepare(
            "SELECT skill_id, level, experience FROM player_skills WHERE player_id = ?1",
        )?;
        let skills = stmt
            .query_map(params![id.0], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, f64>(2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (skill_id, level, experience) in skills {
            let restored = match (u8::try_from(skill_id), u8::try_from(level.clamp(1, 99))) {
                (Ok(skill_id), Ok(level)) => player.skills.restore(Skill { id: skill_id, level, experience }),
                _ => false,
            };
            if !restored {
                warn!("Player {} has unknown skill row {}", id, skill_id);
            }
        }

        let mut stmt = conn.prepare(
            "SELECT slot, item_id, amount FROM player_inventory WHERE player_id = ?1",
        )?;
        let items = stmt
            .query_map(params![id.0], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i32>(1)?, row.get::<_, i32>(2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (slot, item_id, amount) in items {
            let placed = usize::try_from(slot)
                .ok()
                .map(|slot| player.inventory.set(slot, Some(ItemStack::new(item_id, amount))).is_ok())
                .unwrap_or(false);
            if !placed {
                warn!("Player {} has inventory row for invalid slot {}", id, slot);
            }
        }

        let mut stmt = conn.prepare(
            "SELECT slot, item_id FROM player_equipment WHERE player_id = ?1",
        )?;
        let worn = stmt
            .query_map(params![id.0], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i32>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        for (slot, item_id) in worn {
            let placed = u8::try_from(slot)
                .ok()
                .map(|slot| player.equipment.equip(slot, item_id).is_ok())
                .unwrap_or(false);
            if !placed {
                warn!("Player {} has equipment row for invalid slot {}", id, slot);
            }
        }

        player.refresh_combat_level();
        Ok(Some(player))
    }

    fn save(&self, player: &Player) -> Result<(), StoreError> {
        let id = player.id.ok_or(StoreError::MissingId)?;
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let position = player.position();
        let look = player.appearance;
        let rows = tx.execute(
            "UPDATE players SET
                x = ?1, y = ?2, z = ?3, health = ?4, run_energy = ?5,
                gender = ?6, head = ?7, body = ?8, legs = ?9, feet = ?10, hands = ?11,
                hair_color = ?12, body_color = ?13,
                last_login = COALESCE(?14, last_login)
             WHERE id = ?15",
            params![
                position.x,
                position.y,
                position.z,
                player.health(),
                player.run_energy(),
                look.gender,
                look.head,
                look.body,
                look.legs,
                look.feet,
                look.hands,
                look.hair_color,
                look.body_color,
                to_millis(player.last_login),
                id.0,
            ],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound(id));
        }

        {
            let mut upsert = tx.prepare(
                "INSERT INTO player_skills (player_id, skill_id, level, experience)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(player_id, skill_id) DO UPDATE SET
                    level = excluded.level, experience = excluded.experience",
            )?;
            for skill in player.skills.iter() {
                upsert.execute(params![id.0, skill.id, skill.level, skill.experience])?;
            }

            let mut put = tx.prepare(
                "INSERT INTO player_inventory (player_id, slot, item_id, amount)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(player_id, slot) DO UPDATE SET
                    item_id = excluded.item_id, amount = excluded.amount",
            )?;
            let mut clear = tx.prepare("DELETE FROM player_inventory WHERE player_id = ?1 AND slot = ?2")?;
            for (slot, item) in player.inventory.iter() {
                let slot = slot as i64;
                match item {
                    Some(stack) => put.execute(params![id.0, slot, stack.item_id, stack.amount])?,
                    None => clear.execute(params![id.0, slot])?,
                };
            }

            tx.execute("DELETE FROM player_equipment WHERE player_id = ?1", params![id.0])?;
            let mut wear = tx.prepare(
                "INSERT INTO player_equipment (player_id, slot, item_id) VALUES (?1, ?2, ?3)",
            )?;
            for (slot, item_id) in player.equipment.iter() {
                wear.execute(params![id.0, slot, item_id])?;
            }
        }

        tx.commit()?;
        debug!("Saved player {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::inventory::slots;
    use crate::game::skill::ids;

    fn store() -> SqliteStore {
        SqliteStore::open_memory().unwrap()
    }

    #[test]
    fn test_create_and_authenticate() {
        let store = store();
        let id = store.create("bob", "secret1").unwrap();

        assert_eq!(store.authenticate("bob", "secret1").unwrap(), Some(id));
        assert_eq!(store.authenticate("bob", "wrongpass").unwrap(), None);
        assert_eq!(store.authenticate("nobody", "secret1").unwrap(), None);
        assert_eq!(store.find_by_username("bob").unwrap(), Some(id));
        assert_eq!(store.find_by_username("alice").unwrap(), None);
    }

    #[test]
    fn test_duplicate_username() {
        let store = store();
        store.create("bob", "secret1").unwrap();
        assert!(matches!(store.create("bob", "other12"), Err(StoreError::UsernameTaken(_))));
    }

    #[test]
    fn test_new_account_loads_defaults() {
        let store = store();
        let id = store.create("bob", "secret1").unwrap();
        let player = store.load(id).unwrap().unwrap();

        assert_eq!(player.id, Some(id));
        assert_eq!(player.username.as_deref(), Some("bob"));
        assert_eq!(player.position(), Position::new(3222, 3222, 0));
        assert_eq!(player.health(), 100);
        assert_eq!(player.run_energy(), 100);
        assert!(player.skills.iter().all(|s| s.level == 1 && s.experience == 0.0));
        assert!(player.session_id().starts_with("db_"));
        assert!(player.outbound().is_none());
        assert!(player.created_at.is_some());
    }

    #[test]
    fn test_load_missing_player() {
        assert!(store().load(PlayerId(42)).unwrap().is_none());
    }

    #[test]
    fn test_save_load_round_trip() {
        let store = store();
        let id = store.create("bob", "secret1").unwrap();
        let mut player = store.load(id).unwrap().unwrap();

        player.teleport(Position::new(3100, 3300, 1));
        player.damage(35);
        player.set_run_energy(40);
        player.appearance.hair_color = 7;
        player.add_experience(ids::ATTACK, 1_000.5);
        player.add_experience(ids::MAGIC, 250.0);
        player.inventory.add(ItemStack::new(995, 1_000));
        player.inventory.set(27, Some(ItemStack::new(1511, 1))).unwrap();
        player.equipment.equip(slots::WEAPON, 1277).unwrap();
        player.last_login = Some(Utc::now());
        store.save(&player).unwrap();

        let loaded = store.load(id).unwrap().unwrap();
        assert_eq!(loaded.position(), player.position());
        assert_eq!(loaded.health(), 65);
        assert_eq!(loaded.run_energy(), 40);
        assert_eq!(loaded.appearance, player.appearance);
        assert_eq!(loaded.skills, player.skills);
        assert_eq!(loaded.inventory, player.inventory);
        assert_eq!(loaded.equipment, player.equipment);
        assert_eq!(loaded.combat_level(), player.combat_level());
        assert_eq!(
            to_millis(loaded.last_login),
            to_millis(player.last_login)
        );
    }

    #[test]
    fn test_save_clears_emptied_slots() {
        let store = store();
        let id = store.create("bob", "secret1").unwrap();
        let mut player = store.load(id).unwrap().unwrap();

        player.inventory.add(ItemStack::new(995, 10));
        player.equipment.equip(slots::HEAD, 1155).unwrap();
        store.save(&player).unwrap();

        player.inventory.take(0);
        player.equipment.unequip(slots::HEAD);
        store.save(&player).unwrap();

        let loaded = store.load(id).unwrap().unwrap();
        assert_eq!(loaded.inventory.free_slots(), 28);
        assert!(loaded.equipment.is_empty());
    }

    #[test]
    fn test_save_is_idempotent() {
        let store = store();
        let id = store.create("bob", "secret1").unwrap();
        let player = store.load(id).unwrap().unwrap();

        store.save(&player).unwrap();
        store.save(&player).unwrap();

        let conn = store.conn().unwrap();
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM player_skills WHERE player_id = ?1", params![id.0], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 23);
        let players: i64 = conn.query_row("SELECT COUNT(*) FROM players", [], |r| r.get(0)).unwrap();
        assert_eq!(players, 1);
    }

    #[test]
    fn test_save_requires_id() {
        let player = Player::new("s1", None);
        assert!(matches!(store().save(&player), Err(StoreError::MissingId)));
    }
}
