use rusqlite::Connection;

use super::StoreError;

pub fn create_tables(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS players (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            username      TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            x             INTEGER NOT NULL DEFAULT 3222,
            y             INTEGER NOT NULL DEFAULT 3222,
            z             INTEGER NOT NULL DEFAULT 0,
            health        INTEGER NOT NULL DEFAULT 100,
            run_energy    INTEGER NOT NULL DEFAULT 100,
            gender        INTEGER NOT NULL DEFAULT 0,
            head          INTEGER NOT NULL DEFAULT 0,
            body          INTEGER NOT NULL DEFAULT 0,
            legs          INTEGER NOT NULL DEFAULT 0,
            feet          INTEGER NOT NULL DEFAULT 0,
            hands         INTEGER NOT NULL DEFAULT 0,
            hair_color    INTEGER NOT NULL DEFAULT 0,
            body_color    INTEGER NOT NULL DEFAULT 0,
            created_at    INTEGER NOT NULL,
            last_login    INTEGER
        );

        CREATE TABLE IF NOT EXISTS player_skills (
            player_id   INTEGER NOT NULL REFERENCES players(id) ON DELETE CASCADE,
            skill_id    INTEGER NOT NULL,
            level       INTEGER NOT NULL DEFAULT 1,
            experience  REAL NOT NULL DEFAULT 0,
            PRIMARY KEY (player_id, skill_id)
        );

        CREATE TABLE IF NOT EXISTS player_inventory (
            player_id   INTEGER NOT NULL REFERENCES players(id) ON DELETE CASCADE,
            slot        INTEGER NOT NULL,
            item_id     INTEGER NOT NULL,
            amount      INTEGER NOT NULL DEFAULT 1,
            PRIMARY KEY (player_id, slot)
        );

        CREATE TABLE IF NOT EXISTS player_equipment (
            player_id   INTEGER NOT NULL REFERENCES players(id) ON DELETE CASCADE,
            slot        INTEGER NOT NULL,
            item_id     INTEGER NOT NULL,
            PRIMARY KEY (player_id, slot)
        );
        ",
    )?;
    Ok(())
}
