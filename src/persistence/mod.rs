//! Persistence Gateway
//!
//! The game core talks to storage only through [`PlayerStore`]. Store
//! calls are synchronous and may block, so async callers go through
//! [`run_blocking`] which moves them onto tokio's blocking pool.

mod schema;
pub mod sqlite;

use std::sync::Arc;

use thiserror::Error;

use crate::game::player::{Player, PlayerId};

pub use sqlite::SqliteStore;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite failure.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Filesystem failure while opening the database.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Player has never been assigned a storage id.
    #[error("player has no storage id")]
    MissingId,

    /// No record for this id.
    #[error("player not found: {0}")]
    NotFound(PlayerId),

    /// An account with this name exists.
    #[error("username already exists: {0}")]
    UsernameTaken(String),

    /// Connection lock poisoned by a panicking writer.
    #[error("database connection poisoned")]
    Poisoned,

    /// The blocking task running the call failed.
    #[error("storage task failed: {0}")]
    Task(String),
}

/// Player storage.
///
/// `save` is an upsert keyed by the player's id: saving the same player
/// twice leaves one record.
pub trait PlayerStore: Send + Sync {
    /// Check credentials. `Ok(None)` means unknown user or wrong password.
    fn authenticate(&self, username: &str, password: &str) -> Result<Option<PlayerId>, StoreError>;

    /// Id of the account with this name, if any.
    fn find_by_username(&self, username: &str) -> Result<Option<PlayerId>, StoreError>;

    /// Create an account with default state.
    fn create(&self, username: &str, password: &str) -> Result<PlayerId, StoreError>;

    /// Reconstruct a player. The result has a placeholder session and no
    /// outbound handle.
    fn load(&self, id: PlayerId) -> Result<Option<Player>, StoreError>;

    /// Persist a player's full state.
    fn save(&self, player: &Player) -> Result<(), StoreError>;
}

/// Run a store call on the blocking pool.
pub async fn run_blocking<T, F>(store: &Arc<dyn PlayerStore>, f: F) -> Result<T, StoreError>
where
    F: FnOnce(&dyn PlayerStore) -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || f(store.as_ref()))
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
}

/// Save a player snapshot on the blocking pool.
pub async fn save(store: &Arc<dyn PlayerStore>, player: Player) -> Result<(), StoreError> {
    run_blocking(store, move |s| s.save(&player)).await
}
