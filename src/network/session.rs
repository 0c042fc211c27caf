//! Session Registry
//!
//! Tracks every live connection and the player it currently represents,
//! indexed by session id and by username, plus a last-activity stamp per
//! session for idle reaping.
//!
//! The indices are sharded concurrent maps, so lookups from the tick task
//! and from connection tasks never contend on one global lock. Player
//! records sit behind their own async mutex.

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::game::player::Player;
use crate::network::protocol::ServerMessage;
use crate::persistence::{self, PlayerStore};

/// Unique session identifier (UUID string).
pub type SessionId = String;

/// A registered player.
pub type SharedPlayer = Arc<Mutex<Player>>;

// =============================================================================
// OUTBOUND HANDLE
// =============================================================================

/// Outbound send failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    /// The connection's writer has gone away.
    #[error("connection closed")]
    Closed,
    /// The connection is not draining its queue.
    #[error("outbound queue full")]
    Full,
}

/// Queue of lines waiting to be written to one connection.
#[derive(Debug, Clone)]
pub struct Outbound {
    tx: mpsc::Sender<ServerMessage>,
}

impl Outbound {
    /// Create a handle and the receiver its writer task drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Queue a message without waiting. Used by the tick.
    pub fn push(&self, message: ServerMessage) -> Result<(), SendError> {
        self.tx.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::Full,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        })
    }

    /// Queue a message, waiting for room. Used by request handlers.
    pub async fn send(&self, message: ServerMessage) -> Result<(), SendError> {
        self.tx.send(message).await.map_err(|_| SendError::Closed)
    }

    /// Writer has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Registry errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Another session already holds this username.
    #[error("username {0} is already attached to a session")]
    UsernameTaken(String),

    /// No such session.
    #[error("session {0} not found")]
    SessionNotFound(SessionId),
}

struct SessionEntry {
    player: SharedPlayer,
    username: Option<String>,
}

/// All live sessions.
pub struct SessionRegistry {
    sessions: DashMap<SessionId, SessionEntry>,
    usernames: DashMap<String, SessionId>,
    activity: DashMap<SessionId, Instant>,
}

impl SessionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            usernames: DashMap::new(),
            activity: DashMap::new(),
        }
    }

    /// Register a player under its session id.
    pub fn add(&self, player: Player) -> SharedPlayer {
        let session_id = player.session_id().to_string();
        let username = player.username.clone();
        let shared = Arc::new(Mutex::new(player));

        if let Some(name) = &username {
            self.usernames.insert(name.clone(), session_id.clone());
        }
        self.sessions.insert(session_id.clone(), SessionEntry {
            player: shared.clone(),
            username,
        });
        self.activity.insert(session_id.clone(), Instant::now());

        debug!("Session added: {}", session_id);
        shared
    }

    /// Drop a session from every index.
    pub fn remove(&self, session_id: &str) -> Option<SharedPlayer> {
        self.activity.remove(session_id);
        let (_, entry) = self.sessions.remove(session_id)?;
        if let Some(name) = &entry.username {
            self.usernames.remove_if(name, |_, owner| owner == session_id);
        }
        debug!("Session removed: {}", session_id);
        Some(entry.player)
    }

    /// Live player for a session. Counts as activity.
    pub fn get(&self, session_id: &str) -> Option<SharedPlayer> {
        let player = self.sessions.get(session_id).map(|e| e.player.clone())?;
        self.touch(session_id);
        Some(player)
    }

    /// Live player logged in under `username`.
    pub fn get_by_username(&self, username: &str) -> Option<SharedPlayer> {
        let session_id = self.usernames.get(username).map(|s| s.value().clone())?;
        self.sessions.get(&session_id).map(|e| e.player.clone())
    }

    /// Swap the player behind `old_session` for `new`, indexing its username.
    ///
    /// Fails without changing anything if another session holds the name.
    pub fn replace(&self, old_session: &str, new: Player) -> Result<SharedPlayer, RegistryError> {
        let new_session = new.session_id().to_string();
        let username = new.username.clone();

        if let Some(name) = &username {
            self.claim(name, &new_session)?;
        }

        if old_session != new_session {
            if let Some((_, old)) = self.sessions.remove(old_session) {
                if let Some(old_name) = old.username.filter(|n| Some(n) != username.as_ref()) {
                    self.usernames.remove_if(&old_name, |_, owner| owner == old_session);
                }
            }
            self.activity.remove(old_session);
        }

        let shared = Arc::new(Mutex::new(new));
        self.sessions.insert(new_session.clone(), SessionEntry {
            player: shared.clone(),
            username,
        });
        self.activity.insert(new_session.clone(), Instant::now());

        debug!("Session replaced: {} -> {}", old_session, new_session);
        Ok(shared)
    }

    /// Index a session under `username` (in-place promotion).
    pub fn claim_username(&self, session_id: &str, username: &str) -> Result<(), RegistryError> {
        self.claim(username, session_id)?;
        match self.sessions.get_mut(session_id) {
            Some(mut entry) => {
                entry.username = Some(username.to_string());
                Ok(())
            }
            None => {
                self.usernames.remove_if(username, |_, owner| owner == session_id);
                Err(RegistryError::SessionNotFound(session_id.to_string()))
            }
        }
    }

    fn claim(&self, username: &str, session_id: &str) -> Result<(), RegistryError> {
        match self.usernames.entry(username.to_string()) {
            Entry::Occupied(entry) if entry.get() != session_id => {
                Err(RegistryError::UsernameTaken(username.to_string()))
            }
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(entry) => {
                entry.insert(session_id.to_string());
                Ok(())
            }
        }
    }

    /// Stamp activity for a session.
    pub fn touch(&self, session_id: &str) {
        if let Some(mut stamp) = self.activity.get_mut(session_id) {
            *stamp = Instant::now();
        }
    }

    /// Whether a session is registered.
    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// Snapshot of every registered player.
    pub fn players(&self) -> Vec<SharedPlayer> {
        self.sessions.iter().map(|e| e.player.clone()).collect()
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// No live sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Sessions with no activity for longer than `threshold`.
    pub fn idle_sessions(&self, threshold: Duration) -> Vec<SessionId> {
        let now = Instant::now();
        self.activity
            .iter()
            .filter(|e| now.duration_since(*e.value()) > threshold)
            .map(|e| e.key().clone())
            .collect()
    }

    /// Evict idle sessions, saving any with a storage id.
    ///
    /// A session is detached from every index in the same step that claims
    /// its activity stamp, so no command can reach the record once the
    /// snapshot is taken, and a player installed by a concurrent login is
    /// never evicted unsaved. Overlapping reaps save each session at most once.
    pub async fn reap_idle(&self, threshold: Duration, store: &Arc<dyn PlayerStore>) -> Vec<SessionId> {
        let mut reaped = Vec::new();

        for session_id in self.idle_sessions(threshold) {
            let Some(entry) = self.detach_if_idle(&session_id, threshold) else {
                continue;
            };

            let snapshot = {
                let guard = entry.player.lock().await;
                guard.id.is_some().then(|| guard.clone())
            };
            if let Some(snapshot) = snapshot {
                let username = snapshot.username.clone().unwrap_or_default();
                match persistence::save(store, snapshot).await {
                    Ok(()) => info!("Saved idle player {}", username),
                    Err(e) => error!("Failed to save idle player {}: {}", username, e),
                }
            }

            info!("Reaped idle session {}", session_id);
            reaped.push(session_id);
        }

        reaped
    }

    /// Remove a session from every index if it is still idle.
    fn detach_if_idle(&self, session_id: &str, threshold: Duration) -> Option<SessionEntry> {
        let now = Instant::now();
        let (_, entry) = self.sessions.remove_if(session_id, |_, _| {
            self.activity
                .remove_if(session_id, |_, last| now.duration_since(*last) > threshold)
                .is_some()
        })?;
        if let Some(name) = &entry.username {
            self.usernames.remove_if(name, |_, owner| owner == session_id);
        }
        debug!("Session detached: {}", session_id);
        Some(entry)
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc as std_mpsc, Mutex as StdMutex};

    use crate::core::position::Position;
    use crate::game::player::PlayerId;
    use crate::network::dispatcher::{DispatchError, Dispatcher};
    use crate::persistence::sqlite::SqliteStore;
    use crate::persistence::StoreError;

    fn named(session: &str, username: &str) -> Player {
        let mut player = Player::new(session, None);
        player.username = Some(username.to_string());
        player
    }

    fn memory_store() -> Arc<dyn PlayerStore> {
        Arc::new(SqliteStore::open_memory().unwrap())
    }

    /// Store that counts saves and can hold each one until released.
    struct GatedStore {
        inner: SqliteStore,
        saves: AtomicUsize,
        gate: Option<(StdMutex<std_mpsc::Sender<()>>, StdMutex<std_mpsc::Receiver<()>>)>,
    }

    impl GatedStore {
        fn counting() -> Self {
            Self {
                inner: SqliteStore::open_memory().unwrap(),
                saves: AtomicUsize::new(0),
                gate: None,
            }
        }

        /// Returns the store, a receiver signalled when a save starts, and a
        /// sender that lets it finish.
        fn gated() -> (Self, std_mpsc::Receiver<()>, std_mpsc::Sender<()>) {
            let (entered_tx, entered_rx) = std_mpsc::channel();
            let (release_tx, release_rx) = std_mpsc::channel();
            let store = Self {
                gate: Some((StdMutex::new(entered_tx), StdMutex::new(release_rx))),
                ..Self::counting()
            };
            (store, entered_rx, release_tx)
        }
    }

    impl PlayerStore for GatedStore {
        fn authenticate(&self, username: &str, password: &str) -> Result<Option<PlayerId>, StoreError> {
            self.inner.authenticate(username, password)
        }

        fn find_by_username(&self, username: &str) -> Result<Option<PlayerId>, StoreError> {
            self.inner.find_by_username(username)
        }

        fn create(&self, username: &str, password: &str) -> Result<PlayerId, StoreError> {
            self.inner.create(username, password)
        }

        fn load(&self, id: PlayerId) -> Result<Option<Player>, StoreError> {
            self.inner.load(id)
        }

        fn save(&self, player: &Player) -> Result<(), StoreError> {
            if let Some((entered, release)) = &self.gate {
                entered.lock().unwrap().send(()).unwrap();
                release.lock().unwrap().recv().unwrap();
            }
            self.saves.fetch_add(1, Ordering::SeqCst);
            self.inner.save(player)
        }
    }

    #[tokio::test]
    async fn test_add_get_remove() {
        let registry = SessionRegistry::new();
        registry.add(named("s1", "bob"));

        assert!(registry.get("s1").is_some());
        assert!(registry.get_by_username("bob").is_some());
        assert_eq!(registry.len(), 1);

        assert!(registry.remove("s1").is_some());
        assert!(registry.get("s1").is_none());
        assert!(registry.get_by_username("bob").is_none());
        assert!(registry.remove("s1").is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_replace_indexes_username() {
        let registry = SessionRegistry::new();
        registry.add(Player::new("s1", None));

        let mut loaded = named("db_x", "bob");
        loaded.attach_session("s1", Outbound::channel(1).0);
        registry.replace("s1", loaded).unwrap();

        let player = registry.get_by_username("bob").unwrap();
        assert_eq!(player.lock().await.session_id(), "s1");
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_replace_rejects_second_owner() {
        let registry = SessionRegistry::new();
        registry.add(named("s1", "bob"));
        registry.add(Player::new("s2", None));

        let result = registry.replace("s2", named("s2", "bob"));
        assert_eq!(result.unwrap_err(), RegistryError::UsernameTaken("bob".into()));

        let owner = registry.get_by_username("bob").unwrap();
        assert_eq!(owner.lock().await.session_id(), "s1");
        assert!(registry.get("s2").is_some());
    }

    #[tokio::test]
    async fn test_claim_username() {
        let registry = SessionRegistry::new();
        registry.add(Player::new("s1", None));
        registry.add(Player::new("s2", None));

        registry.claim_username("s1", "alice").unwrap();
        assert!(registry.get_by_username("alice").is_some());
        assert!(registry.claim_username("s2", "alice").is_err());
        assert!(registry.claim_username("missing", "carol").is_err());
        assert!(registry.get_by_username("carol").is_none());

        registry.remove("s1");
        assert!(registry.get_by_username("alice").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_refreshes_activity() {
        let registry = SessionRegistry::new();
        registry.add(Player::new("s1", None));
        registry.add(Player::new("s2", None));

        tokio::time::advance(Duration::from_secs(90)).await;
        registry.get("s1");

        let idle = registry.idle_sessions(Duration::from_secs(60));
        assert_eq!(idle, vec!["s2".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reap_idle_saves_then_evicts_once() {
        let store = memory_store();
        let id = store.create("bob", "secret1").unwrap();

        let registry = SessionRegistry::new();
        let mut player = named("s1", "bob");
        player.id = Some(id);
        player.teleport(Position::new(1, 2, 0));
        registry.add(player);
        registry.add(Player::new("s2", None));

        tokio::time::advance(Duration::from_secs(16 * 60)).await;
        let threshold = Duration::from_secs(15 * 60);

        let mut reaped = registry.reap_idle(threshold, &store).await;
        reaped.sort();
        assert_eq!(reaped, vec!["s1".to_string(), "s2".to_string()]);
        assert!(registry.is_empty());
        assert!(registry.get_by_username("bob").is_none());

        assert!(registry.reap_idle(threshold, &store).await.is_empty());

        let saved = store.load(id).unwrap().unwrap();
        assert_eq!(saved.position(), Position::new(1, 2, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_reaps_save_once() {
        let counting = Arc::new(GatedStore::counting());
        let id = counting.create("bob", "secret1").unwrap();
        let store: Arc<dyn PlayerStore> = counting.clone();

        let registry = SessionRegistry::new();
        let mut player = named("s1", "bob");
        player.id = Some(id);
        registry.add(player);

        tokio::time::advance(Duration::from_secs(120)).await;
        let threshold = Duration::from_secs(60);

        let (first, second) = tokio::join!(
            registry.reap_idle(threshold, &store),
            registry.reap_idle(threshold, &store),
        );
        assert_eq!(first.len() + second.len(), 1);
        assert!(registry.reap_idle(threshold, &store).await.is_empty());
        assert_eq!(counting.saves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_during_idle_save_are_refused() {
        let (gated, entered, release) = GatedStore::gated();
        let gated = Arc::new(gated);
        let id = gated.create("bob", "secret1").unwrap();
        let store: Arc<dyn PlayerStore> = gated.clone();

        let registry = Arc::new(SessionRegistry::new());
        let dispatcher = Dispatcher::new(registry.clone(), store.clone());
        let mut player = named("s1", "bob");
        player.id = Some(id);
        player.attach_session("s1", Outbound::channel(4).0);
        player.teleport(Position::new(1, 2, 0));
        registry.add(player);

        tokio::time::advance(Duration::from_secs(120)).await;

        let reaper = {
            let registry = registry.clone();
            let store = store.clone();
            tokio::spawn(async move { registry.reap_idle(Duration::from_secs(60), &store).await })
        };

        tokio::task::spawn_blocking(move || entered.recv().unwrap()).await.unwrap();

        let result = dispatcher.dispatch("s1", "TELEPORT:1000,1000,0").await;
        assert!(matches!(result, Err(DispatchError::UnknownSession(_))));
        assert!(registry.get_by_username("bob").is_none());

        release.send(()).unwrap();
        assert_eq!(reaper.await.unwrap(), vec!["s1".to_string()]);
        dispatcher.disconnect("s1").await;

        let saved = gated.load(id).unwrap().unwrap();
        assert_eq!(saved.position(), Position::new(1, 2, 0));
        assert_eq!(gated.saves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reap_idle_spares_active_sessions() {
        let store = memory_store();
        let registry = SessionRegistry::new();
        registry.add(Player::new("s1", None));

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(registry.reap_idle(Duration::from_secs(60), &store).await.is_empty());
        assert!(registry.contains("s1"));
    }

    #[tokio::test]
    async fn test_outbound_push_reports_full_and_closed() {
        let (outbound, rx) = Outbound::channel(1);
        outbound.push(ServerMessage::LogoutSuccess).unwrap();
        assert_eq!(outbound.push(ServerMessage::LogoutSuccess), Err(SendError::Full));

        drop(rx);
        assert!(outbound.is_closed());
        assert_eq!(outbound.push(ServerMessage::LogoutSuccess), Err(SendError::Closed));
    }
}
