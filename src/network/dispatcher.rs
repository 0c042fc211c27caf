//! Protocol Dispatcher
//!
//! Routes one parsed inbound line to the player state machine or the
//! login/registration flow.
//!
//! Handlers run on the connection's task and mutate the player directly,
//! outside the tick. Acknowledgements (`LOGIN_SUCCESS`, `RUN_TOGGLE`, ...)
//! go straight to the connection's outbound queue; position changes wait
//! for the next tick's flush.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::core::position::Position;
use crate::game::skill::Skills;
use crate::network::auth::validate_registration;
use crate::network::protocol::{ClientCommand, LoginFailure, ProtocolError, RegisterFailure, ServerMessage};
use crate::network::session::{Outbound, SessionId, SessionRegistry, SharedPlayer};
use crate::persistence::{self, PlayerStore, StoreError};

/// Why a line could not be handled.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The session is gone (disconnected or reaped).
    #[error("session {0} is not registered")]
    UnknownSession(SessionId),

    /// The line did not parse.
    #[error("malformed command: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Command router shared by all connections.
pub struct Dispatcher {
    registry: Arc<SessionRegistry>,
    store: Arc<dyn PlayerStore>,
}

impl Dispatcher {
    /// Create a dispatcher over a registry and store.
    pub fn new(registry: Arc<SessionRegistry>, store: Arc<dyn PlayerStore>) -> Self {
        Self { registry, store }
    }

    /// The registry this dispatcher routes through.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Handle one inbound line from `session_id`.
    pub async fn dispatch(&self, session_id: &str, line: &str) -> Result<(), DispatchError> {
        let player = self
            .registry
            .get(session_id)
            .ok_or_else(|| DispatchError::UnknownSession(session_id.to_string()))?;

        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }

        match ClientCommand::parse(line)? {
            ClientCommand::Login { username, password } => {
                self.login(session_id, &player, username, password).await;
            }
            ClientCommand::Register { username, password } => {
                self.register(session_id, &player, username, password).await;
            }
            ClientCommand::Logout => self.logout(&player).await,
            ClientCommand::Move { x, y } => {
                if let Err(reason) = player.lock().await.move_to(x, y) {
                    debug!("Ignoring MOVE from {}: {}", session_id, reason);
                }
            }
            ClientCommand::Teleport { x, y, z } => {
                player.lock().await.teleport(Position::new(x, y, z));
            }
            ClientCommand::Run(running) => {
                let outbound = {
                    let mut player = player.lock().await;
                    player.set_running(running);
                    player.outbound().cloned()
                };
                reply(outbound.as_ref(), ServerMessage::RunToggle(running)).await;
            }
            ClientCommand::Gameplay(text) => {
                debug!("Unhandled command from {}: {}", session_id, text);
            }
        }

        Ok(())
    }

    async fn login(&self, session_id: &str, player: &SharedPlayer, username: String, password: String) {
        let (outbound, authenticated) = {
            let player = player.lock().await;
            (player.outbound().cloned(), player.username.is_some())
        };
        let Some(outbound) = outbound else {
            warn!("Login on session {} without a connection", session_id);
            return;
        };

        if authenticated || self.registry.get_by_username(&username).is_some() {
            info!("Rejected login for {}: already logged in", username);
            reply(Some(&outbound), ServerMessage::LoginFailed(LoginFailure::AlreadyLoggedIn)).await;
            return;
        }

        let name = username.clone();
        let id = match persistence::run_blocking(&self.store, move |s| s.authenticate(&name, &password)).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                info!("Failed login for {}", username);
                reply(Some(&outbound), ServerMessage::LoginFailed(LoginFailure::InvalidCredentials)).await;
                return;
            }
            Err(e) => {
                error!("Authentication error for {}: {}", username, e);
                reply(Some(&outbound), ServerMessage::LoginFailed(LoginFailure::InvalidCredentials)).await;
                return;
            }
        };

        let mut loaded = match persistence::run_blocking(&self.store, move |s| s.load(id)).await {
            Ok(Some(loaded)) => loaded,
            Ok(None) => {
                error!("Player {} authenticated but has no record", id);
                reply(Some(&outbound), ServerMessage::LoginFailed(LoginFailure::LoadFailed)).await;
                return;
            }
            Err(e) => {
                error!("Failed to load player {}: {}", id, e);
                reply(Some(&outbound), ServerMessage::LoginFailed(LoginFailure::LoadFailed)).await;
                return;
            }
        };

        loaded.attach_session(session_id, outbound.clone());
        loaded.last_login = Some(Utc::now());
        loaded.mark_for_update();
        let username = loaded.username.clone().unwrap_or(username);

        match self.registry.replace(session_id, loaded) {
            Ok(_) => {
                info!("Player {} logged in on session {}", username, session_id);
                reply(Some(&outbound), ServerMessage::LoginSuccess { id, username }).await;
            }
            Err(e) => {
                info!("Rejected login for {}: {}", username, e);
                reply(Some(&outbound), ServerMessage::LoginFailed(LoginFailure::AlreadyLoggedIn)).await;
            }
        }
    }

    async fn register(&self, session_id: &str, player: &SharedPlayer, username: String, password: String) {
        let (outbound, authenticated) = {
            let player = player.lock().await;
            (player.outbound().cloned(), player.username.is_some())
        };

        if let Err(e) = validate_registration(&username, &password) {
            reply(outbound.as_ref(), ServerMessage::RegisterFailed(RegisterFailure::Credentials(e))).await;
            return;
        }

        if authenticated || self.registry.get_by_username(&username).is_some() {
            reply(outbound.as_ref(), ServerMessage::RegisterFailed(RegisterFailure::AlreadyLoggedIn)).await;
            return;
        }

        let name = username.clone();
        match persistence::run_blocking(&self.store, move |s| s.find_by_username(&name)).await {
            Ok(None) => {}
            Ok(Some(_)) => {
                reply(outbound.as_ref(), ServerMessage::RegisterFailed(RegisterFailure::UsernameTaken)).await;
                return;
            }
            Err(e) => {
                error!("Username lookup failed for {}: {}", username, e);
                reply(outbound.as_ref(), ServerMessage::RegisterFailed(RegisterFailure::Failed)).await;
                return;
            }
        }

        let name = username.clone();
        let id = match persistence::run_blocking(&self.store, move |s| s.create(&name, &password)).await {
            Ok(id) => id,
            Err(StoreError::UsernameTaken(_)) => {
                reply(outbound.as_ref(), ServerMessage::RegisterFailed(RegisterFailure::UsernameTaken)).await;
                return;
            }
            Err(e) => {
                error!("Failed to create account {}: {}", username, e);
                reply(outbound.as_ref(), ServerMessage::RegisterFailed(RegisterFailure::Failed)).await;
                return;
            }
        };

        if let Err(e) = self.registry.claim_username(session_id, &username) {
            warn!("Created account {} but could not attach it: {}", username, e);
            reply(outbound.as_ref(), ServerMessage::RegisterFailed(RegisterFailure::AlreadyLoggedIn)).await;
            return;
        }

        let snapshot = {
            let mut player = player.lock().await;
            let now = Utc::now();
            player.id = Some(id);
            player.username = Some(username.clone());
            player.created_at = Some(now);
            player.last_login = Some(now);
            player.skills = Skills::new();
            player.refresh_combat_level();
            player.mark_for_update();
            player.clone()
        };
        if let Err(e) = persistence::save(&self.store, snapshot).await {
            error!("Failed to save new player {}: {}", username, e);
        }

        info!("Registered {} as player {}", username, id);
        reply(outbound.as_ref(), ServerMessage::RegisterSuccess { id, username }).await;
    }

    async fn logout(&self, player: &SharedPlayer) {
        let (snapshot, outbound) = {
            let player = player.lock().await;
            if player.username.is_none() {
                debug!("Ignoring LOGOUT from anonymous session {}", player.session_id());
                return;
            }
            (player.id.is_some().then(|| player.clone()), player.outbound().cloned())
        };

        if let Some(snapshot) = snapshot {
            let username = snapshot.username.clone().unwrap_or_default();
            match persistence::save(&self.store, snapshot).await {
                Ok(()) => info!("Player {} logged out", username),
                Err(e) => error!("Failed to save {} on logout: {}", username, e),
            }
        }

        reply(outbound.as_ref(), ServerMessage::LogoutSuccess).await;
    }

    /// Connection closed: save the player if it has an id, then drop the
    /// session.
    pub async fn disconnect(&self, session_id: &str) {
        let Some(player) = self.registry.get(session_id) else {
            return;
        };

        let snapshot = {
            let player = player.lock().await;
            player.id.is_some().then(|| player.clone())
        };
        if let Some(snapshot) = snapshot {
            let username = snapshot.username.clone().unwrap_or_default();
            if let Err(e) = persistence::save(&self.store, snapshot).await {
                error!("Failed to save {} on disconnect: {}", username, e);
            }
        }

        self.registry.remove(session_id);
    }
}

/// Queue a reply, logging and dropping it if the connection is gone.
pub(crate) async fn reply(outbound: Option<&Outbound>, message: ServerMessage) {
    let Some(outbound) = outbound else {
        return;
    };
    if let Err(e) = outbound.send(message).await {
        warn!("Dropped reply: {}", e);
    }
}
