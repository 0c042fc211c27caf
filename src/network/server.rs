//! WebSocket Game Server
//!
//! Async WebSocket server for multiplayer connections.
//! Each connection gets an anonymous player, a writer task draining its
//! outbound queue, and a read loop feeding text lines to the dispatcher.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::env_or;
use crate::game::player::Player;
use crate::network::dispatcher::{reply, DispatchError, Dispatcher};
use crate::network::protocol::ServerMessage;
use crate::network::session::Outbound;

/// How long a closing connection may keep flushing queued lines.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Per-connection outbound queue depth.
    pub outbound_buffer: usize,
    /// Player database path.
    pub db_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080)),
            max_connections: 2000,
            outbound_buffer: 64,
            db_path: "data/players.db".to_string(),
        }
    }
}

impl ServerConfig {
    /// Read `RSPS_BIND_ADDR`, `RSPS_MAX_CONNECTIONS`, `RSPS_OUTBOUND_BUFFER`
    /// and `RSPS_DB_PATH`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: env_or("RSPS_BIND_ADDR", defaults.bind_addr),
            max_connections: env_or("RSPS_MAX_CONNECTIONS", defaults.max_connections),
            outbound_buffer: env_or("RSPS_OUTBOUND_BUFFER", defaults.outbound_buffer).max(1),
            db_path: env_or("RSPS_DB_PATH", defaults.db_path),
        }
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),
}

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Command router.
    dispatcher: Arc<Dispatcher>,
    /// Open connections.
    connections: Arc<AtomicUsize>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server.
    pub fn new(config: ServerConfig, dispatcher: Arc<Dispatcher>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            dispatcher,
            connections: Arc::new(AtomicUsize::new(0)),
            shutdown_tx,
        }
    }

    /// Bind the configured address and serve until shutdown.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        info!("Game server listening on {}", listener.local_addr()?);
        self.serve(listener).await
    }

    /// Accept connections from an already-bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.connection_count() >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            debug!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let dispatcher = self.dispatcher.clone();
        let connections = self.connections.clone();
        let buffer = self.config.outbound_buffer;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        connections.fetch_add(1, Ordering::SeqCst);

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    connections.fetch_sub(1, Ordering::SeqCst);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (outbound, mut outbound_rx) = Outbound::channel(buffer);

            // Register an anonymous player
            let session_id = Uuid::new_v4().to_string();
            dispatcher
                .registry()
                .add(Player::new(session_id.clone(), Some(outbound.clone())));

            // Spawn message sender task
            let mut sender_task = tokio::spawn(async move {
                while let Some(msg) = outbound_rx.recv().await {
                    if ws_sender.send(Message::Text(msg.to_string())).await.is_err() {
                        break;
                    }
                }
                let _ = ws_sender.close().await;
            });

            reply(Some(&outbound), ServerMessage::Connected { session_id: session_id.clone() }).await;
            info!("Connection {} opened session {}", addr, session_id);

            // Handle incoming messages
            'read: loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                for line in text.lines() {
                                    match dispatcher.dispatch(&session_id, line).await {
                                        Ok(()) => {}
                                        Err(DispatchError::UnknownSession(_)) => {
                                            info!("Session {} is gone, closing {}", session_id, addr);
                                            break 'read;
                                        }
                                        Err(e) => warn!("Dropped command from {}: {}", session_id, e),
                                    }
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                warn!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }

            // Cleanup
            dispatcher.disconnect(&session_id).await;
            drop(outbound);
            if tokio::time::timeout(DRAIN_TIMEOUT, &mut sender_task).await.is_err() {
                sender_task.abort();
            }

            connections.fetch_sub(1, Ordering::SeqCst);
            info!("Connection {} closed (session {})", addr, session_id);
        });
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}
