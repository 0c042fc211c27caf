//! Game Engine
//!
//! Fixed-period scheduler and the per-tick game loop.
//!
//! ## Tick Order
//!
//! 1. Snapshot the registered players
//! 2. Update every player (movement, then regeneration)
//! 3. Flush every player's pending position update
//!
//! All updates finish before any flush. Command handlers mutate players
//! outside the tick; their effects are picked up by the next flush.
//!
//! A second loop reaps idle sessions on its own interval.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::Notify;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use crate::config::env_or;
use crate::network::session::SessionRegistry;
use crate::persistence::{self, PlayerStore};
use crate::TICK_RATE_MS;

/// Engine timing configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Time between tick starts.
    pub tick_period: Duration,
    /// Sessions idle longer than this are reaped.
    pub idle_timeout: Duration,
    /// How often the reaper runs.
    pub reap_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_millis(TICK_RATE_MS),
            idle_timeout: Duration::from_secs(15 * 60),
            reap_interval: Duration::from_secs(60),
        }
    }
}

impl EngineConfig {
    /// Read `RSPS_TICK_MS`, `RSPS_IDLE_TIMEOUT_MINUTES` and
    /// `RSPS_REAP_INTERVAL_SECS`.
    pub fn from_env() -> Self {
        Self {
            tick_period: Duration::from_millis(env_or("RSPS_TICK_MS", TICK_RATE_MS).max(1)),
            idle_timeout: Duration::from_secs(env_or("RSPS_IDLE_TIMEOUT_MINUTES", 15u64).saturating_mul(60)),
            reap_interval: Duration::from_secs(env_or("RSPS_REAP_INTERVAL_SECS", 60u64).max(1)),
        }
    }
}

/// Outcome of one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Tick number, starting at 1.
    pub tick: u64,
    /// Players processed.
    pub players: usize,
    /// Position lines queued.
    pub updates_sent: usize,
    /// Player updates that panicked.
    pub update_failures: usize,
    /// Flushes that could not be queued.
    pub send_failures: usize,
}

/// The game loop.
pub struct GameEngine {
    config: EngineConfig,
    registry: Arc<SessionRegistry>,
    store: Arc<dyn PlayerStore>,
    running: AtomicBool,
    generation: AtomicU64,
    ticks: AtomicU64,
    wake: Notify,
}

impl GameEngine {
    /// Create a stopped engine.
    pub fn new(config: EngineConfig, registry: Arc<SessionRegistry>, store: Arc<dyn PlayerStore>) -> Self {
        Self {
            config,
            registry,
            store,
            running: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            ticks: AtomicU64::new(0),
            wake: Notify::new(),
        }
    }

    /// Start the tick and reaper loops. Returns `false` if already running.
    pub fn start(self: &Arc<Self>) -> bool {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        tokio::spawn(Arc::clone(self).tick_loop(generation));
        tokio::spawn(Arc::clone(self).reap_loop(generation));

        info!(
            "Game engine started ({}ms ticks, reaping after {}s idle)",
            self.config.tick_period.as_millis(),
            self.config.idle_timeout.as_secs()
        );
        true
    }

    /// Stop both loops after their current iteration. Returns `false` if
    /// not running.
    pub fn stop(&self) -> bool {
        if self
            .running
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        self.wake.notify_waiters();
        info!("Game engine stopping after {} ticks", self.tick_count());
        true
    }

    /// Loops are active.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Ticks executed so far.
    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    fn active(&self, generation: u64) -> bool {
        self.is_running() && self.generation.load(Ordering::SeqCst) == generation
    }

    /// Run one tick: update all players, then flush all.
    pub async fn tick(&self) -> TickReport {
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        let players = self.registry.players();
        let mut report = TickReport {
            tick,
            players: players.len(),
            ..TickReport::default()
        };

        for player in &players {
            let mut player = player.lock().await;
            if panic::catch_unwind(AssertUnwindSafe(|| player.update())).is_err() {
                error!("Player update panicked for session {}", player.session_id());
                report.update_failures += 1;
            }
        }

        for player in &players {
            let mut player = player.lock().await;
            match player.flush_updates() {
                Ok(true) => report.updates_sent += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!("Failed to send update to {}: {}", player.session_id(), e);
                    report.send_failures += 1;
                }
            }
        }

        report
    }

    #[instrument(skip(self))]
    async fn tick_loop(self: Arc<Self>, generation: u64) {
        let period = self.config.tick_period;

        while self.active(generation) {
            let started = Instant::now();

            if AssertUnwindSafe(self.tick()).catch_unwind().await.is_err() {
                error!("Tick panicked; continuing");
            }

            let elapsed = started.elapsed();
            if elapsed >= period {
                warn!(
                    "Tick overran: took {}ms of {}ms",
                    elapsed.as_millis(),
                    period.as_millis()
                );
                tokio::task::yield_now().await;
                continue;
            }

            tokio::select! {
                _ = time::sleep(period - elapsed) => {}
                _ = self.wake.notified() => {}
            }
        }

        debug!("Tick loop exited");
    }

    #[instrument(skip(self))]
    async fn reap_loop(self: Arc<Self>, generation: u64) {
        let mut interval = time::interval(self.config.reap_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await;

        while self.active(generation) {
            tokio::select! {
                _ = interval.tick() => {}
                _ = self.wake.notified() => continue,
            }
            if !self.active(generation) {
                break;
            }

            let reaped = self.registry.reap_idle(self.config.idle_timeout, &self.store).await;
            if !reaped.is_empty() {
                info!("Reaped {} idle sessions", reaped.len());
            }
        }

        debug!("Reaper loop exited");
    }

    /// Save every registered player that has a storage id. Returns how many
    /// saves succeeded.
    pub async fn save_all(&self) -> usize {
        let mut saved = 0;
        for player in self.registry.players() {
            let snapshot = {
                let guard = player.lock().await;
                guard.id.is_some().then(|| guard.clone())
            };
            let Some(snapshot) = snapshot else { continue };

            let username = snapshot.username.clone().unwrap_or_default();
            match persistence::save(&self.store, snapshot).await {
                Ok(()) => saved += 1,
                Err(e) => error!("Failed to save {}: {}", username, e),
            }
        }
        info!("Saved {} players", saved);
        saved
    }
}
