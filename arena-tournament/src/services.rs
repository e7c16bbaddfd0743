//! Collaborator interfaces, the operator status log and cooperative cancellation
//!
//! Level 4 - Utilities
//!
//! The scheduler never talks to the simulation directly. Everything it needs
//! goes through the traits here, so tests and dry runs can swap in the
//! in-memory versions from [`crate::fakes`].

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use arena_core::{SpawnFailureReason, SpawnSpec};
use async_trait::async_trait;
use tokio::sync::watch;

use crate::continuous::{ArenaSnapshot, RemovalReason, SpawnOrder};

// ============================================================================
// Collaborators
// ============================================================================

/// Places a heat's craft into the world.
#[async_trait]
pub trait SpawnService: Send {
    /// Spawn every craft in `spec`, resolving once they have settled.
    async fn spawn(&mut self, spec: &SpawnSpec) -> Result<(), SpawnFailureReason>;
}

/// Runs the timed competition for one heat.
#[async_trait]
pub trait MatchEngine: Send {
    /// Start a competition lasting `duration` seconds (`None` = unlimited).
    ///
    /// Returns false if the engine refused to start.
    async fn start(&mut self, duration: Option<f64>) -> bool;

    fn is_active(&self) -> bool;

    async fn stop(&mut self);
}

/// Simulation time.
///
/// Timeouts and delays are measured against this clock, not wall time, so a
/// time skip never trips a settling timeout.
#[async_trait]
pub trait SimClock: Send + Sync {
    /// Seconds since the clock started.
    fn now(&self) -> f64;

    async fn sleep(&self, seconds: f64);

    /// Wait for the next physics frame.
    async fn tick(&self);

    /// Skip simulation time forward.
    async fn warp(&self, seconds: f64);
}

/// The live world of a continuous session.
#[async_trait]
pub trait Arena: Send {
    async fn spawn_craft(&mut self, order: &SpawnOrder) -> Result<(), SpawnFailureReason>;

    async fn remove_craft(&mut self, craft: &str, reason: RemovalReason);

    /// Current state of every craft in the world.
    fn snapshot(&self) -> ArenaSnapshot;

    async fn stop_match(&mut self);
}

// ============================================================================
// Tokio clock
// ============================================================================

/// Real-time clock on tokio timers, with time skips added as an offset.
#[derive(Clone, Debug)]
pub struct TokioClock {
    start: tokio::time::Instant,
    offset: Arc<Mutex<f64>>,
    frame: Duration,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            start: tokio::time::Instant::now(),
            offset: Arc::new(Mutex::new(0.0)),
            frame: Duration::from_millis(20),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SimClock for TokioClock {
    fn now(&self) -> f64 {
        let offset = *self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        self.start.elapsed().as_secs_f64() + offset
    }

    async fn sleep(&self, seconds: f64) {
        tokio::time::sleep(Duration::from_secs_f64(seconds.max(0.0))).await;
    }

    async fn tick(&self) {
        tokio::time::sleep(self.frame).await;
    }

    async fn warp(&self, seconds: f64) {
        *self.offset.lock().unwrap_or_else(PoisonError::into_inner) += seconds.max(0.0);
    }
}

// ============================================================================
// Status log
// ============================================================================

/// Append-only operator log, mirrored to `tracing`.
///
/// Clones share the same messages.
#[derive(Clone, Debug, Default)]
pub struct StatusLog {
    messages: Arc<Mutex<Vec<String>>>,
}

impl StatusLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("{}", message);
        self.append(message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{}", message);
        self.append(message);
    }

    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!("{}", message);
        self.append(message);
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last(&self) -> Option<String> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    fn append(&self, message: String) {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
    }
}

// ============================================================================
// Cancellation
// ============================================================================

/// Cooperative cancellation shared between a task and whoever may stop it.
#[derive(Clone, Debug)]
pub struct CancelToken {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    /// Clear a cancellation so the token can guard another run. Every clone
    /// sees the reset.
    pub fn reset(&self) {
        self.sender.send_replace(false);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once cancelled.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        // The sender lives as long as any token, so this only ends on cancel.
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }

    /// Run `future` unless cancelled first; `None` means cancelled.
    pub async fn guard<F: Future>(&self, future: F) -> Option<F::Output> {
        if self.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.cancelled() => None,
            output = future => Some(output),
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_log_shared_between_clones() {
        let log = StatusLog::new();
        let other = log.clone();
        log.info("Running heat 0 of round 0");
        other.warn("Failed to spawn heat 0 of round 0: no terrain");
        assert_eq!(log.messages().len(), 2);
        assert_eq!(
            log.last().as_deref(),
            Some("Failed to spawn heat 0 of round 0: no terrain")
        );
    }

    #[tokio::test]
    async fn test_guard_passes_through_when_not_cancelled() {
        let token = CancelToken::new();
        assert_eq!(token.guard(async { 7 }).await, Some(7));
    }

    #[tokio::test]
    async fn test_guard_stops_pending_future() {
        let token = CancelToken::new();
        let remote = token.clone();
        let pending = std::future::pending::<()>();
        let handle = tokio::spawn(async move { remote.guard(pending).await });
        tokio::task::yield_now().await;
        token.cancel();
        assert_eq!(handle.await.unwrap(), None);
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_reset_token_guards_again() {
        let token = CancelToken::new();
        let other = token.clone();
        token.cancel();
        assert_eq!(token.guard(async { 1 }).await, None);

        other.reset();
        assert!(!token.is_cancelled());
        assert_eq!(token.guard(async { 2 }).await, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_clock_warp_adds_offset() {
        let clock = TokioClock::new();
        clock.sleep(2.0).await;
        clock.warp(60.0).await;
        let now = clock.now();
        assert!(now >= 62.0 && now < 63.0, "now = {}", now);
    }
}
