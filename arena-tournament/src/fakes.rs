//! In-memory collaborators for tests and dry runs
//!
//! Provides `VirtualClock`, `ScriptedSpawner`, `ScriptedEngine` and
//! `ScriptedArena`, which satisfy the collaborator traits without a simulator.
//! No real time passes: sleeping on a [`VirtualClock`] advances it.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use arena_core::{SpawnFailureReason, SpawnSpec};
use async_trait::async_trait;
use rustc_hash::FxHashMap;

use crate::continuous::{ArenaSnapshot, CraftObservation, LifeScore, RemovalReason, SpawnOrder};
use crate::services::{Arena, MatchEngine, SimClock, SpawnService};

/// Length of one physics frame, seconds.
pub const FRAME_SECONDS: f64 = 0.02;

// ---------------------------------------------------------------------------
// VirtualClock
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ClockState {
    now: f64,
    warped: f64,
}

/// Deterministic simulation clock. Clones share the same time.
#[derive(Clone, Debug, Default)]
pub struct VirtualClock {
    state: Arc<Mutex<ClockState>>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, seconds: f64) {
        self.lock().now += seconds.max(0.0);
    }

    /// Total time skipped through [`SimClock::warp`].
    pub fn warped(&self) -> f64 {
        self.lock().warped
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ClockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SimClock for VirtualClock {
    fn now(&self) -> f64 {
        self.lock().now
    }

    async fn sleep(&self, seconds: f64) {
        self.advance(seconds);
        tokio::task::yield_now().await;
    }

    async fn tick(&self) {
        self.advance(FRAME_SECONDS);
        tokio::task::yield_now().await;
    }

    async fn warp(&self, seconds: f64) {
        let seconds = seconds.max(0.0);
        let mut state = self.lock();
        state.now += seconds;
        state.warped += seconds;
    }
}

// ---------------------------------------------------------------------------
// ScriptedSpawner
// ---------------------------------------------------------------------------

/// Spawn service that replays scripted results, then succeeds.
#[derive(Debug, Default)]
pub struct ScriptedSpawner {
    script: VecDeque<Result<(), SpawnFailureReason>>,
    requests: Vec<SpawnSpec>,
}

impl ScriptedSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Results for the next spawns, in order.
    pub fn with_results(results: impl IntoIterator<Item = Result<(), SpawnFailureReason>>) -> Self {
        Self {
            script: results.into_iter().collect(),
            requests: Vec::new(),
        }
    }

    /// Fail every spawn with `reason`.
    pub fn always(reason: SpawnFailureReason) -> Self {
        Self::with_results(std::iter::repeat(Err(reason)).take(1024))
    }

    /// Every spec received, in order.
    pub fn requests(&self) -> &[SpawnSpec] {
        &self.requests
    }
}

#[async_trait]
impl SpawnService for ScriptedSpawner {
    async fn spawn(&mut self, spec: &SpawnSpec) -> Result<(), SpawnFailureReason> {
        self.requests.push(spec.clone());
        tokio::task::yield_now().await;
        self.script.pop_front().unwrap_or(Ok(()))
    }
}

// ---------------------------------------------------------------------------
// ScriptedEngine
// ---------------------------------------------------------------------------

/// How a scripted match start behaves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartBehaviour {
    /// Starts and runs its full length.
    Run,
    /// `start` returns false.
    Refuse,
    /// `start` returns true but the match never becomes active.
    NeverActive,
}

/// Match engine whose competitions last a fixed simulated time.
#[derive(Debug)]
pub struct ScriptedEngine<C: SimClock> {
    clock: C,
    match_seconds: f64,
    script: VecDeque<StartBehaviour>,
    running_since: Option<f64>,
    length: f64,
    starts: u32,
    stops: u32,
}

impl<C: SimClock> ScriptedEngine<C> {
    pub fn new(clock: C, match_seconds: f64) -> Self {
        Self {
            clock,
            match_seconds,
            script: VecDeque::new(),
            running_since: None,
            length: match_seconds,
            starts: 0,
            stops: 0,
        }
    }

    /// Behaviour of the next starts; afterwards every start runs.
    pub fn with_script(mut self, script: impl IntoIterator<Item = StartBehaviour>) -> Self {
        self.script = script.into_iter().collect();
        self
    }

    pub fn starts(&self) -> u32 {
        self.starts
    }

    pub fn stops(&self) -> u32 {
        self.stops
    }
}

#[async_trait]
impl<C: SimClock> MatchEngine for ScriptedEngine<C> {
    async fn start(&mut self, duration: Option<f64>) -> bool {
        self.starts += 1;
        match self.script.pop_front().unwrap_or(StartBehaviour::Run) {
            StartBehaviour::Refuse => false,
            StartBehaviour::NeverActive => {
                self.running_since = None;
                true
            }
            StartBehaviour::Run => {
                self.length = duration.map_or(self.match_seconds, |d| d.min(self.match_seconds));
                self.running_since = Some(self.clock.now());
                true
            }
        }
    }

    fn is_active(&self) -> bool {
        self.running_since
            .map_or(false, |since| self.clock.now() - since < self.length)
    }

    async fn stop(&mut self) {
        self.stops += 1;
        self.running_since = None;
    }
}

// ---------------------------------------------------------------------------
// ScriptedArena
// ---------------------------------------------------------------------------

/// How one craft behaves once spawned in a [`ScriptedArena`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CraftScript {
    /// Spawns that fail before one succeeds
    pub failed_spawns: u32,
    /// Whether the control module ever registers
    pub activates: bool,
    /// Seconds alive per life (None = until removed)
    pub lifetime: Option<f64>,
    /// Seconds until out of ammo per life (None = never)
    pub ammo_for: Option<f64>,
    /// Score earned each life
    pub score: LifeScore,
}

impl Default for CraftScript {
    fn default() -> Self {
        Self {
            failed_spawns: 0,
            activates: true,
            lifetime: None,
            ammo_for: None,
            score: LifeScore::default(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Presence {
    spawned_at: f64,
}

/// Arena whose craft follow per-craft scripts on simulated time.
#[derive(Debug)]
pub struct ScriptedArena<C: SimClock> {
    clock: C,
    scripts: FxHashMap<String, CraftScript>,
    failures_left: FxHashMap<String, u32>,
    present: FxHashMap<String, Presence>,
    spawned: Vec<SpawnOrder>,
    removed: Vec<(String, RemovalReason)>,
    stopped: bool,
}

impl<C: SimClock> ScriptedArena<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            scripts: FxHashMap::default(),
            failures_left: FxHashMap::default(),
            present: FxHashMap::default(),
            spawned: Vec::new(),
            removed: Vec::new(),
            stopped: false,
        }
    }

    /// Script for `craft`; unscripted craft use [`CraftScript::default`].
    pub fn script(&mut self, craft: &str, script: CraftScript) {
        self.failures_left.insert(craft.to_string(), script.failed_spawns);
        self.scripts.insert(craft.to_string(), script);
    }

    pub fn spawned(&self) -> &[SpawnOrder] {
        &self.spawned
    }

    pub fn removed(&self) -> &[(String, RemovalReason)] {
        &self.removed
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    fn script_for(&self, craft: &str) -> CraftScript {
        self.scripts.get(craft).copied().unwrap_or_default()
    }
}

#[async_trait]
impl<C: SimClock> Arena for ScriptedArena<C> {
    async fn spawn_craft(&mut self, order: &SpawnOrder) -> Result<(), SpawnFailureReason> {
        self.spawned.push(order.clone());
        if let Some(left) = self.failures_left.get_mut(&order.craft) {
            if *left > 0 {
                *left -= 1;
                return Err(SpawnFailureReason::VesselFailedToSpawn);
            }
        }
        let presence = Presence {
            spawned_at: self.clock.now(),
        };
        self.present.insert(order.craft.clone(), presence);
        Ok(())
    }

    async fn remove_craft(&mut self, craft: &str, reason: RemovalReason) {
        self.present.remove(craft);
        self.removed.push((craft.to_string(), reason));
    }

    fn snapshot(&self) -> ArenaSnapshot {
        let now = self.clock.now();
        let craft = self
            .present
            .iter()
            .filter_map(|(name, presence)| {
                let script = self.script_for(name);
                let age = now - presence.spawned_at;
                if script.lifetime.map_or(false, |lifetime| age >= lifetime) {
                    return None;
                }
                let observation = CraftObservation {
                    activated: script.activates,
                    alive: true,
                    armed: script.ammo_for.map_or(true, |ammo| age < ammo),
                    score: script.score,
                };
                Some((name.clone(), observation))
            })
            .collect();
        ArenaSnapshot { craft }
    }

    async fn stop_match(&mut self) {
        self.stopped = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_virtual_clock_advances_on_sleep() {
        let clock = VirtualClock::new();
        let shared = clock.clone();
        clock.sleep(1.5).await;
        clock.tick().await;
        clock.warp(60.0).await;
        assert!((shared.now() - 61.52).abs() < 1e-9);
        assert_eq!(shared.warped(), 60.0);
    }

    #[tokio::test]
    async fn test_scripted_engine_runs_for_match_length() {
        let clock = VirtualClock::new();
        let mut engine = ScriptedEngine::new(clock.clone(), 30.0)
            .with_script([StartBehaviour::Refuse, StartBehaviour::NeverActive]);

        assert!(!engine.start(None).await);
        assert!(engine.start(None).await);
        assert!(!engine.is_active());

        assert!(engine.start(Some(10.0)).await);
        assert!(engine.is_active());
        clock.advance(9.0);
        assert!(engine.is_active());
        clock.advance(1.0);
        assert!(!engine.is_active());
        assert_eq!(engine.starts(), 3);
    }

    #[tokio::test]
    async fn test_scripted_arena_lifetimes() {
        let clock = VirtualClock::new();
        let mut arena = ScriptedArena::new(clock.clone());
        arena.script(
            "short",
            CraftScript {
                lifetime: Some(5.0),
                ammo_for: Some(2.0),
                ..Default::default()
            },
        );
        arena.script(
            "flaky",
            CraftScript {
                failed_spawns: 1,
                ..Default::default()
            },
        );
        let order = |craft: &str| SpawnOrder {
            craft: craft.to_string(),
            slot: crate::continuous::SpawnSlot { index: 0, count: 1 },
            altitude: 100.0,
        };

        assert!(arena.spawn_craft(&order("short")).await.is_ok());
        assert!(arena.spawn_craft(&order("flaky")).await.is_err());
        assert!(arena.spawn_craft(&order("flaky")).await.is_ok());

        clock.advance(3.0);
        let snapshot = arena.snapshot();
        assert!(!snapshot.get("short").unwrap().armed);
        assert!(snapshot.get("flaky").unwrap().armed);

        clock.advance(2.0);
        assert!(arena.snapshot().get("short").is_none());

        arena.remove_craft("flaky", RemovalReason::OutOfAmmo).await;
        assert!(arena.snapshot().craft.is_empty());
        assert_eq!(arena.spawned().len(), 3);
    }
}
