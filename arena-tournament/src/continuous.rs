//! Continuous spawning - keep a fixed number of craft fighting at all times
//!
//! ## Architecture (4-layer granularity)
//!
//! - Level 1: run_continuous (session loop against an [`Arena`])
//! - Level 2: ContinuousSpawner::step (one bookkeeping pass per cycle)
//! - Level 3: observe, enforce_ammo, enqueue, fill (steps of a pass)
//! - Level 4: optimise_slots, score records
//!
//! [`ContinuousSpawner`] is a pure state machine: it is handed the current
//! [`ArenaSnapshot`] and answers with removals and spawn orders. The session
//! loop applies them, so every rule here is testable without a world.

use std::collections::{BTreeMap, VecDeque};

use arena_core::SpawnFailureReason;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::config::ContinuousConfig;
use crate::services::{Arena, CancelToken, SimClock, StatusLog};

// ============================================================================
// Slots
// ============================================================================

/// A rotational spawn position around the spawn point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpawnSlot {
    pub index: usize,
    pub count: usize,
}

impl SpawnSlot {
    /// Bearing of this slot from the spawn point.
    pub fn heading_degrees(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        360.0 * self.index as f64 / self.count as f64
    }
}

/// Order in which slots are handed out.
///
/// Consecutive spawns land about a third of the circle apart so fresh craft do
/// not appear on top of each other. Fewer than four slots are used in order.
pub fn optimise_slots(count: usize) -> Vec<usize> {
    if count < 4 {
        return (0..count).collect();
    }
    let step = count.div_ceil(3);
    let mut taken = vec![false; count];
    let mut order = Vec::with_capacity(count);
    let mut index = 0;
    while order.len() < count {
        while taken[index] {
            index = (index + 1) % count;
        }
        taken[index] = true;
        order.push(index);
        index = (index + step) % count;
    }
    order
}

// ============================================================================
// Snapshot and orders
// ============================================================================

/// What the arena reports about one craft.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CraftObservation {
    /// Control module registered with the match engine
    pub activated: bool,
    pub alive: bool,
    /// Has usable weapons and ammo
    pub armed: bool,
    /// Score for the current life
    pub score: LifeScore,
}

/// Per-life combat counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LifeScore {
    pub hits: u32,
    pub damage: f64,
    pub kills: u32,
}

impl LifeScore {
    fn add(&mut self, other: LifeScore) {
        self.hits += other.hits;
        self.damage += other.damage;
        self.kills += other.kills;
    }
}

/// Every craft currently in the world. Absent craft are gone.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ArenaSnapshot {
    pub craft: FxHashMap<String, CraftObservation>,
}

impl ArenaSnapshot {
    pub fn get(&self, craft: &str) -> Option<&CraftObservation> {
        self.craft.get(craft)
    }
}

/// Request to place one craft.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpawnOrder {
    pub craft: String,
    pub slot: SpawnSlot,
    pub altitude: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemovalReason {
    /// Never activated; spawn it again.
    Respawn,
    /// Never activated after repeated tries; the craft file is dropped.
    Discarded,
    /// Scheduler kill after running dry too long. Not a combat kill.
    OutOfAmmo,
}

/// Request to take one craft out of the world.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Removal {
    pub craft: String,
    pub reason: RemovalReason,
}

/// Result of one bookkeeping pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Cycle {
    pub removals: Vec<Removal>,
    pub spawns: Vec<SpawnOrder>,
    /// The session is over; stop the match.
    pub stop: bool,
}

/// Cumulative counters for one craft across all of its lives.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ContinuousScoreRecord {
    pub spawn_count: u32,
    pub deaths: u32,
    pub cumulative_hits: u32,
    pub cumulative_damage: f64,
    pub cumulative_kills: u32,
    /// Deaths caused by the scheduler rather than an opponent
    pub scheduler_kills: u32,
}

// ============================================================================
// Spawner state
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    /// Not in the world.
    Idle,
    /// Spawned, control module not yet registered.
    InFlight,
    Active,
}

#[derive(Clone, Debug)]
struct CraftRecord {
    phase: Phase,
    queued: bool,
    discarded: bool,
    /// Next spawn retries a failed or invalid one and costs no life.
    retry: bool,
    lives_used: u32,
    invalid_checks: u32,
    out_of_ammo_since: Option<f64>,
    banked: LifeScore,
    current: LifeScore,
    score: ContinuousScoreRecord,
}

impl CraftRecord {
    fn new() -> Self {
        Self {
            phase: Phase::Idle,
            queued: false,
            discarded: false,
            retry: false,
            lives_used: 0,
            invalid_checks: 0,
            out_of_ammo_since: None,
            banked: LifeScore::default(),
            current: LifeScore::default(),
            score: ContinuousScoreRecord::default(),
        }
    }

    fn die(&mut self) {
        self.banked.add(self.current);
        self.current = LifeScore::default();
        self.score.deaths += 1;
        self.phase = Phase::Idle;
        self.out_of_ammo_since = None;
    }

    fn totals(&self) -> ContinuousScoreRecord {
        let mut total = self.banked;
        total.add(self.current);
        ContinuousScoreRecord {
            cumulative_hits: total.hits,
            cumulative_damage: total.damage,
            cumulative_kills: total.kills,
            ..self.score.clone()
        }
    }
}

/// Slot, backlog and score bookkeeping for a continuous session.
#[derive(Clone, Debug)]
pub struct ContinuousSpawner {
    config: ContinuousConfig,
    pool: Vec<String>,
    records: FxHashMap<String, CraftRecord>,
    backlog: VecDeque<String>,
    slot_order: Vec<usize>,
    next_slot: usize,
    altitude: f64,
}

impl ContinuousSpawner {
    /// Session over `pool` with the backlog seeded from the whole pool.
    pub fn new(pool: Vec<String>, config: ContinuousConfig, altitude: f64) -> Self {
        let slots = config.slot_count(pool.len());
        let records = pool
            .iter()
            .map(|craft| (craft.clone(), CraftRecord::new()))
            .collect();
        let altitude = altitude.max(config.min_altitude);
        let mut spawner = Self {
            config,
            pool,
            records,
            backlog: VecDeque::new(),
            slot_order: optimise_slots(slots),
            next_slot: 0,
            altitude,
        };
        spawner.enqueue();
        spawner
    }

    pub fn slot_count(&self) -> usize {
        self.slot_order.len()
    }

    pub fn backlog(&self) -> impl Iterator<Item = &String> + '_ {
        self.backlog.iter()
    }

    pub fn active_count(&self) -> usize {
        self.count(Phase::Active)
    }

    pub fn in_flight_count(&self) -> usize {
        self.count(Phase::InFlight)
    }

    pub fn is_discarded(&self, craft: &str) -> bool {
        self.records.get(craft).map_or(false, |r| r.discarded)
    }

    // ========================================================================
    // Level 2 - One pass
    // ========================================================================

    /// Run one bookkeeping pass at simulation time `now`.
    pub fn step(&mut self, now: f64, snapshot: &ArenaSnapshot) -> Cycle {
        let mut removals = self.observe(snapshot);
        removals.extend(self.enforce_ammo(now, snapshot));
        self.enqueue();

        if self.backlog.is_empty() && self.in_flight_count() == 0 && self.active_count() < 2 {
            return Cycle {
                removals,
                spawns: Vec::new(),
                stop: true,
            };
        }
        let spawns = self.fill();
        Cycle {
            removals,
            spawns,
            stop: false,
        }
    }

    /// Report how a spawn order went.
    ///
    /// A failure counts as one invalid check and the craft is retried on a
    /// later pass, unless that pushes it past the removal threshold.
    pub fn record_spawn(&mut self, craft: &str, result: Result<(), SpawnFailureReason>) {
        let remove_after = self.config.remove_after_invalid;
        let Some(record) = self.records.get_mut(craft) else {
            return;
        };
        if let Err(reason) = result {
            tracing::warn!("Failed to spawn {}: {}", craft, reason);
            record.phase = Phase::Idle;
            record.retry = true;
            record.invalid_checks += 1;
            if record.invalid_checks > remove_after {
                tracing::warn!("Discarding {} after {} failed checks", craft, record.invalid_checks);
                record.discarded = true;
            }
        }
    }

    /// Per-craft totals, sorted by craft.
    pub fn scores(&self) -> BTreeMap<String, ContinuousScoreRecord> {
        self.records
            .iter()
            .map(|(craft, record)| (craft.clone(), record.totals()))
            .collect()
    }

    // ========================================================================
    // Level 3 - Steps
    // ========================================================================

    fn observe(&mut self, snapshot: &ArenaSnapshot) -> Vec<Removal> {
        let respawn_at = self.config.respawn_after_invalid;
        let remove_after = self.config.remove_after_invalid;
        let mut removals = Vec::new();

        for craft in &self.pool {
            let Some(record) = self.records.get_mut(craft) else {
                continue;
            };
            let seen = snapshot.get(craft).filter(|obs| obs.alive);
            match (record.phase, seen) {
                (Phase::Idle, _) => {}
                (Phase::InFlight, None) => {
                    tracing::debug!("{} was lost before activating", craft);
                    record.die();
                }
                (Phase::InFlight, Some(obs)) if obs.activated => {
                    record.phase = Phase::Active;
                    record.invalid_checks = 0;
                    record.current = obs.score;
                }
                (Phase::InFlight, Some(_)) => {
                    record.invalid_checks += 1;
                    if record.invalid_checks > remove_after {
                        record.discarded = true;
                        record.phase = Phase::Idle;
                        removals.push(Removal {
                            craft: craft.clone(),
                            reason: RemovalReason::Discarded,
                        });
                    } else if record.invalid_checks == respawn_at {
                        record.phase = Phase::Idle;
                        record.retry = true;
                        removals.push(Removal {
                            craft: craft.clone(),
                            reason: RemovalReason::Respawn,
                        });
                    }
                }
                (Phase::Active, None) => record.die(),
                (Phase::Active, Some(obs)) => record.current = obs.score,
            }
        }
        removals
    }

    fn enforce_ammo(&mut self, now: f64, snapshot: &ArenaSnapshot) -> Vec<Removal> {
        let limit = self.config.out_of_ammo_kill_time.filter(|t| *t >= 0.0);
        let mut removals = Vec::new();

        for craft in &self.pool {
            let Some(record) = self.records.get_mut(craft) else {
                continue;
            };
            if record.phase != Phase::Active {
                continue;
            }
            let armed = snapshot.get(craft).map_or(true, |obs| obs.armed);
            if armed {
                record.out_of_ammo_since = None;
                continue;
            }
            let since = *record.out_of_ammo_since.get_or_insert(now);
            if let Some(limit) = limit {
                if now - since > limit {
                    record.score.scheduler_kills += 1;
                    record.die();
                    removals.push(Removal {
                        craft: craft.clone(),
                        reason: RemovalReason::OutOfAmmo,
                    });
                }
            }
        }
        removals
    }

    /// Queue every craft that is out of the world and still has a life.
    fn enqueue(&mut self) {
        let lives = self.config.lives;
        for craft in &self.pool {
            let Some(record) = self.records.get_mut(craft) else {
                continue;
            };
            if record.discarded || record.queued || record.phase != Phase::Idle {
                continue;
            }
            if record.retry {
                record.retry = false;
                record.queued = true;
                self.backlog.push_front(craft.clone());
                continue;
            }
            if lives.map_or(true, |lives| record.lives_used < lives) {
                record.lives_used += 1;
                record.queued = true;
                self.backlog.push_back(craft.clone());
            }
        }
    }

    /// Pull from the backlog until every slot is busy.
    fn fill(&mut self) -> Vec<SpawnOrder> {
        let mut orders = Vec::new();
        while self.in_flight_count() + self.active_count() < self.slot_count() {
            let Some(craft) = self.backlog.pop_front() else {
                break;
            };
            let Some(record) = self.records.get_mut(&craft) else {
                continue;
            };
            record.queued = false;
            if record.discarded {
                continue;
            }
            record.phase = Phase::InFlight;
            record.score.spawn_count += 1;

            let slot = SpawnSlot {
                index: self.slot_order[self.next_slot % self.slot_order.len()],
                count: self.slot_order.len(),
            };
            self.next_slot += 1;
            orders.push(SpawnOrder {
                craft,
                slot,
                altitude: self.altitude,
            });
        }
        orders
    }

    fn count(&self, phase: Phase) -> usize {
        self.records.values().filter(|r| r.phase == phase).count()
    }
}

// ============================================================================
// Level 1 - Session loop
// ============================================================================

/// How a continuous session ended.
#[derive(Clone, Debug, PartialEq)]
pub struct ContinuousOutcome {
    /// True if stopped by cancellation rather than running out of craft
    pub cancelled: bool,
    pub scores: BTreeMap<String, ContinuousScoreRecord>,
}

/// Drive `spawner` against `arena` until the session ends or is cancelled.
pub async fn run_continuous<A: Arena, C: SimClock>(
    spawner: &mut ContinuousSpawner,
    arena: &mut A,
    clock: &C,
    cycle_interval: f64,
    status: &StatusLog,
    cancel: &CancelToken,
) -> ContinuousOutcome {
    status.info(format!(
        "Starting continuous spawning: {} craft, {} slots",
        spawner.pool.len(),
        spawner.slot_count()
    ));

    let cancelled = 'session: loop {
        if cancel.is_cancelled() {
            break true;
        }
        let snapshot = arena.snapshot();
        let cycle = spawner.step(clock.now(), &snapshot);

        for removal in &cycle.removals {
            match removal.reason {
                RemovalReason::Respawn => {
                    status.warn(format!("{} failed to activate; respawning", removal.craft))
                }
                RemovalReason::Discarded => status.warn(format!(
                    "{} never activated; removing it from spawning",
                    removal.craft
                )),
                RemovalReason::OutOfAmmo => {
                    status.info(format!("{} ran out of ammo; removing it", removal.craft))
                }
            }
            if cancel
                .guard(arena.remove_craft(&removal.craft, removal.reason))
                .await
                .is_none()
            {
                break 'session true;
            }
        }
        if cycle.stop {
            status.info("Continuous spawning finished: fewer than two craft left");
            arena.stop_match().await;
            break false;
        }

        for order in &cycle.spawns {
            let Some(result) = cancel.guard(arena.spawn_craft(order)).await else {
                break 'session true;
            };
            spawner.record_spawn(&order.craft, result);
        }
        if cancel.guard(clock.sleep(cycle_interval)).await.is_none() {
            break true;
        }
    };

    if cancelled {
        status.info("Continuous spawning cancelled");
        arena.stop_match().await;
    }
    ContinuousOutcome {
        cancelled,
        scores: spawner.scores(),
    }
}
