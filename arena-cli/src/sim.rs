//! Simulated collaborators for running the scheduler without a simulator
//!
//! The heat runner gets a [`RandomSpawner`] that fails at a configurable rate
//! plus the scripted match engine. Continuous sessions get a scripted arena
//! with a random lifetime, ammo supply and score for every craft.

use std::path::{Path, PathBuf};
use std::time::Duration;

use arena_core::{SpawnFailureReason, SpawnSpec};
use arena_tournament::fakes::{CraftScript, ScriptedArena};
use arena_tournament::{CancelToken, LifeScore, SimClock, SpawnService};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// Failures the simulated spawner picks from.
const SPAWN_FAILURES: [SpawnFailureReason; 4] = [
    SpawnFailureReason::VesselLostParts,
    SpawnFailureReason::VesselFailedToSpawn,
    SpawnFailureReason::TimedOut,
    SpawnFailureReason::InvalidVessel,
];

/// Seconds a simulated spawn takes to settle.
const SETTLE_SECONDS: f64 = 5.0;

// ============================================================================
// Spawning
// ============================================================================

/// Spawn service that settles for a while and fails at random.
pub struct RandomSpawner<C> {
    clock: C,
    rng: ChaCha8Rng,
    failure_rate: f64,
}

impl<C: SimClock> RandomSpawner<C> {
    pub fn new(clock: C, rng: ChaCha8Rng, failure_rate: f64) -> Self {
        Self {
            clock,
            rng,
            failure_rate: failure_rate.clamp(0.0, 1.0),
        }
    }
}

#[async_trait]
impl<C: SimClock> SpawnService for RandomSpawner<C> {
    async fn spawn(&mut self, spec: &SpawnSpec) -> Result<(), SpawnFailureReason> {
        if spec.craft.is_empty() {
            return Err(SpawnFailureReason::NoCraft);
        }
        tracing::debug!(
            "Spawning {} craft at altitude {}m",
            spec.craft.len(),
            spec.altitude
        );
        self.clock.sleep(SETTLE_SECONDS).await;
        if self.rng.gen_bool(self.failure_rate) {
            let reason = *SPAWN_FAILURES
                .choose(&mut self.rng)
                .unwrap_or(&SpawnFailureReason::TimedOut);
            return Err(reason);
        }
        Ok(())
    }
}

// ============================================================================
// Continuous arena
// ============================================================================

/// Scripted arena where every craft lives, shoots and scores at random.
///
/// Every lifetime is finite, so a session with limited lives always ends.
pub fn random_arena<C: SimClock>(clock: C, pool: &[String], rng: &mut ChaCha8Rng) -> ScriptedArena<C> {
    let mut arena = ScriptedArena::new(clock);
    for craft in pool {
        let lifetime = rng.gen_range(30.0..240.0);
        let script = CraftScript {
            failed_spawns: if rng.gen_bool(0.1) { 1 } else { 0 },
            activates: rng.gen_bool(0.95),
            lifetime: Some(lifetime),
            ammo_for: rng.gen_bool(0.3).then(|| rng.gen_range(10.0..lifetime)),
            score: LifeScore {
                hits: rng.gen_range(0..40),
                damage: rng.gen_range(0.0..500.0),
                kills: rng.gen_range(0..3),
            },
        };
        arena.script(craft, script);
    }
    arena
}

// ============================================================================
// Stopping
// ============================================================================

/// Marker file whose appearance asks a running tournament to stop.
pub fn stop_marker(state_path: &Path) -> PathBuf {
    let mut name = state_path.as_os_str().to_owned();
    name.push(".stop");
    PathBuf::from(name)
}

/// Cancel `cancel` on ctrl-c or once `marker` appears.
pub fn spawn_stop_watch(marker: Option<PathBuf>, cancel: CancelToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut poll = tokio::time::interval(Duration::from_millis(250));
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                result = tokio::signal::ctrl_c() => {
                    if result.is_ok() {
                        tracing::info!("Interrupted; stopping after the current step");
                        cancel.cancel();
                    }
                    return;
                }
                _ = poll.tick() => {
                    let Some(marker) = marker.as_deref() else { continue };
                    if marker.exists() {
                        tracing::info!("Stop requested through {}", marker.display());
                        if let Err(err) = std::fs::remove_file(marker) {
                            tracing::warn!("Failed to remove stop marker: {}", err);
                        }
                        cancel.cancel();
                        return;
                    }
                }
            }
        }
    })
}
