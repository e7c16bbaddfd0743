//! Tournament execution - sequencing heats with retries and checkpoints
//!
//! Level 1 - Orchestration (run) and Level 2 - Phases (run_heat, play_match)
//!
//! States: Stopped -> Running <-> Waiting -> Completed. Any state returns to
//! Stopped on cancel or when a heat exhausts its attempts. A heat is only ever
//! marked complete after its match has finished, and the state file is
//! rewritten straight after.

use std::fmt;
use std::path::{Path, PathBuf};

use arena_core::SpawnFailureReason;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::config::{RunnerConfig, MAX_HEAT_ATTEMPTS};
use crate::error::StateError;
use crate::services::{CancelToken, MatchEngine, SimClock, SpawnService, StatusLog};
use crate::state::{remove_backup, TournamentState};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunnerStatus {
    Stopped,
    Running,
    Waiting,
    Completed,
}

impl fmt::Display for RunnerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunnerStatus::Stopped => "stopped",
            RunnerStatus::Running => "running",
            RunnerStatus::Waiting => "waiting",
            RunnerStatus::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// Why one attempt at a heat failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeatFailure {
    Spawn(SpawnFailureReason),
    /// Spawned fine but the match never started.
    EngineStart,
}

impl fmt::Display for HeatFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeatFailure::Spawn(reason) => write!(f, "spawn failed: {}", reason),
            HeatFailure::EngineStart => f.write_str("competition failed to start"),
        }
    }
}

/// How a call to [`TournamentRunner::run`] ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// A heat failed every attempt; the tournament is stopped at it.
    Halted {
        round: usize,
        heat: usize,
        failure: HeatFailure,
    },
    Cancelled,
}

/// Read-only view of where a tournament stands.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub tournament_id: u32,
    pub status: RunnerStatus,
    pub current_round: Option<usize>,
    pub current_heat: Option<usize>,
    pub heats_remaining: usize,
    pub rounds: usize,
    pub heats_per_round: usize,
}

impl Progress {
    pub fn of(state: &TournamentState, status: RunnerStatus) -> Self {
        let current = state.current();
        Self {
            tournament_id: state.id(),
            status,
            current_round: current.map(|(round, _)| round),
            current_heat: current.map(|(_, heat)| heat),
            heats_remaining: state.heats_remaining(),
            rounds: state.round_count(),
            heats_per_round: state.heats_per_round(),
        }
    }
}

enum HeatResult {
    Completed,
    Failed(HeatFailure),
    Cancelled,
}

enum MatchResult {
    Finished,
    StartFailed,
    Cancelled,
}

/// Runs the heats of one tournament through a spawn service and match engine.
pub struct TournamentRunner<S, M, C> {
    state: TournamentState,
    state_path: PathBuf,
    config: RunnerConfig,
    spawner: S,
    engine: M,
    clock: C,
    status_log: StatusLog,
    cancel: CancelToken,
    status: RunnerStatus,
    progress: watch::Sender<Progress>,
}

impl<S: SpawnService, M: MatchEngine, C: SimClock> TournamentRunner<S, M, C> {
    pub fn new(
        state: TournamentState,
        state_path: impl Into<PathBuf>,
        config: RunnerConfig,
        spawner: S,
        engine: M,
        clock: C,
    ) -> Self {
        let status = if state.is_finished() {
            RunnerStatus::Completed
        } else {
            RunnerStatus::Stopped
        };
        let (progress, _) = watch::channel(Progress::of(&state, status));
        Self {
            state,
            state_path: state_path.into(),
            config,
            spawner,
            engine,
            clock,
            status_log: StatusLog::new(),
            cancel: CancelToken::new(),
            status,
            progress,
        }
    }

    /// Load the tournament saved at `state_path` and prepare to resume it.
    pub fn resume(
        state_path: impl Into<PathBuf>,
        config: RunnerConfig,
        spawner: S,
        engine: M,
        clock: C,
    ) -> Result<Self, StateError> {
        let state_path = state_path.into();
        let state = TournamentState::load(&state_path)?;
        Ok(Self::new(state, state_path, config, spawner, engine, clock))
    }

    pub fn with_status_log(mut self, status_log: StatusLog) -> Self {
        self.status_log = status_log;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that stops [`run`](Self::run) at its next suspension point.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn status_log(&self) -> &StatusLog {
        &self.status_log
    }

    pub fn status(&self) -> RunnerStatus {
        self.status
    }

    pub fn state(&self) -> &TournamentState {
        &self.state
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    pub fn spawner(&self) -> &S {
        &self.spawner
    }

    pub fn engine(&self) -> &M {
        &self.engine
    }

    pub fn progress(&self) -> Progress {
        Progress::of(&self.state, self.status)
    }

    /// Progress updates published on every transition.
    pub fn subscribe(&self) -> watch::Receiver<Progress> {
        self.progress.subscribe()
    }

    pub fn into_state(self) -> TournamentState {
        self.state
    }

    // ========================================================================
    // Level 1 - Orchestration
    // ========================================================================

    /// Run every remaining heat, skipping those already complete.
    ///
    /// A cancelled token stays cancelled: reset it (or pass a fresh one with
    /// [`Self::with_cancel_token`]) before running again.
    pub async fn run(&mut self) -> RunOutcome {
        if self.state.is_finished() {
            self.complete();
            return RunOutcome::Completed;
        }
        self.set_status(RunnerStatus::Running);
        self.status_log.info(format!(
            "Running tournament {}: {} heats remaining",
            self.state.id(),
            self.state.heats_remaining()
        ));

        let pending: Vec<(usize, usize)> = self
            .state
            .heats()
            .map(|(round, heat, _)| (round, heat))
            .filter(|&(round, heat)| !self.state.is_complete(round, heat))
            .collect();

        for (index, &(round, heat)) in pending.iter().enumerate() {
            match self.run_heat(round, heat).await {
                HeatResult::Completed => {}
                HeatResult::Failed(failure) => return self.halt(round, heat, failure),
                HeatResult::Cancelled => return self.cancelled().await,
            }

            let next_round = pending.get(index + 1).map(|&(r, _)| r);
            if next_round != Some(round) {
                self.status_log
                    .info(format!("All heats in round {} have been run.", round));
            }
            let pause = match next_round {
                None => continue,
                Some(next) if next == round => self.wait(self.config.delay_between_heats).await,
                Some(_) => self.between_rounds().await,
            };
            if !pause {
                return self.cancelled().await;
            }
        }

        self.complete();
        RunOutcome::Completed
    }

    // ========================================================================
    // Level 2 - Phases
    // ========================================================================

    /// Up to [`MAX_HEAT_ATTEMPTS`] attempts at one heat.
    async fn run_heat(&mut self, round: usize, heat: usize) -> HeatResult {
        let mut allowed = MAX_HEAT_ATTEMPTS;
        let mut attempt = 0;
        let mut last_failure = HeatFailure::EngineStart;

        while attempt < allowed {
            attempt += 1;
            let Some(spec) = self.state.heat(round, heat).cloned() else {
                return HeatResult::Failed(HeatFailure::Spawn(SpawnFailureReason::NoCraft));
            };
            self.status_log.info(format!(
                "Running heat {} of round {} (attempt {} of {})",
                heat, round, attempt, allowed
            ));
            self.publish();

            let Some(spawned) = self.cancel.guard(self.spawner.spawn(&spec)).await else {
                return HeatResult::Cancelled;
            };
            if let Err(reason) = spawned {
                self.status_log.warn(format!(
                    "Failed to spawn heat {} of round {}: {}",
                    heat, round, reason
                ));
                last_failure = HeatFailure::Spawn(reason);
                match reason {
                    SpawnFailureReason::VesselLostParts => self.raise_altitude(round, heat),
                    SpawnFailureReason::NoTerrain => allowed = allowed.min(attempt + 1),
                    _ => {}
                }
                continue;
            }

            match self.play_match().await {
                MatchResult::Finished => {
                    self.finish_heat(round, heat);
                    return HeatResult::Completed;
                }
                MatchResult::Cancelled => return HeatResult::Cancelled,
                MatchResult::StartFailed => {
                    self.status_log.warn(format!(
                        "Competition for heat {} of round {} failed to start",
                        heat, round
                    ));
                    last_failure = HeatFailure::EngineStart;
                }
            }
        }
        HeatResult::Failed(last_failure)
    }

    /// Start the competition and wait for it to end.
    async fn play_match(&mut self) -> MatchResult {
        let duration = self.config.duration_minutes.map(|minutes| minutes * 60.0);
        let Some(started) = self.cancel.guard(self.engine.start(duration)).await else {
            return MatchResult::Cancelled;
        };
        if !started {
            return MatchResult::StartFailed;
        }
        if self.cancel.guard(self.clock.tick()).await.is_none() {
            return MatchResult::Cancelled;
        }
        if !self.engine.is_active() {
            return MatchResult::StartFailed;
        }
        while self.engine.is_active() {
            if self
                .cancel
                .guard(self.clock.sleep(self.config.poll_interval))
                .await
                .is_none()
            {
                return MatchResult::Cancelled;
            }
        }
        MatchResult::Finished
    }

    // ========================================================================
    // Level 3 - Steps
    // ========================================================================

    fn finish_heat(&mut self, round: usize, heat: usize) {
        self.state.mark_complete(round, heat);
        if let Err(err) = self.state.save(&self.state_path) {
            self.status_log
                .warn(format!("Failed to save tournament state: {}", err));
        }
        self.status_log.info(format!(
            "Heat {} of round {} complete; {} heats remaining",
            heat,
            round,
            self.state.heats_remaining()
        ));
        self.publish();
    }

    fn raise_altitude(&mut self, round: usize, heat: usize) {
        let step = self.config.altitude_step;
        let ceiling = self.config.altitude_ceiling;
        if let Some(spec) = self.state.heat_mut(round, heat) {
            if spec.bump_altitude(step, ceiling) {
                let altitude = spec.altitude;
                self.status_log.info(format!(
                    "Raising spawn altitude for heat {} of round {} to {}m",
                    heat, round, altitude
                ));
            }
        }
    }

    /// Pause between heats of one round. False if cancelled.
    async fn wait(&mut self, seconds: f64) -> bool {
        if seconds <= 0.0 {
            return !self.cancel.is_cancelled();
        }
        self.set_status(RunnerStatus::Waiting);
        self.status_log
            .info(format!("Waiting {}s before the next heat", seconds));
        let waited = self.cancel.guard(self.clock.sleep(seconds)).await.is_some();
        if waited {
            self.set_status(RunnerStatus::Running);
        }
        waited
    }

    /// Time skip between rounds, or the usual delay when skipping is off.
    async fn between_rounds(&mut self) -> bool {
        let minutes = self.config.warp_between_rounds;
        if minutes <= 0.0 {
            return self.wait(self.config.delay_between_heats).await;
        }
        self.set_status(RunnerStatus::Waiting);
        self.status_log
            .info(format!("Skipping {} minutes before the next round", minutes));
        let warped = self.cancel.guard(self.clock.warp(minutes * 60.0)).await.is_some();
        if warped {
            self.set_status(RunnerStatus::Running);
        }
        warped
    }

    fn halt(&mut self, round: usize, heat: usize, failure: HeatFailure) -> RunOutcome {
        self.set_status(RunnerStatus::Stopped);
        self.status_log.error(format!(
            "Heat {} of round {} failed ({}); stopping tournament {}. Fix the problem and resume.",
            heat,
            round,
            failure,
            self.state.id()
        ));
        RunOutcome::Halted {
            round,
            heat,
            failure,
        }
    }

    async fn cancelled(&mut self) -> RunOutcome {
        self.engine.stop().await;
        self.set_status(RunnerStatus::Stopped);
        let at = self
            .state
            .current()
            .map(|(round, heat)| format!(" at heat {} of round {}", heat, round))
            .unwrap_or_default();
        self.status_log
            .info(format!("Tournament {} stopped{}", self.state.id(), at));
        RunOutcome::Cancelled
    }

    fn complete(&mut self) {
        self.set_status(RunnerStatus::Completed);
        self.status_log.info(format!(
            "All rounds in tournament {} have been run.",
            self.state.id()
        ));
        match remove_backup(&self.state_path, self.state.id()) {
            Ok(true) => tracing::info!("Removed backup of tournament {}", self.state.id()),
            Ok(false) => {}
            Err(err) => self
                .status_log
                .warn(format!("Failed to remove tournament backup: {}", err)),
        }
    }

    fn set_status(&mut self, status: RunnerStatus) {
        if self.status != status {
            tracing::debug!("Tournament {} {} -> {}", self.state.id(), self.status, status);
        }
        self.status = status;
        self.publish();
    }

    fn publish(&self) {
        self.progress.send_replace(self.progress());
    }
}
