//! Run and resume commands - drive a tournament against the simulated arena
//!
//! ## Architecture (4-layer granularity)
//!
//! - Level 1: run(), resume() - orchestration
//! - Level 2: execute(), drive()
//! - Level 3: load_resumable()
//! - Level 4: outcome reporting

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use arena_tournament::fakes::{ScriptedEngine, VirtualClock};
use arena_tournament::{
    CancelToken, RunOutcome, RunnerConfig, SimClock, StatusLog, TokioClock, TournamentRunner,
    TournamentState,
};

use crate::generate::{generate_tournament, GenerateArgs};
use crate::settings::Settings;
use crate::sim::{spawn_stop_watch, stop_marker, RandomSpawner};

// ============================================================================
// COMMAND ARGUMENTS (Level 4 - Configuration)
// ============================================================================

/// How the simulated arena behaves.
#[derive(Args, Clone, Debug)]
pub struct SimArgs {
    /// Wait in real time instead of skipping through simulated time
    #[arg(long)]
    pub realtime: bool,

    /// Chance that a simulated spawn fails (0.0-1.0)
    #[arg(long, default_value = "0.05")]
    pub failure_rate: f64,

    /// Length of a simulated match in seconds
    #[arg(long, default_value = "120")]
    pub match_seconds: f64,

    /// Seed for the simulated arena
    #[arg(long)]
    pub sim_seed: Option<u64>,
}

impl SimArgs {
    pub fn rng(&self) -> ChaCha8Rng {
        match self.sim_seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        }
    }
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub generate: GenerateArgs,

    #[command(flatten)]
    pub sim: SimArgs,
}

#[derive(Args, Debug)]
pub struct ResumeArgs {
    /// Generate a fresh tournament when there is nothing to resume
    #[arg(long)]
    pub generate_if_missing: bool,

    #[command(flatten)]
    pub generate: GenerateArgs,

    #[command(flatten)]
    pub sim: SimArgs,
}

// ============================================================================
// MAIN ENTRY POINTS (Level 1 - Orchestration)
// ============================================================================

/// Generate a new tournament and run it.
pub async fn run(args: RunArgs, state_path: &Path, settings: &Settings) -> Result<()> {
    let status = StatusLog::new();
    let state = generate_tournament(&args.generate, state_path, settings, &status)?;
    execute(state, state_path, &settings.runner, &args.sim, status).await
}

/// Continue the tournament saved at `state_path`.
pub async fn resume(args: ResumeArgs, state_path: &Path, settings: &Settings) -> Result<()> {
    let status = StatusLog::new();
    let state = match load_resumable(state_path) {
        Ok(state) => state,
        Err(err) if args.generate_if_missing => {
            status.info(format!("{:#}; generating a new tournament", err));
            generate_tournament(&args.generate, state_path, settings, &status)?
        }
        Err(err) => return Err(err),
    };
    execute(state, state_path, &settings.runner, &args.sim, status).await
}

// ============================================================================
// EXECUTION (Level 2 - Phases)
// ============================================================================

async fn execute(
    state: TournamentState,
    state_path: &Path,
    config: &RunnerConfig,
    sim: &SimArgs,
    status: StatusLog,
) -> Result<()> {
    if sim.realtime {
        drive(TokioClock::new(), state, state_path, config, sim, status).await
    } else {
        drive(VirtualClock::new(), state, state_path, config, sim, status).await
    }
}

async fn drive<C: SimClock + Clone>(
    clock: C,
    state: TournamentState,
    state_path: &Path,
    config: &RunnerConfig,
    sim: &SimArgs,
    status: StatusLog,
) -> Result<()> {
    let marker = stop_marker(state_path);
    if marker.exists() {
        std::fs::remove_file(&marker)
            .with_context(|| format!("Failed to clear stale stop marker {}", marker.display()))?;
    }

    let spawner = RandomSpawner::new(clock.clone(), sim.rng(), sim.failure_rate);
    let engine = ScriptedEngine::new(clock.clone(), sim.match_seconds);
    let cancel = CancelToken::new();
    let mut runner = TournamentRunner::new(state, state_path, config.clone(), spawner, engine, clock)
        .with_status_log(status)
        .with_cancel_token(cancel.clone());

    let watcher = spawn_stop_watch(Some(marker), cancel);
    let outcome = runner.run().await;
    watcher.abort();

    report(&outcome, runner.state(), state_path)
}

// ============================================================================
// LOADING (Level 3 - Steps)
// ============================================================================

/// The tournament at `state_path`, if it still has heats to run.
fn load_resumable(state_path: &Path) -> Result<TournamentState> {
    let state = TournamentState::load(state_path)
        .with_context(|| format!("No resumable tournament at {}", state_path.display()))?;
    if state.is_finished() {
        anyhow::bail!("Tournament {} has already been run", state.id());
    }
    Ok(state)
}

// ============================================================================
// OUTPUT (Level 4 - Utilities)
// ============================================================================

fn report(outcome: &RunOutcome, state: &TournamentState, state_path: &Path) -> Result<()> {
    match outcome {
        RunOutcome::Completed => {
            println!("\n=== Tournament {} complete ===", state.id());
            println!("Heats run: {}", state.completed_heats());
            Ok(())
        }
        RunOutcome::Cancelled => {
            println!(
                "\nTournament {} stopped with {} heats remaining.",
                state.id(),
                state.heats_remaining()
            );
            println!("Resume with: arena resume --state {}", state_path.display());
            Ok(())
        }
        RunOutcome::Halted {
            round,
            heat,
            failure,
        } => anyhow::bail!(
            "Tournament {} halted at heat {} of round {}: {}",
            state.id(),
            heat,
            round,
            failure
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sim() -> SimArgs {
        SimArgs {
            realtime: false,
            failure_rate: 0.0,
            match_seconds: 30.0,
            sim_seed: Some(1),
        }
    }

    fn craft_folder(dir: &Path, count: usize) -> std::path::PathBuf {
        let folder = dir.join("AutoSpawn");
        std::fs::create_dir_all(&folder).unwrap();
        for i in 0..count {
            std::fs::write(folder.join(format!("{}.craft", i)), "ship").unwrap();
        }
        folder
    }

    fn generate_args(folder: &Path) -> GenerateArgs {
        GenerateArgs {
            folder: folder.to_path_buf(),
            savegame: "test".into(),
            rounds: Some(2),
            heat_size: Some(arena_tournament::HeatSize::Fixed(3)),
            round_robin: false,
            teams: None,
            teams_per_heat: None,
            vessels_per_team: None,
            full_teams: false,
            seed: Some(8),
        }
    }

    #[tokio::test]
    async fn test_run_completes_tournament() {
        let temp = tempfile::tempdir().unwrap();
        let folder = craft_folder(temp.path(), 6);
        let state_path = temp.path().join("cup.state");
        let args = RunArgs {
            generate: generate_args(&folder),
            sim: sim(),
        };

        run(args, &state_path, &Settings::default()).await.unwrap();
        let state = TournamentState::load(&state_path).unwrap();
        assert!(state.is_finished());
        assert_eq!(state.total_heats(), 4);
    }

    #[tokio::test]
    async fn test_resume_without_state() {
        let temp = tempfile::tempdir().unwrap();
        let folder = craft_folder(temp.path(), 4);
        let state_path = temp.path().join("cup.state");

        let args = ResumeArgs {
            generate_if_missing: false,
            generate: generate_args(&folder),
            sim: sim(),
        };
        assert!(resume(args, &state_path, &Settings::default()).await.is_err());

        let args = ResumeArgs {
            generate_if_missing: true,
            generate: generate_args(&folder),
            sim: sim(),
        };
        resume(args, &state_path, &Settings::default()).await.unwrap();
        assert!(TournamentState::load(&state_path).unwrap().is_finished());
    }

    #[tokio::test]
    async fn test_halted_run_is_an_error() {
        let temp = tempfile::tempdir().unwrap();
        let folder = craft_folder(temp.path(), 4);
        let state_path = temp.path().join("cup.state");
        let mut broken = sim();
        broken.failure_rate = 1.0;
        let args = RunArgs {
            generate: generate_args(&folder),
            sim: broken,
        };

        let err = run(args, &state_path, &Settings::default()).await.unwrap_err();
        assert!(err.to_string().contains("halted at heat 0 of round 0"));
        assert_eq!(TournamentState::load(&state_path).unwrap().completed_heats(), 0);
    }
}
