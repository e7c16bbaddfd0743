//! Arena Tournament - heat scheduling for vessel competitions
//!
//! This crate provides tournament infrastructure:
//! - Heat generation (free-for-all and team formats, randomised or round-robin)
//! - Tournament state persistence with crash-safe resume
//! - The heat runner with spawn retries, delays and time skips
//! - Continuous spawning with lives, respawns and score tracking
//!
//! ## Architecture (4-layer granularity)
//!
//! - Level 1: TournamentRunner::run, run_continuous (orchestration)
//! - Level 2: TournamentState::generate, free_for_all_rounds, team_rounds (phases)
//! - Level 3: ContinuousSpawner::step, TeamRotation::select, heat sizing (steps)
//! - Level 4: collaborator traits, status log, cancellation, configuration

pub mod config;
pub mod continuous;
pub mod error;
pub mod fakes;
pub mod partition;
pub mod runner;
pub mod services;
pub mod state;

pub use config::{
    AutoSizeBand, ContinuousConfig, GenerateOptions, HeatSize, RunnerConfig, TeamSource,
    TournamentStyle, MAX_HEAT_ATTEMPTS,
};
pub use continuous::{
    optimise_slots, run_continuous, ArenaSnapshot, ContinuousOutcome, ContinuousScoreRecord,
    ContinuousSpawner, CraftObservation, Cycle, LifeScore, Removal, RemovalReason, SpawnOrder,
    SpawnSlot,
};
pub use error::{GenerateError, StateError};
pub use partition::{
    auto_heat_sizes, free_for_all_rounds, heat_sizes, optimise_heat_size, team_heat_sizes,
    team_rounds, Schedule, TeamRotation, MAX_ROUND_ROBIN_HEATS,
};
pub use runner::{HeatFailure, Progress, RunOutcome, RunnerStatus, TournamentRunner};
pub use services::{Arena, CancelToken, MatchEngine, SimClock, SpawnService, StatusLog, TokioClock};
pub use state::{
    backup_path, backup_unfinished, new_tournament_id, remove_backup, TournamentHeader,
    TournamentState, TournamentType, UNFINISHED_DIR,
};
