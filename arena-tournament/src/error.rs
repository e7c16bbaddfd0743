//! Error types for tournament generation and persistence.

use std::path::PathBuf;

use arena_core::PoolError;
use thiserror::Error;

/// Reasons a tournament could not be generated.
///
/// No state is produced on any of these; the `Display` text is the operator
/// message.
#[derive(Debug, Error)]
pub enum GenerateError {
    /// Craft discovery failed.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// The pool holds no craft.
    #[error("No craft available to generate a tournament.")]
    EmptyPool,

    /// Team tournaments need at least two teams.
    #[error("Insufficient teams ({found}) to generate a tournament.")]
    TooFewTeams {
        /// Teams actually found.
        found: usize,
    },

    /// A team has no craft to field.
    #[error("Team {index} has no craft.")]
    EmptyTeam {
        /// Index of the empty team.
        index: usize,
    },

    /// A fixed heat size below one.
    #[error("Heat size must be at least 1 (got {0}).")]
    InvalidHeatSize(usize),

    /// Zero rounds requested.
    #[error("A tournament needs at least one round.")]
    NoRounds,

    /// Exhaustive round-robin would produce too many heats.
    #[error("Round-robin over {pool} with {per_heat} per heat needs {heats} heats per round (limit {limit}).")]
    TooManyHeats {
        pool: usize,
        per_heat: usize,
        heats: u64,
        limit: u64,
    },
}

/// Failures saving or loading tournament state.
///
/// A failed load means "no resumable tournament"; a failed save is reported and
/// the in-memory state stays authoritative.
#[derive(Debug, Error)]
pub enum StateError {
    /// Reading or writing the file failed.
    #[error("Failed to access tournament state {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file has no header line.
    #[error("Tournament state {} is empty.", .0.display())]
    Empty(PathBuf),

    /// A line failed to parse.
    #[error("Tournament state {} is corrupt at line {line}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        /// 1-based line number.
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// Encoding a record failed.
    #[error("Failed to encode tournament state: {0}")]
    Encode(#[source] serde_json::Error),
}
