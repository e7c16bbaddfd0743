//! Error types for craft discovery and spawn specification handling.

use std::path::PathBuf;

use thiserror::Error;

/// Failures while discovering craft files and teams on disk.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The configured folder is missing.
    #[error("Tournament folder ({}) containing craft files does not exist.", .0.display())]
    MissingFolder(PathBuf),

    /// The folder exists but holds no craft files.
    #[error("Found no craft files in {}.", .0.display())]
    NoCraft(PathBuf),

    /// Not enough craft to deal into the requested number of teams.
    #[error("Insufficient vessels in {} to make {teams} teams.", .folder.display())]
    TooFewCraftForTeams {
        /// Folder that was scanned.
        folder: PathBuf,
        /// Requested team count.
        teams: usize,
    },

    /// Reading the folder failed.
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        /// Path being read.
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures decoding the delimited team list stored in tournament state files.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TeamCodecError {
    /// A team did not start with `[`.
    #[error("expected '[' at offset {0}")]
    ExpectedOpen(usize),

    /// A team was never closed.
    #[error("unterminated team starting at offset {0}")]
    Unterminated(usize),

    /// Something other than `,` followed a closed team.
    #[error("expected ',' between teams at offset {0}")]
    ExpectedSeparator(usize),

    /// A backslash was the final character.
    #[error("dangling escape at end of input")]
    DanglingEscape,
}
