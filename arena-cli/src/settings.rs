//! Settings file shared by every command

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use arena_tournament::{ContinuousConfig, GenerateOptions, RunnerConfig};

/// Everything a `--settings` JSON file may set. Missing sections use defaults.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub generate: GenerateOptions,
    pub runner: RunnerConfig,
    pub continuous: ContinuousConfig,
}

impl Settings {
    /// Read `path`, or defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse settings file {}", path.display()))
    }
}
