//! Continuous command - keep the arena full until lives run out
//!
//! ## Architecture (4-layer granularity)
//!
//! - Level 1: run() - orchestration
//! - Level 2: session()
//! - Level 3: ContinuousArgs::config()
//! - Level 4: score output

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use arena_core::CraftPool;
use arena_tournament::fakes::VirtualClock;
use arena_tournament::{
    run_continuous, CancelToken, ContinuousConfig, ContinuousScoreRecord, ContinuousSpawner,
    SimClock, StatusLog, TokioClock,
};

use crate::run::SimArgs;
use crate::settings::Settings;
use crate::sim::{random_arena, spawn_stop_watch};

// ============================================================================
// COMMAND ARGUMENTS (Level 4 - Configuration)
// ============================================================================

#[derive(Args, Debug)]
pub struct ContinuousArgs {
    /// Folder holding the .craft files
    #[arg(long, value_name = "DIR", default_value = "AutoSpawn")]
    pub folder: PathBuf,

    /// Craft alive at once (0 = every craft)
    #[arg(long)]
    pub concurrent: Option<usize>,

    /// Spawns per craft
    #[arg(long)]
    pub lives: Option<u32>,

    /// Seconds without ammo before a craft is removed
    #[arg(long)]
    pub out_of_ammo_kill_time: Option<f64>,

    /// Spawn altitude in metres (raised to the configured minimum)
    #[arg(long)]
    pub altitude: Option<f64>,

    /// Where to write the per-craft scores
    #[arg(long, value_name = "FILE", default_value = "continuous_scores.json")]
    pub scores: PathBuf,

    #[command(flatten)]
    pub sim: SimArgs,
}

impl ContinuousArgs {
    fn config(&self, base: &ContinuousConfig) -> ContinuousConfig {
        let mut config = base.clone();
        if let Some(concurrent) = self.concurrent {
            config = config.with_concurrent(concurrent);
        }
        if let Some(lives) = self.lives {
            config = config.with_lives(lives);
        }
        if let Some(seconds) = self.out_of_ammo_kill_time {
            config = config.with_out_of_ammo_kill_time(seconds);
        }
        config
    }
}

// ============================================================================
// MAIN ENTRY POINT (Level 1 - Orchestration)
// ============================================================================

pub async fn run(args: ContinuousArgs, settings: &Settings) -> Result<()> {
    let config = args.config(&settings.continuous);
    if config.lives.is_none() && !args.sim.realtime {
        anyhow::bail!("A simulated session needs a life limit; pass --lives or use --realtime");
    }
    let pool = CraftPool::discover(&args.folder)
        .with_context(|| format!("Failed to load craft from {}", args.folder.display()))?
        .into_inner();
    let altitude = args.altitude.unwrap_or(settings.generate.spawn.altitude);

    let scores = if args.sim.realtime {
        session(TokioClock::new(), pool, config, altitude, &args.sim).await
    } else {
        session(VirtualClock::new(), pool, config, altitude, &args.sim).await
    };

    write_scores(&args.scores, &scores)?;
    print_scores(&scores);
    println!("\nScores written to {}", args.scores.display());
    Ok(())
}

// ============================================================================
// SESSION (Level 2 - Phases)
// ============================================================================

async fn session<C: SimClock + Clone>(
    clock: C,
    pool: Vec<String>,
    config: ContinuousConfig,
    altitude: f64,
    sim: &SimArgs,
) -> BTreeMap<String, ContinuousScoreRecord> {
    let mut rng = sim.rng();
    let mut arena = random_arena(clock.clone(), &pool, &mut rng);
    let cycle_interval = config.cycle_interval;
    let mut spawner = ContinuousSpawner::new(pool, config, altitude);
    let status = StatusLog::new();
    let cancel = CancelToken::new();

    let watcher = spawn_stop_watch(None, cancel.clone());
    let outcome = run_continuous(&mut spawner, &mut arena, &clock, cycle_interval, &status, &cancel).await;
    watcher.abort();

    if outcome.cancelled {
        println!("Session stopped early.");
    }
    outcome.scores
}

// ============================================================================
// OUTPUT (Level 4 - Utilities)
// ============================================================================

fn write_scores(path: &Path, scores: &BTreeMap<String, ContinuousScoreRecord>) -> Result<()> {
    let json = serde_json::to_string_pretty(scores)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write scores to {}", path.display()))
}

fn print_scores(scores: &BTreeMap<String, ContinuousScoreRecord>) {
    let mut ranked: Vec<_> = scores.iter().collect();
    ranked.sort_by(|a, b| {
        b.1.cumulative_kills
            .cmp(&a.1.cumulative_kills)
            .then(b.1.cumulative_damage.total_cmp(&a.1.cumulative_damage))
    });

    println!("\n=== Continuous Session ===");
    println!("{:<32} {:>6} {:>6} {:>6} {:>10} {:>6}", "Craft", "Spawns", "Deaths", "Hits", "Damage", "Kills");
    for (craft, record) in ranked {
        println!(
            "{:<32} {:>6} {:>6} {:>6} {:>10.1} {:>6}",
            craft,
            record.spawn_count,
            record.deaths,
            record.cumulative_hits,
            record.cumulative_damage,
            record.cumulative_kills
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(folder: &Path, scores: &Path, lives: Option<u32>) -> ContinuousArgs {
        ContinuousArgs {
            folder: folder.to_path_buf(),
            concurrent: Some(3),
            lives,
            out_of_ammo_kill_time: Some(20.0),
            altitude: None,
            scores: scores.to_path_buf(),
            sim: SimArgs {
                realtime: false,
                failure_rate: 0.0,
                match_seconds: 60.0,
                sim_seed: Some(12),
            },
        }
    }

    #[tokio::test]
    async fn test_simulated_session_writes_scores() {
        let temp = tempfile::tempdir().unwrap();
        for name in ["a", "b", "c", "d", "e"] {
            std::fs::write(temp.path().join(format!("{}.craft", name)), "ship").unwrap();
        }
        let scores = temp.path().join("scores.json");

        run(args(temp.path(), &scores, Some(2)), &Settings::default()).await.unwrap();

        let written: BTreeMap<String, ContinuousScoreRecord> =
            serde_json::from_str(&std::fs::read_to_string(&scores).unwrap()).unwrap();
        assert_eq!(written.len(), 5);
        assert!(written.values().all(|record| record.deaths <= 2));
    }

    #[tokio::test]
    async fn test_simulated_session_needs_lives() {
        let temp = tempfile::tempdir().unwrap();
        let scores = temp.path().join("scores.json");
        assert!(run(args(temp.path(), &scores, None), &Settings::default()).await.is_err());
        assert!(!scores.exists());
    }
}
