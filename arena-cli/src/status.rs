//! Status and stop commands - inspect or halt a saved tournament

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use arena_tournament::{Progress, RunnerStatus, TournamentState};

use crate::sim::stop_marker;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Output progress as JSON
    #[arg(long)]
    pub json: bool,

    /// List every round's completed heats
    #[arg(long)]
    pub rounds: bool,
}

pub fn run(args: StatusArgs, state_path: &Path) -> Result<()> {
    let state = TournamentState::load(state_path)
        .with_context(|| format!("No tournament at {}", state_path.display()))?;
    let status = if state.is_finished() {
        RunnerStatus::Completed
    } else {
        RunnerStatus::Stopped
    };
    let progress = Progress::of(&state, status);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&progress)?);
        return Ok(());
    }

    let header = state.header();
    println!("Tournament:      {} ({})", progress.tournament_id, header.savegame);
    println!("Status:          {}", progress.status);
    println!(
        "Heats:           {} of {} run",
        state.completed_heats(),
        state.total_heats()
    );
    match (progress.current_round, progress.current_heat) {
        (Some(round), Some(heat)) => println!("Next:            heat {} of round {}", heat, round),
        _ => println!("Next:            nothing, all rounds have been run"),
    }
    if stop_marker(state_path).exists() {
        println!("A stop has been requested.");
    }
    if args.rounds {
        for round in state.round_indices() {
            let heats = state.heat_indices(round);
            let done = heats.iter().filter(|&&h| state.is_complete(round, h)).count();
            println!("  Round {:>3}: {}/{} heats", round, done, heats.len());
        }
    }
    Ok(())
}

/// Ask a running tournament to stop after its current step.
pub fn stop(state_path: &Path) -> Result<()> {
    if !state_path.exists() {
        anyhow::bail!("No tournament at {}", state_path.display());
    }
    let marker = stop_marker(state_path);
    std::fs::write(&marker, b"stop")
        .with_context(|| format!("Failed to write stop marker {}", marker.display()))?;
    println!("Stop requested for {}", state_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_core::CraftPool;
    use arena_tournament::{GenerateOptions, HeatSize};

    #[test]
    fn test_stop_requires_a_tournament() {
        let temp = tempfile::tempdir().unwrap();
        let state_path = temp.path().join("cup.state");
        assert!(stop(&state_path).is_err());
        assert!(run(StatusArgs { json: true, rounds: false }, &state_path).is_err());

        let pool = CraftPool::new(vec!["a".into(), "b".into()]);
        let options = GenerateOptions::free_for_all(1, HeatSize::Unlimited).with_seed(1);
        TournamentState::from_pool(&pool, "test", &options, &mut options.rng())
            .unwrap()
            .save(&state_path)
            .unwrap();

        stop(&state_path).unwrap();
        assert!(stop_marker(&state_path).exists());
        run(StatusArgs { json: false, rounds: true }, &state_path).unwrap();
    }
}
