//! Integration tests for the tournament scheduler
//!
//! Tests the full lifecycle: discovery, generation, a partial run, a crash and
//! resuming from the saved state.

use std::fs;
use std::path::Path;

use arena_core::{SpawnFailureReason, SpawnSettings};
use arena_tournament::fakes::{ScriptedEngine, ScriptedSpawner, VirtualClock};
use arena_tournament::{
    backup_path, backup_unfinished, CancelToken, GenerateOptions, HeatSize, RunOutcome,
    RunnerConfig, TeamSource, TournamentRunner, TournamentState, TournamentStyle,
    TournamentType,
};

// ============================================================================
// TEST FIXTURES
// ============================================================================

fn write_craft(folder: &Path, names: &[&str]) {
    fs::create_dir_all(folder).unwrap();
    for name in names {
        fs::write(folder.join(format!("{}.craft", name)), "ship").unwrap();
    }
}

fn runner_for(
    path: &Path,
    spawner: ScriptedSpawner,
) -> TournamentRunner<ScriptedSpawner, ScriptedEngine<VirtualClock>, VirtualClock> {
    let clock = VirtualClock::new();
    let engine = ScriptedEngine::new(clock.clone(), 60.0);
    TournamentRunner::resume(path, RunnerConfig::default(), spawner, engine, clock).unwrap()
}

// ============================================================================
// LIFECYCLE
// ============================================================================

#[tokio::test]
async fn test_crash_and_resume_runs_each_heat_once() {
    let temp = tempfile::tempdir().unwrap();
    let craft = temp.path().join("craft");
    write_craft(&craft, &["a", "b", "c", "d", "e", "f", "g", "h"]);
    let path = temp.path().join("tournament.state");

    let options = GenerateOptions::free_for_all(2, HeatSize::Fixed(4)).with_seed(11);
    let state = TournamentState::generate(&craft, "arena", &options, &mut options.rng()).unwrap();
    assert_eq!(state.total_heats(), 4);
    state.save(&path).unwrap();

    // Heat 0 succeeds, then every attempt at heat 1 times out.
    let mut results = vec![Ok(())];
    results.extend(std::iter::repeat(Err(SpawnFailureReason::TimedOut)).take(3));
    let mut first = runner_for(&path, ScriptedSpawner::with_results(results));
    let outcome = first.run().await;
    assert!(matches!(outcome, RunOutcome::Halted { round: 0, heat: 1, .. }));

    let saved = TournamentState::load(&path).unwrap();
    assert_eq!(saved.completed_heats(), 1);
    assert_eq!(saved.current(), Some((0, 1)));

    let backup = backup_unfinished(&path).unwrap().unwrap();
    assert_eq!(backup, backup_path(&path, saved.id()));
    assert!(backup.exists());

    let mut second = runner_for(&path, ScriptedSpawner::new());
    assert_eq!(second.run().await, RunOutcome::Completed);
    assert_eq!(second.spawner().requests().len(), 3);
    assert_eq!(second.spawner().requests()[0], *state.heat(0, 1).unwrap());

    let finished = TournamentState::load(&path).unwrap();
    assert!(finished.is_finished());
    assert!(!backup.exists());
    assert!(backup_unfinished(&path).unwrap().is_none());
}

#[tokio::test]
async fn test_cancelled_run_resumes_at_same_heat() {
    let temp = tempfile::tempdir().unwrap();
    let craft = temp.path().join("craft");
    write_craft(&craft, &["a", "b", "c", "d", "e", "f"]);
    let path = temp.path().join("tournament.state");

    let options = GenerateOptions::free_for_all(1, HeatSize::Fixed(2)).with_seed(3);
    let state = TournamentState::generate(&craft, "arena", &options, &mut options.rng()).unwrap();
    state.save(&path).unwrap();

    let cancel = CancelToken::new();
    let mut first = runner_for(&path, ScriptedSpawner::new()).with_cancel_token(cancel.clone());
    let progress = first.subscribe();
    let stopper = tokio::spawn(async move {
        let mut progress = progress;
        // Stop once the first heat is done.
        loop {
            let remaining = progress.borrow().heats_remaining;
            if remaining < 3 {
                break;
            }
            if progress.changed().await.is_err() {
                return;
            }
        }
        cancel.cancel();
    });
    let outcome = first.run().await;
    stopper.await.unwrap();

    assert_eq!(outcome, RunOutcome::Cancelled);
    let saved = TournamentState::load(&path).unwrap();
    assert!(saved.completed_heats() >= 1);
    assert!(!saved.is_finished());

    let remaining = saved.heats_remaining();
    let mut second = runner_for(&path, ScriptedSpawner::new());
    assert_eq!(second.run().await, RunOutcome::Completed);
    assert_eq!(second.spawner().requests().len(), remaining);
}

#[tokio::test]
async fn test_team_tournament_from_folders() {
    let temp = tempfile::tempdir().unwrap();
    let craft = temp.path().join("teams");
    write_craft(&craft.join("red"), &["r1", "r2", "r3"]);
    write_craft(&craft.join("blue"), &["b1", "b2"]);
    write_craft(&craft.join("green"), &["g1", "g2", "g3"]);
    let path = temp.path().join("teams.state");

    let options = GenerateOptions::teams(2, TeamSource::Folders, 2)
        .with_style(TournamentStyle::RoundRobin)
        .with_vessels_per_team(2, true)
        .with_spawn(SpawnSettings::default().with_altitude(50.0))
        .with_seed(9);
    let state = TournamentState::generate(&craft, "arena", &options, &mut options.rng()).unwrap();
    assert_eq!(state.header().tournament_type, TournamentType::Teams);
    assert_eq!(state.heats_per_round(), 3);
    for (_, _, spec) in state.heats() {
        assert!(spec.is_team_specific());
        assert_eq!(spec.craft.len(), 4);
        assert_eq!(spec.altitude, 50.0);
    }
    state.save(&path).unwrap();

    let mut runner = runner_for(&path, ScriptedSpawner::new());
    assert_eq!(runner.run().await, RunOutcome::Completed);
    assert_eq!(runner.spawner().requests().len(), 6);
}
