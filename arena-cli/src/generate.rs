//! Generate command - build a tournament from a craft folder and save it
//!
//! ## Architecture (4-layer granularity)
//!
//! - Level 1: run() - orchestration
//! - Level 2: generate_tournament()
//! - Level 3: GenerateArgs::options(), backup_previous()
//! - Level 4: argument parsers, summary formatting

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use arena_tournament::{
    backup_unfinished, GenerateOptions, HeatSize, StatusLog, TeamSource, TournamentState,
    TournamentStyle, TournamentType,
};

use crate::settings::Settings;

// ============================================================================
// COMMAND ARGUMENTS (Level 4 - Configuration)
// ============================================================================

#[derive(Args, Clone, Debug)]
pub struct GenerateArgs {
    /// Folder holding the .craft files (one sub-folder per team for --teams folders)
    #[arg(long, value_name = "DIR", default_value = "AutoSpawn")]
    pub folder: PathBuf,

    /// Savegame the tournament belongs to
    #[arg(long, default_value = "default")]
    pub savegame: String,

    /// Number of rounds
    #[arg(long)]
    pub rounds: Option<usize>,

    /// Craft per heat: a number, "auto" or "unlimited"
    #[arg(long, value_parser = parse_heat_size)]
    pub heat_size: Option<HeatSize>,

    /// Run every possible line-up each round instead of random heats
    #[arg(long)]
    pub round_robin: bool,

    /// Team tournament: "folders" or a number of random teams
    #[arg(long, value_parser = parse_team_source)]
    pub teams: Option<TeamSource>,

    /// Teams per heat (team tournaments)
    #[arg(long)]
    pub teams_per_heat: Option<usize>,

    /// Craft per team per heat (0 = whole team)
    #[arg(long)]
    pub vessels_per_team: Option<usize>,

    /// Repeat craft of short teams to fill --vessels-per-team
    #[arg(long)]
    pub full_teams: bool,

    /// Random seed for heat assignment
    #[arg(long)]
    pub seed: Option<u64>,
}

impl GenerateArgs {
    /// Settings-file options with command-line overrides applied.
    pub fn options(&self, base: &GenerateOptions) -> GenerateOptions {
        let mut options = base.clone();
        if let Some(rounds) = self.rounds {
            options.rounds = rounds;
        }
        if let Some(heat_size) = self.heat_size {
            options.heat_size = heat_size;
        }
        if self.round_robin {
            options.style = TournamentStyle::RoundRobin;
        }
        if let Some(source) = self.teams {
            options.team_source = source;
        }
        if let Some(per_heat) = self.teams_per_heat {
            options.teams_per_heat = per_heat;
        }
        if let Some(vessels) = self.vessels_per_team {
            options.vessels_per_team = vessels;
        }
        if self.full_teams {
            options.full_teams = true;
        }
        if self.seed.is_some() {
            options.seed = self.seed;
        }
        options
    }
}

fn parse_heat_size(value: &str) -> Result<HeatSize, String> {
    match value.to_ascii_lowercase().as_str() {
        "auto" => Ok(HeatSize::Auto),
        "unlimited" => Ok(HeatSize::Unlimited),
        other => other
            .parse()
            .map(HeatSize::Fixed)
            .map_err(|_| format!("expected a number, \"auto\" or \"unlimited\", got {:?}", value)),
    }
}

fn parse_team_source(value: &str) -> Result<TeamSource, String> {
    match value.to_ascii_lowercase().as_str() {
        "folders" => Ok(TeamSource::Folders),
        "none" | "ffa" => Ok(TeamSource::FreeForAll),
        other => other
            .parse()
            .map(TeamSource::Random)
            .map_err(|_| format!("expected \"folders\" or a team count, got {:?}", value)),
    }
}

// ============================================================================
// MAIN ENTRY POINT (Level 1 - Orchestration)
// ============================================================================

pub fn run(args: GenerateArgs, state_path: &Path, settings: &Settings) -> Result<()> {
    let status = StatusLog::new();
    let state = generate_tournament(&args, state_path, settings, &status)?;
    print_summary(&state, state_path);
    Ok(())
}

// ============================================================================
// GENERATION (Level 2 - Phases)
// ============================================================================

/// Generate a tournament and save it to `state_path`, backing up any
/// unfinished tournament already there.
pub fn generate_tournament(
    args: &GenerateArgs,
    state_path: &Path,
    settings: &Settings,
    status: &StatusLog,
) -> Result<TournamentState> {
    let options = args.options(&settings.generate);
    let mut rng = options.rng();

    let state = match TournamentState::generate(&args.folder, &args.savegame, &options, &mut rng) {
        Ok(state) => state,
        Err(err) => {
            status.error(err.to_string());
            return Err(err).context("Failed to generate tournament");
        }
    };

    backup_previous(state_path, status);
    state
        .save(state_path)
        .with_context(|| format!("Failed to save tournament to {}", state_path.display()))?;
    status.info(format!(
        "Generated tournament {} with {} rounds of {} heats",
        state.id(),
        state.round_count(),
        state.heats_per_round()
    ));
    Ok(state)
}

fn backup_previous(state_path: &Path, status: &StatusLog) {
    match backup_unfinished(state_path) {
        Ok(Some(backup)) => status.info(format!(
            "Unfinished tournament saved to {}",
            backup.display()
        )),
        Ok(None) => {}
        Err(err) => status.warn(format!("Failed to back up unfinished tournament: {}", err)),
    }
}

// ============================================================================
// OUTPUT (Level 4 - Utilities)
// ============================================================================

fn print_summary(state: &TournamentState, state_path: &Path) {
    let header = state.header();
    println!("\n=== Tournament {} ===", header.tournament_id);
    println!("State file:      {}", state_path.display());
    match header.tournament_type {
        TournamentType::FreeForAll => println!("Format:          free-for-all"),
        TournamentType::Teams => println!(
            "Format:          {} teams, {} per heat",
            header.team_count, header.teams_per_heat
        ),
    }
    println!("Craft:           {}", header.vessel_count);
    println!("Rounds:          {}", state.round_count());
    println!("Heats per round: {}", state.heats_per_round());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(folder: &Path) -> GenerateArgs {
        GenerateArgs {
            folder: folder.to_path_buf(),
            savegame: "test".into(),
            rounds: None,
            heat_size: None,
            round_robin: false,
            teams: None,
            teams_per_heat: None,
            vessels_per_team: None,
            full_teams: false,
            seed: Some(2),
        }
    }

    #[test]
    fn test_parse_heat_size() {
        assert_eq!(parse_heat_size("Auto"), Ok(HeatSize::Auto));
        assert_eq!(parse_heat_size("unlimited"), Ok(HeatSize::Unlimited));
        assert_eq!(parse_heat_size("6"), Ok(HeatSize::Fixed(6)));
        assert!(parse_heat_size("six").is_err());
    }

    #[test]
    fn test_parse_team_source() {
        assert_eq!(parse_team_source("folders"), Ok(TeamSource::Folders));
        assert_eq!(parse_team_source("3"), Ok(TeamSource::Random(3)));
        assert!(parse_team_source("many").is_err());
    }

    #[test]
    fn test_overrides_apply_over_settings() {
        let mut base = GenerateOptions::default();
        base.rounds = 4;
        base.teams_per_heat = 3;
        let mut overrides = args(Path::new("AutoSpawn"));
        overrides.heat_size = Some(HeatSize::Auto);
        overrides.round_robin = true;

        let options = overrides.options(&base);
        assert_eq!(options.rounds, 4);
        assert_eq!(options.teams_per_heat, 3);
        assert_eq!(options.heat_size, HeatSize::Auto);
        assert_eq!(options.style, TournamentStyle::RoundRobin);
        assert_eq!(options.seed, Some(2));
    }

    #[test]
    fn test_generate_reports_empty_folder() {
        let temp = tempfile::tempdir().unwrap();
        let status = StatusLog::new();
        let state_path = temp.path().join("t.state");
        let result = generate_tournament(&args(temp.path()), &state_path, &Settings::default(), &status);

        assert!(result.is_err());
        assert!(status.last().unwrap().starts_with("Found no craft files in"));
        assert!(!state_path.exists());
    }

    #[test]
    fn test_generate_backs_up_started_tournament() {
        let temp = tempfile::tempdir().unwrap();
        for name in ["a", "b", "c", "d"] {
            std::fs::write(temp.path().join(format!("{}.craft", name)), "ship").unwrap();
        }
        let state_path = temp.path().join("t.state");
        let status = StatusLog::new();
        let mut first_args = args(temp.path());
        first_args.heat_size = Some(HeatSize::Fixed(2));

        let mut first =
            generate_tournament(&first_args, &state_path, &Settings::default(), &status).unwrap();
        assert_eq!(first.total_heats(), 2);
        first.mark_complete(0, 0);
        first.save(&state_path).unwrap();

        let mut second_args = args(temp.path());
        second_args.rounds = Some(2);
        generate_tournament(&second_args, &state_path, &Settings::default(), &status).unwrap();

        let backup = arena_tournament::backup_path(&state_path, first.id());
        assert!(backup.exists());
        assert_eq!(TournamentState::load(&backup).unwrap().completed_heats(), 1);
        assert_eq!(TournamentState::load(&state_path).unwrap().round_count(), 2);
    }
}
