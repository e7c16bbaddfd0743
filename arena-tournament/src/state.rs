//! Tournament state - rounds, heats and completion, persisted line by line
//!
//! Level 1 - generate/save/load and Level 4 - derived counters
//!
//! The state file holds one JSON object per line: a header, then one record
//! per heat. Saving prepares every line before touching the disk and replaces
//! the file atomically.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use arena_core::{CraftPool, SpawnSpec, TeamPool};
use chrono::{TimeZone, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::{GenerateOptions, TeamSource};
use crate::error::{GenerateError, StateError};
use crate::partition::{free_for_all_rounds, team_rounds, Schedule};

/// Folder (next to the state file) holding backups of unfinished tournaments.
pub const UNFINISHED_DIR: &str = "Unfinished Tournaments";

/// Seconds since 2020-01-01T00:00:00Z, saturating into `u32`.
pub fn new_tournament_id() -> u32 {
    let epoch = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).single();
    let seconds = epoch.map_or(0, |epoch| (Utc::now() - epoch).num_seconds());
    u32::try_from(seconds.max(0)).unwrap_or(u32::MAX)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TournamentType {
    #[default]
    FreeForAll,
    Teams,
}

/// First line of a state file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TournamentHeader {
    pub tournament_id: u32,
    /// Save game the tournament was generated in
    pub savegame: String,
    pub vessel_count: usize,
    pub team_count: usize,
    pub teams_per_heat: usize,
    pub vessels_per_team: usize,
    pub full_teams: bool,
    pub tournament_type: TournamentType,
}

/// One heat line of a state file.
#[derive(Serialize, Deserialize)]
struct HeatRecord {
    round: usize,
    heat: usize,
    #[serde(default)]
    completed: bool,
    #[serde(flatten)]
    spec: SpawnSpec,
}

/// The persisted tournament: header, heats by round, and which are done.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TournamentState {
    header: TournamentHeader,
    rounds: BTreeMap<usize, BTreeMap<usize, SpawnSpec>>,
    completed: BTreeMap<usize, BTreeSet<usize>>,
}

impl TournamentState {
    // ========================================================================
    // Generation
    // ========================================================================

    /// Discover craft in `folder` and generate a tournament from them.
    pub fn generate<R: Rng>(
        folder: &Path,
        savegame: &str,
        options: &GenerateOptions,
        rng: &mut R,
    ) -> Result<Self, GenerateError> {
        match options.team_source {
            TeamSource::FreeForAll => {
                let pool = CraftPool::discover(folder)?;
                Self::from_pool(&pool, savegame, options, rng)
            }
            TeamSource::Folders => {
                let teams = TeamPool::from_folders(folder)?;
                Self::from_teams(&teams, savegame, options, rng)
            }
            TeamSource::Random(count) => {
                let pool = CraftPool::discover(folder)?;
                let teams = TeamPool::random_split(&pool, count, folder, rng)?;
                Self::from_teams(&teams, savegame, options, rng)
            }
        }
    }

    /// Free-for-all tournament over an explicit pool.
    pub fn from_pool<R: Rng>(
        pool: &CraftPool,
        savegame: &str,
        options: &GenerateOptions,
        rng: &mut R,
    ) -> Result<Self, GenerateError> {
        let schedule = free_for_all_rounds(pool, options, rng)?;
        let header = TournamentHeader {
            tournament_id: new_tournament_id(),
            savegame: savegame.to_string(),
            vessel_count: pool.len(),
            team_count: 0,
            teams_per_heat: 0,
            vessels_per_team: 0,
            full_teams: false,
            tournament_type: TournamentType::FreeForAll,
        };
        Ok(Self::from_schedule(header, schedule))
    }

    /// Team tournament over explicit teams.
    pub fn from_teams<R: Rng>(
        teams: &TeamPool,
        savegame: &str,
        options: &GenerateOptions,
        rng: &mut R,
    ) -> Result<Self, GenerateError> {
        let schedule = team_rounds(teams, options, rng)?;
        let header = TournamentHeader {
            tournament_id: new_tournament_id(),
            savegame: savegame.to_string(),
            vessel_count: teams.craft_count(),
            team_count: teams.len(),
            teams_per_heat: schedule.teams_per_heat,
            vessels_per_team: schedule.vessels_per_team,
            full_teams: options.full_teams,
            tournament_type: TournamentType::Teams,
        };
        Ok(Self::from_schedule(header, schedule))
    }

    fn from_schedule(header: TournamentHeader, schedule: Schedule) -> Self {
        let rounds = schedule
            .rounds
            .into_iter()
            .enumerate()
            .map(|(r, heats)| (r, heats.into_iter().enumerate().collect()))
            .collect();
        let state = Self {
            header,
            rounds,
            completed: BTreeMap::new(),
        };
        tracing::info!(
            "Generated tournament {} with {} rounds and {} heats",
            state.header.tournament_id,
            state.round_count(),
            state.total_heats()
        );
        state
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Write the whole state, replacing `path` atomically.
    pub fn save(&self, path: &Path) -> Result<(), StateError> {
        let mut contents = serde_json::to_string(&self.header).map_err(StateError::Encode)?;
        contents.push('\n');
        for (&round, heats) in &self.rounds {
            for (&heat, spec) in heats {
                let record = HeatRecord {
                    round,
                    heat,
                    completed: self.is_complete(round, heat),
                    spec: spec.clone(),
                };
                contents.push_str(&serde_json::to_string(&record).map_err(StateError::Encode)?);
                contents.push('\n');
            }
        }
        write_atomic(path, &contents)?;
        tracing::debug!("Saved tournament state to {}", path.display());
        Ok(())
    }

    /// Read a state file. Any unreadable or unparsable line fails the load.
    pub fn load(path: &Path) -> Result<Self, StateError> {
        let contents = fs::read_to_string(path).map_err(|source| StateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let parse_err = |line: usize, source: serde_json::Error| StateError::Parse {
            path: path.to_path_buf(),
            line,
            source,
        };

        let mut lines = contents
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty());
        let (header_index, header_line) = lines
            .next()
            .ok_or_else(|| StateError::Empty(path.to_path_buf()))?;
        let header: TournamentHeader =
            serde_json::from_str(header_line).map_err(|e| parse_err(header_index + 1, e))?;

        let mut state = Self {
            header,
            ..Default::default()
        };
        for (index, line) in lines {
            let record: HeatRecord = serde_json::from_str(line).map_err(|e| parse_err(index + 1, e))?;
            if record.completed {
                state.mark_complete(record.round, record.heat);
            }
            state
                .rounds
                .entry(record.round)
                .or_default()
                .insert(record.heat, record.spec);
        }
        Ok(state)
    }

    // ========================================================================
    // Completion
    // ========================================================================

    pub fn mark_complete(&mut self, round: usize, heat: usize) {
        self.completed.entry(round).or_default().insert(heat);
    }

    pub fn is_complete(&self, round: usize, heat: usize) -> bool {
        self.completed
            .get(&round)
            .map_or(false, |heats| heats.contains(&heat))
    }

    // ========================================================================
    // Level 4 - Derived counters
    // ========================================================================

    pub fn header(&self) -> &TournamentHeader {
        &self.header
    }

    pub fn id(&self) -> u32 {
        self.header.tournament_id
    }

    pub fn round_count(&self) -> usize {
        self.rounds.len()
    }

    /// Heats in the largest round.
    pub fn heats_per_round(&self) -> usize {
        self.rounds.values().map(BTreeMap::len).max().unwrap_or(0)
    }

    pub fn total_heats(&self) -> usize {
        self.rounds.values().map(BTreeMap::len).sum()
    }

    /// Completed heats that belong to the schedule.
    pub fn completed_heats(&self) -> usize {
        self.heats().filter(|&(r, h, _)| self.is_complete(r, h)).count()
    }

    pub fn heats_remaining(&self) -> usize {
        self.total_heats() - self.completed_heats()
    }

    pub fn is_finished(&self) -> bool {
        self.heats_remaining() == 0
    }

    /// True once any heat has completed.
    pub fn has_started(&self) -> bool {
        self.completed_heats() > 0
    }

    /// First heat not yet complete, in round-then-heat order.
    pub fn current(&self) -> Option<(usize, usize)> {
        self.heats()
            .map(|(r, h, _)| (r, h))
            .find(|&(r, h)| !self.is_complete(r, h))
    }

    /// Every heat in round-then-heat order.
    pub fn heats(&self) -> impl Iterator<Item = (usize, usize, &SpawnSpec)> + '_ {
        self.rounds
            .iter()
            .flat_map(|(&r, heats)| heats.iter().map(move |(&h, spec)| (r, h, spec)))
    }

    /// Round indices in order.
    pub fn round_indices(&self) -> Vec<usize> {
        self.rounds.keys().copied().collect()
    }

    /// Heat indices of `round` in order.
    pub fn heat_indices(&self, round: usize) -> Vec<usize> {
        self.rounds
            .get(&round)
            .map(|heats| heats.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn heat(&self, round: usize, heat: usize) -> Option<&SpawnSpec> {
        self.rounds.get(&round)?.get(&heat)
    }

    pub fn heat_mut(&mut self, round: usize, heat: usize) -> Option<&mut SpawnSpec> {
        self.rounds.get_mut(&round)?.get_mut(&heat)
    }
}

// ============================================================================
// Backups of unfinished tournaments
// ============================================================================

/// Where the backup of tournament `id` saved at `state_path` lives.
pub fn backup_path(state_path: &Path, id: u32) -> PathBuf {
    let dir = state_path.parent().unwrap_or_else(|| Path::new("."));
    let stem = state_path
        .file_stem()
        .map_or_else(|| "tournament".to_string(), |s| s.to_string_lossy().into_owned());
    dir.join(UNFINISHED_DIR).join(format!("{}.state-{}", stem, id))
}

/// Copy a started but unfinished tournament at `state_path` aside.
///
/// Returns the backup path when a copy was made. A missing or unreadable state
/// file is not an error; there is nothing to keep.
pub fn backup_unfinished(state_path: &Path) -> Result<Option<PathBuf>, StateError> {
    let Ok(existing) = TournamentState::load(state_path) else {
        return Ok(None);
    };
    if !existing.has_started() || existing.is_finished() {
        return Ok(None);
    }
    let backup = backup_path(state_path, existing.id());
    existing.save(&backup)?;
    tracing::info!(
        "Backed up unfinished tournament {} to {}",
        existing.id(),
        backup.display()
    );
    Ok(Some(backup))
}

/// Delete the backup of tournament `id`, if any.
pub fn remove_backup(state_path: &Path, id: u32) -> Result<bool, StateError> {
    let backup = backup_path(state_path, id);
    if !backup.exists() {
        return Ok(false);
    }
    fs::remove_file(&backup).map_err(|source| StateError::Io {
        path: backup.clone(),
        source,
    })?;
    Ok(true)
}

fn write_atomic(path: &Path, contents: &str) -> Result<(), StateError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| StateError::Io { path, source }
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);
    fs::write(&tmp_path, contents).map_err(io_err(&tmp_path))?;
    fs::rename(&tmp_path, path).map_err(io_err(path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HeatSize;
    use arena_core::SpawnSettings;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn sample_state() -> TournamentState {
        let pool = CraftPool::new((0..7).map(|i| format!("Ships/craft, {}.craft", i)).collect());
        let options = GenerateOptions::free_for_all(2, HeatSize::Fixed(3)).with_seed(11);
        TournamentState::from_pool(&pool, "career", &options, &mut options.rng()).unwrap()
    }

    fn team_state() -> TournamentState {
        let teams = TeamPool::new(vec![
            vec!["red [1].craft".into(), "red\\2.craft".into()],
            vec!["blue.craft".into()],
            vec!["green.craft".into()],
        ]);
        let options = GenerateOptions::teams(1, TeamSource::Folders, 2)
            .with_vessels_per_team(2, true)
            .with_spawn(SpawnSettings::default().with_location(2, 10.5, -20.25));
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        TournamentState::from_teams(&teams, "sandbox", &options, &mut rng).unwrap()
    }

    #[test]
    fn test_tournament_id_is_recent() {
        // 2024-01-01 is 126_230_400 seconds after 2020-01-01.
        assert!(new_tournament_id() > 126_230_400);
    }

    #[test]
    fn test_counters_and_current() {
        let mut state = sample_state();
        assert_eq!(state.round_count(), 2);
        assert_eq!(state.total_heats(), 6);
        assert_eq!(state.heats_per_round(), 3);
        assert_eq!(state.current(), Some((0, 0)));
        assert!(!state.has_started());

        state.mark_complete(0, 0);
        state.mark_complete(0, 2);
        assert_eq!(state.heats_remaining(), 4);
        assert_eq!(state.current(), Some((0, 1)));

        state.mark_complete(0, 1);
        assert_eq!(state.current(), Some((1, 0)));

        // Completion outside the schedule is ignored by the counters.
        state.mark_complete(7, 7);
        assert_eq!(state.heats_remaining(), 3);
    }

    #[test]
    fn test_save_load_round_trip() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("tournament.state");
        let mut state = sample_state();
        state.mark_complete(0, 0);
        state.mark_complete(0, 1);

        state.save(&path).unwrap();
        let loaded = TournamentState::load(&path).unwrap();
        assert_eq!(loaded, state);
        assert_eq!(loaded.current(), Some((0, 2)));
        assert!(!temp.path().join("tournament.state.tmp").exists());
    }

    #[test]
    fn test_team_state_round_trip() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("nested").join("teams.state");
        let state = team_state();
        assert_eq!(state.header().tournament_type, TournamentType::Teams);
        assert_eq!(state.header().team_count, 3);

        state.save(&path).unwrap();
        let loaded = TournamentState::load(&path).unwrap();
        assert_eq!(loaded, state);
        let (_, _, spec) = loaded.heats().next().unwrap();
        assert_eq!(spec.world_index, 2);
        assert!(spec.is_team_specific());
    }

    #[test]
    fn test_load_failures() {
        let temp = tempfile::tempdir().unwrap();
        let missing = temp.path().join("missing.state");
        assert!(matches!(TournamentState::load(&missing), Err(StateError::Io { .. })));

        let empty = temp.path().join("empty.state");
        fs::write(&empty, "\n\n").unwrap();
        assert!(matches!(TournamentState::load(&empty), Err(StateError::Empty(_))));

        let corrupt = temp.path().join("corrupt.state");
        fs::write(
            &corrupt,
            "{\"tournament_id\": 5}\n{\"round\": 0, \"heat\": 0}\nnot json\n",
        )
        .unwrap();
        assert!(matches!(
            TournamentState::load(&corrupt),
            Err(StateError::Parse { line: 3, .. })
        ));
    }

    #[test]
    fn test_load_defaults_missing_fields() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("old.state");
        fs::write(
            &path,
            "{\"tournament_id\": 9, \"vessel_count\": 2}\n\
             {\"round\": 0, \"heat\": 0, \"completed\": true, \"craft_files\": [\"a.craft\", \"b.craft\"]}\n\
             {\"round\": 0, \"heat\": 1, \"craft_files\": [\"c.craft\"]}\n",
        )
        .unwrap();

        let state = TournamentState::load(&path).unwrap();
        assert_eq!(state.id(), 9);
        assert_eq!(state.heat(0, 0).unwrap().world_index, arena_core::PRIMARY_WORLD);
        assert_eq!(state.current(), Some((0, 1)));
        assert_eq!(state.header().tournament_type, TournamentType::FreeForAll);
    }

    #[test]
    fn test_backup_unfinished_and_remove() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("tournament.state");

        let mut state = sample_state();
        state.save(&path).unwrap();
        assert_eq!(backup_unfinished(&path).unwrap(), None);

        state.mark_complete(0, 0);
        state.save(&path).unwrap();
        let backup = backup_unfinished(&path).unwrap().unwrap();
        assert_eq!(backup, backup_path(&path, state.id()));
        assert!(backup.starts_with(temp.path().join(UNFINISHED_DIR)));
        assert_eq!(TournamentState::load(&backup).unwrap(), state);

        assert!(remove_backup(&path, state.id()).unwrap());
        assert!(!backup.exists());
        assert!(!remove_backup(&path, state.id()).unwrap());
    }

    #[test]
    fn test_generate_from_folder() {
        let temp = tempfile::tempdir().unwrap();
        for i in 0..5 {
            fs::write(temp.path().join(format!("{}.craft", i)), "ship").unwrap();
        }
        let options = GenerateOptions::free_for_all(1, HeatSize::Fixed(2)).with_seed(1);
        let state =
            TournamentState::generate(temp.path(), "career", &options, &mut options.rng()).unwrap();
        assert_eq!(state.header().vessel_count, 5);
        assert_eq!(state.total_heats(), 3);

        let options = GenerateOptions::teams(1, TeamSource::Random(3), 2).with_seed(1);
        let state =
            TournamentState::generate(temp.path(), "career", &options, &mut options.rng()).unwrap();
        assert_eq!(state.header().team_count, 3);
        assert_eq!(state.header().vessel_count, 5);

        let empty = tempfile::tempdir().unwrap();
        let err = TournamentState::generate(empty.path(), "career", &options, &mut options.rng())
            .unwrap_err();
        assert!(err.to_string().contains("Found no craft files"));
    }
}
