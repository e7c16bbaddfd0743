//! Configuration types for generating and running tournaments
//!
//! Level 4 - Utilities and configuration

use arena_core::SpawnSettings;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Attempts allowed per heat before the tournament halts.
pub const MAX_HEAT_ATTEMPTS: u32 = 3;

/// How many craft (or teams) go into each heat.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeatSize {
    /// Pick a size within the auto band that divides the pool evenly.
    Auto,
    /// Everything in one heat per round.
    Unlimited,
    /// Fixed size, clamped to the pool.
    Fixed(usize),
}

impl Default for HeatSize {
    fn default() -> Self {
        HeatSize::Fixed(8)
    }
}

/// How heats are drawn each round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TournamentStyle {
    /// Shuffle and slice
    Randomised,
    /// Every possible line-up
    RoundRobin,
}

impl Default for TournamentStyle {
    fn default() -> Self {
        TournamentStyle::Randomised
    }
}

/// Where teams come from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TeamSource {
    /// Every craft fights for itself.
    FreeForAll,
    /// One team per sub-folder of the craft folder.
    Folders,
    /// Deal the pool randomly into this many teams.
    Random(usize),
}

impl Default for TeamSource {
    fn default() -> Self {
        TeamSource::FreeForAll
    }
}

/// Heat-size band searched by [`HeatSize::Auto`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoSizeBand {
    pub min: usize,
    pub max: usize,
}

impl Default for AutoSizeBand {
    fn default() -> Self {
        Self { min: 6, max: 10 }
    }
}

/// Options for generating a tournament
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateOptions {
    /// Number of rounds
    pub rounds: usize,
    /// Craft per heat (free-for-all)
    pub heat_size: HeatSize,
    pub style: TournamentStyle,
    pub team_source: TeamSource,
    /// Teams per heat (team tournaments)
    pub teams_per_heat: usize,
    /// Craft fielded per team per heat (0 = whole team)
    pub vessels_per_team: usize,
    /// Pad short teams with repeats up to `vessels_per_team`
    pub full_teams: bool,
    pub auto_band: AutoSizeBand,
    /// Random seed for reproducibility (None = random)
    pub seed: Option<u64>,
    /// Location and spacing stamped on every heat
    pub spawn: SpawnSettings,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            rounds: 1,
            heat_size: HeatSize::default(),
            style: TournamentStyle::Randomised,
            team_source: TeamSource::FreeForAll,
            teams_per_heat: 2,
            vessels_per_team: 0,
            full_teams: false,
            auto_band: AutoSizeBand::default(),
            seed: None,
            spawn: SpawnSettings::default(),
        }
    }
}

impl GenerateOptions {
    /// Free-for-all with the given rounds and heat size
    pub fn free_for_all(rounds: usize, heat_size: HeatSize) -> Self {
        Self {
            rounds,
            heat_size,
            ..Default::default()
        }
    }

    /// Team tournament
    pub fn teams(rounds: usize, source: TeamSource, teams_per_heat: usize) -> Self {
        Self {
            rounds,
            team_source: source,
            teams_per_heat,
            ..Default::default()
        }
    }

    pub fn with_style(mut self, style: TournamentStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_vessels_per_team(mut self, vessels: usize, full_teams: bool) -> Self {
        self.vessels_per_team = vessels;
        self.full_teams = full_teams;
        self
    }

    pub fn with_spawn(mut self, spawn: SpawnSettings) -> Self {
        self.spawn = spawn;
        self
    }

    /// Set random seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn is_team_tournament(&self) -> bool {
        self.team_source != TeamSource::FreeForAll
    }

    /// RNG seeded from `seed`, or from entropy when unset.
    pub fn rng(&self) -> ChaCha8Rng {
        match self.seed {
            Some(s) => ChaCha8Rng::seed_from_u64(s),
            None => ChaCha8Rng::from_entropy(),
        }
    }
}

/// Runtime settings for the heat loop
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Competition length in minutes (None = until the engine stops)
    pub duration_minutes: Option<f64>,
    /// Pause between heats of one round, simulation seconds
    pub delay_between_heats: f64,
    /// Time skip between rounds, minutes (0 = wait instead)
    pub warp_between_rounds: f64,
    /// Altitude added after a heat loses parts on spawn
    pub altitude_step: f64,
    /// Highest altitude the bump may reach
    pub altitude_ceiling: f64,
    /// Seconds between match-activity polls
    pub poll_interval: f64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            duration_minutes: Some(5.0),
            delay_between_heats: 10.0,
            warp_between_rounds: 0.0,
            altitude_step: 3.0,
            altitude_ceiling: 10.0,
            poll_interval: 1.0,
        }
    }
}

impl RunnerConfig {
    pub fn with_duration(mut self, minutes: Option<f64>) -> Self {
        self.duration_minutes = minutes;
        self
    }

    pub fn with_delay(mut self, seconds: f64) -> Self {
        self.delay_between_heats = seconds;
        self
    }

    pub fn with_warp(mut self, minutes: f64) -> Self {
        self.warp_between_rounds = minutes;
        self
    }
}

/// Settings for continuous spawning
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContinuousConfig {
    /// Craft alive at once (0 = every craft)
    pub concurrent_vessels: usize,
    /// Spawns per craft (None = unlimited)
    pub lives: Option<u32>,
    /// Seconds without ammo before the scheduler kills a craft (None = never)
    pub out_of_ammo_kill_time: Option<f64>,
    /// Invalid checks before a craft is respawned
    pub respawn_after_invalid: u32,
    /// Invalid checks before a craft file is dropped for good
    pub remove_after_invalid: u32,
    /// Lowest spawn altitude, metres
    pub min_altitude: f64,
    /// Seconds between refill cycles
    pub cycle_interval: f64,
}

impl Default for ContinuousConfig {
    fn default() -> Self {
        Self {
            concurrent_vessels: 0,
            lives: None,
            out_of_ammo_kill_time: None,
            respawn_after_invalid: 3,
            remove_after_invalid: 5,
            min_altitude: 100.0,
            cycle_interval: 1.0,
        }
    }
}

impl ContinuousConfig {
    pub fn with_concurrent(mut self, vessels: usize) -> Self {
        self.concurrent_vessels = vessels;
        self
    }

    pub fn with_lives(mut self, lives: u32) -> Self {
        self.lives = Some(lives);
        self
    }

    pub fn with_out_of_ammo_kill_time(mut self, seconds: f64) -> Self {
        self.out_of_ammo_kill_time = Some(seconds);
        self
    }

    /// Slot count for a pool of `pool_size` craft.
    pub fn slot_count(&self, pool_size: usize) -> usize {
        if self.concurrent_vessels == 0 {
            pool_size
        } else {
            self.concurrent_vessels.min(pool_size)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_generate_options_defaults() {
        let options = GenerateOptions::default();
        assert_eq!(options.rounds, 1);
        assert_eq!(options.style, TournamentStyle::Randomised);
        assert_eq!(options.auto_band, AutoSizeBand { min: 6, max: 10 });
        assert!(!options.is_team_tournament());
    }

    #[test]
    fn test_generate_options_teams() {
        let options = GenerateOptions::teams(3, TeamSource::Random(4), 2)
            .with_vessels_per_team(3, true);
        assert!(options.is_team_tournament());
        assert_eq!(options.vessels_per_team, 3);
        assert!(options.full_teams);
    }

    #[test]
    fn test_seeded_rng_is_reproducible() {
        let options = GenerateOptions::default().with_seed(42);
        let a: u64 = options.rng().gen();
        let b: u64 = options.rng().gen();
        assert_eq!(a, b);
    }

    #[test]
    fn test_runner_config_defaults() {
        let config = RunnerConfig::default();
        assert_eq!(config.altitude_step, 3.0);
        assert_eq!(config.altitude_ceiling, 10.0);
        assert_eq!(config.warp_between_rounds, 0.0);
    }

    #[test]
    fn test_continuous_slot_count() {
        let config = ContinuousConfig::default();
        assert_eq!(config.slot_count(12), 12);
        assert_eq!(config.clone().with_concurrent(4).slot_count(12), 4);
        assert_eq!(config.with_concurrent(20).slot_count(12), 12);
    }

    #[test]
    fn test_options_from_partial_json() {
        let json = r#"{"rounds": 4, "heat_size": "Auto", "team_source": {"Random": 3}}"#;
        let options: GenerateOptions = serde_json::from_str(json).unwrap();
        assert_eq!(options.rounds, 4);
        assert_eq!(options.heat_size, HeatSize::Auto);
        assert_eq!(options.team_source, TeamSource::Random(3));
        assert_eq!(options.teams_per_heat, 2);
    }
}
