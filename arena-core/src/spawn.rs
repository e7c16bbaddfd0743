//! Spawn specifications - what the spawn service is asked to place
//!
//! A [`SpawnSpec`] is stamped from [`SpawnSettings`] once per heat at
//! generation time. On disk the team-specific craft lists are flattened into a
//! single delimited string (see [`encode_teams`]).

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::TeamCodecError;

/// World index of the primary (home) world.
pub const PRIMARY_WORLD: i32 = 1;

fn primary_world() -> i32 {
    PRIMARY_WORLD
}

// ============================================================================
// Spawn failures
// ============================================================================

/// Why the spawn service could not place a heat.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Error)]
pub enum SpawnFailureReason {
    #[error("no craft to spawn")]
    NoCraft,
    #[error("no terrain")]
    NoTerrain,
    #[error("invalid vessel")]
    InvalidVessel,
    #[error("vessel lost parts")]
    VesselLostParts,
    #[error("vessel failed to spawn")]
    VesselFailedToSpawn,
    #[error("timed out")]
    TimedOut,
}

// ============================================================================
// Craft selection
// ============================================================================

/// Craft placed by one spawn request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpawnCraft {
    /// Flat list, teams assigned by the spawn service.
    Flat(Vec<String>),
    /// One list per team.
    Teams(Vec<Vec<String>>),
}

impl SpawnCraft {
    /// Number of craft over all teams.
    pub fn len(&self) -> usize {
        match self {
            SpawnCraft::Flat(craft) => craft.len(),
            SpawnCraft::Teams(teams) => teams.iter().map(Vec::len).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every craft identifier, team order preserved.
    pub fn iter(&self) -> Box<dyn Iterator<Item = &String> + '_> {
        match self {
            SpawnCraft::Flat(craft) => Box::new(craft.iter()),
            SpawnCraft::Teams(teams) => Box::new(teams.iter().flatten()),
        }
    }
}

impl Default for SpawnCraft {
    fn default() -> Self {
        SpawnCraft::Flat(Vec::new())
    }
}

// ============================================================================
// SpawnSpec
// ============================================================================

/// Parameters for spawning one heat.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(into = "SpawnSpecRecord", try_from = "SpawnSpecRecord")]
pub struct SpawnSpec {
    pub world_index: i32,
    pub latitude: f64,
    pub longitude: f64,
    /// Metres above terrain.
    pub altitude: f64,
    /// Spawn circle radius, absolute metres or a per-craft factor.
    pub distance: f64,
    pub abs_distance_or_factor: bool,
    pub ease_in_speed: f64,
    pub kill_everything_first: bool,
    pub assign_teams: bool,
    pub craft: SpawnCraft,
}

impl SpawnSpec {
    /// Raise the altitude by `step`, never past `ceiling`.
    ///
    /// Returns false (leaving it unchanged) once the altitude is already
    /// at or above the ceiling.
    pub fn bump_altitude(&mut self, step: f64, ceiling: f64) -> bool {
        if self.altitude >= ceiling {
            return false;
        }
        self.altitude = (self.altitude + step).min(ceiling);
        true
    }

    pub fn is_team_specific(&self) -> bool {
        matches!(self.craft, SpawnCraft::Teams(_))
    }
}

/// On-disk shape of a [`SpawnSpec`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
struct SpawnSpecRecord {
    #[serde(default = "primary_world")]
    world_index: i32,
    latitude: f64,
    longitude: f64,
    altitude: f64,
    distance: f64,
    abs_distance_or_factor: bool,
    ease_in_speed: f64,
    kill_everything_first: bool,
    assign_teams: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    craft_files: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    serialized_teams: Option<String>,
}

impl Default for SpawnSpecRecord {
    fn default() -> Self {
        let settings = SpawnSettings::default();
        Self {
            world_index: PRIMARY_WORLD,
            latitude: settings.latitude,
            longitude: settings.longitude,
            altitude: settings.altitude,
            distance: settings.distance,
            abs_distance_or_factor: settings.abs_distance_or_factor,
            ease_in_speed: settings.ease_in_speed,
            kill_everything_first: settings.kill_everything_first,
            assign_teams: settings.assign_teams,
            craft_files: Vec::new(),
            serialized_teams: None,
        }
    }
}

impl From<SpawnSpec> for SpawnSpecRecord {
    fn from(spec: SpawnSpec) -> Self {
        let (craft_files, serialized_teams) = match spec.craft {
            SpawnCraft::Flat(craft) => (craft, None),
            SpawnCraft::Teams(teams) => (Vec::new(), Some(encode_teams(&teams))),
        };
        Self {
            world_index: spec.world_index,
            latitude: spec.latitude,
            longitude: spec.longitude,
            altitude: spec.altitude,
            distance: spec.distance,
            abs_distance_or_factor: spec.abs_distance_or_factor,
            ease_in_speed: spec.ease_in_speed,
            kill_everything_first: spec.kill_everything_first,
            assign_teams: spec.assign_teams,
            craft_files,
            serialized_teams,
        }
    }
}

impl TryFrom<SpawnSpecRecord> for SpawnSpec {
    type Error = TeamCodecError;

    fn try_from(record: SpawnSpecRecord) -> Result<Self, Self::Error> {
        let craft = match record.serialized_teams {
            Some(teams) => SpawnCraft::Teams(decode_teams(&teams)?),
            None => SpawnCraft::Flat(record.craft_files),
        };
        Ok(Self {
            world_index: record.world_index,
            latitude: record.latitude,
            longitude: record.longitude,
            altitude: record.altitude,
            distance: record.distance,
            abs_distance_or_factor: record.abs_distance_or_factor,
            ease_in_speed: record.ease_in_speed,
            kill_everything_first: record.kill_everything_first,
            assign_teams: record.assign_teams,
            craft,
        })
    }
}

// ============================================================================
// SpawnSettings
// ============================================================================

/// Location and spacing shared by every heat of a tournament.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnSettings {
    pub world_index: i32,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub distance: f64,
    pub abs_distance_or_factor: bool,
    pub ease_in_speed: f64,
    pub kill_everything_first: bool,
    /// Let the spawn service reassign teams in free-for-all heats.
    pub assign_teams: bool,
}

impl Default for SpawnSettings {
    fn default() -> Self {
        Self {
            world_index: PRIMARY_WORLD,
            latitude: 0.0,
            longitude: 0.0,
            altitude: 5.0,
            distance: 10.0,
            abs_distance_or_factor: false,
            ease_in_speed: 1.0,
            kill_everything_first: true,
            assign_teams: true,
        }
    }
}

impl SpawnSettings {
    pub fn with_location(mut self, world_index: i32, latitude: f64, longitude: f64) -> Self {
        self.world_index = world_index;
        self.latitude = latitude;
        self.longitude = longitude;
        self
    }

    pub fn with_altitude(mut self, altitude: f64) -> Self {
        self.altitude = altitude;
        self
    }

    /// Spec for a free-for-all heat. Empty craft names are dropped.
    pub fn spec_for_craft(&self, craft: Vec<String>) -> SpawnSpec {
        self.spec(self.assign_teams, SpawnCraft::Flat(named(craft)))
    }

    /// Spec for a team heat. Teams are never reassigned and empty craft names
    /// are dropped.
    pub fn spec_for_teams(&self, teams: Vec<Vec<String>>) -> SpawnSpec {
        let teams = teams.into_iter().map(named).collect();
        self.spec(false, SpawnCraft::Teams(teams))
    }

    fn spec(&self, assign_teams: bool, craft: SpawnCraft) -> SpawnSpec {
        SpawnSpec {
            world_index: self.world_index,
            latitude: self.latitude,
            longitude: self.longitude,
            altitude: self.altitude,
            distance: self.distance,
            abs_distance_or_factor: self.abs_distance_or_factor,
            ease_in_speed: self.ease_in_speed,
            kill_everything_first: self.kill_everything_first,
            assign_teams,
            craft,
        }
    }
}

/// Drop empty craft names.
fn named(craft: Vec<String>) -> Vec<String> {
    let before = craft.len();
    let craft: Vec<String> = craft.into_iter().filter(|name| !name.is_empty()).collect();
    if craft.len() < before {
        tracing::warn!("Dropped {} craft with empty names", before - craft.len());
    }
    craft
}

// ============================================================================
// Team list codec
// ============================================================================

fn needs_escape(c: char) -> bool {
    matches!(c, '\\' | ',' | '[' | ']')
}

/// Flatten teams into `[a,b],[c]`, backslash-escaping `\ , [ ]` in names.
///
/// A team holding a single empty name encodes as `[]`, the empty team;
/// [`SpawnSettings`] never builds such a team.
pub fn encode_teams(teams: &[Vec<String>]) -> String {
    let mut out = String::new();
    for (t, team) in teams.iter().enumerate() {
        if t > 0 {
            out.push(',');
        }
        out.push('[');
        for (i, name) in team.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            for c in name.chars() {
                if needs_escape(c) {
                    out.push('\\');
                }
                out.push(c);
            }
        }
        out.push(']');
    }
    out
}

/// Inverse of [`encode_teams`]. Offsets in errors are character offsets.
pub fn decode_teams(input: &str) -> Result<Vec<Vec<String>>, TeamCodecError> {
    let chars: Vec<char> = input.chars().collect();
    let mut teams = Vec::new();
    if chars.is_empty() {
        return Ok(teams);
    }

    let mut i = 0;
    loop {
        if chars.get(i) != Some(&'[') {
            return Err(TeamCodecError::ExpectedOpen(i));
        }
        let start = i;
        i += 1;

        let mut team = Vec::new();
        let mut name = String::new();
        let mut pending = false;
        loop {
            match chars.get(i) {
                None => return Err(TeamCodecError::Unterminated(start)),
                Some('\\') => {
                    let escaped = chars.get(i + 1).ok_or(TeamCodecError::DanglingEscape)?;
                    name.push(*escaped);
                    pending = true;
                    i += 2;
                }
                Some(',') => {
                    team.push(std::mem::take(&mut name));
                    pending = true;
                    i += 1;
                }
                Some(']') => {
                    if pending {
                        team.push(std::mem::take(&mut name));
                    }
                    i += 1;
                    break;
                }
                Some(c) => {
                    name.push(*c);
                    pending = true;
                    i += 1;
                }
            }
        }
        teams.push(team);

        match chars.get(i) {
            None => break,
            Some(',') => i += 1,
            Some(_) => return Err(TeamCodecError::ExpectedSeparator(i)),
        }
    }
    Ok(teams)
}
