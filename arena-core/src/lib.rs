//! Arena Core - craft pools, spawn specifications and combinatorics
//!
//! Leaf library shared by the tournament scheduler and the CLI:
//! - N-choose-K counting and subset enumeration
//! - Craft and team discovery from disk
//! - Spawn specifications and their on-disk encoding
//!
//! ## Architecture (4-layer granularity)
//!
//! - Level 1: CraftPool::discover, TeamPool::from_folders (pool discovery)
//! - Level 2: SpawnSettings::spec_for_craft / spec_for_teams (heat specs)
//! - Level 3: encode_teams / decode_teams (persistence helpers)
//! - Level 4: choose, combinations (utilities)

pub mod combinatorics;
pub mod craft;
pub mod error;
pub mod spawn;

pub use combinatorics::{checked_choose, choose, combinations, Combinations};
pub use craft::{CraftPool, TeamPool, CRAFT_EXTENSION};
pub use error::{PoolError, TeamCodecError};
pub use spawn::{
    decode_teams, encode_teams, SpawnCraft, SpawnFailureReason, SpawnSettings, SpawnSpec,
    PRIMARY_WORLD,
};
