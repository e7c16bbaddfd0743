//! Partition generator - turning a craft or team pool into rounds of heats
//!
//! Level 2 - Phases (free_for_all_rounds, team_rounds) and
//! Level 3 - Steps (heat sizing, slicing, team rotation)

use std::collections::VecDeque;

use arena_core::{choose, combinations, CraftPool, SpawnSpec, TeamPool};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::config::{AutoSizeBand, GenerateOptions, HeatSize, TournamentStyle};
use crate::error::GenerateError;

/// Upper bound on heats per round for exhaustive round-robin.
pub const MAX_ROUND_ROBIN_HEATS: u64 = 10_000;

/// Generated rounds plus the effective sizes used to build them.
#[derive(Clone, Debug)]
pub struct Schedule {
    pub rounds: Vec<Vec<SpawnSpec>>,
    /// Teams per heat (team tournaments only, else 0)
    pub teams_per_heat: usize,
    /// Craft per team per heat (team tournaments only, else 0)
    pub vessels_per_team: usize,
}

// ============================================================================
// Level 2 - Phases
// ============================================================================

/// Free-for-all rounds over `pool`.
pub fn free_for_all_rounds<R: Rng>(
    pool: &CraftPool,
    options: &GenerateOptions,
    rng: &mut R,
) -> Result<Schedule, GenerateError> {
    if options.rounds == 0 {
        return Err(GenerateError::NoRounds);
    }
    let n = pool.len();
    if n == 0 {
        return Err(GenerateError::EmptyPool);
    }

    let sizes = match options.heat_size {
        HeatSize::Unlimited => vec![n],
        HeatSize::Fixed(0) => return Err(GenerateError::InvalidHeatSize(0)),
        HeatSize::Fixed(k) => heat_sizes(n, k.min(n)),
        HeatSize::Auto => auto_heat_sizes(n, options.auto_band),
    };
    let largest = sizes.first().copied().unwrap_or(n);
    tracing::info!(
        "Generating {} rounds over {} craft, heats of up to {}",
        options.rounds,
        n,
        largest
    );

    let rounds = match options.style {
        TournamentStyle::Randomised => (0..options.rounds)
            .map(|_| {
                randomised_heats(pool.craft(), &sizes, rng)
                    .into_iter()
                    .map(|craft| options.spawn.spec_for_craft(craft))
                    .collect()
            })
            .collect(),
        TournamentStyle::RoundRobin => {
            let line_ups = round_robin_line_ups(n, largest)?;
            (0..options.rounds)
                .map(|_| {
                    shuffled_order(&line_ups, rng)
                        .into_iter()
                        .map(|line_up| {
                            let craft = line_up.iter().map(|&i| pool.craft()[i].clone()).collect();
                            options.spawn.spec_for_craft(craft)
                        })
                        .collect()
                })
                .collect()
        }
    };

    Ok(Schedule {
        rounds,
        teams_per_heat: 0,
        vessels_per_team: 0,
    })
}

/// Team rounds over `teams`; per-heat craft come from a [`TeamRotation`].
pub fn team_rounds<R: Rng>(
    teams: &TeamPool,
    options: &GenerateOptions,
    rng: &mut R,
) -> Result<Schedule, GenerateError> {
    if options.rounds == 0 {
        return Err(GenerateError::NoRounds);
    }
    let team_count = teams.len();
    if team_count < 2 {
        return Err(GenerateError::TooFewTeams { found: team_count });
    }
    if let Some(index) = teams.teams().iter().position(Vec::is_empty) {
        return Err(GenerateError::EmptyTeam { index });
    }

    let per_heat = options.teams_per_heat.clamp(2, team_count);
    let vessels = options.vessels_per_team;
    let mut rotation = TeamRotation::new(teams.teams().to_vec());
    tracing::info!(
        "Generating {} rounds over {} teams, {} teams per heat",
        options.rounds,
        team_count,
        per_heat
    );

    let indices: Vec<usize> = (0..team_count).collect();
    let mut rounds = Vec::with_capacity(options.rounds);
    match options.style {
        TournamentStyle::Randomised => {
            let sizes = team_heat_sizes(team_count, per_heat);
            for _ in 0..options.rounds {
                let heats = randomised_heats(&indices, &sizes, rng);
                rounds.push(team_specs(&heats, &mut rotation, options, rng));
            }
        }
        TournamentStyle::RoundRobin => {
            let line_ups = round_robin_line_ups(team_count, per_heat)?;
            for _ in 0..options.rounds {
                let heats = shuffled_order(&line_ups, rng);
                rounds.push(team_specs(&heats, &mut rotation, options, rng));
            }
        }
    }

    Ok(Schedule {
        rounds,
        teams_per_heat: per_heat,
        vessels_per_team: vessels,
    })
}

// ============================================================================
// Level 3 - Steps
// ============================================================================

/// Heat sizes for slicing `pool` into heats of at most `size`.
///
/// Uses the fewest heats possible; any shortfall is spread over the trailing
/// heats one craft at a time, so sizes never differ by more than one.
pub fn heat_sizes(pool: usize, size: usize) -> Vec<usize> {
    if pool == 0 || size == 0 {
        return Vec::new();
    }
    let heats = pool.div_ceil(size);
    let base = pool / heats;
    let extra = pool % heats;
    (0..heats).map(|h| base + usize::from(h < extra)).collect()
}

/// Heat sizes for team tournaments.
///
/// Teams are sliced like craft: no heat holds more than `per_heat` teams and
/// only the trailing heats run one team short.
pub fn team_heat_sizes(teams: usize, per_heat: usize) -> Vec<usize> {
    heat_sizes(teams, per_heat)
}

/// Search for a heat size in `band` that divides the pool evenly.
///
/// Returns `(size, deficit)`: pad the pool with `deficit` phantom craft and
/// heats of `size` divide it exactly, so `deficit` heats run one short.
/// Larger sizes are preferred. When the pool sits just above the band (but
/// below `2 * min - 1`) the search covers `[max / 2, max]` instead, which
/// allows two smaller heats.
pub fn optimise_heat_size(pool: usize, band: AutoSizeBand) -> (usize, usize) {
    let min = band.min.max(1);
    let max = band.max.max(min);
    let mut count = pool.max(1);
    let mut deficit = 0;
    loop {
        let low = if count > max && count < 2 * min - 1 {
            (max / 2).max(1)
        } else {
            min
        };
        if let Some(size) = (low..=max).rev().find(|size| count % size == 0) {
            return (size, deficit);
        }
        count += 1;
        deficit += 1;
    }
}

/// Heat sizes chosen by [`optimise_heat_size`].
pub fn auto_heat_sizes(pool: usize, band: AutoSizeBand) -> Vec<usize> {
    if pool == 0 {
        return Vec::new();
    }
    let (size, deficit) = optimise_heat_size(pool, band);
    let heats = (pool + deficit) / size;
    if size == 1 || deficit > heats {
        // The band cannot be met by trimming one per heat.
        return heat_sizes(pool, size);
    }
    (0..heats)
        .map(|h| if h >= heats - deficit { size - 1 } else { size })
        .collect()
}

/// Shuffle `pool` and cut it into consecutive heats of `sizes`.
pub fn randomised_heats<T: Clone, R: Rng>(pool: &[T], sizes: &[usize], rng: &mut R) -> Vec<Vec<T>> {
    let mut shuffled = pool.to_vec();
    shuffled.shuffle(rng);
    let mut rest = shuffled.into_iter();
    sizes
        .iter()
        .map(|&size| rest.by_ref().take(size).collect())
        .collect()
}

fn round_robin_line_ups(pool: usize, per_heat: usize) -> Result<Vec<Vec<usize>>, GenerateError> {
    // Saturates at u64::MAX, which is always over the limit.
    let heats = choose(pool, per_heat);
    if heats > MAX_ROUND_ROBIN_HEATS {
        return Err(GenerateError::TooManyHeats {
            pool,
            per_heat,
            heats,
            limit: MAX_ROUND_ROBIN_HEATS,
        });
    }
    Ok(combinations(pool, per_heat))
}

fn shuffled_order<R: Rng>(line_ups: &[Vec<usize>], rng: &mut R) -> Vec<Vec<usize>> {
    let mut order = line_ups.to_vec();
    order.shuffle(rng);
    order
}

fn team_specs<R: Rng>(
    heats: &[Vec<usize>],
    rotation: &mut TeamRotation,
    options: &GenerateOptions,
    rng: &mut R,
) -> Vec<SpawnSpec> {
    heats
        .iter()
        .map(|heat| {
            let craft = heat
                .iter()
                .map(|&team| rotation.select(team, options.vessels_per_team, options.full_teams, rng))
                .collect();
            options.spawn.spec_for_teams(craft)
        })
        .collect()
}

// ============================================================================
// Level 4 - Team rotation
// ============================================================================

/// Fair per-team craft queue.
///
/// Over consecutive draws every craft of a team is fielded about equally
/// often; usage counts never drift apart by more than one.
#[derive(Clone, Debug)]
pub struct TeamRotation {
    teams: Vec<Vec<String>>,
    queues: Vec<VecDeque<String>>,
}

impl TeamRotation {
    pub fn new(teams: Vec<Vec<String>>) -> Self {
        let queues = teams.iter().map(|_| VecDeque::new()).collect();
        Self { teams, queues }
    }

    /// Draw `wanted` craft from `team` (0 = the whole team).
    ///
    /// Without `full_teams` a draw never repeats a craft, so it returns at most
    /// the team size. With `full_teams` repeats pad the draw to `wanted`.
    /// Unknown or empty teams yield nothing.
    pub fn select<R: Rng>(&mut self, team: usize, wanted: usize, full_teams: bool, rng: &mut R) -> Vec<String> {
        let (Some(members), Some(queue)) = (self.teams.get(team), self.queues.get_mut(team)) else {
            return Vec::new();
        };
        if members.is_empty() {
            return Vec::new();
        }
        let wanted = if wanted == 0 { members.len() } else { wanted };

        if queue.len() < wanted {
            let mut missing: Vec<String> = members
                .iter()
                .filter(|craft| !queue.contains(*craft))
                .cloned()
                .collect();
            missing.shuffle(rng);
            queue.extend(missing);
        }
        if full_teams {
            while queue.len() < wanted {
                let mut refill = members.clone();
                refill.shuffle(rng);
                queue.extend(refill);
            }
        }

        let take = wanted.min(queue.len());
        queue.drain(..take).collect()
    }
}
