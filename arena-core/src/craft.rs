//! Craft pools - discovering the craft (and teams of craft) to schedule
//!
//! A craft is identified by the path of its `.craft` file. Pools are
//! immutable once a tournament has been generated from them.

use std::fs;
use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::PoolError;

/// File extension of craft files.
pub const CRAFT_EXTENSION: &str = "craft";

/// Ordered set of craft identifiers.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CraftPool {
    craft: Vec<String>,
}

impl CraftPool {
    /// Build a pool from explicit identifiers.
    pub fn new(craft: Vec<String>) -> Self {
        Self { craft }
    }

    /// Collect every `*.craft` file directly inside `folder`, sorted by path.
    pub fn discover(folder: &Path) -> Result<Self, PoolError> {
        if !folder.is_dir() {
            return Err(PoolError::MissingFolder(folder.to_path_buf()));
        }
        let craft = list_craft_files(folder)?;
        if craft.is_empty() {
            return Err(PoolError::NoCraft(folder.to_path_buf()));
        }
        tracing::debug!("Discovered {} craft in {}", craft.len(), folder.display());
        Ok(Self { craft })
    }

    pub fn len(&self) -> usize {
        self.craft.len()
    }

    pub fn is_empty(&self) -> bool {
        self.craft.is_empty()
    }

    pub fn craft(&self) -> &[String] {
        &self.craft
    }

    pub fn into_inner(self) -> Vec<String> {
        self.craft
    }
}

/// Teams of craft, each team an ordered list of craft identifiers.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamPool {
    teams: Vec<Vec<String>>,
}

impl TeamPool {
    pub fn new(teams: Vec<Vec<String>>) -> Self {
        Self { teams }
    }

    /// One team per sub-folder of `folder`.
    ///
    /// Sub-folders without craft are skipped. When there are fewer than two
    /// sub-folders (one is allowed for parking broken craft), every craft in
    /// `folder` itself becomes a team of one.
    pub fn from_folders(folder: &Path) -> Result<Self, PoolError> {
        if !folder.is_dir() {
            return Err(PoolError::MissingFolder(folder.to_path_buf()));
        }
        let mut team_dirs: Vec<PathBuf> = read_dir(folder)?
            .into_iter()
            .filter(|p| p.is_dir())
            .collect();
        team_dirs.sort();

        if team_dirs.len() < 2 {
            let teams = list_craft_files(folder)?
                .into_iter()
                .map(|c| vec![c])
                .collect();
            return Ok(Self { teams });
        }

        let mut teams = Vec::new();
        for dir in &team_dirs {
            let members = list_craft_files(dir)?;
            if members.is_empty() {
                tracing::debug!("Skipping empty team folder {}", dir.display());
                continue;
            }
            teams.push(members);
        }
        Ok(Self { teams })
    }

    /// Shuffle `pool` and deal it into `count` teams.
    ///
    /// The first `len % count` teams take one extra craft.
    pub fn random_split<R: Rng>(
        pool: &CraftPool,
        count: usize,
        folder: &Path,
        rng: &mut R,
    ) -> Result<Self, PoolError> {
        if count == 0 || pool.len() < count {
            return Err(PoolError::TooFewCraftForTeams {
                folder: folder.to_path_buf(),
                teams: count,
            });
        }
        let mut craft = pool.craft().to_vec();
        craft.shuffle(rng);

        let per_team = craft.len() / count;
        let residue = craft.len() - per_team * count;
        let mut teams = Vec::with_capacity(count);
        let mut rest = craft.into_iter();
        for team_index in 0..count {
            let take = per_team + usize::from(team_index < residue);
            teams.push(rest.by_ref().take(take).collect());
        }
        Ok(Self { teams })
    }

    pub fn len(&self) -> usize {
        self.teams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }

    pub fn teams(&self) -> &[Vec<String>] {
        &self.teams
    }

    /// Total number of craft over all teams.
    pub fn craft_count(&self) -> usize {
        self.teams.iter().map(Vec::len).sum()
    }
}

fn read_dir(folder: &Path) -> Result<Vec<PathBuf>, PoolError> {
    let io_err = |source| PoolError::Io {
        path: folder.to_path_buf(),
        source,
    };
    let mut paths = Vec::new();
    for entry in fs::read_dir(folder).map_err(io_err)? {
        paths.push(entry.map_err(io_err)?.path());
    }
    Ok(paths)
}

fn list_craft_files(folder: &Path) -> Result<Vec<String>, PoolError> {
    let mut craft: Vec<String> = read_dir(folder)?
        .into_iter()
        .filter(|p| p.is_file() && p.extension().map_or(false, |ext| ext == CRAFT_EXTENSION))
        .map(|p| p.to_string_lossy().into_owned())
        .collect();
    craft.sort();
    Ok(craft)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), "ship = test").unwrap();
    }

    #[test]
    fn test_discover_filters_and_sorts() {
        let temp = tempfile::tempdir().unwrap();
        touch(temp.path(), "b.craft");
        touch(temp.path(), "a.craft");
        touch(temp.path(), "notes.txt");

        let pool = CraftPool::discover(temp.path()).unwrap();
        assert_eq!(pool.len(), 2);
        assert!(pool.craft()[0].ends_with("a.craft"));
        assert!(pool.craft()[1].ends_with("b.craft"));
    }

    #[test]
    fn test_discover_missing_and_empty() {
        let temp = tempfile::tempdir().unwrap();
        let missing = temp.path().join("nope");
        assert!(matches!(
            CraftPool::discover(&missing),
            Err(PoolError::MissingFolder(_))
        ));
        assert!(matches!(
            CraftPool::discover(temp.path()),
            Err(PoolError::NoCraft(_))
        ));
    }

    #[test]
    fn test_teams_from_folders() {
        let temp = tempfile::tempdir().unwrap();
        for (team, members) in [("red", 2), ("blue", 3), ("empty", 0)] {
            let dir = temp.path().join(team);
            fs::create_dir(&dir).unwrap();
            for i in 0..members {
                touch(&dir, &format!("{}-{}.craft", team, i));
            }
        }

        let teams = TeamPool::from_folders(temp.path()).unwrap();
        assert_eq!(teams.len(), 2);
        assert_eq!(teams.craft_count(), 5);
    }

    #[test]
    fn test_teams_fall_back_to_single_craft() {
        let temp = tempfile::tempdir().unwrap();
        fs::create_dir(temp.path().join("broken")).unwrap();
        for i in 0..4 {
            touch(temp.path(), &format!("{}.craft", i));
        }

        let teams = TeamPool::from_folders(temp.path()).unwrap();
        assert_eq!(teams.len(), 4);
        assert!(teams.teams().iter().all(|t| t.len() == 1));
    }

    #[test]
    fn test_random_split_distributes_residue() {
        let pool = CraftPool::new((0..11).map(|i| format!("{}.craft", i)).collect());
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let teams = TeamPool::random_split(&pool, 3, Path::new("."), &mut rng).unwrap();

        let sizes: Vec<usize> = teams.teams().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![4, 4, 3]);
        assert_eq!(teams.craft_count(), 11);
    }

    #[test]
    fn test_random_split_too_few() {
        let pool = CraftPool::new(vec!["a.craft".into(), "b.craft".into()]);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let result = TeamPool::random_split(&pool, 3, Path::new("."), &mut rng);
        assert!(matches!(result, Err(PoolError::TooFewCraftForTeams { teams: 3, .. })));
    }
}
