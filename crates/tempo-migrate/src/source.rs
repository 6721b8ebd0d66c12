//! Declarative migration loader.
//!
//! Migrations are bundled as file pairs named `{version}_{name}.up.{ext}` and
//! `{version}_{name}.down.{ext}`.  Files whose name does not start with a run
//! of digits followed by `_` are ignored, so READMEs and similar files can
//! live next to the scripts.  An `up` without its `down` (or the reverse) is
//! a packaging error and fails the whole load.

use std::collections::BTreeMap;

use rust_embed::RustEmbed;

use crate::error::{MigrateError, Result};
use crate::migration::{is_valid_version, Migration};

/// Direction encoded in a migration file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

/// Parsed components of a migration file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileName<'a> {
    pub version: u64,
    pub name: &'a str,
    pub direction: Direction,
    pub ext: &'a str,
}

/// Parse `{version}_{name}.{up|down}.{ext}`.
///
/// Any directory prefix is ignored.  Returns `None` for names that are not
/// migrations, including a version of zero or one too large for SQLite.
pub fn parse_file_name(path: &str) -> Option<FileName<'_>> {
    let base = path.rsplit('/').next().unwrap_or(path);

    let (digits, rest) = base.split_once('_')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let version: u64 = digits.parse().ok().filter(|v| is_valid_version(*v))?;

    let (stem, ext) = rest.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }

    let (name, direction) = if let Some(name) = stem.strip_suffix(".up") {
        (name, Direction::Up)
    } else if let Some(name) = stem.strip_suffix(".down") {
        (name, Direction::Down)
    } else {
        return None;
    };

    Some(FileName {
        version,
        name,
        direction,
        ext,
    })
}

#[derive(Default)]
struct Pair {
    up: Option<(String, String)>,
    down: Option<(String, String)>,
}

/// Build declarative migrations from `(file name, contents)` pairs.
///
/// The result is sorted by version.  Two different file pairs with the same
/// version are rejected here rather than left for the planner.
pub fn load_files<I, N, D>(files: I) -> Result<Vec<Migration>>
where
    I: IntoIterator<Item = (N, D)>,
    N: AsRef<str>,
    D: AsRef<[u8]>,
{
    let mut pairs: BTreeMap<(u64, String, String), Pair> = BTreeMap::new();

    for (path, data) in files {
        let path = path.as_ref();
        let Some(parsed) = parse_file_name(path) else {
            tracing::debug!(file = %path, "skipping non-migration file");
            continue;
        };

        let sql = std::str::from_utf8(data.as_ref())
            .map_err(|_| MigrateError::InvalidEncoding {
                file: path.to_string(),
            })?
            .to_string();

        let slot = pairs
            .entry((
                parsed.version,
                parsed.name.to_string(),
                parsed.ext.to_string(),
            ))
            .or_default();
        let entry = Some((path.to_string(), sql));
        match parsed.direction {
            Direction::Up => slot.up = entry,
            Direction::Down => slot.down = entry,
        }
    }

    let mut migrations: Vec<Migration> = Vec::with_capacity(pairs.len());
    for ((version, name, _ext), pair) in pairs {
        let (up, down) = match (pair.up, pair.down) {
            (Some((_, up)), Some((_, down))) => (up, down),
            (Some((file, _)), None) | (None, Some((file, _))) => {
                return Err(MigrateError::UnpairedMigration { file });
            }
            (None, None) => continue,
        };

        if migrations.last().is_some_and(|m| m.version() == version) {
            return Err(MigrateError::DuplicateVersion { version });
        }
        migrations.push(Migration::declarative(version, name, up, down));
    }

    tracing::debug!(count = migrations.len(), "loaded declarative migrations");
    Ok(migrations)
}

/// Load every migration bundled in the `rust-embed` asset folder `E`.
pub fn load_embedded<E: RustEmbed>() -> Result<Vec<Migration>> {
    let files = E::iter().filter_map(|path| {
        let data = E::get(&path)?.data;
        Some((path, data))
    });
    load_files(files)
}
