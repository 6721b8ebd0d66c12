//! Merges declarative and imperative migrations into one ordered plan.

use crate::error::{MigrateError, Result};
use crate::migration::{is_valid_version, Migration};
use crate::registry::Registry;

/// Concatenate both sources and sort strictly by ascending version.
///
/// A version present in both sources is reported as
/// [`MigrateError::DuplicateVersion`] instead of silently dropping one side.
pub fn plan(declarative: &[Migration], registry: &Registry) -> Result<Vec<Migration>> {
    let mut merged: Vec<Migration> = declarative
        .iter()
        .cloned()
        .chain(registry.migrations().cloned())
        .collect();
    merged.sort_by_key(Migration::version);

    for pair in merged.windows(2) {
        if pair[0].version() == pair[1].version() {
            return Err(MigrateError::DuplicateVersion {
                version: pair[0].version(),
            });
        }
    }

    if let Some(m) = merged.iter().find(|m| !is_valid_version(m.version())) {
        return Err(MigrateError::InvalidVersion(m.version()));
    }

    Ok(merged)
}

#[cfg(test)]
mod tests {
    use rusqlite::Transaction;

    use super::*;
    use crate::error::StepResult;
    use crate::migration::Kind;

    fn noop(_tx: &Transaction<'_>) -> StepResult {
        Ok(())
    }

    #[test]
    fn interleaves_sources_by_version() {
        let declarative = vec![
            Migration::declarative(1, "init", "", ""),
            Migration::declarative(4, "index", "", ""),
        ];
        let mut registry = Registry::new();
        registry.register(3, noop, noop).unwrap();
        registry.register(2, noop, noop).unwrap();

        let plan = plan(&declarative, &registry).unwrap();
        let shape: Vec<(u64, Kind)> = plan.iter().map(|m| (m.version(), m.kind())).collect();
        assert_eq!(
            shape,
            vec![
                (1, Kind::Declarative),
                (2, Kind::Imperative),
                (3, Kind::Imperative),
                (4, Kind::Declarative),
            ]
        );
    }

    #[test]
    fn collision_across_sources_is_an_error() {
        let declarative = vec![Migration::declarative(2, "tags", "", "")];
        let mut registry = Registry::new();
        registry.register(2, noop, noop).unwrap();

        assert!(matches!(
            plan(&declarative, &registry),
            Err(MigrateError::DuplicateVersion { version: 2 })
        ));
    }

    #[test]
    fn empty_sources_make_an_empty_plan() {
        assert!(plan(&[], &Registry::new()).unwrap().is_empty());
    }

    #[test]
    fn out_of_range_declarative_version_is_an_error() {
        let declarative = vec![
            Migration::declarative(1, "init", "", ""),
            Migration::declarative(u64::MAX, "huge", "", ""),
        ];

        assert!(matches!(
            plan(&declarative, &Registry::new()),
            Err(MigrateError::InvalidVersion(u64::MAX))
        ));
    }
}
