//! Tempo's schema migrations.
//!
//! SQL migrations live in the crate's `migrations/` folder and are embedded
//! into the binary.  Migrations that need Rust code live in this module and
//! are registered in [`registry`].  Versions are shared between both sources:
//! every version number appears in exactly one place.

pub mod v000003_session_seconds;

use rusqlite::Connection;
use rust_embed::Embed;
use tempo_migrate::{source, Migration, Migrator, Registry, RunReport, RunnerOptions};

use crate::error::Result;

/// SQL migration files bundled at compile time.
#[derive(Embed)]
#[folder = "migrations/"]
struct Bundled;

/// Declarative migrations shipped with this build.
pub fn bundled() -> Result<Vec<Migration>> {
    Ok(source::load_embedded::<Bundled>()?)
}

/// Code migrations shipped with this build.
pub fn registry() -> Result<Registry> {
    let mut registry = Registry::new();
    registry.register(
        3,
        v000003_session_seconds::up,
        v000003_session_seconds::down,
    )?;
    Ok(registry)
}

/// Run every pending migration against `conn`.
pub fn run_migrations(conn: &mut Connection, options: RunnerOptions) -> Result<RunReport> {
    let registry = registry()?;
    let migrator = Migrator::new(bundled()?, &registry).with_options(options);
    Ok(migrator.run(conn)?)
}

#[cfg(test)]
mod tests {
    use tempo_migrate::Kind;

    use super::*;

    #[test]
    fn plan_covers_both_sources_without_gaps() {
        let registry = registry().unwrap();
        let plan = Migrator::new(bundled().unwrap(), &registry).plan().unwrap();

        let shape: Vec<(u64, Kind)> = plan.iter().map(|m| (m.version(), m.kind())).collect();
        assert_eq!(
            shape,
            vec![
                (1, Kind::Declarative),
                (2, Kind::Declarative),
                (3, Kind::Imperative),
                (4, Kind::Declarative),
            ]
        );
    }

    #[test]
    fn bundled_files_have_names() {
        let names: Vec<String> = bundled()
            .unwrap()
            .iter()
            .map(|m| m.name().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["create_tasks", "create_sessions", "archive_tasks"]
        );
    }
}
