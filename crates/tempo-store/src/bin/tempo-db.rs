//! Migrate the configured Tempo database and print its migration status.
//!
//! Configuration comes from the environment (see [`StoreConfig::from_env`]);
//! logs go to stderr and respect `RUST_LOG`.  The status is printed to stdout
//! as JSON.

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tempo_store::{Database, StoreConfig};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tempo_store=debug,tempo_migrate=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Starting tempo-db v{}", env!("CARGO_PKG_VERSION"));

    let config = StoreConfig::from_env();
    info!(?config, "Loaded configuration");

    let db = Database::new(&config).context("database is not usable")?;
    let status = db.migration_status()?;

    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}
