//! Catalog of imperative (code) migrations.
//!
//! A [`Registry`] is filled once at startup and then only read.  It is passed
//! by reference into the [`Migrator`](crate::Migrator), so there is no
//! process-wide mutable state.

use std::collections::BTreeMap;

use crate::error::{MigrateError, Result};
use crate::migration::{is_valid_version, Migration, MigrationFn};

#[derive(Debug, Default)]
pub struct Registry {
    migrations: BTreeMap<u64, Migration>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the forward and backward functions for `version`.
    ///
    /// Registering the same version twice, version 0, or a version beyond
    /// [`MAX_VERSION`](crate::migration::MAX_VERSION) is a programming error
    /// and is rejected without touching the existing entry.
    pub fn register(&mut self, version: u64, up: MigrationFn, down: MigrationFn) -> Result<()> {
        if !is_valid_version(version) {
            return Err(MigrateError::InvalidVersion(version));
        }
        if self.migrations.contains_key(&version) {
            return Err(MigrateError::DuplicateVersion { version });
        }
        self.migrations
            .insert(version, Migration::imperative(version, up, down));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    pub fn contains(&self, version: u64) -> bool {
        self.migrations.contains_key(&version)
    }

    /// Registered migrations in ascending version order.
    pub fn migrations(&self) -> impl Iterator<Item = &Migration> {
        self.migrations.values()
    }
}
