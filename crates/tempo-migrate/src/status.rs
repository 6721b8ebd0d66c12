//! Read-only view of where a database stands against a migration plan.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use rusqlite::Connection;
use serde::Serialize;

use crate::error::Result;
use crate::migration::{Kind, Migration};
use crate::tracking::{self, TrackingRecord};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MigrationState {
    Applied { applied_at: Option<NaiveDateTime> },
    /// Started but never committed; blocks further runs.
    Dirty,
    Pending,
    /// Recorded as applied but no longer part of the plan.
    Orphaned { applied_at: Option<NaiveDateTime> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    pub version: u64,
    pub name: String,
    /// `None` for tracking rows with no planned migration.
    pub kind: Option<Kind>,
    #[serde(flatten)]
    pub state: MigrationState,
}

/// Combine `plan` with the tracking table, ascending by version.
///
/// Does not create the tracking table; a database that has never been
/// migrated reports everything as pending.
pub fn collect(conn: &Connection, plan: &[Migration]) -> Result<Vec<MigrationStatus>> {
    let mut records: BTreeMap<u64, TrackingRecord> = if tracking::table_exists(conn)? {
        tracking::records(conn)?
            .into_iter()
            .map(|r| (r.version, r))
            .collect()
    } else {
        BTreeMap::new()
    };

    let mut statuses = Vec::with_capacity(plan.len() + records.len());
    for migration in plan {
        let state = match records.remove(&migration.version()) {
            Some(record) if record.dirty => MigrationState::Dirty,
            Some(record) => MigrationState::Applied {
                applied_at: record.applied_at,
            },
            None => MigrationState::Pending,
        };
        statuses.push(MigrationStatus {
            version: migration.version(),
            name: migration.name().to_string(),
            kind: Some(migration.kind()),
            state,
        });
    }

    for (version, record) in records {
        let state = if record.dirty {
            MigrationState::Dirty
        } else {
            MigrationState::Orphaned {
                applied_at: record.applied_at,
            }
        };
        statuses.push(MigrationStatus {
            version,
            name: String::new(),
            kind: None,
            state,
        });
    }

    statuses.sort_by_key(|s| s.version);
    Ok(statuses)
}
