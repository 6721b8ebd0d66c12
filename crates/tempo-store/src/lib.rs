//! # tempo-store
//!
//! Local SQLite storage for Tempo.
//!
//! Opening a [`Database`] runs every pending schema migration first (see
//! [`migrations`]); a database whose migration state is uncertain is never
//! handed out.

pub mod config;
pub mod database;
pub mod migrations;

mod error;

pub use config::StoreConfig;
pub use database::Database;
pub use error::{Result, StoreError};
