//! # meshgate-store
//!
//! Durable last-known-position storage for the bridge, backed by SQLite.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection`. Every broker session opens its own handle on the
//! same file; the position writes are single statements so SQLite serializes
//! the read-compare-write per node id no matter which handle issues it.

pub mod database;
pub mod migrations;
pub mod models;
pub mod positions;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
