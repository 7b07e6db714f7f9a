//! # peerbook-store
//!
//! Local SQLite storage for the contact list: confirmed people, groups and
//! both directions of pending friend requests. The crate exposes a
//! synchronous `Database` handle that wraps a `rusqlite::Connection` and
//! provides typed helpers for every transition the contact store makes.

pub mod contacts;
pub mod database;
pub mod groups;
pub mod migrations;
pub mod models;
pub mod requests;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::{PendingRequest, Snapshot};
