//! # metatrace-store
//!
//! Credential and upload persistence for MetaTrace, backed by SQLite.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed helpers for users and upload
//! records. Upload ownership is keyed by the owner's email string; there is
//! no foreign key from uploads to users.

pub mod database;
pub mod migrations;
pub mod models;
pub mod uploads;
pub mod users;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
