//! # fieldreport-store
//!
//! Local persistence for the fieldreport client, backed by SQLite.
//!
//! The only state kept on the device is the session: the signed-in user's
//! phone number and remote identifier, stored as key-value pairs. Reports
//! themselves always live in the remote store.

pub mod database;
pub mod migrations;
pub mod session;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
