//! membership-sync - Synchronizes a hosted membership platform into a local store
//!
//! This crate pulls contacts, events and event registrations from the source
//! membership API and reconciles them into a local SQLite database, keeping an
//! id mapping between the two and writing a machine-checkable report per run.

pub mod client;
pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod models;
pub mod report;
pub mod sync;
pub mod transform;
