//! Synchronization of source records into the local store
//!
//! # Components
//!
//! - [`orchestrator`]: Full and incremental runs over contacts, events and registrations
//! - [`reconcile`]: Per-record mapping resolution, natural-key matching and writes
//! - [`context`]: Counters, warnings and errors of one run
//! - [`diagnostics`]: Skip reasons, registration diagnostics and warning heuristics
//! - [`preflight`]: Checks that gate a run before anything is fetched
//! - [`stale`]: Detection and cleanup of mappings no run has confirmed lately
//!
//! # Example
//!
//! ```ignore
//! use membership_sync::sync::SyncOrchestrator;
//! use membership_sync::models::SyncMode;
//!
//! let orchestrator = SyncOrchestrator::new(source, store, config.sync.clone());
//! let report = orchestrator.run_checked(SyncMode::Incremental, false).await?;
//! ```

pub mod context;
pub mod diagnostics;
pub mod orchestrator;
pub mod preflight;
pub mod reconcile;
pub mod stale;

// Re-export main types for convenience
pub use context::{RunContext, RunError};
pub use diagnostics::{
    EntityStats, FetchedCounts, RecordAction, RecordSummary, RegistrationDiagnostics,
    RegistrationSummary, SkipReason, SyncWarning, WarningCode,
};
pub use orchestrator::SyncOrchestrator;
pub use preflight::{run_preflight, PreflightCheck, PreflightReport};
pub use stale::{cleanup_stale_mappings, detect_stale, StaleCleanup};
