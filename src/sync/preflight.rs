//! Checks that must pass before a sync may write anything

use serde::Serialize;
use tracing::{error, info};

use crate::client::MemberSource;
use crate::database::migrations::REQUIRED_TABLES;
use crate::database::LocalStore;
use crate::error::SyncError;
use crate::models::{AccountInfo, MemberStatus};

/// Result of one preflight check
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreflightCheck {
    /// Check name
    pub name: &'static str,
    /// Whether it passed
    pub passed: bool,
    /// What was observed
    pub message: String,
    /// What to do about a failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl PreflightCheck {
    fn pass(name: &'static str, message: impl Into<String>) -> Self {
        Self {
            name,
            passed: true,
            message: message.into(),
            remediation: None,
        }
    }

    fn fail(name: &'static str, message: impl Into<String>, remediation: impl Into<String>) -> Self {
        Self {
            name,
            passed: false,
            message: message.into(),
            remediation: Some(remediation.into()),
        }
    }
}

/// Outcome of all preflight checks
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreflightReport {
    /// Every check passed
    pub ok: bool,
    /// Individual checks
    pub checks: Vec<PreflightCheck>,
    /// Required status codes absent from the store
    pub missing_statuses: Vec<String>,
    /// Required tables absent from the store
    pub missing_tables: Vec<String>,
    /// Source account, when reachable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<AccountInfo>,
}

impl PreflightReport {
    /// Remediation messages of the failed checks
    pub fn remediations(&self) -> Vec<String> {
        self.checks
            .iter()
            .filter_map(|c| c.remediation.clone())
            .collect()
    }

    /// Convert a failed preflight into an error
    pub fn into_result(self) -> Result<Self, SyncError> {
        if self.ok {
            Ok(self)
        } else {
            Err(SyncError::Preflight(self.remediations().join("; ")))
        }
    }
}

/// Run every preflight check
///
/// Never fetches entity data and never writes.
pub async fn run_preflight(source: &dyn MemberSource, store: &dyn LocalStore) -> PreflightReport {
    let mut checks = Vec::new();
    let mut missing_statuses = Vec::new();
    let mut missing_tables = Vec::new();

    let account = match source.check_connectivity().await {
        Ok(account) => {
            checks.push(PreflightCheck::pass(
                "api_connectivity",
                format!("Connected to account {}", account.id),
            ));
            Some(account)
        }
        Err(e) => {
            checks.push(PreflightCheck::fail(
                "api_connectivity",
                format!("Source API unreachable: {}", e),
                "Check source.api_base_url, source.account_id and source.api_key",
            ));
            None
        }
    };

    match store.ping().await {
        Ok(()) => {
            checks.push(PreflightCheck::pass("store_connectivity", "Local store reachable"));

            for table in REQUIRED_TABLES {
                match store.table_exists(table).await {
                    Ok(true) => {}
                    Ok(false) => missing_tables.push(table.to_string()),
                    Err(e) => {
                        error!(table, error = %e, "Table check failed");
                        missing_tables.push(table.to_string());
                    }
                }
            }
            checks.push(if missing_tables.is_empty() {
                PreflightCheck::pass("schema", "All required tables present")
            } else {
                PreflightCheck::fail(
                    "schema",
                    format!("Missing tables: {}", missing_tables.join(", ")),
                    "Apply the database migrations before syncing",
                )
            });

            match store.list_status_codes().await {
                Ok(codes) => {
                    missing_statuses = MemberStatus::ALL
                        .iter()
                        .map(|s| s.code())
                        .filter(|code| !codes.iter().any(|c| c == code))
                        .map(str::to_string)
                        .collect();
                    checks.push(if missing_statuses.is_empty() {
                        PreflightCheck::pass("status_codes", "All member status codes present")
                    } else {
                        PreflightCheck::fail(
                            "status_codes",
                            format!("Missing status codes: {}", missing_statuses.join(", ")),
                            format!(
                                "Insert the member status codes {} before syncing",
                                missing_statuses.join(", ")
                            ),
                        )
                    });
                }
                Err(e) => checks.push(PreflightCheck::fail(
                    "status_codes",
                    format!("Cannot read status codes: {}", e),
                    "Apply the database migrations before syncing",
                )),
            }
        }
        Err(e) => checks.push(PreflightCheck::fail(
            "store_connectivity",
            format!("Local store unreachable: {}", e),
            "Check database.path and file permissions",
        )),
    }

    let ok = checks.iter().all(|c| c.passed);
    if ok {
        info!("Preflight passed");
    } else {
        for check in checks.iter().filter(|c| !c.passed) {
            error!(check = check.name, message = %check.message, "Preflight check failed");
        }
    }

    PreflightReport {
        ok,
        checks,
        missing_statuses,
        missing_tables,
        account,
    }
}
