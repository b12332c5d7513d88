//! Configuration management for membership-sync
//!
//! This module handles loading, parsing, and validating application configuration
//! from YAML files and environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Source API connection settings
    #[serde(default)]
    pub source: SourceConfig,

    /// Retry policy for API calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Pagination settings
    #[serde(default)]
    pub pagination: PaginationConfig,

    /// Async query polling settings
    #[serde(default)]
    pub polling: PollingConfig,

    /// Sync orchestration settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileRead(format!("Failed to read config file: {}", e)))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        // First, expand environment variables in the YAML string
        let expanded = expand_env_vars(yaml);
        serde_yaml::from_str(&expanded)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse YAML: {}", e)))
    }

    /// Load configuration from environment variables with prefix MEMBERSHIP_SYNC_
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Ok(url) = std::env::var("MEMBERSHIP_SYNC_API_BASE_URL") {
            config.source.api_base_url = url;
        }
        if let Ok(url) = std::env::var("MEMBERSHIP_SYNC_AUTH_URL") {
            config.source.auth_url = url;
        }
        if let Ok(account) = std::env::var("MEMBERSHIP_SYNC_ACCOUNT_ID") {
            config.source.account_id = account;
        }
        if let Ok(key) = std::env::var("MEMBERSHIP_SYNC_API_KEY") {
            config.source.api_key = key;
        }
        if let Ok(org) = std::env::var("MEMBERSHIP_SYNC_ORGANIZATION_ID") {
            config.sync.organization_id = org;
        }
        if let Ok(path) = std::env::var("MEMBERSHIP_SYNC_DATABASE_PATH") {
            config.database.path = path;
        }
        if let Ok(dir) = std::env::var("MEMBERSHIP_SYNC_REPORT_DIR") {
            config.sync.report_dir = dir;
        }
        if let Ok(retries) = std::env::var("MEMBERSHIP_SYNC_MAX_RETRIES") {
            config.retry.max_retries = retries
                .parse()
                .map_err(|_| ConfigError::Parse("Invalid max retries".to_string()))?;
        }
        if let Ok(level) = std::env::var("MEMBERSHIP_SYNC_LOG_LEVEL") {
            config.logging.level = level;
        }

        Ok(config)
    }

    /// Check values that have no usable default
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.account_id.trim().is_empty() {
            return Err(ConfigError::MissingRequired("source.account_id".to_string()));
        }
        if self.source.api_key.trim().is_empty() {
            return Err(ConfigError::MissingRequired("source.api_key".to_string()));
        }
        if self.pagination.page_size == 0 {
            return Err(ConfigError::InvalidValue(
                "pagination.page_size must be greater than zero".to_string(),
            ));
        }
        if self.sync.batch_size == 0 {
            return Err(ConfigError::InvalidValue(
                "sync.batch_size must be greater than zero".to_string(),
            ));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::InvalidValue(
                "retry.base_delay_ms must not exceed retry.max_delay_ms".to_string(),
            ));
        }
        self.sync.validate()
    }
}

/// Source API connection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceConfig {
    /// Versioned REST base URL
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Token endpoint for the client-credentials exchange
    #[serde(default = "default_auth_url")]
    pub auth_url: String,

    /// Account identifier in the source system
    #[serde(default)]
    pub account_id: String,

    /// API key used for the token exchange
    #[serde(default)]
    pub api_key: String,

    /// Per-request deadline in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl SourceConfig {
    /// Per-request deadline
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            auth_url: default_auth_url(),
            account_id: String::new(),
            api_key: String::new(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_api_base_url() -> String {
    "https://api.wildapricot.org/v2.2".to_string()
}

fn default_auth_url() -> String {
    "https://oauth.wildapricot.org/auth/token".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

/// Retry configuration for source API calls
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retries per request and failure class
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay for exponential backoff in milliseconds
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    /// Backoff cap in milliseconds
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Upper bound of the random jitter added to each delay
    #[serde(default = "default_max_jitter")]
    pub max_jitter_ms: u64,

    /// Wait applied on 429 when the server sends no usable Retry-After
    #[serde(default = "default_rate_limit_wait")]
    pub rate_limit_default_wait_secs: u64,

    /// Tokens are refreshed this long before they expire
    #[serde(default = "default_token_refresh_buffer")]
    pub token_refresh_buffer_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            max_jitter_ms: default_max_jitter(),
            rate_limit_default_wait_secs: default_rate_limit_wait(),
            token_refresh_buffer_secs: default_token_refresh_buffer(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay() -> u64 {
    1000
}

fn default_max_delay() -> u64 {
    30_000
}

fn default_max_jitter() -> u64 {
    1000
}

fn default_rate_limit_wait() -> u64 {
    60
}

fn default_token_refresh_buffer() -> u64 {
    60
}

/// Pagination settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaginationConfig {
    /// Items requested per page (`$top`)
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Upper bound on pages fetched for a single listing
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_pages: default_max_pages(),
        }
    }
}

fn default_page_size() -> u32 {
    100
}

fn default_max_pages() -> u32 {
    10_000
}

/// Async query polling settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PollingConfig {
    /// Delay between status polls in milliseconds
    #[serde(default = "default_poll_interval")]
    pub interval_ms: u64,

    /// Maximum number of status polls
    #[serde(default = "default_poll_attempts")]
    pub max_attempts: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval(),
            max_attempts: default_poll_attempts(),
        }
    }
}

fn default_poll_interval() -> u64 {
    3000
}

fn default_poll_attempts() -> u32 {
    40
}

/// Sync orchestration settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncConfig {
    /// Key of the singleton sync state row
    #[serde(default = "default_organization_id")]
    pub organization_id: String,

    /// Contact window for an incremental run that has no previous contact sync
    #[serde(default = "default_contacts_lookback")]
    pub contacts_lookback_days: u32,

    /// Event window for incremental runs
    #[serde(default = "default_events_lookback")]
    pub events_lookback_days: u32,

    /// Records per progress batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Full runs fetching fewer contacts than this are flagged
    #[serde(default = "default_min_expected_contacts")]
    pub min_expected_contacts: u64,

    /// Full runs fetching fewer events than this are flagged
    #[serde(default = "default_min_expected_events")]
    pub min_expected_events: u64,

    /// Errors kept in the report sample
    #[serde(default = "default_max_report_errors")]
    pub max_report_errors: usize,

    /// Record-level warnings kept in the report
    #[serde(default = "default_max_report_warnings")]
    pub max_report_warnings: usize,

    /// Record outcomes kept per entity category
    #[serde(default = "default_max_report_records")]
    pub max_report_records: usize,

    /// Directory receiving report files
    #[serde(default = "default_report_dir")]
    pub report_dir: String,
}

/// Longest accepted incremental window, in days
pub const MAX_LOOKBACK_DAYS: u32 = 36_500;

impl SyncConfig {
    /// Check the incremental windows
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, days) in [
            ("sync.contacts_lookback_days", self.contacts_lookback_days),
            ("sync.events_lookback_days", self.events_lookback_days),
        ] {
            if !(1..=MAX_LOOKBACK_DAYS).contains(&days) {
                return Err(ConfigError::InvalidValue(format!(
                    "{} must be between 1 and {}, got {}",
                    name, MAX_LOOKBACK_DAYS, days
                )));
            }
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            organization_id: default_organization_id(),
            contacts_lookback_days: default_contacts_lookback(),
            events_lookback_days: default_events_lookback(),
            batch_size: default_batch_size(),
            min_expected_contacts: default_min_expected_contacts(),
            min_expected_events: default_min_expected_events(),
            max_report_errors: default_max_report_errors(),
            max_report_warnings: default_max_report_warnings(),
            max_report_records: default_max_report_records(),
            report_dir: default_report_dir(),
        }
    }
}

fn default_organization_id() -> String {
    "default".to_string()
}

fn default_contacts_lookback() -> u32 {
    7
}

fn default_events_lookback() -> u32 {
    30
}

fn default_batch_size() -> usize {
    100
}

fn default_min_expected_contacts() -> u64 {
    50
}

fn default_min_expected_events() -> u64 {
    5
}

fn default_max_report_errors() -> usize {
    100
}

fn default_max_report_warnings() -> usize {
    200
}

fn default_max_report_records() -> usize {
    500
}

fn default_report_dir() -> String {
    "reports".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    "data/membership-sync.db".to_string()
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (json or pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Configuration error types
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Error reading configuration file
    #[error("Failed to read configuration file: {0}")]
    FileRead(String),

    /// Error parsing configuration
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// Invalid configuration value
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// Missing required configuration
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

/// Expand environment variables in a string
///
/// Supports `${VAR_NAME}` syntax
fn expand_env_vars(input: &str) -> String {
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}")
        .expect("Invalid regex pattern for environment variable expansion");

    re.replace_all(input, |caps: &regex_lite::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}
