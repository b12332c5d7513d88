//! Typed entity fetchers for the source API
//!
//! `MemberSource` is the seam between the orchestrator and the network:
//! `ApiFetcher` implements it over HTTP, tests substitute in-memory sources.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

use super::auth::AuthContext;
use super::http_client::HttpExecutor;
use super::paginator::Paginator;
use super::poller::{AsyncQueryPoller, PollStatus};
use crate::config::Config;
use crate::error::ApiError;
use crate::models::{
    AccountInfo, ApiContact, ApiEvent, ApiRegistration, ContactFieldDef, MembershipLevel,
};

/// Read access to the source membership system
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MemberSource: Send + Sync {
    /// Fetch the account summary; used as a connectivity check
    async fn check_connectivity(&self) -> Result<AccountInfo, ApiError>;

    /// Fetch contacts, optionally only those modified since a timestamp
    async fn fetch_contacts(
        &self,
        modified_since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ApiContact>, ApiError>;

    /// Fetch events, optionally only those starting on or after a timestamp
    async fn fetch_events(
        &self,
        starting_from: Option<DateTime<Utc>>,
    ) -> Result<Vec<ApiEvent>, ApiError>;

    /// Fetch the registrations of one event
    async fn fetch_registrations(&self, event_id: i64) -> Result<Vec<ApiRegistration>, ApiError>;

    /// Fetch membership levels
    async fn fetch_membership_levels(&self) -> Result<Vec<MembershipLevel>, ApiError>;

    /// Fetch the contact field schema
    async fn fetch_contact_fields(&self) -> Result<Vec<ContactFieldDef>, ApiError>;
}

/// Body of the contacts endpoint, both for the initial query and for polls
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContactsQueryResponse {
    #[serde(default)]
    result_id: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    contacts: Option<Vec<ApiContact>>,
    #[serde(default)]
    error_details: Option<String>,
}

/// `MemberSource` backed by the source REST API
#[derive(Debug, Clone)]
pub struct ApiFetcher {
    paginator: Paginator,
    poller: AsyncQueryPoller,
}

impl ApiFetcher {
    /// Create a fetcher from its parts
    pub fn new(paginator: Paginator, poller: AsyncQueryPoller) -> Self {
        Self { paginator, poller }
    }

    /// Build the full client stack for the configured account
    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        let auth = Arc::new(AuthContext::new(
            config.source.auth_url.clone(),
            config.source.api_key.clone(),
            config.retry.token_refresh_buffer_secs,
        ));
        let client = HttpExecutor::build_client(config.source.request_timeout())?;
        let base_url = format!(
            "{}/accounts/{}",
            config.source.api_base_url.trim_end_matches('/'),
            config.source.account_id
        );
        let executor = HttpExecutor::new(client, base_url, auth, config.retry.clone());

        Ok(Self::new(
            Paginator::new(executor, &config.pagination),
            AsyncQueryPoller::new(&config.polling),
        ))
    }

    fn executor(&self) -> &HttpExecutor {
        self.paginator.executor()
    }
}

/// Filter expression selecting contacts modified since `since`
pub fn contacts_filter(since: DateTime<Utc>) -> String {
    format!(
        "'Profile last updated' ge {}",
        since.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

/// Filter expression selecting events starting on or after `from`
pub fn events_filter(from: DateTime<Utc>) -> String {
    format!("StartDate ge {}", from.format("%Y-%m-%d"))
}

#[async_trait]
impl MemberSource for ApiFetcher {
    async fn check_connectivity(&self) -> Result<AccountInfo, ApiError> {
        self.executor().get_json("", &[]).await
    }

    async fn fetch_contacts(
        &self,
        modified_since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ApiContact>, ApiError> {
        let mut params = vec![("$async".to_string(), "true".to_string())];
        if let Some(since) = modified_since {
            params.push(("$filter".to_string(), contacts_filter(since)));
        }

        let initial: ContactsQueryResponse = self.executor().get_json("/contacts", &params).await?;
        let result_id = match (initial.result_id, initial.contacts) {
            (Some(id), _) => id,
            (None, Some(contacts)) => return Ok(contacts),
            (None, None) => {
                return Err(ApiError::InvalidResponse(
                    "/contacts: neither ResultId nor Contacts in response".to_string(),
                ))
            }
        };

        info!(result_id = %result_id, "Contacts query accepted, polling for results");

        let executor = self.executor();
        let poll_params = vec![("resultId".to_string(), result_id)];
        let contacts = self
            .poller
            .poll(|| {
                let params = poll_params.clone();
                async move {
                    let body: ContactsQueryResponse =
                        executor.get_json("/contacts", &params).await?;
                    Ok(PollStatus::from_server(
                        body.state.as_deref().unwrap_or("Processing"),
                        body.contacts,
                        body.error_details,
                    ))
                }
            })
            .await?;

        debug!(count = contacts.len(), "Fetched contacts");
        Ok(contacts)
    }

    async fn fetch_events(
        &self,
        starting_from: Option<DateTime<Utc>>,
    ) -> Result<Vec<ApiEvent>, ApiError> {
        let mut params = Vec::new();
        if let Some(from) = starting_from {
            params.push(("$filter".to_string(), events_filter(from)));
        }
        self.paginator.fetch_all("/events", &params, Some("Events")).await
    }

    async fn fetch_registrations(&self, event_id: i64) -> Result<Vec<ApiRegistration>, ApiError> {
        let params = vec![("eventId".to_string(), event_id.to_string())];
        self.paginator
            .fetch_all("/eventregistrations", &params, None)
            .await
    }

    async fn fetch_membership_levels(&self) -> Result<Vec<MembershipLevel>, ApiError> {
        self.executor().get_json("/membershiplevels", &[]).await
    }

    async fn fetch_contact_fields(&self) -> Result<Vec<ContactFieldDef>, ApiError> {
        self.executor().get_json("/contactfields", &[]).await
    }
}
