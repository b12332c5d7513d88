//! Polling of server-side asynchronous queries
//!
//! Large contact listings are computed asynchronously by the source API. The
//! first request returns a result handle; the handle is then polled until the
//! server reports a terminal state.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::PollingConfig;
use crate::error::ApiError;

/// Lifecycle of an asynchronous query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    /// Accepted, not started
    Queued,
    /// Being computed
    Processing,
    /// Results available
    Complete,
    /// Server gave up
    Failed,
    /// Poll budget exhausted
    TimedOut,
}

impl QueryState {
    /// True for states that end polling
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QueryState::Complete | QueryState::Failed | QueryState::TimedOut
        )
    }
}

/// Status reported by one poll
#[derive(Debug, Clone, PartialEq)]
pub enum PollStatus<T> {
    /// Server reports `Queued` or `Waiting`
    Queued,
    /// Server reports `Processing`
    Processing,
    /// Server reports `Complete` with the result items
    Complete(Vec<T>),
    /// Server reports `Failed` with its detail
    Failed(String),
}

impl<T> PollStatus<T> {
    /// Interpret a server state string
    ///
    /// Unrecognized states keep the query in `Processing`.
    pub fn from_server(state: &str, items: Option<Vec<T>>, detail: Option<String>) -> Self {
        match state {
            "Complete" | "Completed" => PollStatus::Complete(items.unwrap_or_default()),
            "Failed" => PollStatus::Failed(detail.unwrap_or_else(|| "no detail".to_string())),
            "Queued" | "Waiting" => PollStatus::Queued,
            "Processing" => PollStatus::Processing,
            other => {
                warn!(state = other, "Unrecognized async query state");
                PollStatus::Processing
            }
        }
    }

    /// State this status maps to
    pub fn state(&self) -> QueryState {
        match self {
            PollStatus::Queued => QueryState::Queued,
            PollStatus::Processing => QueryState::Processing,
            PollStatus::Complete(_) => QueryState::Complete,
            PollStatus::Failed(_) => QueryState::Failed,
        }
    }
}

/// Transition function of the polling state machine
pub fn next_state(
    current: QueryState,
    observed: QueryState,
    attempts: u32,
    max_attempts: u32,
) -> QueryState {
    if current.is_terminal() {
        return current;
    }
    match observed {
        QueryState::Complete | QueryState::Failed | QueryState::TimedOut => observed,
        QueryState::Queued | QueryState::Processing if attempts >= max_attempts => {
            QueryState::TimedOut
        }
        QueryState::Queued | QueryState::Processing => observed,
    }
}

/// Drives a result handle to a terminal state
#[derive(Debug, Clone)]
pub struct AsyncQueryPoller {
    interval: Duration,
    max_attempts: u32,
}

impl AsyncQueryPoller {
    /// Create a poller from the polling configuration
    pub fn new(config: &PollingConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.interval_ms),
            max_attempts: config.max_attempts.max(1),
        }
    }

    /// Poll with `fetch` until the query completes, fails or times out
    ///
    /// The first fetch runs immediately; each later fetch waits one interval.
    pub async fn poll<T, F, Fut>(&self, mut fetch: F) -> Result<Vec<T>, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<PollStatus<T>, ApiError>>,
    {
        let mut state = QueryState::Queued;
        let mut attempts = 0u32;

        loop {
            if attempts > 0 {
                tokio::time::sleep(self.interval).await;
            }

            let status = fetch().await?;
            attempts += 1;
            state = next_state(state, status.state(), attempts, self.max_attempts);

            match (state, status) {
                (QueryState::Complete, PollStatus::Complete(items)) => {
                    debug!(attempts = attempts, count = items.len(), "Async query complete");
                    return Ok(items);
                }
                (QueryState::Failed, PollStatus::Failed(detail)) => {
                    warn!(attempts = attempts, detail = %detail, "Async query failed");
                    return Err(ApiError::AsyncQueryFailed(detail));
                }
                (QueryState::TimedOut, _) => {
                    warn!(attempts = attempts, "Async query timed out");
                    return Err(ApiError::AsyncQueryTimeout { attempts });
                }
                (state, _) => {
                    debug!(attempts = attempts, state = ?state, "Async query pending");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    fn poller(interval_ms: u64, max_attempts: u32) -> AsyncQueryPoller {
        AsyncQueryPoller::new(&PollingConfig {
            interval_ms,
            max_attempts,
        })
    }

    fn scripted(
        statuses: Vec<PollStatus<i32>>,
    ) -> (Arc<Mutex<VecDeque<PollStatus<i32>>>>, Arc<Mutex<u32>>) {
        (
            Arc::new(Mutex::new(statuses.into_iter().collect())),
            Arc::new(Mutex::new(0)),
        )
    }

    // Test 1: Processing, Processing, Complete yields items after two sleeps
    #[tokio::test(start_paused = true)]
    async fn test_completes_after_two_sleeps() {
        let (script, calls) = scripted(vec![
            PollStatus::Processing,
            PollStatus::Processing,
            PollStatus::Complete(vec![1, 2, 3]),
        ]);

        let start = tokio::time::Instant::now();
        let result = poller(1000, 10)
            .poll(|| {
                let script = script.clone();
                let calls = calls.clone();
                async move {
                    *calls.lock().unwrap() += 1;
                    Ok(script.lock().unwrap().pop_front().unwrap())
                }
            })
            .await
            .unwrap();

        assert_eq!(result, vec![1, 2, 3]);
        assert_eq!(*calls.lock().unwrap(), 3);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(2000), "{:?}", elapsed);
        assert!(elapsed < Duration::from_millis(3000), "{:?}", elapsed);
    }

    // Test 2: Server failure surfaces its detail
    #[tokio::test(start_paused = true)]
    async fn test_failed_query() {
        let (script, _) = scripted(vec![
            PollStatus::Queued,
            PollStatus::Failed("quota exceeded".to_string()),
        ]);

        let result = poller(100, 10)
            .poll(|| {
                let script = script.clone();
                async move { Ok(script.lock().unwrap().pop_front().unwrap()) }
            })
            .await;

        assert_eq!(
            result,
            Err(ApiError::AsyncQueryFailed("quota exceeded".to_string()))
        );
    }

    // Test 3: Never-terminal query times out after max_attempts polls
    #[tokio::test(start_paused = true)]
    async fn test_times_out() {
        let calls = Arc::new(Mutex::new(0u32));

        let result: Result<Vec<i32>, _> = poller(100, 4)
            .poll(|| {
                let calls = calls.clone();
                async move {
                    *calls.lock().unwrap() += 1;
                    Ok(PollStatus::Processing)
                }
            })
            .await;

        assert_eq!(result, Err(ApiError::AsyncQueryTimeout { attempts: 4 }));
        assert_eq!(*calls.lock().unwrap(), 4);
    }

    // Test 4: Fetch errors propagate without further polling
    #[tokio::test(start_paused = true)]
    async fn test_fetch_error_propagates() {
        let result: Result<Vec<i32>, _> = poller(100, 4)
            .poll(|| async { Err(ApiError::Network("down".to_string())) })
            .await;

        assert_eq!(result, Err(ApiError::Network("down".to_string())));
    }

    // Test 5: Transition function
    #[test]
    fn test_next_state() {
        use QueryState::*;

        assert_eq!(next_state(Queued, Processing, 1, 5), Processing);
        assert_eq!(next_state(Processing, Queued, 2, 5), Queued);
        assert_eq!(next_state(Processing, Complete, 5, 5), Complete);
        assert_eq!(next_state(Processing, Failed, 2, 5), Failed);
        assert_eq!(next_state(Processing, Processing, 5, 5), TimedOut);
        assert_eq!(next_state(Complete, Processing, 1, 5), Complete);
        assert_eq!(next_state(TimedOut, Complete, 6, 5), TimedOut);
    }

    // Test 6: Server state strings
    #[test]
    fn test_from_server() {
        assert_eq!(
            PollStatus::<i32>::from_server("Waiting", None, None),
            PollStatus::Queued
        );
        assert_eq!(
            PollStatus::from_server("Complete", Some(vec![7]), None),
            PollStatus::Complete(vec![7])
        );
        assert_eq!(
            PollStatus::<i32>::from_server("Complete", None, None),
            PollStatus::Complete(vec![])
        );
        assert_eq!(
            PollStatus::<i32>::from_server("Failed", None, Some("boom".to_string())),
            PollStatus::Failed("boom".to_string())
        );
        assert_eq!(
            PollStatus::<i32>::from_server("Thinking", None, None),
            PollStatus::Processing
        );
    }
}
