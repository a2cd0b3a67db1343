//! Event polling for one watched migration.
//!
//! One scheduler loop per correlation id: fetch, merge into the accumulated
//! log, check for terminal markers, then either stop or schedule the next
//! fetch. Polling is serialized within a subscription (fetch N+1 is never
//! issued before fetch N has been fully handled); subscriptions for different
//! correlation ids are independent and share only the job registry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::api::{ApiClient, ApiError};
use super::events::{self, Event, EventLog, JobStatus};
use super::registry::{Job, JobRegistry};

/// Steady-state wait between successful polls.
pub const POLL_INTERVAL: Duration = Duration::from_millis(3000);
/// Longer wait after a transient failure.
pub const RETRY_INTERVAL: Duration = Duration::from_millis(6000);
/// Transient retries before giving up: 3 attempts total including the original.
pub const MAX_TRANSIENT_RETRIES: u32 = 2;

/// Source of events for the poller. [`ApiClient`] in production; tests script
/// their own.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn fetch_events(&self, correlation_id: &str) -> Result<Vec<Event>, ApiError>;
}

#[async_trait]
impl EventSource for ApiClient {
    async fn fetch_events(&self, correlation_id: &str) -> Result<Vec<Event>, ApiError> {
        ApiClient::fetch_events(self, correlation_id).await
    }
}

/// Externally observable scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollState {
    /// Not watching anything (never entered, or torn down before finishing).
    #[default]
    Idle,
    /// Actively fetching, including transient backoff between retries.
    Polling,
    /// The job reached a terminal state and the registry was updated.
    Completed,
    /// A fatal error or exhausted retries stopped the subscription for good.
    FailedFatal,
}

/// Snapshot published to watchers after every poll iteration.
#[derive(Debug, Clone, Default)]
pub struct PollSnapshot {
    pub state: PollState,
    /// Accumulated deduplicated event log, in first-appearance order.
    pub events: Vec<Event>,
    pub is_polling: bool,
    /// Last classified error message; cleared by the next successful poll.
    pub error: Option<String>,
    /// Generated pipeline YAML once a completing event carried one.
    pub yaml: Option<String>,
    /// The job reached a terminal state (success or failure).
    pub completed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorClass {
    Fatal,
    Transient,
}

/// Auth failures stop the subscription permanently; everything else is
/// retried. Structured kinds decide first; raw transport text falls back to
/// the substring heuristics ("401"/"403", case-insensitive
/// "unauthorized"/"unauthenticated") because connection-level errors only
/// carry text.
fn classify(err: &ApiError) -> ErrorClass {
    match err {
        ApiError::Unauthenticated | ApiError::Unauthorized | ApiError::Forbidden => {
            ErrorClass::Fatal
        }
        ApiError::Api { status: 401 | 403, .. } => ErrorClass::Fatal,
        ApiError::Api { .. } | ApiError::InvalidResponse(_) => ErrorClass::Transient,
        ApiError::Transport(msg) if text_indicates_auth_failure(msg) => ErrorClass::Fatal,
        ApiError::Transport(_) => ErrorClass::Transient,
    }
}

fn text_indicates_auth_failure(msg: &str) -> bool {
    if msg.contains("401") || msg.contains("403") {
        return true;
    }
    let lower = msg.to_lowercase();
    lower.contains("unauthorized") || lower.contains("unauthenticated")
}

/// User-facing message for a classified error, retained until the next
/// successful poll.
fn display_message(err: &ApiError) -> String {
    match err {
        ApiError::Unauthenticated => {
            return "You are not authenticated. Please log in.".to_string();
        }
        ApiError::Unauthorized => {
            return "Authentication failed (401). Please log in again.".to_string();
        }
        ApiError::Forbidden => {
            return "You do not have permission to view this migration (403).".to_string();
        }
        _ => {}
    }
    let raw = err.to_string();
    if raw.contains("401") {
        return "Authentication failed (401). Please log in again.".to_string();
    }
    if raw.contains("403") {
        return "You do not have permission to view this migration (403).".to_string();
    }
    let lower = raw.to_lowercase();
    if lower.contains("unauthenticated") {
        return "You are not authenticated. Please log in.".to_string();
    }
    if lower.contains("unauthorized") {
        return "Unauthorized access. Please check your token.".to_string();
    }
    format!("Unexpected error: {}", raw)
}

/// Handle to one running poll loop.
pub struct Subscription {
    correlation_id: String,
    rx: watch::Receiver<PollSnapshot>,
    cancel: CancellationToken,
    handle: JoinHandle<PollState>,
}

impl Subscription {
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn snapshot(&self) -> PollSnapshot {
        self.rx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<PollSnapshot> {
        self.rx.clone()
    }

    /// Tear the subscription down. Any in-flight fetch resolves into a no-op:
    /// the loop re-checks the token before applying results or rescheduling.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Wait for the loop to finish and return its final state.
    pub async fn join(self) -> PollState {
        self.handle.await.unwrap_or(PollState::FailedFatal)
    }
}

/// Start polling events for a correlation id. The first fetch is issued
/// immediately with no initial delay. Terminal findings are upserted into the
/// registry before the terminal snapshot is published to watchers.
pub fn subscribe(
    source: Arc<dyn EventSource>,
    registry: Arc<JobRegistry>,
    correlation_id: &str,
) -> Subscription {
    let (tx, rx) = watch::channel(PollSnapshot {
        state: PollState::Polling,
        is_polling: true,
        ..Default::default()
    });
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(run_loop(
        source,
        registry,
        correlation_id.to_string(),
        cancel.clone(),
        tx,
    ));
    Subscription {
        correlation_id: correlation_id.to_string(),
        rx,
        cancel,
        handle,
    }
}

async fn run_loop(
    source: Arc<dyn EventSource>,
    registry: Arc<JobRegistry>,
    correlation_id: String,
    cancel: CancellationToken,
    tx: watch::Sender<PollSnapshot>,
) -> PollState {
    let mut log = EventLog::new();
    let mut retries: u32 = 0;
    let mut snap = PollSnapshot {
        state: PollState::Polling,
        is_polling: true,
        ..Default::default()
    };

    loop {
        let fetched = tokio::select! {
            _ = cancel.cancelled() => return teardown(&tx, &mut snap),
            res = source.fetch_events(&correlation_id) => res,
        };
        // A fetch that resolved after teardown must not mutate shared state
        // or reschedule.
        if cancel.is_cancelled() {
            return teardown(&tx, &mut snap);
        }

        match fetched {
            Ok(batch) => {
                let added = log.merge(batch);
                debug!(
                    correlation_id = %correlation_id,
                    added,
                    total = log.len(),
                    "merged event batch"
                );
                snap.events = log.events().to_vec();
                snap.error = None;

                let completion = events::evaluate(log.events());
                if completion.terminal {
                    let status = completion.status.unwrap_or(JobStatus::Completed);
                    // Persist before publishing: a watcher may exit the
                    // process the moment it sees the terminal snapshot.
                    if let Err(e) = registry
                        .upsert(Job::status_update(
                            &correlation_id,
                            status,
                            completion.yaml.clone(),
                        ))
                        .await
                    {
                        warn!(
                            correlation_id = %correlation_id,
                            "failed to persist terminal status: {}", e
                        );
                    }
                    snap.completed = true;
                    snap.yaml = completion.yaml;
                    snap.is_polling = false;
                    snap.state = PollState::Completed;
                    let _ = tx.send(snap.clone());
                    return PollState::Completed;
                }

                retries = 0;
                let _ = tx.send(snap.clone());
                if !wait(&cancel, POLL_INTERVAL).await {
                    return teardown(&tx, &mut snap);
                }
            }
            Err(err) => {
                snap.error = Some(display_message(&err));
                match classify(&err) {
                    ErrorClass::Fatal => {
                        warn!(
                            correlation_id = %correlation_id,
                            "fatal poll error, stopping: {}", err
                        );
                        snap.is_polling = false;
                        snap.state = PollState::FailedFatal;
                        let _ = tx.send(snap.clone());
                        return PollState::FailedFatal;
                    }
                    ErrorClass::Transient if retries < MAX_TRANSIENT_RETRIES => {
                        retries += 1;
                        debug!(
                            correlation_id = %correlation_id,
                            retries, "transient poll error, backing off: {}", err
                        );
                        let _ = tx.send(snap.clone());
                        if !wait(&cancel, RETRY_INTERVAL).await {
                            return teardown(&tx, &mut snap);
                        }
                    }
                    ErrorClass::Transient => {
                        warn!(
                            correlation_id = %correlation_id,
                            "transient retries exhausted, stopping: {}", err
                        );
                        snap.is_polling = false;
                        snap.state = PollState::FailedFatal;
                        let _ = tx.send(snap.clone());
                        return PollState::FailedFatal;
                    }
                }
            }
        }
    }
}

/// Sleep unless cancelled first. Returns false when the subscription was torn
/// down during the wait.
async fn wait(cancel: &CancellationToken, interval: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(interval) => true,
    }
}

fn teardown(tx: &watch::Sender<PollSnapshot>, snap: &mut PollSnapshot) -> PollState {
    snap.is_polling = false;
    snap.state = PollState::Idle;
    let _ = tx.send(snap.clone());
    PollState::Idle
}
