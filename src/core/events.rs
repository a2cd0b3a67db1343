use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Job/agent status as reported on the wire and stored in the registry.
/// Kebab-case on the wire (`in-progress`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in-progress",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

/// Marker event types the agent emits when a migration reaches a terminal
/// state, distinct from the per-event `agentStatus`.
pub const MIGRATION_COMPLETED: &str = "MIGRATION_COMPLETED";
pub const MIGRATION_FAILED: &str = "MIGRATION_FAILED";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventOutput {
    #[serde(default)]
    pub yaml: Option<String>,
}

/// One observation emitted by the remote agent while a migration runs.
///
/// Timestamps are not guaranteed unique or monotone across fetches; the
/// `(correlationId, timestamp)` pair is the dedup key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "correlationId")]
    pub correlation_id: String,
    pub timestamp: i64,
    #[serde(default)]
    pub message: String,
    #[serde(rename = "agentStatus")]
    pub agent_status: JobStatus,
    #[serde(rename = "event_type", default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(rename = "toolOutput", default, skip_serializing_if = "Option::is_none")]
    pub tool_output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<EventOutput>,
}

/// Append-only accumulated event log for one subscription.
///
/// The server returns the full event set on every fetch, so consecutive
/// batches overlap; merging keeps the first appearance of each
/// `(correlationId, timestamp)` pair and never removes anything. Two distinct
/// events sharing a key collapse to the first seen (accepted lossy policy).
#[derive(Debug, Default)]
pub struct EventLog {
    events: Vec<Event>,
    seen: HashSet<(String, i64)>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a freshly fetched batch, returning how many events were new.
    pub fn merge(&mut self, fetched: Vec<Event>) -> usize {
        let mut added = 0;
        for event in fetched {
            let key = (event.correlation_id.clone(), event.timestamp);
            if self.seen.insert(key) {
                self.events.push(event);
                added += 1;
            }
        }
        added
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Result of scanning an accumulated event set for terminal markers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    /// The job reached a terminal state (success *or* failure).
    pub terminal: bool,
    /// Derived final status when terminal. A failure marker without any
    /// completing evidence resolves to `Failed` so the registry never goes
    /// stale on a failed migration.
    pub status: Option<JobStatus>,
    /// Generated pipeline YAML from the first completing event carrying one.
    pub yaml: Option<String>,
}

/// Inspect the accumulated events for terminal markers. Pure and idempotent:
/// re-evaluating the same set yields the same result, and adding events never
/// turns a terminal result back into a non-terminal one.
pub fn evaluate(events: &[Event]) -> Completion {
    let completed = events.iter().any(|e| {
        e.agent_status == JobStatus::Completed
            || e.event_type.as_deref() == Some(MIGRATION_COMPLETED)
    });
    let failed = events
        .iter()
        .any(|e| e.event_type.as_deref() == Some(MIGRATION_FAILED));

    let status = if completed {
        Some(JobStatus::Completed)
    } else if failed {
        Some(JobStatus::Failed)
    } else {
        None
    };

    let yaml = events
        .iter()
        .find(|e| {
            e.agent_status == JobStatus::Completed
                && e.output
                    .as_ref()
                    .and_then(|o| o.yaml.as_deref())
                    .is_some_and(|y| !y.is_empty())
        })
        .and_then(|e| e.output.as_ref())
        .and_then(|o| o.yaml.clone());

    Completion {
        terminal: completed || failed,
        status,
        yaml,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(correlation_id: &str, timestamp: i64, status: JobStatus) -> Event {
        Event {
            correlation_id: correlation_id.to_string(),
            timestamp,
            message: format!("event at {}", timestamp),
            agent_status: status,
            event_type: None,
            tool: None,
            tool_output: None,
            output: None,
        }
    }

    fn with_yaml(mut e: Event, yaml: &str) -> Event {
        e.output = Some(EventOutput {
            yaml: Some(yaml.to_string()),
        });
        e
    }

    #[test]
    fn merging_a_batch_into_itself_is_idempotent() {
        let batch = vec![
            event("c1", 1, JobStatus::InProgress),
            event("c1", 2, JobStatus::InProgress),
        ];
        let mut log = EventLog::new();
        assert_eq!(log.merge(batch.clone()), 2);
        assert_eq!(log.merge(batch), 0);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn accumulation_is_monotone_across_overlapping_fetches() {
        let mut log = EventLog::new();
        let mut prev_len = 0;
        for n in 1..=5 {
            // Each fetch returns the full set so far, overlapping all prior ones.
            let batch: Vec<Event> = (1..=n)
                .map(|t| event("c1", t, JobStatus::InProgress))
                .collect();
            log.merge(batch);
            assert!(log.len() >= prev_len);
            prev_len = log.len();
        }
        assert_eq!(log.len(), 5);
    }

    #[test]
    fn first_seen_wins_on_timestamp_collision() {
        let mut log = EventLog::new();
        let mut first = event("c1", 7, JobStatus::InProgress);
        first.message = "first".to_string();
        let mut second = event("c1", 7, JobStatus::InProgress);
        second.message = "second".to_string();
        log.merge(vec![first, second]);
        assert_eq!(log.len(), 1);
        assert_eq!(log.events()[0].message, "first");
    }

    #[test]
    fn same_timestamp_different_correlation_ids_are_distinct() {
        let mut log = EventLog::new();
        log.merge(vec![
            event("c1", 1, JobStatus::InProgress),
            event("c2", 1, JobStatus::InProgress),
        ]);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn no_terminal_marker_means_not_terminal() {
        let events = vec![
            event("c1", 1, JobStatus::Pending),
            event("c1", 2, JobStatus::InProgress),
        ];
        assert_eq!(evaluate(&events), Completion::default());
    }

    #[test]
    fn completed_agent_status_is_terminal() {
        let events = vec![event("c1", 1, JobStatus::Completed)];
        let c = evaluate(&events);
        assert!(c.terminal);
        assert_eq!(c.status, Some(JobStatus::Completed));
    }

    #[test]
    fn completed_marker_event_is_terminal() {
        let mut e = event("c1", 1, JobStatus::InProgress);
        e.event_type = Some(MIGRATION_COMPLETED.to_string());
        let c = evaluate(&[e]);
        assert!(c.terminal);
        assert_eq!(c.status, Some(JobStatus::Completed));
    }

    #[test]
    fn failure_marker_alone_resolves_to_failed() {
        let mut e = event("c1", 3, JobStatus::InProgress);
        e.event_type = Some(MIGRATION_FAILED.to_string());
        let c = evaluate(&[e]);
        assert!(c.terminal);
        assert_eq!(c.status, Some(JobStatus::Failed));
        assert_eq!(c.yaml, None);
    }

    #[test]
    fn terminal_result_is_stable_under_more_events() {
        let mut events = vec![event("c1", 1, JobStatus::Completed)];
        assert!(evaluate(&events).terminal);
        events.push(event("c1", 2, JobStatus::InProgress));
        events.push(event("c1", 3, JobStatus::Pending));
        assert!(evaluate(&events).terminal);
    }

    #[test]
    fn yaml_comes_from_first_completing_event_with_output() {
        let events = vec![
            event("c1", 1, JobStatus::InProgress),
            with_yaml(event("c1", 2, JobStatus::Completed), "pipeline: {}"),
            with_yaml(event("c1", 3, JobStatus::Completed), "pipeline: other"),
        ];
        let c = evaluate(&events);
        assert_eq!(c.yaml.as_deref(), Some("pipeline: {}"));
    }

    #[test]
    fn empty_yaml_output_is_ignored() {
        let events = vec![with_yaml(event("c1", 1, JobStatus::Completed), "")];
        let c = evaluate(&events);
        assert!(c.terminal);
        assert_eq!(c.yaml, None);
    }

    #[test]
    fn event_deserializes_from_wire_shape() {
        let raw = r#"{
            "correlationId": "c1",
            "timestamp": 42,
            "message": "converting stages",
            "agentStatus": "in-progress",
            "event_type": "TOOL_INVOCATION",
            "tool": "stage-converter",
            "output": {"yaml": null}
        }"#;
        let e: Event = serde_json::from_str(raw).unwrap();
        assert_eq!(e.correlation_id, "c1");
        assert_eq!(e.agent_status, JobStatus::InProgress);
        assert_eq!(e.event_type.as_deref(), Some("TOOL_INVOCATION"));
        assert_eq!(e.output.unwrap().yaml, None);
    }
}
