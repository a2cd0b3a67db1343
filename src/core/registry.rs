use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;

use super::events::JobStatus;
use super::store::KvStore;
use super::tools::ToolKind;

/// Fixed storage key for the recent-jobs blob.
pub const RECENT_JOBS_KEY: &str = "recent_jobs";

/// The registry keeps only the most recent jobs; older ones are evicted.
pub const MAX_RECENT_JOBS: usize = 10;

/// A submitted migration job. `id` is the correlation id assigned by the
/// platform on submission and is unique within the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<ToolKind>,
    #[serde(default)]
    pub created_at: i64,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yaml: Option<String>,
}

impl Job {
    /// A freshly submitted job, before any events have been observed.
    pub fn submitted(id: &str, name: &str, tool: ToolKind) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            tool: Some(tool),
            created_at: now_millis(),
            status: JobStatus::InProgress,
            yaml: None,
        }
    }

    /// A partial update carrying only what the poller derived. Empty name and
    /// tool so the merge never blanks out what the user submitted with.
    pub fn status_update(id: &str, status: JobStatus, yaml: Option<String>) -> Self {
        Self {
            id: id.to_string(),
            name: String::new(),
            tool: None,
            created_at: now_millis(),
            status,
            yaml,
        }
    }
}

pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// The persisted, size-bounded recent-jobs list, most recent first.
///
/// Every mutation is written through to the store before the call returns.
/// The interior mutex serializes upserts from concurrent poll subscriptions
/// so no entry is ever dropped by a read-modify-write race.
pub struct JobRegistry {
    store: Arc<dyn KvStore>,
    jobs: Mutex<Vec<Job>>,
}

impl JobRegistry {
    /// Rehydrate from the store. Missing or corrupt data starts empty.
    pub async fn load(store: Arc<dyn KvStore>) -> Self {
        let jobs = match store.load(RECENT_JOBS_KEY).await {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<Job>>(&raw) {
                Ok(jobs) => jobs,
                Err(e) => {
                    warn!("Stored recent jobs are not valid JSON, starting empty: {}", e);
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("Failed to read recent jobs, starting empty: {}", e);
                Vec::new()
            }
        };
        Self {
            store,
            jobs: Mutex::new(jobs),
        }
    }

    /// Insert-or-merge by id.
    ///
    /// Existing entries are updated in place: empty `name`/`tool` in the
    /// incoming job keep the stored values, and a terminal status is frozen
    /// (status never regresses once `completed` or `failed`). New entries are
    /// prepended and the list is truncated to [`MAX_RECENT_JOBS`].
    pub async fn upsert(&self, job: Job) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        if let Some(existing) = jobs.iter_mut().find(|j| j.id == job.id) {
            if !job.name.is_empty() {
                existing.name = job.name;
            }
            if job.tool.is_some() {
                existing.tool = job.tool;
            }
            if job.yaml.is_some() {
                existing.yaml = job.yaml;
            }
            if !existing.status.is_terminal() {
                existing.status = job.status;
            }
        } else {
            jobs.insert(0, job);
            jobs.truncate(MAX_RECENT_JOBS);
        }
        self.persist(&jobs).await
    }

    /// Remove an entry by id. Absent ids are not an error.
    pub async fn remove(&self, id: &str) -> Result<bool> {
        let mut jobs = self.jobs.lock().await;
        let before = jobs.len();
        jobs.retain(|j| j.id != id);
        let removed = jobs.len() != before;
        if removed {
            self.persist(&jobs).await?;
        }
        Ok(removed)
    }

    pub async fn get_by_id(&self, id: &str) -> Option<Job> {
        self.jobs.lock().await.iter().find(|j| j.id == id).cloned()
    }

    /// All known jobs, most recent first.
    pub async fn list(&self) -> Vec<Job> {
        self.jobs.lock().await.clone()
    }

    async fn persist(&self, jobs: &[Job]) -> Result<()> {
        let raw = serde_json::to_string(jobs)?;
        self.store.save(RECENT_JOBS_KEY, &raw).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::MemoryStore;

    async fn registry() -> (Arc<MemoryStore>, JobRegistry) {
        let store = Arc::new(MemoryStore::new());
        let registry = JobRegistry::load(store.clone()).await;
        (store, registry)
    }

    #[tokio::test]
    async fn inserting_past_the_cap_evicts_oldest_first() {
        let (_store, registry) = registry().await;
        for n in 0..11 {
            registry
                .upsert(Job::submitted(
                    &format!("c{}", n),
                    &format!("job {}", n),
                    ToolKind::Jenkins,
                ))
                .await
                .unwrap();
        }
        let jobs = registry.list().await;
        assert_eq!(jobs.len(), MAX_RECENT_JOBS);
        assert_eq!(jobs[0].id, "c10");
        assert!(jobs.iter().all(|j| j.id != "c0"), "oldest entry evicted");
    }

    #[tokio::test]
    async fn status_update_preserves_name_and_tool() {
        let (_store, registry) = registry().await;
        registry
            .upsert(Job::submitted("x", "Foo", ToolKind::Jenkins))
            .await
            .unwrap();
        registry
            .upsert(Job::status_update("x", JobStatus::Completed, None))
            .await
            .unwrap();

        let job = registry.get_by_id("x").await.unwrap();
        assert_eq!(job.name, "Foo");
        assert_eq!(job.tool, Some(ToolKind::Jenkins));
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn terminal_status_never_regresses() {
        let (_store, registry) = registry().await;
        registry
            .upsert(Job::submitted("x", "Foo", ToolKind::Spinnaker))
            .await
            .unwrap();
        registry
            .upsert(Job::status_update("x", JobStatus::Failed, None))
            .await
            .unwrap();
        registry
            .upsert(Job::status_update("x", JobStatus::InProgress, None))
            .await
            .unwrap();
        assert_eq!(registry.get_by_id("x").await.unwrap().status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn upsert_keeps_yaml_when_update_has_none() {
        let (_store, registry) = registry().await;
        registry
            .upsert(Job::status_update(
                "x",
                JobStatus::Completed,
                Some("pipeline: {}".to_string()),
            ))
            .await
            .unwrap();
        registry
            .upsert(Job::status_update("x", JobStatus::Completed, None))
            .await
            .unwrap();
        assert_eq!(
            registry.get_by_id("x").await.unwrap().yaml.as_deref(),
            Some("pipeline: {}")
        );
    }

    #[tokio::test]
    async fn remove_is_silent_for_absent_ids() {
        let (_store, registry) = registry().await;
        assert!(!registry.remove("ghost").await.unwrap());
        registry
            .upsert(Job::submitted("c1", "job", ToolKind::UrbanCode))
            .await
            .unwrap();
        assert!(registry.remove("c1").await.unwrap());
        assert_eq!(registry.get_by_id("c1").await, None);
    }

    #[tokio::test]
    async fn mutations_persist_across_reload() {
        let (store, registry) = registry().await;
        registry
            .upsert(Job::submitted("c1", "survivor", ToolKind::AzureDevops))
            .await
            .unwrap();
        drop(registry);

        let reloaded = JobRegistry::load(store).await;
        let job = reloaded.get_by_id("c1").await.unwrap();
        assert_eq!(job.name, "survivor");
        assert_eq!(job.status, JobStatus::InProgress);
    }

    #[tokio::test]
    async fn corrupt_stored_blob_starts_empty() {
        let store = Arc::new(MemoryStore::new());
        store.save(RECENT_JOBS_KEY, "[{bad json").await.unwrap();
        let registry = JobRegistry::load(store).await;
        assert!(registry.list().await.is_empty());
    }

    #[tokio::test]
    async fn concurrent_upserts_do_not_drop_entries() {
        let (_store, registry) = registry().await;
        let registry = Arc::new(registry);
        let mut handles = Vec::new();
        for n in 0..8 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry
                    .upsert(Job::submitted(
                        &format!("c{}", n),
                        &format!("job {}", n),
                        ToolKind::Jenkins,
                    ))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(registry.list().await.len(), 8);
    }
}
