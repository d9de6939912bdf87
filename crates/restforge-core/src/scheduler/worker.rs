// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Job queue behind the scheduler.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    query::{Q, Query},
    resource::apply_update,
    store::Store
};

/// Lifecycle of a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    /// Claimed by a run; can no longer be canceled.
    Running,
    Finished,
    Failed,
    Canceled
}

/// Update to run later.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateJob {
    /// Target entity.
    pub entity:  String,
    /// Equality filter selecting exactly one row.
    pub lookup:  Map<String, Value>,
    /// Validated update payload.
    pub form:    Map<String, Value>,
    /// Searchable labels shown in job listings.
    pub context: IndexMap<String, String>
}

/// Queued job as listed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub id:      String,
    pub at:      DateTime<Utc>,
    pub status:  JobStatus,
    pub entity:  String,
    pub lookup:  Map<String, Value>,
    pub form:    Map<String, Value>,
    pub context: IndexMap<String, String>,
    /// Error text of a failed run; empty otherwise.
    pub result:  String
}

/// One window of jobs and the number of jobs matching the filter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobPage {
    pub total: usize,
    pub data:  Vec<Job>
}

/// Storage for deferred updates.
#[async_trait]
pub trait Worker: Send + Sync + 'static {
    /// Queue `job` to run at `at`; returns the job id.
    async fn enqueue_at(&self, at: DateTime<Utc>, job: UpdateJob) -> ApiResult<String>;

    /// Jobs whose context contains every filter value, latest first.
    async fn list(
        &self,
        offset: usize,
        limit: usize,
        filter: &IndexMap<String, String>
    ) -> ApiResult<JobPage>;

    /// Cancel a pending job. Jobs that already ran are left alone; a job
    /// that is running is refused with a conflict.
    async fn cancel(&self, id: &str) -> ApiResult<()>;

    /// When the earliest pending job is due, if any.
    async fn next_due(&self) -> ApiResult<Option<DateTime<Utc>>>;
}

/// Process-local [`Worker`]. Due jobs run when [`MemoryWorker::run_due`]
/// is called.
#[derive(Debug, Default)]
pub struct MemoryWorker {
    jobs: Mutex<IndexMap<String, Job>>
}

impl MemoryWorker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every pending job due at `now` against `store`; returns how many
    /// ran. Each job commits or rolls back on its own.
    ///
    /// Due jobs are marked running before the lock is released, so a
    /// concurrent run skips them and [`Worker::cancel`] refuses them.
    pub async fn run_due(&self, now: DateTime<Utc>, store: &dyn Store) -> usize {
        let claimed = self.claim_due(now);
        for job in &claimed {
            let outcome = run_job(store, job).await;
            self.settle(job, outcome);
        }
        claimed.len()
    }

    fn claim_due(&self, now: DateTime<Utc>) -> Vec<Job> {
        self.jobs
            .lock()
            .values_mut()
            .filter(|job| job.status == JobStatus::Pending && job.at <= now)
            .map(|job| {
                job.status = JobStatus::Running;
                job.clone()
            })
            .collect()
    }

    fn settle(&self, job: &Job, outcome: ApiResult<()>) {
        let mut jobs = self.jobs.lock();
        let Some(stored) = jobs.get_mut(&job.id) else {
            return;
        };
        if stored.status != JobStatus::Running {
            tracing::warn!(job = %job.id, status = ?stored.status, "job left its running state");
            return;
        }
        match outcome {
            Ok(()) => {
                tracing::info!(job = %job.id, entity = %job.entity, "scheduled update applied");
                stored.status = JobStatus::Finished;
            }
            Err(err) => {
                tracing::warn!(job = %job.id, entity = %job.entity, error = %err, "scheduled update failed");
                stored.status = JobStatus::Failed;
                stored.result = err.to_string();
            }
        }
    }
}

async fn run_job(store: &dyn Store, job: &Job) -> ApiResult<()> {
    let entity = store.registry().entity(&job.entity)?.name();
    let query = job
        .lookup
        .iter()
        .fold(Query::new(entity), |query, (field, v)| query.filter(Q::lookup(field, v.clone())));

    let tx = store.begin().await?;
    let mut rows = tx.fetch(&query).await?;
    if rows.len() != 1 {
        return Err(ApiError::NotFound);
    }
    let record = rows.remove(0);
    apply_update(&*tx, record, job.form.clone()).await?;
    tx.commit().await?;
    Ok(())
}

#[async_trait]
impl Worker for MemoryWorker {
    async fn enqueue_at(&self, at: DateTime<Utc>, job: UpdateJob) -> ApiResult<String> {
        let id = Uuid::new_v4().to_string();
        let job = Job {
            id: id.clone(),
            at,
            status: JobStatus::Pending,
            entity: job.entity,
            lookup: job.lookup,
            form: job.form,
            context: job.context,
            result: String::new()
        };
        self.jobs.lock().insert(id.clone(), job);
        Ok(id)
    }

    async fn list(
        &self,
        offset: usize,
        limit: usize,
        filter: &IndexMap<String, String>
    ) -> ApiResult<JobPage> {
        let jobs = self.jobs.lock();
        let mut matching: Vec<&Job> = jobs
            .values()
            .filter(|job| {
                filter.iter().filter(|(_, v)| !v.is_empty()).all(|(k, v)| {
                    job.context
                        .get(k)
                        .is_some_and(|label| label.contains(v.as_str()))
                })
            })
            .collect();
        matching.sort_by(|a, b| b.at.cmp(&a.at));
        Ok(JobPage {
            total: matching.len(),
            data:  matching
                .into_iter()
                .skip(offset)
                .take(limit)
                .cloned()
                .collect()
        })
    }

    async fn cancel(&self, id: &str) -> ApiResult<()> {
        let mut jobs = self.jobs.lock();
        let job = jobs.get_mut(id).ok_or(ApiError::NotFound)?;
        match job.status {
            JobStatus::Pending => job.status = JobStatus::Canceled,
            JobStatus::Running => {
                return Err(ApiError::Conflict(vec![format!("job {id} is already running")]));
            }
            JobStatus::Finished | JobStatus::Failed | JobStatus::Canceled => {}
        }
        Ok(())
    }

    async fn next_due(&self) -> ApiResult<Option<DateTime<Utc>>> {
        Ok(self
            .jobs
            .lock()
            .values()
            .filter(|job| job.status == JobStatus::Pending)
            .map(|job| job.at)
            .min())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::{fixtures, store::MemoryStore};

    fn job(name: &str) -> UpdateJob {
        let mut context = IndexMap::new();
        context.insert("name".to_string(), name.to_string());
        UpdateJob {
            entity: "User".into(),
            lookup: Map::new(),
            form: Map::new(),
            context
        }
    }

    #[tokio::test]
    async fn list_is_latest_first_and_filtered() {
        let worker = MemoryWorker::new();
        let now = Utc::now();
        worker.enqueue_at(now, job("ann")).await.unwrap();
        worker.enqueue_at(now + Duration::hours(1), job("bob")).await.unwrap();
        worker.enqueue_at(now + Duration::hours(2), job("annie")).await.unwrap();

        let page = worker.list(0, 10, &IndexMap::new()).await.unwrap();
        let names: Vec<&str> = page.data.iter().map(|j| j.context["name"].as_str()).collect();
        assert_eq!(names, ["annie", "bob", "ann"]);

        let mut filter = IndexMap::new();
        filter.insert("name".to_string(), "ann".to_string());
        let page = worker.list(1, 10, &filter).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].context["name"], "ann");

        filter.insert("name".to_string(), String::new());
        assert_eq!(worker.list(0, 10, &filter).await.unwrap().total, 3);
    }

    #[tokio::test]
    async fn cancel_only_touches_pending_jobs() {
        let worker = MemoryWorker::new();
        let id = worker.enqueue_at(Utc::now(), job("ann")).await.unwrap();
        worker.cancel(&id).await.unwrap();
        assert_eq!(worker.jobs.lock()[&id].status, JobStatus::Canceled);
        worker.jobs.lock()[&id].status = JobStatus::Finished;
        worker.cancel(&id).await.unwrap();
        assert_eq!(worker.jobs.lock()[&id].status, JobStatus::Finished);
        assert_eq!(worker.cancel("missing").await, Err(ApiError::NotFound));
    }

    #[tokio::test]
    async fn running_jobs_are_neither_rerun_nor_canceled() {
        let store = MemoryStore::new(fixtures::blog());
        let worker = MemoryWorker::new();
        let id = worker.enqueue_at(Utc::now(), job("ann")).await.unwrap();
        assert_eq!(worker.claim_due(Utc::now()).len(), 1);
        assert_eq!(worker.jobs.lock()[&id].status, JobStatus::Running);

        assert_eq!(worker.run_due(Utc::now(), &store).await, 0);
        assert!(matches!(worker.cancel(&id).await, Err(ApiError::Conflict(_))));
        assert_eq!(worker.jobs.lock()[&id].status, JobStatus::Running);
        assert_eq!(worker.next_due().await.unwrap(), None);
    }

    #[tokio::test]
    async fn outcome_of_a_job_that_left_running_is_dropped() {
        let worker = MemoryWorker::new();
        let id = worker.enqueue_at(Utc::now(), job("ann")).await.unwrap();
        let claimed = worker.claim_due(Utc::now());
        worker.jobs.lock()[&id].status = JobStatus::Canceled;
        worker.settle(&claimed[0], Ok(()));
        assert_eq!(worker.jobs.lock()[&id].status, JobStatus::Canceled);
    }

    #[tokio::test]
    async fn next_due_ignores_settled_jobs() {
        let worker = MemoryWorker::new();
        let now = Utc::now();
        let first = worker.enqueue_at(now, job("ann")).await.unwrap();
        worker.enqueue_at(now + Duration::hours(1), job("bob")).await.unwrap();
        assert_eq!(worker.next_due().await.unwrap(), Some(now));
        worker.cancel(&first).await.unwrap();
        assert_eq!(worker.next_due().await.unwrap(), Some(now + Duration::hours(1)));
    }
}
