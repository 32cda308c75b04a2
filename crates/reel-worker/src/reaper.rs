//! Recovery of jobs orphaned by an unclean shutdown.
//!
//! A job still `running` at startup is not executing in this process. Those
//! older than the staleness threshold are failed at startup. Younger ones
//! block the queue until the scheduler reaps them once they age past the
//! threshold, so nothing hangs forever and no second job runs beside them.

use chrono::{Duration, Utc};
use tracing::{debug, info, warn};

use reel_models::JobId;
use reel_queue::JobStore;

use crate::error::WorkerResult;
use crate::metrics;

/// Error message recorded on jobs reaped at startup.
pub const REAPER_MESSAGE: &str =
    "Job was interrupted by a worker restart (stale running job reaped at startup)";

/// Error message recorded on jobs reaped by the running scheduler.
pub const STALE_MESSAGE: &str =
    "Job was interrupted by a worker restart (stale running job reaped by the scheduler)";

/// Fail every stale running job at startup. Returns the reaped ids.
pub async fn reap_stale_jobs(store: &JobStore, threshold: Duration) -> WorkerResult<Vec<JobId>> {
    let reaped = reap(store, threshold, REAPER_MESSAGE).await?;
    if reaped.is_empty() {
        info!("No stale jobs found at startup");
    }
    Ok(reaped)
}

/// Scheduler-side pass for orphans that were too young to reap at startup.
/// Only call this while no job of this process is executing.
pub async fn reap_orphans(store: &JobStore, threshold: Duration) -> WorkerResult<Vec<JobId>> {
    let reaped = reap(store, threshold, STALE_MESSAGE).await?;
    if reaped.is_empty() {
        debug!("No orphaned jobs to reap");
    }
    Ok(reaped)
}

async fn reap(store: &JobStore, threshold: Duration, message: &str) -> WorkerResult<Vec<JobId>> {
    let reaped = store.reap_stale(threshold, Utc::now(), message).await?;
    if !reaped.is_empty() {
        for id in &reaped {
            warn!(job_id = %id, "Reaped stale running job");
        }
        metrics::record_jobs_reaped(reaped.len());
    }
    Ok(reaped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_models::{Job, JobRequest, JobStatus, RenderVideoPayload};
    use reel_queue::{StoreConfig, StoreSnapshot};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_reaps_only_stale_running_jobs() {
        let dir = TempDir::new().unwrap();
        let store = JobStore::new(StoreConfig::in_dir(dir.path(), 10));
        let now = Utc::now();

        let mut orphan = Job::new(JobRequest::RenderVideo(RenderVideoPayload::default()));
        orphan.start(now - Duration::hours(1));
        let mut recent = Job::new(JobRequest::RenderVideo(RenderVideoPayload::default()));
        recent.start(now);
        store
            .save(&StoreSnapshot::new(vec![orphan.clone(), recent.clone()]))
            .await
            .unwrap();

        let reaped = reap_stale_jobs(&store, Duration::minutes(30)).await.unwrap();
        assert_eq!(reaped, vec![orphan.id.clone()]);

        let orphan = store.get(&orphan.id).await.unwrap();
        assert_eq!(orphan.status, JobStatus::Failed);
        assert_eq!(orphan.error.unwrap().message, REAPER_MESSAGE);
        assert_eq!(store.get(&recent.id).await.unwrap().status, JobStatus::Running);
    }

    #[tokio::test]
    async fn test_orphan_reaped_once_past_window() {
        let dir = TempDir::new().unwrap();
        let store = JobStore::new(StoreConfig::in_dir(dir.path(), 10));
        let now = Utc::now();

        let mut orphan = Job::new(JobRequest::RenderVideo(RenderVideoPayload::default()));
        orphan.start(now - Duration::minutes(2));
        store
            .save(&StoreSnapshot::new(vec![orphan.clone()]))
            .await
            .unwrap();

        assert!(reap_stale_jobs(&store, Duration::minutes(30)).await.unwrap().is_empty());
        assert!(reap_orphans(&store, Duration::minutes(30)).await.unwrap().is_empty());

        let reaped = reap_orphans(&store, Duration::minutes(1)).await.unwrap();
        assert_eq!(reaped, vec![orphan.id.clone()]);
        let orphan = store.get(&orphan.id).await.unwrap();
        assert_eq!(orphan.status, JobStatus::Failed);
        assert_eq!(orphan.error.unwrap().message, STALE_MESSAGE);
    }

    #[tokio::test]
    async fn test_empty_store_is_noop() {
        let dir = TempDir::new().unwrap();
        let store = JobStore::new(StoreConfig::in_dir(dir.path(), 10));
        assert!(reap_stale_jobs(&store, Duration::minutes(30)).await.unwrap().is_empty());
        assert!(!store.path().exists());
    }
}
