//! Transient per-job progress.
//!
//! Progress changes far more often than job state, so it lives in memory
//! and is merged into job records on read instead of being persisted on
//! every update.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use reel_models::{Job, JobId, JobStatus};

/// Shared map of running job id to percentage.
#[derive(Debug, Clone, Default)]
pub struct ProgressMap {
    inner: Arc<RwLock<HashMap<JobId, u8>>>,
}

impl ProgressMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a job at 0%, replacing any previous entry.
    pub fn begin(&self, id: &JobId) {
        self.write().insert(id.clone(), 0);
    }

    /// Record a new percentage. Decreases are ignored; returns whether the
    /// stored value changed.
    pub fn update(&self, id: &JobId, pct: u8) -> bool {
        let pct = pct.min(100);
        let mut map = self.write();
        match map.get_mut(id) {
            Some(current) if pct <= *current => false,
            Some(current) => {
                *current = pct;
                true
            }
            None => {
                map.insert(id.clone(), pct);
                true
            }
        }
    }

    pub fn get(&self, id: &JobId) -> Option<u8> {
        self.read().get(id).copied()
    }

    /// Stop tracking a job, returning its last value.
    pub fn remove(&self, id: &JobId) -> Option<u8> {
        self.write().remove(id)
    }

    /// Overlay transient progress onto a running job record.
    pub fn merge_into(&self, job: &mut Job) {
        if job.status != JobStatus::Running {
            return;
        }
        if let Some(pct) = self.get(&job.id) {
            job.progress = job.progress.max(pct);
        }
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<JobId, u8>> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<JobId, u8>> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use reel_models::{JobRequest, RenderVideoPayload};

    #[test]
    fn test_progress_is_monotonic() {
        let map = ProgressMap::new();
        let id = JobId::new();

        map.begin(&id);
        assert_eq!(map.get(&id), Some(0));
        assert!(map.update(&id, 30));
        assert!(!map.update(&id, 20));
        assert!(!map.update(&id, 30));
        assert_eq!(map.get(&id), Some(30));

        assert_eq!(map.remove(&id), Some(30));
        assert!(map.is_empty());
    }

    #[test]
    fn test_begin_resets_entry() {
        let map = ProgressMap::new();
        let id = JobId::new();
        map.update(&id, 80);
        map.begin(&id);
        assert_eq!(map.get(&id), Some(0));
    }

    #[test]
    fn test_merge_only_touches_running_jobs() {
        let map = ProgressMap::new();
        let mut job = Job::new(JobRequest::RenderVideo(RenderVideoPayload::default()));
        map.update(&job.id, 55);

        map.merge_into(&mut job);
        assert_eq!(job.progress, 0);

        job.start(Utc::now());
        map.merge_into(&mut job);
        assert_eq!(job.progress, 55);
    }
}
