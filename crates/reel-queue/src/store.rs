//! Crash-safe JSON job store.
//!
//! Layout inside the data directory:
//! - `jobs.json`: primary file
//! - `jobs.json.bak`: previous primary, copied before each replace
//! - `jobs.json.tmp`: staging file for the atomic rename
//! - `jobs.json.corrupt-<unix-ts>`: primaries that could not be recovered
//!
//! Reads fall back primary, then backup merged with the last snapshot this
//! process read (re-persisted as the new primary), then that last snapshot
//! alone, then empty.
//! Mutations are serialized through one lock so read-modify-write cycles
//! never interleave.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use reel_models::{Job, JobError, JobId, JobStatus};

use crate::error::{QueueError, QueueResult};

/// On-disk format version.
pub const STORE_FORMAT_VERSION: u32 = 1;

/// Default retention cap.
pub const DEFAULT_MAX_JOBS: usize = 200;

/// Name of the primary store file.
pub const STORE_FILE_NAME: &str = "jobs.json";

/// The persisted job list, in insertion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub version: u32,
    pub jobs: Vec<Job>,
}

impl Default for StoreSnapshot {
    fn default() -> Self {
        Self {
            version: STORE_FORMAT_VERSION,
            jobs: Vec::new(),
        }
    }
}

impl StoreSnapshot {
    pub fn new(jobs: Vec<Job>) -> Self {
        Self {
            version: STORE_FORMAT_VERSION,
            jobs,
        }
    }

    pub fn get(&self, id: &JobId) -> Option<&Job> {
        self.jobs.iter().find(|j| &j.id == id)
    }
}

/// Accepted file shapes. Older stores were a bare job array.
#[derive(Deserialize)]
#[serde(untagged)]
enum OnDisk {
    Versioned(StoreSnapshot),
    Bare(Vec<Job>),
}

/// Where [`JobStore::load_with_source`] found its data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    Primary,
    Backup,
    LastGood,
    Empty,
}

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Primary file path
    pub path: PathBuf,
    /// Retention cap; the oldest finished jobs by `created_at` are evicted
    /// beyond it. Queued and running jobs are never evicted.
    pub max_jobs: usize,
}

impl StoreConfig {
    /// `jobs.json` inside `data_dir`.
    pub fn in_dir(data_dir: impl AsRef<Path>, max_jobs: usize) -> Self {
        Self {
            path: data_dir.as_ref().join(STORE_FILE_NAME),
            max_jobs,
        }
    }
}

enum FileState {
    Missing,
    Corrupt(String),
    Parsed(StoreSnapshot),
}

/// Durable job store.
#[derive(Debug)]
pub struct JobStore {
    config: StoreConfig,
    last_good: RwLock<Option<StoreSnapshot>>,
    write_lock: Mutex<()>,
}

impl JobStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            last_good: RwLock::new(None),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub fn backup_path(&self) -> PathBuf {
        self.sibling("bak")
    }

    fn temp_path(&self) -> PathBuf {
        self.sibling("tmp")
    }

    fn quarantine_path(&self, now: DateTime<Utc>) -> PathBuf {
        self.sibling(&format!("corrupt-{}", now.timestamp()))
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let name = self
            .config
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| STORE_FILE_NAME.to_string());
        self.config.path.with_file_name(format!("{}.{}", name, suffix))
    }

    /// Create the data directory.
    pub async fn init(&self) -> QueueResult<()> {
        if let Some(parent) = self.config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Load the store through the fallback chain. Never fails.
    pub async fn load(&self) -> StoreSnapshot {
        self.load_with_source().await.0
    }

    /// Load the store, reporting which fallback produced the data.
    pub async fn load_with_source(&self) -> (StoreSnapshot, LoadSource) {
        let primary = read_snapshot(&self.config.path).await;
        if let FileState::Parsed(mut snapshot) = primary {
            self.apply_retention(&mut snapshot);
            self.remember(&snapshot).await;
            return (snapshot, LoadSource::Primary);
        }
        let primary_corrupt = match &primary {
            FileState::Corrupt(reason) => {
                warn!(path = %self.config.path.display(), reason = %reason, "Job store primary is unreadable");
                true
            }
            _ => false,
        };

        match read_snapshot(&self.backup_path()).await {
            FileState::Parsed(backup) => {
                // The backup trails the primary by one write
                let mut snapshot = match self.last_good.read().await.clone() {
                    Some(last_good) => merge_snapshots(backup, last_good),
                    None => backup,
                };
                self.apply_retention(&mut snapshot);
                info!(jobs = snapshot.jobs.len(), "Recovered job store from backup");
                // Heal without copying the bad primary over the good backup
                if let Err(e) = self.write_primary(&snapshot, false).await {
                    error!(error = %e, "Failed to re-persist recovered job store");
                }
                self.remember(&snapshot).await;
                return (snapshot, LoadSource::Backup);
            }
            FileState::Corrupt(reason) => {
                warn!(reason = %reason, "Job store backup is unreadable");
                if primary_corrupt {
                    self.quarantine().await;
                }
            }
            FileState::Missing => {
                if primary_corrupt {
                    self.quarantine().await;
                }
            }
        }

        if let Some(snapshot) = self.last_good.read().await.clone() {
            warn!(jobs = snapshot.jobs.len(), "Serving last good job store snapshot");
            return (snapshot, LoadSource::LastGood);
        }

        (StoreSnapshot::default(), LoadSource::Empty)
    }

    /// Atomically persist a snapshot (retention applied first).
    pub async fn save(&self, snapshot: &StoreSnapshot) -> QueueResult<()> {
        let mut snapshot = snapshot.clone();
        self.apply_retention(&mut snapshot);
        self.write_primary(&snapshot, true).await?;
        self.remember(&snapshot).await;
        Ok(())
    }

    /// Append a new job. Refused when unfinished jobs already fill the
    /// retention cap, since retention never evicts them.
    pub async fn append(&self, job: Job) -> QueueResult<Job> {
        let _guard = self.write_lock.lock().await;
        let mut snapshot = self.load().await;
        let unfinished = snapshot
            .jobs
            .iter()
            .filter(|j| !j.status.is_terminal())
            .count();
        if !job.status.is_terminal() && unfinished >= self.config.max_jobs.max(1) {
            return Err(QueueError::QueueFull(unfinished));
        }
        snapshot.jobs.push(job.clone());
        self.save(&snapshot).await?;
        debug!(job_id = %job.id, "Appended job");
        Ok(job)
    }

    /// Apply `f` to one job and persist the result.
    pub async fn update<F>(&self, id: &JobId, f: F) -> QueueResult<Job>
    where
        F: FnOnce(&mut Job),
    {
        let _guard = self.write_lock.lock().await;
        let mut snapshot = self.load().await;
        let job = snapshot
            .jobs
            .iter_mut()
            .find(|j| &j.id == id)
            .ok_or_else(|| QueueError::job_not_found(id.as_str()))?;
        f(job);
        let updated = job.clone();
        self.save(&snapshot).await?;
        Ok(updated)
    }

    pub async fn get(&self, id: &JobId) -> Option<Job> {
        self.load().await.get(id).cloned()
    }

    /// All jobs in insertion order.
    pub async fn list(&self) -> Vec<Job> {
        self.load().await.jobs
    }

    /// Mark the oldest queued job as running and return it.
    ///
    /// Nothing is claimed while another job is running and not yet older
    /// than `stale_after`; that job may still hold the engine.
    pub async fn claim_next_queued(
        &self,
        now: DateTime<Utc>,
        stale_after: Duration,
    ) -> QueueResult<Option<Job>> {
        let _guard = self.write_lock.lock().await;
        let mut snapshot = self.load().await;
        if let Some(active) = snapshot
            .jobs
            .iter()
            .find(|j| j.status == JobStatus::Running && !j.is_stale(stale_after, now))
        {
            debug!(job_id = %active.id, "Job still running, not claiming");
            return Ok(None);
        }
        let Some(job) = snapshot
            .jobs
            .iter_mut()
            .find(|j| j.status == JobStatus::Queued)
        else {
            return Ok(None);
        };
        job.start(now);
        let claimed = job.clone();
        self.save(&snapshot).await?;
        Ok(Some(claimed))
    }

    /// Fail every running job older than `threshold`. Returns the reaped ids.
    pub async fn reap_stale(
        &self,
        threshold: Duration,
        now: DateTime<Utc>,
        message: &str,
    ) -> QueueResult<Vec<JobId>> {
        let _guard = self.write_lock.lock().await;
        let mut snapshot = self.load().await;
        let mut reaped = Vec::new();
        for job in snapshot.jobs.iter_mut().filter(|j| j.is_stale(threshold, now)) {
            job.fail(JobError::new(message), None, now);
            reaped.push(job.id.clone());
        }
        if !reaped.is_empty() {
            self.save(&snapshot).await?;
        }
        Ok(reaped)
    }

    /// Drop the oldest finished jobs by `created_at` beyond the cap.
    fn apply_retention(&self, snapshot: &mut StoreSnapshot) {
        let max = self.config.max_jobs.max(1);
        let len = snapshot.jobs.len();
        if len <= max {
            return;
        }

        let mut order: Vec<usize> = (0..len)
            .filter(|&i| snapshot.jobs[i].status.is_terminal())
            .collect();
        order.sort_by_key(|&i| (snapshot.jobs[i].created_at, i));
        let evicted: HashSet<usize> = order.into_iter().take(len - max).collect();
        if evicted.len() < len - max {
            warn!(
                jobs = len,
                max_jobs = max,
                "Unfinished jobs exceed the retention cap"
            );
        }

        let mut index = 0;
        snapshot.jobs.retain(|_| {
            let keep = !evicted.contains(&index);
            index += 1;
            keep
        });
        debug!(evicted = evicted.len(), "Applied job retention");
    }

    async fn remember(&self, snapshot: &StoreSnapshot) {
        *self.last_good.write().await = Some(snapshot.clone());
    }

    /// tmp write, optional primary -> backup copy, rename over primary.
    async fn write_primary(&self, snapshot: &StoreSnapshot, backup: bool) -> QueueResult<()> {
        self.init().await?;
        let bytes = serde_json::to_vec_pretty(snapshot)?;

        let tmp = self.temp_path();
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);

        if backup && fs::try_exists(&self.config.path).await.unwrap_or(false) {
            if let Err(e) = fs::copy(&self.config.path, self.backup_path()).await {
                warn!(error = %e, "Failed to refresh job store backup");
            }
        }

        fs::rename(&tmp, &self.config.path).await?;
        Ok(())
    }

    /// Move an unrecoverable primary aside for inspection.
    async fn quarantine(&self) {
        let target = self.quarantine_path(Utc::now());
        match fs::rename(&self.config.path, &target).await {
            Ok(()) => warn!(path = %target.display(), "Quarantined corrupt job store"),
            Err(e) => error!(error = %e, "Failed to quarantine corrupt job store"),
        }
    }
}

/// Union of two snapshots by job id. `newer` wins for ids present in both;
/// the order of `older` is kept and jobs only in `newer` follow in its order.
fn merge_snapshots(older: StoreSnapshot, newer: StoreSnapshot) -> StoreSnapshot {
    let mut newer_jobs = newer.jobs;
    let mut jobs = Vec::with_capacity(older.jobs.len().max(newer_jobs.len()));
    for job in older.jobs {
        match newer_jobs.iter().position(|j| j.id == job.id) {
            Some(pos) => jobs.push(newer_jobs.remove(pos)),
            None => jobs.push(job),
        }
    }
    jobs.extend(newer_jobs);
    StoreSnapshot::new(jobs)
}

async fn read_snapshot(path: &Path) -> FileState {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return FileState::Missing,
        Err(e) => return FileState::Corrupt(e.to_string()),
    };
    match serde_json::from_slice::<OnDisk>(&bytes) {
        Ok(OnDisk::Versioned(snapshot)) => {
            if snapshot.version > STORE_FORMAT_VERSION {
                warn!(version = snapshot.version, "Job store written by a newer version");
            }
            FileState::Parsed(snapshot)
        }
        Ok(OnDisk::Bare(jobs)) => FileState::Parsed(StoreSnapshot::new(jobs)),
        Err(e) => FileState::Corrupt(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_models::{JobRequest, RenderVideoPayload};
    use tempfile::TempDir;
    use tokio_test::{assert_err, assert_ok};

    fn make_job(label: &str) -> Job {
        Job::new(JobRequest::RenderVideo(RenderVideoPayload {
            background_path: format!("/media/{}.mp4", label),
            lines: vec![label.to_string()],
            ..Default::default()
        }))
    }

    fn finished_job(label: &str) -> Job {
        let mut job = make_job(label);
        job.fail(JobError::new("done with it"), None, Utc::now());
        job
    }

    fn make_store(dir: &TempDir, max_jobs: usize) -> JobStore {
        JobStore::new(StoreConfig::in_dir(dir.path(), max_jobs))
    }

    fn quarantined_files(dir: &TempDir) -> Vec<PathBuf> {
        std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.to_string_lossy().contains(".corrupt-"))
            .collect()
    }

    // ==================== Basic Operations ====================

    #[tokio::test]
    async fn test_empty_store() {
        let dir = TempDir::new().unwrap();
        let store = make_store(&dir, 10);

        let (snapshot, source) = store.load_with_source().await;
        assert!(snapshot.jobs.is_empty());
        assert_eq!(source, LoadSource::Empty);
    }

    #[tokio::test]
    async fn test_append_get_list() {
        let dir = TempDir::new().unwrap();
        let store = make_store(&dir, 10);

        let a = assert_ok!(store.append(make_job("a")).await);
        let b = assert_ok!(store.append(make_job("b")).await);

        let ids: Vec<JobId> = store.list().await.into_iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![a.id.clone(), b.id.clone()]);
        assert_eq!(store.get(&b.id).await.unwrap().id, b.id);
        assert!(store.get(&JobId::from("missing")).await.is_none());
    }

    #[tokio::test]
    async fn test_file_format() {
        let dir = TempDir::new().unwrap();
        let store = make_store(&dir, 10);
        store.append(make_job("a")).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(store.path()).unwrap()).unwrap();
        assert_eq!(raw["version"], 1);
        assert_eq!(raw["jobs"][0]["type"], "render_video");
        assert_eq!(raw["jobs"][0]["status"], "queued");
        assert!(!dir.path().join("jobs.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_persistence_across_instances() {
        let dir = TempDir::new().unwrap();
        let id = {
            let store = make_store(&dir, 10);
            store.append(make_job("a")).await.unwrap().id
        };

        let store = make_store(&dir, 10);
        let (snapshot, source) = store.load_with_source().await;
        assert_eq!(source, LoadSource::Primary);
        assert_eq!(snapshot.jobs[0].id, id);
    }

    #[tokio::test]
    async fn test_update() {
        let dir = TempDir::new().unwrap();
        let store = make_store(&dir, 10);
        let job = store.append(make_job("a")).await.unwrap();

        let updated = assert_ok!(store.update(&job.id, |j| j.start(Utc::now())).await);
        assert_eq!(updated.status, JobStatus::Running);
        assert_eq!(store.get(&job.id).await.unwrap().status, JobStatus::Running);

        let err = assert_err!(store.update(&JobId::from("nope"), |_| {}).await);
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_legacy_bare_array() {
        let dir = TempDir::new().unwrap();
        let store = make_store(&dir, 10);
        let job = make_job("legacy");
        std::fs::write(store.path(), serde_json::to_vec(&vec![job.clone()]).unwrap()).unwrap();

        let (snapshot, source) = store.load_with_source().await;
        assert_eq!(source, LoadSource::Primary);
        assert_eq!(snapshot.jobs[0].id, job.id);
    }

    // ==================== Retention ====================

    #[tokio::test]
    async fn test_retention_keeps_newest() {
        let dir = TempDir::new().unwrap();
        let store = make_store(&dir, 3);
        let base = Utc::now();

        let mut ids = Vec::new();
        for i in 0..5 {
            let mut job = finished_job(&format!("j{}", i));
            job.created_at = base + Duration::seconds(i);
            ids.push(store.append(job).await.unwrap().id);
        }

        let remaining: Vec<JobId> = store.list().await.into_iter().map(|j| j.id).collect();
        assert_eq!(remaining, ids[2..].to_vec());
    }

    #[tokio::test]
    async fn test_retention_uses_created_at_not_position() {
        let dir = TempDir::new().unwrap();
        let store = make_store(&dir, 2);
        let base = Utc::now();

        let mut newest = finished_job("newest");
        newest.created_at = base + Duration::seconds(10);
        let mut oldest = finished_job("oldest");
        oldest.created_at = base - Duration::seconds(10);
        let mut middle = finished_job("middle");
        middle.created_at = base;

        let snapshot = StoreSnapshot::new(vec![newest.clone(), oldest, middle.clone()]);
        store.save(&snapshot).await.unwrap();

        let remaining: Vec<JobId> = store.list().await.into_iter().map(|j| j.id).collect();
        assert_eq!(remaining, vec![newest.id, middle.id]);
    }

    #[tokio::test]
    async fn test_retention_never_evicts_unfinished_jobs() {
        let dir = TempDir::new().unwrap();
        let store = make_store(&dir, 2);
        let base = Utc::now();

        let mut queued = make_job("queued");
        queued.created_at = base - Duration::seconds(30);
        let mut running = make_job("running");
        running.created_at = base - Duration::seconds(20);
        running.start(base);
        let mut old_done = finished_job("old-done");
        old_done.created_at = base - Duration::seconds(10);
        let new_done = finished_job("new-done");

        store
            .save(&StoreSnapshot::new(vec![
                queued.clone(),
                running.clone(),
                old_done,
                new_done.clone(),
            ]))
            .await
            .unwrap();

        let remaining: Vec<JobId> = store.list().await.into_iter().map(|j| j.id).collect();
        assert_eq!(remaining, vec![queued.id.clone(), running.id.clone()]);

        assert!(store.append(make_job("overflow")).await.unwrap_err().is_queue_full());

        // Terminal update of the running job still finds it
        let done = store
            .update(&running.id, |j| j.fail(JobError::new("boom"), None, Utc::now()))
            .await
            .unwrap();
        assert_eq!(done.status, JobStatus::Failed);
        assert!(store.get(&queued.id).await.is_some());
        assert!(store.get(&new_done.id).await.is_none());
    }

    // ==================== Crash Recovery ====================

    #[tokio::test]
    async fn test_backup_written_before_replace() {
        let dir = TempDir::new().unwrap();
        let store = make_store(&dir, 10);
        let first = store.append(make_job("a")).await.unwrap();
        store.append(make_job("b")).await.unwrap();

        let backup: StoreSnapshot =
            serde_json::from_slice(&std::fs::read(store.backup_path()).unwrap()).unwrap();
        assert_eq!(backup.jobs.len(), 1);
        assert_eq!(backup.jobs[0].id, first.id);
    }

    #[tokio::test]
    async fn test_corrupt_primary_recovers_from_backup() {
        let dir = TempDir::new().unwrap();
        let store = make_store(&dir, 10);
        let a = store.append(make_job("a")).await.unwrap();
        store.append(make_job("b")).await.unwrap();

        // Truncated mid-write
        std::fs::write(store.path(), b"{\"version\":1,\"jobs\":[{\"id\":").unwrap();

        let fresh = make_store(&dir, 10);
        let (snapshot, source) = fresh.load_with_source().await;
        assert_eq!(source, LoadSource::Backup);
        assert_eq!(snapshot.jobs[0].id, a.id);

        // Primary was healed
        let (_, source) = make_store(&dir, 10).load_with_source().await;
        assert_eq!(source, LoadSource::Primary);
        assert!(quarantined_files(&dir).is_empty());
    }

    #[tokio::test]
    async fn test_backup_recovery_keeps_jobs_already_read() {
        let dir = TempDir::new().unwrap();
        let store = make_store(&dir, 10);
        let a = store.append(make_job("a")).await.unwrap();
        let b = store.append(make_job("b")).await.unwrap();
        assert!(store.get(&b.id).await.is_some());

        std::fs::write(store.path(), b"{\"version\":1,\"jobs\":[{\"id\":").unwrap();

        let (snapshot, source) = store.load_with_source().await;
        assert_eq!(source, LoadSource::Backup);
        assert!(snapshot.get(&b.id).is_some());

        let c = store.append(make_job("c")).await.unwrap();
        let ids: Vec<JobId> = make_store(&dir, 10)
            .list()
            .await
            .into_iter()
            .map(|j| j.id)
            .collect();
        assert_eq!(ids, vec![a.id, b.id, c.id]);
    }

    #[test]
    fn test_merge_prefers_newer_state() {
        let a = make_job("a");
        let mut a_running = a.clone();
        a_running.start(Utc::now());
        let b = make_job("b");

        let merged = merge_snapshots(
            StoreSnapshot::new(vec![a.clone()]),
            StoreSnapshot::new(vec![a_running, b.clone()]),
        );
        assert_eq!(merged.jobs.len(), 2);
        assert_eq!(merged.jobs[0].status, JobStatus::Running);
        assert_eq!(merged.jobs[1].id, b.id);
    }

    #[tokio::test]
    async fn test_last_good_snapshot_survives_corruption() {
        let dir = TempDir::new().unwrap();
        let store = make_store(&dir, 10);
        let a = store.append(make_job("a")).await.unwrap();
        let b = store.append(make_job("b")).await.unwrap();

        std::fs::write(store.path(), b"garbage").unwrap();
        std::fs::write(store.backup_path(), b"also garbage").unwrap();

        let (snapshot, source) = store.load_with_source().await;
        assert_eq!(source, LoadSource::LastGood);
        assert_eq!(snapshot.jobs.len(), 2);
        assert_eq!(quarantined_files(&dir).len(), 1);

        // Writes keep working without losing earlier jobs
        let c = store.append(make_job("c")).await.unwrap();
        let ids: Vec<JobId> = make_store(&dir, 10)
            .list()
            .await
            .into_iter()
            .map(|j| j.id)
            .collect();
        assert_eq!(ids, vec![a.id, b.id, c.id]);
    }

    #[tokio::test]
    async fn test_unrecoverable_store_is_quarantined() {
        let dir = TempDir::new().unwrap();
        let store = make_store(&dir, 10);
        std::fs::write(store.path(), b"not json at all").unwrap();

        let (snapshot, source) = store.load_with_source().await;
        assert_eq!(source, LoadSource::Empty);
        assert!(snapshot.jobs.is_empty());
        assert!(!store.path().exists());

        let quarantined = quarantined_files(&dir);
        assert_eq!(quarantined.len(), 1);
        assert_eq!(std::fs::read(&quarantined[0]).unwrap(), b"not json at all");
    }

    // ==================== Scheduling Helpers ====================

    #[tokio::test]
    async fn test_claim_is_fifo() {
        let dir = TempDir::new().unwrap();
        let store = make_store(&dir, 10);
        let a = store.append(make_job("a")).await.unwrap();
        let b = store.append(make_job("b")).await.unwrap();

        let window = Duration::minutes(30);
        let claimed = store.claim_next_queued(Utc::now(), window).await.unwrap().unwrap();
        assert_eq!(claimed.id, a.id);
        assert_eq!(claimed.status, JobStatus::Running);
        assert_eq!(claimed.progress, 0);
        assert!(claimed.started_at.is_some());

        store
            .update(&a.id, |j| j.fail(JobError::new("boom"), None, Utc::now()))
            .await
            .unwrap();
        let next = store.claim_next_queued(Utc::now(), window).await.unwrap().unwrap();
        assert_eq!(next.id, b.id);
        assert!(store.claim_next_queued(Utc::now(), window).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_waits_for_fresh_running_job() {
        let dir = TempDir::new().unwrap();
        let store = make_store(&dir, 10);
        let now = Utc::now();

        let mut orphan = make_job("orphan");
        orphan.start(now - Duration::minutes(2));
        let queued = make_job("queued");
        store
            .save(&StoreSnapshot::new(vec![orphan.clone(), queued.clone()]))
            .await
            .unwrap();

        assert!(store
            .claim_next_queued(now, Duration::minutes(30))
            .await
            .unwrap()
            .is_none());
        let running = store
            .list()
            .await
            .into_iter()
            .filter(|j| j.status == JobStatus::Running)
            .count();
        assert_eq!(running, 1);

        // Once past the window the orphan no longer blocks the queue
        let claimed = store
            .claim_next_queued(now, Duration::minutes(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claimed.id, queued.id);
    }

    #[tokio::test]
    async fn test_reap_stale_running_jobs() {
        let dir = TempDir::new().unwrap();
        let store = make_store(&dir, 10);
        let now = Utc::now();

        let mut stale = make_job("stale");
        stale.start(now - Duration::hours(2));
        stale.progress = 40;
        let mut fresh = make_job("fresh");
        fresh.start(now - Duration::seconds(5));
        let queued = make_job("queued");
        store
            .save(&StoreSnapshot::new(vec![stale.clone(), fresh.clone(), queued.clone()]))
            .await
            .unwrap();

        let reaped = store
            .reap_stale(Duration::minutes(30), now, "interrupted")
            .await
            .unwrap();
        assert_eq!(reaped, vec![stale.id.clone()]);

        let stale = store.get(&stale.id).await.unwrap();
        assert_eq!(stale.status, JobStatus::Failed);
        assert_eq!(stale.error.unwrap().message, "interrupted");
        assert_eq!(stale.progress, 40);
        assert!(stale.finished_at.is_some());
        assert_eq!(store.get(&fresh.id).await.unwrap().status, JobStatus::Running);
        assert_eq!(store.get(&queued.id).await.unwrap().status, JobStatus::Queued);
    }
}
