//! Single-flight job scheduler.
//!
//! A fixed-interval loop claims the oldest queued job and executes it. At
//! most one job executes at a time: a tick that finds an execution in
//! flight does nothing. Submissions nudge the loop so queued work starts
//! without waiting for the next tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, Notify};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, Instrument};

use reel_media::{MediaRequest, ProgressCallback};
use reel_models::Job;

use crate::config::WorkerConfig;
use crate::context::WorkerContext;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::reaper::reap_orphans;
use crate::render::render;

/// Cloneable handle that wakes the scheduler.
#[derive(Debug, Clone, Default)]
pub struct SchedulerHandle {
    nudge: Arc<Notify>,
}

impl SchedulerHandle {
    /// Ask for an immediate tick. The single-flight guard still applies.
    pub fn nudge(&self) {
        self.nudge.notify_one();
    }
}

/// Clears the busy flag when an execution ends, even by panic.
struct BusyGuard(Arc<AtomicBool>);

impl BusyGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(Arc::clone(flag)))
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The job scheduler.
pub struct Scheduler {
    ctx: Arc<WorkerContext>,
    tick_interval: Duration,
    shutdown_timeout: Duration,
    busy: Arc<AtomicBool>,
    handle: SchedulerHandle,
}

impl Scheduler {
    pub fn new(ctx: Arc<WorkerContext>, config: &WorkerConfig) -> Self {
        Self {
            ctx,
            tick_interval: config.tick_interval,
            shutdown_timeout: config.shutdown_timeout,
            busy: Arc::new(AtomicBool::new(false)),
            handle: SchedulerHandle::default(),
        }
    }

    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    pub fn nudge(&self) {
        self.handle.nudge();
    }

    /// Whether an execution is in flight.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Start executing the next queued job in the background, unless one is
    /// already executing. Returns whether this tick took the guard.
    pub fn tick(&self) -> bool {
        let Some(guard) = BusyGuard::acquire(&self.busy) else {
            return false;
        };
        let ctx = Arc::clone(&self.ctx);
        tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = execute_next(&ctx).await {
                error!("Scheduler tick failed: {}", e);
            }
        });
        true
    }

    /// Claim and execute the next queued job inline. Returns the job in its
    /// terminal state, or `None` when nothing was queued or an execution is
    /// already in flight.
    pub async fn run_next(&self) -> WorkerResult<Option<Job>> {
        let Some(_guard) = BusyGuard::acquire(&self.busy) else {
            return Ok(None);
        };
        execute_next(&self.ctx).await
    }

    /// Run until `shutdown` flips to true, then wait for the in-flight job.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_ms = self.tick_interval.as_millis() as u64, "Starting job scheduler");

        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Shutdown signal received, stopping scheduler");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.tick();
                }
                _ = self.handle.nudge.notified() => {
                    self.tick();
                }
            }
        }

        if tokio::time::timeout(self.shutdown_timeout, self.wait_idle())
            .await
            .is_err()
        {
            info!("In-flight job still running at shutdown; it will be reaped after restart");
        }
        info!("Job scheduler stopped");
    }

    async fn wait_idle(&self) {
        while self.is_busy() {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

async fn execute_next(ctx: &Arc<WorkerContext>) -> WorkerResult<Option<Job>> {
    // The busy guard is held, so any running job is an orphan
    reap_orphans(&ctx.store, ctx.stale_after).await?;
    let Some(job) = ctx.store.claim_next_queued(Utc::now(), ctx.stale_after).await? else {
        return Ok(None);
    };
    let logger = JobLogger::for_job(&job);
    let span = logger.create_span();
    Ok(Some(execute(ctx, job, logger).instrument(span).await))
}

/// Execute a claimed job and persist its terminal state. Never fails: every
/// outcome becomes job state.
async fn execute(ctx: &Arc<WorkerContext>, mut job: Job, logger: JobLogger) -> Job {
    let kind = job.kind();
    logger.log_start("rendering");
    ctx.progress.begin(&job.id);

    let on_progress: ProgressCallback = {
        let progress = ctx.progress.clone();
        let id = job.id.clone();
        let logger = logger.clone();
        Arc::new(move |pct: u8| {
            if progress.update(&id, pct) {
                logger.log_progress(pct);
            }
        })
    };

    let request = MediaRequest::from(job.request.clone());
    let outcome = render(ctx, &request, on_progress).await;
    let now = Utc::now();

    match outcome {
        Ok(output) => {
            job.complete(output.into(), now);
            metrics::record_job_completed(kind.as_str());
            logger.log_completion(job.result.as_ref().map(|r| r.url.as_str()).unwrap_or_default());
        }
        Err(e) => {
            let last = ctx.progress.get(&job.id);
            job.fail(e.to_job_error(), last, now);
            let reason = match &e {
                WorkerError::Media(m) if m.is_timeout() => "timeout",
                _ => "error",
            };
            metrics::record_job_failed(kind.as_str(), reason);
            logger.log_error(&e.to_string());
        }
    }

    let terminal = job.clone();
    if let Err(e) = ctx.store.update(&job.id, move |stored| *stored = terminal).await {
        logger.log_error(&format!("failed to persist terminal state: {}", e));
    }
    ctx.progress.remove(&job.id);
    job
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use reel_media::{MediaError, MediaResult, ProcessPlan, ProcessRunner};
    use reel_models::{JobRequest, JobStatus, RenderVideoPayload};
    use tempfile::TempDir;

    /// Writes the output file and reports fixed progress steps.
    struct FakeRunner {
        steps: Vec<u8>,
        fail: bool,
    }

    #[async_trait]
    impl ProcessRunner for FakeRunner {
        async fn run(&self, plan: &ProcessPlan, on_progress: ProgressCallback) -> MediaResult<()> {
            for pct in &self.steps {
                on_progress(*pct);
            }
            if self.fail {
                return Err(MediaError::engine_failed(
                    "exited with status 1",
                    Some("Conversion failed!".into()),
                    Some(1),
                ));
            }
            tokio::fs::write(&plan.output_path, b"fake mp4").await?;
            Ok(())
        }
    }

    async fn setup(dir: &TempDir, runner: FakeRunner) -> (Scheduler, Arc<WorkerContext>, String) {
        let config = WorkerConfig {
            data_dir: dir.path().join("data"),
            output_dir: dir.path().join("outputs"),
            ffprobe_path: "reel-no-such-probe".into(),
            ..Default::default()
        };
        let background = dir.path().join("bg.mp4");
        std::fs::write(&background, b"background").unwrap();

        let ctx = Arc::new(
            WorkerContext::new(&config)
                .await
                .unwrap()
                .with_runner(Arc::new(runner)),
        );
        (
            Scheduler::new(Arc::clone(&ctx), &config),
            ctx,
            background.to_string_lossy().into_owned(),
        )
    }

    fn video_job(background: &str) -> Job {
        Job::new(JobRequest::RenderVideo(RenderVideoPayload {
            background_path: background.to_string(),
            lines: vec!["Hello".into()],
            duration_sec: Some(20.0),
            ..Default::default()
        }))
    }

    #[tokio::test]
    async fn test_run_next_completes_job() {
        let dir = TempDir::new().unwrap();
        let (scheduler, ctx, background) = setup(&dir, FakeRunner { steps: vec![10, 50], fail: false }).await;
        let job = ctx.store.append(video_job(&background)).await.unwrap();

        let done = scheduler.run_next().await.unwrap().unwrap();
        assert_eq!(done.id, job.id);
        assert_eq!(done.status, JobStatus::Done);
        assert_eq!(done.progress, 100);

        let stored = ctx.store.get(&job.id).await.unwrap();
        let result = stored.result.unwrap();
        assert!(std::path::Path::new(&result.out_file).exists());
        assert!(result.url.starts_with("/outputs/render_video-"));
        assert_eq!(result.duration_sec, 20.0);
        assert!(ctx.progress.is_empty());
        assert!(!scheduler.is_busy());
    }

    #[tokio::test]
    async fn test_failure_keeps_last_progress() {
        let dir = TempDir::new().unwrap();
        let (scheduler, ctx, background) = setup(&dir, FakeRunner { steps: vec![30, 20], fail: true }).await;
        let job = ctx.store.append(video_job(&background)).await.unwrap();

        scheduler.run_next().await.unwrap();

        let stored = ctx.store.get(&job.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.progress, 30);
        assert!(stored.result.is_none());
        let error = stored.error.unwrap();
        assert!(error.message.contains("exited with status 1"));
        assert_eq!(error.detail.as_deref(), Some("Conversion failed!"));
    }

    #[tokio::test]
    async fn test_missing_input_at_execution_fails_job() {
        let dir = TempDir::new().unwrap();
        let (scheduler, ctx, _) = setup(&dir, FakeRunner { steps: vec![], fail: false }).await;
        let job = ctx.store.append(video_job("/does/not/exist.mp4")).await.unwrap();

        let failed = scheduler.run_next().await.unwrap().unwrap();
        assert_eq!(failed.id, job.id);
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.progress, 0);
    }

    #[tokio::test]
    async fn test_fifo_and_empty_queue() {
        let dir = TempDir::new().unwrap();
        let (scheduler, ctx, background) = setup(&dir, FakeRunner { steps: vec![], fail: false }).await;
        let first = ctx.store.append(video_job(&background)).await.unwrap();
        let second = ctx.store.append(video_job(&background)).await.unwrap();

        assert_eq!(scheduler.run_next().await.unwrap().unwrap().id, first.id);
        assert_eq!(scheduler.run_next().await.unwrap().unwrap().id, second.id);
        assert!(scheduler.run_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_single_flight_guard() {
        let dir = TempDir::new().unwrap();
        let (scheduler, ctx, background) = setup(&dir, FakeRunner { steps: vec![], fail: false }).await;
        ctx.store.append(video_job(&background)).await.unwrap();

        let held = BusyGuard::acquire(&scheduler.busy).unwrap();
        assert!(!scheduler.tick());
        assert!(scheduler.run_next().await.unwrap().is_none());
        assert_eq!(ctx.store.list().await[0].status, JobStatus::Queued);

        drop(held);
        assert!(!scheduler.is_busy());
    }

    #[tokio::test]
    async fn test_orphan_blocks_queue_until_stale() {
        let dir = TempDir::new().unwrap();
        let (scheduler, ctx, background) = setup(&dir, FakeRunner { steps: vec![], fail: false }).await;

        let mut orphan = video_job(&background);
        orphan.start(Utc::now() - chrono::Duration::minutes(2));
        let orphan = ctx.store.append(orphan).await.unwrap();
        let queued = ctx.store.append(video_job(&background)).await.unwrap();

        assert!(scheduler.run_next().await.unwrap().is_none());
        assert_eq!(ctx.store.get(&queued.id).await.unwrap().status, JobStatus::Queued);

        // Age the orphan past the staleness window
        ctx.store
            .update(&orphan.id, |j| j.started_at = Some(Utc::now() - chrono::Duration::hours(2)))
            .await
            .unwrap();
        let done = scheduler.run_next().await.unwrap().unwrap();
        assert_eq!(done.id, queued.id);
        assert_eq!(done.status, JobStatus::Done);

        let orphan = ctx.store.get(&orphan.id).await.unwrap();
        assert_eq!(orphan.status, JobStatus::Failed);
        assert_eq!(orphan.error.unwrap().message, crate::reaper::STALE_MESSAGE);
    }

    #[tokio::test]
    async fn test_run_loop_executes_and_stops() {
        let dir = TempDir::new().unwrap();
        let (scheduler, ctx, background) = setup(&dir, FakeRunner { steps: vec![], fail: false }).await;
        let job = ctx.store.append(video_job(&background)).await.unwrap();

        let scheduler = Arc::new(scheduler);
        let (tx, rx) = watch::channel(false);
        let runner = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.run(rx).await })
        };
        scheduler.nudge();

        let mut status = JobStatus::Queued;
        for _ in 0..100 {
            status = ctx.store.get(&job.id).await.unwrap().status;
            if status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(status, JobStatus::Done);

        tx.send(true).unwrap();
        runner.await.unwrap();
    }
}
