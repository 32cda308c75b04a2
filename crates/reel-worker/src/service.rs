//! Job submission and inspection.

use std::sync::Arc;

use tracing::info;

use reel_media::{MediaRequest, ProgressCallback};
use reel_models::{Job, JobId, JobRequest};

use crate::context::WorkerContext;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::render::{check_request, render, RenderOutput};
use crate::scheduler::SchedulerHandle;

/// Front door to the job engine used by the HTTP layer.
#[derive(Clone)]
pub struct JobService {
    ctx: Arc<WorkerContext>,
    scheduler: Option<SchedulerHandle>,
}

impl JobService {
    pub fn new(ctx: Arc<WorkerContext>) -> Self {
        Self {
            ctx,
            scheduler: None,
        }
    }

    /// Nudge this scheduler after each submission.
    pub fn with_scheduler(mut self, handle: SchedulerHandle) -> Self {
        self.scheduler = Some(handle);
        self
    }

    pub fn context(&self) -> &Arc<WorkerContext> {
        &self.ctx
    }

    /// Validate and enqueue a job. Invalid submissions persist nothing.
    pub async fn submit(&self, request: JobRequest) -> WorkerResult<Job> {
        check_request(&self.ctx, &MediaRequest::from(request.clone()))?;

        let job = self.ctx.store.append(Job::new(request)).await?;
        metrics::record_job_enqueued(job.kind().as_str());
        info!(job_id = %job.id, kind = %job.kind(), "Job queued");

        if let Some(scheduler) = &self.scheduler {
            scheduler.nudge();
        }
        Ok(job)
    }

    /// All jobs, newest first, with live progress merged in.
    pub async fn list(&self) -> Vec<Job> {
        let mut jobs = self.ctx.store.list().await;
        jobs.reverse();
        for job in &mut jobs {
            self.ctx.progress.merge_into(job);
        }
        jobs
    }

    pub async fn get(&self, id: &JobId) -> WorkerResult<Job> {
        let mut job = self
            .ctx
            .store
            .get(id)
            .await
            .ok_or_else(|| reel_queue::QueueError::job_not_found(id.as_str()))?;
        self.ctx.progress.merge_into(&mut job);
        Ok(job)
    }

    /// Render a request synchronously, outside the queue. Used by the
    /// merge, timeline and preview tools.
    pub async fn render_now(&self, request: MediaRequest) -> WorkerResult<RenderOutput> {
        if matches!(
            request,
            MediaRequest::RenderVideo(_) | MediaRequest::RenderWaveform(_)
        ) {
            return Err(WorkerError::validation(format!(
                "{} must be submitted as a job",
                request.label()
            )));
        }
        check_request(&self.ctx, &request)?;

        let logger = JobLogger::new(&JobId::new(), request.label());
        logger.log_start("synchronous render");
        let on_progress: ProgressCallback = {
            let logger = logger.clone();
            Arc::new(move |pct: u8| logger.log_progress(pct))
        };

        match render(&self.ctx, &request, on_progress).await {
            Ok(output) => {
                logger.log_completion(&output.url);
                Ok(output)
            }
            Err(e) => {
                logger.log_error(&e.to_string());
                Err(e)
            }
        }
    }
}
