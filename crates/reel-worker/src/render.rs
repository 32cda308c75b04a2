//! Resolve, probe, compile and run one media request.

use std::path::PathBuf;
use std::time::Instant;

use tracing::{debug, warn};

use reel_media::fs_utils::{non_empty_file_size, remove_partial_output};
use reel_media::{
    compile, probe_duration, MediaError, MediaRequest, ProcessPlan, ProgressCallback, ResolvedRefs,
};
use reel_models::JobResult;

use crate::context::WorkerContext;
use crate::error::{WorkerError, WorkerResult};
use crate::metrics;

/// A finished render inside the output store.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOutput {
    pub out_file: PathBuf,
    pub url: String,
    pub duration_sec: f64,
}

impl From<RenderOutput> for JobResult {
    fn from(output: RenderOutput) -> Self {
        JobResult {
            out_file: output.out_file.to_string_lossy().into_owned(),
            url: output.url,
            duration_sec: output.duration_sec,
        }
    }
}

/// Submission-time checks: payload shape, every reference resolvable, and a
/// dry compile. Nothing is written.
pub fn check_request(ctx: &WorkerContext, request: &MediaRequest) -> WorkerResult<()> {
    request.validate()?;
    let refs = ctx.resolver.resolve_all(request.references())?;
    let placeholder = ctx
        .outputs()
        .dir()
        .join(format!("{}-check.{}", request.label(), request.extension()));
    compile(request, &refs, &ctx.compile, &placeholder)?;
    Ok(())
}

/// Render `request` into a fresh file in the output store.
///
/// Waits for the shared engine slot, so at most one render probes or runs
/// the engine at a time.
pub async fn render(
    ctx: &WorkerContext,
    request: &MediaRequest,
    on_progress: ProgressCallback,
) -> WorkerResult<RenderOutput> {
    let mut refs = ctx.resolver.resolve_all(request.references())?;

    let _permit = ctx
        .engine_slot
        .acquire()
        .await
        .map_err(|_| WorkerError::config_error("engine slot closed"))?;
    probe_durations(ctx, request, &mut refs).await;

    ctx.outputs().ensure_dir().await?;
    let output_path = ctx.outputs().allocate(request.label(), request.extension());
    let plan = compile(request, &refs, &ctx.compile, &output_path)?;
    debug!(
        kind = request.label(),
        output = %plan.output_path.display(),
        total_secs = plan.total_duration_sec,
        "Compiled render plan"
    );

    let started = Instant::now();
    let result = ctx.runner.run(&plan, on_progress).await;
    metrics::record_engine_duration(request.label(), started.elapsed().as_secs_f64());
    result?;

    verify_output(&plan).await?;

    Ok(RenderOutput {
        url: ctx.outputs().public_url(&plan.output_path),
        out_file: plan.output_path,
        duration_sec: plan.total_duration_sec,
    })
}

/// References whose duration feeds the plan's total length.
fn probe_targets(request: &MediaRequest) -> Vec<&str> {
    match request {
        MediaRequest::RenderVideo(_) => Vec::new(),
        MediaRequest::RenderWaveform(p) if p.duration_sec.is_none() => vec![p.audio_path.as_str()],
        MediaRequest::RenderWaveform(_) => Vec::new(),
        MediaRequest::Merge(r) => r.clips.iter().map(String::as_str).collect(),
        MediaRequest::Timeline(r) => r.clips.iter().map(|c| c.path.as_str()).collect(),
        MediaRequest::Preview(r) if r.duration_sec.is_none() => {
            r.clips.iter().map(|c| c.path.as_str()).collect()
        }
        MediaRequest::Preview(_) => Vec::new(),
    }
}

/// Best effort: an unprobeable or slow input falls back to the compiler
/// defaults.
async fn probe_durations(ctx: &WorkerContext, request: &MediaRequest, refs: &mut ResolvedRefs) {
    for reference in probe_targets(request) {
        let Some(resource) = refs.get_mut(reference) else {
            continue;
        };
        if resource.duration_sec.is_some() {
            continue;
        }
        match probe_duration(&ctx.ffprobe_path, &resource.location, ctx.probe_timeout).await {
            Ok(duration) => resource.duration_sec = Some(duration),
            Err(e) => warn!(reference, error = %e, "Could not probe input duration"),
        }
    }
}

/// A zero exit without a usable file is still a failure.
async fn verify_output(plan: &ProcessPlan) -> WorkerResult<()> {
    if non_empty_file_size(&plan.output_path).await.is_some() {
        return Ok(());
    }
    remove_partial_output(&plan.output_path).await;
    Err(MediaError::engine_failed("engine exited without producing output", None, None).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_models::{AudioClip, PreviewRequest, RenderWaveformPayload, TimelineRequest};

    #[test]
    fn test_duration_targets() {
        let waveform = MediaRequest::RenderWaveform(RenderWaveformPayload {
            audio_path: "voice.mp3".into(),
            ..Default::default()
        });
        assert_eq!(probe_targets(&waveform), vec!["voice.mp3"]);

        let fixed = MediaRequest::RenderWaveform(RenderWaveformPayload {
            audio_path: "voice.mp3".into(),
            duration_sec: Some(10.0),
            ..Default::default()
        });
        assert!(probe_targets(&fixed).is_empty());

        let timeline = MediaRequest::Timeline(TimelineRequest {
            clips: vec![AudioClip::new("a.mp3"), AudioClip::new("b.mp3")],
            ..Default::default()
        });
        assert_eq!(probe_targets(&timeline), vec!["a.mp3", "b.mp3"]);

        let preview = MediaRequest::Preview(PreviewRequest {
            clips: vec![AudioClip::new("a.mp3")],
            duration_sec: Some(5.0),
            ..Default::default()
        });
        assert!(probe_targets(&preview).is_empty());
    }

    #[test]
    fn test_render_output_into_job_result() {
        let result: JobResult = RenderOutput {
            out_file: PathBuf::from("/srv/outputs/render_video-abc.mp4"),
            url: "/outputs/render_video-abc.mp4".into(),
            duration_sec: 20.0,
        }
        .into();
        assert_eq!(result.out_file, "/srv/outputs/render_video-abc.mp4");
        assert_eq!(result.url, "/outputs/render_video-abc.mp4");
    }
}
