//! Process supervision for engine runs.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::compile::ProcessPlan;
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::remove_partial_output;
use crate::progress::{is_progress_key, ProgressParser, ProgressThrottle};

/// Progress callback receiving a percentage in `0..=99`.
pub type ProgressCallback = Arc<dyn Fn(u8) + Send + Sync>;

/// Executes a compiled plan.
///
/// Implementations must delete any partial output before returning an
/// error.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, plan: &ProcessPlan, on_progress: ProgressCallback) -> MediaResult<()>;
}

/// Supervisor settings.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Engine binary name or path
    pub ffmpeg_path: String,
    /// Wall-clock limit per run
    pub timeout: Duration,
    /// Time between SIGTERM and a forced kill
    pub kill_grace: Duration,
    /// Minimum time between progress callbacks
    pub progress_interval: Duration,
    /// Bytes of non-progress stderr kept for error reports
    pub stderr_tail_bytes: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            timeout: Duration::from_secs(900),
            kill_grace: Duration::from_secs(5),
            progress_interval: Duration::from_millis(500),
            stderr_tail_bytes: 16 * 1024,
        }
    }
}

/// Keeps the last `capacity` bytes of diagnostic output, whole lines only.
#[derive(Debug, Clone)]
pub struct TailBuffer {
    capacity: usize,
    lines: VecDeque<String>,
    len: usize,
}

impl TailBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            lines: VecDeque::new(),
            len: 0,
        }
    }

    pub fn push_line(&mut self, line: &str) {
        let mut line = line.trim_end().to_string();
        if line.len() > self.capacity {
            // Keep the end of an oversized line
            let mut cut = line.len() - self.capacity;
            while !line.is_char_boundary(cut) {
                cut += 1;
            }
            line = line.split_off(cut);
        }
        self.len += line.len() + 1;
        self.lines.push_back(line);
        while self.len > self.capacity + 1 {
            match self.lines.pop_front() {
                Some(old) => self.len -= old.len() + 1,
                None => break,
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn contents(&self) -> String {
        self.lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
    }

    /// Contents, or `None` when nothing was captured.
    pub fn snapshot(&self) -> Option<String> {
        if self.is_empty() {
            None
        } else {
            Some(self.contents())
        }
    }
}

/// Runs FFmpeg with a timeout, progress reporting and a bounded stderr tail.
#[derive(Debug, Clone, Default)]
pub struct FfmpegRunner {
    config: RunnerConfig,
}

impl FfmpegRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Wait for child process with timeout and escalating termination.
    async fn wait_for_completion(&self, child: &mut Child) -> MediaResult<ExitStatus> {
        match tokio::time::timeout(self.config.timeout, child.wait()).await {
            Ok(status) => Ok(status?),
            Err(_) => {
                let secs = self.config.timeout.as_secs_f64().ceil() as u64;
                warn!("FFmpeg timed out after {} seconds, terminating process", secs);
                self.terminate(child).await;
                Err(MediaError::Timeout(secs))
            }
        }
    }

    /// SIGTERM, wait out the grace window, then kill.
    async fn terminate(&self, child: &mut Child) {
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = child.id() {
                if kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok()
                    && matches!(
                        tokio::time::timeout(self.config.kill_grace, child.wait()).await,
                        Ok(Ok(_))
                    )
                {
                    debug!(pid, "FFmpeg exited after SIGTERM");
                    return;
                }
            }
        }

        info!("Killing FFmpeg process");
        if let Err(e) = child.kill().await {
            warn!(error = %e, "Failed to kill FFmpeg process");
        }
    }
}

#[async_trait]
impl ProcessRunner for FfmpegRunner {
    async fn run(&self, plan: &ProcessPlan, on_progress: ProgressCallback) -> MediaResult<()> {
        // Check FFmpeg exists
        let binary = which::which(&self.config.ffmpeg_path)
            .map_err(|_| MediaError::EngineNotFound(self.config.ffmpeg_path.clone()))?;

        debug!("Running FFmpeg: {} {}", binary.display(), plan.args.join(" "));

        let spawned = Command::new(&binary)
            .args(&plan.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                remove_partial_output(&plan.output_path).await;
                return Err(MediaError::SpawnFailed(e.to_string()));
            }
        };

        let tail = Arc::new(Mutex::new(TailBuffer::new(self.config.stderr_tail_bytes)));
        let reader_handle = child.stderr.take().map(|stderr| {
            let tail = Arc::clone(&tail);
            let total = plan.total_duration_sec;
            let interval = self.config.progress_interval;

            // Spawn progress parsing task
            tokio::spawn(async move {
                let mut segments = BufReader::new(stderr).split(b'\n');
                let mut parser = ProgressParser::new();
                let mut throttle = ProgressThrottle::new(interval);

                while let Ok(Some(bytes)) = segments.next_segment().await {
                    let line = String::from_utf8_lossy(&bytes);
                    if is_progress_key(&line) {
                        if let Some(progress) = parser.feed(&line) {
                            let pct = progress.percent(total);
                            if pct > 0 && throttle.should_emit(pct, Instant::now()) {
                                on_progress(pct);
                            }
                        }
                    } else if !line.trim().is_empty() {
                        if let Ok(mut tail) = tail.lock() {
                            tail.push_line(&line);
                        }
                    }
                }
            })
        });

        let result = self.wait_for_completion(&mut child).await;

        // Descendants may keep stderr open after the engine exits
        if let Some(mut handle) = reader_handle {
            if tokio::time::timeout(self.config.kill_grace, &mut handle).await.is_err() {
                handle.abort();
            }
        }
        let diagnostic = tail.lock().ok().and_then(|t| t.snapshot());

        let error = match result {
            Ok(status) if status.success() => return Ok(()),
            Ok(status) => MediaError::engine_failed(
                format!("exited with {}", describe_status(&status)),
                diagnostic,
                status.code(),
            ),
            Err(MediaError::Io(e)) => MediaError::engine_failed(e.to_string(), diagnostic, None),
            Err(e) => e,
        };

        remove_partial_output(&plan.output_path).await;
        Err(error)
    }
}

fn describe_status(status: &ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("status {}", code),
        None => "a signal".to_string(),
    }
}
