//! Worker configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use reel_media::{CompileConfig, OutputStore, ResolverConfig, RunnerConfig};
use reel_queue::{StoreConfig, DEFAULT_MAX_JOBS};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Directory holding the job store and its backup/quarantine files
    pub data_dir: PathBuf,
    /// Managed output directory
    pub output_dir: PathBuf,
    /// Public URL prefix for output files (also a resolver alias)
    pub output_prefix: String,
    /// Optional asset-library index file
    pub library_index: Option<PathBuf>,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    /// Font file for captions; the engine default is used when unset
    pub font_file: Option<String>,
    /// Maximum local input size in megabytes
    pub max_input_mb: u64,
    /// Upper bound for any output duration
    pub max_duration_secs: f64,
    /// Wall-clock limit per engine run
    pub job_timeout: Duration,
    /// Wall-clock limit per duration probe
    pub probe_timeout: Duration,
    /// Time between SIGTERM and SIGKILL on timeout
    pub kill_grace: Duration,
    /// Scheduler polling interval
    pub tick_interval: Duration,
    /// Running jobs older than this are failed by the reaper
    pub stale_after: Duration,
    /// How long shutdown waits for an in-flight render
    pub shutdown_timeout: Duration,
    /// Job store retention cap
    pub max_jobs: usize,
    /// Minimum time between progress updates
    pub progress_throttle: Duration,
    /// Diagnostic buffer size in kilobytes
    pub stderr_tail_kb: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            output_dir: PathBuf::from("./outputs"),
            output_prefix: "/outputs/".to_string(),
            library_index: None,
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            font_file: None,
            max_input_mb: 500,
            max_duration_secs: 180.0,
            job_timeout: Duration::from_secs(900), // 15 minutes
            probe_timeout: Duration::from_secs(30),
            kill_grace: Duration::from_secs(5),
            tick_interval: Duration::from_millis(1000),
            stale_after: Duration::from_secs(1800), // 30 minutes
            shutdown_timeout: Duration::from_secs(30),
            max_jobs: DEFAULT_MAX_JOBS,
            progress_throttle: Duration::from_millis(500),
            stderr_tail_kb: 16,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            data_dir: std::env::var("REEL_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            output_dir: std::env::var("REEL_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            output_prefix: std::env::var("REEL_OUTPUT_PREFIX").unwrap_or(defaults.output_prefix),
            library_index: std::env::var("REEL_LIBRARY_INDEX")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            ffmpeg_path: std::env::var("REEL_FFMPEG_PATH").unwrap_or(defaults.ffmpeg_path),
            ffprobe_path: std::env::var("REEL_FFPROBE_PATH").unwrap_or(defaults.ffprobe_path),
            font_file: std::env::var("REEL_FONT_FILE")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            max_input_mb: env_parse("REEL_MAX_INPUT_MB", defaults.max_input_mb),
            max_duration_secs: env_parse("REEL_MAX_DURATION_SECS", defaults.max_duration_secs),
            job_timeout: Duration::from_secs(env_parse("REEL_JOB_TIMEOUT_SECS", 900)),
            probe_timeout: Duration::from_secs(env_parse("REEL_PROBE_TIMEOUT_SECS", 30)),
            kill_grace: Duration::from_secs(env_parse("REEL_KILL_GRACE_SECS", 5)),
            tick_interval: Duration::from_millis(env_parse("REEL_TICK_INTERVAL_MS", 1000)),
            stale_after: Duration::from_secs(env_parse("REEL_STALE_AFTER_SECS", 1800)),
            shutdown_timeout: Duration::from_secs(env_parse("REEL_SHUTDOWN_TIMEOUT_SECS", 30)),
            max_jobs: env_parse("REEL_MAX_JOBS", defaults.max_jobs),
            progress_throttle: Duration::from_millis(env_parse("REEL_PROGRESS_THROTTLE_MS", 500)),
            stderr_tail_kb: env_parse("REEL_STDERR_TAIL_KB", defaults.stderr_tail_kb),
        }
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::in_dir(&self.data_dir, self.max_jobs)
    }

    pub fn output_store(&self) -> OutputStore {
        OutputStore::new(&self.output_dir, &self.output_prefix)
    }

    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            max_input_bytes: self.max_input_mb.saturating_mul(1024 * 1024),
            ..Default::default()
        }
    }

    pub fn compile_config(&self) -> CompileConfig {
        CompileConfig {
            max_duration_sec: self.max_duration_secs,
            font_file: self.font_file.clone(),
        }
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            ffmpeg_path: self.ffmpeg_path.clone(),
            timeout: self.job_timeout,
            kill_grace: self.kill_grace,
            progress_interval: self.progress_throttle,
            stderr_tail_bytes: self.stderr_tail_kb.saturating_mul(1024),
        }
    }

    /// Staleness threshold as a chrono duration for timestamp arithmetic.
    pub fn stale_threshold(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.stale_after).unwrap_or_else(|_| chrono::Duration::days(36_500))
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}
