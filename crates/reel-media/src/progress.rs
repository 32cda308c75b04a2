//! FFmpeg progress parsing.
//!
//! `-progress pipe:2` interleaves `key=value` blocks with ordinary log
//! lines on stderr. [`ProgressParser`] is a pure line consumer so it can be
//! tested without spawning anything.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::{Duration, Instant};

/// Highest percentage reported before the process has exited.
pub const MAX_RUNNING_PERCENT: u8 = 99;

/// Progress information from FFmpeg.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FfmpegProgress {
    /// Current frame number
    pub frame: u64,
    /// Output time in microseconds
    pub out_time_us: i64,
    /// Encoding speed (e.g., 1.5 = 1.5x realtime)
    pub speed: f64,
    /// Whether encoding is complete
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Percentage of `total_duration_sec`, capped at [`MAX_RUNNING_PERCENT`].
    pub fn percent(&self, total_duration_sec: f64) -> u8 {
        if total_duration_sec <= 0.0 || !total_duration_sec.is_finite() || self.out_time_us <= 0 {
            return 0;
        }
        let pct = (self.out_time_us as f64 / 1_000_000.0) / total_duration_sec * 100.0;
        (pct.floor() as u64).min(u64::from(MAX_RUNNING_PERCENT)) as u8
    }
}

/// Whether a stderr line belongs to the `-progress` key/value stream.
pub fn is_progress_key(line: &str) -> bool {
    match line.trim().split_once('=') {
        Some((key, _)) => matches!(
            key,
            "frame"
                | "fps"
                | "bitrate"
                | "total_size"
                | "out_time_us"
                | "out_time_ms"
                | "out_time"
                | "dup_frames"
                | "drop_frames"
                | "speed"
                | "progress"
        ) || key.starts_with("stream_"),
        None => false,
    }
}

/// Incremental parser over stderr lines.
#[derive(Debug, Clone, Default)]
pub struct ProgressParser {
    current: FfmpegProgress,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> &FfmpegProgress {
        &self.current
    }

    /// Feed one line. Returns a snapshot whenever the output time advanced
    /// or a `progress=` block terminator was seen.
    pub fn feed(&mut self, line: &str) -> Option<FfmpegProgress> {
        let (key, value) = line.trim().split_once('=')?;
        let value = value.trim();

        match key {
            // out_time_ms is in microseconds as well
            "out_time_us" | "out_time_ms" => {
                let us = value.parse::<i64>().ok()?;
                return self.advance(us);
            }
            "out_time" => {
                let us = parse_timestamp_us(value)?;
                return self.advance(us);
            }
            "frame" => {
                if let Ok(frame) = value.parse() {
                    self.current.frame = frame;
                }
            }
            "speed" => {
                // Format: "1.5x" or "N/A"
                if let Some(speed) = value.strip_suffix('x').and_then(|s| s.trim().parse().ok()) {
                    self.current.speed = speed;
                }
            }
            "progress" => {
                if value == "end" {
                    self.current.is_complete = true;
                }
                return Some(self.current.clone());
            }
            _ => {}
        }
        None
    }

    fn advance(&mut self, us: i64) -> Option<FfmpegProgress> {
        if us > self.current.out_time_us {
            self.current.out_time_us = us;
            Some(self.current.clone())
        } else {
            None
        }
    }
}

/// `HH:MM:SS.micro`; negative or `N/A` values never match.
static OUT_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+):([0-5]\d):([0-5]\d(?:\.\d+)?)$").unwrap());

/// Parse `HH:MM:SS.micro` into microseconds.
fn parse_timestamp_us(value: &str) -> Option<i64> {
    let caps = OUT_TIME.captures(value)?;
    let hours: i64 = caps[1].parse().ok()?;
    let minutes: i64 = caps[2].parse().ok()?;
    let seconds: f64 = caps[3].parse().ok()?;
    Some(hours * 3_600_000_000 + minutes * 60_000_000 + (seconds * 1_000_000.0).round() as i64)
}

/// Rate limiter for progress callbacks: emits only on a strict increase and
/// no more often than `min_interval`.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    min_interval: Duration,
    last_pct: Option<u8>,
    last_emit: Option<Instant>,
}

impl ProgressThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_pct: None,
            last_emit: None,
        }
    }

    /// Decide whether `pct` observed at `now` should be emitted.
    pub fn should_emit(&mut self, pct: u8, now: Instant) -> bool {
        if let Some(last) = self.last_pct {
            if pct <= last {
                return false;
            }
        }
        if let Some(at) = self.last_emit {
            if now.saturating_duration_since(at) < self.min_interval {
                return false;
            }
        }
        self.last_pct = Some(pct);
        self.last_emit = Some(now);
        true
    }

    pub fn last_emitted(&self) -> Option<u8> {
        self.last_pct
    }
}
