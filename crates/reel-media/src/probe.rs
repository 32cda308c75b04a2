//! FFprobe duration lookup.

use serde::Deserialize;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::error::{MediaError, MediaResult};

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    duration: Option<String>,
}

/// Parse `ffprobe -print_format json -show_format -show_streams` output into
/// a duration in seconds, when one is reported.
pub fn parse_probe_output(stdout: &[u8]) -> MediaResult<Option<f64>> {
    let probe: FfprobeOutput = serde_json::from_slice(stdout)?;

    // Container duration first, then the longest stream duration
    Ok(probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(parse_seconds)
        .or_else(|| {
            probe
                .streams
                .iter()
                .filter_map(|s| s.duration.as_deref().and_then(parse_seconds))
                .reduce(f64::max)
        }))
}

fn parse_seconds(value: &str) -> Option<f64> {
    value.parse::<f64>().ok().filter(|d| d.is_finite() && *d >= 0.0)
}

/// Get the duration in seconds of a local file or URL.
///
/// The probe process is killed when `timeout` elapses.
pub async fn probe_duration(ffprobe: &str, location: &str, timeout: Duration) -> MediaResult<f64> {
    // Check FFprobe exists
    let binary = which::which(ffprobe).map_err(|_| MediaError::ProbeNotFound(ffprobe.to_string()))?;

    let run = Command::new(binary)
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(location)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let output = tokio::time::timeout(timeout, run)
        .await
        .map_err(|_| MediaError::ProbeFailed {
            message: format!(
                "timed out after {:.1}s probing {}",
                timeout.as_secs_f64(),
                location
            ),
            stderr: None,
        })??;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(MediaError::ProbeFailed {
            message: format!("could not read {}", location),
            stderr: Some(stderr).filter(|s| !s.is_empty()),
        });
    }

    parse_probe_output(&output.stdout)?.ok_or_else(|| MediaError::ProbeFailed {
        message: format!("no duration reported for {}", location),
        stderr: None,
    })
}
