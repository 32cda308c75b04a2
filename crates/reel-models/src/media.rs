//! Presentation and audio mastering parameters shared by all render modes.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ModelError, ModelResult};

/// Named output frame sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum AspectPreset {
    /// 9:16 vertical (1080x1920)
    #[default]
    #[serde(alias = "vertical", alias = "9:16")]
    Portrait,
    /// 16:9 horizontal (1920x1080)
    #[serde(alias = "horizontal", alias = "16:9")]
    Landscape,
    /// 1:1 (1080x1080)
    #[serde(alias = "1:1")]
    Square,
}

impl AspectPreset {
    /// Frame size in pixels as `(width, height)`.
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            AspectPreset::Portrait => (1080, 1920),
            AspectPreset::Landscape => (1920, 1080),
            AspectPreset::Square => (1080, 1080),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AspectPreset::Portrait => "portrait",
            AspectPreset::Landscape => "landscape",
            AspectPreset::Square => "square",
        }
    }
}

impl fmt::Display for AspectPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AspectPreset {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "portrait" | "vertical" | "9:16" => Ok(AspectPreset::Portrait),
            "landscape" | "horizontal" | "16:9" => Ok(AspectPreset::Landscape),
            "square" | "1:1" => Ok(AspectPreset::Square),
            other => Err(ModelError::invalid("aspect", format!("unknown preset '{}'", other))),
        }
    }
}

fn default_music_volume() -> f64 {
    0.25
}

fn default_voice_volume() -> f64 {
    1.0
}

/// Audio mastering knobs, flattened into every payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MasteringParams {
    /// Integrated loudness target in LUFS; normalization is skipped when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_lufs: Option<f64>,

    #[serde(default)]
    pub fade_in_sec: f64,

    #[serde(default)]
    pub fade_out_sec: f64,

    /// De-essing intensity (0..1) applied to the voice track
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deess: Option<f64>,

    /// Sidechain-duck music under the voice track
    #[serde(default)]
    pub auto_duck: bool,

    #[serde(default = "default_music_volume")]
    pub music_volume: f64,

    #[serde(default = "default_voice_volume")]
    pub voice_volume: f64,
}

impl Default for MasteringParams {
    fn default() -> Self {
        Self {
            target_lufs: None,
            fade_in_sec: 0.0,
            fade_out_sec: 0.0,
            deess: None,
            auto_duck: false,
            music_volume: default_music_volume(),
            voice_volume: default_voice_volume(),
        }
    }
}

impl MasteringParams {
    pub const MIN_LUFS: f64 = -70.0;
    pub const MAX_LUFS: f64 = -5.0;

    pub fn validate(&self) -> ModelResult<()> {
        if let Some(lufs) = self.target_lufs {
            check_range("targetLufs", lufs, Self::MIN_LUFS, Self::MAX_LUFS)?;
        }
        check_range("fadeInSec", self.fade_in_sec, 0.0, 60.0)?;
        check_range("fadeOutSec", self.fade_out_sec, 0.0, 60.0)?;
        if let Some(deess) = self.deess {
            check_range("deess", deess, 0.0, 1.0)?;
        }
        check_range("musicVolume", self.music_volume, 0.0, 2.0)?;
        check_range("voiceVolume", self.voice_volume, 0.0, 4.0)?;
        Ok(())
    }
}

/// One clip of a merge/timeline request, optionally trimmed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct AudioClip {
    /// Resource reference (path, output alias, URL or library id)
    #[serde(default)]
    pub path: String,

    /// Offset into the source in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_sec: Option<f64>,

    /// Length of the trimmed segment in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_sec: Option<f64>,
}

impl AudioClip {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> ModelResult<()> {
        if self.path.trim().is_empty() {
            return Err(ModelError::missing("clips[].path"));
        }
        if let Some(start) = self.start_sec {
            check_range("clips[].startSec", start, 0.0, f64::MAX)?;
        }
        if let Some(duration) = self.duration_sec {
            if !duration.is_finite() || duration <= 0.0 {
                return Err(ModelError::out_of_range(
                    "clips[].durationSec",
                    "must be greater than zero",
                ));
            }
        }
        Ok(())
    }
}

/// Check a finite value lies within `[min, max]`.
pub(crate) fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> ModelResult<()> {
    if !value.is_finite() || value < min || value > max {
        return Err(ModelError::out_of_range(
            field,
            format!("{} not in [{}, {}]", value, min, max),
        ));
    }
    Ok(())
}
