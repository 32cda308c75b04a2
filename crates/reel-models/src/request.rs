//! Render request payloads.
//!
//! Queued jobs carry a [`JobRequest`], a tagged union over the two job
//! kinds. The merge, timeline and preview shapes are executed synchronously
//! and never enter the job store.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::job::JobKind;
use crate::media::{AspectPreset, AudioClip, MasteringParams};

/// Upper bound for an explicit caption font size.
const MAX_FONT_SIZE: u32 = 400;

/// Type-tagged job submission: `{"type": "render_video", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum JobRequest {
    RenderVideo(RenderVideoPayload),
    RenderWaveform(RenderWaveformPayload),
}

impl JobRequest {
    pub fn kind(&self) -> JobKind {
        match self {
            JobRequest::RenderVideo(_) => JobKind::RenderVideo,
            JobRequest::RenderWaveform(_) => JobKind::RenderWaveform,
        }
    }

    /// Structural validation, independent of the filesystem.
    pub fn validate(&self) -> ModelResult<()> {
        match self {
            JobRequest::RenderVideo(p) => p.validate(),
            JobRequest::RenderWaveform(p) => p.validate(),
        }
    }
}

/// Captioned video over a single background.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct RenderVideoPayload {
    /// Background video or image reference
    #[serde(default)]
    pub background_path: String,

    /// Narration track
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_path: Option<String>,

    /// Background music track
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub music_path: Option<String>,

    /// Caption lines, word-wrapped at render time
    #[serde(default)]
    pub lines: Vec<String>,

    #[serde(default)]
    pub aspect: AspectPreset,

    /// Requested output duration, clamped by the compiler
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_sec: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption_width_pct: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<u32>,

    #[serde(flatten)]
    pub mastering: MasteringParams,
}

impl RenderVideoPayload {
    pub fn validate(&self) -> ModelResult<()> {
        require("backgroundPath", &self.background_path)?;
        optional_ref("audioPath", self.audio_path.as_deref())?;
        optional_ref("musicPath", self.music_path.as_deref())?;
        if !self.lines.iter().any(|l| !l.trim().is_empty()) {
            return Err(ModelError::missing("lines"));
        }
        validate_presentation(self.duration_sec, self.font_size)?;
        self.mastering.validate()
    }
}

/// Audio-reactive waveform video, optionally over a looping background.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct RenderWaveformPayload {
    /// Audio track driving the waveform
    #[serde(default)]
    pub audio_path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub music_path: Option<String>,

    #[serde(default)]
    pub lines: Vec<String>,

    #[serde(default)]
    pub aspect: AspectPreset,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_sec: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption_width_pct: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<u32>,

    /// Waveform colour: `#rrggbb` or a plain colour name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wave_color: Option<String>,

    #[serde(flatten)]
    pub mastering: MasteringParams,
}

impl RenderWaveformPayload {
    pub fn validate(&self) -> ModelResult<()> {
        require("audioPath", &self.audio_path)?;
        optional_ref("backgroundPath", self.background_path.as_deref())?;
        optional_ref("musicPath", self.music_path.as_deref())?;
        if let Some(color) = &self.wave_color {
            validate_color(color)?;
        }
        validate_presentation(self.duration_sec, self.font_size)?;
        self.mastering.validate()
    }
}

/// Concatenate whole audio clips in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct MergeRequest {
    #[serde(default)]
    pub clips: Vec<String>,

    #[serde(flatten)]
    pub mastering: MasteringParams,
}

impl MergeRequest {
    pub fn validate(&self) -> ModelResult<()> {
        if self.clips.is_empty() {
            return Err(ModelError::missing("clips"));
        }
        for clip in &self.clips {
            require("clips[]", clip)?;
        }
        self.mastering.validate()
    }
}

/// Assemble trimmed audio clips in the order supplied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct TimelineRequest {
    #[serde(default)]
    pub clips: Vec<AudioClip>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub music_path: Option<String>,

    #[serde(flatten)]
    pub mastering: MasteringParams,
}

impl TimelineRequest {
    pub fn validate(&self) -> ModelResult<()> {
        validate_clips(&self.clips)?;
        optional_ref("musicPath", self.music_path.as_deref())?;
        self.mastering.validate()
    }
}

/// Timeline audio combined with a background video for quick review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct PreviewRequest {
    #[serde(default)]
    pub clips: Vec<AudioClip>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub music_path: Option<String>,

    #[serde(default)]
    pub background_path: String,

    #[serde(default)]
    pub aspect: AspectPreset,

    #[serde(default)]
    pub lines: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_sec: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption_width_pct: Option<u32>,

    #[serde(flatten)]
    pub mastering: MasteringParams,
}

impl PreviewRequest {
    pub fn validate(&self) -> ModelResult<()> {
        validate_clips(&self.clips)?;
        require("backgroundPath", &self.background_path)?;
        optional_ref("musicPath", self.music_path.as_deref())?;
        validate_presentation(self.duration_sec, None)?;
        self.mastering.validate()
    }
}

fn require(field: &'static str, value: &str) -> ModelResult<()> {
    if value.trim().is_empty() {
        return Err(ModelError::missing(field));
    }
    Ok(())
}

fn optional_ref(field: &'static str, value: Option<&str>) -> ModelResult<()> {
    match value {
        Some(v) if v.trim().is_empty() => Err(ModelError::invalid(field, "must not be blank")),
        _ => Ok(()),
    }
}

fn validate_clips(clips: &[AudioClip]) -> ModelResult<()> {
    if clips.is_empty() {
        return Err(ModelError::missing("clips"));
    }
    clips.iter().try_for_each(AudioClip::validate)
}

/// Duration and caption width are clamped at compile time; only values that
/// cannot be clamped are rejected here.
fn validate_presentation(duration_sec: Option<f64>, font_size: Option<u32>) -> ModelResult<()> {
    if let Some(duration) = duration_sec.filter(|d| !d.is_finite()) {
        return Err(ModelError::invalid(
            "durationSec",
            format!("{} is not a finite number", duration),
        ));
    }
    if let Some(size) = font_size {
        if size == 0 || size > MAX_FONT_SIZE {
            return Err(ModelError::out_of_range(
                "fontSize",
                format!("{} not in [1, {}]", size, MAX_FONT_SIZE),
            ));
        }
    }
    Ok(())
}

fn validate_color(color: &str) -> ModelResult<()> {
    let valid = match color.strip_prefix('#') {
        Some(hex) => hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => !color.is_empty() && color.len() <= 32 && color.chars().all(|c| c.is_ascii_alphabetic()),
    };
    if valid {
        Ok(())
    } else {
        Err(ModelError::invalid("waveColor", format!("'{}' is not a colour", color)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_render_video_submission() {
        let request: JobRequest = serde_json::from_value(json!({
            "type": "render_video",
            "payload": {
                "backgroundPath": "/media/bg.mp4",
                "lines": ["Hello"],
                "durationSec": 20,
                "autoDuck": true
            }
        }))
        .unwrap();

        assert_eq!(request.kind(), JobKind::RenderVideo);
        match &request {
            JobRequest::RenderVideo(p) => {
                assert_eq!(p.background_path, "/media/bg.mp4");
                assert_eq!(p.duration_sec, Some(20.0));
                assert!(p.mastering.auto_duck);
                assert_eq!(p.aspect, AspectPreset::Portrait);
            }
            other => panic!("unexpected request {:?}", other),
        }
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_unknown_job_type_is_rejected() {
        let result: Result<JobRequest, _> = serde_json::from_value(json!({
            "type": "transcode_everything",
            "payload": {}
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_waveform_requires_audio() {
        let request: JobRequest = serde_json::from_value(json!({
            "type": "render_waveform",
            "payload": { "backgroundPath": "/media/bg.mp4" }
        }))
        .unwrap();

        assert_eq!(request.validate(), Err(ModelError::missing("audioPath")));
    }

    #[test]
    fn test_render_video_requires_caption() {
        let payload = RenderVideoPayload {
            background_path: "/media/bg.mp4".into(),
            lines: vec!["   ".into()],
            ..Default::default()
        };
        assert_eq!(payload.validate(), Err(ModelError::missing("lines")));
    }

    #[test]
    fn test_wave_color_validation() {
        assert!(validate_color("#00ff88").is_ok());
        assert!(validate_color("white").is_ok());
        assert!(validate_color("#00ff8").is_err());
        assert!(validate_color("red:enable=0").is_err());
    }

    #[test]
    fn test_out_of_range_presentation_is_left_to_clamping() {
        let payload = RenderVideoPayload {
            background_path: "bg.mp4".into(),
            lines: vec!["hi".into()],
            caption_width_pct: Some(150),
            duration_sec: Some(-5.0),
            ..Default::default()
        };
        assert!(payload.validate().is_ok());

        let preview = PreviewRequest {
            clips: vec![AudioClip::new("a.mp3")],
            background_path: "bg.mp4".into(),
            caption_width_pct: Some(0),
            duration_sec: Some(1e9),
            ..Default::default()
        };
        assert!(preview.validate().is_ok());
    }

    #[test]
    fn test_non_finite_duration_is_rejected() {
        let payload = RenderWaveformPayload {
            audio_path: "voice.mp3".into(),
            duration_sec: Some(f64::NAN),
            ..Default::default()
        };
        assert!(matches!(
            payload.validate(),
            Err(ModelError::Invalid { field: "durationSec", .. })
        ));
    }

    #[test]
    fn test_timeline_validation() {
        let request = TimelineRequest::default();
        assert_eq!(request.validate(), Err(ModelError::missing("clips")));

        let request = TimelineRequest {
            clips: vec![AudioClip::new("a.mp3"), AudioClip::new("b.mp3")],
            ..Default::default()
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_preview_requires_background() {
        let request = PreviewRequest {
            clips: vec![AudioClip::new("a.mp3")],
            ..Default::default()
        };
        assert_eq!(request.validate(), Err(ModelError::missing("backgroundPath")));
    }
}
