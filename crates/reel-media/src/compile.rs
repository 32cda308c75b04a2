//! Pipeline compiler.
//!
//! Turns a typed render or merge request plus its resolved references into
//! a concrete FFmpeg argument list. Compilation is pure: the same request,
//! references and output path always produce the same arguments.

use std::path::{Path, PathBuf};

use reel_models::{
    AudioClip, JobRequest, MasteringParams, MergeRequest, PreviewRequest, RenderVideoPayload,
    RenderWaveformPayload, TimelineRequest,
};

use crate::captions::CaptionLayout;
use crate::command::FfmpegCommand;
use crate::error::{MediaError, MediaResult};
use crate::filters::{Filter, FilterChain, FilterGraph, FilterValue};
use crate::resolver::{ResolvedRefs, ResolvedResource};

/// Render length used when a request gives none and nothing was probed.
pub const DEFAULT_RENDER_SECS: f64 = 30.0;

/// Default upper bound for any output duration.
pub const DEFAULT_MAX_DURATION_SECS: f64 = 180.0;

/// Output frame rate for video renders.
pub const OUTPUT_FPS: u32 = 30;

const DEFAULT_WAVE_COLOR: &str = "white";

/// Every request the compiler understands.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaRequest {
    RenderVideo(RenderVideoPayload),
    RenderWaveform(RenderWaveformPayload),
    Merge(MergeRequest),
    Timeline(TimelineRequest),
    Preview(PreviewRequest),
}

impl From<JobRequest> for MediaRequest {
    fn from(request: JobRequest) -> Self {
        match request {
            JobRequest::RenderVideo(p) => MediaRequest::RenderVideo(p),
            JobRequest::RenderWaveform(p) => MediaRequest::RenderWaveform(p),
        }
    }
}

impl MediaRequest {
    /// Label used for output filenames and logs.
    pub fn label(&self) -> &'static str {
        match self {
            MediaRequest::RenderVideo(_) => "render_video",
            MediaRequest::RenderWaveform(_) => "render_waveform",
            MediaRequest::Merge(_) => "merge",
            MediaRequest::Timeline(_) => "timeline",
            MediaRequest::Preview(_) => "preview",
        }
    }

    /// Output file extension.
    pub fn extension(&self) -> &'static str {
        match self {
            MediaRequest::Merge(_) | MediaRequest::Timeline(_) => "m4a",
            _ => "mp4",
        }
    }

    /// Structural validation of the payload.
    pub fn validate(&self) -> MediaResult<()> {
        let result = match self {
            MediaRequest::RenderVideo(p) => p.validate(),
            MediaRequest::RenderWaveform(p) => p.validate(),
            MediaRequest::Merge(r) => r.validate(),
            MediaRequest::Timeline(r) => r.validate(),
            MediaRequest::Preview(r) => r.validate(),
        };
        result.map_err(|e| MediaError::invalid_request(e.to_string()))
    }

    /// Every resource reference in the request, in input order.
    pub fn references(&self) -> Vec<&str> {
        let mut refs: Vec<&str> = Vec::new();
        match self {
            MediaRequest::RenderVideo(p) => {
                refs.push(&p.background_path);
                refs.extend(p.audio_path.as_deref());
                refs.extend(p.music_path.as_deref());
            }
            MediaRequest::RenderWaveform(p) => {
                refs.extend(p.background_path.as_deref());
                refs.push(&p.audio_path);
                refs.extend(p.music_path.as_deref());
            }
            MediaRequest::Merge(r) => refs.extend(r.clips.iter().map(String::as_str)),
            MediaRequest::Timeline(r) => {
                refs.extend(r.clips.iter().map(|c| c.path.as_str()));
                refs.extend(r.music_path.as_deref());
            }
            MediaRequest::Preview(r) => {
                refs.push(&r.background_path);
                refs.extend(r.clips.iter().map(|c| c.path.as_str()));
                refs.extend(r.music_path.as_deref());
            }
        }
        refs
    }
}

/// Compiler settings.
#[derive(Debug, Clone)]
pub struct CompileConfig {
    /// Upper clamp for every output duration
    pub max_duration_sec: f64,
    /// Font used by `drawtext`; the engine default applies when unset
    pub font_file: Option<String>,
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self {
            max_duration_sec: DEFAULT_MAX_DURATION_SECS,
            font_file: None,
        }
    }
}

/// A compiled engine invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessPlan {
    pub args: Vec<String>,
    /// Expected output length, used to turn output time into a percentage
    pub total_duration_sec: f64,
    pub output_path: PathBuf,
}

/// Compile a request into a [`ProcessPlan`] writing to `output_path`.
pub fn compile(
    request: &MediaRequest,
    refs: &ResolvedRefs,
    config: &CompileConfig,
    output_path: &Path,
) -> MediaResult<ProcessPlan> {
    request.validate()?;

    let (command, total_duration_sec) = match request {
        MediaRequest::RenderVideo(p) => compile_render_video(p, refs, config, output_path)?,
        MediaRequest::RenderWaveform(p) => compile_render_waveform(p, refs, config, output_path)?,
        MediaRequest::Merge(r) => compile_merge(r, refs, config, output_path)?,
        MediaRequest::Timeline(r) => compile_timeline(r, refs, config, output_path)?,
        MediaRequest::Preview(r) => compile_preview(r, refs, config, output_path)?,
    };

    Ok(ProcessPlan {
        args: command.build_args(),
        total_duration_sec,
        output_path: output_path.to_path_buf(),
    })
}

/// Clamp a requested duration into `[1, max]`.
pub fn clamp_duration(requested: Option<f64>, fallback: f64, max: f64) -> f64 {
    let max = if max.is_finite() { max.max(1.0) } else { DEFAULT_MAX_DURATION_SECS };
    let value = requested.filter(|v| v.is_finite()).unwrap_or(fallback);
    value.clamp(1.0, max)
}

fn compile_render_video(
    p: &RenderVideoPayload,
    refs: &ResolvedRefs,
    config: &CompileConfig,
    output: &Path,
) -> MediaResult<(FfmpegCommand, f64)> {
    let (width, height) = p.aspect.dimensions();
    let duration = clamp_duration(p.duration_sec, DEFAULT_RENDER_SECS, config.max_duration_sec);
    let layout = CaptionLayout::for_frame(width, height, p.caption_width_pct, p.font_size);
    let captions = layout.wrap(&p.lines);
    if captions.is_empty() {
        return Err(MediaError::invalid_request(
            "lines: at least one non-empty caption line is required",
        ));
    }

    let background = refs.get(&p.background_path)?;
    let mut cmd = FfmpegCommand::new(output).input_with(background_input_args(background), &background.location);
    let mut graph = FilterGraph::new();
    graph.push(cover_chain("0:v", width, height).output("bg"));
    graph.push(caption_chain("bg", &layout, &captions, config).output("vout"));

    let mut sources = AudioSources::default();
    if let Some(voice) = &p.audio_path {
        sources.voice = Some(format!("{}:a", cmd.input_count()));
        cmd = cmd.input(&refs.get(voice)?.location);
    }
    if let Some(music) = &p.music_path {
        sources.music = Some(format!("{}:a", cmd.input_count()));
        cmd = cmd.input_with(["-stream_loop", "-1"], &refs.get(music)?.location);
    }
    let audio = build_audio(&mut graph, sources, &p.mastering, duration, AudioFit::PadToVideo);

    Ok((video_output(cmd.filter_graph(graph), audio, duration), duration))
}

fn compile_render_waveform(
    p: &RenderWaveformPayload,
    refs: &ResolvedRefs,
    config: &CompileConfig,
    output: &Path,
) -> MediaResult<(FfmpegCommand, f64)> {
    let (width, height) = p.aspect.dimensions();
    let audio_ref = refs.get(&p.audio_path)?;
    let duration = clamp_duration(
        p.duration_sec.or(audio_ref.duration_sec),
        DEFAULT_RENDER_SECS,
        config.max_duration_sec,
    );
    let layout = CaptionLayout::for_frame(width, height, p.caption_width_pct, p.font_size);
    let captions = layout.wrap(&p.lines);

    let mut cmd = FfmpegCommand::new(output);
    let mut graph = FilterGraph::new();

    match &p.background_path {
        Some(background) => {
            let background = refs.get(background)?;
            cmd = cmd.input_with(background_input_args(background), &background.location);
            graph.push(cover_chain("0:v", width, height).output("bg"));
        }
        None => {
            graph.push(
                FilterChain::new()
                    .filter(
                        Filter::new("color")
                            .arg("c", "black")
                            .arg("s", format!("{}x{}", width, height))
                            .arg("r", OUTPUT_FPS),
                    )
                    .output("bg"),
            );
        }
    }

    let voice_input = format!("{}:a", cmd.input_count());
    cmd = cmd.input(&audio_ref.location);
    graph.push(
        FilterChain::new()
            .input(voice_input)
            .filter(Filter::new("asplit").positional(2u32))
            .output("wave_in")
            .output("voice_in"),
    );
    graph.push(
        FilterChain::new()
            .input("wave_in")
            .filter(
                Filter::new("showwaves")
                    .arg("s", format!("{}x{}", width, height / 3))
                    .arg("mode", "cline")
                    .arg("colors", wave_color(p.wave_color.as_deref()))
                    .arg("rate", OUTPUT_FPS),
            )
            .output("waves"),
    );
    graph.push(
        FilterChain::new()
            .input("bg")
            .input("waves")
            .filter(
                Filter::new("overlay")
                    .arg("x", "(W-w)/2")
                    .arg("y", "(H-h)/2"),
            )
            .output("scene"),
    );
    graph.push(caption_chain("scene", &layout, &captions, config).output("vout"));

    let mut sources = AudioSources {
        voice: Some("voice_in".to_string()),
        music: None,
    };
    if let Some(music) = &p.music_path {
        sources.music = Some(format!("{}:a", cmd.input_count()));
        cmd = cmd.input_with(["-stream_loop", "-1"], &refs.get(music)?.location);
    }
    let audio = build_audio(&mut graph, sources, &p.mastering, duration, AudioFit::PadToVideo);

    Ok((video_output(cmd.filter_graph(graph), audio, duration), duration))
}

fn compile_merge(
    r: &MergeRequest,
    refs: &ResolvedRefs,
    config: &CompileConfig,
    output: &Path,
) -> MediaResult<(FfmpegCommand, f64)> {
    let clips: Vec<AudioClip> = r.clips.iter().map(AudioClip::new).collect();
    compile_audio_tool(&clips, None, &r.mastering, refs, config, output)
}

fn compile_timeline(
    r: &TimelineRequest,
    refs: &ResolvedRefs,
    config: &CompileConfig,
    output: &Path,
) -> MediaResult<(FfmpegCommand, f64)> {
    compile_audio_tool(&r.clips, r.music_path.as_deref(), &r.mastering, refs, config, output)
}

fn compile_audio_tool(
    clips: &[AudioClip],
    music: Option<&str>,
    mastering: &MasteringParams,
    refs: &ResolvedRefs,
    config: &CompileConfig,
    output: &Path,
) -> MediaResult<(FfmpegCommand, f64)> {
    let duration = clamp_duration(
        timeline_duration(clips, refs)?,
        config.max_duration_sec,
        config.max_duration_sec,
    );

    let mut cmd = FfmpegCommand::new(output);
    let mut graph = FilterGraph::new();
    let mut indexed = Vec::with_capacity(clips.len());
    for clip in clips {
        indexed.push((cmd.input_count(), clip));
        cmd = cmd.input(&refs.get(&clip.path)?.location);
    }
    let timeline = push_timeline(&mut graph, &indexed);

    let mut sources = AudioSources {
        voice: Some(timeline),
        music: None,
    };
    if let Some(music) = music {
        sources.music = Some(format!("{}:a", cmd.input_count()));
        cmd = cmd.input_with(["-stream_loop", "-1"], &refs.get(music)?.location);
    }
    let audio = build_audio(&mut graph, sources, mastering, duration, AudioFit::FollowVoice)
        .unwrap_or_else(|| "aout".to_string());

    let cmd = cmd
        .filter_graph(graph)
        .map(format!("[{}]", audio))
        .output_arg("-vn")
        .audio_codec("aac")
        .audio_bitrate("192k")
        .output_args(["-movflags", "+faststart"])
        .duration(duration);

    Ok((cmd, duration))
}

fn compile_preview(
    r: &PreviewRequest,
    refs: &ResolvedRefs,
    config: &CompileConfig,
    output: &Path,
) -> MediaResult<(FfmpegCommand, f64)> {
    let (width, height) = r.aspect.dimensions();
    let duration = clamp_duration(
        r.duration_sec.or(timeline_duration(&r.clips, refs)?),
        DEFAULT_RENDER_SECS,
        config.max_duration_sec,
    );
    let layout = CaptionLayout::for_frame(width, height, r.caption_width_pct, None);
    let captions = layout.wrap(&r.lines);

    let background = refs.get(&r.background_path)?;
    let mut cmd = FfmpegCommand::new(output).input_with(background_input_args(background), &background.location);
    let mut graph = FilterGraph::new();
    graph.push(cover_chain("0:v", width, height).output("bg"));
    graph.push(caption_chain("bg", &layout, &captions, config).output("vout"));

    let mut indexed = Vec::with_capacity(r.clips.len());
    for clip in &r.clips {
        indexed.push((cmd.input_count(), clip));
        cmd = cmd.input(&refs.get(&clip.path)?.location);
    }
    let timeline = push_timeline(&mut graph, &indexed);

    let mut sources = AudioSources {
        voice: Some(timeline),
        music: None,
    };
    if let Some(music) = &r.music_path {
        sources.music = Some(format!("{}:a", cmd.input_count()));
        cmd = cmd.input_with(["-stream_loop", "-1"], &refs.get(music)?.location);
    }
    let audio = build_audio(&mut graph, sources, &r.mastering, duration, AudioFit::PadToVideo);

    Ok((video_output(cmd.filter_graph(graph), audio, duration), duration))
}

/// Sum of trimmed clip lengths, when every length is known.
fn timeline_duration(clips: &[AudioClip], refs: &ResolvedRefs) -> MediaResult<Option<f64>> {
    let mut total = 0.0;
    for clip in clips {
        let source = refs.get(&clip.path)?;
        let start = clip.start_sec.unwrap_or(0.0);
        let remaining = source.duration_sec.map(|d| (d - start).max(0.0));
        let length = match (clip.duration_sec, remaining) {
            (Some(requested), Some(available)) => requested.min(available),
            (Some(requested), None) => requested,
            (None, Some(available)) => available,
            (None, None) => return Ok(None),
        };
        total += length;
    }
    Ok(Some(total))
}

/// Trim each clip and concatenate in the order supplied. Returns the
/// output pad label.
fn push_timeline(graph: &mut FilterGraph, clips: &[(usize, &AudioClip)]) -> String {
    let mut segments = Vec::with_capacity(clips.len());
    for (position, (input, clip)) in clips.iter().enumerate() {
        let mut chain = FilterChain::new().input(format!("{}:a", input));
        if clip.start_sec.is_some() || clip.duration_sec.is_some() {
            chain = chain.filter(
                Filter::new("atrim")
                    .arg_opt("start", clip.start_sec)
                    .arg_opt("duration", clip.duration_sec),
            );
        }
        let label = format!("seg{}", position);
        graph.push(
            chain
                .filter(Filter::new("asetpts").positional("PTS-STARTPTS"))
                .output(label.clone()),
        );
        segments.push(label);
    }

    graph.push(
        FilterChain::new()
            .inputs(segments.iter().cloned())
            .filter(
                Filter::new("concat")
                    .arg("n", segments.len())
                    .arg("v", 0u32)
                    .arg("a", 1u32),
            )
            .output("timeline"),
    );
    "timeline".to_string()
}

#[derive(Debug, Default)]
struct AudioSources {
    voice: Option<String>,
    music: Option<String>,
}

/// How the mixed audio relates to the output length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AudioFit {
    /// Mix runs as long as the longest source, then pads with silence
    /// so `-t` governs the video length.
    PadToVideo,
    /// Mix ends with the voice track.
    FollowVoice,
}

/// Voice processing, optional ducking/mixing with music, then fades and
/// loudness normalization as the final stage. Returns the output pad.
fn build_audio(
    graph: &mut FilterGraph,
    sources: AudioSources,
    mastering: &MasteringParams,
    total_sec: f64,
    fit: AudioFit,
) -> Option<String> {
    let voice = sources.voice.map(|input| {
        let mut chain = FilterChain::new()
            .input(input)
            .filter(Filter::new("volume").positional(mastering.voice_volume));
        if let Some(intensity) = mastering.deess.filter(|d| *d > 0.0) {
            chain = chain.filter(Filter::new("deesser").arg("i", intensity));
        }
        graph.push(chain.output("voice"));
        "voice".to_string()
    });

    let music = sources.music.map(|input| {
        graph.push(
            FilterChain::new()
                .input(input)
                .filter(Filter::new("volume").positional(mastering.music_volume))
                .output("music"),
        );
        "music".to_string()
    });

    let mix_duration = match fit {
        AudioFit::PadToVideo => "longest",
        AudioFit::FollowVoice => "first",
    };

    let mixed = match (voice, music) {
        (Some(voice), Some(music)) if mastering.auto_duck => {
            graph.push(
                FilterChain::new()
                    .input(voice)
                    .filter(Filter::new("asplit").positional(2u32))
                    .output("voice_main")
                    .output("voice_key"),
            );
            graph.push(
                FilterChain::new()
                    .input(music)
                    .input("voice_key")
                    .filter(
                        Filter::new("sidechaincompress")
                            .arg("threshold", 0.05)
                            .arg("ratio", 8u32)
                            .arg("attack", 20u32)
                            .arg("release", 300u32),
                    )
                    .output("ducked"),
            );
            graph.push(mix_chain(["voice_main", "ducked"], mix_duration));
            "mixed".to_string()
        }
        (Some(voice), Some(music)) => {
            graph.push(mix_chain([voice.as_str(), music.as_str()], mix_duration));
            "mixed".to_string()
        }
        (Some(only), None) | (None, Some(only)) => only,
        (None, None) => return None,
    };

    let mut chain = FilterChain::new().input(mixed);
    if fit == AudioFit::PadToVideo {
        chain = chain.filter(Filter::new("apad"));
    }
    if mastering.fade_in_sec > 0.0 {
        chain = chain.filter(
            Filter::new("afade")
                .arg("t", "in")
                .arg("st", 0u32)
                .arg("d", mastering.fade_in_sec),
        );
    }
    if mastering.fade_out_sec > 0.0 {
        let fade = mastering.fade_out_sec.min(total_sec);
        chain = chain.filter(
            Filter::new("afade")
                .arg("t", "out")
                .arg("st", (total_sec - fade).max(0.0))
                .arg("d", fade),
        );
    }
    if let Some(lufs) = mastering.target_lufs {
        chain = chain
            .filter(
                Filter::new("loudnorm")
                    .arg("I", lufs)
                    .arg("TP", -1.5)
                    .arg("LRA", 11u32),
            )
            // loudnorm resamples to 192 kHz internally
            .filter(Filter::new("aresample").positional(48_000u32));
    }
    if chain.filters.is_empty() {
        chain = chain.filter(Filter::new("anull"));
    }
    graph.push(chain.output("aout"));
    Some("aout".to_string())
}

fn mix_chain(inputs: [&str; 2], duration: &'static str) -> FilterChain {
    FilterChain::new().inputs(inputs).output("mixed").filter(
        Filter::new("amix")
            .arg("inputs", 2u32)
            .arg("duration", duration)
            .arg("dropout_transition", 0u32),
    )
}

/// Scale to cover the frame, then centre-crop.
fn cover_chain(input: &str, width: u32, height: u32) -> FilterChain {
    FilterChain::new()
        .input(input)
        .filter(
            Filter::new("scale")
                .positional(width)
                .positional(height)
                .arg("force_original_aspect_ratio", "increase"),
        )
        .filter(Filter::new("crop").positional(width).positional(height))
        .filter(Filter::new("setsar").positional(1u32))
        .filter(Filter::new("fps").positional(OUTPUT_FPS))
}

/// One `drawtext` per wrapped line, or a passthrough when there are none.
fn caption_chain(input: &str, layout: &CaptionLayout, lines: &[String], config: &CompileConfig) -> FilterChain {
    let mut chain = FilterChain::new().input(input);
    if lines.is_empty() {
        return chain.filter(Filter::new("null"));
    }

    let border = (layout.font_size / 16).max(2);
    for (index, line) in lines.iter().enumerate() {
        chain = chain.filter(
            Filter::new("drawtext")
                .arg_opt("fontfile", config.font_file.as_deref().map(FilterValue::text))
                .arg("text", FilterValue::text(line.as_str()))
                .arg("expansion", "none")
                .arg("fontsize", layout.font_size)
                .arg("fontcolor", "white")
                .arg("borderw", border)
                .arg("bordercolor", "black")
                .arg("x", "(w-text_w)/2")
                .arg("y", layout.line_y(index, lines.len())),
        );
    }
    chain
}

fn background_input_args(resource: &ResolvedResource) -> [&'static str; 2] {
    if resource.is_image() {
        ["-loop", "1"]
    } else {
        ["-stream_loop", "-1"]
    }
}

fn wave_color(color: Option<&str>) -> String {
    let color = color.unwrap_or(DEFAULT_WAVE_COLOR);
    match color.strip_prefix('#') {
        Some(hex) => format!("0x{}", hex),
        None => color.to_string(),
    }
}

/// Audio-only output (`-vn`) or video with codec settings.
fn video_output(cmd: FfmpegCommand, audio: Option<String>, duration: f64) -> FfmpegCommand {
    let cmd = cmd.map("[vout]");
    let cmd = match audio {
        Some(label) => cmd
            .map(format!("[{}]", label))
            .audio_codec("aac")
            .audio_bitrate("192k"),
        None => cmd.output_arg("-an"),
    };
    cmd.video_codec("libx264")
        .preset("veryfast")
        .crf(20)
        .output_args(["-pix_fmt", "yuv420p"])
        .output_args(["-movflags", "+faststart"])
        .output_arg("-shortest")
        .duration(duration)
}
