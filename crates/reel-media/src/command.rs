//! FFmpeg argument builder.

use std::path::{Path, PathBuf};

use crate::filters::FilterGraph;

/// One `-i` input with the options that precede it.
#[derive(Debug, Clone, PartialEq)]
struct Input {
    /// Input arguments (before -i)
    args: Vec<String>,
    location: String,
}

/// Builder for multi-input FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    inputs: Vec<Input>,
    /// Output file path
    output: PathBuf,
    /// Output arguments (after all inputs)
    output_args: Vec<String>,
    filter_graph: Option<FilterGraph>,
    /// Whether to overwrite output
    overwrite: bool,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command writing to `output`.
    pub fn new(output: impl AsRef<Path>) -> Self {
        Self {
            inputs: Vec::new(),
            output: output.as_ref().to_path_buf(),
            output_args: Vec::new(),
            filter_graph: None,
            overwrite: true,
        }
    }

    /// Add an input. Returns the builder; the input index is the number of
    /// inputs added before it.
    pub fn input(self, location: impl Into<String>) -> Self {
        self.input_with(Vec::<String>::new(), location)
    }

    /// Add an input preceded by input options (`-stream_loop -1`, `-ss`, ...).
    pub fn input_with<I, S>(mut self, args: I, location: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs.push(Input {
            args: args.into_iter().map(Into::into).collect(),
            location: location.into(),
        });
        self
    }

    /// Number of inputs added so far.
    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Add output arguments (after the inputs).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the filter graph (`-filter_complex`).
    pub fn filter_graph(mut self, graph: FilterGraph) -> Self {
        self.filter_graph = Some(graph);
        self
    }

    /// Map a stream or pad label to the output.
    pub fn map(self, label: impl Into<String>) -> Self {
        self.output_arg("-map").output_arg(label)
    }

    /// Set video codec.
    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    /// Set audio codec.
    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    /// Set CRF (quality).
    pub fn crf(self, crf: u8) -> Self {
        self.output_arg("-crf").output_arg(crf.to_string())
    }

    /// Set preset.
    pub fn preset(self, preset: impl Into<String>) -> Self {
        self.output_arg("-preset").output_arg(preset)
    }

    /// Set audio bitrate.
    pub fn audio_bitrate(self, bitrate: impl Into<String>) -> Self {
        self.output_arg("-b:a").output_arg(bitrate)
    }

    /// Limit output duration.
    pub fn duration(self, seconds: f64) -> Self {
        self.output_arg("-t").output_arg(format!("{:.3}", seconds))
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }
        args.push("-hide_banner".to_string());
        args.push("-nostats".to_string());

        args.push("-v".to_string());
        args.push("error".to_string());

        // Progress output to stderr
        args.push("-progress".to_string());
        args.push("pipe:2".to_string());

        for input in &self.inputs {
            args.extend(input.args.iter().cloned());
            args.push("-i".to_string());
            args.push(input.location.clone());
        }

        if let Some(graph) = self.filter_graph.as_ref().filter(|g| !g.is_empty()) {
            args.push("-filter_complex".to_string());
            args.push(graph.render());
        }

        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::{Filter, FilterChain};

    #[test]
    fn test_command_builder() {
        let mut graph = FilterGraph::new();
        graph.push(
            FilterChain::new()
                .input("0:v")
                .filter(Filter::new("null"))
                .output("v"),
        );

        let cmd = FfmpegCommand::new("/out/a.mp4")
            .input_with(["-stream_loop", "-1"], "/media/bg.mp4")
            .input("/media/voice.mp3")
            .filter_graph(graph)
            .map("[v]")
            .map("1:a")
            .video_codec("libx264")
            .crf(20)
            .duration(20.0);

        assert_eq!(cmd.input_count(), 2);
        let args = cmd.build_args();
        assert_eq!(&args[..7], &["-y", "-hide_banner", "-nostats", "-v", "error", "-progress", "pipe:2"]);

        let loop_pos = args.iter().position(|a| a == "-stream_loop").unwrap();
        assert_eq!(args[loop_pos + 3], "/media/bg.mp4");

        let fc = args.iter().position(|a| a == "-filter_complex").unwrap();
        assert_eq!(args[fc + 1], "[0:v]null[v]");
        assert!(args.contains(&"20.000".to_string()));
        assert_eq!(args.last().unwrap(), "/out/a.mp4");
    }

    #[test]
    fn test_empty_graph_is_omitted() {
        let args = FfmpegCommand::new("o.m4a")
            .input("a.mp3")
            .filter_graph(FilterGraph::new())
            .build_args();
        assert!(!args.contains(&"-filter_complex".to_string()));
    }
}
