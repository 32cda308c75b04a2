//! Media pipeline for render jobs.
//!
//! This crate provides:
//! - Resource resolution (local paths, output-store aliases, URLs, asset library)
//! - Caption wrapping and a filter-graph intermediate representation
//! - Pipeline compilation of render/merge requests into FFmpeg arguments
//! - Progress parsing from `-progress pipe:2`
//! - Process supervision with timeout and escalating termination
//! - FFprobe duration lookup

pub mod captions;
pub mod command;
pub mod compile;
pub mod error;
pub mod filters;
pub mod fs_utils;
pub mod library;
pub mod output;
pub mod probe;
pub mod progress;
pub mod resolver;
pub mod runner;

pub use captions::{CaptionLayout, CaptionOverflow, MAX_CAPTION_LINES};
pub use command::FfmpegCommand;
pub use compile::{clamp_duration, compile, CompileConfig, MediaRequest, ProcessPlan};
pub use error::{MediaError, MediaResult};
pub use filters::{escape_filter_value, Filter, FilterChain, FilterGraph, FilterValue};
pub use library::{
    AssetDescriptor, AssetLibrary, AssetVariant, JsonAssetLibrary, LibraryChoice, LibraryPrecedence,
    NoLibrary,
};
pub use output::OutputStore;
pub use probe::{parse_probe_output, probe_duration};
pub use progress::{FfmpegProgress, ProgressParser, ProgressThrottle};
pub use resolver::{ResolvedRefs, ResolvedResource, ResourceKind, Resolver, ResolverConfig};
pub use runner::{FfmpegRunner, ProcessRunner, ProgressCallback, RunnerConfig, TailBuffer};
