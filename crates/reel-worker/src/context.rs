//! Shared state for submission and execution.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::info;

use reel_media::{
    CompileConfig, FfmpegRunner, JsonAssetLibrary, OutputStore, ProcessRunner, Resolver,
};
use reel_queue::{JobStore, ProgressMap};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};

/// Everything a render needs, owned in one place and shared by `Arc`.
pub struct WorkerContext {
    pub store: JobStore,
    pub progress: ProgressMap,
    pub resolver: Resolver,
    pub runner: Arc<dyn ProcessRunner>,
    pub compile: CompileConfig,
    pub ffprobe_path: String,
    pub probe_timeout: Duration,
    /// Running jobs older than this are reaped
    pub stale_after: chrono::Duration,
    /// One permit: queued jobs and synchronous tools share the engine
    pub engine_slot: Semaphore,
}

impl WorkerContext {
    /// Build the context, creating the data and output directories and
    /// loading the asset-library index when one is configured.
    pub async fn new(config: &WorkerConfig) -> WorkerResult<Self> {
        let store = JobStore::new(config.store_config());
        store.init().await?;

        let outputs = config.output_store();
        outputs.ensure_dir().await?;

        let mut resolver = Resolver::new(config.resolver_config(), outputs);
        if let Some(index) = &config.library_index {
            let library = JsonAssetLibrary::load(index).map_err(|e| {
                WorkerError::config_error(format!(
                    "failed to load asset library {}: {}",
                    index.display(),
                    e
                ))
            })?;
            info!(path = %index.display(), assets = library.len(), "Loaded asset library");
            resolver = resolver.with_library(Arc::new(library));
        }

        Ok(Self {
            store,
            progress: ProgressMap::new(),
            resolver,
            runner: Arc::new(FfmpegRunner::new(config.runner_config())),
            compile: config.compile_config(),
            ffprobe_path: config.ffprobe_path.clone(),
            probe_timeout: config.probe_timeout,
            stale_after: config.stale_threshold(),
            engine_slot: Semaphore::new(1),
        })
    }

    /// Replace the engine runner.
    pub fn with_runner(mut self, runner: Arc<dyn ProcessRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn outputs(&self) -> &OutputStore {
        self.resolver.outputs()
    }
}
