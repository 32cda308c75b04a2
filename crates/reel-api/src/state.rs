//! Application state.

use reel_media::OutputStore;
use reel_worker::JobService;

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub jobs: JobService,
}

impl AppState {
    pub fn new(config: ApiConfig, jobs: JobService) -> Self {
        Self { config, jobs }
    }

    /// The output store served under its public prefix.
    pub fn outputs(&self) -> &OutputStore {
        self.jobs.context().outputs()
    }
}
