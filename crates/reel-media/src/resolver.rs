//! Resource resolution.
//!
//! Maps a caller-supplied reference to something the engine can open:
//! - `http://` / `https://` URLs pass through untouched
//! - output-store aliases (`/outputs/x.mp4`, `outputs:x.mp4`) map into the
//!   managed output directory
//! - existing local files are used as-is
//! - anything else is looked up in the asset library
//!
//! Resolution runs at submission time so a bad reference is rejected
//! before a job is ever queued.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::error::{MediaError, MediaResult};
use crate::library::{AssetLibrary, LibraryChoice, LibraryPrecedence, NoLibrary};
use crate::output::OutputStore;

/// Default maximum local input size (500 MiB).
pub const DEFAULT_MAX_INPUT_BYTES: u64 = 500 * 1024 * 1024;

/// Where a resolved resource lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Local,
    Remote,
}

/// A reference after resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedResource {
    pub kind: ResourceKind,
    /// Local path or URL handed to the engine
    pub location: String,
    /// Media duration, when a caller probed it
    pub duration_sec: Option<f64>,
}

impl ResolvedResource {
    pub fn local(path: &Path) -> Self {
        Self {
            kind: ResourceKind::Local,
            location: path.to_string_lossy().into_owned(),
            duration_sec: None,
        }
    }

    pub fn remote(url: impl Into<String>) -> Self {
        Self {
            kind: ResourceKind::Remote,
            location: url.into(),
            duration_sec: None,
        }
    }

    pub fn with_duration(mut self, duration_sec: Option<f64>) -> Self {
        self.duration_sec = duration_sec;
        self
    }

    pub fn is_remote(&self) -> bool {
        self.kind == ResourceKind::Remote
    }

    /// Whether the resource looks like a still image (looped with `-loop 1`).
    pub fn is_image(&self) -> bool {
        let path = self.location.split(['?', '#']).next().unwrap_or_default();
        matches!(
            Path::new(path)
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_ascii_lowercase())
                .as_deref(),
            Some("png" | "jpg" | "jpeg" | "webp" | "bmp")
        )
    }
}

/// Resolved references keyed by the original reference string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedRefs(HashMap<String, ResolvedResource>);

impl ResolvedRefs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, reference: impl Into<String>, resource: ResolvedResource) {
        self.0.insert(reference.into(), resource);
    }

    /// Look up a reference; missing entries are a compile-time bug in the
    /// caller, reported as an invalid request.
    pub fn get(&self, reference: &str) -> MediaResult<&ResolvedResource> {
        self.0
            .get(reference)
            .ok_or_else(|| MediaError::invalid_request(format!("unresolved reference '{}'", reference)))
    }

    pub fn get_mut(&mut self, reference: &str) -> Option<&mut ResolvedResource> {
        self.0.get_mut(reference)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ResolvedResource)> {
        self.0.iter()
    }
}

/// Resolver configuration.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Local inputs larger than this are rejected
    pub max_input_bytes: u64,
    pub precedence: LibraryPrecedence,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_input_bytes: DEFAULT_MAX_INPUT_BYTES,
            precedence: LibraryPrecedence::default(),
        }
    }
}

/// Reference resolver.
#[derive(Clone)]
pub struct Resolver {
    config: ResolverConfig,
    outputs: OutputStore,
    library: Arc<dyn AssetLibrary>,
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("config", &self.config)
            .field("outputs", &self.outputs)
            .finish_non_exhaustive()
    }
}

impl Resolver {
    pub fn new(config: ResolverConfig, outputs: OutputStore) -> Self {
        Self {
            config,
            outputs,
            library: Arc::new(NoLibrary),
        }
    }

    pub fn with_library(mut self, library: Arc<dyn AssetLibrary>) -> Self {
        self.library = library;
        self
    }

    pub fn outputs(&self) -> &OutputStore {
        &self.outputs
    }

    /// Resolve one reference.
    pub fn resolve(&self, reference: &str) -> MediaResult<ResolvedResource> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(MediaError::invalid_request("empty resource reference"));
        }

        if is_remote_url(reference) {
            return Ok(ResolvedResource::remote(reference));
        }

        if let Some(relative) = self.outputs.strip_alias(reference) {
            let path = self.outputs.contained_path(relative)?;
            if !path.is_file() {
                return Err(MediaError::ResourceNotFound(reference.to_string()));
            }
            self.check_size(&path)?;
            return Ok(ResolvedResource::local(&path));
        }

        let path = Path::new(reference);
        if path.is_file() {
            self.check_size(path)?;
            return Ok(ResolvedResource::local(path));
        }

        if let Some(descriptor) = self.library.lookup(reference) {
            for choice in self.config.precedence.candidates(&descriptor) {
                match choice {
                    LibraryChoice::Local(path) if path.is_file() => {
                        self.check_size(&path)?;
                        debug!(reference, path = %path.display(), "Resolved library asset locally");
                        return Ok(ResolvedResource::local(&path));
                    }
                    LibraryChoice::Local(_) => continue,
                    LibraryChoice::Remote(url) => {
                        debug!(reference, url = %url, "Resolved library asset remotely");
                        return Ok(ResolvedResource::remote(url));
                    }
                }
            }
        }

        Err(MediaError::ResourceNotFound(reference.to_string()))
    }

    /// Resolve every reference, failing on the first unresolvable one.
    pub fn resolve_all<'a, I>(&self, references: I) -> MediaResult<ResolvedRefs>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut resolved = ResolvedRefs::new();
        for reference in references {
            if resolved.0.contains_key(reference) {
                continue;
            }
            resolved.insert(reference, self.resolve(reference)?);
        }
        Ok(resolved)
    }

    fn check_size(&self, path: &Path) -> MediaResult<()> {
        let size = std::fs::metadata(path)?.len();
        if size > self.config.max_input_bytes {
            return Err(MediaError::ResourceTooLarge {
                path: path.to_path_buf(),
                size,
                limit: self.config.max_input_bytes,
            });
        }
        Ok(())
    }
}

fn is_remote_url(reference: &str) -> bool {
    let lower = reference.get(..8).unwrap_or(reference).to_ascii_lowercase();
    if !(lower.starts_with("http://") || lower.starts_with("https://")) {
        return false;
    }
    url::Url::parse(reference).is_ok()
}
