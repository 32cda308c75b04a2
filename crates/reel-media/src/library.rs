//! Asset-library lookup.
//!
//! The library maps an opaque identifier to a descriptor holding
//! quality-ranked file variants and preview/canonical URLs. Only reads
//! are performed; the index is maintained elsewhere.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::MediaResult;

/// One stored rendition of an asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AssetVariant {
    /// Local file path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Remote URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    /// Bitrate or any other tie-breaking quality score
    #[serde(default)]
    pub quality: u64,
}

impl AssetVariant {
    fn rank(&self) -> (u64, u64) {
        (u64::from(self.width) * u64::from(self.height), self.quality)
    }
}

/// Library entry for one asset identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AssetDescriptor {
    /// Canonical URL of the entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    #[serde(default)]
    pub files: Vec<AssetVariant>,
}

impl AssetDescriptor {
    /// Variants ordered best first.
    pub fn ranked_variants(&self) -> Vec<&AssetVariant> {
        let mut variants: Vec<&AssetVariant> = self.files.iter().collect();
        variants.sort_by(|a, b| b.rank().cmp(&a.rank()));
        variants
    }
}

/// Where a library entry resolves to, in order of preference.
///
/// This ordering is a policy, not a protocol requirement; it lives here
/// so it can be swapped without touching the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LibraryPrecedence {
    /// Best local file, then preview URL, then canonical URL, then the
    /// best remote variant link.
    #[default]
    LocalThenPreviewThenCanonical,
}

/// Candidate produced by applying a [`LibraryPrecedence`].
#[derive(Debug, Clone, PartialEq)]
pub enum LibraryChoice {
    Local(PathBuf),
    Remote(String),
}

impl LibraryPrecedence {
    /// Ordered candidates for a descriptor. Local candidates still need an
    /// existence check by the caller.
    pub fn candidates(&self, descriptor: &AssetDescriptor) -> Vec<LibraryChoice> {
        match self {
            LibraryPrecedence::LocalThenPreviewThenCanonical => {
                let ranked = descriptor.ranked_variants();
                let mut out: Vec<LibraryChoice> = ranked
                    .iter()
                    .filter_map(|v| v.path.clone().map(LibraryChoice::Local))
                    .collect();
                out.extend(descriptor.preview_url.clone().map(LibraryChoice::Remote));
                out.extend(descriptor.url.clone().map(LibraryChoice::Remote));
                out.extend(
                    ranked
                        .iter()
                        .filter_map(|v| v.link.clone().map(LibraryChoice::Remote)),
                );
                out
            }
        }
    }
}

/// Read-only key to descriptor lookup.
pub trait AssetLibrary: Send + Sync {
    fn lookup(&self, id: &str) -> Option<AssetDescriptor>;
}

/// Library with no entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLibrary;

impl AssetLibrary for NoLibrary {
    fn lookup(&self, _id: &str) -> Option<AssetDescriptor> {
        None
    }
}

/// Library backed by a JSON index file (`{"<id>": {descriptor}}`).
#[derive(Debug, Clone, Default)]
pub struct JsonAssetLibrary {
    entries: HashMap<String, AssetDescriptor>,
}

impl JsonAssetLibrary {
    pub fn from_entries(entries: HashMap<String, AssetDescriptor>) -> Self {
        Self { entries }
    }

    /// Load an index file.
    pub fn load(path: impl AsRef<Path>) -> MediaResult<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        let entries: HashMap<String, AssetDescriptor> = serde_json::from_slice(&bytes)?;
        tracing::info!(
            path = %path.as_ref().display(),
            entries = entries.len(),
            "Loaded asset library index"
        );
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl AssetLibrary for JsonAssetLibrary {
    fn lookup(&self, id: &str) -> Option<AssetDescriptor> {
        self.entries.get(id).cloned()
    }
}
