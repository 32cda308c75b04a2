//! Managed output directory.

use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

use crate::error::{MediaError, MediaResult};

/// Alternate alias accepted by the resolver besides the public prefix.
pub const OUTPUT_ALIAS: &str = "outputs:";

/// The directory all results are written to, plus the public URL prefix
/// consumers use to fetch them.
#[derive(Debug, Clone)]
pub struct OutputStore {
    dir: PathBuf,
    public_prefix: String,
}

impl OutputStore {
    pub fn new(dir: impl Into<PathBuf>, public_prefix: impl Into<String>) -> Self {
        let mut public_prefix = public_prefix.into();
        if !public_prefix.starts_with('/') {
            public_prefix.insert(0, '/');
        }
        if !public_prefix.ends_with('/') {
            public_prefix.push('/');
        }
        Self {
            dir: dir.into(),
            public_prefix,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Public prefix, always with leading and trailing slash (e.g. `/outputs/`).
    pub fn public_prefix(&self) -> &str {
        &self.public_prefix
    }

    /// Create the output directory if it does not exist.
    pub async fn ensure_dir(&self) -> MediaResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    /// A fresh, unique output path: `<label>-<uuid>.<ext>`.
    pub fn allocate(&self, label: &str, extension: &str) -> PathBuf {
        self.dir
            .join(format!("{}-{}.{}", label, Uuid::new_v4().simple(), extension))
    }

    /// Public URL for a file inside the output directory.
    pub fn public_url(&self, path: &Path) -> String {
        let name = path
            .strip_prefix(&self.dir)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        format!("{}{}", self.public_prefix, name.trim_start_matches('/'))
    }

    /// Strip an output alias from a reference, returning the remainder.
    pub fn strip_alias<'a>(&self, reference: &'a str) -> Option<&'a str> {
        reference
            .strip_prefix(self.public_prefix.as_str())
            .or_else(|| reference.strip_prefix(OUTPUT_ALIAS))
    }

    /// Map an alias remainder to a path inside the output directory,
    /// rejecting anything that could escape it.
    pub fn contained_path(&self, relative: &str) -> MediaResult<PathBuf> {
        let mut clean = PathBuf::new();
        for component in Path::new(relative.trim_start_matches('/')).components() {
            match component {
                Component::Normal(part) => clean.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(MediaError::PathTraversal(relative.to_string()));
                }
            }
        }
        if clean.as_os_str().is_empty() {
            return Err(MediaError::PathTraversal(relative.to_string()));
        }
        Ok(self.dir.join(clean))
    }
}
