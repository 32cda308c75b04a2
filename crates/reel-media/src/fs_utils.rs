//! Filesystem helpers for engine outputs.

use std::path::Path;
use tokio::fs;

/// Remove a partially written output file.
///
/// Best effort: a missing file is fine, any other error is logged and
/// swallowed so the original failure can propagate.
pub async fn remove_partial_output(path: impl AsRef<Path>) {
    let path = path.as_ref();
    match fs::remove_file(path).await {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "Removed partial output");
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial output");
        }
    }
}

/// Size of a file, or `None` when it does not exist or is empty.
pub async fn non_empty_file_size(path: impl AsRef<Path>) -> Option<u64> {
    fs::metadata(path.as_ref())
        .await
        .ok()
        .filter(|m| m.is_file() && m.len() > 0)
        .map(|m| m.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_remove_partial_output() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("partial.mp4");
        fs::write(&path, b"half a file").await.unwrap();

        assert_eq!(non_empty_file_size(&path).await, Some(11));
        remove_partial_output(&path).await;
        assert!(!path.exists());

        // Second removal is a no-op
        remove_partial_output(&path).await;
        assert_eq!(non_empty_file_size(&path).await, None);
    }
}
