//! Per-request scratch directory with guaranteed teardown
//!
//! Every batch run gets an isolated directory for its generated artifacts.
//! Removal is tied to the directory guard's lifetime, so cleanup happens on
//! success, on failure, and when the owning future is dropped mid-flight.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// Scratch directory scoped to a single batch request.
///
/// The underlying directory and everything inside it is removed when this
/// value is dropped. [`close`](Self::close) removes it eagerly and surfaces
/// the removal error, which the drop path cannot.
pub struct RequestWorkDir {
    dir: TempDir,
}

impl RequestWorkDir {
    /// Create a fresh directory under `parent`, creating `parent` itself if
    /// it does not exist yet.
    pub fn create(parent: &Path) -> Result<Self> {
        std::fs::create_dir_all(parent)?;
        let dir = tempfile::Builder::new()
            .prefix("fill-")
            .tempdir_in(parent)
            .map_err(Error::Io)?;
        debug!(path = %dir.path().display(), "created request work dir");
        Ok(Self { dir })
    }

    /// Absolute path of the scratch directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path for a per-segment output artifact inside this directory.
    pub fn artifact_path(&self, segment: &str) -> PathBuf {
        self.dir.path().join(format!("{segment}.pdf"))
    }

    /// Remove a partial artifact left behind by a failed attempt. Missing
    /// files are not an error.
    pub async fn discard_partial(&self, artifact: &Path) {
        if let Err(e) = tokio::fs::remove_file(artifact).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %artifact.display(), error = %e, "failed to discard partial artifact");
            }
        }
    }

    /// Remove the directory now, reporting any removal error. Dropping the
    /// value removes it too, but silently.
    pub fn close(self) -> Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close().map_err(Error::Io)?;
        debug!(path = %path.display(), "removed request work dir");
        Ok(())
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_makes_directory_under_parent() {
        let parent = tempfile::tempdir().unwrap();
        let work = RequestWorkDir::create(parent.path()).unwrap();
        assert!(work.path().is_dir());
        assert_eq!(work.path().parent().unwrap(), parent.path());
    }

    #[test]
    fn create_makes_missing_parent() {
        let base = tempfile::tempdir().unwrap();
        let parent = base.path().join("work").join("nested");
        let work = RequestWorkDir::create(&parent).unwrap();
        assert!(work.path().is_dir());
    }

    #[test]
    fn directory_and_contents_removed_on_drop() {
        let parent = tempfile::tempdir().unwrap();
        let path;
        {
            let work = RequestWorkDir::create(parent.path()).unwrap();
            path = work.path().to_path_buf();
            std::fs::write(work.artifact_path("acord125"), b"%PDF").unwrap();
        }
        assert!(!path.exists(), "work dir must not survive its guard");
    }

    #[test]
    fn close_removes_directory_and_reports() {
        let parent = tempfile::tempdir().unwrap();
        let work = RequestWorkDir::create(parent.path()).unwrap();
        let path = work.path().to_path_buf();
        std::fs::write(work.artifact_path("acord126"), b"%PDF").unwrap();
        work.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn artifact_path_is_segment_scoped() {
        let parent = tempfile::tempdir().unwrap();
        let work = RequestWorkDir::create(parent.path()).unwrap();
        assert_eq!(
            work.artifact_path("acord125"),
            work.path().join("acord125.pdf")
        );
    }

    #[tokio::test]
    async fn discard_partial_removes_file_and_tolerates_absence() {
        let parent = tempfile::tempdir().unwrap();
        let work = RequestWorkDir::create(parent.path()).unwrap();
        let artifact = work.artifact_path("acord125");
        std::fs::write(&artifact, b"partial").unwrap();

        work.discard_partial(&artifact).await;
        assert!(!artifact.exists());

        // second call on a now-missing file is a no-op
        work.discard_partial(&artifact).await;
    }

    #[tokio::test]
    async fn cleanup_happens_even_after_failed_work() {
        let parent = tempfile::tempdir().unwrap();
        let path;
        {
            let work = RequestWorkDir::create(parent.path()).unwrap();
            path = work.path().to_path_buf();
            std::fs::write(work.artifact_path("acord125"), b"partial").unwrap();
            // simulated failure path: guard dropped without close()
        }
        assert!(!path.exists());
    }
}
