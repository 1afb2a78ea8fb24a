//! Temporary artifacts: intermediate files owned by a single routine run.
//!
//! Artifacts live in the configured scratch directory. Their names are built
//! from the request key (derived from the request's unique id) plus a suffix,
//! with no random component, so two concurrent requests never share a name
//! and a clash means something reused an id. Creation uses exclusive-create
//! semantics and fails with [`ConvertError::ArtifactCollision`] instead of
//! overwriting.
//!
//! Both [`TempArtifact`] and [`TempWorkDir`] delete themselves on drop, so
//! every exit path of a routine (early `?` return, panic unwinding, normal
//! completion) releases them. A deletion failure is logged and swallowed: it
//! must not turn a finished conversion into a failed one.

use crate::error::ConvertError;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::{TempDir, TempPath};
use tracing::{debug, warn};

/// Factory for scoped temporary artifacts inside one directory.
#[derive(Debug, Clone)]
pub struct ScratchArea {
    base_dir: PathBuf,
}

impl ScratchArea {
    /// Use `base_dir` for artifacts. The directory must already exist.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Path an artifact for `key` and `suffix` would get.
    pub fn artifact_path(&self, key: &str, suffix: &str) -> PathBuf {
        self.base_dir.join(artifact_name(key, suffix))
    }

    /// Create an empty artifact file named after `key` and `suffix`.
    ///
    /// # Errors
    /// [`ConvertError::ArtifactCollision`] if the name is already taken,
    /// [`ConvertError::OutputWriteFailed`] for any other I/O failure.
    pub fn create_scoped(&self, key: &str, suffix: &str) -> Result<TempArtifact, ConvertError> {
        let name = artifact_name(key, suffix);
        let path = self.base_dir.join(&name);

        let file = tempfile::Builder::new()
            .prefix(&name)
            .rand_bytes(0)
            .tempfile_in(&self.base_dir)
            .map_err(|e| classify_create_error(path.clone(), e))?;

        debug!("Created temporary artifact {}", path.display());
        Ok(TempArtifact {
            path,
            handle: Some(file.into_temp_path()),
        })
    }

    /// Create an empty artifact directory named after `key` and `suffix`.
    pub fn create_scoped_dir(&self, key: &str, suffix: &str) -> Result<TempWorkDir, ConvertError> {
        let name = artifact_name(key, suffix);
        let path = self.base_dir.join(&name);

        let dir = tempfile::Builder::new()
            .prefix(&name)
            .rand_bytes(0)
            .tempdir_in(&self.base_dir)
            .map_err(|e| classify_create_error(path.clone(), e))?;

        debug!("Created temporary work dir {}", path.display());
        Ok(TempWorkDir {
            path,
            handle: Some(dir),
        })
    }
}

fn artifact_name(key: &str, suffix: &str) -> String {
    let key: String = key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("{key}.tmp{suffix}")
}

fn classify_create_error(path: PathBuf, e: std::io::Error) -> ConvertError {
    if e.kind() == std::io::ErrorKind::AlreadyExists {
        ConvertError::ArtifactCollision { path }
    } else {
        ConvertError::OutputWriteFailed { path, source: e }
    }
}

/// A scoped intermediate file. Deleted on [`release`](Self::release) or drop.
#[derive(Debug)]
pub struct TempArtifact {
    path: PathBuf,
    handle: Option<TempPath>,
}

impl TempArtifact {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the artifact's content with `bytes`.
    pub fn write_all(&self, bytes: &[u8]) -> std::io::Result<()> {
        let mut file = std::fs::File::create(self.path())?;
        file.write_all(bytes)?;
        file.sync_all()
    }

    /// Delete the artifact now. Failures are logged, not returned.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if let Some(handle) = self.handle.take() {
            match handle.close() {
                Ok(()) => debug!("Released temporary artifact {}", self.path.display()),
                Err(e) => warn!(
                    "Temporary artifact {} was not deleted: {}",
                    self.path.display(),
                    e
                ),
            }
        }
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        self.release_inner();
    }
}

/// A scoped intermediate directory, removed recursively on release or drop.
#[derive(Debug)]
pub struct TempWorkDir {
    path: PathBuf,
    handle: Option<TempDir>,
}

impl TempWorkDir {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the directory now. Failures are logged, not returned.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if let Some(handle) = self.handle.take() {
            match handle.close() {
                Ok(()) => debug!("Released temporary work dir {}", self.path.display()),
                Err(e) => warn!(
                    "Temporary work dir {} was not deleted: {}",
                    self.path.display(),
                    e
                ),
            }
        }
    }
}

impl Drop for TempWorkDir {
    fn drop(&mut self) {
        self.release_inner();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn artifact_is_named_after_key_and_suffix() {
        let dir = TempDir::new().unwrap();
        let scratch = ScratchArea::new(dir.path());
        let artifact = scratch.create_scoped("req-1", ".jpg").unwrap();
        assert_eq!(artifact.path(), dir.path().join("req-1.tmp.jpg"));
        assert!(artifact.path().exists());
    }

    #[test]
    fn release_deletes_the_file() {
        let dir = TempDir::new().unwrap();
        let scratch = ScratchArea::new(dir.path());
        let artifact = scratch.create_scoped("req-2", ".jpg").unwrap();
        artifact.write_all(b"payload").unwrap();
        let path = artifact.path().to_path_buf();
        artifact.release();
        assert!(!path.exists());
    }

    #[test]
    fn drop_deletes_on_early_return() {
        fn failing(scratch: &ScratchArea) -> Result<(), ConvertError> {
            let artifact = scratch.create_scoped("req-3", ".jpg")?;
            artifact.write_all(b"half written").unwrap();
            Err(ConvertError::Internal("boom".into()))
        }

        let dir = TempDir::new().unwrap();
        let scratch = ScratchArea::new(dir.path());
        assert!(failing(&scratch).is_err());
        assert!(!scratch.artifact_path("req-3", ".jpg").exists());
    }

    #[test]
    fn name_collision_fails_loudly() {
        let dir = TempDir::new().unwrap();
        let scratch = ScratchArea::new(dir.path());
        let first = scratch.create_scoped("same", ".jpg").unwrap();
        first.write_all(b"keep me").unwrap();

        let err = scratch.create_scoped("same", ".jpg").unwrap_err();
        assert!(matches!(err, ConvertError::ArtifactCollision { .. }), "got {err}");
        assert_eq!(std::fs::read(first.path()).unwrap(), b"keep me");
    }

    #[test]
    fn key_is_sanitised() {
        let dir = TempDir::new().unwrap();
        let scratch = ScratchArea::new(dir.path());
        assert_eq!(
            scratch.artifact_path("../evil name", ".jpg"),
            dir.path().join("___evil_name.tmp.jpg")
        );
    }

    #[test]
    fn work_dir_is_removed_with_contents() {
        let dir = TempDir::new().unwrap();
        let scratch = ScratchArea::new(dir.path());
        let work = scratch.create_scoped_dir("req-4", ".render").unwrap();
        std::fs::write(work.path().join("out.pdf"), b"%PDF").unwrap();
        let path = work.path().to_path_buf();
        drop(work);
        assert!(!path.exists());
    }

    #[test]
    fn work_dir_collision_fails_loudly() {
        let dir = TempDir::new().unwrap();
        let scratch = ScratchArea::new(dir.path());
        let _first = scratch.create_scoped_dir("req-5", ".render").unwrap();
        let err = scratch.create_scoped_dir("req-5", ".render").unwrap_err();
        assert!(matches!(err, ConvertError::ArtifactCollision { .. }));
    }
}
