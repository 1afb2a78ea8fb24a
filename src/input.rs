//! Source validation: make sure the file a collaborator handed us is usable
//! before a routine touches it.
//!
//! Checks run in order: the path exists, it is a regular file we can open
//! for reading, and it is no larger than the configured cap. Doing this up
//! front gives callers a precise error instead of a decoder complaining
//! about an empty or unreadable stream.

use crate::error::ConvertError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A source file that passed validation.
#[derive(Debug, Clone)]
pub struct ResolvedSource {
    pub path: PathBuf,
    pub size: u64,
}

/// Validate `path` as a conversion source.
pub fn resolve_source(path: &Path, max_bytes: u64) -> Result<ResolvedSource, ConvertError> {
    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(ConvertError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(ConvertError::SourceNotFound {
                path: path.to_path_buf(),
            });
        }
    };

    if !metadata.is_file() {
        return Err(ConvertError::SourceNotFound {
            path: path.to_path_buf(),
        });
    }

    // Check read permission by attempting to open
    match std::fs::File::open(path) {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(ConvertError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(ConvertError::SourceNotFound {
                path: path.to_path_buf(),
            });
        }
    }

    let size = metadata.len();
    if size > max_bytes {
        return Err(ConvertError::SourceTooLarge {
            path: path.to_path_buf(),
            size,
            limit: max_bytes,
        });
    }

    debug!("Resolved source {} ({} bytes)", path.display(), size);
    Ok(ResolvedSource {
        path: path.to_path_buf(),
        size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_is_not_found() {
        let err = resolve_source(Path::new("/definitely/not/a/real/file.txt"), 10).unwrap_err();
        assert!(matches!(err, ConvertError::SourceNotFound { .. }));
    }

    #[test]
    fn directory_is_not_a_source() {
        let dir = TempDir::new().unwrap();
        let err = resolve_source(dir.path(), 10).unwrap_err();
        assert!(matches!(err, ConvertError::SourceNotFound { .. }));
    }

    #[test]
    fn oversized_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.txt");
        std::fs::write(&path, vec![b'x'; 64]).unwrap();
        let err = resolve_source(&path, 63).unwrap_err();
        match err {
            ConvertError::SourceTooLarge { size, limit, .. } => {
                assert_eq!(size, 64);
                assert_eq!(limit, 63);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn readable_file_resolves() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ok.txt");
        std::fs::write(&path, b"hello").unwrap();
        let resolved = resolve_source(&path, 1024).unwrap();
        assert_eq!(resolved.size, 5);
        assert_eq!(resolved.path, path);
    }
}
