//! Error types for the edgequake-convert library.
//!
//! Every failure a conversion can hit is a variant of [`ConvertError`]. The
//! variants fall into three groups:
//!
//! * **Dispatch errors**: the request never reaches a routine
//!   ([`ConvertError::UnknownFormat`], [`ConvertError::UnsupportedConversion`],
//!   [`ConvertError::RoutineNotImplemented`]) or the source is unusable.
//! * **Routine errors**: the routine ran and failed
//!   ([`ConvertError::DecodeFailure`], [`ConvertError::EncodeFailure`],
//!   [`ConvertError::RenderingUnavailable`]).
//! * **Setup errors**: invalid configuration or an inconsistent routine
//!   table detected when the [`crate::Converter`] is built.
//!
//! The dispatcher folds all of them into a [`crate::ConversionResult`] whose
//! [`ErrorKind`] lets callers branch on the cause without string matching.

use crate::format::Format;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the edgequake-convert library.
#[derive(Debug, Error)]
pub enum ConvertError {
    // ── Dispatch errors ───────────────────────────────────────────────────
    /// The source file has no extension, or one that is not a known format.
    #[error("Unknown source format for '{path}': extension {extension:?} is not recognised")]
    UnknownFormat { path: PathBuf, extension: String },

    /// The `(source, target)` pair is not listed in the registry.
    #[error("Conversion from '{source_format}' to '{target}' is not supported")]
    UnsupportedConversion {
        source_format: String,
        target: String,
    },

    /// The registry lists the pair but no routine is wired to it.
    ///
    /// This is a defect in the routine table, never a user error.
    #[error("No routine is registered for '{source_format}' -> '{target}' (routine table is inconsistent)")]
    RoutineNotImplemented { source_format: Format, target: Format },

    /// The target format token was empty.
    #[error("Target format must not be empty")]
    EmptyTargetFormat,

    // ── Input errors ──────────────────────────────────────────────────────
    /// Source file was not found at the given path.
    #[error("Source file not found: '{path}'")]
    SourceNotFound { path: PathBuf },

    /// Process does not have read permission on the source file.
    #[error("Permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// Source file exceeds the configured size cap.
    #[error("Source file '{path}' is {size} bytes, above the {limit} byte limit")]
    SourceTooLarge { path: PathBuf, size: u64, limit: u64 },

    /// The request id is empty or contains characters other than ASCII
    /// letters, digits, `-` and `_`.
    #[error("Invalid request id {id:?}: only ASCII letters, digits, '-' and '_' are allowed")]
    InvalidRequestId { id: String },

    /// The requested output path is not inside the configured output directory.
    #[error("Output path '{path}' is outside the output directory '{output_dir}'")]
    OutputOutsideDirectory { path: PathBuf, output_dir: PathBuf },

    // ── Routine errors ────────────────────────────────────────────────────
    /// The external document renderer is missing or could not be launched.
    #[error("Document rendering is unavailable: {detail}")]
    RenderingUnavailable { detail: String },

    /// Source content could not be decoded (corrupt file, unsupported
    /// colour mode, I/O error while reading).
    #[error("Failed to decode {format} source: {detail}")]
    DecodeFailure { format: Format, detail: String },

    /// Target content could not be produced or written.
    #[error("Failed to encode {format} output: {detail}")]
    EncodeFailure { format: Format, detail: String },

    // ── Temporary artifact errors ─────────────────────────────────────────
    /// A temporary artifact with the same name already exists.
    #[error("Temporary artifact '{path}' already exists")]
    ArtifactCollision { path: PathBuf },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write a file or directory owned by the converter.
    #[error("Failed to write '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Setup errors ──────────────────────────────────────────────────────
    /// The routine table and the registry disagree.
    #[error("Registry and routine table disagree: {0}")]
    RegistryInconsistent(String),

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (including a panicking routine).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConvertError {
    /// Shorthand for a [`ConvertError::DecodeFailure`].
    pub fn decode(format: Format, detail: impl ToString) -> Self {
        ConvertError::DecodeFailure {
            format,
            detail: detail.to_string(),
        }
    }

    /// Shorthand for a [`ConvertError::EncodeFailure`].
    pub fn encode(format: Format, detail: impl ToString) -> Self {
        ConvertError::EncodeFailure {
            format,
            detail: detail.to_string(),
        }
    }

    /// The coarse category of this error, as reported in
    /// [`crate::ConversionResult::error_kind`].
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConvertError::UnknownFormat { .. } => ErrorKind::UnknownFormat,
            ConvertError::UnsupportedConversion { .. } | ConvertError::EmptyTargetFormat => {
                ErrorKind::UnsupportedConversion
            }
            ConvertError::RoutineNotImplemented { .. } => ErrorKind::RoutineNotImplemented,
            ConvertError::RenderingUnavailable { .. } => ErrorKind::RenderingUnavailable,
            ConvertError::DecodeFailure { .. } => ErrorKind::DecodeFailure,
            ConvertError::EncodeFailure { .. } | ConvertError::OutputWriteFailed { .. } => {
                ErrorKind::EncodeFailure
            }
            ConvertError::SourceNotFound { .. }
            | ConvertError::PermissionDenied { .. }
            | ConvertError::SourceTooLarge { .. } => ErrorKind::SourceUnavailable,
            ConvertError::OutputOutsideDirectory { .. } | ConvertError::InvalidRequestId { .. } => {
                ErrorKind::InvalidRequest
            }
            ConvertError::ArtifactCollision { .. }
            | ConvertError::RegistryInconsistent(_)
            | ConvertError::InvalidConfig(_)
            | ConvertError::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Serialisable category of a [`ConvertError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnknownFormat,
    UnsupportedConversion,
    RoutineNotImplemented,
    RenderingUnavailable,
    DecodeFailure,
    EncodeFailure,
    SourceUnavailable,
    InvalidRequest,
    Internal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_display_names_both_formats() {
        let e = ConvertError::UnsupportedConversion {
            source_format: "png".into(),
            target: "docx".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("png"), "got: {msg}");
        assert!(msg.contains("docx"), "got: {msg}");
    }

    #[test]
    fn routine_not_implemented_is_its_own_kind() {
        let e = ConvertError::RoutineNotImplemented {
            source_format: Format::Pptx,
            target: Format::Txt,
        };
        assert_eq!(e.kind(), ErrorKind::RoutineNotImplemented);
        assert_ne!(e.kind(), ErrorKind::UnsupportedConversion);
        assert!(e.to_string().contains("pptx"));
    }

    #[test]
    fn decode_helper_builds_decode_failure() {
        let e = ConvertError::decode(Format::Png, "truncated stream");
        assert_eq!(e.kind(), ErrorKind::DecodeFailure);
        assert!(e.to_string().contains("truncated stream"));
        assert!(e.to_string().contains("png"));
    }

    #[test]
    fn error_kind_serialises_snake_case() {
        let json = serde_json::to_string(&ErrorKind::RenderingUnavailable).unwrap();
        assert_eq!(json, "\"rendering_unavailable\"");
    }
}
