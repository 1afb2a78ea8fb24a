//! Request and result types exchanged with the calling collaborator.

use crate::error::{ConvertError, ErrorKind};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// One conversion job, as handed over by the upload layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionRequest {
    /// Unique id for this request. Output and temporary file names derive
    /// from it, so it must not be reused while a conversion is in flight.
    pub id: String,
    /// Where the uploaded source lives.
    pub source_path: PathBuf,
    /// Requested target format token, e.g. `"pdf"`.
    pub target_format: String,
    /// The file name the user uploaded, used to name the output.
    pub display_name: String,
}

impl ConversionRequest {
    /// Create a request with a fresh UUID v4 id. The display name defaults to
    /// the source file name.
    pub fn new(source_path: impl Into<PathBuf>, target_format: impl Into<String>) -> Self {
        let source_path = source_path.into();
        let display_name = source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            id: Uuid::new_v4().to_string(),
            source_path,
            target_format: target_format.into(),
            display_name,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    /// User-facing name of the converted file: `<stem>_converted.<target>`.
    pub fn converted_file_name(&self) -> String {
        let stem = Path::new(&self.display_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "file".to_string());
        format!(
            "{}_converted.{}",
            stem,
            self.target_format.trim().to_ascii_lowercase()
        )
    }

    /// Name of the file in the output directory: `<id>_<converted name>`.
    pub fn output_file_name(&self) -> String {
        format!("{}_{}", self.id, self.converted_file_name())
    }
}

/// Outcome of one conversion.
///
/// On success `output_path` points at a complete file; on failure no output
/// file exists and `error_reason` explains why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl ConversionResult {
    pub fn succeeded(output_path: impl Into<PathBuf>) -> Self {
        Self {
            success: true,
            output_path: Some(output_path.into()),
            error_reason: None,
            error_kind: None,
        }
    }

    pub fn failed(error: &ConvertError) -> Self {
        Self {
            success: false,
            output_path: None,
            error_reason: Some(error.to_string()),
            error_kind: Some(error.kind()),
        }
    }
}

impl From<Result<PathBuf, ConvertError>> for ConversionResult {
    fn from(result: Result<PathBuf, ConvertError>) -> Self {
        match result {
            Ok(path) => ConversionResult::succeeded(path),
            Err(e) => ConversionResult::failed(&e),
        }
    }
}
