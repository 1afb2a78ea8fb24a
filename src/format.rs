//! File format identifiers.
//!
//! A format is always derived from a file extension: the leading dot is
//! stripped and the token is lowercased, so `Report.DOCX` and `report.docx`
//! both resolve to [`Format::Docx`]. No content sniffing happens at this
//! level; codecs validate the bytes themselves when they decode.

use crate::error::ConvertError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// A supported file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Docx,
    Pdf,
    Xlsx,
    Csv,
    Txt,
    Pptx,
    Jpg,
    Jpeg,
    Png,
    Bmp,
}

impl Format {
    /// Every format, in registry order.
    pub const ALL: [Format; 10] = [
        Format::Docx,
        Format::Pdf,
        Format::Xlsx,
        Format::Csv,
        Format::Txt,
        Format::Pptx,
        Format::Jpg,
        Format::Jpeg,
        Format::Png,
        Format::Bmp,
    ];

    /// The normalised lowercase token, e.g. `"docx"`.
    pub fn as_str(self) -> &'static str {
        match self {
            Format::Docx => "docx",
            Format::Pdf => "pdf",
            Format::Xlsx => "xlsx",
            Format::Csv => "csv",
            Format::Txt => "txt",
            Format::Pptx => "pptx",
            Format::Jpg => "jpg",
            Format::Jpeg => "jpeg",
            Format::Png => "png",
            Format::Bmp => "bmp",
        }
    }

    /// Parse a format token, tolerating a leading dot and any case.
    pub fn from_token(token: &str) -> Option<Format> {
        let normalised = normalise_token(token);
        Format::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == normalised)
    }

    /// Derive the format of a file from its extension.
    ///
    /// # Errors
    /// [`ConvertError::UnknownFormat`] when the path has no extension or the
    /// extension is not one of the supported formats.
    pub fn from_path(path: &Path) -> Result<Format, ConvertError> {
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();

        Format::from_token(&extension).ok_or_else(|| ConvertError::UnknownFormat {
            path: path.to_path_buf(),
            extension: normalise_token(&extension),
        })
    }

    /// MIME type used when serving a file of this format.
    pub fn mime_type(self) -> &'static str {
        match self {
            Format::Pdf => "application/pdf",
            Format::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            Format::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            Format::Pptx => {
                "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            }
            Format::Csv => "text/csv",
            Format::Txt => "text/plain",
            Format::Jpg | Format::Jpeg => "image/jpeg",
            Format::Png => "image/png",
            Format::Bmp => "image/bmp",
        }
    }

    /// Whether this format is a raster image.
    pub fn is_raster(self) -> bool {
        matches!(self, Format::Jpg | Format::Jpeg | Format::Png | Format::Bmp)
    }

    /// Whether this format can carry an alpha channel.
    pub fn supports_alpha(self) -> bool {
        matches!(self, Format::Png | Format::Bmp)
    }
}

/// MIME type for an arbitrary file name, falling back to
/// `application/octet-stream` for unknown extensions.
pub fn mime_type_for(path: &Path) -> &'static str {
    Format::from_path(path)
        .map(Format::mime_type)
        .unwrap_or("application/octet-stream")
}

fn normalise_token(token: &str) -> String {
    token.trim().trim_start_matches('.').to_ascii_lowercase()
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Format::from_token(s).ok_or_else(|| ConvertError::UnknownFormat {
            path: Default::default(),
            extension: normalise_token(s),
        })
    }
}
