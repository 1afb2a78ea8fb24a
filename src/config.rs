//! Configuration for the conversion engine.
//!
//! All engine behaviour is controlled through [`ConverterConfig`], built via
//! its [`ConverterConfigBuilder`]. Directories are passed in rather than
//! read from process-wide state, so each test (or each tenant of a service)
//! can run against its own isolated output and scratch directories.

use crate::error::ConvertError;
use crate::progress::ProgressCallback;
use crate::render::{DocumentRenderer, LibreOfficeRenderer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// JPEG encoding quality used by every raster routine (0–100).
pub const JPEG_QUALITY: u8 = 95;

/// Default cap on source size: 100 MiB.
pub const DEFAULT_MAX_SOURCE_BYTES: u64 = 100 * 1024 * 1024;

/// Configuration for a [`crate::Converter`].
///
/// # Example
/// ```rust
/// use edgequake_convert::ConverterConfig;
///
/// let config = ConverterConfig::builder()
///     .output_dir("/srv/converted")
///     .scratch_dir("/srv/scratch")
///     .max_source_bytes(20 * 1024 * 1024)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConverterConfig {
    /// Directory that receives converted files. Default: `converted`.
    ///
    /// [`crate::Converter::convert`] refuses to write anywhere else.
    pub output_dir: PathBuf,

    /// Directory for temporary artifacts. Default: `<system temp>/edgequake-convert`.
    pub scratch_dir: PathBuf,

    /// Create `output_dir` and `scratch_dir` when the converter is built. Default: true.
    pub create_dirs: bool,

    /// Largest accepted source file in bytes. Default: 100 MiB.
    pub max_source_bytes: u64,

    /// Explicit LibreOffice binary. If None, `soffice`/`libreoffice` is looked up on `PATH`.
    pub soffice_path: Option<PathBuf>,

    /// Pre-constructed document renderer. Takes precedence over `soffice_path`.
    pub renderer: Option<Arc<dyn DocumentRenderer>>,

    /// Page geometry and font used when laying out plain text as PDF.
    pub text_layout: TextLayout,

    /// Optional progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("converted"),
            scratch_dir: std::env::temp_dir().join("edgequake-convert"),
            create_dirs: true,
            max_source_bytes: DEFAULT_MAX_SOURCE_BYTES,
            soffice_path: None,
            renderer: None,
            text_layout: TextLayout::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConverterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterConfig")
            .field("output_dir", &self.output_dir)
            .field("scratch_dir", &self.scratch_dir)
            .field("create_dirs", &self.create_dirs)
            .field("max_source_bytes", &self.max_source_bytes)
            .field("soffice_path", &self.soffice_path)
            .field("renderer", &self.renderer.as_ref().map(|r| r.name().to_string()))
            .field("text_layout", &self.text_layout)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConverterConfig {
    /// Create a new builder for `ConverterConfig`.
    pub fn builder() -> ConverterConfigBuilder {
        ConverterConfigBuilder {
            config: Self::default(),
        }
    }

    /// The renderer routines should use: the injected one, else LibreOffice.
    pub fn resolve_renderer(&self) -> Arc<dyn DocumentRenderer> {
        if let Some(ref renderer) = self.renderer {
            return Arc::clone(renderer);
        }
        match self.soffice_path {
            Some(ref path) => Arc::new(LibreOfficeRenderer::with_program(path)),
            None => Arc::new(LibreOfficeRenderer::default()),
        }
    }
}

/// Builder for [`ConverterConfig`].
pub struct ConverterConfigBuilder {
    config: ConverterConfig,
}

impl ConverterConfigBuilder {
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.scratch_dir = dir.into();
        self
    }

    pub fn create_dirs(mut self, v: bool) -> Self {
        self.config.create_dirs = v;
        self
    }

    pub fn max_source_bytes(mut self, bytes: u64) -> Self {
        self.config.max_source_bytes = bytes;
        self
    }

    pub fn soffice_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.soffice_path = Some(path.into());
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn DocumentRenderer>) -> Self {
        self.config.renderer = Some(renderer);
        self
    }

    pub fn text_layout(mut self, layout: TextLayout) -> Self {
        self.config.text_layout = layout;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConverterConfig, ConvertError> {
        let c = &self.config;
        if c.output_dir.as_os_str().is_empty() {
            return Err(ConvertError::InvalidConfig(
                "output directory must not be empty".into(),
            ));
        }
        if c.scratch_dir.as_os_str().is_empty() {
            return Err(ConvertError::InvalidConfig(
                "scratch directory must not be empty".into(),
            ));
        }
        if c.max_source_bytes == 0 {
            return Err(ConvertError::InvalidConfig(
                "max source size must be at least 1 byte".into(),
            ));
        }
        c.text_layout.validate()?;
        Ok(self.config)
    }
}

/// Page geometry for text → PDF layout. All lengths are PDF points (1/72 in).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TextLayout {
    /// Default: 595 (A4).
    pub page_width: f32,
    /// Default: 842 (A4).
    pub page_height: f32,
    /// Margin on all four sides. Default: 56 (about 2 cm).
    pub margin: f32,
    /// Helvetica size. Default: 11.
    pub font_size: f32,
    /// Baseline-to-baseline distance. Default: 14.
    pub leading: f32,
}

impl Default for TextLayout {
    fn default() -> Self {
        Self {
            page_width: 595.0,
            page_height: 842.0,
            margin: 56.0,
            font_size: 11.0,
            leading: 14.0,
        }
    }
}

impl TextLayout {
    /// Lines that fit on one page.
    pub fn lines_per_page(&self) -> usize {
        let usable = self.page_height - 2.0 * self.margin;
        ((usable / self.leading).floor() as usize).max(1)
    }

    /// Characters that fit on one line, using an average Helvetica glyph
    /// width of half the font size.
    pub fn chars_per_line(&self) -> usize {
        let usable = self.page_width - 2.0 * self.margin;
        ((usable / (self.font_size * 0.5)).floor() as usize).max(1)
    }

    fn validate(&self) -> Result<(), ConvertError> {
        if !(4.0..=72.0).contains(&self.font_size) {
            return Err(ConvertError::InvalidConfig(format!(
                "font size must be 4–72 pt, got {}",
                self.font_size
            )));
        }
        if self.leading < self.font_size {
            return Err(ConvertError::InvalidConfig(format!(
                "leading ({}) must not be smaller than the font size ({})",
                self.leading, self.font_size
            )));
        }
        if self.margin < 0.0
            || self.page_width <= 2.0 * self.margin + self.font_size
            || self.page_height <= 2.0 * self.margin + self.leading
        {
            return Err(ConvertError::InvalidConfig(
                "page is too small for the configured margins".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build() {
        let config = ConverterConfig::builder().build().unwrap();
        assert_eq!(config.max_source_bytes, DEFAULT_MAX_SOURCE_BYTES);
        assert_eq!(config.output_dir, PathBuf::from("converted"));
        assert!(config.create_dirs);
    }

    #[test]
    fn zero_size_cap_is_rejected() {
        let err = ConverterConfig::builder()
            .max_source_bytes(0)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("max source size"));
    }

    #[test]
    fn empty_output_dir_is_rejected() {
        assert!(ConverterConfig::builder().output_dir("").build().is_err());
    }

    #[test]
    fn bad_layout_is_rejected() {
        let layout = TextLayout {
            font_size: 12.0,
            leading: 10.0,
            ..TextLayout::default()
        };
        assert!(ConverterConfig::builder().text_layout(layout).build().is_err());

        let tiny = TextLayout {
            page_width: 100.0,
            page_height: 100.0,
            margin: 50.0,
            ..TextLayout::default()
        };
        assert!(ConverterConfig::builder().text_layout(tiny).build().is_err());
    }

    #[test]
    fn a4_layout_capacity() {
        let layout = TextLayout::default();
        // (842 - 112) / 14 = 52.1
        assert_eq!(layout.lines_per_page(), 52);
        // (595 - 112) / 5.5 = 87.8
        assert_eq!(layout.chars_per_line(), 87);
    }

    #[test]
    fn debug_hides_trait_objects() {
        let config = ConverterConfig::builder()
            .renderer(Arc::new(LibreOfficeRenderer::default()))
            .build()
            .unwrap();
        let dbg = format!("{config:?}");
        assert!(dbg.contains("libreoffice"));
    }
}
