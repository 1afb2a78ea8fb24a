//! # edgequake-convert
//!
//! Convert office documents, spreadsheets, text and images between formats.
//!
//! ## Why this crate?
//!
//! An upload-and-convert service needs a core that answers two questions
//! reliably: *can* this file become that format, and if so, produce the file
//! or say exactly why not. This crate is that core. It takes a source path
//! and a target format token, picks the one routine wired to the pair, runs
//! it, and always hands back a [`ConversionResult`]: never a panic, never a
//! half-written file.
//!
//! ## Pipeline Overview
//!
//! ```text
//! source path + target token
//!  │
//!  ├─ 1. Format    extension → Format (UnknownFormat)
//!  ├─ 2. Registry  (source, target) in the edge table? (UnsupportedConversion)
//!  ├─ 3. Routine   static table lookup (RoutineNotImplemented)
//!  ├─ 4. Input     exists, readable, under the size cap
//!  ├─ 5. Run       codecs on the blocking pool (Decode/EncodeFailure,
//!  │               RenderingUnavailable); scoped temporary artifacts
//!  └─ 6. Result    output path, or reason + ErrorKind; partial output removed
//! ```
//!
//! ## Supported Conversions
//!
//! | Source | Targets |
//! |--------|---------|
//! | docx   | pdf, txt |
//! | pdf    | txt, docx |
//! | xlsx   | csv, txt |
//! | csv    | xlsx, txt |
//! | txt    | pdf, docx |
//! | pptx   | pdf, txt |
//! | jpg    | png, pdf, jpeg |
//! | jpeg   | png, pdf, jpg |
//! | png    | jpg, pdf, jpeg |
//! | bmp    | png, jpg, jpeg, pdf |
//!
//! docx → pdf and pptx → pdf need LibreOffice (`soffice`) at run time; every
//! other pair is handled in-process.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_convert::{ConversionRequest, Converter, ConverterConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConverterConfig::builder()
//!         .output_dir("converted")
//!         .scratch_dir("/tmp/edgequake-convert")
//!         .build()?;
//!     let converter = Converter::new(config)?;
//!
//!     let result = converter
//!         .convert(&ConversionRequest::new("uploads/report.docx", "txt"))
//!         .await;
//!     match result.output_path {
//!         Some(path) => println!("wrote {}", path.display()),
//!         None => eprintln!("failed: {}", result.error_reason.unwrap_or_default()),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `edgeconv` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-convert = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod artifact;
pub mod codec;
pub mod config;
pub mod convert;
pub mod error;
pub mod format;
pub mod input;
pub mod output;
pub mod progress;
pub mod registry;
pub mod render;
pub mod routine;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use artifact::{ScratchArea, TempArtifact, TempWorkDir};
pub use config::{ConverterConfig, ConverterConfigBuilder, TextLayout, JPEG_QUALITY};
pub use convert::{convert_sync, Converter};
pub use error::{ConvertError, ErrorKind};
pub use format::Format;
pub use output::{ConversionRequest, ConversionResult};
pub use progress::{ConversionProgressCallback, ConversionStage, NoopProgressCallback, ProgressCallback};
pub use registry::{can_convert, supported_formats, supported_targets, ConversionEdge, SupportedFormats};
pub use render::{DocumentRenderer, LibreOfficeRenderer};
pub use routine::Routine;
