//! Progress-callback trait for per-conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConverterConfigBuilder::progress_callback`] to receive
//! events as the dispatcher resolves a routine and the routine moves through
//! its stages. The CLI uses it to drive a spinner; a web layer could forward
//! the same events to a socket.
//!
//! # Example
//!
//! ```rust
//! use edgequake_convert::{ConversionProgressCallback, ConversionStage, ConverterConfig};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl ConversionProgressCallback for Printer {
//!     fn on_stage(&self, stage: ConversionStage) {
//!         eprintln!("{stage}");
//!     }
//! }
//!
//! let config = ConverterConfig::builder()
//!     .progress_callback(Arc::new(Printer))
//!     .build()
//!     .unwrap();
//! ```

use crate::format::Format;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// A step inside a conversion routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionStage {
    /// Reading and parsing the source.
    Decoding(Format),
    /// Producing the target content.
    Encoding(Format),
    /// Waiting on the external document renderer.
    Rendering,
    /// Writing an intermediate artifact.
    Staging,
}

impl fmt::Display for ConversionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionStage::Decoding(format) => write!(f, "decoding {format}"),
            ConversionStage::Encoding(format) => write!(f, "encoding {format}"),
            ConversionStage::Rendering => f.write_str("rendering document"),
            ConversionStage::Staging => f.write_str("staging intermediate file"),
        }
    }
}

/// Called by the dispatcher and routines as a conversion proceeds.
///
/// Implementations must be `Send + Sync`: routines run on the blocking thread
/// pool and several conversions may share one converter. All methods default
/// to no-ops.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once the routine for `source -> target` has been resolved.
    fn on_conversion_start(&self, source: Format, target: Format) {
        let _ = (source, target);
    }

    /// Called when the routine enters a new stage.
    fn on_stage(&self, stage: ConversionStage) {
        let _ = stage;
    }

    /// Called when the output file has been written.
    ///
    /// # Arguments
    /// * `output_path` — where the result landed
    /// * `bytes`       — size of the output file
    fn on_conversion_complete(&self, output_path: &Path, bytes: u64) {
        let _ = (output_path, bytes);
    }

    /// Called when the conversion fails, with the reason that will be
    /// reported in [`crate::ConversionResult::error_reason`].
    fn on_conversion_error(&self, reason: &str) {
        let _ = reason;
    }
}

/// A no-op implementation, used when no callback is configured.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConverterConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        stages: Mutex<Vec<ConversionStage>>,
    }

    impl ConversionProgressCallback for Recording {
        fn on_stage(&self, stage: ConversionStage) {
            self.stages.lock().unwrap().push(stage);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_conversion_start(Format::Png, Format::Jpg);
        cb.on_stage(ConversionStage::Rendering);
        cb.on_conversion_complete(Path::new("out.jpg"), 12);
        cb.on_conversion_error("broken");
    }

    #[test]
    fn stages_arrive_in_order() {
        let cb = Recording::default();
        cb.on_stage(ConversionStage::Decoding(Format::Csv));
        cb.on_stage(ConversionStage::Encoding(Format::Xlsx));
        assert_eq!(
            *cb.stages.lock().unwrap(),
            vec![
                ConversionStage::Decoding(Format::Csv),
                ConversionStage::Encoding(Format::Xlsx)
            ]
        );
    }

    #[test]
    fn stage_display() {
        assert_eq!(ConversionStage::Decoding(Format::Docx).to_string(), "decoding docx");
        assert_eq!(ConversionStage::Rendering.to_string(), "rendering document");
    }
}
