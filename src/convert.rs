//! The conversion dispatcher.
//!
//! [`Converter`] owns a validated configuration and a verified routine
//! table. Each call walks the same steps:
//!
//! 1. derive the source format from the extension,
//! 2. check the pair against the registry,
//! 3. resolve the routine,
//! 4. validate the source file,
//! 5. run the routine on the blocking thread pool,
//! 6. on failure, delete any partial target the routine left behind.
//!
//! Nothing escapes [`Converter::convert`] except a [`ConversionResult`]:
//! errors and panics alike become `success: false` with a reason.

use crate::artifact::ScratchArea;
use crate::config::ConverterConfig;
use crate::error::ConvertError;
use crate::format::Format;
use crate::input;
use crate::output::{ConversionRequest, ConversionResult};
use crate::registry;
use crate::render::DocumentRenderer;
use crate::routine::{self, RoutineContext, RoutineEntry};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Converts files between the formats listed in [`crate::registry`].
///
/// Cheap to share: wrap it in an `Arc` and call it from as many tasks as
/// needed. Concurrent calls only touch their own files.
pub struct Converter {
    config: ConverterConfig,
    scratch: ScratchArea,
    renderer: Arc<dyn DocumentRenderer>,
    routines: &'static [RoutineEntry],
}

impl std::fmt::Debug for Converter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Converter")
            .field("config", &self.config)
            .field("renderer", &self.renderer.name())
            .field("routines", &self.routines.len())
            .finish()
    }
}

impl Converter {
    /// Build a converter with the built-in routine table.
    ///
    /// # Errors
    /// - [`ConvertError::RegistryInconsistent`] if the routine table does not
    ///   match the registry.
    /// - [`ConvertError::OutputWriteFailed`] if a configured directory cannot
    ///   be created.
    pub fn new(config: ConverterConfig) -> Result<Self, ConvertError> {
        Self::with_routines(config, routine::ROUTINES)
    }

    /// Build a converter with a custom routine table. The table is verified
    /// exactly like the built-in one.
    pub fn with_routines(
        config: ConverterConfig,
        routines: &'static [RoutineEntry],
    ) -> Result<Self, ConvertError> {
        routine::verify_table(routines)?;
        Self::assemble(config, routines)
    }

    /// Build without verifying the table. Used to exercise the
    /// `RoutineNotImplemented` path.
    #[cfg(test)]
    pub(crate) fn with_unverified_routines(
        config: ConverterConfig,
        routines: &'static [RoutineEntry],
    ) -> Result<Self, ConvertError> {
        Self::assemble(config, routines)
    }

    fn assemble(config: ConverterConfig, routines: &'static [RoutineEntry]) -> Result<Self, ConvertError> {
        if config.create_dirs {
            for dir in [&config.output_dir, &config.scratch_dir] {
                std::fs::create_dir_all(dir).map_err(|e| ConvertError::OutputWriteFailed {
                    path: dir.clone(),
                    source: e,
                })?;
            }
        }

        let renderer = config.resolve_renderer();
        info!(
            "Converter ready: output={}, scratch={}, renderer={}",
            config.output_dir.display(),
            config.scratch_dir.display(),
            renderer.name()
        );
        Ok(Self {
            scratch: ScratchArea::new(&config.scratch_dir),
            renderer,
            routines,
            config,
        })
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    /// Whether `source` can be converted into `target`.
    pub fn can_convert(&self, source: Format, target: Format) -> bool {
        registry::can_convert(source, target)
    }

    /// Targets available for `source`.
    pub fn supported_targets(&self, source: Format) -> &'static [Format] {
        registry::supported_targets(source)
    }

    /// Convert the file described by `request` into the output directory.
    ///
    /// The output lands at `<output_dir>/<id>_<stem>_converted.<target>`.
    pub async fn convert(&self, request: &ConversionRequest) -> ConversionResult {
        self.try_convert(request).await.into()
    }

    /// Like [`convert`](Self::convert), returning the typed error.
    ///
    /// The request id must be non-empty and made of ASCII letters, digits,
    /// `-` and `_`; anything else is rejected before the source is touched.
    pub async fn try_convert(&self, request: &ConversionRequest) -> Result<PathBuf, ConvertError> {
        let checked = check_request_id(&request.id).and_then(|()| {
            let target = self.config.output_dir.join(request.output_file_name());
            self.check_inside_output_dir(&target)?;
            Ok(target)
        });
        let target = match checked {
            Ok(target) => target,
            Err(e) => {
                self.report_failure(&request.source_path, &e);
                return Err(e);
            }
        };
        self.dispatch(&request.source_path, &target, &request.target_format, &request.id)
            .await
    }

    /// Convert `source` into `target_path`, which must lie inside the
    /// output directory.
    pub async fn convert_file(
        &self,
        source: impl AsRef<Path>,
        target_path: impl AsRef<Path>,
        target_format: &str,
    ) -> ConversionResult {
        self.try_convert_file(source, target_path, target_format)
            .await
            .into()
    }

    /// Like [`convert_file`](Self::convert_file), returning the typed error.
    pub async fn try_convert_file(
        &self,
        source: impl AsRef<Path>,
        target_path: impl AsRef<Path>,
        target_format: &str,
    ) -> Result<PathBuf, ConvertError> {
        let target = target_path.as_ref();
        if let Err(e) = self.check_inside_output_dir(target) {
            self.report_failure(source.as_ref(), &e);
            return Err(e);
        }
        let key = target
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        self.dispatch(source.as_ref(), target, target_format, &key).await
    }

    /// Delete every file in the output directory that belongs to
    /// `request_id`. Returns how many files were removed.
    pub fn cleanup(&self, request_id: &str) -> Result<usize, ConvertError> {
        check_request_id(request_id)?;
        let prefix = format!("{request_id}_");
        let entries = match std::fs::read_dir(&self.config.output_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(ConvertError::OutputWriteFailed {
                    path: self.config.output_dir.clone(),
                    source: e,
                })
            }
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let name = entry.file_name();
            if !name.to_string_lossy().starts_with(&prefix) {
                continue;
            }
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            std::fs::remove_file(&path).map_err(|e| ConvertError::OutputWriteFailed {
                path: path.clone(),
                source: e,
            })?;
            debug!("Removed {}", path.display());
            removed += 1;
        }
        info!("Cleaned up {} file(s) for request {}", removed, request_id);
        Ok(removed)
    }

    async fn dispatch(
        &self,
        source: &Path,
        target: &Path,
        target_token: &str,
        key: &str,
    ) -> Result<PathBuf, ConvertError> {
        let start = Instant::now();
        let result = self.dispatch_inner(source, target, target_token, key).await;
        match &result {
            Ok(path) => {
                let bytes = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
                info!(
                    "Converted {} -> {} ({} bytes) in {}ms",
                    source.display(),
                    path.display(),
                    bytes,
                    start.elapsed().as_millis()
                );
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_conversion_complete(path, bytes);
                }
            }
            Err(e) => self.report_failure(source, e),
        }
        result
    }

    fn report_failure(&self, source: &Path, e: &ConvertError) {
        warn!("Conversion of {} failed: {}", source.display(), e);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_conversion_error(&e.to_string());
        }
    }

    async fn dispatch_inner(
        &self,
        source: &Path,
        target: &Path,
        target_token: &str,
        key: &str,
    ) -> Result<PathBuf, ConvertError> {
        // ── Step 1: Source format ────────────────────────────────────────
        let source_format = Format::from_path(source)?;

        // ── Step 2: Registry ─────────────────────────────────────────────
        if target_token.trim().is_empty() {
            return Err(ConvertError::EmptyTargetFormat);
        }
        let target_format = match Format::from_token(target_token) {
            Some(format) if registry::can_convert(source_format, format) => format,
            _ => {
                return Err(ConvertError::UnsupportedConversion {
                    source_format: source_format.to_string(),
                    target: target_token.trim().to_ascii_lowercase(),
                })
            }
        };

        // ── Step 3: Routine ──────────────────────────────────────────────
        let routine = routine::resolve(self.routines, source_format, target_format)?;
        debug!("Resolved {:?} for {} -> {}", routine, source_format, target_format);

        // ── Step 4: Source ───────────────────────────────────────────────
        input::resolve_source(source, self.config.max_source_bytes)?;

        info!(
            "Converting {} ({} -> {})",
            source.display(),
            source_format,
            target_format
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_conversion_start(source_format, target_format);
        }

        // ── Step 5: Run ──────────────────────────────────────────────────
        let existed_before = target.exists();
        let ctx = RoutineContext {
            source: source.to_path_buf(),
            target: target.to_path_buf(),
            source_format,
            target_format,
            artifact_key: key.to_string(),
            scratch: self.scratch.clone(),
            renderer: Arc::clone(&self.renderer),
            layout: self.config.text_layout,
            progress: self.config.progress_callback.clone(),
        };
        let outcome = tokio::task::spawn_blocking(move || routine.run(&ctx))
            .await
            .map_err(|e| ConvertError::Internal(format!("Conversion task panicked: {}", e)))
            .and_then(|r| r);

        // ── Step 6: Verify or clean up ───────────────────────────────────
        match outcome {
            Ok(()) if target.is_file() => Ok(target.to_path_buf()),
            Ok(()) => Err(ConvertError::Internal(format!(
                "{routine:?} reported success but '{}' does not exist",
                target.display()
            ))),
            Err(e) => {
                if !existed_before {
                    remove_partial(target);
                }
                Err(e)
            }
        }
    }

    fn check_inside_output_dir(&self, target: &Path) -> Result<(), ConvertError> {
        let outside = || ConvertError::OutputOutsideDirectory {
            path: target.to_path_buf(),
            output_dir: self.config.output_dir.clone(),
        };
        let dir = std::path::absolute(&self.config.output_dir).map_err(|_| outside())?;
        let path = std::path::absolute(target).map_err(|_| outside())?;
        let inside = path
            .parent()
            .is_some_and(|parent| lexically_normal(parent).starts_with(lexically_normal(&dir)))
            && path.file_name().is_some();
        if inside {
            Ok(())
        } else {
            Err(outside())
        }
    }
}

/// Request ids become file name prefixes, so only `[A-Za-z0-9_-]` is allowed.
fn check_request_id(id: &str) -> Result<(), ConvertError> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ConvertError::InvalidRequestId { id: id.to_string() })
    }
}

/// Resolve `.` and `..` components without touching the filesystem.
fn lexically_normal(path: &Path) -> PathBuf {
    use std::path::Component;
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

fn remove_partial(target: &Path) {
    if !target.exists() {
        return;
    }
    match std::fs::remove_file(target) {
        Ok(()) => debug!("Removed partial output {}", target.display()),
        Err(e) => warn!(
            "Partial output {} could not be removed: {}",
            target.display(),
            e
        ),
    }
}

/// Synchronous wrapper around [`Converter::convert`].
///
/// Creates a temporary tokio runtime internally; do not call it from inside
/// an async context.
pub fn convert_sync(converter: &Converter, request: &ConversionRequest) -> ConversionResult {
    match tokio::runtime::Runtime::new() {
        Ok(rt) => rt.block_on(converter.convert(request)),
        Err(e) => ConversionResult::failed(&ConvertError::Internal(format!(
            "Failed to create tokio runtime: {}",
            e
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    fn converter(dir: &TempDir) -> Converter {
        let config = ConverterConfig::builder()
            .output_dir(dir.path().join("out"))
            .scratch_dir(dir.path().join("scratch"))
            .build()
            .unwrap();
        Converter::new(config).unwrap()
    }

    #[test]
    fn new_creates_directories() {
        let dir = TempDir::new().unwrap();
        let _converter = converter(&dir);
        assert!(dir.path().join("out").is_dir());
        assert!(dir.path().join("scratch").is_dir());
    }

    #[tokio::test]
    async fn unknown_extension_is_unknown_format() {
        let dir = TempDir::new().unwrap();
        let converter = converter(&dir);
        let source = dir.path().join("notes.xyz");
        std::fs::write(&source, "hi").unwrap();

        let result = converter.convert(&ConversionRequest::new(&source, "pdf")).await;
        assert_eq!(result.error_kind, Some(ErrorKind::UnknownFormat));
    }

    #[tokio::test]
    async fn unknown_target_is_unsupported() {
        let dir = TempDir::new().unwrap();
        let converter = converter(&dir);
        let source = dir.path().join("notes.txt");
        std::fs::write(&source, "hi").unwrap();

        let result = converter.convert(&ConversionRequest::new(&source, "mp3")).await;
        assert_eq!(result.error_kind, Some(ErrorKind::UnsupportedConversion));
        let result = converter.convert(&ConversionRequest::new(&source, "  ")).await;
        assert_eq!(result.error_kind, Some(ErrorKind::UnsupportedConversion));
    }

    #[tokio::test]
    async fn missing_routine_is_distinct_from_unsupported() {
        static PARTIAL: &[RoutineEntry] = &[(Format::Txt, Format::Docx, routine::Routine::TxtToDocx)];
        let dir = TempDir::new().unwrap();
        let config = ConverterConfig::builder()
            .output_dir(dir.path().join("out"))
            .scratch_dir(dir.path().join("scratch"))
            .build()
            .unwrap();
        assert!(matches!(
            Converter::with_routines(config.clone(), PARTIAL).unwrap_err(),
            ConvertError::RegistryInconsistent(_)
        ));

        let converter = Converter::with_unverified_routines(config, PARTIAL).unwrap();
        let source = dir.path().join("notes.txt");
        std::fs::write(&source, "hi").unwrap();

        let result = converter.convert(&ConversionRequest::new(&source, "pdf")).await;
        assert_eq!(result.error_kind, Some(ErrorKind::RoutineNotImplemented));
        let result = converter.convert(&ConversionRequest::new(&source, "xlsx")).await;
        assert_eq!(result.error_kind, Some(ErrorKind::UnsupportedConversion));
        let result = converter.convert(&ConversionRequest::new(&source, "docx")).await;
        assert!(result.success, "{result:?}");
    }

    #[tokio::test]
    async fn target_outside_output_dir_is_rejected() {
        let dir = TempDir::new().unwrap();
        let converter = converter(&dir);
        let source = dir.path().join("notes.txt");
        std::fs::write(&source, "hi").unwrap();

        let escaped = dir.path().join("out").join("..").join("escaped.docx");
        let err = converter
            .try_convert_file(&source, &escaped, "docx")
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::OutputOutsideDirectory { .. }));
        assert!(!dir.path().join("escaped.docx").exists());
    }

    #[tokio::test]
    async fn request_id_cannot_escape_output_dir() {
        let dir = TempDir::new().unwrap();
        let converter = converter(&dir);
        let source = dir.path().join("notes.txt");
        std::fs::write(&source, "hi").unwrap();

        for id in ["../escaped", "a/b", "..", "", "x\\y"] {
            let request = ConversionRequest::new(&source, "docx").with_id(id);
            let err = converter.try_convert(&request).await.unwrap_err();
            assert!(matches!(err, ConvertError::InvalidRequestId { .. }), "{id:?}: {err}");
            let result = converter.convert(&request).await;
            assert_eq!(result.error_kind, Some(ErrorKind::InvalidRequest));
        }
        assert!(!dir.path().join("escaped_notes_converted.docx").exists());
        assert_eq!(std::fs::read_dir(dir.path().join("out")).unwrap().count(), 0);

        let request = ConversionRequest::new(&source, "docx").with_id("job-7_a");
        assert!(converter.convert(&request).await.success);
    }

    #[tokio::test]
    async fn missing_source_is_source_unavailable() {
        let dir = TempDir::new().unwrap();
        let converter = converter(&dir);
        let result = converter
            .convert(&ConversionRequest::new(dir.path().join("gone.csv"), "xlsx"))
            .await;
        assert_eq!(result.error_kind, Some(ErrorKind::SourceUnavailable));
    }

    #[tokio::test]
    async fn cleanup_removes_only_matching_files() {
        let dir = TempDir::new().unwrap();
        let converter = converter(&dir);
        let out = dir.path().join("out");
        std::fs::write(out.join("abc_report_converted.pdf"), b"x").unwrap();
        std::fs::write(out.join("abc_report_converted.txt"), b"x").unwrap();
        std::fs::write(out.join("abcd_other_converted.txt"), b"x").unwrap();

        assert_eq!(converter.cleanup("abc").unwrap(), 2);
        assert!(out.join("abcd_other_converted.txt").exists());
        assert!(converter.cleanup("").is_err());
    }

    #[test]
    fn sync_wrapper_converts() {
        let dir = TempDir::new().unwrap();
        let converter = converter(&dir);
        let source = dir.path().join("data.csv");
        std::fs::write(&source, "a,b\n1,2\n").unwrap();

        let request = ConversionRequest::new(&source, "txt").with_id("sync");
        let result = convert_sync(&converter, &request);
        assert!(result.success, "{result:?}");
        let output = result.output_path.unwrap();
        assert_eq!(output, dir.path().join("out").join("sync_data_converted.txt"));
        assert_eq!(std::fs::read_to_string(output).unwrap(), "a\tb\n1\t2\n");
    }

    #[test]
    fn lexical_normalisation() {
        assert_eq!(
            lexically_normal(Path::new("/a/b/../c/./d")),
            PathBuf::from("/a/c/d")
        );
    }
}
