//! External document rendering (docx/pptx → pdf).
//!
//! Laying out a Word or PowerPoint document faithfully is a job for an office
//! suite, not for this crate. Routines that need it go through the
//! [`DocumentRenderer`] trait; the default implementation shells out to
//! LibreOffice in headless mode. When no renderer can be found the routine
//! fails with [`ConvertError::RenderingUnavailable`], which callers can tell
//! apart from a broken input file.
//!
//! Rendering blocks for as long as the office suite takes. Bounding that time
//! is the caller's job.

use crate::error::ConvertError;
use crate::format::Format;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// Renders an office document to PDF.
pub trait DocumentRenderer: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Render `source` to PDF, writing the result into `work_dir`, and
    /// return the path of the produced file.
    ///
    /// `work_dir` is an empty directory owned by the calling routine and
    /// deleted after the call; implementations may write anything there.
    fn render_to_pdf(&self, source: &Path, work_dir: &Path) -> Result<PathBuf, ConvertError>;
}

/// Program names probed on `PATH` when no explicit binary is configured.
const SOFFICE_CANDIDATES: &[&str] = &["soffice", "libreoffice"];

/// Renders through `soffice --headless --convert-to pdf`.
#[derive(Debug, Clone, Default)]
pub struct LibreOfficeRenderer {
    program: Option<PathBuf>,
}

impl LibreOfficeRenderer {
    /// Use `program` as the LibreOffice binary instead of searching `PATH`.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: Some(program.into()),
        }
    }

    /// Locate the binary to run.
    ///
    /// # Errors
    /// [`ConvertError::RenderingUnavailable`] when the configured binary does
    /// not exist or nothing suitable is on `PATH`.
    pub fn locate(&self) -> Result<PathBuf, ConvertError> {
        if let Some(ref program) = self.program {
            if program.is_file() {
                return Ok(program.clone());
            }
            return Err(ConvertError::RenderingUnavailable {
                detail: format!("LibreOffice binary not found at '{}'", program.display()),
            });
        }

        find_on_path(SOFFICE_CANDIDATES).ok_or_else(|| ConvertError::RenderingUnavailable {
            detail: "LibreOffice (soffice) was not found on PATH".to_string(),
        })
    }
}

impl DocumentRenderer for LibreOfficeRenderer {
    fn name(&self) -> &str {
        "libreoffice"
    }

    fn render_to_pdf(&self, source: &Path, work_dir: &Path) -> Result<PathBuf, ConvertError> {
        let program = self.locate()?;
        info!(
            "Rendering {} to PDF with {}",
            source.display(),
            program.display()
        );

        // A private profile directory keeps concurrent soffice processes
        // from fighting over the user's profile lock.
        let profile = work_dir.join("profile");
        let output = Command::new(&program)
            .arg(format!("-env:UserInstallation={}", file_url(&profile)))
            .arg("--headless")
            .arg("--convert-to")
            .arg("pdf")
            .arg("--outdir")
            .arg(work_dir)
            .arg(source)
            .output()
            .map_err(|e| ConvertError::RenderingUnavailable {
                detail: format!("failed to launch '{}': {}", program.display(), e),
            })?;

        if !output.status.success() {
            return Err(ConvertError::encode(
                Format::Pdf,
                format!(
                    "LibreOffice exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }

        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let produced = work_dir.join(format!("{stem}.pdf"));
        if !produced.is_file() {
            return Err(ConvertError::encode(
                Format::Pdf,
                format!(
                    "LibreOffice reported success but '{}' was not produced",
                    produced.display()
                ),
            ));
        }

        debug!("LibreOffice produced {}", produced.display());
        Ok(produced)
    }
}

fn find_on_path(candidates: &[&str]) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .flat_map(|dir| candidates.iter().map(move |name| dir.join(name)))
        .find(|candidate| candidate.is_file())
}

fn file_url(path: &Path) -> String {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    format!("file://{}", absolute.display())
}
