//! Conversion routines and the table that wires them to registry edges.
//!
//! ## Why a table of tagged variants?
//!
//! Every edge of the [`crate::registry`] maps to exactly one [`Routine`]
//! variant through [`ROUTINES`]. Because both tables are static, a
//! mismatch (an edge with no routine, a routine for an edge that does not
//! exist, or a routine wired to formats it cannot handle) is found by
//! [`verify_table`] when the [`crate::Converter`] is built, not when a user
//! first hits the broken pair.
//!
//! Routines are blocking: they read the source, call codecs, and write the
//! target in one go. The dispatcher runs them on the blocking thread pool.

use crate::artifact::ScratchArea;
use crate::codec::delimited::{self, Delimiter};
use crate::codec::docx::{self, Block};
use crate::codec::{pdf, pptx, raster, xlsx};
use crate::config::TextLayout;
use crate::error::ConvertError;
use crate::format::Format;
use crate::progress::{ConversionStage, ProgressCallback};
use crate::registry;
use crate::render::DocumentRenderer;
use image::ImageReader;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error};

/// Suffix of the hidden file a target is staged in before it is renamed
/// into place.
const STAGING_SUFFIX: &str = ".partial";

const UTF8_BOM: &str = "\u{FEFF}";

/// One concrete transformation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Routine {
    DocxToTxt,
    DocxToPdf,
    PdfToTxt,
    PdfToDocx,
    XlsxToCsv,
    XlsxToTxt,
    CsvToXlsx,
    CsvToTxt,
    TxtToPdf,
    TxtToDocx,
    PptxToPdf,
    PptxToTxt,
    /// Any raster format to png, jpg or jpeg.
    RasterToRaster,
    /// Any raster format to a single-page PDF, via a JPEG artifact.
    RasterToPdf,
}

/// A `(source, target) -> routine` wiring.
pub type RoutineEntry = (Format, Format, Routine);

/// The routine for every registry edge.
pub static ROUTINES: &[RoutineEntry] = &[
    (Format::Docx, Format::Pdf, Routine::DocxToPdf),
    (Format::Docx, Format::Txt, Routine::DocxToTxt),
    (Format::Pdf, Format::Txt, Routine::PdfToTxt),
    (Format::Pdf, Format::Docx, Routine::PdfToDocx),
    (Format::Xlsx, Format::Csv, Routine::XlsxToCsv),
    (Format::Xlsx, Format::Txt, Routine::XlsxToTxt),
    (Format::Csv, Format::Xlsx, Routine::CsvToXlsx),
    (Format::Csv, Format::Txt, Routine::CsvToTxt),
    (Format::Txt, Format::Pdf, Routine::TxtToPdf),
    (Format::Txt, Format::Docx, Routine::TxtToDocx),
    (Format::Pptx, Format::Pdf, Routine::PptxToPdf),
    (Format::Pptx, Format::Txt, Routine::PptxToTxt),
    (Format::Jpg, Format::Png, Routine::RasterToRaster),
    (Format::Jpg, Format::Pdf, Routine::RasterToPdf),
    (Format::Jpg, Format::Jpeg, Routine::RasterToRaster),
    (Format::Jpeg, Format::Png, Routine::RasterToRaster),
    (Format::Jpeg, Format::Pdf, Routine::RasterToPdf),
    (Format::Jpeg, Format::Jpg, Routine::RasterToRaster),
    (Format::Png, Format::Jpg, Routine::RasterToRaster),
    (Format::Png, Format::Pdf, Routine::RasterToPdf),
    (Format::Png, Format::Jpeg, Routine::RasterToRaster),
    (Format::Bmp, Format::Png, Routine::RasterToRaster),
    (Format::Bmp, Format::Jpg, Routine::RasterToRaster),
    (Format::Bmp, Format::Jpeg, Routine::RasterToRaster),
    (Format::Bmp, Format::Pdf, Routine::RasterToPdf),
];

/// Check that `table` covers every registry edge exactly once, names no
/// other pair, and wires each pair to a routine that can handle it.
///
/// # Errors
/// [`ConvertError::RegistryInconsistent`] listing every problem found.
pub fn verify_table(table: &[RoutineEntry]) -> Result<(), ConvertError> {
    let mut problems = Vec::new();

    for edge in registry::edges() {
        let count = table
            .iter()
            .filter(|(s, t, _)| *s == edge.source && *t == edge.target)
            .count();
        match count {
            0 => problems.push(format!("{} -> {} has no routine", edge.source, edge.target)),
            1 => {}
            n => problems.push(format!("{} -> {} has {} routines", edge.source, edge.target, n)),
        }
    }

    for &(source, target, routine) in table {
        if !registry::can_convert(source, target) {
            problems.push(format!("{routine:?} is wired to {source} -> {target}, which is not a registry edge"));
        } else if !routine.handles(source, target) {
            problems.push(format!("{routine:?} cannot convert {source} -> {target}"));
        }
    }

    if problems.is_empty() {
        debug!("Routine table verified: {} routines", table.len());
        Ok(())
    } else {
        error!("Routine table is inconsistent: {}", problems.join("; "));
        Err(ConvertError::RegistryInconsistent(problems.join("; ")))
    }
}

/// Find the routine for a registry-valid pair.
///
/// # Errors
/// [`ConvertError::RoutineNotImplemented`] when `table` has no entry for
/// the pair. Callers check the registry first, so this only fires when the
/// table is incomplete.
pub fn resolve(table: &[RoutineEntry], source: Format, target: Format) -> Result<Routine, ConvertError> {
    table
        .iter()
        .find(|(s, t, _)| *s == source && *t == target)
        .map(|(_, _, routine)| *routine)
        .ok_or(ConvertError::RoutineNotImplemented {
            source_format: source,
            target,
        })
}

/// Everything a routine needs for one run.
#[derive(Clone)]
pub struct RoutineContext {
    pub source: PathBuf,
    pub target: PathBuf,
    pub source_format: Format,
    pub target_format: Format,
    /// Derived from the request id; names this run's temporary artifacts.
    pub artifact_key: String,
    pub scratch: ScratchArea,
    pub renderer: Arc<dyn DocumentRenderer>,
    pub layout: TextLayout,
    pub progress: Option<ProgressCallback>,
}

impl RoutineContext {
    fn stage(&self, stage: ConversionStage) {
        debug!("{}: {}", self.artifact_key, stage);
        if let Some(ref cb) = self.progress {
            cb.on_stage(stage);
        }
    }

    fn decoding(&self) {
        self.stage(ConversionStage::Decoding(self.source_format));
    }

    fn encoding(&self) {
        self.stage(ConversionStage::Encoding(self.target_format));
    }

    /// Write the finished target.
    ///
    /// The bytes go to a hidden sibling first and are renamed over the
    /// target, so readers see either the old file or the complete new one.
    fn write_target(&self, bytes: &[u8]) -> Result<(), ConvertError> {
        let failed = |source: std::io::Error| ConvertError::OutputWriteFailed {
            path: self.target.clone(),
            source,
        };
        let parent = match self.target.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let prefix = format!(
            ".{}.",
            self.target
                .file_name()
                .map(|n| n.to_string_lossy())
                .unwrap_or_default()
        );

        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix).suffix(STAGING_SUFFIX);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            builder.permissions(std::fs::Permissions::from_mode(0o644));
        }
        let mut staged = builder.tempfile_in(parent).map_err(failed)?;
        staged.write_all(bytes).map_err(failed)?;
        staged.as_file().sync_all().map_err(failed)?;
        staged.persist(&self.target).map_err(|e| failed(e.error))?;
        Ok(())
    }
}

impl Routine {
    /// Whether this routine can carry out `source -> target`.
    pub fn handles(self, source: Format, target: Format) -> bool {
        use Format::*;
        match self {
            Routine::DocxToTxt => (source, target) == (Docx, Txt),
            Routine::DocxToPdf => (source, target) == (Docx, Pdf),
            Routine::PdfToTxt => (source, target) == (Pdf, Txt),
            Routine::PdfToDocx => (source, target) == (Pdf, Docx),
            Routine::XlsxToCsv => (source, target) == (Xlsx, Csv),
            Routine::XlsxToTxt => (source, target) == (Xlsx, Txt),
            Routine::CsvToXlsx => (source, target) == (Csv, Xlsx),
            Routine::CsvToTxt => (source, target) == (Csv, Txt),
            Routine::TxtToPdf => (source, target) == (Txt, Pdf),
            Routine::TxtToDocx => (source, target) == (Txt, Docx),
            Routine::PptxToPdf => (source, target) == (Pptx, Pdf),
            Routine::PptxToTxt => (source, target) == (Pptx, Txt),
            Routine::RasterToRaster => {
                source.is_raster() && matches!(target, Png | Jpg | Jpeg) && source != target
            }
            Routine::RasterToPdf => source.is_raster() && target == Pdf,
        }
    }

    /// Run the routine. On success the target file is complete.
    pub fn run(self, ctx: &RoutineContext) -> Result<(), ConvertError> {
        match self {
            Routine::DocxToTxt => docx_to_txt(ctx),
            Routine::PptxToTxt => pptx_to_txt(ctx),
            Routine::PdfToTxt => pdf_to_txt(ctx),
            Routine::DocxToPdf | Routine::PptxToPdf => office_to_pdf(ctx),
            Routine::PdfToDocx => pdf_to_docx(ctx),
            Routine::TxtToDocx => txt_to_docx(ctx),
            Routine::TxtToPdf => txt_to_pdf(ctx),
            Routine::XlsxToCsv => xlsx_to_delimited(ctx, Delimiter::Comma),
            Routine::XlsxToTxt => xlsx_to_delimited(ctx, Delimiter::Tab),
            Routine::CsvToTxt => csv_to_tsv(ctx),
            Routine::CsvToXlsx => csv_to_xlsx(ctx),
            Routine::RasterToRaster => raster_to_raster(ctx),
            Routine::RasterToPdf => raster_to_pdf(ctx),
        }
    }
}

// ── Text extraction ──────────────────────────────────────────────────────

fn docx_to_txt(ctx: &RoutineContext) -> Result<(), ConvertError> {
    ctx.decoding();
    let paragraphs = docx::read_paragraphs(&ctx.source)?;
    ctx.encoding();
    ctx.write_target(paragraphs.join("\n").as_bytes())
}

fn pptx_to_txt(ctx: &RoutineContext) -> Result<(), ConvertError> {
    ctx.decoding();
    let slides = pptx::read_slides(&ctx.source)?;
    ctx.encoding();
    ctx.write_target(pptx::slides_to_text(&slides).as_bytes())
}

fn pdf_to_txt(ctx: &RoutineContext) -> Result<(), ConvertError> {
    ctx.decoding();
    let pages = pdf::extract_pages(&ctx.source)?;
    ctx.encoding();
    ctx.write_target(pdf::pages_to_text(&pages).as_bytes())
}

// ── Document re-encoding ─────────────────────────────────────────────────

fn office_to_pdf(ctx: &RoutineContext) -> Result<(), ConvertError> {
    // Reject undecodable sources before starting the renderer.
    ctx.decoding();
    match ctx.source_format {
        Format::Docx => {
            docx::read_paragraphs(&ctx.source)?;
        }
        Format::Pptx => {
            pptx::read_slides(&ctx.source)?;
        }
        other => {
            return Err(ConvertError::Internal(format!(
                "office renderer called for {other}"
            )))
        }
    }

    let work = ctx.scratch.create_scoped_dir(&ctx.artifact_key, ".render")?;
    ctx.stage(ConversionStage::Rendering);
    let produced = ctx.renderer.render_to_pdf(&ctx.source, work.path())?;

    ctx.encoding();
    let rendered = std::fs::read(&produced).map_err(|e| ConvertError::OutputWriteFailed {
        path: produced.clone(),
        source: e,
    })?;
    ctx.write_target(&rendered)?;
    work.release();
    Ok(())
}

fn pdf_to_docx(ctx: &RoutineContext) -> Result<(), ConvertError> {
    ctx.decoding();
    let pages = pdf::extract_pages(&ctx.source)?;

    ctx.encoding();
    let mut blocks = Vec::new();
    for (i, page) in pages.iter().enumerate() {
        if i > 0 {
            blocks.push(Block::PageBreak);
        }
        blocks.extend(docx::blocks_from_text(page));
    }
    ctx.write_target(&docx::write_document(&blocks)?)
}

fn txt_to_docx(ctx: &RoutineContext) -> Result<(), ConvertError> {
    ctx.decoding();
    let text = read_text(&ctx.source)?;
    ctx.encoding();
    ctx.write_target(&docx::write_document(&docx::blocks_from_text(&text))?)
}

fn txt_to_pdf(ctx: &RoutineContext) -> Result<(), ConvertError> {
    ctx.decoding();
    let text = read_text(&ctx.source)?;
    ctx.encoding();
    ctx.write_target(&pdf::write_text(&text, &ctx.layout)?)
}

/// Read a UTF-8 text file, dropping a leading byte-order mark.
fn read_text(path: &Path) -> Result<String, ConvertError> {
    let bytes = std::fs::read(path).map_err(|e| ConvertError::decode(Format::Txt, e))?;
    let text = String::from_utf8(bytes)
        .map_err(|e| ConvertError::decode(Format::Txt, format!("not valid UTF-8: {e}")))?;
    Ok(match text.strip_prefix(UTF8_BOM) {
        Some(rest) => rest.to_string(),
        None => text,
    })
}

// ── Tabular re-encoding ──────────────────────────────────────────────────

fn xlsx_to_delimited(ctx: &RoutineContext, delimiter: Delimiter) -> Result<(), ConvertError> {
    ctx.decoding();
    let rows = xlsx::read_first_sheet(&ctx.source)?;
    ctx.encoding();
    ctx.write_target(&delimited::write_records(&rows, delimiter, ctx.target_format)?)
}

fn csv_to_tsv(ctx: &RoutineContext) -> Result<(), ConvertError> {
    ctx.decoding();
    let records = delimited::read_records(&ctx.source)?;
    ctx.encoding();
    ctx.write_target(&delimited::write_records(&records, Delimiter::Tab, Format::Txt)?)
}

fn csv_to_xlsx(ctx: &RoutineContext) -> Result<(), ConvertError> {
    ctx.decoding();
    let records = delimited::read_records(&ctx.source)?;
    ctx.encoding();
    ctx.write_target(&xlsx::write_workbook(&records)?)
}

// ── Raster re-encoding ───────────────────────────────────────────────────

fn raster_to_raster(ctx: &RoutineContext) -> Result<(), ConvertError> {
    ctx.decoding();
    let img = raster::decode(&ctx.source, ctx.source_format)?;
    ctx.encoding();
    ctx.write_target(&raster::encode_for(&img, ctx.target_format)?)
}

fn raster_to_pdf(ctx: &RoutineContext) -> Result<(), ConvertError> {
    ctx.decoding();
    let img = raster::decode(&ctx.source, ctx.source_format)?;

    // Step 1: normalise to an RGB JPEG artifact.
    ctx.stage(ConversionStage::Staging);
    let jpeg = raster::encode_jpeg(&raster::flatten_onto_white(&img), Format::Pdf)?;
    drop(img);
    let artifact = ctx.scratch.create_scoped(&ctx.artifact_key, ".jpg")?;
    artifact
        .write_all(&jpeg)
        .map_err(|e| ConvertError::OutputWriteFailed {
            path: artifact.path().to_path_buf(),
            source: e,
        })?;
    drop(jpeg);

    // Step 2: wrap the artifact. The source is not read again.
    ctx.encoding();
    let bytes = std::fs::read(artifact.path()).map_err(|e| ConvertError::encode(Format::Pdf, e))?;
    let (width, height) = ImageReader::open(artifact.path())
        .map_err(|e| ConvertError::encode(Format::Pdf, e))?
        .with_guessed_format()
        .map_err(|e| ConvertError::encode(Format::Pdf, e))?
        .into_dimensions()
        .map_err(|e| ConvertError::encode(Format::Pdf, e))?;
    ctx.write_target(&pdf::wrap_jpeg(bytes, width, height)?)?;

    artifact.release();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::LibreOfficeRenderer;
    use tempfile::TempDir;

    fn context(dir: &TempDir, source: &str, target: &str) -> RoutineContext {
        let source = dir.path().join(source);
        let target = dir.path().join(target);
        RoutineContext {
            source_format: Format::from_path(&source).unwrap(),
            target_format: Format::from_path(&target).unwrap(),
            source,
            target,
            artifact_key: "req".into(),
            scratch: ScratchArea::new(dir.path()),
            renderer: Arc::new(LibreOfficeRenderer::with_program(dir.path().join("no-soffice"))),
            layout: TextLayout::default(),
            progress: None,
        }
    }

    #[test]
    fn builtin_table_is_consistent() {
        verify_table(ROUTINES).unwrap();
    }

    #[test]
    fn every_edge_resolves() {
        for edge in registry::edges() {
            let routine = resolve(ROUTINES, edge.source, edge.target).unwrap();
            assert!(routine.handles(edge.source, edge.target), "{edge:?}");
        }
    }

    #[test]
    fn missing_entry_is_reported() {
        let partial: Vec<RoutineEntry> = ROUTINES
            .iter()
            .copied()
            .filter(|(s, t, _)| (*s, *t) != (Format::Pptx, Format::Txt))
            .collect();
        let err = verify_table(&partial).unwrap_err();
        assert!(err.to_string().contains("pptx -> txt has no routine"), "{err}");

        let err = resolve(&partial, Format::Pptx, Format::Txt).unwrap_err();
        assert!(matches!(err, ConvertError::RoutineNotImplemented { .. }));
    }

    #[test]
    fn extra_and_miswired_entries_are_reported() {
        let mut table = ROUTINES.to_vec();
        table.push((Format::Png, Format::Docx, Routine::TxtToDocx));
        let err = verify_table(&table).unwrap_err();
        assert!(err.to_string().contains("not a registry edge"), "{err}");

        let miswired: Vec<RoutineEntry> = ROUTINES
            .iter()
            .map(|&(s, t, r)| {
                if (s, t) == (Format::Csv, Format::Txt) {
                    (s, t, Routine::XlsxToTxt)
                } else {
                    (s, t, r)
                }
            })
            .collect();
        let err = verify_table(&miswired).unwrap_err();
        assert!(err.to_string().contains("cannot convert csv -> txt"), "{err}");
    }

    #[test]
    fn raster_routine_refuses_same_format() {
        assert!(!Routine::RasterToRaster.handles(Format::Png, Format::Png));
        assert!(Routine::RasterToRaster.handles(Format::Jpg, Format::Jpeg));
        assert!(!Routine::RasterToPdf.handles(Format::Txt, Format::Pdf));
    }

    #[test]
    fn csv_to_txt_uses_tabs() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir, "data.csv", "data.txt");
        std::fs::write(&ctx.source, "id,name\n1,\"Smith, J\"\n").unwrap();
        Routine::CsvToTxt.run(&ctx).unwrap();
        assert_eq!(std::fs::read_to_string(&ctx.target).unwrap(), "id\tname\n1\tSmith, J\n");
    }

    fn staged_leftovers(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(STAGING_SUFFIX))
            .collect()
    }

    #[test]
    fn existing_target_is_replaced_whole() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir, "data.csv", "data.txt");
        std::fs::write(&ctx.source, "a,b\n").unwrap();
        std::fs::write(&ctx.target, "stale output that is much longer than the new one\n").unwrap();

        Routine::CsvToTxt.run(&ctx).unwrap();
        assert_eq!(std::fs::read_to_string(&ctx.target).unwrap(), "a\tb\n");
        assert!(staged_leftovers(dir.path()).is_empty());
    }

    #[test]
    fn failed_write_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context(&dir, "data.csv", "data.txt");
        std::fs::write(&ctx.source, "a,b\n").unwrap();
        ctx.target = dir.path().join("missing").join("data.txt");

        let err = Routine::CsvToTxt.run(&ctx).unwrap_err();
        assert!(matches!(err, ConvertError::OutputWriteFailed { .. }), "{err}");
        assert!(!ctx.target.exists());
        assert!(staged_leftovers(dir.path()).is_empty());
    }

    #[test]
    fn txt_to_docx_reads_back() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir, "notes.txt", "notes.docx");
        std::fs::write(&ctx.source, "\u{FEFF}first\nsecond").unwrap();
        Routine::TxtToDocx.run(&ctx).unwrap();
        assert_eq!(docx::read_paragraphs(&ctx.target).unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn invalid_utf8_text_is_decode_failure() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir, "bad.txt", "bad.pdf");
        std::fs::write(&ctx.source, [0xC3, 0x28]).unwrap();
        let err = Routine::TxtToPdf.run(&ctx).unwrap_err();
        assert!(matches!(err, ConvertError::DecodeFailure { format: Format::Txt, .. }));
    }

    #[test]
    fn raster_to_pdf_releases_its_artifact() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir, "pic.png", "pic.pdf");
        let img = image::RgbaImage::from_pixel(12, 8, image::Rgba([0, 0, 0, 0]));
        img.save(&ctx.source).unwrap();

        Routine::RasterToPdf.run(&ctx).unwrap();
        assert!(std::fs::read(&ctx.target).unwrap().starts_with(b"%PDF"));
        assert!(!ctx.scratch.artifact_path("req", ".jpg").exists());
    }

    #[test]
    fn office_render_without_soffice_is_rendering_unavailable() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir, "report.docx", "report.pdf");
        let bytes = docx::write_document(&docx::blocks_from_text("hello")).unwrap();
        std::fs::write(&ctx.source, bytes).unwrap();

        let err = Routine::DocxToPdf.run(&ctx).unwrap_err();
        assert!(matches!(err, ConvertError::RenderingUnavailable { .. }), "{err}");
        assert!(!ctx.scratch.artifact_path("req", ".render").exists());
        assert!(!ctx.target.exists());
    }
}
