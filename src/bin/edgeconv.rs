//! CLI binary for edgequake-convert.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConverterConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_convert::{
    supported_formats, ConversionProgressCallback, ConversionRequest, ConversionResult,
    ConversionStage, Converter, ConverterConfig, Format, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a spinner whose message follows the routine's
/// stages, cleared once the conversion settles.
struct CliProgressCallback {
    bar: ProgressBar,
    started: Instant,
}

impl CliProgressCallback {
    fn new_spinner() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.set_message("Checking source…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            started: Instant::now(),
        })
    }

    fn elapsed(&self) -> String {
        dim(&format!("{:.1}s", self.started.elapsed().as_secs_f64()))
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, source: Format, target: Format) {
        self.bar.set_prefix("Converting");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("{source} → {target}"))
        ));
    }

    fn on_stage(&self, stage: ConversionStage) {
        self.bar.set_message(stage.to_string());
    }

    fn on_conversion_complete(&self, output_path: &Path, bytes: u64) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {}  {}  {}",
            green("✔"),
            bold(&output_path.display().to_string()),
            dim(&format!("{bytes} bytes")),
            self.elapsed(),
        );
    }

    fn on_conversion_error(&self, reason: &str) {
        self.bar.finish_and_clear();

        // Keep long renderer diagnostics on one line.
        let msg = if reason.chars().count() > 100 {
            let cut: String = reason.chars().take(99).collect();
            format!("{cut}\u{2026}")
        } else {
            reason.to_string()
        };
        eprintln!("{} {}  {}", red("✘"), red(&msg), self.elapsed());
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Word document to plain text (lands in ./converted/)
  edgeconv report.docx --to txt

  # Explicit output file
  edgeconv sales.xlsx --to csv -o exports/sales.csv

  # Image to single-page PDF, machine-readable result
  edgeconv scan.png --to pdf --json

  # Everything the engine can do
  edgeconv --list-formats

CONVERSIONS:
  Source   Targets
  ──────   ───────────────────
  docx     pdf*, txt
  pdf      txt, docx
  xlsx     csv, txt
  csv      xlsx, txt
  txt      pdf, docx
  pptx     pdf*, txt
  jpg      png, pdf, jpeg
  jpeg     png, pdf, jpg
  png      jpg, pdf, jpeg
  bmp      png, jpg, jpeg, pdf

  * needs LibreOffice (soffice) on PATH, or --soffice

ENVIRONMENT VARIABLES:
  EDGECONV_OUTPUT_DIR    Directory that receives converted files
  EDGECONV_SCRATCH_DIR   Directory for temporary artifacts
  EDGECONV_SOFFICE       Path to the LibreOffice binary
  EDGECONV_MAX_SIZE      Largest accepted source, in bytes
  RUST_LOG               Overrides the log filter (e.g. edgequake_convert=debug)
"#;

/// Convert documents, spreadsheets and images between formats.
#[derive(Parser, Debug)]
#[command(
    name = "edgeconv",
    version,
    about = "Convert documents, spreadsheets and images between formats",
    long_about = "Convert office documents (docx, pptx, xlsx), CSV, plain text, PDF and raster \
images (jpg, png, bmp) between formats. Every conversion either produces a complete output \
file or reports why it could not, leaving nothing half-written behind.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Source file. Its format is taken from the extension.
    #[arg(required_unless_present = "list_formats")]
    input: Option<PathBuf>,

    /// Target format token (pdf, txt, docx, csv, xlsx, png, jpg, jpeg).
    #[arg(short = 't', long = "to", required_unless_present = "list_formats")]
    target: Option<String>,

    /// Write the result to this file. Defaults to
    /// `<output-dir>/<id>_<stem>_converted.<target>`.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Directory that receives converted files.
    #[arg(long, env = "EDGECONV_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Directory for temporary artifacts.
    #[arg(long, env = "EDGECONV_SCRATCH_DIR")]
    scratch_dir: Option<PathBuf>,

    /// Path to the LibreOffice binary used for docx/pptx → pdf.
    #[arg(long, env = "EDGECONV_SOFFICE")]
    soffice: Option<PathBuf>,

    /// Largest accepted source file, in bytes.
    #[arg(long, env = "EDGECONV_MAX_SIZE")]
    max_size: Option<u64>,

    /// Request id used to name the output. Defaults to a fresh UUID.
    #[arg(long)]
    id: Option<String>,

    /// List supported formats and conversions, then exit.
    #[arg(long)]
    list_formats: bool,

    /// Print the result as JSON on stdout.
    #[arg(long, env = "EDGECONV_JSON")]
    json: bool,

    /// Disable the spinner.
    #[arg(long, env = "EDGECONV_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "EDGECONV_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "EDGECONV_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner carries the user-facing feedback, so library INFO logs
    // are muted while it is active.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.list_formats;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Format listing ───────────────────────────────────────────────────
    if cli.list_formats {
        print_formats(cli.json)?;
        return Ok(());
    }

    let (Some(input), Some(target)) = (cli.input.as_deref(), cli.target.as_deref()) else {
        anyhow::bail!("a source file and --to are required");
    };

    // ── Build converter ──────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_spinner();
        Some(cb as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb)?;
    let converter = Converter::new(config).context("Failed to initialise converter")?;

    // ── Run conversion ───────────────────────────────────────────────────
    let result = match cli.output {
        Some(ref output_path) => converter.convert_file(input, output_path, target).await,
        None => {
            let mut request = ConversionRequest::new(input, target);
            if let Some(ref id) = cli.id {
                request = request.with_id(id.clone());
            }
            converter.convert(&request).await
        }
    };

    report(&cli, &result, show_progress)?;

    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}

/// Map CLI args to `ConverterConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConverterConfig> {
    let mut builder = ConverterConfig::builder();

    // An explicit output file implies its parent as the output directory.
    let output_dir = cli.output_dir.clone().or_else(|| {
        cli.output.as_ref().map(|p| match p.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        })
    });
    if let Some(dir) = output_dir {
        builder = builder.output_dir(dir);
    }
    if let Some(ref dir) = cli.scratch_dir {
        builder = builder.scratch_dir(dir);
    }
    if let Some(ref soffice) = cli.soffice {
        builder = builder.soffice_path(soffice);
    }
    if let Some(max) = cli.max_size {
        builder = builder.max_source_bytes(max);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Print the outcome. The spinner callback already printed the one-line
/// summary when it was active.
fn report(cli: &Cli, result: &ConversionResult, show_progress: bool) -> Result<()> {
    if cli.json {
        let json = serde_json::to_string_pretty(result).context("Failed to serialise result")?;
        println!("{json}");
        return Ok(());
    }

    match (&result.output_path, &result.error_reason) {
        (Some(path), _) => {
            // The path is the one useful thing on stdout, even in quiet mode.
            println!("{}", path.display());
            if !cli.quiet && !show_progress {
                eprintln!("{} converted", green("✔"));
            }
        }
        (None, reason) => {
            if !show_progress {
                eprintln!(
                    "{} {}",
                    red("✘"),
                    reason.as_deref().unwrap_or("conversion failed")
                );
            }
        }
    }
    Ok(())
}

fn print_formats(json: bool) -> Result<()> {
    let formats = supported_formats();
    if json {
        let out = serde_json::to_string_pretty(&formats).context("Failed to serialise formats")?;
        println!("{out}");
        return Ok(());
    }

    let join = |list: &[Format]| {
        list.iter()
            .map(|f| f.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };
    println!("{}  {}", bold("Input: "), join(&formats.input_formats));
    println!("{}  {}", bold("Output:"), join(&formats.output_formats));
    println!();
    for source in &formats.input_formats {
        let targets: Vec<Format> = formats
            .conversions
            .iter()
            .filter(|edge| edge.source == *source)
            .map(|edge| edge.target)
            .collect();
        println!("  {:<6} {} {}", source.as_str(), dim("→"), join(&targets));
    }
    Ok(())
}
