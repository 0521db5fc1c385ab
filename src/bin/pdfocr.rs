//! CLI binary for pdfocr.
//!
//! A thin shim over the library crate: maps CLI flags onto the stored
//! defaults, builds a `ParameterSet`, runs the pipeline and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdfocr::{
    load_pdf, CancellationSignal, OcrDefaults, OcrError, OcrPipeline, OcrProgressCallback,
    ParameterOverrides, ParameterSet, PdfiumRasterizer, Preset, ProgressCallback, Rasterizer,
    RecognizerFactory, TesseractCliFactory,
};
use std::io::{self, Write};
use std::path::PathBuf;
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
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

/// Colour a confidence the way a reader would judge it.
fn confidence_label(conf: f32) -> String {
    let text = format!("{:>3.0}%", conf * 100.0);
    if conf >= 0.80 {
        green(&text)
    } else if conf >= 0.50 {
        yellow(&text)
    } else {
        red(&text)
    }
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a spinner while pages are rasterised, then a
/// bar with one log line per recognised page.
struct CliProgressCallback {
    bar: ProgressBar,
    page_started: std::sync::Mutex<Option<Instant>>,
}

impl CliProgressCallback {
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Rasterising PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            page_started: std::sync::Mutex::new(None),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Recognising");
        self.bar.reset_eta();
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl OcrProgressCallback for CliProgressCallback {
    fn on_pipeline_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Recognising {total_pages} pages…"))
        ));
    }

    fn on_page_start(&self, page: usize, _total_pages: usize) {
        if let Ok(mut started) = self.page_started.lock() {
            *started = Some(Instant::now());
        }
        self.bar.set_message(format!("page {page}"));
    }

    fn on_page_complete(&self, page: usize, total_pages: usize, confidence: f32) {
        let elapsed = self
            .page_started
            .lock()
            .ok()
            .and_then(|mut s| s.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);

        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  conf {}  {}",
            green("✓"),
            page,
            total_pages,
            confidence_label(confidence),
            dim(&format!("{elapsed:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_pipeline_complete(&self, total_pages: usize) {
        self.finish();
        eprintln!(
            "{} {} pages recognised",
            green("✔"),
            bold(&total_pages.to_string())
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Basic OCR (stdout)
  pdfocr scan.pdf

  # Write combined text to a file
  pdfocr scan.pdf -o scan.txt

  # Poor-quality scan, English only
  pdfocr --preset LowQualityScan --language eng fax.pdf

  # Forms: sparse text, no binarisation tricks
  pdfocr --preset Form application.pdf

  # Full result (per-page text, confidence, previews) as JSON
  pdfocr --json scan.pdf > scan.json

  # From a URL, first 50 pages at 400 DPI
  pdfocr --dpi 400 --max-pages 50 https://example.com/archive.pdf

PRESETS:
  Default          stored defaults, unchanged
  LowQualityScan   400 DPI, deskew, adaptive threshold, sharpen, single column
  Photo            500 DPI, deskew, adaptive threshold, sharpen, auto layout
  Form             300 DPI, deskew only, sparse text

ENGINE MODES (--oem):       TesseractOnly, LstmOnly, TesseractAndLstm, Default (or 0–3)
SEGMENTATION MODES (--psm): Auto, SingleColumn, SingleBlock, SparseText, … (or 0–13)

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
  TESSDATA_PREFIX         Honoured by Tesseract when --tessdata-dir is not set
  RUST_LOG                Overrides the log filter (e.g. pdfocr=debug)
"#;

/// OCR scanned PDF files and URLs with Tesseract.
#[derive(Parser, Debug)]
#[command(
    name = "pdfocr",
    version,
    about = "OCR scanned PDF files and URLs with Tesseract",
    long_about = "Rasterise PDF pages, clean them up (deskew, contrast, sharpen, threshold) \
and recognise their text with Tesseract. Prints the combined text with one header per page, \
or the full per-page result as JSON.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Write the combined text to this file instead of stdout.
    #[arg(short, long, env = "PDFOCR_OUTPUT")]
    output: Option<PathBuf>,

    /// JSON file with stored defaults (object or `"ocr"` section).
    #[arg(long, env = "PDFOCR_CONFIG")]
    config: Option<PathBuf>,

    /// Preset applied after the overrides: Default, LowQualityScan, Photo, Form.
    #[arg(long, env = "PDFOCR_PRESET")]
    preset: Option<String>,

    /// Tesseract language(s), e.g. eng or deu+eng.
    #[arg(short, long, env = "PDFOCR_LANGUAGE")]
    language: Option<String>,

    /// OCR engine mode (name or 0–3).
    #[arg(long, env = "PDFOCR_OEM")]
    oem: Option<String>,

    /// Page segmentation mode (name or 0–13).
    #[arg(long, env = "PDFOCR_PSM")]
    psm: Option<String>,

    /// Rasterisation DPI. Non-positive values fall back to the default.
    #[arg(long, env = "PDFOCR_DPI", allow_negative_numbers = true)]
    dpi: Option<i64>,

    /// Straighten tilted pages (true/false).
    #[arg(long, env = "PDFOCR_DESKEW", action = clap::ArgAction::Set)]
    deskew: Option<bool>,

    /// Local-mean binarisation instead of denoise + fixed threshold (true/false).
    #[arg(long, env = "PDFOCR_ADAPTIVE_THRESHOLD", action = clap::ArgAction::Set)]
    adaptive_threshold: Option<bool>,

    /// Sharpen glyph edges before binarisation (true/false).
    #[arg(long, env = "PDFOCR_SHARPEN", action = clap::ArgAction::Set)]
    sharpen: Option<bool>,

    /// Page cap (clamped to 1–200).
    #[arg(long, env = "PDFOCR_MAX_PAGES", allow_negative_numbers = true)]
    max_pages: Option<i64>,

    /// Directory containing *.traineddata files.
    #[arg(long, env = "PDFOCR_TESSDATA_DIR")]
    tessdata_dir: Option<PathBuf>,

    /// Path to the tesseract executable.
    #[arg(long, env = "PDFOCR_TESSERACT_BIN", default_value = "tesseract")]
    tesseract_bin: PathBuf,

    /// Use the in-process libtesseract engine instead of the executable.
    #[cfg(feature = "tesseract")]
    #[arg(long, env = "PDFOCR_NATIVE")]
    native: bool,

    /// Path to libpdfium (file or directory). Defaults to PDFIUM_LIB_PATH, then the system library.
    #[arg(long, env = "PDFOCR_PDFIUM_LIB")]
    pdfium_lib: Option<PathBuf>,

    /// Output the full PipelineResult as JSON instead of text.
    #[arg(long, env = "PDFOCR_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDFOCR_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDFOCR_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDFOCR_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDFOCR_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

impl Cli {
    fn overrides(&self) -> ParameterOverrides {
        ParameterOverrides {
            language: self.language.clone(),
            engine_mode: self.oem.clone(),
            segmentation_mode: self.psm.clone(),
            dpi: self.dpi,
            deskew: self.deskew,
            adaptive_threshold: self.adaptive_threshold,
            sharpen: self.sharpen,
            max_pages: self.max_pages,
        }
    }

    fn rasterizer(&self) -> Arc<dyn Rasterizer> {
        match &self.pdfium_lib {
            Some(path) => Arc::new(PdfiumRasterizer::with_library_path(path)),
            None => Arc::new(PdfiumRasterizer::from_env()),
        }
    }

    fn recognizers(&self) -> Arc<dyn RecognizerFactory> {
        #[cfg(feature = "tesseract")]
        if self.native {
            return Arc::new(pdfocr::NativeTesseractFactory);
        }
        Arc::new(TesseractCliFactory::with_binary(&self.tesseract_bin))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
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

    // ── Parameters ───────────────────────────────────────────────────────
    let defaults = match &cli.config {
        Some(path) => OcrDefaults::load(path).context("Failed to load defaults")?,
        None => OcrDefaults::default(),
    };
    if let Some(name) = cli.preset.as_deref() {
        if Preset::lookup(name).is_none() && !cli.quiet {
            eprintln!(
                "{} unknown preset '{}', using parameters unchanged",
                yellow("⚠"),
                name
            );
        }
    }
    let params = ParameterSet::for_request(&defaults, &cli.overrides(), cli.preset.as_deref());

    // ── Cancellation on Ctrl-C ───────────────────────────────────────────
    let cancel = CancellationSignal::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    // ── Pipeline ─────────────────────────────────────────────────────────
    let progress: Option<Arc<CliProgressCallback>> = if show_progress {
        Some(CliProgressCallback::new_dynamic())
    } else {
        None
    };

    let mut pipeline = OcrPipeline::new(cli.rasterizer(), cli.recognizers());
    if let Some(dir) = &cli.tessdata_dir {
        pipeline = pipeline.with_tessdata_dir(dir);
    }
    if let Some(cb) = &progress {
        pipeline = pipeline.with_progress(Arc::clone(cb) as ProgressCallback);
    }

    let pdf = load_pdf(&cli.input, cli.download_timeout)
        .await
        .context("Failed to read input")?;

    let start = Instant::now();
    let outcome = match &cli.output {
        Some(path) => pipeline.process_to_file(pdf, &params, &cancel, path).await,
        None => pipeline.process(pdf, &params, &cancel).await,
    };
    if let Some(cb) = &progress {
        cb.finish();
    }

    let result = match outcome {
        Ok(r) => r,
        Err(OcrError::Cancelled) => {
            if !cli.quiet {
                eprintln!("{} cancelled", red("✘"));
            }
            std::process::exit(130);
        }
        Err(e) => return Err(e).context("OCR failed"),
    };

    // ── Output ───────────────────────────────────────────────────────────
    if cli.json {
        let json = serde_json::to_string_pretty(&result).context("Failed to serialise output")?;
        println!("{json}");
    } else if cli.output.is_none() {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(result.combined_text.as_bytes())
            .context("Failed to write to stdout")?;
    }

    if !cli.quiet {
        let avg = result.average_confidence().unwrap_or(0.0);
        let target = cli
            .output
            .as_ref()
            .map(|p| format!("  →  {}", bold(&p.display().to_string())))
            .unwrap_or_default();
        eprintln!(
            "{}  {} pages  avg conf {}  {}ms{}",
            cyan("◆"),
            result.page_count(),
            confidence_label(avg),
            start.elapsed().as_millis(),
            target,
        );
    }

    Ok(())
}
