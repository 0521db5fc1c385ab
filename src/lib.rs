//! # pdfocr
//!
//! OCR for scanned PDFs: rasterise every page, clean it up, run Tesseract,
//! and get back per-page text, confidence and previews plus one combined text
//! block.
//!
//! ## Why preprocess at all?
//!
//! Tesseract is trained on clean, upright, black-on-white text. Real scans are
//! tilted, low-contrast, soft and unevenly lit. A short, fixed chain (deskew,
//! contrast stretch, sharpen, binarise) recovers most of the accuracy lost to
//! those defects, and the [`Preset`]s tune it for common document types.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF bytes + ParameterSet
//!  │
//!  ├─ 1. Rasterise   pdfium, grayscale at the requested DPI, capped page range
//!  ├─ 2. Preprocess  deskew → contrast → sharpen → threshold, + previews
//!  ├─ 3. Recognise   one Tesseract instance per run, text + confidence
//!  └─ 4. Aggregate   ordered PageResults, PageInfos and combined text
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdfocr::{CancellationSignal, OcrDefaults, OcrPipeline, ParameterOverrides, ParameterSet};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let defaults = OcrDefaults::default();
//!     let params = ParameterSet::for_request(
//!         &defaults,
//!         &ParameterOverrides::default(),
//!         Some("LowQualityScan"),
//!     );
//!
//!     let pdf = std::fs::read("scan.pdf")?;
//!     let result = OcrPipeline::default()
//!         .process(pdf, &params, &CancellationSignal::new())
//!         .await?;
//!     println!("{}", result.combined_text);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature     | Default | Description |
//! |-------------|---------|-------------|
//! | `cli`       | on      | Enables the `pdfocr` binary (clap + anyhow + indicatif + tracing-subscriber) |
//! | `tesseract` | off     | In-process libtesseract recognizer (needs libtesseract/leptonica to build) |
//!
//! Without `tesseract`, recognition shells out to the `tesseract` executable.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cancel;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod output;
pub mod pipeline;
pub mod preset;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use cancel::CancellationSignal;
pub use config::{
    merge_defaults, EngineMode, OcrDefaults, ParameterOverrides, ParameterSet, SegmentationMode,
    MAX_PAGES, MIN_PAGES,
};
pub use error::OcrError;
pub use orchestrator::{OcrPipeline, Stage};
pub use output::{PageInfo, PageResult, PipelineResult};
pub use pipeline::input::load_pdf;
pub use pipeline::rasterize::{
    effective_page_count, PdfiumRasterizer, RasterPage, RasterRequest, RasterizedDocument,
    Rasterizer,
};
#[cfg(feature = "tesseract")]
pub use pipeline::recognize::{NativeTesseract, NativeTesseractFactory};
pub use pipeline::recognize::{
    Recognition, Recognizer, RecognizerFactory, RecognizerSettings, TesseractCli,
    TesseractCliFactory,
};
pub use preset::{apply_named_preset, apply_preset, Preset};
pub use progress::{NoopProgressCallback, OcrProgressCallback, ProgressCallback};
