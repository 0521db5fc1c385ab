//! The OCR pipeline orchestrator.
//!
//! ## Flow of one run
//!
//! ```text
//! Idle ─▶ Rasterizing ─▶ { Preprocessing ─▶ Recognizing } × N ─▶ Aggregating ─▶ Done
//!              │                 │                 │                  │
//!              └─────────────────┴──────┬──────────┴──────────────────┘
//!                                       ▼
//!                             Failed / Cancelled
//! ```
//!
//! Pages go through preprocessing and recognition strictly one after the
//! other, in source order. There is no retry: the first failure ends the run
//! and no partial [`PipelineResult`] is returned.
//!
//! ## Why is the recognizer created after rasterisation?
//!
//! Engine initialisation (loading `traineddata`) is the most expensive fixed
//! cost of a run. Creating it only once the PDF is known to be readable means
//! a broken upload never pays for it.

use crate::cancel::CancellationSignal;
use crate::config::ParameterSet;
use crate::error::OcrError;
use crate::output::{PageInfo, PageResult, PipelineResult};
use crate::pipeline::aggregate::aggregate;
use crate::pipeline::encode::encode_png;
use crate::pipeline::preprocess::{preprocess, render_previews};
use crate::pipeline::rasterize::{rasterize_pages, PdfiumRasterizer, RasterRequest, Rasterizer};
use crate::pipeline::recognize::{RecognizerFactory, RecognizerSettings, TesseractCliFactory};
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// Pipeline step, recorded on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Rasterizing,
    Preprocessing,
    Recognizing,
    Aggregating,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Rasterizing => "rasterizing",
            Stage::Preprocessing => "preprocessing",
            Stage::Recognizing => "recognizing",
            Stage::Aggregating => "aggregating",
        })
    }
}

/// Runs PDF bytes through rasterisation, preprocessing, recognition and
/// aggregation.
///
/// Holds only shared, immutable collaborators, so one pipeline can serve any
/// number of concurrent runs; each run gets its own recognizer.
#[derive(Clone)]
pub struct OcrPipeline {
    rasterizer: Arc<dyn Rasterizer>,
    recognizers: Arc<dyn RecognizerFactory>,
    tessdata_dir: Option<PathBuf>,
    progress: Option<ProgressCallback>,
}

impl Default for OcrPipeline {
    /// pdfium (honouring `PDFIUM_LIB_PATH`) + the `tesseract` executable.
    fn default() -> Self {
        Self::new(
            Arc::new(PdfiumRasterizer::from_env()),
            Arc::new(TesseractCliFactory::new()),
        )
    }
}

impl OcrPipeline {
    pub fn new(rasterizer: Arc<dyn Rasterizer>, recognizers: Arc<dyn RecognizerFactory>) -> Self {
        Self {
            rasterizer,
            recognizers,
            tessdata_dir: None,
            progress: None,
        }
    }

    /// Directory with `*.traineddata`, passed to every recognizer.
    pub fn with_tessdata_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tessdata_dir = Some(dir.into());
        self
    }

    /// Receive per-page progress events.
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// OCR a PDF held in memory.
    ///
    /// # Errors
    /// - [`OcrError::ConversionFailure`] when the bytes cannot be rasterised
    /// - [`OcrError::RecognitionFailure`] when the engine cannot start or a page fails
    /// - [`OcrError::Cancelled`] once `cancel` was observed
    /// - [`OcrError::Unexpected`] for anything else
    pub async fn process(
        &self,
        pdf: impl Into<Arc<[u8]>>,
        params: &ParameterSet,
        cancel: &CancellationSignal,
    ) -> Result<PipelineResult, OcrError> {
        let start = Instant::now();
        let pdf = pdf.into();
        info!(
            "Starting OCR: {} bytes, lang={}, dpi={}, max_pages={}",
            pdf.len(),
            params.language,
            params.dpi,
            params.max_pages
        );

        let mut stage = Stage::Rasterizing;
        let result = self.run(pdf, params, cancel, &mut stage).await;

        match &result {
            Ok(r) => info!(
                "OCR complete: {} pages in {}ms",
                r.page_count(),
                start.elapsed().as_millis()
            ),
            Err(OcrError::Cancelled) => info!("OCR cancelled while {}", stage),
            Err(e) => error!(
                language = %params.language,
                dpi = params.dpi,
                max_pages = params.max_pages,
                stage = %stage,
                error = ?e,
                "OCR failed: {}",
                e
            ),
        }
        result
    }

    async fn run(
        &self,
        pdf: Arc<[u8]>,
        params: &ParameterSet,
        cancel: &CancellationSignal,
        stage: &mut Stage,
    ) -> Result<PipelineResult, OcrError> {
        cancel.check()?;

        // ── Step 1: Rasterise ────────────────────────────────────────────
        let render_start = Instant::now();
        let document = rasterize_pages(
            Arc::clone(&self.rasterizer),
            pdf,
            RasterRequest::from(params),
            cancel.clone(),
        )
        .await?;
        let total = document.pages.len();
        info!(
            "Rasterised {}/{} pages in {}ms",
            total,
            document.total_pages,
            render_start.elapsed().as_millis()
        );

        // ── Step 2: One engine for the whole run ─────────────────────────
        *stage = Stage::Recognizing;
        let settings = RecognizerSettings::from_params(params, self.tessdata_dir.clone());
        let mut recognizer = self.recognizers.create(&settings).await?;

        if let Some(ref cb) = self.progress {
            cb.on_pipeline_start(total);
        }

        // ── Step 3: Pages, one at a time ─────────────────────────────────
        let mut outcomes = Vec::with_capacity(total);
        for page in document.pages {
            cancel.check()?;
            let index = page.index;
            if let Some(ref cb) = self.progress {
                cb.on_page_start(index, total);
            }

            *stage = Stage::Preprocessing;
            let page_params = params.clone();
            let (previews, png) = tokio::task::spawn_blocking(move || {
                let page = preprocess(page, &page_params);
                let previews = render_previews(&page);
                let png = encode_png(&page.image);
                (previews, png)
            })
            .await
            .map_err(|e| {
                OcrError::unexpected(format!("Preprocessing task for page {} panicked: {}", index, e))
            })?;
            let png = png.map_err(|e| {
                OcrError::unexpected(format!("PNG encoding of page {} failed: {}", index, e))
            })?;

            *stage = Stage::Recognizing;
            let recognition = recognizer.recognize(&png).await?;
            debug!(
                "Page {}/{}: {} chars, conf {:.2}",
                index,
                total,
                recognition.text.len(),
                recognition.mean_confidence
            );
            if let Some(ref cb) = self.progress {
                cb.on_page_complete(index, total, recognition.mean_confidence);
            }

            outcomes.push((
                PageResult {
                    page_index: index,
                    text: recognition.text,
                    mean_confidence: recognition.mean_confidence,
                },
                PageInfo {
                    page_index: index,
                    mean_confidence: recognition.mean_confidence,
                    thumbnail: previews.thumbnail,
                    full_preview: previews.full,
                },
            ));
        }
        drop(recognizer);

        // ── Step 4: Aggregate ────────────────────────────────────────────
        *stage = Stage::Aggregating;
        let result = aggregate(outcomes);

        if let Some(ref cb) = self.progress {
            cb.on_pipeline_complete(total);
        }
        Ok(result)
    }

    /// OCR a PDF and write the combined text to `output_path`.
    ///
    /// Uses atomic write (temp file + rename) to prevent partial files.
    pub async fn process_to_file(
        &self,
        pdf: impl Into<Arc<[u8]>>,
        params: &ParameterSet,
        cancel: &CancellationSignal,
        output_path: impl AsRef<Path>,
    ) -> Result<PipelineResult, OcrError> {
        let result = self.process(pdf, params, cancel).await?;
        write_atomic(output_path.as_ref(), &result.combined_text).await?;
        Ok(result)
    }

    /// Synchronous wrapper around [`OcrPipeline::process`].
    ///
    /// Creates a temporary tokio runtime internally; do not call it from
    /// inside an async context.
    pub fn process_sync(
        &self,
        pdf: impl Into<Arc<[u8]>>,
        params: &ParameterSet,
        cancel: &CancellationSignal,
    ) -> Result<PipelineResult, OcrError> {
        tokio::runtime::Runtime::new()
            .map_err(|e| OcrError::unexpected(format!("Failed to create tokio runtime: {}", e)))?
            .block_on(self.process(pdf, params, cancel))
    }
}

/// Write `contents` to a sibling temp file, then rename it over `path`.
pub async fn write_atomic(path: &Path, contents: &str) -> Result<(), OcrError> {
    let write_err = |e| OcrError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    tokio::fs::write(&tmp_path, contents).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    Ok(())
}
