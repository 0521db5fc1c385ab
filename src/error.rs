//! Error type for the pdfocr library.
//!
//! [`OcrError`] covers two groups of failures:
//!
//! * **Pipeline failures**: the four outcomes a pipeline run can end in
//!   besides success: [`OcrError::ConversionFailure`] (PDFium could not
//!   rasterise the document), [`OcrError::RecognitionFailure`] (Tesseract
//!   failed), [`OcrError::Cancelled`] and [`OcrError::Unexpected`].
//!
//! * **Boundary failures**: reading the input, loading the defaults file,
//!   writing the output. These never occur inside a pipeline run.
//!
//! There is no page-level error type: a failure on any page aborts the whole
//! request, so a run yields either every page or an error.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the pdfocr library.
#[derive(Debug, Error)]
pub enum OcrError {
    // ── Pipeline errors ───────────────────────────────────────────────────
    /// The PDF could not be parsed or rasterised (malformed file, unsupported
    /// structure, PDFium library missing).
    #[error(
        "Failed to convert PDF for OCR: {detail}\n\
Check the PDFium installation (set PDFIUM_LIB_PATH to an existing libpdfium)."
    )]
    ConversionFailure { detail: String },

    /// The OCR engine failed (missing language data, corrupt traineddata,
    /// internal engine error).
    #[error(
        "Tesseract OCR failed: {detail}\n\
Verify the tessdata directory and the language codes."
    )]
    RecognitionFailure { detail: String },

    /// Cooperative cancellation was observed at a checkpoint.
    #[error("OCR processing was cancelled")]
    Cancelled,

    /// Anything else. The detail is logged; callers see a generic message.
    #[error("Unexpected error during OCR processing")]
    Unexpected { detail: String },

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input is empty or otherwise unusable.
    #[error("Invalid input '{input}': {reason}")]
    InvalidInput { input: String, reason: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Config errors ─────────────────────────────────────────────────────
    /// The stored defaults file could not be read or parsed.
    #[error("Failed to load OCR defaults from '{path}': {detail}")]
    ConfigLoad { path: PathBuf, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output text file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl OcrError {
    /// Shorthand for [`OcrError::ConversionFailure`].
    pub fn conversion(detail: impl Into<String>) -> Self {
        OcrError::ConversionFailure {
            detail: detail.into(),
        }
    }

    /// Shorthand for [`OcrError::RecognitionFailure`].
    pub fn recognition(detail: impl Into<String>) -> Self {
        OcrError::RecognitionFailure {
            detail: detail.into(),
        }
    }

    /// Shorthand for [`OcrError::Unexpected`].
    pub fn unexpected(detail: impl Into<String>) -> Self {
        OcrError::Unexpected {
            detail: detail.into(),
        }
    }

    /// `true` for [`OcrError::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, OcrError::Cancelled)
    }
}
