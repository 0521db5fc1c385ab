//! Pipeline stages for PDF OCR.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested on its own and backends (pdfium, Tesseract) can be swapped behind
//! their traits without touching the other stages.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ rasterize ──▶ preprocess ──▶ encode ──▶ recognize ──▶ aggregate
//! (bytes)   (pdfium)      (clean-up)     (PNG)      (Tesseract)   (result)
//! ```
//!
//! 1. [`input`]:     read a local path or URL into bytes
//! 2. [`rasterize`]: render the capped page range; runs in `spawn_blocking`
//!    because pdfium is blocking
//! 3. [`preprocess`]: deskew / contrast / sharpen / binarise, plus previews
//! 4. [`encode`]:    PNG bytes for the engine, `data:` URIs for previews
//! 5. [`recognize`]: one engine instance per run, text + confidence per page
//! 6. [`aggregate`]: ordered results and the combined text block

pub mod aggregate;
pub mod encode;
pub mod input;
pub mod preprocess;
pub mod rasterize;
pub mod recognize;
