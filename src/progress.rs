//! Progress-callback trait for per-page OCR events.
//!
//! Pass an [`Arc<dyn OcrProgressCallback>`] to
//! [`crate::OcrPipeline::with_progress`] to receive events as the pipeline
//! works through the document. Forward them to a progress bar, a log, a
//! channel; the pipeline does not care.
//!
//! Pages are processed one at a time, so events for a run arrive in order:
//! `on_pipeline_start`, then `on_page_start`/`on_page_complete` pairs in
//! ascending page order, then `on_pipeline_complete`. A failed or cancelled
//! run stops emitting events at the point it stopped.
//!
//! # Example
//!
//! ```rust
//! use pdfocr::OcrProgressCallback;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct Counter(AtomicUsize);
//!
//! impl OcrProgressCallback for Counter {
//!     fn on_page_complete(&self, page: usize, total: usize, confidence: f32) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("page {page}/{total}: {:.0}%", confidence * 100.0);
//!     }
//! }
//! ```

use std::sync::Arc;

/// Receives pipeline progress events.
///
/// Implementations must be `Send + Sync`: one callback may be shared by
/// several concurrent runs. All methods default to no-ops.
pub trait OcrProgressCallback: Send + Sync {
    /// Called once rasterisation has finished.
    ///
    /// # Arguments
    /// * `total_pages`: pages that will be recognised (after the page cap)
    fn on_pipeline_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called before a page is preprocessed.
    ///
    /// # Arguments
    /// * `page`: 1-based page number
    /// * `total_pages`: pages in this run
    fn on_page_start(&self, page: usize, total_pages: usize) {
        let _ = (page, total_pages);
    }

    /// Called after a page was recognised.
    ///
    /// # Arguments
    /// * `page`: 1-based page number
    /// * `total_pages`: pages in this run
    /// * `confidence`: engine mean confidence, 0.0–1.0
    fn on_page_complete(&self, page: usize, total_pages: usize, confidence: f32) {
        let _ = (page, total_pages, confidence);
    }

    /// Called once after the last page, before the result is returned.
    fn on_pipeline_complete(&self, total_pages: usize) {
        let _ = total_pages;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl OcrProgressCallback for NoopProgressCallback {}

/// Shared handle stored by [`crate::OcrPipeline`].
pub type ProgressCallback = Arc<dyn OcrProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        total: AtomicUsize,
    }

    impl OcrProgressCallback for TrackingCallback {
        fn on_pipeline_start(&self, total_pages: usize) {
            self.total.store(total_pages, Ordering::SeqCst);
        }

        fn on_page_start(&self, _page: usize, _total_pages: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_complete(&self, _page: usize, _total_pages: usize, _confidence: f32) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_pipeline_start(3);
        cb.on_page_start(1, 3);
        cb.on_page_complete(1, 3, 0.9);
        cb.on_pipeline_complete(3);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback {
            starts: AtomicUsize::new(0),
            completes: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
        };
        tracker.on_pipeline_start(2);
        tracker.on_page_start(1, 2);
        tracker.on_page_complete(1, 2, 0.8);
        tracker.on_page_start(2, 2);

        assert_eq!(tracker.total.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_pipeline_start(10);
        cb.on_page_complete(1, 10, 0.5);
    }
}
