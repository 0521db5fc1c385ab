//! Cooperative cancellation.
//!
//! The pipeline polls a [`CancellationSignal`] at page boundaries only: before
//! rasterisation, between rasterised pages, and before each page is
//! preprocessed and recognised. Work already in flight for a page runs to
//! completion; the run then ends with [`crate::OcrError::Cancelled`].

use crate::error::OcrError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cloneable cancel flag shared between the caller and a pipeline run.
///
/// ```rust
/// use pdfocr::CancellationSignal;
///
/// let signal = CancellationSignal::new();
/// let handle = signal.clone();
/// handle.cancel();
/// assert!(signal.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal {
    flag: Arc<AtomicBool>,
}

impl CancellationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Checkpoint: `Err(OcrError::Cancelled)` once cancellation was requested.
    pub fn check(&self) -> Result<(), OcrError> {
        if self.is_cancelled() {
            Err(OcrError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let a = CancellationSignal::new();
        let b = a.clone();
        assert!(a.check().is_ok());
        b.cancel();
        assert!(a.is_cancelled());
        assert!(matches!(a.check(), Err(OcrError::Cancelled)));
    }

    #[test]
    fn cancel_is_idempotent() {
        let s = CancellationSignal::new();
        s.cancel();
        s.cancel();
        assert!(s.is_cancelled());
    }
}
