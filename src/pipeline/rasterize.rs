//! PDF rasterisation: turn PDF bytes into grayscale page images via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and blocks for the whole render. [`rasterize_pages`] moves the work
//! onto tokio's blocking pool so async worker threads never stall.
//!
//! ## Page cap
//!
//! The document's page count is read first; only the first
//! [`effective_page_count`] pages are ever rendered. Later pages cost nothing.
//!
//! ## All or nothing
//!
//! Any failure (bytes that are not a PDF, a broken xref, a page that will not
//! render, no pdfium library) becomes one [`OcrError::ConversionFailure`].
//! Pages rendered before the failure are dropped with the error.

use crate::cancel::CancellationSignal;
use crate::config::ParameterSet;
use crate::error::OcrError;
use image::GrayImage;
use pdfium_render::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Environment variable naming a pdfium library file or the directory holding it.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// One rasterised page.
///
/// Owned by the pipeline while its page is processed and dropped right after
/// text and previews have been extracted.
#[derive(Debug, Clone)]
pub struct RasterPage {
    /// 1-based page number in the source PDF.
    pub index: usize,
    pub image: GrayImage,
    /// Density tag in dots per inch.
    pub dpi: u32,
}

impl RasterPage {
    pub fn new(index: usize, image: GrayImage, dpi: u32) -> Self {
        Self { index, image, dpi }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// What to rasterise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterRequest {
    pub dpi: u32,
    pub max_pages: u32,
}

impl From<&ParameterSet> for RasterRequest {
    fn from(p: &ParameterSet) -> Self {
        Self {
            dpi: p.dpi,
            max_pages: p.max_pages,
        }
    }
}

/// Rasteriser output: the page count of the whole document and the
/// rendered pages, capped.
#[derive(Debug, Clone)]
pub struct RasterizedDocument {
    pub total_pages: usize,
    /// Pages 1..=N in source order, `N = effective_page_count(total_pages, max_pages)`.
    pub pages: Vec<RasterPage>,
}

/// `min(total_pages, max(1, max_pages))`.
pub fn effective_page_count(total_pages: usize, max_pages: u32) -> usize {
    total_pages.min(max_pages.max(1) as usize)
}

/// `true` when the `%PDF-` marker appears within the first 1024 bytes,
/// which is where readers are required to look for it.
pub fn looks_like_pdf(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(1024)];
    head.windows(5).any(|w| w == b"%PDF-")
}

/// A PDF rasterisation backend.
///
/// Implementations are blocking; the pipeline calls them through
/// [`rasterize_pages`], which runs them on the blocking pool.
pub trait Rasterizer: Send + Sync {
    /// Render the first `effective_page_count` pages of `pdf` as grayscale
    /// images at `request.dpi`.
    ///
    /// Implementations should poll `cancel` between pages.
    fn rasterize(
        &self,
        pdf: &[u8],
        request: &RasterRequest,
        cancel: &CancellationSignal,
    ) -> Result<RasterizedDocument, OcrError>;
}

/// Rasteriser backed by pdfium.
///
/// The library is bound per call; binding an already loaded library is
/// cheap and keeps the rasteriser `Send + Sync` without holding pdfium state.
#[derive(Debug, Clone, Default)]
pub struct PdfiumRasterizer {
    library_path: Option<PathBuf>,
}

impl PdfiumRasterizer {
    /// Bind to the system pdfium library.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind to a specific library file, or to the platform library name
    /// inside a directory.
    pub fn with_library_path(path: impl Into<PathBuf>) -> Self {
        Self {
            library_path: Some(path.into()),
        }
    }

    /// Honour [`PDFIUM_LIB_PATH_ENV`] when set, else the system library.
    pub fn from_env() -> Self {
        match std::env::var(PDFIUM_LIB_PATH_ENV) {
            Ok(p) if !p.is_empty() => Self::with_library_path(p),
            _ => Self::new(),
        }
    }

    fn bind(&self) -> Result<Pdfium, OcrError> {
        let bindings = match &self.library_path {
            Some(path) if path.is_dir() => Pdfium::bind_to_library(
                Pdfium::pdfium_platform_library_name_at_path(path),
            ),
            Some(path) => Pdfium::bind_to_library(path),
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| OcrError::conversion(format!("pdfium library unavailable: {:?}", e)))?;
        Ok(Pdfium::new(bindings))
    }
}

impl Rasterizer for PdfiumRasterizer {
    fn rasterize(
        &self,
        pdf: &[u8],
        request: &RasterRequest,
        cancel: &CancellationSignal,
    ) -> Result<RasterizedDocument, OcrError> {
        if !looks_like_pdf(pdf) {
            let magic: Vec<u8> = pdf.iter().copied().take(4).collect();
            return Err(OcrError::conversion(format!(
                "input is not a PDF (first bytes: {:?})",
                magic
            )));
        }

        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf, None)
            .map_err(|e| OcrError::conversion(format!("cannot open PDF: {:?}", e)))?;

        let pages = document.pages();
        let total_pages = pages.len() as usize;
        let count = effective_page_count(total_pages, request.max_pages);
        info!(
            "PDF loaded: {} pages, rasterising {} at {} DPI",
            total_pages, count, request.dpi
        );

        // pdfium lays pages out at 72 points per inch and renders the crop box.
        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(request.dpi as f32 / 72.0)
            .use_grayscale_rendering(true);

        let mut rendered = Vec::with_capacity(count);
        for idx in 0..count {
            cancel.check()?;

            let page = pages.get(idx as u16).map_err(|e| {
                OcrError::conversion(format!("cannot load page {}: {:?}", idx + 1, e))
            })?;
            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                OcrError::conversion(format!("cannot render page {}: {:?}", idx + 1, e))
            })?;

            let image = bitmap.as_image().to_luma8();
            debug!(
                "Rendered page {} → {}x{} px",
                idx + 1,
                image.width(),
                image.height()
            );
            rendered.push(RasterPage::new(idx + 1, image, request.dpi));
        }

        Ok(RasterizedDocument {
            total_pages,
            pages: rendered,
        })
    }
}

/// Run `rasterizer` on the blocking pool.
pub async fn rasterize_pages(
    rasterizer: Arc<dyn Rasterizer>,
    pdf: Arc<[u8]>,
    request: RasterRequest,
    cancel: CancellationSignal,
) -> Result<RasterizedDocument, OcrError> {
    tokio::task::spawn_blocking(move || rasterizer.rasterize(&pdf, &request, &cancel))
        .await
        .map_err(|e| OcrError::unexpected(format!("Rasterisation task panicked: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn effective_page_count_caps_and_floors() {
        assert_eq!(effective_page_count(3, 10), 3);
        assert_eq!(effective_page_count(5, 2), 2);
        assert_eq!(effective_page_count(5, 0), 1);
        assert_eq!(effective_page_count(0, 10), 0);
        assert_eq!(effective_page_count(200, 200), 200);
    }

    #[test]
    fn pdf_sniffing() {
        assert!(looks_like_pdf(b"%PDF-1.7\n%\xe2\xe3\xcf\xd3\n"));
        assert!(looks_like_pdf(b"\xef\xbb\xbf  %PDF-1.4"));
        assert!(!looks_like_pdf(b"\x89PNG\r\n\x1a\n"));
        assert!(!looks_like_pdf(b""));
        assert!(!looks_like_pdf(b"%PDF"));
    }

    #[test]
    fn non_pdf_bytes_are_a_conversion_failure() {
        let err = PdfiumRasterizer::new()
            .rasterize(
                b"hello, I am a text file",
                &RasterRequest {
                    dpi: 300,
                    max_pages: 10,
                },
                &CancellationSignal::new(),
            )
            .unwrap_err();
        assert!(matches!(err, OcrError::ConversionFailure { .. }), "got {err:?}");
    }

    #[test]
    fn request_from_parameters() {
        let p = ParameterSet {
            dpi: 150,
            max_pages: 4,
            ..Default::default()
        };
        assert_eq!(
            RasterRequest::from(&p),
            RasterRequest {
                dpi: 150,
                max_pages: 4
            }
        );
    }

    struct PanickingRasterizer;

    impl Rasterizer for PanickingRasterizer {
        fn rasterize(
            &self,
            _pdf: &[u8],
            _request: &RasterRequest,
            _cancel: &CancellationSignal,
        ) -> Result<RasterizedDocument, OcrError> {
            panic!("backend crashed")
        }
    }

    struct BlankRasterizer;

    impl Rasterizer for BlankRasterizer {
        fn rasterize(
            &self,
            _pdf: &[u8],
            request: &RasterRequest,
            _cancel: &CancellationSignal,
        ) -> Result<RasterizedDocument, OcrError> {
            let n = effective_page_count(4, request.max_pages);
            Ok(RasterizedDocument {
                total_pages: 4,
                pages: (1..=n)
                    .map(|i| RasterPage::new(i, GrayImage::from_pixel(8, 8, Luma([255])), request.dpi))
                    .collect(),
            })
        }
    }

    #[tokio::test]
    async fn blocking_pool_wrapper_returns_pages() {
        let doc = rasterize_pages(
            Arc::new(BlankRasterizer),
            Arc::from(&b"%PDF-1.4"[..]),
            RasterRequest {
                dpi: 72,
                max_pages: 3,
            },
            CancellationSignal::new(),
        )
        .await
        .unwrap();
        assert_eq!(doc.total_pages, 4);
        assert_eq!(doc.pages.len(), 3);
        assert_eq!(doc.pages[2].index, 3);
    }

    #[tokio::test]
    async fn panicking_backend_is_unexpected() {
        let err = rasterize_pages(
            Arc::new(PanickingRasterizer),
            Arc::from(&b"%PDF-1.4"[..]),
            RasterRequest {
                dpi: 72,
                max_pages: 1,
            },
            CancellationSignal::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, OcrError::Unexpected { .. }));
    }
}
