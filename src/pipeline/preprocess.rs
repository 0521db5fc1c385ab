//! Page preprocessing: clean a rasterised page up before Tesseract sees it.
//!
//! ## Chain
//!
//! [`preprocess`] applies, in this fixed order:
//!
//! 1. **Deskew** *(optional)*: estimate the text-line angle and rotate it
//!    back to horizontal.
//! 2. **Contrast stretch** *(always)*: clip 0.1 % at both ends of the
//!    histogram and stretch the rest over the full range.
//! 3. **Sharpen** *(optional)*: mild adaptive unsharp mask (radius 1,
//!    sigma 1).
//! 4. **Binarise**: adaptive 15×15 local-mean threshold with bias 5, or,
//!    when adaptive thresholding is off, a 3×3 median denoise followed by a
//!    fixed 50 % threshold.
//! 5. **Density tag**: record the target DPI on the page.
//!
//! The order matters: deskewing a binary page leaves jagged, aliased glyph
//! edges, and sharpening after binarisation does nothing useful.
//!
//! ## Previews
//!
//! [`render_previews`] derives two PNG `data:` URIs from the preprocessed
//! page: a full preview capped at 1200 px wide and a 300 px thumbnail.

use crate::config::ParameterSet;
use crate::pipeline::encode::encode_data_uri;
use crate::pipeline::rasterize::RasterPage;
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use imageproc::filter::{median_filter, separable_filter_equal};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use tracing::{debug, warn};

/// Pixels darker than this fraction of full intensity count as ink when
/// estimating skew.
pub const DESKEW_INK_THRESHOLD: f32 = 0.40;
/// Fraction of pixels clipped at each end of the histogram.
pub const CONTRAST_CLIP: f64 = 0.001;
/// Unsharp-mask blur radius in pixels (a 3×3 kernel).
pub const SHARPEN_RADIUS: u32 = 1;
/// Unsharp-mask gaussian sigma.
pub const SHARPEN_SIGMA: f32 = 1.0;
/// Adaptive-threshold neighbourhood (width and height).
pub const ADAPTIVE_WINDOW: u32 = 15;
/// Adaptive-threshold bias in 8-bit intensity units.
pub const ADAPTIVE_BIAS: i32 = 5;
/// Fixed binarisation threshold (50 %).
pub const FIXED_THRESHOLD: u8 = 128;
/// Full preview width cap.
pub const FULL_PREVIEW_MAX_WIDTH: u32 = 1200;
/// Thumbnail width.
pub const THUMBNAIL_WIDTH: u32 = 300;

const MAX_SKEW_DEGREES: f32 = 5.0;
const SKEW_STEP_DEGREES: f32 = 0.25;
/// Width the page is shrunk to before skew estimation.
const SKEW_SAMPLE_WIDTH: u32 = 1000;
/// Below 0.5 % ink the projection profile is noise.
const MIN_INK_FRACTION: f64 = 0.005;

/// Run the preprocessing chain on `page`.
///
/// Consumes the page and returns the transformed one; the input handle is
/// gone afterwards.
pub fn preprocess(page: RasterPage, params: &ParameterSet) -> RasterPage {
    let RasterPage { index, mut image, .. } = page;

    if params.deskew {
        image = deskew(&image);
    }
    contrast_stretch(&mut image, CONTRAST_CLIP);
    if params.sharpen {
        image = adaptive_sharpen(&image, SHARPEN_RADIUS, SHARPEN_SIGMA);
    }
    image = if params.adaptive_threshold {
        adaptive_threshold(&image, ADAPTIVE_WINDOW, ADAPTIVE_BIAS)
    } else {
        let denoised = median_filter(&image, 1, 1);
        fixed_threshold(&denoised, FIXED_THRESHOLD)
    };

    debug!(
        "Preprocessed page {} (deskew={}, sharpen={}, adaptive={}) → {}x{}",
        index,
        params.deskew,
        params.sharpen,
        params.adaptive_threshold,
        image.width(),
        image.height()
    );

    RasterPage::new(index, image, params.dpi)
}

// ── Step 1: Deskew ───────────────────────────────────────────────────────

/// Rotate `img` so its text lines are horizontal.
///
/// Returns an unchanged copy when no skew (or no usable text) is found.
pub fn deskew(img: &GrayImage) -> GrayImage {
    match detect_skew_angle(img) {
        Some(angle) => {
            debug!("Deskewing by {:.2}°", angle);
            // Lines fall to the right by `angle`; rotating counter-clockwise
            // by the same amount levels them.
            rotate_about_center(
                img,
                -angle.to_radians(),
                Interpolation::Bilinear,
                Luma([255u8]),
            )
        }
        None => img.clone(),
    }
}

/// Estimate the skew of text lines in degrees, positive when lines descend
/// to the right.
///
/// Projection-profile method: for each candidate angle in ±5° (0.25° steps),
/// project the ink pixels onto the axis perpendicular to that angle and score
/// how peaky the histogram is. Horizontal text lines produce the sharpest
/// profile at their true angle.
///
/// `None` for tiny images, near-blank pages, and angles within one step of 0.
pub fn detect_skew_angle(img: &GrayImage) -> Option<f32> {
    let sample = if img.width() > SKEW_SAMPLE_WIDTH {
        let h = scaled_height(img.width(), img.height(), SKEW_SAMPLE_WIDTH);
        imageops::resize(img, SKEW_SAMPLE_WIDTH, h, FilterType::Triangle)
    } else {
        img.clone()
    };
    let (w, h) = sample.dimensions();
    if w < 32 || h < 32 {
        return None;
    }

    let threshold = (DESKEW_INK_THRESHOLD * 255.0) as u8;
    let ink: Vec<(f32, f32)> = sample
        .enumerate_pixels()
        .filter(|(_, _, p)| p.0[0] < threshold)
        .map(|(x, y, _)| (x as f32, y as f32))
        .collect();
    if (ink.len() as f64) < (w as f64 * h as f64) * MIN_INK_FRACTION {
        return None;
    }

    let max_shift = (w as f32 * MAX_SKEW_DEGREES.to_radians().tan()).ceil() as usize;
    let bins = h as usize + 2 * max_shift + 2;
    let mut profile = vec![0u32; bins];

    let mut best_angle = 0.0f32;
    let mut best_score = f64::NEG_INFINITY;
    let steps = (MAX_SKEW_DEGREES / SKEW_STEP_DEGREES).round() as i32;

    for step in -steps..=steps {
        let angle = step as f32 * SKEW_STEP_DEGREES;
        let tan = angle.to_radians().tan();
        profile.iter_mut().for_each(|b| *b = 0);

        for &(x, y) in &ink {
            let row = (y - x * tan).round() + max_shift as f32;
            if row >= 0.0 && (row as usize) < bins {
                profile[row as usize] += 1;
            }
        }

        let score: f64 = profile.iter().map(|&c| (c as f64) * (c as f64)).sum();
        // Strictly greater: on ties the angle closest to the start wins, and
        // the zero angle is checked by `abs` below.
        if score > best_score {
            best_score = score;
            best_angle = angle;
        }
    }

    if best_angle.abs() < SKEW_STEP_DEGREES {
        None
    } else {
        Some(best_angle)
    }
}

// ── Step 2: Contrast stretch ─────────────────────────────────────────────

/// Stretch intensities so the `clip` darkest and brightest fractions
/// saturate and the rest spans 0–255. Leaves flat images untouched.
pub fn contrast_stretch(img: &mut GrayImage, clip: f64) {
    let total = img.width() as u64 * img.height() as u64;
    if total == 0 {
        return;
    }

    let mut histogram = [0u64; 256];
    for p in img.pixels() {
        histogram[p.0[0] as usize] += 1;
    }

    let cut = (total as f64 * clip).floor() as u64;
    let low = percentile_from_start(&histogram, cut);
    let high = percentile_from_end(&histogram, cut);
    if high <= low {
        return;
    }

    let range = (high - low) as f32;
    let mut lut = [0u8; 256];
    for (v, out) in lut.iter_mut().enumerate() {
        let scaled = (v as f32 - low as f32) * 255.0 / range;
        *out = scaled.round().clamp(0.0, 255.0) as u8;
    }
    for p in img.pixels_mut() {
        p.0[0] = lut[p.0[0] as usize];
    }
}

fn percentile_from_start(histogram: &[u64; 256], cut: u64) -> u8 {
    let mut seen = 0u64;
    for (v, &count) in histogram.iter().enumerate() {
        seen += count;
        if seen > cut {
            return v as u8;
        }
    }
    255
}

fn percentile_from_end(histogram: &[u64; 256], cut: u64) -> u8 {
    let mut seen = 0u64;
    for (v, &count) in histogram.iter().enumerate().rev() {
        seen += count;
        if seen > cut {
            return v as u8;
        }
    }
    0
}

// ── Step 3: Sharpen ──────────────────────────────────────────────────────

/// Unsharp mask whose strength follows local edge strength: flat paper is
/// left alone (so scanner noise is not amplified) and glyph edges get the
/// full boost.
pub fn adaptive_sharpen(img: &GrayImage, radius: u32, sigma: f32) -> GrayImage {
    let kernel = gaussian_kernel(radius, sigma);
    let blurred = separable_filter_equal(img, kernel.as_slice());
    let mut out = img.clone();
    for (x, y, p) in out.enumerate_pixels_mut() {
        let orig = img.get_pixel(x, y).0[0] as f32;
        let detail = orig - blurred.get_pixel(x, y).0[0] as f32;
        // Full strength once the local detail exceeds ~1/8 of the range.
        let weight = (detail.abs() / 32.0).min(1.0);
        p.0[0] = (orig + detail * weight).round().clamp(0.0, 255.0) as u8;
    }
    out
}

/// Normalised 1-D gaussian weights for `-radius..=radius`.
fn gaussian_kernel(radius: u32, sigma: f32) -> Vec<f32> {
    let r = radius as i32;
    let weights: Vec<f32> = (-r..=r)
        .map(|i| (-((i * i) as f32) / (2.0 * sigma * sigma)).exp())
        .collect();
    let sum: f32 = weights.iter().sum();
    weights.into_iter().map(|w| w / sum).collect()
}

// ── Step 4: Binarise ─────────────────────────────────────────────────────

/// Local-mean binarisation: a pixel turns black when it is more than `bias`
/// darker than the mean of its `window`×`window` neighbourhood (clamped at
/// the borders), white otherwise.
pub fn adaptive_threshold(img: &GrayImage, window: u32, bias: i32) -> GrayImage {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return img.clone();
    }
    let integral = IntegralImage::new(img);
    let radius = window / 2;

    GrayImage::from_fn(w, h, |x, y| {
        let left = x.saturating_sub(radius);
        let top = y.saturating_sub(radius);
        let right = (x + radius).min(w - 1);
        let bottom = (y + radius).min(h - 1);
        let area = (right - left + 1) * (bottom - top + 1);
        let mean = integral.sum(left, top, right, bottom) as f32 / area as f32;

        let v = img.get_pixel(x, y).0[0] as f32;
        if v < mean - bias as f32 {
            Luma([0])
        } else {
            Luma([255])
        }
    })
}

/// Global binarisation at `threshold`.
pub fn fixed_threshold(img: &GrayImage, threshold: u8) -> GrayImage {
    let mut out = img.clone();
    for p in out.pixels_mut() {
        p.0[0] = if p.0[0] < threshold { 0 } else { 255 };
    }
    out
}

/// Summed-area table over a grayscale image.
///
/// Sums are kept in wrapping `u32` arithmetic: a whole-page total can exceed
/// `u32::MAX` at high DPI, but any window sum we read back is far below it,
/// and modular differences of the corners are exact in that case.
struct IntegralImage {
    stride: usize,
    data: Vec<u32>,
}

impl IntegralImage {
    fn new(img: &GrayImage) -> Self {
        let (w, h) = (img.width() as usize, img.height() as usize);
        let stride = w + 1;
        let mut data = vec![0u32; stride * (h + 1)];
        for y in 0..h {
            let mut row_sum = 0u32;
            for x in 0..w {
                row_sum = row_sum.wrapping_add(img.get_pixel(x as u32, y as u32).0[0] as u32);
                data[(y + 1) * stride + x + 1] = data[y * stride + x + 1].wrapping_add(row_sum);
            }
        }
        Self { stride, data }
    }

    /// Sum over the inclusive rectangle.
    fn sum(&self, left: u32, top: u32, right: u32, bottom: u32) -> u32 {
        let (l, t) = (left as usize, top as usize);
        let (r, b) = (right as usize + 1, bottom as usize + 1);
        let s = self.stride;
        self.data[b * s + r]
            .wrapping_sub(self.data[t * s + r])
            .wrapping_sub(self.data[b * s + l])
            .wrapping_add(self.data[t * s + l])
    }
}

// ── Previews ─────────────────────────────────────────────────────────────

/// Inline preview renditions of a preprocessed page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PagePreviews {
    pub thumbnail: Option<String>,
    pub full: Option<String>,
}

/// Encode the full preview (≤ 1200 px wide) and the 300 px thumbnail.
///
/// A rendition that fails to encode is logged and left out; previews never
/// fail a page.
pub fn render_previews(page: &RasterPage) -> PagePreviews {
    let img = &page.image;

    let full_img = if img.width() > FULL_PREVIEW_MAX_WIDTH {
        resize_to_width(img, FULL_PREVIEW_MAX_WIDTH)
    } else {
        img.clone()
    };
    let thumb_img = resize_to_width(img, THUMBNAIL_WIDTH);

    let full = encode_data_uri(&full_img)
        .map_err(|e| warn!("Page {}: full preview encoding failed: {}", page.index, e))
        .ok();
    let thumbnail = encode_data_uri(&thumb_img)
        .map_err(|e| warn!("Page {}: thumbnail encoding failed: {}", page.index, e))
        .ok();

    PagePreviews { thumbnail, full }
}

/// Aspect-preserving resize to `width`.
pub fn resize_to_width(img: &GrayImage, width: u32) -> GrayImage {
    if img.width() == width || img.width() == 0 {
        return img.clone();
    }
    let height = scaled_height(img.width(), img.height(), width);
    imageops::resize(img, width, height, FilterType::Lanczos3)
}

fn scaled_height(width: u32, height: u32, target_width: u32) -> u32 {
    ((height as f64 * target_width as f64 / width as f64).round() as u32).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::encode::PNG_DATA_URI_PREFIX;

    fn white(w: u32, h: u32) -> GrayImage {
        GrayImage::from_pixel(w, h, Luma([255]))
    }

    /// Parallel 6 px thick lines descending to the right by `angle_deg`.
    fn slanted_lines(w: u32, h: u32, angle_deg: f32) -> GrayImage {
        let tan = angle_deg.to_radians().tan();
        let mut img = white(w, h);
        for base in (60..h - 60).step_by(40) {
            for x in 0..w {
                let y0 = base as f32 + x as f32 * tan;
                for dy in 0..6 {
                    let y = (y0 + dy as f32).round() as i64;
                    if y >= 0 && (y as u32) < h {
                        img.put_pixel(x, y as u32, Luma([0]));
                    }
                }
            }
        }
        img
    }

    fn is_binary(img: &GrayImage) -> bool {
        img.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255)
    }

    #[test]
    fn skew_detected_on_slanted_lines() {
        let img = slanted_lines(600, 500, 3.0);
        let angle = detect_skew_angle(&img).expect("skew should be found");
        assert!((angle - 3.0).abs() <= 0.5, "got {angle}");

        let img = slanted_lines(600, 500, -2.0);
        let angle = detect_skew_angle(&img).expect("skew should be found");
        assert!((angle + 2.0).abs() <= 0.5, "got {angle}");
    }

    #[test]
    fn straight_lines_have_no_skew() {
        let img = slanted_lines(600, 500, 0.0);
        assert_eq!(detect_skew_angle(&img), None);
    }

    #[test]
    fn blank_page_is_not_rotated() {
        let img = white(400, 300);
        assert_eq!(detect_skew_angle(&img), None);
        assert_eq!(deskew(&img), img);
    }

    #[test]
    fn deskew_keeps_dimensions() {
        let img = slanted_lines(600, 500, 3.0);
        let out = deskew(&img);
        assert_eq!(out.dimensions(), img.dimensions());
        let residual = detect_skew_angle(&out).unwrap_or(0.0);
        assert!(residual.abs() <= 0.5, "residual skew {residual}");
    }

    #[test]
    fn contrast_stretch_expands_range() {
        let mut img = GrayImage::from_fn(100, 100, |x, _| Luma([100 + (x as u8 % 50)]));
        contrast_stretch(&mut img, CONTRAST_CLIP);
        let min = img.pixels().map(|p| p.0[0]).min().unwrap();
        let max = img.pixels().map(|p| p.0[0]).max().unwrap();
        assert_eq!(min, 0);
        assert_eq!(max, 255);
    }

    #[test]
    fn contrast_stretch_leaves_flat_image() {
        let mut img = GrayImage::from_pixel(20, 20, Luma([77]));
        contrast_stretch(&mut img, CONTRAST_CLIP);
        assert!(img.pixels().all(|p| p.0[0] == 77));
    }

    #[test]
    fn sharpen_preserves_flat_regions() {
        let img = GrayImage::from_pixel(16, 16, Luma([180]));
        let out = adaptive_sharpen(&img, SHARPEN_RADIUS, SHARPEN_SIGMA);
        assert!(out.pixels().all(|p| p.0[0] == 180));
    }

    #[test]
    fn sharpen_increases_edge_contrast() {
        let img = GrayImage::from_fn(20, 20, |x, _| if x < 10 { Luma([60]) } else { Luma([190]) });
        let out = adaptive_sharpen(&img, SHARPEN_RADIUS, SHARPEN_SIGMA);
        assert!(out.get_pixel(9, 10).0[0] <= 60);
        assert!(out.get_pixel(10, 10).0[0] >= 190);
    }

    #[test]
    fn sharpen_only_touches_pixels_next_to_an_edge() {
        let img = GrayImage::from_fn(20, 20, |x, _| if x < 10 { Luma([60]) } else { Luma([190]) });
        let out = adaptive_sharpen(&img, SHARPEN_RADIUS, SHARPEN_SIGMA);
        for y in 0..20 {
            for x in (0..9).chain(11..20) {
                assert_eq!(out.get_pixel(x, y), img.get_pixel(x, y), "pixel ({x}, {y})");
            }
        }
    }

    #[test]
    fn gaussian_kernel_is_normalised_and_symmetric() {
        let k = gaussian_kernel(SHARPEN_RADIUS, SHARPEN_SIGMA);
        assert_eq!(k.len(), 3);
        assert!((k.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert_eq!(k[0], k[2]);
        assert!(k[1] > k[0]);
    }

    #[test]
    fn adaptive_threshold_handles_uneven_lighting() {
        // Background fades from 120 to 250; text strokes 60 units darker.
        let img = GrayImage::from_fn(120, 40, |x, y| {
            let bg = 120 + (x as u32 * 130 / 120) as u8;
            if y % 10 < 2 {
                Luma([bg - 60])
            } else {
                Luma([bg])
            }
        });
        let out = adaptive_threshold(&img, ADAPTIVE_WINDOW, ADAPTIVE_BIAS);
        assert!(is_binary(&out));
        // strokes are black on both the dark and the bright end
        assert_eq!(out.get_pixel(5, 20).0[0], 0);
        assert_eq!(out.get_pixel(115, 20).0[0], 0);
        // background is white on both ends
        assert_eq!(out.get_pixel(5, 25).0[0], 255);
        assert_eq!(out.get_pixel(115, 25).0[0], 255);
    }

    #[test]
    fn adaptive_threshold_keeps_uniform_page_white() {
        let out = adaptive_threshold(&GrayImage::from_pixel(30, 30, Luma([140])), 15, 5);
        assert!(out.pixels().all(|p| p.0[0] == 255));
    }

    #[test]
    fn integral_image_sums() {
        let img = GrayImage::from_fn(4, 3, |x, y| Luma([(x + y * 4) as u8]));
        let ii = IntegralImage::new(&img);
        assert_eq!(ii.sum(0, 0, 3, 2), (0..12).sum::<u32>());
        assert_eq!(ii.sum(1, 1, 2, 2), 5 + 6 + 9 + 10);
        assert_eq!(ii.sum(3, 0, 3, 0), 3);
    }

    #[test]
    fn fixed_threshold_splits_at_half() {
        let img = GrayImage::from_fn(2, 1, |x, _| if x == 0 { Luma([127]) } else { Luma([128]) });
        let out = fixed_threshold(&img, FIXED_THRESHOLD);
        assert_eq!(out.get_pixel(0, 0).0[0], 0);
        assert_eq!(out.get_pixel(1, 0).0[0], 255);
    }

    #[test]
    fn preprocess_outputs_binary_page_tagged_with_dpi() {
        let page = RasterPage::new(2, slanted_lines(300, 200, 1.0), 72);
        let params = ParameterSet {
            dpi: 400,
            ..Default::default()
        };
        let out = preprocess(page, &params);
        assert_eq!(out.index, 2);
        assert_eq!(out.dpi, 400);
        assert_eq!(out.image.dimensions(), (300, 200));
        assert!(is_binary(&out.image));
    }

    #[test]
    fn preprocess_deskews_before_binarising() {
        let params = ParameterSet {
            deskew: true,
            ..Default::default()
        };
        let page = RasterPage::new(1, slanted_lines(1600, 1200, 3.0), 300);
        let out = preprocess(page, &params);
        assert!(is_binary(&out.image));
        assert_eq!(detect_skew_angle(&out.image), None);

        let params = ParameterSet {
            deskew: false,
            ..params
        };
        let page = RasterPage::new(1, slanted_lines(1600, 1200, 3.0), 300);
        let out = preprocess(page, &params);
        let angle = detect_skew_angle(&out.image).expect("skew should survive");
        assert!((angle - 3.0).abs() <= 0.5, "got {angle}");
    }

    #[test]
    fn preprocess_without_adaptive_threshold_is_binary() {
        let page = RasterPage::new(1, slanted_lines(200, 200, 0.0), 300);
        let params = ParameterSet {
            deskew: false,
            sharpen: false,
            adaptive_threshold: false,
            ..Default::default()
        };
        let out = preprocess(page, &params);
        assert!(is_binary(&out.image));
        // line pixels stay black after the median pass
        assert_eq!(out.image.get_pixel(100, 62).0[0], 0);
    }

    #[test]
    fn previews_respect_width_limits() {
        let page = RasterPage::new(1, white(2400, 1200), 300);
        let previews = render_previews(&page);
        for uri in [&previews.full, &previews.thumbnail] {
            assert!(uri.as_deref().unwrap().starts_with(PNG_DATA_URI_PREFIX));
        }
        assert_eq!(resize_to_width(&page.image, FULL_PREVIEW_MAX_WIDTH).dimensions(), (1200, 600));
        assert_eq!(resize_to_width(&page.image, THUMBNAIL_WIDTH).dimensions(), (300, 150));
    }

    #[test]
    fn narrow_pages_are_not_upscaled_for_full_preview() {
        use base64::{engine::general_purpose::STANDARD, Engine as _};

        let page = RasterPage::new(1, white(800, 1000), 300);
        let previews = render_previews(&page);
        let full = previews.full.unwrap();
        let png = STANDARD.decode(&full[PNG_DATA_URI_PREFIX.len()..]).unwrap();
        let img = image::load_from_memory(&png).unwrap();
        assert_eq!((img.width(), img.height()), (800, 1000));

        let thumb = previews.thumbnail.unwrap();
        let png = STANDARD.decode(&thumb[PNG_DATA_URI_PREFIX.len()..]).unwrap();
        let img = image::load_from_memory(&png).unwrap();
        assert_eq!((img.width(), img.height()), (300, 375));
    }
}
