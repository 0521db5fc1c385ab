//! Image encoding: `GrayImage` → PNG bytes, and PNG → `data:` URI.
//!
//! PNG everywhere: it is lossless, so binarised text edges survive both the
//! trip into Tesseract and the trip into a browser preview. A `data:` URI
//! makes a preview self-contained, so consumers can embed it in HTML or JSON
//! without any file storage behind it.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{GrayImage, ImageFormat};
use std::io::Cursor;
use tracing::debug;

/// Prefix of every preview produced by [`encode_data_uri`].
pub const PNG_DATA_URI_PREFIX: &str = "data:image/png;base64,";

/// Encode a page as PNG bytes.
pub fn encode_png(img: &GrayImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    debug!(
        "Encoded {}x{} page → {} bytes PNG",
        img.width(),
        img.height(),
        buf.len()
    );
    Ok(buf)
}

/// Encode a page as an inline `data:image/png;base64,…` URI.
pub fn encode_data_uri(img: &GrayImage) -> Result<String, image::ImageError> {
    let png = encode_png(img)?;
    let mut uri = String::with_capacity(PNG_DATA_URI_PREFIX.len() + png.len() * 4 / 3 + 4);
    uri.push_str(PNG_DATA_URI_PREFIX);
    STANDARD.encode_string(&png, &mut uri);
    Ok(uri)
}
