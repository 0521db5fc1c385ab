//! Input resolution: read a user-supplied path or URL into PDF bytes.
//!
//! The pipeline works on bytes, not paths, so both sources end up the same
//! way: a `Vec<u8>` in memory. Content is not checked here; deciding whether
//! the bytes are a PDF is the rasteriser's job, and a non-PDF surfaces as a
//! conversion failure like any other unreadable document.

use crate::error::OcrError;
use std::path::PathBuf;
use tracing::{debug, info};

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load PDF bytes from a local file or an HTTP(S) URL.
pub async fn load_pdf(input: &str, timeout_secs: u64) -> Result<Vec<u8>, OcrError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(input).await
    }
}

async fn read_local(path_str: &str) -> Result<Vec<u8>, OcrError> {
    let path = PathBuf::from(path_str);

    if path.is_dir() {
        return Err(OcrError::InvalidInput {
            input: path_str.to_string(),
            reason: "is a directory".to_string(),
        });
    }

    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            debug!("Read {} bytes from {}", bytes.len(), path.display());
            Ok(bytes)
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(OcrError::PermissionDenied { path })
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(OcrError::FileNotFound { path }),
        Err(e) => Err(OcrError::InvalidInput {
            input: path_str.to_string(),
            reason: e.to_string(),
        }),
    }
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<Vec<u8>, OcrError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| OcrError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let map_err = |e: reqwest::Error| {
        if e.is_timeout() {
            OcrError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            OcrError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(map_err)?;

    if !response.status().is_success() {
        return Err(OcrError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response.bytes().await.map_err(map_err)?;
    info!("Downloaded {} bytes", bytes.len());
    Ok(bytes.to_vec())
}
