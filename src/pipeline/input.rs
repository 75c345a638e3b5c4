//! Input resolution: load a page image from a local path or an HTTP(S) URL.
//!
//! Bytes are returned untouched. Whether they are empty or decodable is the
//! extractor's call (`ExtractionError::EmptyInput`), so a zero-byte file is
//! reported on the right side of the grading run rather than as an I/O error.

use crate::error::GradeError;
use std::path::PathBuf;
use tracing::{debug, info};

/// A page image loaded into memory.
#[derive(Debug, Clone)]
pub struct ImageSource {
    /// The path or URL the image came from (for logs and reports).
    pub origin: String,
    pub bytes: Vec<u8>,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to image bytes.
///
/// If the input is a URL, download it. If it is a local path, read it.
pub async fn resolve_image(input: &str, timeout_secs: u64) -> Result<ImageSource, GradeError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(GradeError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else if input.contains("://") {
        Err(GradeError::InvalidInput {
            input: input.to_string(),
        })
    } else {
        read_local(input).await
    }
}

async fn read_local(path_str: &str) -> Result<ImageSource, GradeError> {
    let path = PathBuf::from(path_str);

    let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => GradeError::PermissionDenied { path: path.clone() },
        _ => GradeError::FileNotFound { path: path.clone() },
    })?;

    debug!("Read {} bytes from {}", bytes.len(), path.display());
    Ok(ImageSource {
        origin: path_str.to_string(),
        bytes,
    })
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<ImageSource, GradeError> {
    info!("Downloading image from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| GradeError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let timeout_or_failure = |e: reqwest::Error| {
        if e.is_timeout() {
            GradeError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            GradeError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(timeout_or_failure)?;

    if !response.status().is_success() {
        return Err(GradeError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response.bytes().await.map_err(timeout_or_failure)?;
    info!("Downloaded {} bytes", bytes.len());

    Ok(ImageSource {
        origin: url.to_string(),
        bytes: bytes.to_vec(),
    })
}
