//! Image encoding: raw page bytes → base64 `ImageData` for the VLM request.
//!
//! JPEG and PNG scans within the size cap are forwarded unchanged so the
//! model sees exactly what the camera captured. Anything else that decodes
//! (GIF, WebP) or is too large is downscaled and re-encoded as PNG.

use crate::error::ExtractionError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::io::Cursor;
use tracing::debug;

/// Validate and encode a page image for the VLM API.
///
/// The caller's buffer is only read.
///
/// # Errors
/// `ExtractionError::EmptyInput` when `bytes` is empty or does not decode as
/// a supported image format.
pub fn encode_image(bytes: &[u8], max_edge: u32) -> Result<ImageData, ExtractionError> {
    if bytes.is_empty() {
        return Err(ExtractionError::EmptyInput {
            detail: "image has 0 bytes".into(),
        });
    }

    let format = image::guess_format(bytes).map_err(|e| ExtractionError::EmptyInput {
        detail: format!("unrecognised image format: {e}"),
    })?;
    let img = image::load_from_memory_with_format(bytes, format).map_err(|e| {
        ExtractionError::EmptyInput {
            detail: format!("image could not be decoded: {e}"),
        }
    })?;

    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return Err(ExtractionError::EmptyInput {
            detail: "image has no pixels".into(),
        });
    }

    let passthrough = matches!(format, ImageFormat::Jpeg | ImageFormat::Png) && w.max(h) <= max_edge;
    if passthrough {
        let mime = if format == ImageFormat::Jpeg { "image/jpeg" } else { "image/png" };
        debug!("Forwarding {}x{} {} unchanged ({} bytes)", w, h, mime, bytes.len());
        return Ok(ImageData::new(STANDARD.encode(bytes), mime).with_detail("high"));
    }

    let resized = downscale(img, max_edge);
    let png = to_png(&resized)?;
    debug!(
        "Re-encoded {}x{} {:?} → {}x{} PNG ({} bytes)",
        w,
        h,
        format,
        resized.width(),
        resized.height(),
        png.len()
    );
    Ok(ImageData::new(STANDARD.encode(&png), "image/png").with_detail("high"))
}

/// Shrink so the longest edge is at most `max_edge`, preserving aspect ratio.
fn downscale(img: DynamicImage, max_edge: u32) -> DynamicImage {
    let (w, h) = img.dimensions();
    if w.max(h) <= max_edge {
        return img;
    }
    img.resize(max_edge, max_edge, image::imageops::FilterType::Triangle)
}

fn to_png(img: &DynamicImage) -> Result<Vec<u8>, ExtractionError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| ExtractionError::EmptyInput {
            detail: format!("image could not be re-encoded: {e}"),
        })?;
    Ok(buf)
}

#[cfg(test)]
pub(crate) fn test_png(width: u32, height: u32) -> Vec<u8> {
    use image::{Rgba, RgbaImage};
    let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255])));
    to_png(&img).expect("png encode")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_png_is_forwarded_unchanged() {
        let png = test_png(10, 10);
        let data = encode_image(&png, 2048).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert_eq!(decoded, png);
    }

    #[test]
    fn large_image_is_downscaled() {
        let png = test_png(600, 300);
        let data = encode_image(&png, 300).expect("encode should succeed");
        let decoded = STANDARD.decode(&data.data).unwrap();
        let img = image::load_from_memory(&decoded).unwrap();
        assert_eq!(img.dimensions(), (300, 150));
    }

    #[test]
    fn empty_bytes_are_rejected() {
        let err = encode_image(&[], 2048).unwrap_err();
        assert!(matches!(err, ExtractionError::EmptyInput { .. }));
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        let err = encode_image(b"definitely not an image", 2048).unwrap_err();
        assert!(matches!(err, ExtractionError::EmptyInput { .. }));
    }

    #[test]
    fn truncated_png_is_rejected() {
        let png = test_png(10, 10);
        let err = encode_image(&png[..20], 2048).unwrap_err();
        assert!(matches!(err, ExtractionError::EmptyInput { .. }));
    }
}
