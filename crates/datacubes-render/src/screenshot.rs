//! Saving captured frames to image files.

use image::{ImageBuffer, Rgba};
use std::path::Path;

fn to_image(
    data: &[u8],
    width: u32,
    height: u32,
) -> Result<ImageBuffer<Rgba<u8>, Vec<u8>>, ScreenshotError> {
    // Rows arrive top-left first, so no vertical flip is needed.
    ImageBuffer::from_raw(width, height, data.to_vec()).ok_or(ScreenshotError::InvalidImageData)
}

/// Saves RGBA pixel data, as read back from the output target, to an image file.
///
/// The format follows the extension: `.png`, `.jpg` or `.jpeg`.
pub fn save_image(
    filename: &str,
    data: &[u8],
    width: u32,
    height: u32,
) -> Result<(), ScreenshotError> {
    let path = Path::new(filename);
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    let img = to_image(data, width, height)?;
    match extension.as_str() {
        "png" => img.save_with_format(path, image::ImageFormat::Png)?,
        "jpg" | "jpeg" => {
            // JPEG has no alpha channel
            let rgb_img = image::DynamicImage::ImageRgba8(img).to_rgb8();
            rgb_img.save_with_format(path, image::ImageFormat::Jpeg)?;
        }
        _ => return Err(ScreenshotError::UnsupportedFormat(extension)),
    }
    log::info!("saved {width}x{height} frame to {filename}");
    Ok(())
}

/// Encodes RGBA pixel data as PNG in memory.
pub fn save_to_buffer(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>, ScreenshotError> {
    let img = to_image(data, width, height)?;
    let mut buffer = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buffer, image::ImageFormat::Png)?;
    Ok(buffer.into_inner())
}

/// Error type for screenshot operations.
#[derive(Debug, thiserror::Error)]
pub enum ScreenshotError {
    #[error("failed to save image: {0}")]
    IoError(#[from] std::io::Error),

    #[error("image encoding error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("pixel data does not match the image size")]
    InvalidImageData,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_png_buffer_has_signature() {
        let data = vec![255u8; 2 * 2 * 4];
        let png = save_to_buffer(&data, 2, 2).unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }

    #[test]
    fn test_size_mismatch_rejected() {
        let data = vec![0u8; 7];
        assert!(matches!(
            save_to_buffer(&data, 2, 2),
            Err(ScreenshotError::InvalidImageData)
        ));
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let data = vec![0u8; 4];
        let path = std::env::temp_dir().join("datacubes_frame.bmpx");
        let result = save_image(path.to_str().unwrap(), &data, 1, 1);
        assert!(matches!(result, Err(ScreenshotError::UnsupportedFormat(_))));
    }
}
