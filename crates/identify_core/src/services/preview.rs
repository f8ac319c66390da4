use crate::error::AppError;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use std::io::Cursor;

pub const THUMBNAIL_SIZE: u32 = 200;
const PREVIEW_QUALITY: u8 = 85;

/// Downscales to fit `max_size` (never upscales) and encodes as a JPEG data URI.
pub fn preview_data_uri(img: &DynamicImage, max_size: Option<u32>) -> Result<String, AppError> {
    let img = match max_size {
        Some(size) if img.width() > size || img.height() > size => {
            img.resize(size, size, FilterType::Triangle)
        }
        _ => img.clone(),
    };

    let bytes = encode_jpeg(&img)?;
    let b64 = base64::engine::general_purpose::STANDARD.encode(&bytes);
    Ok(format!("data:image/jpeg;base64,{}", b64))
}

fn encode_jpeg(img: &DynamicImage) -> Result<Vec<u8>, AppError> {
    let mut buffer = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut buffer, PREVIEW_QUALITY);
    // JPEG has no alpha channel
    DynamicImage::ImageRgb8(img.to_rgb8())
        .write_with_encoder(encoder)
        .map_err(|e| AppError {
            message: format!("Failed to encode preview: {}", e),
        })?;
    Ok(buffer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};

    fn decode_uri(uri: &str) -> DynamicImage {
        let b64 = uri.strip_prefix("data:image/jpeg;base64,").unwrap();
        let bytes = base64::engine::general_purpose::STANDARD.decode(b64).unwrap();
        image::load_from_memory(&bytes).unwrap()
    }

    #[test]
    fn large_images_are_scaled_down() {
        let img = DynamicImage::ImageRgba8(ImageBuffer::from_pixel(800, 400, Rgba([1, 2, 3, 255])));
        let decoded = decode_uri(&preview_data_uri(&img, Some(THUMBNAIL_SIZE)).unwrap());
        assert_eq!((decoded.width(), decoded.height()), (200, 100));
    }

    #[test]
    fn small_images_keep_their_size() {
        let img = DynamicImage::ImageRgba8(ImageBuffer::from_pixel(40, 30, Rgba([1, 2, 3, 255])));
        let decoded = decode_uri(&preview_data_uri(&img, Some(THUMBNAIL_SIZE)).unwrap());
        assert_eq!((decoded.width(), decoded.height()), (40, 30));

        let decoded = decode_uri(&preview_data_uri(&img, None).unwrap());
        assert_eq!((decoded.width(), decoded.height()), (40, 30));
    }
}
