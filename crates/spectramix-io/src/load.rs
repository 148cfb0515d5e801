//! Image decoding and grayscale conversion.
//!
//! Accepts raw image bytes (PNG, JPEG, BMP, WebP) and produces a
//! [`GrayscaleImage`] ready to be loaded into an input slot.

use std::path::Path;

use log::debug;
use spectramix_engine::GrayscaleImage;

use crate::error::IoError;

/// Decode raw image bytes and convert to grayscale.
///
/// Color images are reduced with the `image` crate's luminance
/// conversion; alpha is dropped.
///
/// # Errors
///
/// Returns [`IoError::EmptyInput`] if `bytes` is empty and
/// [`IoError::ImageDecode`] if the format is unrecognized or the data is
/// corrupt.
#[must_use = "returns the decoded grayscale image"]
pub fn decode_grayscale(bytes: &[u8]) -> Result<GrayscaleImage, IoError> {
    if bytes.is_empty() {
        return Err(IoError::EmptyInput);
    }

    let img = image::load_from_memory(bytes)?;
    Ok(GrayscaleImage::from_gray(&img.to_luma8())?)
}

/// Read and decode the image at `path`.
///
/// # Errors
///
/// Returns [`IoError::Io`] if the file cannot be read, otherwise see
/// [`decode_grayscale`].
pub fn load_grayscale(path: impl AsRef<Path>) -> Result<GrayscaleImage, IoError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    let image = decode_grayscale(&bytes)?;
    debug!("loaded {} as {} grayscale", path.display(), image.dimensions());
    Ok(image)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// Helper: encode an RGBA image as a PNG byte buffer.
    fn encode_rgba(img: &image::RgbaImage) -> Vec<u8> {
        let mut buf = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buf);
        image::ImageEncoder::write_image(
            encoder,
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::Rgba8,
        )
        .ok();
        buf
    }

    #[test]
    fn empty_input_returns_error() {
        assert!(matches!(decode_grayscale(&[]), Err(IoError::EmptyInput)));
    }

    #[test]
    fn corrupt_bytes_returns_image_decode_error() {
        let result = decode_grayscale(&[0xFF, 0xFE, 0x00, 0x01]);
        assert!(matches!(result, Err(IoError::ImageDecode(_))));
    }

    #[test]
    fn white_png_decodes_to_255() {
        let img = image::RgbaImage::from_pixel(2, 3, image::Rgba([255, 255, 255, 255]));
        let gray = decode_grayscale(&encode_rgba(&img)).unwrap();
        assert_eq!(gray.width(), 2);
        assert_eq!(gray.height(), 3);
        assert!(gray.samples().iter().all(|&v| (v - 255.0).abs() < f64::EPSILON));
    }

    #[test]
    fn green_is_brighter_than_blue() {
        let mut img = image::RgbaImage::new(2, 1);
        img.put_pixel(0, 0, image::Rgba([0, 255, 0, 255]));
        img.put_pixel(1, 0, image::Rgba([0, 0, 255, 255]));
        let gray = decode_grayscale(&encode_rgba(&img)).unwrap();
        assert!(gray.get(0, 0).unwrap() > gray.get(1, 0).unwrap());
    }

    #[test]
    fn missing_file_is_io_error() {
        let result = load_grayscale("/nonexistent/spectramix/input.png");
        assert!(matches!(result, Err(IoError::Io(_))));
    }
}
