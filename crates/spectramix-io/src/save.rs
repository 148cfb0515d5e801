//! Encoding and saving output images.

use std::fmt;
use std::io::Cursor;
use std::path::Path;
use std::str::FromStr;

use image::ImageFormat;
use log::info;
use serde::{Deserialize, Serialize};
use spectramix_engine::{GrayImage, GrayscaleImage};

use crate::error::IoError;

/// Supported output encodings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Lossless PNG.
    #[default]
    Png,
    /// Baseline JPEG.
    Jpeg,
}

impl OutputFormat {
    /// Infer the format from a file extension (`.png`, `.jpg`, `.jpeg`).
    ///
    /// # Errors
    ///
    /// Returns [`IoError::UnsupportedFormat`] for any other extension.
    pub fn from_path(path: &Path) -> Result<Self, IoError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();
        extension.parse().map_err(|_| {
            IoError::UnsupportedFormat(format!(
                "cannot infer an output format from '{}'",
                path.display()
            ))
        })
    }

    const fn image_format(self) -> ImageFormat {
        match self {
            Self::Png => ImageFormat::Png,
            Self::Jpeg => ImageFormat::Jpeg,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Png => f.write_str("png"),
            Self::Jpeg => f.write_str("jpeg"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = IoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            other => Err(IoError::UnsupportedFormat(format!(
                "unknown output format '{other}'"
            ))),
        }
    }
}

/// Encode an 8-bit raster.
///
/// # Errors
///
/// Returns [`IoError::ImageEncode`] if the encoder fails.
pub fn encode_gray(image: &GrayImage, format: OutputFormat) -> Result<Vec<u8>, IoError> {
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, format.image_format())
        .map_err(IoError::ImageEncode)?;
    Ok(buf.into_inner())
}

/// Encode an image, rounding and clamping samples into `u8`.
///
/// # Errors
///
/// Returns [`IoError::ImageEncode`] if the encoder fails.
pub fn encode(image: &GrayscaleImage, format: OutputFormat) -> Result<Vec<u8>, IoError> {
    encode_gray(&image.to_gray(), format)
}

/// Write an 8-bit raster to `path`, inferring the format from its extension.
///
/// # Errors
///
/// Returns [`IoError::UnsupportedFormat`] for an unknown extension,
/// [`IoError::ImageEncode`] if encoding fails, and [`IoError::Io`] if the
/// file cannot be written.
pub fn save_gray(image: &GrayImage, path: impl AsRef<Path>) -> Result<(), IoError> {
    let path = path.as_ref();
    let format = OutputFormat::from_path(path)?;
    let bytes = encode_gray(image, format)?;
    std::fs::write(path, &bytes)?;
    info!(
        "wrote {}x{} {format} to {} ({} bytes)",
        image.width(),
        image.height(),
        path.display(),
        bytes.len(),
    );
    Ok(())
}

/// Write an image to `path`, inferring the format from its extension.
///
/// # Errors
///
/// See [`save_gray`].
pub fn save(image: &GrayscaleImage, path: impl AsRef<Path>) -> Result<(), IoError> {
    save_gray(&image.to_gray(), path)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use spectramix_engine::Dimensions;

    fn gradient() -> GrayscaleImage {
        GrayscaleImage::from_fn(Dimensions::new(8, 4), |x, y| f64::from(x * 30 + y)).unwrap()
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(
            OutputFormat::from_path(Path::new("out.PNG")).unwrap(),
            OutputFormat::Png
        );
        assert_eq!(
            OutputFormat::from_path(Path::new("a/b.jpg")).unwrap(),
            OutputFormat::Jpeg
        );
        assert!(matches!(
            OutputFormat::from_path(Path::new("out.tiff")),
            Err(IoError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            OutputFormat::from_path(Path::new("no_extension")),
            Err(IoError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn png_is_lossless() {
        let image = gradient();
        let bytes = encode(&image, OutputFormat::Png).unwrap();
        assert!(bytes.starts_with(&[0x89, b'P', b'N', b'G']));
        let back = crate::decode_grayscale(&bytes).unwrap();
        assert_eq!(back, image);
    }

    #[test]
    fn jpeg_has_soi_marker() {
        let bytes = encode(&gradient(), OutputFormat::Jpeg).unwrap();
        assert!(bytes.starts_with(&[0xFF, 0xD8]));
    }

    #[test]
    fn encode_rounds_fractional_samples() {
        let image = GrayscaleImage::new(Dimensions::new(2, 1), vec![0.4, 254.6]).unwrap();
        let bytes = encode(&image, OutputFormat::Png).unwrap();
        let back = crate::decode_grayscale(&bytes).unwrap();
        assert_eq!(back.samples(), &[0.0, 255.0]);
    }

    #[test]
    fn save_writes_file() {
        let dir = std::env::temp_dir().join(format!("spectramix-save-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("out.png");
        save(&gradient(), &path).unwrap();
        assert_eq!(crate::load_grayscale(&path).unwrap(), gradient());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
