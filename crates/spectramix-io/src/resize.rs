//! Bringing every input image to one common size.
//!
//! The mixer needs every participating image to share the same
//! dimensions. [`unify_sizes`] shrinks each image to the smallest width
//! and the smallest height found among them. Images already at that size
//! are returned unchanged.

use std::fmt;
use std::str::FromStr;

use image::imageops::{self, FilterType};
use log::debug;
use serde::{Deserialize, Serialize};
use spectramix_engine::{Dimensions, GrayscaleImage};

use crate::error::IoError;

/// Resampling filter used when resizing.
///
/// Ordered from fastest/lowest-quality to slowest/highest-quality.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResizeFilter {
    /// Nearest-neighbor: fastest, blocky artifacts.
    Nearest,
    /// Bilinear interpolation: fast, decent quality.
    #[default]
    Triangle,
    /// Bicubic (Catmull-Rom): moderate speed, good quality.
    CatmullRom,
    /// Gaussian: moderate speed, smooth output.
    Gaussian,
    /// Lanczos with 3 lobes: slowest, sharpest.
    Lanczos3,
}

impl ResizeFilter {
    /// Convert to the `image` crate's `FilterType`.
    const fn to_image_filter(self) -> FilterType {
        match self {
            Self::Nearest => FilterType::Nearest,
            Self::Triangle => FilterType::Triangle,
            Self::CatmullRom => FilterType::CatmullRom,
            Self::Gaussian => FilterType::Gaussian,
            Self::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

impl fmt::Display for ResizeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nearest => f.write_str("nearest"),
            Self::Triangle => f.write_str("triangle"),
            Self::CatmullRom => f.write_str("catmull-rom"),
            Self::Gaussian => f.write_str("gaussian"),
            Self::Lanczos3 => f.write_str("lanczos3"),
        }
    }
}

impl FromStr for ResizeFilter {
    type Err = IoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nearest" => Ok(Self::Nearest),
            "triangle" | "bilinear" => Ok(Self::Triangle),
            "catmull-rom" | "catmullrom" | "bicubic" => Ok(Self::CatmullRom),
            "gaussian" => Ok(Self::Gaussian),
            "lanczos3" | "lanczos" => Ok(Self::Lanczos3),
            other => Err(IoError::UnsupportedFormat(format!(
                "unknown resize filter '{other}'"
            ))),
        }
    }
}

/// The smallest width and smallest height among `images`.
///
/// Returns `None` for an empty slice.
#[must_use]
pub fn common_dimensions(images: &[GrayscaleImage]) -> Option<Dimensions> {
    images.iter().map(GrayscaleImage::dimensions).reduce(|a, b| {
        Dimensions::new(a.width.min(b.width), a.height.min(b.height))
    })
}

/// Resize one image to `target`.
///
/// # Errors
///
/// Returns [`IoError::Engine`] if `target` is empty.
pub fn resize(
    image: &GrayscaleImage,
    target: Dimensions,
    filter: ResizeFilter,
) -> Result<GrayscaleImage, IoError> {
    if image.dimensions() == target {
        return Ok(image.clone());
    }
    let resized = imageops::resize(
        &image.to_gray(),
        target.width,
        target.height,
        filter.to_image_filter(),
    );
    debug!(
        "resized {} image to {target} ({filter})",
        image.dimensions()
    );
    Ok(GrayscaleImage::from_gray(&resized)?)
}

/// Resize every image to [`common_dimensions`].
///
/// # Errors
///
/// Returns [`IoError::EmptyInput`] if `images` is empty.
pub fn unify_sizes(
    images: &[GrayscaleImage],
    filter: ResizeFilter,
) -> Result<Vec<GrayscaleImage>, IoError> {
    let target = common_dimensions(images).ok_or(IoError::EmptyInput)?;
    images
        .iter()
        .map(|image| resize(image, target, filter))
        .collect()
}
