//! Brightness and contrast adjustment.

use serde::{Deserialize, Serialize};
use spectramix_engine::GrayscaleImage;

use crate::error::IoError;

/// Default brightness offset (no change).
pub const DEFAULT_BRIGHTNESS: f64 = 0.0;

/// Default contrast gain (no change).
pub const DEFAULT_CONTRAST: f64 = 1.0;

/// Linear brightness/contrast edit around mid-gray.
///
/// `v' = clamp((v - 127.5) * contrast + 127.5 + brightness, 0, 255)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrightnessContrast {
    /// Offset added after contrast scaling.
    pub brightness: f64,
    /// Gain applied around mid-gray.
    pub contrast: f64,
}

impl Default for BrightnessContrast {
    fn default() -> Self {
        Self {
            brightness: DEFAULT_BRIGHTNESS,
            contrast: DEFAULT_CONTRAST,
        }
    }
}

impl BrightnessContrast {
    /// Returns `true` if applying this edit changes nothing.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn is_identity(&self) -> bool {
        self.brightness == DEFAULT_BRIGHTNESS && self.contrast == DEFAULT_CONTRAST
    }

    /// Produce an adjusted copy of `image`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::Engine`] if either parameter is not finite.
    pub fn apply(&self, image: &GrayscaleImage) -> Result<GrayscaleImage, IoError> {
        if !(self.brightness.is_finite() && self.contrast.is_finite()) {
            return Err(IoError::Engine(spectramix_engine::MixError::InvalidParameter(
                format!(
                    "brightness {} and contrast {} must be finite",
                    self.brightness, self.contrast
                ),
            )));
        }
        if self.is_identity() {
            return Ok(image.clone());
        }
        let width = image.width();
        let samples = image.samples();
        Ok(GrayscaleImage::from_fn(image.dimensions(), |x, y| {
            let v = samples[y as usize * width as usize + x as usize];
            (v - 127.5).mul_add(self.contrast, 127.5 + self.brightness)
        })?)
    }
}
