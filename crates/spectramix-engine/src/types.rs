//! Shared types for the spectramix engine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Re-export `GrayImage` so downstream crates can convert to and from
/// 8-bit rasters without depending on `image` directly.
pub use image::GrayImage;

/// Number of input image slots that can take part in a mix.
pub const SLOT_COUNT: usize = 4;

/// Largest valid sample value. Samples live in `[0, MAX_SAMPLE]`.
pub const MAX_SAMPLE: f64 = 255.0;

/// Default Gaussian standard deviation for region masks, in frequency bins.
pub const DEFAULT_SIGMA: f64 = 10.0;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Create a new dimensions value.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Total number of cells (`width * height`).
    #[must_use]
    pub const fn pixel_count(self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Returns `true` if either axis is zero.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A single-channel image with real-valued samples in `[0, 255]`.
///
/// Immutable once built. Edits such as brightness/contrast produce a
/// new instance.
#[derive(Debug, Clone, PartialEq)]
pub struct GrayscaleImage {
    dimensions: Dimensions,
    samples: Vec<f64>,
}

impl GrayscaleImage {
    /// Build an image from row-major samples.
    ///
    /// # Errors
    ///
    /// Returns [`MixError::InvalidParameter`] if the dimensions are empty,
    /// the sample count does not equal `width * height`, or any sample is
    /// non-finite or outside `[0, MAX_SAMPLE]`.
    pub fn new(dimensions: Dimensions, samples: Vec<f64>) -> Result<Self, MixError> {
        if dimensions.is_empty() {
            return Err(MixError::InvalidParameter(format!(
                "image dimensions must be non-zero, got {dimensions}"
            )));
        }
        if samples.len() != dimensions.pixel_count() {
            return Err(MixError::InvalidParameter(format!(
                "expected {} samples for a {dimensions} image, got {}",
                dimensions.pixel_count(),
                samples.len(),
            )));
        }
        if let Some(bad) = samples
            .iter()
            .find(|v| !(v.is_finite() && (0.0..=MAX_SAMPLE).contains(*v)))
        {
            return Err(MixError::InvalidParameter(format!(
                "sample {bad} is outside [0, {MAX_SAMPLE}]"
            )));
        }
        Ok(Self {
            dimensions,
            samples,
        })
    }

    /// Build an image by evaluating `f(x, y)` at every cell.
    ///
    /// Values are clamped into `[0, MAX_SAMPLE]`; non-finite values
    /// become `0`.
    ///
    /// # Errors
    ///
    /// Returns [`MixError::InvalidParameter`] if the dimensions are empty.
    pub fn from_fn(
        dimensions: Dimensions,
        mut f: impl FnMut(u32, u32) -> f64,
    ) -> Result<Self, MixError> {
        let mut samples = Vec::with_capacity(dimensions.pixel_count());
        for y in 0..dimensions.height {
            for x in 0..dimensions.width {
                samples.push(clamp_sample(f(x, y)));
            }
        }
        Self::new(dimensions, samples)
    }

    /// Build an image where every sample has the same value.
    ///
    /// # Errors
    ///
    /// Returns [`MixError::InvalidParameter`] if the dimensions are empty.
    pub fn filled(dimensions: Dimensions, value: f64) -> Result<Self, MixError> {
        Self::from_fn(dimensions, |_, _| value)
    }

    /// Convert an 8-bit grayscale raster.
    ///
    /// # Errors
    ///
    /// Returns [`MixError::InvalidParameter`] if the raster is empty.
    pub fn from_gray(image: &GrayImage) -> Result<Self, MixError> {
        let dimensions = Dimensions::new(image.width(), image.height());
        let samples = image.as_raw().iter().map(|&v| f64::from(v)).collect();
        Self::new(dimensions, samples)
    }

    /// Convert to an 8-bit grayscale raster, rounding each sample.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn to_gray(&self) -> GrayImage {
        let raw = self
            .samples
            .iter()
            .map(|&v| clamp_sample(v).round() as u8)
            .collect();
        // The buffer length always matches the dimensions.
        GrayImage::from_raw(self.dimensions.width, self.dimensions.height, raw)
            .unwrap_or_else(|| GrayImage::new(self.dimensions.width, self.dimensions.height))
    }

    /// Image dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.dimensions.width
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.dimensions.height
    }

    /// Row-major samples.
    #[must_use]
    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    /// Sample at `(x, y)`, or `None` when out of bounds.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> Option<f64> {
        if x >= self.dimensions.width || y >= self.dimensions.height {
            return None;
        }
        let index = y as usize * self.dimensions.width as usize + x as usize;
        self.samples.get(index).copied()
    }

    /// Build from samples that are already known to be valid.
    pub(crate) const fn from_valid_samples(dimensions: Dimensions, samples: Vec<f64>) -> Self {
        Self {
            dimensions,
            samples,
        }
    }
}

/// Clamp a value into the valid sample range, mapping NaN to `0`.
#[must_use]
pub fn clamp_sample(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, MAX_SAMPLE)
    }
}

/// One of the four views of a complex spectrum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentKind {
    /// `|F|`.
    Magnitude,
    /// `atan2(Im, Re)` in radians.
    Phase,
    /// `Re(F)`.
    Real,
    /// `Im(F)`.
    Imaginary,
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Magnitude => f.write_str("magnitude"),
            Self::Phase => f.write_str("phase"),
            Self::Real => f.write_str("real"),
            Self::Imaginary => f.write_str("imaginary"),
        }
    }
}

impl FromStr for ComponentKind {
    type Err = MixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "magnitude" | "mag" => Ok(Self::Magnitude),
            "phase" => Ok(Self::Phase),
            "real" | "re" => Ok(Self::Real),
            "imaginary" | "imag" | "im" => Ok(Self::Imaginary),
            other => Err(MixError::InvalidParameter(format!(
                "unknown component '{other}'"
            ))),
        }
    }
}

/// Which pair of components a mix combines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentMode {
    /// Combine magnitudes and phases, then rebuild with `mag * e^(i*phase)`.
    #[default]
    MagnitudePhase,
    /// Combine real and imaginary parts directly.
    RealImaginary,
}

impl ComponentMode {
    /// The component weighted by [`ComponentWeights::primary`].
    #[must_use]
    pub const fn primary(self) -> ComponentKind {
        match self {
            Self::MagnitudePhase => ComponentKind::Magnitude,
            Self::RealImaginary => ComponentKind::Real,
        }
    }

    /// The component weighted by [`ComponentWeights::secondary`].
    #[must_use]
    pub const fn secondary(self) -> ComponentKind {
        match self {
            Self::MagnitudePhase => ComponentKind::Phase,
            Self::RealImaginary => ComponentKind::Imaginary,
        }
    }
}

impl fmt::Display for ComponentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MagnitudePhase => f.write_str("magnitude-phase"),
            Self::RealImaginary => f.write_str("real-imaginary"),
        }
    }
}

impl FromStr for ComponentMode {
    type Err = MixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "magnitude-phase" | "mag-phase" | "magnitude/phase" => Ok(Self::MagnitudePhase),
            "real-imaginary" | "real-imag" | "real/imaginary" => Ok(Self::RealImaginary),
            other => Err(MixError::InvalidParameter(format!(
                "unknown component mode '{other}'"
            ))),
        }
    }
}

/// Per-slot weights for the two components of the active mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentWeights {
    /// Magnitude weight (magnitude/phase mode) or real weight
    /// (real/imaginary mode).
    pub primary: f64,
    /// Phase weight (magnitude/phase mode) or imaginary weight
    /// (real/imaginary mode).
    pub secondary: f64,
}

impl ComponentWeights {
    /// Both weights zero: the slot does not take part.
    pub const ZERO: Self = Self::new(0.0, 0.0);

    /// Create a new weight pair.
    #[must_use]
    pub const fn new(primary: f64, secondary: f64) -> Self {
        Self { primary, secondary }
    }

    /// Returns `true` if both weights are exactly zero.
    #[must_use]
    pub fn is_zero(self) -> bool {
        self.primary == 0.0 && self.secondary == 0.0
    }
}

/// Which frequency region the mask keeps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MaskKind {
    /// Pass everything through (mask of ones).
    #[default]
    None,
    /// Gaussian low-pass centered on the zero frequency.
    Inner,
    /// Complement of [`MaskKind::Inner`] (high-pass).
    Outer,
}

impl fmt::Display for MaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Inner => f.write_str("inner"),
            Self::Outer => f.write_str("outer"),
        }
    }
}

impl FromStr for MaskKind {
    type Err = MixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "inner" | "low-pass" => Ok(Self::Inner),
            "outer" | "high-pass" => Ok(Self::Outer),
            other => Err(MixError::InvalidParameter(format!(
                "unknown mask kind '{other}'"
            ))),
        }
    }
}

/// How the real part of the inverse transform maps into `[0, 255]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputScaling {
    /// Clamp into the valid range. Keeps inverse(forward(x)) == x.
    #[default]
    Clip,
    /// Stretch the observed min..max onto `[0, 255]`.
    Normalize,
}

/// One mixing request.
///
/// Passed by value into every mix so inspection and mixing never share
/// ambient mode or mask state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixSpecification {
    /// Which pair of components to combine.
    pub mode: ComponentMode,
    /// Per-slot weights, each in `[0, 1]`.
    pub weights: [ComponentWeights; SLOT_COUNT],
    /// Frequency region to keep.
    pub mask: MaskKind,
    /// Gaussian standard deviation of the region mask, in frequency bins.
    pub sigma: f64,
    /// Mapping of the reconstructed values into the sample range.
    pub scaling: OutputScaling,
}

impl Default for MixSpecification {
    fn default() -> Self {
        Self {
            mode: ComponentMode::default(),
            weights: [ComponentWeights::ZERO; SLOT_COUNT],
            mask: MaskKind::default(),
            sigma: DEFAULT_SIGMA,
            scaling: OutputScaling::default(),
        }
    }
}

impl MixSpecification {
    /// Check weights and sigma.
    ///
    /// # Errors
    ///
    /// Returns [`MixError::InvalidWeight`] for the first weight that is
    /// non-finite or outside `[0, 1]`, and [`MixError::InvalidParameter`]
    /// if `sigma` is not a positive finite number.
    pub fn validate(&self) -> Result<(), MixError> {
        for (slot, weights) in self.weights.iter().enumerate() {
            check_weight(slot, self.mode.primary(), weights.primary)?;
            check_weight(slot, self.mode.secondary(), weights.secondary)?;
        }
        validate_sigma(self.sigma)
    }

    /// Slots whose weights are not both zero.
    pub fn weighted_slots(&self) -> impl Iterator<Item = usize> + '_ {
        self.weights
            .iter()
            .enumerate()
            .filter(|(_, w)| !w.is_zero())
            .map(|(slot, _)| slot)
    }
}

fn check_weight(slot: usize, component: ComponentKind, value: f64) -> Result<(), MixError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(MixError::InvalidWeight {
            slot,
            component,
            value,
        })
    }
}

/// Reject non-positive or non-finite Gaussian sigma values.
pub(crate) fn validate_sigma(sigma: f64) -> Result<(), MixError> {
    if sigma.is_finite() && sigma > 0.0 {
        Ok(())
    } else {
        Err(MixError::InvalidParameter(format!(
            "sigma must be positive and finite, got {sigma}"
        )))
    }
}

/// Which of the two outputs a job targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OutputSlot {
    /// Output viewport 1.
    First,
    /// Output viewport 2.
    Second,
}

impl OutputSlot {
    /// Both slots, in order.
    pub const ALL: [Self; 2] = [Self::First, Self::Second];

    /// Zero-based index of the slot.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::First => 0,
            Self::Second => 1,
        }
    }
}

impl fmt::Display for OutputSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::First => f.write_str("output 1"),
            Self::Second => f.write_str("output 2"),
        }
    }
}

/// Errors raised by the engine.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
pub enum MixError {
    /// A parameter is outside its domain (sigma, enum name, slot index).
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A weight is outside `[0, 1]`.
    #[error("invalid {component} weight {value} for slot {slot}: must be within [0, 1]")]
    InvalidWeight {
        /// Input slot index.
        slot: usize,
        /// Component the weight applies to.
        component: ComponentKind,
        /// Offending value.
        value: f64,
    },

    /// Participating images do not share the same size.
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch {
        /// Size of the first participating image.
        expected: Dimensions,
        /// Size of the offending image.
        found: Dimensions,
    },

    /// No input image is loaded.
    #[error("no input images loaded")]
    EmptyInput,

    /// The transform produced non-finite values.
    #[error("numeric failure: {0}")]
    NumericFailure(String),

    /// The background worker is no longer running.
    #[error("mix worker is not available")]
    WorkerUnavailable,
}
