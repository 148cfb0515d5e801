//! Forward and inverse 2D discrete Fourier transforms.
//!
//! Spectra are stored in the *shifted* layout: the four quadrants of the
//! raw transform are rolled so the zero-frequency term sits at
//! `(width / 2, height / 2)`. Radially symmetric region masks can then be
//! built around the grid center.
//!
//! The 2D transform is separable: every row is transformed first, then
//! every column, using [`rustfft`] plans for each axis length.

use std::f64::consts::PI;
use std::sync::OnceLock;

use rustfft::{FftDirection, FftPlanner};

pub use rustfft::num_complex::Complex64;

use crate::types::{
    ComponentKind, Dimensions, GrayscaleImage, MAX_SAMPLE, MixError, OutputScaling, clamp_sample,
};

/// A row-major grid of complex values.
#[derive(Debug, Clone, PartialEq)]
pub struct ComplexGrid {
    dimensions: Dimensions,
    data: Vec<Complex64>,
}

impl ComplexGrid {
    /// Wrap row-major complex values.
    ///
    /// # Errors
    ///
    /// Returns [`MixError::InvalidParameter`] if the dimensions are empty
    /// or `data.len() != width * height`.
    pub fn new(dimensions: Dimensions, data: Vec<Complex64>) -> Result<Self, MixError> {
        if dimensions.is_empty() || data.len() != dimensions.pixel_count() {
            return Err(MixError::InvalidParameter(format!(
                "expected {} complex values for a {dimensions} grid, got {}",
                dimensions.pixel_count(),
                data.len(),
            )));
        }
        Ok(Self { dimensions, data })
    }

    /// A grid of zeros.
    #[must_use]
    pub fn zeros(dimensions: Dimensions) -> Self {
        Self {
            dimensions,
            data: vec![Complex64::default(); dimensions.pixel_count()],
        }
    }

    /// Grid dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Row-major values.
    #[must_use]
    pub fn data(&self) -> &[Complex64] {
        &self.data
    }

    /// Mutable row-major values.
    pub(crate) fn data_mut(&mut self) -> &mut [Complex64] {
        &mut self.data
    }
}

/// The shifted spectrum of one image plus lazily computed component views.
///
/// Each view is computed at most once and can be read from any thread.
#[derive(Debug, Clone)]
pub struct SpectrumData {
    grid: ComplexGrid,
    magnitude: OnceLock<Vec<f64>>,
    phase: OnceLock<Vec<f64>>,
    real: OnceLock<Vec<f64>>,
    imaginary: OnceLock<Vec<f64>>,
}

impl SpectrumData {
    /// Wrap a grid that is already in the shifted layout.
    #[must_use]
    pub const fn from_shifted(grid: ComplexGrid) -> Self {
        Self {
            grid,
            magnitude: OnceLock::new(),
            phase: OnceLock::new(),
            real: OnceLock::new(),
            imaginary: OnceLock::new(),
        }
    }

    /// The shifted complex grid.
    #[must_use]
    pub const fn grid(&self) -> &ComplexGrid {
        &self.grid
    }

    /// Grid dimensions (same as the source image).
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.grid.dimensions
    }

    /// `|F|` at every cell.
    pub fn magnitude(&self) -> &[f64] {
        self.magnitude
            .get_or_init(|| self.grid.data.iter().map(|c| c.norm()).collect())
    }

    /// `atan2(Im, Re)` at every cell, in `(-π, π]`.
    pub fn phase(&self) -> &[f64] {
        self.phase
            .get_or_init(|| self.grid.data.iter().map(|&c| principal_phase(c)).collect())
    }

    /// `Re(F)` at every cell.
    pub fn real(&self) -> &[f64] {
        self.real
            .get_or_init(|| self.grid.data.iter().map(|c| c.re).collect())
    }

    /// `Im(F)` at every cell.
    pub fn imaginary(&self) -> &[f64] {
        self.imaginary
            .get_or_init(|| self.grid.data.iter().map(|c| c.im).collect())
    }

    /// The requested component view.
    pub fn component(&self, kind: ComponentKind) -> &[f64] {
        match kind {
            ComponentKind::Magnitude => self.magnitude(),
            ComponentKind::Phase => self.phase(),
            ComponentKind::Real => self.real(),
            ComponentKind::Imaginary => self.imaginary(),
        }
    }
}

/// Phase angle folded into `(-π, π]`.
///
/// `atan2` returns `-π` for a negative real part with a `-0.0`
/// imaginary part; that value is mapped to `π`.
#[must_use]
pub fn principal_phase(value: Complex64) -> f64 {
    let angle = value.arg();
    if angle <= -PI { PI } else { angle }
}

/// Forward transform of an image into the shifted layout.
#[must_use = "returns the computed spectrum"]
pub fn transform(image: &GrayscaleImage) -> SpectrumData {
    let dimensions = image.dimensions();
    let mut buffer: Vec<Complex64> = image
        .samples()
        .iter()
        .map(|&v| Complex64::new(v, 0.0))
        .collect();
    fft_2d(dimensions, &mut buffer, FftDirection::Forward);
    let shifted = fft_shift(dimensions, &buffer);
    SpectrumData::from_shifted(ComplexGrid {
        dimensions,
        data: shifted,
    })
}

/// Inverse transform of a shifted grid back into an image.
///
/// Undoes the shift, applies the inverse DFT normalised by
/// `1 / (width * height)`, keeps the real part, and maps it into the
/// sample range according to `scaling`.
///
/// # Errors
///
/// Returns [`MixError::InvalidParameter`] for a grid with no cells and
/// [`MixError::NumericFailure`] if the reconstruction contains
/// non-finite values.
pub fn inverse_transform(
    grid: &ComplexGrid,
    scaling: OutputScaling,
) -> Result<GrayscaleImage, MixError> {
    let dimensions = grid.dimensions;
    if dimensions.is_empty() {
        return Err(MixError::InvalidParameter(format!(
            "cannot reconstruct an empty {dimensions} grid"
        )));
    }
    let mut buffer = ifft_shift(dimensions, &grid.data);
    fft_2d(dimensions, &mut buffer, FftDirection::Inverse);

    #[allow(clippy::cast_precision_loss)]
    let norm = 1.0 / dimensions.pixel_count() as f64;
    let values: Vec<f64> = buffer.iter().map(|c| c.re * norm).collect();

    if let Some(index) = values.iter().position(|v| !v.is_finite()) {
        let width = dimensions.width as usize;
        return Err(MixError::NumericFailure(format!(
            "inverse transform produced a non-finite value at ({}, {})",
            index % width,
            index / width,
        )));
    }

    Ok(GrayscaleImage::from_valid_samples(
        dimensions,
        scale_output(values, scaling),
    ))
}

/// Ranges at or below this are treated as flat by [`OutputScaling::Normalize`].
const FLAT_RANGE: f64 = 1e-9;

/// Map reconstructed values into `[0, MAX_SAMPLE]`.
///
/// A flat reconstruction has no range to stretch, so `Normalize` falls
/// back to clipping for it.
fn scale_output(mut values: Vec<f64>, scaling: OutputScaling) -> Vec<f64> {
    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = max - min;

    match scaling {
        OutputScaling::Normalize if range > FLAT_RANGE => {
            for v in &mut values {
                *v = clamp_sample((*v - min) / range * MAX_SAMPLE);
            }
        }
        OutputScaling::Clip | OutputScaling::Normalize => {
            for v in &mut values {
                *v = clamp_sample(*v);
            }
        }
    }
    values
}

/// Separable 2D DFT in place: rows first, then columns.
///
/// Unnormalised in both directions.
fn fft_2d(dimensions: Dimensions, buffer: &mut [Complex64], direction: FftDirection) {
    let width = dimensions.width as usize;
    let height = dimensions.height as usize;

    let mut planner = FftPlanner::new();
    let row_fft = planner.plan_fft(width, direction);
    let mut scratch = vec![Complex64::default(); row_fft.get_inplace_scratch_len()];
    for row in buffer.chunks_exact_mut(width) {
        row_fft.process_with_scratch(row, &mut scratch);
    }

    let column_fft = planner.plan_fft(height, direction);
    scratch.resize(column_fft.get_inplace_scratch_len(), Complex64::default());
    let mut column = vec![Complex64::default(); height];
    for x in 0..width {
        for (y, cell) in column.iter_mut().enumerate() {
            *cell = buffer[y * width + x];
        }
        column_fft.process_with_scratch(&mut column, &mut scratch);
        for (y, cell) in column.iter().enumerate() {
            buffer[y * width + x] = *cell;
        }
    }
}

/// Roll quadrants so the zero frequency moves from `(0, 0)` to
/// `(width / 2, height / 2)`.
///
/// Works for odd sizes; [`ifft_shift`] is its exact inverse.
#[must_use]
pub fn fft_shift<T: Copy>(dimensions: Dimensions, data: &[T]) -> Vec<T> {
    let width = dimensions.width as usize;
    let height = dimensions.height as usize;
    roll(width, height, data, width / 2, height / 2)
}

/// Inverse of [`fft_shift`]: move the zero frequency back to `(0, 0)`.
#[must_use]
pub fn ifft_shift<T: Copy>(dimensions: Dimensions, data: &[T]) -> Vec<T> {
    let width = dimensions.width as usize;
    let height = dimensions.height as usize;
    roll(width, height, data, width - width / 2, height - height / 2)
}

/// Cyclic shift: the value at `(x, y)` moves to `((x + dx) % w, (y + dy) % h)`.
fn roll<T: Copy>(width: usize, height: usize, data: &[T], dx: usize, dy: usize) -> Vec<T> {
    let mut rolled = data.to_vec();
    if width == 0 || height == 0 {
        return rolled;
    }
    for (y, row) in data.chunks_exact(width).take(height).enumerate() {
        let target_row = ((y + dy) % height) * width;
        for (x, &value) in row.iter().enumerate() {
            rolled[target_row + (x + dx) % width] = value;
        }
    }
    rolled
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn dims(w: u32, h: u32) -> Dimensions {
        Dimensions::new(w, h)
    }

    /// Deterministic non-trivial test pattern.
    fn pattern(w: u32, h: u32) -> GrayscaleImage {
        GrayscaleImage::from_fn(dims(w, h), |x, y| {
            f64::from((x * 37 + y * 91 + x * y * 13) % 256)
        })
        .unwrap()
    }

    fn assert_images_close(a: &GrayscaleImage, b: &GrayscaleImage, tolerance: f64) {
        assert_eq!(a.dimensions(), b.dimensions());
        for (i, (va, vb)) in a.samples().iter().zip(b.samples()).enumerate() {
            assert!(
                (va - vb).abs() <= tolerance,
                "sample {i} differs: {va} vs {vb}",
            );
        }
    }

    #[test]
    fn round_trip_reproduces_even_image() {
        let img = pattern(8, 6);
        let spectrum = transform(&img);
        let back = inverse_transform(spectrum.grid(), OutputScaling::Clip).unwrap();
        assert_images_close(&img, &back, 1e-9);
    }

    #[test]
    fn round_trip_reproduces_odd_image() {
        let img = pattern(5, 7);
        let spectrum = transform(&img);
        let back = inverse_transform(spectrum.grid(), OutputScaling::Clip).unwrap();
        assert_images_close(&img, &back, 1e-9);
    }

    #[test]
    fn round_trip_single_pixel() {
        let img = GrayscaleImage::filled(dims(1, 1), 42.0).unwrap();
        let back = inverse_transform(transform(&img).grid(), OutputScaling::Clip).unwrap();
        assert_images_close(&img, &back, 1e-12);
    }

    #[test]
    fn flat_image_has_only_centered_dc() {
        let img = GrayscaleImage::filled(dims(4, 4), 10.0).unwrap();
        let spectrum = transform(&img);
        let data = spectrum.grid().data();
        for (i, c) in data.iter().enumerate() {
            if i == 2 * 4 + 2 {
                assert!((c.re - 160.0).abs() < 1e-9, "DC should be 160, got {c}");
                assert!(c.im.abs() < 1e-9);
            } else {
                assert!(c.norm() < 1e-9, "cell {i} should be zero, got {c}");
            }
        }
    }

    #[test]
    fn dc_lands_at_center_for_odd_sizes() {
        let img = GrayscaleImage::filled(dims(5, 3), 1.0).unwrap();
        let spectrum = transform(&img);
        let magnitude = spectrum.magnitude();
        // center = (5 / 2, 3 / 2) = (2, 1)
        assert!((magnitude[5 + 2] - 15.0).abs() < 1e-9);
        let total: f64 = magnitude.iter().sum();
        assert!((total - 15.0).abs() < 1e-9);
    }

    #[test]
    fn shift_matches_numpy_layout() {
        let data: Vec<u32> = (0..5).collect();
        assert_eq!(fft_shift(dims(5, 1), &data), vec![3, 4, 0, 1, 2]);
        assert_eq!(ifft_shift(dims(5, 1), &data), vec![2, 3, 4, 0, 1]);

        let data: Vec<u32> = (0..4).collect();
        assert_eq!(fft_shift(dims(1, 4), &data), vec![2, 3, 0, 1]);
    }

    #[test]
    fn ifft_shift_inverts_fft_shift() {
        for (w, h) in [(4, 4), (5, 3), (1, 7), (6, 9)] {
            let data: Vec<usize> = (0..(w * h) as usize).collect();
            let shifted = fft_shift(dims(w, h), &data);
            assert_eq!(ifft_shift(dims(w, h), &shifted), data, "{w}x{h}");
        }
    }

    #[test]
    fn components_match_complex_values() {
        let img = pattern(4, 4);
        let spectrum = transform(&img);
        for (i, c) in spectrum.grid().data().iter().enumerate() {
            assert!((spectrum.magnitude()[i] - c.norm()).abs() < 1e-12);
            assert!((spectrum.real()[i] - c.re).abs() < f64::EPSILON);
            assert!((spectrum.imaginary()[i] - c.im).abs() < f64::EPSILON);
            let phase = spectrum.phase()[i];
            assert!(phase > -PI && phase <= PI, "phase {phase} out of range");
        }
        assert_eq!(
            spectrum.component(ComponentKind::Magnitude),
            spectrum.magnitude()
        );
    }

    #[test]
    fn negative_zero_imaginary_phase_is_pi() {
        assert!((principal_phase(Complex64::new(-1.0, -0.0)) - PI).abs() < f64::EPSILON);
        assert!((principal_phase(Complex64::new(-1.0, 0.0)) - PI).abs() < f64::EPSILON);
        assert!(principal_phase(Complex64::new(1.0, 0.0)).abs() < f64::EPSILON);
    }

    #[test]
    fn non_finite_grid_is_a_numeric_failure() {
        let mut data = vec![Complex64::default(); 4];
        data[1] = Complex64::new(f64::NAN, 0.0);
        let grid = ComplexGrid::new(dims(2, 2), data).unwrap();
        let result = inverse_transform(&grid, OutputScaling::Clip);
        assert!(matches!(result, Err(MixError::NumericFailure(_))));
    }

    #[test]
    fn empty_grid_is_rejected() {
        for dimensions in [dims(0, 4), dims(4, 0), dims(0, 0)] {
            let result = inverse_transform(&ComplexGrid::zeros(dimensions), OutputScaling::Clip);
            assert!(matches!(result, Err(MixError::InvalidParameter(_))));
        }
        assert!(fft_shift::<u8>(dims(0, 3), &[]).is_empty());
    }

    #[test]
    fn clip_scaling_clamps_out_of_range_values() {
        // DC of 4 * 400 reconstructs a flat 400, which clips to 255.
        let mut grid = ComplexGrid::zeros(dims(2, 2));
        grid.data_mut()[3] = Complex64::new(1600.0, 0.0);
        let img = inverse_transform(&grid, OutputScaling::Clip).unwrap();
        assert!(img.samples().iter().all(|&v| (v - 255.0).abs() < 1e-9));
    }

    #[test]
    fn normalize_scaling_stretches_range() {
        let img = GrayscaleImage::from_fn(dims(4, 1), |x, _| 100.0 + f64::from(x) * 10.0).unwrap();
        let out = inverse_transform(transform(&img).grid(), OutputScaling::Normalize).unwrap();
        let samples = out.samples();
        assert!(samples[0].abs() < 1e-9);
        assert!((samples[3] - 255.0).abs() < 1e-9);
        assert!((samples[1] - 85.0).abs() < 1e-9);
    }

    #[test]
    fn normalize_flat_output_falls_back_to_clip() {
        let img = GrayscaleImage::filled(dims(3, 3), 77.0).unwrap();
        let out = inverse_transform(transform(&img).grid(), OutputScaling::Normalize).unwrap();
        assert_images_close(&img, &out, 1e-9);
    }

    #[test]
    fn complex_grid_rejects_wrong_length() {
        let result = ComplexGrid::new(dims(2, 2), vec![Complex64::default(); 3]);
        assert!(matches!(result, Err(MixError::InvalidParameter(_))));
    }
}
