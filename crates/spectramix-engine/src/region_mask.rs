//! Gaussian region masks over the shifted spectrum.
//!
//! The inner mask is an isotropic Gaussian centered on the zero
//! frequency (low-pass); the outer mask is its exact complement
//! (high-pass). With [`MaskKind::None`] every cell is `1`.
//!
//! Building a mask is a pure function of its arguments, so two calls
//! with the same `(dimensions, sigma, kind)` yield bit-identical grids.

use crate::spectrum::ComplexGrid;
use crate::types::{Dimensions, MaskKind, MixError, validate_sigma};

/// Per-frequency weights in `[0, 1]`, same layout as a shifted spectrum.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionMaskGrid {
    dimensions: Dimensions,
    kind: MaskKind,
    values: Vec<f64>,
}

impl RegionMaskGrid {
    /// Grid dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Which region this mask keeps.
    #[must_use]
    pub const fn kind(&self) -> MaskKind {
        self.kind
    }

    /// Row-major weights.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Multiply every cell of `grid` by the matching mask weight.
    ///
    /// # Errors
    ///
    /// Returns [`MixError::DimensionMismatch`] if the grid and mask sizes
    /// differ.
    pub fn apply(&self, grid: &mut ComplexGrid) -> Result<(), MixError> {
        if grid.dimensions() != self.dimensions {
            return Err(MixError::DimensionMismatch {
                expected: self.dimensions,
                found: grid.dimensions(),
            });
        }
        if self.kind == MaskKind::None {
            return Ok(());
        }
        for (cell, &weight) in grid.data_mut().iter_mut().zip(&self.values) {
            *cell *= weight;
        }
        Ok(())
    }
}

/// Build a region mask.
///
/// The Gaussian is centered at `(width / 2, height / 2)`, the position
/// of the zero frequency in the shifted layout:
///
/// ```text
/// inner(x, y) = exp(-((x - cx)² + (y - cy)²) / (2 σ²))
/// outer(x, y) = 1 - inner(x, y)
/// ```
///
/// # Errors
///
/// Returns [`MixError::InvalidParameter`] if `sigma` is not a positive
/// finite number, whatever the `kind`.
pub fn build(
    dimensions: Dimensions,
    sigma: f64,
    kind: MaskKind,
) -> Result<RegionMaskGrid, MixError> {
    validate_sigma(sigma)?;

    let values = match kind {
        MaskKind::None => vec![1.0; dimensions.pixel_count()],
        MaskKind::Inner => gaussian(dimensions, sigma),
        MaskKind::Outer => gaussian(dimensions, sigma)
            .into_iter()
            .map(|g| 1.0 - g)
            .collect(),
    };

    Ok(RegionMaskGrid {
        dimensions,
        kind,
        values,
    })
}

/// Low-pass Gaussian weights.
fn gaussian(dimensions: Dimensions, sigma: f64) -> Vec<f64> {
    let cx = f64::from(dimensions.width / 2);
    let cy = f64::from(dimensions.height / 2);
    let denominator = 2.0 * sigma * sigma;

    let mut values = Vec::with_capacity(dimensions.pixel_count());
    for y in 0..dimensions.height {
        let dy = f64::from(y) - cy;
        for x in 0..dimensions.width {
            let dx = f64::from(x) - cx;
            values.push((-dx.mul_add(dx, dy * dy) / denominator).exp());
        }
    }
    values
}
