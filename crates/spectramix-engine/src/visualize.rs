//! Display scaling for spectrum components.
//!
//! Raw spectra span many orders of magnitude, so magnitude, real, and
//! imaginary views are log-compressed before being stretched into the
//! display range. Phase is already bounded and is mapped linearly.
//!
//! Nothing here feeds the mixer; the output is only for inspection.

use std::f64::consts::PI;

use crate::spectrum::SpectrumData;
use crate::types::{ComponentKind, Dimensions, GrayImage};

/// Default gamma exponent applied to log-scaled real/imaginary parts.
pub const DEFAULT_GAMMA: f64 = 0.5;

/// Default upper bound of the display range.
pub const DEFAULT_DISPLAY_MAX: f64 = 255.0;

/// Display scaling options.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VisualizeConfig {
    /// Exponent applied to `ln(1 + |v|)` for real and imaginary views.
    pub gamma: f64,
    /// Output values lie in `[0, display_max]`.
    pub display_max: f64,
}

impl Default for VisualizeConfig {
    fn default() -> Self {
        Self {
            gamma: DEFAULT_GAMMA,
            display_max: DEFAULT_DISPLAY_MAX,
        }
    }
}

/// A bounded grid ready for color mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayGrid {
    dimensions: Dimensions,
    values: Vec<f64>,
}

impl DisplayGrid {
    /// Grid dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Row-major display values in `[0, display_max]`.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Render to an 8-bit raster, rescaling `[0, display_max]` onto `0..=255`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn to_gray(&self, display_max: f64) -> GrayImage {
        let scale = if display_max > 0.0 {
            255.0 / display_max
        } else {
            0.0
        };
        let raw = self
            .values
            .iter()
            .map(|&v| (v * scale).round().clamp(0.0, 255.0) as u8)
            .collect();
        GrayImage::from_raw(self.dimensions.width, self.dimensions.height, raw)
            .unwrap_or_else(|| GrayImage::new(self.dimensions.width, self.dimensions.height))
    }
}

/// Scale one component of `spectrum` for display.
#[must_use]
pub fn visualize(
    spectrum: &SpectrumData,
    kind: ComponentKind,
    config: &VisualizeConfig,
) -> DisplayGrid {
    visualize_component(spectrum.component(kind), spectrum.dimensions(), kind, config)
}

/// Scale raw component values for display.
///
/// - magnitude: `ln(1 + |v|)`, then min-max normalise
/// - phase: linear map from `(-π, π]`
/// - real / imaginary: `ln(1 + |v|)^gamma`, then min-max normalise
///
/// A grid that is constant after scaling maps to all zeros.
#[must_use]
pub fn visualize_component(
    values: &[f64],
    dimensions: Dimensions,
    kind: ComponentKind,
    config: &VisualizeConfig,
) -> DisplayGrid {
    let max = config.display_max;
    let values = match kind {
        ComponentKind::Phase => values
            .iter()
            .map(|&p| ((p + PI) / (2.0 * PI) * max).clamp(0.0, max))
            .collect(),
        ComponentKind::Magnitude => {
            normalize(values.iter().map(|v| v.abs().ln_1p()).collect(), max)
        }
        ComponentKind::Real | ComponentKind::Imaginary => normalize(
            values
                .iter()
                .map(|v| v.abs().ln_1p().powf(config.gamma))
                .collect(),
            max,
        ),
    };
    DisplayGrid { dimensions, values }
}

fn normalize(mut values: Vec<f64>, max: f64) -> Vec<f64> {
    let (lo, hi) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = hi - lo;
    if !(range.is_finite() && range > 0.0) {
        values.iter_mut().for_each(|v| *v = 0.0);
        return values;
    }
    for v in &mut values {
        *v = if v.is_finite() {
            ((*v - lo) / range * max).clamp(0.0, max)
        } else {
            0.0
        };
    }
    values
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::spectrum::transform;
    use crate::types::GrayscaleImage;

    fn dims(w: u32, h: u32) -> Dimensions {
        Dimensions::new(w, h)
    }

    #[test]
    fn magnitude_is_log_then_normalized() {
        let values = [0.0, (1.0_f64).exp_m1(), (2.0_f64).exp_m1()];
        let grid = visualize_component(
            &values,
            dims(3, 1),
            ComponentKind::Magnitude,
            &VisualizeConfig::default(),
        );
        let v = grid.values();
        assert!(v[0].abs() < 1e-9);
        assert!((v[1] - 127.5).abs() < 1e-9);
        assert!((v[2] - 255.0).abs() < 1e-9);
    }

    #[test]
    fn phase_maps_linearly() {
        let values = [-PI, 0.0, PI];
        let grid = visualize_component(
            &values,
            dims(3, 1),
            ComponentKind::Phase,
            &VisualizeConfig::default(),
        );
        let v = grid.values();
        assert!(v[0].abs() < 1e-9);
        assert!((v[1] - 127.5).abs() < 1e-9);
        assert!((v[2] - 255.0).abs() < 1e-9);
    }

    #[test]
    fn real_ignores_sign_and_applies_gamma() {
        let config = VisualizeConfig {
            gamma: 2.0,
            display_max: 1.0,
        };
        let e1 = (1.0_f64).exp_m1();
        let e2 = (2.0_f64).exp_m1();
        let grid = visualize_component(&[0.0, -e1, e2], dims(3, 1), ComponentKind::Real, &config);
        let v = grid.values();
        // log values 0, 1, 2 -> squared 0, 1, 4 -> normalised 0, 0.25, 1
        assert!(v[0].abs() < 1e-9);
        assert!((v[1] - 0.25).abs() < 1e-9);
        assert!((v[2] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn constant_grid_maps_to_zero() {
        let grid = visualize_component(
            &[5.0; 4],
            dims(2, 2),
            ComponentKind::Imaginary,
            &VisualizeConfig::default(),
        );
        assert_eq!(grid.values(), &[0.0; 4]);
    }

    #[test]
    fn spectrum_views_are_bounded() {
        let img =
            GrayscaleImage::from_fn(dims(8, 8), |x, y| f64::from((x * 31 + y * 17) % 256)).unwrap();
        let spectrum = transform(&img);
        let config = VisualizeConfig::default();
        for kind in [
            ComponentKind::Magnitude,
            ComponentKind::Phase,
            ComponentKind::Real,
            ComponentKind::Imaginary,
        ] {
            let grid = visualize(&spectrum, kind, &config);
            assert_eq!(grid.dimensions(), dims(8, 8));
            assert!(
                grid.values().iter().all(|v| (0.0..=255.0).contains(v)),
                "{kind} view out of range",
            );
        }
    }

    #[test]
    fn to_gray_rescales_display_range() {
        let grid = visualize_component(
            &[-PI, PI],
            dims(2, 1),
            ComponentKind::Phase,
            &VisualizeConfig {
                gamma: 1.0,
                display_max: 1.0,
            },
        );
        let gray = grid.to_gray(1.0);
        assert_eq!(gray.as_raw(), &vec![0, 255]);
    }
}
