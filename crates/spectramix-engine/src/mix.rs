//! Weighted combination of spectrum components across input slots.
//!
//! A mix runs four sequential stages, each worth a fixed quarter of the
//! reported progress:
//!
//! 1. **Spectrum acquisition**: fetch (or compute once) the spectrum of
//!    every present slot with a nonzero weight.
//! 2. **Combination**: weighted averages of the two components of the
//!    active mode. Each accumulator is normalised by the sum of its own
//!    weights; an accumulator whose weights are all zero is the all-zero
//!    grid.
//! 3. **Masking**: elementwise multiply by the region mask.
//! 4. **Inverse transform**: back to the spatial domain.
//!
//! Every call owns all of its intermediates, so two outputs can be mixed
//! from the same inputs without sharing mutable state.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cache::MixInputs;
use crate::diagnostics::{Clock, MixDiagnostics, StageTiming, StdClock};
use crate::region_mask;
use crate::spectrum::{self, Complex64, ComplexGrid, SpectrumData};
use crate::types::{
    ComponentMode, ComponentWeights, Dimensions, GrayscaleImage, MixError, MixSpecification,
    SLOT_COUNT,
};

/// One of the four sequential stages of a mix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MixStage {
    /// Fetch or compute input spectra.
    SpectrumAcquisition,
    /// Combine weighted components.
    Combination,
    /// Apply the region mask.
    Masking,
    /// Transform back to the spatial domain.
    InverseTransform,
}

impl MixStage {
    /// All stages in execution order.
    pub const ALL: [Self; 4] = [
        Self::SpectrumAcquisition,
        Self::Combination,
        Self::Masking,
        Self::InverseTransform,
    ];

    /// Overall progress percentage once this stage has finished.
    #[must_use]
    pub const fn progress(self) -> u8 {
        match self {
            Self::SpectrumAcquisition => 25,
            Self::Combination => 50,
            Self::Masking => 75,
            Self::InverseTransform => 100,
        }
    }

    /// Human-readable stage name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::SpectrumAcquisition => "Spectrum Acquisition",
            Self::Combination => "Combination",
            Self::Masking => "Masking",
            Self::InverseTransform => "Inverse Transform",
        }
    }
}

impl fmt::Display for MixStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of a mix: the output image plus diagnostics.
#[derive(Debug, Clone)]
pub struct MixOutput {
    /// The reconstructed image.
    pub image: GrayscaleImage,
    /// Timing and counts for the run.
    pub diagnostics: MixDiagnostics,
}

/// Mix loose images.
///
/// Spectra are computed fresh for every participating image. Use
/// [`mix_inputs`] with a [`SpectrumCache`](crate::SpectrumCache)
/// snapshot to reuse them across calls.
///
/// # Errors
///
/// See [`mix_inputs`].
pub fn mix(
    images: &[Option<&GrayscaleImage>; SLOT_COUNT],
    spec: &MixSpecification,
) -> Result<GrayscaleImage, MixError> {
    let inputs = MixInputs::from_images(images);
    mix_inputs(&inputs, spec, &StdClock, |_| {}).map(|output| output.image)
}

/// Mix a snapshot of cached inputs, reporting each finished stage.
///
/// Slots without an image are skipped even when weighted.
///
/// # Errors
///
/// Returns [`MixError::InvalidWeight`] or [`MixError::InvalidParameter`]
/// for an invalid specification, [`MixError::EmptyInput`] if no image
/// is present, [`MixError::DimensionMismatch`] if present images differ
/// in size, and [`MixError::NumericFailure`] if the reconstruction is
/// not finite.
pub fn mix_inputs<C: Clock>(
    inputs: &MixInputs,
    spec: &MixSpecification,
    clock: &C,
    mut on_stage: impl FnMut(MixStage),
) -> Result<MixOutput, MixError> {
    spec.validate()?;
    let dimensions = inputs.dimensions()?;
    let total_start = clock.now();
    let mut stages = Vec::with_capacity(MixStage::ALL.len());

    // 1. Spectrum acquisition.
    let start = clock.now();
    let mut spectra_computed = 0;
    let mut participants: Vec<Participant<'_>> = Vec::with_capacity(SLOT_COUNT);
    for slot in spec.weighted_slots() {
        let Some(entry) = inputs.get(slot) else {
            continue;
        };
        if !entry.has_spectrum() {
            spectra_computed += 1;
        }
        participants.push(Participant {
            slot,
            weights: spec.weights[slot],
            spectrum: entry.spectrum(),
        });
    }
    stages.push(StageTiming {
        stage: MixStage::SpectrumAcquisition,
        duration: clock.elapsed(&start),
    });
    on_stage(MixStage::SpectrumAcquisition);

    // 2. Combination.
    let start = clock.now();
    let mut grid = combine(dimensions, spec.mode, &participants);
    stages.push(StageTiming {
        stage: MixStage::Combination,
        duration: clock.elapsed(&start),
    });
    on_stage(MixStage::Combination);

    // 3. Masking.
    let start = clock.now();
    let mask = region_mask::build(dimensions, spec.sigma, spec.mask)?;
    mask.apply(&mut grid)?;
    stages.push(StageTiming {
        stage: MixStage::Masking,
        duration: clock.elapsed(&start),
    });
    on_stage(MixStage::Masking);

    // 4. Inverse transform.
    let start = clock.now();
    let image = spectrum::inverse_transform(&grid, spec.scaling)?;
    stages.push(StageTiming {
        stage: MixStage::InverseTransform,
        duration: clock.elapsed(&start),
    });
    on_stage(MixStage::InverseTransform);

    Ok(MixOutput {
        image,
        diagnostics: MixDiagnostics {
            dimensions,
            mode: spec.mode,
            mask: spec.mask,
            participating_slots: participants.iter().map(|p| p.slot).collect(),
            spectra_computed,
            stages,
            total_duration: clock.elapsed(&total_start),
        },
    })
}

/// A weighted slot with its spectrum.
struct Participant<'a> {
    slot: usize,
    weights: ComponentWeights,
    spectrum: &'a SpectrumData,
}

/// Build the combined complex grid for the active mode.
fn combine(
    dimensions: Dimensions,
    mode: ComponentMode,
    participants: &[Participant<'_>],
) -> ComplexGrid {
    let len = dimensions.pixel_count();
    let primary = weighted_average(
        len,
        participants
            .iter()
            .filter(|p| p.weights.primary > 0.0)
            .map(|p| (p.weights.primary, p.spectrum.component(mode.primary()))),
    );
    let secondary = weighted_average(
        len,
        participants
            .iter()
            .filter(|p| p.weights.secondary > 0.0)
            .map(|p| (p.weights.secondary, p.spectrum.component(mode.secondary()))),
    );

    let data: Vec<Complex64> = match mode {
        ComponentMode::MagnitudePhase => primary
            .iter()
            .zip(&secondary)
            .map(|(&magnitude, &phase)| Complex64::from_polar(magnitude, phase))
            .collect(),
        ComponentMode::RealImaginary => primary
            .iter()
            .zip(&secondary)
            .map(|(&re, &im)| Complex64::new(re, im))
            .collect(),
    };

    ComplexGrid::new(dimensions, data).unwrap_or_else(|_| ComplexGrid::zeros(dimensions))
}

/// `Σ wᵢ·vᵢ / Σ wᵢ` per cell; all zeros when no term carries weight.
fn weighted_average<'a>(len: usize, terms: impl Iterator<Item = (f64, &'a [f64])>) -> Vec<f64> {
    let mut accumulator = vec![0.0; len];
    let mut total_weight = 0.0;
    for (weight, values) in terms {
        total_weight += weight;
        for (acc, &value) in accumulator.iter_mut().zip(values) {
            *acc = weight.mul_add(value, *acc);
        }
    }
    if total_weight > 0.0 {
        for acc in &mut accumulator {
            *acc /= total_weight;
        }
    }
    accumulator
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{ComponentKind, MaskKind, OutputScaling};

    fn dims(w: u32, h: u32) -> Dimensions {
        Dimensions::new(w, h)
    }

    fn pattern(w: u32, h: u32, seed: u32) -> GrayscaleImage {
        GrayscaleImage::from_fn(dims(w, h), |x, y| {
            f64::from((x * 37 + y * 91 + seed * 53 + x * y * 7) % 256)
        })
        .unwrap()
    }

    fn only_slot(slot: usize, weights: ComponentWeights) -> [ComponentWeights; SLOT_COUNT] {
        let mut all = [ComponentWeights::ZERO; SLOT_COUNT];
        all[slot] = weights;
        all
    }

    fn assert_close(a: &GrayscaleImage, b: &GrayscaleImage, tolerance: f64) {
        assert_eq!(a.dimensions(), b.dimensions());
        for (i, (va, vb)) in a.samples().iter().zip(b.samples()).enumerate() {
            assert!((va - vb).abs() <= tolerance, "sample {i}: {va} vs {vb}");
        }
    }

    #[test]
    fn identity_mix_of_flat_gray() {
        let gray = GrayscaleImage::filled(dims(4, 4), 128.0).unwrap();
        let spec = MixSpecification {
            weights: only_slot(0, ComponentWeights::new(1.0, 1.0)),
            ..MixSpecification::default()
        };
        let out = mix(&[Some(&gray), Some(&gray), None, None], &spec).unwrap();
        assert_close(&out, &gray, 1e-9);
    }

    #[test]
    fn identity_mix_of_pattern_in_both_modes() {
        let img = pattern(6, 5, 1);
        for mode in [ComponentMode::MagnitudePhase, ComponentMode::RealImaginary] {
            let spec = MixSpecification {
                mode,
                weights: only_slot(2, ComponentWeights::new(1.0, 1.0)),
                ..MixSpecification::default()
            };
            let out = mix(&[None, None, Some(&img), None], &spec).unwrap();
            assert_close(&out, &img, 1e-8);
        }
    }

    #[test]
    fn equal_weights_average_real_imaginary() {
        let a = pattern(4, 4, 1);
        let b = pattern(4, 4, 2);
        let spec = MixSpecification {
            mode: ComponentMode::RealImaginary,
            weights: [
                ComponentWeights::new(0.5, 0.5),
                ComponentWeights::new(0.5, 0.5),
                ComponentWeights::ZERO,
                ComponentWeights::ZERO,
            ],
            ..MixSpecification::default()
        };
        let out = mix(&[Some(&a), Some(&b), None, None], &spec).unwrap();
        let expected = GrayscaleImage::from_fn(dims(4, 4), |x, y| {
            let i = (y * 4 + x) as usize;
            (a.samples()[i] + b.samples()[i]) / 2.0
        })
        .unwrap();
        assert_close(&out, &expected, 1e-9);
    }

    #[test]
    fn weights_are_normalised_per_accumulator() {
        // A single slot at weight 0.3 contributes the same as weight 1.0.
        let img = pattern(4, 4, 3);
        let full = MixSpecification {
            weights: only_slot(1, ComponentWeights::new(1.0, 1.0)),
            ..MixSpecification::default()
        };
        let partial = MixSpecification {
            weights: only_slot(1, ComponentWeights::new(0.3, 0.3)),
            ..MixSpecification::default()
        };
        let images = [None, Some(&img), None, None];
        assert_close(&mix(&images, &full).unwrap(), &mix(&images, &partial).unwrap(), 1e-9);
    }

    #[test]
    fn zero_magnitude_weights_give_black_output() {
        let img = pattern(4, 4, 4);
        let spec = MixSpecification {
            weights: only_slot(0, ComponentWeights::new(0.0, 1.0)),
            ..MixSpecification::default()
        };
        let out = mix(&[Some(&img), None, None, None], &spec).unwrap();
        assert!(out.samples().iter().all(|v| v.is_finite() && v.abs() < 1e-12));
    }

    #[test]
    fn zero_phase_weights_keep_magnitude_with_zero_phase() {
        let img = pattern(4, 4, 5);
        let spec = MixSpecification {
            weights: only_slot(0, ComponentWeights::new(1.0, 0.0)),
            scaling: OutputScaling::Normalize,
            ..MixSpecification::default()
        };
        let out = mix(&[Some(&img), None, None, None], &spec).unwrap();
        assert!(out.samples().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn all_zero_weights_are_neutral() {
        let img = pattern(3, 3, 6);
        let out = mix(&[Some(&img), None, None, None], &MixSpecification::default()).unwrap();
        assert!(out.samples().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn weighted_empty_slot_is_skipped() {
        let img = pattern(4, 4, 7);
        let mut weights = only_slot(0, ComponentWeights::new(1.0, 1.0));
        weights[3] = ComponentWeights::new(1.0, 1.0);
        let spec = MixSpecification {
            weights,
            ..MixSpecification::default()
        };
        let out = mix(&[Some(&img), None, None, None], &spec).unwrap();
        assert_close(&out, &img, 1e-8);
    }

    #[test]
    fn invalid_weight_is_rejected() {
        let img = pattern(2, 2, 0);
        let spec = MixSpecification {
            weights: only_slot(0, ComponentWeights::new(1.5, 0.0)),
            ..MixSpecification::default()
        };
        let err = mix(&[Some(&img), None, None, None], &spec).unwrap_err();
        assert_eq!(
            err,
            MixError::InvalidWeight {
                slot: 0,
                component: ComponentKind::Magnitude,
                value: 1.5,
            }
        );
    }

    #[test]
    fn mismatched_dimensions_are_rejected() {
        let a = pattern(4, 4, 0);
        let b = pattern(5, 4, 0);
        let result = mix(&[Some(&a), Some(&b), None, None], &MixSpecification::default());
        assert!(matches!(result, Err(MixError::DimensionMismatch { .. })));
    }

    #[test]
    fn no_images_is_empty_input() {
        let result = mix(&[None, None, None, None], &MixSpecification::default());
        assert_eq!(result.unwrap_err(), MixError::EmptyInput);
    }

    #[test]
    fn mix_is_deterministic() {
        let a = pattern(8, 8, 1);
        let b = pattern(8, 8, 9);
        let spec = MixSpecification {
            weights: [
                ComponentWeights::new(0.7, 0.2),
                ComponentWeights::new(0.3, 0.8),
                ComponentWeights::ZERO,
                ComponentWeights::ZERO,
            ],
            mask: MaskKind::Inner,
            sigma: 2.0,
            ..MixSpecification::default()
        };
        let images = [Some(&a), Some(&b), None, None];
        assert_eq!(mix(&images, &spec).unwrap(), mix(&images, &spec).unwrap());
    }

    #[test]
    fn large_sigma_inner_matches_unmasked() {
        let img = pattern(8, 8, 2);
        let base = MixSpecification {
            weights: only_slot(0, ComponentWeights::new(1.0, 1.0)),
            ..MixSpecification::default()
        };
        let wide = MixSpecification {
            mask: MaskKind::Inner,
            sigma: 1e6,
            ..base.clone()
        };
        let images = [Some(&img), None, None, None];
        assert_close(&mix(&images, &base).unwrap(), &mix(&images, &wide).unwrap(), 1e-6);
    }

    #[test]
    fn tiny_sigma_inner_blurs_to_mean() {
        let img = pattern(8, 8, 3);
        let spec = MixSpecification {
            weights: only_slot(0, ComponentWeights::new(1.0, 1.0)),
            mask: MaskKind::Inner,
            sigma: 1e-3,
            ..MixSpecification::default()
        };
        let out = mix(&[Some(&img), None, None, None], &spec).unwrap();
        #[allow(clippy::cast_precision_loss)]
        let mean = img.samples().iter().sum::<f64>() / img.samples().len() as f64;
        assert_close(&out, &GrayscaleImage::filled(dims(8, 8), mean).unwrap(), 1e-6);
    }

    #[test]
    fn inner_and_outer_masked_spectra_sum_to_original() {
        let img = pattern(8, 8, 4);
        let weights = only_slot(0, ComponentWeights::new(1.0, 1.0));
        let inputs = MixInputs::from_images(&[Some(&img), None, None, None]);
        let dims = img.dimensions();
        let spectrum = inputs.get(0).unwrap().spectrum();
        let mut inner = spectrum.grid().clone();
        let mut outer = spectrum.grid().clone();
        region_mask::build(dims, 1.5, MaskKind::Inner).unwrap().apply(&mut inner).unwrap();
        region_mask::build(dims, 1.5, MaskKind::Outer).unwrap().apply(&mut outer).unwrap();
        let summed: Vec<Complex64> = inner
            .data()
            .iter()
            .zip(outer.data())
            .map(|(i, o)| i + o)
            .collect();
        for (s, f) in summed.iter().zip(spectrum.grid().data()) {
            assert!((s - f).norm() < 1e-9);
        }
        let summed = ComplexGrid::new(dims, summed).unwrap();
        let rebuilt = spectrum::inverse_transform(&summed, OutputScaling::Clip).unwrap();
        assert_close(&rebuilt, &img, 1e-6);

        let spec = MixSpecification {
            mode: ComponentMode::RealImaginary,
            weights,
            mask: MaskKind::Outer,
            sigma: 1.5,
            ..MixSpecification::default()
        };
        let high_pass = mix(&[Some(&img), None, None, None], &spec).unwrap();
        let expected = spectrum::inverse_transform(&outer, OutputScaling::Clip).unwrap();
        assert_close(&high_pass, &expected, 1e-9);
    }

    #[test]
    fn stages_are_reported_in_order() {
        let img = pattern(4, 4, 0);
        let inputs = MixInputs::from_images(&[Some(&img), None, None, None]);
        let spec = MixSpecification {
            weights: only_slot(0, ComponentWeights::new(1.0, 1.0)),
            ..MixSpecification::default()
        };
        let mut seen = Vec::new();
        let output = mix_inputs(&inputs, &spec, &StdClock, |stage| seen.push(stage)).unwrap();
        assert_eq!(seen, MixStage::ALL.to_vec());
        assert_eq!(output.diagnostics.participating_slots, vec![0]);
        assert_eq!(output.diagnostics.spectra_computed, 1);
        assert_eq!(output.diagnostics.stages.len(), 4);

        // Second run reuses the cached spectrum.
        let again = mix_inputs(&inputs, &spec, &StdClock, |_| {}).unwrap();
        assert_eq!(again.diagnostics.spectra_computed, 0);
    }

    #[test]
    fn invalid_spec_reports_no_stages() {
        let img = pattern(4, 4, 0);
        let inputs = MixInputs::from_images(&[Some(&img), None, None, None]);
        let spec = MixSpecification {
            sigma: 0.0,
            ..MixSpecification::default()
        };
        let mut seen = Vec::new();
        let result = mix_inputs(&inputs, &spec, &StdClock, |stage| seen.push(stage));
        assert!(matches!(result, Err(MixError::InvalidParameter(_))));
        assert!(seen.is_empty());
    }

    #[test]
    fn stage_progress_is_increasing() {
        let progress: Vec<u8> = MixStage::ALL.iter().map(|s| s.progress()).collect();
        assert_eq!(progress, vec![25, 50, 75, 100]);
    }
}
