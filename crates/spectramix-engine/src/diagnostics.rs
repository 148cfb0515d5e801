//! Mix diagnostics: per-stage timing and counts.
//!
//! Every call to [`mix_inputs`](crate::mix::mix_inputs) collects
//! diagnostics alongside the output image. Timing goes through the
//! [`Clock`] trait so the engine never reads a global clock directly.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::mix::MixStage;
use crate::types::{ComponentMode, Dimensions, MaskKind};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Source of timestamps for stage timing.
pub trait Clock {
    /// Opaque timestamp type.
    type Instant;

    /// Current timestamp.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

/// Wall-clock duration of one mix stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageTiming {
    /// Which stage.
    pub stage: MixStage,
    /// Wall-clock duration (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

/// Diagnostics collected from a single mix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixDiagnostics {
    /// Working grid size.
    pub dimensions: Dimensions,
    /// Component mode of the request.
    pub mode: ComponentMode,
    /// Region mask of the request.
    pub mask: MaskKind,
    /// Input slots that contributed to the output.
    pub participating_slots: Vec<usize>,
    /// How many spectra had to be computed (the rest came from the cache).
    pub spectra_computed: usize,
    /// Per-stage timings, in execution order.
    pub stages: Vec<StageTiming>,
    /// Total wall-clock duration of the mix (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
}

impl MixDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Mix Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Grid: {} ({} cells)  mode={}  mask={}",
            self.dimensions,
            self.dimensions.pixel_count(),
            self.mode,
            self.mask,
        ));
        lines.push(format!(
            "Slots: {:?}  spectra computed: {}",
            self.participating_slots, self.spectra_computed,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!("{:<24} {:>10} {:>10}", "Stage", "Duration", "% Total"));
        lines.push("-".repeat(48));

        let total_ms = duration_ms(self.total_duration);
        for timing in &self.stages {
            let ms = duration_ms(timing.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            lines.push(format!("{:<24} {ms:>8.3}ms {pct:>9.1}%", timing.stage.name()));
        }

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}
