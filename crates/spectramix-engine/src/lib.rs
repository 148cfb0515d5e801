//! spectramix-engine: Fourier-domain image mixing (sans-IO).
//!
//! Up to four grayscale images are transformed into the frequency
//! domain, their components are combined with per-image weights,
//! optionally restricted to a low- or high-frequency region, and
//! transformed back into a new image:
//!
//! forward transform -> component views -> weighted combination ->
//! region mask -> inverse transform.
//!
//! This crate has **no I/O dependencies**. Decoding, resizing and saving
//! images lives in `spectramix-io`.
//!
//! Two entry points:
//!
//! - [`mix`] / [`mix_inputs`]: synchronous, for one output.
//! - [`MixSession`] / [`JobController`]: background jobs for two outputs,
//!   where a new request for an output supersedes the previous one.

pub mod cache;
pub mod diagnostics;
pub mod job;
pub mod mix;
pub mod region_mask;
pub mod session;
pub mod spectrum;
pub mod types;
pub mod visualize;

pub use cache::{CachedImage, MixInputs, SpectrumCache};
pub use diagnostics::{Clock, MixDiagnostics, StageTiming, StdClock};
pub use job::{JobController, JobEvent, JobId, JobState, MAX_TRACKED_JOBS};
pub use mix::{MixOutput, MixStage, mix, mix_inputs};
pub use region_mask::RegionMaskGrid;
pub use session::MixSession;
pub use spectrum::{Complex64, ComplexGrid, SpectrumData, inverse_transform, transform};
pub use types::{
    ComponentKind, ComponentMode, ComponentWeights, DEFAULT_SIGMA, Dimensions, GrayImage,
    GrayscaleImage, MAX_SAMPLE, MaskKind, MixError, MixSpecification, OutputScaling, OutputSlot,
    SLOT_COUNT,
};
pub use visualize::{DEFAULT_GAMMA, DisplayGrid, VisualizeConfig, visualize};
