//! A spectrum cache and a job controller wired together.

use std::time::Duration;

use crate::cache::SpectrumCache;
use crate::job::{JobController, JobEvent, JobId, JobState};
use crate::types::{
    ComponentKind, GrayscaleImage, MixError, MixSpecification, OutputSlot, SLOT_COUNT,
};
use crate::visualize::{self, DisplayGrid, VisualizeConfig};

/// Four input slots feeding two background-mixed outputs.
///
/// Each submission snapshots the current slots, so loading a new image
/// never changes a job that is already in flight. Callers re-submit to
/// pick up the change.
#[derive(Debug)]
pub struct MixSession {
    cache: SpectrumCache,
    controller: JobController,
}

impl MixSession {
    /// Start a session with empty slots and a fresh worker.
    ///
    /// # Errors
    ///
    /// Returns [`MixError::WorkerUnavailable`] if the worker cannot start.
    pub fn new() -> Result<Self, MixError> {
        Ok(Self {
            cache: SpectrumCache::new(),
            controller: JobController::new()?,
        })
    }

    /// Load `image` into input `slot`. Returns the slot's new version.
    ///
    /// # Errors
    ///
    /// Returns [`MixError::InvalidParameter`] for an out-of-range slot.
    pub fn set_image(&mut self, slot: usize, image: GrayscaleImage) -> Result<u64, MixError> {
        self.cache.set_image(slot, image)
    }

    /// Empty input `slot`.
    ///
    /// # Errors
    ///
    /// Returns [`MixError::InvalidParameter`] for an out-of-range slot.
    pub fn clear_image(&mut self, slot: usize) -> Result<(), MixError> {
        self.cache.clear(slot)
    }

    /// Read access to the input slots.
    #[must_use]
    pub const fn cache(&self) -> &SpectrumCache {
        &self.cache
    }

    /// Queue a mix of the current slots for `output`.
    ///
    /// # Errors
    ///
    /// See [`JobController::submit`].
    pub fn submit(
        &mut self,
        output: OutputSlot,
        spec: MixSpecification,
    ) -> Result<JobId, MixError> {
        let inputs = self.cache.snapshot();
        self.controller.submit(output, spec, inputs)
    }

    /// Cancel the job in flight for `output`.
    pub fn cancel(&mut self, output: OutputSlot) -> Option<JobId> {
        self.controller.cancel(output)
    }

    /// Drain available job events without blocking.
    pub fn poll(&mut self) -> Vec<JobEvent> {
        self.controller.poll()
    }

    /// Wait up to `timeout` for the next job event.
    pub fn wait_event(&mut self, timeout: Duration) -> Option<JobEvent> {
        self.controller.wait_event(timeout)
    }

    /// State of `job`, if still tracked.
    #[must_use]
    pub fn state(&self, job: JobId) -> Option<JobState> {
        self.controller.state(job)
    }

    /// Job in flight for `output`.
    #[must_use]
    pub const fn in_flight(&self, output: OutputSlot) -> Option<JobId> {
        self.controller.in_flight(output)
    }

    /// Display view of one component of the spectrum in `slot`.
    ///
    /// Returns `Ok(None)` for an empty slot. Computes and caches the
    /// spectrum on first use.
    ///
    /// # Errors
    ///
    /// Returns [`MixError::InvalidParameter`] for an out-of-range slot.
    pub fn visualize(
        &self,
        slot: usize,
        kind: ComponentKind,
        config: &VisualizeConfig,
    ) -> Result<Option<DisplayGrid>, MixError> {
        if slot >= SLOT_COUNT {
            return Err(MixError::InvalidParameter(format!(
                "input slot {slot} is out of range (0..{SLOT_COUNT})"
            )));
        }
        Ok(self
            .cache
            .spectrum(slot)
            .map(|spectrum| visualize::visualize(spectrum, kind, config)))
    }
}
