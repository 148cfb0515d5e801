//! Versioned per-slot image and spectrum cache.
//!
//! [`SpectrumCache`] is the single writer for the four input slots.
//! Loading an image replaces the slot's entry with a fresh
//! [`CachedImage`] carrying a new version number; the old entry, and any
//! spectrum computed for it, simply stops being referenced by the cache.
//!
//! Jobs never read the cache directly. They receive a [`MixInputs`]
//! snapshot (a handful of `Arc` clones) taken at submission time, so a
//! job in flight keeps computing against the images it was submitted
//! with even if the owner loads a new image in the meantime.

use std::sync::{Arc, OnceLock};

use log::debug;

use crate::spectrum::{self, SpectrumData};
use crate::types::{Dimensions, GrayscaleImage, MixError, SLOT_COUNT};

/// An input image together with its lazily computed spectrum.
#[derive(Debug)]
pub struct CachedImage {
    image: GrayscaleImage,
    version: u64,
    spectrum: OnceLock<SpectrumData>,
}

impl CachedImage {
    /// Wrap an image loaded as `version` of its slot.
    #[must_use]
    pub const fn new(image: GrayscaleImage, version: u64) -> Self {
        Self {
            image,
            version,
            spectrum: OnceLock::new(),
        }
    }

    /// The source image.
    #[must_use]
    pub const fn image(&self) -> &GrayscaleImage {
        &self.image
    }

    /// Slot version this entry was created with.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// The forward transform of the image, computed on first use.
    pub fn spectrum(&self) -> &SpectrumData {
        self.spectrum.get_or_init(|| {
            debug!(
                "computing spectrum for {} image (version {})",
                self.image.dimensions(),
                self.version,
            );
            spectrum::transform(&self.image)
        })
    }

    /// Whether the spectrum has already been computed.
    #[must_use]
    pub fn has_spectrum(&self) -> bool {
        self.spectrum.get().is_some()
    }
}

/// An immutable view of the input slots, taken at submission time.
#[derive(Debug, Clone, Default)]
pub struct MixInputs {
    slots: [Option<Arc<CachedImage>>; SLOT_COUNT],
}

impl MixInputs {
    /// Build inputs from loose images, without any caching.
    #[must_use]
    pub fn from_images(images: &[Option<&GrayscaleImage>; SLOT_COUNT]) -> Self {
        Self {
            slots: std::array::from_fn(|slot| {
                images[slot].map(|image| Arc::new(CachedImage::new(image.clone(), 0)))
            }),
        }
    }

    /// The entry in `slot`, if any.
    #[must_use]
    pub fn get(&self, slot: usize) -> Option<&CachedImage> {
        self.slots.get(slot).and_then(Option::as_deref)
    }

    /// Occupied slots with their entries.
    pub fn present(&self) -> impl Iterator<Item = (usize, &CachedImage)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, entry)| entry.as_deref().map(|e| (slot, e)))
    }

    /// Returns `true` if no slot is occupied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Common size of every present image.
    ///
    /// # Errors
    ///
    /// Returns [`MixError::EmptyInput`] if no image is present and
    /// [`MixError::DimensionMismatch`] if two images differ in size.
    pub fn dimensions(&self) -> Result<Dimensions, MixError> {
        let mut present = self.present().map(|(_, entry)| entry.image.dimensions());
        let expected = present.next().ok_or(MixError::EmptyInput)?;
        if let Some(found) = present.find(|&d| d != expected) {
            return Err(MixError::DimensionMismatch { expected, found });
        }
        Ok(expected)
    }
}

/// Owner of the four input slots.
#[derive(Debug, Default)]
pub struct SpectrumCache {
    slots: [Option<Arc<CachedImage>>; SLOT_COUNT],
    versions: [u64; SLOT_COUNT],
}

impl SpectrumCache {
    /// An empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `image` into `slot`, invalidating any cached spectrum.
    ///
    /// Returns the slot's new version number.
    ///
    /// # Errors
    ///
    /// Returns [`MixError::InvalidParameter`] if `slot >= SLOT_COUNT`.
    pub fn set_image(&mut self, slot: usize, image: GrayscaleImage) -> Result<u64, MixError> {
        let slot = check_slot(slot)?;
        self.versions[slot] += 1;
        let version = self.versions[slot];
        debug!(
            "slot {slot}: loaded {} image as version {version}",
            image.dimensions()
        );
        self.slots[slot] = Some(Arc::new(CachedImage::new(image, version)));
        Ok(version)
    }

    /// Empty `slot`.
    ///
    /// # Errors
    ///
    /// Returns [`MixError::InvalidParameter`] if `slot >= SLOT_COUNT`.
    pub fn clear(&mut self, slot: usize) -> Result<(), MixError> {
        let slot = check_slot(slot)?;
        if self.slots[slot].take().is_some() {
            self.versions[slot] += 1;
            debug!("slot {slot}: cleared");
        }
        Ok(())
    }

    /// Image currently loaded in `slot`.
    #[must_use]
    pub fn image(&self, slot: usize) -> Option<&GrayscaleImage> {
        self.entry(slot).map(CachedImage::image)
    }

    /// Spectrum of the image in `slot`, computing it if needed.
    #[must_use]
    pub fn spectrum(&self, slot: usize) -> Option<&SpectrumData> {
        self.entry(slot).map(CachedImage::spectrum)
    }

    /// Version of the entry currently loaded in `slot`.
    #[must_use]
    pub fn version(&self, slot: usize) -> Option<u64> {
        self.entry(slot).map(CachedImage::version)
    }

    /// Snapshot of every slot for a job.
    #[must_use]
    pub fn snapshot(&self) -> MixInputs {
        MixInputs {
            slots: self.slots.clone(),
        }
    }

    fn entry(&self, slot: usize) -> Option<&CachedImage> {
        self.slots.get(slot).and_then(Option::as_deref)
    }
}

fn check_slot(slot: usize) -> Result<usize, MixError> {
    if slot < SLOT_COUNT {
        Ok(slot)
    } else {
        Err(MixError::InvalidParameter(format!(
            "input slot {slot} is out of range (0..{SLOT_COUNT})"
        )))
    }
}
