//! spectramix-io: image sources and sinks for the spectramix engine.
//!
//! Decoding to grayscale, bringing inputs to a common size,
//! brightness/contrast edits, and PNG/JPEG output. The engine itself
//! never touches the filesystem; everything that does lives here.

pub mod adjust;
pub mod error;
pub mod load;
pub mod resize;
pub mod save;

pub use adjust::{BrightnessContrast, DEFAULT_BRIGHTNESS, DEFAULT_CONTRAST};
pub use error::IoError;
pub use load::{decode_grayscale, load_grayscale};
pub use resize::{ResizeFilter, common_dimensions, resize, unify_sizes};
pub use save::{OutputFormat, encode, encode_gray, save, save_gray};
