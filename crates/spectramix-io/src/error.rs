//! Error type for image I/O.

use spectramix_engine::MixError;

/// Errors that can occur while loading, adjusting, or saving images.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// Failed to encode the output image.
    #[error("failed to encode image: {0}")]
    ImageEncode(#[source] image::ImageError),

    /// Filesystem error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The output format could not be determined or is not supported.
    #[error("unsupported output format: {0}")]
    UnsupportedFormat(String),

    /// The engine rejected the image.
    #[error(transparent)]
    Engine(#[from] MixError),
}
