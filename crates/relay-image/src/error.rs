//! Image processing error types

use thiserror::Error;

/// Image decode/encode failures
#[derive(Debug, Error)]
pub enum ImageError {
    /// The payload is not a decodable image
    #[error("failed to decode image: {0}")]
    Decode(#[source] image::ImageError),

    /// Re-encoding the processed image failed
    #[error("failed to encode image: {0}")]
    Encode(#[source] image::ImageError),

    /// No usable font face was found for watermark rendering
    #[error("no watermark font available")]
    NoFont,
}
