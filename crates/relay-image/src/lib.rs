//! Relay - Image
//!
//! Image-level protections for the replication engine, two independent
//! features behind one [`ImageGuard`]:
//!
//! - **Blocking**: a 64-bit DCT perceptual hash per image, matched against
//!   the store's blocked set within each entry's Hamming radius. Visually
//!   similar images (recompressed, resized, lightly edited) land within a few
//!   bits of each other.
//! - **Watermarking**: per-pair text rendered onto outgoing images before
//!   dispatch. Rendering failures leave the original image untouched and are
//!   never allowed to fail the dispatch.

mod error;
mod guard;
mod hash;
mod watermark;

pub use error::ImageError;
pub use guard::{BlockImageError, ImageGuard};
pub use hash::phash_bytes;
