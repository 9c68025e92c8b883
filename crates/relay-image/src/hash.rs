//! Perceptual hashing
//!
//! 64-bit pHash-family fingerprint: the image's luminance is downsampled, a
//! DCT is taken, and each retained low-frequency coefficient contributes one
//! bit by its sign around the median. `image_hasher` implements exactly this
//! with DCT preprocessing over an 8x8 hash.

use image::DynamicImage;
use image_hasher::{HashAlg, HasherConfig};

use crate::error::ImageError;

/// Hasher configuration used everywhere a hash is computed
///
/// All entries in the blocked set were produced with this configuration;
/// changing it invalidates every stored hash.
pub(crate) fn hasher_config() -> HasherConfig {
    HasherConfig::new()
        .hash_alg(HashAlg::Mean)
        .preproc_dct()
        .hash_size(8, 8)
}

/// 64-bit perceptual hash of a decoded image
pub(crate) fn phash(img: &DynamicImage) -> u64 {
    let hash = hasher_config().to_hasher().hash_image(img);
    let mut bytes = [0u8; 8];
    for (dst, src) in bytes.iter_mut().zip(hash.as_bytes()) {
        *dst = *src;
    }
    u64::from_be_bytes(bytes)
}

/// Decode `bytes` and hash
pub fn phash_bytes(bytes: &[u8]) -> Result<u64, ImageError> {
    let img = image::load_from_memory(bytes).map_err(ImageError::Decode)?;
    Ok(phash(&img))
}
