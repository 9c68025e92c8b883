//! The image guard
//!
//! Thin orchestration over hashing, the store's blocked set, and the
//! watermark renderer. One guard is shared by the pipeline and the admin
//! surface.

use std::sync::Arc;

use relay_protocol::PairId;
use relay_store::{BlockedImage, Store};

use crate::error::ImageError;
use crate::hash::phash;
use crate::watermark::WatermarkRenderer;

pub struct ImageGuard {
    store: Arc<Store>,
    renderer: WatermarkRenderer,
    default_threshold: u32,
}

impl ImageGuard {
    /// Build a guard, probing the system for a watermark font
    pub fn new(store: Arc<Store>, default_threshold: u32) -> Self {
        Self {
            store,
            renderer: WatermarkRenderer::discover(),
            default_threshold,
        }
    }

    /// Whether watermarking can actually render
    pub fn watermark_available(&self) -> bool {
        self.renderer.is_available()
    }

    /// Hash `bytes`, failing only on undecodable payloads
    pub fn hash(&self, bytes: &[u8]) -> Result<u64, ImageError> {
        let img = image::load_from_memory(bytes).map_err(ImageError::Decode)?;
        Ok(phash(&img))
    }

    /// Check an image against the blocked set for `pair`
    ///
    /// Returns the matched entry when blocked (its usage counter is bumped),
    /// `None` when the image is clean. Undecodable payloads are treated as
    /// clean: a corrupt image is the destination's problem, not a block.
    pub fn check(&self, bytes: &[u8], pair: PairId) -> Option<BlockedImage> {
        let hash = match self.hash(bytes) {
            Ok(h) => h,
            Err(err) => {
                tracing::warn!(pair = %pair, error = %err, "skipping image check");
                return None;
            }
        };

        let entry = self.store.lookup_blocked(hash, pair)?;
        tracing::debug!(
            pair = %pair,
            entry = entry.id,
            phash = %format!("{hash:016x}"),
            "image blocked"
        );
        if let Err(err) = self.store.bump_image_usage(entry.id) {
            tracing::warn!(entry = entry.id, error = %err, "failed to bump image usage");
        }
        Some(entry)
    }

    /// Block the image in `bytes` for `pair` (or globally when `None`)
    pub fn block(
        &self,
        bytes: &[u8],
        pair: Option<PairId>,
        threshold: Option<u32>,
        note: &str,
    ) -> Result<BlockedImage, BlockImageError> {
        let hash = self.hash(bytes)?;
        let threshold = threshold.unwrap_or(self.default_threshold);
        Ok(self.store.block_image(hash, pair, threshold, note)?)
    }

    /// Watermark `bytes` with `text`, returning the bytes to dispatch
    ///
    /// Any failure (no font, undecodable image, encode error) logs a warning
    /// and hands back the original bytes; dispatch always proceeds.
    pub fn watermark(&self, bytes: Vec<u8>, text: &str) -> Vec<u8> {
        match self.renderer.render(&bytes, text) {
            Ok(rendered) => rendered,
            Err(err) => {
                tracing::warn!(error = %err, "watermark failed, sending original image");
                bytes
            }
        }
    }
}

/// Failure to add a block entry: bad image or store trouble
#[derive(Debug, thiserror::Error)]
pub enum BlockImageError {
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error(transparent)]
    Store(#[from] relay_store::StoreError),
}
