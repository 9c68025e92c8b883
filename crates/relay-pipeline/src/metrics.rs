//! Pipeline metrics

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for the event pipeline
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    events_new: AtomicU64,
    events_edit: AtomicU64,
    events_delete: AtomicU64,
    copies_enqueued: AtomicU64,
    filtered: AtomicU64,
    images_blocked: AtomicU64,
    queue_overflow: AtomicU64,
    backpressure_rejected: AtomicU64,
    download_failures: AtomicU64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineSnapshot {
    pub events_new: u64,
    pub events_edit: u64,
    pub events_delete: u64,
    pub copies_enqueued: u64,
    pub filtered: u64,
    pub images_blocked: u64,
    pub queue_overflow: u64,
    pub backpressure_rejected: u64,
    pub download_failures: u64,
}

impl PipelineSnapshot {
    /// Total events observed
    pub fn events(&self) -> u64 {
        self.events_new + self.events_edit + self.events_delete
    }
}

impl PipelineMetrics {
    pub const fn new() -> Self {
        Self {
            events_new: AtomicU64::new(0),
            events_edit: AtomicU64::new(0),
            events_delete: AtomicU64::new(0),
            copies_enqueued: AtomicU64::new(0),
            filtered: AtomicU64::new(0),
            images_blocked: AtomicU64::new(0),
            queue_overflow: AtomicU64::new(0),
            backpressure_rejected: AtomicU64::new(0),
            download_failures: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_new(&self) {
        self.events_new.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_edit(&self) {
        self.events_edit.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_delete(&self) {
        self.events_delete.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_enqueued(&self) {
        self.copies_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_filtered(&self) {
        self.filtered.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_image_blocked(&self) {
        self.images_blocked.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_overflow(&self) {
        self.queue_overflow.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_backpressure(&self) {
        self.backpressure_rejected.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_download_failure(&self) {
        self.download_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            events_new: self.events_new.load(Ordering::Relaxed),
            events_edit: self.events_edit.load(Ordering::Relaxed),
            events_delete: self.events_delete.load(Ordering::Relaxed),
            copies_enqueued: self.copies_enqueued.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            images_blocked: self.images_blocked.load(Ordering::Relaxed),
            queue_overflow: self.queue_overflow.load(Ordering::Relaxed),
            backpressure_rejected: self.backpressure_rejected.load(Ordering::Relaxed),
            download_failures: self.download_failures.load(Ordering::Relaxed),
        }
    }
}
