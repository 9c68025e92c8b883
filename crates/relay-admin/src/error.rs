//! Admin error types

use thiserror::Error;

/// Failures surfaced textually to the admin principal
#[derive(Debug, Error)]
pub enum AdminError {
    #[error(transparent)]
    Store(#[from] relay_store::StoreError),

    #[error("image error: {0}")]
    Image(#[from] relay_image::BlockImageError),

    #[error("unknown pair field: {0}")]
    UnknownField(String),

    #[error("invalid value for {field}: {value}")]
    BadValue { field: String, value: String },

    #[error("queue rejected task: {0}")]
    Enqueue(#[from] relay_dispatch::EnqueueError),

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("usage: {0}")]
    Usage(&'static str),
}

pub type Result<T> = std::result::Result<T, AdminError>;
