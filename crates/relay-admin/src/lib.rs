//! Relay - Admin
//!
//! The administrative operations surface. Each operation maps 1:1 onto a
//! command verb of the external shell; the shell itself (chat bot, CLI,
//! whatever) stays a thin translation layer on top of [`AdminApi`].
//!
//! Errors surface as text to the invoking principal and never touch the
//! replication path.

mod api;
mod commands;
mod error;

pub use api::{AdminApi, QueueReport, SenderClientFactory, StatusReport, TestFilterResult};
pub use commands::Command;
pub use error::{AdminError, Result};
