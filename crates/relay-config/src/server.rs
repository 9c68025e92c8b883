//! Server, admin, and status-endpoint sections

use serde::Deserialize;

/// Worker pool and shutdown settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Dispatcher worker count
    /// Default: 50
    pub max_workers: usize,

    /// Concurrent media downloads across all workers
    /// Default: 25
    pub max_concurrent_downloads: usize,

    /// Seconds to drain the queue on shutdown before abandoning tasks
    /// Default: 15
    pub drain_timeout_secs: u64,

    /// Milliseconds the event loop may wait on a full queue before dropping
    /// Default: 50
    pub enqueue_wait_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_workers: 50,
            max_concurrent_downloads: 25,
            drain_timeout_secs: 15,
            enqueue_wait_ms: 50,
        }
    }
}

/// Admin surface access control
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Principals allowed to invoke admin operations (platform user ids)
    pub users: Vec<i64>,
}

impl AdminConfig {
    /// Whether `user` may invoke admin operations
    ///
    /// An empty list means the surface is disabled entirely, not open.
    pub fn is_admin(&self, user: i64) -> bool {
        self.users.contains(&user)
    }
}

/// Optional HTTP status endpoint
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Whether to serve /healthz and /stats
    /// Default: false
    pub enabled: bool,

    /// Bind address
    /// Default: "127.0.0.1:8080"
    pub bind: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind: "127.0.0.1:8080".into(),
        }
    }
}
