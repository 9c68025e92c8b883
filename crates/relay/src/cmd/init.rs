//! Init command - write a starter configuration

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;

/// Init command arguments
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Where to write the config (defaults to relay.toml)
    #[arg(short, long, default_value = "relay.toml")]
    pub output: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

const TEMPLATE: &str = r#"# Relay configuration. Every key is optional; these are the defaults.

[server]
max_workers = 50
max_concurrent_downloads = 25
drain_timeout_secs = 15

[queue]
capacity = 50000

[retry]
base_seconds = 0.3
cap_seconds = 60.0
max_attempts = 3

[filter]
# Words blocked across every pair.
global_blocked_words = []

[image]
# Default Hamming radius for blocked-image matching.
similarity_threshold = 5

[store]
path = "relay.db"
retention_days = 30

[log]
level = "info"
json = false

[admin]
# Platform user ids allowed to use the admin surface. Empty disables it.
users = []

[http]
# Optional status endpoint (/healthz, /stats).
enabled = false
bind = "127.0.0.1:8080"
"#;

pub fn run(args: InitArgs) -> Result<()> {
    if args.output.exists() && !args.force {
        bail!(
            "{} already exists (use --force to overwrite)",
            args.output.display()
        );
    }
    std::fs::write(&args.output, TEMPLATE)
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    println!("wrote {}", args.output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_template_parses_to_defaults() {
        let config = relay_config::Config::from_str(TEMPLATE).unwrap();
        assert_eq!(config.server.max_workers, 50);
        assert_eq!(config.queue.capacity, 50_000);
        assert_eq!(config.store.path, "relay.db");
        assert!(!config.http.enabled);
    }

    #[test]
    fn test_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.toml");

        run(InitArgs {
            output: path.clone(),
            force: false,
        })
        .unwrap();
        assert!(run(InitArgs {
            output: path.clone(),
            force: false,
        })
        .is_err());
        assert!(run(InitArgs {
            output: path,
            force: true,
        })
        .is_ok());
    }
}
