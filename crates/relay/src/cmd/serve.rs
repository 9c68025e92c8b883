//! Serve command - run the replication engine
//!
//! Wires the components together: store, filter engine, image guard, sender
//! pool, dispatcher, pipeline, health monitor, subscription sweeper and the
//! optional status endpoint, then waits for a shutdown signal and drains.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use relay_admin::{AdminApi, SenderClientFactory};
use relay_config::Config;
use relay_dispatch::{Dispatcher, DispatcherConfig, SenderPool};
use relay_filter::FilterEngine;
use relay_health::{HealthMonitor, SubscriptionSweeper};
use relay_image::ImageGuard;
use relay_pipeline::Pipeline;
use relay_protocol::{Sender, SourceListener};
use relay_store::{SenderRecord, Store};

use crate::adapters::{ConsoleSender, StdinListener};
use crate::http;

/// Size of the listener -> pipeline event channel
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Serve command arguments
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Path to configuration file (defaults to relay.toml if present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Run the serve command
pub async fn run(args: ServeArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    init_tracing(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        platform = std::env::consts::OS,
        workers = config.server.max_workers,
        queue_capacity = config.queue.capacity,
        "relay starting"
    );

    run_server(config).await?;

    info!("relay shutdown complete");
    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config = match path {
        Some(path) => {
            anyhow::ensure!(
                path.exists(),
                "config file not found: {}\n\nTo create a default config, run: relay init",
                path.display()
            );
            Config::from_file(path).context("failed to load configuration")?
        }
        None => {
            let default_paths = [PathBuf::from("relay.toml"), PathBuf::from("configs/relay.toml")];
            let mut loaded = None;
            for candidate in &default_paths {
                if candidate.exists() {
                    loaded =
                        Some(Config::from_file(candidate).context("failed to load configuration")?);
                    break;
                }
            }
            loaded.unwrap_or_default()
        }
    };
    Ok(config.apply_env())
}

fn init_tracing(config: &Config) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log.level.clone()));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run_server(config: Config) -> Result<()> {
    let cancel = CancellationToken::new();

    // ---- storage and policy ---------------------------------------------
    let store = Arc::new(Store::open(&config.store.path)?);
    store.seed_global_words(&config.filter.global_blocked_words)?;

    let filter = Arc::new(FilterEngine::new());
    let images = Arc::new(ImageGuard::new(
        store.clone(),
        config.image.similarity_threshold,
    ));
    if !images.watermark_available() {
        warn!("no system font found, watermarking will pass images through");
    }

    // ---- senders ---------------------------------------------------------
    // Platform adapters slot in here; the built-in factory narrates to the
    // log so the engine is runnable end-to-end without platform credentials.
    let sender_factory: SenderClientFactory = Arc::new(|record: &SenderRecord| {
        Arc::new(ConsoleSender::new(record.display_handle.clone())) as Arc<dyn Sender>
    });

    let pool = Arc::new(SenderPool::new());
    for record in store.list_senders(true)? {
        let client = sender_factory(&record);
        pool.register(record.id, record.display_handle.clone(), client);
    }
    if pool.is_empty() {
        warn!("no enabled senders registered; tasks will queue until one is added");
    }

    // ---- dispatch --------------------------------------------------------
    let dispatcher = Dispatcher::new(
        DispatcherConfig {
            queue_capacity: config.queue.capacity,
            max_attempts: config.retry.max_attempts,
            retry_base: config.retry.base(),
            retry_cap: config.retry.cap(),
            drain_timeout: Duration::from_secs(config.server.drain_timeout_secs),
            lock_shards: 1024,
        },
        pool.clone(),
        store.clone(),
    );

    // ---- pipeline --------------------------------------------------------
    let listener: Arc<dyn SourceListener> = Arc::new(StdinListener);
    let paused = Arc::new(AtomicBool::new(store.is_paused()?));
    if paused.load(Ordering::Relaxed) {
        warn!("starting paused (resume via the admin surface)");
    }

    let pipeline = Arc::new(Pipeline::new(
        store.clone(),
        filter.clone(),
        images.clone(),
        dispatcher.clone(),
        listener.clone(),
        config.server.max_concurrent_downloads,
        paused.clone(),
    ));

    // ---- health ----------------------------------------------------------
    let monitor = Arc::new(HealthMonitor::new(
        dispatcher.clone(),
        pipeline.clone(),
        Duration::from_secs(10),
    ));
    let sweeper = Arc::new(SubscriptionSweeper::new(store.clone(), pool.clone()));

    let admin = Arc::new(AdminApi::new(
        store.clone(),
        filter,
        images,
        dispatcher.clone(),
        monitor.clone(),
        pipeline.clone(),
        paused,
        Some(sender_factory),
        config.image.similarity_threshold,
        config.store.retention_days,
    ));

    // ---- task spawn ------------------------------------------------------
    let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let mut tasks: Vec<(&str, JoinHandle<()>)> = Vec::new();

    {
        let listener = listener.clone();
        let cancel = cancel.clone();
        tasks.push((
            "listener",
            tokio::spawn(async move {
                if let Err(err) = listener.run(event_tx, cancel).await {
                    warn!(error = %err, "listener stopped with error");
                }
            }),
        ));
    }
    tasks.push((
        "pipeline",
        tokio::spawn(pipeline.clone().run(event_rx, cancel.clone())),
    ));
    tasks.push((
        "dispatcher",
        tokio::spawn(
            dispatcher
                .clone()
                .run(config.server.max_workers, cancel.clone()),
        ),
    ));
    tasks.push(("probes", tokio::spawn(pool.clone().run_probes(cancel.clone()))));
    tasks.push(("monitor", tokio::spawn(monitor.clone().run(cancel.clone()))));
    tasks.push(("sweeper", tokio::spawn(sweeper.run(cancel.clone()))));

    if config.http.enabled {
        let state = http::AppState {
            admin: admin.clone(),
            monitor: monitor.clone(),
        };
        let bind = config.http.bind.clone();
        let cancel = cancel.clone();
        tasks.push((
            "http",
            tokio::spawn(async move {
                if let Err(err) = http::serve(&bind, state, cancel).await {
                    warn!(error = %err, "status endpoint stopped with error");
                }
            }),
        ));
    }

    info!("relay running, press Ctrl-C to stop");
    wait_for_shutdown().await;
    info!("shutdown signal received");
    cancel.cancel();

    // The dispatcher drains internally; give every task the same grace.
    let grace = Duration::from_secs(config.server.drain_timeout_secs + 5);
    for (name, task) in tasks {
        match tokio::time::timeout(grace, task).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(task = name, error = %err, "task panicked during shutdown"),
            Err(_) => warn!(task = name, "task did not stop within the grace period"),
        }
    }

    if let Err(err) = store.backup() {
        warn!(error = %err, "final backup failed");
    }

    Ok(())
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        let mut term = signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
    }
}
