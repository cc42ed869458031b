//! Counter POS order core.
//!
//! Cart building, pricing, the PLACED → PREPARING → READY → COLLECTED order
//! lifecycle, persistence (SQLite or local JSON files), real-time order
//! notifications (push or poll), the outlet profile and kitchen/customer
//! tickets. `PosService` ties these together; `commands` exposes them to a
//! JSON front end.

use anyhow::Context;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod cart;
pub mod commands;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod kitchen;
pub mod lifecycle;
pub mod menu;
pub mod models;
pub mod outlet;
pub mod pricing;
pub mod realtime;
pub mod retry;
pub mod service;
pub mod store;
pub mod summary;
pub mod tickets;

pub use cart::{Cart, CartLine};
pub use config::{LoadReport, PosConfig, StorageBackend, TransportMode};
pub use error::{PosError, PosResult};
pub use lifecycle::Transition;
pub use models::{Category, MenuItem, Order, OrderItem, OrderStatus, PaymentMethod};
pub use outlet::{OutletPatch, OutletProfile};
pub use pricing::Totals;
pub use realtime::{BoardChange, OrderBoard, OrderEvent, Scope, Subscription};
pub use service::PosService;

const DEFAULT_LOG_FILTER: &str = "info,counter_pos_lib=debug";

fn init_logging(config: &PosConfig) -> anyhow::Result<tracing_appender::non_blocking::WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(config.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER))
    });

    let log_dir = config.log_dir();
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("create log dir {}", log_dir.display()))?;
    // Prune before the appender opens today's file.
    let pruned = diagnostics::prune_old_logs(&log_dir, diagnostics::MAX_LOG_FILES);

    let file_appender = tracing_appender::rolling::daily(&log_dir, diagnostics::LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
    let console_layer = fmt::layer().with_target(true);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("install tracing subscriber")?;

    if pruned > 0 {
        info!(pruned, "Removed old log files");
    }
    Ok(guard)
}

/// Run the counter until Ctrl-C: open the store, start the kitchen ticket
/// spooler and keep notifications flowing.
pub fn run() -> anyhow::Result<()> {
    let (config, load_report) = PosConfig::load().context("load configuration")?;
    // Dropping the guard flushes buffered log lines, so it lives for all of run().
    let _log_guard = init_logging(&config)?;
    if let Some(file) = &load_report.file {
        info!(path = %file.display(), "Loaded config file");
    }
    for warning in &load_report.warnings {
        warn!("Config: {warning}");
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        git_sha = env!("BUILD_GIT_SHA"),
        built = env!("BUILD_TIMESTAMP"),
        "Starting Counter POS"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("counter-pos")
        .build()
        .context("build tokio runtime")?;

    runtime.block_on(async {
        let service = Arc::new(PosService::open(&config).context("open POS service")?);
        let cancel = CancellationToken::new();
        let kitchen = kitchen::start_kitchen_worker(service.clone(), config.spool_dir(), cancel.clone());

        info!(
            about = %diagnostics::about_info(&config),
            outlet = %service.outlet().name,
            "Counter POS running, press Ctrl-C to stop"
        );
        tokio::signal::ctrl_c()
            .await
            .context("wait for shutdown signal")?;

        info!("Shutdown requested");
        cancel.cancel();
        if let Err(e) = kitchen.await {
            warn!(error = %e, "Kitchen worker ended abnormally");
        }
        Ok::<(), anyhow::Error>(())
    })?;

    info!("Counter POS stopped");
    Ok(())
}
