//! vcenter-exporter
//!
//! Republishes vCenter per-VM performance counters as Prometheus gauges.

use anyhow::Context;
use clap::Parser;
use prometheus::Registry;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::level_filters::LevelFilter;
use tracing::{error, info, warn};

use vcenter_exporter::annotation::AnnotationFilter;
use vcenter_exporter::cli::Args;
use vcenter_exporter::config::{resolve_config, validate_effective_config, Config};
use vcenter_exporter::handlers;
use vcenter_exporter::health_stats::HealthStats;
use vcenter_exporter::inventory::NameShortener;
use vcenter_exporter::poller::{Poller, PollerSettings};
use vcenter_exporter::state::AppState;
use vcenter_exporter::vsphere::{ManagementApi, VsphereClient};

fn parse_log_level(level: Option<&str>) -> LevelFilter {
    match level.map(str::to_ascii_lowercase).as_deref() {
        Some("off") => LevelFilter::OFF,
        Some("error") => LevelFilter::ERROR,
        Some("warn") | Some("warning") => LevelFilter::WARN,
        Some("debug") => LevelFilter::DEBUG,
        Some("trace") => LevelFilter::TRACE,
        _ => LevelFilter::INFO,
    }
}

/// Initializes tracing with the level from `main.log`.
fn setup_logging(config: &Config) -> anyhow::Result<()> {
    let level = parse_log_level(config.main.log.as_deref());

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    info!("Logging initialized with level: {}", level);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match resolve_config(&args).and_then(|c| {
        validate_effective_config(&c)?;
        Ok(c)
    }) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    setup_logging(&config)?;
    let main_cfg = &config.main;

    info!(
        "Starting vcenter-exporter {} for {}",
        env!("CARGO_PKG_VERSION"),
        main_cfg.host()
    );

    let shortener = NameShortener::new(main_cfg.strip_pattern.as_deref())
        .context("invalid main.strip_pattern")?;
    let filter = AnnotationFilter::new(main_cfg.annotation_marker())
        .context("invalid main.annotation_marker")?;
    let settings = PollerSettings::from_config(main_cfg, &shortener);

    // Connect
    let client = Arc::new(VsphereClient::new(main_cfg).context("failed to build vCenter client")?);
    if let Err(e) = client.login().await {
        error!("Couldn't connect to {}: {}", main_cfg.host(), e);
        return Err(e).context("vCenter connection failed");
    }
    info!("Connected to {}", main_cfg.host());

    // Discover counters and register gauges
    let registry = Registry::new();
    let health_stats = Arc::new(HealthStats::new());
    let api: Arc<dyn ManagementApi> = client.clone();
    let poller = match Poller::start(
        api,
        settings.clone(),
        filter,
        shortener,
        registry.clone(),
        health_stats.clone(),
    )
    .await
    {
        Ok(p) => p,
        Err(e) => {
            error!("Startup failed: {}", e);
            if let Err(e) = client.logout().await {
                warn!("Logout failed: {}", e);
            }
            return Err(e).context("counter discovery failed");
        }
    };

    let state = Arc::new(AppState {
        registry,
        health_stats,
        vcenter_name: settings.vcenter_name.clone(),
        start_time: Instant::now(),
    });

    let addr: SocketAddr = format!("{}:{}", main_cfg.bind(), main_cfg.listen_port())
        .parse()
        .context("invalid listen address")?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("vcenter-exporter listening on http://{}", addr);

    let server = axum::serve(listener, handlers::router(state));

    let result = tokio::select! {
        result = server => {
            result.map_err(|e| {
                error!("Server error: {}", e);
                anyhow::Error::from(e)
            })
        }
        _ = poller.run() => Ok(()),
        _ = shutdown_signal() => {
            info!("Shutdown signal received, exiting...");
            Ok(())
        }
    };

    if let Err(e) = client.logout().await {
        warn!("Logout failed: {}", e);
    }

    info!("vcenter-exporter stopped gracefully");
    result
}
