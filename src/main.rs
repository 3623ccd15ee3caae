mod adapters;
mod application;
mod config;
mod domain;
mod interface;
mod ports;

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use adapters::{DockerCollector, InMemoryMetricsRepository, ProcfsAdapter, ProcfsConfig, ServicesCollector};
use application::{
    Broadcaster, ConnectionLimits, ConnectionTracker, MessageRateLimiter, MonitoringService,
    RateLimit, ScheduledTask, Scheduler,
};
use config::Config;
use interface::http::{create_router, AppState};
use interface::ws::WsSettings;
use ports::{Collector, MetricStore};

const RATE_LIMIT_CLEANUP_PERIOD: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> ExitCode {
    // Load configuration
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            for field in e.fields() {
                eprintln!("  {}", field);
            }
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("pulsedash={},tower_http=info", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Fatal: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("🚀 Starting pulsedash v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration: {:?}", config);

    // Repository -> Broadcaster -> Scheduler -> Transport
    let store: Arc<dyn MetricStore> = Arc::new(InMemoryMetricsRepository::new(config.history_max_points));
    let broadcaster = Broadcaster::new();

    let scheduler = Arc::new(
        collectors(&config)
            .into_iter()
            .fold(Scheduler::new(Arc::clone(&store), broadcaster.clone()), |scheduler, collector| {
                let period = config.intervals.for_kind(collector.kind());
                scheduler.with_task(ScheduledTask::new(collector, period))
            })
            .with_collect_timeout(config.collector_timeout),
    );

    info!(max_points = store.max_points(), "History buffers ready");
    for task in scheduler.tasks() {
        info!(kind = %task.kind(), period_ms = task.period().as_millis() as u64, "Scheduled collector");
    }

    let monitoring_service = Arc::new(MonitoringService::new(Arc::clone(&store), broadcaster));

    let rate_limiter = Arc::new(MessageRateLimiter::new(RateLimit {
        max_messages: config.message_rate_limit,
        window: config.message_rate_window,
    }));
    let ws = Arc::new(WsSettings {
        tracker: Arc::new(ConnectionTracker::new(ConnectionLimits {
            max_connections: config.max_connections,
            max_connections_per_origin: config.max_connections_per_ip,
        })),
        rate_limiter: Arc::clone(&rate_limiter),
        max_message_size: config.max_message_size,
        max_payload: config.ws_max_payload,
        trust_proxy: config.trust_proxy,
    });

    let report = scheduler.start().await?;
    if report.failed.is_empty() {
        info!("✓ Initial collection complete ({} collectors)", report.total);
    } else {
        warn!(failed = ?report.failed, "⚠ Initial collection finished with failures");
    }

    let cleanup = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(RATE_LIMIT_CLEANUP_PERIOD);
        loop {
            ticker.tick().await;
            let purged = rate_limiter.cleanup();
            if purged > 0 {
                debug!(purged, remaining = rate_limiter.tracked_clients(), "Expired rate limit windows removed");
            }
        }
    });

    // Create HTTP server
    let app = create_router(
        AppState {
            monitoring_service,
            ws,
        },
        &config.static_dir,
    );
    let addr = config.bind_addr();
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            scheduler.stop().await;
            return Err(e.into());
        }
    };

    info!("✓ pulsedash listening on {}", addr);
    info!("  → Dashboard: http://localhost:{}", config.port);
    info!("  → Stream: ws://localhost:{}/ws", config.port);

    let served = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await;

    cleanup.abort();
    scheduler.stop().await;
    info!("Shutdown complete");

    served.map_err(Into::into)
}

/// One collector per metric kind. Docker is skipped when no client can be built.
fn collectors(config: &Config) -> Vec<Arc<dyn Collector>> {
    let procfs = ProcfsAdapter::new(ProcfsConfig::new(config.proc_path.clone(), config.sys_path.clone()));
    let mut collectors = procfs.collectors();

    match DockerCollector::new() {
        Ok(docker) => {
            info!("✓ Docker client configured");
            collectors.push(Arc::new(docker));
        }
        Err(e) => warn!("⚠ Docker unavailable: {}. Container monitoring disabled.", e),
    }

    collectors.push(Arc::new(ServicesCollector::new(config.services.clone())));
    collectors
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
