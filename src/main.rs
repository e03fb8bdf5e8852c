//! Relay - Entry Point
//!
//! Starts the pool scheduler and the API server with graceful shutdown support.

use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinError;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use relay::api::{ApiServer, AppState};
use relay::config::{Config, LogConfig};
use relay::proxy::{
    ForwardingEngine, HttpProxySource, LogAlertSink, PoolScheduler, ProxyPool, ProxyPoolConfig,
    ProxySource, ReqwestExecutor, SchedulerHandle, StaticProxySource, TcpProbe, TransportConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    init_tracing(&config.log);

    info!("Starting Relay v{}", env!("CARGO_PKG_VERSION"));

    let alerts = Arc::new(LogAlertSink);
    let pool = Arc::new(ProxyPool::with_parts(
        ProxyPoolConfig::from(&config.pool),
        Arc::new(TcpProbe),
        alerts.clone(),
    ));

    let source: Arc<dyn ProxySource> = match &config.pool.provider_url {
        Some(url) => {
            info!("Using proxy provider {}", url);
            Arc::new(HttpProxySource::new(url.clone(), config.forward.read_timeout)?)
        }
        None => {
            if config.pool.static_proxies.is_empty() {
                warn!("No proxy source configured, all traffic will go direct");
            }
            Arc::new(StaticProxySource::from_addrs(config.pool.static_proxies.as_slice())?)
        }
    };

    let executor = ReqwestExecutor::new(TransportConfig {
        connect_timeout: config.forward.connect_timeout,
        read_timeout: config.forward.read_timeout,
    })?;
    let engine = Arc::new(ForwardingEngine::with_alerts(
        pool.clone(),
        Arc::new(executor),
        alerts,
        config.forward.clone(),
    ));

    let scheduler = Arc::new(PoolScheduler::new(
        pool,
        source,
        config.pool.fetch_interval,
        config.pool.health_check_interval,
    ));

    // Start pool scheduler
    let (scheduler_handle, scheduler_shutdown) = SchedulerHandle::new();
    let scheduler_task = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move {
            scheduler.run(scheduler_shutdown).await;
        })
    };

    // Start API server
    let (shutdown_tx, api_shutdown) = watch::channel(false);
    let api_server = ApiServer::new(config.api.clone(), AppState::new(engine, scheduler));
    let api_task = tokio::spawn(async move {
        if let Err(e) = api_server.run(api_shutdown).await {
            error!("API server error: {}", e);
        }
    });

    info!("API listening on {}", config.api_addr());

    shutdown_signal().await;
    info!("Shutdown signal received");

    let _ = shutdown_tx.send(true);
    scheduler_handle.shutdown();

    let (api_result, scheduler_result) = tokio::join!(api_task, scheduler_task);
    report_task("API server", api_result);
    report_task("Pool scheduler", scheduler_result);

    info!("Relay stopped");
    Ok(())
}

/// Log a task that panicked or was cancelled; returns whether it finished cleanly
fn report_task(name: &str, result: Result<(), JoinError>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            error!("{} task failed: {}", name, e);
            false
        }
    }
}

fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("relay={},tower_http=debug", log.level).into());

    let json = log.format.eq_ignore_ascii_case("json");
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(|| fmt::layer()))
        .init();
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
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
}
