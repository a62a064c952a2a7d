//! Freeplay OpenAI Gateway
//!
//! Single-binary Rust service that:
//! 1. Loads a pool of Freeplay accounts from the configured sources
//! 2. Serves OpenAI-compatible chat completions and model listing
//! 3. Routes each completion through the current account, failing over on
//!    rejection and refreshing balances after every finished turn
//! 4. Exposes account management, health and Prometheus metrics routes

mod admin;
mod chat;
mod config;
mod error;
mod metrics;
mod openai;
mod state;
#[cfg(test)]
mod testing;
mod translate;
mod upstream;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use freeplay_client::{BillingClient, ChainStore, CompletionClient};
use freeplay_pool::{Pool, spawn_refresh_task};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::state::{AppState, DRAIN_TIMEOUT, ServiceMetrics};
use crate::upstream::Upstream;

/// Build the axum router with all routes and shared state.
///
/// `max_connections` bounds concurrently served requests.
fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(chat::chat_completions))
        .route("/v1/models", get(chat::list_models))
        .route("/accounts/status", get(admin::status))
        .route("/accounts/reload", post(admin::reload))
        .route("/accounts/update-balance", post(admin::update_balance))
        .route("/accounts/reset-disabled", post(admin::reset_disabled))
        .route("/config/status", get(admin::config_status))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting freeplay-openai-gateway");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus = metrics::install_recorder()?;

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        upstream_url = %config.server.upstream_url,
        timeout_secs = config.server.timeout_secs,
        refresh_interval_secs = config.refresh.interval_secs,
        "configuration loaded"
    );

    let timeout = Duration::from_secs(config.server.timeout_secs);
    let http = reqwest::Client::builder()
        .connect_timeout(timeout)
        .read_timeout(timeout)
        .build()
        .context("failed to build HTTP client")?;

    let store = Arc::new(ChainStore::new(config.accounts.sources()));
    let prober = Arc::new(BillingClient::with_base_url(
        http.clone(),
        config.server.upstream_url.clone(),
    ));
    let pool = Arc::new(
        Pool::load(store.clone(), prober)
            .await
            .context("failed to load accounts")?,
    );

    let stats = pool.stats().await;
    info!(
        total = stats.total,
        available = stats.available,
        total_balance = stats.total_balance,
        "account pool ready"
    );
    if stats.total == 0 {
        warn!("no accounts loaded, every completion will fail until accounts are added and reloaded");
    }

    // PORT wins; otherwise a port carried by the accounts document applies
    let mut listen_addr = config.server.listen_addr;
    if std::env::var("PORT").is_err()
        && let Some(port) = store.document_port().await
    {
        info!(port, "using port from accounts document");
        listen_addr.set_port(port);
    }
    let default_balance = match store.document_default_balance().await {
        Some(balance) if balance >= 0.0 && balance.is_finite() => balance,
        Some(balance) => {
            warn!(balance, "ignoring invalid default_balance in accounts document");
            config.accounts.default_balance
        }
        None => config.accounts.default_balance,
    };

    let refresh_task = (config.refresh.interval_secs > 0).then(|| {
        spawn_refresh_task(
            pool.clone(),
            Duration::from_secs(config.refresh.interval_secs),
        )
    });

    let metrics = ServiceMetrics::new();
    let completions = CompletionClient::with_base_url(http, config.server.upstream_url.clone());
    let app_state = AppState {
        upstream: Upstream::new(pool.clone(), completions),
        pool,
        store,
        port: listen_addr.port(),
        default_balance,
        metrics: metrics.clone(),
        prometheus,
    };

    let app = build_router(app_state, config.server.max_connections);

    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    // Clone in_flight counter for drain observability after shutdown
    let in_flight = metrics.in_flight.clone();

    // The drain timeout starts when the shutdown signal fires, not when the
    // server starts: notify the server to drain, then race it against the timeout.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    if let Some(task) = refresh_task {
        task.abort();
    }

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            let remaining = in_flight.load(Ordering::Relaxed);
            warn!(
                remaining,
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    info!("shutdown complete");
    Ok(())
}

/// Health endpoint: pool-derived status, uptime and request counters.
/// Returns 200 unless no account is usable (503).
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let health = state.pool.health().await;
    let status_code = if health.status == "unhealthy" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    let body = serde_json::json!({
        "status": health.status,
        "pool": health.pool,
        "uptime_seconds": state.metrics.started_at.elapsed().as_secs(),
        "requests_served": state.metrics.requests_total.load(Ordering::Relaxed),
        "errors_total": state.metrics.errors_total.load(Ordering::Relaxed),
        "in_flight": state.metrics.in_flight.load(Ordering::Relaxed),
    });

    (
        status_code,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus metrics endpoint: text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
