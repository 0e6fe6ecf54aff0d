// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Waitlist Submission Gate Service
//!
//! ## Configuration
//!
//! Configuration is loaded from environment variables (a `.env` file is
//! read first if present):
//!
//! - `BIND_ADDR`: Server bind address (default: 0.0.0.0:8080)
//! - `SUPABASE_URL`, `SUPABASE_SERVICE_ROLE_KEY`: record store credentials.
//!   Without them the service starts but rejects every submission.
//! - `RATE_LIMIT_MAX_REQUESTS`: accepted calls per window (default: 5)
//! - `RATE_LIMIT_WINDOW_SECS`: window length (default: 900)
//! - `TRUST_FORWARDED_HEADERS`: key clients by `x-forwarded-for` first.
//!   Only set this behind a proxy that overwrites the header.
//! - `ALLOWED_ORIGINS`: comma-separated CORS origins
//! - `RUST_LOG`: log filter (default: info)

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use waitlist_gate::{
    clock::{Clock, SystemClock},
    config::Config,
    gate::SubmissionGate,
    handlers::{router, AppState},
    limiter::RateLimiter,
    metrics::Metrics,
    store::{PostgrestStore, RecordStore},
    validator::SubmissionValidator,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let config = Config::from_env();
    info!(
        bind_addr = %config.bind_addr,
        max_requests = config.rate_limit.max_requests,
        window_secs = config.rate_limit.window_secs,
        trust_forwarded_headers = config.client_ip.trust_forwarded_headers,
        "Starting waitlist gate"
    );

    let store: Option<Arc<dyn RecordStore>> = match PostgrestStore::from_config(&config.store)? {
        Some(store) => {
            info!(endpoint = %store.endpoint(), "Record store configured");
            Some(Arc::new(store) as Arc<dyn RecordStore>)
        }
        None => {
            error!(
                missing = ?config.store.missing_credentials(),
                "Record store credentials missing, submissions will be refused"
            );
            None
        }
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let metrics = Arc::new(Metrics::new());
    let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone(), clock.clone()));
    let sweeper = limiter.spawn_sweeper(metrics.clone());

    let gate = SubmissionGate::new(
        limiter,
        SubmissionValidator::new(config.validation.clone()),
        store,
        config.store.clone(),
        clock,
        metrics.clone(),
    );

    let state = Arc::new(AppState {
        gate,
        metrics,
        config: config.clone(),
    });
    let app = router(state);

    // Start server
    let addr: SocketAddr = config.bind_addr.parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    sweeper.shutdown().await;
    info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
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
                error!(error = %e, "Failed to listen for SIGTERM");
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
