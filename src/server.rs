//! Listener setup and graceful shutdown.
//!
//! Plain HTTP through `axum::serve`, or mutual TLS through `axum-server`
//! when certificate, key and CA paths are all configured.

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use axum_server::Handle;
use axum_server::tls_rustls::RustlsConfig;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::tls::TlsConfig;

/// Time in-flight TLS connections get to finish after a shutdown signal.
const TLS_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Serve `app` on the configured address until a shutdown signal arrives.
///
/// # Errors
///
/// `AppError::ConfigError` for an unparsable address, `AppError::Tls` when
/// the TLS material cannot be loaded, `AppError::Io` when binding or serving fails.
pub async fn serve(config: &Config, app: Router) -> AppResult<()> {
    let addr: SocketAddr = config
        .server_addr()
        .parse()
        .map_err(|e| AppError::ConfigError(format!("Invalid server address: {e}")))?;

    match config.tls_paths() {
        Some((cert, key, ca)) => {
            let tls = TlsConfig::from_files(cert, key, ca)?;
            serve_tls(addr, app, &tls).await
        }
        None => serve_plain(addr, app).await,
    }
}

async fn serve_plain(addr: SocketAddr, app: Router) -> AppResult<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Server listening on http://{addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn serve_tls(addr: SocketAddr, app: Router, tls: &TlsConfig) -> AppResult<()> {
    let rustls_config = RustlsConfig::from_config(tls.server_config());
    let handle = Handle::new();

    let shutdown = handle.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.graceful_shutdown(Some(TLS_SHUTDOWN_GRACE));
    });

    info!(
        ciphers = tls.cipher_suites().len(),
        "Server listening on https://{addr} (client certificates required)"
    );

    axum_server::bind_rustls(addr, rustls_config)
        .handle(handle)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await?;

    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
///
/// A signal whose handler cannot be installed is logged and never fires;
/// the other one still triggers shutdown.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            warn!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
