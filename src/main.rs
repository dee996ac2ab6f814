use std::process::ExitCode;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use hardened_http::{AppError, AppResult, Config, build_router, server};

#[tokio::main]
async fn main() -> ExitCode {
    // Configuration first, so a RUST_LOG from .env takes effect
    let config = Config::from_env();
    let filter = config
        .as_ref()
        .ok()
        .and_then(|config| config.env_filter().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    // Initialize logging
    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    }

    info!(
        "Starting hardened HTTP server v{}",
        env!("CARGO_PKG_VERSION")
    );

    match run(config).await {
        Ok(()) => ExitCode::from(exitcode::OK as u8),
        Err(exit_code) => ExitCode::from(exit_code as u8),
    }
}

/// Run the application, returning an exit code on error.
async fn run(config: AppResult<Config>) -> Result<(), exitcode::ExitCode> {
    let config = config.map_err(|e| {
        error!("Configuration error: {e}");
        exitcode::CONFIG
    })?;
    info!(
        host = %config.host,
        port = %config.port,
        tls = config.tls_enabled(),
        "Configuration loaded"
    );

    let app = build_router(&config);

    info!("API endpoints:");
    info!("  GET  /health     - Health check (no middleware)");
    info!("  GET  /v0/status  - Active security policy");
    info!("  POST /v0/echo    - Echo a JSON body");

    server::serve(&config, app).await.map_err(|e| {
        error!("Server error: {e}");
        match e {
            AppError::ConfigError(_) | AppError::Tls(_) => exitcode::CONFIG,
            AppError::Io(_) => exitcode::UNAVAILABLE,
            _ => exitcode::SOFTWARE,
        }
    })?;

    info!("Server shutdown complete");
    Ok(())
}
