//! Preflight bridge server.
//!
//! Entry point for the `preflight-bridge` binary.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use preflight::http::{self, AppState};
use preflight::{telemetry, BridgeRuntimeBuilder, Config, HttpNotifier, HttpRunnerClient, RuntimeSettings};
use tracing::info;

#[derive(Parser)]
#[command(name = "preflight-bridge")]
#[command(about = "Bridge review test requests to the CI runner", version)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, short = 'c', default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;

    telemetry::init_tracing(&config.log_level);

    #[cfg(feature = "metrics")]
    preflight::metrics::init_metrics().context("registering metrics")?;

    let runner = Arc::new(HttpRunnerClient::new(
        &config.runner.host,
        &config.runner.api_key,
        config.submit_template(),
        config.runner_timeout(),
    )?);
    let notifier = Arc::new(HttpNotifier::new(
        &config.runner.host,
        config.reviewer_timeout(),
    )?);

    let runtime = BridgeRuntimeBuilder::new(RuntimeSettings::from(&config))
        .with_runner(runner)
        .with_notifier(notifier)
        .build()?;
    runtime.start().await?;

    let app = http::router(AppState {
        submissions: runtime.submissions(),
    });
    let addr = format!("0.0.0.0:{}", config.port());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(addr = %addr, "starting server");

    // In-flight submit retries abort once the signal lands.
    let shutdown = runtime.shutdown_token();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown.cancel();
        })
        .await
        .context("serving http")?;

    info!("shutting down server");
    runtime.shutdown().await?;
    info!("server exited");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_to_working_directory_file() {
        let cli = Cli::parse_from(["preflight-bridge"]);
        assert_eq!(cli.config, PathBuf::from("config.yaml"));

        let cli = Cli::parse_from(["preflight-bridge", "-c", "/etc/preflight.yaml"]);
        assert_eq!(cli.config, PathBuf::from("/etc/preflight.yaml"));
    }
}
