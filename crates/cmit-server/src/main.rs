use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cmit_server::config::{self, ServerConfig};
use cmit_server::ServerBuilder;

const CONFIG_ENV: &str = "CMIT_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "cmit.yaml";

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = match load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "failed to load config");
            return ExitCode::FAILURE;
        }
    };

    let server = match ServerBuilder::new(cfg).bind() {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, "failed to start server");
            return ExitCode::FAILURE;
        }
    };

    let state = server.state().clone();
    server.run_until(shutdown_signal()).await;

    info!(queued = state.queue().len(), "server stopped");
    info!("final metrics\n{}", state.metrics().render());
    ExitCode::SUCCESS
}

/// `$CMIT_CONFIG`, else the first argument, else `./cmit.yaml` if present,
/// else built-in defaults.
fn load_config() -> cmit_core::Result<ServerConfig> {
    let explicit = env::var_os(CONFIG_ENV)
        .or_else(|| env::args_os().nth(1))
        .map(PathBuf::from);

    match explicit {
        Some(path) => {
            info!(path = %path.display(), "loading config");
            config::load_from_file(path)
        }
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            info!(path = DEFAULT_CONFIG_FILE, "loading config");
            config::load_from_file(DEFAULT_CONFIG_FILE)
        }
        None => {
            info!("no config file found, using defaults");
            Ok(ServerConfig::default())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("signal received, starting graceful shutdown");
}
