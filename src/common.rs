use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use foresight_config::AppConfig;

use crate::app::Application;
use crate::shutdown::ShutdownManager;

/// Builder for the scheduler's command line interface.
pub struct CliBuilder {
    command: Command,
}

impl CliBuilder {
    pub fn new(name: &'static str, about: &'static str) -> Self {
        let command = Command::new(name)
            .version(env!("CARGO_PKG_VERSION"))
            .about(about);
        Self { command }
    }

    /// Common arguments: config path, log level, log format.
    pub fn with_common_args(mut self) -> Self {
        self.command = self
            .command
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .value_name("FILE")
                    .help("Path to the TOML configuration file"),
            )
            .arg(
                Arg::new("log-level")
                    .short('l')
                    .long("log-level")
                    .value_name("LEVEL")
                    .help("Log level")
                    .value_parser(["trace", "debug", "info", "warn", "error"])
                    .default_value("info"),
            )
            .arg(
                Arg::new("log-format")
                    .long("log-format")
                    .value_name("FORMAT")
                    .help("Log output format")
                    .value_parser(["json", "pretty"])
                    .default_value("pretty"),
            );
        self
    }

    pub fn build_and_parse(self) -> ArgMatches {
        self.command.get_matches()
    }
}

#[derive(Debug, Clone)]
pub struct StartupConfig {
    pub config_path: Option<String>,
    pub log_level: String,
    pub log_format: String,
}

pub fn startup_config_from_matches(matches: &ArgMatches) -> StartupConfig {
    StartupConfig {
        config_path: matches.get_one::<String>("config").cloned(),
        log_level: matches
            .get_one::<String>("log-level")
            .cloned()
            .unwrap_or_else(|| "info".to_string()),
        log_format: matches
            .get_one::<String>("log-format")
            .cloned()
            .unwrap_or_else(|| "pretty".to_string()),
    }
}

pub fn init_logging(log_level: &str, log_format: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .context("failed to initialize json logging")?,
        "pretty" => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()
            .context("failed to initialize pretty logging")?,
        other => return Err(anyhow::anyhow!("unsupported log format: {other}")),
    }
    Ok(())
}

/// Bring the scheduler up, run until a signal arrives, then shut down with
/// a bounded grace period.
pub async fn start_application(startup: StartupConfig) -> Result<()> {
    init_logging(&startup.log_level, &startup.log_format)?;

    info!("starting foresight scheduler");
    let config = AppConfig::load(startup.config_path.as_deref())
        .map_err(|e| anyhow::anyhow!("failed to load configuration: {e}"))?;

    let app = Application::new(config).await?;
    let shutdown_manager = ShutdownManager::new();

    let app_handle = {
        let app = Arc::new(app);
        let manager = shutdown_manager.clone();
        tokio::spawn(async move {
            if let Err(e) = app.run(&manager).await {
                error!("scheduler exited with error: {e}");
            }
        })
    };

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, stopping");
    shutdown_manager.shutdown().await;

    match tokio::time::timeout(Duration::from_secs(30), app_handle).await {
        Ok(Err(e)) => error!("scheduler task panicked: {e}"),
        Ok(Ok(())) => info!("scheduler stopped cleanly"),
        Err(_) => warn!("scheduler did not stop within 30s, exiting anyway"),
    }
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.unwrap_or_else(|e| {
            error!("failed to install Ctrl+C handler: {e}");
            std::process::exit(1);
        })
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::process::exit(1);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C"),
        _ = terminate => info!("received SIGTERM"),
    }
}
