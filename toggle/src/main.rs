use clap::{Parser, Subcommand, ValueEnum};
use config::{Config, ConfigError, LoggingConfig, MetricsConfig};
use featuretoggle::{FeatureToggle, InitError};
use metrics_exporter_statsd::StatsdBuilder;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

mod config;

const STATUS_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(about = "Read and follow feature toggles stored in Redis")]
struct Cli {
    #[arg(long, short, default_value = "toggle.yaml")]
    config: PathBuf,
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Evaluate one flag and print the result
    Get {
        key: String,
        #[arg(long, value_enum, default_value_t = Kind::Boolean)]
        kind: Kind,
        /// Returned when the flag is missing or unusable
        #[arg(long)]
        default: Option<String>,
    },
    /// Keep the snapshot up to date until interrupted
    Watch,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Kind {
    Boolean,
    String,
    Number,
    Percent,
    /// Untagged value decoded as JSON
    Raw,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("could not start the feature toggle client: {0}")]
    Init(#[from] InitError),
    #[error("could not install the metrics exporter: {0}")]
    Metrics(String),
    #[error("invalid default {value:?} for a {kind:?} flag")]
    InvalidDefault { kind: Kind, value: String },
    #[error("could not wait for the shutdown signal: {0}")]
    Signal(#[from] std::io::Error),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::from_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let _sentry = init_logging(config.common.logging.as_ref());

    if let Some(metrics) = &config.common.metrics
        && let Err(e) = init_metrics(metrics)
    {
        tracing::error!("{e}");
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "Could not build the runtime");
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(run(cli.command, config.featuretoggle)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(config: Option<&LoggingConfig>) -> Option<sentry::ClientInitGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.map_or("info", |c| c.filter.as_str())));
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer());

    match config.and_then(|c| c.sentry_dsn.as_deref()) {
        Some(dsn) => {
            let guard = sentry::init((
                dsn,
                sentry::ClientOptions {
                    release: sentry::release_name!(),
                    ..Default::default()
                },
            ));
            registry
                .with(sentry::integrations::tracing::layer())
                .init();
            Some(guard)
        }
        None => {
            registry.init();
            None
        }
    }
}

fn init_metrics(config: &MetricsConfig) -> Result<(), CliError> {
    let recorder = StatsdBuilder::from(config.statsd_host.as_str(), config.statsd_port)
        .build(config.prefix.as_deref())
        .map_err(|e| CliError::Metrics(e.to_string()))?;
    metrics::set_global_recorder(recorder).map_err(|e| CliError::Metrics(e.to_string()))?;
    shared::metrics_defs::describe_all(featuretoggle::metrics_defs::ALL_METRICS);

    tracing::info!(
        host = %config.statsd_host,
        port = config.statsd_port,
        "Metrics exporter installed"
    );
    Ok(())
}

async fn run(command: CliCommand, config: featuretoggle::Config) -> Result<(), CliError> {
    let toggles = FeatureToggle::init(&config).await?;

    let result = match command {
        CliCommand::Get { key, kind, default } => {
            evaluate(&toggles, &key, kind, default.as_deref()).map(|value| println!("{value}"))
        }
        CliCommand::Watch => watch(&toggles).await,
    };

    toggles.shutdown().await;
    result
}

/// Reads one flag through the accessor matching `kind` and renders it.
fn evaluate(
    toggles: &FeatureToggle,
    key: &str,
    kind: Kind,
    default: Option<&str>,
) -> Result<String, CliError> {
    let invalid = |value: &str| CliError::InvalidDefault {
        kind,
        value: value.to_string(),
    };

    let rendered = match kind {
        Kind::Boolean => {
            let default = match default {
                Some(raw) => featuretoggle::accessor::parse_bool(raw).map_err(|_| invalid(raw))?,
                None => false,
            };
            toggles.is_enabled(key, default).to_string()
        }
        Kind::String => toggles.get_string(key, default.unwrap_or_default()),
        Kind::Number => {
            let default = match default {
                Some(raw) => featuretoggle::accessor::parse_number(raw).map_err(|_| invalid(raw))?,
                None => 0.0,
            };
            toggles.get_number(key, default).to_string()
        }
        Kind::Percent => {
            if let Some(raw) = default {
                return Err(invalid(raw));
            }
            toggles.is_enabled_by_percent(key).to_string()
        }
        Kind::Raw => {
            let default = match default {
                Some(raw) => serde_json::from_str(raw).map_err(|_| invalid(raw))?,
                None => serde_json::Value::Null,
            };
            toggles.get::<serde_json::Value>(key, default).to_string()
        }
    };

    Ok(rendered)
}

async fn watch(toggles: &FeatureToggle) -> Result<(), CliError> {
    tracing::info!(
        namespace = toggles.namespace(),
        entries = toggles.snapshot_len(),
        "Watching for changes, press Ctrl-C to stop"
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut status = tokio::time::interval(STATUS_INTERVAL);
    status.tick().await;

    loop {
        tokio::select! {
            res = &mut shutdown => {
                res?;
                tracing::info!("Interrupted, shutting down");
                return Ok(());
            }
            _ = status.tick() => {
                if toggles.is_listening() {
                    tracing::info!(entries = toggles.snapshot_len(), "Snapshot status");
                } else {
                    tracing::warn!(
                        entries = toggles.snapshot_len(),
                        "No longer following changes, serving the last snapshot"
                    );
                }
            }
        }
    }
}
