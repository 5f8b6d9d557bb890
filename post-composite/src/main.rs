mod config;

use clap::{Args, Parser};
use metrics_exporter_statsd::StatsdBuilder;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{CommonConfig, Config};

#[derive(Parser)]
#[command(name = "post-composite", about = "Composite service for posts")]
enum CliCommand {
    /// Run the composite service
    Run(CommandArgs),
    /// Load and validate a config file, then exit
    ValidateConfig(CommandArgs),
}

#[derive(Args)]
struct CommandArgs {
    #[arg(long)]
    config_file_path: PathBuf,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    ConfigError(#[from] config::ConfigError),
    #[error("could not start runtime: {0}")]
    RuntimeError(#[from] std::io::Error),
    #[error(transparent)]
    RunError(#[from] composite::RunError),
    #[error("could not install metrics exporter: {0}")]
    MetricsError(String),
}

fn main() {
    let cli = CliCommand::parse();

    if let Err(e) = cli_main(cli) {
        eprintln!("{e}");
        process::exit(1);
    }
}

fn cli_main(cli: CliCommand) -> Result<(), CliError> {
    match cli {
        CliCommand::Run(args) => {
            let config = Config::from_file(&args.config_file_path)?;
            // Kept alive for the lifetime of the process to flush events
            let _sentry = init_observability(&config.common)?;

            let rt = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            rt.block_on(composite::run(config.composite, shutdown_signal()))?;
        }
        CliCommand::ValidateConfig(args) => {
            Config::from_file(&args.config_file_path)?;
            println!("Config is valid");
        }
    }

    Ok(())
}

fn init_observability(
    common: &CommonConfig,
) -> Result<Option<sentry::ClientInitGuard>, CliError> {
    let sentry = common.logging.as_ref().map(|logging| {
        sentry::init((
            logging.sentry_dsn.as_str(),
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .with(sentry.as_ref().map(|_| sentry::integrations::tracing::layer()))
        .init();

    if let Some(metrics_config) = &common.metrics {
        let recorder = StatsdBuilder::from(&metrics_config.statsd_host, metrics_config.statsd_port)
            .build(Some("post_composite"))
            .map_err(|e| CliError::MetricsError(e.to_string()))?;
        metrics::set_global_recorder(recorder)
            .map_err(|e| CliError::MetricsError(e.to_string()))?;
        tracing::info!(
            host = %metrics_config.statsd_host,
            port = metrics_config.statsd_port,
            "Reporting metrics to statsd"
        );
    }

    Ok(sentry)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {e}");
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
                tracing::error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}
