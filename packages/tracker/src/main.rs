//! Hyperclient Tracker
//!
//! Command line front end for cross-chain message tracking. Reads a request
//! or response from a JSON file and prints its commitment, current status,
//! status changes, or timeout progress as JSON lines on stdout. Logs go to
//! stderr.
//!
//! Chains are configured through `SOURCE_*`, `DEST_*` and `HYPERBRIDGE_*`
//! environment variables (a `.env` file is honoured) or a JSON file passed
//! with `--config`.

use clap::{Parser, Subcommand};
use hyperclient_rs::HyperClient;
use std::io;
use std::path::PathBuf;
use tracing::{info, warn};

use tracker::commands;
use tracker::config::Config;

#[derive(Parser)]
#[command(name = "hyperclient-tracker")]
#[command(about = "Track cross-chain messages through hyperbridge", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON config file; environment variables are used when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the commitment of a request or response
    Commitment {
        /// Message JSON file
        message: PathBuf,
    },

    /// Print the current status of a message
    Status {
        /// Message JSON file
        message: PathBuf,
    },

    /// Print status changes until the message is delivered or times out
    Subscribe {
        /// Message JSON file
        message: PathBuf,

        /// Source height the message was emitted at, overrides the file
        #[arg(long)]
        height: Option<u64>,
    },

    /// Print timeout progress of a timed-out request, ending with relay calldata
    Timeout {
        /// Request JSON file
        message: PathBuf,
    },
}

fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> eyre::Result<()> {
    init_logging();

    let mut stdout = io::stdout().lock();

    if let Commands::Commitment { message } = &cli.command {
        let message = commands::read_message(message)?;
        return commands::commitment(&message, &mut stdout);
    }

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };
    info!(
        source = %config.client.source.state_machine_id,
        dest = %config.client.dest.state_machine_id,
        hyperbridge = %config.client.hyperbridge.state_machine_id,
        poll_interval_ms = config.poll_interval_ms,
        "Configuration loaded"
    );

    let client = HyperClient::connect(config.client.clone())?.with_settings(config.settings());

    match cli.command {
        Commands::Commitment { .. } => Ok(()),
        Commands::Status { message } => {
            let message = commands::read_message(&message)?;
            commands::status(&client, &message, &mut stdout).await
        }
        Commands::Subscribe { message, height } => {
            let message = commands::read_message(&message)?;
            let written = commands::subscribe(
                &client,
                message,
                height,
                &mut stdout,
                wait_for_shutdown_signal(),
            )
            .await?;
            info!(written, "Subscription finished");
            Ok(())
        }
        Commands::Timeout { message } => {
            let message = commands::read_message(&message)?;
            let written =
                commands::timeout(&client, message, &mut stdout, wait_for_shutdown_signal())
                    .await?;
            info!(written, "Timeout stream finished");
            Ok(())
        }
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,hyperclient_tracker=debug,tracker=debug,hyperclient_rs=debug")
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(io::stderr))
        .with(filter)
        .init();
}

async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
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
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown");
        }
    }
}
