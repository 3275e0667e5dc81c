mod signals;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use breakwater_server::config::parse_config_file;
use breakwater_server::{Server, ShutdownFlag};

#[derive(Debug, Parser)]
#[command(
    name = "breakwater",
    about = "Non-blocking HTTP/1.1 server driven by an nginx-style configuration file"
)]
struct Cli {
    /// Path to the configuration file.
    #[arg(default_value = "breakwater.conf")]
    config: PathBuf,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    info!(config = %cli.config.display(), "loading configuration");

    let configs = match parse_config_file(&cli.config) {
        Ok(configs) if !configs.is_empty() => configs,
        Ok(_) => {
            error!("no server blocks found in configuration");
            return ExitCode::FAILURE;
        }
        Err(err) => {
            error!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = ShutdownFlag::new();
    signals::install(&shutdown);

    let mut server = match Server::new(configs, shutdown) {
        Ok(server) => server,
        Err(err) => {
            error!("{err}");
            return ExitCode::FAILURE;
        }
    };

    match server.run() {
        Ok(()) => {
            info!("clean shutdown");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
