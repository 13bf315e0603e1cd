use std::process::ExitCode;
use std::sync::Arc;

use caching_proxy::admin;
use caching_proxy::config::{Cli, Mode, ProxyConfig, USAGE};
use caching_proxy::proxy::{self, ProxyContext};
use caching_proxy::server::{Server, ServerError};
use clap::Parser;
use tracing::{Level, error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();

    let mode = match cli.into_mode() {
        Ok(mode) => mode,
        Err(e) => {
            eprintln!("error: {e}");
            eprintln!("{USAGE}");
            return ExitCode::from(2);
        }
    };

    match mode {
        Mode::ClearCache { port } => {
            clear_remote(port).await;
            ExitCode::SUCCESS
        }
        Mode::Serve(config) => match run(config).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!(error = %e, "proxy stopped");
                ExitCode::FAILURE
            }
        },
    }
}

async fn run(config: ProxyConfig) -> Result<(), ServerError> {
    let context = Arc::new(ProxyContext::from_config(&config));
    let server = Server::bind(config.listen_addr()).await?;

    info!(port = config.port, origin = %config.origin, "caching proxy started");
    proxy::serve(server, context).await
}

async fn clear_remote(port: u16) {
    match admin::trigger_clear(port).await {
        Ok(outcome) if outcome.is_success() => println!("Cache cleared successfully."),
        Ok(outcome) => println!("Failed to clear cache: {}", outcome.status),
        Err(e) => println!("Failed to connect to proxy on port {port}: {e}"),
    }
}
