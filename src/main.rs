use std::process::ExitCode;
use std::sync::Arc;

use candlemc::config::CandleConfig;
use candlemc::transport::{Server, ServerContext};
use candlemc::utils::logging::init_tracing;
use tracing::{error, info};

/// Usage: `candlemc-server [config.toml]`
///
/// Without a path the configuration comes from `CANDLEMC_*` environment variables.
#[tokio::main]
async fn main() -> ExitCode {
    let config = match std::env::args().nth(1) {
        Some(path) => CandleConfig::from_file(path),
        None => CandleConfig::from_env(),
    };
    let config = match config.and_then(|c| c.validate_strict().map(|()| c)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_tracing(&config.logging) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    let context = match ServerContext::from_config(&config) {
        Ok(context) => Arc::new(context),
        Err(e) => {
            error!(error = %e, "Failed to build registries");
            return ExitCode::FAILURE;
        }
    };

    let server = match Server::bind(&config.server.address, context.clone()).await {
        Ok(server) => server,
        Err(e) => {
            error!(address = %config.server.address, error = %e, "Failed to bind");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = server.run().await {
        error!(error = %e, "Server stopped with an error");
        return ExitCode::FAILURE;
    }

    context.save_caches();
    info!("Server stopped");
    ExitCode::SUCCESS
}
