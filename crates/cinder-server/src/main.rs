use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use cinder_server::{Server, ServerConfig};

/// In-memory key-value server.
#[derive(Parser)]
#[command(name = "cinder-server", version, about)]
struct Args {
    /// TCP port to listen on.
    #[arg(long, default_value_t = 1234)]
    port: u16,

    /// Worker threads for deferred value destruction.
    #[arg(long, default_value_t = 4)]
    threads: usize,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cinder=info".into()),
        )
        .init();

    let args = Args::parse();
    let config = ServerConfig {
        port: args.port,
        threads: args.threads,
    };

    let server = match Server::bind(&config) {
        Ok(server) => server,
        Err(e) => {
            error!("failed to bind port {}: {e}", config.port);
            return ExitCode::FAILURE;
        }
    };

    match server.local_addr() {
        Ok(addr) => info!("listening on {addr}"),
        Err(e) => info!("listening (local addr unavailable: {e})"),
    }

    server.run(shutdown_signal()).await;
    info!("bye");
    ExitCode::SUCCESS
}

/// Resolves when SIGINT (ctrl-c) arrives.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for ctrl-c: {e}");
        // fall through and resolve, shutting the server down rather
        // than running without a working signal handler
    }
}
