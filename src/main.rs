//! Entry point: parse arguments, set up logging, run the server.

mod cli;

use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use clap::Parser;
use rpchat_tokio::{ChatServer, ServerConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = cli::Args::parse();
    init_logging(args.log.as_deref())?;

    let config = ServerConfig {
        port: args.port,
        ..ServerConfig::default()
    };

    log::info!("Port: {}", config.port);
    if let Some(path) = &args.log {
        log::info!("Log Location: {}", path.display());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads)
        .enable_all()
        .build()?;

    let server = ChatServer::new(config);
    runtime.block_on(server.run())
}

/// Point the logger at stdout, or at the requested file (created if
/// absent, appended otherwise, mode 0744).
fn init_logging(log_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    match log_path {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .mode(0o744)
                .open(path)?;
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }
        None => {
            builder.target(env_logger::Target::Stdout);
        }
    }
    builder.init();
    Ok(())
}
