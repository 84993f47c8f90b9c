//! CLI for chatcast
//!
//! Subcommands:
//! - `server`: run the WebSocket server on top of a sled database

use std::sync::Arc;

use chatcast::config::{Settings, load_config};
use chatcast::store::{SledStore, StaticFileStorage, Store};
use chatcast::transport::start_websocket_server;
use chatcast::usecase::MessageUsecase;
use clap::Parser;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "chatcast")]
enum Command {
    /// Start the WebSocket server
    Server,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cmd = Command::parse();

    // logging is not up yet, so report this failure on stderr
    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("chatcast: failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    chatcast::utils::logging::init(&config.log);

    match cmd {
        Command::Server => {
            if let Err(e) = run_server(config).await {
                error!("Server failed: {}", e);
                std::process::exit(1);
            }
        }
    }
}

async fn run_server(config: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let db = Arc::new(SledStore::open(&config.storage.path)?);
    let files = Arc::new(StaticFileStorage::new(config.storage.file_base_url.clone()));
    let store = Store::from_sled(db.clone(), files);

    let usecase = Arc::new(MessageUsecase::new(store, config.distribution.clone()));
    usecase.start();

    tokio::select! {
        res = start_websocket_server(addr, usecase.clone(), db.clone()) => {
            match res {
                Ok(()) => error!("WebSocket server exited unexpectedly."),
                Err(e) => error!("WebSocket server failed: {e}"),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    }

    usecase.stop();
    usecase.wait().await;
    usecase.close_all();
    db.flush()?;

    Ok(())
}
