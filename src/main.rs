//! Blockcast - Voxel chunk server

use std::path::PathBuf;

use blockcast::core::{logging, Result, ServerConfig};
use blockcast::net::{GameServer, ServerState};

#[tokio::main]
async fn main() {
    logging::init();
    log::info!("Blockcast starting...");

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();
    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config).await {
        log::error!("Server failed: {}", e);
        std::process::exit(1);
    }
}

fn load_config(args: &[String]) -> Result<ServerConfig> {
    let mut config = match parse_config_arg(args) {
        Some(path) => {
            log::info!("Loading config from: {}", path.display());
            ServerConfig::load(&path)?
        }
        None => ServerConfig::default(),
    };
    if let Some(bind) = parse_bind_arg(args) {
        config.bind_addr = bind;
    }
    config.validate()?;
    Ok(config)
}

async fn run(config: ServerConfig) -> Result<()> {
    let state = ServerState::new(config);
    let server = GameServer::bind(state).await?;
    log::info!("Accepting clients on {}", server.local_addr());

    tokio::signal::ctrl_c().await?;
    log::info!("Shutting down");
    Ok(())
}

/// Parse --config argument from command line (path to a JSON config file)
fn parse_config_arg(args: &[String]) -> Option<PathBuf> {
    for i in 0..args.len() {
        if args[i] == "--config" || args[i] == "-c" {
            if let Some(path) = args.get(i + 1) {
                return Some(PathBuf::from(path));
            }
        }
    }
    None
}

/// Parse --bind argument from command line (listen address)
fn parse_bind_arg(args: &[String]) -> Option<String> {
    for i in 0..args.len() {
        if args[i] == "--bind" || args[i] == "-b" {
            if let Some(addr) = args.get(i + 1) {
                return Some(addr.clone());
            }
        }
    }
    None
}
