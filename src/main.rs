//! Tank Battle Server
//!
//! Parses the command line, starts the server, and stops it when the quit
//! token is read from stdin or on Ctrl-C.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tank_battle::cli::Cli;
use tank_battle::network::server::{GameServer, PortSetting};
use tank_battle::VERSION;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Cli::parse().into_config().map_err(anyhow::Error::msg)?;
    let inherit = config.port == PortSetting::Inherit;
    let quit_token = config.quit_token.clone();

    info!("Tank Battle Server v{}", VERSION);
    info!("Game types: {}", config.game_types.join(","));

    let server = Arc::new(GameServer::bind(config).await.context("failed to start server")?);
    let addr = server.local_addr()?;
    if inherit {
        // The launcher reads the chosen port from our stdout
        println!("{}", addr.port());
    }

    let runner = server.clone();
    let mut run = tokio::spawn(async move { runner.run().await });

    let stdin_quit = async {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim() == quit_token => return,
                Ok(Some(_)) => {}
                // No stdin: only Ctrl-C can stop us
                Ok(None) | Err(_) => std::future::pending::<()>().await,
            }
        }
    };

    tokio::select! {
        result = &mut run => {
            return result.context("server task panicked")?.map_err(Into::into);
        }
        _ = stdin_quit => info!("Quit token received"),
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    server.shutdown();
    match run.await {
        Ok(result) => result?,
        Err(e) => warn!("Server task failed: {}", e),
    }
    Ok(())
}
