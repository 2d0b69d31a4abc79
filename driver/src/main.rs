//! `interactive-shell-driver`: a stdio JSON-RPC tool server exposing the
//! `interactive_shell` tool (spec.md §1, §4.4, §6) backed by the session
//! engine. Logging and process wiring follow the teacher's
//! `maestro-mcp-server` binary shape.

mod mcp_protocol;

use std::sync::Arc;

use interactive_shell_engine::{Config, DriverApi, SessionRegistry};
use mcp_protocol::McpServer;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let cwd = std::env::current_dir().unwrap_or_else(|_| std::path::PathBuf::from("."));
    let config = Config::discover(&cwd);
    let registry = SessionRegistry::new();
    let driver = DriverApi::new(registry.clone(), config);

    log::info!("interactive-shell-driver starting (cwd={})", cwd.display());

    let registry_for_shutdown = Arc::new(registry);
    let shutdown_registry = Arc::clone(&registry_for_shutdown);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("received shutdown signal, killing all sessions");
            shutdown_registry.kill_all().await;
            std::process::exit(0);
        }
    });

    let server = McpServer::new(driver);
    if let Err(e) = server.run().await {
        log::error!("driver server exited with error: {e}");
        std::process::exit(1);
    }

    registry_for_shutdown.kill_all().await;
}
