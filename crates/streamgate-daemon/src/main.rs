//! Streamgate Daemon
//!
//! Serves the process-I/O streaming gateway (WebSocket channels) and the
//! REST control surface over one listener.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use streamgate_core::tracing_init::init_tracing;
use streamgate_daemon::ProcessManager;
use streamgate_daemon::server::{AppState, build_router};

#[derive(Parser, Debug)]
#[command(name = "streamgate-daemon")]
#[command(version, about = "Streamgate daemon - process I/O streaming gateway")]
struct Args {
    /// TCP bind address
    #[arg(long, default_value = "127.0.0.1:4300", env = "STREAMGATE_ADDR")]
    addr: SocketAddr,

    /// Emit structured JSON log lines
    #[arg(long, env = "STREAMGATE_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing("streamgate_daemon=info", args.log_json);

    info!(addr = %args.addr, "starting streamgate-daemon");

    let manager = Arc::new(ProcessManager::new());
    let app = build_router(AppState { manager });
    let listener = tokio::net::TcpListener::bind(args.addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
