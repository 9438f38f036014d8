//! Streamgate CLI
//!
//! Thin client for the daemon's REST control surface: list processes,
//! inspect one, send signals, request termination.

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tracing::debug;

use streamgate_core::SignalSpec;
use streamgate_core::tracing_init::init_tracing;

#[derive(Parser, Debug)]
#[command(name = "streamgate")]
#[command(version, about = "Streamgate control CLI", long_about = None)]
struct Cli {
    /// Daemon address
    #[arg(long, default_value = "http://127.0.0.1:4300", env = "STREAMGATE_ADDR")]
    daemon_addr: String,

    /// Emit structured JSON log lines
    #[arg(long, env = "STREAMGATE_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List running process identifiers
    Ps,
    /// Show metadata for one process
    Info { pid: u64 },
    /// Show resource usage for one process
    Stats { pid: u64 },
    /// Send a signal by number or name (e.g. 9, TERM, SIGHUP)
    Kill { pid: u64, signal: String },
    /// Request process termination
    Stop { pid: u64 },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing("streamgate_cli=warn", cli.log_json);

    let client = DaemonClient::new(&cli.daemon_addr)?;

    match cli.command {
        Command::Ps => {
            let body = client.get("/pids").await?;
            print_json(&body);
        }
        Command::Info { pid } => {
            let body = client.get(&format!("/processes/{pid}")).await?;
            print_json(&body);
        }
        Command::Stats { pid } => {
            let body = client.get(&format!("/processes/{pid}/stats")).await?;
            print_json(&body);
        }
        Command::Kill { pid, signal } => {
            let spec = SignalSpec::parse_token(&signal);
            let body = client
                .post(
                    &format!("/processes/{pid}/signal"),
                    serde_json::json!({ "signal": spec }),
                )
                .await?;
            print_json(&body);
        }
        Command::Stop { pid } => {
            let body = client.delete(&format!("/processes/{pid}")).await?;
            print_json(&body);
        }
    }

    Ok(())
}

#[allow(clippy::print_stdout)]
fn print_json(value: &serde_json::Value) {
    println!("{value:#}");
}

/// REST client for the daemon control surface.
struct DaemonClient {
    http: reqwest::Client,
    base_url: String,
}

impl DaemonClient {
    fn new(addr: &str) -> anyhow::Result<Self> {
        // reqwest is built with rustls-no-provider; the Err case just
        // means a provider was already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::Client::builder()
            .build()
            .context("building HTTP client")?;
        let base_url = addr.trim_end_matches('/').to_string();
        Ok(Self { http, base_url })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get(&self, path: &str) -> anyhow::Result<serde_json::Value> {
        let resp = self.http.get(self.url(path)).send().await?;
        Self::into_body(resp).await
    }

    async fn post(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> anyhow::Result<serde_json::Value> {
        let resp = self.http.post(self.url(path)).json(&body).send().await?;
        Self::into_body(resp).await
    }

    async fn delete(&self, path: &str) -> anyhow::Result<serde_json::Value> {
        let resp = self.http.delete(self.url(path)).send().await?;
        Self::into_body(resp).await
    }

    /// Parse the JSON body; non-success statuses become errors carrying
    /// the daemon's `{"error", "errno"}` payload when present.
    async fn into_body(resp: reqwest::Response) -> anyhow::Result<serde_json::Value> {
        let status = resp.status();
        let value: serde_json::Value = resp
            .json()
            .await
            .unwrap_or(serde_json::Value::Null);
        debug!(%status, "daemon response");
        if !status.is_success() {
            let code = value
                .get("error")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("unknown");
            bail!("daemon returned {status}: {code}");
        }
        Ok(value)
    }
}
