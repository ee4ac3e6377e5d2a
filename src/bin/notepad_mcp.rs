//! MCP server for the shared notepad.
//!
//! Launched by the senior CLI through `--mcp-config`. Communicates over stdio
//! using JSON-RPC 2.0; logs go to stderr.

use tokio::io::BufReader;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use weaver::mcp;
use weaver::notepad::Notepad;
use weaver::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let debug = std::env::args().skip(1).any(|arg| arg == "--debug");
    let default_filter = if debug { "weaver=debug" } else { "weaver=warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = Config::from_env()?;
    // Notes written through the tools belong to the senior agent.
    config.notepad.author =
        std::env::var("WEAVER_MCP_AUTHOR").unwrap_or_else(|_| "claude".to_string());

    let notepad = Notepad::connect(&config.notepad).await?;
    tracing::info!(backend = notepad.backend_kind(), "Notepad MCP server starting");

    mcp::serve(
        &notepad,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await?;

    tracing::info!("Notepad MCP server stopped");
    Ok(())
}
