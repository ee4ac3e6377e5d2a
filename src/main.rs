//! weaver - senior/junior agent chat front end.
//!
//! Usage:
//!   weaver                         # Interactive mode
//!   weaver "Write hello world"     # One message, print the final reply
//!   echo "What is 2+2?" | weaver -p
//!   weaver --senior-only           # Do not register the junior agent
//!
//! Logs go to stderr; replies go to stdout.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use weaver::agent::claudecode::ClaudeCodeAgent;
use weaver::agent::openai::OpenAiCompatAgent;
use weaver::cli::{self, Flow, HELP};
use weaver::mcp::mcp_server_config;
use weaver::notepad::Notepad;
use weaver::orchestrator::{Orchestrator, OrchestratorError, OrchestratorEvent};
use weaver::Config;

const USAGE: &str = "\
Usage: weaver [OPTIONS] [MESSAGE]

Options:
  -p, --print             Read the message from stdin, print the reply, exit
      --stream            Stream a single reply as it arrives (with MESSAGE or -p)
      --senior-only       Only use the senior agent
      --junior-url <URL>  OpenAI-compatible base URL for the junior agent
      --junior-model <M>  Junior model name
      --no-routing        Hide routing lines in interactive mode
      --debug             Enable debug logging
  -h, --help              Show this help";

const MCP_BINARY: &str = "notepad-mcp";

#[derive(Debug, Default)]
struct Args {
    message: Option<String>,
    print: bool,
    stream: bool,
    senior_only: bool,
    junior_url: Option<String>,
    junior_model: Option<String>,
    no_routing: bool,
    debug: bool,
}

fn parse_args() -> anyhow::Result<Option<Args>> {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-p" | "--print" => parsed.print = true,
            "--stream" => parsed.stream = true,
            "--senior-only" => parsed.senior_only = true,
            "--no-routing" => parsed.no_routing = true,
            "--debug" => parsed.debug = true,
            "--junior-url" | "--junior-model" => {
                let value = args
                    .get(i + 1)
                    .with_context(|| format!("{} needs a value", args[i]))?
                    .clone();
                if args[i] == "--junior-url" {
                    parsed.junior_url = Some(value);
                } else {
                    parsed.junior_model = Some(value);
                }
                i += 1;
            }
            "-h" | "--help" => {
                println!("{}", USAGE);
                return Ok(None);
            }
            other if other.starts_with('-') && parsed.message.is_none() => {
                anyhow::bail!("Unknown option: {}\n\n{}", other, USAGE);
            }
            other => {
                parsed.message = Some(match parsed.message.take() {
                    Some(message) => format!("{} {}", message, other),
                    None => other.to_string(),
                });
            }
        }
        i += 1;
    }
    Ok(Some(parsed))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let Some(args) = parse_args()? else {
        return Ok(());
    };

    let default_filter = if args.debug { "weaver=debug" } else { "weaver=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = Config::from_env()?;
    if let Some(url) = args.junior_url.clone() {
        url::Url::parse(&url).with_context(|| format!("Invalid junior URL: {}", url))?;
        config.junior.base_url = url;
    }
    if let Some(model) = args.junior_model.clone() {
        config.junior.model = model;
    }
    if config.senior.mcp_config.is_none() {
        match notepad_server_path() {
            Some(path) => {
                debug!(path = %path.display(), "Attaching notepad MCP server");
                config.senior.mcp_config = Some(mcp_server_config(
                    &path.to_string_lossy(),
                    &config.notepad,
                ));
            }
            None => debug!("{} not found next to this binary", MCP_BINARY),
        }
    }

    let notepad = match Notepad::connect(&config.notepad).await {
        Ok(notepad) => {
            info!(backend = notepad.backend_kind(), "Shared notepad ready");
            Some(notepad)
        }
        Err(e) => {
            warn!("Shared notepad unavailable: {}", e);
            None
        }
    };

    let mut builder = Orchestrator::builder(config.orchestrator.clone())
        .turn_limit(config.turn_limit)
        .agent(Arc::new(ClaudeCodeAgent::new(config.senior.clone())));
    if !args.senior_only {
        builder = builder.agent(Arc::new(OpenAiCompatAgent::new(config.junior.clone())));
    }
    if let Some(notepad) = notepad {
        builder = builder.notepad(notepad);
    }
    let mut orch = builder.build()?;

    let message = if args.print {
        let mut input = String::new();
        std::io::stdin().read_to_string(&mut input)?;
        let input = input.trim().to_string();
        if input.is_empty() {
            anyhow::bail!("No input provided");
        }
        Some(input)
    } else {
        args.message.clone()
    };

    match message {
        Some(message) if args.stream => run_stream(&mut orch, &message).await,
        Some(message) => run_once(&mut orch, &message).await,
        None => run_interactive(&mut orch, !args.no_routing).await,
    }
}

fn notepad_server_path() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let path = exe.with_file_name(MCP_BINARY);
    path.is_file().then_some(path)
}

async fn run_once(orch: &mut Orchestrator, message: &str) -> anyhow::Result<()> {
    let report = orch.process_message(message).await?;
    for hop in &report.hops {
        info!(hop = hop.hop, agent = %hop.agent, reason = %hop.reason, "Hop completed");
    }
    if let Some(last) = report.hops.last() {
        println!("{}", last.reply);
    }
    if report.hit_max_hops() {
        warn!("Maximum agent hops reached, stopping chain");
    }
    Ok(())
}

async fn run_stream(orch: &mut Orchestrator, message: &str) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout();
    let stream = orch.chat_stream(message, None);
    futures::pin_mut!(stream);
    while let Some(chunk) = stream.next().await {
        write!(stdout, "{}", chunk?)?;
        stdout.flush()?;
    }
    writeln!(stdout)?;
    Ok(())
}

async fn run_interactive(orch: &mut Orchestrator, show_routing: bool) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(stdout, "weaver {}\n\n{}\n", env!("CARGO_PKG_VERSION"), HELP)?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut events = orch.subscribe();

    loop {
        write!(stdout, "You> ")?;
        stdout.flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            writeln!(stdout)?;
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        if let Some(command) = cli::parse_command(input) {
            if cli::execute(command, orch, &mut stdout).await? == Flow::Quit {
                break;
            }
            continue;
        }

        let cancel = CancellationToken::new();
        orch.set_cancellation(Some(cancel.clone()));
        let result = {
            let run = orch.process_message(input);
            tokio::pin!(run);
            loop {
                tokio::select! {
                    result = &mut run => break result,
                    Ok(event) = events.recv() => show_event(&event, show_routing, &mut stdout)?,
                    _ = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => cancel.cancel(),
                }
            }
        };
        orch.set_cancellation(None);
        loop {
            match events.try_recv() {
                Ok(event) => show_event(&event, show_routing, &mut stdout)?,
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    debug!(skipped, "Event feed lagged");
                }
                Err(_) => break,
            }
        }

        match result {
            Ok(_) => {}
            Err(OrchestratorError::Cancelled) => writeln!(stdout, "\nInterrupted")?,
            Err(e) => writeln!(stdout, "Error: {}", e)?,
        }
    }
    Ok(())
}

fn show_event<W: Write>(
    event: &OrchestratorEvent,
    show_routing: bool,
    out: &mut W,
) -> std::io::Result<()> {
    debug!(event = event.event_name(), "Orchestrator event");
    if let Some(line) = cli::render_event(event, show_routing) {
        writeln!(out, "{}", line)?;
    }
    Ok(())
}
