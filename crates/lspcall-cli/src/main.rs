//! lspcall: call one tool on an MCP language server from the command line.

mod args;
mod render;
mod sink;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, error::ErrorKind};
use lspcall_config::{CliOverrides, LspcallConfig};
use lspcall_mcp::{McpError, SessionCoordinator, SessionOutcome, SessionRequest};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(
    name = "lspcall",
    version,
    about = "Call one tool on an MCP language server",
    after_help = "Example: lspcall find_references symbolName=MyFunction showLineNumbers=true"
)]
struct Cli {
    /// The MCP tool to call (e.g. 'find_references', 'read_definition')
    tool_name: String,

    /// Tool arguments as key=value pairs. 'true'/'false' become booleans,
    /// numbers become integers or floats, quotes around a value are removed
    tool_args: Vec<String>,

    /// MCP server executable (overrides LSPCALL_SERVER)
    #[arg(long)]
    server: Option<String>,

    /// Workspace directory passed to the server (defaults to the current directory)
    #[arg(long)]
    workspace: Option<PathBuf>,

    /// Language server backend the MCP server should drive
    #[arg(long)]
    lsp: Option<String>,

    /// Per-request timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Milliseconds to wait after the terminate signal before killing the server
    #[arg(long)]
    grace_ms: Option<u64>,

    /// Do not echo the server's stderr
    #[arg(long)]
    quiet_server: bool,

    /// Enable verbose/debug logging
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(io::stderr)
        .init();

    let arguments = match args::parse_tool_arguments(&cli.tool_args) {
        Ok(arguments) => arguments,
        Err(message) => Cli::command()
            .error(ErrorKind::ValueValidation, message)
            .exit(),
    };

    let config = LspcallConfig::load(CliOverrides {
        command: cli.server,
        workspace: cli.workspace,
        lsp: cli.lsp,
        timeout_ms: cli.timeout_ms,
        shutdown_grace_ms: cli.grace_ms,
    })
    .map_err(|e| anyhow::anyhow!("{e}"))?;

    let request =
        SessionRequest::new(cli.tool_name, arguments).context("Failed to build tool request")?;

    if cli.verbose {
        print_banner(&config, &request)?;
    }

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let report = SessionCoordinator::new(config.server, sink::ConsoleSink::new(cli.quiet_server))
        .run(&request, cancel)
        .await;
    ctrl_c.abort();

    if let Some(termination) = &report.termination {
        tracing::debug!(%termination, "server shut down");
    }
    if let Some(drain) = &report.drain {
        tracing::debug!(lines = drain.lines, "server stderr drained");
    }

    let (message, session_failed) = finish(report.outcome);
    match message {
        Message::Stdout(text) => println!("{text}"),
        Message::Stderr(text) => eprintln!("{text}"),
    }
    Ok(if session_failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// Final message of a run and the stream it belongs on.
#[derive(Debug, PartialEq, Eq)]
enum Message {
    Stdout(String),
    Stderr(String),
}

/// Returns the message and whether the session itself failed.
fn finish(outcome: SessionOutcome) -> (Message, bool) {
    match outcome {
        SessionOutcome::Success(blocks) => (
            Message::Stdout(render::render_success(&blocks)),
            false,
        ),
        // The server answered; the answer is an error. Not a session failure.
        SessionOutcome::ToolFailure(blocks) => (
            Message::Stdout(render::render_tool_failure(&blocks)),
            false,
        ),
        SessionOutcome::TransportFailure(McpError::Cancelled) => (
            Message::Stdout("\nClient interrupted by user.".to_string()),
            false,
        ),
        SessionOutcome::TransportFailure(e) => (
            Message::Stderr(format!("error [{}]: {e}", e.kind())),
            true,
        ),
    }
}

fn print_banner(config: &LspcallConfig, request: &SessionRequest) -> Result<()> {
    eprint!("{}", format_banner(config, request)?);
    Ok(())
}

fn format_banner(config: &LspcallConfig, request: &SessionRequest) -> Result<String> {
    let arguments = serde_json::to_string_pretty(request.arguments())
        .context("Failed to serialize tool arguments")?;
    Ok(format!(
        "--- Configuration ---\n\
         Server command: {}\n\
         Server args: {:?}\n\
         Workspace: {}\n\
         Language server: {}\n\
         Config directory: {}\n\
         Target tool: {}\n\
         Tool arguments: {arguments}\n\
         ---------------------\n",
        config.server.command,
        config.server.args,
        config.workspace.display(),
        config.lsp,
        config.config_dir.display(),
        request.tool(),
    ))
}
