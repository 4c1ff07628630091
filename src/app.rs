use std::io;

use anyhow::Result;
use tracing::instrument;

use crate::cli::ui::Painter;
use crate::cli::{Command, LogLevel};
use crate::engine::{Engine, EngineConfig};
use crate::telemetry;
use crate::terminal::{SystemTerminalClient, TerminalClient};
use crate::transport::Transport;

/// Settings that apply to every CLI command.
#[derive(Debug, Clone, Copy, Default, bon::Builder)]
pub struct RunOptions {
    log_level: Option<LogLevel>,
    /// Skip the adapter handshake and send commands straight away.
    #[builder(default)]
    skip_initialize: bool,
}

/// Runs one CLI command over `transport`, writing human output to `out`.
///
/// ```no_run
/// # async fn demo() -> anyhow::Result<()> {
/// use clap::Parser;
///
/// let args = blelink::Args::try_parse_from(["blelink", "scan", "--duration", "5s"])?;
/// let options = blelink::RunOptions::builder()
///     .maybe_log_level(args.log_level())
///     .skip_initialize(args.skip_initialize())
///     .build();
/// let (transport, _peer) = blelink::transport::channel();
/// let mut out = Vec::new();
/// blelink::run(args.into_command(), &mut out, transport, options).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, the engine reports a
/// failure, or output writing fails.
pub async fn run<W, T>(command: Command, out: &mut W, transport: T, options: RunOptions) -> Result<()>
where
    W: io::Write,
    T: Transport,
{
    run_with_clients(command, out, &SystemTerminalClient, transport, options).await
}

/// Runs one CLI command with an injected terminal client.
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, the engine reports a
/// failure, or output writing fails.
#[instrument(
    skip(out, terminal_client, transport),
    level = "info",
    fields(command = %command.name())
)]
pub async fn run_with_clients<W, T>(
    command: Command,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    transport: T,
    options: RunOptions,
) -> Result<()>
where
    W: io::Write,
    T: Transport,
{
    telemetry::initialise_tracing(
        "blelink",
        terminal_client.stderr_is_terminal(),
        options.log_level.map(LogLevel::as_level_filter),
    )?;

    let config = EngineConfig::builder()
        .require_initialization(!options.skip_initialize)
        .build();
    let engine = Engine::spawn_with_config(transport, config);
    let result = run_command(&engine, command, out, terminal_client, options).await;
    engine.shutdown().await;
    result
}

async fn run_command<W>(
    engine: &Engine,
    command: Command,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    options: RunOptions,
) -> Result<()>
where
    W: io::Write,
{
    if !options.skip_initialize {
        engine.initialize().await?;
    }

    let painter = Painter::new(terminal_client.stdout_is_terminal());
    match command {
        Command::Scan(args) => crate::cli::scan::run(engine, &args, out, &painter).await,
        Command::Read(args) => crate::cli::gatt::run_read(engine, &args, out, &painter).await,
        Command::Write(args) => crate::cli::gatt::run_write(engine, &args, out, &painter).await,
        Command::Listen(args) => crate::cli::listen::run(engine, &args, out, &painter).await,
    }
}
