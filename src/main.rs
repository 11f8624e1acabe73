use anyhow::Context;
use clap::Parser;
use livecap::capture::{CaptureSession, Snapshot, StreamSource};
use livecap::config::{parse_duration, CaptureConfig};
use livecap::error::LivecapError;
use livecap::subprocess::ProcessCommand;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, trace, warn};

/// Run a command and stream its output as it is captured
#[derive(Parser)]
#[command(name = "livecap", version)]
#[command(about = "Capture a process's stdout and stderr line by line while it runs", long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace, -vvv for all)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Path to configuration file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Kill the command if it runs longer than this (e.g. "30s", "2m")
    #[arg(long, value_parser = parse_duration)]
    timeout: Option<Duration>,

    /// How often to print newly captured lines (default from config)
    #[arg(long, value_parser = parse_duration)]
    interval: Option<Duration>,

    /// Prefix each line with the stream it came from
    #[arg(long)]
    origin: bool,

    /// Program to run followed by its arguments
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        2 => "trace",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .with_target(cli.verbose >= 2)
        .with_thread_ids(cli.verbose >= 3)
        .with_line_number(cli.verbose >= 3)
        .init();

    debug!("livecap started with verbosity level: {}", cli.verbose);
    trace!("Full CLI args: {:?}", std::env::args().collect::<Vec<_>>());

    if let Err(e) = run(cli).await {
        std::process::exit(handle_fatal_error(&e));
    }
}

/// Report a fatal error and pick the exit status for it
fn handle_fatal_error(error: &anyhow::Error) -> i32 {
    error!("Fatal error: {}", error);
    eprintln!("Error: {error}");

    match error.downcast_ref::<LivecapError>() {
        Some(livecap_err) => livecap_err.exit_code(),
        None => 1,
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref(), cli.interval)?;
    let (program, args) = cli
        .command
        .split_first()
        .ok_or_else(|| anyhow::anyhow!("No command given"))?;

    let mut command = ProcessCommand::new(program.as_str()).args(args);
    if let Some(timeout) = cli.timeout {
        command = command.timeout(timeout);
    }

    let mut ticker = tokio::time::interval(config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let session = CaptureSession::with_config(config);
    let runner = session.clone();
    let task = tokio::spawn(async move { runner.launch_command(command).await });

    let mut printer = LinePrinter::default();
    loop {
        tokio::select! {
            _ = session.wait_completion() => break,
            _ = ticker.tick() => printer.print_new(&session.snapshot(cli.origin))?,
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                warn!("Interrupted, terminating {}", program);
                session.terminate();
            }
        }
    }

    // Lines appended between the last tick and completion
    printer.print_new(&session.snapshot(cli.origin))?;

    task.await
        .context("Capture task panicked")?
        .map_err(LivecapError::from)?;
    Ok(())
}

fn load_config(
    path: Option<&Path>,
    interval: Option<Duration>,
) -> Result<CaptureConfig, LivecapError> {
    let mut config = match path {
        Some(path) => CaptureConfig::load(path)?,
        None => CaptureConfig::default(),
    };
    config.merge_env_vars()?;
    if let Some(interval) = interval {
        config.poll_interval = interval;
    }
    config.validate()?;
    Ok(config)
}

/// Prints each snapshot line once, in snapshot order
#[derive(Default)]
struct LinePrinter {
    printed: usize,
}

impl LinePrinter {
    fn print_new(&mut self, snapshot: &Snapshot) -> anyhow::Result<()> {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        self.write_new(snapshot, &mut out)
            .and_then(|()| out.flush())
            .context("Failed to write output")
    }

    fn write_new(&mut self, snapshot: &Snapshot, out: &mut impl Write) -> std::io::Result<()> {
        for (index, line) in snapshot.lines.iter().enumerate().skip(self.printed) {
            let origin = snapshot
                .origins
                .as_ref()
                .and_then(|origins| origins.get(index).copied());
            out.write_all(format_line(line, origin).as_bytes())?;
        }
        self.printed = self.printed.max(snapshot.len());
        Ok(())
    }
}

fn format_line(line: &str, origin: Option<StreamSource>) -> String {
    let prefix = match origin {
        Some(StreamSource::Stdout) => "out| ",
        Some(StreamSource::Stderr) => "err| ",
        None => "",
    };
    let mut formatted = format!("{prefix}{line}");
    if !formatted.ends_with('\n') {
        formatted.push('\n');
    }
    formatted
}
