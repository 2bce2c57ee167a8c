//! # compass
//!
//! Entry points for the Compass lifecycle hooks plus the maintenance commands
//! that sit around them.
//!
//! `compass hook <kind>` is what the host launches. It reads the host payload
//! from stdin, writes exactly one JSON object to stdout and exits 0, whatever
//! happens inside. Diagnostics go to stderr, filtered by `COMPASS_LOG`.

mod doctor;
mod hook;
mod state_cli;
mod telemetry_cli;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::io::{IsTerminal, stdout};
use tracing_subscriber::EnvFilter;

/// Environment variable holding the tracing filter.
const LOG_ENV: &str = "COMPASS_LOG";

/// Color output mode for terminal display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ColorMode {
    /// Automatically detect if stdout is a TTY
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl ColorMode {
    fn should_use_colors(self) -> bool {
        match self {
            ColorMode::Always => true,
            ColorMode::Never => false,
            ColorMode::Auto => stdout().is_terminal(),
        }
    }
}

/// Output format shared by the reporting commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format for programmatic access
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "compass", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose diagnostics on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Color output mode (auto, always, never)
    #[arg(long, value_enum, default_value_t = ColorMode::Auto, global = true)]
    color: ColorMode,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a lifecycle hook (invoked by the host)
    Hook(hook::HookArgs),

    /// Check the installation and exit non-zero when it is broken
    Doctor(doctor::DoctorArgs),

    /// Record or summarise hook telemetry
    Telemetry(telemetry_cli::TelemetryArgs),

    /// Inspect or edit the session-state snapshot
    State(state_cli::StateArgs),

    /// Print the suggested next step after an agent finishes
    Route(RouteArgs),
}

#[derive(Parser, Debug)]
struct RouteArgs {
    /// Agent that just finished
    agent: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let use_colors = cli.color.should_use_colors();
    match cli.command {
        Commands::Hook(args) => hook::execute(args).await,
        Commands::Doctor(args) => doctor::execute(args, use_colors).await,
        Commands::Telemetry(args) => telemetry_cli::execute(args),
        Commands::State(args) => state_cli::execute(args),
        Commands::Route(args) => {
            println!("{}", compass_core::next_step(&args.agent));
            Ok(())
        }
    }
}

/// Logs to stderr only; stdout carries hook envelopes and command output.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
