//! grove: run one dev server per git worktree.
//!
//! # Usage
//!
//! ```text
//! grove start [--name N] [--port P] [--wait] [COMMAND...]
//! grove stop [NAME] [--all] [--timeout SECS]
//! grove restart [NAME] [--timeout SECS]
//! grove ls [--json]
//! grove status [NAME] [--json]
//! grove cleanup
//! grove logs [NAME] [-n LINES] [-f]
//! grove url [NAME]
//! grove detach [NAME]
//! grove attach PORT [--name N] [--pid PID]
//! grove prune [--stopped] [--orphaned] [--dry-run] [--json]
//! grove proxy start|stop|status|routes
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    list::{LsArgs, StatusArgs},
    logs::LogsArgs,
    proxy::ProxyCommand,
    start::StartArgs,
    stop::{RestartArgs, StopArgs},
    track::{AttachArgs, PruneArgs},
    workspace::{CleanupArgs, DetachArgs, UrlArgs},
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "grove",
    version,
    about = "Run and route one dev server per git worktree",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the dev server for the current worktree.
    Start(StartArgs),

    /// Stop a running server.
    Stop(StopArgs),

    /// Stop and start a server with its recorded command.
    Restart(RestartArgs),

    /// List known servers.
    Ls(LsArgs),

    /// Show one server in detail, refreshing its health.
    Status(StatusArgs),

    /// Drop records of dead servers and deleted worktrees.
    Cleanup(CleanupArgs),

    /// Print or follow a server's log.
    Logs(LogsArgs),

    /// Print a server's URL.
    Url(UrlArgs),

    /// Forget a worktree and its server; the process keeps running.
    Detach(DetachArgs),

    /// Track a server that is already listening on a port.
    Attach(AttachArgs),

    /// Remove records of stopped servers and deleted worktrees.
    Prune(PruneArgs),

    /// Manage the Caddy reverse proxy.
    Proxy {
        #[command(subcommand)]
        command: ProxyCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Start(args) => args.run(),
        Commands::Stop(args) => args.run(),
        Commands::Restart(args) => args.run(),
        Commands::Ls(args) => args.run(),
        Commands::Status(args) => args.run(),
        Commands::Cleanup(args) => args.run(),
        Commands::Logs(args) => args.run(),
        Commands::Url(args) => args.run(),
        Commands::Detach(args) => args.run(),
        Commands::Attach(args) => args.run(),
        Commands::Prune(args) => args.run(),
        Commands::Proxy { command } => commands::proxy::run(command),
    }
}

/// Diagnostics go to stderr so `--json` output stays parseable.
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_env("GROVE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
