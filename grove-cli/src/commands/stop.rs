//! `grove stop` and `grove restart`.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use super::{resolve_name, GroveEnv};

#[derive(Args, Debug)]
pub struct StopArgs {
    /// Server to stop; defaults to the current worktree.
    pub name: Option<String>,

    /// Stop every running server.
    #[arg(long, conflicts_with = "name")]
    pub all: bool,

    /// Seconds to wait after SIGTERM before SIGKILL.
    #[arg(long)]
    pub timeout: Option<u64>,
}

impl StopArgs {
    pub fn run(self) -> Result<()> {
        let env = GroveEnv::load()?;
        let supervisor = env.supervisor()?;
        let timeout = stop_timeout(self.timeout, &env);

        if self.all {
            let report = supervisor.stop_all(timeout).context("failed to stop servers")?;
            if report.stopped.is_empty() && report.failed.is_empty() {
                println!("No running servers.");
            }
            for stopped in &report.stopped {
                println!("{} {}", "stopped".yellow().bold(), stopped.name);
            }
            for (name, reason) in &report.failed {
                eprintln!("{} {name}: {reason}", "failed".red().bold());
            }
            if !report.failed.is_empty() {
                anyhow::bail!("{} server(s) could not be stopped", report.failed.len());
            }
            return Ok(());
        }

        let name = resolve_name(self.name)?;
        let report = supervisor
            .stop(&name, timeout)
            .with_context(|| format!("failed to stop '{name}'"))?;
        let note = if report.forced {
            " (killed after timeout)"
        } else if report.already_exited {
            " (had already exited)"
        } else {
            ""
        };
        println!("{} {}{note}", "stopped".yellow().bold(), report.name);
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct RestartArgs {
    /// Server to restart; defaults to the current worktree.
    pub name: Option<String>,

    /// Seconds to wait after SIGTERM before SIGKILL.
    #[arg(long)]
    pub timeout: Option<u64>,
}

impl RestartArgs {
    pub fn run(self) -> Result<()> {
        let env = GroveEnv::load()?;
        let supervisor = env.supervisor()?;
        let name = resolve_name(self.name)?;

        let server = supervisor
            .restart(&name, stop_timeout(self.timeout, &env))
            .with_context(|| format!("failed to restart '{name}'"))?;
        println!(
            "{} {} on port {}",
            "restarted".green().bold(),
            server.name,
            server.port
        );
        println!("  url:  {}", server.url);
        Ok(())
    }
}

fn stop_timeout(secs: Option<u64>, env: &GroveEnv) -> Duration {
    secs.map(Duration::from_secs)
        .unwrap_or_else(|| env.config.stop_timeout())
}
