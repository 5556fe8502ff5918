//! `grove attach` and `grove prune`: registry bookkeeping without spawning.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use grove_supervisor::{AttachRequest, PruneOptions};

use super::{current_workspace, print_json, GroveEnv};

// ---------------------------------------------------------------------------
// attach
// ---------------------------------------------------------------------------

#[derive(Args, Debug)]
pub struct AttachArgs {
    /// Port the running server listens on.
    #[arg(value_parser = clap::value_parser!(u16).range(1..))]
    pub port: u16,

    /// Server name; defaults to the sanitised branch name.
    #[arg(long)]
    pub name: Option<String>,

    /// Pid of the server process, so grove can notice when it exits.
    #[arg(long)]
    pub pid: Option<u32>,
}

impl AttachArgs {
    pub fn run(self) -> Result<()> {
        let env = GroveEnv::load()?;
        let supervisor = env.supervisor()?;
        let (info, project) = current_workspace()?;
        let name = self.name.unwrap_or_else(|| project.effective_name(&info.name));

        let req = AttachRequest::new(name.as_str(), self.port, &info.path)
            .with_pid(self.pid)
            .with_branch(info.branch.clone());
        let report = supervisor
            .attach(req)
            .with_context(|| format!("failed to attach '{name}'"))?;

        if report.already_attached {
            println!("{} is already attached on port {}", name.bold(), self.port);
        } else {
            println!("{} {} on port {}", "attached".green().bold(), name.bold(), self.port);
        }
        println!("  url:  {}", report.server.url);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// prune
// ---------------------------------------------------------------------------

#[derive(Args, Debug)]
pub struct PruneArgs {
    /// Remove records of servers that are not running.
    #[arg(long)]
    pub stopped: bool,

    /// Remove records whose worktree directory is gone.
    #[arg(long)]
    pub orphaned: bool,

    /// Only list what would be removed.
    #[arg(long)]
    pub dry_run: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl PruneArgs {
    pub fn run(self) -> Result<()> {
        let env = GroveEnv::load()?;
        let supervisor = env.supervisor()?;
        let report = supervisor
            .prune(PruneOptions {
                stopped: self.stopped,
                orphaned: self.orphaned,
                dry_run: self.dry_run,
            })
            .context("prune failed")?;

        if self.json {
            return print_json(&report);
        }
        if report.is_empty() {
            println!("Nothing to prune.");
            return Ok(());
        }

        let verb = if report.dry_run { "would remove" } else { "removed" };
        for name in &report.stopped {
            println!("{} {name} (stopped)", verb.red().bold());
        }
        for name in &report.orphaned {
            println!("{} {name} (directory gone)", verb.red().bold());
        }
        Ok(())
    }
}
