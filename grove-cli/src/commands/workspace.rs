//! `grove url`, `grove detach` and `grove cleanup`.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use grove_core::RegistryStore;

use super::{resolve_name, GroveEnv};

#[derive(Args, Debug)]
pub struct UrlArgs {
    /// Server name; defaults to the current worktree.
    pub name: Option<String>,
}

impl UrlArgs {
    pub fn run(self) -> Result<()> {
        let env = GroveEnv::load()?;
        let name = resolve_name(self.name)?;
        let registry = env.store.load().context("failed to load registry")?;
        let server = registry
            .server(&name)
            .with_context(|| format!("no server named '{name}'; start it with 'grove start'"))?;
        println!("{}", server.url);
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct DetachArgs {
    /// Worktree to forget; defaults to the current one.
    pub name: Option<String>,
}

impl DetachArgs {
    pub fn run(self) -> Result<()> {
        let env = GroveEnv::load()?;
        let supervisor = env.supervisor()?;
        let name = resolve_name(self.name)?;
        let report = supervisor
            .detach(&name)
            .with_context(|| format!("failed to detach '{name}'"))?;
        println!("{} {name}", "detached".green().bold());
        if let Some(pid) = report.still_running {
            println!("  the process (pid {pid}) is still running; stop it with 'kill {pid}'");
        }
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct CleanupArgs {}

impl CleanupArgs {
    pub fn run(self) -> Result<()> {
        let env = GroveEnv::load()?;
        let supervisor = env.supervisor()?;
        let report = supervisor.cleanup().context("cleanup failed")?;
        if report.is_empty() {
            println!("Nothing to clean up.");
            return Ok(());
        }
        for name in &report.stopped {
            println!("{} {name} (process gone)", "stopped".yellow().bold());
        }
        for name in &report.removed_servers {
            println!("{} server {name}", "removed".red().bold());
        }
        for name in &report.removed_workspaces {
            println!("{} worktree {name}", "removed".red().bold());
        }
        Ok(())
    }
}
