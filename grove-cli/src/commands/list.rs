//! `grove ls` and `grove status`.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use grove_core::{RegistryStore, Server};
use grove_supervisor::refresh_health;

use super::{cleanup_or_warn, load_project, print_json, resolve_name, status_label, GroveEnv};

// ---------------------------------------------------------------------------
// ls
// ---------------------------------------------------------------------------

#[derive(Args, Debug)]
pub struct LsArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct ServerRow {
    #[tabled(rename = "name")]
    name: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "port")]
    port: u16,
    #[tabled(rename = "url")]
    url: String,
    #[tabled(rename = "uptime")]
    uptime: String,
    #[tabled(rename = "path")]
    path: String,
}

impl LsArgs {
    pub fn run(self) -> Result<()> {
        let env = GroveEnv::load()?;
        let supervisor = env.supervisor()?;
        cleanup_or_warn(&supervisor);

        let registry = env.store.load().context("failed to load registry")?;
        let servers: Vec<&Server> = registry.servers.values().collect();
        if self.json {
            return print_json(&servers);
        }

        if servers.is_empty() {
            println!("No servers registered. Run 'grove start' in a worktree.");
            return Ok(());
        }

        let now = Utc::now();
        let rows: Vec<ServerRow> = servers
            .iter()
            .map(|server| ServerRow {
                name: server.name.to_string(),
                status: status_label(server.status),
                port: server.port,
                url: server.url.clone(),
                uptime: if server.is_running() {
                    server.uptime_string(now)
                } else {
                    "-".to_string()
                },
                path: server.path.display().to_string(),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        let running = registry.running_servers().count();
        println!("{running} running, {} total", servers.len());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// status
// ---------------------------------------------------------------------------

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Server to inspect; defaults to the current worktree.
    pub name: Option<String>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct StatusJson<'a> {
    #[serde(flatten)]
    server: &'a Server,
    uptime: Option<String>,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let env = GroveEnv::load()?;
        let supervisor = env.supervisor()?;
        cleanup_or_warn(&supervisor);
        let name = resolve_name(self.name)?;

        let registry = env.store.load().context("failed to load registry")?;
        let server = registry
            .server(&name)
            .with_context(|| format!("no server named '{name}'; run 'grove ls' to list servers"))?;
        let project = load_project(&server.path)?;
        refresh_health(&env.store, &name, project.health_check.path.as_deref())
            .with_context(|| format!("failed to check health of '{name}'"))?;

        let registry = env.store.load().context("failed to load registry")?;
        let server = registry
            .server(&name)
            .with_context(|| format!("'{name}' disappeared from the registry"))?;
        let now = Utc::now();
        let uptime = server.is_running().then(|| server.uptime_string(now));

        if self.json {
            return print_json(&StatusJson { server, uptime });
        }

        println!("{}  {}", server.name.to_string().bold(), status_label(server.status));
        println!("  url:     {}", server.url);
        println!("  port:    {}", server.port);
        if server.pid > 0 {
            println!("  pid:     {}", server.pid);
        }
        if !server.branch.is_empty() {
            println!("  branch:  {}", server.branch);
        }
        println!("  path:    {}", server.path.display());
        println!("  health:  {}", server.health);
        if let Some(uptime) = uptime {
            println!("  uptime:  {uptime}");
        }
        if let Some(log) = &server.log_file {
            println!("  logs:    {}", log.display());
        }
        Ok(())
    }
}
