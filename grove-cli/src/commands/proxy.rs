//! `grove proxy`: Caddy lifecycle and route listing.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use grove_core::RegistryStore;
use grove_proxy::{lifecycle, routes};
use grove_supervisor::Termination;

use super::{print_json, GroveEnv};

#[derive(Subcommand, Debug)]
pub enum ProxyCommand {
    /// Write the Caddyfile and start Caddy in the background.
    Start,
    /// Stop the background Caddy process.
    Stop,
    /// Show whether Caddy is running.
    Status(ProxyStatusArgs),
    /// List routes of running servers.
    Routes,
}

#[derive(Args, Debug)]
pub struct ProxyStatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct RouteRow {
    #[tabled(rename = "name")]
    name: String,
    #[tabled(rename = "host")]
    host: String,
    #[tabled(rename = "upstream")]
    upstream: String,
}

pub fn run(command: ProxyCommand) -> Result<()> {
    let env = GroveEnv::load()?;

    match command {
        ProxyCommand::Start => {
            let router = env.router()?;
            let info = lifecycle::start(&env.store, &router, &env.proxy_log())
                .context("failed to start proxy")?;
            println!(
                "{} proxy (pid {}, http {}, https {})",
                "started".green().bold(),
                info.pid,
                info.http_port,
                info.https_port
            );
            println!("  config: {}", router.caddyfile().display());
            println!("  logs:   {}", env.proxy_log().display());
        }
        ProxyCommand::Stop => {
            match lifecycle::stop(&env.store, env.config.stop_timeout())
                .context("failed to stop proxy")?
            {
                None | Some(Termination::AlreadyGone) => println!("proxy is not running"),
                Some(_) => println!("{} proxy", "stopped".yellow().bold()),
            }
        }
        ProxyCommand::Status(args) => {
            let status = lifecycle::status(&env.store).context("failed to read proxy status")?;
            if args.json {
                return print_json(&status);
            }
            if status.running {
                println!(
                    "proxy {} (pid {}, http {}, https {})",
                    "running".green().bold(),
                    status.info.pid,
                    status.info.http_port,
                    status.info.https_port
                );
            } else {
                println!("proxy {}", "stopped".bright_black());
            }
        }
        ProxyCommand::Routes => {
            let registry = env.store.load().context("failed to load registry")?;
            let rows: Vec<RouteRow> = routes(&registry, &env.config.tld)
                .into_iter()
                .filter(|r| r.is_running())
                .map(|r| RouteRow {
                    name: r.name.clone(),
                    host: format!("{}, {}", r.host, r.wildcard_host()),
                    upstream: format!("localhost:{}", r.port),
                })
                .collect();
            if rows.is_empty() {
                println!("No running servers to route.");
                return Ok(());
            }
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            println!("{table}");
        }
    }

    Ok(())
}
