//! Subcommand implementations and the state they share.

pub mod list;
pub mod logs;
pub mod proxy;
pub mod start;
pub mod stop;
pub mod track;
pub mod workspace;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use colored::Colorize;

use grove_core::{paths, GroveConfig, JsonFileStore, ProjectConfig, ServerStatus, WorkspaceName};
use grove_detector::{detect_or_directory, WorkspaceInfo};
use grove_proxy::ProxyRouter;
use grove_supervisor::Supervisor;

/// Home directory, global config and registry for one invocation.
pub struct GroveEnv {
    pub home: PathBuf,
    pub config: GroveConfig,
    pub store: JsonFileStore,
}

impl GroveEnv {
    pub fn load() -> Result<Self> {
        let home = dirs::home_dir().context("could not determine home directory")?;
        let config = GroveConfig::load_at(&home).context("failed to load grove config")?;
        Ok(Self {
            store: JsonFileStore::at(&home),
            home,
            config,
        })
    }

    pub fn router(&self) -> Result<ProxyRouter> {
        ProxyRouter::at(&self.home, self.config.clone()).context("failed to prepare proxy routes")
    }

    /// Supervisor over the registry that republishes routes to Caddy.
    pub fn supervisor(&self) -> Result<Supervisor<JsonFileStore>> {
        let log_dir = self.config.log_dir_at(&self.home);
        Ok(
            Supervisor::new(self.store.clone(), self.config.clone(), log_dir)
                .with_publisher(self.router()?),
        )
    }

    pub fn proxy_log(&self) -> PathBuf {
        paths::proxy_log_path(&self.home)
    }
}

/// Run the reconciler; failure only warns so read paths stay usable.
pub fn cleanup_or_warn(supervisor: &Supervisor<JsonFileStore>) {
    if let Err(err) = supervisor.cleanup() {
        eprintln!("{} cleanup failed: {err}", "warning:".yellow().bold());
    }
}

/// The checkout containing the current directory, plus its project config.
pub fn current_workspace() -> Result<(WorkspaceInfo, ProjectConfig)> {
    let cwd = std::env::current_dir().context("could not determine current directory")?;
    let info = detect_or_directory(&cwd)
        .with_context(|| format!("failed to detect workspace at {}", cwd.display()))?;
    let project = load_project(&info.path)?;
    Ok((info, project))
}

pub fn load_project(root: &Path) -> Result<ProjectConfig> {
    Ok(ProjectConfig::load(root)
        .with_context(|| format!("failed to read {}", ProjectConfig::path_for(root).display()))?
        .unwrap_or_default())
}

/// Explicit name, else the name of the workspace in the current directory.
pub fn resolve_name(name: Option<String>) -> Result<WorkspaceName> {
    if let Some(name) = name {
        return Ok(WorkspaceName::from(name));
    }
    let (info, project) = current_workspace()?;
    Ok(WorkspaceName::from(project.effective_name(&info.name)))
}

pub fn status_label(status: ServerStatus) -> String {
    let label = status.to_string();
    match status {
        ServerStatus::Running => label.green().bold().to_string(),
        ServerStatus::Starting | ServerStatus::Stopping => label.yellow().bold().to_string(),
        ServerStatus::Crashed => label.red().bold().to_string(),
        ServerStatus::Stopped => label.bright_black().to_string(),
    }
}

pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to serialize JSON output")?
    );
    Ok(())
}
