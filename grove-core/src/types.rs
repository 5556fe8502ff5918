//! Domain types for the grove registry.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.
//! Maps are `BTreeMap` so the serialized document has a stable key order and
//! a load → save cycle with no changes is byte-identical.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Registry key shared by a workspace and its server (sanitised branch or
/// directory name, e.g. `feature-auth`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkspaceName(pub String);

impl WorkspaceName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkspaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for WorkspaceName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for WorkspaceName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Lifecycle status of a supervised server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
    Crashed,
}

impl ServerStatus {
    /// `pid` is only meaningful in these states.
    pub fn is_live(self) -> bool {
        matches!(
            self,
            ServerStatus::Starting | ServerStatus::Running | ServerStatus::Stopping
        )
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerStatus::Stopped => write!(f, "stopped"),
            ServerStatus::Starting => write!(f, "starting"),
            ServerStatus::Running => write!(f, "running"),
            ServerStatus::Stopping => write!(f, "stopping"),
            ServerStatus::Crashed => write!(f, "crashed"),
        }
    }
}

/// Result of the most recent HTTP health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    #[default]
    Unknown,
    Healthy,
    Unhealthy,
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Health::Unknown => write!(f, "unknown"),
            Health::Healthy => write!(f, "healthy"),
            Health::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// A named unit of work bound to a checkout on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub name: WorkspaceName,
    /// Absolute path to the checkout root.
    pub path: PathBuf,
    #[serde(default)]
    pub branch: String,
    /// Main repository root when this workspace is a linked worktree.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_repo: Option<PathBuf>,
    #[serde(default)]
    pub git_dirty: bool,
    #[serde(default)]
    pub has_editor: bool,
    #[serde(default)]
    pub has_agent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovered_at: Option<DateTime<Utc>>,
}

impl Workspace {
    pub fn new(name: impl Into<WorkspaceName>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            branch: String::new(),
            main_repo: None,
            git_dirty: false,
            has_editor: false,
            has_agent: false,
            created_at: None,
            discovered_at: None,
        }
    }
}

/// A supervised OS process bound 1:1 to a [`Workspace`] by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    pub name: WorkspaceName,
    /// Working directory of the command.
    pub path: PathBuf,
    #[serde(default)]
    pub branch: String,
    pub port: u16,
    /// `0` means "not tracked as alive".
    #[serde(default)]
    pub pid: u32,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub status: ServerStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub health: Health,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_health_check: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    #[serde(default)]
    pub url: String,
}

impl Server {
    pub fn new(name: impl Into<WorkspaceName>, path: impl Into<PathBuf>, port: u16) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            branch: String::new(),
            port,
            pid: 0,
            command: Vec::new(),
            status: ServerStatus::Stopped,
            started_at: None,
            stopped_at: None,
            health: Health::Unknown,
            last_health_check: None,
            log_file: None,
            url: String::new(),
        }
    }

    /// Starting or Running.
    pub fn is_running(&self) -> bool {
        matches!(self.status, ServerStatus::Starting | ServerStatus::Running)
    }

    /// Records the terminal `Stopped` state: pid cleared, `stopped_at` set.
    pub fn mark_stopped(&mut self, at: DateTime<Utc>) {
        self.status = ServerStatus::Stopped;
        self.pid = 0;
        self.stopped_at = Some(at);
    }

    /// Time since start while live, or the length of the last run otherwise.
    pub fn uptime(&self, now: DateTime<Utc>) -> Duration {
        let Some(started) = self.started_at else {
            return Duration::ZERO;
        };
        let end = if self.is_running() {
            now
        } else {
            match self.stopped_at {
                Some(stopped) => stopped,
                None => return Duration::ZERO,
            }
        };
        (end - started).to_std().unwrap_or_default()
    }

    /// `"2h 5m"`, `"12m"`, or `"-"` when there is nothing to report.
    pub fn uptime_string(&self, now: DateTime<Utc>) -> String {
        let uptime = self.uptime(now);
        if uptime.is_zero() {
            return "-".to_string();
        }
        let minutes = uptime.as_secs() / 60;
        let hours = minutes / 60;
        if hours > 0 {
            format!("{hours}h {}m", minutes % 60)
        } else {
            format!("{minutes}m")
        }
    }
}

/// The optional external reverse-proxy process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProxyInfo {
    #[serde(default)]
    pub pid: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub http_port: u16,
    #[serde(default)]
    pub https_port: u16,
}

impl ProxyInfo {
    /// A pid was recorded. Callers must still probe it before trusting it.
    pub fn is_recorded(&self) -> bool {
        self.pid != 0
    }
}

/// Root of the persisted registry document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Registry {
    #[serde(default)]
    pub servers: BTreeMap<WorkspaceName, Server>,
    #[serde(default)]
    pub worktrees: BTreeMap<WorkspaceName, Workspace>,
    #[serde(default)]
    pub proxy: ProxyInfo,
}

impl Registry {
    pub fn server(&self, name: &WorkspaceName) -> Option<&Server> {
        self.servers.get(name)
    }

    pub fn set_server(&mut self, server: Server) {
        self.servers.insert(server.name.clone(), server);
    }

    pub fn remove_server(&mut self, name: &WorkspaceName) -> Option<Server> {
        self.servers.remove(name)
    }

    pub fn workspace(&self, name: &WorkspaceName) -> Option<&Workspace> {
        self.worktrees.get(name)
    }

    pub fn set_workspace(&mut self, workspace: Workspace) {
        self.worktrees.insert(workspace.name.clone(), workspace);
    }

    pub fn remove_workspace(&mut self, name: &WorkspaceName) -> Option<Workspace> {
        self.worktrees.remove(name)
    }

    /// Servers in Starting or Running state, ordered by name.
    pub fn running_servers(&self) -> impl Iterator<Item = &Server> {
        self.servers.values().filter(|s| s.is_running())
    }

    /// Ports claimed by live servers.
    pub fn used_ports(&self) -> BTreeSet<u16> {
        self.servers
            .values()
            .filter(|s| s.status.is_live())
            .map(|s| s.port)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn newtype_display() {
        assert_eq!(WorkspaceName::from("feature-auth").to_string(), "feature-auth");
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&ServerStatus::Stopping).expect("serialize");
        assert_eq!(json, "\"stopping\"");
    }

    #[test]
    fn used_ports_only_counts_live_servers() {
        let mut reg = Registry::default();
        let mut a = Server::new("a", "/tmp/a", 3001);
        a.status = ServerStatus::Running;
        a.pid = 10;
        let b = Server::new("b", "/tmp/b", 3002);
        reg.set_server(a);
        reg.set_server(b);
        let used = reg.used_ports();
        assert!(used.contains(&3001));
        assert!(!used.contains(&3002));
    }

    #[test]
    fn uptime_string_formats_hours_and_minutes() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 5, 0).unwrap();
        let mut server = Server::new("a", "/tmp/a", 3000);
        server.status = ServerStatus::Running;
        server.started_at = Some(start);
        assert_eq!(server.uptime_string(now), "2h 5m");

        server.mark_stopped(Utc.with_ymd_and_hms(2024, 1, 1, 10, 12, 0).unwrap());
        assert_eq!(server.uptime_string(now), "12m");
        assert_eq!(server.pid, 0);
    }

    #[test]
    fn uptime_is_zero_without_start() {
        let server = Server::new("a", "/tmp/a", 3000);
        assert_eq!(server.uptime_string(Utc::now()), "-");
    }
}
