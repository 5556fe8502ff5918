//! Registry-only bookkeeping: adopting servers grove did not spawn and
//! pruning records that no longer earn their place.
//!
//! Nothing here spawns or signals a process.

use std::path::{Path, PathBuf};

use chrono::Utc;
use grove_core::{port, Health, Registry, RegistryStore, Server, ServerStatus, WorkspaceName};
use serde::Serialize;

use crate::error::SupervisorError;
use crate::process;
use crate::supervisor::{check_name, Supervisor};

// ---------------------------------------------------------------------------
// 1. Attach
// ---------------------------------------------------------------------------

/// A server already listening on `port`, started outside grove.
#[derive(Debug, Clone)]
pub struct AttachRequest {
    pub name: WorkspaceName,
    pub port: u16,
    /// Pid to track; without one the record is reconciled by port alone.
    pub pid: Option<u32>,
    pub path: PathBuf,
    pub branch: String,
}

impl AttachRequest {
    pub fn new(name: impl Into<WorkspaceName>, port: u16, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            port,
            pid: None,
            path: path.into(),
            branch: String::new(),
        }
    }

    pub fn with_pid(mut self, pid: Option<u32>) -> Self {
        self.pid = pid;
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachReport {
    pub server: Server,
    /// The same name was already tracked on the same port; nothing changed.
    pub already_attached: bool,
}

/// A live record whose process, if known, still exists.
fn holds_port(server: &Server) -> bool {
    server.status.is_live() && (server.pid == 0 || process::is_alive(server.pid))
}

// ---------------------------------------------------------------------------
// 2. Prune
// ---------------------------------------------------------------------------

/// What to prune. With neither category selected, both are pruned.
#[derive(Debug, Clone, Copy, Default)]
pub struct PruneOptions {
    pub stopped: bool,
    pub orphaned: bool,
    pub dry_run: bool,
}

impl PruneOptions {
    fn categories(self) -> (bool, bool) {
        if !self.stopped && !self.orphaned {
            (true, true)
        } else {
            (self.stopped, self.orphaned)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    /// Server records that were not live.
    pub stopped: Vec<WorkspaceName>,
    /// Server or workspace records whose path is gone.
    pub orphaned: Vec<WorkspaceName>,
    pub dry_run: bool,
}

impl PruneReport {
    pub fn is_empty(&self) -> bool {
        self.stopped.is_empty() && self.orphaned.is_empty()
    }
}

fn plan_prune(registry: &Registry, opts: PruneOptions) -> PruneReport {
    let (stopped, orphaned) = opts.categories();
    let gone = |path: &Path| !path.as_os_str().is_empty() && !path.exists();
    let mut report = PruneReport {
        dry_run: opts.dry_run,
        ..PruneReport::default()
    };

    if stopped {
        report.stopped = registry
            .servers
            .values()
            .filter(|s| !s.status.is_live())
            .map(|s| s.name.clone())
            .collect();
    }
    if orphaned {
        let servers = registry.servers.values().map(|s| (&s.name, &s.path));
        let workspaces = registry.worktrees.values().map(|w| (&w.name, &w.path));
        for (name, path) in servers.chain(workspaces) {
            if gone(path) && !report.stopped.contains(name) && !report.orphaned.contains(name) {
                report.orphaned.push(name.clone());
            }
        }
    }
    report
}

// ---------------------------------------------------------------------------
// 3. Operations
// ---------------------------------------------------------------------------

impl<S: RegistryStore> Supervisor<S> {
    /// Track a server that something else started. The port must already
    /// accept connections and must not belong to another live server.
    pub fn attach(&self, req: AttachRequest) -> Result<AttachReport, SupervisorError> {
        check_name(&req.name)?;
        if req.port == 0 || !port::is_listening(req.port) {
            return Err(SupervisorError::NotListening { port: req.port });
        }

        let registry = self.store().load()?;
        if let Some(existing) = registry.server(&req.name) {
            if existing.port == req.port && holds_port(existing) {
                return Ok(AttachReport {
                    server: existing.clone(),
                    already_attached: true,
                });
            }
            if holds_port(existing) {
                return Err(SupervisorError::AlreadyRunning {
                    name: req.name.clone(),
                    url: existing.url.clone(),
                    port: existing.port,
                });
            }
        }
        if let Some(owner) = registry
            .servers
            .values()
            .find(|s| s.port == req.port && s.name != req.name && holds_port(s))
        {
            return Err(SupervisorError::PortClaimed {
                port: req.port,
                owner: owner.name.clone(),
            });
        }

        let mut server = Server::new(req.name.clone(), &req.path, req.port);
        server.branch = req.branch;
        server.pid = req.pid.unwrap_or(0);
        server.status = ServerStatus::Running;
        server.started_at = Some(Utc::now());
        server.health = Health::Unknown;
        server.url = self.config().server_url(req.name.as_str(), req.port);
        self.store().set(server.clone())?;
        tracing::info!(name = %req.name, port = req.port, pid = server.pid, "attached external server");

        self.publish();
        Ok(AttachReport {
            server,
            already_attached: false,
        })
    }

    /// Drop records of servers that are not live and of paths that no
    /// longer exist. A dry run only reports.
    pub fn prune(&self, opts: PruneOptions) -> Result<PruneReport, SupervisorError> {
        let planned = plan_prune(&self.store().load()?, opts);
        if opts.dry_run || planned.is_empty() {
            return Ok(planned);
        }

        let report = self.store().update(|reg| {
            let report = plan_prune(reg, opts);
            for name in &report.stopped {
                reg.remove_server(name);
            }
            for name in &report.orphaned {
                reg.remove_server(name);
                reg.remove_workspace(name);
            }
            report
        })?;
        tracing::info!(
            stopped = report.stopped.len(),
            orphaned = report.orphaned.len(),
            "registry pruned"
        );
        self.publish();
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grove_core::Workspace;

    fn server(name: &str, path: &str, status: ServerStatus) -> Server {
        let mut s = Server::new(name, path, 3100);
        s.status = status;
        s
    }

    #[test]
    fn empty_options_select_both_categories() {
        assert_eq!(PruneOptions::default().categories(), (true, true));
        let only_stopped = PruneOptions {
            stopped: true,
            ..PruneOptions::default()
        };
        assert_eq!(only_stopped.categories(), (true, false));
    }

    #[test]
    fn orphan_is_not_listed_twice() {
        let mut reg = Registry::default();
        reg.set_server(server("gone", "/definitely/not/here/grove", ServerStatus::Stopped));
        reg.set_workspace(Workspace::new("gone", "/definitely/not/here/grove"));
        reg.set_server(server("lost", "/definitely/not/here/grove2", ServerStatus::Running));
        reg.set_workspace(Workspace::new("lost", "/definitely/not/here/grove2"));

        let report = plan_prune(&reg, PruneOptions::default());
        assert_eq!(report.stopped, vec![WorkspaceName::from("gone")]);
        assert_eq!(report.orphaned, vec![WorkspaceName::from("lost")]);
    }

    #[test]
    fn empty_paths_are_never_orphans() {
        let mut reg = Registry::default();
        reg.set_server(server("attached", "", ServerStatus::Running));
        let opts = PruneOptions {
            orphaned: true,
            ..PruneOptions::default()
        };
        assert!(plan_prune(&reg, opts).is_empty());
    }
}
