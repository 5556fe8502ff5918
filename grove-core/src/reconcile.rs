//! Liveness reconciliation.
//!
//! Crash detection is pull-based: callers run [`cleanup`] on read paths or on
//! demand, and it aligns the registry with what the OS reports. The pass is
//! idempotent; a second run with no intervening change reports nothing and
//! does not rewrite the document.

use std::path::Path;

use serde::Serialize;

use crate::error::RegistryError;
use crate::port;
use crate::registry::RegistryStore;
use crate::types::{Registry, ServerStatus, WorkspaceName};

/// OS observations the reconciler relies on.
pub trait LivenessProbe {
    /// Zero-signal probe: does `pid` still name a live process?
    fn is_alive(&self, pid: u32) -> bool;

    /// Does something accept connections on loopback `port`?
    fn is_listening(&self, port: u16) -> bool {
        port::is_listening(port)
    }

    fn path_exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// What a reconciliation pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Servers demoted to Stopped because their process is gone.
    pub stopped: Vec<WorkspaceName>,
    /// Servers removed because their path no longer exists.
    pub removed_servers: Vec<WorkspaceName>,
    /// Workspaces removed because their path no longer exists.
    pub removed_workspaces: Vec<WorkspaceName>,
}

impl CleanupReport {
    pub fn is_empty(&self) -> bool {
        self.stopped.is_empty()
            && self.removed_servers.is_empty()
            && self.removed_workspaces.is_empty()
    }
}

/// Load, reconcile, and save (only when something changed).
pub fn cleanup<S, P>(store: &S, probe: &P) -> Result<CleanupReport, RegistryError>
where
    S: RegistryStore,
    P: LivenessProbe + ?Sized,
{
    let mut registry = store.load()?;
    let report = reconcile(&mut registry, probe, chrono::Utc::now());
    if !report.is_empty() {
        tracing::info!(
            stopped = report.stopped.len(),
            removed_servers = report.removed_servers.len(),
            removed_workspaces = report.removed_workspaces.len(),
            "registry reconciled",
        );
        store.save(&registry)?;
    }
    Ok(report)
}

/// One in-memory reconciliation pass.
///
/// - A workspace or server whose path is missing is removed outright, along
///   with the record of the same name in the other map.
/// - A live server (Starting, Running, Stopping) whose pid is dead is demoted
///   to Stopped with its pid cleared.
/// - A Running server with no pid is demoted when nothing listens on its port.
///
/// Stopped entries with a valid path are kept for restart and port reuse.
pub fn reconcile<P>(
    registry: &mut Registry,
    probe: &P,
    now: chrono::DateTime<chrono::Utc>,
) -> CleanupReport
where
    P: LivenessProbe + ?Sized,
{
    let mut report = CleanupReport::default();

    let missing_workspaces: Vec<WorkspaceName> = registry
        .worktrees
        .values()
        .filter(|ws| !ws.path.as_os_str().is_empty() && !probe.path_exists(&ws.path))
        .map(|ws| ws.name.clone())
        .collect();
    let missing_servers: Vec<WorkspaceName> = registry
        .servers
        .values()
        .filter(|s| !s.path.as_os_str().is_empty() && !probe.path_exists(&s.path))
        .map(|s| s.name.clone())
        .collect();

    for name in missing_workspaces.iter().chain(missing_servers.iter()) {
        if registry.remove_workspace(name).is_some() {
            report.removed_workspaces.push(name.clone());
        }
        if registry.remove_server(name).is_some() {
            report.removed_servers.push(name.clone());
        }
    }

    for server in registry.servers.values_mut() {
        if server.pid > 0 {
            if server.status.is_live() && !probe.is_alive(server.pid) {
                tracing::debug!(name = %server.name, pid = server.pid, "recorded pid is gone");
                server.mark_stopped(now);
                report.stopped.push(server.name.clone());
            }
        } else if server.status == ServerStatus::Running
            && server.port > 0
            && !probe.is_listening(server.port)
        {
            server.mark_stopped(now);
            report.stopped.push(server.name.clone());
        }
    }

    report
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
