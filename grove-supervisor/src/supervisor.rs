//! Start, stop and restart servers against a [`RegistryStore`].
//!
//! Every operation is a sequence of short load/modify/save cycles around the
//! blocking parts (spawn probe, termination wait). A transition that is about
//! to block is saved first, so an interrupted invocation leaves a state the
//! reconciler can repair.

use std::collections::{BTreeMap, BTreeSet};
use std::error::Error as StdError;
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;

use chrono::Utc;
use grove_core::name::{is_valid_name, sanitize};
use grove_core::project::{Hooks, DEFAULT_URL_VAR};
use grove_core::{
    port, CleanupReport, GroveConfig, Health, ProjectConfig, Registry, RegistryStore, Server,
    ServerStatus, Workspace, WorkspaceName,
};
use serde::Serialize;

use crate::error::SupervisorError;
use crate::hooks::{run_hooks, run_hooks_lenient, HookStage};
use crate::log_rotation::LogRotation;
use crate::logs::log_path;
use crate::process::{self, DetachedCommand, OsProbe, Termination};

// ---------------------------------------------------------------------------
// 1. Route publishing seam
// ---------------------------------------------------------------------------

/// Receives the full registry after every change to the set of servers.
pub trait RoutePublisher {
    /// Returns `Ok(true)` when routes were pushed somewhere live.
    fn publish(&self, registry: &Registry) -> Result<bool, Box<dyn StdError + Send + Sync>>;
}

/// Publisher for setups without a proxy.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPublisher;

impl RoutePublisher for NoopPublisher {
    fn publish(&self, _registry: &Registry) -> Result<bool, Box<dyn StdError + Send + Sync>> {
        Ok(false)
    }
}

// ---------------------------------------------------------------------------
// 2. Requests and reports
// ---------------------------------------------------------------------------

/// Everything needed to start one server.
#[derive(Debug, Clone)]
pub struct StartRequest {
    pub name: WorkspaceName,
    pub path: PathBuf,
    pub command: Vec<String>,
    pub branch: String,
    pub main_repo: Option<PathBuf>,
    /// Explicit port; otherwise the recorded port or a hashed one.
    pub port: Option<u16>,
    pub env: BTreeMap<String, String>,
    pub url_var: String,
    pub hooks: Hooks,
}

impl StartRequest {
    pub fn new(name: impl Into<WorkspaceName>, path: impl Into<PathBuf>, command: Vec<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            command,
            branch: String::new(),
            main_repo: None,
            port: None,
            env: BTreeMap::new(),
            url_var: DEFAULT_URL_VAR.to_string(),
            hooks: Hooks::default(),
        }
    }

    /// Take env, URL variable, hooks and the fixed port from a project file.
    /// The command is left alone; callers decide between CLI and project.
    pub fn with_project(mut self, project: &ProjectConfig) -> Self {
        self.env.extend(project.env.clone());
        self.url_var = project.url_var().to_string();
        self.hooks = project.hooks.clone();
        if self.port.is_none() {
            self.port = project.port;
        }
        self
    }

    pub fn with_port(mut self, port: Option<u16>) -> Self {
        if port.is_some() {
            self.port = port;
        }
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    pub fn with_main_repo(mut self, main_repo: Option<PathBuf>) -> Self {
        self.main_repo = main_repo;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StopReport {
    pub name: WorkspaceName,
    pub pid: u32,
    /// SIGKILL was needed.
    pub forced: bool,
    /// The process was gone before it was signalled.
    pub already_exited: bool,
}

#[derive(Debug, Default, Serialize)]
pub struct StopAllReport {
    pub stopped: Vec<StopReport>,
    pub failed: Vec<(WorkspaceName, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetachReport {
    pub name: WorkspaceName,
    pub removed_server: bool,
    pub removed_workspace: bool,
    /// Pid of a detached server that is still alive.
    pub still_running: Option<u32>,
}

// ---------------------------------------------------------------------------
// 3. Supervisor
// ---------------------------------------------------------------------------

pub struct Supervisor<S: RegistryStore> {
    store: S,
    config: GroveConfig,
    log_dir: PathBuf,
    publisher: Box<dyn RoutePublisher>,
}

impl<S: RegistryStore> Supervisor<S> {
    pub fn new(store: S, config: GroveConfig, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            config,
            log_dir: log_dir.into(),
            publisher: Box::new(NoopPublisher),
        }
    }

    pub fn with_publisher(mut self, publisher: impl RoutePublisher + 'static) -> Self {
        self.publisher = Box::new(publisher);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &GroveConfig {
        &self.config
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    // -- start -------------------------------------------------------------

    /// Spawn the server for `req.name` and record it as Running.
    ///
    /// Fails with a conflict if the recorded process is still alive. When the
    /// process dies during the startup probe the record is left as Crashed
    /// and the error points at the log.
    pub fn start(&self, req: StartRequest) -> Result<Server, SupervisorError> {
        check_name(&req.name)?;
        if req.command.is_empty() {
            return Err(SupervisorError::EmptyCommand);
        }
        let name = req.name.clone();
        let registry = self.store.load()?;
        let previous = registry.server(&name).cloned();

        if let Some(existing) = &previous {
            if existing.status.is_live() && process::is_alive(existing.pid) {
                return Err(SupervisorError::AlreadyRunning {
                    name,
                    url: existing.url.clone(),
                    port: existing.port,
                });
            }
        }

        let mut used = registry.used_ports();
        if let Some(existing) = &previous {
            used.remove(&existing.port);
        }
        let port = self.resolve_port(&req, previous.as_ref(), &used)?;
        let url = self.config.server_url(name.as_str(), port);

        let mut env: Vec<(String, String)> = vec![
            ("PORT".to_string(), port.to_string()),
            (req.url_var.clone(), url.clone()),
        ];
        env.extend(req.env.iter().map(|(k, v)| (k.clone(), v.clone())));

        run_hooks(HookStage::BeforeStart, &req.hooks.before_start, &req.path, &env)?;

        let log_file = log_path(&self.log_dir, &name);
        LogRotation::from_config(&self.config).rotate_or_warn(&log_file);

        let pid = DetachedCommand::new(req.command.clone(), &req.path, &log_file)
            .envs(env.iter().cloned())
            .spawn()?;

        let now = Utc::now();
        let mut server = previous.unwrap_or_else(|| Server::new(name.clone(), &req.path, port));
        server.path = req.path.clone();
        server.branch = req.branch.clone();
        server.port = port;
        server.pid = pid;
        server.command = req.command.clone();
        server.status = ServerStatus::Starting;
        server.started_at = Some(now);
        server.stopped_at = None;
        server.health = Health::Unknown;
        server.last_health_check = None;
        server.log_file = Some(log_file.clone());
        server.url = url;

        if let Err(err) = self.store.set(server.clone()) {
            let _ = process::terminate(pid, self.config.stop_timeout());
            return Err(err.into());
        }
        tracing::info!(name = %name, pid, port, "server starting");

        sleep(self.config.start_probe());
        if !process::is_alive(pid) {
            server.status = ServerStatus::Crashed;
            server.pid = 0;
            server.stopped_at = Some(Utc::now());
            self.store.set(server)?;
            tracing::warn!(name = %name, pid, "server exited during startup probe");
            return Err(SupervisorError::ProbeFailed { name, log_file });
        }

        server.status = ServerStatus::Running;
        let running = server.clone();
        self.store.update(|reg| {
            reg.set_server(server);
            let mut workspace = reg
                .workspace(&name)
                .cloned()
                .unwrap_or_else(|| Workspace::new(name.clone(), &req.path));
            workspace.path = req.path.clone();
            if !req.branch.is_empty() {
                workspace.branch = req.branch.clone();
            }
            if req.main_repo.is_some() {
                workspace.main_repo = req.main_repo.clone();
            }
            workspace.created_at.get_or_insert(now);
            workspace.discovered_at = Some(now);
            reg.set_workspace(workspace);
        })?;
        tracing::info!(name = %name, pid, port, url = %running.url, "server running");

        self.publish();
        run_hooks_lenient(HookStage::AfterStart, &req.hooks.after_start, &req.path, &env);
        Ok(running)
    }

    /// Explicit port, then the previously recorded one if still free, then
    /// the hash allocator skipping ports the OS reports busy.
    fn resolve_port(
        &self,
        req: &StartRequest,
        previous: Option<&Server>,
        used: &BTreeSet<u16>,
    ) -> Result<u16, SupervisorError> {
        if let Some(port) = req.port {
            if used.contains(&port) || !port::is_available(port) {
                return Err(SupervisorError::PortInUse { port });
            }
            return Ok(port);
        }
        if let Some(prev) = previous.filter(|s| s.port > 0) {
            if !used.contains(&prev.port) && port::is_available(prev.port) {
                return Ok(prev.port);
            }
            tracing::debug!(name = %prev.name, port = prev.port, "recorded port is busy, reallocating");
        }
        Ok(self
            .config
            .allocator()
            .allocate_available(req.name.as_str(), used, port::is_available)?)
    }

    /// Block until the server's port accepts connections.
    pub fn wait_until_listening(&self, server: &Server, timeout: Duration) -> Result<(), SupervisorError> {
        if port::wait_for_port(server.port, timeout) {
            Ok(())
        } else {
            Err(SupervisorError::Timeout {
                port: server.port,
                secs: timeout.as_secs(),
            })
        }
    }

    // -- stop --------------------------------------------------------------

    /// SIGTERM, wait up to `timeout`, then SIGKILL. Always ends Stopped.
    pub fn stop(&self, name: &WorkspaceName, timeout: Duration) -> Result<StopReport, SupervisorError> {
        let report = self.stop_one(name, timeout)?;
        self.publish();
        Ok(report)
    }

    fn stop_one(&self, name: &WorkspaceName, timeout: Duration) -> Result<StopReport, SupervisorError> {
        let registry = self.store.load()?;
        let server = registry
            .server(name)
            .ok_or_else(|| SupervisorError::NotFound(name.clone()))?;
        if !server.status.is_live() {
            return Err(SupervisorError::NotRunning(name.clone()));
        }

        let project = project_at(&server.path);
        let mut env = vec![
            ("PORT".to_string(), server.port.to_string()),
            (project.url_var().to_string(), server.url.clone()),
        ];
        env.extend(project.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        run_hooks_lenient(HookStage::BeforeStop, &project.hooks.before_stop, &server.path, &env);

        let pid = self.store.try_update(|reg| {
            let server = reg
                .servers
                .get_mut(name)
                .ok_or_else(|| SupervisorError::NotFound(name.clone()))?;
            server.status = ServerStatus::Stopping;
            Ok::<_, SupervisorError>(server.pid)
        })?;

        let outcome = if pid == 0 {
            Ok(Termination::AlreadyGone)
        } else {
            process::terminate(pid, timeout)
        };

        // Recorded as stopped even when signalling failed; the pid is no
        // longer ours to track.
        self.store.update(|reg| {
            if let Some(server) = reg.servers.get_mut(name) {
                server.mark_stopped(Utc::now());
            }
        })?;

        let outcome = outcome?;
        tracing::info!(name = %name, pid, ?outcome, "server stopped");
        Ok(StopReport {
            name: name.clone(),
            pid,
            forced: outcome == Termination::Forced,
            already_exited: outcome == Termination::AlreadyGone,
        })
    }

    /// Stop every live server; individual failures are collected.
    pub fn stop_all(&self, timeout: Duration) -> Result<StopAllReport, SupervisorError> {
        let registry = self.store.load()?;
        let live: Vec<WorkspaceName> = registry
            .servers
            .values()
            .filter(|s| s.status.is_live())
            .map(|s| s.name.clone())
            .collect();

        let mut report = StopAllReport::default();
        for name in live {
            match self.stop_one(&name, timeout) {
                Ok(stopped) => report.stopped.push(stopped),
                Err(err) => {
                    tracing::warn!(name = %name, error = %err, "stop failed");
                    report.failed.push((name, err.to_string()));
                }
            }
        }
        self.publish();
        Ok(report)
    }

    // -- restart -----------------------------------------------------------

    /// Stop (if live) and start again with the recorded command and path.
    pub fn restart(&self, name: &WorkspaceName, timeout: Duration) -> Result<Server, SupervisorError> {
        let registry = self.store.load()?;
        let server = registry
            .server(name)
            .cloned()
            .ok_or_else(|| SupervisorError::NotFound(name.clone()))?;
        if server.command.is_empty() {
            return Err(SupervisorError::NoCommand(name.clone()));
        }

        if server.status.is_live() {
            self.stop_one(name, timeout)?;
        }

        let mut req = StartRequest::new(name.clone(), &server.path, server.command.clone())
            .with_branch(server.branch.clone())
            .with_project(&project_at(&server.path));
        // A restart keeps the port it had.
        req.port = None;
        self.start(req)
    }

    // -- detach / cleanup --------------------------------------------------

    /// Forget a workspace and its server without touching the process.
    /// A server that is still alive keeps running untracked; its pid is
    /// returned so the caller can point it out.
    pub fn detach(&self, name: &WorkspaceName) -> Result<DetachReport, SupervisorError> {
        let (removed_server, removed_workspace) = self.store.try_update(|reg| {
            let server = reg.remove_server(name);
            let workspace = reg.remove_workspace(name);
            if server.is_none() && workspace.is_none() {
                return Err(SupervisorError::NotFound(name.clone()));
            }
            Ok((server, workspace.is_some()))
        })?;

        let still_running = removed_server
            .as_ref()
            .filter(|s| s.status.is_live() && s.pid > 0 && process::is_alive(s.pid))
            .map(|s| s.pid);
        tracing::info!(name = %name, ?still_running, "detached");
        self.publish();
        Ok(DetachReport {
            name: name.clone(),
            removed_server: removed_server.is_some(),
            removed_workspace,
            still_running,
        })
    }

    /// Reconcile against the OS. Routes are republished when servers were
    /// removed.
    pub fn cleanup(&self) -> Result<CleanupReport, SupervisorError> {
        let report = grove_core::cleanup(&self.store, &OsProbe)?;
        if !report.removed_servers.is_empty() {
            self.publish();
        }
        Ok(report)
    }

    /// Push the current registry to the route publisher. Failures are
    /// warnings; routes self-heal on the next change.
    pub fn publish(&self) -> bool {
        let registry = match self.store.load() {
            Ok(registry) => registry,
            Err(err) => {
                tracing::warn!(error = %err, "cannot load registry to publish routes");
                return false;
            }
        };
        match self.publisher.publish(&registry) {
            Ok(pushed) => pushed,
            Err(err) => {
                tracing::warn!(error = %err, "route publish failed");
                false
            }
        }
    }
}

/// Reject names that cannot serve as a log file stem and a DNS label.
pub(crate) fn check_name(name: &WorkspaceName) -> Result<(), SupervisorError> {
    if is_valid_name(name.as_str()) {
        return Ok(());
    }
    Err(SupervisorError::InvalidName {
        name: name.to_string(),
        suggestion: sanitize(name.as_str()),
    })
}

/// Project settings for a recorded path; unreadable files count as absent.
pub(crate) fn project_at(path: &Path) -> ProjectConfig {
    match ProjectConfig::load(path) {
        Ok(project) => project.unwrap_or_default(),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "ignoring unreadable project config");
            ProjectConfig::default()
        }
    }
}
