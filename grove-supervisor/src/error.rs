use std::path::PathBuf;

use grove_core::{ConfigError, PortError, RegistryError, WorkspaceName};
use serde::Serialize;
use thiserror::Error;

/// Coarse classification callers branch on (exit codes, JSON output).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Config,
    NotFound,
    Conflict,
    Process,
    Timeout,
}

/// Error surface for spawning, signalling and tracking servers.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("no server or workspace named '{0}'")]
    NotFound(WorkspaceName),

    #[error("server '{0}' is not running")]
    NotRunning(WorkspaceName),

    #[error("server '{name}' is already running at {url} (port {port}); stop it first")]
    AlreadyRunning {
        name: WorkspaceName,
        url: String,
        port: u16,
    },

    #[error("port {port} is already in use; choose another with --port or stop whatever holds it")]
    PortInUse { port: u16 },

    #[error("no command recorded for '{0}'; start it once with an explicit command")]
    NoCommand(WorkspaceName),

    #[error("no command given; pass one after `--` or set `command` in .grove.yaml")]
    EmptyCommand,

    #[error("invalid server name '{name}'; names use a-z, 0-9 and single hyphens, try '{suggestion}'")]
    InvalidName { name: String, suggestion: String },

    #[error("no server is listening on port {port}; start it first or check the port")]
    NotListening { port: u16 },

    #[error("port {port} is already used by running server '{owner}'")]
    PortClaimed { port: u16, owner: WorkspaceName },

    #[error("failed to spawn `{command}` in {cwd}: {source}")]
    Spawn {
        command: String,
        cwd: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to signal pid {pid}: {source}")]
    Signal {
        pid: u32,
        #[source]
        source: nix::errno::Errno,
    },

    #[error("'{name}' exited during startup; check {}", log_file.display())]
    ProbeFailed { name: WorkspaceName, log_file: PathBuf },

    #[error("{stage} hook `{hook}` failed: {reason}")]
    Hook {
        stage: &'static str,
        hook: String,
        reason: String,
    },

    #[error("port {port} did not start listening within {secs}s")]
    Timeout { port: u16, secs: u64 },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Port(#[from] PortError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl SupervisorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SupervisorError::Registry(_)
            | SupervisorError::Config(_)
            | SupervisorError::NoCommand(_)
            | SupervisorError::EmptyCommand
            | SupervisorError::InvalidName { .. } => ErrorKind::Config,
            SupervisorError::NotFound(_)
            | SupervisorError::NotRunning(_)
            | SupervisorError::NotListening { .. } => ErrorKind::NotFound,
            SupervisorError::AlreadyRunning { .. }
            | SupervisorError::PortInUse { .. }
            | SupervisorError::PortClaimed { .. }
            | SupervisorError::Port(_) => ErrorKind::Conflict,
            SupervisorError::Spawn { .. }
            | SupervisorError::Signal { .. }
            | SupervisorError::ProbeFailed { .. }
            | SupervisorError::Hook { .. }
            | SupervisorError::Io { .. } => ErrorKind::Process,
            SupervisorError::Timeout { .. } => ErrorKind::Timeout,
        }
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SupervisorError {
    SupervisorError::Io {
        path: path.into(),
        source,
    }
}
