//! Error types for grove-proxy.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("template engine error: {0}")]
    Tera(#[from] tera::Error),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("registry error: {0}")]
    Registry(#[from] grove_core::RegistryError),

    #[error(transparent)]
    Process(#[from] grove_supervisor::SupervisorError),

    #[error("`{command}` failed: {output}")]
    Reload { command: String, output: String },

    #[error("proxy is already running (pid {pid})")]
    AlreadyRunning { pid: u32 },

    #[error("proxy exited right after starting; check {log_file} (is caddy installed and allowed to bind its ports?)")]
    ExitedEarly { log_file: PathBuf },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ProxyError {
    ProxyError::Io {
        path: path.into(),
        source,
    }
}
