//! Filesystem layout under `<home>/.config/grove/`.
//!
//! ```text
//! ~/.config/grove/
//!   registry.json   (shared registry document)
//!   config.yaml     (global settings, optional)
//!   Caddyfile       (generated proxy routes)
//!   proxy.log
//!   logs/<name>.log (one append-only log per server)
//! ```

use std::path::{Path, PathBuf};

use crate::error::RegistryError;

pub const REGISTRY_FILE: &str = "registry.json";
pub const CONFIG_FILE: &str = "config.yaml";
pub const CADDYFILE: &str = "Caddyfile";
pub const PROXY_LOG: &str = "proxy.log";

pub fn grove_root(home: &Path) -> PathBuf {
    home.join(".config").join("grove")
}

pub fn registry_path(home: &Path) -> PathBuf {
    grove_root(home).join(REGISTRY_FILE)
}

pub fn config_path(home: &Path) -> PathBuf {
    grove_root(home).join(CONFIG_FILE)
}

pub fn logs_dir(home: &Path) -> PathBuf {
    grove_root(home).join("logs")
}

pub fn caddyfile_path(home: &Path) -> PathBuf {
    grove_root(home).join(CADDYFILE)
}

pub fn proxy_log_path(home: &Path) -> PathBuf {
    grove_root(home).join(PROXY_LOG)
}

pub fn home() -> Result<PathBuf, RegistryError> {
    dirs::home_dir().ok_or(RegistryError::HomeNotFound)
}
