//! Global settings from `~/.config/grove/config.yaml`.
//!
//! Every field is optional in the file; missing keys take the defaults below.
//! A missing file is not an error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::paths;
use crate::port::{PortAllocator, DEFAULT_PORT_MAX, DEFAULT_PORT_MIN};

/// How server URLs are formed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UrlMode {
    /// `http://localhost:<port>`, no proxy needed.
    #[default]
    Port,
    /// `https://<name>.<tld>`, routed by the reverse proxy.
    Subdomain,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroveConfig {
    pub port_min: u16,
    /// Exclusive upper bound.
    pub port_max: u16,
    pub url_mode: UrlMode,
    pub tld: String,
    pub proxy_http_port: u16,
    pub proxy_https_port: u16,
    /// Defaults to `~/.config/grove/logs`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
    pub log_max_bytes: u64,
    pub log_max_files: usize,
    pub stop_timeout_secs: u64,
    pub start_probe_ms: u64,
    pub health_check_timeout_secs: u64,
}

impl Default for GroveConfig {
    fn default() -> Self {
        Self {
            port_min: DEFAULT_PORT_MIN,
            port_max: DEFAULT_PORT_MAX,
            url_mode: UrlMode::Port,
            tld: "localhost".to_string(),
            proxy_http_port: 80,
            proxy_https_port: 443,
            log_dir: None,
            log_max_bytes: 10 * 1024 * 1024,
            log_max_files: 5,
            stop_timeout_secs: 10,
            start_probe_ms: 500,
            health_check_timeout_secs: 60,
        }
    }
}

impl GroveConfig {
    /// Load `<home>/.config/grove/config.yaml`, falling back to defaults.
    pub fn load_at(home: &Path) -> Result<Self, ConfigError> {
        Self::load_file(&paths::config_path(home))
    }

    pub fn load() -> Result<Self, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Self::load_at(&home)
    }

    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if config.port_min >= config.port_max {
            return Err(ConfigError::InvalidPortRange {
                min: config.port_min,
                max: config.port_max,
            });
        }
        Ok(config)
    }

    pub fn allocator(&self) -> PortAllocator {
        PortAllocator::new(self.port_min, self.port_max)
    }

    pub fn log_dir_at(&self, home: &Path) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(|| paths::logs_dir(home))
    }

    pub fn is_subdomain_mode(&self) -> bool {
        self.url_mode == UrlMode::Subdomain
    }

    pub fn server_url(&self, name: &str, port: u16) -> String {
        match self.url_mode {
            UrlMode::Subdomain => format!("https://{name}.{}", self.tld),
            UrlMode::Port => format!("http://localhost:{port}"),
        }
    }

    /// Wildcard URL; only meaningful in subdomain mode.
    pub fn subdomain_url(&self, name: &str) -> Option<String> {
        self.is_subdomain_mode()
            .then(|| format!("https://*.{name}.{}", self.tld))
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    pub fn start_probe(&self) -> Duration {
        Duration::from_millis(self.start_probe_ms)
    }

    pub fn health_check_timeout(&self) -> Duration {
        Duration::from_secs(self.health_check_timeout_secs)
    }
}
