//! Per-project `.grove.yaml`, read from the workspace root.
//!
//! ```yaml
//! command: bin/dev
//! port: 3100
//! url_var: APP_URL
//! env:
//!   RAILS_ENV: development
//! hooks:
//!   before_start: ["bundle install"]
//!   after_start: []
//!   before_stop: []
//! health_check:
//!   path: /up
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const PROJECT_FILE: &str = ".grove.yaml";
pub const DEFAULT_URL_VAR: &str = "GROVE_URL";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Hooks {
    pub before_start: Vec<String>,
    pub after_start: Vec<String>,
    pub before_stop: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct HealthCheck {
    /// HTTP path probed on the server port, e.g. `/health`.
    pub path: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProjectConfig {
    /// Overrides the detected workspace name.
    pub name: Option<String>,
    /// Default command, run through `sh -c`.
    pub command: Option<String>,
    /// Fixed port, bypassing hash allocation.
    pub port: Option<u16>,
    pub env: BTreeMap<String, String>,
    pub url_var: Option<String>,
    pub hooks: Hooks,
    pub health_check: HealthCheck,
}

impl ProjectConfig {
    /// Load `<dir>/.grove.yaml`. `Ok(None)` when the file does not exist.
    pub fn load(dir: &Path) -> Result<Option<Self>, ConfigError> {
        Self::load_file(&dir.join(PROJECT_FILE))
    }

    pub fn load_file(path: &Path) -> Result<Option<Self>, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        if contents.trim().is_empty() {
            return Ok(Some(Self::default()));
        }
        serde_yaml::from_str(&contents)
            .map(Some)
            .map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })
    }

    pub fn exists(dir: &Path) -> bool {
        dir.join(PROJECT_FILE).is_file()
    }

    pub fn url_var(&self) -> &str {
        self.url_var
            .as_deref()
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_URL_VAR)
    }

    /// The configured command as an argument vector (`sh -c <command>`).
    pub fn command_argv(&self) -> Option<Vec<String>> {
        self.command
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(|c| vec!["sh".to_string(), "-c".to_string(), c.to_string()])
    }

    pub fn effective_name(&self, detected: &str) -> String {
        self.name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(detected)
            .to_string()
    }

    pub fn health_timeout(&self) -> Option<Duration> {
        self.health_check.timeout_secs.map(Duration::from_secs)
    }

    pub fn path_for(dir: &Path) -> PathBuf {
        dir.join(PROJECT_FILE)
    }
}
