//! Publishes routes to a running Caddy instance.

use std::error::Error as StdError;
use std::path::{Path, PathBuf};
use std::process::Command;

use grove_core::{paths, GroveConfig, Registry};
use grove_supervisor::process::is_alive;
use grove_supervisor::RoutePublisher;

use crate::error::{io_err, ProxyError};
use crate::routes::CaddyfileRenderer;

pub const DEFAULT_CADDY_BIN: &str = "caddy";

pub struct ProxyRouter {
    caddyfile: PathBuf,
    config: GroveConfig,
    caddy_bin: PathBuf,
    renderer: CaddyfileRenderer,
}

impl ProxyRouter {
    pub fn new(caddyfile: impl Into<PathBuf>, config: GroveConfig) -> Result<Self, ProxyError> {
        Ok(Self {
            caddyfile: caddyfile.into(),
            config,
            caddy_bin: PathBuf::from(DEFAULT_CADDY_BIN),
            renderer: CaddyfileRenderer::new()?,
        })
    }

    /// Router writing `<home>/.config/grove/Caddyfile`.
    pub fn at(home: &Path, config: GroveConfig) -> Result<Self, ProxyError> {
        Self::new(paths::caddyfile_path(home), config)
    }

    pub fn with_caddy_bin(mut self, bin: impl Into<PathBuf>) -> Self {
        self.caddy_bin = bin.into();
        self
    }

    pub fn caddyfile(&self) -> &Path {
        &self.caddyfile
    }

    pub fn caddy_bin(&self) -> &Path {
        &self.caddy_bin
    }

    pub fn config(&self) -> &GroveConfig {
        &self.config
    }

    pub fn render(&self, registry: &Registry) -> Result<String, ProxyError> {
        self.renderer.render(registry, &self.config)
    }

    /// Render and atomically replace the Caddyfile.
    pub fn write_caddyfile(&self, registry: &Registry) -> Result<&Path, ProxyError> {
        let document = self.render(registry)?;
        if let Some(dir) = self.caddyfile.parent() {
            std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }
        let tmp = self
            .caddyfile
            .with_extension(format!("{}.tmp", std::process::id()));
        std::fs::write(&tmp, document).map_err(|e| io_err(&tmp, e))?;
        if let Err(err) = std::fs::rename(&tmp, &self.caddyfile) {
            let _ = std::fs::remove_file(&tmp);
            return Err(io_err(&self.caddyfile, err));
        }
        Ok(&self.caddyfile)
    }

    /// `caddy reload --config <Caddyfile> --adapter caddyfile`
    pub fn reload(&self) -> Result<(), ProxyError> {
        let mut cmd = Command::new(&self.caddy_bin);
        cmd.arg("reload")
            .arg("--config")
            .arg(&self.caddyfile)
            .arg("--adapter")
            .arg("caddyfile");
        let command = format!("{} reload --config {}", self.caddy_bin.display(), self.caddyfile.display());

        let output = cmd.output().map_err(|e| ProxyError::Reload {
            command: command.clone(),
            output: e.to_string(),
        })?;
        if !output.status.success() {
            let mut text = String::from_utf8_lossy(&output.stderr).into_owned();
            text.push_str(&String::from_utf8_lossy(&output.stdout));
            return Err(ProxyError::Reload {
                command,
                output: text.trim().to_string(),
            });
        }
        Ok(())
    }

    /// Regenerate and reload if a proxy is running. Without a live proxy
    /// nothing is written and `Ok(false)` is returned.
    pub fn sync(&self, registry: &Registry) -> Result<bool, ProxyError> {
        let proxy = &registry.proxy;
        if !proxy.is_recorded() || !is_alive(proxy.pid) {
            tracing::debug!("proxy not running, skipping route sync");
            return Ok(false);
        }
        self.write_caddyfile(registry)?;
        self.reload()?;
        tracing::info!(servers = registry.servers.len(), "proxy routes reloaded");
        Ok(true)
    }
}

impl RoutePublisher for ProxyRouter {
    fn publish(&self, registry: &Registry) -> Result<bool, Box<dyn StdError + Send + Sync>> {
        Ok(self.sync(registry)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grove_core::{ProxyInfo, Server};
    use tempfile::TempDir;

    fn registry_with_live_proxy() -> Registry {
        let mut reg = Registry::default();
        reg.set_server(Server::new("api", "/code/api", 3001));
        reg.proxy = ProxyInfo {
            pid: std::process::id(),
            ..ProxyInfo::default()
        };
        reg
    }

    #[test]
    fn sync_without_proxy_is_a_no_op() {
        let home = TempDir::new().unwrap();
        let router = ProxyRouter::at(home.path(), GroveConfig::default())
            .unwrap()
            .with_caddy_bin("false");

        assert!(!router.sync(&Registry::default()).unwrap());
        assert!(!router.caddyfile().exists());
    }

    #[test]
    fn sync_with_live_proxy_writes_and_reloads() {
        let home = TempDir::new().unwrap();
        let router = ProxyRouter::at(home.path(), GroveConfig::default())
            .unwrap()
            .with_caddy_bin("true");

        assert!(router.sync(&registry_with_live_proxy()).unwrap());
        let doc = std::fs::read_to_string(router.caddyfile()).unwrap();
        assert!(doc.contains("https://api.localhost {"));
        assert!(doc.contains("reverse_proxy localhost:3001"));
    }

    #[test]
    fn failed_reload_is_reported() {
        let home = TempDir::new().unwrap();
        let router = ProxyRouter::at(home.path(), GroveConfig::default())
            .unwrap()
            .with_caddy_bin("false");

        let err = router.sync(&registry_with_live_proxy()).unwrap_err();
        assert!(matches!(err, ProxyError::Reload { .. }), "got: {err}");
    }

    #[test]
    fn publish_maps_errors_for_the_supervisor() {
        let home = TempDir::new().unwrap();
        let router = ProxyRouter::at(home.path(), GroveConfig::default())
            .unwrap()
            .with_caddy_bin("false");
        assert!(router.publish(&registry_with_live_proxy()).is_err());
    }
}
