//! Route table and Caddyfile rendering.
//!
//! The document is always regenerated from the whole registry, never patched,
//! so a missed update is repaired by the next one.

use serde::Serialize;
use tera::{Context, Tera};

use grove_core::{GroveConfig, Registry, ServerStatus};

use crate::error::ProxyError;

const CADDYFILE_TEMPLATE: &str = "Caddyfile.tera";

/// One `<name>.<tld>` → `localhost:<port>` mapping. Each route also covers
/// the `*.<name>.<tld>` wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub status: ServerStatus,
}

impl Route {
    pub fn wildcard_host(&self) -> String {
        format!("*.{}", self.host)
    }

    pub fn is_running(&self) -> bool {
        matches!(self.status, ServerStatus::Starting | ServerStatus::Running)
    }
}

/// Every recorded server, in name order. Stopped servers keep their route so
/// the proxy answers with a gateway error instead of an unknown host.
pub fn routes(registry: &Registry, tld: &str) -> Vec<Route> {
    registry
        .servers
        .values()
        .filter(|s| s.port > 0)
        .map(|s| Route {
            name: s.name.to_string(),
            host: format!("{}.{tld}", s.name),
            port: s.port,
            status: s.status,
        })
        .collect()
}

#[derive(Serialize)]
struct CaddyfileContext<'a> {
    tld: &'a str,
    http_port: u16,
    https_port: u16,
    routes: Vec<Route>,
}

/// Renders the Caddyfile from the embedded template.
pub struct CaddyfileRenderer {
    tera: Tera,
}

impl CaddyfileRenderer {
    pub fn new() -> Result<Self, ProxyError> {
        let mut tera = Tera::default();
        tera.add_raw_template(CADDYFILE_TEMPLATE, include_str!("templates/Caddyfile.tera"))?;
        Ok(Self { tera })
    }

    pub fn render(&self, registry: &Registry, config: &GroveConfig) -> Result<String, ProxyError> {
        let ctx = CaddyfileContext {
            tld: &config.tld,
            http_port: config.proxy_http_port,
            https_port: config.proxy_https_port,
            routes: routes(registry, &config.tld),
        };
        let ctx = Context::from_serialize(&ctx)?;
        Ok(self.tera.render(CADDYFILE_TEMPLATE, &ctx)?)
    }
}
