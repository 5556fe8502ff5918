//! Start, stop and inspect the Caddy process.

use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use grove_core::{ProxyInfo, RegistryStore};
use grove_supervisor::process::{is_alive, terminate};
use grove_supervisor::{DetachedCommand, Termination};

use crate::error::ProxyError;
use crate::router::ProxyRouter;

const START_PROBE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxyStatus {
    pub running: bool,
    #[serde(flatten)]
    pub info: ProxyInfo,
}

/// Write the Caddyfile and launch `caddy run` detached, logging to
/// `log_file`. The proxy's pid and ports are recorded in the registry.
pub fn start<S: RegistryStore>(
    store: &S,
    router: &ProxyRouter,
    log_file: &Path,
) -> Result<ProxyInfo, ProxyError> {
    let registry = store.load()?;
    if registry.proxy.is_recorded() && is_alive(registry.proxy.pid) {
        return Err(ProxyError::AlreadyRunning {
            pid: registry.proxy.pid,
        });
    }

    let caddyfile = router.write_caddyfile(&registry)?.to_path_buf();
    let cwd = caddyfile
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| std::env::temp_dir());
    let argv = vec![
        router.caddy_bin().display().to_string(),
        "run".to_string(),
        "--config".to_string(),
        caddyfile.display().to_string(),
        "--adapter".to_string(),
        "caddyfile".to_string(),
    ];
    let pid = DetachedCommand::new(argv, cwd, log_file).spawn()?;

    sleep(START_PROBE);
    if !is_alive(pid) {
        return Err(ProxyError::ExitedEarly {
            log_file: log_file.to_path_buf(),
        });
    }

    let config = router.config();
    let info = ProxyInfo {
        pid,
        started_at: Some(Utc::now()),
        http_port: config.proxy_http_port,
        https_port: config.proxy_https_port,
    };
    store.update_proxy(info.clone())?;
    tracing::info!(pid, http_port = info.http_port, https_port = info.https_port, "proxy started");
    Ok(info)
}

/// Terminate the recorded proxy and clear its pid. `Ok(None)` when none
/// was recorded.
pub fn stop<S: RegistryStore>(store: &S, timeout: Duration) -> Result<Option<Termination>, ProxyError> {
    let proxy = store.load()?.proxy;
    if !proxy.is_recorded() {
        return Ok(None);
    }

    let outcome = terminate(proxy.pid, timeout);
    store.update(|reg| reg.proxy.pid = 0)?;
    let outcome = outcome?;
    tracing::info!(pid = proxy.pid, ?outcome, "proxy stopped");
    Ok(Some(outcome))
}

pub fn status<S: RegistryStore>(store: &S) -> Result<ProxyStatus, ProxyError> {
    let info = store.load()?.proxy;
    Ok(ProxyStatus {
        running: info.is_recorded() && is_alive(info.pid),
        info,
    })
}
