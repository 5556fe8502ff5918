//! HTTP health probes.

use std::time::Duration;

use chrono::Utc;
use grove_core::{Health, RegistryStore, WorkspaceName};

use crate::error::SupervisorError;

pub const DEFAULT_HEALTH_PATH: &str = "/";
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// GET `http://localhost:<port><path>`. Any response below 500 counts as
/// healthy; 5xx, refused connections and timeouts are unhealthy.
pub fn check_health(port: u16, path: &str, timeout: Duration) -> Health {
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    let url = format!("http://localhost:{port}{path}");
    let agent = ureq::AgentBuilder::new().timeout(timeout).build();

    match agent.get(&url).call() {
        Ok(response) if response.status() < 500 => Health::Healthy,
        Err(ureq::Error::Status(code, _)) if code < 500 => Health::Healthy,
        Ok(response) => {
            tracing::debug!(%url, status = response.status(), "health probe failed");
            Health::Unhealthy
        }
        Err(err) => {
            tracing::debug!(%url, error = %err, "health probe failed");
            Health::Unhealthy
        }
    }
}

/// Probe a recorded server and store the result. Servers that are not
/// running are recorded as [`Health::Unknown`] without a probe.
pub fn refresh_health<S: RegistryStore>(
    store: &S,
    name: &WorkspaceName,
    path: Option<&str>,
) -> Result<Health, SupervisorError> {
    let registry = store.load()?;
    let server = registry
        .server(name)
        .ok_or_else(|| SupervisorError::NotFound(name.clone()))?;

    let health = if server.is_running() {
        check_health(server.port, path.unwrap_or(DEFAULT_HEALTH_PATH), PROBE_TIMEOUT)
    } else {
        Health::Unknown
    };

    store.try_update(|reg| {
        let server = reg
            .servers
            .get_mut(name)
            .ok_or_else(|| SupervisorError::NotFound(name.clone()))?;
        server.health = health;
        server.last_health_check = Some(Utc::now());
        Ok::<_, SupervisorError>(())
    })?;
    Ok(health)
}

#[cfg(test)]
mod tests {
    use super::*;
    use grove_core::{MemoryStore, Server, ServerStatus};
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Answer one request with `status_line`, then exit.
    fn one_shot_server(status_line: &'static str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf);
                let body = format!("HTTP/1.1 {status_line}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
                let _ = stream.write_all(body.as_bytes());
            }
        });
        port
    }

    fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    #[test]
    fn ok_response_is_healthy() {
        let port = one_shot_server("200 OK");
        assert_eq!(check_health(port, "/", Duration::from_secs(2)), Health::Healthy);
    }

    #[test]
    fn client_error_is_still_healthy() {
        let port = one_shot_server("404 Not Found");
        assert_eq!(check_health(port, "missing", Duration::from_secs(2)), Health::Healthy);
    }

    #[test]
    fn server_error_is_unhealthy() {
        let port = one_shot_server("503 Service Unavailable");
        assert_eq!(check_health(port, "/", Duration::from_secs(2)), Health::Unhealthy);
    }

    #[test]
    fn refused_connection_is_unhealthy() {
        let port = closed_port();
        assert_eq!(check_health(port, "/", Duration::from_millis(300)), Health::Unhealthy);
    }

    #[test]
    fn refresh_records_unknown_for_stopped_server() {
        let store = MemoryStore::default();
        store.set(Server::new("idle", "/tmp/idle", 3999)).unwrap();

        let health = refresh_health(&store, &"idle".into(), None).unwrap();
        assert_eq!(health, Health::Unknown);
        let server = store.load().unwrap().servers[&WorkspaceName::from("idle")].clone();
        assert_eq!(server.status, ServerStatus::Stopped);
        assert!(server.last_health_check.is_some());
    }

    #[test]
    fn refresh_unknown_name_is_not_found() {
        let store = MemoryStore::default();
        let err = refresh_health(&store, &"ghost".into(), None).unwrap_err();
        assert!(matches!(err, SupervisorError::NotFound(_)));
    }
}
