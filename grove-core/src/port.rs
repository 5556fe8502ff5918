//! Deterministic port allocation and OS-level port probes.
//!
//! A workspace name is hashed (SHA-256, first four bytes) and folded into
//! `[min, max)`. Collisions with already-claimed ports probe forward with
//! wraparound, so the same name with the same claimed set always lands on the
//! same port.

use std::collections::BTreeSet;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream};
use std::thread::sleep;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use crate::error::PortError;

pub const DEFAULT_PORT_MIN: u16 = 3000;
pub const DEFAULT_PORT_MAX: u16 = 4000;

const CONNECT_TIMEOUT: Duration = Duration::from_millis(100);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Hash-based allocator over the half-open range `[min, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortAllocator {
    min: u16,
    max: u16,
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_PORT_MIN, DEFAULT_PORT_MAX)
    }
}

impl PortAllocator {
    /// `max` is exclusive. An empty range (`min >= max`) allocates nothing.
    pub fn new(min: u16, max: u16) -> Self {
        Self { min, max }
    }

    pub fn range(&self) -> (u16, u16) {
        (self.min, self.max)
    }

    pub fn contains(&self, port: u16) -> bool {
        port >= self.min && port < self.max
    }

    fn span(&self) -> u32 {
        u32::from(self.max.saturating_sub(self.min))
    }

    /// The primary candidate for `name`, ignoring any claimed ports.
    pub fn candidate(&self, name: &str) -> Option<u16> {
        let span = self.span();
        if span == 0 {
            return None;
        }
        let offset = stable_hash(name) % span;
        Some(self.min + offset as u16)
    }

    /// First port at or after the candidate for `name` (wrapping) that is not
    /// in `used`.
    pub fn allocate_with_fallback(
        &self,
        name: &str,
        used: &BTreeSet<u16>,
    ) -> Result<u16, PortError> {
        self.allocate_where(name, |port| !used.contains(&port))
    }

    /// Like [`allocate_with_fallback`](Self::allocate_with_fallback), but a
    /// port must also pass `is_free` (normally [`is_available`]).
    pub fn allocate_available<F>(
        &self,
        name: &str,
        used: &BTreeSet<u16>,
        is_free: F,
    ) -> Result<u16, PortError>
    where
        F: Fn(u16) -> bool,
    {
        self.allocate_where(name, |port| !used.contains(&port) && is_free(port))
    }

    fn allocate_where<F>(&self, name: &str, accept: F) -> Result<u16, PortError>
    where
        F: Fn(u16) -> bool,
    {
        let exhausted = PortError::RangeExhausted {
            min: self.min,
            max: self.max,
        };
        let Some(start) = self.candidate(name) else {
            return Err(exhausted);
        };
        let span = self.span();
        let start_offset = u32::from(start - self.min);
        (0..span)
            .map(|step| self.min + ((start_offset + step) % span) as u16)
            .find(|&port| accept(port))
            .ok_or(exhausted)
    }
}

/// First four bytes of the SHA-256 digest of `name`, big-endian.
fn stable_hash(name: &str) -> u32 {
    let digest = Sha256::digest(name.as_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

// ---------------------------------------------------------------------------
// OS probes
// ---------------------------------------------------------------------------

/// `true` if `port` can be bound on loopback right now.
///
/// Checks both `127.0.0.1` and `[::1]`, since servers may bind either. An IPv6
/// failure other than "address in use" (no IPv6 stack) is ignored.
pub fn is_available(port: u16) -> bool {
    if TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, port))).is_err() {
        return false;
    }
    match TcpListener::bind(SocketAddr::from((Ipv6Addr::LOCALHOST, port))) {
        Ok(_) => true,
        Err(err) => err.kind() != std::io::ErrorKind::AddrInUse,
    }
}

/// `true` if something accepts TCP connections on loopback `port`.
pub fn is_listening(port: u16) -> bool {
    let v4 = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    let v6 = SocketAddr::from((Ipv6Addr::LOCALHOST, port));
    TcpStream::connect_timeout(&v4, CONNECT_TIMEOUT).is_ok()
        || TcpStream::connect_timeout(&v6, CONNECT_TIMEOUT).is_ok()
}

/// Poll until `port` is listening. Returns `false` on timeout.
pub fn wait_for_port(port: u16, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if is_listening(port) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(POLL_INTERVAL);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_is_within_range() {
        let alloc = PortAllocator::new(3000, 3010);
        for name in ["main", "feature-auth", "x", ""] {
            let port = alloc.candidate(name).expect("candidate");
            assert!(alloc.contains(port), "{port} out of range for {name:?}");
        }
    }

    #[test]
    fn empty_range_is_exhausted() {
        let alloc = PortAllocator::new(3000, 3000);
        assert_eq!(
            alloc.allocate_with_fallback("a", &BTreeSet::new()),
            Err(PortError::RangeExhausted { min: 3000, max: 3000 })
        );
    }

    #[test]
    fn probe_wraps_around_to_range_start() {
        let alloc = PortAllocator::new(3000, 3004);
        let start = alloc.candidate("wrap").unwrap();
        // The only free port sits just behind the candidate, so the probe
        // must wrap past the end of the range to reach it.
        let free = if start == 3000 { 3003 } else { start - 1 };
        let used: BTreeSet<u16> = (3000..3004).filter(|&p| p != free).collect();
        let port = alloc.allocate_with_fallback("wrap", &used).expect("port");
        assert_eq!(port, free);
    }

    #[test]
    fn allocate_available_skips_busy_ports() {
        let alloc = PortAllocator::new(3000, 3100);
        let primary = alloc.candidate("busy").unwrap();
        let port = alloc
            .allocate_available("busy", &BTreeSet::new(), |p| p != primary)
            .expect("port");
        assert_ne!(port, primary);
    }

    #[test]
    fn bound_port_is_not_available_and_is_listening() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind");
        let port = listener.local_addr().unwrap().port();
        assert!(!is_available(port));
        assert!(is_listening(port));
        assert!(wait_for_port(port, Duration::from_millis(200)));
    }
}
