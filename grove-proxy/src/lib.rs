//! Reverse-proxy routing for subdomain URLs.
//!
//! [`ProxyRouter`] turns the registry into a Caddyfile and reloads a running
//! Caddy. It plugs into the supervisor as its [`grove_supervisor::RoutePublisher`].
//! [`lifecycle`] starts and stops the Caddy process itself.

pub mod error;
pub mod lifecycle;
pub mod router;
pub mod routes;

pub use error::ProxyError;
pub use lifecycle::ProxyStatus;
pub use router::ProxyRouter;
pub use routes::{routes, CaddyfileRenderer, Route};
