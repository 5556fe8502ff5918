//! grove core library: domain types, the registry store, port allocation,
//! liveness reconciliation and configuration.
//!
//! - [`types`]: workspace, server, proxy and registry document types
//! - [`registry`]: [`RegistryStore`] and the atomic JSON file store
//! - [`name`]: workspace name rules
//! - [`port`]: deterministic [`PortAllocator`] and OS port probes
//! - [`reconcile`]: idempotent [`cleanup`] pass
//! - [`config`] and [`project`]: global and per-project YAML settings

pub mod config;
pub mod error;
pub mod name;
pub mod paths;
pub mod port;
pub mod project;
pub mod reconcile;
pub mod registry;
pub mod types;

pub use config::{GroveConfig, UrlMode};
pub use error::{ConfigError, PortError, RegistryError};
pub use port::PortAllocator;
pub use project::ProjectConfig;
pub use reconcile::{cleanup, CleanupReport, LivenessProbe};
pub use registry::{JsonFileStore, MemoryStore, RegistryStore};
pub use types::{Health, ProxyInfo, Registry, Server, ServerStatus, Workspace, WorkspaceName};
