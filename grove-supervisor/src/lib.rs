//! Process supervision for grove servers: detached spawning, graceful then
//! forced termination, lifecycle hooks, health probes and log files.
//! Servers started elsewhere can be attached and stale records pruned.

mod error;
pub mod health;
pub mod hooks;
pub mod log_rotation;
pub mod logs;
pub mod process;
mod supervisor;
mod tracking;

pub use error::{ErrorKind, SupervisorError};
pub use health::{check_health, refresh_health};
pub use process::{DetachedCommand, OsProbe, Termination};
pub use supervisor::{
    DetachReport, NoopPublisher, RoutePublisher, StartRequest, StopAllReport, StopReport,
    Supervisor,
};
pub use tracking::{AttachReport, AttachRequest, PruneOptions, PruneReport};
