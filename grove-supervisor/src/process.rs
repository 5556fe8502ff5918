//! Detached spawn primitive and process-group signalling.
//!
//! # Contract of [`DetachedCommand::spawn`]
//!
//! - The command becomes the leader of a new process group, so it outlives
//!   the invoking CLI and its pid doubles as the group id for signalling.
//! - stdout and stderr are appended to the log file.
//! - stdin is the read end of a pipe whose write end is inherited by the
//!   child itself. It never reaches EOF while the child lives, which keeps
//!   watch-mode tools that exit on closed stdin running.
//! - No handle is retained. Callers keep the pid and log path and nothing
//!   else; every later interaction goes through signals.

use std::fs::{File, OpenOptions};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

use grove_core::LivenessProbe;
use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag};
use nix::unistd::{pipe, Pid};

use crate::error::{io_err, SupervisorError};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
/// How long to wait after SIGKILL before giving up on observing the exit.
const KILL_GRACE: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// 1. Spawn
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DetachedCommand {
    argv: Vec<String>,
    cwd: PathBuf,
    env: Vec<(String, String)>,
    log_file: PathBuf,
}

impl DetachedCommand {
    pub fn new(argv: Vec<String>, cwd: impl Into<PathBuf>, log_file: impl Into<PathBuf>) -> Self {
        Self {
            argv,
            cwd: cwd.into(),
            env: Vec::new(),
            log_file: log_file.into(),
        }
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn log_file(&self) -> &Path {
        &self.log_file
    }

    /// Human-readable command line, for errors and logs.
    pub fn display(&self) -> String {
        self.argv.join(" ")
    }

    /// Start the process and return its pid (also its process group id).
    pub fn spawn(&self) -> Result<u32, SupervisorError> {
        let (program, args) = self
            .argv
            .split_first()
            .ok_or(SupervisorError::EmptyCommand)?;

        let stdout = open_log(&self.log_file)?;
        let stderr = stdout.try_clone().map_err(|e| io_err(&self.log_file, e))?;
        let (stdin_read, stdin_hold) = pipe().map_err(|errno| self.spawn_err(errno.into()))?;

        let child = Command::new(program)
            .args(args)
            .current_dir(&self.cwd)
            .envs(self.env.iter().cloned())
            .stdin(Stdio::from(stdin_read))
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .process_group(0)
            .spawn()
            .map_err(|e| self.spawn_err(e))?;

        // The child holds its own copy of the write end.
        drop(stdin_hold);

        let pid = child.id();
        tracing::debug!(pid, command = %self.display(), cwd = %self.cwd.display(), "spawned detached process");
        Ok(pid)
    }

    fn spawn_err(&self, source: std::io::Error) -> SupervisorError {
        SupervisorError::Spawn {
            command: self.display(),
            cwd: self.cwd.clone(),
            source,
        }
    }
}

/// Open `path` for appending, creating it and its directory as needed.
pub fn open_log(path: &Path) -> Result<File, SupervisorError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| io_err(path, e))
}

// ---------------------------------------------------------------------------
// 2. Liveness
// ---------------------------------------------------------------------------

fn to_pid(pid: u32) -> Option<Pid> {
    i32::try_from(pid)
        .ok()
        .filter(|p| *p > 0)
        .map(Pid::from_raw)
}

/// Zero-signal probe. EPERM means the pid exists but belongs to someone else.
///
/// An exited child of this process is reaped first, otherwise it would linger
/// as a zombie and keep answering the probe.
pub fn is_alive(pid: u32) -> bool {
    let Some(target) = to_pid(pid) else {
        return false;
    };
    let _ = waitpid(target, Some(WaitPidFlag::WNOHANG));
    match kill(target, None) {
        Ok(()) | Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Whether any member of the process group led by `pid` is still running.
/// The group outlives its leader when children ignore the leader's exit.
pub fn group_alive(pid: u32) -> bool {
    let Some(target) = to_pid(pid) else {
        return false;
    };
    if is_alive(pid) {
        return true;
    }
    matches!(killpg(target, None), Ok(()) | Err(Errno::EPERM))
}

/// Poll until `pid` is gone. Returns `false` if it outlived `timeout`.
pub fn wait_for_exit(pid: u32, timeout: Duration) -> bool {
    poll_until(timeout, || !is_alive(pid))
}

/// Poll until every member of the group led by `pid` is gone.
pub fn wait_for_group_exit(pid: u32, timeout: Duration) -> bool {
    poll_until(timeout, || !group_alive(pid))
}

fn poll_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if done() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(POLL_INTERVAL);
    }
}

/// [`LivenessProbe`] backed by real OS signals.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsProbe;

impl LivenessProbe for OsProbe {
    fn is_alive(&self, pid: u32) -> bool {
        is_alive(pid)
    }
}

// ---------------------------------------------------------------------------
// 3. Signals
// ---------------------------------------------------------------------------

/// Send `signal` to the process group led by `pid`, falling back to the pid
/// alone when it leads no group. `Ok(false)` means nothing was there.
pub fn signal_group(pid: u32, signal: Signal) -> Result<bool, SupervisorError> {
    let Some(target) = to_pid(pid) else {
        return Ok(false);
    };
    match killpg(target, signal) {
        Ok(()) => Ok(true),
        Err(Errno::ESRCH) => match kill(target, signal) {
            Ok(()) => Ok(true),
            Err(Errno::ESRCH) => Ok(false),
            Err(source) => Err(SupervisorError::Signal { pid, source }),
        },
        Err(source) => Err(SupervisorError::Signal { pid, source }),
    }
}

/// How a process went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Exited after SIGTERM within the timeout.
    Graceful,
    /// Needed SIGKILL.
    Forced,
    /// Was already gone before any signal landed.
    AlreadyGone,
}

/// SIGTERM the group, wait up to `timeout` for every member to exit, then
/// SIGKILL whatever is left.
pub fn terminate(pid: u32, timeout: Duration) -> Result<Termination, SupervisorError> {
    if !group_alive(pid) {
        return Ok(Termination::AlreadyGone);
    }
    if !signal_group(pid, Signal::SIGTERM)? {
        return Ok(Termination::AlreadyGone);
    }
    if wait_for_group_exit(pid, timeout) {
        return Ok(Termination::Graceful);
    }

    tracing::warn!(pid, timeout_ms = timeout.as_millis() as u64, "graceful stop timed out, sending SIGKILL");
    signal_group(pid, Signal::SIGKILL)?;
    if !wait_for_group_exit(pid, KILL_GRACE) {
        tracing::warn!(pid, "process group still present after SIGKILL");
    }
    Ok(Termination::Forced)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
