//! Per-server log files: location, tail, follow.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

use grove_core::WorkspaceName;
use notify::{recommended_watcher, RecursiveMode, Watcher};

use crate::error::{io_err, SupervisorError};

const FOLLOW_TICK: Duration = Duration::from_millis(250);

/// `<dir>/<name>.log`
pub fn log_path(dir: &Path, name: &WorkspaceName) -> PathBuf {
    dir.join(format!("{name}.log"))
}

/// Last `n` lines of `path`. Bytes that are not UTF-8 are replaced rather
/// than failing the read; dev servers write whatever they like.
pub fn tail(path: &Path, n: usize) -> Result<Vec<String>, SupervisorError> {
    let file = File::open(path).map_err(|e| io_err(path, e))?;
    let mut reader = BufReader::new(file);
    let mut ring = std::collections::VecDeque::with_capacity(n.min(4096));
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| io_err(path, e))?;
        if read == 0 {
            break;
        }
        if n == 0 {
            continue;
        }
        if buf.ends_with(b"\n") {
            buf.pop();
            if buf.ends_with(b"\r") {
                buf.pop();
            }
        }
        if ring.len() == n {
            ring.pop_front();
        }
        ring.push_back(String::from_utf8_lossy(&buf).into_owned());
    }
    Ok(ring.into_iter().collect())
}

/// Copy bytes appended to `path` after `offset` into `out`, blocking until
/// `keep_going` returns `false`.
///
/// Waits on filesystem notifications when a watcher can be installed and
/// polls otherwise. A log that shrinks (rotated or truncated) is re-read from
/// the start.
pub fn follow<W, F>(path: &Path, offset: u64, out: &mut W, mut keep_going: F) -> Result<(), SupervisorError>
where
    W: Write,
    F: FnMut() -> bool,
{
    let (tx, rx) = mpsc::channel();
    let watcher = recommended_watcher(move |event| {
        let _ = tx.send(event);
    })
    .and_then(|mut watcher| {
        watcher.watch(path, RecursiveMode::NonRecursive)?;
        Ok(watcher)
    });
    let _watcher = match watcher {
        Ok(watcher) => Some(watcher),
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "file watch unavailable, polling");
            None
        }
    };

    let mut position = offset;
    while keep_going() {
        position = copy_new_bytes(path, position, out)?;
        match rx.recv_timeout(FOLLOW_TICK) {
            Ok(_) | Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => std::thread::sleep(FOLLOW_TICK),
        }
    }
    copy_new_bytes(path, position, out)?;
    Ok(())
}

fn copy_new_bytes<W: Write>(path: &Path, position: u64, out: &mut W) -> Result<u64, SupervisorError> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(io_err(path, err)),
    };
    let len = file.metadata().map_err(|e| io_err(path, e))?.len();
    let start = if len < position { 0 } else { position };
    if len == start {
        return Ok(start);
    }
    file.seek(SeekFrom::Start(start)).map_err(|e| io_err(path, e))?;
    let mut buf = Vec::with_capacity((len - start) as usize);
    file.take(len - start)
        .read_to_end(&mut buf)
        .map_err(|e| io_err(path, e))?;
    out.write_all(&buf).map_err(|e| io_err(path, e))?;
    out.flush().map_err(|e| io_err(path, e))?;
    Ok(start + buf.len() as u64)
}
