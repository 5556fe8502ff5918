//! Size-based rotation of per-server logs.
//!
//! Applied right before a server is (re)started, never while it writes:
//! `api.log` → `api.log.1` → … → `api.log.<max_files>`, oldest dropped.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use grove_core::GroveConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRotation {
    pub max_bytes: u64,
    pub max_files: usize,
}

impl LogRotation {
    pub fn new(max_bytes: u64, max_files: usize) -> Self {
        Self {
            max_bytes,
            max_files,
        }
    }

    pub fn from_config(config: &GroveConfig) -> Self {
        Self::new(config.log_max_bytes, config.log_max_files)
    }

    /// Rotate `log` if it has reached `max_bytes`. Returns whether it did.
    /// A missing log is not an error. With `max_files == 0` the log is
    /// truncated in place instead.
    pub fn rotate(&self, log: &Path) -> io::Result<bool> {
        let size = match fs::metadata(log) {
            Ok(meta) => meta.len(),
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(err),
        };
        if size < self.max_bytes {
            return Ok(false);
        }

        if self.max_files == 0 {
            fs::File::create(log)?;
            return Ok(true);
        }

        let oldest = rotated_path(log, self.max_files);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for n in (1..self.max_files).rev() {
            let from = rotated_path(log, n);
            if from.exists() {
                fs::rename(&from, rotated_path(log, n + 1))?;
            }
        }
        fs::rename(log, rotated_path(log, 1))?;
        Ok(true)
    }

    /// [`rotate`](Self::rotate), logging instead of failing.
    pub fn rotate_or_warn(&self, log: &Path) {
        match self.rotate(log) {
            Ok(true) => tracing::info!(path = %log.display(), "log rotated"),
            Ok(false) => {}
            Err(err) => tracing::warn!(path = %log.display(), error = %err, "log rotation failed"),
        }
    }
}

/// `<log>.<n>`
pub fn rotated_path(log: &Path, n: usize) -> PathBuf {
    let mut name = log
        .file_name()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| "server.log".into());
    name.push(format!(".{n}"));
    log.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_bytes(path: &Path, len: usize, byte: u8) {
        fs::write(path, vec![byte; len]).unwrap();
    }

    #[test]
    fn small_log_is_left_alone() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("api.log");
        write_bytes(&log, 10, b'a');

        assert!(!LogRotation::new(1024, 3).rotate(&log).unwrap());
        assert!(!rotated_path(&log, 1).exists());
    }

    #[test]
    fn oversized_log_moves_to_first_slot() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("api.log");
        write_bytes(&log, 2048, b'a');

        assert!(LogRotation::new(1024, 3).rotate(&log).unwrap());
        assert!(!log.exists(), "the next writer recreates the live log");
        assert_eq!(fs::metadata(rotated_path(&log, 1)).unwrap().len(), 2048);
    }

    #[test]
    fn rotation_keeps_at_most_max_files() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("api.log");
        let rotation = LogRotation::new(8, 2);

        for byte in [b'1', b'2', b'3'] {
            write_bytes(&log, 16, byte);
            rotation.rotate(&log).unwrap();
        }

        assert_eq!(fs::read(rotated_path(&log, 1)).unwrap()[0], b'3');
        assert_eq!(fs::read(rotated_path(&log, 2)).unwrap()[0], b'2');
        assert!(!rotated_path(&log, 3).exists());
    }

    #[test]
    fn zero_max_files_truncates() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("api.log");
        write_bytes(&log, 64, b'x');

        assert!(LogRotation::new(8, 0).rotate(&log).unwrap());
        assert_eq!(fs::metadata(&log).unwrap().len(), 0);
    }

    #[test]
    fn missing_log_is_fine() {
        let dir = TempDir::new().unwrap();
        assert!(!LogRotation::new(8, 2).rotate(&dir.path().join("none.log")).unwrap());
    }
}
