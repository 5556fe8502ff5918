//! Shared durable registry store.
//!
//! # Storage model
//!
//! One JSON document (`~/.config/grove/registry.json`) is read and written by
//! many short-lived, unrelated processes. There is no coordinator and no
//! cross-process lock: every mutation is a full load → modify → save cycle,
//! and saves are atomic (sibling temp file + `rename`), so concurrent writers
//! resolve as last-writer-wins and a crash mid-write never leaves a torn file.
//!
//! # API pattern
//!
//! [`RegistryStore`] is the narrow storage seam (`load`/`save`). The
//! transactional helpers (`update`, `set`, `remove`, …) are provided methods
//! built on top of it. [`JsonFileStore`] is the on-disk implementation and
//! [`MemoryStore`] backs tests.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{io_err, RegistryError};
use crate::paths;
use crate::types::{ProxyInfo, Registry, Server, Workspace, WorkspaceName};

// ---------------------------------------------------------------------------
// 1. Store trait
// ---------------------------------------------------------------------------

/// Durable home of the [`Registry`] document.
pub trait RegistryStore {
    /// Current snapshot. A store with no document yet yields an empty registry.
    fn load(&self) -> Result<Registry, RegistryError>;

    /// Replace the stored document with `registry`.
    fn save(&self, registry: &Registry) -> Result<(), RegistryError>;

    /// Load the latest state, apply `f`, save the result.
    fn update<T, F>(&self, f: F) -> Result<T, RegistryError>
    where
        Self: Sized,
        F: FnOnce(&mut Registry) -> T,
    {
        let mut registry = self.load()?;
        let out = f(&mut registry);
        self.save(&registry)?;
        Ok(out)
    }

    /// Like [`update`](Self::update), but nothing is saved when `f` fails.
    fn try_update<T, E, F>(&self, f: F) -> Result<T, E>
    where
        Self: Sized,
        E: From<RegistryError>,
        F: FnOnce(&mut Registry) -> Result<T, E>,
    {
        let mut registry = self.load()?;
        let out = f(&mut registry)?;
        self.save(&registry)?;
        Ok(out)
    }

    /// Insert or replace a server record.
    fn set(&self, server: Server) -> Result<(), RegistryError> {
        let mut registry = self.load()?;
        registry.set_server(server);
        self.save(&registry)
    }

    /// Remove a server record, returning it if present.
    fn remove(&self, name: &WorkspaceName) -> Result<Option<Server>, RegistryError> {
        let mut registry = self.load()?;
        let removed = registry.remove_server(name);
        if removed.is_some() {
            self.save(&registry)?;
        }
        Ok(removed)
    }

    /// Insert or replace a workspace record.
    fn set_workspace(&self, workspace: Workspace) -> Result<(), RegistryError> {
        let mut registry = self.load()?;
        registry.set_workspace(workspace);
        self.save(&registry)
    }

    /// Remove a workspace record, returning it if present.
    fn remove_workspace(&self, name: &WorkspaceName) -> Result<Option<Workspace>, RegistryError> {
        let mut registry = self.load()?;
        let removed = registry.remove_workspace(name);
        if removed.is_some() {
            self.save(&registry)?;
        }
        Ok(removed)
    }

    /// Replace the proxy singleton.
    fn update_proxy(&self, proxy: ProxyInfo) -> Result<(), RegistryError> {
        let mut registry = self.load()?;
        registry.proxy = proxy;
        self.save(&registry)
    }
}

// ---------------------------------------------------------------------------
// 2. Document encoding
// ---------------------------------------------------------------------------

/// Canonical serialized form: pretty JSON with a trailing newline.
pub fn to_document(registry: &Registry) -> Result<String, RegistryError> {
    let mut json = serde_json::to_string_pretty(registry)?;
    json.push('\n');
    Ok(json)
}

/// Parse a registry document; `path` is only used for error context.
pub fn from_document(contents: &str, path: &Path) -> Result<Registry, RegistryError> {
    serde_json::from_str(contents).map_err(|source| RegistryError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}

// ---------------------------------------------------------------------------
// 3. JSON file store (atomic rename)
// ---------------------------------------------------------------------------

/// The production store: a single JSON file replaced atomically on save.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `<home>/.config/grove/registry.json`.
    pub fn at(home: &Path) -> Self {
        Self::new(paths::registry_path(home))
    }

    /// Store under the current user's home directory.
    pub fn open_default() -> Result<Self, RegistryError> {
        Ok(Self::at(&paths::home()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Temp file in the target directory (same filesystem, so `rename` is
    /// atomic). The pid suffix keeps two racing writers off each other's
    /// temp file.
    fn tmp_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| paths::REGISTRY_FILE.to_string());
        self.path
            .with_file_name(format!("{file_name}.{}.tmp", std::process::id()))
    }
}

impl RegistryStore for JsonFileStore {
    fn load(&self) -> Result<Registry, RegistryError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "creating empty registry");
                let registry = Registry::default();
                self.save(&registry)?;
                return Ok(registry);
            }
            Err(err) => return Err(io_err(&self.path, err)),
        };
        from_document(&contents, &self.path)
    }

    fn save(&self, registry: &Registry) -> Result<(), RegistryError> {
        if let Some(dir) = self.path.parent() {
            if !dir.exists() {
                std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
                set_dir_permissions(dir)?;
            }
        }

        let document = to_document(registry)?;
        let tmp = self.tmp_path();
        std::fs::write(&tmp, document).map_err(|e| io_err(&tmp, e))?;
        set_file_permissions(&tmp)?;
        if let Err(err) = std::fs::rename(&tmp, &self.path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(io_err(&self.path, err));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// 4. In-memory store
// ---------------------------------------------------------------------------

/// Process-local store, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStore {
    registry: Mutex<Registry>,
}

impl MemoryStore {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry: Mutex::new(registry),
        }
    }
}

impl RegistryStore for MemoryStore {
    fn load(&self) -> Result<Registry, RegistryError> {
        Ok(self
            .registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone())
    }

    fn save(&self, registry: &Registry) -> Result<(), RegistryError> {
        *self
            .registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = registry.clone();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), RegistryError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), RegistryError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), RegistryError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), RegistryError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ServerStatus;
    use tempfile::TempDir;

    fn make_home() -> TempDir {
        TempDir::new().expect("tempdir")
    }

    #[test]
    fn registry_path_is_correct() {
        let home = make_home();
        let store = JsonFileStore::at(home.path());
        assert!(store.path().ends_with(".config/grove/registry.json"));
    }

    #[test]
    fn first_load_creates_empty_document() {
        let home = make_home();
        let store = JsonFileStore::at(home.path());
        let registry = store.load().expect("load");
        assert!(registry.servers.is_empty());
        assert!(store.path().exists(), "default document must be written");
    }

    #[test]
    fn registry_dir_created_with_perms() {
        let home = make_home();
        let store = JsonFileStore::at(home.path());
        store.save(&Registry::default()).expect("save");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let dir = store.path().parent().unwrap();
            let mode = std::fs::metadata(dir).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o700);
        }
    }

    #[test]
    fn save_leaves_no_tmp_behind() {
        let home = make_home();
        let store = JsonFileStore::at(home.path());
        store.save(&Registry::default()).expect("save");
        assert!(!store.tmp_path().exists(), ".tmp must be gone after successful save");
    }

    #[test]
    fn set_then_remove_server() {
        let home = make_home();
        let store = JsonFileStore::at(home.path());
        store.set(Server::new("demo", "/tmp/demo", 3100)).expect("set");

        let loaded = store.load().expect("load");
        assert_eq!(loaded.server(&"demo".into()).map(|s| s.port), Some(3100));

        let removed = store.remove(&"demo".into()).expect("remove");
        assert!(removed.is_some());
        assert!(store.load().expect("reload").servers.is_empty());
    }

    #[derive(Debug)]
    struct GuardFailed;

    impl From<RegistryError> for GuardFailed {
        fn from(_: RegistryError) -> Self {
            GuardFailed
        }
    }

    #[test]
    fn try_update_does_not_save_on_error() {
        let store = MemoryStore::default();
        store.set(Server::new("demo", "/tmp/demo", 3100)).expect("set");

        let result: Result<(), GuardFailed> = store.try_update(|reg| {
            if let Some(server) = reg.servers.get_mut(&WorkspaceName::from("demo")) {
                server.status = ServerStatus::Running;
            }
            Err(GuardFailed)
        });
        assert!(result.is_err());
        let server = store.load().unwrap().servers[&WorkspaceName::from("demo")].clone();
        assert_eq!(server.status, ServerStatus::Stopped);
    }

    #[test]
    fn corrupt_document_is_reported_with_path() {
        let home = make_home();
        let store = JsonFileStore::at(home.path());
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), b"not valid json {{{").unwrap();
        let err = store.load().unwrap_err();
        assert!(matches!(err, RegistryError::Corrupt { .. }), "got: {err}");
        assert!(err.to_string().contains("registry.json"));
    }
}
