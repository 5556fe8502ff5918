//! Workspace detection for `grove-detector`.
//!
//! `detect_workspace(path)` asks git for the checkout root and branch of the
//! directory and derives a URL-safe workspace name from the branch. Linked
//! worktrees are recognised by their `.git` file pointing into the main
//! repository's `.git/worktrees/` directory.

use std::path::{Path, PathBuf};
use std::process::Command;

pub use grove_core::name::{is_valid_name, sanitize};
use serde::Serialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// What detection found out about a checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkspaceInfo {
    /// Sanitised name, e.g. `feature-auth`.
    pub name: String,
    /// Branch as git reports it, e.g. `feature/auth`.
    pub branch: String,
    /// Absolute checkout root.
    pub path: PathBuf,
    pub is_linked_worktree: bool,
    /// Main repository root when `is_linked_worktree` is set.
    pub main_repo: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not inside a git repository")]
    NotARepository { path: PathBuf },

    #[error("git {args} failed: {message}")]
    Git { args: String, message: String },
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Detect the git checkout containing `path`.
pub fn detect_workspace(path: &Path) -> Result<WorkspaceInfo, DetectError> {
    let path = std::fs::canonicalize(path).map_err(|source| DetectError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let root = match git(&path, &["rev-parse", "--show-toplevel"]) {
        Ok(root) => PathBuf::from(root),
        Err(DetectError::Git { .. }) => return Err(DetectError::NotARepository { path }),
        Err(err) => return Err(err),
    };
    let branch = current_branch(&root)?;
    let main_repo = linked_worktree_main(&root);

    Ok(WorkspaceInfo {
        name: sanitize(&branch),
        branch,
        is_linked_worktree: main_repo.is_some() || root.join(".git").is_file(),
        main_repo,
        path: root,
    })
}

/// Like [`detect_workspace`], but outside git the nearest enclosing project
/// root (see [`PROJECT_MARKERS`]), or the directory itself, becomes a
/// workspace named after that directory.
pub fn detect_or_directory(path: &Path) -> Result<WorkspaceInfo, DetectError> {
    match detect_workspace(path) {
        Err(DetectError::NotARepository { path }) => {
            let path = find_project_root(&path).unwrap_or(path);
            tracing::debug!(path = %path.display(), "not a git checkout, using directory name");
            let dir_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            Ok(WorkspaceInfo {
                name: sanitize(&dir_name),
                branch: String::new(),
                path,
                is_linked_worktree: false,
                main_repo: None,
            })
        }
        other => other,
    }
}

/// For a linked worktree at `root`, the main repository root.
///
/// A linked worktree's `.git` is a file reading
/// `gitdir: /main/repo/.git/worktrees/<name>`.
pub fn linked_worktree_main(root: &Path) -> Option<PathBuf> {
    let dot_git = root.join(".git");
    if !dot_git.is_file() {
        return None;
    }
    let contents = std::fs::read_to_string(&dot_git).ok()?;
    parse_gitdir(&contents)
}

/// Parse the contents of a worktree `.git` file.
pub fn parse_gitdir(contents: &str) -> Option<PathBuf> {
    let gitdir = contents.trim().strip_prefix("gitdir:")?.trim();
    let (main, _) = gitdir.split_once("/.git/worktrees/")?;
    Some(PathBuf::from(main))
}

/// Files whose presence marks a project root.
pub const PROJECT_MARKERS: &[&str] = &[
    grove_core::project::PROJECT_FILE,
    ".git",
    "go.mod",
    "package.json",
    "Gemfile",
    "Cargo.toml",
];

/// Walk up from `start` to the nearest directory holding a project marker.
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| PROJECT_MARKERS.iter().any(|m| dir.join(m).exists()))
        .map(Path::to_path_buf)
}

// ---------------------------------------------------------------------------
// git plumbing
// ---------------------------------------------------------------------------

fn current_branch(root: &Path) -> Result<String, DetectError> {
    // Works on a fresh repository with no commits, unlike `rev-parse`.
    if let Ok(branch) = git(root, &["symbolic-ref", "--short", "-q", "HEAD"]) {
        if !branch.is_empty() {
            return Ok(branch);
        }
    }
    // Detached HEAD: prefer a tag, fall back to the abbreviated hash.
    git(root, &["describe", "--tags", "--always"])
}

fn git(dir: &Path, args: &[&str]) -> Result<String, DetectError> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .map_err(|source| DetectError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    if !output.status.success() {
        return Err(DetectError::Git {
            args: args.join(" "),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
