//! Project lifecycle hooks (`hooks:` in `.grove.yaml`).

use std::fmt;
use std::path::Path;
use std::process::Command;

use crate::error::SupervisorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStage {
    BeforeStart,
    AfterStart,
    BeforeStop,
}

impl HookStage {
    pub fn as_str(self) -> &'static str {
        match self {
            HookStage::BeforeStart => "before_start",
            HookStage::AfterStart => "after_start",
            HookStage::BeforeStop => "before_stop",
        }
    }
}

impl fmt::Display for HookStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run each hook through `sh -c` in `cwd`, in order, stopping at the first
/// failure. Hook output goes to the caller's terminal.
pub fn run_hooks(
    stage: HookStage,
    hooks: &[String],
    cwd: &Path,
    env: &[(String, String)],
) -> Result<(), SupervisorError> {
    for hook in hooks {
        tracing::info!(stage = %stage, hook = %hook, "running hook");
        let status = Command::new("sh")
            .arg("-c")
            .arg(hook)
            .current_dir(cwd)
            .envs(env.iter().cloned())
            .status()
            .map_err(|e| SupervisorError::Hook {
                stage: stage.as_str(),
                hook: hook.clone(),
                reason: e.to_string(),
            })?;
        if !status.success() {
            return Err(SupervisorError::Hook {
                stage: stage.as_str(),
                hook: hook.clone(),
                reason: match status.code() {
                    Some(code) => format!("exit status {code}"),
                    None => "terminated by signal".to_string(),
                },
            });
        }
    }
    Ok(())
}

/// Like [`run_hooks`], but failures only produce a warning.
pub fn run_hooks_lenient(stage: HookStage, hooks: &[String], cwd: &Path, env: &[(String, String)]) {
    if let Err(err) = run_hooks(stage, hooks, cwd, env) {
        tracing::warn!(stage = %stage, error = %err, "hook failed, continuing");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn hooks_run_in_order_in_workspace() {
        let dir = TempDir::new().unwrap();
        let hooks = vec![
            "echo one >> order.txt".to_string(),
            "echo \"two $GREETING\" >> order.txt".to_string(),
        ];
        let env = vec![("GREETING".to_string(), "hi".to_string())];
        run_hooks(HookStage::BeforeStart, &hooks, dir.path(), &env).expect("hooks");

        let written = std::fs::read_to_string(dir.path().join("order.txt")).unwrap();
        assert_eq!(written, "one\ntwo hi\n");
    }

    #[test]
    fn failing_hook_stops_the_chain() {
        let dir = TempDir::new().unwrap();
        let hooks = vec!["exit 7".to_string(), "touch never.txt".to_string()];
        let err = run_hooks(HookStage::BeforeStart, &hooks, dir.path(), &[]).unwrap_err();

        assert!(err.to_string().contains("before_start"));
        assert!(err.to_string().contains("exit status 7"));
        assert!(!dir.path().join("never.txt").exists());
    }

    #[test]
    fn lenient_run_swallows_failure() {
        let dir = TempDir::new().unwrap();
        run_hooks_lenient(HookStage::AfterStart, &["false".to_string()], dir.path(), &[]);
    }
}
