//! `grove logs`: print or follow a server log.

use std::io::Write;

use anyhow::{Context, Result};
use clap::Args;

use grove_core::RegistryStore;
use grove_supervisor::logs::{follow, log_path, tail};

use super::{resolve_name, GroveEnv};

#[derive(Args, Debug)]
pub struct LogsArgs {
    /// Server whose log to show; defaults to the current worktree.
    pub name: Option<String>,

    /// Number of trailing lines to show.
    #[arg(short = 'n', long, default_value_t = 100)]
    pub lines: usize,

    /// Keep printing new output until interrupted.
    #[arg(short, long)]
    pub follow: bool,
}

impl LogsArgs {
    pub fn run(self) -> Result<()> {
        let env = GroveEnv::load()?;
        let name = resolve_name(self.name)?;

        let registry = env.store.load().context("failed to load registry")?;
        let path = registry
            .server(&name)
            .and_then(|s| s.log_file.clone())
            .unwrap_or_else(|| log_path(&env.config.log_dir_at(&env.home), &name));
        if !path.exists() {
            anyhow::bail!("no log for '{name}' at {}", path.display());
        }

        let mut stdout = std::io::stdout().lock();
        for line in tail(&path, self.lines).with_context(|| format!("read {}", path.display()))? {
            writeln!(stdout, "{line}").context("failed to write to stdout")?;
        }
        stdout.flush().context("failed to write to stdout")?;

        if self.follow {
            let offset = std::fs::metadata(&path)
                .map(|m| m.len())
                .with_context(|| format!("stat {}", path.display()))?;
            follow(&path, offset, &mut stdout, || true)
                .with_context(|| format!("follow {}", path.display()))?;
        }
        Ok(())
    }
}
