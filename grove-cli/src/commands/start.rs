//! `grove start`: launch the dev server for the current worktree.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use grove_supervisor::StartRequest;

use super::{cleanup_or_warn, current_workspace, GroveEnv};

#[derive(Args, Debug)]
pub struct StartArgs {
    /// Server name; defaults to the sanitised branch name.
    #[arg(long)]
    pub name: Option<String>,

    /// Fixed port instead of the allocated one.
    #[arg(long)]
    pub port: Option<u16>,

    /// Block until the server accepts connections.
    #[arg(long)]
    pub wait: bool,

    /// Command to run; defaults to `command` in .grove.yaml.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

impl StartArgs {
    pub fn run(self) -> Result<()> {
        let env = GroveEnv::load()?;
        let supervisor = env.supervisor()?;
        cleanup_or_warn(&supervisor);

        let (info, project) = current_workspace()?;
        let name = self.name.unwrap_or_else(|| project.effective_name(&info.name));

        let command = match command_argv(self.command) {
            Some(argv) => argv,
            None => project.command_argv().with_context(|| {
                format!(
                    "no command given and no `command` in {}",
                    grove_core::ProjectConfig::path_for(&info.path).display()
                )
            })?,
        };

        let req = StartRequest::new(name.as_str(), &info.path, command)
            .with_branch(info.branch.clone())
            .with_main_repo(info.main_repo.clone())
            .with_port(self.port)
            .with_project(&project);

        let server = supervisor
            .start(req)
            .with_context(|| format!("failed to start '{name}'"))?;

        if self.wait {
            let timeout = project
                .health_timeout()
                .unwrap_or_else(|| env.config.health_check_timeout());
            supervisor
                .wait_until_listening(&server, timeout)
                .with_context(|| format!("'{name}' did not start listening"))?;
        }

        println!("{} {} on port {}", "started".green().bold(), name.bold(), server.port);
        println!("  url:  {}", server.url);
        if let Some(wildcard) = env.config.subdomain_url(&name) {
            println!("        {wildcard}");
        }
        if let Some(log) = &server.log_file {
            println!("  logs: {}", log.display());
        }
        Ok(())
    }
}

/// A single quoted argument is a shell snippet; several are an argv.
fn command_argv(args: Vec<String>) -> Option<Vec<String>> {
    match args.as_slice() {
        [] => None,
        [single] if single.contains(char::is_whitespace) => {
            Some(vec!["sh".to_string(), "-c".to_string(), single.clone()])
        }
        _ => Some(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_snippet_runs_through_sh() {
        assert_eq!(
            command_argv(vec!["npm run dev".into()]),
            Some(vec!["sh".into(), "-c".into(), "npm run dev".into()])
        );
    }

    #[test]
    fn argv_is_kept() {
        assert_eq!(
            command_argv(vec!["bin/dev".into(), "--verbose".into()]),
            Some(vec!["bin/dev".into(), "--verbose".into()])
        );
        assert_eq!(command_argv(Vec::new()), None);
    }
}
