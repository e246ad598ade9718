//! `HostExecutor` capability (Design Notes: "Cross-container execution").
//! The Supervisor depends only on this trait; it never shells out directly.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::{Child, Command};

/// Spawns a child process either directly in this process's namespace, or
/// through a namespace-entering wrapper when the control plane itself runs
/// inside a container but game servers must live in the host's namespace.
#[async_trait]
pub trait HostExecutor: Send + Sync {
    fn spawn(&self, argv: &[String], cwd: &Path) -> std::io::Result<Child>;
}

/// Direct fork/exec in this process's own namespace. The default.
pub struct DirectExecutor;

impl HostExecutor for DirectExecutor {
    fn spawn(&self, argv: &[String], cwd: &Path) -> std::io::Result<Child> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty argv"))?;
        Command::new(program)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false)
            .spawn()
    }
}

/// Wraps argv in a namespace-entering helper (e.g. `nsenter`) so a
/// containerized control plane can still spawn into the host's process
/// namespace. The helper binary and its flags are deployment-specific.
pub struct NamespaceEnteringExecutor {
    pub helper: String,
    pub helper_args: Vec<String>,
}

impl HostExecutor for NamespaceEnteringExecutor {
    fn spawn(&self, argv: &[String], cwd: &Path) -> std::io::Result<Child> {
        let mut full_argv = Vec::with_capacity(self.helper_args.len() + argv.len());
        full_argv.extend(self.helper_args.iter().cloned());
        full_argv.extend(argv.iter().cloned());
        Command::new(&self.helper)
            .args(&full_argv)
            .current_dir(cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false)
            .spawn()
    }
}
