use std::path::Path;
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{Result, VsrError};
use crate::platform::shell;

/// Exit code of `restic cat config` when the repository does not exist yet
/// (restic 0.17 and later).
pub const UNINITIALIZED_EXIT_CODE: i32 = 10;

/// Exit status and combined stdout/stderr of a finished restic invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutcome {
    pub code: i32,
    pub output: String,
}

/// Runs `<program> <args>` to completion. Replaces the real subprocess in
/// tests.
pub type CommandRunner =
    Arc<dyn Fn(&str, &[String], &AtomicBool) -> Result<CommandOutcome> + Send + Sync>;

/// The restic command line, driven as an opaque subprocess.
pub struct Restic {
    binary: String,
    runner: Option<CommandRunner>,
    initialized: AtomicBool,
}

impl Restic {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            runner: None,
            initialized: AtomicBool::new(false),
        }
    }

    pub fn with_runner(mut self, runner: CommandRunner) -> Self {
        self.runner = Some(runner);
        self
    }

    fn run(&self, args: &[String], shutdown: &AtomicBool) -> Result<CommandOutcome> {
        if let Some(runner) = &self.runner {
            return runner(&self.binary, args, shutdown);
        }
        let mut cmd = Command::new(&self.binary);
        cmd.args(args);
        debug!(command = %shell::describe(&cmd), "running restic");
        let output = shell::run_command(&mut cmd, None, Some(shutdown))?;
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(CommandOutcome {
            code: shell::exit_code(&output),
            output: combined,
        })
    }

    /// Make sure the repository exists, creating it when `restic cat config`
    /// reports it uninitialized. Probes once per process after a success.
    pub fn ensure_initialized(&self, shutdown: &AtomicBool) -> Result<()> {
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }

        let probe = self.run(&args(&["cat", "config"]), shutdown)?;
        match probe.code {
            0 => {}
            UNINITIALIZED_EXIT_CODE => {
                info!("restic repository not initialized, running restic init");
                let init = self.run(&args(&["init"]), shutdown)?;
                if init.code != 0 {
                    return Err(VsrError::Tool(format!(
                        "restic init failed with exit code {}: {}",
                        init.code,
                        init.output.trim()
                    )));
                }
            }
            code => {
                return Err(VsrError::Tool(format!(
                    "restic cat config failed with exit code {code}: {}",
                    probe.output.trim()
                )));
            }
        }

        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    /// `restic backup <dir>`, initializing the repository first if needed.
    pub fn backup(&self, dir: &Path, shutdown: &AtomicBool) -> Result<()> {
        self.ensure_initialized(shutdown)?;
        let outcome = self.run(
            &["backup".to_string(), dir.to_string_lossy().into_owned()],
            shutdown,
        )?;
        log_output(&outcome.output);
        if outcome.code != 0 {
            return Err(VsrError::Tool(format!(
                "restic backup exited with {}: {}",
                outcome.code,
                last_line(&outcome.output)
            )));
        }
        Ok(())
    }

    /// `restic forget <retention tokens> --prune`.
    pub fn forget(&self, retention: &str, shutdown: &AtomicBool) -> Result<()> {
        let mut argv = vec!["forget".to_string()];
        argv.extend(retention.split_whitespace().map(str::to_string));
        argv.push("--prune".to_string());

        let outcome = self.run(&argv, shutdown)?;
        log_output(&outcome.output);
        if outcome.code != 0 {
            return Err(VsrError::Tool(format!(
                "restic forget --prune exited with {}: {}",
                outcome.code,
                last_line(&outcome.output)
            )));
        }
        Ok(())
    }
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

fn log_output(output: &str) {
    for line in output.lines().filter(|l| !l.trim().is_empty()) {
        info!(target: "restic", "{line}");
    }
}

fn last_line(output: &str) -> &str {
    output
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("")
        .trim()
}
