//! Step script execution
//!
//! `run_script_safe` is the only place that launches a step script:
//!
//! - the script must have passed its manifest check ([`ValidatedExecution`])
//! - the validated environment is passed explicitly to the child
//! - the child runs in its own process group and is tracked in the
//!   [`ChildRegistry`] until it exits
//! - stdout stays on the operator's terminal; stderr is appended to the
//!   install log

use std::fs::OpenOptions;
use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{Context, Result};
use log::info;

use crate::process_guard::{ChildRegistry, CommandProcessGroup};
use crate::script_manifest::ValidatedExecution;

/// How the script is launched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Elevation {
    /// `sudo -n -E bash <script>`; credentials must already be cached
    #[default]
    Sudo,
    /// Plain `bash <script>` as the invoking user
    None,
}

impl Elevation {
    fn command(self, script: &Path) -> Command {
        match self {
            Self::Sudo => {
                let mut cmd = Command::new("sudo");
                cmd.args(["-n", "-E", "bash"]).arg(script);
                cmd
            }
            Self::None => {
                let mut cmd = Command::new("bash");
                cmd.arg(script);
                cmd
            }
        }
    }
}

/// Run a validated script and wait for it.
///
/// A non-zero exit is not an error here; it is reported in
/// [`ScriptOutput::success`]. Errors mean the script could not be started
/// or waited on.
pub fn run_script_safe(
    exec: &ValidatedExecution,
    log_path: &Path,
    elevation: Elevation,
) -> Result<ScriptOutput> {
    let script_path = &exec.script_path;

    let stderr_log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    // Values may be secrets: log names only
    let mut names: Vec<&str> = exec.environment.keys().map(String::as_str).collect();
    names.sort_unstable();
    info!(
        "run_script_safe: {} ({:?}) env={:?}",
        script_path.display(),
        elevation,
        names
    );

    let mut cmd = elevation.command(script_path);
    cmd.envs(&exec.environment)
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::from(stderr_log))
        .in_new_process_group();
    if let Some(dir) = script_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        cmd.current_dir(dir);
    }

    let mut child = cmd
        .spawn()
        .with_context(|| format!("Failed to spawn script: {}", script_path.display()))?;
    let pid = child.id();

    if let Ok(mut registry) = ChildRegistry::global().lock() {
        registry.register(pid);
    }

    let status = child.wait();

    if let Ok(mut registry) = ChildRegistry::global().lock() {
        registry.unregister(pid);
    }

    let status =
        status.with_context(|| format!("Failed waiting for script: {}", exec.script))?;
    let exit_code = status.code();
    let success = exit_code.is_some_and(|code| exec.is_valid_exit_code(code));

    if success {
        info!("Script {} completed", exec.script);
    } else {
        info!(
            "Script {} failed with exit code {}",
            exec.script,
            exit_code.unwrap_or(-1)
        );
    }

    Ok(ScriptOutput { exit_code, success })
}

/// Outcome of a script run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptOutput {
    /// Exit code (None if terminated by signal)
    pub exit_code: Option<i32>,
    /// Whether the exit code is one the manifest accepts
    pub success: bool,
}

impl ScriptOutput {
    /// Exit code with signal deaths reported as -1
    pub fn code(&self) -> i32 {
        self.exit_code.unwrap_or(-1)
    }

    /// Turn a failed run into an error
    pub fn ensure_success(&self, context: &str) -> Result<()> {
        if self.success {
            Ok(())
        } else {
            anyhow::bail!("{} failed (exit code {})", context, self.code())
        }
    }
}
