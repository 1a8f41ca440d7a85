//! External tool invocation
//!
//! Every tool call carries its own bounded timeout; a timed-out call is a
//! transient failure, never a hang.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::time::timeout;

use devpool_core::prelude::*;

/// Captured output of a finished tool invocation
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
    pub code: Option<i32>,
    pub success: bool,
}

impl ToolOutput {
    /// Return stdout, or a process error carrying stderr when the tool
    /// exited non-zero.
    pub fn require_success(self, tool: &str) -> Result<String> {
        if self.success {
            Ok(self.stdout)
        } else {
            Err(Error::process(format!(
                "{tool} failed with exit code {:?}: {}",
                self.code,
                self.stderr.trim()
            )))
        }
    }
}

/// Run an external tool and capture its output, bounded by `timeout_duration`.
pub async fn run_tool(tool: &str, args: &[&str], timeout_duration: Duration) -> Result<ToolOutput> {
    debug!("Running: {} {}", tool, args.join(" "));

    let run = async {
        let output = Command::new(tool)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::ToolNotFound {
                        tool: tool.to_string(),
                    }
                } else {
                    Error::process(format!("Failed to run {tool}: {e}"))
                }
            })?;

        Ok(ToolOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            code: output.status.code(),
            success: output.status.success(),
        })
    };

    let result: Result<ToolOutput> = timeout(timeout_duration, run)
        .await
        .map_err(|_| Error::timeout(format!("{} {}", tool, args.join(" "))))?;

    let output = result?;
    trace!("{} stdout: {}", tool, output.stdout);
    if !output.stderr.is_empty() {
        trace!("{} stderr: {}", tool, output.stderr);
    }

    Ok(output)
}

/// Spawn a long-lived server process detached from the caller.
///
/// stdout/stderr go to `log_file` when given, otherwise they are discarded.
/// The child is killed on drop as the final safety net.
pub fn spawn_server(tool: &str, args: &[String], log_file: Option<&Path>) -> Result<Child> {
    info!("Spawning server: {} {}", tool, args.join(" "));

    let (stdout, stderr) = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let out = std::fs::File::create(path)?;
            let err = out.try_clone()?;
            (Stdio::from(out), Stdio::from(err))
        }
        None => (Stdio::null(), Stdio::null()),
    };

    Command::new(tool)
        .args(args)
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr)
        .kill_on_drop(true) // Critical: cleanup on drop
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::ToolNotFound {
                    tool: tool.to_string(),
                }
            } else {
                Error::ProcessSpawn {
                    reason: e.to_string(),
                }
            }
        })
}
