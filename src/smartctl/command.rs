//! smartctl Command Execution
//!
//! Runs `smartctl --json -x <device>` as a child process and turns its output into
//! [`Data`]. A single [`SmartctlCommand`] is shared by every device poller.
//!
//! # Failure Classification
//!
//! - **Spawn failure**: binary missing or not executable
//! - **Timeout**: the child is killed once the configured timeout elapses
//! - **Non-zero exit**: smartctl reports its own errors in the JSON `messages` list;
//!   those messages are preferred over the raw exit status when present
//! - **Parse failure**: output is not JSON, or carries no usable protocol
//!
//! # Example
//!
//! ```no_run
//! use smartctl_exporter::smartctl::SmartctlCommand;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> smartctl_exporter::error::Result<()> {
//! let command = SmartctlCommand::new().with_sudo(true);
//! let data = command
//!     .query_device(&CancellationToken::new(), "/dev/sda")
//!     .await?;
//! println!("{} is {}", data.device.name, data.device.protocol);
//! # Ok(())
//! # }
//! ```

use crate::error::{CommandError, ExporterError, Result};
use crate::smartctl::data::Data;
use serde_json::Value;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_SMARTCTL_BINARY: &str = "smartctl";

const SUDO_BINARY: &str = "sudo";

/// Invocation settings for the smartctl binary
#[derive(Debug, Clone)]
pub struct SmartctlCommand {
    binary: String,
    args: Vec<String>,
    use_sudo: bool,
    timeout: Duration,
}

impl Default for SmartctlCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl SmartctlCommand {
    pub fn new() -> Self {
        Self {
            binary: DEFAULT_SMARTCTL_BINARY.to_string(),
            args: vec!["--json".to_string(), "-x".to_string()],
            use_sudo: false,
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Replace the fixed arguments placed before the device path
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_sudo(mut self, use_sudo: bool) -> Self {
        self.use_sudo = use_sudo;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Program and full argument list for a device, sudo applied
    pub fn command_line(&self, device: &str) -> (String, Vec<String>) {
        let mut args = Vec::with_capacity(self.args.len() + 2);
        let program = if self.use_sudo {
            args.push(self.binary.clone());
            SUDO_BINARY.to_string()
        } else {
            self.binary.clone()
        };
        args.extend(self.args.iter().cloned());
        args.push(device.to_string());
        (program, args)
    }

    /// Run smartctl against a device and return its combined stdout and stderr
    pub async fn run(&self, ctx: &CancellationToken, device: &str) -> Result<String> {
        let (program, args) = self.command_line(device);
        let cmdline = std::iter::once(program.as_str())
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        debug!(command = %cmdline, "Running smartctl");

        let child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExporterError::Command {
                command: cmdline.clone(),
                source: CommandError::Spawn(e),
            })?;

        // Dropping the pending future drops the child, which kills it.
        let output = tokio::select! {
            _ = ctx.cancelled() => return Err(ExporterError::Cancelled),
            result = tokio::time::timeout(self.timeout, child.wait_with_output()) => result,
        };

        let output = match output {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ExporterError::Command {
                    command: cmdline,
                    source: CommandError::Spawn(e),
                })
            }
            Err(_) => {
                return Err(ExporterError::Command {
                    command: cmdline,
                    source: CommandError::TimedOut(self.timeout),
                })
            }
        };

        let combined = combined_output(&output);
        if !output.status.success() {
            return Err(ExporterError::Command {
                command: cmdline,
                source: classify_failure(&combined, output.status),
            });
        }

        Ok(combined)
    }

    /// Query a device and parse the result
    pub async fn query_device(&self, ctx: &CancellationToken, device: &str) -> Result<Data> {
        let output = self.run(ctx, device).await?;
        let raw: Value = serde_json::from_str(&output)?;
        Ok(Data::from_json(&raw)?)
    }
}

fn combined_output(output: &Output) -> String {
    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    combined
}

/// Pick the most useful error for a non-zero smartctl exit
///
/// smartctl in JSON mode reports failures such as permission problems as
/// `{"smartctl": {"messages": [{"string": "...", "severity": "error"}]}}`. Older
/// releases put `messages` at the document root, so both places are checked.
pub fn classify_failure(output: &str, status: std::process::ExitStatus) -> CommandError {
    let trimmed = output.trim();
    if trimmed.is_empty() || !trimmed.starts_with('{') {
        return CommandError::Exit(status);
    }

    let fallback = || CommandError::ExitWithOutput {
        status,
        output: trimmed.to_string(),
    };

    let Ok(raw) = serde_json::from_str::<Value>(trimmed) else {
        return fallback();
    };

    let messages: Vec<&str> = ["/smartctl/messages", "/messages"]
        .iter()
        .filter_map(|pointer| raw.pointer(pointer).and_then(Value::as_array))
        .flatten()
        .filter_map(|m| m.get("string").and_then(Value::as_str))
        .filter(|s| !s.is_empty())
        .collect();

    if messages.is_empty() {
        fallback()
    } else {
        CommandError::Diagnostic(messages.join("; "))
    }
}
