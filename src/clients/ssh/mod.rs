//! Remote shell handler unit.
//!
//! Relays commands to one configured remote host. Rather than embedding an
//! SSH protocol stack, the unit shells out to the system `ssh` binary in
//! batch mode (key auth only, no interactive prompts) — the same subprocess
//! discipline the daemon uses for other external programs.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;

use crate::clients::ClientContext;
use crate::config::SshConfig;
use crate::registry::{HandlerUnit, OperationDef, OperationTable};

// ─── Shell boundary ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ShellOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// Run one command on the remote host.
    async fn execute(&self, command: &str) -> Result<ShellOutput>;

    /// Human-readable `user@host:port` target description.
    fn target(&self) -> String;
}

// ─── System ssh implementation ───────────────────────────────────────────────

pub struct SystemSsh {
    config: SshConfig,
}

impl SystemSsh {
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }

    fn base_command(&self) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.config.timeout_secs))
            .arg("-p")
            .arg(self.config.port.to_string());
        if let Some(identity) = &self.config.identity_file {
            cmd.arg("-i").arg(identity);
        }
        cmd.arg(format!("{}@{}", self.config.username, self.config.host));
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        cmd
    }
}

#[async_trait]
impl RemoteShell for SystemSsh {
    async fn execute(&self, command: &str) -> Result<ShellOutput> {
        let mut cmd = self.base_command();
        cmd.arg(command);

        // Hung remotes stall only this invocation; the timeout is the
        // connect timeout plus headroom for the command itself.
        let wait = Duration::from_secs(self.config.timeout_secs.saturating_mul(4).max(60));
        let output = tokio::time::timeout(wait, cmd.output())
            .await
            .context("remote command timed out")?
            .context("failed to spawn ssh")?;

        Ok(ShellOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }

    fn target(&self) -> String {
        format!(
            "{}@{}:{}",
            self.config.username, self.config.host, self.config.port
        )
    }
}

// ─── Handler unit ────────────────────────────────────────────────────────────

pub struct RemoteShellUnit {
    shell: Arc<dyn RemoteShell>,
}

impl RemoteShellUnit {
    pub fn create(ctx: Arc<ClientContext>) -> Result<Box<dyn HandlerUnit>> {
        let config = ctx
            .config
            .ssh
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("[ssh] config section missing"))?;
        Ok(Box::new(Self {
            shell: Arc::new(SystemSsh::new(config.clone())),
        }))
    }
}

fn format_output(command: &str, output: &ShellOutput) -> String {
    let mut out = format!("command: {command}\n");
    if !output.stdout.is_empty() {
        out.push_str(&format!("stdout:\n{}\n", output.stdout));
    }
    if !output.stderr.is_empty() {
        out.push_str(&format!("stderr:\n{}\n", output.stderr));
    }
    match output.exit_code {
        Some(0) => {}
        Some(code) => out.push_str(&format!("exit code: {code}\n")),
        None => out.push_str("terminated by signal\n"),
    }
    out
}

impl HandlerUnit for RemoteShellUnit {
    fn name(&self) -> &'static str {
        "RemoteShell"
    }

    fn register_tools(&self, table: &mut OperationTable) {
        let shell = Arc::clone(&self.shell);
        table.insert(
            OperationDef::new(
                "ssh_execute",
                "Run a command on the configured remote host and return its output.",
                json!({
                    "type": "object",
                    "required": ["command"],
                    "properties": {
                        "command": { "type": "string", "description": "Shell command to run remotely." }
                    },
                    "additionalProperties": false
                }),
            ),
            Arc::new(move |args| {
                let shell = Arc::clone(&shell);
                Box::pin(async move {
                    let command = args
                        .get("command")
                        .and_then(Value::as_str)
                        .filter(|c| !c.trim().is_empty())
                        .ok_or_else(|| anyhow::anyhow!("missing required field 'command'"))?;
                    match shell.execute(command).await {
                        Ok(output) => Ok(format_output(command, &output)),
                        Err(e) => Ok(format!("remote execution failed: {e}")),
                    }
                })
            }),
        );

        let shell = Arc::clone(&self.shell);
        table.insert(
            OperationDef::new(
                "ssh_check_connection",
                "Verify the remote host is reachable over SSH.",
                json!({ "type": "object", "properties": {}, "additionalProperties": false }),
            ),
            Arc::new(move |_args| {
                let shell = Arc::clone(&shell);
                Box::pin(async move {
                    match shell.execute("true").await {
                        Ok(output) if output.exit_code == Some(0) => {
                            Ok(format!("connected to {}", shell.target()))
                        }
                        Ok(output) => Ok(format!(
                            "connection to {} failed: {}",
                            shell.target(),
                            output.stderr.trim()
                        )),
                        Err(e) => Ok(format!("connection to {} failed: {e}", shell.target())),
                    }
                })
            }),
        );
    }

    fn register_resources(&self, _table: &mut OperationTable) {}

    fn register_prompts(&self, _table: &mut OperationTable) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_formatting_includes_streams_and_exit_code() {
        let out = format_output(
            "ls /tmp",
            &ShellOutput {
                stdout: "a\nb\n".into(),
                stderr: String::new(),
                exit_code: Some(0),
            },
        );
        assert!(out.contains("command: ls /tmp"));
        assert!(out.contains("stdout:\na\nb"));
        assert!(!out.contains("exit code"), "zero exit is not reported");

        let failed = format_output(
            "false",
            &ShellOutput {
                stdout: String::new(),
                stderr: "oops\n".into(),
                exit_code: Some(1),
            },
        );
        assert!(failed.contains("exit code: 1"));
        assert!(failed.contains("stderr:\noops"));
    }
}
