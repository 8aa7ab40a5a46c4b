//! Shell command execution behind the command policy.

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use hearth_core::{RiskLevel, Tool, ToolOutput};
use hearth_security::sanitize_output;
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::{info, warn};

use crate::{str_arg, ToolPolicy};

pub struct TerminalExecuteTool {
    policy: Arc<ToolPolicy>,
}

impl TerminalExecuteTool {
    pub fn new(policy: Arc<ToolPolicy>) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Tool for TerminalExecuteTool {
    fn name(&self) -> &str {
        "terminal_execute"
    }

    fn description(&self) -> &str {
        "Execute a shell command and return its output"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "description": "Shell command to run" },
                "cwd": { "type": "string", "description": "Working directory" }
            },
            "required": ["command"]
        })
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Medium
    }

    fn requires_approval(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> anyhow::Result<ToolOutput> {
        let command = str_arg(&args, "command")?;
        if let Err(e) = self.policy.commands.check(command) {
            warn!(error = %e, "Command refused");
            return Ok(ToolOutput::err(e.to_string()));
        }

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(raw_cwd) = args.get("cwd").and_then(Value::as_str) {
            match self.policy.paths.check(raw_cwd) {
                Ok(dir) => {
                    cmd.current_dir(dir);
                }
                Err(e) => return Ok(ToolOutput::err(format!("Access denied: {}", e))),
            }
        }

        let preview: String = command.chars().take(80).collect();
        info!(command = %preview, "Running command");

        let timeout = self.policy.command_timeout;
        let child = cmd.spawn()?;
        // Dropping the wait future on timeout kills the child.
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(secs = timeout.as_secs(), "Command timed out");
                return Ok(ToolOutput::err(format!(
                    "Command timed out after {} seconds",
                    timeout.as_secs()
                ))
                .with_metadata(json!({ "exit_code": null, "timed_out": true, "truncated": false })));
            }
        };

        let max = self.policy.max_output_chars;
        let (stdout, out_truncated) = sanitize_output(&String::from_utf8_lossy(&output.stdout), max);
        let (stderr, err_truncated) = sanitize_output(&String::from_utf8_lossy(&output.stderr), max);
        let exit_code = output.status.code();
        let metadata = json!({
            "exit_code": exit_code,
            "timed_out": false,
            "truncated": out_truncated || err_truncated,
            "stderr": stderr,
        });

        if output.status.success() {
            Ok(ToolOutput::ok(stdout).with_metadata(metadata))
        } else {
            let error = if stderr.trim().is_empty() {
                format!("Command exited with status {}", exit_code.unwrap_or(-1))
            } else {
                stderr.clone()
            };
            let mut result = ToolOutput::err(error).with_metadata(metadata);
            result.output = Some(stdout);
            Ok(result)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use hearth_security::CommandPolicy;

    fn tool(policy: ToolPolicy) -> TerminalExecuteTool {
        TerminalExecuteTool::new(Arc::new(policy))
    }

    #[tokio::test]
    async fn test_echo_succeeds() {
        let out = tool(ToolPolicy::default())
            .execute(json!({"command": "echo hearth"}))
            .await
            .unwrap();
        assert!(out.success);
        assert_eq!(out.output.unwrap().trim(), "hearth");
        assert_eq!(out.metadata["exit_code"], 0);
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_failure() {
        let out = tool(ToolPolicy::default())
            .execute(json!({"command": "echo oops >&2; exit 3"}))
            .await
            .unwrap();
        assert!(!out.success);
        assert_eq!(out.error.unwrap().trim(), "oops");
        assert_eq!(out.metadata["exit_code"], 3);
    }

    #[tokio::test]
    async fn test_dangerous_command_never_runs() {
        let out = tool(ToolPolicy::default())
            .execute(json!({"command": "rm -rf /"}))
            .await
            .unwrap();
        assert!(!out.success);
        assert!(out.error.unwrap().starts_with("Dangerous command pattern blocked"));
    }

    #[tokio::test]
    async fn test_allowed_list_enforced() {
        let policy = ToolPolicy {
            commands: CommandPolicy::new(Vec::<String>::new(), ["^echo"]).unwrap(),
            ..ToolPolicy::default()
        };
        let out = tool(policy).execute(json!({"command": "pwd"})).await.unwrap();
        assert_eq!(out.error.as_deref(), Some("Command not in allowed list"));
    }

    #[tokio::test]
    async fn test_timeout() {
        let policy = ToolPolicy {
            command_timeout: Duration::from_millis(200),
            ..ToolPolicy::default()
        };
        let out = tool(policy).execute(json!({"command": "sleep 5"})).await.unwrap();
        assert!(!out.success);
        assert_eq!(out.metadata["timed_out"], true);
    }

    #[tokio::test]
    async fn test_output_truncated() {
        let policy = ToolPolicy {
            max_output_chars: 10,
            ..ToolPolicy::default()
        };
        let out = tool(policy)
            .execute(json!({"command": "printf 'aaaaaaaaaaaaaaaaaaaa'"}))
            .await
            .unwrap();
        assert!(out.output.unwrap().ends_with("(output truncated)"));
        assert_eq!(out.metadata["truncated"], true);
    }
}
