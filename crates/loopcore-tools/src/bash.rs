//! Bash tool — executes shell commands with a persistent working directory.

use std::path::PathBuf;

use loopcore_approval::{ConfirmDetails, ToolCategory};
use serde_json::Value;
use tokio::process::Command;

use crate::{BuiltinTool, ToolContext, ToolError, ToolResult};

/// Default timeout in milliseconds (2 minutes).
const DEFAULT_TIMEOUT_MS: u64 = 120_000;
/// Maximum timeout in milliseconds (10 minutes).
const MAX_TIMEOUT_MS: u64 = 600_000;
/// Sentinel used to extract the post-command working directory.
const CWD_SENTINEL: &str = "__LOOPCORE_CWD__";

/// Built-in tool for executing bash commands.
pub struct BashTool;

#[async_trait::async_trait]
impl BuiltinTool for BashTool {
    fn name(&self) -> &'static str {
        "bash"
    }

    fn description(&self) -> &'static str {
        "Executes a bash command. The working directory persists between invocations. \
         Optional timeout in milliseconds (max 600000)."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The bash command to execute"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Timeout in milliseconds (default: 120000, max: 600000)"
                }
            },
            "required": ["command"]
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Exec
    }

    fn confirm_predicate(&self, args: &Value) -> Option<ConfirmDetails> {
        let command = args.get("command").and_then(Value::as_str).unwrap_or("(unknown command)");
        Some(ConfirmDetails::exec(format!("Run `{command}`"), command))
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult {
        let command = args
            .get("command")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("command is required".into()))?;

        let timeout_ms = args
            .get("timeout")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_TIMEOUT_MS)
            .min(MAX_TIMEOUT_MS);

        let cwd = ctx.cwd.read().await.clone();

        let wrapped = format!(
            "{command}\n__LOOPCORE_EXIT__=$?\necho \"{CWD_SENTINEL}\"\npwd\nexit $__LOOPCORE_EXIT__"
        );

        let result = tokio::select! {
            biased;
            () = ctx.cancellation_token.cancelled() => return Err(ToolError::Cancelled),
            result = tokio::time::timeout(std::time::Duration::from_millis(timeout_ms), run_bash(&wrapped, &cwd)) => result,
        };

        match result {
            Ok(Ok((stdout, stderr, exit_code))) => {
                let (output, new_cwd) = parse_sentinel_output(&stdout);

                if let Some(new_cwd) = new_cwd {
                    *ctx.cwd.write().await = new_cwd;
                }

                let mut result_text = String::new();
                if !output.is_empty() {
                    result_text.push_str(&output);
                }
                if !stderr.is_empty() {
                    if !result_text.is_empty() {
                        result_text.push('\n');
                    }
                    result_text.push_str("STDERR:\n");
                    result_text.push_str(&stderr);
                }
                if exit_code != 0 {
                    if !result_text.is_empty() {
                        result_text.push('\n');
                    }
                    result_text.push_str("(exit code: ");
                    result_text.push_str(&exit_code.to_string());
                    result_text.push(')');
                }
                if result_text.is_empty() {
                    result_text.push_str("(no output)");
                }

                Ok(result_text)
            },
            Ok(Err(e)) => Err(ToolError::ExecutionFailed(e.to_string())),
            Err(_) => Err(ToolError::Timeout(timeout_ms)),
        }
    }
}

/// Run a bash command and capture stdout, stderr, and exit code.
async fn run_bash(command: &str, cwd: &std::path::Path) -> std::io::Result<(String, String, i32)> {
    let output = Command::new("bash").arg("-c").arg(command).current_dir(cwd).output().await?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let exit_code = output.status.code().unwrap_or(-1);

    Ok((stdout, stderr, exit_code))
}

/// Parse the sentinel out of stdout to extract command output and new cwd.
fn parse_sentinel_output(stdout: &str) -> (String, Option<PathBuf>) {
    if let Some(sentinel_pos) = stdout.find(CWD_SENTINEL) {
        let output = stdout[..sentinel_pos].trim_end().to_string();
        let after_sentinel = &stdout[sentinel_pos.saturating_add(CWD_SENTINEL.len())..];
        let new_cwd = after_sentinel.lines().find(|l| !l.is_empty()).map(|l| PathBuf::from(l.trim()));
        (output, new_cwd)
    } else {
        (stdout.to_string(), None)
    }
}

#[cfg(test)]
mod tests {
    use loopcore_approval::ApprovalMode;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    use super::*;

    fn ctx_with_root(root: &std::path::Path) -> ToolContext {
        ToolContext::new(root.to_path_buf(), "session", "call_1", CancellationToken::new(), ApprovalMode::Default, None)
    }

    #[tokio::test]
    async fn bash_echo_returns_stdout() {
        let ctx = ctx_with_root(&std::env::temp_dir());
        let result = BashTool.execute(serde_json::json!({"command": "echo hello"}), &ctx).await.unwrap();
        assert!(result.contains("hello"));
    }

    #[tokio::test]
    async fn bash_reports_nonzero_exit_code() {
        let ctx = ctx_with_root(&std::env::temp_dir());
        let result = BashTool.execute(serde_json::json!({"command": "exit 42"}), &ctx).await.unwrap();
        assert!(result.contains("exit code: 42"));
    }

    #[tokio::test]
    async fn bash_cwd_persists_across_calls() {
        let dir = TempDir::new().unwrap();
        let ctx = ctx_with_root(dir.path());

        std::fs::create_dir(dir.path().join("subdir")).unwrap();
        BashTool.execute(serde_json::json!({"command": "cd subdir"}), &ctx).await.unwrap();

        let cwd = ctx.cwd.read().await.clone();
        assert!(cwd.ends_with("subdir"));

        let result = BashTool.execute(serde_json::json!({"command": "pwd"}), &ctx).await.unwrap();
        assert!(result.contains("subdir"));
    }

    #[tokio::test]
    async fn bash_times_out() {
        let ctx = ctx_with_root(&std::env::temp_dir());
        let result = BashTool.execute(serde_json::json!({"command": "sleep 10", "timeout": 100}), &ctx).await;
        assert!(matches!(result.unwrap_err(), ToolError::Timeout(100)));
    }

    #[tokio::test]
    async fn bash_respects_cancellation() {
        let ctx = ctx_with_root(&std::env::temp_dir());
        ctx.cancellation_token.cancel();
        let result = BashTool.execute(serde_json::json!({"command": "sleep 5"}), &ctx).await;
        assert!(matches!(result.unwrap_err(), ToolError::Cancelled));
    }

    #[test]
    fn parse_sentinel_extracts_output_and_cwd() {
        let stdout = format!("hello world\n{CWD_SENTINEL}\n/tmp/test\n");
        let (output, cwd) = parse_sentinel_output(&stdout);
        assert_eq!(output, "hello world");
        assert_eq!(cwd, Some(PathBuf::from("/tmp/test")));
    }

    #[test]
    fn bash_is_not_read_only_and_confirms() {
        assert!(!BashTool.is_read_only());
        assert!(BashTool.confirm_predicate(&serde_json::json!({"command": "ls"})).is_some());
    }
}
