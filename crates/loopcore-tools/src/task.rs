//! Task tool — spawns a sub-agent to carry out a delegated piece of work.

use std::time::Duration;

use loopcore_approval::ToolCategory;
use serde_json::Value;

use crate::subagent_spawner::SubAgentRequest;
use crate::{BuiltinTool, ToolContext, ToolError, ToolResult};

/// Built-in tool for delegating work to a nested sub-agent.
///
/// The sub-agent runs its own reason-act loop against the same tool registry
/// and reports back a single result; its events are re-emitted by the caller
/// as progress of this tool call, and cancelling the parent call cancels the
/// sub-agent in turn (both share the parent's cancellation token).
pub struct TaskTool;

#[async_trait::async_trait]
impl BuiltinTool for TaskTool {
    fn name(&self) -> &'static str {
        "task"
    }

    fn description(&self) -> &'static str {
        "Delegates a self-contained piece of work to a sub-agent and returns its final result. \
         Use for work that benefits from its own focused context, such as an open-ended search \
         across many files."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "description": {
                    "type": "string",
                    "description": "Short description of the task (3-5 words)"
                },
                "prompt": {
                    "type": "string",
                    "description": "Detailed instructions for the sub-agent"
                },
                "timeout_secs": {
                    "type": "integer",
                    "description": "Optional timeout in seconds"
                }
            },
            "required": ["description", "prompt"]
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Agent
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult {
        let description = args
            .get("description")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("description is required".into()))?;

        let prompt = args
            .get("prompt")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("prompt is required".into()))?;

        let timeout = args.get("timeout_secs").and_then(Value::as_u64).map(Duration::from_secs);

        let Some(spawner) = ctx.subagent_spawner().await else {
            return Err(ToolError::ExecutionFailed("no sub-agent spawner configured for this session".into()));
        };

        let request = SubAgentRequest { description: description.to_string(), prompt: prompt.to_string(), timeout };

        let outcome = tokio::select! {
            biased;
            () = ctx.cancellation_token.cancelled() => return Err(ToolError::Cancelled),
            outcome = spawner.spawn(request) => outcome,
        };

        match outcome {
            Ok(result) if result.success => Ok(result.output),
            Ok(result) => Err(ToolError::ExecutionFailed(
                result.error.unwrap_or_else(|| "sub-agent did not complete successfully".to_string()),
            )),
            Err(reason) => Err(ToolError::ExecutionFailed(reason)),
        }
    }
}

#[cfg(test)]
mod tests {
    use loopcore_approval::ApprovalMode;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::subagent_spawner::{SubAgentResult, SubAgentSpawner};

    struct FakeSpawner(SubAgentResult);

    #[async_trait::async_trait]
    impl SubAgentSpawner for FakeSpawner {
        async fn spawn(&self, _request: SubAgentRequest) -> Result<SubAgentResult, String> {
            Ok(self.0.clone())
        }
    }

    struct FailingSpawner;

    #[async_trait::async_trait]
    impl SubAgentSpawner for FailingSpawner {
        async fn spawn(&self, _request: SubAgentRequest) -> Result<SubAgentResult, String> {
            Err("spawn failed".to_string())
        }
    }

    fn ctx() -> ToolContext {
        ToolContext::new(
            std::env::temp_dir(),
            "session",
            "call_1",
            CancellationToken::new(),
            ApprovalMode::Default,
            None,
        )
    }

    #[tokio::test]
    async fn task_returns_sub_agent_output_on_success() {
        let ctx = ctx();
        ctx.set_subagent_spawner(Some(std::sync::Arc::new(FakeSpawner(SubAgentResult {
            success: true,
            output: "done searching".to_string(),
            duration_ms: 10,
            tool_calls: 2,
            error: None,
        }))))
        .await;

        let result = TaskTool
            .execute(serde_json::json!({"description": "search", "prompt": "find it"}), &ctx)
            .await
            .unwrap();

        assert_eq!(result, "done searching");
    }

    #[tokio::test]
    async fn task_surfaces_sub_agent_failure() {
        let ctx = ctx();
        ctx.set_subagent_spawner(Some(std::sync::Arc::new(FakeSpawner(SubAgentResult {
            success: false,
            output: String::new(),
            duration_ms: 5,
            tool_calls: 0,
            error: Some("gave up".to_string()),
        }))))
        .await;

        let result = TaskTool
            .execute(serde_json::json!({"description": "search", "prompt": "find it"}), &ctx)
            .await;

        assert!(result.unwrap_err().to_string().contains("gave up"));
    }

    #[tokio::test]
    async fn task_surfaces_spawn_error() {
        let ctx = ctx();
        ctx.set_subagent_spawner(Some(std::sync::Arc::new(FailingSpawner))).await;

        let result = TaskTool
            .execute(serde_json::json!({"description": "search", "prompt": "find it"}), &ctx)
            .await;

        assert!(result.unwrap_err().to_string().contains("spawn failed"));
    }

    #[tokio::test]
    async fn task_without_spawner_is_an_error() {
        let result = TaskTool
            .execute(serde_json::json!({"description": "search", "prompt": "find it"}), &ctx())
            .await;

        assert!(result.unwrap_err().to_string().contains("no sub-agent spawner"));
    }

    #[test]
    fn task_is_not_read_only() {
        assert!(!TaskTool.is_read_only());
    }
}
