#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! Tool registry and built-in coding tools for the agent execution core.
//!
//! Tools are plain Rust values implementing [`BuiltinTool`] — a small
//! capability set (`category`, `is_read_only`, `confirm_predicate`,
//! `execute`) rather than a family of per-category sub-types. The Tool
//! Scheduler in `loopcore-runtime` drives a call through this trait; the
//! approval decision itself lives in `loopcore-approval`.

mod bash;
mod edit_file;
mod glob;
mod grep;
mod list_directory;
mod read_file;
mod subagent_spawner;
mod task;
mod truncate;
mod write_file;

pub use bash::BashTool;
pub use edit_file::EditFileTool;
pub use glob::GlobTool;
pub use grep::GrepTool;
pub use list_directory::ListDirectoryTool;
pub use read_file::ReadFileTool;
pub use subagent_spawner::{SubAgentRequest, SubAgentResult, SubAgentSpawner};
pub use task::TaskTool;
pub use truncate::truncate_at_char_boundary;
pub use write_file::WriteFileTool;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use loopcore_approval::{ApprovalMode, ConfirmCallback, ConfirmDetails, ToolCategory};
use serde_json::Value;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Output longer than this is truncated before being appended as a
/// tool-result message (separate from, and a coarser backstop than, the
/// summarizer's LLM-driven condensation in `loopcore-runtime`).
const MAX_OUTPUT_CHARS: usize = 30_000;

/// A built-in tool that executes directly in-process (as opposed to an MCP
/// tool dispatched over a `server:tool` name).
#[async_trait::async_trait]
pub trait BuiltinTool: Send + Sync {
    /// Tool name. Must not contain `:` — that namespace is reserved for MCP
    /// tools.
    fn name(&self) -> &'static str;

    /// Human-readable description shown to the LLM.
    fn description(&self) -> &'static str;

    /// JSON schema for the tool's input parameters.
    fn input_schema(&self) -> Value;

    /// Broad category used by the approval gate (e.g. to recognize
    /// edit-like tools under `AutoEdit`).
    fn category(&self) -> ToolCategory;

    /// Whether this tool only reads state — read-only tools always bypass
    /// confirmation.
    fn is_read_only(&self) -> bool {
        matches!(self.category(), ToolCategory::Read | ToolCategory::Search)
    }

    /// Decide what, if anything, to ask the user before running with these
    /// arguments. `None` means no confirmation is needed regardless of
    /// approval mode.
    fn confirm_predicate(&self, _args: &Value) -> Option<ConfirmDetails> {
        None
    }

    /// Execute the tool with already-validated arguments.
    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult;
}

/// Shared context available to every built-in tool invocation.
pub struct ToolContext {
    /// Workspace root directory.
    pub workspace_root: PathBuf,
    /// Current working directory, persisted across `bash` invocations within
    /// one session.
    pub cwd: Arc<RwLock<PathBuf>>,
    /// Session this call belongs to.
    pub session_id: String,
    /// Id of this specific tool call.
    pub call_id: String,
    /// Cancellation signal for the surrounding execution.
    pub cancellation_token: CancellationToken,
    /// Approval mode in effect for this execution.
    pub approval_mode: ApprovalMode,
    /// Confirmation callback, if the caller registered one.
    pub confirm_callback: Option<Arc<dyn ConfirmCallback>>,
    /// Sub-agent spawner, set by the runtime before dispatching a `Task`
    /// call and otherwise absent.
    subagent_spawner: RwLock<Option<Arc<dyn SubAgentSpawner>>>,
}

impl ToolContext {
    /// Create a new tool context with its own independent `cwd`.
    #[must_use]
    pub fn new(
        workspace_root: PathBuf,
        session_id: impl Into<String>,
        call_id: impl Into<String>,
        cancellation_token: CancellationToken,
        approval_mode: ApprovalMode,
        confirm_callback: Option<Arc<dyn ConfirmCallback>>,
    ) -> Self {
        let cwd = Arc::new(RwLock::new(workspace_root.clone()));
        Self {
            workspace_root,
            cwd,
            session_id: session_id.into(),
            call_id: call_id.into(),
            cancellation_token,
            approval_mode,
            confirm_callback,
            subagent_spawner: RwLock::new(None),
        }
    }

    /// Create a per-call tool context that shares `cwd` with sibling calls
    /// in the same session but owns its own independent spawner slot — this
    /// prevents concurrent calls from racing on which sub-agent spawner is
    /// visible to `Task`.
    #[must_use]
    pub fn with_shared_cwd(
        workspace_root: PathBuf,
        cwd: Arc<RwLock<PathBuf>>,
        session_id: impl Into<String>,
        call_id: impl Into<String>,
        cancellation_token: CancellationToken,
        approval_mode: ApprovalMode,
        confirm_callback: Option<Arc<dyn ConfirmCallback>>,
    ) -> Self {
        Self {
            workspace_root,
            cwd,
            session_id: session_id.into(),
            call_id: call_id.into(),
            cancellation_token,
            approval_mode,
            confirm_callback,
            subagent_spawner: RwLock::new(None),
        }
    }

    /// Register the sub-agent spawner for the `Task` tool to use.
    pub async fn set_subagent_spawner(&self, spawner: Option<Arc<dyn SubAgentSpawner>>) {
        *self.subagent_spawner.write().await = spawner;
    }

    /// Fetch the registered sub-agent spawner, if any.
    pub async fn subagent_spawner(&self) -> Option<Arc<dyn SubAgentSpawner>> {
        self.subagent_spawner.read().await.clone()
    }
}

/// Tool execution errors.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Arguments failed to parse or were missing a required field.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The tool ran but failed.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// A referenced path does not exist.
    #[error("path not found: {0}")]
    PathNotFound(String),

    /// The tool did not finish within its timeout.
    #[error("timed out after {0}ms")]
    Timeout(u64),

    /// The call was cancelled before it finished.
    #[error("cancelled")]
    Cancelled,
}

/// Result type for tool execution.
pub type ToolResult = Result<String, ToolError>;

/// Mapping from string key to [`BuiltinTool`]; keys are unique and
/// insertion order is not meaningful.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn BuiltinTool>>,
}

impl ToolRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self { tools: HashMap::new() }
    }

    /// A registry with every built-in tool registered.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(ReadFileTool));
        registry.register(Box::new(WriteFileTool));
        registry.register(Box::new(EditFileTool));
        registry.register(Box::new(GlobTool));
        registry.register(Box::new(GrepTool));
        registry.register(Box::new(BashTool));
        registry.register(Box::new(ListDirectoryTool));
        registry.register(Box::new(TaskTool));
        registry
    }

    /// Register a tool, replacing any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn BuiltinTool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Look up a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&dyn BuiltinTool> {
        self.tools.get(name).map(AsRef::as_ref)
    }

    /// Whether `name` refers to a built-in tool. MCP tools carry a
    /// `server:tool` name, so the presence of `:` distinguishes them.
    #[must_use]
    pub fn is_builtin(name: &str) -> bool {
        !name.contains(':')
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Iterate over every registered tool.
    pub fn iter(&self) -> impl Iterator<Item = &dyn BuiltinTool> {
        self.tools.values().map(AsRef::as_ref)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Truncate tool output to stay within the per-message ceiling, appending a
/// notice if anything was cut.
#[must_use]
pub fn truncate_output(output: String) -> String {
    if output.len() <= MAX_OUTPUT_CHARS {
        return output;
    }
    let mut truncated = truncate_at_char_boundary(&output, MAX_OUTPUT_CHARS);
    truncated.push_str("\n\n... (output truncated — exceeded 30000 character limit)");
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_builtin_distinguishes_mcp_names() {
        assert!(ToolRegistry::is_builtin("read_file"));
        assert!(ToolRegistry::is_builtin("bash"));
        assert!(!ToolRegistry::is_builtin("filesystem:read_file"));
    }

    #[test]
    fn registry_with_defaults_has_every_builtin() {
        let registry = ToolRegistry::with_defaults();
        for name in ["read_file", "write_file", "edit_file", "glob", "grep", "bash", "list_directory", "task"] {
            assert!(registry.get(name).is_some(), "missing {name}");
        }
        assert!(registry.get("nonexistent").is_none());
        assert_eq!(registry.len(), 8);
    }

    #[test]
    fn truncate_output_passes_through_small_strings() {
        let small = "hello".to_string();
        assert_eq!(truncate_output(small.clone()), small);
    }

    #[test]
    fn truncate_output_cuts_and_annotates_large_strings() {
        let large = "x".repeat(40_000);
        let result = truncate_output(large);
        assert!(result.len() < 40_000);
        assert!(result.contains("output truncated"));
    }
}
