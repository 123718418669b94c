//! Write file tool — writes content to a file, creating parent directories
//! as needed.

use loopcore_approval::{ConfirmDetails, ToolCategory};
use serde_json::Value;

use crate::{BuiltinTool, ToolContext, ToolError, ToolResult};

/// Built-in tool for writing files.
pub struct WriteFileTool;

#[async_trait::async_trait]
impl BuiltinTool for WriteFileTool {
    fn name(&self) -> &'static str {
        "write_file"
    }

    fn description(&self) -> &'static str {
        "Writes content to a file. Creates parent directories if they don't exist. \
         Overwrites the file if it already exists."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Absolute path to the file to write"
                },
                "content": {
                    "type": "string",
                    "description": "The content to write to the file"
                }
            },
            "required": ["file_path", "content"]
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Edit
    }

    fn confirm_predicate(&self, args: &Value) -> Option<ConfirmDetails> {
        let file_path = args.get("file_path").and_then(Value::as_str).unwrap_or("(unknown file)");
        let content = args.get("content").and_then(Value::as_str).unwrap_or("");
        Some(ConfirmDetails::edit(format!("Write to {file_path}"), file_path, content))
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> ToolResult {
        let file_path = args
            .get("file_path")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("file_path is required".into()))?;

        let content = args
            .get("content")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("content is required".into()))?;

        let path = std::path::Path::new(file_path);
        if !path.is_absolute() {
            return Err(ToolError::InvalidArguments("file_path must be an absolute path".into()));
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(path, content).await?;

        Ok(format!("Wrote {} bytes to {file_path}", content.len()))
    }
}
