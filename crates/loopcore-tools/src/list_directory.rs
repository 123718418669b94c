//! List directory tool — lists entries in a directory, non-recursively.

use std::fmt::Write;

use loopcore_approval::ToolCategory;
use serde_json::Value;

use crate::{BuiltinTool, ToolContext, ToolError, ToolResult};

/// Built-in tool for listing directory contents.
pub struct ListDirectoryTool;

#[async_trait::async_trait]
impl BuiltinTool for ListDirectoryTool {
    fn name(&self) -> &'static str {
        "list_directory"
    }

    fn description(&self) -> &'static str {
        "Lists files and subdirectories directly inside a directory (non-recursive). \
         Directories are listed first, then files, both alphabetically."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Absolute path to the directory to list"
                }
            },
            "required": ["path"]
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Read
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> ToolResult {
        let path = args
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("path is required".into()))?;

        let dir = std::path::Path::new(path);
        if !dir.exists() {
            return Err(ToolError::PathNotFound(path.to_string()));
        }
        if !dir.is_dir() {
            return Err(ToolError::InvalidArguments(format!("{path} is not a directory")));
        }

        let mut read_dir = tokio::fs::read_dir(dir).await?;
        let mut dirs = Vec::new();
        let mut files = Vec::new();

        while let Some(entry) = read_dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                dirs.push(name);
            } else {
                files.push(name);
            }
        }

        dirs.sort();
        files.sort();

        if dirs.is_empty() && files.is_empty() {
            return Ok("(empty directory)".to_string());
        }

        let mut output = String::new();
        for d in &dirs {
            let _ = writeln!(output, "{d}/");
        }
        for f in &files {
            let _ = writeln!(output, "{f}");
        }

        Ok(output.trim_end().to_string())
    }
}
