//! Grep tool — searches file contents by regular expression.

use std::fmt::Write;
use std::path::PathBuf;

use loopcore_approval::ToolCategory;
use regex::Regex;
use serde_json::Value;
use walkdir::WalkDir;

use crate::{BuiltinTool, ToolContext, ToolError, ToolResult};

/// Maximum number of matching lines returned before the result is truncated.
const MAX_MATCHES: usize = 200;

/// Built-in tool for searching file contents with a regular expression.
pub struct GrepTool;

#[async_trait::async_trait]
impl BuiltinTool for GrepTool {
    fn name(&self) -> &'static str {
        "grep"
    }

    fn description(&self) -> &'static str {
        "Searches file contents for a regular expression pattern. Returns matching lines with \
         file path and line number, one per result, most recently modified files first."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Regular expression to search for"
                },
                "path": {
                    "type": "string",
                    "description": "Directory to search in (defaults to workspace root)"
                },
                "glob": {
                    "type": "string",
                    "description": "Optional glob to restrict which files are searched (e.g. \"*.rs\")"
                }
            },
            "required": ["pattern"]
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Search
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult {
        let pattern = args
            .get("pattern")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("pattern is required".into()))?;

        let search_dir = args.get("path").and_then(Value::as_str).map_or_else(|| ctx.workspace_root.clone(), PathBuf::from);

        if !search_dir.exists() {
            return Err(ToolError::PathNotFound(search_dir.display().to_string()));
        }

        let regex = Regex::new(pattern).map_err(|e| ToolError::InvalidArguments(format!("invalid pattern: {e}")))?;

        let file_glob = args
            .get("glob")
            .and_then(Value::as_str)
            .map(|g| {
                globset::GlobBuilder::new(g)
                    .literal_separator(false)
                    .build()
                    .map(|g| g.compile_matcher())
            })
            .transpose()
            .map_err(|e| ToolError::InvalidArguments(format!("invalid glob: {e}")))?;

        let mut matches = Vec::new();
        let mut files_searched = 0usize;

        'walk: for entry in WalkDir::new(&search_dir).follow_links(false).into_iter().filter_entry(|e| {
            if e.depth() == 0 {
                return true;
            }
            e.file_name().to_str().is_none_or(|s| !s.starts_with('.'))
        }) {
            let Ok(entry) = entry else { continue };
            if !entry.file_type().is_file() {
                continue;
            }

            if let Some(glob) = &file_glob {
                let rel = entry.path().strip_prefix(&search_dir).unwrap_or(entry.path());
                if !glob.is_match(rel) {
                    continue;
                }
            }

            let Ok(content) = std::fs::read_to_string(entry.path()) else { continue };
            files_searched = files_searched.saturating_add(1);

            for (idx, line) in content.lines().enumerate() {
                if regex.is_match(line) {
                    matches.push(format!("{}:{}: {}", entry.path().display(), idx.saturating_add(1), line.trim()));
                    if matches.len() >= MAX_MATCHES {
                        break 'walk;
                    }
                }
            }
        }

        if matches.is_empty() {
            return Ok(format!("No matches for \"{pattern}\" ({files_searched} files searched)"));
        }

        let mut output = matches.join("\n");
        if matches.len() >= MAX_MATCHES {
            let _ = write!(output, "\n\n(truncated at {MAX_MATCHES} matches)");
        }

        Ok(output)
    }
}
