//! A session- or execution-scoped set of pre-approved (tool, principal) keys.

use std::collections::HashSet;
use std::sync::RwLock;

/// Set of string keys that short-circuit the approval gate.
///
/// Scope (per-execution vs. per-session) is a choice the caller makes by
/// deciding how many `Engine`/`Scheduler` instances share one `Allowlist`;
/// this type itself has no opinion on scope. Keys are only ever added when
/// the user selects `always`.
#[derive(Debug, Default)]
pub struct Allowlist {
    keys: RwLock<HashSet<String>>,
}

impl Allowlist {
    /// An empty allowlist.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `key` has been approved.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.keys.read().expect("allowlist poisoned").contains(key)
    }

    /// Approve `key` for future calls.
    pub fn add(&self, key: impl Into<String>) {
        self.keys.write().expect("allowlist poisoned").insert(key.into());
    }

    /// Revoke a previously approved key.
    pub fn remove(&self, key: &str) {
        self.keys.write().expect("allowlist poisoned").remove(key);
    }

    /// Revoke every approved key.
    pub fn clear(&self) {
        self.keys.write().expect("allowlist poisoned").clear();
    }

    /// Number of approved keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.read().expect("allowlist poisoned").len()
    }

    /// Whether no keys are approved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Derive an allowlist key for a tool call: file path for file operations,
/// command text for shell operations, tool name otherwise.
#[must_use]
pub fn allowlist_key(tool_name: &str, file_path: Option<&str>, command: Option<&str>) -> String {
    if let Some(path) = file_path {
        return format!("{tool_name}:{path}");
    }
    if let Some(command) = command {
        return format!("{tool_name}:{command}");
    }
    tool_name.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_has_round_trips() {
        let allowlist = Allowlist::new();
        assert!(!allowlist.has("write_file:x.txt"));
        allowlist.add("write_file:x.txt");
        assert!(allowlist.has("write_file:x.txt"));
    }

    #[test]
    fn clear_empties_the_set() {
        let allowlist = Allowlist::new();
        allowlist.add("bash:ls");
        allowlist.clear();
        assert!(allowlist.is_empty());
    }

    #[test]
    fn key_prefers_file_path_over_command() {
        let key = allowlist_key("write_file", Some("x.txt"), None);
        assert_eq!(key, "write_file:x.txt");
        let key = allowlist_key("bash", None, Some("ls -la"));
        assert_eq!(key, "bash:ls -la");
        let key = allowlist_key("list_files", None, None);
        assert_eq!(key, "list_files");
    }
}
