//! Types shared by the allowlist and the approval gate.

use serde::{Deserialize, Serialize};

/// Session-wide policy governing whether non-read-only tools require
/// confirmation.
///
/// Kept as a closed enum deliberately: adding a mode means editing the
/// gate's decision table, not bolting on an escape hatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    /// Every non-read-only tool without an allowlist hit is confirmed.
    #[default]
    Default,
    /// Edit-like tools (write-file, patch) run without confirmation;
    /// everything else follows `Default` rules.
    AutoEdit,
    /// Every tool runs without confirmation.
    Yolo,
}

/// Broad shape of what a tool does, used by the gate to recognize
/// "edit-like" tools under `AutoEdit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    /// Reads the filesystem or environment without mutating it.
    Read,
    /// Writes or patches a file.
    Edit,
    /// Runs a subprocess.
    Exec,
    /// Searches the filesystem or an index.
    Search,
    /// Spawns a sub-agent.
    Agent,
    /// Anything not covered above.
    Other,
}

impl ToolCategory {
    /// Whether `AutoEdit` should treat this category as pre-approved.
    #[must_use]
    pub fn is_edit_like(self) -> bool {
        matches!(self, Self::Edit)
    }
}

/// What kind of action a confirmation prompt is describing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmKind {
    /// A file write or patch.
    Edit,
    /// A subprocess invocation.
    Exec,
    /// Anything else worth telling the user about before it runs.
    Info,
}

/// What to show the user before they decide whether a tool call may run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmDetails {
    /// The kind of action being confirmed.
    pub kind: ConfirmKind,
    /// Human-readable title for the prompt.
    pub title: String,
    /// File the action would touch, for `Edit`.
    pub file_path: Option<String>,
    /// Content preview (e.g. a diff or the text to be written).
    pub preview: Option<String>,
    /// Command text, for `Exec`.
    pub command: Option<String>,
}

impl ConfirmDetails {
    /// Build an `Edit`-kind confirmation prompt.
    #[must_use]
    pub fn edit(title: impl Into<String>, file_path: impl Into<String>, preview: impl Into<String>) -> Self {
        Self {
            kind: ConfirmKind::Edit,
            title: title.into(),
            file_path: Some(file_path.into()),
            preview: Some(preview.into()),
            command: None,
        }
    }

    /// Build an `Exec`-kind confirmation prompt.
    #[must_use]
    pub fn exec(title: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            kind: ConfirmKind::Exec,
            title: title.into(),
            file_path: None,
            preview: None,
            command: Some(command.into()),
        }
    }

    /// Build a plain `Info`-kind confirmation prompt.
    #[must_use]
    pub fn info(title: impl Into<String>) -> Self {
        Self {
            kind: ConfirmKind::Info,
            title: title.into(),
            file_path: None,
            preview: None,
            command: None,
        }
    }
}

/// The user's decision in response to a confirmation prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmOutcome {
    /// Run this one call, ask again next time.
    Once,
    /// Run this call and add its allowlist key so future matches skip the
    /// prompt.
    Always,
    /// Do not run the call.
    Cancel,
}

/// What the gate decided for one tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// The call may proceed.
    Execute,
    /// The call must not proceed.
    Cancel {
        /// Why the call was not approved.
        reason: String,
    },
}

impl GateDecision {
    /// Whether this decision permits execution.
    #[must_use]
    pub fn is_execute(&self) -> bool {
        matches!(self, Self::Execute)
    }
}
