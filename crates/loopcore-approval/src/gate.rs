//! The approval gate: decides whether a tool invocation may run.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::allowlist::Allowlist;
use crate::types::{ApprovalMode, ConfirmDetails, ConfirmOutcome, GateDecision, ToolCategory};

/// A UI-provided callback invoked when a tool call needs a human decision.
///
/// Implementations may suspend arbitrarily long while the user thinks;
/// cancellation of the surrounding execution is the caller's responsibility,
/// not this trait's.
#[async_trait]
pub trait ConfirmCallback: Send + Sync {
    /// Ask the user what to do about one tool call.
    async fn confirm(&self, call_id: &str, tool_name: &str, details: &ConfirmDetails) -> ConfirmOutcome;
}

/// Decides whether a tool invocation requires user confirmation and, if so,
/// collects the outcome.
///
/// Holds no per-call state; one gate is shared across every tool call in an
/// execution (or session, if the allowlist is shared that broadly).
pub struct ApprovalGate {
    mode: ApprovalMode,
    allowlist: Arc<Allowlist>,
    callback: Option<Arc<dyn ConfirmCallback>>,
}

impl ApprovalGate {
    /// Build a gate with no confirmation callback registered — every
    /// non-bypassed call will be cancelled for lack of consent.
    #[must_use]
    pub fn new(mode: ApprovalMode, allowlist: Arc<Allowlist>) -> Self {
        Self {
            mode,
            allowlist,
            callback: None,
        }
    }

    /// Build a gate with a confirmation callback already registered.
    #[must_use]
    pub fn with_callback(mode: ApprovalMode, allowlist: Arc<Allowlist>, callback: Arc<dyn ConfirmCallback>) -> Self {
        Self {
            mode,
            allowlist,
            callback: Some(callback),
        }
    }

    /// Current approval mode.
    #[must_use]
    pub fn mode(&self) -> ApprovalMode {
        self.mode
    }

    /// The shared allowlist this gate consults and mutates on `always`.
    #[must_use]
    pub fn allowlist(&self) -> &Arc<Allowlist> {
        &self.allowlist
    }

    /// Decide whether a tool call may proceed.
    ///
    /// `confirm_details` is a thunk rather than an already-computed value so
    /// that tools whose confirmation predicate is expensive (e.g. diffing a
    /// file) only pay that cost when every earlier short-circuit has
    /// already failed to resolve the call.
    pub async fn decide(
        &self,
        call_id: &str,
        tool_name: &str,
        is_read_only: bool,
        category: ToolCategory,
        allowlist_key: &str,
        confirm_details: impl FnOnce() -> Option<ConfirmDetails>,
    ) -> GateDecision {
        if self.mode == ApprovalMode::Yolo {
            debug!(call_id, tool_name, "yolo mode, bypassing approval");
            return GateDecision::Execute;
        }

        if is_read_only {
            debug!(call_id, tool_name, "read-only tool, bypassing approval");
            return GateDecision::Execute;
        }

        if self.mode == ApprovalMode::AutoEdit && category.is_edit_like() {
            debug!(call_id, tool_name, "auto_edit mode, edit-like tool, bypassing approval");
            return GateDecision::Execute;
        }

        if self.allowlist.has(allowlist_key) {
            debug!(call_id, tool_name, allowlist_key, "allowlist hit, bypassing approval");
            return GateDecision::Execute;
        }

        let Some(details) = confirm_details() else {
            debug!(call_id, tool_name, "tool reports no confirmation needed");
            return GateDecision::Execute;
        };

        let Some(callback) = self.callback.as_ref() else {
            warn!(call_id, tool_name, "no confirmation callback registered, cancelling");
            return GateDecision::Cancel {
                reason: "no confirmation callback configured".to_string(),
            };
        };

        match callback.confirm(call_id, tool_name, &details).await {
            ConfirmOutcome::Cancel => {
                info!(call_id, tool_name, "user cancelled tool call");
                GateDecision::Cancel {
                    reason: "user declined the confirmation prompt".to_string(),
                }
            },
            ConfirmOutcome::Always => {
                info!(call_id, tool_name, allowlist_key, "user approved always, adding to allowlist");
                self.allowlist.add(allowlist_key.to_string());
                GateDecision::Execute
            },
            ConfirmOutcome::Once => {
                info!(call_id, tool_name, "user approved once");
                GateDecision::Execute
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysOutcome(ConfirmOutcome);

    #[async_trait]
    impl ConfirmCallback for AlwaysOutcome {
        async fn confirm(&self, _call_id: &str, _tool_name: &str, _details: &ConfirmDetails) -> ConfirmOutcome {
            self.0
        }
    }

    fn no_details() -> Option<ConfirmDetails> {
        Some(ConfirmDetails::info("write to x.txt"))
    }

    #[tokio::test]
    async fn yolo_bypasses_everything() {
        let gate = ApprovalGate::new(ApprovalMode::Yolo, Arc::new(Allowlist::new()));
        let decision = gate
            .decide("call_1", "write_file", false, ToolCategory::Edit, "write_file:x.txt", no_details)
            .await;
        assert_eq!(decision, GateDecision::Execute);
    }

    #[tokio::test]
    async fn read_only_bypasses_everything() {
        let gate = ApprovalGate::new(ApprovalMode::Default, Arc::new(Allowlist::new()));
        let decision = gate
            .decide("call_1", "list_files", true, ToolCategory::Read, "list_files", no_details)
            .await;
        assert_eq!(decision, GateDecision::Execute);
    }

    #[tokio::test]
    async fn auto_edit_bypasses_edit_like_tools_only() {
        let gate = ApprovalGate::new(ApprovalMode::AutoEdit, Arc::new(Allowlist::new()));
        let decision = gate
            .decide("call_1", "write_file", false, ToolCategory::Edit, "write_file:x.txt", no_details)
            .await;
        assert_eq!(decision, GateDecision::Execute);

        let decision = gate
            .decide("call_2", "bash", false, ToolCategory::Exec, "bash:rm -rf /", no_details)
            .await;
        assert_eq!(
            decision,
            GateDecision::Cancel {
                reason: "no confirmation callback configured".to_string()
            }
        );
    }

    #[tokio::test]
    async fn allowlist_hit_bypasses_confirmation() {
        let allowlist = Arc::new(Allowlist::new());
        allowlist.add("write_file:x.txt");
        let gate = ApprovalGate::new(ApprovalMode::Default, allowlist);
        let decision = gate
            .decide("call_1", "write_file", false, ToolCategory::Edit, "write_file:x.txt", no_details)
            .await;
        assert_eq!(decision, GateDecision::Execute);
    }

    #[tokio::test]
    async fn no_confirm_details_means_execute() {
        let gate = ApprovalGate::new(ApprovalMode::Default, Arc::new(Allowlist::new()));
        let decision = gate
            .decide("call_1", "write_file", false, ToolCategory::Edit, "write_file:x.txt", || None)
            .await;
        assert_eq!(decision, GateDecision::Execute);
    }

    #[tokio::test]
    async fn missing_callback_cancels() {
        let gate = ApprovalGate::new(ApprovalMode::Default, Arc::new(Allowlist::new()));
        let decision = gate
            .decide("call_1", "write_file", false, ToolCategory::Edit, "write_file:x.txt", no_details)
            .await;
        assert!(matches!(decision, GateDecision::Cancel { .. }));
    }

    #[tokio::test]
    async fn callback_once_executes_without_allowlisting() {
        let allowlist = Arc::new(Allowlist::new());
        let gate = ApprovalGate::with_callback(
            ApprovalMode::Default,
            Arc::clone(&allowlist),
            Arc::new(AlwaysOutcome(ConfirmOutcome::Once)),
        );
        let decision = gate
            .decide("call_1", "write_file", false, ToolCategory::Edit, "write_file:x.txt", no_details)
            .await;
        assert_eq!(decision, GateDecision::Execute);
        assert!(allowlist.is_empty());
    }

    #[tokio::test]
    async fn callback_always_executes_and_allowlists() {
        let allowlist = Arc::new(Allowlist::new());
        let gate = ApprovalGate::with_callback(
            ApprovalMode::Default,
            Arc::clone(&allowlist),
            Arc::new(AlwaysOutcome(ConfirmOutcome::Always)),
        );
        let decision = gate
            .decide("call_1", "write_file", false, ToolCategory::Edit, "write_file:x.txt", no_details)
            .await;
        assert_eq!(decision, GateDecision::Execute);
        assert!(allowlist.has("write_file:x.txt"));
    }

    #[tokio::test]
    async fn callback_cancel_cancels() {
        let gate = ApprovalGate::with_callback(
            ApprovalMode::Default,
            Arc::new(Allowlist::new()),
            Arc::new(AlwaysOutcome(ConfirmOutcome::Cancel)),
        );
        let decision = gate
            .decide("call_1", "write_file", false, ToolCategory::Edit, "write_file:x.txt", no_details)
            .await;
        assert!(matches!(decision, GateDecision::Cancel { .. }));
    }
}
