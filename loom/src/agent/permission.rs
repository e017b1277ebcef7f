//! Per-tool-call permission checking.

use async_trait::async_trait;
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PermissionDecision {
    Allow,
    Deny,
    Prompt,
}

#[async_trait]
pub trait PermissionChecker: Send + Sync {
    async fn check(&self, tool_name: &str, input: &Value) -> PermissionDecision;
}

/// Allows every call; the default when an agent has no `PermissionChecker`
/// configured.
pub struct AllowAll;

#[async_trait]
impl PermissionChecker for AllowAll {
    async fn check(&self, _tool_name: &str, _input: &Value) -> PermissionDecision {
        PermissionDecision::Allow
    }
}

/// Delivered through the progress callback when a tool call needs external
/// approval; the turn loop suspends on `respond` until a decision arrives or
/// `channel_send_timeout` elapses.
pub struct PermissionRequest {
    pub tool_name: String,
    pub input: Value,
    pub respond: tokio::sync::oneshot::Sender<bool>,
}

impl std::fmt::Debug for PermissionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionRequest")
            .field("tool_name", &self.tool_name)
            .field("input", &self.input)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allow_all_always_allows() {
        let checker = AllowAll;
        assert_eq!(
            checker.check("bash", &serde_json::json!({})).await,
            PermissionDecision::Allow
        );
    }
}
