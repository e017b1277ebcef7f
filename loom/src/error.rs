//! Error taxonomy for the Loom runtime.
//!
//! `LoomError` is the outward-facing error type returned by every public
//! core operation (rate limiter, provider, prompt registry, agent registry,
//! agent turn loop, communication fabric, stores). Leaf modules define their
//! own small `thiserror` enums and `#[from]`-convert into the matching
//! `LoomError` variant so callers only ever match on one taxonomy.

use thiserror::Error;

/// Error kinds surfaced by the runtime. Kept flat (no nested payload types
/// beyond a message) so transports can forward `stop_reason` + `error`
/// verbatim.
#[derive(Debug, Error)]
pub enum LoomError {
    #[error("config invalid: {0}")]
    ConfigInvalid(String),

    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("provider rate limited: {0}")]
    ProviderRateLimited(String),

    #[error("provider returned a bad response: {0}")]
    ProviderBadResponse(String),

    #[error("unknown tool: {name}")]
    ToolUnknown { name: String },

    #[error("invalid parameters for tool {tool}: {reason}")]
    ToolSchemaInvalid { tool: String, reason: String },

    #[error("tool call denied: {tool}")]
    ToolDenied { tool: String },

    #[error("tool {tool} failed: {reason} (error_id={error_id})")]
    ToolFailed {
        tool: String,
        reason: String,
        error_id: String,
    },

    #[error("permission request timed out")]
    PermissionTimeout,

    #[error("context cancelled")]
    ContextCancelled,

    #[error("memory limit reached")]
    MemoryLimitReached,

    #[error("turn limit reached")]
    TurnLimitReached,

    #[error("prompt not found: {key}")]
    PromptNotFound { key: String },

    #[error("variant not found: {key}/{variant}")]
    VariantNotFound { key: String, variant: String },

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl LoomError {
    /// Maps this error to the `stop_reason` string a transport should
    /// forward to clients alongside the human-readable message.
    pub fn stop_reason(&self) -> &'static str {
        match self {
            LoomError::ProviderUnavailable(_) | LoomError::ProviderRateLimited(_) => "error",
            LoomError::ProviderBadResponse(_) => "error",
            LoomError::ContextCancelled => "cancelled",
            LoomError::TurnLimitReached => "turn_limit",
            LoomError::MemoryLimitReached => "memory_limit",
            _ => "error",
        }
    }

    /// Whether this error kind is fatal to the current turn loop (vs.
    /// recoverable by surfacing a tool-result message).
    pub fn is_fatal_to_turn(&self) -> bool {
        !matches!(
            self,
            LoomError::ToolUnknown { .. }
                | LoomError::ToolSchemaInvalid { .. }
                | LoomError::ToolDenied { .. }
                | LoomError::ToolFailed { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, LoomError>;
