//! # Loom
//!
//! A multi-agent autonomous LLM runtime: a population of declaratively
//! configured agents, each a turn-based conversational executor that
//! interleaves calls to a remote LLM provider with invocation of typed
//! tools, until the model reports a stop condition or a per-agent budget is
//! exhausted. This crate is the core runtime; `serve` exposes it over
//! gRPC/HTTP and `cli` wires a thin outer entry point around `serve`.
//!
//! ## Components
//!
//! - [`rate_limiter`] — per-provider-brand request/token admission control.
//! - [`llm`] — the [`llm::LlmProvider`] trait and its eight brand adapters,
//!   unified by the [`llm::Provider`] sum type for dynamic dispatch.
//! - [`prompt_registry`] — key→content prompt library with A/B variants,
//!   injection-safe interpolation, a TTL cache, and file-watch hot reload.
//! - [`tools`] — the [`tools::Tool`] trait, the builtin and MCP-discovered
//!   tool index, and embedding-free substring search.
//! - [`memory`] — per-session L1/L2 message history with atomic-group
//!   compression and sqlite checkpointing.
//! - [`agent`] — the turn loop ([`agent::Agent`]) and the hot-reloading
//!   [`agent::AgentRegistry`] that supplies it from `agents/*.yaml`.
//! - [`comm`] — the inter-agent communication fabric: broadcast bus,
//!   durable point-to-point queue, and namespaced shared memory.
//! - [`store`] — content-addressed artifacts, the append-only error log,
//!   and the per-agent workspace scratch directory.
//! - [`user_message`] — durable, paginated per-thread message history,
//!   distinct from a session's in-memory L1/L2 log.
//! - [`message`] — the provider-agnostic [`message::Message`] type that
//!   flows between all of the above.
//! - [`error`] — the crate-wide [`error::LoomError`] taxonomy.

pub mod agent;
pub mod comm;
pub mod error;
pub mod llm;
pub mod memory;
pub mod message;
pub mod prompt_registry;
pub mod rate_limiter;
pub mod store;
pub mod tools;
pub mod user_message;

pub use agent::{
    Agent, AgentConfig, AgentDeps, AgentId, AgentLimits, AgentRegistry, AgentRegistryEntry,
    AgentRegistryError, AllowAll, FinalMessage, PatternClassifier, PermissionChecker,
    PermissionDecision, PermissionRequest, Progress, ProgressCallback, ReloadCallback,
    RegistryEvent,
};
pub use comm::{
    BackpressurePolicy, BusMessage, CommError, CommFabric, MessageBus, MessageQueue,
    PolicyManager, QueuedMessage, ReferenceHandle, ReferencePolicy, ReferenceStore,
    SharedMemoryStore,
};
pub use error::{LoomError, Result};
pub use llm::{
    AnthropicProvider, AzureOpenAiProvider, BedrockProvider, GeminiProvider, HuggingFaceProvider,
    LlmProvider, LlmResponse, MistralProvider, MockProvider, NoopSigner, OllamaProvider,
    OpenAiProvider, Provider, StopReason, ToolDefinition, Usage,
};
pub use memory::{CompressionProfile, ContextLimits, Memory, MemoryError};
pub use message::{ContentBlock, ImageSource, Message, Role, ToolCall};
pub use prompt_registry::{PromptRegistry, PromptRegistryError};
pub use rate_limiter::{limiter_for_brand, RateLimiter, RateLimiterConfig, RateLimiterError};
pub use store::{ArtifactStore, ErrorRecord, ErrorStore, Store, StoreError, WorkspaceStore};
pub use tools::builtin::{GetErrorDetailsTool, GetRecentMessagesTool};
pub use tools::{Tool, ToolCallContext, ToolError, ToolRegistry, ToolSpec};
pub use user_message::{
    NoOpUserMessageStore, SqliteUserMessageStore, UserMessageStore, UserMessageStoreError,
};

/// Re-exported so `cli` and `serve` can construct and hold a cancellation
/// context for [`Agent::run_stream`] without taking their own `tokio-util`
/// dependency.
pub use tokio_util::sync::CancellationToken;

/// When running `cargo test -p loom`, initializes tracing from `RUST_LOG` so that
/// unit tests in `src/**` can print logs with `--nocapture`.
#[cfg(test)]
mod test_logging {
    use ctor::ctor;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::Layer;

    #[ctor]
    fn init() {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .with_filter(filter),
            )
            .try_init();
    }
}
