//! Agent turn loop.
//!
//! A single turn-based loop replaces a graph-compiled ReAct/GoT/ToT/DUP
//! pattern runner: assemble messages, call the provider, dispatch any
//! requested tools, repeat. A think → act → observe runner stepping one
//! action at a time is the structural ancestor, generalized here into a
//! loop that runs until `end_turn`, `max_tokens`, or a budget is exhausted.

mod config;
mod permission;
mod registry;
mod schema;

pub use config::{
    AgentConfig, BehaviorConfig, CompressionProfileConfig, LlmConfig, McpToolsConfig,
    MemoryCompressionConfig, MemoryConfig, PatternsConfig, ToolsConfig,
};
pub use permission::{AllowAll, PermissionChecker, PermissionDecision, PermissionRequest};
pub use registry::{AgentRegistry, AgentRegistryEntry, AgentRegistryError, ReloadCallback, RegistryEvent};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{info_span, warn, Instrument};

use crate::error::LoomError;
use crate::llm::{LlmProvider, LlmResponse, StopReason, ToolDefinition, TokenCallback};
use crate::memory::{CheckpointStore, CompressionProfile, ContextLimits, Memory};
use crate::message::{Message, ToolCall};
use crate::prompt_registry::PromptRegistry;
use crate::store::{ArtifactStore, ErrorStore};
use crate::tools::{ToolCallContext, ToolRegistry};

const DEFAULT_MAX_CONTEXT_TOKENS: usize = 180_000;
const DEFAULT_RESERVED_OUTPUT_TOKENS: usize = 4_096;
const DEFAULT_PERMISSION_TIMEOUT: Duration = Duration::from_secs(30);
/// Tool results larger than this go through the artifact store; the
/// tool-result message carries only the returned id.
const ARTIFACT_THRESHOLD_BYTES: usize = 8 * 1024;

const TURN_BUDGET_EXHAUSTED: &str = "Turn budget exhausted";
const TOOL_BUDGET_EXHAUSTED: &str = "Tool execution budget exhausted";

/// Opaque stable agent identity, immutable for the life
/// of the process even if the backing YAML is edited.
pub type AgentId = String;

/// Runtime limits carried on `Config`.
#[derive(Clone, Debug)]
pub struct AgentLimits {
    pub max_turns: u32,
    pub max_tool_executions: u32,
    pub max_context_tokens: usize,
    pub reserved_output_tokens: usize,
    pub permission_timeout: Duration,
}

impl Default for AgentLimits {
    fn default() -> Self {
        Self {
            max_turns: 25,
            max_tool_executions: 50,
            max_context_tokens: DEFAULT_MAX_CONTEXT_TOKENS,
            reserved_output_tokens: DEFAULT_RESERVED_OUTPUT_TOKENS,
            permission_timeout: DEFAULT_PERMISSION_TIMEOUT,
        }
    }
}

/// Classifies advisory pattern hints without ever changing tool selection
///. Off by default; attached only when `PatternsConfig.enabled`.
pub trait PatternClassifier: Send + Sync {
    fn classify(&self, assistant_text: &str, tool_calls: &[ToolCall]) -> Vec<String>;
}

/// The terminal result of one `Agent::run`/`Agent::run_stream` call.
#[derive(Clone, Debug)]
pub struct FinalMessage {
    pub content: String,
    pub stop_reason: &'static str,
    pub error: Option<String>,
    pub truncated: bool,
}

/// Progress delivered to a `run_stream` caller: one streamed token, or a
/// tool-invocation boundary.
#[derive(Debug)]
pub enum Progress {
    Token(String),
    ToolStart { id: String, name: String },
    ToolEnd { id: String, name: String, ok: bool },
    /// A `prompt`-mode permission decision is needed; the caller must send
    /// on `respond` (or let it drop, which the dispatcher treats as deny)
    /// within the agent's configured permission timeout.
    PermissionRequested(PermissionRequest),
}

pub type ProgressCallback = Arc<dyn Fn(Progress) + Send + Sync>;

/// Everything an `Agent` needs that isn't captured by its YAML config:
/// concrete provider, shared tool registry, shared prompt registry, the
/// error store it records failures to, and the two optional extension
/// points (`PermissionChecker`, `PatternClassifier`).
pub struct AgentDeps {
    pub provider: Arc<dyn LlmProvider>,
    pub tools: Arc<ToolRegistry>,
    pub prompts: Arc<PromptRegistry>,
    pub errors: ErrorStore,
    pub permission: Option<Arc<dyn PermissionChecker>>,
    pub pattern_classifier: Option<Arc<dyn PatternClassifier>>,
    /// Where per-session checkpoints live, if the agent should persist
    /// memory across restarts.
    pub checkpoint_db_path: Option<std::path::PathBuf>,
    /// Backing for large tool-result promotion; `None` means
    /// results are always inlined regardless of size.
    pub artifacts: Option<ArtifactStore>,
}

/// One configured, live executor.
///
/// Owns one `Memory` per session it has seen; sessions are created lazily on
/// first `run`/`run_stream` and persisted through an optional checkpoint
/// store.
pub struct Agent {
    id: AgentId,
    name: String,
    description: String,
    system_prompt_key: String,
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    permission: Option<Arc<dyn PermissionChecker>>,
    limits: AgentLimits,
    allowed_tools: Vec<String>,
    disabled_tools: Vec<String>,
    yolo: bool,
    patterns_enabled: bool,
    pattern_classifier: Option<Arc<dyn PatternClassifier>>,
    prompts: Arc<PromptRegistry>,
    errors: ErrorStore,
    compression_profile: Option<CompressionProfile>,
    checkpoint_db_path: Option<std::path::PathBuf>,
    artifacts: Option<ArtifactStore>,
    sessions: DashMap<String, Arc<Memory>>,
}

impl Agent {
    pub fn from_config(id: AgentId, config: AgentConfig, deps: AgentDeps) -> Self {
        let limits = AgentLimits {
            max_turns: config.behavior.max_turns.max(1),
            max_tool_executions: config.behavior.max_tool_executions,
            max_context_tokens: config
                .llm
                .as_ref()
                .and_then(|l| l.max_context_tokens)
                .unwrap_or(DEFAULT_MAX_CONTEXT_TOKENS),
            reserved_output_tokens: config
                .llm
                .as_ref()
                .and_then(|l| l.reserved_output_tokens)
                .unwrap_or(DEFAULT_RESERVED_OUTPUT_TOKENS),
            permission_timeout: DEFAULT_PERMISSION_TIMEOUT,
        };
        let compression_profile = config
            .memory
            .memory_compression
            .as_ref()
            .map(|m| CompressionProfile {
                max_l1_messages: m.profile.max_l1_messages,
                warning_threshold_percent: m.profile.warning_threshold_percent,
            });
        let patterns_enabled = config.behavior.patterns.as_ref().map(|p| p.enabled).unwrap_or(false);

        Self {
            id,
            name: config.name,
            description: config.description,
            system_prompt_key: config.system_prompt,
            provider: deps.provider,
            tools: deps.tools,
            permission: deps.permission,
            limits,
            allowed_tools: config.behavior.allowed_tools,
            disabled_tools: config.behavior.disabled_tools,
            yolo: config.behavior.yolo,
            patterns_enabled,
            pattern_classifier: deps.pattern_classifier,
            prompts: deps.prompts,
            errors: deps.errors,
            compression_profile,
            checkpoint_db_path: deps.checkpoint_db_path,
            artifacts: deps.artifacts,
            sessions: DashMap::new(),
        }
    }

    pub fn id(&self) -> &AgentId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the L1 message history for `session_id` (
    /// `GetSession(session_id)`), restoring it from the checkpoint store
    /// first if this process hasn't touched the session yet.
    pub async fn get_session_messages(&self, session_id: &str) -> Result<Vec<Message>, LoomError> {
        let memory = self.session_memory(session_id).await?;
        Ok(memory.messages())
    }

    /// `Run(ctx, session_id, user_input) → FinalMessage`. Not cancellable;
    /// callers that need to abort a turn mid-flight should call
    /// `run_stream` directly with their own [`CancellationToken`].
    pub async fn run(&self, session_id: &str, user_input: &str) -> FinalMessage {
        self.run_stream(session_id, user_input, None, CancellationToken::new()).await
    }

    /// `RunStream(ctx, session_id, user_input, progress_cb, cancel) → FinalMessage`
    ///. `progress` is invoked for each streamed token and for
    /// each tool invocation boundary; `None` behaves exactly like `run`.
    /// Cancelling `cancel` aborts the in-flight provider call at its next
    /// streamed event and the loop returns a `FinalMessage` with
    /// `stop_reason: "cancelled"` instead of completing the turn.
    pub async fn run_stream(
        &self,
        session_id: &str,
        user_input: &str,
        progress: Option<ProgressCallback>,
        cancel: CancellationToken,
    ) -> FinalMessage {
        let span = info_span!("agent.turn", agent_id = %self.id, session_id = %session_id);
        async move {
            let memory = match self.session_memory(session_id).await {
                Ok(m) => m,
                Err(e) => return self.fatal(session_id, 0, e).await,
            };
            memory.append(Message::user(user_input));

            let mut turns_so_far: u32 = 0;
            let tool_exec_counter = AtomicU32::new(0);

            loop {
                turns_so_far += 1;
                if turns_so_far > self.limits.max_turns {
                    memory.append(Message::assistant(TURN_BUDGET_EXHAUSTED));
                    return FinalMessage {
                        content: TURN_BUDGET_EXHAUSTED.to_string(),
                        stop_reason: "turn_limit",
                        error: None,
                        truncated: false,
                    };
                }

                let system_prompt = match self.resolve_system_prompt(session_id).await {
                    Ok(p) => p,
                    Err(e) => return self.fatal(session_id, turns_so_far as u64 as u32, e).await,
                };

                let mut messages = Vec::with_capacity(memory.messages().len() + 1);
                messages.push(Message::system(system_prompt));
                messages.extend(memory.messages());

                let tool_defs = self.tool_definitions();
                let token_cb = self.token_callback(progress.clone());

                let response = match self.provider.chat_stream(&messages, &tool_defs, token_cb, &cancel).await {
                    Ok(r) => r,
                    Err(e) => return self.fatal(session_id, turns_so_far, e).await,
                };

                match response.stop_reason {
                    StopReason::EndTurn | StopReason::StopSequence => {
                        memory.append(Message::assistant(response.content.clone()));
                        let _ = memory.checkpoint().await;
                        return FinalMessage {
                            content: response.content,
                            stop_reason: stop_reason_label(response.stop_reason),
                            error: None,
                            truncated: false,
                        };
                    }
                    StopReason::MaxTokens => {
                        memory.append(Message::assistant(response.content.clone()));
                        let _ = memory.checkpoint().await;
                        return FinalMessage {
                            content: response.content,
                            stop_reason: "max_tokens",
                            error: None,
                            truncated: true,
                        };
                    }
                    StopReason::Error => {
                        return self
                            .fatal(
                                session_id,
                                turns_so_far,
                                LoomError::ProviderBadResponse(
                                    "provider reported stop_reason=error".to_string(),
                                ),
                            )
                            .await;
                    }
                    StopReason::ToolUse => {
                        let assistant_msg = self.annotate_patterns(
                            Message::assistant_with_tool_calls(
                                (!response.content.is_empty()).then(|| response.content.clone()),
                                response.tool_calls.clone(),
                            ),
                            &response,
                        );

                        let ctx = ToolCallContext {
                            agent_id: self.id.clone(),
                            session_id: session_id.to_string(),
                            recent_messages: memory.messages(),
                        };

                        let results = self
                            .dispatch_tool_calls(
                                &ctx,
                                &response.tool_calls,
                                &tool_exec_counter,
                                session_id,
                                turns_so_far,
                                &progress,
                            )
                            .await;

                        let mut batch = Vec::with_capacity(results.len() + 1);
                        batch.push(assistant_msg);
                        batch.extend(results);
                        memory.append_many(batch);
                        let _ = memory.checkpoint().await;

                        if tool_exec_counter.load(Ordering::SeqCst) >= self.limits.max_tool_executions {
                            memory.append(Message::assistant(TOOL_BUDGET_EXHAUSTED));
                            return FinalMessage {
                                content: TOOL_BUDGET_EXHAUSTED.to_string(),
                                stop_reason: "tool_limit",
                                error: None,
                                truncated: false,
                            };
                        }
                        // Loop to step 3.
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn session_memory(&self, session_id: &str) -> Result<Arc<Memory>, LoomError> {
        if let Some(existing) = self.sessions.get(session_id) {
            return Ok(Arc::clone(existing.value()));
        }
        let mut memory = Memory::new(session_id.to_string());
        if let Some(path) = &self.checkpoint_db_path {
            let store = CheckpointStore::new(path).map_err(|e| LoomError::Internal(e.to_string()))?;
            memory = memory.with_checkpoint_store(store);
        }
        if let Some(profile) = self.compression_profile {
            memory.set_compression_profile(profile);
        }
        memory.set_context_limits(ContextLimits {
            max_context_tokens: self.limits.max_context_tokens,
            reserved_output_tokens: self.limits.reserved_output_tokens,
        });
        memory.restore().await.map_err(|e| LoomError::Internal(e.to_string()))?;
        let memory = Arc::new(memory);
        self.sessions.insert(session_id.to_string(), Arc::clone(&memory));
        Ok(memory)
    }

    /// Resolves the system prompt from the prompt registry, interpolated
    /// with agent-specific variables. `PromptNotFound`/
    /// `VariantNotFound` fall back to treating the configured value as a
    /// literal prompt.
    async fn resolve_system_prompt(&self, session_id: &str) -> Result<String, LoomError> {
        let mut vars = HashMap::new();
        vars.insert("agent_name".to_string(), self.name.clone());
        vars.insert("agent_description".to_string(), self.description.clone());
        vars.insert("session_id".to_string(), session_id.to_string());

        match self.prompts.get(&self.system_prompt_key, Some(&vars)).await {
            Ok(text) => Ok(text),
            Err(LoomError::PromptNotFound { .. }) | Err(LoomError::VariantNotFound { .. }) => {
                warn!(
                    agent = %self.name,
                    key = %self.system_prompt_key,
                    "system prompt not found in registry, using configured value as literal text"
                );
                Ok(self.system_prompt_key.clone())
            }
            Err(e) => Err(e),
        }
    }

    fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .list()
            .into_iter()
            .filter(|s| !self.disabled_tools.iter().any(|n| n == &s.name))
            .filter(|s| self.allowed_tools.is_empty() || self.allowed_tools.iter().any(|n| n == &s.name))
            .map(|s| ToolDefinition {
                name: s.name,
                description: Some(s.description),
                input_schema: s.input_schema,
            })
            .collect()
    }

    fn token_callback(&self, progress: Option<ProgressCallback>) -> TokenCallback {
        Arc::new(move |text: &str| {
            if let Some(cb) = &progress {
                cb(Progress::Token(text.to_string()));
            }
        })
    }

    fn annotate_patterns(&self, mut msg: Message, response: &LlmResponse) -> Message {
        if self.patterns_enabled {
            if let Some(classifier) = &self.pattern_classifier {
                let ids = classifier.classify(&response.content, &response.tool_calls);
                if !ids.is_empty() {
                    msg.metadata.insert("patterns".to_string(), serde_json::json!(ids));
                }
            }
        }
        msg
    }

    /// Runs every requested tool call concurrently; results
    /// come back in the *original call order* because `join_all` preserves
    /// input order regardless of completion order.
    async fn dispatch_tool_calls(
        &self,
        ctx: &ToolCallContext,
        calls: &[ToolCall],
        counter: &AtomicU32,
        session_id: &str,
        turn: u32,
        progress: &Option<ProgressCallback>,
    ) -> Vec<Message> {
        let futures = calls
            .iter()
            .map(|call| self.dispatch_one(ctx, call, counter, session_id, turn, progress));
        futures::future::join_all(futures).await
    }

    async fn dispatch_one(
        &self,
        ctx: &ToolCallContext,
        call: &ToolCall,
        counter: &AtomicU32,
        session_id: &str,
        turn: u32,
        progress: &Option<ProgressCallback>,
    ) -> Message {
        if let Some(cb) = progress {
            cb(Progress::ToolStart {
                id: call.id.clone(),
                name: call.name.clone(),
            });
        }

        let (msg, ok) = self.dispatch_one_inner(ctx, call, counter, session_id, turn, progress).await;

        if let Some(cb) = progress {
            cb(Progress::ToolEnd {
                id: call.id.clone(),
                name: call.name.clone(),
                ok,
            });
        }
        msg
    }

    async fn dispatch_one_inner(
        &self,
        ctx: &ToolCallContext,
        call: &ToolCall,
        counter: &AtomicU32,
        session_id: &str,
        turn: u32,
        progress: &Option<ProgressCallback>,
    ) -> (Message, bool) {
        if self.disabled_tools.iter().any(|n| n == &call.name) {
            return (deny_result(call, "tool is disabled for this agent"), false);
        }
        if !self.allowed_tools.is_empty() && !self.allowed_tools.iter().any(|n| n == &call.name) {
            return (deny_result(call, "tool is not in the agent's allowed list"), false);
        }

        let Some(tool) = self.tools.get(&call.name) else {
            return (unknown_tool_result(call), false);
        };

        if let Some(checker) = &self.permission {
            match checker.check(&call.name, &call.input).await {
                PermissionDecision::Allow => {}
                PermissionDecision::Deny => {
                    return (deny_result(call, "denied by permission checker"), false);
                }
                PermissionDecision::Prompt => {
                    if !self.yolo {
                        match self.await_permission(call, progress).await {
                            Ok(true) => {}
                            Ok(false) => return (deny_result(call, "denied by permission prompt"), false),
                            Err(reason) => return (deny_result(call, reason), false),
                        }
                    }
                }
            }
        }

        let reserved = counter.fetch_add(1, Ordering::SeqCst);
        if reserved >= self.limits.max_tool_executions {
            return (deny_result(call, "tool execution budget exhausted"), false);
        }

        if let Err(reason) = schema::validate(&tool.spec().input_schema, &call.input) {
            let error_id = self
                .errors
                .record(&self.name, session_id, turn as u64, Some(&call.name), "tool_schema_invalid", &reason, None)
                .await
                .ok();
            return (
                Message::tool_result(
                    call.id.clone(),
                    serde_json::json!({
                        "kind": "tool_schema_invalid",
                        "tool": call.name,
                        "reason": reason,
                        "error_id": error_id,
                    })
                    .to_string(),
                ),
                false,
            );
        }

        match tool.execute(ctx, call.input.clone()).await {
            Ok(value) => (self.tool_success_result(call, value).await, true),
            Err(e) => {
                let error_id = self
                    .errors
                    .record(&self.name, session_id, turn as u64, Some(&call.name), "tool_failed", &e.to_string(), None)
                    .await
                    .ok()
                    .unwrap_or_default();
                (
                    Message::tool_result(
                        call.id.clone(),
                        serde_json::json!({
                            "kind": "tool_failed",
                            "tool": call.name,
                            "reason": e.to_string(),
                            "error_id": error_id,
                        })
                        .to_string(),
                    ),
                    false,
                )
            }
        }
    }

    async fn tool_success_result(&self, call: &ToolCall, value: serde_json::Value) -> Message {
        let serialized = value.to_string();
        if serialized.len() <= ARTIFACT_THRESHOLD_BYTES {
            return Message::tool_result(call.id.clone(), serialized);
        }
        // Large results go through the artifact store; the message carries
        // only the returned reference.
        match self.artifact_ref(serialized.into_bytes()).await {
            Some(id) => Message::tool_result(
                call.id.clone(),
                serde_json::json!({"artifact_id": id}).to_string(),
            ),
            None => Message::tool_result(call.id.clone(), value.to_string()),
        }
    }

    async fn artifact_ref(&self, bytes: Vec<u8>) -> Option<String> {
        let artifacts = self.artifacts.as_ref()?;
        artifacts.put(bytes, Some("application/json".to_string())).await.ok()
    }

    async fn await_permission(&self, call: &ToolCall, progress: &Option<ProgressCallback>) -> Result<bool, &'static str> {
        let Some(cb) = progress else {
            return Err("permission required but no progress channel is attached");
        };
        let (tx, rx) = tokio::sync::oneshot::channel();
        cb(Progress::PermissionRequested(PermissionRequest {
            tool_name: call.name.clone(),
            input: call.input.clone(),
            respond: tx,
        }));
        match tokio::time::timeout(self.limits.permission_timeout, rx).await {
            Ok(Ok(decision)) => Ok(decision),
            Ok(Err(_)) => Err("permission responder dropped without a decision"),
            Err(_) => Err("permission prompt timed out"),
        }
    }

    async fn fatal(&self, session_id: &str, turn: u32, err: LoomError) -> FinalMessage {
        let kind = match &err {
            LoomError::ProviderUnavailable(_) => "provider_unavailable",
            LoomError::ProviderRateLimited(_) => "provider_rate_limited",
            LoomError::ProviderBadResponse(_) => "provider_bad_response",
            LoomError::ContextCancelled => "cancelled",
            _ => "internal",
        };
        let _ = self
            .errors
            .record(&self.name, session_id, turn as u64, None, kind, &err.to_string(), None)
            .await;
        warn!(agent = %self.name, session_id = %session_id, error = %err, "agent turn ended fatally");
        FinalMessage {
            content: String::new(),
            stop_reason: err.stop_reason(),
            error: Some(err.to_string()),
            truncated: false,
        }
    }
}

fn stop_reason_label(reason: StopReason) -> &'static str {
    match reason {
        StopReason::EndTurn => "end_turn",
        StopReason::ToolUse => "tool_use",
        StopReason::MaxTokens => "max_tokens",
        StopReason::StopSequence => "stop_sequence",
        StopReason::Error => "error",
    }
}

fn unknown_tool_result(call: &ToolCall) -> Message {
    Message::tool_result(
        call.id.clone(),
        serde_json::json!({"kind": "unknown_tool", "name": call.name}).to_string(),
    )
}

fn deny_result(call: &ToolCall, reason: &str) -> Message {
    Message::tool_result(
        call.id.clone(),
        serde_json::json!({"kind": "tool_denied", "tool": call.name, "reason": reason}).to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockProvider, Provider, StopReason as MockStopReason, Usage};
    use crate::tools::{Tool, ToolError, ToolSpec};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex as StdMutex;

    fn errors() -> ErrorStore {
        let dir = tempfile::tempdir().unwrap();
        let store = crate::store::Store::open(dir.path()).unwrap();
        std::mem::forget(dir);
        store.errors()
    }

    fn tool_call_response(id: &str, name: &str, input: Value) -> LlmResponse {
        LlmResponse {
            content: String::new(),
            stop_reason: MockStopReason::ToolUse,
            tool_calls: vec![ToolCall {
                id: id.to_string(),
                name: name.to_string(),
                input,
            }],
            usage: Usage::default(),
            metadata: serde_json::Value::Null,
        }
    }

    fn text_response(text: &str) -> LlmResponse {
        LlmResponse {
            content: text.to_string(),
            stop_reason: MockStopReason::EndTurn,
            tool_calls: Vec::new(),
            usage: Usage::default(),
            metadata: serde_json::Value::Null,
        }
    }

    async fn prompt_registry() -> Arc<PromptRegistry> {
        let dir = tempfile::tempdir().unwrap();
        let registry = PromptRegistry::new(dir.path()).await.unwrap();
        std::mem::forget(dir);
        Arc::new(registry)
    }

    fn config(system_prompt: &str) -> AgentConfig {
        AgentConfig {
            name: "tester".to_string(),
            description: "test agent".to_string(),
            system_prompt: system_prompt.to_string(),
            rom: None,
            backend_path: None,
            llm: None,
            behavior: BehaviorConfig::default(),
            memory: MemoryConfig::default(),
            tools: ToolsConfig::default(),
            metadata: HashMap::new(),
        }
    }

    async fn agent(provider: MockProvider, tools: Arc<ToolRegistry>) -> Agent {
        let prompts = prompt_registry().await;
        Agent::from_config(
            "agent-1".to_string(),
            config("You are a helpful test agent."),
            AgentDeps {
                provider: Arc::new(Provider::Mock(provider)),
                tools,
                prompts,
                errors: errors(),
                permission: None,
                pattern_classifier: None,
                checkpoint_db_path: None,
                artifacts: None,
            },
        )
    }

    #[tokio::test]
    async fn scenario_1_plain_end_turn() {
        let provider = MockProvider::with_text_reply("Hello!");
        let agent = agent(provider, Arc::new(ToolRegistry::new())).await;
        let result = agent.run("sess-1", "hi").await;
        assert_eq!(result.content, "Hello!");
        assert_eq!(result.stop_reason, "end_turn");

        let memory = agent.session_memory("sess-1").await.unwrap();
        let msgs = memory.messages();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].content.as_deref(), Some("hi"));
        assert_eq!(msgs[1].content.as_deref(), Some("Hello!"));
    }

    struct WeatherTool;

    #[async_trait]
    impl Tool for WeatherTool {
        fn name(&self) -> &str {
            "get_weather"
        }
        fn spec(&self) -> ToolSpec {
            ToolSpec {
                name: "get_weather".to_string(),
                description: "Gets the weather".to_string(),
                input_schema: json!({"type": "object", "properties": {"city": {"type": "string"}}, "required": ["city"]}),
                backend_tag: None,
            }
        }
        async fn execute(&self, _ctx: &ToolCallContext, _input: Value) -> Result<Value, ToolError> {
            Ok(json!({"temp": 72}))
        }
    }

    #[tokio::test]
    async fn scenario_2_one_tool_round_trip_then_end_turn() {
        let provider = MockProvider::new(vec![
            tool_call_response("call_1", "get_weather", json!({"city": "SF"})),
            text_response("72°F"),
        ]);
        let registry = Arc::new(ToolRegistry::new());
        registry.register(Arc::new(WeatherTool));
        let agent = agent(provider, registry).await;

        let result = agent.run("sess-2", "weather?").await;
        assert_eq!(result.content, "72°F");
        assert_eq!(result.stop_reason, "end_turn");

        let memory = agent.session_memory("sess-2").await.unwrap();
        let msgs = memory.messages();
        assert!(msgs.iter().any(|m| m.is_tool_use()));
        let tool_result = msgs.iter().find(|m| m.is_tool_result()).unwrap();
        assert!(tool_result.content.as_ref().unwrap().contains("72"));
    }

    #[tokio::test]
    async fn scenario_3_streamed_tokens_equal_final_content() {
        let provider = MockProvider::with_text_reply("Hi there");
        let agent = agent(provider, Arc::new(ToolRegistry::new())).await;

        let collected: Arc<StdMutex<Vec<String>>> = Arc::new(StdMutex::new(Vec::new()));
        let collected_cb = Arc::clone(&collected);
        let progress: ProgressCallback = Arc::new(move |p: Progress| {
            if let Progress::Token(t) = p {
                collected_cb.lock().unwrap().push(t);
            }
        });

        let result = agent.run_stream("sess-3", "x", Some(progress), CancellationToken::new()).await;
        assert_eq!(result.content, "Hi there");
        let received: String = collected.lock().unwrap().concat();
        assert_eq!(received, result.content);
    }

    /// Sleeps `delay_ms` then returns `{id}`; used to prove tool calls in one
    /// assistant turn run concurrently rather than one after another.
    struct SleepTool {
        id: &'static str,
        delay_ms: u64,
    }

    #[async_trait]
    impl Tool for SleepTool {
        fn name(&self) -> &str {
            self.id
        }
        fn spec(&self) -> ToolSpec {
            ToolSpec {
                name: self.id.to_string(),
                description: "Sleeps then returns its id".to_string(),
                input_schema: json!({"type": "object", "properties": {}}),
                backend_tag: None,
            }
        }
        async fn execute(&self, _ctx: &ToolCallContext, _input: Value) -> Result<Value, ToolError> {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            Ok(json!({"id": self.id}))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn scenario_5_parallel_tool_calls_run_concurrently_in_call_order() {
        let provider = MockProvider::new(vec![
            LlmResponse {
                content: String::new(),
                stop_reason: MockStopReason::ToolUse,
                tool_calls: vec![
                    ToolCall {
                        id: "call_a".to_string(),
                        name: "sleep_a".to_string(),
                        input: json!({}),
                    },
                    ToolCall {
                        id: "call_b".to_string(),
                        name: "sleep_b".to_string(),
                        input: json!({}),
                    },
                ],
                usage: Usage::default(),
                metadata: serde_json::Value::Null,
            },
            text_response("done"),
        ]);
        let registry = Arc::new(ToolRegistry::new());
        registry.register(Arc::new(SleepTool { id: "sleep_a", delay_ms: 500 }));
        registry.register(Arc::new(SleepTool { id: "sleep_b", delay_ms: 500 }));
        let agent = agent(provider, registry).await;

        let start = std::time::Instant::now();
        let result = agent.run("sess-5", "go").await;
        let elapsed = start.elapsed();

        assert_eq!(result.content, "done");
        // Sequential execution would take ~1s; concurrent ~500ms. Generous
        // upper bound keeps this robust under CI scheduling jitter.
        assert!(elapsed < Duration::from_millis(900), "elapsed = {elapsed:?}");

        let memory = agent.session_memory("sess-5").await.unwrap();
        let tool_results: Vec<_> = memory
            .messages()
            .into_iter()
            .filter(|m| m.is_tool_result())
            .collect();
        assert_eq!(tool_results.len(), 2);
        assert!(tool_results[0].content.as_ref().unwrap().contains("sleep_a"));
        assert!(tool_results[1].content.as_ref().unwrap().contains("sleep_b"));
    }

    #[tokio::test]
    async fn tool_executions_budget_of_zero_denies_immediately() {
        let provider = MockProvider::new(vec![tool_call_response(
            "call_1",
            "get_weather",
            json!({"city": "SF"}),
        )]);
        let registry = Arc::new(ToolRegistry::new());
        registry.register(Arc::new(WeatherTool));
        let prompts = prompt_registry().await;
        let mut cfg = config("hi");
        cfg.behavior.max_tool_executions = 0;
        let agent = Agent::from_config(
            "agent-2".to_string(),
            cfg,
            AgentDeps {
                provider: Arc::new(Provider::Mock(provider)),
                tools: registry,
                prompts,
                errors: errors(),
                permission: None,
                pattern_classifier: None,
                checkpoint_db_path: None,
                artifacts: None,
            },
        );

        let result = agent.run("sess-4", "weather?").await;
        assert_eq!(result.stop_reason, "tool_limit");
        let memory = agent.session_memory("sess-4").await.unwrap();
        let tool_result = memory.messages().into_iter().find(|m| m.is_tool_result()).unwrap();
        assert!(tool_result.content.unwrap().contains("tool_denied"));
    }

    #[tokio::test]
    async fn unknown_tool_is_surfaced_as_tool_result_not_fatal() {
        let provider = MockProvider::new(vec![
            tool_call_response("call_1", "does_not_exist", json!({})),
            text_response("ok"),
        ]);
        let agent = agent(provider, Arc::new(ToolRegistry::new())).await;
        let result = agent.run("sess-5", "go").await;
        assert_eq!(result.stop_reason, "end_turn");
        let memory = agent.session_memory("sess-5").await.unwrap();
        let tool_result = memory.messages().into_iter().find(|m| m.is_tool_result()).unwrap();
        assert!(tool_result.content.unwrap().contains("unknown_tool"));
    }

    #[tokio::test]
    async fn turn_budget_of_one_with_tool_calls_synthesizes_terminal() {
        let provider = MockProvider::new(vec![tool_call_response(
            "call_1",
            "get_weather",
            json!({"city": "SF"}),
        )]);
        let registry = Arc::new(ToolRegistry::new());
        registry.register(Arc::new(WeatherTool));
        let prompts = prompt_registry().await;
        let mut cfg = config("hi");
        cfg.behavior.max_turns = 1;
        let agent = Agent::from_config(
            "agent-3".to_string(),
            cfg,
            AgentDeps {
                provider: Arc::new(Provider::Mock(provider)),
                tools: registry,
                prompts,
                errors: errors(),
                permission: None,
                pattern_classifier: None,
                checkpoint_db_path: None,
                artifacts: None,
            },
        );
        let result = agent.run("sess-6", "weather?").await;
        assert_eq!(result.stop_reason, "turn_limit");
        assert_eq!(result.content, TURN_BUDGET_EXHAUSTED);
    }
}
