//! OpenAI and Azure OpenAI providers, both speaking the OpenAI
//! chat-completions wire format via `async-openai` (already a teacher
//! dependency, used here instead of a hand-rolled HTTP client).

use async_openai::config::{AzureConfig, Config, OpenAIConfig};
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestToolMessageArgs,
    ChatCompletionRequestUserMessageArgs, ChatCompletionTool, ChatCompletionToolArgs,
    ChatCompletionToolType, CreateChatCompletionRequestArgs, FinishReason, FunctionObjectArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use futures_util::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::LoomError;
use crate::llm::cost::Cost;
use crate::llm::tool_name::{sanitize_tool_name, ToolNameMap};
use crate::llm::{LlmProvider, LlmResponse, StopReason, TokenCallback, ToolDefinition, Usage};
use crate::message::{Message, Role};
use crate::rate_limiter::{limiter_for_brand, RateLimiter, RateLimiterConfig, RateLimiterError};

pub(crate) fn to_wire_messages(messages: &[Message]) -> Vec<ChatCompletionRequestMessage> {
    messages
        .iter()
        .filter_map(|m| match m.role {
            Role::System => Some(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(m.content.clone().unwrap_or_default())
                    .build()
                    .ok()?
                    .into(),
            ),
            Role::User => Some(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(m.content.clone().unwrap_or_default())
                    .build()
                    .ok()?
                    .into(),
            ),
            Role::Assistant => {
                let mut builder = ChatCompletionRequestAssistantMessageArgs::default();
                if let Some(content) = &m.content {
                    builder.content(content.clone());
                }
                builder.build().ok().map(Into::into)
            }
            Role::Tool => Some(
                ChatCompletionRequestToolMessageArgs::default()
                    .content(m.content.clone().unwrap_or_default())
                    .tool_call_id(m.tool_use_id.clone().unwrap_or_default())
                    .build()
                    .ok()?
                    .into(),
            ),
        })
        .collect()
}

pub(crate) fn to_wire_tools(tools: &[ToolDefinition]) -> (Vec<ChatCompletionTool>, ToolNameMap) {
    let map = ToolNameMap::build(tools.iter().map(|t| t.name.as_str()));
    let wire = tools
        .iter()
        .filter_map(|t| {
            let function = FunctionObjectArgs::default()
                .name(sanitize_tool_name(&t.name))
                .description(t.description.clone().unwrap_or_default())
                .parameters(t.input_schema.clone())
                .build()
                .ok()?;
            ChatCompletionToolArgs::default()
                .r#type(ChatCompletionToolType::Function)
                .function(function)
                .build()
                .ok()
        })
        .collect();
    (wire, map)
}

pub(crate) fn finish_to_stop_reason(finish: Option<FinishReason>) -> StopReason {
    match finish {
        Some(FinishReason::ToolCalls) => StopReason::ToolUse,
        Some(FinishReason::Length) => StopReason::MaxTokens,
        Some(FinishReason::Stop) | None => StopReason::EndTurn,
        _ => StopReason::Error,
    }
}

macro_rules! openai_compat_provider {
    ($name:ident, $config:ty, $brand:literal, $cost_fn:expr) => {
        pub struct $name {
            client: Client<$config>,
            model: String,
            limiter: Arc<RateLimiter>,
            cost: Cost,
        }

        impl $name {
            pub async fn new(config: $config, model: String) -> Self {
                let limiter = limiter_for_brand($brand, RateLimiterConfig::for_brand($brand)).await;
                Self {
                    client: Client::with_config(config),
                    model,
                    limiter,
                    cost: $cost_fn,
                }
            }

            async fn guarded_call<T, Fut>(
                &self,
                cancel: &CancellationToken,
                op: impl Fn() -> Fut,
            ) -> Result<T, LoomError>
            where
                Fut: std::future::Future<Output = Result<T, async_openai::error::OpenAIError>>,
            {
                self.limiter
                    .r#do(cancel, || async { op().await.map_err(|e| RateLimiterError::classify(&e.to_string())) })
                    .await
                    .map_err(LoomError::from)
            }
        }

        #[async_trait]
        impl LlmProvider for $name {
            fn name(&self) -> &str {
                $brand
            }

            fn model(&self) -> &str {
                &self.model
            }

            async fn chat(
                &self,
                messages: &[Message],
                tools: &[ToolDefinition],
                cancel: &CancellationToken,
            ) -> Result<LlmResponse, LoomError> {
                let (wire_tools, map) = to_wire_tools(tools);
                let mut builder = CreateChatCompletionRequestArgs::default();
                builder.model(&self.model).messages(to_wire_messages(messages));
                if !wire_tools.is_empty() {
                    builder.tools(wire_tools);
                }
                let request = builder
                    .build()
                    .map_err(|e| LoomError::Internal(e.to_string()))?;

                let response = self
                    .guarded_call(cancel, || self.client.chat().create(request.clone()))
                    .await?;

                let choice = response
                    .choices
                    .into_iter()
                    .next()
                    .ok_or_else(|| LoomError::ProviderBadResponse("no choices returned".into()))?;
                let content = choice.message.content.unwrap_or_default();
                let tool_calls = choice
                    .message
                    .tool_calls
                    .unwrap_or_default()
                    .into_iter()
                    .map(|tc| crate::message::ToolCall {
                        id: tc.id,
                        name: map.restore(&tc.function.name),
                        input: serde_json::from_str(&tc.function.arguments).unwrap_or_else(|_| serde_json::json!({})),
                    })
                    .collect();
                let stop_reason = finish_to_stop_reason(choice.finish_reason);

                let mut usage = Usage::default();
                if let Some(u) = response.usage {
                    usage.input = u.prompt_tokens as u64;
                    usage.output = u.completion_tokens as u64;
                    usage.total = u.total_tokens as u64;
                }
                usage.cost_usd = self.cost.compute(&usage);
                self.limiter.record_token_usage(usage.itpm_chargeable()).await;

                Ok(LlmResponse {
                    content,
                    stop_reason,
                    tool_calls,
                    usage,
                    metadata: serde_json::Value::Null,
                })
            }

            async fn chat_stream(
                &self,
                messages: &[Message],
                tools: &[ToolDefinition],
                token_cb: TokenCallback,
                cancel: &CancellationToken,
            ) -> Result<LlmResponse, LoomError> {
                let (wire_tools, map) = to_wire_tools(tools);
                let mut builder = CreateChatCompletionRequestArgs::default();
                builder.model(&self.model).messages(to_wire_messages(messages)).stream(true);
                if !wire_tools.is_empty() {
                    builder.tools(wire_tools);
                }
                let request = builder
                    .build()
                    .map_err(|e| LoomError::Internal(e.to_string()))?;

                let mut stream = self
                    .client
                    .chat()
                    .create_stream(request)
                    .await
                    .map_err(|e| LoomError::ProviderUnavailable(e.to_string()))?;

                let mut content = String::new();
                let mut tool_fragments: std::collections::BTreeMap<u32, (String, String, String)> =
                    std::collections::BTreeMap::new();
                let mut stop_reason = StopReason::EndTurn;
                let mut usage = Usage::default();

                loop {
                    let next = tokio::select! {
                        _ = cancel.cancelled() => return Err(LoomError::ContextCancelled),
                        next = stream.next() => next,
                    };
                    let Some(chunk) = next else { break };
                    let chunk = chunk.map_err(|e| LoomError::ProviderBadResponse(e.to_string()))?;
                    if let Some(u) = chunk.usage {
                        usage.input = u.prompt_tokens as u64;
                        usage.output = u.completion_tokens as u64;
                        usage.total = u.total_tokens as u64;
                    }
                    let Some(choice) = chunk.choices.into_iter().next() else { continue };
                    if let Some(reason) = choice.finish_reason {
                        stop_reason = finish_to_stop_reason(Some(reason));
                    }
                    if let Some(text) = choice.delta.content {
                        if !text.is_empty() {
                            content.push_str(&text);
                            token_cb(&text);
                        }
                    }
                    if let Some(deltas) = choice.delta.tool_calls {
                        for d in deltas {
                            let entry = tool_fragments
                                .entry(d.index)
                                .or_insert_with(|| (String::new(), String::new(), String::new()));
                            if let Some(id) = d.id {
                                entry.0 = id;
                            }
                            if let Some(f) = &d.function {
                                if let Some(name) = &f.name {
                                    entry.1 = name.clone();
                                }
                                if let Some(args) = &f.arguments {
                                    entry.2.push_str(args);
                                }
                            }
                        }
                    }
                }

                let tool_calls = tool_fragments
                    .into_values()
                    .map(|(id, name, args)| crate::message::ToolCall {
                        id,
                        name: map.restore(&name),
                        input: serde_json::from_str(&args).unwrap_or_else(|_| serde_json::json!({})),
                    })
                    .collect();
                if !tool_calls.is_empty() && matches!(stop_reason, StopReason::EndTurn) {
                    stop_reason = StopReason::ToolUse;
                }

                usage.cost_usd = self.cost.compute(&usage);
                self.limiter.record_token_usage(usage.itpm_chargeable()).await;

                Ok(LlmResponse {
                    content,
                    stop_reason,
                    tool_calls,
                    usage,
                    metadata: serde_json::Value::Null,
                })
            }

            fn cost(&self, usage: &Usage) -> f64 {
                self.cost.compute(usage)
            }
        }
    };
}

openai_compat_provider!(OpenAiProvider, OpenAIConfig, "openai", Cost::openai());
openai_compat_provider!(AzureOpenAiProvider, AzureConfig, "azure-openai", Cost::azure_openai());

// Ensures both configs satisfy `async_openai::config::Config` at the macro
// expansion site (a compile-time sanity check, not a runtime assertion).
fn _assert_configs<C: Config>() {}
#[allow(dead_code)]
fn _use_assertions() {
    _assert_configs::<OpenAIConfig>();
    _assert_configs::<AzureConfig>();
}
