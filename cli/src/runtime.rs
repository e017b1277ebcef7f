//! Builds the pieces a local agent turn needs directly from
//! `$LOOM_DATA_DIR`, the same on-disk layout [`serve`]'s bootstrap uses.
//! Kept separate from `serve` (rather than reused) since the CLI only ever
//! needs one agent built for one turn, not a long-lived hot-reloading
//! registry serving concurrent connections.

use std::sync::Arc;

use async_openai::config::{AzureConfig, OpenAIConfig};
use loom::{
    Agent, AgentDeps, AgentRegistry, GetErrorDetailsTool, GetRecentMessagesTool, PromptRegistry,
    Provider, Store, ToolRegistry,
};

use crate::{data_dir, RunError};

fn env_var(key: &'static str) -> Result<String, RunError> {
    std::env::var(key).map_err(|_| RunError::Local(format!("missing environment variable {key}")))
}

/// Builds the `Provider` named by `brand`, reading credentials from the
/// process environment (same brand strings as the YAML `llm.provider`
/// field: `anthropic`, `bedrock`, `openai`, `azure-openai`, `gemini`,
/// `mistral`, `ollama`, `huggingface`, `mock`).
async fn build_provider(brand: &str, model: &str) -> Result<Provider, RunError> {
    let model = model.to_string();
    match brand {
        "anthropic" => {
            let api_key = env_var("ANTHROPIC_API_KEY")?;
            Ok(Provider::Anthropic(loom::AnthropicProvider::new(api_key, model).await))
        }
        "bedrock" => {
            let region = std::env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string());
            Ok(Provider::Bedrock(
                loom::BedrockProvider::new(region, model, Arc::new(loom::NoopSigner)).await,
            ))
        }
        "openai" => {
            let api_key = env_var("OPENAI_API_KEY")?;
            let config = OpenAIConfig::new().with_api_key(api_key);
            Ok(Provider::OpenAi(loom::OpenAiProvider::new(config, model).await))
        }
        "azure-openai" | "azure_openai" => {
            let api_key = env_var("AZURE_OPENAI_API_KEY")?;
            let endpoint = env_var("AZURE_OPENAI_ENDPOINT")?;
            let api_version = std::env::var("AZURE_OPENAI_API_VERSION")
                .unwrap_or_else(|_| "2024-02-01".to_string());
            let config = AzureConfig::new()
                .with_api_key(api_key)
                .with_api_base(endpoint)
                .with_api_version(api_version)
                .with_deployment_id(model.clone());
            Ok(Provider::AzureOpenAi(loom::AzureOpenAiProvider::new(config, model).await))
        }
        "gemini" => {
            let api_key = env_var("GEMINI_API_KEY")?;
            Ok(Provider::Gemini(loom::GeminiProvider::new(api_key, model).await))
        }
        "mistral" => {
            let api_key = env_var("MISTRAL_API_KEY")?;
            Ok(Provider::Mistral(loom::MistralProvider::new(api_key, model).await))
        }
        "ollama" => Ok(Provider::Ollama(loom::OllamaProvider::new(model).await)),
        "huggingface" => {
            let api_key = env_var("HF_API_KEY")?;
            Ok(Provider::HuggingFace(loom::HuggingFaceProvider::new(api_key, model).await))
        }
        "mock" => Ok(Provider::Mock(loom::MockProvider::new(vec![]))),
        other => Err(RunError::Local(format!("unsupported llm provider: {other}"))),
    }
}

/// Builds a tool registry with the built-in introspection tools
/// (`get_error_details`, `get_recent_messages`). Available without an
/// agent config, so `loom tool list`/`loom tool show` work standalone.
pub(crate) fn build_tool_registry() -> Result<Arc<ToolRegistry>, RunError> {
    let root = data_dir();
    std::fs::create_dir_all(&root).map_err(|e| RunError::Local(e.to_string()))?;
    let store = Store::open(&root).map_err(|e| RunError::Local(e.to_string()))?;

    let tools = Arc::new(ToolRegistry::new());
    tools.register(Arc::new(GetErrorDetailsTool::new(store.errors())));
    tools.register(Arc::new(GetRecentMessagesTool::new()));
    Ok(tools)
}

/// Loads the named agent's config from `$LOOM_DATA_DIR/agents` and builds a
/// live [`Agent`] ready for one `run`/`run_stream` call.
pub(crate) async fn build_agent(agent_id: &str) -> Result<Arc<Agent>, RunError> {
    let root = data_dir();
    let store = Store::open(&root).map_err(|e| RunError::Local(e.to_string()))?;

    let tools = build_tool_registry()?;
    let prompts = Arc::new(
        PromptRegistry::new(root.join("prompts"))
            .await
            .map_err(|e| RunError::Local(e.to_string()))?,
    );

    let registry = AgentRegistry::new(root.join("agents"));
    registry.load_agents().await.map_err(|e| RunError::Local(e.to_string()))?;
    let entry = registry
        .get_agent_info(agent_id)
        .await
        .ok_or_else(|| RunError::UnknownAgent(agent_id.to_string()))?;

    let llm = entry.config.llm.clone().unwrap_or_default();
    let brand = llm
        .provider
        .ok_or_else(|| RunError::Local(format!("agent {agent_id} has no llm.provider configured")))?;
    let model = llm.model.unwrap_or_else(|| "mock".to_string());
    let provider = build_provider(&brand, &model).await?;

    let sessions_dir = root.join("sessions");
    std::fs::create_dir_all(&sessions_dir).map_err(|e| RunError::Local(e.to_string()))?;

    let deps = AgentDeps {
        provider: Arc::new(provider),
        tools,
        prompts,
        errors: store.errors(),
        permission: None,
        pattern_classifier: None,
        checkpoint_db_path: Some(sessions_dir.join(format!("{}.sqlite3", entry.stable_id))),
        artifacts: Some(store.artifacts()),
    };
    Ok(Arc::new(Agent::from_config(entry.stable_id.clone(), entry.config.clone(), deps)))
}
