//! Maps an agent's `llm.provider`/`llm.model` config to a concrete
//! [`loom::Provider`], reading credentials from the process environment.
//! MCP server process management and TLS provisioning are out of scope:
//! this module only ever builds an `LlmProvider`, never a transport
//! listener.

use async_openai::config::{AzureConfig, OpenAIConfig};
use loom::{
    AnthropicProvider, AzureOpenAiProvider, BedrockProvider, GeminiProvider, HuggingFaceProvider,
    MistralProvider, MockProvider, OllamaProvider, OpenAiProvider, Provider,
};
use loom::llm::NoopSigner;

use crate::error::ServeError;

const DEFAULT_MODEL: &str = "mock";

fn env_var(key: &'static str, brand: &'static str) -> Result<String, ServeError> {
    std::env::var(key).map_err(|_| ServeError::MissingEnv(key, brand))
}

/// Builds the `Provider` named by `brand`, using `model` (falling back to a
/// brand-specific default when unset). `brand` is `llm.provider` from the
/// agent's YAML config, e.g. `"anthropic"`, `"openai"`, `"mock"`.
pub(crate) async fn build_provider(brand: &str, model: Option<&str>) -> Result<Provider, ServeError> {
    let model = model.unwrap_or(DEFAULT_MODEL).to_string();
    match brand {
        "anthropic" => {
            let api_key = env_var("ANTHROPIC_API_KEY", "anthropic")?;
            Ok(Provider::Anthropic(AnthropicProvider::new(api_key, model).await))
        }
        "bedrock" => {
            let region = std::env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string());
            Ok(Provider::Bedrock(
                BedrockProvider::new(region, model, std::sync::Arc::new(NoopSigner)).await,
            ))
        }
        "openai" => {
            let api_key = env_var("OPENAI_API_KEY", "openai")?;
            let config = OpenAIConfig::new().with_api_key(api_key);
            Ok(Provider::OpenAi(OpenAiProvider::new(config, model).await))
        }
        "azure-openai" | "azure_openai" => {
            let api_key = env_var("AZURE_OPENAI_API_KEY", "azure-openai")?;
            let endpoint = env_var("AZURE_OPENAI_ENDPOINT", "azure-openai")?;
            let api_version = std::env::var("AZURE_OPENAI_API_VERSION")
                .unwrap_or_else(|_| "2024-02-01".to_string());
            let config = AzureConfig::new()
                .with_api_key(api_key)
                .with_api_base(endpoint)
                .with_api_version(api_version)
                .with_deployment_id(model.clone());
            Ok(Provider::AzureOpenAi(AzureOpenAiProvider::new(config, model).await))
        }
        "gemini" => {
            let api_key = env_var("GEMINI_API_KEY", "gemini")?;
            Ok(Provider::Gemini(GeminiProvider::new(api_key, model).await))
        }
        "mistral" => {
            let api_key = env_var("MISTRAL_API_KEY", "mistral")?;
            Ok(Provider::Mistral(MistralProvider::new(api_key, model).await))
        }
        "ollama" => Ok(Provider::Ollama(OllamaProvider::new(model).await)),
        "huggingface" => {
            let api_key = env_var("HF_API_KEY", "huggingface")?;
            Ok(Provider::HuggingFace(HuggingFaceProvider::new(api_key, model).await))
        }
        "mock" => Ok(Provider::Mock(MockProvider::new(vec![]))),
        other => Err(ServeError::UnsupportedProvider(other.to_string())),
    }
}
