//! On-disk agent configuration, grounded in the
//! teacher's `HelveConfig`/`ReactBuildConfig` split between declarative YAML
//! and the runtime knobs built from it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AgentConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub system_prompt: String,
    #[serde(default)]
    pub rom: Option<String>,
    #[serde(default)]
    pub backend_path: Option<String>,
    #[serde(default)]
    pub llm: Option<LlmConfig>,
    #[serde(default)]
    pub behavior: BehaviorConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct LlmConfig {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub max_context_tokens: Option<usize>,
    pub reserved_output_tokens: Option<usize>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BehaviorConfig {
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    #[serde(default = "default_max_tool_executions")]
    pub max_tool_executions: u32,
    #[serde(default)]
    pub patterns: Option<PatternsConfig>,
    #[serde(default)]
    pub yolo: bool,
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    #[serde(default)]
    pub disabled_tools: Vec<String>,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            max_tool_executions: default_max_tool_executions(),
            patterns: None,
            yolo: false,
            allowed_tools: Vec::new(),
            disabled_tools: Vec::new(),
        }
    }
}

fn default_max_turns() -> u32 {
    25
}

fn default_max_tool_executions() -> u32 {
    50
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct PatternsConfig {
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct MemoryConfig {
    #[serde(default)]
    pub memory_compression: Option<MemoryCompressionConfig>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MemoryCompressionConfig {
    pub profile: CompressionProfileConfig,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CompressionProfileConfig {
    pub max_l1_messages: usize,
    pub warning_threshold_percent: u8,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub builtin: Vec<String>,
    #[serde(default)]
    pub mcp: Vec<McpToolsConfig>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct McpToolsConfig {
    pub server: String,
    pub tools: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_yaml() {
        let yaml = "name: coder\nsystem_prompt: \"You write code.\"\n";
        let config: AgentConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.name, "coder");
        assert_eq!(config.behavior.max_turns, 25);
        assert_eq!(config.behavior.max_tool_executions, 50);
    }

    #[test]
    fn parses_full_yaml() {
        let yaml = r#"
name: coder
description: writes code
system_prompt: agents.coder
llm:
  provider: anthropic
  model: claude-3
behavior:
  max_turns: 5
  max_tool_executions: 10
  yolo: true
tools:
  builtin: ["get_error_details"]
  mcp:
    - server: "filesystem"
      tools: ["*"]
metadata:
  team: "platform"
"#;
        let config: AgentConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.behavior.max_turns, 5);
        assert!(config.behavior.yolo);
        assert_eq!(config.tools.mcp[0].server, "filesystem");
        assert_eq!(config.metadata["team"], "platform");
    }
}
