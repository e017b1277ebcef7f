//! Builds the shared runtime state from `$LOOM_DATA_DIR`: the agent registry watching `agents/*.yaml`, the prompt
//! registry watching `prompts/`, the shared tool registry (builtins plus
//! whatever `RegisterTool` adds later), and the sqlite-backed artifact /
//! error store. Both [`crate::run_serve_on_listener`] and the CLI's local
//! backend go through this one path so they see the same live agent
//! population.

use std::path::PathBuf;
use std::sync::Arc;

use loom::{AgentRegistry, GetErrorDetailsTool, GetRecentMessagesTool, PromptRegistry, Store, ToolRegistry};

use crate::agents::AgentRuntime;

const DEFAULT_DATA_DIR: &str = "./loom-data";

fn data_dir() -> PathBuf {
    std::env::var("LOOM_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATA_DIR))
}

/// Scans and starts watching `agents/*.yaml` and `prompts/`, opens the
/// store, and returns the [`AgentRuntime`] the façade dispatches every
/// request through.
pub(crate) async fn build_agent_runtime(
) -> Result<Arc<AgentRuntime>, Box<dyn std::error::Error + Send + Sync>> {
    let root = data_dir();
    std::fs::create_dir_all(&root)?;

    let store = Store::open(&root)?;

    let tools = Arc::new(ToolRegistry::new());
    tools.register(Arc::new(GetErrorDetailsTool::new(store.errors())));
    tools.register(Arc::new(GetRecentMessagesTool::new()));

    let prompts = Arc::new(PromptRegistry::new(root.join("prompts")).await?);
    // Keep the registry's internal map fresh on every prompts/*.yaml edit;
    // the returned broadcast receiver is for external subscribers (none
    // here), so it's fine to let it drop immediately.
    let _ = prompts.watch_and_reload().await;

    let registry = Arc::new(AgentRegistry::new(root.join("agents")));
    registry.load_agents().await?;
    registry.watch_configs().await?;

    let sessions_dir = root.join("sessions");
    std::fs::create_dir_all(&sessions_dir)?;

    Ok(AgentRuntime::new(registry, tools, prompts, store, sessions_dir))
}
