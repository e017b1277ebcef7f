//! Builds and caches live [`loom::Agent`]s from [`loom::AgentRegistry`]
//! entries: the registry only ever holds declarative `AgentConfig`s, so the
//! façade is responsible for wiring each config to a concrete provider,
//! the shared tool/prompt registries, and the error/artifact stores.
//!
//! Agents are rebuilt lazily on next use after a hot-reload `Updated`/
//! `Removed` event invalidates the cache entry, rather than rebuilt inline
//! inside the reload callback — keeps the callback (which runs on the
//! registry's watcher task) fast and infallible.

use std::sync::Arc;

use dashmap::DashMap;
use loom::{Agent, AgentDeps, AgentRegistry, PromptRegistry, ToolRegistry};

use crate::error::ServeError;
use crate::provider::build_provider;

pub(crate) struct AgentRuntime {
    registry: Arc<AgentRegistry>,
    tools: Arc<ToolRegistry>,
    prompts: Arc<PromptRegistry>,
    store: loom::Store,
    sessions_dir: std::path::PathBuf,
    live: DashMap<String, Arc<Agent>>,
}

impl AgentRuntime {
    pub(crate) fn new(
        registry: Arc<AgentRegistry>,
        tools: Arc<ToolRegistry>,
        prompts: Arc<PromptRegistry>,
        store: loom::Store,
        sessions_dir: std::path::PathBuf,
    ) -> Arc<Self> {
        let runtime = Arc::new(Self {
            registry,
            tools,
            prompts,
            store,
            sessions_dir,
            live: DashMap::new(),
        });
        let invalidator = Arc::clone(&runtime);
        tokio::spawn(async move {
            invalidator
                .registry
                .set_reload_callback(Arc::new(move |event| invalidator.on_reload(event)))
                .await;
        });
        runtime
    }

    fn on_reload(&self, event: loom::RegistryEvent) {
        match event {
            loom::RegistryEvent::Updated(entry) => {
                self.live.remove(&entry.name);
            }
            loom::RegistryEvent::Removed { name, .. } => {
                self.live.remove(&name);
            }
            loom::RegistryEvent::Added(_) => {}
        }
    }

    pub(crate) fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    pub(crate) fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    pub(crate) fn prompts(&self) -> &Arc<PromptRegistry> {
        &self.prompts
    }

    /// Resolves a client-supplied `agent_id`, which may be either
    /// the registry `name` or the stable id handed out in `ListAgents`, to
    /// the config `name` that [`Self::get_or_build`]/the registry's lookup
    /// expects.
    pub(crate) async fn resolve_name(&self, agent_id: &str) -> Option<String> {
        if self.registry.get_agent_info(agent_id).await.is_some() {
            return Some(agent_id.to_string());
        }
        self.registry
            .list_configs()
            .await
            .into_iter()
            .find(|e| e.stable_id == agent_id)
            .map(|e| e.name)
    }

    /// Returns the cached live agent for `name`, building and caching it
    /// from the registry's current config on first use or after a reload
    /// invalidated the cache.
    pub(crate) async fn get_or_build(&self, name: &str) -> Result<Arc<Agent>, ServeError> {
        if let Some(agent) = self.live.get(name) {
            return Ok(Arc::clone(agent.value()));
        }
        let entry = self
            .registry
            .get_agent_info(name)
            .await
            .ok_or_else(|| ServeError::UnknownAgent(name.to_string()))?;

        let llm = entry.config.llm.clone().unwrap_or_default();
        let brand = llm
            .provider
            .clone()
            .ok_or_else(|| ServeError::NoProvider(name.to_string()))?;
        let provider = build_provider(&brand, llm.model.as_deref()).await?;

        let deps = AgentDeps {
            provider: Arc::new(provider),
            tools: Arc::clone(&self.tools),
            prompts: Arc::clone(&self.prompts),
            errors: self.store.errors(),
            permission: None,
            pattern_classifier: None,
            checkpoint_db_path: Some(self.sessions_dir.join(format!("{}.sqlite3", entry.stable_id))),
            artifacts: Some(self.store.artifacts()),
        };
        let agent = Arc::new(Agent::from_config(entry.stable_id.clone(), entry.config.clone(), deps));
        self.live.insert(name.to_string(), Arc::clone(&agent));
        Ok(agent)
    }
}
