//! Agent registry & hot reload.
//!
//! Scans `*.yaml` files under a directory into [`AgentConfig`]s, mints a
//! stable opaque id the first time a `name` is seen and reuses it on every
//! later sighting, and watches the directory for changes, invoking a
//! caller-supplied reload callback only when a file's content actually
//! changed. Grounded in its `prompts::load` directory-scan
//! conventions plus the `notify`-backed debounced watcher already built for
//! [`crate::prompt_registry`] (shared here via `pub(crate) mod watcher`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::prompt_registry::watcher::{watch, FsAction, WatchHandle};

use super::config::AgentConfig;

const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug, thiserror::Error)]
pub enum AgentRegistryError {
    #[error("io error reading agents directory: {0}")]
    Io(String),
    #[error("failed to parse agent config {path}: {reason}")]
    Parse { path: String, reason: String },
}

/// One live agent config known to the registry.
#[derive(Clone, Debug)]
pub struct AgentRegistryEntry {
    pub name: String,
    pub stable_id: String,
    pub config: AgentConfig,
    pub file_path: PathBuf,
    pub mtime_ms: i64,
    content_hash: String,
}

/// What changed, delivered to the reload callback.
#[derive(Clone, Debug)]
pub enum RegistryEvent {
    /// First sighting of this `name`; the id is freshly minted.
    Added(AgentRegistryEntry),
    /// A previously-seen agent's config content changed.
    Updated(AgentRegistryEntry),
    /// The backing file disappeared.
    Removed { stable_id: String, name: String },
}

pub type ReloadCallback = Arc<dyn Fn(RegistryEvent) + Send + Sync>;

struct Inner {
    /// Keyed by stable id, the source of truth for `ListConfigs`.
    entries: HashMap<String, AgentRegistryEntry>,
    /// `name -> stable_id`, kept alive across reloads so repeat sightings of
    /// the same name never mint a second id (spec "Stable-id discipline").
    ids_by_name: HashMap<String, String>,
}

/// Directory-backed, hot-reloading source of [`AgentConfig`]s.
pub struct AgentRegistry {
    dir: PathBuf,
    inner: RwLock<Inner>,
    reload_callback: RwLock<Option<ReloadCallback>>,
    watch_handle: RwLock<Option<WatchHandle>>,
}

impl AgentRegistry {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            inner: RwLock::new(Inner {
                entries: HashMap::new(),
                ids_by_name: HashMap::new(),
            }),
            reload_callback: RwLock::new(None),
            watch_handle: RwLock::new(None),
        }
    }

    /// Scans `dir` for `*.yaml`/`*.yml` files and (re)populates the
    /// in-memory map, minting ids for names never seen before. Returns the full set of entries after the scan.
    pub async fn load_agents(&self) -> Result<Vec<AgentRegistryEntry>, AgentRegistryError> {
        let files = scan_yaml_files(&self.dir)?;
        let mut inner = self.inner.write().await;
        let mut seen_ids = std::collections::HashSet::new();
        for path in files {
            let entry = match parse_entry(&path, &mut inner.ids_by_name) {
                Ok(e) => e,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unparsable agent config");
                    continue;
                }
            };
            seen_ids.insert(entry.stable_id.clone());
            inner.entries.insert(entry.stable_id.clone(), entry);
        }
        // Files removed between scans drop out of `entries` but keep their
        // id reserved in `ids_by_name`, so a re-added file with the same
        // name reuses its old id.
        inner.entries.retain(|id, _| seen_ids.contains(id));
        Ok(inner.entries.values().cloned().collect())
    }

    pub async fn list_configs(&self) -> Vec<AgentRegistryEntry> {
        self.inner.read().await.entries.values().cloned().collect()
    }

    pub async fn get_agent_info(&self, name: &str) -> Option<AgentRegistryEntry> {
        let inner = self.inner.read().await;
        let id = inner.ids_by_name.get(name)?;
        inner.entries.get(id).cloned()
    }

    pub async fn set_reload_callback(&self, callback: ReloadCallback) {
        *self.reload_callback.write().await = Some(callback);
    }

    /// Starts the debounced directory watcher (if not already running).
    /// Must be called on an `Arc<AgentRegistry>` so the background task can
    /// hold the registry alive, matching [`crate::prompt_registry::PromptRegistry::watch`].
    pub async fn watch_configs(self: &Arc<Self>) -> Result<(), AgentRegistryError> {
        self.watch_configs_with_debounce(DEFAULT_DEBOUNCE).await
    }

    pub async fn watch_configs_with_debounce(
        self: &Arc<Self>,
        debounce: Duration,
    ) -> Result<(), AgentRegistryError> {
        let mut guard = self.watch_handle.write().await;
        if guard.is_some() {
            return Ok(());
        }
        let (mut rx, handle) = watch(&self.dir, debounce);
        *guard = Some(handle);
        drop(guard);

        let dir = self.dir.clone();
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(change) = rx.recv().await {
                let path = change.path;
                if !path.starts_with(&dir) {
                    continue;
                }
                match change.action {
                    FsAction::Removed => registry.apply_removal(&path).await,
                    FsAction::Created | FsAction::Modified => registry.apply_change(&path).await,
                }
            }
        });
        Ok(())
    }

    async fn apply_change(&self, path: &Path) {
        let mut inner = self.inner.write().await;
        let entry = match parse_entry(path, &mut inner.ids_by_name) {
            Ok(e) => e,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring invalid agent config change");
                return;
            }
        };
        let previous = inner.entries.get(&entry.stable_id);
        let event = match previous {
            Some(prev) if prev.content_hash == entry.content_hash => None,
            Some(_) => Some(RegistryEvent::Updated(entry.clone())),
            None => Some(RegistryEvent::Added(entry.clone())),
        };
        inner.entries.insert(entry.stable_id.clone(), entry);
        drop(inner);
        if let Some(event) = event {
            self.notify(event).await;
        }
    }

    async fn apply_removal(&self, path: &Path) {
        let mut inner = self.inner.write().await;
        let Some((stable_id, name)) = inner
            .entries
            .iter()
            .find(|(_, e)| e.file_path == path)
            .map(|(id, e)| (id.clone(), e.name.clone()))
        else {
            return;
        };
        inner.entries.remove(&stable_id);
        drop(inner);
        info!(agent = %name, %stable_id, "agent config file removed");
        self.notify(RegistryEvent::Removed { stable_id, name }).await;
    }

    async fn notify(&self, event: RegistryEvent) {
        if let Some(cb) = self.reload_callback.read().await.as_ref() {
            cb(event);
        }
    }

    pub async fn close(&self) {
        self.watch_handle.write().await.take();
    }
}

fn scan_yaml_files(dir: &Path) -> Result<Vec<PathBuf>, AgentRegistryError> {
    let mut out = Vec::new();
    if !dir.exists() {
        return Ok(out);
    }
    let read_dir = std::fs::read_dir(dir).map_err(|e| AgentRegistryError::Io(e.to_string()))?;
    for entry in read_dir {
        let entry = entry.map_err(|e| AgentRegistryError::Io(e.to_string()))?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("yaml")
            || path.extension().and_then(|e| e.to_str()) == Some("yml")
        {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

fn parse_entry(
    path: &Path,
    ids_by_name: &mut HashMap<String, String>,
) -> Result<AgentRegistryEntry, AgentRegistryError> {
    let text = std::fs::read_to_string(path).map_err(|e| AgentRegistryError::Parse {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let config: AgentConfig =
        serde_yaml::from_str(&text).map_err(|e| AgentRegistryError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
    let mtime_ms = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);
    let stable_id = ids_by_name
        .entry(config.name.clone())
        .or_insert_with(|| uuid::Uuid::new_v4().to_string())
        .clone();
    Ok(AgentRegistryEntry {
        name: config.name.clone(),
        stable_id,
        content_hash: content_hash(&text),
        config,
        file_path: path.to_path_buf(),
        mtime_ms,
    })
}

fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    fn write(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    #[tokio::test]
    async fn load_agents_mints_stable_ids_and_reuses_on_reload() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "coder.yaml", "name: coder\nsystem_prompt: p\n");
        let registry = AgentRegistry::new(dir.path());
        let first = registry.load_agents().await.unwrap();
        let id1 = first[0].stable_id.clone();

        let second = registry.load_agents().await.unwrap();
        assert_eq!(second[0].stable_id, id1);
    }

    #[tokio::test]
    async fn get_agent_info_looks_up_by_name() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "coder.yaml", "name: coder\nsystem_prompt: p\n");
        let registry = AgentRegistry::new(dir.path());
        registry.load_agents().await.unwrap();
        let info = registry.get_agent_info("coder").await.unwrap();
        assert_eq!(info.name, "coder");
    }

    #[tokio::test]
    async fn removed_file_drops_from_list_but_keeps_reserved_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coder.yaml");
        write(dir.path(), "coder.yaml", "name: coder\nsystem_prompt: p\n");
        let registry = AgentRegistry::new(dir.path());
        let first = registry.load_agents().await.unwrap();
        let id1 = first[0].stable_id.clone();

        std::fs::remove_file(&path).unwrap();
        let second = registry.load_agents().await.unwrap();
        assert!(second.is_empty());

        write(dir.path(), "coder.yaml", "name: coder\nsystem_prompt: q\n");
        let third = registry.load_agents().await.unwrap();
        assert_eq!(third[0].stable_id, id1);
    }

    #[tokio::test]
    async fn unparsable_file_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "broken.yaml", "not: [valid");
        write(dir.path(), "coder.yaml", "name: coder\nsystem_prompt: p\n");
        let registry = AgentRegistry::new(dir.path());
        let entries = registry.load_agents().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "coder");
    }

    #[tokio::test]
    async fn watch_configs_invokes_reload_callback_on_change() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "coder.yaml", "name: coder\nsystem_prompt: p\n");
        let registry = Arc::new(AgentRegistry::new(dir.path()));
        registry.load_agents().await.unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        registry
            .set_reload_callback(Arc::new(move |event: RegistryEvent| {
                let _ = tx.send(event);
            }))
            .await;
        registry
            .watch_configs_with_debounce(StdDuration::from_millis(50))
            .await
            .unwrap();

        tokio::time::sleep(StdDuration::from_millis(100)).await;
        write(dir.path(), "coder.yaml", "name: coder\nsystem_prompt: changed\n");

        let event = tokio::time::timeout(StdDuration::from_secs(5), rx.recv())
            .await
            .expect("reload callback fired")
            .expect("channel open");
        match event {
            RegistryEvent::Updated(entry) => assert_eq!(entry.config.system_prompt, "changed"),
            other => panic!("expected Updated, got {other:?}"),
        }
        registry.close().await;
    }
}
