//! Prompt registry.
//!
//! Key→content mapping with variants, `{{.name}}` interpolation (injection
//! safe, see [`interpolate`]), a TTL cache over raw bodies, and an optional
//! `notify`-backed file watcher for hot reload. Reload rebuilds the whole
//! in-memory map off to the side and swaps it in atomically under a write
//! lock.

mod entry;
pub mod interpolate;
pub mod selector;
mod ttl_cache;
pub(crate) mod watcher;

pub use entry::{PromptEntry, PromptMetadata};
pub use selector::{Explicit, Hash_, Random, VariantSelector, Weighted};
pub use ttl_cache::CacheStats;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::LoomError;
use entry::{parse_frontmatter, path_to_key};
use ttl_cache::PromptTtlCache;
use watcher::{watch, FsAction, FsChange, WatchHandle};

const DEFAULT_VARIANT: &str = "default";
const DEFAULT_TTL: Duration = Duration::from_secs(60);
const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug, thiserror::Error)]
pub enum PromptRegistryError {
    #[error("prompts root not found or not readable: {0}")]
    RootNotFound(String),
    #[error("failed to read {path}: {message}")]
    ReadFile { path: String, message: String },
    #[error("failed to parse frontmatter in {path}: {message}")]
    Parse { path: String, message: String },
}

impl From<PromptRegistryError> for LoomError {
    fn from(e: PromptRegistryError) -> Self {
        LoomError::Internal(e.to_string())
    }
}

/// What happened to a prompt key, published on the watch channel.
#[derive(Clone, Debug)]
pub enum UpdateAction {
    Created,
    Modified,
    Deleted,
    Error(String),
}

#[derive(Clone, Debug)]
pub struct Update {
    pub key: Option<String>,
    pub action: UpdateAction,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Optional filters for [`PromptRegistry::list`].
#[derive(Clone, Debug, Default)]
pub struct ListFilters {
    pub tag: Option<String>,
    pub key_prefix: Option<String>,
}

struct Inner {
    entries: HashMap<String, PromptEntry>,
}

/// Key→content registry backed by a directory of YAML files.
pub struct PromptRegistry {
    root: PathBuf,
    inner: RwLock<Inner>,
    cache: PromptTtlCache,
    updates_tx: tokio::sync::broadcast::Sender<Update>,
    watch_handle: RwLock<Option<WatchHandle>>,
}

impl PromptRegistry {
    /// Scans `root` once synchronously at construction. A missing root is
    /// not fatal — the registry simply starts empty.
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self, PromptRegistryError> {
        Self::with_ttl(root, DEFAULT_TTL).await
    }

    pub async fn with_ttl(root: impl Into<PathBuf>, ttl: Duration) -> Result<Self, PromptRegistryError> {
        let root = root.into();
        let (updates_tx, _) = tokio::sync::broadcast::channel(256);
        let registry = Self {
            root,
            inner: RwLock::new(Inner {
                entries: HashMap::new(),
            }),
            cache: PromptTtlCache::new(ttl),
            updates_tx,
            watch_handle: RwLock::new(None),
        };
        registry.reload().await?;
        Ok(registry)
    }

    /// Fully interpolated prompt text for the `default` variant.
    pub async fn get(
        &self,
        key: &str,
        vars: Option<&HashMap<String, String>>,
    ) -> Result<String, LoomError> {
        self.get_with_variant(key, DEFAULT_VARIANT, vars).await
    }

    /// Fully interpolated prompt text for an explicit variant.
    pub async fn get_with_variant(
        &self,
        key: &str,
        variant: &str,
        vars: Option<&HashMap<String, String>>,
    ) -> Result<String, LoomError> {
        if let Some(body) = self.cache.get(key, variant) {
            return Ok(interpolate::interpolate(&body, vars));
        }
        let inner = self.inner.read().await;
        let entry = inner
            .entries
            .get(key)
            .ok_or_else(|| LoomError::PromptNotFound { key: key.to_string() })?;
        let body = entry.variants.get(variant).ok_or_else(|| LoomError::VariantNotFound {
            key: key.to_string(),
            variant: variant.to_string(),
        })?;
        let body = body.clone();
        drop(inner);
        self.cache.put(key, variant, body.clone());
        Ok(interpolate::interpolate(&body, vars))
    }

    /// Resolves the variant for `session_id` via `selector`, then returns
    /// the interpolated prompt for that variant: an A/B wrapper composes
    /// any selector with any registry.
    pub async fn get_with_selector(
        &self,
        key: &str,
        session_id: &str,
        selector: &dyn VariantSelector,
        vars: Option<&HashMap<String, String>>,
    ) -> Result<String, LoomError> {
        let variants: Vec<String> = {
            let inner = self.inner.read().await;
            let entry = inner
                .entries
                .get(key)
                .ok_or_else(|| LoomError::PromptNotFound { key: key.to_string() })?;
            entry.variants.keys().cloned().collect()
        };
        let variant = selector.select(key, session_id, &variants);
        self.get_with_variant(key, &variant, vars).await
    }

    pub async fn get_metadata(&self, key: &str) -> Result<PromptMetadata, LoomError> {
        let inner = self.inner.read().await;
        inner
            .entries
            .get(key)
            .map(|e| e.metadata.clone())
            .ok_or_else(|| LoomError::PromptNotFound { key: key.to_string() })
    }

    pub async fn list(&self, filters: ListFilters) -> Vec<String> {
        let inner = self.inner.read().await;
        inner
            .entries
            .values()
            .filter(|e| {
                filters
                    .key_prefix
                    .as_ref()
                    .map(|p| e.key.starts_with(p.as_str()))
                    .unwrap_or(true)
            })
            .filter(|e| {
                filters
                    .tag
                    .as_ref()
                    .map(|t| e.metadata.tags.iter().any(|tag| tag == t))
                    .unwrap_or(true)
            })
            .map(|e| e.key.clone())
            .collect()
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn invalidate(&self) {
        self.cache.invalidate();
    }

    pub fn invalidate_key(&self, key: &str) {
        self.cache.invalidate_key(key);
    }

    /// Rescans `root` and atomically swaps in the new map; invalidates the
    /// TTL cache.
    pub async fn reload(&self) -> Result<(), PromptRegistryError> {
        let root = self.root.clone();
        let entries = tokio::task::spawn_blocking(move || scan_directory(&root))
            .await
            .map_err(|e| PromptRegistryError::ReadFile {
                path: "<scan>".into(),
                message: e.to_string(),
            })??;
        {
            let mut inner = self.inner.write().await;
            inner.entries = entries;
        }
        self.cache.invalidate();
        info!(root = %self.root.display(), "prompt registry reloaded");
        Ok(())
    }

    /// Starts the recursive file watcher (if not already running) and
    /// returns a receiver of [`Update`]s. Multiple callers may subscribe.
    /// Must be called on a `Arc<PromptRegistry>` so the background task can
    /// hold the registry alive.
    pub async fn watch(self: &Arc<Self>) -> tokio::sync::broadcast::Receiver<Update> {
        let mut guard = self.watch_handle.write().await;
        if guard.is_none() {
            let (mut fs_rx, handle) = watch(&self.root, DEFAULT_DEBOUNCE);
            *guard = Some(handle);
            drop(guard);
            let registry = Arc::clone(self);
            tokio::spawn(async move {
                while let Some(change) = fs_rx.recv().await {
                    let key = file_change_key(&change);
                    let action = match change.action {
                        FsAction::Removed => UpdateAction::Deleted,
                        FsAction::Created => UpdateAction::Created,
                        FsAction::Modified => UpdateAction::Modified,
                    };
                    let _ = registry.updates_tx.send(Update {
                        key,
                        action,
                        timestamp: chrono::Utc::now(),
                    });
                }
            });
        }
        self.updates_tx.subscribe()
    }

    /// Convenience for servers: watch the directory and reload on every
    /// change, publishing one [`Update`] per file event (or an `Error`
    /// update if the reload itself failed).
    pub async fn watch_and_reload(self: &Arc<Self>) -> tokio::sync::broadcast::Receiver<Update> {
        let mut rx = self.watch().await;
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            while let Ok(update) = rx.recv().await {
                if let Err(e) = registry.reload().await {
                    let _ = registry.updates_tx.send(Update {
                        key: update.key.clone(),
                        action: UpdateAction::Error(e.to_string()),
                        timestamp: chrono::Utc::now(),
                    });
                    warn!(error = %e, "prompt reload failed");
                }
            }
        });
        self.updates_tx.subscribe()
    }
}

fn file_change_key(change: &FsChange) -> Option<String> {
    change
        .path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
}

/// Scans every `.yaml`/`.yml` file under `root`, grouping default + variant
/// files into one [`PromptEntry`] per dotted key. Missing `root` yields an
/// empty map rather than an error (consistent with "hot reload watches a
/// directory that may not exist yet").
fn scan_directory(root: &Path) -> Result<HashMap<String, PromptEntry>, PromptRegistryError> {
    let mut entries: HashMap<String, PromptEntry> = HashMap::new();
    if !root.exists() {
        return Ok(entries);
    }
    for dir_entry in walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let path = dir_entry.into_path();
        let ext_ok = matches!(path.extension().and_then(|e| e.to_str()), Some("yaml") | Some("yml"));
        if !ext_ok {
            continue;
        }
        let stem = path.file_stem().unwrap().to_string_lossy().to_string();
        let (name, variant) = match stem.split_once('.') {
            Some((name, variant)) => (name.to_string(), variant.to_string()),
            None => (stem, DEFAULT_VARIANT.to_string()),
        };
        let dir = path.parent().unwrap_or(root);
        let key_dir = path_to_key(root, dir);
        let key = if key_dir.is_empty() {
            name.clone()
        } else {
            format!("{key_dir}.{name}")
        };

        let raw = std::fs::read_to_string(&path).map_err(|e| PromptRegistryError::ReadFile {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let (metadata, body) = parse_frontmatter(&raw, &path)?;

        let entry = entries.entry(key.clone()).or_insert_with(|| PromptEntry {
            key: key.clone(),
            variants: HashMap::new(),
            metadata: PromptMetadata::default(),
        });
        entry.variants.insert(variant.clone(), body);
        if variant == DEFAULT_VARIANT {
            entry.metadata = metadata;
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn write_prompt(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(&path, content).await.unwrap();
    }

    #[tokio::test]
    async fn loads_default_variant_and_interpolates() {
        let dir = tempfile::tempdir().unwrap();
        write_prompt(dir.path(), "greeting.yaml", "---\nversion: \"1\"\n---\nHello {{.name}}!").await;
        let registry = PromptRegistry::new(dir.path()).await.unwrap();
        let mut vars = HashMap::new();
        vars.insert("name".to_string(), "Ada".to_string());
        let out = registry.get("greeting", Some(&vars)).await.unwrap();
        assert_eq!(out, "Hello Ada!");
    }

    #[tokio::test]
    async fn nested_path_becomes_dotted_key() {
        let dir = tempfile::tempdir().unwrap();
        write_prompt(dir.path(), "agents/coder.yaml", "Write code.").await;
        let registry = PromptRegistry::new(dir.path()).await.unwrap();
        assert_eq!(registry.get("agents.coder", None).await.unwrap(), "Write code.");
    }

    #[tokio::test]
    async fn variant_file_is_selectable_by_name() {
        let dir = tempfile::tempdir().unwrap();
        write_prompt(dir.path(), "greeting.yaml", "Hi (default)").await;
        write_prompt(dir.path(), "greeting.casual.yaml", "Yo!").await;
        let registry = PromptRegistry::new(dir.path()).await.unwrap();
        assert_eq!(
            registry.get_with_variant("greeting", "casual", None).await.unwrap(),
            "Yo!"
        );
        assert_eq!(registry.get("greeting", None).await.unwrap(), "Hi (default)");
    }

    #[tokio::test]
    async fn missing_key_is_prompt_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let registry = PromptRegistry::new(dir.path()).await.unwrap();
        let err = registry.get("nope", None).await.unwrap_err();
        assert!(matches!(err, LoomError::PromptNotFound { .. }));
    }

    #[tokio::test]
    async fn missing_variant_is_variant_not_found() {
        let dir = tempfile::tempdir().unwrap();
        write_prompt(dir.path(), "greeting.yaml", "Hi").await;
        let registry = PromptRegistry::new(dir.path()).await.unwrap();
        let err = registry.get_with_variant("greeting", "nope", None).await.unwrap_err();
        assert!(matches!(err, LoomError::VariantNotFound { .. }));
    }

    #[tokio::test]
    async fn reload_with_unchanged_files_yields_same_map() {
        let dir = tempfile::tempdir().unwrap();
        write_prompt(dir.path(), "greeting.yaml", "Hi").await;
        let registry = PromptRegistry::new(dir.path()).await.unwrap();
        let before = registry.get("greeting", None).await.unwrap();
        registry.reload().await.unwrap();
        let after = registry.get("greeting", None).await.unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn reload_invalidates_cache() {
        let dir = tempfile::tempdir().unwrap();
        write_prompt(dir.path(), "greeting.yaml", "v1").await;
        let registry = PromptRegistry::new(dir.path()).await.unwrap();
        let _ = registry.get("greeting", None).await.unwrap();
        write_prompt(dir.path(), "greeting.yaml", "v2").await;
        registry.reload().await.unwrap();
        assert_eq!(registry.get("greeting", None).await.unwrap(), "v2");
    }
}
