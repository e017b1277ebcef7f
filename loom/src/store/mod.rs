//! Artifact / workspace / error store.
//!
//! Three small stores sharing one sqlite connection and one data directory,
//! built around an `Arc<Mutex<Connection>>` plus `tokio::task::block_in_place`
//! around the blocking `rusqlite` calls:
//!
//! - [`ArtifactStore`]: content-addressed blobs. Large tool results go here
//!   and the tool-result message carries only the returned id.
//! - [`ErrorStore`]: append-only log of tool/loop failures, queryable by the
//!   built-in `get_error_details` tool.
//! - [`WorkspaceStore`]: per-agent scratchpad directory under
//!   `$DATA_DIR/scratchpad/<agent_id>/` for plain-file scratch work.

mod artifact;
mod error_store;
mod workspace;

pub use artifact::ArtifactStore;
pub use error_store::{ErrorRecord, ErrorStore};
pub use workspace::WorkspaceStore;

use std::path::Path;
use std::sync::{Arc, Mutex};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage: {0}")]
    Storage(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<StoreError> for crate::error::LoomError {
    fn from(e: StoreError) -> Self {
        crate::error::LoomError::Internal(e.to_string())
    }
}

/// Owns the sqlite connection shared by [`ArtifactStore`] and [`ErrorStore`],
/// and the data-directory root shared with [`WorkspaceStore`].
#[derive(Clone)]
pub struct Store {
    db: Arc<Mutex<rusqlite::Connection>>,
    data_dir: std::path::PathBuf,
}

impl Store {
    /// Opens (creating if absent) `<data_dir>/store.sqlite3` and runs schema
    /// migrations. `data_dir` is also the root for [`WorkspaceStore`]'s
    /// scratchpad directories.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let data_dir = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .map_err(|e| StoreError::Storage(format!("create data dir: {e}")))?;
        let db_path = data_dir.join("store.sqlite3");
        let conn =
            rusqlite::Connection::open(&db_path).map_err(|e| StoreError::Storage(e.to_string()))?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS artifacts (
                id TEXT PRIMARY KEY,
                content BLOB NOT NULL,
                content_type TEXT,
                created_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS errors (
                id TEXT PRIMARY KEY,
                agent TEXT NOT NULL,
                session TEXT NOT NULL,
                turn INTEGER NOT NULL,
                tool TEXT,
                kind TEXT NOT NULL,
                message TEXT NOT NULL,
                stack TEXT,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_errors_agent_session ON errors(agent, session);
            "#,
        )
        .map_err(|e| StoreError::Storage(e.to_string()))?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
            data_dir,
        })
    }

    pub fn artifacts(&self) -> ArtifactStore {
        ArtifactStore::new(self.db.clone())
    }

    pub fn errors(&self) -> ErrorStore {
        ErrorStore::new(self.db.clone())
    }

    pub fn workspace(&self) -> WorkspaceStore {
        WorkspaceStore::new(self.data_dir.join("scratchpad"))
    }
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_creates_schema_and_substores_share_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let id = store
            .artifacts()
            .put(b"hello".to_vec(), Some("text/plain".to_string()))
            .await
            .unwrap();
        let fetched = store.artifacts().get(&id).await.unwrap();
        assert_eq!(fetched, Some(b"hello".to_vec()));
    }
}
