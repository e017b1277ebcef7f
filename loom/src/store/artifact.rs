//! Content-addressed blob store.

use std::sync::{Arc, Mutex};

use sha2::{Digest, Sha256};

use super::{now_ms, StoreError};

pub struct ArtifactStore {
    db: Arc<Mutex<rusqlite::Connection>>,
}

impl ArtifactStore {
    pub(super) fn new(db: Arc<Mutex<rusqlite::Connection>>) -> Self {
        Self { db }
    }

    /// Stores `content` and returns its id (the hex sha256 digest). Storing
    /// the same bytes twice is a no-op and returns the same id.
    pub async fn put(
        &self,
        content: Vec<u8>,
        content_type: Option<String>,
    ) -> Result<String, StoreError> {
        let id = hash_id(&content);
        let db = self.db.clone();
        let id_owned = id.clone();
        tokio::task::block_in_place(move || {
            let conn = db.lock().map_err(|_| StoreError::Storage("lock poisoned".into()))?;
            conn.execute(
                "INSERT OR IGNORE INTO artifacts (id, content, content_type, created_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id_owned, content, content_type, now_ms()],
            )
            .map_err(|e| StoreError::Storage(e.to_string()))?;
            Ok(())
        })?;
        Ok(id)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let db = self.db.clone();
        let id = id.to_string();
        tokio::task::block_in_place(move || {
            let conn = db.lock().map_err(|_| StoreError::Storage("lock poisoned".into()))?;
            conn.query_row(
                "SELECT content FROM artifacts WHERE id = ?1",
                rusqlite::params![id],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(StoreError::Storage(other.to_string())),
            })
        })
    }
}

fn hash_id(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::super::Store;

    #[tokio::test]
    async fn duplicate_content_shares_one_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let artifacts = store.artifacts();
        let id1 = artifacts.put(b"same".to_vec(), None).await.unwrap();
        let id2 = artifacts.put(b"same".to_vec(), None).await.unwrap();
        assert_eq!(id1, id2);
    }

    #[tokio::test]
    async fn missing_id_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        assert_eq!(store.artifacts().get("deadbeef").await.unwrap(), None);
    }
}
