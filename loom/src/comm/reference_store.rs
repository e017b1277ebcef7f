//! Blob storage backing auto-promoted [`super::shared_memory::SharedMemoryStore`]
//! values.
//!
//! Uses the same content-addressed sha256 scheme as
//! `crate::store::artifact::ArtifactStore`: the same dedup-by-hash approach
//! applies here, since two agents writing the same large blob to shared
//! memory should not double-store it.

use std::sync::{Arc, Mutex};

use sha2::{Digest, Sha256};

use super::error::CommError;

/// Opaque handle returned in place of a value too large to inline.
/// Round-trips back to the original bytes via [`ReferenceStore::get`].
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ReferenceHandle {
    pub hash: String,
    pub size: usize,
}

/// Content-addressed store for oversized shared-memory payloads.
pub struct ReferenceStore {
    db: Arc<Mutex<rusqlite::Connection>>,
}

impl ReferenceStore {
    pub fn new(db: Arc<Mutex<rusqlite::Connection>>) -> Result<Self, CommError> {
        db.lock()
            .unwrap()
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS comm_references (
                    hash TEXT PRIMARY KEY,
                    bytes BLOB NOT NULL,
                    size INTEGER NOT NULL
                );
                "#,
            )
            .map_err(|e| CommError::Storage(e.to_string()))?;
        Ok(Self { db })
    }

    pub fn put(&self, bytes: &[u8]) -> Result<ReferenceHandle, CommError> {
        let hash = hash_id(bytes);
        let conn = self.db.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO comm_references (hash, bytes, size) VALUES (?1, ?2, ?3)",
            rusqlite::params![hash, bytes, bytes.len() as i64],
        )
        .map_err(|e| CommError::Storage(e.to_string()))?;
        Ok(ReferenceHandle {
            hash,
            size: bytes.len(),
        })
    }

    pub fn get(&self, handle: &ReferenceHandle) -> Result<Vec<u8>, CommError> {
        let conn = self.db.lock().unwrap();
        conn.query_row(
            "SELECT bytes FROM comm_references WHERE hash = ?1",
            rusqlite::params![handle.hash],
            |row| row.get::<_, Vec<u8>>(0),
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                CommError::Storage(format!("reference not found: {}", handle.hash))
            }
            other => CommError::Storage(other.to_string()),
        })
    }
}

fn hash_id(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Arc<Mutex<rusqlite::Connection>> {
        Arc::new(Mutex::new(rusqlite::Connection::open(":memory:").unwrap()))
    }

    #[test]
    fn put_then_get_round_trips() {
        let store = ReferenceStore::new(conn()).unwrap();
        let handle = store.put(b"hello world").unwrap();
        assert_eq!(store.get(&handle).unwrap(), b"hello world");
    }

    #[test]
    fn identical_bytes_dedup_to_same_hash() {
        let store = ReferenceStore::new(conn()).unwrap();
        let a = store.put(b"same").unwrap();
        let b = store.put(b"same").unwrap();
        assert_eq!(a.hash, b.hash);
    }
}
