//! Sqlite-backed checkpoint persistence for [`super::Memory`], modeled on
//! the `memory::sqlite_store` connection-handling pattern (own connection,
//! `spawn_blocking` around the blocking calls).

use std::path::Path;

use crate::message::Message;

use super::error::MemoryError;

pub struct CheckpointStore {
    db_path: std::path::PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, MemoryError> {
        let db_path = path.as_ref().to_path_buf();
        let conn = rusqlite::Connection::open(&db_path).map_err(|e| MemoryError::Storage(e.to_string()))?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS memory_checkpoints (
                session_id TEXT PRIMARY KEY,
                l1 TEXT NOT NULL,
                l2 TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
            [],
        )
        .map_err(|e| MemoryError::Storage(e.to_string()))?;
        Ok(Self { db_path })
    }

    pub async fn save(&self, session_id: &str, l1: &[Message], l2: &[Message]) -> Result<(), MemoryError> {
        let l1_json = serde_json::to_string(l1).map_err(|e| MemoryError::Serialization(e.to_string()))?;
        let l2_json = serde_json::to_string(l2).map_err(|e| MemoryError::Serialization(e.to_string()))?;
        let db_path = self.db_path.clone();
        let session_id = session_id.to_string();
        let now = chrono::Utc::now().timestamp_millis();
        tokio::task::spawn_blocking(move || {
            let conn =
                rusqlite::Connection::open(&db_path).map_err(|e| MemoryError::Storage(e.to_string()))?;
            conn.execute(
                "INSERT INTO memory_checkpoints (session_id, l1, l2, updated_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(session_id) DO UPDATE SET l1 = excluded.l1, l2 = excluded.l2, updated_at = excluded.updated_at",
                rusqlite::params![session_id, l1_json, l2_json, now],
            )
            .map_err(|e| MemoryError::Storage(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| MemoryError::Storage(e.to_string()))?
    }

    pub async fn load(&self, session_id: &str) -> Result<Option<(Vec<Message>, Vec<Message>)>, MemoryError> {
        let db_path = self.db_path.clone();
        let session_id = session_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn =
                rusqlite::Connection::open(&db_path).map_err(|e| MemoryError::Storage(e.to_string()))?;
            let row: rusqlite::Result<(String, String)> = conn.query_row(
                "SELECT l1, l2 FROM memory_checkpoints WHERE session_id = ?1",
                rusqlite::params![session_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            );
            match row {
                Ok((l1_json, l2_json)) => {
                    let l1: Vec<Message> =
                        serde_json::from_str(&l1_json).map_err(|e| MemoryError::Serialization(e.to_string()))?;
                    let l2: Vec<Message> =
                        serde_json::from_str(&l2_json).map_err(|e| MemoryError::Serialization(e.to_string()))?;
                    Ok(Some((l1, l2)))
                }
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(MemoryError::Storage(e.to_string())),
            }
        })
        .await
        .map_err(|e| MemoryError::Storage(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("mem.sqlite3")).unwrap();
        let l1 = vec![Message::user("hi")];
        let l2 = vec![Message::assistant("old")];
        store.save("sess-1", &l1, &l2).await.unwrap();
        let (loaded_l1, loaded_l2) = store.load("sess-1").await.unwrap().unwrap();
        assert_eq!(loaded_l1.len(), 1);
        assert_eq!(loaded_l2.len(), 1);
    }

    #[tokio::test]
    async fn load_missing_session_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("mem.sqlite3")).unwrap();
        assert!(store.load("nope").await.unwrap().is_none());
    }
}
