//! Append-only error log.
//!
//! Every exception raised by a tool or the turn loop is recorded here;
//! agents expose a built-in `get_error_details(id)` tool (see
//! `crate::tools::builtin::get_error_details`) so the LLM can introspect its
//! own failures on the next turn.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use super::{now_ms, StoreError};

/// One recorded failure, looked up by id from `get_error_details`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub id: String,
    pub agent: String,
    pub session: String,
    pub turn: u64,
    pub tool: Option<String>,
    pub kind: String,
    pub message: String,
    pub stack: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub created_at_ms: i64,
}

pub struct ErrorStore {
    db: Arc<Mutex<rusqlite::Connection>>,
}

impl ErrorStore {
    pub(super) fn new(db: Arc<Mutex<rusqlite::Connection>>) -> Self {
        Self { db }
    }

    /// Records a failure and returns its generated id.
    pub async fn record(
        &self,
        agent: &str,
        session: &str,
        turn: u64,
        tool: Option<&str>,
        kind: &str,
        message: &str,
        stack: Option<&str>,
    ) -> Result<String, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        let db = self.db.clone();
        let (agent, session, tool, kind, message, stack) = (
            agent.to_string(),
            session.to_string(),
            tool.map(str::to_string),
            kind.to_string(),
            message.to_string(),
            stack.map(str::to_string),
        );
        let id_owned = id.clone();
        tokio::task::block_in_place(move || {
            let conn = db.lock().map_err(|_| StoreError::Storage("lock poisoned".into()))?;
            conn.execute(
                "INSERT INTO errors (id, agent, session, turn, tool, kind, message, stack, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![id_owned, agent, session, turn as i64, tool, kind, message, stack, now_ms()],
            )
            .map_err(|e| StoreError::Storage(e.to_string()))?;
            Ok(())
        })?;
        Ok(id)
    }

    /// Fetches one record by id, the backing of `get_error_details`.
    pub async fn get(&self, id: &str) -> Result<Option<ErrorRecord>, StoreError> {
        let db = self.db.clone();
        let id = id.to_string();
        tokio::task::block_in_place(move || {
            let conn = db.lock().map_err(|_| StoreError::Storage("lock poisoned".into()))?;
            conn.query_row(
                "SELECT id, agent, session, turn, tool, kind, message, stack, created_at FROM errors WHERE id = ?1",
                rusqlite::params![id],
                row_to_record,
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(StoreError::Storage(other.to_string())),
            })
        })
    }

    /// Most recent failures for one session, newest first.
    pub async fn list_recent(&self, session: &str, limit: u32) -> Result<Vec<ErrorRecord>, StoreError> {
        let db = self.db.clone();
        let session = session.to_string();
        tokio::task::block_in_place(move || {
            let conn = db.lock().map_err(|_| StoreError::Storage("lock poisoned".into()))?;
            let mut stmt = conn
                .prepare(
                    "SELECT id, agent, session, turn, tool, kind, message, stack, created_at
                     FROM errors WHERE session = ?1 ORDER BY created_at DESC LIMIT ?2",
                )
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            let rows = stmt
                .query_map(rusqlite::params![session, limit], row_to_record)
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(|e| StoreError::Storage(e.to_string()))
        })
    }
}

fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<ErrorRecord> {
    let turn: i64 = row.get(3)?;
    Ok(ErrorRecord {
        id: row.get(0)?,
        agent: row.get(1)?,
        session: row.get(2)?,
        turn: turn as u64,
        tool: row.get(4)?,
        kind: row.get(5)?,
        message: row.get(6)?,
        stack: row.get(7)?,
        created_at_ms: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::super::Store;

    #[tokio::test]
    async fn record_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let errors = store.errors();
        let id = errors
            .record("coder", "sess-1", 3, Some("bash"), "tool_failed", "exit 1", None)
            .await
            .unwrap();
        let record = errors.get(&id).await.unwrap().unwrap();
        assert_eq!(record.tool.as_deref(), Some("bash"));
        assert_eq!(record.turn, 3);
    }

    #[tokio::test]
    async fn list_recent_orders_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let errors = store.errors();
        errors.record("a", "s", 1, None, "k", "first", None).await.unwrap();
        errors.record("a", "s", 2, None, "k", "second", None).await.unwrap();
        let recent = errors.list_recent("s", 10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].message, "second");
    }
}
