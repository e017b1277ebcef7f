//! Durable point-to-point message queue.
//!
//! Messages addressed to a recipient agent id are persisted to sqlite and
//! consumed with at-least-once semantics: `Dequeue` returns the oldest
//! unacked message for that recipient but does not delete it until `Ack`
//! confirms it. Uses the same
//! `Arc<Mutex<rusqlite::Connection>>` + `block_in_place` pattern as
//! `crate::store` and `crate::memory::sqlite_checkpoint`.
//!
//! A background monitor (here, one [`tokio::sync::Notify`] per recipient)
//! wakes a blocked `Dequeue` as soon as a message is enqueued for it,
//! rather than polling.

use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use super::error::CommError;

/// Rejects enqueues addressed to an agent id the server does not know about.
pub type AgentValidator = Arc<dyn Fn(&str) -> bool + Send + Sync>;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueuedMessage {
    pub id: String,
    pub to: String,
    pub from: String,
    pub payload: serde_json::Value,
    pub enqueued_at_ms: i64,
}

struct Inner {
    db: Mutex<rusqlite::Connection>,
    validator: Mutex<Option<AgentValidator>>,
    notifiers: DashMap<String, Arc<Notify>>,
}

/// Durable, FIFO-per-recipient, at-least-once message queue.
#[derive(Clone)]
pub struct MessageQueue {
    inner: Arc<Inner>,
}

impl MessageQueue {
    /// Opens (creating if absent) a sqlite-backed queue at `path`. `:memory:`
    /// is accepted for tests and ephemeral servers.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, CommError> {
        let conn = rusqlite::Connection::open(path.as_ref())
            .map_err(|e| CommError::Storage(e.to_string()))?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS queue_messages (
                id TEXT PRIMARY KEY,
                recipient TEXT NOT NULL,
                sender TEXT NOT NULL,
                payload TEXT NOT NULL,
                enqueued_at INTEGER NOT NULL,
                acked INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_queue_recipient
                ON queue_messages(recipient, acked, enqueued_at);
            "#,
        )
        .map_err(|e| CommError::Storage(e.to_string()))?;
        Ok(Self {
            inner: Arc::new(Inner {
                db: Mutex::new(conn),
                validator: Mutex::new(None),
                notifiers: DashMap::new(),
            }),
        })
    }

    pub fn in_memory() -> Result<Self, CommError> {
        Self::open(":memory:")
    }

    /// Installs the validator consulted on every `enqueue`.
    pub fn set_agent_validator(&self, validator: AgentValidator) {
        *self.inner.validator.lock().unwrap() = Some(validator);
    }

    /// Persists a message addressed to `to` and wakes any task blocked in
    /// `dequeue(to, ..)`.
    pub async fn enqueue(
        &self,
        to: &str,
        from: &str,
        payload: serde_json::Value,
    ) -> Result<String, CommError> {
        {
            let validator = self.inner.validator.lock().unwrap();
            if let Some(validator) = validator.as_ref() {
                if !validator(to) {
                    return Err(CommError::UnknownRecipient(to.to_string()));
                }
            }
        }
        let id = uuid::Uuid::new_v4().to_string();
        let inner = Arc::clone(&self.inner);
        let (to_owned, from_owned, id_owned) = (to.to_string(), from.to_string(), id.clone());
        let payload_text = payload.to_string();
        tokio::task::block_in_place(move || {
            let conn = inner.db.lock().unwrap();
            conn.execute(
                "INSERT INTO queue_messages (id, recipient, sender, payload, enqueued_at, acked)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0)",
                rusqlite::params![id_owned, to_owned, from_owned, payload_text, now_ms()],
            )
            .map_err(|e| CommError::Storage(e.to_string()))
        })?;
        self.notifier_for(to).notify_one();
        Ok(id)
    }

    /// Returns the oldest unacked message for `agent`, blocking until one
    /// arrives or `cancel` fires.
    pub async fn dequeue(
        &self,
        agent: &str,
        cancel: tokio_util::sync::CancellationToken,
    ) -> Result<QueuedMessage, CommError> {
        loop {
            if let Some(msg) = self.peek_oldest(agent)? {
                return Ok(msg);
            }
            let notified = self.notifier_for(agent).notified();
            tokio::select! {
                _ = notified => continue,
                _ = cancel.cancelled() => return Err(CommError::Closed),
            }
        }
    }

    fn peek_oldest(&self, agent: &str) -> Result<Option<QueuedMessage>, CommError> {
        let conn = self.inner.db.lock().unwrap();
        conn.query_row(
            "SELECT id, recipient, sender, payload, enqueued_at FROM queue_messages
             WHERE recipient = ?1 AND acked = 0 ORDER BY enqueued_at ASC, id ASC LIMIT 1",
            rusqlite::params![agent],
            |row| {
                Ok(QueuedMessage {
                    id: row.get(0)?,
                    to: row.get(1)?,
                    from: row.get(2)?,
                    payload: serde_json::from_str(&row.get::<_, String>(3)?)
                        .unwrap_or(serde_json::Value::Null),
                    enqueued_at_ms: row.get(4)?,
                })
            },
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(CommError::Storage(other.to_string())),
        })
    }

    /// Marks `msg_id` as consumed. At-least-once: a crash between `dequeue`
    /// and `ack` redelivers the same message.
    pub async fn ack(&self, msg_id: &str) -> Result<(), CommError> {
        let inner = Arc::clone(&self.inner);
        let msg_id = msg_id.to_string();
        tokio::task::block_in_place(move || {
            let conn = inner.db.lock().unwrap();
            conn.execute(
                "UPDATE queue_messages SET acked = 1 WHERE id = ?1",
                rusqlite::params![msg_id],
            )
            .map_err(|e| CommError::Storage(e.to_string()))
        })?;
        Ok(())
    }

    /// Count of unacked messages waiting for `agent` (used by the
    /// background-monitor-equivalent polling in tests and by diagnostics).
    pub fn pending_count(&self, agent: &str) -> Result<u64, CommError> {
        let conn = self.inner.db.lock().unwrap();
        conn.query_row(
            "SELECT COUNT(*) FROM queue_messages WHERE recipient = ?1 AND acked = 0",
            rusqlite::params![agent],
            |row| row.get::<_, i64>(0),
        )
        .map(|n| n as u64)
        .map_err(|e| CommError::Storage(e.to_string()))
    }

    fn notifier_for(&self, agent: &str) -> Arc<Notify> {
        Arc::clone(
            self.inner
                .notifiers
                .entry(agent.to_string())
                .or_insert_with(|| Arc::new(Notify::new()))
                .value(),
        )
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
    async fn enqueue_then_dequeue_then_ack_round_trips() {
        let queue = MessageQueue::in_memory().unwrap();
        queue.enqueue("bob", "alice", serde_json::json!({"hi": true})).await.unwrap();
        let cancel = tokio_util::sync::CancellationToken::new();
        let msg = queue.dequeue("bob", cancel).await.unwrap();
        assert_eq!(msg.from, "alice");
        assert_eq!(queue.pending_count("bob").unwrap(), 1);
        queue.ack(&msg.id).await.unwrap();
        assert_eq!(queue.pending_count("bob").unwrap(), 0);
    }

    #[tokio::test]
    async fn fifo_per_recipient() {
        let queue = MessageQueue::in_memory().unwrap();
        queue.enqueue("bob", "alice", serde_json::json!(1)).await.unwrap();
        queue.enqueue("bob", "alice", serde_json::json!(2)).await.unwrap();
        let cancel = tokio_util::sync::CancellationToken::new();
        let first = queue.dequeue("bob", cancel.clone()).await.unwrap();
        assert_eq!(first.payload, serde_json::json!(1));
        queue.ack(&first.id).await.unwrap();
        let second = queue.dequeue("bob", cancel).await.unwrap();
        assert_eq!(second.payload, serde_json::json!(2));
    }

    #[tokio::test]
    async fn validator_rejects_unknown_recipient() {
        let queue = MessageQueue::in_memory().unwrap();
        queue.set_agent_validator(Arc::new(|id: &str| id == "bob"));
        let err = queue
            .enqueue("carol", "alice", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, CommError::UnknownRecipient(_)));
    }

    #[tokio::test]
    async fn dequeue_wakes_on_enqueue() {
        let queue = MessageQueue::in_memory().unwrap();
        let cancel = tokio_util::sync::CancellationToken::new();
        let q2 = queue.clone();
        let handle = tokio::spawn(async move { q2.dequeue("bob", cancel).await });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        queue.enqueue("bob", "alice", serde_json::json!("hi")).await.unwrap();
        let msg = handle.await.unwrap().unwrap();
        assert_eq!(msg.payload, serde_json::json!("hi"));
    }

    #[tokio::test]
    async fn dequeue_returns_closed_on_cancel() {
        let queue = MessageQueue::in_memory().unwrap();
        let cancel = tokio_util::sync::CancellationToken::new();
        let cancel2 = cancel.clone();
        let q2 = queue.clone();
        let handle = tokio::spawn(async move { q2.dequeue("nobody", cancel2).await });
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        cancel.cancel();
        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, CommError::Closed));
    }
}
