//! SQLite-backed user message store. Persistent per-thread message history,
//! distinct from `Memory`'s L1/L2 in-session log: this keeps
//! the full, durable transcript a client can page back through by
//! `thread_id`, using the same `rusqlite` connection-per-call pattern
//! as `crate::store`.

use std::path::Path;

use async_trait::async_trait;
use rusqlite::params;

use crate::message::{Message, Role};
use crate::user_message::{UserMessageStore, UserMessageStoreError};

/// SQLite-backed store: one table `user_messages (id, thread_id, role, content)`.
/// `id` is auto-increment and used as the pagination cursor (`before`).
pub struct SqliteUserMessageStore {
    db_path: std::path::PathBuf,
}

fn role_to_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn str_to_role(role: &str) -> Role {
    match role {
        "system" => Role::System,
        "assistant" => Role::Assistant,
        "tool" => Role::Tool,
        _ => Role::User,
    }
}

impl SqliteUserMessageStore {
    /// Creates the store and ensures the table exists. `path` is the SQLite file path.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, UserMessageStoreError> {
        let db_path = path.as_ref().to_path_buf();
        let conn = rusqlite::Connection::open(&db_path)
            .map_err(|e| UserMessageStoreError::Other(e.to_string()))?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS user_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                thread_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL
            )
            "#,
            [],
        )
        .map_err(|e| UserMessageStoreError::Other(e.to_string()))?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_user_messages_thread_id ON user_messages(thread_id)",
            [],
        )
        .map_err(|e| UserMessageStoreError::Other(e.to_string()))?;
        Ok(Self { db_path })
    }
}

#[async_trait]
impl UserMessageStore for SqliteUserMessageStore {
    async fn append(
        &self,
        thread_id: &str,
        message: &Message,
    ) -> Result<(), UserMessageStoreError> {
        let role = role_to_str(message.role);
        let content = message.content.clone().unwrap_or_default();
        let thread_id = thread_id.to_string();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| UserMessageStoreError::Other(e.to_string()))?;
            conn.execute(
                "INSERT INTO user_messages (thread_id, role, content) VALUES (?1, ?2, ?3)",
                params![thread_id, role, content],
            )
            .map_err(|e| UserMessageStoreError::Other(e.to_string()))?;
            Ok::<(), UserMessageStoreError>(())
        })
        .await
        .map_err(|e| UserMessageStoreError::Other(e.to_string()))?
    }

    async fn list(
        &self,
        thread_id: &str,
        before: Option<u64>,
        limit: Option<u32>,
    ) -> Result<Vec<Message>, UserMessageStoreError> {
        let thread_id = thread_id.to_string();
        let limit = limit.unwrap_or(100).min(1000);
        let db_path = self.db_path.clone();
        let rows: Vec<(String, String)> = tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| UserMessageStoreError::Other(e.to_string()))?;
            let sql = match before {
                Some(_) => "SELECT role, content FROM user_messages WHERE thread_id = ?1 AND id < ?2 ORDER BY id ASC LIMIT ?3",
                None => "SELECT role, content FROM user_messages WHERE thread_id = ?1 ORDER BY id ASC LIMIT ?2",
            };
            let mut stmt = conn.prepare(sql).map_err(|e| UserMessageStoreError::Other(e.to_string()))?;
            let rows = match before {
                Some(b) => stmt.query(params![thread_id, b as i64, limit as i64]),
                None => stmt.query(params![thread_id, limit as i64]),
            }
            .map_err(|e| UserMessageStoreError::Other(e.to_string()))?;
            let mut out = Vec::new();
            let mut rows = rows;
            while let Some(row) = rows.next().map_err(|e| UserMessageStoreError::Other(e.to_string()))? {
                let role: String = row.get(0).map_err(|e| UserMessageStoreError::Other(e.to_string()))?;
                let content: String = row.get(1).map_err(|e| UserMessageStoreError::Other(e.to_string()))?;
                out.push((role, content));
            }
            Ok::<Vec<(String, String)>, UserMessageStoreError>(out)
        })
        .await
        .map_err(|e| UserMessageStoreError::Other(e.to_string()))??;
        Ok(rows
            .into_iter()
            .map(|(role, content)| {
                let role = str_to_role(&role);
                match role {
                    Role::Tool => Message::tool_result(String::new(), content),
                    Role::System => Message::system(content),
                    Role::Assistant => Message::assistant(content),
                    Role::User => Message::user(content),
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn sqlite_append_and_list_order() {
        let file = NamedTempFile::new().unwrap();
        let store = SqliteUserMessageStore::new(file.path()).unwrap();
        store.append("t1", &Message::user("hi")).await.unwrap();
        store.append("t1", &Message::assistant("hello")).await.unwrap();
        store.append("t1", &Message::user("bye")).await.unwrap();
        let msgs = store.list("t1", None, Some(10)).await.unwrap();
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[0].role, Role::User);
        assert_eq!(msgs[0].content.as_deref(), Some("hi"));
        assert_eq!(msgs[1].role, Role::Assistant);
        assert_eq!(msgs[1].content.as_deref(), Some("hello"));
        assert_eq!(msgs[2].content.as_deref(), Some("bye"));
    }

    #[tokio::test]
    async fn sqlite_list_before_and_limit() {
        let file = NamedTempFile::new().unwrap();
        let store = SqliteUserMessageStore::new(file.path()).unwrap();
        for i in 0..5 {
            store.append("t2", &Message::user(format!("m{}", i))).await.unwrap();
        }
        let page1 = store.list("t2", None, Some(2)).await.unwrap();
        assert_eq!(page1.len(), 2);
        let id_before = 3u64; // cursor: next page starts before id 3
        let page2 = store.list("t2", Some(id_before), Some(2)).await.unwrap();
        assert_eq!(page2.len(), 2);
    }
}
