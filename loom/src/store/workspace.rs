//! Per-agent scratchpad directory: a plain-file scratch area at
//! `$DATA_DIR/scratchpad/<agent_id>/`, modeled on the file tool set
//! (`tools/file/read_file.rs`, `write_file.rs`, `ls.rs`) but scoped so one
//! agent can never read or write outside its own directory.

use std::path::{Path, PathBuf};

use super::StoreError;

pub struct WorkspaceStore {
    root: PathBuf,
}

impl WorkspaceStore {
    pub(super) fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Ensures and returns `<root>/<agent_id>/`.
    pub async fn scratch_dir(&self, agent_id: &str) -> Result<PathBuf, StoreError> {
        let dir = self.agent_dir(agent_id)?;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        Ok(dir)
    }

    pub async fn write_file(&self, agent_id: &str, rel_path: &str, content: &[u8]) -> Result<(), StoreError> {
        let path = self.resolve(agent_id, rel_path)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Storage(e.to_string()))?;
        }
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))
    }

    pub async fn read_file(&self, agent_id: &str, rel_path: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.resolve(agent_id, rel_path)?;
        tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StoreError::NotFound(rel_path.to_string()),
            _ => StoreError::Storage(e.to_string()),
        })
    }

    pub async fn list_files(&self, agent_id: &str) -> Result<Vec<String>, StoreError> {
        let dir = self.scratch_dir(agent_id).await?;
        let mut out = Vec::new();
        let mut stack = vec![dir.clone()];
        while let Some(current) = stack.pop() {
            let mut read_dir = tokio::fs::read_dir(&current)
                .await
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            while let Some(entry) = read_dir
                .next_entry()
                .await
                .map_err(|e| StoreError::Storage(e.to_string()))?
            {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else if let Ok(rel) = path.strip_prefix(&dir) {
                    out.push(rel.to_string_lossy().to_string());
                }
            }
        }
        out.sort();
        Ok(out)
    }

    fn agent_dir(&self, agent_id: &str) -> Result<PathBuf, StoreError> {
        if agent_id.is_empty() || agent_id.contains(['/', '\\', '.']) {
            return Err(StoreError::Storage(format!("invalid agent id: {agent_id}")));
        }
        Ok(self.root.join(agent_id))
    }

    /// Resolves `rel_path` under the agent's scratch directory, rejecting
    /// any path that would escape it (`..` components, absolute paths).
    fn resolve(&self, agent_id: &str, rel_path: &str) -> Result<PathBuf, StoreError> {
        let base = self.agent_dir(agent_id)?;
        let candidate = Path::new(rel_path);
        if candidate.is_absolute() || candidate.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
            return Err(StoreError::Storage(format!("path escapes scratchpad: {rel_path}")));
        }
        Ok(base.join(candidate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = WorkspaceStore::new(dir.path().to_path_buf());
        store.write_file("coder", "notes.txt", b"hello").await.unwrap();
        assert_eq!(store.read_file("coder", "notes.txt").await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = WorkspaceStore::new(dir.path().to_path_buf());
        let err = store.write_file("coder", "../../etc/passwd", b"x").await.unwrap_err();
        assert!(matches!(err, StoreError::Storage(_)));
    }

    #[tokio::test]
    async fn list_files_is_scoped_per_agent() {
        let dir = tempfile::tempdir().unwrap();
        let store = WorkspaceStore::new(dir.path().to_path_buf());
        store.write_file("a", "x.txt", b"1").await.unwrap();
        store.write_file("b", "y.txt", b"2").await.unwrap();
        assert_eq!(store.list_files("a").await.unwrap(), vec!["x.txt".to_string()]);
    }
}
