//! Memory.
//!
//! One `Memory` per agent session: an `L1` working set handed to the LLM
//! verbatim, and a persistent `L2` tail holding whatever overflowed. Backed
//! by a sqlite connection-per-call pattern (see [`sqlite_checkpoint`]) for
//! `Checkpoint()`.

mod compression;
mod error;
mod sqlite_checkpoint;

pub use compression::{CompressionProfile, ContextLimits};
pub use error::MemoryError;
pub use sqlite_checkpoint::CheckpointStore;

use std::sync::Mutex;

use crate::message::Message;

/// Contract: `Append(msg)`; `Messages() → []Message`;
/// `SetCompressionProfile(p)`; `SetContextLimits(max_context,
/// reserved_output)`; `Checkpoint()` to persistence.
///
/// Invariant: messages returned to the provider always start with the
/// (injected, not stored) system message, followed by a contiguous slice of
/// `L1` whose `tool_use`/`tool_result` pairs are complete. No orphaned tool
/// results ever live in `L1` alone.
pub struct Memory {
    session_id: String,
    state: Mutex<State>,
    checkpoints: Option<CheckpointStore>,
}

struct State {
    l1: Vec<Message>,
    l2: Vec<Message>,
    profile: CompressionProfile,
    limits: ContextLimits,
}

impl Memory {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            state: Mutex::new(State {
                l1: Vec::new(),
                l2: Vec::new(),
                profile: CompressionProfile::default(),
                limits: ContextLimits::default(),
            }),
            checkpoints: None,
        }
    }

    pub fn with_checkpoint_store(mut self, store: CheckpointStore) -> Self {
        self.checkpoints = Some(store);
        self
    }

    /// Restores `L1`/`L2` from a prior checkpoint for this session, if one
    /// exists.
    pub async fn restore(&self) -> Result<(), MemoryError> {
        let Some(store) = &self.checkpoints else {
            return Ok(());
        };
        if let Some((l1, l2)) = store.load(&self.session_id).await? {
            let mut state = self.state.lock().unwrap();
            state.l1 = l1;
            state.l2 = l2;
        }
        Ok(())
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn set_compression_profile(&self, profile: CompressionProfile) {
        self.state.lock().unwrap().profile = profile;
    }

    pub fn set_context_limits(&self, limits: ContextLimits) {
        self.state.lock().unwrap().limits = limits;
    }

    /// Appends a message to `L1`, then compacts if the new size overflows
    /// the compression profile's bounds.
    pub fn append(&self, msg: Message) {
        let mut state = self.state.lock().unwrap();
        state.l1.push(msg);
        self.compact_locked(&mut state);
    }

    /// Appends several messages as one batch before compacting once (used
    /// by the agent to append an assistant `tool_use` message and all of
    /// its `tool_result` answers together, preserving the atomic-group
    /// invariant even across the append call itself).
    pub fn append_many(&self, msgs: impl IntoIterator<Item = Message>) {
        let mut state = self.state.lock().unwrap();
        state.l1.extend(msgs);
        self.compact_locked(&mut state);
    }

    fn compact_locked(&self, state: &mut State) {
        let cut = compression::overflow_cut(&state.l1, &state.profile, &state.limits);
        if cut > 0 {
            let moved: Vec<Message> = state.l1.drain(..cut).collect();
            state.l2.extend(moved);
        }
    }

    /// The current `L1` working set, in order — what `Agent::Run` sends to
    /// the provider (with the system prompt injected separately, never
    /// stored here).
    pub fn messages(&self) -> Vec<Message> {
        self.state.lock().unwrap().l1.clone()
    }

    /// The persistent `L2` tail (oldest-first), for inspection or a future
    /// summarization pass.
    pub fn l2_messages(&self) -> Vec<Message> {
        self.state.lock().unwrap().l2.clone()
    }

    pub fn estimated_tokens(&self) -> usize {
        self.state.lock().unwrap().l1.iter().map(Message::estimated_tokens).sum()
    }

    /// Persists the current `L1`/`L2` snapshot (no-op if no checkpoint
    /// store was configured).
    pub async fn checkpoint(&self) -> Result<(), MemoryError> {
        let Some(store) = &self.checkpoints else {
            return Ok(());
        };
        let (l1, l2) = {
            let state = self.state.lock().unwrap();
            (state.l1.clone(), state.l2.clone())
        };
        store.save(&self.session_id, &l1, &l2).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_keeps_messages_in_order() {
        let memory = Memory::new("sess-1");
        memory.append(Message::user("hi"));
        memory.append(Message::assistant("hello"));
        let msgs = memory.messages();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].content.as_deref(), Some("hi"));
    }

    #[test]
    fn append_past_max_l1_messages_moves_oldest_to_l2() {
        let memory = Memory::new("sess-1");
        memory.set_compression_profile(CompressionProfile {
            max_l1_messages: 2,
            warning_threshold_percent: 100,
        });
        memory.set_context_limits(ContextLimits {
            max_context_tokens: 1_000_000,
            reserved_output_tokens: 0,
        });
        for i in 0..5 {
            memory.append(Message::user(format!("m{i}")));
        }
        assert_eq!(memory.messages().len(), 2);
        assert_eq!(memory.l2_messages().len(), 3);
    }

    #[tokio::test]
    async fn checkpoint_then_restore_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("mem.sqlite3")).unwrap();
        let memory = Memory::new("sess-1").with_checkpoint_store(store);
        memory.append(Message::user("hi"));
        memory.checkpoint().await.unwrap();

        let store2 = CheckpointStore::new(dir.path().join("mem.sqlite3")).unwrap();
        let restored = Memory::new("sess-1").with_checkpoint_store(store2);
        restored.restore().await.unwrap();
        assert_eq!(restored.messages().len(), 1);
    }
}
