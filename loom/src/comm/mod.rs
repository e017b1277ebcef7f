//! Communication fabric: the three primitives agents use to
//! coordinate outside of the turn loop's own tool-call/tool-result channel.
//!
//! - [`bus::MessageBus`]: ephemeral, topic-based broadcast (pub/sub).
//! - [`queue::MessageQueue`]: durable, point-to-point, FIFO-per-recipient.
//! - [`shared_memory::SharedMemoryStore`]: namespaced blackboard with TTL
//!   and auto-promotion of large values to [`reference_store::ReferenceStore`].
//!
//! All three share one sqlite connection (durable queue + reference blobs)
//! the same way `crate::store::Store` shares one connection across
//! artifacts and errors.

mod bus;
mod error;
mod queue;
mod reference_store;
mod shared_memory;

pub use bus::{BackpressurePolicy, BusMessage, MessageBus, PolicyManager, ReferencePolicy};
pub use error::CommError;
pub use queue::{AgentValidator, MessageQueue, QueuedMessage};
pub use reference_store::{ReferenceHandle, ReferenceStore};
pub use shared_memory::{SharedMemoryStats, SharedMemoryStore, AUTO_PROMOTE_THRESHOLD_BYTES};

use std::path::Path;
use std::sync::{Arc, Mutex};

/// Bundles the fabric's three primitives behind one handle, wired to a
/// single sqlite file for the durable pieces (queue + references) and an
/// in-process bus for the ephemeral one.
pub struct CommFabric {
    pub bus: Arc<MessageBus>,
    pub queue: MessageQueue,
    pub shared_memory: Arc<SharedMemoryStore>,
    pub policy: Arc<PolicyManager>,
}

impl CommFabric {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, CommError> {
        let path = db_path.as_ref();
        let queue = MessageQueue::open(path)?;
        let policy = Arc::new(PolicyManager::new());
        let shared_db: Arc<Mutex<rusqlite::Connection>> = Arc::new(Mutex::new(
            rusqlite::Connection::open(path).map_err(|e| CommError::Storage(e.to_string()))?,
        ));
        let shared_memory = Arc::new(SharedMemoryStore::new(shared_db, Arc::clone(&policy))?);
        Ok(Self {
            bus: Arc::new(MessageBus::default()),
            queue,
            shared_memory,
            policy,
        })
    }

    pub fn in_memory() -> Result<Self, CommError> {
        Self::open(":memory:")
    }
}
