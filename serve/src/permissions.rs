//! Routes a client's `PermissionResponse` back to the `Agent`
//! turn loop suspended on a `Progress::PermissionRequested`'s `respond`
//! sender, keyed by a permission id synthesized when the request was
//! streamed out.
//!
//! Scoped per WebSocket connection: permission ids are only ever meaningful
//! within the run that raised them, so there is no need for a connection-
//! spanning or process-wide table.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

#[derive(Clone, Default)]
pub(crate) struct PendingPermissions {
    inner: Arc<Mutex<HashMap<String, oneshot::Sender<bool>>>>,
}

impl PendingPermissions {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, id: String, respond: oneshot::Sender<bool>) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.insert(id, respond);
        }
    }

    /// Delivers `allow` to the waiting turn loop. Returns `false` if `id` is
    /// unknown (already resolved, timed out, or never raised) or the
    /// receiving end was dropped.
    pub(crate) fn resolve(&self, id: &str, allow: bool) -> bool {
        let sender = match self.inner.lock() {
            Ok(mut guard) => guard.remove(id),
            Err(_) => None,
        };
        match sender {
            Some(tx) => tx.send(allow).is_ok(),
            None => false,
        }
    }
}
