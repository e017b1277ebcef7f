//! Namespaced shared memory: key/value
//! storage scoped per namespace with TTL expiry, used for blackboard-style
//! coordination between agents rather than direct messaging.
//!
//! Contract: `Write(ns, key, value, ttl)`, `Read(ns, key) -> (value, found)`,
//! `Delete(ns, key)`, `Stats()`. A value larger than
//! [`AUTO_PROMOTE_THRESHOLD_BYTES`] is auto-promoted: the namespace stores a
//! [`super::reference_store::ReferenceHandle`] instead of the raw bytes,
//! unless [`ReferencePolicy`] for that namespace overrides the default.
//! Grounded in `crate::store`'s in-process `DashMap` usage
//! (`agent::Agent.sessions`) for the hot path, with sqlite behind it for the
//! reference blobs.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;

use super::bus::{PolicyManager, ReferencePolicy};
use super::error::CommError;
use super::reference_store::{ReferenceHandle, ReferenceStore};

/// Values at or above this size are auto-promoted to the reference store
///, unless overridden.
pub const AUTO_PROMOTE_THRESHOLD_BYTES: usize = 32 * 1024;

#[derive(Clone, Debug)]
enum StoredValue {
    Inline(serde_json::Value),
    Reference(ReferenceHandle),
}

struct Entry {
    value: StoredValue,
    expires_at: Option<Instant>,
}

#[derive(Default, Clone, Copy, Debug)]
pub struct SharedMemoryStats {
    pub namespace_count: usize,
    pub key_count: usize,
    pub reference_count: usize,
}

/// Namespaced, TTL-expiring key/value store with large-value promotion.
pub struct SharedMemoryStore {
    namespaces: DashMap<String, DashMap<String, Entry>>,
    references: ReferenceStore,
    policy: Arc<PolicyManager>,
}

impl SharedMemoryStore {
    pub fn new(db: Arc<Mutex<rusqlite::Connection>>, policy: Arc<PolicyManager>) -> Result<Self, CommError> {
        Ok(Self {
            namespaces: DashMap::new(),
            references: ReferenceStore::new(db)?,
            policy,
        })
    }

    /// Writes `value` under `(namespace, key)`. `ttl` of `None` means no
    /// expiry.
    pub fn write(
        &self,
        namespace: &str,
        key: &str,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> Result<(), CommError> {
        let stored = self.maybe_promote(namespace, &value)?;
        let expires_at = ttl.map(|d| Instant::now() + d);
        let ns = self
            .namespaces
            .entry(namespace.to_string())
            .or_insert_with(DashMap::new);
        ns.insert(
            key.to_string(),
            Entry {
                value: stored,
                expires_at,
            },
        );
        Ok(())
    }

    /// Reads `(namespace, key)`. Returns `(value, found)`: a missing or
    /// expired key yields `(Null, false)` rather than an error.
    pub fn read(&self, namespace: &str, key: &str) -> Result<(serde_json::Value, bool), CommError> {
        let Some(ns) = self.namespaces.get(namespace) else {
            return Ok((serde_json::Value::Null, false));
        };
        let Some(entry) = ns.get(key) else {
            return Ok((serde_json::Value::Null, false));
        };
        if let Some(expires_at) = entry.expires_at {
            if Instant::now() >= expires_at {
                drop(entry);
                ns.remove(key);
                return Ok((serde_json::Value::Null, false));
            }
        }
        match &entry.value {
            StoredValue::Inline(v) => Ok((v.clone(), true)),
            StoredValue::Reference(handle) => {
                let bytes = self.references.get(handle)?;
                let value: serde_json::Value = serde_json::from_slice(&bytes)
                    .map_err(|e| CommError::Serialization(e.to_string()))?;
                Ok((value, true))
            }
        }
    }

    pub fn delete(&self, namespace: &str, key: &str) -> Result<(), CommError> {
        if let Some(ns) = self.namespaces.get(namespace) {
            ns.remove(key);
        }
        Ok(())
    }

    /// Sweeps expired entries and reports current occupancy.
    pub fn stats(&self) -> SharedMemoryStats {
        let now = Instant::now();
        let mut key_count = 0;
        let mut reference_count = 0;
        for ns in self.namespaces.iter() {
            ns.value().retain(|_, e| e.expires_at.map(|t| now < t).unwrap_or(true));
            key_count += ns.value().len();
            reference_count += ns
                .value()
                .iter()
                .filter(|e| matches!(e.value().value, StoredValue::Reference(_)))
                .count();
        }
        SharedMemoryStats {
            namespace_count: self.namespaces.len(),
            key_count,
            reference_count,
        }
    }

    fn maybe_promote(&self, namespace: &str, value: &serde_json::Value) -> Result<StoredValue, CommError> {
        let policy = self.policy.policy_for(namespace);
        let serialized = serde_json::to_vec(value).map_err(|e| CommError::Serialization(e.to_string()))?;
        let should_promote = match policy {
            ReferencePolicy::AlwaysReference => true,
            ReferencePolicy::AlwaysValue => false,
            ReferencePolicy::Auto => serialized.len() >= AUTO_PROMOTE_THRESHOLD_BYTES,
        };
        if should_promote {
            Ok(StoredValue::Reference(self.references.put(&serialized)?))
        } else {
            Ok(StoredValue::Inline(value.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SharedMemoryStore {
        let db = Arc::new(Mutex::new(rusqlite::Connection::open(":memory:").unwrap()));
        SharedMemoryStore::new(db, Arc::new(PolicyManager::new())).unwrap()
    }

    #[test]
    fn write_then_read_round_trips() {
        let s = store();
        s.write("ns", "k", serde_json::json!({"a": 1}), None).unwrap();
        let (value, found) = s.read("ns", "k").unwrap();
        assert!(found);
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn missing_key_reports_not_found() {
        let s = store();
        let (value, found) = s.read("ns", "missing").unwrap();
        assert!(!found);
        assert_eq!(value, serde_json::Value::Null);
    }

    #[test]
    fn ttl_expires_entry() {
        let s = store();
        s.write("ns", "k", serde_json::json!(1), Some(Duration::from_millis(0)))
            .unwrap();
        std::thread::sleep(Duration::from_millis(5));
        let (_, found) = s.read("ns", "k").unwrap();
        assert!(!found);
    }

    #[test]
    fn large_value_is_auto_promoted_and_still_readable() {
        let s = store();
        let big = serde_json::json!({"blob": "x".repeat(AUTO_PROMOTE_THRESHOLD_BYTES + 10)});
        s.write("ns", "big", big.clone(), None).unwrap();
        let (value, found) = s.read("ns", "big").unwrap();
        assert!(found);
        assert_eq!(value, big);
        assert_eq!(s.stats().reference_count, 1);
    }

    #[test]
    fn always_reference_policy_promotes_small_values() {
        let s = store();
        s.policy.set_namespace_policy("ns", ReferencePolicy::AlwaysReference);
        s.write("ns", "k", serde_json::json!(1), None).unwrap();
        assert_eq!(s.stats().reference_count, 1);
    }

    #[test]
    fn delete_removes_key() {
        let s = store();
        s.write("ns", "k", serde_json::json!(1), None).unwrap();
        s.delete("ns", "k").unwrap();
        let (_, found) = s.read("ns", "k").unwrap();
        assert!(!found);
    }
}
