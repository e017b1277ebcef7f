//! Variant selection strategies.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use rand::Rng;

/// Picks which variant of a prompt key to serve for a given session.
pub trait VariantSelector: Send + Sync {
    /// `available` always contains at least `"default"`. Must return a name
    /// present in `available`.
    fn select(&self, key: &str, session_id: &str, available: &[String]) -> String;
}

/// Always returns the same fixed variant.
pub struct Explicit(pub String);

impl VariantSelector for Explicit {
    fn select(&self, _key: &str, _session_id: &str, available: &[String]) -> String {
        if available.iter().any(|v| v == &self.0) {
            self.0.clone()
        } else {
            "default".to_string()
        }
    }
}

/// Deterministically buckets `session_id ⊕ key` across the available
/// variants — the same session always sees the same variant for a given key.
pub struct Hash_;

impl VariantSelector for Hash_ {
    fn select(&self, key: &str, session_id: &str, available: &[String]) -> String {
        if available.is_empty() {
            return "default".to_string();
        }
        let mut hasher = DefaultHasher::new();
        session_id.hash(&mut hasher);
        key.hash(&mut hasher);
        let idx = (hasher.finish() as usize) % available.len();
        available[idx].clone()
    }
}

/// Picks uniformly at random, seeded once at construction.
pub struct Random {
    seed: u64,
}

impl Random {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }
}

impl VariantSelector for Random {
    fn select(&self, key: &str, _session_id: &str, available: &[String]) -> String {
        if available.is_empty() {
            return "default".to_string();
        }
        let mut hasher = DefaultHasher::new();
        self.seed.hash(&mut hasher);
        key.hash(&mut hasher);
        let mut rng = rand::rngs::StdRng::seed_from_u64(hasher.finish());
        let idx = rng.gen_range(0..available.len());
        available[idx].clone()
    }
}

/// Picks a variant with probability proportional to its integer weight.
pub struct Weighted(pub HashMap<String, u32>);

impl VariantSelector for Weighted {
    fn select(&self, _key: &str, _session_id: &str, available: &[String]) -> String {
        let total: u32 = available
            .iter()
            .filter_map(|v| self.0.get(v))
            .sum();
        if total == 0 {
            return available.first().cloned().unwrap_or_else(|| "default".to_string());
        }
        let mut roll = rand::thread_rng().gen_range(0..total);
        for v in available {
            let w = *self.0.get(v).unwrap_or(&0);
            if roll < w {
                return v.clone();
            }
            roll -= w;
        }
        available.last().cloned().unwrap_or_else(|| "default".to_string())
    }
}

use rand::SeedableRng;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_falls_back_to_default_when_missing() {
        let sel = Explicit("nope".to_string());
        let available = vec!["default".to_string(), "v2".to_string()];
        assert_eq!(sel.select("k", "s1", &available), "default");
    }

    #[test]
    fn hash_is_deterministic_for_the_same_session() {
        let sel = Hash_;
        let available = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let first = sel.select("key", "session-1", &available);
        let second = sel.select("key", "session-1", &available);
        assert_eq!(first, second);
    }

    #[test]
    fn weighted_picks_only_available_variants() {
        let mut weights = HashMap::new();
        weights.insert("a".to_string(), 1);
        weights.insert("b".to_string(), 0);
        let sel = Weighted(weights);
        let available = vec!["a".to_string()];
        assert_eq!(sel.select("k", "s", &available), "a");
    }
}
