//! Pluggable tool search. Embedded inference is a non-goal, so the default
//! implementation is a trivial case-insensitive substring match over name
//! and description; a real deployment can swap in a vector-backed
//! `SearchIndex` without touching [`super::ToolRegistry`].

use super::ToolSpec;

pub trait SearchIndex: Send + Sync {
    /// Returns matching tool names, most relevant first.
    fn search(&self, specs: &[ToolSpec], query: &str) -> Vec<String>;
}

pub struct SubstringIndex;

impl SearchIndex for SubstringIndex {
    fn search(&self, specs: &[ToolSpec], query: &str) -> Vec<String> {
        let query = query.to_lowercase();
        if query.is_empty() {
            return specs.iter().map(|s| s.name.clone()).collect();
        }
        let mut matches: Vec<(bool, String)> = specs
            .iter()
            .filter_map(|s| {
                let name_hit = s.name.to_lowercase().contains(&query);
                let desc_hit = s.description.to_lowercase().contains(&query);
                if name_hit || desc_hit {
                    Some((name_hit, s.name.clone()))
                } else {
                    None
                }
            })
            .collect();
        matches.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        matches.into_iter().map(|(_, name)| name).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(name: &str, description: &str) -> ToolSpec {
        ToolSpec {
            name: name.to_string(),
            description: description.to_string(),
            input_schema: json!({}),
            backend_tag: None,
        }
    }

    #[test]
    fn name_hits_rank_above_description_hits() {
        let specs = vec![
            spec("grep", "search file contents"),
            spec("search_memories", "look through stored memories"),
        ];
        let index = SubstringIndex;
        let results = index.search(&specs, "search");
        assert_eq!(results[0], "search_memories");
    }

    #[test]
    fn empty_query_returns_everything() {
        let specs = vec![spec("a", "x"), spec("b", "y")];
        let index = SubstringIndex;
        assert_eq!(index.search(&specs, "").len(), 2);
    }
}
