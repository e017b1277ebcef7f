//! Tool name sanitization for upstream providers.
//!
//! Provider wire formats restrict tool names to `[A-Za-z0-9_-]+`. Loom's own
//! tool names may contain `:` (e.g. MCP-namespaced tools like
//! `github:create_issue`); colons are rewritten to underscores on the way
//! out and the original name is restored on the response path via a small
//! reverse map built alongside the request.

use std::collections::HashMap;

/// Sanitizes one tool name for the wire: `:` becomes `_`, and any character
/// outside `[A-Za-z0-9_-]` is also rewritten to `_`.
pub fn sanitize_tool_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Reverse map from sanitized name back to the original, built once per
/// request from the tool list sent upstream.
#[derive(Default, Clone, Debug)]
pub struct ToolNameMap {
    reverse: HashMap<String, String>,
}

impl ToolNameMap {
    pub fn build<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut reverse = HashMap::new();
        for name in names {
            reverse.insert(sanitize_tool_name(name), name.to_string());
        }
        Self { reverse }
    }

    pub fn restore(&self, sanitized: &str) -> String {
        self.reverse
            .get(sanitized)
            .cloned()
            .unwrap_or_else(|| sanitized.to_string())
    }
}

/// Convenience free function mirroring [`ToolNameMap::restore`] for callers
/// that only have the map, not a `ToolNameMap` method receiver handy.
pub fn restore_tool_name(map: &ToolNameMap, sanitized: &str) -> String {
    map.restore(sanitized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colon_becomes_underscore() {
        assert_eq!(sanitize_tool_name("github:create_issue"), "github_create_issue");
    }

    #[test]
    fn round_trips_through_map() {
        let map = ToolNameMap::build(["github:create_issue", "shell.run"]);
        assert_eq!(map.restore("github_create_issue"), "github:create_issue");
        assert_eq!(map.restore("shell_run"), "shell.run");
    }

    #[test]
    fn unknown_sanitized_name_passes_through() {
        let map = ToolNameMap::build(["a"]);
        assert_eq!(map.restore("never_registered"), "never_registered");
    }
}
