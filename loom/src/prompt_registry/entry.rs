//! On-disk prompt file format and in-memory `PromptEntry`.
//!
//! `<root>/<path>/<name>.yaml` holds the `default` variant of key
//! `<path>.<name>` (path separators become dots); `<name>.<variant>.yaml`
//! holds a non-default variant. Each file is YAML frontmatter delimited by
//! `---` markers, followed by a plain-text body.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use super::PromptRegistryError;

/// Frontmatter fields.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PromptMetadata {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub variables: Vec<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// One key, with every variant's raw (pre-interpolation) body text.
#[derive(Clone, Debug, Default)]
pub struct PromptEntry {
    pub key: String,
    pub variants: HashMap<String, String>,
    pub metadata: PromptMetadata,
}

impl PromptEntry {
    pub fn has_default(&self) -> bool {
        self.variants.contains_key("default")
    }
}

/// Splits `---\n<yaml>\n---\n<body>` into `(metadata, body)`. A file with no
/// frontmatter delimiters is treated as a bare body with default metadata.
pub fn parse_frontmatter(raw: &str, path: &Path) -> Result<(PromptMetadata, String), PromptRegistryError> {
    let trimmed = raw.trim_start();
    if let Some(rest) = trimmed.strip_prefix("---") {
        let rest = rest.strip_prefix('\n').unwrap_or(rest);
        if let Some(end) = rest.find("\n---") {
            let yaml = &rest[..end];
            let after = &rest[end + 4..];
            let body = after.strip_prefix('\n').unwrap_or(after);
            let metadata: PromptMetadata = serde_yaml::from_str(yaml).map_err(|e| {
                PromptRegistryError::Parse {
                    path: path.display().to_string(),
                    message: e.to_string(),
                }
            })?;
            return Ok((metadata, body.trim_end().to_string()));
        }
    }
    Ok((PromptMetadata::default(), raw.trim_end().to_string()))
}

/// Converts a filesystem path under `root` to a dotted key, dropping the
/// `.yaml`/`.yml` extension and any `.<variant>` suffix handled separately.
pub fn path_to_key(root: &Path, file_stem_without_variant: &Path) -> String {
    let rel = file_stem_without_variant
        .strip_prefix(root)
        .unwrap_or(file_stem_without_variant);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_frontmatter_and_body() {
        let raw = "---\nversion: \"1\"\nauthor: ada\n---\nHello {{.name}}\n";
        let (meta, body) = parse_frontmatter(raw, Path::new("x.yaml")).unwrap();
        assert_eq!(meta.version.as_deref(), Some("1"));
        assert_eq!(meta.author.as_deref(), Some("ada"));
        assert_eq!(body, "Hello {{.name}}");
    }

    #[test]
    fn bare_body_with_no_frontmatter() {
        let raw = "just a body\n";
        let (meta, body) = parse_frontmatter(raw, Path::new("x.yaml")).unwrap();
        assert!(meta.version.is_none());
        assert_eq!(body, "just a body");
    }
}
