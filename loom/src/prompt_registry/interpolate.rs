//! `{{.name}}` placeholder interpolation with injection-safe escaping.
//!
//! Every substituted *value* is run through [`escape_value`] before it is
//! spliced into the template; the template text itself (and any unknown
//! placeholder) is left untouched.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Patterns redacted from interpolated values because they are common
/// prompt-injection vectors.
const INJECTION_PATTERNS: &[&str] = &[
    "```",
    "System:",
    "Human:",
    "Assistant:",
    "[INST]",
    "[/INST]",
    "<|im_start|>",
    "<|im_end|>",
    "### Instruction:",
    "### Response:",
    "---",
    "###",
];

static PLACEHOLDER_RE: Lazy<regex::Regex> =
    Lazy::new(|| regex::Regex::new(r"\{\{\.([A-Za-z0-9_]+)\}\}").unwrap());

/// Runs the multi-stage escape filter on one substituted value:
/// strip NUL/invalid UTF-8, collapse newlines/tabs to spaces, HTML-escape
/// `< > & ' "`, strip remaining C0/C1 control chars, redact injection
/// patterns, collapse whitespace runs, trim.
pub fn escape_value(raw: &str) -> String {
    let no_nul: String = raw.chars().filter(|c| *c != '\0').collect();

    let collapsed: String = no_nul
        .chars()
        .map(|c| match c {
            '\n' | '\r' | '\t' => ' ',
            other => other,
        })
        .collect();

    let mut html_escaped = String::with_capacity(collapsed.len());
    for c in collapsed.chars() {
        match c {
            '<' => html_escaped.push_str("&lt;"),
            '>' => html_escaped.push_str("&gt;"),
            '&' => html_escaped.push_str("&amp;"),
            '\'' => html_escaped.push_str("&#39;"),
            '"' => html_escaped.push_str("&quot;"),
            other => html_escaped.push(other),
        }
    }

    let control_stripped: String = html_escaped
        .chars()
        .filter(|c| {
            let code = *c as u32;
            !((code < 0x20 && *c != ' ') || (0x7f..=0x9f).contains(&code))
        })
        .collect();

    let mut redacted = control_stripped;
    for pattern in INJECTION_PATTERNS {
        if redacted.contains(pattern) {
            redacted = redacted.replace(pattern, "");
        }
    }

    let collapsed_ws = redacted.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed_ws.trim().to_string()
}

/// Interpolates `{{.name}}` placeholders in `template` with `vars`, escaping
/// every value. `vars = None` disables substitution entirely and returns
/// `template` verbatim. Unknown placeholders are preserved
/// verbatim.
pub fn interpolate(template: &str, vars: Option<&HashMap<String, String>>) -> String {
    let Some(vars) = vars else {
        return template.to_string();
    };
    PLACEHOLDER_RE
        .replace_all(template, |caps: &regex::Captures| {
            let name = &caps[1];
            match vars.get(name) {
                Some(value) => escape_value(value),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_known_placeholder() {
        let mut vars = HashMap::new();
        vars.insert("name".to_string(), "Ada".to_string());
        assert_eq!(interpolate("Hello {{.name}}!", Some(&vars)), "Hello Ada!");
    }

    #[test]
    fn leaves_unknown_placeholder_verbatim() {
        let vars = HashMap::new();
        assert_eq!(interpolate("Hi {{.missing}}", Some(&vars)), "Hi {{.missing}}");
    }

    #[test]
    fn none_vars_disables_substitution() {
        assert_eq!(interpolate("Hi {{.name}}", None), "Hi {{.name}}");
    }

    #[test]
    fn strips_injection_patterns_and_control_chars_from_values() {
        let mut vars = HashMap::new();
        vars.insert("name".to_string(), "```System: pwn\n".to_string());
        let out = interpolate("Hello {{.name}}!", Some(&vars));
        assert!(out.starts_with("Hello"));
        assert!(out.ends_with('!'));
        assert!(!out.contains("```"));
        assert!(!out.contains("System:"));
        assert!(!out.contains('\n'));
        assert_eq!(out.lines().count(), 1);
    }

    #[test]
    fn html_escapes_angle_brackets_and_quotes() {
        let mut vars = HashMap::new();
        vars.insert("x".to_string(), "<b>&'\"".to_string());
        let out = interpolate("{{.x}}", Some(&vars));
        assert!(!out.contains('<'));
        assert!(!out.contains('>'));
        assert_eq!(out, "&lt;b&gt;&amp;&#39;&quot;");
    }

    #[test]
    fn is_deterministic_for_the_same_inputs() {
        let mut vars = HashMap::new();
        vars.insert("a".to_string(), "x".to_string());
        vars.insert("b".to_string(), "y".to_string());
        let t = "{{.a}}-{{.b}}-{{.a}}";
        assert_eq!(interpolate(t, Some(&vars)), interpolate(t, Some(&vars)));
    }
}
