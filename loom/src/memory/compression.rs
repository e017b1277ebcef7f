//! L1/L2 compaction.
//!
//! Moving messages from the L1 working set to the L2 tail must never split
//! a `tool_use` / `tool_result` group: an assistant message carrying tool
//! calls and every tool-result message that answers it move together, or
//! not at all.

use crate::message::Message;

#[derive(Clone, Copy, Debug)]
pub struct CompressionProfile {
    pub max_l1_messages: usize,
    pub warning_threshold_percent: u8,
}

impl Default for CompressionProfile {
    fn default() -> Self {
        Self {
            max_l1_messages: 200,
            warning_threshold_percent: 80,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ContextLimits {
    pub max_context_tokens: usize,
    pub reserved_output_tokens: usize,
}

impl ContextLimits {
    fn warning_budget(&self, warning_threshold_percent: u8) -> usize {
        let usable = self.max_context_tokens.saturating_sub(self.reserved_output_tokens);
        usable * warning_threshold_percent as usize / 100
    }
}

/// Splits `messages` into atomic groups: an assistant `tool_use` message is
/// grouped with every immediately-following `tool_result` message, folding
/// consecutive tool-result messages into their originating assistant turn.
fn atomic_groups(messages: &[Message]) -> Vec<std::ops::Range<usize>> {
    let mut groups = Vec::new();
    let mut i = 0;
    while i < messages.len() {
        let start = i;
        i += 1;
        if messages[start].is_tool_use() {
            while i < messages.len() && messages[i].is_tool_result() {
                i += 1;
            }
        }
        groups.push(start..i);
    }
    groups
}

fn estimated_tokens(messages: &[Message]) -> usize {
    messages.iter().map(Message::estimated_tokens).sum()
}

/// Returns how many leading messages of `l1` should move to L2 so that
/// neither the message-count bound nor the token-budget bound is exceeded,
/// without ever splitting an atomic group. Returns 0 if `l1` is already
/// within bounds.
pub fn overflow_cut(l1: &[Message], profile: &CompressionProfile, limits: &ContextLimits) -> usize {
    let token_budget = limits.warning_budget(profile.warning_threshold_percent);
    let groups = atomic_groups(l1);
    let mut keep_from = 0;
    for (idx, group) in groups.iter().enumerate() {
        let remaining_messages = l1.len() - group.start;
        let remaining_tokens = estimated_tokens(&l1[group.start..]);
        let within_count = remaining_messages <= profile.max_l1_messages;
        let within_tokens = token_budget == 0 || remaining_tokens <= token_budget;
        if within_count && within_tokens {
            keep_from = group.start;
            break;
        }
        if idx + 1 == groups.len() {
            keep_from = group.end;
        }
    }
    keep_from
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ToolCall;

    fn tool_call_msg(id: &str) -> Message {
        Message::assistant_with_tool_calls(
            None,
            vec![ToolCall {
                id: id.to_string(),
                name: "noop".to_string(),
                input: serde_json::json!({}),
            }],
        )
    }

    #[test]
    fn no_cut_when_within_bounds() {
        let l1 = vec![Message::user("hi"), Message::assistant("hello")];
        let profile = CompressionProfile {
            max_l1_messages: 200,
            warning_threshold_percent: 80,
        };
        let limits = ContextLimits {
            max_context_tokens: 100_000,
            reserved_output_tokens: 1_000,
        };
        assert_eq!(overflow_cut(&l1, &profile, &limits), 0);
    }

    #[test]
    fn cuts_oldest_messages_first_when_over_count() {
        let l1: Vec<Message> = (0..5).map(|i| Message::user(format!("m{i}"))).collect();
        let profile = CompressionProfile {
            max_l1_messages: 3,
            warning_threshold_percent: 100,
        };
        let limits = ContextLimits {
            max_context_tokens: 1_000_000,
            reserved_output_tokens: 0,
        };
        let cut = overflow_cut(&l1, &profile, &limits);
        assert_eq!(cut, 2);
    }

    #[test]
    fn never_splits_a_tool_use_tool_result_group() {
        let mut l1 = vec![Message::user("q")];
        l1.push(tool_call_msg("call_1"));
        l1.push(Message::tool_result("call_1", "ok"));
        l1.push(Message::assistant("done"));
        let profile = CompressionProfile {
            max_l1_messages: 2,
            warning_threshold_percent: 100,
        };
        let limits = ContextLimits {
            max_context_tokens: 1_000_000,
            reserved_output_tokens: 0,
        };
        let cut = overflow_cut(&l1, &profile, &limits);
        // Cutting must land on a group boundary, not inside [call, result].
        let groups = atomic_groups(&l1);
        assert!(groups.iter().any(|g| g.start == cut || g.end == cut) || cut == 0);
    }
}
