//! Envelope (session_id, event_id) applied to every streamed event.
//! `EnvelopeState` tracks the next event_id for one run and injects the
//! envelope fields into each event on its way out over the websocket.

use crate::event::ProtocolEvent;
use serde_json::Value;

/// Envelope fields merged into every streamed event.
#[derive(Clone, Debug, Default)]
pub struct Envelope {
    /// Session ID; constant within a run.
    pub session_id: Option<String>,
    /// Per-event sequence number; monotonically increasing within a stream.
    pub event_id: Option<u64>,
}

impl Envelope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    pub fn with_event_id(mut self, id: u64) -> Self {
        self.event_id = Some(id);
        self
    }

    /// Merges envelope fields into the given JSON object (top-level only).
    /// Does not overwrite existing keys.
    pub fn inject_into(&self, obj: &mut Value) {
        let Some(obj) = obj.as_object_mut() else {
            return;
        };
        if let Some(ref id) = self.session_id {
            obj.entry("session_id")
                .or_insert_with(|| Value::String(id.clone()));
        }
        if let Some(id) = self.event_id {
            obj.entry("event_id")
                .or_insert_with(|| Value::Number(serde_json::Number::from(id)));
        }
    }
}

/// Envelope state for one run: session_id plus the next event_id to assign.
pub struct EnvelopeState {
    pub session_id: String,
    pub next_event_id: u64,
}

impl EnvelopeState {
    pub fn new(session_id: String) -> Self {
        Self {
            session_id,
            next_event_id: 1,
        }
    }

    /// Injects envelope into the event value and advances `next_event_id`.
    pub fn inject_into(&mut self, value: &mut Value) {
        let env = Envelope::new()
            .with_session_id(&self.session_id)
            .with_event_id(self.next_event_id);
        self.next_event_id += 1;
        env.inject_into(value);
    }

    /// Builds the envelope for a reply that doesn't wrap a `ProtocolEvent`
    /// (e.g. an error frame sent outside the normal event stream).
    pub fn reply_envelope(&self) -> Envelope {
        Envelope::new()
            .with_session_id(&self.session_id)
            .with_event_id(self.next_event_id)
    }
}

/// Converts a protocol event to JSON and injects the envelope using the given state.
/// Returns the final value (type + payload + session_id, event_id).
pub fn to_json(
    event: &ProtocolEvent,
    state: &mut EnvelopeState,
) -> Result<Value, serde_json::Error> {
    let mut value = event.to_value()?;
    state.inject_into(&mut value);
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ProtocolEvent;

    #[test]
    fn envelope_inject() {
        let mut obj = serde_json::json!({"type":"token","text":"hi"});
        let env = Envelope::new().with_session_id("sess-1").with_event_id(1);
        env.inject_into(&mut obj);
        assert_eq!(obj["session_id"], "sess-1");
        assert_eq!(obj["event_id"], 1);
        assert_eq!(obj["type"], "token");
    }

    #[test]
    fn to_json_injects_envelope_and_increments() {
        let ev = ProtocolEvent::Token {
            text: "hi".to_string(),
        };
        let mut state = EnvelopeState::new("run-123".to_string());
        let value = to_json(&ev, &mut state).unwrap();
        assert_eq!(value["type"], "token");
        assert_eq!(value["text"], "hi");
        assert_eq!(value["session_id"], "run-123");
        assert_eq!(value["event_id"], 1);

        let value2 = to_json(&ev, &mut state).unwrap();
        assert_eq!(value2["event_id"], 2);
    }
}
