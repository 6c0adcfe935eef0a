//! Envelope (session_id, run_id, event_id) carried on every outbound event.
//! `EnvelopeState` tracks the current run and injects the envelope into each event.

use crate::event::ProtocolEvent;
use serde_json::Value;

/// Envelope fields attached to every event.
#[derive(Clone, Debug, Default)]
pub struct Envelope {
    /// Session id; constant within a session.
    pub session_id: Option<String>,
    /// Id of the run this event belongs to.
    pub run_id: Option<String>,
    /// Per-event sequence number, monotonically increasing within a run's stream.
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

    pub fn with_run_id(mut self, id: impl Into<String>) -> Self {
        self.run_id = Some(id.into());
        self
    }

    pub fn with_event_id(mut self, id: u64) -> Self {
        self.event_id = Some(id);
        self
    }

    /// Merges envelope fields into the given JSON object. Never overwrites
    /// existing keys.
    pub fn inject_into(&self, obj: &mut Value) {
        let Some(obj) = obj.as_object_mut() else {
            return;
        };
        if let Some(ref id) = self.session_id {
            obj.entry("session_id")
                .or_insert_with(|| Value::String(id.clone()));
        }
        if let Some(ref id) = self.run_id {
            obj.entry("run_id")
                .or_insert_with(|| Value::String(id.clone()));
        }
        if let Some(id) = self.event_id {
            obj.entry("event_id")
                .or_insert_with(|| Value::Number(serde_json::Number::from(id)));
        }
    }
}

/// Envelope state for one run: session id, run id, next event id.
pub struct EnvelopeState {
    pub session_id: String,
    pub run_id: String,
    pub next_event_id: u64,
}

impl EnvelopeState {
    pub fn new(session_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            run_id: run_id.into(),
            next_event_id: 1,
        }
    }

    /// Injects the envelope into the event value and advances the sequence.
    pub fn inject_into(&mut self, value: &mut Value) {
        let env = Envelope::new()
            .with_session_id(&self.session_id)
            .with_run_id(&self.run_id)
            .with_event_id(self.next_event_id);
        self.next_event_id += 1;
        env.inject_into(value);
    }
}

/// Converts a protocol event to JSON and injects the envelope using the given state.
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
    fn envelope_inject_does_not_overwrite_existing_keys() {
        let mut obj = serde_json::json!({"type":"content","delta":"hi","session_id":"existing"});
        let env = Envelope::new()
            .with_session_id("sess-1")
            .with_run_id("run-1")
            .with_event_id(1);
        env.inject_into(&mut obj);
        assert_eq!(obj["session_id"], "existing");
        assert_eq!(obj["run_id"], "run-1");
        assert_eq!(obj["event_id"], 1);
    }

    #[test]
    fn to_json_injects_envelope_and_advances_sequence() {
        let ev = ProtocolEvent::Content {
            delta: "hi".to_string(),
        };
        let mut state = EnvelopeState::new("sess-1", "run-1");
        let first = to_json(&ev, &mut state).unwrap();
        let second = to_json(&ev, &mut state).unwrap();
        assert_eq!(first["event_id"], 1);
        assert_eq!(second["event_id"], 2);
        assert_eq!(first["session_id"], "sess-1");
        assert_eq!(first["run_id"], "run-1");
    }
}
