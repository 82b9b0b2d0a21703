//! Probe schedules: timed outbound payloads.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// A schedule entry as written by a caller or read from a schedule file.
///
/// The delay is signed so that negative values can be reported instead of
/// failing to deserialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeSpec {
    /// Milliseconds after the connection opens.
    pub delay_ms: i64,
    /// JSON object with a string `type` field.
    pub payload: Value,
}

impl ProbeSpec {
    pub fn new(delay_ms: i64, payload: Value) -> Self {
        Self { delay_ms, payload }
    }
}

/// A validated probe: a payload and its delay from session open.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeMessage {
    delay: Duration,
    payload: Value,
}

impl ProbeMessage {
    /// # Errors
    ///
    /// `Error::InvalidPayload` if `payload` is not an object with a string
    /// `type` field.
    pub fn new(delay: Duration, payload: Value) -> Result<Self> {
        validate_payload(&payload).map_err(Error::InvalidPayload)?;
        Ok(Self { delay, payload })
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// The payload's `type` discriminant.
    pub fn kind(&self) -> &str {
        self.payload
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }
}

/// Check that `payload` is a JSON object carrying a string `type`.
///
/// # Errors
///
/// A human-readable reason when the payload is rejected.
pub fn validate_payload(payload: &Value) -> std::result::Result<(), String> {
    let Some(object) = payload.as_object() else {
        return Err(format!("payload must be a JSON object, got {}", json_kind(payload)));
    };
    match object.get("type") {
        Some(Value::String(_)) => Ok(()),
        Some(other) => Err(format!("\"type\" must be a string, got {}", json_kind(other))),
        None => Err("payload is missing the \"type\" field".to_string()),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// An ordered, validated sequence of probes.
///
/// Entries keep their declared order. Delays need not be monotonic: the
/// harness fires probes in delay order, breaking ties by position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schedule {
    probes: Vec<ProbeMessage>,
}

impl Schedule {
    /// Validate raw entries.
    ///
    /// # Errors
    ///
    /// `Error::InvalidSchedule` naming the first entry with a negative delay
    /// or a malformed payload.
    pub fn new(specs: impl IntoIterator<Item = ProbeSpec>) -> Result<Self> {
        let probes = specs
            .into_iter()
            .enumerate()
            .map(|(index, spec)| {
                let delay = u64::try_from(spec.delay_ms).map_err(|_| Error::InvalidSchedule {
                    index,
                    reason: format!("negative delay {}ms", spec.delay_ms),
                })?;
                validate_payload(&spec.payload)
                    .map_err(|reason| Error::InvalidSchedule { index, reason })?;
                Ok(ProbeMessage {
                    delay: Duration::from_millis(delay),
                    payload: spec.payload,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { probes })
    }

    /// A schedule that sends nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a JSON array of `{"delay_ms": .., "payload": {..}}` entries.
    ///
    /// # Errors
    ///
    /// `Error::Serialize` for malformed JSON, otherwise as [`Schedule::new`].
    pub fn from_json(json: &str) -> Result<Self> {
        let specs: Vec<ProbeSpec> = serde_json::from_str(json)?;
        Self::new(specs)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ProbeMessage> {
        self.probes.iter()
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }
}

impl From<Vec<ProbeMessage>> for Schedule {
    fn from(probes: Vec<ProbeMessage>) -> Self {
        Self { probes }
    }
}

impl<'a> IntoIterator for &'a Schedule {
    type Item = &'a ProbeMessage;
    type IntoIter = std::slice::Iter<'a, ProbeMessage>;

    fn into_iter(self) -> Self::IntoIter {
        self.probes.iter()
    }
}
