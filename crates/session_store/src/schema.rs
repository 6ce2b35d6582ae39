use std::collections::{BTreeMap, HashSet};
use std::fmt;

use chat_provider::Message;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SessionStoreError;

/// Compound `(message id, part index)` identifier of one timed segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DurationKey {
    pub message_id: String,
    pub part_index: usize,
}

impl DurationKey {
    #[must_use]
    pub fn new(message_id: impl Into<String>, part_index: usize) -> Self {
        Self {
            message_id: message_id.into(),
            part_index,
        }
    }
}

impl fmt::Display for DurationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.message_id, self.part_index)
    }
}

/// Milliseconds per segment, keyed by the rendered [`DurationKey`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DurationMap(BTreeMap<String, u64>);

impl DurationMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Upserts the value for `key`; returns the previous value.
    pub fn record(&mut self, key: &DurationKey, millis: u64) -> Option<u64> {
        self.0.insert(key.to_string(), millis)
    }

    #[must_use]
    pub fn get(&self, key: &DurationKey) -> Option<u64> {
        self.0.get(&key.to_string()).copied()
    }

    #[must_use]
    pub fn get_raw(&self, key: &str) -> Option<u64> {
        self.0.get(key).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(key, millis)| (key.as_str(), *millis))
    }
}

impl<K: Into<String>> FromIterator<(K, u64)> for DurationMap {
    fn from_iter<I: IntoIterator<Item = (K, u64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(key, millis)| (key.into(), millis)).collect())
    }
}

/// The unit of persistence: transcript and durations written together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    #[serde(rename = "messages")]
    pub transcript: Vec<Message>,
    pub durations: DurationMap,
}

impl Snapshot {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transcript.is_empty() && self.durations.is_empty()
    }

    #[must_use]
    pub fn message(&self, message_id: &str) -> Option<&Message> {
        self.transcript
            .iter()
            .find(|message| message.id == message_id)
    }
}

/// What lenient decoding had to discard or default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeReport {
    pub defaulted_fields: Vec<&'static str>,
    pub dropped_messages: usize,
    pub dropped_durations: usize,
}

impl DecodeReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.defaulted_fields.is_empty() && self.dropped_messages == 0 && self.dropped_durations == 0
    }
}

pub fn encode_snapshot(key: &str, snapshot: &Snapshot) -> Result<String, SessionStoreError> {
    serde_json::to_string(snapshot).map_err(|source| SessionStoreError::serialize(key, source))
}

/// Decodes a stored value, keeping every well-formed record.
///
/// Only an unparsable value or a non-object top level is an error. Absent or
/// mistyped `messages`/`durations` default to empty independently; malformed
/// or duplicate messages and non-integer durations are dropped one by one.
/// Unknown fields are ignored.
pub fn decode_snapshot(key: &str, raw: &str) -> Result<(Snapshot, DecodeReport), SessionStoreError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|source| SessionStoreError::malformed(key, source))?;
    let Value::Object(mut object) = value else {
        return Err(SessionStoreError::NotAnObject {
            key: key.to_string(),
        });
    };

    let mut report = DecodeReport::default();
    let transcript = decode_messages(object.remove("messages"), &mut report);
    let durations = decode_durations(object.remove("durations"), &mut report);

    Ok((
        Snapshot {
            transcript,
            durations,
        },
        report,
    ))
}

fn decode_messages(field: Option<Value>, report: &mut DecodeReport) -> Vec<Message> {
    let items = match field {
        Some(Value::Array(items)) => items,
        Some(_) => {
            report.defaulted_fields.push("messages");
            return Vec::new();
        }
        None => return Vec::new(),
    };

    let mut seen_ids = HashSet::new();
    let mut messages = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value::<Message>(item) {
            Ok(message) if !message.id.is_empty() && seen_ids.insert(message.id.clone()) => {
                messages.push(message);
            }
            _ => report.dropped_messages += 1,
        }
    }
    messages
}

fn decode_durations(field: Option<Value>, report: &mut DecodeReport) -> DurationMap {
    let entries: Map<String, Value> = match field {
        Some(Value::Object(entries)) => entries,
        Some(_) => {
            report.defaulted_fields.push("durations");
            return DurationMap::new();
        }
        None => return DurationMap::new(),
    };

    let mut durations = BTreeMap::new();
    for (key, value) in entries {
        match value.as_u64() {
            Some(millis) => {
                durations.insert(key, millis);
            }
            None => report.dropped_durations += 1,
        }
    }
    DurationMap(durations)
}
