//! In-memory snapshot state driven by discrete events.
//!
//! Invariants:
//! - message ids are unique within the transcript;
//! - at most one message is in flight, and it is always the last one;
//! - a finalized message (and a sealed part) is never mutated again.

use chat_provider::{Message, Part, StreamChannel};
use session_store::{DurationMap, Snapshot};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    AppendMessage {
        message: Message,
        finalized: bool,
    },
    /// Streams `delta` into part `part_index`, opening the part when it is next in line.
    GrowPart {
        message_id: String,
        part_index: usize,
        channel: StreamChannel,
        delta: String,
    },
    /// Appends or replaces part `part_index` and seals it.
    PutPart {
        message_id: String,
        part_index: usize,
        part: Part,
    },
    FinalizeMessage {
        message_id: String,
    },
    Clear,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("message id is empty")]
    EmptyMessageId,

    #[error("message id '{0}' already exists in the transcript")]
    DuplicateMessageId(String),

    #[error("message '{in_flight}' is still in flight")]
    MessageInFlight { in_flight: String },

    #[error("unknown message '{0}'")]
    UnknownMessage(String),

    #[error("message '{0}' is finalized")]
    MessageFinalized(String),

    #[error("part {part_index} of message '{message_id}' is out of order (message has {len} parts)")]
    PartOutOfOrder {
        message_id: String,
        part_index: usize,
        len: usize,
    },

    #[error("part {part_index} of message '{message_id}' is sealed")]
    PartSealed {
        message_id: String,
        part_index: usize,
    },

    #[error("part {part_index} of message '{message_id}' cannot grow on the {channel:?} channel")]
    ChannelMismatch {
        message_id: String,
        part_index: usize,
        channel: StreamChannel,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct InFlight {
    message_id: String,
    sealed_parts: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotStore {
    snapshot: Snapshot,
    in_flight: Option<InFlight>,
}

impl SnapshotStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a loaded snapshot; every hydrated message counts as finalized.
    #[must_use]
    pub fn hydrated(snapshot: Snapshot) -> Self {
        Self {
            snapshot,
            in_flight: None,
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    #[must_use]
    pub fn transcript(&self) -> &[Message] {
        &self.snapshot.transcript
    }

    #[must_use]
    pub fn durations(&self) -> &DurationMap {
        &self.snapshot.durations
    }

    pub(crate) fn durations_mut(&mut self) -> &mut DurationMap {
        &mut self.snapshot.durations
    }

    /// Returns the message still receiving content, if any.
    #[must_use]
    pub fn in_flight(&self) -> Option<&Message> {
        let in_flight = self.in_flight.as_ref()?;
        self.snapshot
            .transcript
            .last()
            .filter(|message| message.id == in_flight.message_id)
    }

    #[must_use]
    pub fn is_finalized(&self, message_id: &str) -> bool {
        self.snapshot.message(message_id).is_some()
            && self
                .in_flight
                .as_ref()
                .map_or(true, |in_flight| in_flight.message_id != message_id)
    }

    /// Applies one event atomically: a rejected event leaves the store untouched.
    pub fn apply(&mut self, event: StoreEvent) -> Result<&Snapshot, StoreError> {
        match event {
            StoreEvent::AppendMessage { message, finalized } => {
                self.append_message(message, finalized)?
            }
            StoreEvent::GrowPart {
                message_id,
                part_index,
                channel,
                delta,
            } => self.grow_part(&message_id, part_index, channel, &delta)?,
            StoreEvent::PutPart {
                message_id,
                part_index,
                part,
            } => self.put_part(&message_id, part_index, part)?,
            StoreEvent::FinalizeMessage { message_id } => self.finalize(&message_id)?,
            StoreEvent::Clear => {
                self.snapshot = Snapshot::empty();
                self.in_flight = None;
            }
        }

        Ok(&self.snapshot)
    }

    fn append_message(&mut self, message: Message, finalized: bool) -> Result<(), StoreError> {
        if let Some(in_flight) = &self.in_flight {
            return Err(StoreError::MessageInFlight {
                in_flight: in_flight.message_id.clone(),
            });
        }
        if message.id.is_empty() {
            return Err(StoreError::EmptyMessageId);
        }
        if self.snapshot.message(&message.id).is_some() {
            return Err(StoreError::DuplicateMessageId(message.id));
        }

        if !finalized {
            self.in_flight = Some(InFlight {
                message_id: message.id.clone(),
                sealed_parts: 0,
            });
        }
        self.snapshot.transcript.push(message);
        Ok(())
    }

    fn grow_part(
        &mut self,
        message_id: &str,
        part_index: usize,
        channel: StreamChannel,
        delta: &str,
    ) -> Result<(), StoreError> {
        let sealed_parts = self.in_flight_sealed_parts(message_id)?;
        let parts = self.in_flight_parts_mut(message_id)?;
        let len = parts.len();

        if part_index < sealed_parts {
            return Err(StoreError::PartSealed {
                message_id: message_id.to_string(),
                part_index,
            });
        }

        if part_index == len {
            let mut part = Part::empty(channel);
            part.push_delta(delta);
            parts.push(part);
            return Ok(());
        }

        if part_index + 1 != len {
            return Err(StoreError::PartOutOfOrder {
                message_id: message_id.to_string(),
                part_index,
                len,
            });
        }

        let part = &mut parts[part_index];
        if part.channel() != Some(channel) {
            return Err(StoreError::ChannelMismatch {
                message_id: message_id.to_string(),
                part_index,
                channel,
            });
        }
        part.push_delta(delta);
        Ok(())
    }

    fn put_part(&mut self, message_id: &str, part_index: usize, part: Part) -> Result<(), StoreError> {
        let sealed_parts = self.in_flight_sealed_parts(message_id)?;
        let parts = self.in_flight_parts_mut(message_id)?;
        let len = parts.len();

        if part_index < sealed_parts {
            if parts[part_index] == part {
                return Ok(());
            }
            return Err(StoreError::PartSealed {
                message_id: message_id.to_string(),
                part_index,
            });
        }

        if part_index == len {
            parts.push(part);
        } else if part_index + 1 == len {
            parts[part_index] = part;
        } else {
            return Err(StoreError::PartOutOfOrder {
                message_id: message_id.to_string(),
                part_index,
                len,
            });
        }

        if let Some(in_flight) = self.in_flight.as_mut() {
            in_flight.sealed_parts = part_index + 1;
        }
        Ok(())
    }

    // Finalizing an already-finalized message is a no-op.
    fn finalize(&mut self, message_id: &str) -> Result<(), StoreError> {
        match &self.in_flight {
            Some(in_flight) if in_flight.message_id == message_id => {
                self.in_flight = None;
                Ok(())
            }
            _ if self.snapshot.message(message_id).is_some() => Ok(()),
            _ => Err(StoreError::UnknownMessage(message_id.to_string())),
        }
    }

    fn in_flight_sealed_parts(&self, message_id: &str) -> Result<usize, StoreError> {
        match &self.in_flight {
            Some(in_flight) if in_flight.message_id == message_id => Ok(in_flight.sealed_parts),
            _ if self.snapshot.message(message_id).is_some() => {
                Err(StoreError::MessageFinalized(message_id.to_string()))
            }
            _ => Err(StoreError::UnknownMessage(message_id.to_string())),
        }
    }

    // The in-flight message is always the last transcript entry.
    fn in_flight_parts_mut(&mut self, message_id: &str) -> Result<&mut Vec<Part>, StoreError> {
        self.snapshot
            .transcript
            .last_mut()
            .filter(|message| message.id == message_id)
            .map(|message| &mut message.parts)
            .ok_or_else(|| StoreError::UnknownMessage(message_id.to_string()))
    }
}
