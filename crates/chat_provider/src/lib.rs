//! Minimal provider-agnostic contract for streaming one assistant turn.
//!
//! This crate defines the conversation data model shared by the session
//! controller and the persistence layer, plus the turn lifecycle events a
//! transport emits. It excludes transport details and session orchestration.

use std::sync::{atomic::AtomicBool, Arc};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier for one submitted turn.
pub type TurnId = u64;

/// Shared cancellation flag for a turn.
pub type CancelSignal = Arc<AtomicBool>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Streamable part families. Tool parts only arrive whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamChannel {
    Text,
    Reasoning,
}

/// One ordered segment of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Part {
    Text {
        #[serde(default)]
        text: String,
    },
    Reasoning {
        #[serde(default)]
        text: String,
    },
    ToolCall {
        #[serde(default)]
        name: String,
        #[serde(default)]
        args: Value,
    },
    ToolResult {
        #[serde(default)]
        output: Value,
    },
}

impl Part {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    #[must_use]
    pub fn reasoning(text: impl Into<String>) -> Self {
        Self::Reasoning { text: text.into() }
    }

    /// Creates an empty part for a streaming channel.
    #[must_use]
    pub fn empty(channel: StreamChannel) -> Self {
        match channel {
            StreamChannel::Text => Self::text(String::new()),
            StreamChannel::Reasoning => Self::reasoning(String::new()),
        }
    }

    /// Returns the streaming channel for text-bearing parts.
    #[must_use]
    pub fn channel(&self) -> Option<StreamChannel> {
        match self {
            Self::Text { .. } => Some(StreamChannel::Text),
            Self::Reasoning { .. } => Some(StreamChannel::Reasoning),
            Self::ToolCall { .. } | Self::ToolResult { .. } => None,
        }
    }

    /// Appends streamed text. Returns false for parts that cannot grow.
    pub fn push_delta(&mut self, delta: &str) -> bool {
        match self {
            Self::Text { text } | Self::Reasoning { text } => {
                text.push_str(delta);
                true
            }
            Self::ToolCall { .. } | Self::ToolResult { .. } => false,
        }
    }
}

/// One transcript entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Message {
    #[must_use]
    pub fn user(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::User,
            parts: vec![Part::text(text)],
        }
    }

    #[must_use]
    pub fn assistant(id: impl Into<String>, parts: Vec<Part>) -> Self {
        Self {
            id: id.into(),
            role: Role::Assistant,
            parts,
        }
    }

    /// Concatenates all text parts, skipping reasoning and tool parts.
    #[must_use]
    pub fn text_content(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Input required to start a provider turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnRequest {
    pub turn_id: TurnId,
    pub messages: Vec<Message>,
    pub instructions: String,
    /// Id the assistant reply must carry in emitted events.
    pub reply_id: String,
}

/// Transport-emitted lifecycle event for a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Streams `delta` into part `part_index` of the assistant message.
    TokenAppended {
        turn_id: TurnId,
        message_id: String,
        part_index: usize,
        channel: StreamChannel,
        delta: String,
    },
    /// Delivers the complete content of part `part_index`.
    PartFinalized {
        turn_id: TurnId,
        message_id: String,
        part_index: usize,
        part: Part,
    },
    MessageFinalized {
        turn_id: TurnId,
        message_id: String,
    },
    Error {
        turn_id: TurnId,
        error: String,
    },
    Done {
        turn_id: TurnId,
    },
}

impl TransportEvent {
    /// Returns the turn identifier associated with this event.
    #[must_use]
    pub fn turn_id(&self) -> TurnId {
        match self {
            Self::TokenAppended { turn_id, .. }
            | Self::PartFinalized { turn_id, .. }
            | Self::MessageFinalized { turn_id, .. }
            | Self::Error { turn_id, .. }
            | Self::Done { turn_id } => *turn_id,
        }
    }

    /// Returns true when this event terminates the turn lifecycle.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error { .. } | Self::Done { .. })
    }
}

/// Immutable metadata describing a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderProfile {
    pub provider_id: String,
    pub model_id: String,
}

/// Provider interface for streaming one turn.
pub trait ChatProvider: Send + Sync + 'static {
    /// Returns provider/model identity metadata.
    fn profile(&self) -> ProviderProfile;

    /// Executes a turn request and emits lifecycle events in delivery order.
    ///
    /// Providers observe `cancel` cooperatively and should stop emitting
    /// content once it is set, finishing with [`TransportEvent::Done`].
    fn run(
        &self,
        req: TurnRequest,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(TransportEvent),
    ) -> Result<(), String>;
}

/// Injected dictation capability.
///
/// Recognized text is delivered by the owner of the capability through the
/// session's speech-result entry point; the capability itself only toggles
/// capture.
pub trait SpeechCapability: Send {
    fn start(&mut self) -> Result<(), String>;

    fn stop(&mut self);
}
