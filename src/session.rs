//! Session controller: status machine over the snapshot store.
//!
//! Every entry point that changes the snapshot ends with exactly one write
//! through the persistence gate, so durable state follows event order.

use std::fmt;

use chat_provider::{Message, SpeechCapability, TransportEvent, TurnId};
use session_store::{DurationKey, DurationMap, PersistenceGate, SaveOutcome, Snapshot};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::durations::{self, DurationError};
use crate::store::{SnapshotStore, StoreError, StoreEvent};
use crate::welcome::WelcomeInjector;

/// Side effects the controller asks of its host.
pub trait TurnHost {
    /// Starts streaming a reply to `messages`; the reply must carry `reply_id`.
    fn start_turn(
        &mut self,
        messages: Vec<Message>,
        instructions: String,
        reply_id: String,
    ) -> Result<TurnId, String>;

    fn cancel_turn(&mut self, turn_id: TurnId);

    fn request_render(&mut self) {}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Status {
    #[default]
    Idle,
    Submitted,
    Streaming,
    Ready,
    Error,
}

impl Status {
    /// True while a turn is outstanding.
    #[must_use]
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Submitted | Self::Streaming)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Submitted => "submitted",
            Self::Streaming => "streaming",
            Self::Ready => "ready",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("prompt is empty")]
    EmptyPrompt,

    #[error("a reply is already in progress")]
    TurnInProgress,

    #[error("session has not been hydrated yet")]
    NotHydrated,

    #[error("no quick prompt at index {0}")]
    UnknownQuickPrompt(usize),

    #[error("speech input is not available")]
    SpeechUnavailable,

    #[error("speech input failed: {0}")]
    Speech(String),

    #[error("failed to start reply: {0}")]
    StartFailed(String),

    #[error(transparent)]
    UnknownSegment(#[from] DurationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct SessionController {
    config: SessionConfig,
    gate: PersistenceGate,
    store: SnapshotStore,
    status: Status,
    active_turn: Option<TurnId>,
    last_error: Option<String>,
    welcome: WelcomeInjector,
    input: String,
    speech: Option<Box<dyn SpeechCapability>>,
    dictating: bool,
    hydrated: bool,
}

impl SessionController {
    /// Creates an unhydrated controller. Call [`SessionController::hydrate`] before use.
    pub fn new(config: SessionConfig, gate: PersistenceGate) -> Self {
        let welcome = WelcomeInjector::new(config.welcome_message.clone());
        Self {
            config,
            gate,
            store: SnapshotStore::new(),
            status: Status::Idle,
            active_turn: None,
            last_error: None,
            welcome,
            input: String::new(),
            speech: None,
            dictating: false,
            hydrated: false,
        }
    }

    /// Creates and hydrates a controller in one step.
    pub fn open(config: SessionConfig, gate: PersistenceGate) -> Self {
        let mut session = Self::new(config, gate);
        session.hydrate();
        session
    }

    #[must_use]
    pub fn with_speech(mut self, speech: Box<dyn SpeechCapability>) -> Self {
        self.speech = Some(speech);
        self
    }

    /// Loads the durable snapshot, then decides on the welcome message.
    ///
    /// Subsequent calls are no-ops.
    pub fn hydrate(&mut self) {
        if self.hydrated {
            return;
        }

        let snapshot = self.gate.load();
        info!(
            key = self.gate.key(),
            messages = snapshot.transcript.len(),
            durations = snapshot.durations.len(),
            "hydrated chat session"
        );
        self.store = SnapshotStore::hydrated(snapshot);
        self.status = Status::Idle;
        self.hydrated = true;

        match self.welcome.maybe_inject(self.hydrated, &mut self.store) {
            Ok(Some(_)) => self.persist(),
            Ok(None) => {}
            Err(error) => warn!(%error, "failed to inject welcome message"),
        }
    }

    #[must_use]
    pub fn is_hydrated(&self) -> bool {
        self.hydrated
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub fn snapshot(&self) -> &Snapshot {
        self.store.snapshot()
    }

    #[must_use]
    pub fn transcript(&self) -> &[Message] {
        self.store.transcript()
    }

    #[must_use]
    pub fn durations(&self) -> &DurationMap {
        self.store.durations()
    }

    #[must_use]
    pub fn status(&self) -> Status {
        self.status
    }

    #[must_use]
    pub fn active_turn(&self) -> Option<TurnId> {
        self.active_turn
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Returns the message still receiving content, if any.
    #[must_use]
    pub fn in_flight(&self) -> Option<&Message> {
        self.store.in_flight()
    }

    /// The segment a renderer should be timing: the last part of the
    /// in-flight message while streaming.
    #[must_use]
    pub fn streaming_segment(&self) -> Option<DurationKey> {
        if self.status != Status::Streaming {
            return None;
        }

        let message = self.store.in_flight()?;
        let last_index = message.parts.len().checked_sub(1)?;
        Some(DurationKey::new(message.id.clone(), last_index))
    }

    /// Appends a finalized user message and asks the host to stream a reply.
    pub fn submit(&mut self, text: &str, host: &mut dyn TurnHost) -> Result<(), SessionError> {
        if !self.hydrated {
            return Err(SessionError::NotHydrated);
        }

        if text.trim().is_empty() {
            return Err(SessionError::EmptyPrompt);
        }
        if self.status.is_busy() {
            return Err(SessionError::TurnInProgress);
        }

        self.store.apply(StoreEvent::AppendMessage {
            message: Message::user(new_message_id(), text),
            finalized: true,
        })?;
        self.status = Status::Submitted;
        self.last_error = None;
        self.persist();

        let messages = self.store.transcript().to_vec();
        let reply_id = new_message_id();
        let started = host.start_turn(messages, self.config.system_instructions.clone(), reply_id);
        let result = match started {
            Ok(turn_id) => {
                info!(turn_id, "started reply");
                self.active_turn = Some(turn_id);
                Ok(())
            }
            Err(error) => {
                warn!(%error, "failed to start reply");
                self.status = Status::Error;
                self.last_error = Some(error.clone());
                Err(SessionError::StartFailed(error))
            }
        };

        host.request_render();
        result
    }

    /// Applies one transport event for the active turn.
    ///
    /// Events from any other turn are ignored. A rejected event leaves the
    /// session untouched.
    pub fn handle_event(&mut self, event: TransportEvent) -> Result<(), SessionError> {
        let turn_id = event.turn_id();
        if self.active_turn != Some(turn_id) {
            debug!(turn_id, "ignoring event for inactive turn");
            return Ok(());
        }

        match event {
            TransportEvent::TokenAppended {
                message_id,
                part_index,
                channel,
                delta,
                ..
            } => {
                self.open_reply(&message_id, part_index)?;
                self.store.apply(StoreEvent::GrowPart {
                    message_id,
                    part_index,
                    channel,
                    delta,
                })?;
                self.status = Status::Streaming;
            }
            TransportEvent::PartFinalized {
                message_id,
                part_index,
                part,
                ..
            } => {
                self.open_reply(&message_id, part_index)?;
                self.store.apply(StoreEvent::PutPart {
                    message_id,
                    part_index,
                    part,
                })?;
                self.status = Status::Streaming;
            }
            TransportEvent::MessageFinalized { message_id, .. } => {
                // A reply that never produced a part has no message to finalize.
                if self.store.snapshot().message(&message_id).is_none() {
                    debug!(turn_id, %message_id, "finalized reply without content");
                    return Ok(());
                }
                self.store.apply(StoreEvent::FinalizeMessage { message_id })?;
            }
            TransportEvent::Error { error, .. } => {
                warn!(turn_id, %error, "reply failed");
                self.finalize_in_flight()?;
                self.status = Status::Error;
                self.last_error = Some(error);
                self.active_turn = None;
            }
            TransportEvent::Done { .. } => {
                info!(turn_id, "reply finished");
                self.finalize_in_flight()?;
                self.status = Status::Ready;
                self.active_turn = None;
            }
        }

        self.persist();
        Ok(())
    }

    /// Stops the outstanding turn, keeping whatever content already arrived.
    ///
    /// Returns false when nothing was in progress.
    pub fn cancel(&mut self, host: &mut dyn TurnHost) -> bool {
        if !self.status.is_busy() {
            return false;
        }

        if let Some(turn_id) = self.active_turn.take() {
            info!(turn_id, "cancelling reply");
            host.cancel_turn(turn_id);
        }
        if let Err(error) = self.finalize_in_flight() {
            warn!(%error, "failed to finalize cancelled reply");
        }
        self.status = Status::Ready;
        self.persist();
        host.request_render();
        true
    }

    /// Empties transcript and durations from any state and overwrites the slot.
    /// Does nothing before hydration.
    pub fn clear(&mut self, host: &mut dyn TurnHost) {
        if !self.hydrated {
            debug!("ignoring clear before hydration");
            return;
        }

        if let Some(turn_id) = self.active_turn.take() {
            host.cancel_turn(turn_id);
        }

        if let Err(error) = self.store.apply(StoreEvent::Clear) {
            warn!(%error, "failed to clear session");
        }
        self.status = Status::Idle;
        self.last_error = None;
        self.persist();
        info!("cleared chat session");
        host.request_render();
    }

    /// Records elapsed time for an existing segment. Last write wins.
    pub fn record_duration(
        &mut self,
        message_id: &str,
        part_index: usize,
        millis: u64,
    ) -> Result<(), SessionError> {
        if !self.hydrated {
            return Err(SessionError::NotHydrated);
        }
        durations::record_duration(&mut self.store, message_id, part_index, millis)?;
        self.persist();
        Ok(())
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    #[must_use]
    pub fn input(&self) -> &str {
        &self.input
    }

    /// Submits the draft. The draft is kept when the prompt was not accepted.
    pub fn submit_input(&mut self, host: &mut dyn TurnHost) -> Result<(), SessionError> {
        let draft = std::mem::take(&mut self.input);
        let result = self.submit(&draft, host);
        if matches!(
            result,
            Err(SessionError::EmptyPrompt
                | SessionError::TurnInProgress
                | SessionError::NotHydrated)
        ) {
            self.input = draft;
        }
        result
    }

    #[must_use]
    pub fn quick_prompts(&self) -> &[String] {
        &self.config.quick_prompts
    }

    pub fn use_quick_prompt(
        &mut self,
        index: usize,
        host: &mut dyn TurnHost,
    ) -> Result<(), SessionError> {
        let prompt = self
            .config
            .quick_prompts
            .get(index)
            .cloned()
            .ok_or(SessionError::UnknownQuickPrompt(index))?;
        self.submit(&prompt, host)
    }

    #[must_use]
    pub fn is_dictating(&self) -> bool {
        self.dictating
    }

    pub fn start_dictation(&mut self) -> Result<(), SessionError> {
        if self.dictating {
            return Ok(());
        }

        let speech = self.speech.as_mut().ok_or(SessionError::SpeechUnavailable)?;
        speech.start().map_err(SessionError::Speech)?;
        self.dictating = true;
        Ok(())
    }

    pub fn stop_dictation(&mut self) {
        if !self.dictating {
            return;
        }

        if let Some(speech) = self.speech.as_mut() {
            speech.stop();
        }
        self.dictating = false;
    }

    /// Appends recognized speech to the draft input.
    pub fn on_speech_result(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        if !self.input.is_empty() && !self.input.ends_with(char::is_whitespace) {
            self.input.push(' ');
        }
        self.input.push_str(text);
    }

    // A reply id differing from the in-flight message finalizes that message
    // and opens a new one, which must start at part 0.
    fn open_reply(&mut self, message_id: &str, part_index: usize) -> Result<(), StoreError> {
        if self
            .store
            .in_flight()
            .is_some_and(|message| message.id == message_id)
        {
            return Ok(());
        }
        if self.store.snapshot().message(message_id).is_some() {
            return Err(StoreError::MessageFinalized(message_id.to_string()));
        }
        if message_id.is_empty() {
            return Err(StoreError::EmptyMessageId);
        }
        if part_index != 0 {
            return Err(StoreError::PartOutOfOrder {
                message_id: message_id.to_string(),
                part_index,
                len: 0,
            });
        }

        self.finalize_in_flight()?;
        self.store.apply(StoreEvent::AppendMessage {
            message: Message::assistant(message_id, Vec::new()),
            finalized: false,
        })?;
        Ok(())
    }

    fn finalize_in_flight(&mut self) -> Result<(), StoreError> {
        let Some(message_id) = self.store.in_flight().map(|message| message.id.clone()) else {
            return Ok(());
        };
        self.store.apply(StoreEvent::FinalizeMessage { message_id })?;
        Ok(())
    }

    fn persist(&mut self) {
        if self.gate.save(self.store.snapshot()) == SaveOutcome::Dropped {
            debug!("session continues without durable write");
        }
    }
}

impl fmt::Debug for SessionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionController")
            .field("gate", &self.gate)
            .field("store", &self.store)
            .field("status", &self.status)
            .field("active_turn", &self.active_turn)
            .field("last_error", &self.last_error)
            .field("hydrated", &self.hydrated)
            .field("dictating", &self.dictating)
            .finish_non_exhaustive()
    }
}

fn new_message_id() -> String {
    Uuid::new_v4().simple().to_string()
}
