#![allow(dead_code)]

use chat_provider::{Message, StreamChannel, TransportEvent, TurnId};
use chat_session::{PersistenceGate, SessionConfig, SessionController, TurnHost};
use session_store::MemorySlot;

#[derive(Default)]
pub struct HostSpy {
    pub next_turn_id: TurnId,
    pub started: Vec<StartedTurn>,
    pub cancelled: Vec<TurnId>,
    pub render_requests: usize,
}

pub struct StartedTurn {
    pub turn_id: TurnId,
    pub messages: Vec<Message>,
    pub instructions: String,
    pub reply_id: String,
}

impl HostSpy {
    pub fn last_reply_id(&self) -> &str {
        match self.started.last() {
            Some(started) => &started.reply_id,
            None => panic!("no turn was started"),
        }
    }
}

impl TurnHost for HostSpy {
    fn start_turn(
        &mut self,
        messages: Vec<Message>,
        instructions: String,
        reply_id: String,
    ) -> Result<TurnId, String> {
        self.next_turn_id += 1;
        self.started.push(StartedTurn {
            turn_id: self.next_turn_id,
            messages,
            instructions,
            reply_id,
        });
        Ok(self.next_turn_id)
    }

    fn cancel_turn(&mut self, turn_id: TurnId) {
        self.cancelled.push(turn_id);
    }

    fn request_render(&mut self) {
        self.render_requests += 1;
    }
}

pub fn open_session(slot: &MemorySlot, config: SessionConfig) -> SessionController {
    SessionController::open(config, PersistenceGate::with_default_key(slot.clone()))
}

pub fn quiet_config() -> SessionConfig {
    SessionConfig::default().without_welcome()
}

pub fn text_token(turn_id: TurnId, message_id: &str, part_index: usize, delta: &str) -> TransportEvent {
    TransportEvent::TokenAppended {
        turn_id,
        message_id: message_id.to_string(),
        part_index,
        channel: StreamChannel::Text,
        delta: delta.to_string(),
    }
}

pub fn reasoning_token(
    turn_id: TurnId,
    message_id: &str,
    part_index: usize,
    delta: &str,
) -> TransportEvent {
    TransportEvent::TokenAppended {
        turn_id,
        message_id: message_id.to_string(),
        part_index,
        channel: StreamChannel::Reasoning,
        delta: delta.to_string(),
    }
}
