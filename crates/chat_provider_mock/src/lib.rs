//! Deterministic mock implementation of the shared `chat_provider` contract.
//!
//! This crate contains no transport/protocol logic and is intended for local
//! development and contract-level integration testing.

use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use chat_provider::{
    CancelSignal, ChatProvider, Part, ProviderProfile, StreamChannel, TransportEvent, TurnId,
    TurnRequest,
};
use serde_json::{json, Value};

/// Stable provider identifier used for explicit startup selection.
pub const MOCK_PROVIDER_ID: &str = "mock";

/// One scripted segment of the mocked assistant reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockStep {
    Reasoning(String),
    Text(String),
    ToolCall { name: String, args: Value },
    ToolResult { output: Value },
    /// Emits a transport error and ends the turn.
    Fail(String),
}

/// Deterministic mock provider used by tests and the demo driver.
#[derive(Debug, Clone)]
pub struct MockProvider {
    steps: Vec<MockStep>,
    start_delay: Duration,
    token_delay: Duration,
}

impl MockProvider {
    const START_DELAY_MS: u64 = 200;
    const TOKEN_DELAY_MS: u64 = 40;

    /// Creates a mock provider replaying `steps` with demo pacing.
    #[must_use]
    pub fn new(steps: Vec<MockStep>) -> Self {
        Self {
            steps,
            start_delay: Duration::from_millis(Self::START_DELAY_MS),
            token_delay: Duration::from_millis(Self::TOKEN_DELAY_MS),
        }
    }

    /// Creates a mock provider that emits without sleeping.
    #[must_use]
    pub fn instant(steps: Vec<MockStep>) -> Self {
        Self::new(steps).with_delays(Duration::ZERO, Duration::ZERO)
    }

    #[must_use]
    pub fn with_delays(mut self, start_delay: Duration, token_delay: Duration) -> Self {
        self.start_delay = start_delay;
        self.token_delay = token_delay;
        self
    }

    #[must_use]
    pub fn steps(&self) -> &[MockStep] {
        &self.steps
    }

    fn pause(delay: Duration) {
        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }

    /// Streams one text-bearing part word by word. Returns false when cancelled.
    #[allow(clippy::too_many_arguments)]
    fn stream_part(
        &self,
        turn_id: TurnId,
        message_id: &str,
        part_index: usize,
        channel: StreamChannel,
        content: &str,
        cancel: &CancelSignal,
        emit: &mut dyn FnMut(TransportEvent),
    ) -> bool {
        let mut pending_token = String::new();
        for ch in content.chars() {
            pending_token.push(ch);

            if matches!(ch, ' ' | '\n') {
                if cancel.load(Ordering::SeqCst) {
                    return false;
                }
                emit(TransportEvent::TokenAppended {
                    turn_id,
                    message_id: message_id.to_string(),
                    part_index,
                    channel,
                    delta: std::mem::take(&mut pending_token),
                });
                Self::pause(self.token_delay);
            }
        }

        if !pending_token.is_empty() {
            if cancel.load(Ordering::SeqCst) {
                return false;
            }
            emit(TransportEvent::TokenAppended {
                turn_id,
                message_id: message_id.to_string(),
                part_index,
                channel,
                delta: pending_token,
            });
            Self::pause(self.token_delay);
        }

        let mut part = Part::empty(channel);
        part.push_delta(content);
        emit(TransportEvent::PartFinalized {
            turn_id,
            message_id: message_id.to_string(),
            part_index,
            part,
        });
        true
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new(vec![
            MockStep::Reasoning(
                "The user wants something quick. Checking pantry staples and cook times first."
                    .to_string(),
            ),
            MockStep::ToolCall {
                name: "search_recipes".to_string(),
                args: json!({ "query": "quick weeknight dinner", "max_minutes": 30 }),
            },
            MockStep::ToolResult {
                output: json!([{ "title": "Garlic butter pasta", "minutes": 20 }]),
            },
            MockStep::Text(
                "## Garlic butter pasta\n\n1. Boil the pasta in well-salted water.\n2. Melt butter with sliced garlic on low heat.\n3. Toss everything with parmesan and a splash of pasta water.\n\nTaste and adjust salt to your liking.\n"
                    .to_string(),
            ),
        ])
    }
}

impl ChatProvider for MockProvider {
    fn profile(&self) -> ProviderProfile {
        ProviderProfile {
            provider_id: MOCK_PROVIDER_ID.to_string(),
            model_id: "mock".to_string(),
        }
    }

    fn run(
        &self,
        req: TurnRequest,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(TransportEvent),
    ) -> Result<(), String> {
        let TurnRequest {
            turn_id,
            reply_id: message_id,
            ..
        } = req;

        Self::pause(self.start_delay);

        for (part_index, step) in self.steps.iter().enumerate() {
            if cancel.load(Ordering::SeqCst) {
                emit(TransportEvent::Done { turn_id });
                return Ok(());
            }

            let completed = match step {
                MockStep::Reasoning(content) => self.stream_part(
                    turn_id,
                    &message_id,
                    part_index,
                    StreamChannel::Reasoning,
                    content,
                    &cancel,
                    emit,
                ),
                MockStep::Text(content) => self.stream_part(
                    turn_id,
                    &message_id,
                    part_index,
                    StreamChannel::Text,
                    content,
                    &cancel,
                    emit,
                ),
                MockStep::ToolCall { name, args } => {
                    emit(TransportEvent::PartFinalized {
                        turn_id,
                        message_id: message_id.clone(),
                        part_index,
                        part: Part::ToolCall {
                            name: name.clone(),
                            args: args.clone(),
                        },
                    });
                    Self::pause(self.token_delay);
                    true
                }
                MockStep::ToolResult { output } => {
                    emit(TransportEvent::PartFinalized {
                        turn_id,
                        message_id: message_id.clone(),
                        part_index,
                        part: Part::ToolResult {
                            output: output.clone(),
                        },
                    });
                    Self::pause(self.token_delay);
                    true
                }
                MockStep::Fail(error) => {
                    emit(TransportEvent::Error {
                        turn_id,
                        error: error.clone(),
                    });
                    return Ok(());
                }
            };

            if !completed {
                emit(TransportEvent::Done { turn_id });
                return Ok(());
            }
        }

        if !cancel.load(Ordering::SeqCst) {
            emit(TransportEvent::MessageFinalized {
                turn_id,
                message_id,
            });
        }
        emit(TransportEvent::Done { turn_id });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    use chat_provider::Message;

    use super::*;

    fn collect_events(provider: &MockProvider, cancel: CancelSignal) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        provider
            .run(
                TurnRequest {
                    turn_id: 7,
                    messages: vec![Message::user("u1", "test")],
                    instructions: "system instructions".to_string(),
                    reply_id: "assistant-7".to_string(),
                },
                cancel,
                &mut |event| events.push(event),
            )
            .expect("mock run should succeed");
        events
    }

    #[test]
    fn profile_exposes_explicit_mock_provider_identity() {
        let profile = MockProvider::instant(Vec::new()).profile();

        assert_eq!(profile.provider_id, MOCK_PROVIDER_ID);
        assert_eq!(profile.model_id, "mock");
    }

    #[test]
    fn run_streams_tokens_then_finalizes_part_message_and_turn() {
        let provider = MockProvider::instant(vec![MockStep::Text("one two".to_string())]);
        let events = collect_events(&provider, Arc::new(AtomicBool::new(false)));

        assert_eq!(
            events,
            vec![
                TransportEvent::TokenAppended {
                    turn_id: 7,
                    message_id: "assistant-7".to_string(),
                    part_index: 0,
                    channel: StreamChannel::Text,
                    delta: "one ".to_string(),
                },
                TransportEvent::TokenAppended {
                    turn_id: 7,
                    message_id: "assistant-7".to_string(),
                    part_index: 0,
                    channel: StreamChannel::Text,
                    delta: "two".to_string(),
                },
                TransportEvent::PartFinalized {
                    turn_id: 7,
                    message_id: "assistant-7".to_string(),
                    part_index: 0,
                    part: Part::text("one two"),
                },
                TransportEvent::MessageFinalized {
                    turn_id: 7,
                    message_id: "assistant-7".to_string(),
                },
                TransportEvent::Done { turn_id: 7 },
            ]
        );
    }

    #[test]
    fn tool_steps_arrive_as_whole_parts_with_sequential_indices() {
        let provider = MockProvider::instant(vec![
            MockStep::ToolCall {
                name: "search".to_string(),
                args: json!({ "q": "oats" }),
            },
            MockStep::ToolResult {
                output: json!("found"),
            },
        ]);
        let events = collect_events(&provider, Arc::new(AtomicBool::new(false)));

        let indices: Vec<usize> = events
            .iter()
            .filter_map(|event| match event {
                TransportEvent::PartFinalized { part_index, .. } => Some(*part_index),
                _ => None,
            })
            .collect();
        assert_eq!(indices, vec![0, 1]);
    }

    #[test]
    fn run_ends_with_done_only_when_cancel_is_set() {
        let provider = MockProvider::instant(vec![MockStep::Text("ignored".to_string())]);
        let events = collect_events(&provider, Arc::new(AtomicBool::new(true)));

        assert_eq!(events, vec![TransportEvent::Done { turn_id: 7 }]);
    }

    #[test]
    fn fail_step_emits_error_after_prior_content() {
        let provider = MockProvider::instant(vec![
            MockStep::Text("partial".to_string()),
            MockStep::Fail("upstream closed".to_string()),
        ]);
        let events = collect_events(&provider, Arc::new(AtomicBool::new(false)));

        assert!(matches!(
            events.last(),
            Some(TransportEvent::Error { error, .. }) if error == "upstream closed"
        ));
        assert!(!events
            .iter()
            .any(|event| matches!(event, TransportEvent::Done { .. })));
    }

    #[test]
    fn default_script_mixes_reasoning_tools_and_text() {
        let provider = MockProvider::default();
        assert!(matches!(provider.steps().first(), Some(MockStep::Reasoning(_))));
        assert!(matches!(provider.steps().last(), Some(MockStep::Text(_))));
    }
}
