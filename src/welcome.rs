//! One-time greeting for sessions that start empty.

use chat_provider::{Message, Part};
use time::OffsetDateTime;
use tracing::info;

use crate::store::{SnapshotStore, StoreError, StoreEvent};

const WELCOME_ID_PREFIX: &str = "welcome-";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WelcomeInjector {
    text: Option<String>,
    fired: bool,
}

impl WelcomeInjector {
    /// `None` disables injection for this session.
    #[must_use]
    pub fn new(text: Option<String>) -> Self {
        Self { text, fired: false }
    }

    /// Appends the greeting when the hydrated transcript is empty.
    ///
    /// The latch is set on the first call made after hydration whether or not
    /// a greeting was appended, so a session cleared later never greets again.
    /// Returns the injected message id.
    pub fn maybe_inject(
        &mut self,
        hydrated: bool,
        store: &mut SnapshotStore,
    ) -> Result<Option<String>, StoreError> {
        if !hydrated || self.fired {
            return Ok(None);
        }
        self.fired = true;

        let Some(text) = self.text.as_ref() else {
            return Ok(None);
        };
        if !store.transcript().is_empty() {
            return Ok(None);
        }

        let id = welcome_id(OffsetDateTime::now_utc());
        store.apply(StoreEvent::AppendMessage {
            message: Message::assistant(id.clone(), vec![Part::text(text.clone())]),
            finalized: true,
        })?;
        info!(message_id = %id, "injected welcome message");
        Ok(Some(id))
    }
}

fn welcome_id(now: OffsetDateTime) -> String {
    let millis = now.unix_timestamp_nanos() / 1_000_000;
    format!("{WELCOME_ID_PREFIX}{millis}")
}

/// Returns true for ids produced by the injector.
#[must_use]
pub fn is_welcome_id(id: &str) -> bool {
    id.strip_prefix(WELCOME_ID_PREFIX)
        .is_some_and(|millis| !millis.is_empty() && millis.bytes().all(|b| b.is_ascii_digit()))
}
