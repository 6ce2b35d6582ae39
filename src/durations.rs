//! Per-segment elapsed-time bookkeeping.

use std::time::Instant;

use session_store::{DurationKey, Snapshot};
use thiserror::Error;

use crate::store::SnapshotStore;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationError {
    #[error("no part {part_index} in message '{message_id}'")]
    UnknownSegment {
        message_id: String,
        part_index: usize,
    },
}

/// Records `millis` for an existing segment. Last write wins.
pub fn record_duration(
    store: &mut SnapshotStore,
    message_id: &str,
    part_index: usize,
    millis: u64,
) -> Result<Option<u64>, DurationError> {
    if !segment_exists(store.snapshot(), message_id, part_index) {
        return Err(DurationError::UnknownSegment {
            message_id: message_id.to_string(),
            part_index,
        });
    }

    Ok(store
        .durations_mut()
        .record(&DurationKey::new(message_id, part_index), millis))
}

fn segment_exists(snapshot: &Snapshot, message_id: &str, part_index: usize) -> bool {
    snapshot
        .message(message_id)
        .is_some_and(|message| part_index < message.parts.len())
}

/// Times the segment currently marked as streaming.
///
/// Feed it the session's streaming segment on every refresh; when the marker
/// moves away from a segment, that segment's elapsed time is returned once.
#[derive(Debug, Default)]
pub struct SegmentStopwatch {
    running: Option<(DurationKey, Instant)>,
}

impl SegmentStopwatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(
        &mut self,
        current: Option<DurationKey>,
        now: Instant,
    ) -> Option<(DurationKey, u64)> {
        if let (Some((running, _)), Some(current)) = (&self.running, &current) {
            if running == current {
                return None;
            }
        }

        let finished = self.running.take().map(|(key, started)| {
            let elapsed = now.saturating_duration_since(started).as_millis();
            (key, u64::try_from(elapsed).unwrap_or(u64::MAX))
        });
        self.running = current.map(|key| (key, now));
        finished
    }

    #[must_use]
    pub fn running(&self) -> Option<&DurationKey> {
        self.running.as_ref().map(|(key, _)| key)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chat_provider::{Message, Part};

    use super::*;
    use crate::store::StoreEvent;

    fn store_with_assistant() -> SnapshotStore {
        let mut store = SnapshotStore::new();
        store
            .apply(StoreEvent::AppendMessage {
                message: Message::assistant("m2", vec![Part::reasoning("r"), Part::text("t")]),
                finalized: true,
            })
            .expect("append succeeds");
        store
    }

    #[test]
    fn last_write_wins_for_a_segment() {
        let mut store = store_with_assistant();

        assert_eq!(record_duration(&mut store, "m2", 0, 1200), Ok(None));
        assert_eq!(record_duration(&mut store, "m2", 0, 1500), Ok(Some(1200)));

        assert_eq!(store.durations().get_raw("m2-0"), Some(1500));
        assert_eq!(store.durations().len(), 1);
    }

    #[test]
    fn unknown_segments_are_rejected() {
        let mut store = store_with_assistant();

        assert_eq!(
            record_duration(&mut store, "m2", 2, 10),
            Err(DurationError::UnknownSegment {
                message_id: "m2".to_string(),
                part_index: 2,
            })
        );
        assert!(record_duration(&mut store, "missing", 0, 10).is_err());
        assert!(store.durations().is_empty());
    }

    #[test]
    fn stopwatch_reports_segment_when_marker_moves() {
        let start = Instant::now();
        let mut stopwatch = SegmentStopwatch::new();
        let reasoning = DurationKey::new("a1", 0);

        assert_eq!(stopwatch.observe(Some(reasoning.clone()), start), None);
        assert_eq!(
            stopwatch.observe(Some(reasoning.clone()), start + Duration::from_millis(50)),
            None
        );
        assert_eq!(
            stopwatch.observe(
                Some(DurationKey::new("a1", 1)),
                start + Duration::from_millis(120)
            ),
            Some((reasoning, 120))
        );
        assert_eq!(
            stopwatch.observe(None, start + Duration::from_millis(200)),
            Some((DurationKey::new("a1", 1), 80))
        );
        assert!(stopwatch.running().is_none());
    }
}
