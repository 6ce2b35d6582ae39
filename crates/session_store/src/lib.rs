//! Durable persistence for chat session snapshots.
//!
//! A snapshot (transcript + duration map) lives in one key-value slot as a
//! JSON object `{ "messages": [...], "durations": {...} }`. Loading never
//! fails: missing or corrupt values degrade to the empty snapshot. Saving is
//! best-effort and reports dropped writes instead of raising.

mod error;
mod gate;
mod paths;
mod schema;
mod slot;

pub use error::SessionStoreError;
pub use gate::{PersistenceGate, SaveOutcome, DEFAULT_STORAGE_KEY};
pub use paths::{slot_file_name, storage_root};
pub use schema::{decode_snapshot, encode_snapshot, DecodeReport, DurationKey, DurationMap, Snapshot};
pub use slot::{FileSlot, KeyValueSlot, MemorySlot};
