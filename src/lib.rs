//! Client-side chat session controller.
//!
//! Owns a conversation transcript while a streaming assistant fills it in,
//! persists every change through a single durable slot, greets empty sessions
//! once, and tracks per-segment timing for long-running reasoning.
//!
//! # Public API Overview
//! - [`SessionController`] drives the status machine and exposes read state.
//! - [`TurnHost`] is the seam to whatever actually streams replies;
//!   [`RuntimeController`] implements it with worker threads.
//! - [`SnapshotStore`] applies discrete events to the in-memory snapshot.
//! - [`SessionConfig`] and [`init_logging`] cover process setup.

pub mod config;
pub mod durations;
pub mod logging;
pub mod runtime;
pub mod session;
pub mod store;
pub mod welcome;

pub use config::SessionConfig;
pub use durations::{DurationError, SegmentStopwatch};
pub use logging::init_logging;
pub use runtime::{lock_unpoisoned, RuntimeController, ERROR_TURN_ALREADY_ACTIVE};
pub use session::{SessionController, SessionError, Status, TurnHost};
pub use store::{SnapshotStore, StoreError, StoreEvent};
pub use welcome::{is_welcome_id, WelcomeInjector};

pub use chat_provider::{Message, Part, Role, StreamChannel, TransportEvent, TurnId};
pub use session_store::{DurationKey, DurationMap, PersistenceGate, SaveOutcome, Snapshot};
