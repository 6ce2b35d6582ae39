//! Line-oriented demo front end for `chat_session`.
//!
//! The `chat-session` binary hydrates a file-backed session from
//! `CHAT_SESSION_STORAGE_DIR` (default `.chat-session/` under the working
//! directory), streams replies from the scripted mock provider, and prints
//! them incrementally. Slash commands are listed by `/help`.

pub mod commands;
pub mod driver;
pub mod render;
