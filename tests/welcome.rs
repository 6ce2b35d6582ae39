mod support;

use chat_provider::Role;
use chat_session::{is_welcome_id, SessionConfig, SessionController, SessionError, Status};
use session_store::{MemorySlot, PersistenceGate, DEFAULT_STORAGE_KEY};

use support::{open_session, HostSpy};

#[test]
fn empty_session_gets_one_persisted_welcome() {
    let slot = MemorySlot::new();
    let session = open_session(&slot, SessionConfig::default());

    assert_eq!(session.transcript().len(), 1);
    let welcome = &session.transcript()[0];
    assert_eq!(welcome.role, Role::Assistant);
    assert!(is_welcome_id(&welcome.id), "unexpected id {}", welcome.id);
    assert_eq!(
        welcome.text_content(),
        chat_session::config::DEFAULT_WELCOME_MESSAGE
    );
    assert_eq!(session.status(), Status::Idle);
    assert_eq!(slot.write_count(), 1);

    let reloaded = PersistenceGate::with_default_key(slot.clone()).load();
    assert_eq!(&reloaded, session.snapshot());
}

#[test]
fn reopening_a_greeted_session_does_not_greet_again() {
    let slot = MemorySlot::new();
    let first = open_session(&slot, SessionConfig::default());
    let welcome_id = first.transcript()[0].id.clone();
    drop(first);

    let second = open_session(&slot, SessionConfig::default());

    assert_eq!(second.transcript().len(), 1);
    assert_eq!(second.transcript()[0].id, welcome_id);
}

#[test]
fn clear_does_not_retrigger_welcome_in_the_same_session() {
    let slot = MemorySlot::new();
    let mut session = open_session(&slot, SessionConfig::default());
    let mut host = HostSpy::default();

    session.clear(&mut host);
    session.hydrate();

    assert!(session.transcript().is_empty());
}

#[test]
fn welcome_waits_for_hydration() {
    let slot = MemorySlot::new();
    slot.insert_raw(
        DEFAULT_STORAGE_KEY,
        r#"{"messages":[{"id":"m1","role":"user","parts":[{"type":"text","text":"hi"}]}]}"#,
    );
    let mut session =
        SessionController::new(SessionConfig::default(), PersistenceGate::with_default_key(slot.clone()));

    assert!(!session.is_hydrated());
    assert!(session.transcript().is_empty());
    assert_eq!(slot.write_count(), 0);

    session.hydrate();

    assert_eq!(session.transcript().len(), 1);
    assert_eq!(session.transcript()[0].id, "m1");
    assert_eq!(slot.write_count(), 0);
}

#[test]
fn malformed_storage_counts_as_empty_and_is_greeted() {
    let slot = MemorySlot::new();
    slot.insert_raw(DEFAULT_STORAGE_KEY, "not json at all");

    let session = open_session(&slot, SessionConfig::default());

    assert_eq!(session.transcript().len(), 1);
    assert!(is_welcome_id(&session.transcript()[0].id));
}

#[test]
fn disabled_welcome_leaves_slot_untouched() {
    let slot = MemorySlot::new();
    let session = open_session(&slot, SessionConfig::default().without_welcome());

    assert!(session.transcript().is_empty());
    assert_eq!(slot.write_count(), 0);
    assert!(slot.get_raw(DEFAULT_STORAGE_KEY).is_none());
}

#[test]
fn clear_and_durations_wait_for_hydration() {
    let slot = MemorySlot::new();
    let stored = r#"{"messages":[{"id":"m1","role":"user","parts":[{"type":"text","text":"hi"}]}]}"#;
    slot.insert_raw(DEFAULT_STORAGE_KEY, stored);
    let mut session =
        SessionController::new(SessionConfig::default(), PersistenceGate::with_default_key(slot.clone()));
    let mut host = HostSpy::default();

    session.clear(&mut host);
    assert_eq!(
        session.record_duration("m1", 0, 10),
        Err(SessionError::NotHydrated)
    );

    assert_eq!(slot.write_count(), 0);
    assert_eq!(slot.get_raw(DEFAULT_STORAGE_KEY).as_deref(), Some(stored));
    assert!(host.cancelled.is_empty());

    session.hydrate();

    assert_eq!(session.transcript().len(), 1);
    assert_eq!(session.transcript()[0].id, "m1");
    assert!(session.durations().is_empty());
}
