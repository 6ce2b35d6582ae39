//! Threaded turn runner feeding a [`SessionController`].
//!
//! Each provider turn runs on its own worker thread. Emitted events are
//! buffered and only applied to the session when the host drains them, so the
//! session is mutated from the draining thread alone.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chat_provider::{
    CancelSignal, ChatProvider, Message, TransportEvent, TurnId, TurnRequest,
};
use tracing::{debug, warn};

use crate::session::{SessionController, TurnHost};

pub const ERROR_TURN_ALREADY_ACTIVE: &str = "Turn already active";

struct ActiveTurn {
    turn_id: TurnId,
    cancel: CancelSignal,
    join_handle: Option<JoinHandle<()>>,
}

pub struct RuntimeController {
    session: Arc<Mutex<SessionController>>,
    pending_events: Mutex<VecDeque<TransportEvent>>,
    events_ready: Condvar,
    next_turn_id: AtomicU64,
    active_turn: Mutex<Option<ActiveTurn>>,
    cancelled_turns: Mutex<Vec<ActiveTurn>>,
    provider: Arc<dyn ChatProvider>,
}

impl RuntimeController {
    /// Creates a controller that buffers turn events before applying them.
    ///
    /// Call [`RuntimeController::flush_pending_events`] from the thread that
    /// owns the UI loop. Never flush while holding the session lock.
    pub fn new(
        session: Arc<Mutex<SessionController>>,
        provider: Arc<dyn ChatProvider>,
    ) -> Arc<Self> {
        Arc::new(Self {
            session,
            pending_events: Mutex::new(VecDeque::new()),
            events_ready: Condvar::new(),
            next_turn_id: AtomicU64::new(1),
            active_turn: Mutex::new(None),
            cancelled_turns: Mutex::new(Vec::new()),
            provider,
        })
    }

    #[must_use]
    pub fn session(&self) -> &Arc<Mutex<SessionController>> {
        &self.session
    }

    #[must_use]
    pub fn has_active_turn(&self) -> bool {
        self.lock_active_turn().is_some()
    }

    fn start_turn_internal(
        self: &Arc<Self>,
        messages: Vec<Message>,
        instructions: String,
        reply_id: String,
    ) -> Result<TurnId, String> {
        let mut active_turn = self.lock_active_turn();
        if active_turn.is_some() {
            return Err(ERROR_TURN_ALREADY_ACTIVE.to_string());
        }

        let turn_id = self.next_turn_id.fetch_add(1, Ordering::SeqCst);
        let cancel = Arc::new(AtomicBool::new(false));
        let request = TurnRequest {
            turn_id,
            messages,
            instructions,
            reply_id,
        };
        let join_handle = self.spawn_worker(request, Arc::clone(&cancel))?;

        *active_turn = Some(ActiveTurn {
            turn_id,
            cancel,
            join_handle: Some(join_handle),
        });

        Ok(turn_id)
    }

    fn spawn_worker(
        self: &Arc<Self>,
        request: TurnRequest,
        cancel: CancelSignal,
    ) -> Result<JoinHandle<()>, String> {
        let turn_id = request.turn_id;
        let controller = Arc::clone(self);
        thread::Builder::new()
            .name(format!("chat-session-turn-{turn_id}"))
            .spawn(move || controller.run_worker(request, cancel))
            .map_err(|error| format!("Failed to spawn turn worker: {error}"))
    }

    fn run_worker(self: Arc<Self>, request: TurnRequest, cancel: CancelSignal) {
        let turn_id = request.turn_id;
        let terminal_emitted = Arc::new(AtomicBool::new(false));
        let terminal_emitted_for_emit = Arc::clone(&terminal_emitted);
        let controller = Arc::clone(&self);
        let provider = Arc::clone(&self.provider);

        let mut emit = move |event: TransportEvent| {
            if event.is_terminal() {
                terminal_emitted_for_emit.store(true, Ordering::SeqCst);
            }

            controller.enqueue_event(event);
        };
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            provider.run(request, Arc::clone(&cancel), &mut emit)
        }));

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(error)) => emit(TransportEvent::Error { turn_id, error }),
            Err(_) => emit(TransportEvent::Error {
                turn_id,
                error: "Provider panicked".to_string(),
            }),
        }

        if !terminal_emitted.load(Ordering::SeqCst) && self.is_active_turn_id(turn_id) {
            emit(TransportEvent::Error {
                turn_id,
                error: "Provider exited without terminal event".to_string(),
            });
        }
    }

    fn enqueue_event(&self, event: TransportEvent) {
        lock_unpoisoned(&self.pending_events).push_back(event);
        self.events_ready.notify_all();
    }

    /// Applies every queued event to the session in arrival order.
    pub fn flush_pending_events(&self) -> usize {
        let mut drained = 0usize;

        loop {
            let event = lock_unpoisoned(&self.pending_events).pop_front();
            match event {
                Some(event) => {
                    self.apply_event(event);
                    drained += 1;
                }
                None => break,
            }
        }

        drained
    }

    /// Blocks until at least one event is queued or `timeout` elapses.
    pub fn wait_for_events(&self, timeout: Duration) -> bool {
        let queue = lock_unpoisoned(&self.pending_events);
        let (queue, _) = match self
            .events_ready
            .wait_timeout_while(queue, timeout, |queue| queue.is_empty())
        {
            Ok(result) => result,
            Err(poisoned) => poisoned.into_inner(),
        };
        !queue.is_empty()
    }

    fn apply_event(&self, event: TransportEvent) {
        let turn_id = event.turn_id();
        let terminal = event.is_terminal();

        {
            let mut session = lock_unpoisoned(&self.session);
            if let Err(error) = session.handle_event(event) {
                warn!(turn_id, %error, "rejected transport event");
            }
        }

        if terminal {
            self.clear_active_turn_if_matching(turn_id);
        }
    }

    fn clear_active_turn_if_matching(&self, turn_id: TurnId) {
        let mut active_turn = self.lock_active_turn();
        let matches = active_turn.as_ref().map(|active| active.turn_id) == Some(turn_id);
        if !matches {
            return;
        }

        let Some(mut completed) = active_turn.take() else {
            return;
        };

        if let Some(join_handle) = completed.join_handle.take() {
            let is_current_thread = join_handle.thread().id() == thread::current().id();
            if !is_current_thread && join_handle.is_finished() {
                let _ = join_handle.join();
            }
        }
    }

    fn is_active_turn_id(&self, turn_id: TurnId) -> bool {
        self.lock_active_turn()
            .as_ref()
            .map(|active| active.turn_id)
            == Some(turn_id)
    }

    // The cancelled worker keeps running until it notices the flag; the slot
    // is released right away so the next turn can start.
    fn cancel_turn_internal(&self, turn_id: TurnId) {
        let mut active_turn = self.lock_active_turn();
        let matches = active_turn.as_ref().map(|active| active.turn_id) == Some(turn_id);
        if !matches {
            return;
        }

        if let Some(cancelled) = active_turn.take() {
            cancelled.cancel.store(true, Ordering::SeqCst);
            debug!(turn_id, "cancelled turn");
            let mut cancelled_turns = lock_unpoisoned(&self.cancelled_turns);
            cancelled_turns.retain(|turn| {
                turn.join_handle
                    .as_ref()
                    .is_some_and(|handle| !handle.is_finished())
            });
            cancelled_turns.push(cancelled);
        }
    }

    /// Cancels any running turn and joins every worker thread.
    pub fn shutdown(&self) {
        let mut turns: Vec<ActiveTurn> = lock_unpoisoned(&self.cancelled_turns).drain(..).collect();
        if let Some(active) = self.lock_active_turn().take() {
            turns.push(active);
        }

        for mut turn in turns {
            turn.cancel.store(true, Ordering::SeqCst);
            if let Some(join_handle) = turn.join_handle.take() {
                if join_handle.thread().id() != thread::current().id() {
                    let _ = join_handle.join();
                }
            }
        }
    }

    fn lock_active_turn(&self) -> MutexGuard<'_, Option<ActiveTurn>> {
        lock_unpoisoned(&self.active_turn)
    }
}

impl TurnHost for Arc<RuntimeController> {
    fn start_turn(
        &mut self,
        messages: Vec<Message>,
        instructions: String,
        reply_id: String,
    ) -> Result<TurnId, String> {
        self.start_turn_internal(messages, instructions, reply_id)
    }

    fn cancel_turn(&mut self, turn_id: TurnId) {
        self.cancel_turn_internal(turn_id);
    }
}

pub fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
