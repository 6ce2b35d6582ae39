use std::io::{self, BufRead};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use chat_cli::driver::{Driver, Flow};
use chat_provider::ChatProvider;
use chat_provider_mock::MockProvider;
use chat_session::{init_logging, RuntimeController, SessionConfig, SessionController};
use session_store::{storage_root, FileSlot, PersistenceGate};
use tracing::info;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

fn main() -> io::Result<()> {
    let config = SessionConfig::from_env();
    init_logging(&config.log_filter);

    let storage_dir = match config.storage_dir.clone() {
        Some(dir) => dir,
        None => storage_root(&std::env::current_dir()?),
    };
    let gate = PersistenceGate::new(FileSlot::new(&storage_dir), config.storage_key.clone());

    let provider = Arc::new(MockProvider::default());
    let profile = provider.profile();
    info!(
        provider = %profile.provider_id,
        model = %profile.model_id,
        storage = %storage_dir.display(),
        "starting chat session"
    );

    let session = Arc::new(Mutex::new(SessionController::open(config, gate)));
    let runtime = RuntimeController::new(session, provider);
    let mut driver = Driver::new(Arc::clone(&runtime), io::stdout());
    driver.start()?;

    let lines = spawn_stdin_reader()?;
    let mut stdin_open = true;

    loop {
        let line = if driver.is_busy() {
            driver.pump(POLL_INTERVAL)?;
            match lines.try_recv() {
                Ok(line) => Some(line),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => {
                    stdin_open = false;
                    None
                }
            }
        } else if stdin_open {
            match lines.recv() {
                Ok(line) => Some(line),
                Err(_) => break,
            }
        } else {
            break;
        };

        if let Some(line) = line {
            if driver.handle_line(&line)? == Flow::Quit {
                break;
            }
        }
    }

    runtime.shutdown();
    Ok(())
}

fn spawn_stdin_reader() -> io::Result<Receiver<String>> {
    let (sender, receiver) = mpsc::channel();
    thread::Builder::new()
        .name("chat-session-stdin".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                if sender.send(line).is_err() {
                    break;
                }
            }
        })?;
    Ok(receiver)
}
