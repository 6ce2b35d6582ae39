//! Line-oriented front end over a [`RuntimeController`].

use std::io::{self, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chat_session::{lock_unpoisoned, RuntimeController, SegmentStopwatch, Status};
use tracing::debug;

use crate::commands::{parse_slash_command, SlashCommand, HELP_TEXT};
use crate::render::{duration_summary, TranscriptPrinter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct Driver<W: Write> {
    runtime: Arc<RuntimeController>,
    printer: TranscriptPrinter,
    stopwatch: SegmentStopwatch,
    was_busy: bool,
    out: W,
}

impl<W: Write> Driver<W> {
    pub fn new(runtime: Arc<RuntimeController>, out: W) -> Self {
        Self {
            runtime,
            printer: TranscriptPrinter::new(),
            stopwatch: SegmentStopwatch::new(),
            was_busy: false,
            out,
        }
    }

    /// Prints the hydrated transcript and a usage hint.
    pub fn start(&mut self) -> io::Result<()> {
        self.render()?;
        writeln!(self.out, "\n\nType a message, or /help for commands.")?;
        self.out.flush()
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        lock_unpoisoned(self.runtime.session()).status().is_busy() || self.runtime.has_active_turn()
    }

    pub fn handle_line(&mut self, line: &str) -> io::Result<Flow> {
        if line.trim().is_empty() {
            return Ok(Flow::Continue);
        }

        let mut host = Arc::clone(&self.runtime);

        let Some(command) = parse_slash_command(line) else {
            let result = {
                let mut session = lock_unpoisoned(self.runtime.session());
                session.set_input(line);
                session.submit_input(&mut host)
            };
            if let Err(error) = result {
                writeln!(self.out, "error: {error}")?;
            }
            self.render()?;
            return Ok(Flow::Continue);
        };

        match command {
            SlashCommand::Help => writeln!(self.out, "{HELP_TEXT}")?,
            SlashCommand::Clear => {
                lock_unpoisoned(self.runtime.session()).clear(&mut host);
                self.printer.reset();
                self.stopwatch = SegmentStopwatch::new();
                writeln!(self.out, "Conversation cleared.")?;
            }
            SlashCommand::Cancel => {
                let cancelled = lock_unpoisoned(self.runtime.session()).cancel(&mut host);
                if cancelled {
                    self.render()?;
                    writeln!(self.out, "\n(cancelled)")?;
                } else {
                    writeln!(self.out, "No reply in progress.")?;
                }
            }
            SlashCommand::Prompts => {
                let prompts = lock_unpoisoned(self.runtime.session())
                    .quick_prompts()
                    .to_vec();
                for (index, prompt) in prompts.iter().enumerate() {
                    writeln!(self.out, "  {}. {prompt}", index + 1)?;
                }
            }
            SlashCommand::Prompt(Some(number)) => {
                let result = lock_unpoisoned(self.runtime.session())
                    .use_quick_prompt(number - 1, &mut host);
                if let Err(error) = result {
                    writeln!(self.out, "error: {error}")?;
                }
                self.render()?;
            }
            SlashCommand::Prompt(None) => writeln!(self.out, "Usage: /prompt <n>")?,
            SlashCommand::Quit => {
                lock_unpoisoned(self.runtime.session()).cancel(&mut host);
                return Ok(Flow::Quit);
            }
            SlashCommand::Unknown(command) => writeln!(self.out, "Unknown command: {command}")?,
        }

        self.out.flush()?;
        Ok(Flow::Continue)
    }

    /// Waits up to `timeout` for turn events, applies them and prints progress.
    pub fn pump(&mut self, timeout: Duration) -> io::Result<()> {
        self.runtime.wait_for_events(timeout);
        self.runtime.flush_pending_events();
        self.render()
    }

    fn render(&mut self) -> io::Result<()> {
        let mut session = lock_unpoisoned(self.runtime.session());

        if let Some((key, millis)) = self
            .stopwatch
            .observe(session.streaming_segment(), Instant::now())
        {
            if let Err(error) = session.record_duration(&key.message_id, key.part_index, millis) {
                debug!(%error, segment = %key, "skipped segment duration");
            }
        }

        self.printer.print_updates(session.transcript(), &mut self.out)?;

        let busy = session.status().is_busy();
        if self.was_busy && !busy {
            if let Some(last) = session.transcript().last() {
                for line in duration_summary(last, session.durations()) {
                    write!(self.out, "\n  ({line})")?;
                }
            }
            if session.status() == Status::Error {
                let error = session.last_error().unwrap_or("unknown error");
                write!(self.out, "\nerror: {error}")?;
            }
            writeln!(self.out)?;
        }
        self.was_busy = busy;

        self.out.flush()
    }

    pub fn into_output(self) -> W {
        self.out
    }
}
