//! Operator quit signal.
//!
//! The supervisor polls a [`QuitSource`] once per cycle with its poll interval
//! as the timeout. Two sources exist:
//!
//! - [`TerminalQuit`] reads single key presses through `crossterm` when stdin
//!   is a terminal. `q`, `Q`, and Ctrl-C quit.
//! - [`LineQuit`] reads whole lines from any reader on a helper thread and
//!   quits on a line that is `q`. Used when stdin is a pipe or a file.
//!
//! Raw mode is entered only for the duration of a poll so that log lines
//! written by other threads keep normal newline handling in between.

use crate::error::{AppResult, HarnessError};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::io::BufRead;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;
use tracing::debug;

/// Source of the operator's quit request.
pub trait QuitSource {
    /// Wait up to `timeout` for a quit request.
    fn poll_quit(&mut self, timeout: Duration) -> AppResult<bool>;
}

fn is_quit_key(key: &KeyEvent) -> bool {
    if key.kind == KeyEventKind::Release {
        return false;
    }
    match key.code {
        KeyCode::Char('q') | KeyCode::Char('Q') => true,
        // Raw mode swallows SIGINT, so Ctrl-C arrives as a key
        KeyCode::Char('c') => key.modifiers.contains(KeyModifiers::CONTROL),
        _ => false,
    }
}

/// Single-key quit from an interactive terminal.
#[derive(Debug, Default)]
pub struct TerminalQuit;

impl TerminalQuit {
    /// Create the source. The terminal is left untouched until the first poll.
    pub fn new() -> Self {
        Self
    }
}

/// Restores cooked mode when dropped, including on early return.
struct RawModeGuard;

impl RawModeGuard {
    fn enter() -> AppResult<Self> {
        enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

impl QuitSource for TerminalQuit {
    fn poll_quit(&mut self, timeout: Duration) -> AppResult<bool> {
        let _raw = RawModeGuard::enter()?;
        if !event::poll(timeout)? {
            return Ok(false);
        }
        // Drain everything already queued so stray keys do not pile up
        loop {
            if let Event::Key(key) = event::read()? {
                if is_quit_key(&key) {
                    return Ok(true);
                }
            }
            if !event::poll(Duration::ZERO)? {
                return Ok(false);
            }
        }
    }
}

/// Line-based quit from a non-interactive reader.
#[derive(Debug)]
pub struct LineQuit {
    lines: Receiver<String>,
    closed: bool,
}

impl LineQuit {
    /// Read lines from `reader` on a background thread.
    pub fn spawn<R>(reader: R) -> AppResult<Self>
    where
        R: BufRead + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("quit-input".to_string())
            .spawn(move || {
                for line in reader.lines() {
                    let Ok(line) = line else { break };
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            })
            .map_err(|source| HarnessError::ThreadSpawn {
                module: "quit-input",
                source,
            })?;
        Ok(Self {
            lines: rx,
            closed: false,
        })
    }

    /// Read lines from the process's stdin.
    pub fn stdin() -> AppResult<Self> {
        Self::spawn(std::io::BufReader::new(std::io::stdin()))
    }
}

impl QuitSource for LineQuit {
    fn poll_quit(&mut self, timeout: Duration) -> AppResult<bool> {
        if self.closed {
            // End of input never quits; other shutdown sources still apply
            thread::sleep(timeout);
            return Ok(false);
        }
        match self.lines.recv_timeout(timeout) {
            Ok(line) => Ok(line.trim().eq_ignore_ascii_case("q")),
            Err(RecvTimeoutError::Timeout) => Ok(false),
            Err(RecvTimeoutError::Disconnected) => {
                debug!("operator input closed");
                self.closed = true;
                Ok(false)
            }
        }
    }
}
