//! Console and button over standard input.
//!
//! [`StdioConsole`] reads the serial console directly; on ESP-IDF stdin is
//! UART0. On the host, [`stdin_terminal`] shares one stdin between the
//! console and a keyboard-driven button: the lines `press` and `hold`
//! simulate short and long presses, everything else goes to the console.

use super::{Button, Console, PlatformError};
use log::{debug, warn};
use std::io::BufRead;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

/// Simulated duration of a `press` line.
pub const SHORT_PRESS: Duration = Duration::from_millis(200);

/// Console on the process's stdin/stdout.
#[derive(Debug, Default)]
pub struct StdioConsole;

impl StdioConsole {
    pub fn new() -> Self {
        Self
    }
}

impl Console for StdioConsole {
    fn write_line(&mut self, line: &str) {
        println!("{}", line);
    }

    fn read_line(&mut self) -> Result<String, PlatformError> {
        let mut line = String::new();
        if std::io::stdin().read_line(&mut line)? == 0 {
            return Err(PlatformError::ConsoleClosed);
        }
        Ok(line)
    }
}

/// Console fed by the stdin reader thread.
pub struct LineConsole {
    lines: Receiver<String>,
}

impl LineConsole {
    pub fn new(lines: Receiver<String>) -> Self {
        Self { lines }
    }
}

impl Console for LineConsole {
    fn write_line(&mut self, line: &str) {
        println!("{}", line);
    }

    fn read_line(&mut self) -> Result<String, PlatformError> {
        self.lines.recv().map_err(|_| PlatformError::ConsoleClosed)
    }
}

/// Button held for a requested duration, one press at a time.
pub struct KeyboardButton {
    presses: Receiver<Duration>,
    held_until: Option<Instant>,
}

impl KeyboardButton {
    pub fn new(presses: Receiver<Duration>) -> Self {
        Self {
            presses,
            held_until: None,
        }
    }
}

impl Button for KeyboardButton {
    fn is_pressed(&mut self) -> bool {
        let now = Instant::now();
        if self.held_until.is_none() {
            match self.presses.try_recv() {
                Ok(duration) => self.held_until = Some(now + duration),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return false,
            }
        }
        match self.held_until {
            Some(until) if now < until => true,
            _ => {
                self.held_until = None;
                false
            }
        }
    }
}

/// Send one stdin line to the button or the console.
fn route_line(line: String, hold: Duration, button: &Sender<Duration>, console: &Sender<String>) {
    let sent = match line.trim() {
        "press" => button.send(SHORT_PRESS).is_ok(),
        "hold" => button.send(hold).is_ok(),
        _ => console.send(line).is_ok(),
    };
    if !sent {
        debug!("Terminal input dropped, receiver gone");
    }
}

/// Spawn the stdin reader and return the button and console it feeds.
///
/// `hold` is how long a `hold` line keeps the button down; it should be at
/// least the long-press threshold.
pub fn stdin_terminal(hold: Duration) -> (KeyboardButton, LineConsole) {
    let (button_tx, button_rx) = mpsc::channel();
    let (console_tx, console_rx) = mpsc::channel();

    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => route_line(line, hold, &button_tx, &console_tx),
                Err(e) => {
                    warn!("Failed to read stdin: {}", e);
                    break;
                }
            }
        }
    });

    (KeyboardButton::new(button_rx), LineConsole::new(console_rx))
}
