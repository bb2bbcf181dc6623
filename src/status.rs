//! Terminal status output.
//!
//! Progress goes to a single stderr line that rewrites itself, as long as
//! stderr is a terminal. Everything else goes through `log`. Any message
//! logged while a progress line is showing first ends that line.

use std::fmt::Display;
use std::io::{IsTerminal, Write};

pub struct Status {
    show_progress: bool,
    terminal: bool,
    line_width: Option<usize>,
}

impl Status {
    pub fn new(show_progress: bool) -> Self {
        Self {
            show_progress,
            terminal: std::io::stderr().is_terminal(),
            line_width: None,
        }
    }

    pub fn info(&mut self, message: impl Display) {
        self.end_line();
        log::info!("{}", message);
    }

    pub fn warn(&mut self, message: impl Display) {
        self.end_line();
        log::warn!("{}", message);
    }

    pub fn progress(&mut self, message: impl Display) {
        if !self.show_progress {
            return;
        }
        if !self.terminal {
            log::debug!("{}", message);
            return;
        }

        let line = message.to_string();
        let padded = pad_line(&line, self.line_width.unwrap_or(0));
        let mut stderr = std::io::stderr().lock();
        // a broken stderr is not worth failing the run for
        let _ = write!(stderr, "\r{}", padded).and_then(|_| stderr.flush());
        self.line_width = Some(line.chars().count());
    }

    /// Terminates a pending progress line.
    pub fn end_line(&mut self) {
        if self.line_width.take().is_some() {
            eprintln!();
        }
    }
}

impl Drop for Status {
    fn drop(&mut self) {
        self.end_line();
    }
}

/// Pads `line` with spaces so it fully covers a previous line of
/// `previous_width` characters.
fn pad_line(line: &str, previous_width: usize) -> String {
    let width = line.chars().count();
    if width >= previous_width {
        return line.to_string();
    }
    format!("{}{}", line, " ".repeat(previous_width - width))
}
