//! Display sinks.
//!
//! Everything the shell shows the user goes through an [`OutputSink`]:
//! prompts, echoed values, `print` output and error reports.

use std::io::{self, Write};

pub trait OutputSink {
    /// Show the prompt for the next line.
    fn prompt(&mut self, prompt: &str);
    /// One line of regular output.
    fn print(&mut self, line: &str);
    /// One line of diagnostic output.
    fn error(&mut self, message: &str);
}

/// Whether file descriptor `fd` refers to a terminal.
pub fn is_tty(fd: libc::c_int) -> bool {
    unsafe { libc::isatty(fd) != 0 }
}

// ── StdoutSink ────────────────────────────────────────────────────────────────

/// Writes to the process's stdout and stderr.
///
/// Prompts are only shown in interactive sessions so that piped input and
/// scripts produce clean output.
#[derive(Debug)]
pub struct StdoutSink {
    interactive: bool,
}

impl StdoutSink {
    pub fn new(interactive: bool) -> Self {
        StdoutSink { interactive }
    }

    /// Interactive when stdin is a terminal.
    pub fn detect() -> Self {
        StdoutSink::new(is_tty(libc::STDIN_FILENO))
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }
}

impl OutputSink for StdoutSink {
    fn prompt(&mut self, prompt: &str) {
        if !self.interactive {
            return;
        }
        let mut out = io::stdout().lock();
        let _ = out.write_all(prompt.as_bytes());
        let _ = out.flush();
    }

    fn print(&mut self, line: &str) {
        let mut out = io::stdout().lock();
        let _ = writeln!(out, "{line}");
        let _ = out.flush();
    }

    fn error(&mut self, message: &str) {
        eprintln!("crsh: {message}");
    }
}

// ── BufferSink ────────────────────────────────────────────────────────────────

/// Records everything in memory, for tests.
#[derive(Debug, Default, Clone)]
pub struct BufferSink {
    pub prompts: Vec<String>,
    pub output: Vec<String>,
    pub errors: Vec<String>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutputSink for BufferSink {
    fn prompt(&mut self, prompt: &str) {
        self.prompts.push(prompt.to_owned());
    }

    fn print(&mut self, line: &str) {
        self.output.push(line.to_owned());
    }

    fn error(&mut self, message: &str) {
        self.errors.push(message.to_owned());
    }
}

impl<S: OutputSink + ?Sized> OutputSink for Box<S> {
    fn prompt(&mut self, prompt: &str) {
        (**self).prompt(prompt)
    }

    fn print(&mut self, line: &str) {
        (**self).print(line)
    }

    fn error(&mut self, message: &str) {
        (**self).error(message)
    }
}
