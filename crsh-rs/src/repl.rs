//! The read-eval-print loop.
//!
//! Each iteration shows the prompt taken from the `PROMPT` variable, reads a
//! line, and executes it.  Input that stops in the middle of a construct
//! (an open bracket, a trailing `|`) is held back and completed with further
//! lines under the `PROMPT2` prompt.  Lex, parse and runtime errors are
//! reported to the sink and the loop carries on; only an internal error or
//! a failing line source ends it abnormally.

use tracing::{debug, error};

use crate::input::LineSource;
use crate::output::OutputSink;
use crate::process::CommandRunner;
use crate::script::{Error, Executor, Result, Status, Value};

pub const DEFAULT_PROMPT: &str = "$> ";
pub const DEFAULT_PROMPT2: &str = "> ";

/// Status recorded for an input that failed with an error.
pub const ERROR_STATUS: i32 = 1;

pub struct Repl<L, R, S> {
    source: L,
    exec: Executor<R, S>,
    status: i32,
}

impl<L: LineSource, R: CommandRunner, S: OutputSink> Repl<L, R, S> {
    pub fn new(source: L, runner: R, sink: S) -> Self {
        Repl::with_executor(source, Executor::new(runner, sink))
    }

    /// Run lines from `source` against an existing executor, e.g. one that
    /// already loaded the rc file.
    pub fn with_executor(source: L, exec: Executor<R, S>) -> Self {
        Repl {
            source,
            exec,
            status: 0,
        }
    }

    pub fn executor(&self) -> &Executor<R, S> {
        &self.exec
    }

    pub fn executor_mut(&mut self) -> &mut Executor<R, S> {
        &mut self.exec
    }

    pub fn into_executor(self) -> Executor<R, S> {
        self.exec
    }

    /// Run until end of input or `exit`, returning the shell's exit status.
    ///
    /// At end of input the status is that of the last input line.
    pub fn run(&mut self) -> Result<i32> {
        let mut buffer = String::new();
        loop {
            let prompt = if buffer.is_empty() {
                self.prompt("PROMPT", DEFAULT_PROMPT)
            } else {
                self.prompt("PROMPT2", DEFAULT_PROMPT2)
            };
            self.exec.sink_mut().prompt(&prompt);

            let Some(line) = self.source.read_line()? else {
                if !buffer.is_empty() {
                    // Report the construct that was never closed.
                    if let Err(e) = self.exec.run_source(&buffer) {
                        self.report(&e);
                    }
                }
                debug!(status = self.status, "end of input");
                return Ok(self.status);
            };

            if !buffer.is_empty() {
                buffer.push('\n');
            }
            buffer.push_str(&line);

            match self.exec.run_source(&buffer) {
                Ok(outcome) => {
                    buffer.clear();
                    match outcome.status {
                        Status::Exit(code) => {
                            debug!(code, "exit");
                            return Ok(code);
                        }
                        Status::Continue(code) => self.status = code,
                    }
                    if let Some(v) = outcome.value {
                        self.echo(&v);
                    }
                }
                Err(e) if e.is_incomplete() => {}
                Err(e) if e.is_internal() => {
                    error!(error = %e, "internal error");
                    return Err(e);
                }
                Err(e) => {
                    buffer.clear();
                    self.report(&e);
                }
            }
        }
    }

    /// Current value of the prompt variable `name`, or `default` when it is
    /// unbound or not a string.
    fn prompt(&self, name: &str, default: &str) -> String {
        match self.exec.env().get_var(name) {
            Some(v @ Value::String(_)) => v.to_string(),
            _ => default.to_owned(),
        }
    }

    fn echo(&mut self, v: &Value) {
        if matches!(v, Value::String(s) if s.is_empty()) {
            return;
        }
        let text = v.to_string();
        self.exec.sink_mut().print(&text);
    }

    fn report(&mut self, e: &Error) {
        self.status = ERROR_STATUS;
        self.exec.sink_mut().error(&e.to_string());
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
