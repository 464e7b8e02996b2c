//! Line sources for the REPL.
//!
//! The shell reads one logical line at a time through [`LineSource`].
//! [`StdinLines`] reads standard input (or any buffered reader, such as a
//! script file); [`ScriptedLines`] replays a fixed list and is what tests
//! drive the REPL with.

use std::collections::VecDeque;
use std::io::{self, BufRead};

/// Produces input lines; `Ok(None)` signals end of input.
pub trait LineSource {
    fn read_line(&mut self) -> io::Result<Option<String>>;
}

// ── StdinLines ────────────────────────────────────────────────────────────────

/// Reads lines from a buffered reader, stripping the line terminator.
pub struct StdinLines<R = io::StdinLock<'static>> {
    reader: R,
    buf: String,
}

impl StdinLines {
    pub fn stdin() -> Self {
        StdinLines::new(io::stdin().lock())
    }
}

impl<R: BufRead> StdinLines<R> {
    pub fn new(reader: R) -> Self {
        StdinLines {
            reader,
            buf: String::new(),
        }
    }
}

impl<R: BufRead> LineSource for StdinLines<R> {
    fn read_line(&mut self) -> io::Result<Option<String>> {
        self.buf.clear();
        if self.reader.read_line(&mut self.buf)? == 0 {
            return Ok(None);
        }
        let line = self.buf.strip_suffix('\n').unwrap_or(&self.buf);
        let line = line.strip_suffix('\r').unwrap_or(line);
        Ok(Some(line.to_owned()))
    }
}

// ── ScriptedLines ─────────────────────────────────────────────────────────────

/// Replays a fixed sequence of lines, then reports end of input.
#[derive(Debug, Default, Clone)]
pub struct ScriptedLines {
    lines: VecDeque<String>,
}

impl ScriptedLines {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ScriptedLines {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.lines.len()
    }
}

impl LineSource for ScriptedLines {
    fn read_line(&mut self) -> io::Result<Option<String>> {
        Ok(self.lines.pop_front())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
