//! Startup (`.crshrc`) file handling.
//!
//! The rc file is ordinary crsh source, run line by line before the first
//! prompt:
//!
//! | Input | Handling |
//! |-------|----------|
//! | Line ending in `\` | joined with the next line |
//! | Blank line, or first non-blank character `#` | skipped |
//! | Unclosed construct (`fn f() {`, `[1,`) | completed by the following lines |
//! | Anything else | executed |
//!
//! A failing line is recorded as a [`ConfigError`] and loading continues.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::output::OutputSink;
use crate::process::CommandRunner;
use crate::script::{Executor, Status};

/// Environment variable naming an explicit rc file.
pub const RC_ENV: &str = "CRSHRC";

// ── Public API ────────────────────────────────────────────────────────────────

/// A non-fatal error encountered while running an rc file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub line: usize,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// What running an rc file did.
#[derive(Debug, Default)]
pub struct RcReport {
    pub errors: Vec<ConfigError>,
    /// Set when the file ran `exit`.
    pub exit: Option<i32>,
}

/// An rc file split into logical lines.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RcScript {
    /// `(first physical line number, text)` pairs.
    lines: Vec<(usize, String)>,
}

impl RcScript {
    pub fn load_str(s: &str) -> Self {
        let mut lines = Vec::new();
        let mut current: Option<(usize, String)> = None;

        for (i, raw) in s.lines().enumerate() {
            let lineno = i + 1;
            let (start, mut text) = current.take().unwrap_or((lineno, String::new()));
            match raw.strip_suffix('\\') {
                Some(head) => {
                    text.push_str(head);
                    current = Some((start, text));
                }
                None => {
                    text.push_str(raw);
                    let trimmed = text.trim();
                    if !trimmed.is_empty() && !trimmed.starts_with('#') {
                        lines.push((start, text));
                    }
                }
            }
        }
        // Trailing backslash on the last line.
        if let Some((start, text)) = current {
            if !text.trim().is_empty() {
                lines.push((start, text));
            }
        }
        RcScript { lines }
    }

    pub fn load_file(path: &Path) -> std::io::Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Ok(Self::load_str(&s))
    }

    pub fn lines(&self) -> impl Iterator<Item = (usize, &str)> {
        self.lines.iter().map(|(n, s)| (*n, s.as_str()))
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Execute every logical line in `exec`.
    pub fn run<R: CommandRunner, S: OutputSink>(&self, exec: &mut Executor<R, S>) -> RcReport {
        let mut report = RcReport::default();
        let mut pending: Option<(usize, String)> = None;

        for (lineno, text) in self.lines() {
            let (start, source) = match pending.take() {
                Some((start, mut buf)) => {
                    buf.push('\n');
                    buf.push_str(text);
                    (start, buf)
                }
                None => (lineno, text.to_owned()),
            };
            match exec.run_source(&source) {
                Ok(outcome) => {
                    if let Status::Exit(code) = outcome.status {
                        debug!(line = start, code, "rc file called exit");
                        report.exit = Some(code);
                        return report;
                    }
                }
                Err(e) if e.is_incomplete() => pending = Some((start, source)),
                Err(e) => report.errors.push(ConfigError {
                    line: start,
                    message: e.to_string(),
                }),
            }
        }
        if let Some((start, source)) = pending {
            if let Err(e) = exec.run_source(&source) {
                report.errors.push(ConfigError {
                    line: start,
                    message: e.to_string(),
                });
            }
        }
        report
    }
}

/// Load and run the rc file at `path`, logging every failure.
pub fn run_file<R: CommandRunner, S: OutputSink>(path: &Path, exec: &mut Executor<R, S>) -> RcReport {
    let script = match RcScript::load_file(path) {
        Ok(script) => script,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read rc file");
            return RcReport::default();
        }
    };
    debug!(path = %path.display(), lines = script.len(), "loading rc file");
    let report = script.run(exec);
    for err in &report.errors {
        warn!(path = %path.display(), "{err}");
    }
    report
}

// ── Locating the rc file ──────────────────────────────────────────────────────

/// Find the user's rc file: `$CRSHRC`, then `~/.crshrc`, then
/// `<config dir>/crsh/crshrc`.  Returns the first that exists.
pub fn find_rc_file() -> Option<PathBuf> {
    let explicit = std::env::var_os(RC_ENV).map(PathBuf::from);
    let base = directories::BaseDirs::new();
    search_rc_file(
        explicit,
        base.as_ref().map(|b| b.home_dir()),
        base.as_ref().map(|b| b.config_dir()),
    )
}

fn search_rc_file(explicit: Option<PathBuf>, home: Option<&Path>, config: Option<&Path>) -> Option<PathBuf> {
    explicit
        .into_iter()
        .chain(home.map(|h| h.join(".crshrc")))
        .chain(config.map(|c| c.join("crsh").join("crshrc")))
        .find(|p| p.is_file())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
