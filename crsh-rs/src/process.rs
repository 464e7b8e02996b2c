//! External command execution.
//!
//! The interpreter hands each pipeline to a [`CommandRunner`] as a list of
//! [`Stage`]s and receives one [`StageStatus`] per stage.  [`ProcessRunner`]
//! is the real implementation: it spawns the stages with `tokio::process`,
//! connects each stage's stdout to the next stage's stdin, and waits for all
//! of them on a current-thread runtime while listening for Ctrl-C.

use std::io;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};

use tokio::process::{Child, Command};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, warn};

/// Exit status reported for a stage that could not be started.
pub const NOT_FOUND_STATUS: i32 = 127;

/// Status stored for an interrupted pipeline (128 + SIGINT).
pub const INTERRUPTED_STATUS: i32 = 130;

// ── Stage ─────────────────────────────────────────────────────────────────────

/// One program invocation within a pipeline, with its arguments already
/// expanded to strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub program: String,
    pub args: Vec<String>,
}

impl Stage {
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Stage {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Exited(i32),
    /// The program could not be started.
    NotStarted(io::ErrorKind),
    /// The stage was cancelled by the user (Ctrl-C).
    Interrupted,
}

impl StageStatus {
    /// Numeric status as stored in `STATUS`.
    pub fn code(self) -> i32 {
        match self {
            StageStatus::Exited(code) => code,
            StageStatus::NotStarted(_) => NOT_FOUND_STATUS,
            StageStatus::Interrupted => INTERRUPTED_STATUS,
        }
    }

    /// Diagnostic for a stage of `program` that never ran.
    pub fn spawn_error(self, program: &str) -> Option<String> {
        match self {
            StageStatus::NotStarted(io::ErrorKind::NotFound) => {
                Some(format!("{program}: command not found"))
            }
            StageStatus::NotStarted(kind) => Some(format!("{program}: {}", io::Error::from(kind))),
            _ => None,
        }
    }

    fn from_exit(status: ExitStatus) -> Self {
        match (status.code(), status.signal()) {
            (Some(code), _) => StageStatus::Exited(code),
            (None, Some(libc::SIGINT)) => StageStatus::Interrupted,
            (None, Some(sig)) => StageStatus::Exited(128 + sig),
            (None, None) => StageStatus::Exited(1),
        }
    }
}

// ── CommandRunner ─────────────────────────────────────────────────────────────

/// Runs a pipeline and reports one status per stage, in stage order.
pub trait CommandRunner {
    fn run(&mut self, stages: &[Stage]) -> Vec<StageStatus>;
}

impl<R: CommandRunner + ?Sized> CommandRunner for Box<R> {
    fn run(&mut self, stages: &[Stage]) -> Vec<StageStatus> {
        (**self).run(stages)
    }
}

// ── ProcessRunner ─────────────────────────────────────────────────────────────

/// Spawns real processes.
pub struct ProcessRunner {
    rt: tokio::runtime::Runtime,
}

impl ProcessRunner {
    pub fn new() -> io::Result<Self> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(ProcessRunner { rt })
    }

    /// Take over SIGINT for the rest of the process.  Afterwards Ctrl-C only
    /// cancels a running pipeline; at the prompt it is ignored.  Spawned
    /// programs start with the default disposition.
    pub fn trap_interrupts(&self) -> io::Result<()> {
        self.rt
            .block_on(async { signal(SignalKind::interrupt()) })
            .map(drop)
    }
}

impl CommandRunner for ProcessRunner {
    fn run(&mut self, stages: &[Stage]) -> Vec<StageStatus> {
        self.rt.block_on(run_pipeline(stages))
    }
}

async fn run_pipeline(stages: &[Stage]) -> Vec<StageStatus> {
    let mut statuses = vec![StageStatus::Exited(0); stages.len()];
    let mut children: Vec<(usize, Child)> = Vec::with_capacity(stages.len());
    let mut upstream: Option<Stdio> = None;

    for (i, stage) in stages.iter().enumerate() {
        let last = i + 1 == stages.len();
        let mut cmd = Command::new(&stage.program);
        cmd.args(&stage.args)
            .stdin(upstream.take().unwrap_or_else(Stdio::inherit))
            .stdout(if last { Stdio::inherit() } else { Stdio::piped() })
            .kill_on_drop(true);

        match cmd.spawn() {
            Ok(mut child) => {
                debug!(program = %stage.program, pid = ?child.id(), "spawned stage");
                if !last {
                    upstream = child.stdout.take().and_then(|out| out.try_into().ok());
                }
                children.push((i, child));
            }
            Err(e) => {
                debug!(program = %stage.program, error = %e, "failed to spawn stage");
                statuses[i] = StageStatus::NotStarted(e.kind());
                // The next stage sees end of input.
                upstream = Some(Stdio::null());
            }
        }
    }

    let finished = tokio::select! {
        done = wait_all(&mut children) => Some(done),
        _ = tokio::signal::ctrl_c() => None,
    };

    match finished {
        Some(done) => {
            for (i, status) in done {
                statuses[i] = status;
            }
        }
        None => {
            debug!("pipeline interrupted");
            for (i, child) in &mut children {
                if let Err(e) = child.start_kill() {
                    debug!(error = %e, "kill after interrupt");
                }
                let _ = child.wait().await;
                statuses[*i] = StageStatus::Interrupted;
            }
        }
    }
    statuses
}

async fn wait_all(children: &mut [(usize, Child)]) -> Vec<(usize, StageStatus)> {
    let mut done = Vec::with_capacity(children.len());
    for (i, child) in children.iter_mut() {
        let status = match child.wait().await {
            Ok(status) => StageStatus::from_exit(status),
            Err(e) => {
                warn!(error = %e, "wait failed");
                StageStatus::Exited(1)
            }
        };
        done.push((*i, status));
    }
    done
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(StageStatus::Exited(3).code(), 3);
        assert_eq!(StageStatus::Interrupted.code(), INTERRUPTED_STATUS);
        assert_eq!(StageStatus::NotStarted(io::ErrorKind::NotFound).code(), NOT_FOUND_STATUS);
    }

    #[test]
    fn spawn_errors_name_the_program() {
        let msg = StageStatus::NotStarted(io::ErrorKind::NotFound).spawn_error("frob");
        assert_eq!(msg.as_deref(), Some("frob: command not found"));
        let msg = StageStatus::NotStarted(io::ErrorKind::PermissionDenied).spawn_error("./x");
        assert!(msg.is_some_and(|m| m.starts_with("./x: ")));
        assert_eq!(StageStatus::Exited(1).spawn_error("false"), None);
    }

    #[test]
    fn single_stage_exit_codes() {
        let mut runner = ProcessRunner::new().unwrap();
        assert_eq!(runner.run(&[Stage::new("true", Vec::<String>::new())]), vec![StageStatus::Exited(0)]);
        assert_eq!(runner.run(&[Stage::new("false", Vec::<String>::new())]), vec![StageStatus::Exited(1)]);
        assert_eq!(
            runner.run(&[Stage::new("sh", ["-c", "exit 7"])]),
            vec![StageStatus::Exited(7)]
        );
    }

    #[test]
    fn missing_program_reports_127() {
        let mut runner = ProcessRunner::new().unwrap();
        let statuses = runner.run(&[Stage::new("crsh-no-such-program-xyz", Vec::<String>::new())]);
        assert_eq!(statuses, vec![StageStatus::NotStarted(io::ErrorKind::NotFound)]);
        assert_eq!(statuses[0].code(), NOT_FOUND_STATUS);
    }

    #[test]
    fn pipeline_connects_stages() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let mut runner = ProcessRunner::new().unwrap();
        let statuses = runner.run(&[
            Stage::new("printf", ["a\\nb\\nc\\n"]),
            Stage::new("sh", ["-c".to_owned(), format!("wc -l > {}", out.display())]),
        ]);
        assert_eq!(statuses, vec![StageStatus::Exited(0), StageStatus::Exited(0)]);
        let count = std::fs::read_to_string(&out).unwrap();
        assert_eq!(count.trim(), "3");
    }

    #[test]
    fn last_stage_status_is_reported_last() {
        let mut runner = ProcessRunner::new().unwrap();
        let statuses = runner.run(&[
            Stage::new("true", Vec::<String>::new()),
            Stage::new("sh", ["-c", "cat >/dev/null; exit 4"]),
        ]);
        assert_eq!(statuses.last(), Some(&StageStatus::Exited(4)));
    }
}
