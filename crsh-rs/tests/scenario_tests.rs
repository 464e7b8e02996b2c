//! End-to-end sessions driven through the REPL with scripted input, a
//! recording sink and a fake command runner.

use std::cell::RefCell;
use std::rc::Rc;

use crsh::input::ScriptedLines;
use crsh::output::BufferSink;
use crsh::process::{CommandRunner, Stage, StageStatus};
use crsh::repl::Repl;
use crsh::script::{Error, Executor, Value};

/// Records every pipeline it is asked to run; all stages succeed unless a
/// program is named in `failing`.
#[derive(Clone, Default)]
struct Recorder {
    log: Rc<RefCell<Vec<Vec<Stage>>>>,
    failing: Vec<(&'static str, StageStatus)>,
}

impl CommandRunner for Recorder {
    fn run(&mut self, stages: &[Stage]) -> Vec<StageStatus> {
        self.log.borrow_mut().push(stages.to_vec());
        stages
            .iter()
            .map(|s| {
                self.failing
                    .iter()
                    .find(|(name, _)| *name == s.program)
                    .map_or(StageStatus::Exited(0), |(_, status)| *status)
            })
            .collect()
    }
}

struct Session {
    code: i32,
    sink: BufferSink,
    exec: Executor<Recorder, BufferSink>,
}

fn session_with(runner: Recorder, lines: &[&str]) -> Session {
    let mut repl = Repl::new(ScriptedLines::new(lines.iter().copied()), runner, BufferSink::new());
    let code = repl.run().expect("repl failed");
    let exec = repl.into_executor();
    Session {
        code,
        sink: exec.sink().clone(),
        exec,
    }
}

fn session(lines: &[&str]) -> Session {
    session_with(Recorder::default(), lines)
}

fn ints(ns: &[i64]) -> Value {
    Value::array(ns.iter().copied().map(Value::Integer))
}

// ── Scenarios ─────────────────────────────────────────────────────────────────

#[test]
fn assignment_then_lookup() {
    let s = session(&["x = 5", "x"]);
    assert_eq!(s.sink.output, vec!["5"]);
    assert!(s.sink.errors.is_empty());
    assert_eq!(s.exec.env().get_var("x"), Some(Value::Integer(5)));
}

#[test]
fn append_by_indexing_one_past_the_end() {
    let s = session(&["a = [1, 2, 3]", "a[3] = 4", "a"]);
    assert_eq!(s.exec.env().get_var("a"), Some(ints(&[1, 2, 3, 4])));
    assert_eq!(s.sink.output, vec!["[1, 2, 3, 4]"]);
}

#[test]
fn prompt_variable_changes_next_prompt() {
    let s = session(&["PROMPT = \"sh> \""]);
    assert_eq!(s.sink.prompts, vec!["$> ", "sh> "]);
}

#[test]
fn unbound_name_is_reported_and_session_continues() {
    let s = session(&["y", "1"]);
    assert_eq!(s.sink.errors.len(), 1);
    assert_eq!(s.sink.errors[0], Error::BareName("y".into()).to_string());
    assert_eq!(s.sink.prompts.len(), 3);
    assert_eq!(s.sink.output, vec!["1"]);
}

#[test]
fn arity_mismatch() {
    let s = session(&["f(n) = n", "f(1,2)"]);
    assert_eq!(s.sink.errors.len(), 1);
    assert!(s.sink.errors[0].starts_with("arity error"), "{:?}", s.sink.errors);
}

// ── Longer sessions ───────────────────────────────────────────────────────────

#[test]
fn functions_across_lines() {
    let s = session(&[
        "fn fib(n) {",
        "  if n < 2 { return n }",
        "  fib(n - 1) + fib(n - 2)",
        "}",
        "print(fib(15))",
        "map_fn = fn(f, xs) { out = []; i = 0; while i < len(xs) { out[i] = f(xs[i]); i = i + 1 }; out }",
        "map_fn(fn(x) { x * x }, range(4))",
    ]);
    assert!(s.sink.errors.is_empty(), "{:?}", s.sink.errors);
    assert_eq!(s.sink.output, vec!["610", "[0, 1, 4, 9]"]);
}

#[test]
fn pipelines_reach_the_runner_with_expanded_words() {
    let runner = Recorder::default();
    let log = Rc::clone(&runner.log);
    let s = session_with(runner, &["pat = \"*.rs\"", "ls -la src | grep $pat", "STATUS"]);
    assert_eq!(
        *log.borrow(),
        vec![vec![
            Stage::new("ls", ["-la", "src"]),
            Stage::new("grep", ["*.rs"]),
        ]]
    );
    assert_eq!(s.sink.output, vec!["0"]);
}

#[test]
fn failing_pipeline_sets_status_without_error() {
    let runner = Recorder {
        failing: vec![("grep", StageStatus::Exited(1))],
        ..Recorder::default()
    };
    let s = session_with(runner, &["grep -q needle haystack.txt", "STATUS"]);
    assert!(s.sink.errors.is_empty());
    assert_eq!(s.sink.output, vec!["1"]);
    assert_eq!(s.code, 1);
}

#[test]
fn interrupted_pipeline_skips_rest_of_line() {
    let runner = Recorder {
        failing: vec![("sleep", StageStatus::Interrupted)],
        ..Recorder::default()
    };
    let s = session_with(runner, &["sleep 100; print(\"skipped\")", "print(STATUS)"]);
    assert_eq!(s.sink.output, vec!["130"]);
    assert!(s.sink.errors.is_empty());
}

#[test]
fn bang_forces_command_mode() {
    let runner = Recorder::default();
    let log = Rc::clone(&runner.log);
    session_with(runner, &["!date"]);
    assert_eq!(log.borrow()[0], vec![Stage::new("date", Vec::<String>::new())]);
}

#[test]
fn exit_code_from_script() {
    let s = session(&["n = 3", "exit n * 2", "print(\"unreachable\")"]);
    assert_eq!(s.code, 6);
    assert!(s.sink.output.is_empty());
}

#[test]
fn parse_error_reports_position() {
    let s = session(&["x = (1 +", ")"]);
    assert_eq!(s.sink.errors.len(), 1);
    assert!(s.sink.errors[0].contains("line 2"), "{:?}", s.sink.errors);
}
