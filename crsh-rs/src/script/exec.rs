//! Tree-walking executor.
//!
//! [`Executor`] owns the [`Environment`] plus the two outward-facing
//! collaborators: the [`CommandRunner`] that pipelines are delegated to and
//! the [`OutputSink`] that `print` and `cd` write to.
//!
//! Expressions are evaluated onto the environment's evaluation stack: every
//! call to `eval` pushes exactly one value, and operators pop their operands
//! back off.  A top-level statement therefore leaves the stack at the depth
//! it found it; on error the stack is truncated back to that depth.
//!
//! `exit` and Ctrl-C must unwind through function calls that sit in the
//! middle of an expression.  The call records the flow in `pending`, pushes
//! a placeholder, and every enclosing evaluation step passes placeholders
//! through untouched until the statement boundary picks the flow up.

use std::cmp::Ordering;
use std::path::PathBuf;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::output::OutputSink;
use crate::process::{CommandRunner, Stage, StageStatus, INTERRUPTED_STATUS};
use super::builtins::{call_builtin, is_builtin};
use super::env::{release_frame, Environment, Scope};
use super::error::{Error, Result};
use super::lexer::{Word, WordPart};
use super::parser::{parse_program, BinOp, CommandStage, Expr, FnBody, FnDecl, Stmt, Target, UnaryOp};
use super::stack::ensure_sufficient_stack;
use super::value::{Function, Map, Value};

/// Deepest allowed nesting of user function calls.
pub const MAX_CALL_DEPTH: usize = 256;

// ── Status ────────────────────────────────────────────────────────────────────

/// Whether the REPL should keep going after an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Keep reading; carries the last pipeline status.
    Continue(i32),
    /// Terminate the shell with this exit code.
    Exit(i32),
}

impl Status {
    pub fn is_continue(self) -> bool {
        matches!(self, Status::Continue(_))
    }

    pub fn code(self) -> i32 {
        match self {
            Status::Continue(code) | Status::Exit(code) => code,
        }
    }
}

/// Result of executing one input.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub status: Status,
    /// Value of the final statement when it was a bare expression.
    pub value: Option<Value>,
}

/// Control flow out of a statement.
#[derive(Debug, Clone)]
enum Flow {
    Next(Option<Value>),
    Return(Value),
    Exit(i32),
    Interrupted,
}

// ── Executor ──────────────────────────────────────────────────────────────────

pub struct Executor<R, S> {
    env: Environment,
    runner: R,
    sink: S,
    depth: usize,
    pending: Option<Flow>,
    last_status: i32,
}

impl<R: CommandRunner, S: OutputSink> Executor<R, S> {
    pub fn new(runner: R, sink: S) -> Self {
        let mut env = Environment::new();
        env.set_global("STATUS", Value::Integer(0));
        Executor {
            env,
            runner,
            sink,
            depth: 0,
            pending: None,
            last_status: 0,
        }
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn runner_mut(&mut self) -> &mut R {
        &mut self.runner
    }

    /// Status of the most recent pipeline.
    pub fn last_status(&self) -> i32 {
        self.last_status
    }

    /// Parse and execute `src`.
    pub fn run_source(&mut self, src: &str) -> Result<Outcome> {
        let program = parse_program(src)?;
        self.execute(&program)
    }

    /// Execute top-level statements in order.
    ///
    /// A runtime error abandons the remaining statements.  An interrupted
    /// pipeline does the same but is not an error.
    pub fn execute(&mut self, program: &[Stmt]) -> Result<Outcome> {
        let mut value = None;
        for stmt in program {
            let depth = self.env.stack_depth();
            let flow = self.exec_stmt(stmt);
            self.pending = None;
            let flow = match flow {
                Ok(flow) => flow,
                Err(e) => {
                    self.env.truncate_stack(depth);
                    return Err(e);
                }
            };
            debug_assert_eq!(self.env.stack_depth(), depth, "statement left values on the stack");
            match flow {
                Flow::Next(v) => value = v,
                Flow::Return(_) => return Err(Error::runtime("`return` outside of a function")),
                Flow::Exit(code) => {
                    return Ok(Outcome {
                        status: Status::Exit(code),
                        value: None,
                    })
                }
                Flow::Interrupted => {
                    return Ok(Outcome {
                        status: Status::Continue(INTERRUPTED_STATUS),
                        value: None,
                    })
                }
            }
        }
        Ok(Outcome {
            status: Status::Continue(self.last_status),
            value,
        })
    }

    // ── Statements ────────────────────────────────────────────────────────────

    fn take_pending(&mut self) -> Flow {
        self.pending.take().unwrap_or(Flow::Next(None))
    }

    fn exec_block(&mut self, stmts: &[Stmt]) -> Result<Flow> {
        let mut last = Flow::Next(None);
        for stmt in stmts {
            match self.exec_stmt(stmt)? {
                Flow::Next(v) => last = Flow::Next(v),
                other => return Ok(other),
            }
        }
        Ok(last)
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> Result<Flow> {
        trace!(?stmt, "exec");
        let flow = match stmt {
            Stmt::Expr(expr) => {
                let value = self.eval_or_pending(expr).map_err(|e| bare_name(expr, e))?;
                match value {
                    Some(v) => Flow::Next(Some(v)),
                    None => self.take_pending(),
                }
            }
            Stmt::Assign(target, rhs) => {
                let Some(v) = self.eval_or_pending(rhs)? else {
                    return Ok(self.take_pending());
                };
                self.assign(target, v)?;
                self.take_pending()
            }
            Stmt::FnDef(decl) => {
                self.define(decl);
                Flow::Next(None)
            }
            Stmt::Pipeline(stages) => self.exec_pipeline(stages)?,
            Stmt::If {
                cond,
                then_block,
                else_block,
            } => {
                let Some(c) = self.eval_or_pending(cond)? else {
                    return Ok(self.take_pending());
                };
                if c.is_truthy() {
                    self.exec_block(then_block)?
                } else if let Some(block) = else_block {
                    self.exec_block(block)?
                } else {
                    Flow::Next(None)
                }
            }
            Stmt::While { cond, body } => loop {
                let Some(c) = self.eval_or_pending(cond)? else {
                    return Ok(self.take_pending());
                };
                if !c.is_truthy() {
                    break Flow::Next(None);
                }
                match self.exec_block(body)? {
                    Flow::Next(_) => {}
                    other => break other,
                }
            },
            Stmt::Return(expr) => {
                let value = match expr {
                    Some(e) => match self.eval_or_pending(e)? {
                        Some(v) => v,
                        None => return Ok(self.take_pending()),
                    },
                    None => Value::default(),
                };
                Flow::Return(value)
            }
            Stmt::Exit(expr) => {
                let code = match expr {
                    Some(e) => match self.eval_or_pending(e)? {
                        Some(v) => exit_code(&v)?,
                        None => return Ok(self.take_pending()),
                    },
                    None => 0,
                };
                Flow::Exit(code)
            }
            Stmt::Global(names) => {
                for name in names {
                    self.env.declare_global(name);
                }
                Flow::Next(None)
            }
        };
        Ok(flow)
    }

    fn define(&mut self, decl: &Rc<FnDecl>) {
        let func = self.closure(decl);
        if let Some(name) = &decl.name {
            debug!(name = %name, "define function");
            self.env.set_var(name, func);
        }
    }

    fn closure(&self, decl: &Rc<FnDecl>) -> Value {
        Value::Function(Rc::new(Function {
            decl: Rc::clone(decl),
            closure: Rc::clone(self.env.current_scope()),
        }))
    }

    fn assign(&mut self, target: &Target, value: Value) -> Result<()> {
        if target.path.is_empty() {
            self.env.set_var(&target.name, value);
            return Ok(());
        }
        let mut keys = Vec::with_capacity(target.path.len());
        for e in &target.path {
            match self.eval_or_pending(e)? {
                Some(k) => keys.push(k),
                None => return Ok(()),
            }
        }
        let mut container = self
            .env
            .get_var(&target.name)
            .ok_or_else(|| Error::Name(target.name.clone()))?;
        store_path(&mut container, &keys, value)?;
        self.env.set_var(&target.name, container);
        Ok(())
    }

    // ── Pipelines ─────────────────────────────────────────────────────────────

    fn exec_pipeline(&mut self, stages: &[CommandStage]) -> Result<Flow> {
        let resolved = stages
            .iter()
            .map(|stage| self.expand_stage(stage))
            .collect::<Result<Vec<_>>>()?;

        let statuses = match resolved.as_slice() {
            [stage] if stage.program == "cd" => vec![self.change_dir(&stage.args)],
            _ => {
                debug!(stages = resolved.len(), "run pipeline");
                self.runner.run(&resolved)
            }
        };

        for (stage, status) in resolved.iter().zip(&statuses) {
            if let Some(message) = status.spawn_error(&stage.program) {
                self.sink.error(&message);
            }
        }

        let interrupted = statuses.contains(&StageStatus::Interrupted);
        let code = if interrupted {
            INTERRUPTED_STATUS
        } else {
            statuses.last().map_or(0, |s| s.code())
        };
        self.last_status = code;
        self.env.set_global("STATUS", Value::Integer(i64::from(code)));
        Ok(if interrupted { Flow::Interrupted } else { Flow::Next(None) })
    }

    fn expand_stage(&self, stage: &CommandStage) -> Result<Stage> {
        let mut words = stage.words.iter().map(|w| self.expand_word(w));
        let program = words
            .next()
            .transpose()?
            .ok_or_else(|| Error::runtime("empty command"))?;
        let args = words.collect::<Result<Vec<_>>>()?;
        Ok(Stage { program, args })
    }

    /// Substitute `$name` references.  Shell variables win over the process
    /// environment.
    fn expand_word(&self, word: &Word) -> Result<String> {
        let mut out = String::new();
        for part in &word.0 {
            match part {
                WordPart::Lit(s) => out.push_str(s),
                WordPart::Var(name) => match self.env.get_var(name) {
                    Some(v) => out.push_str(&v.to_string()),
                    None => match std::env::var(name) {
                        Ok(s) => out.push_str(&s),
                        Err(_) => return Err(Error::Name(name.clone())),
                    },
                },
            }
        }
        Ok(out)
    }

    fn change_dir(&mut self, args: &[String]) -> StageStatus {
        let target = match args {
            [] => directories::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf()),
            [dir] => Some(PathBuf::from(dir)),
            _ => {
                self.sink.error("cd: too many arguments");
                return StageStatus::Exited(1);
            }
        };
        let Some(target) = target else {
            self.sink.error("cd: no home directory");
            return StageStatus::Exited(1);
        };
        match std::env::set_current_dir(&target) {
            Ok(()) => {
                debug!(dir = %target.display(), "cd");
                StageStatus::Exited(0)
            }
            Err(e) => {
                self.sink.error(&format!("cd: {}: {e}", target.display()));
                StageStatus::Exited(1)
            }
        }
    }

    // ── Expressions ───────────────────────────────────────────────────────────

    /// Evaluate `expr` and pop its value.
    pub fn eval_value(&mut self, expr: &Expr) -> Result<Value> {
        self.eval(expr)?;
        self.env.pop()
    }

    /// Like [`eval_value`](Self::eval_value), but `None` when an `exit` or
    /// interrupt is unwinding.
    fn eval_or_pending(&mut self, expr: &Expr) -> Result<Option<Value>> {
        let v = self.eval_value(expr)?;
        Ok(if self.pending.is_some() { None } else { Some(v) })
    }

    fn eval(&mut self, expr: &Expr) -> Result<()> {
        ensure_sufficient_stack(|| self.eval_inner(expr))
    }

    fn eval_inner(&mut self, expr: &Expr) -> Result<()> {
        if self.pending.is_some() {
            self.env.push(Value::default());
            return Ok(());
        }
        match expr {
            Expr::Literal(v) => self.env.push(v.clone()),
            Expr::Var(name) => {
                let v = self.env.get_var(name).ok_or_else(|| Error::Name(name.clone()))?;
                self.env.push(v);
            }
            Expr::Array(items) => {
                for item in items {
                    self.eval(item)?;
                }
                let values = self.env.pop_n(items.len())?;
                self.env.push(Value::from(values));
            }
            Expr::Map(entries) => {
                for (_, e) in entries {
                    self.eval(e)?;
                }
                let values = self.env.pop_n(entries.len())?;
                let map: Map = entries.iter().map(|(k, _)| k.clone()).zip(values).collect();
                self.env.push(Value::from(map));
            }
            Expr::Index(base, index) => {
                self.eval(base)?;
                self.eval(index)?;
                let idx = self.env.pop()?;
                let container = self.env.pop()?;
                let v = if self.pending.is_some() {
                    Value::default()
                } else {
                    index_value(&container, &idx)?
                };
                self.env.push(v);
            }
            Expr::Unary(op, operand) => {
                self.eval(operand)?;
                let v = self.env.pop()?;
                let result = if self.pending.is_some() {
                    Value::default()
                } else {
                    match op {
                        UnaryOp::Neg => v.arith_neg()?,
                        UnaryOp::Not => Value::from(!v.is_truthy()),
                    }
                };
                self.env.push(result);
            }
            Expr::Binary(op @ (BinOp::And | BinOp::Or), lhs, rhs) => {
                self.eval(lhs)?;
                let l = self.env.pop()?.is_truthy();
                let short = match op {
                    BinOp::And => !l,
                    _ => l,
                };
                let result = if short || self.pending.is_some() {
                    l
                } else {
                    self.eval(rhs)?;
                    self.env.pop()?.is_truthy()
                };
                self.env.push(Value::from(result));
            }
            Expr::Binary(op, lhs, rhs) => {
                self.eval(lhs)?;
                self.eval(rhs)?;
                let r = self.env.pop()?;
                let l = self.env.pop()?;
                let v = if self.pending.is_some() {
                    Value::default()
                } else {
                    binary(*op, &l, &r)?
                };
                self.env.push(v);
            }
            Expr::Call(callee, args) => self.eval_call(callee, args)?,
            Expr::Lambda(decl) => {
                let f = self.closure(decl);
                self.env.push(f);
            }
        }
        Ok(())
    }

    fn eval_args(&mut self, args: &[Expr]) -> Result<Vec<Value>> {
        for arg in args {
            self.eval(arg)?;
        }
        self.env.pop_n(args.len())
    }

    fn eval_call(&mut self, callee: &Expr, args: &[Expr]) -> Result<()> {
        // Unbound names fall back to built-ins.
        if let Expr::Var(name) = callee {
            if is_builtin(name) && self.env.get_var(name).is_none() {
                let argv = self.eval_args(args)?;
                let result = if self.pending.is_some() {
                    Value::default()
                } else if name == "print" {
                    self.print(&argv);
                    Value::default()
                } else {
                    call_builtin(name, argv).unwrap_or_else(|| Err(Error::Name(name.clone())))?
                };
                self.env.push(result);
                return Ok(());
            }
        }

        self.eval(callee)?;
        let argv = self.eval_args(args)?;
        let f = self.env.pop()?;
        if self.pending.is_some() {
            self.env.push(Value::default());
            return Ok(());
        }
        let func = Rc::clone(f.to_function()?);
        let result = self.call_function(&func, argv)?;
        self.env.push(result);
        Ok(())
    }

    /// Call a user function in a fresh child of its defining scope.
    pub fn call_function(&mut self, func: &Rc<Function>, args: Vec<Value>) -> Result<Value> {
        if args.len() != func.arity() {
            return Err(Error::arity(func.name(), func.arity(), args.len()));
        }
        if self.depth >= MAX_CALL_DEPTH {
            return Err(Error::runtime(format!(
                "maximum call depth of {MAX_CALL_DEPTH} exceeded in `{}`",
                func.name()
            )));
        }
        trace!(name = func.name(), depth = self.depth, "call");

        let scope = Scope::child_of(&func.closure);
        {
            let mut frame = scope.borrow_mut();
            for (param, arg) in func.decl.params.iter().zip(args) {
                frame.set_local(param.clone(), arg);
            }
        }
        let previous = self.env.enter_scope(Rc::clone(&scope));
        self.depth += 1;
        let result = self.run_body(&func.decl.body);
        self.depth -= 1;
        self.env.leave_scope(previous);
        release_frame(scope);

        match result? {
            Flow::Next(v) => Ok(v.unwrap_or_default()),
            Flow::Return(v) => Ok(v),
            flow @ (Flow::Exit(_) | Flow::Interrupted) => {
                self.pending = Some(flow);
                Ok(Value::default())
            }
        }
    }

    fn run_body(&mut self, body: &FnBody) -> Result<Flow> {
        match body {
            FnBody::Block(stmts) => self.exec_block(stmts),
            FnBody::Expr(expr) => Ok(match self.eval_or_pending(expr)? {
                Some(v) => Flow::Next(Some(v)),
                None => self.take_pending(),
            }),
        }
    }

    fn print(&mut self, args: &[Value]) {
        let line = args.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(" ");
        self.sink.print(&line);
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// An unbound name standing alone as a statement was most likely meant as a
/// program; say how to run it.
fn bare_name(expr: &Expr, err: Error) -> Error {
    match (expr, err) {
        (Expr::Var(_), Error::Name(name)) => Error::BareName(name),
        (_, err) => err,
    }
}

fn binary(op: BinOp, l: &Value, r: &Value) -> Result<Value> {
    Ok(match op {
        BinOp::Add => l.arith_add(r)?,
        BinOp::Sub => l.arith_sub(r)?,
        BinOp::Mul => l.arith_mul(r)?,
        BinOp::Div => l.arith_div(r)?,
        BinOp::Rem => l.arith_rem(r)?,
        BinOp::Eq => Value::from(l.loose_eq(r)),
        BinOp::Ne => Value::from(!l.loose_eq(r)),
        BinOp::Lt => Value::from(l.compare(r)? == Ordering::Less),
        BinOp::Le => Value::from(l.compare(r)? != Ordering::Greater),
        BinOp::Gt => Value::from(l.compare(r)? == Ordering::Greater),
        BinOp::Ge => Value::from(l.compare(r)? != Ordering::Less),
        BinOp::And => Value::from(l.is_truthy() && r.is_truthy()),
        BinOp::Or => Value::from(l.is_truthy() || r.is_truthy()),
    })
}

fn to_index(i: i64, len: usize) -> Result<usize> {
    usize::try_from(i).map_err(|_| Error::index_out_of_range(i, len))
}

fn index_value(container: &Value, index: &Value) -> Result<Value> {
    match (container, index) {
        (Value::Array(items), Value::Integer(i)) => {
            Ok(container.get_array(to_index(*i, items.len())?)?.clone())
        }
        (Value::Map(_), Value::String(key)) => container
            .get_hash(key)?
            .cloned()
            .ok_or_else(|| Error::missing_key(key)),
        (Value::String(s), Value::Integer(i)) => {
            let len = s.chars().count();
            s.chars()
                .nth(to_index(*i, len)?)
                .map(|c| Value::String(c.to_string()))
                .ok_or_else(|| Error::index_out_of_range(*i, len))
        }
        (Value::Array(_) | Value::String(_), other) => {
            Err(Error::type_mismatch("integer index", other.get_type()))
        }
        (Value::Map(_), other) => Err(Error::type_mismatch("string key", other.get_type())),
        (other, _) => Err(Error::type_mismatch("array, map or string", other.get_type())),
    }
}

/// Write `value` at `keys` inside `container`, cloning shared buffers on the way.
fn store_path(container: &mut Value, keys: &[Value], value: Value) -> Result<()> {
    let Some((key, rest)) = keys.split_first() else {
        *container = value;
        return Ok(());
    };
    match container {
        Value::Array(items) => {
            let i = match key {
                Value::Integer(i) => to_index(*i, items.len())?,
                other => return Err(Error::type_mismatch("integer index", other.get_type())),
            };
            if rest.is_empty() {
                container.put_array(i, value)
            } else {
                store_path(container.get_array_mut(i)?, rest, value)
            }
        }
        Value::Map(_) => {
            let k = match key {
                Value::String(k) => k,
                other => return Err(Error::type_mismatch("string key", other.get_type())),
            };
            if rest.is_empty() {
                container.put_hash(k.clone(), value)
            } else {
                store_path(container.get_hash_mut(k)?, rest, value)
            }
        }
        other => Err(Error::type_mismatch("array or map", other.get_type())),
    }
}

fn exit_code(v: &Value) -> Result<i32> {
    let n = v.to_integer()?;
    i32::try_from(n).map_err(|_| Error::runtime(format!("exit status {n} out of range")))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::BufferSink;
    use crate::process::NOT_FOUND_STATUS;
    use crate::script::value::ValueType;

    #[derive(Default)]
    struct FakeRunner {
        calls: Vec<Vec<Stage>>,
        reply: Option<StageStatus>,
    }

    impl CommandRunner for FakeRunner {
        fn run(&mut self, stages: &[Stage]) -> Vec<StageStatus> {
            self.calls.push(stages.to_vec());
            vec![self.reply.unwrap_or(StageStatus::Exited(0)); stages.len()]
        }
    }

    fn executor() -> Executor<FakeRunner, BufferSink> {
        Executor::new(FakeRunner::default(), BufferSink::new())
    }

    fn value(ex: &mut Executor<FakeRunner, BufferSink>, src: &str) -> Value {
        ex.run_source(src)
            .unwrap_or_else(|e| panic!("{src}: {e}"))
            .value
            .unwrap_or_else(|| panic!("{src}: no value"))
    }

    fn error(ex: &mut Executor<FakeRunner, BufferSink>, src: &str) -> Error {
        ex.run_source(src).expect_err(src)
    }

    fn ints(ns: &[i64]) -> Value {
        Value::array(ns.iter().copied().map(Value::Integer))
    }

    #[test]
    fn assign_then_read() {
        let mut ex = executor();
        let out = ex.run_source("x = 5").unwrap();
        assert_eq!(out.status, Status::Continue(0));
        assert_eq!(out.value, None);
        assert_eq!(value(&mut ex, "x"), Value::Integer(5));
    }

    #[test]
    fn append_through_index_assignment() {
        let mut ex = executor();
        ex.run_source("a = [1, 2, 3]").unwrap();
        ex.run_source("a[3] = 4").unwrap();
        assert_eq!(value(&mut ex, "a"), ints(&[1, 2, 3, 4]));
        assert!(matches!(error(&mut ex, "a[9] = 0"), Error::Index(_)));
    }

    #[test]
    fn unbound_name() {
        let mut ex = executor();
        assert!(matches!(error(&mut ex, "y"), Error::BareName(n) if n == "y"));
        assert!(matches!(error(&mut ex, "y + 1"), Error::Name(n) if n == "y"));
        assert!(matches!(error(&mut ex, "x = y"), Error::Name(n) if n == "y"));
    }

    #[test]
    fn lone_program_name_hints_at_bang() {
        let mut ex = executor();
        let err = error(&mut ex, "pwd");
        assert!(err.to_string().contains("`!pwd`"), "{err}");
        ex.run_source("!pwd").unwrap();
        assert_eq!(ex.runner().calls.len(), 1);
    }

    #[test]
    fn short_function_arity() {
        let mut ex = executor();
        ex.run_source("f(n) = n").unwrap();
        assert_eq!(value(&mut ex, "f(7)"), Value::Integer(7));
        assert!(matches!(error(&mut ex, "f(1, 2)"), Error::Arity { actual: 2, .. }));
    }

    #[test]
    fn arithmetic_and_logic() {
        let mut ex = executor();
        assert_eq!(value(&mut ex, "1 + 2 * 3 - 4 / 2"), Value::Integer(5));
        assert_eq!(value(&mut ex, "7 % 4 + 0.5"), Value::Number(3.5));
        assert_eq!(value(&mut ex, "1 < 2 && \"a\" < \"b\" || 0"), Value::Integer(1));
        assert_eq!(value(&mut ex, "0 && never_bound"), Value::Integer(0));
        assert_eq!(value(&mut ex, "1 == 1.0"), Value::Integer(1));
        assert_eq!(value(&mut ex, "-(2 + 3)"), Value::Integer(-5));
        assert!(matches!(error(&mut ex, "1 / 0"), Error::Arithmetic(_)));
    }

    #[test]
    fn closures_capture_defining_scope() {
        let mut ex = executor();
        ex.run_source("make = fn(n) { fn(x) { x + n } }").unwrap();
        ex.run_source("add2 = make(2)").unwrap();
        assert_eq!(value(&mut ex, "add2(3)"), Value::Integer(5));
    }

    #[test]
    fn call_frames_with_local_functions_are_freed() {
        let mut ex = executor();
        ex.run_source("fn outer(n) { fn inner() { n }; inner() }").unwrap();
        ex.run_source("fn keep(n) { f = fn() { n * 2 }; f() }").unwrap();
        let before = Rc::strong_count(ex.env().global_scope());
        for _ in 0..5 {
            assert_eq!(value(&mut ex, "outer(1)"), Value::Integer(1));
            assert_eq!(value(&mut ex, "keep(4)"), Value::Integer(8));
        }
        assert_eq!(Rc::strong_count(ex.env().global_scope()), before);
    }

    #[test]
    fn escaping_closures_keep_their_frame() {
        let mut ex = executor();
        ex.run_source("fn counter(n) { fn get() { n }; get }").unwrap();
        ex.run_source("g = counter(42); h = counter(7)").unwrap();
        assert_eq!(value(&mut ex, "g()"), Value::Integer(42));
        assert_eq!(value(&mut ex, "h()"), Value::Integer(7));

        ex.run_source("fn stash(n) { global saved; saved = fn() { n + 1 } }; stash(9)").unwrap();
        assert_eq!(value(&mut ex, "saved()"), Value::Integer(10));
    }

    #[test]
    fn deeply_nested_runtime_value_is_released() {
        let mut ex = executor();
        ex.run_source("a = []; i = 0; while i < 100000 { a = [a]; i = i + 1 }").unwrap();
        assert_eq!(value(&mut ex, "a[0][0][0]").get_type(), ValueType::Array);
        ex.run_source("a = 0").unwrap();
        assert_eq!(value(&mut ex, "a"), Value::Integer(0));
    }

    #[test]
    fn large_numbers_read_back_as_numbers() {
        let mut ex = executor();
        let v = value(&mut ex, "1e20 * 3");
        assert_eq!(v, Value::Number(3e20));
        assert_eq!(value(&mut ex, &v.to_string()), v);
        assert!(matches!(error(&mut ex, "int(1e300)"), Error::Type { .. }));
        assert_eq!(value(&mut ex, "int(-2.9)"), Value::Integer(-2));
    }

    #[test]
    fn scoping_is_lexical() {
        let mut ex = executor();
        ex.run_source("n = 1; f() = n; g(n) = f()").unwrap();
        assert_eq!(value(&mut ex, "g(5)"), Value::Integer(1));
    }

    #[test]
    fn assignment_is_local_by_default() {
        let mut ex = executor();
        ex.run_source("x = 1; fn set() { x = 2 }; set()").unwrap();
        assert_eq!(value(&mut ex, "x"), Value::Integer(1));
    }

    #[test]
    fn global_declaration() {
        let mut ex = executor();
        ex.run_source("count = 0; fn inc() { global count; count = count + 1 }").unwrap();
        ex.run_source("inc(); inc()").unwrap();
        assert_eq!(value(&mut ex, "count"), Value::Integer(2));
    }

    #[test]
    fn recursion() {
        let mut ex = executor();
        ex.run_source("fn fact(n) { if n <= 1 { 1 } else { n * fact(n - 1) } }").unwrap();
        assert_eq!(value(&mut ex, "fact(10)"), Value::Integer(3_628_800));
    }

    #[test]
    fn runaway_recursion_is_an_error() {
        let mut ex = executor();
        ex.run_source("fn down(n) { down(n + 1) }").unwrap();
        let err = error(&mut ex, "down(0)");
        assert!(err.to_string().contains("call depth"), "{err}");
        assert_eq!(ex.env().stack_depth(), 0);
        assert!(ex.env().is_global_scope());
    }

    #[test]
    fn early_return_from_loop() {
        let mut ex = executor();
        ex.run_source(
            "fn first_pos(a) {\n  i = 0\n  while i < len(a) {\n    if a[i] > 0 { return a[i] }\n    i = i + 1\n  }\n  -1\n}",
        )
        .unwrap();
        assert_eq!(value(&mut ex, "first_pos([-1, 0, 3, 4])"), Value::Integer(3));
        assert_eq!(value(&mut ex, "first_pos([])"), Value::Integer(-1));
    }

    #[test]
    fn return_outside_function() {
        let mut ex = executor();
        assert!(matches!(error(&mut ex, "return 1"), Error::Runtime(_)));
    }

    #[test]
    fn exit_unwinds_through_calls() {
        let mut ex = executor();
        ex.run_source("fn quit() { exit 3 }").unwrap();
        let out = ex.run_source("x = 1 + quit(); print(\"unreached\")").unwrap();
        assert_eq!(out.status, Status::Exit(3));
        assert!(ex.sink().output.is_empty());
        assert!(ex.env().get_var("x").is_none());
        assert_eq!(ex.env().stack_depth(), 0);
    }

    #[test]
    fn bare_exit() {
        let mut ex = executor();
        assert_eq!(ex.run_source("exit").unwrap().status, Status::Exit(0));
    }

    #[test]
    fn nested_index_assignment_and_copy_on_write() {
        let mut ex = executor();
        ex.run_source("m = {k: [1, 2]}; m[\"k\"][0] = 9").unwrap();
        assert_eq!(value(&mut ex, "m[\"k\"]"), ints(&[9, 2]));
        ex.run_source("a = [1]; b = a; b[1] = 2").unwrap();
        assert_eq!(value(&mut ex, "a"), ints(&[1]));
        assert_eq!(value(&mut ex, "b"), ints(&[1, 2]));
    }

    #[test]
    fn indexing_errors() {
        let mut ex = executor();
        ex.run_source("m = {}; s = \"héllo\"").unwrap();
        assert!(matches!(error(&mut ex, "m[\"x\"]"), Error::Index(_)));
        assert!(matches!(error(&mut ex, "m[0]"), Error::Type { .. }));
        assert!(matches!(error(&mut ex, "[1][-1]"), Error::Index(_)));
        assert!(matches!(error(&mut ex, "5[0]"), Error::Type { .. }));
        assert_eq!(value(&mut ex, "s[1]"), Value::from("é"));
    }

    #[test]
    fn print_and_builtins() {
        let mut ex = executor();
        ex.run_source("print(\"a\", 1, [2])").unwrap();
        assert_eq!(ex.sink().output, vec!["a 1 [2]"]);
        assert_eq!(value(&mut ex, "len(range(4))"), Value::Integer(4));
        ex.run_source("len = fn(x) { 42 }").unwrap();
        assert_eq!(value(&mut ex, "len([1])"), Value::Integer(42));
    }

    #[test]
    fn stack_is_restored_after_error() {
        let mut ex = executor();
        assert!(ex.run_source("x = [1, 2 + \"a\" - 1]").is_err());
        assert_eq!(ex.env().stack_depth(), 0);
        assert!(ex.env().get_var("x").is_none());
    }

    #[test]
    fn error_aborts_rest_of_input() {
        let mut ex = executor();
        assert!(ex.run_source("a = 1; nope; b = 2").is_err());
        assert_eq!(ex.env().get_var("a"), Some(Value::Integer(1)));
        assert!(ex.env().get_var("b").is_none());
    }

    #[test]
    fn pipelines_are_delegated() {
        let mut ex = executor();
        ex.run_source("dir = \"/tmp\"").unwrap();
        ex.run_source("ls -l $dir | wc").unwrap();
        assert_eq!(
            ex.runner().calls[0],
            vec![
                Stage::new("ls", ["-l", "/tmp"]),
                Stage::new("wc", Vec::<String>::new())
            ]
        );
        assert_eq!(ex.env().get_var("STATUS"), Some(Value::Integer(0)));
    }

    #[test]
    fn pipeline_status_is_recorded() {
        let mut ex = executor();
        ex.runner_mut().reply = Some(StageStatus::Exited(2));
        let out = ex.run_source("!false").unwrap();
        assert_eq!(out.status, Status::Continue(2));
        assert_eq!(ex.env().get_var("STATUS"), Some(Value::Integer(2)));
        assert_eq!(ex.last_status(), 2);
    }

    #[test]
    fn interrupt_stops_the_line() {
        let mut ex = executor();
        ex.runner_mut().reply = Some(StageStatus::Interrupted);
        let out = ex.run_source("sleep 10; x = 1").unwrap();
        assert_eq!(out.status, Status::Continue(INTERRUPTED_STATUS));
        assert!(ex.env().get_var("x").is_none());
        assert_eq!(ex.env().get_var("STATUS"), Some(Value::Integer(130)));
    }

    #[test]
    fn spawn_failures_are_reported_through_the_sink() {
        let mut ex = executor();
        ex.runner_mut().reply = Some(StageStatus::NotStarted(std::io::ErrorKind::NotFound));
        ex.run_source("frobnicate --now").unwrap();
        assert_eq!(ex.sink().errors, vec!["frobnicate: command not found"]);
        assert_eq!(ex.last_status(), NOT_FOUND_STATUS);
        assert_eq!(ex.env().get_var("STATUS"), Some(Value::Integer(127)));
    }

    #[test]
    fn unbound_word_variable() {
        let mut ex = executor();
        let err = error(&mut ex, "echo $crsh_surely_unset_variable");
        assert!(matches!(err, Error::Name(_)));
        assert!(ex.runner().calls.is_empty());
    }

    #[test]
    fn cd_errors_do_not_abort() {
        let mut ex = executor();
        ex.run_source("cd a b").unwrap();
        assert_eq!(ex.last_status(), 1);
        ex.run_source("cd /crsh/definitely/not/here").unwrap();
        assert_eq!(ex.last_status(), 1);
        assert_eq!(ex.sink().errors.len(), 2);
        assert!(ex.runner().calls.is_empty());
    }
}
