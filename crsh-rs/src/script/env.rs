//! Variable scopes and the evaluation stack.
//!
//! Scopes form a parent-linked chain.  A function call creates a child of
//! the scope the function was *defined* in, so name resolution is lexical.
//! The evaluation stack holds intermediate values while the executor
//! assembles an expression and is empty between top-level statements.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use super::error::{Error, Result};
use super::stack::ensure_sufficient_stack;
use super::value::Value;

/// Shared handle to a scope.  Closures keep their defining scope alive.
pub type ScopeRef = Rc<RefCell<Scope>>;

// ── Scope ─────────────────────────────────────────────────────────────────────

/// One level of variable bindings.
#[derive(Debug, Default)]
pub struct Scope {
    vars: HashMap<String, Value>,
    /// Names declared with `global`; assignments to them go to the root scope.
    globals: HashSet<String>,
    parent: Option<ScopeRef>,
}

impl Scope {
    pub fn new_ref(parent: Option<ScopeRef>) -> ScopeRef {
        Rc::new(RefCell::new(Scope {
            parent,
            ..Scope::default()
        }))
    }

    pub fn child_of(parent: &ScopeRef) -> ScopeRef {
        Scope::new_ref(Some(Rc::clone(parent)))
    }

    pub fn parent(&self) -> Option<&ScopeRef> {
        self.parent.as_ref()
    }

    pub fn get_local(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn set_local(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// Walk the chain from `scope` outward and clone the first binding of `name`.
fn lookup(scope: &ScopeRef, name: &str) -> Option<Value> {
    let mut cur = Rc::clone(scope);
    loop {
        let next = {
            let s = cur.borrow();
            if let Some(v) = s.vars.get(name) {
                return Some(v.clone());
            }
            s.parent.clone()?
        };
        cur = next;
    }
}

// ── Frame release ─────────────────────────────────────────────────────────────

/// Free a finished call frame whose only remaining references come from
/// values the frame itself owns.
///
/// A function defined during a call keeps the frame as its closure while the
/// frame keeps the function as a local, so the pair would outlive the call.
/// Counting the references held inside the frame and comparing with the
/// frame's strong count tells whether anything else can still reach it.  If
/// nothing can, the bindings are cleared and the cycle falls apart.  Frames
/// captured by a returned closure, or by one stored through `global`, are
/// left intact.
pub fn release_frame(frame: ScopeRef) {
    let holders = Rc::strong_count(&frame) - 1;
    if holders == 0 {
        return;
    }
    let mut owned = 0;
    for v in frame.borrow().vars.values() {
        count_frame_refs(v, &frame, &mut owned);
    }
    if owned == holders {
        let vars = std::mem::take(&mut frame.borrow_mut().vars);
        drop(vars);
    }
}

/// Count references to `frame` reachable from `v` through uniquely owned
/// containers, functions and scopes.  Shared objects are not entered: their
/// other owners live outside the frame.
fn count_frame_refs(v: &Value, frame: &ScopeRef, owned: &mut usize) {
    ensure_sufficient_stack(|| match v {
        Value::Array(items) if Rc::strong_count(items) == 1 => {
            for item in items.iter() {
                count_frame_refs(item, frame, owned);
            }
        }
        Value::Map(entries) if Rc::strong_count(entries) == 1 => {
            for item in entries.values() {
                count_frame_refs(item, frame, owned);
            }
        }
        Value::Function(func) if Rc::strong_count(func) == 1 => {
            count_scope_refs(&func.closure, frame, owned);
        }
        _ => {}
    })
}

fn count_scope_refs(scope: &ScopeRef, frame: &ScopeRef, owned: &mut usize) {
    if Rc::ptr_eq(scope, frame) {
        *owned += 1;
        return;
    }
    if Rc::strong_count(scope) > 1 {
        return;
    }
    let s = scope.borrow();
    if let Some(parent) = &s.parent {
        count_scope_refs(parent, frame, owned);
    }
    for v in s.vars.values() {
        count_frame_refs(v, frame, owned);
    }
}

// ── Environment ───────────────────────────────────────────────────────────────

/// The interpreter's variable table plus evaluation stack.
#[derive(Debug)]
pub struct Environment {
    global: ScopeRef,
    current: ScopeRef,
    stack: Vec<Value>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    pub fn new() -> Self {
        let global = Scope::new_ref(None);
        Environment {
            current: Rc::clone(&global),
            global,
            stack: Vec::new(),
        }
    }

    // ── Variables ─────────────────────────────────────────────────────────────

    /// Look a name up through the current scope chain.  `None` means unbound.
    pub fn get_var(&self, name: &str) -> Option<Value> {
        lookup(&self.current, name)
    }

    /// Bind `name` in the current scope, unless the current scope declared it
    /// `global`, in which case the root binding is written.
    pub fn set_var(&mut self, name: &str, value: Value) {
        let target = if self.current.borrow().globals.contains(name) {
            Rc::clone(&self.global)
        } else {
            Rc::clone(&self.current)
        };
        target.borrow_mut().set_local(name, value);
    }

    /// Bind directly in the root scope.
    pub fn set_global(&mut self, name: &str, value: Value) {
        self.global.borrow_mut().set_local(name, value);
    }

    /// Mark `name` as a non-local target in the current scope.
    pub fn declare_global(&mut self, name: &str) {
        self.current.borrow_mut().globals.insert(name.to_owned());
    }

    pub fn is_global_scope(&self) -> bool {
        Rc::ptr_eq(&self.current, &self.global)
    }

    pub fn current_scope(&self) -> &ScopeRef {
        &self.current
    }

    pub fn global_scope(&self) -> &ScopeRef {
        &self.global
    }

    /// Make `scope` current and hand back the scope it replaced.
    pub fn enter_scope(&mut self, scope: ScopeRef) -> ScopeRef {
        std::mem::replace(&mut self.current, scope)
    }

    /// Restore a scope returned by [`enter_scope`](Self::enter_scope).
    /// The abandoned child is dropped here unless a closure still holds it.
    pub fn leave_scope(&mut self, previous: ScopeRef) {
        self.current = previous;
    }

    // ── Evaluation stack ──────────────────────────────────────────────────────

    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    pub fn push_string(&mut self, s: impl Into<String>) {
        self.push(Value::String(s.into()));
    }

    pub fn push_integer(&mut self, n: i64) {
        self.push(Value::Integer(n));
    }

    pub fn push_number(&mut self, x: f64) {
        self.push(Value::Number(x));
    }

    pub fn top(&self) -> Result<&Value> {
        self.stack.last().ok_or(Error::StackUnderflow)
    }

    pub fn pop(&mut self) -> Result<Value> {
        self.stack.pop().ok_or(Error::StackUnderflow)
    }

    /// Pop `n` values, returned in push order.
    pub fn pop_n(&mut self, n: usize) -> Result<Vec<Value>> {
        if n > self.stack.len() {
            return Err(Error::StackUnderflow);
        }
        let at = self.stack.len() - n;
        Ok(self.stack.split_off(at))
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    /// Drop everything above `depth`; used to recover after a failed statement.
    pub fn truncate_stack(&mut self, depth: usize) {
        self.stack.truncate(depth);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::parser::{FnBody, FnDecl};
    use crate::script::value::Function;

    #[test]
    fn unbound_is_none() {
        let env = Environment::new();
        assert!(env.get_var("nope").is_none());
    }

    #[test]
    fn set_and_get() {
        let mut env = Environment::new();
        env.set_var("x", Value::Integer(5));
        assert_eq!(env.get_var("x"), Some(Value::Integer(5)));
    }

    #[test]
    fn child_scope_shadows_without_mutating_parent() {
        let mut env = Environment::new();
        env.set_var("x", Value::Integer(1));
        let child = Scope::child_of(env.current_scope());
        let prev = env.enter_scope(child);
        assert_eq!(env.get_var("x"), Some(Value::Integer(1)));
        env.set_var("x", Value::Integer(2));
        assert_eq!(env.get_var("x"), Some(Value::Integer(2)));
        env.leave_scope(prev);
        assert_eq!(env.get_var("x"), Some(Value::Integer(1)));
    }

    #[test]
    fn global_declaration_writes_root() {
        let mut env = Environment::new();
        env.set_var("count", Value::Integer(0));
        let child = Scope::child_of(env.current_scope());
        let prev = env.enter_scope(child);
        env.declare_global("count");
        env.set_var("count", Value::Integer(9));
        env.leave_scope(prev);
        assert_eq!(env.get_var("count"), Some(Value::Integer(9)));
    }

    #[test]
    fn scope_is_destroyed_on_leave() {
        let mut env = Environment::new();
        let child = Scope::child_of(env.current_scope());
        let weak = Rc::downgrade(&child);
        let prev = env.enter_scope(child);
        env.set_var("tmp", Value::Integer(1));
        env.leave_scope(prev);
        assert!(weak.upgrade().is_none());
        assert!(env.get_var("tmp").is_none());
    }

    #[test]
    fn frame_held_only_by_its_own_closure_is_released() {
        let env = Environment::new();
        let frame = Scope::child_of(env.current_scope());
        let weak = Rc::downgrade(&frame);
        let inner = Value::Function(Rc::new(Function {
            decl: Rc::new(FnDecl {
                name: Some("inner".into()),
                params: Vec::new(),
                body: FnBody::Block(Vec::new()),
            }),
            closure: Rc::clone(&frame),
        }));
        frame.borrow_mut().set_local("inner", inner);
        frame.borrow_mut().set_local("n", Value::Integer(1));
        assert_eq!(Rc::strong_count(env.global_scope()), 3);

        release_frame(frame);
        assert!(weak.upgrade().is_none());
        assert_eq!(Rc::strong_count(env.global_scope()), 2);
    }

    #[test]
    fn frame_reachable_from_outside_is_kept() {
        let frame = Scope::child_of(&Scope::new_ref(None));
        let decl = Rc::new(FnDecl {
            name: None,
            params: Vec::new(),
            body: FnBody::Block(Vec::new()),
        });
        let escaped = Value::Function(Rc::new(Function {
            decl,
            closure: Rc::clone(&frame),
        }));
        frame.borrow_mut().set_local("f", escaped.clone());
        frame.borrow_mut().set_local("n", Value::Integer(7));
        let weak = Rc::downgrade(&frame);

        release_frame(frame);
        let frame = weak.upgrade().unwrap();
        assert_eq!(frame.borrow().get_local("n"), Some(&Value::Integer(7)));
        drop(escaped);
    }

    #[test]
    fn stack_push_top_pop() {
        let mut env = Environment::new();
        env.push_integer(1);
        env.push_string("two");
        env.push_number(3.0);
        assert_eq!(env.top().unwrap(), &Value::Number(3.0));
        assert_eq!(env.pop().unwrap(), Value::Number(3.0));
        assert_eq!(env.pop_n(2).unwrap(), vec![Value::Integer(1), Value::from("two")]);
        assert_eq!(env.stack_depth(), 0);
    }

    #[test]
    fn underflow_is_reported() {
        let mut env = Environment::new();
        assert!(matches!(env.top(), Err(Error::StackUnderflow)));
        assert!(matches!(env.pop(), Err(Error::StackUnderflow)));
        env.push_integer(1);
        assert!(matches!(env.pop_n(2), Err(Error::StackUnderflow)));
        assert_eq!(env.stack_depth(), 1);
    }
}
