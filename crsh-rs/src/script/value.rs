//! Runtime value type for the shell language.
//!
//! Every datum is one of six variants.  Containers keep their storage behind
//! an `Rc` and copy on write: assigning an array to a second variable shares
//! the buffer, and the first mutation through either binding clones it.
//! Conversions never change a value's variant; they are read-only
//! projections that fail with a type error when no conversion exists.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use super::env::ScopeRef;
use super::error::{Error, Result};
use super::parser::FnDecl;
use super::stack::ensure_sufficient_stack;

/// Backing store of an array value.
pub type Array = Vec<Value>;

/// Backing store of a map value.  Ordered so display is deterministic.
pub type Map = BTreeMap<String, Value>;

// ── ValueType ─────────────────────────────────────────────────────────────────

/// The active variant of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    String,
    Integer,
    Number,
    Array,
    Map,
    Function,
}

impl ValueType {
    /// Name of the type, as returned by `type()`.
    pub fn name(self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Integer => "integer",
            ValueType::Number => "number",
            ValueType::Array => "array",
            ValueType::Map => "map",
            ValueType::Function => "function",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Function ──────────────────────────────────────────────────────────────────

/// A user-defined function closed over the scope it was defined in.
pub struct Function {
    pub decl: Rc<FnDecl>,
    pub closure: ScopeRef,
}

impl Function {
    pub fn name(&self) -> &str {
        self.decl.name.as_deref().unwrap_or("<anonymous>")
    }

    pub fn arity(&self) -> usize {
        self.decl.params.len()
    }
}

impl fmt::Debug for Function {
    // The closure scope may contain this very function; don't walk it.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.decl.name)
            .field("params", &self.decl.params)
            .finish_non_exhaustive()
    }
}

// ── Value ─────────────────────────────────────────────────────────────────────

/// A shell runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    String(String),
    Integer(i64),
    Number(f64),
    Array(Rc<Array>),
    Map(Rc<Map>),
    Function(Rc<Function>),
}

impl Default for Value {
    fn default() -> Self {
        Value::String(String::new())
    }
}

impl Drop for Value {
    // Containers this value owns outright are emptied into a worklist, so
    // dropping a value nested a hundred thousand levels deep stays flat.
    fn drop(&mut self) {
        let mut pending = Vec::new();
        release_children(self, &mut pending);
        while let Some(mut child) = pending.pop() {
            release_children(&mut child, &mut pending);
        }
    }
}

fn release_children(v: &mut Value, out: &mut Vec<Value>) {
    match v {
        Value::Array(items) => {
            if let Some(items) = Rc::get_mut(items) {
                out.append(items);
            }
        }
        Value::Map(entries) => {
            if let Some(entries) = Rc::get_mut(entries) {
                out.extend(std::mem::take(entries).into_values());
            }
        }
        _ => {}
    }
}

impl PartialEq for Value {
    /// Structural equality with strict variants; functions compare by identity.
    fn eq(&self, other: &Self) -> bool {
        ensure_sufficient_stack(|| match (self, other) {
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            _ => false,
        })
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        ensure_sufficient_stack(|| self.fmt_inner(f))
    }
}

impl Value {
    fn fmt_inner(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            Value::Integer(n) => write!(f, "{n}"),
            Value::Number(x) => fmt_number(*x, f),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    fmt_nested(item, f)?;
                }
                f.write_str("]")
            }
            Value::Map(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k:?}: ")?;
                    fmt_nested(v, f)?;
                }
                f.write_str("}")
            }
            Value::Function(func) => write!(f, "<fn {}({})>", func.name(), func.decl.params.join(", ")),
        }
    }
}

/// Whole numbers keep a trailing `.0`, or switch to exponent form once they
/// are large, so they read back as numbers rather than integers.
fn fmt_number(x: f64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if x.fract() != 0.0 {
        write!(f, "{x}")
    } else if x.abs() < 1e15 {
        write!(f, "{x:.1}")
    } else {
        write!(f, "{x:e}")
    }
}

/// Strings inside containers are quoted.
fn fmt_nested(v: &Value, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match v {
        Value::String(s) => write!(f, "{s:?}"),
        other => write!(f, "{other}"),
    }
}

impl Value {
    /// Build an array value.
    pub fn array(items: impl IntoIterator<Item = Value>) -> Value {
        Value::Array(Rc::new(items.into_iter().collect()))
    }

    /// Build a map value.
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Value {
        Value::Map(Rc::new(entries.into_iter().map(|(k, v)| (k.into(), v)).collect()))
    }

    pub fn get_type(&self) -> ValueType {
        match self {
            Value::String(_) => ValueType::String,
            Value::Integer(_) => ValueType::Integer,
            Value::Number(_) => ValueType::Number,
            Value::Array(_) => ValueType::Array,
            Value::Map(_) => ValueType::Map,
            Value::Function(_) => ValueType::Function,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.get_type().name()
    }

    // ── Predicates ────────────────────────────────────────────────────────────

    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Value::Integer(_))
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Number(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    pub fn is_hash(&self) -> bool {
        matches!(self, Value::Map(_))
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Value::Function(_))
    }

    /// Truthiness for `if`, `while`, `&&`, `||` and `!`.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::String(s) => !s.is_empty(),
            Value::Integer(n) => *n != 0,
            Value::Number(x) => *x != 0.0,
            Value::Array(items) => !items.is_empty(),
            Value::Map(entries) => !entries.is_empty(),
            Value::Function(_) => true,
        }
    }

    // ── Projections ───────────────────────────────────────────────────────────

    /// Integer projection.  Numbers truncate toward zero; strings must parse.
    pub fn to_integer(&self) -> Result<i64> {
        match self {
            Value::Integer(n) => Ok(*n),
            Value::Number(x) => trunc_to_i64(*x).ok_or_else(|| Error::Type {
                expected: "integer".into(),
                actual: format!("number {x} out of integer range"),
            }),
            Value::String(s) => {
                let t = s.trim();
                t.parse::<i64>()
                    .or_else(|_| t.parse::<f64>().ok().and_then(trunc_to_i64).ok_or(()))
                    .map_err(|_| Error::Type {
                        expected: "integer".into(),
                        actual: format!("string {s:?}"),
                    })
            }
            other => Err(Error::type_mismatch("integer", other.get_type())),
        }
    }

    /// Floating-point projection.
    pub fn to_number(&self) -> Result<f64> {
        match self {
            Value::Integer(n) => Ok(*n as f64),
            Value::Number(x) => Ok(*x),
            Value::String(s) => s.trim().parse::<f64>().map_err(|_| Error::Type {
                expected: "number".into(),
                actual: format!("string {s:?}"),
            }),
            other => Err(Error::type_mismatch("number", other.get_type())),
        }
    }

    pub fn to_array(&self) -> Result<&[Value]> {
        match self {
            Value::Array(items) => Ok(items),
            other => Err(Error::type_mismatch("array", other.get_type())),
        }
    }

    pub fn to_hash(&self) -> Result<&Map> {
        match self {
            Value::Map(entries) => Ok(entries),
            other => Err(Error::type_mismatch("map", other.get_type())),
        }
    }

    pub fn to_function(&self) -> Result<&Rc<Function>> {
        match self {
            Value::Function(func) => Ok(func),
            other => Err(Error::type_mismatch("function", other.get_type())),
        }
    }

    // ── Container access ──────────────────────────────────────────────────────

    /// Element count for containers, character count for strings.
    pub fn size(&self) -> Result<usize> {
        match self {
            Value::String(s) => Ok(s.chars().count()),
            Value::Array(items) => Ok(items.len()),
            Value::Map(entries) => Ok(entries.len()),
            other => Err(Error::type_mismatch("string, array or map", other.get_type())),
        }
    }

    pub fn get_array(&self, index: usize) -> Result<&Value> {
        let items = self.to_array()?;
        items
            .get(index)
            .ok_or_else(|| Error::index_out_of_range(index as i64, items.len()))
    }

    /// Optional lookup: `Ok(None)` when the key is unset.
    pub fn get_hash(&self, key: &str) -> Result<Option<&Value>> {
        Ok(self.to_hash()?.get(key))
    }

    /// Store at `index`; `index == size()` appends.
    pub fn put_array(&mut self, index: usize, value: Value) -> Result<()> {
        let items = self.array_mut()?;
        match index.cmp(&items.len()) {
            Ordering::Less => items[index] = value,
            Ordering::Equal => items.push(value),
            Ordering::Greater => return Err(Error::index_out_of_range(index as i64, items.len())),
        }
        Ok(())
    }

    /// Insert or overwrite `key`.
    pub fn put_hash(&mut self, key: impl Into<String>, value: Value) -> Result<()> {
        self.hash_mut()?.insert(key.into(), value);
        Ok(())
    }

    /// Ordered removal: later elements shift down by one.
    pub fn remove_array(&mut self, index: usize) -> Result<Value> {
        let items = self.array_mut()?;
        if index >= items.len() {
            return Err(Error::index_out_of_range(index as i64, items.len()));
        }
        Ok(items.remove(index))
    }

    /// Remove `key` if present; absent keys are not an error.
    pub fn remove_hash(&mut self, key: &str) -> Result<Option<Value>> {
        if !self.to_hash()?.contains_key(key) {
            // Leave a shared buffer shared.
            return Ok(None);
        }
        Ok(self.hash_mut()?.remove(key))
    }

    /// Mutable element access for nested assignment (`a[0][1] = x`).
    pub fn get_array_mut(&mut self, index: usize) -> Result<&mut Value> {
        let items = self.array_mut()?;
        let len = items.len();
        items
            .get_mut(index)
            .ok_or_else(|| Error::index_out_of_range(index as i64, len))
    }

    /// Mutable entry access for nested assignment (`m["k"][0] = x`).
    pub fn get_hash_mut(&mut self, key: &str) -> Result<&mut Value> {
        self.hash_mut()?
            .get_mut(key)
            .ok_or_else(|| Error::missing_key(key))
    }

    fn array_mut(&mut self) -> Result<&mut Array> {
        match self {
            Value::Array(items) => Ok(Rc::make_mut(items)),
            other => Err(Error::type_mismatch("array", other.get_type())),
        }
    }

    fn hash_mut(&mut self) -> Result<&mut Map> {
        match self {
            Value::Map(entries) => Ok(Rc::make_mut(entries)),
            other => Err(Error::type_mismatch("map", other.get_type())),
        }
    }

    // ── Arithmetic helpers ────────────────────────────────────────────────────

    /// Both operands as numbers, or `None` if either is not numeric.
    fn numeric_pair(&self, rhs: &Value) -> Option<(f64, f64)> {
        match (self, rhs) {
            (Value::Integer(_) | Value::Number(_), Value::Integer(_) | Value::Number(_)) => {
                Some((self.to_number().ok()?, rhs.to_number().ok()?))
            }
            _ => None,
        }
    }

    fn arith_err(&self, op: &str, rhs: &Value) -> Error {
        Error::Type {
            expected: format!("operands supporting `{op}`"),
            actual: format!("{} and {}", self.type_name(), rhs.type_name()),
        }
    }

    /// `+`: numeric addition, string/array concatenation, map merge.
    pub fn arith_add(&self, rhs: &Value) -> Result<Value> {
        match (self, rhs) {
            (Value::Integer(a), Value::Integer(b)) => checked(a.checked_add(*b)),
            (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
            (Value::String(a), b @ (Value::Integer(_) | Value::Number(_))) => {
                Ok(Value::String(format!("{a}{b}")))
            }
            (a @ (Value::Integer(_) | Value::Number(_)), Value::String(b)) => {
                Ok(Value::String(format!("{a}{b}")))
            }
            (Value::Array(a), Value::Array(b)) => {
                Ok(Value::array(a.iter().chain(b.iter()).cloned()))
            }
            (Value::Map(a), Value::Map(b)) => {
                let mut merged = Map::clone(a);
                merged.extend(b.iter().map(|(k, v)| (k.clone(), v.clone())));
                Ok(Value::Map(Rc::new(merged)))
            }
            _ => match self.numeric_pair(rhs) {
                Some((a, b)) => Ok(Value::Number(a + b)),
                None => Err(self.arith_err("+", rhs)),
            },
        }
    }

    pub fn arith_sub(&self, rhs: &Value) -> Result<Value> {
        match (self, rhs) {
            (Value::Integer(a), Value::Integer(b)) => checked(a.checked_sub(*b)),
            _ => match self.numeric_pair(rhs) {
                Some((a, b)) => Ok(Value::Number(a - b)),
                None => Err(self.arith_err("-", rhs)),
            },
        }
    }

    pub fn arith_mul(&self, rhs: &Value) -> Result<Value> {
        match (self, rhs) {
            (Value::Integer(a), Value::Integer(b)) => checked(a.checked_mul(*b)),
            _ => match self.numeric_pair(rhs) {
                Some((a, b)) => Ok(Value::Number(a * b)),
                None => Err(self.arith_err("*", rhs)),
            },
        }
    }

    pub fn arith_div(&self, rhs: &Value) -> Result<Value> {
        match (self, rhs) {
            (Value::Integer(_), Value::Integer(0)) => Err(Error::Arithmetic("division by zero".into())),
            (Value::Integer(a), Value::Integer(b)) => checked(a.checked_div(*b)),
            _ => match self.numeric_pair(rhs) {
                Some((_, b)) if b == 0.0 => Err(Error::Arithmetic("division by zero".into())),
                Some((a, b)) => Ok(Value::Number(a / b)),
                None => Err(self.arith_err("/", rhs)),
            },
        }
    }

    pub fn arith_rem(&self, rhs: &Value) -> Result<Value> {
        match (self, rhs) {
            (Value::Integer(_), Value::Integer(0)) => Err(Error::Arithmetic("modulo by zero".into())),
            (Value::Integer(a), Value::Integer(b)) => checked(a.checked_rem(*b)),
            _ => match self.numeric_pair(rhs) {
                Some((_, b)) if b == 0.0 => Err(Error::Arithmetic("modulo by zero".into())),
                Some((a, b)) => Ok(Value::Number(a % b)),
                None => Err(self.arith_err("%", rhs)),
            },
        }
    }

    pub fn arith_neg(&self) -> Result<Value> {
        match self {
            Value::Integer(n) => checked(n.checked_neg()),
            Value::Number(x) => Ok(Value::Number(-x)),
            other => Err(Error::type_mismatch("integer or number", other.get_type())),
        }
    }

    /// `==` semantics: structural, with integers and numbers compared by value.
    pub fn loose_eq(&self, rhs: &Value) -> bool {
        match self.numeric_pair(rhs) {
            Some((a, b)) => a == b,
            None => self == rhs,
        }
    }

    /// Ordering for `<`, `<=`, `>`, `>=`.
    pub fn compare(&self, rhs: &Value) -> Result<Ordering> {
        if let (Value::String(a), Value::String(b)) = (self, rhs) {
            return Ok(a.cmp(b));
        }
        match self.numeric_pair(rhs) {
            Some((a, b)) => a.partial_cmp(&b).ok_or_else(|| {
                Error::Arithmetic("cannot order NaN".into())
            }),
            None => Err(self.arith_err("<", rhs)),
        }
    }
}

fn checked(result: Option<i64>) -> Result<Value> {
    result
        .map(Value::Integer)
        .ok_or_else(|| Error::Arithmetic("integer overflow".into()))
}

/// `x` truncated toward zero, if that lands inside the `i64` range.
fn trunc_to_i64(x: f64) -> Option<i64> {
    // 2^63 is exact as an f64; the range is half-open on the top.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    let t = x.trunc();
    (t >= -LIMIT && t < LIMIT).then_some(t as i64)
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Number(x)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Integer(i64::from(b))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(items))
    }
}

impl From<Map> for Value {
    fn from(entries: Map) -> Self {
        Value::Map(Rc::new(entries))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
