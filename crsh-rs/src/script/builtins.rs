//! Built-in functions.
//!
//! Each function receives its already-evaluated arguments and returns a new
//! value; container arguments are never mutated in place.  A user binding
//! with the same name shadows the built-in.  `print` is listed here but
//! dispatched by the executor because it writes to the output sink.

use regex::Regex;

use super::error::{Error, Result};
use super::value::Value;

/// Names resolvable as built-in functions.
pub const BUILTINS: &[&str] = &[
    "print", "len", "type", "str", "int", "num", "keys", "values", "has", "get", "push", "remove",
    "first", "rest", "range", "join", "split", "abs", "matches",
];

pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

/// Dispatch a built-in function call.
///
/// Returns `None` if `name` is not a pure built-in (the caller then reports
/// an unbound name).
pub fn call_builtin(name: &str, args: Vec<Value>) -> Option<Result<Value>> {
    fn inner(name: &str, args: Vec<Value>) -> Result<Option<Value>> {
        Ok(Some(match name {
            // ── Introspection and conversion ─────────────────────────────────
            "len" => {
                let [v] = exact(name, args)?;
                Value::Integer(v.size()? as i64)
            }
            "type" => {
                let [v] = exact(name, args)?;
                Value::from(v.type_name())
            }
            "str" => {
                let [v] = exact(name, args)?;
                Value::String(v.to_string())
            }
            "int" => {
                let [v] = exact(name, args)?;
                Value::Integer(v.to_integer()?)
            }
            "num" => {
                let [v] = exact(name, args)?;
                Value::Number(v.to_number()?)
            }
            "abs" => {
                let [v] = exact(name, args)?;
                match v {
                    Value::Integer(n) => n
                        .checked_abs()
                        .map(Value::Integer)
                        .ok_or_else(|| Error::Arithmetic("integer overflow".into()))?,
                    Value::Number(x) => Value::Number(x.abs()),
                    other => return Err(Error::type_mismatch("integer or number", other.get_type())),
                }
            }

            // ── Containers ───────────────────────────────────────────────────
            "keys" => {
                let [m] = exact(name, args)?;
                Value::array(m.to_hash()?.keys().map(|k| Value::from(k.as_str())))
            }
            "values" => {
                let [m] = exact(name, args)?;
                Value::array(m.to_hash()?.values().cloned())
            }
            "has" => {
                let [c, k] = exact(name, args)?;
                Value::from(match &c {
                    Value::Map(entries) => entries.contains_key(&key_of(&k)?),
                    Value::Array(items) => {
                        usize::try_from(k.to_integer()?).is_ok_and(|i| i < items.len())
                    }
                    other => return Err(Error::type_mismatch("array or map", other.get_type())),
                })
            }
            "get" => {
                if !(2..=3).contains(&args.len()) {
                    return Err(Error::arity_range(name, 2, 3, args.len()));
                }
                let mut it = args.into_iter();
                let (m, k, default) = match (it.next(), it.next(), it.next()) {
                    (Some(m), Some(k), d) => (m, k, d.unwrap_or_default()),
                    _ => return Err(Error::arity_range(name, 2, 3, 0)),
                };
                match &m {
                    Value::Map(_) => m.get_hash(&key_of(&k)?)?.cloned().unwrap_or(default),
                    Value::Array(items) => usize::try_from(k.to_integer()?)
                        .ok()
                        .and_then(|i| items.get(i).cloned())
                        .unwrap_or(default),
                    other => return Err(Error::type_mismatch("array or map", other.get_type())),
                }
            }
            "push" => {
                let [mut a, v] = exact(name, args)?;
                let len = a.size()?;
                a.put_array(len, v)?;
                a
            }
            "remove" => {
                let [mut c, k] = exact(name, args)?;
                if c.is_hash() {
                    c.remove_hash(&key_of(&k)?)?;
                } else {
                    let i = index_of(&k)?;
                    c.remove_array(i)?;
                }
                c
            }
            "first" => {
                let [a] = exact(name, args)?;
                a.get_array(0)?.clone()
            }
            "rest" => {
                let [a] = exact(name, args)?;
                Value::array(a.to_array()?.iter().skip(1).cloned())
            }
            "range" => {
                let (lo, hi) = match args.as_slice() {
                    [n] => (0, n.to_integer()?),
                    [a, b] => (a.to_integer()?, b.to_integer()?),
                    _ => return Err(Error::arity_range(name, 1, 2, args.len())),
                };
                Value::array((lo..hi).map(Value::Integer))
            }

            // ── Strings ──────────────────────────────────────────────────────
            "join" => {
                let [a, sep] = exact(name, args)?;
                let parts: Vec<String> = a.to_array()?.iter().map(|v| v.to_string()).collect();
                Value::String(parts.join(sep.to_string().as_str()))
            }
            "split" => {
                let [s, sep] = exact(name, args)?;
                let s = expect_str(&s)?;
                let sep = expect_str(&sep)?;
                if sep.is_empty() {
                    Value::array(s.chars().map(|c| Value::String(c.to_string())))
                } else {
                    Value::array(s.split(sep).map(Value::from))
                }
            }
            "matches" => {
                let [s, pattern] = exact(name, args)?;
                let re = Regex::new(expect_str(&pattern)?)
                    .map_err(|e| Error::runtime(format!("matches: invalid regex: {e}")))?;
                Value::from(re.is_match(expect_str(&s)?))
            }

            _ => return Ok(None),
        }))
    }

    inner(name, args).transpose()
}

// ── Argument helpers ──────────────────────────────────────────────────────────

/// Destructure exactly `N` arguments or fail with an arity error.
fn exact<const N: usize>(name: &str, args: Vec<Value>) -> Result<[Value; N]> {
    let actual = args.len();
    <[Value; N]>::try_from(args).map_err(|_| Error::arity(name, N, actual))
}

fn expect_str(v: &Value) -> Result<&str> {
    match v {
        Value::String(s) => Ok(s),
        other => Err(Error::type_mismatch("string", other.get_type())),
    }
}

fn key_of(v: &Value) -> Result<String> {
    expect_str(v).map(str::to_owned)
}

fn index_of(v: &Value) -> Result<usize> {
    match v {
        Value::Integer(n) => {
            usize::try_from(*n).map_err(|_| Error::Index(format!("negative index {n}")))
        }
        other => Err(Error::type_mismatch("integer", other.get_type())),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
