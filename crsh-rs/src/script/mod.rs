//! The crsh scripting language.
//!
//! Source text flows through three stages:
//!
//! - [`lexer`] splits a line into tokens, switching to command mode when a
//!   statement looks like a program invocation (`ls -l`, `./build.sh`, `!cmd`)
//! - [`parser`] builds a statement list by recursive descent
//! - [`exec`] walks the tree against an [`Environment`]: a chain of lexical
//!   scopes plus the evaluation stack
//!
//! Values are dynamically typed ([`Value`]); containers are shared and
//! cloned on write.
//!
//! # Quick start
//!
//! ```rust
//! use crsh::output::BufferSink;
//! use crsh::process::{CommandRunner, Stage, StageStatus};
//! use crsh::script::{Executor, Value};
//!
//! struct NoCommands;
//! impl CommandRunner for NoCommands {
//!     fn run(&mut self, stages: &[Stage]) -> Vec<StageStatus> {
//!         vec![StageStatus::Exited(0); stages.len()]
//!     }
//! }
//!
//! let mut ex = Executor::new(NoCommands, BufferSink::new());
//! ex.run_source("sq(n) = n * n; print(sq(6) + 6)").unwrap();
//! assert_eq!(ex.sink().output, vec!["42"]);
//! assert_eq!(ex.run_source("sq(3)").unwrap().value, Some(Value::Integer(9)));
//! ```

pub mod builtins;
pub mod env;
pub mod error;
pub mod exec;
pub mod lexer;
pub mod parser;
pub mod stack;
pub mod value;

pub use env::Environment;
pub use error::{Error, Result};
pub use exec::{Executor, Outcome, Status};
pub use value::Value;
