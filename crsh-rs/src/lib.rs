//! crsh: an interactive shell with a small typed scripting language.
//!
//! Lines typed at the prompt are either expressions and statements of the
//! scripting language ([`script`]) or pipelines of external programs
//! ([`process`]).  [`repl::Repl`] ties the interpreter to its three
//! collaborators: a [`input::LineSource`], an [`output::OutputSink`] and a
//! [`process::CommandRunner`].

pub mod cli;
pub mod config;
pub mod input;
pub mod output;
pub mod process;
pub mod repl;
pub mod script;
