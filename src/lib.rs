//! A line-oriented shell for children.
//!
//! Each line a child types is classified by an ordered [`dispatch::HandlerTable`] and
//! answered by exactly one handler. Arithmetic goes through [`eval::Evaluator`], which only
//! knows a closed set of functions and constants, and every file name goes through
//! [`path::validate`] before storage or an editor sees it. Nothing typed can run code or
//! reach files outside the sandbox folder.
//!
//! The main entry point is [`Shell`], which owns one [`session::Session`] and runs the
//! REPL.

pub mod config;
pub mod dispatch;
pub mod display;
pub mod editor;
pub mod error;
pub mod eval;
pub mod handlers;
mod lexer;
mod parser;
pub mod path;
pub mod response;
pub mod session;
mod shell;
pub mod store;
pub mod symbols;

/// Just a convenient re-export of the interactive shell.
///
/// See [`Shell`] for the high-level API and examples.
pub use shell::{Flow, Shell, normalize};
