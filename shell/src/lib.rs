//! An interactive command-line shell.
//!
//! One input line at a time is tokenized ([`lexer`]), split into words and an
//! optional pipe ([`parser`]), scanned for output redirections ([`redirect`])
//! and then handed to a built-in, a single external program, or a two-stage
//! pipeline. Output of every command goes through the fan-out sinks of
//! [`io_adapters`], so built-ins and external programs redirect the same way.
//!
//! The main entry point is [`Interpreter`]. Tab completion of command names
//! lives in [`completion`] and is wired into the line editor by [`editor`].

mod builtin;
pub mod command;
pub mod completion;
pub mod editor;
pub mod env;
mod external;
mod interpreter;
pub mod io_adapters;
pub mod lexer;
pub mod parser;
mod pipeline;
pub mod redirect;

pub use builtin::{BUILTIN_NAMES, is_builtin};
pub use completion::{CandidateSet, Completion, CompletionEngine};
pub use external::{ExternalCommand, find_command_path};
pub use interpreter::Interpreter;
pub use io_adapters::{Console, MemWriter};
