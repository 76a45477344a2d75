//! Source-level debugger for Lua scripts.
//!
//! A [`Session`] runs a script inside an embedded Lua state and pauses it on
//! breakpoints and steps. While paused, commands read from a [`Frontend`]
//! inspect the stack, evaluate expressions and move execution on.

pub mod config;
pub mod debugger;
pub mod error;
pub mod frontend;
pub mod host;
pub mod repl;

pub use config::Options;
pub use debugger::{Session, SourceLocation, StackFrame, Value};
pub use error::{Error, Result, SessionTerminated};
pub use frontend::{Console, Frontend, JsonLines, Transcript};
