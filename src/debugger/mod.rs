mod breakpoints;
mod context;
mod eval;
mod inspect;
mod path;
mod session;
mod source;
mod stepping;
mod value;

use std::fmt;

use serde::Serialize;

pub use breakpoints::{Breakpoint, BreakpointRegistry};
pub use context::DebugContext;
pub use eval::{evaluate, Resolver, Scope, MAX_RESULTS};
pub use inspect::{describe, format_backtrace, visible_locals, Inspector, StackFrame};
pub use path::{basename, is_basename_key, PathNormalizer};
pub use session::Session;
pub use source::render;
pub use stepping::{RunMode, Stepper};
pub use value::{Number, Value, Variable};

/// A normalized file and a 1-based line in it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}
