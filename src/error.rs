use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::debugger::StackFrame;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything the debugger can report to its caller or operator.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid breakpoint target '{0}'")]
    InvalidBreakpointTarget(String),

    #[error("no breakpoint matches '{0}'")]
    BreakpointNotFound(String),

    #[error("compile error: {0}")]
    Compile(String),

    #[error("runtime error: {0}")]
    Runtime(String),

    #[error("cannot load script '{}': {message}", path.display())]
    ScriptLoad { path: PathBuf, message: String },

    #[error("{message}")]
    Uncaught {
        message: String,
        backtrace: Vec<StackFrame>,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("host runtime error: {0}")]
    Host(String),
}

impl From<mlua::Error> for Error {
    fn from(err: mlua::Error) -> Self {
        Self::Host(err.to_string())
    }
}

/// Raised from the line hook when the operator quits.
///
/// Travels through the runtime's error channel and is recognised once, at the
/// top of [`Session::attach`](crate::Session::attach).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTerminated;

impl fmt::Display for SessionTerminated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("debug session terminated")
    }
}

impl std::error::Error for SessionTerminated {}

/// Walks wrapped runtime errors looking for [`SessionTerminated`].
pub fn is_terminated(err: &mlua::Error) -> bool {
    match err {
        mlua::Error::ExternalError(inner) => inner.downcast_ref::<SessionTerminated>().is_some(),
        mlua::Error::CallbackError { cause, .. } => is_terminated(cause),
        mlua::Error::WithContext { cause, .. } => is_terminated(cause),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn terminated_is_found_through_wrappers() {
        let raw = mlua::Error::external(SessionTerminated);
        assert!(is_terminated(&raw));

        let wrapped = mlua::Error::CallbackError {
            traceback: String::new(),
            cause: Arc::new(raw),
        };
        assert!(is_terminated(&wrapped));

        let other = mlua::Error::RuntimeError("boom".to_string());
        assert!(!is_terminated(&other));
    }

    #[test]
    fn script_load_message_names_the_file() {
        let err = Error::ScriptLoad {
            path: PathBuf::from("missing.lua"),
            message: "No such file or directory".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "cannot load script 'missing.lua': No such file or directory"
        );
    }
}
