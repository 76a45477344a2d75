//! The runtime the debugger is attached to.
//!
//! The debugger core never talks to a runtime directly. Everything it needs
//! while a line event is being handled (stack metadata, locals, upvalues and
//! snippet compilation) goes through [`Host`]. [`lua`] provides the
//! implementation backed by embedded Lua.

pub mod lua;

use serde::Serialize;

use crate::debugger::{Scope, Value};
use crate::error::Result;

pub use lua::{LuaHost, LuaRuntime};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    Script,
    Native,
    Main,
}

/// Raw frame metadata as the runtime reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameInfo {
    /// Source identifier, possibly carrying a chunk marker.
    pub source: String,
    /// Current line, when the frame has one.
    pub line: Option<u32>,
    pub function: Option<String>,
    pub kind: FrameKind,
}

/// Stack and evaluation primitives of a paused runtime.
///
/// Levels count from 0, the function executing the current line event.
pub trait Host {
    /// A live runtime value. Only valid while the runtime is paused.
    type Value: Clone;
    type Chunk;

    /// Number of frames between the current function and the target's entry point.
    fn depth(&self) -> Result<usize>;

    fn frame(&self, level: usize) -> Result<Option<FrameInfo>>;

    /// Locals of a frame in declaration order, temporaries included.
    fn locals(&self, level: usize) -> Result<Vec<(String, Self::Value)>>;

    fn upvalues(&self, level: usize) -> Result<Vec<(String, Self::Value)>>;

    fn snapshot(&self, value: &Self::Value) -> Value;

    /// Compiles `text` so that free names resolve through `scope`.
    ///
    /// Fails with [`Error::Compile`](crate::Error::Compile).
    fn compile(&self, text: &str, scope: &Scope<Self::Value>) -> Result<Self::Chunk>;

    /// Fails with [`Error::Runtime`](crate::Error::Runtime).
    fn execute(&self, chunk: Self::Chunk) -> Result<Vec<Self::Value>>;

    /// Output the target produced while paused (from an evaluated snippet)
    /// that has not reached the front end yet.
    fn take_output(&self) -> String;
}
