//! The command loop run while the target is paused.

pub mod commands;
mod dispatcher;

pub use commands::{parse, Command, HELP};
pub use dispatcher::{run, Flow};
