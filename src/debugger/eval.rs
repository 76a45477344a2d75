use std::collections::HashMap;

use tracing::debug;

use super::inspect::visible_locals;
use super::value::Value;
use crate::error::{Error, Result};
use crate::host::Host;

/// Most values a single evaluation reports.
pub const MAX_RESULTS: usize = 3;

/// One place a free name may be found.
#[derive(Debug, Clone)]
pub enum Resolver<V> {
    /// Fixed bindings copied out of a frame. Assignments to these names
    /// update the copy, never the live variable.
    Bindings {
        name: &'static str,
        values: Vec<(String, V)>,
    },
    /// The runtime's global table, read and written in place.
    Globals,
}

/// Name-resolution scope for snippet evaluation: resolvers are tried in
/// order, first hit wins. Writes to names no `Bindings` resolver knows go to
/// the first `Globals` resolver.
#[derive(Debug, Clone)]
pub struct Scope<V> {
    pub resolvers: Vec<Resolver<V>>,
}

impl<V: Clone> Scope<V> {
    /// Frame bindings (locals, then upvalues overriding same-named locals)
    /// followed by the globals.
    pub fn for_frame<H>(host: &H, level: usize) -> Result<Self>
    where
        H: Host<Value = V>,
    {
        let locals = visible_locals(host.locals(level)?);
        let upvalues = host.upvalues(level)?;
        let frame = merge(locals.into_iter().chain(upvalues));

        Ok(Self {
            resolvers: vec![
                Resolver::Bindings {
                    name: "frame",
                    values: frame,
                },
                Resolver::Globals,
            ],
        })
    }

}

impl<V> Resolver<V> {
    /// Label used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Resolver::Bindings { name, .. } => name,
            Resolver::Globals => "globals",
        }
    }
}

/// Collapses bindings so later entries replace earlier ones of the same
/// name, keeping the position of the first.
fn merge<V>(bindings: impl IntoIterator<Item = (String, V)>) -> Vec<(String, V)> {
    let mut merged: Vec<(String, V)> = Vec::new();
    let mut slots: HashMap<String, usize> = HashMap::new();
    for (name, value) in bindings {
        match slots.get(&name) {
            Some(&slot) => merged[slot].1 = value,
            None => {
                slots.insert(name.clone(), merged.len());
                merged.push((name, value));
            }
        }
    }
    merged
}

/// Evaluates `text` in the frame at `level`.
///
/// The text is tried as an expression first and as a statement second.
/// Failures come back as [`Error::Compile`] or [`Error::Runtime`]; the paused
/// program is left as it was, except for writes to globals.
pub fn evaluate<H: Host>(host: &H, level: usize, text: &str) -> Result<Vec<Value>> {
    let scope = Scope::for_frame(host, level)?;

    let chunk = match host.compile(&format!("return {text}"), &scope) {
        Ok(chunk) => chunk,
        Err(Error::Compile(_)) => host.compile(text, &scope)?,
        Err(other) => return Err(other),
    };
    let values = host.execute(chunk)?;
    debug!(level, results = values.len(), "evaluated snippet");

    Ok(values
        .iter()
        .take(MAX_RESULTS)
        .map(|value| host.snapshot(value))
        .collect())
}
