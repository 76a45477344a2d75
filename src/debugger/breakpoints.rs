use std::collections::HashSet;

use tracing::debug;

use super::path::{basename, PathNormalizer};
use super::SourceLocation;
use crate::error::{Error, Result};

/// A breakpoint as shown to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    /// 1-based position in creation order.
    pub index: usize,
    pub location: SourceLocation,
}

/// User-requested pause locations.
///
/// `points` answers hit queries; `order` backs the numbered listing. Setting
/// the same location twice appends it to `order` twice while `points` keeps
/// one entry.
#[derive(Debug, Default)]
pub struct BreakpointRegistry {
    points: HashSet<(String, u32)>,
    order: Vec<SourceLocation>,
    paths: PathNormalizer,
}

impl BreakpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a breakpoint and returns its display index.
    pub fn set(&mut self, file: &str, line: u32) -> Result<usize> {
        let file = self
            .paths
            .normalize(file)
            .ok_or_else(|| Error::InvalidBreakpointTarget(file.to_string()))?;
        if line == 0 {
            return Err(Error::InvalidBreakpointTarget(format!("{file}:0")));
        }

        self.points.insert((file.clone(), line));
        self.order.push(SourceLocation { file, line });
        debug!(index = self.order.len(), "breakpoint set");
        Ok(self.order.len())
    }

    pub fn list(&self) -> Vec<Breakpoint> {
        self.order
            .iter()
            .enumerate()
            .map(|(i, location)| Breakpoint {
                index: i + 1,
                location: location.clone(),
            })
            .collect()
    }

    /// Removes by 1-based index or by a literal `file:line`.
    pub fn clear(&mut self, identifier: &str) -> Result<SourceLocation> {
        let identifier = identifier.trim();
        let position = match identifier.parse::<usize>() {
            Ok(index) if index >= 1 && index <= self.order.len() => Some(index - 1),
            Ok(_) => None,
            Err(_) => self.position_of(identifier),
        };
        let position =
            position.ok_or_else(|| Error::BreakpointNotFound(identifier.to_string()))?;

        let removed = self.order.remove(position);
        if !self.order.contains(&removed) {
            self.points.remove(&(removed.file.clone(), removed.line));
        }
        debug!(file = %removed.file, line = removed.line, "breakpoint removed");
        Ok(removed)
    }

    fn position_of(&mut self, spelled: &str) -> Option<usize> {
        let (file, line) = spelled.rsplit_once(':')?;
        let line = line.trim().parse::<u32>().ok()?;
        let file = self.paths.normalize(file)?;
        self.order
            .iter()
            .position(|loc| loc.file == file && loc.line == line)
    }

    /// Whether execution reaching `file:line` should pause.
    pub fn is_hit(&mut self, file: &str, line: u32) -> bool {
        if self.points.is_empty() {
            return false;
        }
        let Some(file) = self.paths.normalize(file) else {
            return false;
        };
        if self.points.contains(&(file.clone(), line)) {
            return true;
        }
        // Breakpoints whose file could not be opened are keyed by basename.
        let base = basename(&file);
        base != file && self.points.contains(&(base.to_string(), line))
    }

    /// Display index of the first listed breakpoint at `location`.
    pub fn index_of(&self, location: &SourceLocation) -> Option<usize> {
        self.order
            .iter()
            .position(|loc| {
                loc.line == location.line
                    && (loc.file == location.file || loc.file == basename(&location.file))
            })
            .map(|i| i + 1)
    }

    pub fn normalize(&mut self, file: &str) -> Option<String> {
        self.paths.normalize(file)
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear_all(&mut self) {
        self.points.clear();
        self.order.clear();
        self.paths.clear();
    }
}
