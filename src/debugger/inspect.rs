use serde::Serialize;

use super::path::PathNormalizer;
use super::value::Variable;
use crate::error::Result;
use crate::host::{FrameInfo, FrameKind, Host};

/// Names the runtime gives to internal stack slots.
const TEMPORARY_NAMES: &[&str] = &["(*temporary)", "(temporary)", "(C temporary)"];

const NATIVE_FILE: &str = "[C]";
const ANONYMOUS: &str = "<anonymous>";
const MAIN_CHUNK: &str = "main chunk";

/// One frame of the live stack, as displayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackFrame {
    pub level: usize,
    pub file: String,
    pub line: Option<u32>,
    pub function: String,
    pub kind: FrameKind,
}

impl StackFrame {
    /// `file:line`, or just the file for frames without a line.
    pub fn location(&self) -> String {
        match self.line {
            Some(line) => format!("{}:{line}", self.file),
            None => self.file.clone(),
        }
    }
}

/// Reads frames through a [`Host`]. Nothing is cached: the stack it
/// describes is gone once execution resumes.
pub struct Inspector<'a, H: Host> {
    host: &'a H,
    paths: &'a mut PathNormalizer,
}

impl<'a, H: Host> Inspector<'a, H> {
    pub fn new(host: &'a H, paths: &'a mut PathNormalizer) -> Self {
        Self { host, paths }
    }

    /// Frames from innermost to outermost.
    pub fn backtrace(&mut self) -> Result<Vec<StackFrame>> {
        let mut frames = Vec::new();
        let mut level = 0;
        while let Some(frame) = self.frame(level)? {
            frames.push(frame);
            level += 1;
        }
        Ok(frames)
    }

    pub fn frame(&mut self, level: usize) -> Result<Option<StackFrame>> {
        match self.host.frame(level)? {
            Some(info) => Ok(Some(describe(level, info, &mut *self.paths))),
            None => Ok(None),
        }
    }

    pub fn locals_of(&self, level: usize) -> Result<Vec<Variable>> {
        Ok(self.snapshot(visible_locals(self.host.locals(level)?)))
    }

    pub fn upvalues_of(&self, level: usize) -> Result<Vec<Variable>> {
        Ok(self.snapshot(self.host.upvalues(level)?))
    }

    fn snapshot(&self, bindings: Vec<(String, H::Value)>) -> Vec<Variable> {
        bindings
            .into_iter()
            .map(|(name, value)| Variable {
                value: self.host.snapshot(&value),
                name,
            })
            .collect()
    }
}

/// Turns raw frame metadata into its displayed form.
pub fn describe(level: usize, info: FrameInfo, paths: &mut PathNormalizer) -> StackFrame {
    let file = match info.kind {
        FrameKind::Native => NATIVE_FILE.to_string(),
        _ => paths
            .normalize(&info.source)
            .unwrap_or_else(|| info.source.clone()),
    };
    let function = match (info.function, info.kind) {
        (Some(name), _) => name,
        (None, FrameKind::Main) => MAIN_CHUNK.to_string(),
        (None, _) => ANONYMOUS.to_string(),
    };

    StackFrame {
        level,
        file,
        line: info.line,
        function,
        kind: info.kind,
    }
}

/// Drops the runtime's temporary slots from a locals listing.
pub fn visible_locals<V>(locals: Vec<(String, V)>) -> Vec<(String, V)> {
    locals
        .into_iter()
        .filter(|(name, _)| !TEMPORARY_NAMES.contains(&name.as_str()))
        .collect()
}

/// Formats frames as the `bt` command and uncaught-error reports print them.
/// A gap in the levels becomes one line counting the frames left out.
pub fn format_backtrace(frames: &[StackFrame], selected: Option<usize>) -> Vec<String> {
    let mut lines = Vec::with_capacity(frames.len());
    let mut next = None;
    for frame in frames {
        match next {
            Some(next) if frame.level > next => {
                lines.push(format!("  ... {} frames skipped", frame.level - next));
            }
            _ => {}
        }
        let marker = if selected == Some(frame.level) { "*" } else { " " };
        lines.push(format!(
            "{marker} #{:<2} {} in {}",
            frame.level,
            frame.location(),
            frame.function
        ));
        next = Some(frame.level + 1);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temporaries_are_hidden() {
        let locals = vec![
            ("x".to_string(), 1),
            ("(temporary)".to_string(), 2),
            ("(*temporary)".to_string(), 3),
            ("y".to_string(), 4),
        ];
        let names: Vec<_> = visible_locals(locals).into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["x", "y"]);
    }

    #[test]
    fn native_and_unnamed_frames_get_markers() {
        let mut paths = PathNormalizer::new();
        let native = describe(
            1,
            FrameInfo {
                source: "=[C]".into(),
                line: None,
                function: None,
                kind: FrameKind::Native,
            },
            &mut paths,
        );
        assert_eq!(native.file, "[C]");
        assert_eq!(native.function, "<anonymous>");

        let main = describe(
            2,
            FrameInfo {
                source: "@nowhere/to/be/found.lua".into(),
                line: Some(4),
                function: None,
                kind: FrameKind::Main,
            },
            &mut paths,
        );
        assert_eq!(main.file, "found.lua");
        assert_eq!(main.function, "main chunk");
        assert_eq!(main.location(), "found.lua:4");
    }

    #[test]
    fn backtrace_lines_mark_the_selected_frame() {
        let frames = vec![
            StackFrame {
                level: 0,
                file: "a.lua".into(),
                line: Some(3),
                function: "inner".into(),
                kind: FrameKind::Script,
            },
            StackFrame {
                level: 1,
                file: "[C]".into(),
                line: None,
                function: "pcall".into(),
                kind: FrameKind::Native,
            },
        ];
        let lines = format_backtrace(&frames, Some(1));
        assert_eq!(lines[0], "  #0  a.lua:3 in inner");
        assert_eq!(lines[1], "* #1  [C] in pcall");
    }

    #[test]
    fn gaps_in_a_backtrace_are_counted() {
        let frame = |level: usize| StackFrame {
            level,
            file: "deep.lua".into(),
            line: Some(2),
            function: "dive".into(),
            kind: FrameKind::Script,
        };
        let lines = format_backtrace(&[frame(0), frame(1), frame(7), frame(8)], None);
        assert_eq!(
            lines,
            [
                "  #0  deep.lua:2 in dive",
                "  #1  deep.lua:2 in dive",
                "  ... 5 frames skipped",
                "  #7  deep.lua:2 in dive",
                "  #8  deep.lua:2 in dive",
            ]
        );
    }
}
