//! Where the debugger's output goes and its input comes from.

mod json;

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};

use tracing::warn;

pub use json::JsonLines;

/// Consecutive failed reads after which the console gives up on stdin.
const MAX_READ_FAILURES: usize = 3;

/// Output and input channel of a debug session.
pub trait Frontend {
    /// Writes raw text with no line handling.
    fn write(&mut self, text: &str);

    fn print(&mut self, line: &str) {
        self.write(line);
        self.write("\n");
    }

    /// Shows `prompt` and reads one command line. `None` at end of input.
    fn prompt(&mut self, prompt: &str) -> Option<String>;

    /// Text the target wrote with `print` or `io.write`. Goes to stdout
    /// unless the front end keeps it elsewhere.
    fn target(&mut self, text: &str) {
        let mut stdout = io::stdout().lock();
        if let Err(e) = stdout.write_all(text.as_bytes()).and_then(|()| stdout.flush()) {
            warn!("cannot write target output: {e}");
        }
    }
}

/// Interactive terminal. Debugger output goes to stderr so the target keeps
/// stdout to itself.
#[derive(Debug, Default)]
pub struct Console;

impl Console {
    pub fn new() -> Self {
        Self
    }
}

impl Frontend for Console {
    fn write(&mut self, text: &str) {
        eprint!("{text}");
    }

    fn prompt(&mut self, prompt: &str) -> Option<String> {
        read_command(&mut io::stdin().lock(), &mut io::stderr(), prompt)
    }
}

/// Prompts on `out` and reads one line from `input`.
///
/// A line that is not UTF-8 is reported and the prompt shown again. `None`
/// at end of input, or after [`MAX_READ_FAILURES`] read errors in a row.
fn read_command<R, W>(input: &mut R, out: &mut W, prompt: &str) -> Option<String>
where
    R: BufRead,
    W: Write,
{
    let mut failures = 0;
    loop {
        let _ = write!(out, "{prompt}");
        let _ = out.flush();

        let mut raw = Vec::new();
        match input.read_until(b'\n', &mut raw) {
            Ok(0) => return None,
            Ok(_) => match String::from_utf8(raw) {
                Ok(line) => return Some(trim_newline(line)),
                Err(_) => {
                    let _ = writeln!(out, "error: command is not valid UTF-8");
                    failures = 0;
                }
            },
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                warn!("cannot read command: {e}");
                let _ = writeln!(out, "error: cannot read command: {e}");
                failures += 1;
                if failures == MAX_READ_FAILURES {
                    return None;
                }
            }
        }
    }
}

/// In-memory front end with scripted input, for embedding and tests.
///
/// Answered prompts are recorded together with the answer, so the output
/// reads like a terminal session.
#[derive(Debug, Default, Clone)]
pub struct Transcript {
    output: String,
    input: VecDeque<String>,
}

impl Transcript {
    pub fn new<I, S>(input: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            output: String::new(),
            input: input.into_iter().map(Into::into).collect(),
        }
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.output.lines()
    }

    /// Scripted input not consumed yet.
    pub fn remaining(&self) -> usize {
        self.input.len()
    }
}

impl Frontend for Transcript {
    fn write(&mut self, text: &str) {
        self.output.push_str(text);
    }

    fn prompt(&mut self, prompt: &str) -> Option<String> {
        let line = self.input.pop_front()?;
        self.output.push_str(prompt);
        self.output.push_str(&line);
        self.output.push('\n');
        Some(line)
    }

    fn target(&mut self, text: &str) {
        self.output.push_str(text);
    }
}

fn trim_newline(mut line: String) -> String {
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    line
}
