//! Command parsing for the REPL

/// Command summary printed by `help` and the CLI's long help.
pub const HELP: &str = "\
Commands:
  b, break [file:]line    set a breakpoint (file defaults to the paused file)
  bl, info breakpoints    list breakpoints
  bc N | bc file:line     clear a breakpoint by index or location
  s, step                 step into the next line
  n, next, <empty>        step over calls on this line
  f, finish               run until the current function returns
  c, continue             run until the next breakpoint
  bt, backtrace           print the call stack
  frame N                 select frame N (0 is the innermost)
  up, down                select the caller / callee frame
  stack                   print locals and upvalues of the selected frame
  info locals             print locals of the selected frame
  info upvalues           print upvalues of the selected frame
  p, print <expr>         evaluate an expression in the selected frame
  list [N]                show N lines around the current line
  where                   show the current location
  help                    show this summary
  q, quit, exit           end the session";

/// A parsed REPL command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Set a breakpoint; `file` is `None` when only a line was given.
    Break { file: Option<String>, line: u32 },
    ListBreakpoints,
    /// Clear by index or literal `file:line`.
    Clear(String),
    Step,
    Next,
    Finish,
    Continue,
    Backtrace,
    Frame(usize),
    Up,
    Down,
    Stack,
    Locals,
    Upvalues,
    Print(String),
    List(Option<usize>),
    Where,
    Help,
    Quit,
    /// A known command with bad arguments; carries the usage line.
    Invalid(&'static str),
    Unknown(String),
}

/// Parses one input line. An empty line means `next`.
pub fn parse(line: &str) -> Command {
    let line = line.trim();
    let (cmd, rest) = match line.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None => (line, ""),
    };

    match cmd {
        "" | "n" | "next" => Command::Next,
        "b" | "break" => parse_break(rest),
        "bl" => Command::ListBreakpoints,
        "bc" => match tokens(rest).join(" ") {
            target if target.is_empty() => Command::Invalid("bc N | bc file:line"),
            target => Command::Clear(target),
        },
        "s" | "step" => Command::Step,
        "f" | "finish" => Command::Finish,
        "c" | "continue" => Command::Continue,
        "bt" | "backtrace" => Command::Backtrace,
        "frame" => match rest.parse() {
            Ok(level) => Command::Frame(level),
            Err(_) => Command::Invalid("frame N"),
        },
        "up" => Command::Up,
        "down" => Command::Down,
        "stack" => Command::Stack,
        "info" => match rest {
            "locals" => Command::Locals,
            "upvalues" => Command::Upvalues,
            "breakpoints" => Command::ListBreakpoints,
            _ => Command::Invalid("info locals | info upvalues | info breakpoints"),
        },
        // expressions keep their own quoting
        "p" | "print" if rest.is_empty() => Command::Invalid("p <expr>"),
        "p" | "print" => Command::Print(rest.to_string()),
        "list" if rest.is_empty() => Command::List(None),
        "list" => match rest.parse() {
            Ok(radius) => Command::List(Some(radius)),
            Err(_) => Command::Invalid("list [N]"),
        },
        "where" => Command::Where,
        "help" | "h" => Command::Help,
        "q" | "quit" | "exit" => Command::Quit,
        _ => Command::Unknown(cmd.to_string()),
    }
}

fn parse_break(args: &str) -> Command {
    const USAGE: &str = "b [file:]line";

    let target = tokens(args).join(" ");
    if target.is_empty() {
        return Command::Invalid(USAGE);
    }

    let (file, line) = match target.rsplit_once(':') {
        Some((file, line)) => (Some(file.to_string()), line),
        None => (None, target.as_str()),
    };
    match line.trim().parse::<u32>() {
        Ok(line) => Command::Break { file, line },
        Err(_) => Command::Invalid(USAGE),
    }
}

/// Splits arguments the way a shell would, so quoted file names survive.
/// Falls back to plain whitespace splitting on unbalanced quotes.
fn tokens(args: &str) -> Vec<String> {
    shlex::split(args)
        .unwrap_or_else(|| args.split_whitespace().map(String::from).collect())
}
