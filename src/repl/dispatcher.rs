use tracing::debug;

use super::commands::{parse, Command, HELP};
use crate::debugger::{
    evaluate, format_backtrace, is_basename_key, render, DebugContext, Inspector, RunMode,
    SourceLocation, StackFrame, Variable,
};
use crate::error::Result;
use crate::frontend::Frontend;
use crate::host::Host;

/// How the command loop handed control back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Resume the target in whatever mode the commands left behind.
    Resume,
    Quit,
}

/// Reads and executes commands until one resumes the target or quits.
///
/// Running out of input switches to `Run` so the target finishes on its own.
pub fn run<H: Host>(ctx: &mut DebugContext, host: &H, frontend: &mut dyn Frontend) -> Flow {
    loop {
        let Some(line) = ctx.next_command(frontend) else {
            debug!("input exhausted, running to completion");
            ctx.stepper.set_mode(RunMode::Run);
            return Flow::Resume;
        };

        let command = parse(&line);
        debug!(?command, "dispatching");
        match execute(ctx, host, frontend, command) {
            Ok(Some(flow)) => return flow,
            Ok(None) => {}
            Err(e) => frontend.print(&format!("error: {e}")),
        }
    }
}

/// Runs one command. `Some` ends the loop.
fn execute<H: Host>(
    ctx: &mut DebugContext,
    host: &H,
    out: &mut dyn Frontend,
    command: Command,
) -> Result<Option<Flow>> {
    match command {
        Command::Step => return Ok(Some(resume(ctx, RunMode::Step))),
        Command::Next => return Ok(Some(resume(ctx, RunMode::Next))),
        Command::Finish => return Ok(Some(resume(ctx, RunMode::Finish))),
        Command::Continue => return Ok(Some(resume(ctx, RunMode::Run))),
        Command::Quit => return Ok(Some(Flow::Quit)),

        Command::Break { file, line } => {
            let file = match file {
                Some(file) => file,
                None => match &ctx.current {
                    Some(current) => current.file.clone(),
                    None => {
                        out.print("no current file; use b file:line");
                        return Ok(None);
                    }
                },
            };
            let index = ctx.breakpoints.set(&file, line)?;
            if let Some(bp) = ctx.breakpoints.list().get(index - 1) {
                out.print(&format!("Breakpoint #{index} at {}", bp.location));
                if is_basename_key(&bp.location.file) {
                    out.print("note: file not found, matching any file with this name");
                }
            }
        }
        Command::ListBreakpoints => {
            let listed = ctx.breakpoints.list();
            if listed.is_empty() {
                out.print("No breakpoints.");
            }
            for bp in listed {
                out.print(&format!("#{:<3} {}", bp.index, bp.location));
            }
        }
        Command::Clear(target) => {
            let removed = ctx.breakpoints.clear(&target)?;
            out.print(&format!("Deleted breakpoint at {removed}"));
        }

        Command::Backtrace => {
            let frames = Inspector::new(host, &mut ctx.paths).backtrace()?;
            for line in format_backtrace(&frames, Some(ctx.frame_index)) {
                out.print(&line);
            }
        }
        Command::Frame(level) => select_frame(ctx, host, out, level)?,
        Command::Up => {
            let level = ctx.frame_index + 1;
            select_frame(ctx, host, out, level)?
        }
        Command::Down => match ctx.frame_index.checked_sub(1) {
            Some(level) => select_frame(ctx, host, out, level)?,
            None => out.print("already at the innermost frame"),
        },

        Command::Stack => {
            let inspector = Inspector::new(host, &mut ctx.paths);
            let locals = inspector.locals_of(ctx.frame_index)?;
            let upvalues = inspector.upvalues_of(ctx.frame_index)?;
            print_variables(out, "Locals:", &locals);
            print_variables(out, "Upvalues:", &upvalues);
        }
        Command::Locals => {
            let locals = Inspector::new(host, &mut ctx.paths).locals_of(ctx.frame_index)?;
            print_variables(out, "Locals:", &locals);
        }
        Command::Upvalues => {
            let upvalues = Inspector::new(host, &mut ctx.paths).upvalues_of(ctx.frame_index)?;
            print_variables(out, "Upvalues:", &upvalues);
        }
        Command::Print(expr) => {
            let values = evaluate(host, ctx.frame_index, &expr);
            // whatever the snippet printed comes before its results
            let printed = host.take_output();
            if !printed.is_empty() {
                out.target(&printed);
            }
            for value in values? {
                out.print(&value.to_string());
            }
        }

        Command::List(radius) => {
            let radius = radius.unwrap_or(ctx.options.list_radius);
            match selected_location(ctx, host)? {
                Some(location) => print_source(out, &location, radius),
                None => out.print("no current location"),
            }
        }
        Command::Where => match selected_frame(ctx, host)? {
            Some(frame) => {
                out.print(&format!("{} in {}", frame.location(), frame.function));
                if let Some(line) = frame.line {
                    let location = SourceLocation {
                        file: frame.file,
                        line,
                    };
                    print_source(out, &location, ctx.options.where_radius);
                }
            }
            None => out.print("no current location"),
        },
        Command::Help => {
            for line in HELP.lines() {
                out.print(line);
            }
        }

        Command::Invalid(usage) => out.print(&format!("usage: {usage}")),
        Command::Unknown(name) => {
            out.print(&format!("unknown command '{name}'; type 'help' for a list"))
        }
    }
    Ok(None)
}

fn resume(ctx: &mut DebugContext, mode: RunMode) -> Flow {
    ctx.stepper.set_mode(mode);
    Flow::Resume
}

fn select_frame<H: Host>(
    ctx: &mut DebugContext,
    host: &H,
    out: &mut dyn Frontend,
    level: usize,
) -> Result<()> {
    match Inspector::new(host, &mut ctx.paths).frame(level)? {
        Some(frame) => {
            ctx.frame_index = level;
            for line in format_backtrace(std::slice::from_ref(&frame), Some(level)) {
                out.print(&line);
            }
        }
        None => out.print(&format!("no frame {level}")),
    }
    Ok(())
}

fn selected_frame<H: Host>(ctx: &mut DebugContext, host: &H) -> Result<Option<StackFrame>> {
    Inspector::new(host, &mut ctx.paths).frame(ctx.frame_index)
}

/// Location of the selected frame, or the pause location when that frame
/// has no line of its own.
fn selected_location<H: Host>(
    ctx: &mut DebugContext,
    host: &H,
) -> Result<Option<SourceLocation>> {
    let from_frame = selected_frame(ctx, host)?.and_then(|frame| {
        frame.line.map(|line| SourceLocation {
            file: frame.file,
            line,
        })
    });
    Ok(from_frame.or_else(|| ctx.current.clone()))
}

fn print_source(out: &mut dyn Frontend, location: &SourceLocation, radius: usize) {
    for line in render(&location.file, location.line, radius) {
        out.print(&line);
    }
}

fn print_variables(out: &mut dyn Frontend, heading: &str, vars: &[Variable]) {
    out.print(heading);
    if vars.is_empty() {
        out.print("  (none)");
    }
    for var in vars {
        out.print(&format!("  {} = {}", var.name, var.value));
    }
}
