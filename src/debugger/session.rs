use std::cell::{Ref, RefCell};
use std::path::Path;
use std::rc::Rc;

use tracing::info;

use super::breakpoints::BreakpointRegistry;
use super::context::DebugContext;
use super::inspect::{describe, format_backtrace, StackFrame};
use super::stepping::RunMode;
use crate::config::Options;
use crate::error::{Error, Result};
use crate::frontend::Frontend;
use crate::host::lua::Outcome;
use crate::host::LuaRuntime;

struct Shared<F> {
    context: DebugContext,
    frontend: F,
}

/// Runs target scripts under the debugger.
///
/// The line hook, the target's output functions and the session share the
/// context, so it lives behind an `Rc<RefCell<..>>`. No borrow is held while
/// the target runs.
pub struct Session<F: Frontend + 'static> {
    shared: Rc<RefCell<Shared<F>>>,
    runtime: Option<LuaRuntime>,
}

impl<F: Frontend + 'static> Session<F> {
    pub fn new(frontend: F, options: Options) -> Self {
        Self {
            shared: Rc::new(RefCell::new(Shared {
                context: DebugContext::new(options),
                frontend,
            })),
            runtime: None,
        }
    }

    /// Queues a command for the next pause. Queued commands survive `attach`.
    pub fn feed(&self, line: impl Into<String>) {
        self.shared.borrow_mut().context.feed(line);
    }

    pub fn frontend(&self) -> Ref<'_, F> {
        Ref::map(self.shared.borrow(), |shared| &shared.frontend)
    }

    pub fn breakpoints(&self) -> Ref<'_, BreakpointRegistry> {
        Ref::map(self.shared.borrow(), |shared| shared.context.breakpoints())
    }

    /// Runs `script` with `args` until it finishes, fails or the operator quits.
    ///
    /// Quitting counts as success. A failure inside the target is reported
    /// through the front end with a backtrace and returned as
    /// [`Error::Uncaught`].
    pub fn attach(&mut self, script: &Path, args: &[String]) -> Result<()> {
        info!(script = %script.display(), args = args.len(), "attaching");
        {
            let mut shared = self.shared.borrow_mut();
            let mode = if shared.context.options.stop_on_entry {
                RunMode::Step
            } else {
                RunMode::Run
            };
            shared.context.reset(mode);
        }

        let runtime = LuaRuntime::new()?;
        let sink = {
            let shared = Rc::clone(&self.shared);
            move |text: &str| match shared.try_borrow_mut() {
                Ok(mut shared) => {
                    shared.frontend.target(text);
                    true
                }
                // paused: the dispatcher collects it after the snippet
                Err(_) => false,
            }
        };
        let loaded = runtime
            .set_output(sink)
            .and_then(|()| runtime.load(script));
        let main = match loaded {
            Ok(main) => main,
            Err(e) => {
                self.shared.borrow_mut().context.detach();
                return Err(e);
            }
        };

        let shared = Rc::clone(&self.shared);
        runtime.set_line_hook(move |host| {
            let mut shared = shared.borrow_mut();
            let Shared { context, frontend } = &mut *shared;
            context.on_line(host, frontend)
        });

        let runtime = self.runtime.insert(runtime);
        let outcome = runtime.run(&main, script, args);
        self.detach();
        let outcome = outcome?;

        let mut shared = self.shared.borrow_mut();
        let Shared { context, frontend } = &mut *shared;
        if context.is_terminated() {
            info!("session terminated by operator");
            return Ok(());
        }

        match outcome {
            Outcome::Completed => {
                frontend.print("Program finished.");
                info!("target completed");
                Ok(())
            }
            Outcome::Terminated => Ok(()),
            Outcome::Failed { message, frames } => {
                let backtrace: Vec<StackFrame> = frames
                    .into_iter()
                    .map(|(level, info)| describe(level, info, &mut context.paths))
                    .collect();

                frontend.print(&format!("Uncaught error: {message}"));
                frontend.print("stack traceback:");
                for line in format_backtrace(&backtrace, None) {
                    frontend.print(&line);
                }
                info!(%message, "target failed");
                Err(Error::Uncaught { message, backtrace })
            }
        }
    }

    /// Removes the line hook. Safe to call at any time.
    pub fn detach(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.remove_hook();
            info!("detached");
        }
        self.shared.borrow_mut().context.detach();
    }
}
