use std::collections::VecDeque;

use tracing::{debug, warn};

use super::breakpoints::BreakpointRegistry;
use super::inspect::Inspector;
use super::path::PathNormalizer;
use super::source;
use super::stepping::{RunMode, Stepper};
use super::SourceLocation;
use crate::config::Options;
use crate::error::Result;
use crate::frontend::Frontend;
use crate::host::lua::HookAction;
use crate::host::{FrameKind, Host};
use crate::repl::{self, Flow};

/// State of one debug session, owned by a [`Session`](super::Session).
///
/// Only the pending queue outlives an attach; everything else is reset by
/// [`DebugContext::reset`].
#[derive(Debug)]
pub struct DebugContext {
    pub(crate) breakpoints: BreakpointRegistry,
    pub(crate) stepper: Stepper,
    /// Normalizer for displayed frames, separate from the registry's keys.
    pub(crate) paths: PathNormalizer,
    pub(crate) current: Option<SourceLocation>,
    pub(crate) frame_index: usize,
    pub(crate) options: Options,
    pending: VecDeque<String>,
    attached: bool,
    terminated: bool,
}

impl DebugContext {
    pub fn new(options: Options) -> Self {
        Self {
            breakpoints: BreakpointRegistry::new(),
            stepper: Stepper::new(),
            paths: PathNormalizer::new(),
            current: None,
            frame_index: 0,
            options,
            pending: VecDeque::new(),
            attached: false,
            terminated: false,
        }
    }

    /// Starts a fresh attach in `mode`.
    pub fn reset(&mut self, mode: RunMode) {
        self.breakpoints.clear_all();
        self.stepper = Stepper::new();
        self.stepper.set_mode(mode);
        self.paths.clear();
        self.current = None;
        self.frame_index = 0;
        self.attached = true;
        self.terminated = false;
    }

    pub fn detach(&mut self) {
        self.attached = false;
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// Whether the operator has quit this attach.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn breakpoints(&self) -> &BreakpointRegistry {
        &self.breakpoints
    }

    pub fn mode(&self) -> RunMode {
        self.stepper.mode()
    }

    pub fn current(&self) -> Option<&SourceLocation> {
        self.current.as_ref()
    }

    /// Queues a command line for the dispatcher.
    pub fn feed(&mut self, line: impl Into<String>) {
        self.pending.push_back(line.into());
    }

    /// Next command line: queued ones first, then the front end.
    ///
    /// `None` means input is exhausted.
    pub fn next_command(&mut self, frontend: &mut dyn Frontend) -> Option<String> {
        if let Some(line) = self.pending.pop_front() {
            if self.options.echo_queued {
                frontend.print(&format!("{}{line}", self.options.prompt));
            }
            return Some(line);
        }
        frontend.prompt(&self.options.prompt)
    }

    /// Handles one line event: decides whether to pause and, if so, runs the
    /// command loop until the operator resumes or quits.
    pub fn on_line<H: Host>(&mut self, host: &H, frontend: &mut dyn Frontend) -> HookAction {
        if self.terminated {
            return HookAction::Terminate;
        }
        match self.handle_line(host, frontend) {
            Ok(action) => action,
            Err(e) => {
                warn!("line event failed: {e}");
                HookAction::Continue
            }
        }
    }

    fn handle_line<H: Host>(
        &mut self,
        host: &H,
        frontend: &mut dyn Frontend,
    ) -> Result<HookAction> {
        if self.stepper.mode() == RunMode::Run && self.breakpoints.is_empty() {
            return Ok(HookAction::Continue);
        }
        let Some(info) = host.frame(0)? else {
            return Ok(HookAction::Continue);
        };
        let Some(line) = info.line.filter(|_| info.kind != FrameKind::Native) else {
            return Ok(HookAction::Continue);
        };

        let hit = !self.breakpoints.is_empty() && self.breakpoints.is_hit(&info.source, line);
        let pause = self.stepper.should_pause(hit, || {
            host.depth().unwrap_or_else(|e| {
                warn!("cannot measure stack depth: {e}");
                0
            })
        });
        if !pause {
            return Ok(HookAction::Continue);
        }

        let frame = Inspector::new(host, &mut self.paths).frame(0)?;
        let (file, function) = match frame {
            Some(frame) => (frame.file, frame.function),
            None => (info.source, String::from("?")),
        };
        let location = SourceLocation { file, line };
        let reason = if hit {
            match self.breakpoints.index_of(&location) {
                Some(index) => format!("breakpoint #{index}"),
                None => "breakpoint".to_string(),
            }
        } else {
            "step".to_string()
        };
        debug!(%location, %reason, "paused");

        frontend.print(&format!("{reason} at {location} in {function}"));
        for text in source::render(&location.file, line, 0) {
            frontend.print(&text);
        }
        self.current = Some(location);
        self.frame_index = 0;

        match repl::run(self, host, frontend) {
            Flow::Quit => {
                self.terminated = true;
                debug!("operator quit");
                Ok(HookAction::Terminate)
            }
            Flow::Resume => {
                self.stepper.arm(host.depth()?);
                debug!(mode = ?self.stepper.mode(), "resuming");
                Ok(HookAction::Continue)
            }
        }
    }
}
