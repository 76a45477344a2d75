use tracing::trace;

/// Run modes for the debugger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Paused, or not yet told what to do.
    #[default]
    Stop,
    /// Pause on every executed line, at any depth.
    Step,
    /// Step over calls made from the current line.
    Next,
    /// Run until the current frame returns.
    Finish,
    /// Only breakpoints pause.
    Run,
}

/// Decides on every line event whether to pause.
///
/// `stop_depth` is the call depth captured when entering `Next` or
/// `Finish`; zero means it has not been captured yet.
#[derive(Debug, Default, Clone)]
pub struct Stepper {
    mode: RunMode,
    stop_depth: usize,
}

impl Stepper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn stop_depth(&self) -> usize {
        self.stop_depth
    }

    pub fn set_mode(&mut self, mode: RunMode) {
        if matches!(mode, RunMode::Next | RunMode::Finish) {
            self.stop_depth = 0;
        }
        self.mode = mode;
    }

    /// Captures the baseline for `Next`/`Finish` at the depth execution resumes from.
    pub fn arm(&mut self, depth: usize) {
        if matches!(self.mode, RunMode::Next | RunMode::Finish) && self.stop_depth == 0 {
            self.stop_depth = depth;
        }
    }

    /// Evaluates one line event. `depth` is only queried when the mode needs it.
    ///
    /// On a pause the mode drops back to `Stop`.
    pub fn should_pause(&mut self, hit: bool, depth: impl FnOnce() -> usize) -> bool {
        let pause = if hit {
            true
        } else {
            match self.mode {
                RunMode::Step => true,
                RunMode::Next => {
                    let d = depth();
                    if self.stop_depth == 0 {
                        self.stop_depth = d;
                    }
                    d <= self.stop_depth
                }
                RunMode::Finish => {
                    let d = depth();
                    if self.stop_depth == 0 {
                        self.stop_depth = d;
                    }
                    d < self.stop_depth
                }
                RunMode::Stop | RunMode::Run => false,
            }
        };
        trace!(mode = ?self.mode, stop_depth = self.stop_depth, hit, pause, "line event");

        if pause {
            self.mode = RunMode::Stop;
        }
        pause
    }
}
