//! [`Host`] backed by an embedded Lua 5.4 state.
//!
//! Stack introspection goes through the `debug` library (`getinfo`,
//! `getlocal`, `getupvalue`), captured right after the state is created so
//! the target cannot take it away.

use std::cell::{Cell, OnceCell, RefCell};
use std::fs;
use std::path::Path;
use std::rc::Rc;

use mlua::{
    Function, HookTriggers, Lua, LuaOptions, MultiValue, StdLib, Table, Value as LuaValue,
    VmState,
};
use tracing::{debug, warn};

use super::{FrameInfo, FrameKind, Host};
use crate::debugger::{Number, Resolver, Scope, Value};
use crate::error::{is_terminated, Error, Result, SessionTerminated};

/// Name given to snippets compiled by the evaluator.
const SNIPPET_NAME: &str = "=(debug)";

/// Innermost frames kept in a failure backtrace.
const HEAD_FRAMES: usize = 10;
/// Outermost frames kept in a failure backtrace.
const TAIL_FRAMES: usize = 11;

/// What the line hook wants the runtime to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookAction {
    Continue,
    /// Unwind the target with [`SessionTerminated`].
    Terminate,
}

/// How a target run ended.
#[derive(Debug)]
pub enum Outcome {
    Completed,
    /// Unwound by [`HookAction::Terminate`].
    Terminated,
    Failed {
        message: String,
        /// Stack at the point of failure, innermost first, with host levels.
        /// Deep stacks keep only the innermost and outermost frames.
        frames: Vec<(usize, FrameInfo)>,
    },
}

#[derive(Clone)]
struct Introspection {
    getinfo: Function,
    getlocal: Function,
    getupvalue: Function,
}

impl Introspection {
    fn capture(lua: &Lua) -> Result<Self> {
        let debug: Table = lua.globals().get("debug")?;
        Ok(Self {
            getinfo: debug.get("getinfo")?,
            getlocal: debug.get("getlocal")?,
            getupvalue: debug.get("getupvalue")?,
        })
    }

    /// `debug.getinfo` at an absolute level, as seen from the call itself.
    fn info(&self, level: usize, what: &str) -> mlua::Result<Option<Table>> {
        self.getinfo.call((level, what))
    }

    fn exists(&self, level: usize) -> mlua::Result<bool> {
        Ok(self.info(level, "")?.is_some())
    }
}

/// Shared by the line hook, the failure handler and the target's output
/// functions of one runtime.
#[derive(Debug, Default)]
struct RunState {
    /// Frames beneath the target's main chunk. They belong to the protected
    /// call and never change while the target runs.
    beneath: Cell<Option<usize>>,
    /// Target output the front end could not take yet.
    pending: RefCell<String>,
}

/// One Lua state and the target loaded into it.
pub struct LuaRuntime {
    lua: Lua,
    introspection: Introspection,
    state: Rc<RunState>,
}

impl LuaRuntime {
    pub fn new() -> Result<Self> {
        // SAFETY: the `debug` library is what the debugger inspects frames
        // with; nothing else outside the safe set is loaded.
        let lua = unsafe {
            Lua::unsafe_new_with(StdLib::ALL_SAFE | StdLib::DEBUG, LuaOptions::new())
        };
        let introspection = Introspection::capture(&lua)?;
        Ok(Self {
            lua,
            introspection,
            state: Rc::default(),
        })
    }

    /// Reads and compiles the target without running it.
    pub fn load(&self, script: &Path) -> Result<Function> {
        let load_error = |message: String| Error::ScriptLoad {
            path: script.to_path_buf(),
            message,
        };

        let mut source = fs::read_to_string(script).map_err(|e| load_error(e.to_string()))?;
        if source.starts_with('#') {
            // keep the shebang line so line numbers stay put
            source.insert_str(0, "--");
        }

        self.lua
            .load(source.as_str())
            .set_name(format!("@{}", script.display()))
            .into_function()
            .map_err(|e| load_error(lua_message(&e)))
    }

    /// Installs `on_line` as the per-line execution callback.
    pub fn set_line_hook<F>(&self, on_line: F)
    where
        F: Fn(&LuaHost<'_>) -> HookAction + 'static,
    {
        let introspection = self.introspection.clone();
        let state = Rc::clone(&self.state);
        self.lua
            .set_hook(HookTriggers::new().every_line(), move |lua, event| {
                let host = LuaHost::at_line(lua, &introspection, &state, event.curr_line());
                host.remember_entry();
                match on_line(&host) {
                    HookAction::Continue => Ok(VmState::Continue),
                    HookAction::Terminate => Err(mlua::Error::external(SessionTerminated)),
                }
            });
    }

    pub fn remove_hook(&self) {
        self.lua.remove_hook();
    }

    /// Replaces the target's `print` and `io.write` with functions that hand
    /// their text to `sink`.
    ///
    /// `sink` returns `false` when it cannot take text right now. That text
    /// is kept, in order, for the next delivery or for
    /// [`Host::take_output`].
    pub fn set_output<F>(&self, sink: F) -> Result<()>
    where
        F: Fn(&str) -> bool + 'static,
    {
        let deliver = {
            let state = Rc::clone(&self.state);
            Rc::new(move |text: &str| {
                let mut pending = state.pending.borrow_mut();
                pending.push_str(text);
                if sink(&pending) {
                    pending.clear();
                }
            })
        };
        let globals = self.lua.globals();
        let tostring: Function = globals.get("tostring")?;

        let print = {
            let deliver = Rc::clone(&deliver);
            let tostring = tostring.clone();
            self.lua.create_function(move |_, args: MultiValue| {
                let mut line = String::new();
                for (i, value) in args.into_iter().enumerate() {
                    if i > 0 {
                        line.push('\t');
                    }
                    let text: mlua::String = tostring.call(value)?;
                    line.push_str(&text.to_string_lossy());
                }
                line.push('\n');
                deliver(&line);
                Ok(())
            })?
        };
        globals.set("print", print)?;

        let io: Option<Table> = globals.get("io")?;
        if let Some(io) = io {
            let stdout: LuaValue = io.get("stdout")?;
            let write = self.lua.create_function(move |_, args: MultiValue| {
                let mut text = String::new();
                for (i, value) in args.into_iter().enumerate() {
                    match &value {
                        LuaValue::String(s) => text.push_str(&s.to_string_lossy()),
                        LuaValue::Integer(_) | LuaValue::Number(_) => {
                            let s: mlua::String = tostring.call(value)?;
                            text.push_str(&s.to_string_lossy());
                        }
                        other => {
                            return Err(mlua::Error::RuntimeError(format!(
                                "bad argument #{} to 'write' (string expected, got {})",
                                i + 1,
                                other.type_name()
                            )))
                        }
                    }
                }
                deliver(&text);
                Ok(stdout.clone())
            })?;
            io.set("write", write)?;
        }
        debug!("target output routed to the front end");
        Ok(())
    }

    /// Runs the target under `xpcall`, capturing the stack if it fails.
    pub fn run(&self, main: &Function, script: &Path, args: &[String]) -> Result<Outcome> {
        let arg = self.lua.create_table()?;
        arg.raw_set(0, script.display().to_string())?;
        for (i, value) in args.iter().enumerate() {
            arg.raw_set(i + 1, value.as_str())?;
        }
        self.lua.globals().set("arg", arg)?;

        let captured: Rc<RefCell<Vec<(usize, FrameInfo)>>> = Rc::default();
        let terminated: Rc<Cell<bool>> = Rc::default();
        let handler = {
            let captured = Rc::clone(&captured);
            let terminated = Rc::clone(&terminated);
            let introspection = self.introspection.clone();
            let state = Rc::clone(&self.state);
            self.lua.create_function(move |lua, err: LuaValue| {
                if let LuaValue::Error(e) = &err {
                    if is_terminated(e) {
                        terminated.set(true);
                        return Ok(e.to_string());
                    }
                }
                // level 1 is this handler, level 2 is where the error was raised
                let host = LuaHost::new(lua, &introspection, &state, 2);
                match host.frames() {
                    Ok(frames) => *captured.borrow_mut() = frames,
                    Err(e) => warn!("could not capture failing stack: {e}"),
                }
                Ok(message_of(&err))
            })?
        };

        let xpcall: Function = self.lua.globals().get("xpcall")?;
        let mut call_args = vec![LuaValue::Function(main.clone()), LuaValue::Function(handler)];
        for value in args {
            call_args.push(LuaValue::String(self.lua.create_string(value)?));
        }

        let results: MultiValue = xpcall.call(call_args.into_iter().collect::<MultiValue>())?;
        let mut results = results.into_iter();
        match results.next() {
            Some(LuaValue::Boolean(true)) => Ok(Outcome::Completed),
            _ if terminated.get() => Ok(Outcome::Terminated),
            _ => Ok(Outcome::Failed {
                message: results.next().map(|v| message_of(&v)).unwrap_or_default(),
                frames: captured.take(),
            }),
        }
    }
}

/// The runtime as seen from one line event or failure.
pub struct LuaHost<'a> {
    lua: &'a Lua,
    introspection: &'a Introspection,
    state: &'a RunState,
    /// `getinfo` level of host level 0.
    base: usize,
    /// Host level of the target's entry frame, once known.
    entry: OnceCell<Option<usize>>,
}

impl<'a> LuaHost<'a> {
    fn new(
        lua: &'a Lua,
        introspection: &'a Introspection,
        state: &'a RunState,
        base: usize,
    ) -> Self {
        Self {
            lua,
            introspection,
            state,
            base,
            entry: OnceCell::new(),
        }
    }

    /// Host for a line event on `line`: level 0 is the first Lua frame
    /// currently on that line.
    fn at_line(
        lua: &'a Lua,
        introspection: &'a Introspection,
        state: &'a RunState,
        line: i32,
    ) -> Self {
        let on_line = |level: usize| -> mlua::Result<bool> {
            let Some(info) = introspection.info(level, "l")? else {
                return Ok(false);
            };
            let current: i64 = info.get("currentline")?;
            Ok(current == i64::from(line))
        };
        let base = (1..=4)
            .find(|&level| on_line(level).unwrap_or(false))
            .unwrap_or(1);
        Self::new(lua, introspection, state, base)
    }

    /// Records how many frames sit beneath the target's main chunk.
    ///
    /// This walks the whole stack, so it only runs until it succeeds once,
    /// which is on the first line event while the stack is still shallow.
    fn remember_entry(&self) {
        if self.state.beneath.get().is_some() {
            return;
        }
        match self.measure_beneath() {
            Ok(Some(beneath)) => {
                debug!(beneath, "located the main chunk");
                self.state.beneath.set(Some(beneath));
            }
            Ok(None) => {}
            Err(e) => warn!("cannot locate the main chunk: {e}"),
        }
    }

    fn measure_beneath(&self) -> Result<Option<usize>> {
        let mut main = None;
        let mut level = self.base;
        while let Some(info) = self.introspection.info(level, "S")? {
            let what: String = info.get("what")?;
            if what == "main" {
                main = Some(level);
            }
            level += 1;
        }
        // `level` is one past the outermost frame
        Ok(main.map(|main| level - 1 - main))
    }

    /// Highest level `getinfo` answers for, by doubling then bisecting.
    fn top(&self) -> mlua::Result<usize> {
        // level 0 is the getinfo call itself
        let (mut low, mut high) = (0, 1);
        while self.introspection.exists(high)? {
            low = high;
            high *= 2;
        }
        while high - low > 1 {
            let mid = low + (high - low) / 2;
            if self.introspection.exists(mid)? {
                low = mid;
            } else {
                high = mid;
            }
        }
        Ok(low)
    }

    /// Frames down to the entry frame, innermost first, with their levels.
    /// Deep stacks keep [`HEAD_FRAMES`] and [`TAIL_FRAMES`] from each end.
    fn frames(&self) -> Result<Vec<(usize, FrameInfo)>> {
        let depth = self.depth()?;
        let levels: Vec<usize> = if depth <= HEAD_FRAMES + TAIL_FRAMES {
            (0..depth).collect()
        } else {
            (0..HEAD_FRAMES).chain(depth - TAIL_FRAMES..depth).collect()
        };

        let mut frames = Vec::with_capacity(levels.len());
        for level in levels {
            if let Some(frame) = self.frame(level)? {
                frames.push((level, frame));
            }
        }
        Ok(frames)
    }

    /// The outermost `main` frame is the target's; anything below it
    /// belongs to the debugger.
    ///
    /// Found from the stack height and the recorded frame count beneath the
    /// main chunk. Off the target's own stack (inside a coroutine) the
    /// outermost frame stands in.
    fn entry_level(&self) -> Result<Option<usize>> {
        if let Some(entry) = self.entry.get() {
            return Ok(*entry);
        }

        let top = self.top()?;
        let recorded = self
            .state
            .beneath
            .get()
            .and_then(|beneath| top.checked_sub(beneath))
            .filter(|&main| main >= self.base);
        let main = match recorded {
            Some(level) if self.is_main(level)? => level,
            _ => top,
        };

        let entry = main.checked_sub(self.base);
        let _ = self.entry.set(entry);
        Ok(entry)
    }

    fn is_main(&self, level: usize) -> Result<bool> {
        let Some(info) = self.introspection.info(level, "S")? else {
            return Ok(false);
        };
        let what: String = info.get("what")?;
        Ok(what == "main")
    }

    /// Absolute `getinfo` level for a host level within the target's stack.
    fn absolute(&self, level: usize) -> Result<Option<usize>> {
        // the frame the host was built around needs no bounds check
        if level == 0 {
            return Ok(Some(self.base));
        }
        Ok(self
            .entry_level()?
            .filter(|&entry| level <= entry)
            .map(|_| self.base + level))
    }

    fn function_at(&self, level: usize) -> Result<Option<Function>> {
        let Some(absolute) = self.absolute(level)? else {
            return Ok(None);
        };
        match self.introspection.info(absolute, "f")? {
            Some(info) => Ok(info.get("func")?),
            None => Ok(None),
        }
    }
}

impl Host for LuaHost<'_> {
    type Value = LuaValue;
    type Chunk = Function;

    fn depth(&self) -> Result<usize> {
        Ok(self.entry_level()?.map_or(0, |entry| entry + 1))
    }

    fn frame(&self, level: usize) -> Result<Option<FrameInfo>> {
        let Some(absolute) = self.absolute(level)? else {
            return Ok(None);
        };
        let Some(info) = self.introspection.info(absolute, "nSl")? else {
            return Ok(None);
        };

        let what: String = info.get("what")?;
        let kind = match what.as_str() {
            "C" => FrameKind::Native,
            "main" => FrameKind::Main,
            _ => FrameKind::Script,
        };
        let source: String = info.get("source")?;
        let source = if source.starts_with('@') {
            source
        } else {
            info.get("short_src")?
        };
        let line: i64 = info.get("currentline")?;

        Ok(Some(FrameInfo {
            source,
            line: u32::try_from(line).ok().filter(|&l| l > 0),
            function: info.get("name")?,
            kind,
        }))
    }

    fn locals(&self, level: usize) -> Result<Vec<(String, LuaValue)>> {
        let Some(absolute) = self.absolute(level)? else {
            return Ok(Vec::new());
        };
        let mut locals = Vec::new();
        for index in 1usize.. {
            let (name, value): (Option<String>, LuaValue) =
                self.introspection.getlocal.call((absolute, index))?;
            let Some(name) = name else { break };
            locals.push((name, value));
        }
        Ok(locals)
    }

    fn upvalues(&self, level: usize) -> Result<Vec<(String, LuaValue)>> {
        let Some(function) = self.function_at(level)? else {
            return Ok(Vec::new());
        };
        let mut upvalues = Vec::new();
        for index in 1usize.. {
            let (name, value): (Option<String>, LuaValue) =
                self.introspection.getupvalue.call((function.clone(), index))?;
            match name {
                None => break,
                // native functions have unnamed upvalues
                Some(name) if name.is_empty() => continue,
                Some(name) => upvalues.push((name, value)),
            }
        }
        Ok(upvalues)
    }

    fn snapshot(&self, value: &LuaValue) -> Value {
        snapshot(value)
    }

    fn compile(&self, text: &str, scope: &Scope<LuaValue>) -> Result<Function> {
        let env = self.environment(scope)?;
        self.lua
            .load(text)
            .set_name(SNIPPET_NAME)
            .set_environment(env)
            .into_function()
            .map_err(|e| Error::Compile(lua_message(&e)))
    }

    fn execute(&self, chunk: Function) -> Result<Vec<LuaValue>> {
        let values: MultiValue = chunk
            .call(())
            .map_err(|e| Error::Runtime(lua_message(&e)))?;
        Ok(values.into_iter().collect())
    }

    fn take_output(&self) -> String {
        std::mem::take(&mut *self.state.pending.borrow_mut())
    }
}

impl LuaHost<'_> {
    /// Builds the `_ENV` table for a snippet.
    ///
    /// Every `Bindings` resolver becomes a pair of tables (values, and the
    /// set of bound names, so a binding holding `nil` still shadows). The
    /// metatable walks the resolvers in order on reads; writes land in the
    /// binding copy when the name is bound, otherwise in the globals.
    fn environment(&self, scope: &Scope<LuaValue>) -> Result<Table> {
        let globals = self.lua.globals();
        let mut layers: Vec<Option<(Table, Table)>> = Vec::new();
        for resolver in &scope.resolvers {
            match resolver {
                Resolver::Bindings { values, .. } => {
                    let bound = self.lua.create_table()?;
                    let copies = self.lua.create_table()?;
                    for (name, value) in values {
                        bound.raw_set(name.as_str(), true)?;
                        copies.raw_set(name.as_str(), value.clone())?;
                    }
                    layers.push(Some((copies, bound)));
                }
                Resolver::Globals => layers.push(None),
            }
        }
        let writes_to_globals = layers.iter().any(Option::is_none);

        let index = {
            let layers = layers.clone();
            let globals = globals.clone();
            self.lua
                .create_function(move |_, (_, key): (Table, LuaValue)| {
                    for layer in &layers {
                        match layer {
                            Some((copies, bound)) => {
                                if is_bound(bound, &key)? {
                                    let value: LuaValue = copies.raw_get(key)?;
                                    return Ok(value);
                                }
                            }
                            None => {
                                let value: LuaValue = globals.get(key.clone())?;
                                if !value.is_nil() {
                                    return Ok(value);
                                }
                            }
                        }
                    }
                    Ok(LuaValue::Nil)
                })?
        };

        let newindex = self.lua.create_function(
            move |_, (env, key, value): (Table, LuaValue, LuaValue)| {
                for (copies, bound) in layers.iter().flatten() {
                    if is_bound(bound, &key)? {
                        return copies.raw_set(key, value);
                    }
                }
                if writes_to_globals {
                    globals.set(key, value)
                } else {
                    env.raw_set(key, value)
                }
            },
        )?;

        let meta = self.lua.create_table()?;
        meta.raw_set("__index", index)?;
        meta.raw_set("__newindex", newindex)?;
        let env = self.lua.create_table()?;
        env.set_metatable(Some(meta));
        let resolvers: Vec<&str> = scope.resolvers.iter().map(Resolver::name).collect();
        debug!(?resolvers, "built snippet environment");
        Ok(env)
    }
}

fn is_bound(bound: &Table, key: &LuaValue) -> mlua::Result<bool> {
    let flag: LuaValue = bound.raw_get(key.clone())?;
    Ok(!flag.is_nil())
}

/// The message a Lua error carries, without mlua's prefixes.
fn lua_message(err: &mlua::Error) -> String {
    match err {
        mlua::Error::SyntaxError { message, .. } => message.clone(),
        mlua::Error::RuntimeError(message) => message.clone(),
        mlua::Error::CallbackError { cause, .. } => lua_message(cause),
        other => other.to_string(),
    }
}

/// Text of an error value raised by the target.
fn message_of(value: &LuaValue) -> String {
    match value {
        LuaValue::String(s) => s.to_string_lossy().into(),
        LuaValue::Error(e) => lua_message(e),
        other => snapshot(other).to_string(),
    }
}

fn snapshot(value: &LuaValue) -> Value {
    match value {
        LuaValue::Nil => Value::Absent,
        LuaValue::Boolean(b) => Value::Boolean(*b),
        LuaValue::Integer(n) => Value::Number(Number::Integer(*n)),
        LuaValue::Number(x) => Value::Number(Number::Float(*x)),
        LuaValue::String(s) => Value::Text(s.to_string_lossy().into()),
        LuaValue::Table(_) => Value::Aggregate(format!("table: {:p}", value.to_pointer())),
        LuaValue::Function(_) => Value::Callable(format!("function: {:p}", value.to_pointer())),
        LuaValue::Error(e) => Value::Opaque(format!("error: {}", lua_message(e))),
        other => Value::Opaque(format!("{}: {:p}", other.type_name(), other.to_pointer())),
    }
}
