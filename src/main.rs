use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use eyre::{Result, WrapErr};
use lua_debugger::{repl, Console, Error, Frontend, JsonLines, Options, Session};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Source-level debugger for Lua scripts.
#[derive(Parser, Debug)]
#[command(name = "lua-debugger", version, after_help = repl::HELP)]
struct Args {
    /// Read session options from a JSON file.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Exchange JSON lines on stdin/stdout instead of using the terminal.
    #[arg(long)]
    json: bool,

    /// Script to debug.
    script: Option<PathBuf>,

    /// Arguments passed to the script.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

fn subscriber() {
    tracing_subscriber::Registry::default()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init()
}

fn main() -> Result<ExitCode> {
    subscriber();
    let args = Args::parse();

    let Some(script) = args.script else {
        eprintln!("{}", Args::command().render_usage());
        eprintln!("\n{}", repl::HELP);
        return Ok(ExitCode::FAILURE);
    };

    let options = match &args.config {
        Some(path) => Options::from_file(path).wrap_err("cannot load session options")?,
        None => Options::default(),
    };

    let result = if args.json {
        let frontend = JsonLines::new(io::stdin().lock(), io::stdout());
        debug(Session::new(frontend, options), &script, &args.args)
    } else {
        debug(Session::new(Console::new(), options), &script, &args.args)
    };

    match result {
        Ok(()) => Ok(ExitCode::SUCCESS),
        // already reported through the front end, backtrace included
        Err(Error::Uncaught { .. }) => Ok(ExitCode::FAILURE),
        Err(e) => {
            eprintln!("error: {e}");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn debug<F: Frontend + 'static>(
    mut session: Session<F>,
    script: &Path,
    args: &[String],
) -> lua_debugger::Result<()> {
    info!(script = %script.display(), "starting session");
    session.attach(script, args)
}
