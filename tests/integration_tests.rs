use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use lua_debugger::{Error, JsonLines, Options, Session, Transcript};
use tempfile::TempDir;

const ADDER: &str = "\
local function add(a, b)
  return a + b
end
local x = 10
local y = add(x, 1)
counter = y
";

// Helper to write a script into a scratch directory
fn write_script(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).expect("Failed to write test script");
    path
}

// How the debugger spells a script's path
fn shown(path: &Path) -> String {
    fs::canonicalize(path)
        .expect("script exists")
        .to_string_lossy()
        .replace('\\', "/")
}

fn debug_with(
    options: Options,
    script: &Path,
    commands: &[&str],
) -> (lua_debugger::Result<()>, String) {
    let mut session = Session::new(Transcript::new(commands.iter().copied()), options);
    let result = session.attach(script, &[]);
    let output = session.frontend().output().to_string();
    (result, output)
}

fn debug(script: &Path, commands: &[&str]) -> (lua_debugger::Result<()>, String) {
    debug_with(Options::default(), script, commands)
}

#[cfg(test)]
mod session_tests {
    use super::*;

    #[test]
    fn test_breakpoint_pause_and_print() {
        let dir = TempDir::new().unwrap();
        let path = write_script(&dir, "main.lua", ADDER);
        let file = shown(&path);

        let (result, output) = debug(&path, &["b 5", "c", "p x", "c"]);
        assert!(result.is_ok(), "{output}");

        let lines: Vec<&str> = output.lines().collect();
        assert!(lines[0].starts_with(&format!("step at {file}:")), "{output}");
        assert!(lines.contains(&format!("Breakpoint #1 at {file}:5").as_str()));

        let banner = format!("breakpoint #1 at {file}:5 in main chunk");
        let at = lines.iter().position(|l| *l == banner).expect(&output);
        assert_eq!(lines[at + 1], "=> 5  local y = add(x, 1)");
        assert_eq!(lines[at + 2], "(ldb) p x");
        assert_eq!(lines[at + 3], "10");
        assert_eq!(lines.last(), Some(&"Program finished."));
    }

    #[test]
    fn test_evaluation_scopes_and_errors() {
        let dir = TempDir::new().unwrap();
        let path = write_script(&dir, "main.lua", &format!("limit = 99\n{ADDER}"));

        let (result, output) = debug(
            &path,
            &["b 6", "c", "p limit", "p x * 2, x", "p 1 +", "p x", "p nope", "c"],
        );
        assert!(result.is_ok(), "{output}");

        let lines: Vec<&str> = output.lines().collect();
        let after = |cmd: &str| {
            let at = lines
                .iter()
                .position(|l| *l == format!("(ldb) {cmd}"))
                .expect(cmd);
            lines[at + 1]
        };
        assert_eq!(after("p limit"), "99");
        assert_eq!(after("p x * 2, x"), "20");
        assert!(after("p 1 +").starts_with("error: compile error"), "{output}");
        // still paused after the failed evaluation
        assert_eq!(after("p x"), "10");
        assert_eq!(after("p nope"), "nil");
    }

    #[test]
    fn test_print_reports_at_most_three_values() {
        let dir = TempDir::new().unwrap();
        let path = write_script(&dir, "main.lua", ADDER);

        let (result, output) = debug(&path, &["p 1, 2, 3, 4", "c"]);
        assert!(result.is_ok(), "{output}");
        assert!(output.contains("(ldb) p 1, 2, 3, 4\n1\n2\n3\n(ldb) c\n"), "{output}");
        assert!(!output.lines().any(|line| line == "4"), "{output}");
    }

    #[test]
    fn test_runtime_errors_are_reported_not_raised() {
        let dir = TempDir::new().unwrap();
        let path = write_script(&dir, "main.lua", ADDER);

        let (result, output) = debug(&path, &["b 5", "c", "p x.field.deeper", "p x", "c"]);
        assert!(result.is_ok(), "{output}");
        assert!(output.contains("error: runtime error"), "{output}");
        assert!(output.contains("(ldb) p x\n10\n"), "{output}");
    }

    #[test]
    fn test_assignments_to_unknown_names_reach_globals() {
        let dir = TempDir::new().unwrap();
        let path = write_script(
            &dir,
            "main.lua",
            "local x = 1\nlocal y = 2\nresult = leaked\nlocal z = 0\n",
        );

        let (result, output) = debug(
            &path,
            &["n", "p leaked = x + 40", "p x = 5", "n", "n", "p result, x"],
        );
        assert!(result.is_ok(), "{output}");
        // the global leaked, the local did not change
        assert!(output.contains("(ldb) p result, x\n41\n1\n"), "{output}");
    }

    #[test]
    fn test_breakpoint_listing_and_clearing() {
        let dir = TempDir::new().unwrap();
        let path = write_script(&dir, "main.lua", ADDER);
        let file = shown(&path);

        let (result, output) = debug(&path, &["b 4", "b 5", "b 6", "bc 1", "bl", "q"]);
        assert!(result.is_ok(), "{output}");
        assert!(output.contains(&format!("Deleted breakpoint at {file}:4")));
        assert!(output.contains(&format!("#1   {file}:5\n#2   {file}:6\n")), "{output}");
    }

    #[test]
    fn test_clearing_a_missing_breakpoint_keeps_the_session_going() {
        let dir = TempDir::new().unwrap();
        let path = write_script(&dir, "main.lua", ADDER);

        let (result, output) = debug(&path, &["bc 3", "bc nowhere.lua:9", "bl", "c"]);
        assert!(result.is_ok(), "{output}");
        assert!(output.contains("error: no breakpoint matches '3'"), "{output}");
        assert!(output.contains("error: no breakpoint matches 'nowhere.lua:9'"));
        assert!(output.contains("No breakpoints."));
        assert!(output.ends_with("Program finished.\n"));
    }

    #[test]
    fn test_list_clamps_to_the_file() {
        let dir = TempDir::new().unwrap();
        let path = write_script(&dir, "main.lua", ADDER);

        let (result, output) = debug(&path, &["b 6", "c", "list", "list 100", "c"]);
        assert!(result.is_ok(), "{output}");

        let lines: Vec<&str> = output.lines().collect();
        let at = lines.iter().position(|l| *l == "(ldb) list").unwrap();
        assert_eq!(lines[at + 1], "   1  local function add(a, b)");
        assert_eq!(lines[at + 6], "=> 6  counter = y");
        assert_eq!(lines[at + 7], "(ldb) list 100");
        assert_eq!(lines[at + 8], "   1  local function add(a, b)");
    }

    #[test]
    fn test_where_names_the_function() {
        let dir = TempDir::new().unwrap();
        let path = write_script(&dir, "main.lua", ADDER);
        let file = shown(&path);

        let (result, output) = debug(&path, &["b 2", "c", "where", "c"]);
        assert!(result.is_ok(), "{output}");
        assert!(output.contains(&format!("(ldb) where\n{file}:2 in add\n")), "{output}");
        assert!(output.contains("=> 2    return a + b"), "{output}");
    }

    #[test]
    fn test_locals_and_upvalues() {
        let dir = TempDir::new().unwrap();
        let path = write_script(
            &dir,
            "main.lua",
            "local base = 100\n\
             local function offset(n)\n\
             \x20 local doubled = n * 2\n\
             \x20 return base + doubled\n\
             end\n\
             offset(4)\n",
        );

        let (result, output) = debug(
            &path,
            &["b 4", "c", "info locals", "info upvalues", "p base + n", "c"],
        );
        assert!(result.is_ok(), "{output}");
        assert!(output.contains("Locals:\n  n = 4\n  doubled = 8\n"), "{output}");
        assert!(output.contains("Upvalues:\n  base = 100\n"), "{output}");
        assert!(output.contains("(ldb) p base + n\n104\n"), "{output}");
    }

    #[test]
    fn test_quit_ends_quietly() {
        let dir = TempDir::new().unwrap();
        let path = write_script(&dir, "main.lua", ADDER);

        let (result, output) = debug(&path, &["q"]);
        assert!(result.is_ok());
        assert!(!output.contains("Program finished."));
        assert!(!output.contains("error"));
    }

    #[test]
    fn test_quit_is_not_swallowed_by_pcall() {
        let dir = TempDir::new().unwrap();
        let path = write_script(
            &dir,
            "main.lua",
            "local ok = pcall(function()\n  local t = 1\nend)\nreached = true\n",
        );

        let (result, output) = debug(&path, &["b 2", "c", "q"]);
        assert!(result.is_ok(), "{output}");
        assert!(!output.contains("Program finished."));
        assert!(!output.contains("Uncaught"));
    }

    #[test]
    fn test_uncaught_errors_carry_a_backtrace() {
        let dir = TempDir::new().unwrap();
        let path = write_script(
            &dir,
            "main.lua",
            "local function boom()\n  error('kaboom')\nend\nboom()\n",
        );

        let (result, output) = debug(&path, &["c"]);
        match result {
            Err(Error::Uncaught { message, backtrace }) => {
                assert!(message.contains("kaboom"));
                assert!(backtrace.iter().any(|f| f.function == "boom" && f.line == Some(2)));
                assert_eq!(backtrace.last().map(|f| f.function.as_str()), Some("main chunk"));
            }
            other => panic!("expected an uncaught error, got {other:?}"),
        }
        assert!(output.contains("Uncaught error:"), "{output}");
        assert!(output.contains("stack traceback:"));
    }

    #[test]
    fn test_stack_overflow_is_reported_promptly() {
        let dir = TempDir::new().unwrap();
        let path = write_script(
            &dir,
            "overflow.lua",
            "local function r(n)\n  return 1 + r(n + 1)\nend\nr(1)\n",
        );

        let started = Instant::now();
        let (result, output) = debug(&path, &["c"]);
        let elapsed = started.elapsed();
        match result {
            Err(Error::Uncaught { message, backtrace }) => {
                assert!(message.contains("stack"), "{message}");
                assert!(backtrace.len() <= 21, "{} frames kept", backtrace.len());
                assert_eq!(backtrace.first().map(|f| f.level), Some(0));
                assert_eq!(backtrace.last().map(|f| f.function.as_str()), Some("main chunk"));
                assert!(backtrace.last().map_or(0, |f| f.level) > 1000);
            }
            other => panic!("expected an uncaught error, got {other:?}"),
        }
        assert!(output.contains("frames skipped"), "{output}");
        assert!(elapsed < Duration::from_secs(30), "took {elapsed:?}");
    }

    #[test]
    fn test_next_over_deep_recursion() {
        let dir = TempDir::new().unwrap();
        let path = write_script(
            &dir,
            "deep.lua",
            "local function r(n)\n\
             \x20 if n == 0 then return 0 end\n\
             \x20 return 1 + r(n - 1)\n\
             end\n\
             local v = r(3000)\n\
             done = v\n",
        );
        let file = shown(&path);

        let started = Instant::now();
        let (result, output) = debug(&path, &["b 5", "c", "n", "p v", "c"]);
        let elapsed = started.elapsed();
        assert!(result.is_ok(), "{output}");
        assert!(output.contains(&format!("step at {file}:6 in main chunk")), "{output}");
        assert!(output.contains("(ldb) p v\n3000\n"), "{output}");
        assert!(elapsed < Duration::from_secs(10), "took {elapsed:?}");
    }

    #[test]
    fn test_target_output_in_the_transcript() {
        let dir = TempDir::new().unwrap();
        let path = write_script(
            &dir,
            "chatty.lua",
            "local x = 1\nprint('hello from target', x)\nio.write('done\\n')\n",
        );

        let (result, output) = debug(&path, &["p print('from snippet')", "c"]);
        assert!(result.is_ok(), "{output}");
        assert!(
            output.contains("(ldb) p print('from snippet')\nfrom snippet\n(ldb) c\n"),
            "{output}"
        );
        assert!(
            output.ends_with("hello from target\t1\ndone\nProgram finished.\n"),
            "{output}"
        );
    }

    #[test]
    fn test_json_front_end_keeps_one_record_per_line() {
        let dir = TempDir::new().unwrap();
        let path = write_script(
            &dir,
            "chatty.lua",
            "print('hello from target')\nio.write('no newline')\nlocal done = true\n",
        );

        let input: &'static [u8] = b"{\"command\": \"c\"}\n";
        let mut session = Session::new(JsonLines::new(input, Vec::new()), Options::default());
        session.attach(&path, &[]).unwrap();

        let written = String::from_utf8(session.frontend().writer().clone()).unwrap();
        let records: Vec<serde_json::Value> = written
            .lines()
            .map(|line| {
                serde_json::from_str(line).unwrap_or_else(|e| panic!("{line:?} is not JSON: {e}"))
            })
            .collect();
        let targets: Vec<&str> = records
            .iter()
            .filter(|r| r["type"] == "target")
            .filter_map(|r| r["text"].as_str())
            .collect();
        assert_eq!(targets, ["hello from target\n", "no newline"]);
        assert_eq!(
            records.last().and_then(|r| r["text"].as_str()),
            Some("Program finished.")
        );
    }

    #[test]
    fn test_missing_script_fails_before_running() {
        let dir = TempDir::new().unwrap();
        let (result, output) = debug(&dir.path().join("absent.lua"), &["c"]);
        assert!(matches!(result, Err(Error::ScriptLoad { .. })));
        assert!(output.is_empty());
    }

    #[test]
    fn test_syntax_errors_fail_the_attach() {
        let dir = TempDir::new().unwrap();
        let path = write_script(&dir, "broken.lua", "local = 3\n");
        let (result, _) = debug(&path, &["c"]);
        assert!(matches!(result, Err(Error::ScriptLoad { .. })));
    }

    #[test]
    fn test_end_of_input_runs_to_completion() {
        let dir = TempDir::new().unwrap();
        let path = write_script(&dir, "main.lua", ADDER);

        let (result, output) = debug(&path, &[]);
        assert!(result.is_ok());
        assert!(output.ends_with("Program finished.\n"));
    }

    #[test]
    fn test_without_stop_on_entry_nothing_pauses() {
        let dir = TempDir::new().unwrap();
        let path = write_script(&dir, "main.lua", ADDER);
        let options = Options {
            stop_on_entry: false,
            ..Options::default()
        };

        let (result, output) = debug_with(options, &path, &["q"]);
        assert!(result.is_ok());
        assert_eq!(output, "Program finished.\n");
    }

    #[test]
    fn test_fed_commands_survive_attach() {
        let dir = TempDir::new().unwrap();
        let path = write_script(&dir, "main.lua", ADDER);

        let mut session = Session::new(Transcript::new(Vec::<String>::new()), Options::default());
        session.feed("b 5");
        session.feed("c");
        session.feed("p y");
        session.attach(&path, &[]).unwrap();

        let output = session.frontend().output().to_string();
        assert!(output.contains("(ldb) b 5\n"), "{output}");
        // y is not assigned yet while line 5 is paused
        assert!(output.contains("(ldb) p y\nnil\n"), "{output}");
        assert_eq!(session.breakpoints().list().len(), 1);
    }

    #[test]
    fn test_attach_resets_breakpoints() {
        let dir = TempDir::new().unwrap();
        let path = write_script(&dir, "main.lua", ADDER);

        let mut session = Session::new(Transcript::new(["b 5", "c", "c", "c"]), Options::default());
        session.attach(&path, &[]).unwrap();
        assert_eq!(session.breakpoints().list().len(), 1);

        // second run: the old breakpoint is gone, so the one `c` finishes it
        session.attach(&path, &[]).unwrap();
        assert!(session.breakpoints().is_empty());
        assert_eq!(session.frontend().output().matches("Program finished.").count(), 2);
    }

    #[test]
    fn test_script_arguments() {
        let dir = TempDir::new().unwrap();
        let path = write_script(
            &dir,
            "args.lua",
            "local first = ...\nlocal n = #arg\nlocal done = true\n",
        );

        let mut session = Session::new(
            Transcript::new(["b 3", "c", "p first, n, arg[0] ~= nil", "c"]),
            Options::default(),
        );
        session
            .attach(&path, &["alpha".to_string(), "beta".to_string()])
            .unwrap();
        let output = session.frontend().output().to_string();
        assert!(output.contains("\"alpha\"\n2\ntrue\n"), "{output}");
    }
}
