use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use tracing::{debug, error};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crsh::cli::{self, CliArgs, RcFile};
use crsh::config;
use crsh::input::{ScriptedLines, StdinLines};
use crsh::output::{self, StdoutSink};
use crsh::process::{ProcessRunner, NOT_FOUND_STATUS};
use crsh::repl::Repl;
use crsh::script::{Environment, Executor, Value};

/// Environment variable holding the log filter.
const LOG_ENV: &str = "CRSH_LOG";

/// Exit status for internal errors (EX_SOFTWARE).
const INTERNAL_ERROR_STATUS: i32 = 70;
/// Exit status when the shell cannot set itself up (EX_OSERR).
const STARTUP_ERROR_STATUS: i32 = 71;
/// Exit status for command-line usage errors.
const USAGE_STATUS: i32 = 2;

fn main() {
    let args = match cli::parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("crsh: {e}");
            eprintln!("{}", cli::USAGE);
            std::process::exit(USAGE_STATUS);
        }
    };

    init_logging(args.debug);
    std::process::exit(run(args));
}

/// Log to stderr.  `-d` forces debug level, otherwise `CRSH_LOG` is honoured
/// and the default is `warn`.
fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn run(args: CliArgs) -> i32 {
    let runner = match ProcessRunner::new() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("crsh: cannot start process runtime: {e}");
            return STARTUP_ERROR_STATUS;
        }
    };

    let script = args.script.as_deref().filter(|p| *p != Path::new("-"));
    let interactive =
        args.command.is_none() && script.is_none() && output::is_tty(libc::STDIN_FILENO);
    if interactive {
        if let Err(e) = runner.trap_interrupts() {
            error!(error = %e, "cannot install SIGINT handler");
        }
    }

    let mut exec = Executor::new(runner, StdoutSink::new(interactive));
    set_globals(exec.env_mut(), interactive, &args.script_args);

    // ── Startup file ──────────────────────────────────────────────────────────
    let rc_path = match &args.rc {
        RcFile::Search => config::find_rc_file(),
        RcFile::Skip => None,
        RcFile::Explicit(path) => Some(path.clone()),
    };
    if let Some(path) = rc_path {
        if let Some(code) = config::run_file(&path, &mut exec).exit {
            return code;
        }
    }

    // ── Input ─────────────────────────────────────────────────────────────────
    let result = if let Some(cmd) = &args.command {
        debug!(command = %cmd, "running -c command");
        Repl::with_executor(ScriptedLines::new(cmd.lines()), exec).run()
    } else if let Some(path) = script {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) => {
                eprintln!("crsh: {}: {e}", path.display());
                return NOT_FOUND_STATUS;
            }
        };
        debug!(script = %path.display(), "running script");
        Repl::with_executor(StdinLines::new(BufReader::new(file)), exec).run()
    } else {
        Repl::with_executor(StdinLines::stdin(), exec).run()
    };

    match result {
        Ok(code) => code,
        Err(e) if e.is_internal() => {
            error!(error = %e, "aborting");
            eprintln!("crsh: {e}");
            INTERNAL_ERROR_STATUS
        }
        Err(e) => {
            eprintln!("crsh: {e}");
            STARTUP_ERROR_STATUS
        }
    }
}

fn set_globals(env: &mut Environment, interactive: bool, script_args: &[String]) {
    env.set_global("INTERACTIVE", Value::from(interactive));
    env.set_global("SHELL_VERSION", Value::from(env!("CARGO_PKG_VERSION")));
    env.set_global(
        "ARGS",
        Value::array(script_args.iter().map(|a| Value::from(a.as_str()))),
    );
}
