//! Command-line argument parsing.
//!
//! Usage:
//!   crsh [-dq] [-f[<rcfile>]] [-c <command>] [<script> [args...]]

use std::path::PathBuf;

pub const USAGE: &str = "Usage: crsh [-dq] [-f[<rcfile>]] [-c <command>] [<script> [args...]]";

// ── Public types ──────────────────────────────────────────────────────────────

/// Parsed command-line arguments.
#[derive(Debug, Default)]
pub struct CliArgs {
    /// Which rc file to run at startup.
    pub rc: RcFile,
    /// Command to execute instead of reading input (`-c <cmd>`).
    pub command: Option<String>,
    /// Script to run instead of reading stdin.
    pub script: Option<PathBuf>,
    /// Arguments after the script name (bound to `ARGS`).
    pub script_args: Vec<String>,
    /// Debug logging (`-d`).
    pub debug: bool,
}

/// How to choose the rc file.
#[derive(Debug, Default, PartialEq, Eq)]
pub enum RcFile {
    /// `$CRSHRC`, `~/.crshrc`, `<config dir>/crsh/crshrc` (default).
    #[default]
    Search,
    /// `-f` alone or `-q`: no rc file.
    Skip,
    /// `-f<file>`: load this specific file.
    Explicit(PathBuf),
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse `std::env::args()` and return [`CliArgs`] or an error message.
pub fn parse_args() -> Result<CliArgs, String> {
    let raw: Vec<String> = std::env::args().skip(1).collect();
    parse_argv(&raw)
}

/// Parse a slice of argument strings (exposed for testing).
pub fn parse_argv(argv: &[String]) -> Result<CliArgs, String> {
    let mut args = CliArgs::default();
    let mut i = 0;

    while i < argv.len() {
        let arg = argv[i].as_str();

        // `--` ends flag processing.
        if arg == "--" {
            i += 1;
            break;
        }

        // The first non-flag argument is the script; the rest belong to it.
        if !arg.starts_with('-') || arg == "-" {
            break;
        }

        let chars: Vec<char> = arg[1..].chars().collect();
        let mut j = 0;
        while j < chars.len() {
            match chars[j] {
                'd' => args.debug = true,
                'q' => args.rc = RcFile::Skip,

                // -f[<file>]; the file must be attached so that `-f script`
                // still runs `script`.
                'f' => {
                    if j + 1 < chars.len() {
                        let file: String = chars[j + 1..].iter().collect();
                        args.rc = RcFile::Explicit(PathBuf::from(file));
                        j = chars.len();
                    } else {
                        args.rc = RcFile::Skip;
                    }
                }

                // -c<cmd> or -c <cmd>
                'c' => {
                    let cmd = if j + 1 < chars.len() {
                        let s: String = chars[j + 1..].iter().collect();
                        j = chars.len();
                        s
                    } else if i + 1 < argv.len() {
                        i += 1;
                        argv[i].clone()
                    } else {
                        return Err("-c requires a command argument".to_owned());
                    };
                    args.command = Some(cmd);
                }

                c => return Err(format!("unknown option: -{c}")),
            }
            j += 1;
        }
        i += 1;
    }

    let mut rest = argv[i.min(argv.len())..].iter().cloned();
    if args.command.is_some() {
        args.script_args = rest.collect();
    } else {
        args.script = rest.next().map(PathBuf::from);
        args.script_args = rest.collect();
    }
    Ok(args)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|&s| s.to_owned()).collect()
    }

    #[test]
    fn empty_args() {
        let a = parse_argv(&argv(&[])).unwrap();
        assert!(!a.debug);
        assert_eq!(a.rc, RcFile::Search);
        assert!(a.command.is_none());
        assert!(a.script.is_none());
    }

    #[test]
    fn bool_flags() {
        let a = parse_argv(&argv(&["-d", "-q"])).unwrap();
        assert!(a.debug);
        assert_eq!(a.rc, RcFile::Skip);
    }

    #[test]
    fn combined_bool_flags() {
        let a = parse_argv(&argv(&["-qd"])).unwrap();
        assert!(a.debug);
        assert_eq!(a.rc, RcFile::Skip);
    }

    #[test]
    fn rc_skip() {
        let a = parse_argv(&argv(&["-f"])).unwrap();
        assert_eq!(a.rc, RcFile::Skip);
    }

    #[test]
    fn rc_explicit() {
        let a = parse_argv(&argv(&["-fmyrc"])).unwrap();
        assert_eq!(a.rc, RcFile::Explicit(PathBuf::from("myrc")));
    }

    #[test]
    fn rc_flag_does_not_swallow_script() {
        let a = parse_argv(&argv(&["-f", "build.crsh"])).unwrap();
        assert_eq!(a.rc, RcFile::Skip);
        assert_eq!(a.script, Some(PathBuf::from("build.crsh")));
    }

    #[test]
    fn command_embedded() {
        let a = parse_argv(&argv(&["-cprint(1)"])).unwrap();
        assert_eq!(a.command.as_deref(), Some("print(1)"));
    }

    #[test]
    fn command_separate() {
        let a = parse_argv(&argv(&["-dc", "ls -l", "x"])).unwrap();
        assert!(a.debug);
        assert_eq!(a.command.as_deref(), Some("ls -l"));
        assert!(a.script.is_none());
        assert_eq!(a.script_args, vec!["x"]);
    }

    #[test]
    fn command_requires_argument() {
        assert!(parse_argv(&argv(&["-c"])).is_err());
    }

    #[test]
    fn script_with_args() {
        let a = parse_argv(&argv(&["-q", "run.crsh", "-v", "two"])).unwrap();
        assert_eq!(a.script, Some(PathBuf::from("run.crsh")));
        assert_eq!(a.script_args, vec!["-v", "two"]);
    }

    #[test]
    fn double_dash_ends_flags() {
        let a = parse_argv(&argv(&["--", "-weird-name"])).unwrap();
        assert_eq!(a.script, Some(PathBuf::from("-weird-name")));
    }

    #[test]
    fn unknown_flag() {
        assert!(parse_argv(&argv(&["-z"])).is_err());
    }
}
