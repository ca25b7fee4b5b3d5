use crate::command::{CommandFactory, ExecutableCommand, ExitCode};
use crate::env::Environment;
use crate::external::{find_command_path, report_write_errors};
use crate::interpreter::Factory;
use crate::io_adapters::Sinks;
use anyhow::{Context, Result, anyhow};
use argh::{EarlyExit, FromArgs};
use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Names of every command implemented inside the shell.
pub const BUILTIN_NAMES: [&str; 5] = ["cd", "pwd", "type", "exit", "echo"];

/// True when `name` is handled by the shell itself.
pub fn is_builtin(name: &str) -> bool {
    BUILTIN_NAMES.contains(&name)
}

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed directly
/// in-process without spawning a child process.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "echo" or "cd".
    fn name() -> &'static str;

    /// Executes the command, writing regular output to `stdout`.
    ///
    /// Diagnostics are returned as `Err` and end up on the error sink.
    /// Return value should follow shell conventions: 0 for success, non-zero for error.
    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode>;
}

impl<T: BuiltinCommand> ExecutableCommand for T {
    fn execute(self: Box<Self>, sinks: Sinks, env: &mut Environment) -> Result<ExitCode> {
        let Sinks {
            mut stdout,
            mut stderr,
        } = sinks;
        let result = <T as BuiltinCommand>::execute(*self, &mut stdout, env);
        let _ = stdout.flush();

        let code = match result {
            Ok(x) => x,
            Err(e) => {
                log::debug!("{} failed: {e:#}", T::name());
                let _ = writeln!(stderr, "{e:#}");
                1
            }
        };
        let _ = stderr.flush();
        if let Some(e) = stderr.take_error() {
            eprintln!("{}: write error: {e}", T::name());
        }

        match stdout.take_error() {
            Some(e) => {
                report_write_errors(T::name(), &mut stderr, [e]);
                Ok(1)
            }
            None => Ok(code),
        }
    }
}

/// Output of an argument parsing early exit: usage errors or `--help`.
struct InvalidArgs {
    output: String,
    is_error: bool,
}

impl ExecutableCommand for InvalidArgs {
    fn execute(self: Box<Self>, sinks: Sinks, _env: &mut Environment) -> Result<ExitCode> {
        let Sinks {
            mut stdout,
            mut stderr,
        } = sinks;
        let sink = if self.is_error { &mut stderr } else { &mut stdout };
        sink.write_all(self.output.as_bytes())?;
        if !self.output.ends_with('\n') {
            sink.write_all(b"\n")?;
        }
        sink.flush()?;
        Ok(if self.is_error { 1 } else { 0 })
    }
}

impl<T: BuiltinCommand + 'static> CommandFactory for Factory<T> {
    fn try_create(
        &self,
        _env: &Environment,
        name: &str,
        args: &[&str],
    ) -> Option<Box<dyn ExecutableCommand>> {
        if name == T::name() {
            Some(match T::from_args(&[name], args) {
                Ok(cmd) => Box::new(cmd),
                Err(EarlyExit { output, status }) => Box::new(InvalidArgs {
                    output,
                    is_error: status.is_err(),
                }),
            })
        } else {
            None
        }
    }
}

#[derive(FromArgs)]
/// Print the current working directory to standard output.
pub struct Pwd {}

impl BuiltinCommand for Pwd {
    fn name() -> &'static str {
        "pwd"
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        writeln!(stdout, "{}", env.current_dir.display())?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Change the current working directory.
/// If no target is provided, changes to the directory specified by the HOME environment variable.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute, relative, `~` or `~/...`. Defaults to $HOME when omitted.
    pub target: Option<String>,
}

impl Cd {
    fn expand_home(target: &str, env: &Environment) -> Result<PathBuf> {
        let rest = match target {
            "~" => "",
            t => match t.strip_prefix("~/") {
                Some(rest) => rest,
                None => return Ok(PathBuf::from(t)),
            },
        };
        let home = env.home().ok_or_else(|| anyhow!("cd: HOME not set"))?;
        Ok(if rest.is_empty() { home } else { home.join(rest) })
    }
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        let requested = self.target.as_deref().filter(|t| !t.is_empty()).unwrap_or("~");
        let target = Self::expand_home(requested, env)?;

        let new_dir = if target.is_absolute() {
            target
        } else {
            env.current_dir.join(target)
        };

        if !new_dir.is_dir() {
            if new_dir.exists() {
                return Err(anyhow!("cd: {requested}: Not a directory"));
            }
            return Err(anyhow!("cd: {requested}: No such file or directory"));
        }

        let canonical = fs::canonicalize(&new_dir)
            .with_context(|| format!("cd: can't canonicalize {}", new_dir.display()))?;

        env::set_current_dir(&canonical)
            .with_context(|| format!("cd: can't chdir to {}", canonical.display()))?;
        log::debug!("cd: now in {}", canonical.display());
        env.current_dir = canonical;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Describe how a command name would be interpreted.
pub struct Type {
    #[argh(positional)]
    /// the command name to look up.
    pub name: String,
}

impl BuiltinCommand for Type {
    fn name() -> &'static str {
        "type"
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        if is_builtin(&self.name) {
            writeln!(stdout, "{} is a shell builtin", self.name)?;
            return Ok(0);
        }
        let search_paths = env.search_path();
        match find_command_path(&search_paths, Path::new(&self.name)) {
            Some(path) => {
                writeln!(stdout, "{} is {}", self.name, path.display())?;
                Ok(0)
            }
            None => Err(anyhow!("{}: not found", self.name)),
        }
    }
}

#[derive(FromArgs)]
/// Exit the shell with a success status.
pub struct Exit {
    #[argh(positional, greedy)]
    /// ignored; the shell always exits with status 0.
    pub _args: Vec<String>,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        env.should_exit = true;
        Ok(0)
    }
}

/// Write the arguments to standard output separated by single spaces,
/// followed by a newline.
///
/// Every argument is printed literally, including ones that look like flags,
/// so `FromArgs` is implemented by hand rather than derived.
pub struct Echo {
    pub args: Vec<String>,
}

impl FromArgs for Echo {
    fn from_args(command_name: &[&str], args: &[&str]) -> Result<Self, EarlyExit> {
        if args.is_empty() {
            return Err(EarlyExit {
                output: format!("{}: missing argument", command_name.join(" ")),
                status: Err(()),
            });
        }
        Ok(Echo {
            args: args.iter().map(|a| a.to_string()).collect(),
        })
    }
}

impl BuiltinCommand for Echo {
    fn name() -> &'static str {
        "echo"
    }

    fn execute(self, stdout: &mut dyn Write, _env: &mut Environment) -> Result<ExitCode> {
        writeln!(stdout, "{}", self.args.join(" "))?;
        Ok(0)
    }
}
