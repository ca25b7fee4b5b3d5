use crate::command::{CommandFactory, ExecutableCommand, ExitCode};
use crate::env::Environment;
use crate::interpreter::Factory;
use crate::io_adapters::{Drained, FanOut, Sinks, drain};
use anyhow::{Context, Result, anyhow};
use std::borrow::Cow;
use std::ffi::{OsStr, OsString};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;

/// Command that is not a builtin, resolved to an executable file.
#[derive(Debug, Clone)]
pub struct ExternalCommand {
    name: String,
    path: PathBuf,
    args: Vec<OsString>,
}

impl ExternalCommand {
    pub fn new(name: impl Into<String>, path: PathBuf, args: Vec<OsString>) -> Self {
        Self {
            name: name.into(),
            path,
            args,
        }
    }

    /// Look `name` up on the environment's `PATH`; `None` if it is not there.
    pub fn resolve<S: AsRef<str>>(env: &Environment, name: &str, args: &[S]) -> Option<Self> {
        let search_paths = env.search_path();
        let executable = find_command_path(&search_paths, Path::new(name))?;
        Some(Self::new(
            name,
            executable.into_owned(),
            args.iter().map(|a| OsString::from(a.as_ref())).collect(),
        ))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// A `Command` with arguments, environment and working directory set.
    /// Standard streams are left for the caller to connect.
    pub(crate) fn command(&self, env: &Environment) -> Command {
        let mut cmd = Command::new(&self.path);
        cmd.args(&self.args)
            .envs(env.vars.iter())
            .current_dir(&env.current_dir);
        cmd
    }
}

impl CommandFactory for Factory<ExternalCommand> {
    fn try_create(
        &self,
        env: &Environment,
        name: &str,
        args: &[&str],
    ) -> Option<Box<dyn ExecutableCommand>> {
        ExternalCommand::resolve(env, name, args).map(|cmd| Box::new(cmd) as Box<dyn ExecutableCommand>)
    }
}

impl ExecutableCommand for ExternalCommand {
    /// Spawns the process with both output streams on pipes and drains each
    /// pipe on its own thread into the matching sink.
    ///
    /// Both drains are joined before the child is waited on; a child that
    /// fills both pipe buffers would otherwise block forever.
    fn execute(self: Box<Self>, sinks: Sinks, env: &mut Environment) -> Result<ExitCode> {
        let Sinks { stdout, mut stderr } = sinks;

        let spawned = self
            .command(env)
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                writeln!(stderr, "{}: {}", self.name, e)?;
                return Ok(126);
            }
        };
        log::debug!("spawned {} (pid {})", self.path.display(), child.id());

        let out_pipe = child.stdout.take().context("child stdout is not piped")?;
        let err_pipe = child.stderr.take().context("child stderr is not piped")?;

        let (out, err) = thread::scope(|s| {
            let out = s.spawn(move || drain(out_pipe, stdout));
            let err = s.spawn(move || drain(err_pipe, stderr));
            (out.join(), err.join())
        });
        let Drained { bytes: out_bytes, write_error: out_error, .. } =
            out.map_err(|_| anyhow!("{}: stdout drain panicked", self.name))?;
        let Drained { sink: mut stderr, bytes: err_bytes, write_error: err_error } =
            err.map_err(|_| anyhow!("{}: stderr drain panicked", self.name))?;
        log::debug!("{}: drained {out_bytes} stdout / {err_bytes} stderr bytes", self.name);

        report_write_errors(&self.name, &mut stderr, [out_error, err_error].into_iter().flatten());

        let status = child
            .wait()
            .with_context(|| format!("{}: failed to wait for process", self.name))?;
        Ok(exit_code(status))
    }
}

/// Report failed sink writes of command `name` as a secondary diagnostic on
/// the error sink, or on the process' stderr when that sink is broken too.
pub(crate) fn report_write_errors(name: &str, stderr: &mut FanOut, errors: impl IntoIterator<Item = io::Error>) {
    for e in errors {
        log::warn!("{name}: output destination failed: {e}");
        let _ = writeln!(stderr, "{name}: write error: {e}");
        let _ = stderr.flush();
        if stderr.take_error().is_some() {
            eprintln!("{name}: write error: {e}");
        }
    }
}

/// Exit code of a finished process; signals map to `128 + signal`.
pub(crate) fn exit_code(status: ExitStatus) -> ExitCode {
    match status.code() {
        Some(x) => x,
        None => terminated_by_signal(status),
    }
}

#[cfg(unix)]
fn terminated_by_signal(exit_status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = ExitStatusExt::signal(&exit_status) {
        128 + signal
    } else if ExitStatusExt::core_dumped(&exit_status) {
        255
    } else {
        -1
    }
}

#[cfg(not(unix))]
fn terminated_by_signal(_exit_status: ExitStatus) -> i32 {
    -1
}

/// Resolve a command path the way a typical shell would.
///
/// Behavior:
/// - Absolute path: returns it if it is an executable file.
/// - Relative with multiple components (e.g., `bin/sh`) or `./foo`: returns it
///   if it is an executable file relative to the current directory.
/// - Single path component (no separators): search each directory in `search_paths` (PATH)
///   and return the first executable match.
/// - Empty path: returns `None`.
///
/// Returns either a borrowed reference to the provided `path` or an owned `PathBuf`
/// when the result is discovered via PATH lookup.
pub fn find_command_path<'a>(search_paths: &OsStr, path: &'a Path) -> Option<Cow<'a, Path>> {
    if path.is_absolute() {
        return find_by_path(path).map(Cow::Borrowed);
    }

    let mut components = path.components();
    let first = components.next();
    let second = components.next();
    match (first, second) {
        (None, None) => None,
        (Some(x), None) => {
            find_in_path(search_paths, x.as_os_str()).map(Cow::Owned)
        }
        _ => find_by_path(path).map(Cow::Borrowed),
    }
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(search_paths)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(cmd))
        .find(|path| is_executable(path))
}

fn find_by_path(path: &Path) -> Option<&Path> {
    if is_executable(path) { Some(path) } else { None }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
