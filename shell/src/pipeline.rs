//! Two-stage pipelines: `left | right`.

use crate::command::ExitCode;
use crate::env::Environment;
use crate::external::{ExternalCommand, exit_code, report_write_errors};
use crate::io_adapters::{Drained, FanOut, Sinks, drain};
use crate::redirect::Stream;
use anyhow::{Context, Result, anyhow};
use std::process::{Child, Stdio};
use std::thread;

/// Run `left | right` and return the exit code of `right`.
///
/// The left command's stdout feeds the right command's stdin; its stderr
/// stays on the terminal. The right command's streams go to `sinks`. A
/// stream whose sink is just the terminal is inherited directly, any other
/// sink is fed through a pipe and drained on a helper thread.
pub fn run_pipe(
    left: &ExternalCommand,
    right: &ExternalCommand,
    sinks: Sinks,
    env: &Environment,
) -> Result<ExitCode> {
    let Sinks { stdout, stderr } = sinks;
    let stdout_route = (!stdout.is_terminal()).then_some(stdout);
    let stderr_route = (!stderr.is_terminal()).then_some(stderr);

    let mut first = left
        .command(env)
        .stdin(Stdio::inherit())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .with_context(|| format!("{}: failed to start", left.name()))?;
    let connection = first
        .stdout
        .take()
        .context("left side of the pipe has no stdout")?;

    let spawned = right
        .command(env)
        .stdin(Stdio::from(connection))
        .stdout(route(&stdout_route))
        .stderr(route(&stderr_route))
        .spawn();
    let mut second = match spawned {
        Ok(child) => child,
        Err(e) => {
            reap(&mut first);
            return Err(e).with_context(|| format!("{}: failed to start", right.name()));
        }
    };
    log::debug!(
        "pipe: {} (pid {}) | {} (pid {})",
        left.name(),
        first.id(),
        right.name(),
        second.id()
    );

    let out = stdout_route.zip(second.stdout.take());
    let err = stderr_route.zip(second.stderr.take());

    let (first_status, drained) = thread::scope(|s| {
        let out = out.map(|(sink, pipe)| s.spawn(move || drain(pipe, sink)));
        let err = err.map(|(sink, pipe)| s.spawn(move || drain(pipe, sink)));

        let first_status = first.wait();
        let drained: Vec<_> = [out, err].into_iter().flatten().map(|h| h.join()).collect();
        (first_status, drained)
    });
    first_status.with_context(|| format!("{}: failed to wait for process", left.name()))?;

    let mut drained = drained
        .into_iter()
        .collect::<thread::Result<Vec<Drained>>>()
        .map_err(|_| anyhow!("pipe: output drain panicked"))?;
    let errors: Vec<_> = drained.iter_mut().filter_map(|d| d.write_error.take()).collect();
    if !errors.is_empty() {
        match drained.iter_mut().find(|d| d.sink.stream() == Stream::Stderr) {
            Some(d) => report_write_errors(right.name(), &mut d.sink, errors),
            None => errors
                .iter()
                .for_each(|e| eprintln!("{}: write error: {e}", right.name())),
        }
    }

    let status = second
        .wait()
        .with_context(|| format!("{}: failed to wait for process", right.name()))?;
    Ok(exit_code(status))
}

fn route(sink: &Option<FanOut>) -> Stdio {
    if sink.is_some() {
        Stdio::piped()
    } else {
        Stdio::inherit()
    }
}

/// Stop a child that has lost its partner and collect its status.
fn reap(child: &mut Child) {
    if let Err(e) = child.kill() {
        log::debug!("pipe: kill of pid {} failed: {e}", child.id());
    }
    let _ = child.wait();
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;
    use crate::io_adapters::Console;
    use crate::redirect::{RedirectOp, RedirectionTargets};
    use std::fs;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn make_unique_temp_dir(tag: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let p = std::env::temp_dir().join(format!("linesh_pipe_{}_{}_{}", tag, std::process::id(), nanos));
        fs::create_dir_all(&p).unwrap();
        p
    }

    fn sh(env: &Environment, script: &str) -> ExternalCommand {
        ExternalCommand::resolve(env, "sh", &["-c", script]).expect("sh on PATH")
    }

    #[test]
    fn test_left_output_feeds_right_input() {
        let env = Environment::new();
        let console = Console::captured();
        let code = run_pipe(
            &sh(&env, "printf 'b\\na\\nc\\n'"),
            &sh(&env, "sort"),
            Sinks::console(&console),
            &env,
        )
        .unwrap();
        assert_eq!(code, 0);
        if let Console::Captured { stdout, .. } = console {
            assert_eq!(stdout.contents_lossy(), "a\nb\nc\n");
        }
    }

    #[test]
    fn test_exit_code_comes_from_right_side() {
        let env = Environment::new();
        let console = Console::captured();
        let code = run_pipe(&sh(&env, "exit 0"), &sh(&env, "cat >/dev/null; exit 4"), Sinks::console(&console), &env)
            .unwrap();
        assert_eq!(code, 4);
    }

    #[test]
    fn test_trailing_redirection_applies_to_right_side() {
        let dir = make_unique_temp_dir("redir");
        let mut env = Environment::new();
        env.current_dir = dir.clone();

        let mut targets = RedirectionTargets::default();
        targets.set(RedirectOp::Stdout, "count.txt");
        targets.set(RedirectOp::Stderr, "err.txt");
        let console = Console::captured();
        let sinks = Sinks {
            stdout: FanOut::open(Stream::Stdout, &targets, &dir, &console).unwrap(),
            stderr: FanOut::open(Stream::Stderr, &targets, &dir, &console).unwrap(),
        };

        let code = run_pipe(&sh(&env, "echo one; echo two"), &sh(&env, "wc -l"), sinks, &env).unwrap();
        assert_eq!(code, 0);
        assert_eq!(fs::read_to_string(dir.join("count.txt")).unwrap().trim(), "2");
        assert_eq!(fs::read_to_string(dir.join("err.txt")).unwrap(), "");
        if let Console::Captured { stdout, .. } = console {
            assert!(stdout.contents().is_empty());
        }
        let _ = fs::remove_dir_all(dir);
    }
}
