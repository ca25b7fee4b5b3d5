use crate::command::{CommandFactory, ExitCode, NOT_FOUND};
use crate::env::Environment;
use crate::external::ExternalCommand;
use crate::io_adapters::{Console, FanOut, Sinks};
use crate::lexer;
use crate::parser::{self, CommandLine};
use crate::pipeline;
use crate::redirect::{self, RedirectionTargets, Stream};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io::Write;

/// Exit code used for lines that fail to lex or parse.
const SYNTAX_ERROR: ExitCode = 2;

/// Factory allows creating instances of ExecutableCommand.
///
/// Only supports commands defined in this crate: builtins and ExternalCommand.
pub(crate) struct Factory<T> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

/// An interactive shell that executes one input line at a time.
///
/// The interpreter maintains an [`Environment`] and a list of [`CommandFactory`] objects
/// that are queried, in order, to create commands by name. See [`Default`] for the
/// factories included out of the box.
///
/// Example
/// ```
/// use linesh::{Console, Interpreter};
/// let console = Console::captured();
/// let mut sh = Interpreter::default().with_console(console.clone());
/// let code = sh.execute_line("echo 'hello   world'").unwrap();
/// assert_eq!(code, 0);
/// if let Console::Captured { stdout, .. } = console {
///     assert_eq!(stdout.contents_lossy(), "hello   world\n");
/// }
/// ```
pub struct Interpreter {
    env: Environment,
    commands: Vec<Box<dyn CommandFactory>>,
    console: Console,
    last_status: ExitCode,
}

impl Interpreter {
    /// Create a new interpreter with a custom set of command factories.
    pub fn new(commands: Vec<Box<dyn CommandFactory>>) -> Self {
        Self {
            env: Environment::new(),
            commands,
            console: Console::Terminal,
            last_status: 0,
        }
    }

    /// Send unredirected output to `console` instead of the terminal.
    pub fn with_console(mut self, console: Console) -> Self {
        self.console = console;
        self
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    /// Exit code of the most recently executed line.
    pub fn last_status(&self) -> ExitCode {
        self.last_status
    }

    /// True once `exit` has run.
    pub fn should_exit(&self) -> bool {
        self.env.should_exit
    }

    /// Run a single command invocation by name with arguments, without
    /// redirection.
    pub fn run(&mut self, name: &str, args: &[&str]) -> anyhow::Result<ExitCode> {
        let sinks = Sinks::console(&self.console);
        self.dispatch(name, args, sinks)
    }

    /// Tokenize, parse and execute one input line.
    ///
    /// Returns `Err` only for lines that cannot be parsed; failures of the
    /// command itself are reported on its error stream and show up in the
    /// exit code.
    pub fn execute_line(&mut self, line: &str) -> anyhow::Result<ExitCode> {
        let tokens = match lexer::split_into_tokens(line) {
            Ok(tokens) => tokens,
            Err(e) => {
                self.last_status = SYNTAX_ERROR;
                return Err(e.into());
            }
        };
        let command_line = match parser::construct_command_line(tokens) {
            Ok(command_line) => command_line,
            Err(e) => {
                self.last_status = SYNTAX_ERROR;
                return Err(e.into());
            }
        };
        if command_line.is_empty() {
            return Ok(self.last_status);
        }

        let code = match self.execute_command_line(&command_line) {
            Ok(code) => code,
            Err(e) => {
                self.console.report(format_args!("linesh: {e:#}"));
                1
            }
        };
        self.last_status = code;
        Ok(code)
    }

    fn execute_command_line(&mut self, command_line: &CommandLine) -> anyhow::Result<ExitCode> {
        let targets = redirect::resolve_redirections(command_line.words());
        log::debug!("redirections: {targets:?}");
        let Some(sinks) = self.open_sinks(&targets) else {
            return Ok(1);
        };

        let first = redirect::strip_redirections(&command_line.first);
        match &command_line.second {
            None => match first.split_first() {
                Some((name, args)) => {
                    let args: Vec<&str> = args.iter().map(String::as_str).collect();
                    self.dispatch(name, &args, sinks)
                }
                // only redirections on the line; the files are created
                None => Ok(0),
            },
            Some(second) => {
                let second = redirect::strip_redirections(second);
                self.dispatch_pipe(&first, &second, sinks)
            }
        }
    }

    /// Open the error sink first so that it exists even when opening the
    /// output sink fails.
    fn open_sinks(&self, targets: &RedirectionTargets) -> Option<Sinks> {
        let cwd = &self.env.current_dir;
        let mut stderr = match FanOut::open(Stream::Stderr, targets, cwd, &self.console) {
            Ok(sink) => sink,
            Err(e) => {
                self.console.report(format_args!("linesh: {e:#}"));
                return None;
            }
        };
        match FanOut::open(Stream::Stdout, targets, cwd, &self.console) {
            Ok(stdout) => Some(Sinks { stdout, stderr }),
            Err(e) => {
                report(&mut stderr, format_args!("linesh: {e:#}"));
                None
            }
        }
    }

    fn dispatch(&mut self, name: &str, args: &[&str], mut sinks: Sinks) -> anyhow::Result<ExitCode> {
        for factory in &self.commands {
            if let Some(cmd) = factory.try_create(&self.env, name, args) {
                log::info!("run: {name} {args:?}");
                return cmd.execute(sinks, &mut self.env);
            }
        }
        log::info!("{name}: not found");
        report(&mut sinks.stderr, format_args!("{name}: not found"));
        Ok(NOT_FOUND)
    }

    /// Both sides of a pipe must be external programs on `PATH`.
    fn dispatch_pipe(&mut self, left: &[String], right: &[String], mut sinks: Sinks) -> anyhow::Result<ExitCode> {
        let (Some((left_name, left_args)), Some((right_name, right_args))) =
            (left.split_first(), right.split_first())
        else {
            return Ok(0);
        };

        let resolved_left = ExternalCommand::resolve(&self.env, left_name, left_args);
        let resolved_right = ExternalCommand::resolve(&self.env, right_name, right_args);
        let (Some(left_cmd), Some(right_cmd)) = (resolved_left.as_ref(), resolved_right.as_ref()) else {
            for (name, resolved) in [(left_name, &resolved_left), (right_name, &resolved_right)] {
                if resolved.is_none() {
                    log::info!("{name}: not found");
                    report(&mut sinks.stderr, format_args!("{name}: not found"));
                }
            }
            return Ok(NOT_FOUND);
        };

        log::info!("run pipe: {left:?} | {right:?}");
        pipeline::run_pipe(left_cmd, right_cmd, sinks, &self.env)
    }

    /// Read-eval-print loop on top of `rl`.
    ///
    /// Runs until `exit` or end of input. Interrupting the prompt discards the
    /// current line. Any other error of the line editor ends the loop with
    /// that error.
    pub fn repl(&mut self, mut rl: DefaultEditor, prompt: &str) -> rustyline::Result<()> {
        while !self.env.should_exit {
            match rl.readline(prompt) {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        rl.add_history_entry(line.as_str())?;
                    }
                    if let Err(e) = self.execute_line(&line) {
                        self.console.report(format_args!("linesh: {e}"));
                    }
                }
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => {
                    log::info!("end of input");
                    break;
                }
                Err(err) => {
                    log::warn!("line editor failed: {err}");
                    return Err(err);
                }
            }
        }

        Ok(())
    }
}

/// Write a diagnostic line to a sink, falling back to the process' stderr.
fn report(sink: &mut FanOut, message: std::fmt::Arguments<'_>) {
    let _ = writeln!(sink, "{message}");
    let _ = sink.flush();
    if sink.take_error().is_some() {
        eprintln!("{message}");
    }
}

impl Default for Interpreter {
    /// Create an interpreter with the default set of commands:
    /// - built-ins: `cd`, `pwd`, `type`, `exit`, `echo`
    /// - external command launcher
    fn default() -> Self {
        use crate::builtin::*;
        Self::new(vec![
            Box::new(Factory::<Cd>::default()),
            Box::new(Factory::<Pwd>::default()),
            Box::new(Factory::<Type>::default()),
            Box::new(Factory::<Exit>::default()),
            Box::new(Factory::<Echo>::default()),
            Box::new(Factory::<ExternalCommand>::default()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn captured() -> (Interpreter, Console) {
        let console = Console::captured();
        let sh = Interpreter::default().with_console(console.clone());
        (sh, console)
    }

    fn output(console: &Console) -> (String, String) {
        match console {
            Console::Captured { stdout, stderr } => (stdout.contents_lossy(), stderr.contents_lossy()),
            Console::Terminal => unreachable!(),
        }
    }

    #[test]
    fn test_builtin_dispatch() {
        let (mut sh, console) = captured();
        assert_eq!(sh.execute_line("type echo").unwrap(), 0);
        assert_eq!(output(&console).0, "echo is a shell builtin\n");
    }

    #[test]
    fn test_echo_reconstructs_spacing_from_words() {
        let (mut sh, console) = captured();
        sh.execute_line(r#"echo  "a  b"   c'd'  \ e"#).unwrap();
        assert_eq!(output(&console).0, "a  b cd  e\n");
    }

    #[test]
    fn test_unknown_command_reports_not_found() {
        let (mut sh, console) = captured();
        assert_eq!(sh.execute_line("nonexistenttool123 --flag").unwrap(), NOT_FOUND);
        assert_eq!(output(&console), (String::new(), "nonexistenttool123: not found\n".to_string()));
        assert_eq!(sh.last_status(), NOT_FOUND);
    }

    #[test]
    fn test_syntax_errors_are_returned() {
        let (mut sh, _console) = captured();
        assert!(sh.execute_line("echo 'open").is_err());
        assert!(sh.execute_line("a | b | c").is_err());
        assert_eq!(sh.last_status(), SYNTAX_ERROR);
    }

    #[test]
    fn test_blank_line_keeps_status() {
        let (mut sh, _console) = captured();
        sh.execute_line("nonexistenttool123").unwrap();
        assert_eq!(sh.execute_line("   ").unwrap(), NOT_FOUND);
    }

    #[test]
    fn test_exit_stops_session() {
        let (mut sh, _console) = captured();
        assert!(!sh.should_exit());
        assert_eq!(sh.execute_line("exit").unwrap(), 0);
        assert!(sh.should_exit());
    }

    #[test]
    fn test_run_by_name() {
        let (mut sh, console) = captured();
        assert_eq!(sh.run("echo", &["hello", "world"]).unwrap(), 0);
        assert_eq!(output(&console).0, "hello world\n");
    }

    #[test]
    #[cfg(unix)]
    fn test_pipe_with_missing_command() {
        let (mut sh, console) = captured();
        assert_eq!(sh.execute_line("nonexistenttool123 | wc").unwrap(), NOT_FOUND);
        assert_eq!(output(&console).1, "nonexistenttool123: not found\n");
    }

    #[test]
    #[cfg(unix)]
    fn test_pipe_output_reaches_console() {
        let (mut sh, console) = captured();
        assert_eq!(sh.execute_line("printf 'x\\ny\\n' | wc -l").unwrap(), 0);
        assert_eq!(output(&console).0.trim(), "2");
    }
}
