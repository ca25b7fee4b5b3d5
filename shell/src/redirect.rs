//! Output redirection: the operator lexicon and the resolver that turns a
//! command line into a set of destination files.

use crate::parser::Word;
use std::fmt;
use std::path::{Path, PathBuf};

/// One of the recognized output redirection operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RedirectOp {
    /// `>` or `1>`: write standard output to a file, truncating it first.
    Stdout,
    /// `>>` or `1>>`: append standard output to a file.
    StdoutAppend,
    /// `2>`: write standard error to a file, truncating it first.
    Stderr,
    /// `2>>`: append standard error to a file.
    StderrAppend,
}

impl RedirectOp {
    /// Recognize an operator from its exact (case-sensitive) spelling.
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            ">" | "1>" => Some(RedirectOp::Stdout),
            ">>" | "1>>" => Some(RedirectOp::StdoutAppend),
            "2>" => Some(RedirectOp::Stderr),
            "2>>" => Some(RedirectOp::StderrAppend),
            _ => None,
        }
    }

    /// Canonical spelling of the operator.
    pub fn as_str(self) -> &'static str {
        match self {
            RedirectOp::Stdout => ">",
            RedirectOp::StdoutAppend => ">>",
            RedirectOp::Stderr => "2>",
            RedirectOp::StderrAppend => "2>>",
        }
    }
}

impl fmt::Display for RedirectOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which of the two output streams of a command is meant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// Destination files for a single command line.
///
/// Each operator kind holds at most one path; a later operator of the same
/// kind replaces the earlier path. Different kinds coexist, so output can go
/// to a truncated file and an appended file at the same time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedirectionTargets {
    pub stdout: Option<PathBuf>,
    pub stdout_append: Option<PathBuf>,
    pub stderr: Option<PathBuf>,
    pub stderr_append: Option<PathBuf>,
}

impl RedirectionTargets {
    /// Record `path` as the destination for `op`, replacing any previous one.
    pub fn set(&mut self, op: RedirectOp, path: impl Into<PathBuf>) {
        let slot = match op {
            RedirectOp::Stdout => &mut self.stdout,
            RedirectOp::StdoutAppend => &mut self.stdout_append,
            RedirectOp::Stderr => &mut self.stderr,
            RedirectOp::StderrAppend => &mut self.stderr_append,
        };
        *slot = Some(path.into());
    }

    /// `(truncate, append)` destinations for one stream.
    pub fn for_stream(&self, stream: Stream) -> (Option<&Path>, Option<&Path>) {
        match stream {
            Stream::Stdout => (self.stdout.as_deref(), self.stdout_append.as_deref()),
            Stream::Stderr => (self.stderr.as_deref(), self.stderr_append.as_deref()),
        }
    }

    /// True when the stream has at least one file destination.
    pub fn is_redirected(&self, stream: Stream) -> bool {
        let (truncate, append) = self.for_stream(stream);
        truncate.is_some() || append.is_some()
    }
}

/// Scan words left to right and collect redirection destinations.
///
/// An operator takes the word right after it as its path. An operator in the
/// last position, or one followed by another operator, is ignored.
pub fn resolve_redirections<'a, I>(words: I) -> RedirectionTargets
where
    I: IntoIterator<Item = &'a Word>,
{
    let mut targets = RedirectionTargets::default();
    let mut words = words.into_iter().peekable();

    while let Some(word) = words.next() {
        if let Word::Redirect(op) = word {
            match words.peek() {
                Some(Word::Arg(path)) => targets.set(*op, path),
                Some(Word::Redirect(next)) => {
                    log::debug!("redirection {op} followed by operator {next}, ignored");
                }
                None => log::debug!("redirection {op} without a path, ignored"),
            }
        }
    }

    targets
}

/// Build the argument vector with every operator and its path removed.
pub fn strip_redirections(words: &[Word]) -> Vec<String> {
    let mut argv = Vec::with_capacity(words.len());
    let mut skip_path = false;

    for word in words {
        match word {
            Word::Redirect(_) => skip_path = true,
            Word::Arg(_) if skip_path => skip_path = false,
            Word::Arg(text) => argv.push(text.clone()),
        }
    }

    argv
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arg(s: &str) -> Word {
        Word::Arg(s.to_string())
    }

    fn op(s: &str) -> Word {
        Word::Redirect(RedirectOp::parse(s).unwrap())
    }

    #[test]
    fn test_parse_operator_lexicon() {
        assert_eq!(RedirectOp::parse(">"), Some(RedirectOp::Stdout));
        assert_eq!(RedirectOp::parse("1>"), Some(RedirectOp::Stdout));
        assert_eq!(RedirectOp::parse(">>"), Some(RedirectOp::StdoutAppend));
        assert_eq!(RedirectOp::parse("1>>"), Some(RedirectOp::StdoutAppend));
        assert_eq!(RedirectOp::parse("2>"), Some(RedirectOp::Stderr));
        assert_eq!(RedirectOp::parse("2>>"), Some(RedirectOp::StderrAppend));
        assert_eq!(RedirectOp::parse("3>"), None);
        assert_eq!(RedirectOp::parse("<"), None);
        assert_eq!(RedirectOp::parse("2>&1"), None);
    }

    #[test]
    fn test_resolve_stdout_and_stderr_append() {
        let words = vec![
            arg("echo"),
            arg("hi"),
            op(">"),
            arg("out.txt"),
            op("2>>"),
            arg("err.log"),
        ];
        let targets = resolve_redirections(&words);

        assert_eq!(targets.stdout, Some(PathBuf::from("out.txt")));
        assert_eq!(targets.stderr_append, Some(PathBuf::from("err.log")));
        assert_eq!(targets.stdout_append, None);
        assert_eq!(targets.stderr, None);
    }

    #[test]
    fn test_resolve_last_operator_wins() {
        let words = vec![arg("ls"), op(">"), arg("a.txt"), op(">"), arg("b.txt")];
        let targets = resolve_redirections(&words);
        assert_eq!(targets.stdout, Some(PathBuf::from("b.txt")));
    }

    #[test]
    fn test_resolve_truncate_and_append_coexist() {
        let words = vec![arg("ls"), op("1>"), arg("a"), op("1>>"), arg("b")];
        let targets = resolve_redirections(&words);
        assert_eq!(targets.for_stream(Stream::Stdout), (Some(Path::new("a")), Some(Path::new("b"))));
        assert!(targets.is_redirected(Stream::Stdout));
        assert!(!targets.is_redirected(Stream::Stderr));
    }

    #[test]
    fn test_resolve_trailing_operator_is_ignored() {
        let words = vec![arg("ls"), op("2>")];
        assert_eq!(resolve_redirections(&words), RedirectionTargets::default());
    }

    #[test]
    fn test_strip_interleaved_redirections() {
        let words = vec![
            arg("cat"),
            op(">"),
            arg("out"),
            arg("a.txt"),
            op("2>"),
            arg("err"),
            arg("b.txt"),
        ];
        assert_eq!(strip_redirections(&words), vec!["cat", "a.txt", "b.txt"]);
    }
}
