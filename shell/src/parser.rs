use crate::lexer::Token;
use crate::redirect::{RedirectOp, strip_redirections};
use std::fmt;

/// A shell word after whitespace has been removed.
///
/// Adjacent bare and quoted tokens with no whitespace between them form a
/// single argument, so `a'b'"c"` is the one argument `abc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Word {
    /// A command name, an argument or a redirection path.
    Arg(String),
    /// A redirection operator; its path is the next `Arg`.
    Redirect(RedirectOp),
}

/// A parsed input line: one command, or two commands joined by a pipe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandLine {
    /// The first (or only) command with its arguments and redirections.
    pub first: Vec<Word>,
    /// The command on the right of `|`, if the line contains a pipe.
    pub second: Option<Vec<Word>>,
}

impl CommandLine {
    /// True for a blank line.
    pub fn is_empty(&self) -> bool {
        self.first.is_empty() && self.second.is_none()
    }

    /// All words of the line, left to right, across the pipe.
    pub fn words(&self) -> impl Iterator<Item = &Word> {
        self.first.iter().chain(self.second.iter().flatten())
    }
}

/// Errors that can occur while assembling a command line from tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsingError {
    /// More than one `|` on the line; only a single pipe is supported.
    TooManyPipes,
    /// A side of the pipe has no command (e.g. `| cmd` or `cmd |`).
    EmptyPipeline,
}

impl fmt::Display for ParsingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParsingError::TooManyPipes => f.write_str("only a single `|` per line is supported"),
            ParsingError::EmptyPipeline => f.write_str("syntax error near unexpected token `|'"),
        }
    }
}

impl std::error::Error for ParsingError {}

struct WordBuilder {
    words: Vec<Word>,
    current: Option<String>,
}

impl WordBuilder {
    fn new() -> Self {
        WordBuilder {
            words: Vec::new(),
            current: None,
        }
    }

    fn extend(&mut self, text: &str) {
        self.current.get_or_insert_with(String::new).push_str(text);
    }

    fn finish_word(&mut self) {
        if let Some(word) = self.current.take() {
            self.words.push(Word::Arg(word));
        }
    }

    fn push_operator(&mut self, op: RedirectOp) {
        self.finish_word();
        self.words.push(Word::Redirect(op));
    }

    fn into_words(mut self) -> Vec<Word> {
        self.finish_word();
        self.words
    }
}

/// Assemble tokens into a [`CommandLine`], splitting at the pipe.
pub fn construct_command_line(tokens: Vec<Token>) -> Result<CommandLine, ParsingError> {
    let mut segments: Vec<Vec<Word>> = Vec::with_capacity(2);
    let mut builder = WordBuilder::new();

    for token in tokens {
        match token {
            Token::Word(text) | Token::Quoted(text) => builder.extend(&text),
            Token::Whitespace(_) => builder.finish_word(),
            Token::Redirect(op) => builder.push_operator(op),
            Token::Pipe => {
                segments.push(std::mem::replace(&mut builder, WordBuilder::new()).into_words());
                if segments.len() > 1 {
                    return Err(ParsingError::TooManyPipes);
                }
            }
        }
    }
    segments.push(builder.into_words());

    let mut segments = segments.into_iter();
    let first = segments.next().unwrap_or_default();
    let second = segments.next();

    if let Some(second) = &second {
        if !has_command(&first) || !has_command(second) {
            return Err(ParsingError::EmptyPipeline);
        }
    }

    Ok(CommandLine { first, second })
}

fn has_command(words: &[Word]) -> bool {
    !strip_redirections(words).is_empty()
}
