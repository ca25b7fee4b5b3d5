//! A module implementing lexical analysis (tokenization) of one input line.

use crate::redirect::RedirectOp;
use std::fmt;

/// Represents a token resulting from lexical analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Unquoted text. Backslash escapes are already resolved.
    Word(String),
    /// The contents of a single- or double-quoted section, quotes removed.
    Quoted(String),
    /// A run of unquoted whitespace, kept verbatim.
    Whitespace(String),
    /// The pipe operator, `|`.
    Pipe,
    /// An unquoted, unescaped redirection operator such as `>` or `2>>`.
    Redirect(RedirectOp),
}

impl Token {
    /// The text this token stands for on the command line.
    pub fn text(&self) -> &str {
        match self {
            Token::Word(s) | Token::Quoted(s) | Token::Whitespace(s) => s,
            Token::Pipe => "|",
            Token::Redirect(op) => op.as_str(),
        }
    }
}

/// Errors that can occur during the lexical analysis process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexingError {
    /// A closing single quote was not found.
    UnfinishedSingleQuote,
    /// A closing double quote was not found.
    UnfinishedDoubleQuote,
}

impl fmt::Display for LexingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexingError::UnfinishedSingleQuote => f.write_str("unexpected end of line: missing closing `'`"),
            LexingError::UnfinishedDoubleQuote => f.write_str("unexpected end of line: missing closing `\"`"),
        }
    }
}

impl std::error::Error for LexingError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexingState {
    Normal,
    InSingleQuote,
    InDoubleQuote,
    /// The next character is taken literally; afterwards the lexer returns
    /// to double-quote mode or to normal mode.
    EscapeNext { in_double_quote: bool },
}

/// What the characters collected in `buffer` will become once flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Nothing,
    Word { escaped: bool },
    Whitespace,
}

struct LexingFSM {
    input: Vec<char>,
    pos: usize,
    state: LexingState,
    pending: Pending,
    buffer: String,
    out: Vec<Token>,
}

impl LexingFSM {
    fn new(line: &str) -> Self {
        LexingFSM {
            input: line.chars().collect(),
            pos: 0,
            state: LexingState::Normal,
            pending: Pending::Nothing,
            buffer: String::new(),
            out: Vec::new(),
        }
    }

    /// Runs the machine over the whole input, one dispatch per character.
    fn make_tokens(mut self) -> Result<Vec<Token>, LexingError> {
        while let Some(ch) = self.read_char() {
            match self.state {
                LexingState::Normal => self.handle_normal(ch),
                LexingState::InSingleQuote => self.handle_single_quote(ch),
                LexingState::InDoubleQuote => self.handle_double_quote(ch),
                LexingState::EscapeNext { in_double_quote } => self.handle_escaped(ch, in_double_quote),
            }
        }

        match self.state {
            LexingState::InSingleQuote => return Err(LexingError::UnfinishedSingleQuote),
            LexingState::InDoubleQuote | LexingState::EscapeNext { in_double_quote: true } => {
                return Err(LexingError::UnfinishedDoubleQuote);
            }
            // A trailing backslash has nothing to escape and is dropped.
            LexingState::EscapeNext { in_double_quote: false } | LexingState::Normal => {}
        }

        self.flush();
        Ok(self.out)
    }

    fn read_char(&mut self) -> Option<char> {
        let ch = self.input.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn peek_char(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn handle_normal(&mut self, ch: char) {
        match ch {
            '\\' => {
                self.start_word();
                self.state = LexingState::EscapeNext { in_double_quote: false };
            }
            '|' => {
                self.flush();
                self.out.push(Token::Pipe);
            }
            '\'' => {
                self.flush_before_quote();
                self.state = LexingState::InSingleQuote;
            }
            '"' => {
                self.flush_before_quote();
                self.state = LexingState::InDoubleQuote;
            }
            c if c.is_whitespace() => {
                if self.pending != Pending::Whitespace {
                    self.flush();
                    self.pending = Pending::Whitespace;
                }
                self.buffer.push(c);
            }
            c => {
                self.start_word();
                self.buffer.push(c);
            }
        }
    }

    fn handle_single_quote(&mut self, ch: char) {
        match ch {
            '\'' => self.close_quote(),
            c => self.buffer.push(c),
        }
    }

    fn handle_double_quote(&mut self, ch: char) {
        match ch {
            '"' => self.close_quote(),
            '\\' if matches!(self.peek_char(), Some('"' | '\\')) => {
                self.state = LexingState::EscapeNext { in_double_quote: true };
            }
            c => self.buffer.push(c),
        }
    }

    fn handle_escaped(&mut self, ch: char, in_double_quote: bool) {
        self.buffer.push(ch);
        if !in_double_quote {
            self.pending = Pending::Word { escaped: true };
        }
        self.state = if in_double_quote {
            LexingState::InDoubleQuote
        } else {
            LexingState::Normal
        };
    }

    fn close_quote(&mut self) {
        self.out.push(Token::Quoted(std::mem::take(&mut self.buffer)));
        self.state = LexingState::Normal;
    }

    /// Make sure the buffer collects a bare word, flushing pending whitespace.
    fn start_word(&mut self) {
        match self.pending {
            Pending::Word { .. } => {}
            Pending::Whitespace => {
                self.flush();
                self.pending = Pending::Word { escaped: false };
            }
            Pending::Nothing => self.pending = Pending::Word { escaped: false },
        }
    }

    /// Emit the pending word or whitespace run, if any.
    fn flush(&mut self) {
        self.emit(false);
    }

    /// Like `flush`, but the pending word is glued to the quoted piece
    /// that starts next.
    fn flush_before_quote(&mut self) {
        self.emit(true);
    }

    /// A bare word becomes an operator only when it is a whole argument:
    /// nothing quoted may touch it on either side.
    fn emit(&mut self, followed_by_quote: bool) {
        let text = std::mem::take(&mut self.buffer);
        let pending = std::mem::replace(&mut self.pending, Pending::Nothing);
        if text.is_empty() {
            return;
        }
        let after_quote = matches!(self.out.last(), Some(Token::Quoted(_)));
        let token = match pending {
            Pending::Whitespace => Token::Whitespace(text),
            Pending::Word { escaped: false } if !after_quote && !followed_by_quote => {
                match RedirectOp::parse(&text) {
                    Some(op) => Token::Redirect(op),
                    None => Token::Word(text),
                }
            }
            Pending::Word { .. } | Pending::Nothing => Token::Word(text),
        };
        self.out.push(token);
    }
}

/// The main entry point function to perform lexical analysis.
///
/// Creates and runs the finite state machine to tokenize the input line.
/// Fails only when a quoted section is left open at the end of the line.
pub fn split_into_tokens(line: &str) -> Result<Vec<Token>, LexingError> {
    LexingFSM::new(line).make_tokens()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(s: &str) -> Token {
        Token::Word(s.to_string())
    }

    fn quoted(s: &str) -> Token {
        Token::Quoted(s.to_string())
    }

    fn ws(s: &str) -> Token {
        Token::Whitespace(s.to_string())
    }

    #[test]
    fn test_words_and_whitespace_runs() {
        let tokens = split_into_tokens("echo   hello\tworld").unwrap();
        assert_eq!(
            tokens,
            vec![word("echo"), ws("   "), word("hello"), ws("\t"), word("world")]
        );
    }

    #[test]
    fn test_single_quotes_are_fully_literal() {
        let tokens = split_into_tokens(r"'a \n \\ b'").unwrap();
        assert_eq!(tokens, vec![quoted(r"a \n \\ b")]);
    }

    #[test]
    fn test_double_quotes_unescape_only_quote_and_backslash() {
        let tokens = split_into_tokens(r#""a\"b\\c""#).unwrap();
        assert_eq!(tokens, vec![quoted(r#"a"b\c"#)]);

        let tokens = split_into_tokens(r#""x\ny\$""#).unwrap();
        assert_eq!(tokens, vec![quoted(r"x\ny\$")]);
    }

    #[test]
    fn test_backslash_outside_quotes_escapes_any_char() {
        let tokens = split_into_tokens(r"a\ b\\c\'d\n").unwrap();
        assert_eq!(tokens, vec![word(r"a b\c'dn")]);
    }

    #[test]
    fn test_quote_closes_bare_word() {
        let tokens = split_into_tokens(r#"ab'cd'"ef"gh"#).unwrap();
        assert_eq!(tokens, vec![word("ab"), quoted("cd"), quoted("ef"), word("gh")]);
    }

    #[test]
    fn test_empty_quotes_produce_empty_token() {
        let tokens = split_into_tokens("echo ''").unwrap();
        assert_eq!(tokens, vec![word("echo"), ws(" "), quoted("")]);
    }

    #[test]
    fn test_pipe_is_always_its_own_token() {
        let tokens = split_into_tokens("ls|wc -l").unwrap();
        assert_eq!(
            tokens,
            vec![word("ls"), Token::Pipe, word("wc"), ws(" "), word("-l")]
        );

        let tokens = split_into_tokens("a '|' \\|").unwrap();
        assert_eq!(tokens, vec![word("a"), ws(" "), quoted("|"), ws(" "), word("|")]);
    }

    #[test]
    fn test_redirect_operators_only_when_unquoted() {
        let tokens = split_into_tokens(r#"echo a 2>> err '>' \> ">""#).unwrap();
        assert_eq!(
            tokens,
            vec![
                word("echo"),
                ws(" "),
                word("a"),
                ws(" "),
                Token::Redirect(RedirectOp::StderrAppend),
                ws(" "),
                word("err"),
                ws(" "),
                quoted(">"),
                ws(" "),
                word(">"),
                ws(" "),
                quoted(">"),
            ]
        );
    }

    #[test]
    fn test_operator_glued_to_text_is_a_word() {
        let tokens = split_into_tokens("echo hi>out").unwrap();
        assert_eq!(tokens, vec![word("echo"), ws(" "), word("hi>out")]);
    }

    #[test]
    fn test_operator_glued_to_quoted_text_is_a_word() {
        let tokens = split_into_tokens("echo hi 2>'err'").unwrap();
        assert_eq!(
            tokens,
            vec![word("echo"), ws(" "), word("hi"), ws(" "), word("2>"), quoted("err")]
        );

        let tokens = split_into_tokens(r#""a">"#).unwrap();
        assert_eq!(tokens, vec![quoted("a"), word(">")]);

        let tokens = split_into_tokens("echo hi 2> 'err'").unwrap();
        assert_eq!(
            tokens,
            vec![
                word("echo"),
                ws(" "),
                word("hi"),
                ws(" "),
                Token::Redirect(RedirectOp::Stderr),
                ws(" "),
                quoted("err"),
            ]
        );
    }

    #[test]
    fn test_unfinished_quotes_are_errors() {
        assert_eq!(
            split_into_tokens("echo 'abc"),
            Err(LexingError::UnfinishedSingleQuote)
        );
        assert_eq!(
            split_into_tokens("echo \"abc"),
            Err(LexingError::UnfinishedDoubleQuote)
        );
    }

    #[test]
    fn test_trailing_backslash_is_dropped() {
        assert_eq!(split_into_tokens(r"ab\").unwrap(), vec![word("ab")]);
    }

    #[test]
    fn test_token_text() {
        assert_eq!(Token::Pipe.text(), "|");
        assert_eq!(Token::Redirect(RedirectOp::Stdout).text(), ">");
        assert_eq!(quoted("x y").text(), "x y");
    }
}
