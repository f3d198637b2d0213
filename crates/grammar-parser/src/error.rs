use std::fmt;
use thiserror::Error;

/// A lexical or syntactic error found while scanning grammar source text.
///
/// Unrecoverable: when the lexer or parser raises one of these the grammar
/// is rejected outright and no session is created.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GrammarError {
    #[error("unterminated string literal")]
    UnterminatedString { offset: usize },
    #[error("unterminated character class")]
    UnterminatedCharClass { offset: usize },
    #[error("invalid \\u escape")]
    InvalidUnicodeEscape { offset: usize },
    #[error("invalid escape sequence '\\{ch}'")]
    InvalidEscape { offset: usize, ch: char },
    #[error("unexpected character '{ch}'")]
    UnexpectedChar { offset: usize, ch: char },
    #[error("expected '::=' after rule name")]
    ExpectedArrow { offset: usize },
    #[error("expected a rule name at the start of a line")]
    ExpectedRuleName { offset: usize },
    #[error("unexpected end of input")]
    UnexpectedEof { offset: usize },
    #[error("unmatched ')'")]
    UnmatchedCloseParen { offset: usize },
    #[error("unclosed '('")]
    UnclosedOpenParen { offset: usize },
    #[error("empty character class")]
    EmptyCharClass { offset: usize },
    #[error("a terminal must not be empty")]
    EmptyTerminal { offset: usize },
    #[error("expected an expression (terminal, character class, rule name, '(' or '.*')")]
    ExpectedExpression { offset: usize },
}

impl GrammarError {
    pub fn offset(&self) -> usize {
        match *self {
            GrammarError::UnterminatedString { offset }
            | GrammarError::UnterminatedCharClass { offset }
            | GrammarError::InvalidUnicodeEscape { offset }
            | GrammarError::InvalidEscape { offset, .. }
            | GrammarError::UnexpectedChar { offset, .. }
            | GrammarError::ExpectedArrow { offset }
            | GrammarError::ExpectedRuleName { offset }
            | GrammarError::UnexpectedEof { offset }
            | GrammarError::UnmatchedCloseParen { offset }
            | GrammarError::UnclosedOpenParen { offset }
            | GrammarError::EmptyCharClass { offset }
            | GrammarError::EmptyTerminal { offset }
            | GrammarError::ExpectedExpression { offset } => offset,
        }
    }
}

/// A semantic error found once a grammar has been fully parsed into rules.
///
/// Unrecoverable: these can only be discovered after every rule has been
/// read, so they are reported as a batch from [`crate::Grammar::parse`]
/// rather than as soon as the offending rule is seen.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("grammar has no 'root' rule")]
    MissingRoot,
    #[error("rule '{name}' is defined more than once")]
    DuplicateRule { name: String, offset: usize },
    #[error("rule '{name}' is not defined")]
    UndefinedRule { name: String },
    #[error("rule '{name}' is a direct or indirect alias cycle with no intervening production")]
    AliasCycle { name: String, cycle: Vec<String> },
}

/// Top-level error returned by [`crate::Grammar::parse`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error(transparent)]
    Syntax(#[from] GrammarError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl ParseError {
    /// Render a one-line message plus a caret-annotated snippet of `source`,
    /// in the spirit of a compiler diagnostic. Errors without a known byte
    /// offset (whole-grammar validation errors) just print the message.
    pub fn report(&self, source: &str) -> String {
        let offset = match self {
            ParseError::Syntax(e) => Some(e.offset()),
            ParseError::Validation(ValidationError::DuplicateRule { offset, .. }) => {
                Some(*offset)
            }
            ParseError::Validation(_) => None,
        };

        let Some(offset) = offset else {
            return format!("error: {self}");
        };

        let (line, column, line_text) = locate(source, offset);
        let mut out = format!("error: {self}\n");
        let _ = fmt::Write::write_fmt(
            &mut out,
            format_args!(" --> line {line}, column {column}\n"),
        );
        let _ = fmt::Write::write_fmt(&mut out, format_args!("  | {line_text}\n"));
        let _ = fmt::Write::write_fmt(
            &mut out,
            format_args!("  | {}^\n", " ".repeat(column.saturating_sub(1))),
        );
        out
    }
}

/// Turn a byte offset into a 1-based (line, column) pair and the text of
/// that line, for diagnostic rendering.
fn locate(source: &str, offset: usize) -> (usize, usize, &str) {
    let offset = offset.min(source.len());
    let mut line = 1;
    let mut line_start = 0;
    for (idx, ch) in source.char_indices() {
        if idx >= offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            line_start = idx + 1;
        }
    }
    let line_end = source[line_start..]
        .find('\n')
        .map(|rel| line_start + rel)
        .unwrap_or(source.len());
    let column = source[line_start..offset].chars().count() + 1;
    (line, column, &source[line_start..line_end])
}
