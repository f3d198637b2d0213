use crate::error::GrammarError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Ident(String),
    Arrow,
    Str(String),
    /// Body text between `[` and `]` (escapes already resolved to raw
    /// chars except for the class-specific range syntax, which
    /// `CharClass::parse_body` handles) plus whether it opened with `^`.
    Class { body: String, negative: bool },
    LParen,
    RParen,
    Pipe,
    Question,
    Star,
    Plus,
    Dot,
    Newline,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub offset: usize,
}

/// A peekable cursor over the grammar source, turning it into a flat token
/// stream. Comments (`# ...` to end of line) are stripped here and never
/// become tokens, so the parser never has to think about them — this is
/// what makes comment placement invisible to the resulting symbol tree.
pub(crate) struct Lexer<'a> {
    source: &'a str,
    chars: std::str::CharIndices<'a>,
    peeked: Option<(usize, char)>,
}

impl<'a> Lexer<'a> {
    pub(crate) fn new(source: &'a str) -> Self {
        Lexer {
            source,
            chars: source.char_indices(),
            peeked: None,
        }
    }

    pub(crate) fn tokenize(mut self) -> Result<Vec<Token>, GrammarError> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let done = tok.kind == TokenKind::Eof;
            tokens.push(tok);
            if done {
                break;
            }
        }
        Ok(tokens)
    }

    fn bump(&mut self) -> Option<(usize, char)> {
        if let Some(p) = self.peeked.take() {
            return Some(p);
        }
        self.chars.next()
    }

    fn peek(&mut self) -> Option<(usize, char)> {
        if self.peeked.is_none() {
            self.peeked = self.chars.next();
        }
        self.peeked
    }

    fn skip_comment_and_inline_space(&mut self) {
        loop {
            match self.peek() {
                Some((_, ' ')) | Some((_, '\t')) | Some((_, '\r')) => {
                    self.bump();
                }
                Some((_, '#')) => {
                    while let Some((_, c)) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, GrammarError> {
        self.skip_comment_and_inline_space();
        let Some((offset, c)) = self.bump() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                offset: self.source.len(),
            });
        };
        match c {
            '\n' => Ok(Token {
                kind: TokenKind::Newline,
                offset,
            }),
            '(' => Ok(Token {
                kind: TokenKind::LParen,
                offset,
            }),
            ')' => Ok(Token {
                kind: TokenKind::RParen,
                offset,
            }),
            '|' => Ok(Token {
                kind: TokenKind::Pipe,
                offset,
            }),
            '?' => Ok(Token {
                kind: TokenKind::Question,
                offset,
            }),
            '*' => Ok(Token {
                kind: TokenKind::Star,
                offset,
            }),
            '+' => Ok(Token {
                kind: TokenKind::Plus,
                offset,
            }),
            '.' => Ok(Token {
                kind: TokenKind::Dot,
                offset,
            }),
            ':' => {
                let mut rest = String::from(':');
                for _ in 0..2 {
                    match self.peek() {
                        Some((_, '=')) | Some((_, ':')) => rest.push(self.bump().unwrap().1),
                        _ => break,
                    }
                }
                if rest == "::=" {
                    Ok(Token {
                        kind: TokenKind::Arrow,
                        offset,
                    })
                } else {
                    Err(GrammarError::ExpectedArrow { offset })
                }
            }
            '"' | '\'' => self.lex_string(offset, c),
            '[' => self.lex_class(offset),
            c if c.is_ascii_lowercase() || c == '-' => self.lex_ident(offset, c),
            c => Err(GrammarError::UnexpectedChar { offset, ch: c }),
        }
    }

    fn lex_ident(&mut self, offset: usize, first: char) -> Result<Token, GrammarError> {
        let mut name = String::new();
        name.push(first);
        while let Some((_, c)) = self.peek() {
            if c.is_ascii_lowercase() || c == '-' {
                name.push(c);
                self.bump();
            } else {
                break;
            }
        }
        Ok(Token {
            kind: TokenKind::Ident(name),
            offset,
        })
    }

    fn lex_string(&mut self, offset: usize, quote: char) -> Result<Token, GrammarError> {
        let mut value = String::new();
        loop {
            match self.bump() {
                None | Some((_, '\n')) => return Err(GrammarError::UnterminatedString { offset }),
                Some((_, c)) if c == quote => break,
                Some((esc_offset, '\\')) => value.push(self.lex_escape(esc_offset)?),
                Some((_, c)) => value.push(c),
            }
        }
        Ok(Token {
            kind: TokenKind::Str(value),
            offset,
        })
    }

    fn lex_escape(&mut self, offset: usize) -> Result<char, GrammarError> {
        match self.bump() {
            Some((_, 'n')) => Ok('\n'),
            Some((_, 't')) => Ok('\t'),
            Some((_, 'r')) => Ok('\r'),
            Some((_, '"')) => Ok('"'),
            Some((_, '\'')) => Ok('\''),
            Some((_, '\\')) => Ok('\\'),
            Some((_, 'u')) => self.lex_unicode_escape(offset),
            Some((_, other)) => Err(GrammarError::InvalidEscape { offset, ch: other }),
            None => Err(GrammarError::UnterminatedString { offset }),
        }
    }

    fn lex_unicode_escape(&mut self, offset: usize) -> Result<char, GrammarError> {
        let mut hex = String::with_capacity(4);
        for _ in 0..4 {
            match self.bump() {
                Some((_, c)) if c.is_ascii_hexdigit() => hex.push(c),
                _ => return Err(GrammarError::InvalidUnicodeEscape { offset }),
            }
        }
        u32::from_str_radix(&hex, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or(GrammarError::InvalidUnicodeEscape { offset })
    }

    fn lex_class(&mut self, offset: usize) -> Result<Token, GrammarError> {
        let negative = matches!(self.peek(), Some((_, '^')));
        if negative {
            self.bump();
        }
        let mut body = String::new();
        loop {
            match self.bump() {
                None | Some((_, '\n')) => {
                    return Err(GrammarError::UnterminatedCharClass { offset })
                }
                Some((_, ']')) => break,
                Some((_, '\\')) => {
                    body.push('\\');
                    match self.bump() {
                        Some((_, c)) => body.push(c),
                        None => return Err(GrammarError::UnterminatedCharClass { offset }),
                    }
                }
                Some((_, c)) => body.push(c),
            }
        }
        if body.is_empty() {
            return Err(GrammarError::EmptyCharClass { offset });
        }
        Ok(Token {
            kind: TokenKind::Class { body, negative },
            offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lexes_a_simple_rule() {
        assert_eq!(
            kinds("root ::= \"hi\"\n"),
            vec![
                TokenKind::Ident("root".into()),
                TokenKind::Arrow,
                TokenKind::Str("hi".into()),
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn strips_comments() {
        assert_eq!(
            kinds("root ::= \"hi\" # a trailing comment\n"),
            vec![
                TokenKind::Ident("root".into()),
                TokenKind::Arrow,
                TokenKind::Str("hi".into()),
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn unicode_escape() {
        assert_eq!(kinds("root ::= \"\\u0041\"\n")[2], TokenKind::Str("A".into()));
    }

    #[test]
    fn negative_class() {
        match &kinds("root ::= [^\"\\n]\n")[2] {
            TokenKind::Class { body, negative } => {
                assert!(*negative);
                assert_eq!(body, "\"\\n");
            }
            other => panic!("expected Class, got {other:?}"),
        }
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let err = Lexer::new("root ::= \"oops\n").tokenize().unwrap_err();
        assert!(matches!(err, GrammarError::UnterminatedString { .. }));
    }
}
