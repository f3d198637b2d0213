use std::rc::Rc;

use crate::charclass::CharClass;
use crate::error::GrammarError;
use crate::lexer::{Lexer, Token, TokenKind};
use crate::symbol::{RepeatMode, Symbol};

/// One `name ::= expression` line, plus where its name token started (for
/// duplicate-rule diagnostics).
pub(crate) struct ParsedRule {
    pub name: String,
    pub name_offset: usize,
    pub symbol: Rc<Symbol>,
}

/// Recursive-descent parser over the flat token stream produced by
/// [`Lexer`]. Mirrors the shape of a standard Pratt parser: sequences are
/// built left to right, alternatives bind loosest, postfix `? * +` bind
/// tightest and apply directly to the atom they follow.
pub(crate) struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    paren_depth: usize,
}

pub(crate) fn parse_rules(source: &str) -> Result<Vec<ParsedRule>, GrammarError> {
    let tokens = Lexer::new(source).tokenize()?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        paren_depth: 0,
    };
    parser.parse_grammar()
}

impl Parser {
    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn peek_offset(&self) -> usize {
        self.tokens[self.pos].offset
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn skip_blank_lines(&mut self) {
        while matches!(self.peek(), TokenKind::Newline) {
            self.advance();
        }
    }

    /// Newlines are insignificant whitespace while grouped inside `(...)`.
    fn skip_newlines_in_parens(&mut self) {
        if self.paren_depth > 0 {
            while matches!(self.peek(), TokenKind::Newline) {
                self.advance();
            }
        }
    }

    fn parse_grammar(&mut self) -> Result<Vec<ParsedRule>, GrammarError> {
        let mut rules = Vec::new();
        self.skip_blank_lines();
        while !matches!(self.peek(), TokenKind::Eof) {
            rules.push(self.parse_rule()?);
            self.skip_blank_lines();
        }
        Ok(rules)
    }

    fn parse_rule(&mut self) -> Result<ParsedRule, GrammarError> {
        let name_offset = self.peek_offset();
        let name = match self.peek().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                name
            }
            _ => return Err(GrammarError::ExpectedRuleName { offset: name_offset }),
        };
        match self.peek() {
            TokenKind::Arrow => {
                self.advance();
            }
            _ => return Err(GrammarError::ExpectedArrow { offset: self.peek_offset() }),
        }
        let symbol = self.parse_alternative()?;
        match self.peek() {
            TokenKind::Newline | TokenKind::Eof => {}
            _ => return Err(GrammarError::ExpectedArrow { offset: self.peek_offset() }),
        }
        Ok(ParsedRule {
            name,
            name_offset,
            symbol,
        })
    }

    /// `sequence ('|' sequence)*`, flattened and deduplicated by
    /// [`Symbol::alternative`].
    fn parse_alternative(&mut self) -> Result<Rc<Symbol>, GrammarError> {
        let mut branches = vec![self.parse_sequence()?];
        loop {
            self.skip_newlines_in_parens();
            if !matches!(self.peek(), TokenKind::Pipe) {
                break;
            }
            self.advance();
            // A trailing '|' may continue onto the next line even outside parens.
            while matches!(self.peek(), TokenKind::Newline) {
                self.advance();
            }
            branches.push(self.parse_sequence()?);
        }
        Ok(Symbol::alternative(branches))
    }

    /// `postfix-atom*`, terminated by `|`, `)`, newline (outside parens), or EOF.
    fn parse_sequence(&mut self) -> Result<Rc<Symbol>, GrammarError> {
        let mut items = Vec::new();
        loop {
            self.skip_newlines_in_parens();
            if !self.starts_atom() {
                break;
            }
            items.push(self.parse_postfix()?);
        }
        if items.is_empty() {
            return Err(GrammarError::ExpectedExpression {
                offset: self.peek_offset(),
            });
        }
        Ok(Symbol::sequence(items))
    }

    fn starts_atom(&self) -> bool {
        matches!(
            self.peek(),
            TokenKind::Ident(_) | TokenKind::Str(_) | TokenKind::Class { .. } | TokenKind::LParen | TokenKind::Dot
        )
    }

    fn parse_postfix(&mut self) -> Result<Rc<Symbol>, GrammarError> {
        let atom = self.parse_atom()?;
        match self.peek() {
            TokenKind::Question => {
                self.advance();
                Ok(Rc::new(Symbol::Repeat(RepeatMode::Optional, atom)))
            }
            TokenKind::Star => {
                self.advance();
                Ok(Rc::new(Symbol::Repeat(RepeatMode::Star, atom)))
            }
            TokenKind::Plus => {
                self.advance();
                // A+ -> Sequence(A, Repeat(Star, A)); the matcher treats the
                // Repeat's direct RegExp child as matching a run rather than
                // a single codepoint, which is how a `[...]+` class accepts
                // multi-character tokens greedily.
                Ok(Symbol::sequence(vec![
                    atom.clone(),
                    Rc::new(Symbol::Repeat(RepeatMode::Star, atom)),
                ]))
            }
            _ => Ok(atom),
        }
    }

    fn parse_atom(&mut self) -> Result<Rc<Symbol>, GrammarError> {
        let offset = self.peek_offset();
        match self.peek().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(Symbol::non_terminal(name))
            }
            TokenKind::Str(value) => {
                self.advance();
                if value.is_empty() {
                    return Err(GrammarError::EmptyTerminal { offset });
                }
                Ok(Symbol::terminal(value))
            }
            TokenKind::Class { body, negative } => {
                self.advance();
                let source = format!("[{}{}]", if negative { "^" } else { "" }, body);
                Ok(Symbol::regexp(CharClass::parse_body(&body, negative, source)))
            }
            TokenKind::Dot => {
                self.advance();
                match self.peek() {
                    TokenKind::Star => {
                        self.advance();
                        Ok(Rc::new(Symbol::AnyToken))
                    }
                    _ => Err(GrammarError::ExpectedExpression { offset }),
                }
            }
            TokenKind::LParen => {
                self.advance();
                self.paren_depth += 1;
                self.skip_newlines_in_parens();
                let inner = self.parse_alternative()?;
                self.skip_newlines_in_parens();
                match self.peek() {
                    TokenKind::RParen => {
                        self.advance();
                    }
                    _ => return Err(GrammarError::UnclosedOpenParen { offset }),
                }
                self.paren_depth -= 1;
                Ok(inner)
            }
            TokenKind::RParen => Err(GrammarError::UnmatchedCloseParen { offset }),
            TokenKind::Eof => Err(GrammarError::UnexpectedEof { offset }),
            _ => Err(GrammarError::ExpectedExpression { offset }),
        }
    }
}

#[cfg(test)]
mod tests {
    use unindent::unindent;

    use crate::grammar::Grammar;
    use crate::symbol::Symbol;

    #[test]
    fn multiline_group_is_one_sequence() {
        let src = unindent(
            "
            root ::= (
              \"a\"
              \"b\"
            )
            ",
        );
        let g = Grammar::parse(&src).unwrap();
        match &**g.root() {
            Symbol::Sequence(children) => assert_eq!(children.len(), 2),
            other => panic!("expected Sequence, got {other:?}"),
        }
    }

    #[test]
    fn pipe_continuation_across_lines() {
        let src = "root ::= \"a\" |\n          \"b\" |\n          \"c\"\n";
        let g = Grammar::parse(src).unwrap();
        match &**g.root() {
            Symbol::Alternative(children) => assert_eq!(children.len(), 3),
            other => panic!("expected Alternative, got {other:?}"),
        }
    }

    #[test]
    fn unclosed_paren_is_an_error() {
        let err = Grammar::parse("root ::= (\"a\"\n").unwrap_err();
        assert!(matches!(
            err,
            crate::error::ParseError::Syntax(crate::error::GrammarError::UnclosedOpenParen { .. })
        ));
    }

    #[test]
    fn unmatched_close_paren_is_an_error() {
        let err = Grammar::parse("root ::= \"a\")\n").unwrap_err();
        assert!(matches!(
            err,
            crate::error::ParseError::Syntax(crate::error::GrammarError::UnmatchedCloseParen { .. })
        ));
    }
}
