use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::{ParseError, ValidationError};
use crate::parser::{parse_rules, ParsedRule};
use crate::symbol::Symbol;

/// The name of the distinguished rule every grammar must define.
pub const ROOT_RULE: &str = "root";

/// A fully parsed and validated grammar: a name→[`Symbol`] map with a
/// distinguished `root` rule, immutable from here on.
///
/// Construction (`Grammar::parse`) is the only place that can fail; once you
/// have a `Grammar`, every name it contains resolves, `root` exists, and no
/// rule is a degenerate alias cycle.
#[derive(Debug)]
pub struct Grammar {
    rules: IndexMap<String, Rc<Symbol>>,
}

impl Grammar {
    /// Parse and validate grammar source text.
    ///
    /// Returns [`ParseError::Syntax`] for lexical/syntactic problems (fails
    /// fast, on the first rule that doesn't scan) or
    /// [`ParseError::Validation`] for semantic ones (name resolution,
    /// cycles, `root` presence — these can only be checked once every rule
    /// has been read).
    pub fn parse(source: &str) -> Result<Grammar, ParseError> {
        let parsed = parse_rules(source)?;
        let grammar = Grammar::from_parsed_rules(parsed)?;
        Ok(grammar)
    }

    fn from_parsed_rules(parsed: Vec<ParsedRule>) -> Result<Grammar, ValidationError> {
        let mut rules: IndexMap<String, Rc<Symbol>> = IndexMap::new();
        for rule in parsed {
            if rules.contains_key(&rule.name) {
                return Err(ValidationError::DuplicateRule {
                    name: rule.name,
                    offset: rule.name_offset,
                });
            }
            rules.insert(rule.name, rule.symbol);
        }

        if !rules.contains_key(ROOT_RULE) {
            return Err(ValidationError::MissingRoot);
        }

        check_names_resolve(&rules)?;
        check_no_alias_cycles(&rules)?;
        decorate_regexp_next(&rules);

        Ok(Grammar { rules })
    }

    /// Look up a rule by name.
    pub fn rule(&self, name: &str) -> Option<&Rc<Symbol>> {
        self.rules.get(name)
    }

    /// The `root` rule's symbol. Always present on a validated `Grammar`.
    pub fn root(&self) -> &Rc<Symbol> {
        self.rules
            .get(ROOT_RULE)
            .expect("Grammar invariant: root rule always present after parse")
    }

    /// Resolve a [`Symbol::NonTerminal`] name to its definition.
    pub fn resolve(&self, name: &str) -> Option<Rc<Symbol>> {
        self.rules.get(name).cloned()
    }

    /// Iterate rules in source-declaration order.
    pub fn rules(&self) -> impl Iterator<Item = (&str, &Rc<Symbol>)> {
        self.rules.iter().map(|(k, v)| (k.as_str(), v))
    }
}

fn check_names_resolve(rules: &IndexMap<String, Rc<Symbol>>) -> Result<(), ValidationError> {
    for symbol in rules.values() {
        check_symbol_names_resolve(symbol, rules)?;
    }
    Ok(())
}

fn check_symbol_names_resolve(
    symbol: &Rc<Symbol>,
    rules: &IndexMap<String, Rc<Symbol>>,
) -> Result<(), ValidationError> {
    match &**symbol {
        Symbol::NonTerminal(name) => {
            if !rules.contains_key(name) {
                return Err(ValidationError::UndefinedRule { name: name.clone() });
            }
        }
        Symbol::Sequence(children) | Symbol::Alternative(children) => {
            for child in children {
                check_symbol_names_resolve(child, rules)?;
            }
        }
        Symbol::Repeat(_, inner) => check_symbol_names_resolve(inner, rules)?,
        Symbol::Terminal(_) | Symbol::RegExp { .. } | Symbol::AnyToken => {}
    }
    Ok(())
}

/// Forbid only *degenerate* cycles: a rule whose body is exactly
/// `NonTerminal(other)` with nothing else around it, chaining back to
/// itself. `list ::= item list?` is fine (the `Repeat` is an intervening
/// production); `a ::= b` / `b ::= a` is not.
fn check_no_alias_cycles(rules: &IndexMap<String, Rc<Symbol>>) -> Result<(), ValidationError> {
    for start in rules.keys() {
        let mut seen = vec![start.clone()];
        let mut current = start.clone();
        loop {
            let Some(Symbol::NonTerminal(next)) = rules.get(&current).map(|s| &**s) else {
                break;
            };
            if next == start {
                seen.push(next.clone());
                return Err(ValidationError::AliasCycle {
                    name: start.clone(),
                    cycle: seen,
                });
            }
            if seen.contains(next) {
                // Points into a cycle that doesn't include `start`; that
                // cycle will be reported when we iterate its own members.
                break;
            }
            seen.push(next.clone());
            current = next.clone();
        }
    }
    Ok(())
}

/// For every `Sequence([..., Repeat(_, RegExp R), Terminal T, ...])`, record
/// `R.next = T` so the negative-class matcher can let tokens whose tail
/// merely anticipates `T` through. Walks every rule's whole tree, since the
/// decisive `Sequence` can be nested arbitrarily deep.
fn decorate_regexp_next(rules: &IndexMap<String, Rc<Symbol>>) {
    for symbol in rules.values() {
        decorate_symbol(symbol);
    }
}

fn decorate_symbol(symbol: &Rc<Symbol>) {
    match &**symbol {
        Symbol::Sequence(children) => {
            for window in children.windows(2) {
                if let (Symbol::Repeat(_, inner), Symbol::Terminal(_)) = (&*window[0], &*window[1]) {
                    if matches!(&**inner, Symbol::RegExp { .. }) {
                        inner.set_regexp_next(window[1].clone());
                    }
                }
            }
            for child in children {
                decorate_symbol(child);
            }
        }
        Symbol::Alternative(children) => {
            for child in children {
                decorate_symbol(child);
            }
        }
        Symbol::Repeat(_, inner) => decorate_symbol(inner),
        Symbol::Terminal(_) | Symbol::RegExp { .. } | Symbol::AnyToken | Symbol::NonTerminal(_) => {}
    }
}
