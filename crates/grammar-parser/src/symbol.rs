use std::cell::RefCell;
use std::rc::Rc;

use crate::charclass::CharClass;

/// `?` (zero or one) or `*` (zero or more). `+` is desugared away by the
/// parser into `Sequence(A, Repeat(Star, A))` and never appears here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatMode {
    Optional,
    Star,
}

/// A node of the immutable symbol tree produced by [`crate::Grammar::parse`].
///
/// The tree is read-only from the outside: the lone exception is
/// [`Symbol::regexp_next`], a decoration written once during validation (see
/// the module docs on look-ahead in the crate root) and never touched again.
#[derive(Debug)]
pub enum Symbol {
    /// A non-empty literal string.
    Terminal(String),
    /// A `[...]` character class, matching one codepoint by default or a run
    /// of them when the matcher enters it as the direct child of a `Repeat`.
    RegExp {
        class: CharClass,
        /// Set during validation when this symbol is immediately followed,
        /// within some `Sequence`, by a `Terminal`. Lets the negative-class
        /// matcher in `grammar-session` avoid banning a token whose tail
        /// merely anticipates that terminal.
        next: RefCell<Option<Rc<Symbol>>>,
    },
    /// The `.*` sentinel: accepts any token forever.
    AnyToken,
    /// A reference to a named rule, resolved through the grammar's rule map.
    NonTerminal(String),
    Sequence(Vec<Rc<Symbol>>),
    Alternative(Vec<Rc<Symbol>>),
    Repeat(RepeatMode, Rc<Symbol>),
}

impl Symbol {
    pub fn terminal(value: impl Into<String>) -> Rc<Symbol> {
        Rc::new(Symbol::Terminal(value.into()))
    }

    pub fn regexp(class: CharClass) -> Rc<Symbol> {
        Rc::new(Symbol::RegExp {
            class,
            next: RefCell::new(None),
        })
    }

    pub fn non_terminal(name: impl Into<String>) -> Rc<Symbol> {
        Rc::new(Symbol::NonTerminal(name.into()))
    }

    /// Flatten nested `Alternative`s and drop exact duplicates, preserving
    /// first-seen order, per the parser's flattening rule.
    pub fn alternative(children: Vec<Rc<Symbol>>) -> Rc<Symbol> {
        let mut flat: Vec<Rc<Symbol>> = Vec::with_capacity(children.len());
        for child in children {
            match &*child {
                Symbol::Alternative(inner) => {
                    for grandchild in inner {
                        push_unique(&mut flat, grandchild.clone());
                    }
                }
                _ => push_unique(&mut flat, child),
            }
        }
        if flat.len() == 1 {
            flat.into_iter().next().unwrap()
        } else {
            Rc::new(Symbol::Alternative(flat))
        }
    }

    pub fn sequence(children: Vec<Rc<Symbol>>) -> Rc<Symbol> {
        if children.len() == 1 {
            children.into_iter().next().unwrap()
        } else {
            Rc::new(Symbol::Sequence(children))
        }
    }

    /// Record that this `RegExp` is immediately followed by `terminal`
    /// inside some `Sequence`. Idempotent; only ever called during
    /// validation.
    pub fn set_regexp_next(self: &Rc<Symbol>, terminal: Rc<Symbol>) {
        if let Symbol::RegExp { next, .. } = &**self {
            *next.borrow_mut() = Some(terminal);
        }
    }

    pub fn regexp_next(&self) -> Option<Rc<Symbol>> {
        match self {
            Symbol::RegExp { next, .. } => next.borrow().clone(),
            _ => None,
        }
    }
}

fn push_unique(into: &mut Vec<Rc<Symbol>>, candidate: Rc<Symbol>) {
    let is_dup = into.iter().any(|existing| symbols_equal(existing, &candidate));
    if !is_dup {
        into.push(candidate);
    }
}

/// Structural equality used only for alternative de-duplication at parse
/// time; not a general `PartialEq` impl because `NonTerminal` equality would
/// otherwise be misleading once cycles are involved.
fn symbols_equal(a: &Rc<Symbol>, b: &Rc<Symbol>) -> bool {
    match (&**a, &**b) {
        (Symbol::Terminal(x), Symbol::Terminal(y)) => x == y,
        (Symbol::NonTerminal(x), Symbol::NonTerminal(y)) => x == y,
        (Symbol::AnyToken, Symbol::AnyToken) => true,
        (Symbol::RegExp { class: x, .. }, Symbol::RegExp { class: y, .. }) => x == y,
        (Symbol::Repeat(mx, x), Symbol::Repeat(my, y)) => mx == my && symbols_equal(x, y),
        (Symbol::Sequence(x), Symbol::Sequence(y)) | (Symbol::Alternative(x), Symbol::Alternative(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| symbols_equal(a, b))
        }
        _ => false,
    }
}
