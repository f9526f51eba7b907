//! SQL expression value objects
//!
//! Every statement this crate builds is assembled from [`Expression`] trees:
//! a `source operator target` triple whose sides may themselves be
//! expressions. [`WrapExpression`] is the bracketed-list variant used for
//! `IN (...)` value lists, `BETWEEN ... AND ...` pairs and parenthesized
//! boolean groups. Both are pure value objects; rendering is `Display`,
//! there are no side effects.

use std::fmt::{self, Display};

/// One side of an expression
#[derive(Debug, Clone)]
pub enum Term {
    /// A raw SQL fragment: a column name, a placeholder token, a keyword tail
    Raw(String),
    /// A nested expression
    Expr(Box<Expression>),
    /// A bracketed, delimited list
    Wrap(WrapExpression),
}

impl Term {
    pub fn raw(fragment: impl Into<String>) -> Self {
        Term::Raw(fragment.into())
    }
}

impl Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Raw(s) => write!(f, "{}", s),
            Term::Expr(e) => write!(f, "{}", e),
            Term::Wrap(w) => write!(f, "{}", w),
        }
    }
}

impl From<String> for Term {
    fn from(s: String) -> Self {
        Term::Raw(s)
    }
}

impl From<&str> for Term {
    fn from(s: &str) -> Self {
        Term::Raw(s.to_string())
    }
}

impl From<Expression> for Term {
    fn from(e: Expression) -> Self {
        Term::Expr(Box::new(e))
    }
}

impl From<WrapExpression> for Term {
    fn from(w: WrapExpression) -> Self {
        Term::Wrap(w)
    }
}

/// A `source operator target` triple, the atomic statement fragment.
///
/// `source` and `target` are both optional: `WHERE <tree>` has no source,
/// `users.deleted_at IS NULL` has no target. An absent side renders as
/// nothing, so the output stays whitespace-normalized.
#[derive(Debug, Clone)]
pub struct Expression {
    pub source: Option<Term>,
    pub operator: String,
    pub target: Option<Term>,
}

impl Expression {
    /// An expression with no source: `WHERE <target>`, `VALUES (...)`
    pub fn new(operator: impl Into<String>, target: Term) -> Self {
        Self {
            source: None,
            operator: operator.into(),
            target: Some(target),
        }
    }

    /// A full `source operator target` expression
    pub fn binary(source: Term, operator: impl Into<String>, target: Term) -> Self {
        Self {
            source: Some(source),
            operator: operator.into(),
            target: Some(target),
        }
    }

    /// An expression with no target: `users.deleted_at IS NULL`
    pub fn unary(source: Term, operator: impl Into<String>) -> Self {
        Self {
            source: Some(source),
            operator: operator.into(),
            target: None,
        }
    }
}

impl Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.source, &self.target) {
            // comma joins render attached to the left operand: "a, b"
            (Some(s), Some(t)) if self.operator == "," => write!(f, "{}, {}", s, t),
            (Some(s), Some(t)) => write!(f, "{} {} {}", s, self.operator, t),
            (Some(s), None) => write!(f, "{} {}", s, self.operator),
            (None, Some(t)) => write!(f, "{} {}", self.operator, t),
            (None, None) => write!(f, "{}", self.operator),
        }
    }
}

/// A delimited sequence of terms between bracket strings.
///
/// Renders as `start + join(items, delimiter) + end`; an empty sequence
/// renders as just `start + end` (`()` with the defaults). Callers that
/// cannot accept an empty list (`IN ()` is not valid SQL) must reject it
/// before building the expression; the condition layer does exactly that.
#[derive(Debug, Clone)]
pub struct WrapExpression {
    pub items: Vec<Term>,
    pub delimiter: String,
    pub start: String,
    pub end: String,
}

impl WrapExpression {
    /// A parenthesized comma list: `(a, b, c)`
    pub fn new(items: Vec<Term>) -> Self {
        Self {
            items,
            delimiter: ", ".to_string(),
            start: "(".to_string(),
            end: ")".to_string(),
        }
    }

    /// The two-sided BETWEEN pair: `low AND high`, no brackets
    pub fn between(low: Term, high: Term) -> Self {
        Self {
            items: vec![low, high],
            delimiter: " AND ".to_string(),
            start: String::new(),
            end: String::new(),
        }
    }

    /// A parenthesized boolean group: `(a OR b)`, space-delimited items
    pub fn group(items: Vec<Term>) -> Self {
        Self {
            items,
            delimiter: " ".to_string(),
            start: "(".to_string(),
            end: ")".to_string(),
        }
    }
}

impl Display for WrapExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.start)?;
        for (i, item) in self.items.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", self.delimiter)?;
            }
            write!(f, "{}", item)?;
        }
        write!(f, "{}", self.end)
    }
}
