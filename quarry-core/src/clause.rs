//! Statement clauses and final SQL assembly

use std::collections::HashMap;
use std::fmt::{self, Display};
use std::str::FromStr;

use crate::expr::Expression;
use crate::Error;

/// The closed set of statement clauses tracked independently before assembly.
///
/// Each variant carries the SQL keyword it introduces. `Group` and `Order`
/// also answer to the `groupBy`/`orderBy` spellings when parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Clause {
    Select,
    Insert,
    Update,
    Set,
    Delete,
    Join,
    From,
    Values,
    Where,
    Group,
    Having,
    Order,
    Limit,
    Offset,
    Top,
}

impl Clause {
    /// Get the SQL keyword for this clause
    pub fn keyword(&self) -> &'static str {
        match self {
            Clause::Select => "SELECT",
            Clause::Insert => "INSERT INTO",
            Clause::Update => "UPDATE",
            Clause::Set => "SET",
            Clause::Delete => "DELETE",
            Clause::Join => "JOIN",
            Clause::From => "FROM",
            Clause::Values => "VALUES",
            Clause::Where => "WHERE",
            Clause::Group => "GROUP BY",
            Clause::Having => "HAVING",
            Clause::Order => "ORDER BY",
            Clause::Limit => "LIMIT",
            Clause::Offset => "OFFSET",
            Clause::Top => "TOP",
        }
    }
}

impl Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.keyword())
    }
}

impl FromStr for Clause {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "select" => Ok(Clause::Select),
            "insert" => Ok(Clause::Insert),
            "update" => Ok(Clause::Update),
            "set" => Ok(Clause::Set),
            "delete" => Ok(Clause::Delete),
            "join" => Ok(Clause::Join),
            "from" => Ok(Clause::From),
            "values" => Ok(Clause::Values),
            "where" => Ok(Clause::Where),
            "group" | "groupby" => Ok(Clause::Group),
            "having" => Ok(Clause::Having),
            "order" | "orderby" => Ok(Clause::Order),
            "limit" => Ok(Clause::Limit),
            "offset" => Ok(Clause::Offset),
            "top" => Ok(Clause::Top),
            _ => Err(Error::unknown_operation(s)),
        }
    }
}

/// JOIN types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

impl Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinType::Inner => write!(f, "INNER"),
            JoinType::Left => write!(f, "LEFT"),
            JoinType::Right => write!(f, "RIGHT"),
            JoinType::Full => write!(f, "FULL OUTER"),
            JoinType::Cross => write!(f, "CROSS"),
        }
    }
}

/// The per-record map from clause to its currently built expression, plus
/// the assembler that renders an ordered clause list into one SQL string.
#[derive(Debug, Clone, Default)]
pub struct ClauseSet {
    entries: HashMap<Clause, Expression>,
}

impl ClauseSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, clause: Clause, expr: Expression) {
        self.entries.insert(clause, expr);
    }

    pub fn get(&self, clause: Clause) -> Option<&Expression> {
        self.entries.get(&clause)
    }

    pub fn take(&mut self, clause: Clause) -> Option<Expression> {
        self.entries.remove(&clause)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render the named clauses in order into one statement.
    ///
    /// A clause with no stored expression resolves to its default: a bare
    /// `SELECT <table>.*`, `FROM <table>` or `UPDATE <table>`, or to
    /// nothing at all. `DELETE` is always the literal keyword. Non-empty
    /// fragments are joined with single spaces, so identical clause state
    /// always renders byte-identical SQL.
    pub fn build(&self, order: &[Clause], table: &str) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(order.len());
        for clause in order {
            let fragment = match (clause, self.entries.get(clause)) {
                (Clause::Delete, _) => Clause::Delete.keyword().to_string(),
                (Clause::Select, None) => format!("SELECT {}.*", table),
                (Clause::From, None) => format!("FROM {}", table),
                (Clause::Update, None) => format!("UPDATE {}", table),
                (_, Some(expr)) => expr.to_string(),
                (_, None) => continue,
            };
            if !fragment.is_empty() {
                parts.push(fragment);
            }
        }
        parts.join(" ")
    }
}
