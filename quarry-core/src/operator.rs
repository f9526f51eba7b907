//! SQL comparison operators and boolean connectors

use std::fmt::{self, Display};
use std::str::FromStr;

use crate::Error;

/// The closed set of comparison operators accepted in conditions.
///
/// Each variant carries its SQL token; there is no catch-all dispatch;
/// anything outside this vocabulary is rejected when parsed from a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    Between,
    Like,
    In,
    NotIn,
    IsNull,
    IsNotNull,
    Regexp,
}

impl Operator {
    /// Get the SQL token for this operator
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "<>",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Ge => ">=",
            Operator::Le => "<=",
            Operator::Between => "BETWEEN",
            Operator::Like => "LIKE",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::IsNull => "IS NULL",
            Operator::IsNotNull => "IS NOT NULL",
            Operator::Regexp => "REGEXP",
        }
    }

    /// Whether this operator compares against a value at all
    pub fn takes_value(&self) -> bool {
        !matches!(self, Operator::IsNull | Operator::IsNotNull)
    }

    /// Whether this operator targets a sequence of values
    pub fn takes_list(&self) -> bool {
        matches!(self, Operator::Between | Operator::In | Operator::NotIn)
    }
}

impl Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Operator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "eq" | "=" => Ok(Operator::Eq),
            "ne" | "<>" | "!=" => Ok(Operator::Ne),
            "gt" | ">" => Ok(Operator::Gt),
            "lt" | "<" => Ok(Operator::Lt),
            "ge" | ">=" => Ok(Operator::Ge),
            "le" | "<=" => Ok(Operator::Le),
            "between" => Ok(Operator::Between),
            "like" => Ok(Operator::Like),
            "in" => Ok(Operator::In),
            "notin" | "not in" => Ok(Operator::NotIn),
            "isnull" | "is null" => Ok(Operator::IsNull),
            "isnotnull" | "is not null" => Ok(Operator::IsNotNull),
            "regexp" => Ok(Operator::Regexp),
            _ => Err(Error::unknown_operation(s)),
        }
    }
}

/// Boolean connector joining two conditions in the same clause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connector {
    And,
    Or,
    /// Comma join, used for SET lists
    Comma,
}

impl Connector {
    pub fn as_str(&self) -> &'static str {
        match self {
            Connector::And => "AND",
            Connector::Or => "OR",
            Connector::Comma => ",",
        }
    }
}

impl Display for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_tokens() {
        assert_eq!(Operator::Eq.as_str(), "=");
        assert_eq!(Operator::Ne.as_str(), "<>");
        assert_eq!(Operator::Between.as_str(), "BETWEEN");
        assert_eq!(Operator::NotIn.as_str(), "NOT IN");
        assert_eq!(Operator::IsNotNull.as_str(), "IS NOT NULL");
        assert_eq!(Operator::Regexp.as_str(), "REGEXP");
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Operator::Gt), ">");
        assert_eq!(format!("{}", Operator::Like), "LIKE");
    }

    #[test]
    fn test_parse_method_names() {
        assert_eq!("eq".parse::<Operator>().unwrap(), Operator::Eq);
        assert_eq!("ne".parse::<Operator>().unwrap(), Operator::Ne);
        assert_eq!("notIn".parse::<Operator>().unwrap(), Operator::NotIn);
        assert_eq!("isNull".parse::<Operator>().unwrap(), Operator::IsNull);
        assert_eq!("isNotNull".parse::<Operator>().unwrap(), Operator::IsNotNull);
    }

    #[test]
    fn test_parse_sql_tokens() {
        assert_eq!(">=".parse::<Operator>().unwrap(), Operator::Ge);
        assert_eq!("!=".parse::<Operator>().unwrap(), Operator::Ne);
        assert_eq!("NOT IN".parse::<Operator>().unwrap(), Operator::NotIn);
    }

    #[test]
    fn test_parse_unknown_fails() {
        let err = "sounds_like".parse::<Operator>().unwrap_err();
        assert!(matches!(err, Error::UnknownOperation { .. }));
    }

    #[test]
    fn test_value_shape() {
        assert!(!Operator::IsNull.takes_value());
        assert!(Operator::Eq.takes_value());
        assert!(Operator::In.takes_list());
        assert!(Operator::Between.takes_list());
        assert!(!Operator::Like.takes_list());
    }

    #[test]
    fn test_connector_tokens() {
        assert_eq!(Connector::And.as_str(), "AND");
        assert_eq!(Connector::Or.as_str(), "OR");
        assert_eq!(Connector::Comma.as_str(), ",");
    }
}
