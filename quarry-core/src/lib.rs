//! Quarry Core - an ActiveRecord-style data mapper and SQL builder
//!
//! This crate maps database rows onto in-memory [`Record`] objects and
//! builds parameterized SQL through chained condition and clause calls
//! instead of hand-written query strings. Statements accumulate as
//! expression trees, render on a terminal action (find / insert / update /
//! delete), and updates write back only the columns that changed since the
//! last load.

pub mod clause;
pub mod driver;
pub mod error;
pub mod expr;
pub mod operator;
pub mod record;
pub mod relation;
pub mod schema;
pub mod session;
pub mod value;

// Re-export main types
pub use clause::{Clause, ClauseSet, JoinType};
pub use driver::{Database, ExecResult, Row};
pub use error::{Error, Result};
pub use expr::{Expression, Term, WrapExpression};
pub use operator::{Connector, Operator};
pub use record::Record;
pub use relation::{Related, Relation, RelationKind};
pub use schema::{SchemaSource, TableSchema};
pub use session::Session;
pub use value::Value;

#[cfg(feature = "mysql")]
pub use driver::mysql::MySqlDatabase;
