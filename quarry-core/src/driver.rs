//! Database execution boundary
//!
//! Records talk to the database through the [`Database`] trait; the engine
//! never sees a connection handle directly. Statements arrive as SQL text
//! with named placeholders plus the ordered `(token, value)` bindings;
//! drivers expand the tokens into whatever their protocol wants.

use std::future::Future;

use indexmap::IndexMap;

use crate::{Result, Value};

/// One fetched row: column name to value, in select order
pub type Row = IndexMap<String, Value>;

/// Outcome of a modification statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecResult {
    pub rows_affected: u64,
    /// Generated key of the inserted row, when the driver reports one
    pub last_insert_id: Option<u64>,
}

/// Trait for database backends
pub trait Database: Send + Sync {
    /// Execute a statement that returns no rows (INSERT, UPDATE, DELETE)
    fn execute(
        &self,
        sql: &str,
        bindings: &[(String, Value)],
    ) -> impl Future<Output = Result<ExecResult>> + Send;

    /// Execute a query and return all matching rows
    fn fetch_all(
        &self,
        sql: &str,
        bindings: &[(String, Value)],
    ) -> impl Future<Output = Result<Vec<Row>>> + Send;

    /// Execute a query and return the first matching row, if any.
    ///
    /// An absent row is a value, not an error.
    fn fetch_one(
        &self,
        sql: &str,
        bindings: &[(String, Value)],
    ) -> impl Future<Output = Result<Option<Row>>> + Send;
}

/// Rewrite named placeholders to positional `?` markers.
///
/// Scans `sql` for the bound tokens and returns the rewritten text plus the
/// values in occurrence order. Tokens the bindings do not know are left
/// untouched; a bound token may appear more than once and is pushed once
/// per occurrence.
pub fn expand_placeholders(sql: &str, bindings: &[(String, Value)]) -> (String, Vec<Value>) {
    let mut out = String::with_capacity(sql.len());
    let mut values = Vec::with_capacity(bindings.len());
    let mut rest = sql;

    while let Some(pos) = rest.find(':') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos..];
        let end = after[1..]
            .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
            .map(|offset| offset + 1)
            .unwrap_or(after.len());
        let token = &after[..end];
        if let Some((_, value)) = bindings.iter().find(|(name, _)| name == token) {
            out.push('?');
            values.push(value.clone());
        } else {
            out.push_str(token);
        }
        rest = &after[end..];
    }
    out.push_str(rest);

    (out, values)
}

/// SQLx-backed MySQL driver
#[cfg(feature = "mysql")]
pub mod mysql {
    use super::*;
    use crate::schema::SchemaSource;
    use sqlx::mysql::{MySqlArguments, MySqlRow};
    use sqlx::{Column, MySql, MySqlPool, Row as _};

    /// MySQL connection pool wrapper
    #[derive(Debug, Clone)]
    pub struct MySqlDatabase {
        pool: MySqlPool,
    }

    impl MySqlDatabase {
        /// Connect to a MySQL database from a connection URL
        pub async fn connect(database_url: &str) -> Result<Self> {
            let pool = MySqlPool::connect(database_url).await?;
            Ok(Self { pool })
        }

        /// Create from an existing pool
        pub fn from_pool(pool: MySqlPool) -> Self {
            Self { pool }
        }
    }

    impl Database for MySqlDatabase {
        async fn execute(&self, sql: &str, bindings: &[(String, Value)]) -> Result<ExecResult> {
            let (sql, values) = expand_placeholders(sql, bindings);
            tracing::debug!(sql = %sql, params = values.len(), "executing statement");
            let query = bind_values(sqlx::query(&sql), &values);
            let result = query.execute(&self.pool).await?;
            Ok(ExecResult {
                rows_affected: result.rows_affected(),
                last_insert_id: Some(result.last_insert_id()),
            })
        }

        async fn fetch_all(&self, sql: &str, bindings: &[(String, Value)]) -> Result<Vec<Row>> {
            let (sql, values) = expand_placeholders(sql, bindings);
            tracing::debug!(sql = %sql, params = values.len(), "fetching rows");
            let query = bind_values(sqlx::query(&sql), &values);
            let rows = query.fetch_all(&self.pool).await?;
            Ok(rows.iter().map(row_values).collect())
        }

        async fn fetch_one(
            &self,
            sql: &str,
            bindings: &[(String, Value)],
        ) -> Result<Option<Row>> {
            let (sql, values) = expand_placeholders(sql, bindings);
            tracing::debug!(sql = %sql, params = values.len(), "fetching row");
            let query = bind_values(sqlx::query(&sql), &values);
            let row = query.fetch_optional(&self.pool).await?;
            Ok(row.as_ref().map(row_values))
        }
    }

    impl SchemaSource for MySqlDatabase {
        async fn load_columns(&self, table: &str) -> Result<IndexMap<String, String>> {
            let sql = format!("SHOW COLUMNS FROM {}", table);
            let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
            let mut columns = IndexMap::with_capacity(rows.len());
            for row in rows {
                let field: String = row.try_get("Field")?;
                let sql_type: String = row.try_get("Type")?;
                columns.insert(field, sql_type);
            }
            Ok(columns)
        }
    }

    /// Bind values to a SQLx query in order
    fn bind_values<'q>(
        mut query: sqlx::query::Query<'q, MySql, MySqlArguments>,
        values: &[Value],
    ) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
        for value in values {
            query = match value {
                Value::Null => query.bind(None::<i32>),
                Value::Bool(b) => query.bind(*b),
                Value::I32(i) => query.bind(*i),
                Value::I64(i) => query.bind(*i),
                Value::F32(f) => query.bind(*f),
                Value::F64(f) => query.bind(*f),
                Value::String(s) => query.bind(s.clone()),
                Value::Bytes(b) => query.bind(b.clone()),
            };
        }
        query
    }

    /// Convert a SQLx row into the driver-neutral row shape
    fn row_values(row: &MySqlRow) -> Row {
        let mut out = Row::with_capacity(row.columns().len());
        for (idx, column) in row.columns().iter().enumerate() {
            out.insert(column.name().to_string(), decode_column(row, idx));
        }
        out
    }

    fn decode_column(row: &MySqlRow, idx: usize) -> Value {
        if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
            return v.map(Value::I64).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
            return v.map(Value::F64).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
            return v.map(Value::String).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<bool>, _>(idx) {
            return v.map(Value::Bool).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(idx) {
            return v.map(Value::Bytes).unwrap_or(Value::Null);
        }
        Value::Null
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings(pairs: &[(&str, Value)]) -> Vec<(String, Value)> {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn test_expand_in_order() {
        let binds = bindings(&[
            (":ph1", Value::from("vasya")),
            (":ph2", Value::from(42i64)),
        ]);
        let (sql, values) = expand_placeholders(
            "SELECT users.* FROM users WHERE users.name = :ph1 AND users.age = :ph2",
            &binds,
        );
        assert_eq!(
            sql,
            "SELECT users.* FROM users WHERE users.name = ? AND users.age = ?"
        );
        assert_eq!(values, vec![Value::from("vasya"), Value::from(42i64)]);
    }

    #[test]
    fn test_expand_uses_occurrence_order_not_binding_order() {
        let binds = bindings(&[
            (":ph1", Value::from(1i64)),
            (":ph2", Value::from(2i64)),
        ]);
        let (sql, values) = expand_placeholders("a = :ph2 AND b = :ph1", &binds);
        assert_eq!(sql, "a = ? AND b = ?");
        assert_eq!(values, vec![Value::from(2i64), Value::from(1i64)]);
    }

    #[test]
    fn test_expand_does_not_confuse_prefixed_tokens() {
        // :ph1 must not swallow the start of :ph10
        let binds = bindings(&[
            (":ph1", Value::from("one")),
            (":ph10", Value::from("ten")),
        ]);
        let (sql, values) = expand_placeholders("a = :ph10 AND b = :ph1", &binds);
        assert_eq!(sql, "a = ? AND b = ?");
        assert_eq!(values, vec![Value::from("ten"), Value::from("one")]);
    }

    #[test]
    fn test_expand_leaves_unknown_tokens() {
        let binds = bindings(&[(":ph1", Value::from(5i64))]);
        let (sql, values) = expand_placeholders("a = :ph1 AND b = :other", &binds);
        assert_eq!(sql, "a = ? AND b = :other");
        assert_eq!(values, vec![Value::from(5i64)]);
    }

    #[test]
    fn test_expand_repeated_token() {
        let binds = bindings(&[(":ph1", Value::from(9i64))]);
        let (sql, values) = expand_placeholders("a = :ph1 OR b = :ph1", &binds);
        assert_eq!(sql, "a = ? OR b = ?");
        assert_eq!(values, vec![Value::from(9i64), Value::from(9i64)]);
    }

    #[test]
    fn test_expand_without_placeholders() {
        let (sql, values) = expand_placeholders("DELETE FROM users", &[]);
        assert_eq!(sql, "DELETE FROM users");
        assert!(values.is_empty());
    }
}
