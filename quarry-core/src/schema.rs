//! Table schema and the schema collaborator boundary

use std::future::Future;

use indexmap::IndexMap;

use crate::Result;

/// The column set of one table: name to declared SQL type, in DDL order.
///
/// Column order matters: it drives INSERT column lists and the iteration
/// order of dirty-attribute computation.
#[derive(Debug, Clone)]
pub struct TableSchema {
    table: String,
    columns: IndexMap<String, String>,
}

impl TableSchema {
    pub fn new(table: impl Into<String>, columns: IndexMap<String, String>) -> Self {
        Self {
            table: table.into(),
            columns,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &IndexMap<String, String> {
        &self.columns
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    pub fn column_type(&self, column: &str) -> Option<&str> {
        self.columns.get(column).map(String::as_str)
    }
}

/// Source of table schemas.
///
/// The core only needs "give me the column set for table X"; caching policy
/// and freshness live entirely behind this boundary. Loaded column maps are
/// memoized per [`Session`](crate::Session) for the life of the process.
pub trait SchemaSource {
    fn load_columns(
        &self,
        table: &str,
    ) -> impl Future<Output = Result<IndexMap<String, String>>> + Send;
}
