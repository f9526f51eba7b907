//! Error types for Quarry

use thiserror::Error;

/// The main error type for Quarry operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database connection or execution error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Statement preparation or execution failure reported by a collaborator
    #[error("Statement failed: {message}")]
    Statement { message: String },

    /// Operator or clause name outside the recognized vocabulary
    #[error("Unknown operation '{name}'")]
    UnknownOperation { name: String },

    /// Relation accessor invoked for an undeclared relation
    #[error("Relation '{name}' not found")]
    RelationNotFound { name: String },

    /// Column not found error
    #[error("Column '{column}' not found in table '{table}'")]
    ColumnNotFound { table: String, column: String },

    /// IN/NOT IN condition given an empty value sequence
    #[error("Empty value list for '{field}' condition")]
    EmptyValueList { field: String },

    /// Invalid query configuration
    #[error("Invalid query: {message}")]
    InvalidQuery { message: String },

    /// Write action on a record whose primary key has no value
    #[error("Record in table '{table}' has no primary key value")]
    MissingPrimaryKey { table: String },
}

/// Convenience Result type for Quarry operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a new statement error
    pub fn statement(message: impl Into<String>) -> Self {
        Self::Statement {
            message: message.into(),
        }
    }

    /// Create a new unknown operation error
    pub fn unknown_operation(name: impl Into<String>) -> Self {
        Self::UnknownOperation { name: name.into() }
    }

    /// Create a new relation not found error
    pub fn relation_not_found(name: impl Into<String>) -> Self {
        Self::RelationNotFound { name: name.into() }
    }

    /// Create a new column not found error
    pub fn column_not_found(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::ColumnNotFound {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Create a new empty value list error
    pub fn empty_value_list(field: impl Into<String>) -> Self {
        Self::EmptyValueList {
            field: field.into(),
        }
    }

    /// Create a new invalid query error
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery {
            message: message.into(),
        }
    }

    /// Create a new missing primary key error
    pub fn missing_primary_key(table: impl Into<String>) -> Self {
        Self::MissingPrimaryKey {
            table: table.into(),
        }
    }
}
