//! Connection contract of the persistence layer.
//!
//! [`SqlConnection`] is the narrow surface the generic persistor relies
//! on: parameterised statements, batched statements, queries, table
//! introspection and backend metadata (product name, identifier quote and
//! supported types).

use std::fmt;

use tributary_types::{Locator, Value, ValueType};

use crate::error::Result;

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Backend-neutral SQL type constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    Boolean,
    Integer,
    BigInt,
    Double,
    Varchar,
    Null,
}

impl SqlType {
    /// ANSI type name used when the backend does not report one.
    #[must_use]
    pub fn ansi_name(self) -> &'static str {
        match self {
            Self::Boolean => "BOOLEAN",
            Self::Integer => "INTEGER",
            Self::BigInt => "BIGINT",
            Self::Double => "DOUBLE PRECISION",
            Self::Varchar => "VARCHAR(255)",
            Self::Null => "NULL",
        }
    }
}

/// One entry of the backend's supported type list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeInfo {
    pub type_name: String,
    pub sql_type: SqlType,
}

impl TypeInfo {
    #[must_use]
    pub fn new(type_name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            type_name: type_name.into(),
            sql_type,
        }
    }
}

/// Static facts about a backend.
#[derive(Debug, Clone)]
pub struct DatabaseMetadata {
    pub product_name: String,
    pub identifier_quote: String,
    pub type_info: Vec<TypeInfo>,
}

// ---------------------------------------------------------------------------
// Table addressing
// ---------------------------------------------------------------------------

/// Schema-qualified physical table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableLocator {
    pub schema: Option<String>,
    pub table: String,
}

impl TableLocator {
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            schema: None,
            table: table.into(),
        }
    }

    #[must_use]
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Table of a component, named after the component.
    #[must_use]
    pub fn for_component(locator: &Locator) -> Self {
        Self::new(locator.persistent_table())
    }

    /// Sibling table sharing the schema, with `suffix` appended to the name.
    #[must_use]
    pub fn suffixed(&self, suffix: &str) -> Self {
        Self {
            schema: self.schema.clone(),
            table: format!("{}{suffix}", self.table),
        }
    }
}

impl fmt::Display for TableLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{schema}.{}", self.table),
            None => f.write_str(&self.table),
        }
    }
}

// ---------------------------------------------------------------------------
// Query results
// ---------------------------------------------------------------------------

/// Materialised result of a query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    /// Best guess at each column's type from its first non-null value.
    #[must_use]
    pub fn column_types(&self) -> Vec<ValueType> {
        (0..self.columns.len())
            .map(|i| {
                self.rows
                    .iter()
                    .find_map(|r| r.get(i).and_then(Value::value_type))
                    .unwrap_or_default()
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// A relational backend.
///
/// Implementations must be `Send + Sync` for use behind
/// `Arc<dyn SqlConnection>`; a connection is still owned by one load at a
/// time.
pub trait SqlConnection: Send + Sync {
    /// Product name, identifier quote and type list of the backend.
    fn metadata(&self) -> &DatabaseMetadata;

    /// Execute one statement, returning the number of affected rows.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sql`](crate::StoreError::Sql) carrying `sql`.
    fn execute(&self, sql: &str, params: &[Value]) -> Result<usize>;

    /// Execute `sql` once per parameter row as one batch.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sql`](crate::StoreError::Sql) carrying `sql`.
    /// Whether earlier rows of a failed batch are kept is backend defined.
    fn execute_batch(&self, sql: &str, rows: &[Vec<Value>]) -> Result<usize>;

    /// Run a query and materialise its result.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sql`](crate::StoreError::Sql) carrying `sql`.
    fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Column names of `table`, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`](crate::StoreError) on backend failure.
    fn table_columns(&self, table: &TableLocator) -> Result<Option<Vec<String>>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tributary_types::ComponentKind;

    #[test]
    fn table_locator_display_includes_schema() {
        let loc = TableLocator::new("orders").with_schema("stage");
        assert_eq!(loc.to_string(), "stage.orders");
        assert_eq!(loc.suffixed("_tmp").to_string(), "stage.orders_tmp");
    }

    #[test]
    fn table_locator_for_component_uses_persistent_name() {
        let loc = Locator::new("p", ComponentKind::Load, "Daily Sales");
        assert_eq!(TableLocator::for_component(&loc).table, "daily_sales");
    }

    #[test]
    fn column_types_skip_nulls() {
        let result = QueryResult {
            columns: vec!["a".into(), "b".into()],
            rows: vec![
                vec![Value::Null, Value::from("x")],
                vec![Value::Int(3), Value::Null],
            ],
        };
        assert_eq!(result.column_types(), vec![ValueType::Integer, ValueType::Text]);
    }

    #[test]
    fn sql_connection_is_object_safe() {
        fn _assert(_: &dyn SqlConnection) {}
    }
}
