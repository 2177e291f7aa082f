//! Backend dialects and metadata-driven type mapping.

use std::collections::HashMap;

use tributary_types::ValueType;

use crate::connection::{DatabaseMetadata, SqlType};

/// Key of the fallback entry every type lookup must contain.
pub const DEFAULT_TYPE: &str = "default";

/// Backend-specific SQL details the generic persistor cannot derive from
/// metadata alone.
pub trait Dialect: Send + Sync {
    fn name(&self) -> &'static str;

    /// Internal value type name to SQL type. Must contain [`DEFAULT_TYPE`].
    fn type_lookup(&self) -> HashMap<String, SqlType>;

    /// Column definition of an auto-generated integer primary key.
    fn generated_key(&self, escaped_column: &str) -> String;
}

/// Baseline ANSI dialect.
#[derive(Debug, Default, Clone, Copy)]
pub struct GenericDialect;

impl Dialect for GenericDialect {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn type_lookup(&self) -> HashMap<String, SqlType> {
        HashMap::from([
            (ValueType::Boolean.as_str().to_string(), SqlType::Boolean),
            (ValueType::Integer.as_str().to_string(), SqlType::BigInt),
            (ValueType::Double.as_str().to_string(), SqlType::Double),
            (ValueType::Text.as_str().to_string(), SqlType::Varchar),
            (DEFAULT_TYPE.to_string(), SqlType::Varchar),
        ])
    }

    fn generated_key(&self, escaped_column: &str) -> String {
        format!("{escaped_column} BIGINT GENERATED ALWAYS AS IDENTITY PRIMARY KEY")
    }
}

/// `SQLite` refinements: booleans are integers, keys use `AUTOINCREMENT`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn type_lookup(&self) -> HashMap<String, SqlType> {
        let mut lookup = GenericDialect.type_lookup();
        lookup.insert(ValueType::Boolean.as_str().to_string(), SqlType::Integer);
        lookup
    }

    fn generated_key(&self, escaped_column: &str) -> String {
        format!("{escaped_column} INTEGER PRIMARY KEY AUTOINCREMENT")
    }
}

/// Pick a dialect from the backend's product name.
#[must_use]
pub fn dialect_for(product_name: &str) -> Box<dyn Dialect> {
    if product_name.eq_ignore_ascii_case("sqlite") {
        Box::new(SqliteDialect)
    } else {
        tracing::debug!(product = product_name, "No specific dialect, using generic SQL");
        Box::new(GenericDialect)
    }
}

/// Resolved backend column type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnType {
    pub type_name: String,
    pub sql_type: SqlType,
}

/// Maps internal value type names to backend column types.
///
/// The backend type name is the first entry of the metadata type list with
/// the wanted SQL type, falling back to its ANSI name.
#[derive(Debug, Clone)]
pub struct MetadataModule {
    lookup: HashMap<String, SqlType>,
    backend_names: HashMap<SqlType, String>,
}

impl MetadataModule {
    #[must_use]
    pub fn new(dialect: &dyn Dialect, metadata: &DatabaseMetadata) -> Self {
        Self::from_lookup(dialect.type_lookup(), metadata)
    }

    #[must_use]
    pub fn from_lookup(lookup: HashMap<String, SqlType>, metadata: &DatabaseMetadata) -> Self {
        let mut backend_names = HashMap::new();
        for info in &metadata.type_info {
            backend_names
                .entry(info.sql_type)
                .or_insert_with(|| info.type_name.clone());
        }
        Self {
            lookup,
            backend_names,
        }
    }

    /// Column type for `value_type`, using the `default` entry for unmapped
    /// names. Without a default entry the miss is logged and `None` is
    /// returned, leaving the column untyped.
    #[must_use]
    pub fn column_type(&self, value_type: &str) -> Option<ColumnType> {
        let sql_type = match self.lookup.get(value_type).or_else(|| self.lookup.get(DEFAULT_TYPE)) {
            Some(t) => *t,
            None => {
                tracing::error!(
                    value_type,
                    "No type mapping and no default mapping found, column is left untyped"
                );
                return None;
            }
        };
        let type_name = self
            .backend_names
            .get(&sql_type)
            .cloned()
            .unwrap_or_else(|| sql_type.ansi_name().to_string());
        Some(ColumnType {
            type_name,
            sql_type,
        })
    }
}
