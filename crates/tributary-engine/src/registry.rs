//! Type tag to factory lookup for connections, extracts and functions.
//!
//! A [`ComponentRegistry`] is constructed explicitly and handed to the
//! [`Executor`](crate::execution::Executor); there is no global registry.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use tributary_store::{SqlConnection, SqliteConnection};
use tributary_types::{ColumnDef, EtlError, Locator, Result, Schema, Value, ValueType};

use crate::components::{Connection, Extract};
use crate::execution::ExecutionContext;
use crate::function::builtins::{Arithmetic, ChangeCase, Concat, Constant, Lookup};
use crate::function::{FunctionKernel, FunctionSpec};
use crate::processor::{Processor, TableProcessor};

pub type ConnectionFactory = fn(&Connection, &ExecutionContext) -> Result<Arc<dyn SqlConnection>>;
pub type ExtractFactory = fn(&Extract, &ExecutionContext) -> Result<Box<dyn Processor>>;
pub type FunctionFactory = fn(&FunctionSpec, &ExecutionContext) -> Result<Box<dyn FunctionKernel>>;

/// Factories by type tag.
#[derive(Clone)]
pub struct ComponentRegistry {
    connections: BTreeMap<String, ConnectionFactory>,
    extracts: BTreeMap<String, ExtractFactory>,
    functions: BTreeMap<String, FunctionFactory>,
}

fn lookup<F: Copy>(factories: &BTreeMap<String, F>, parameter: &str, tag: &str) -> Result<F> {
    factories.get(tag).copied().ok_or_else(|| {
        let legal: Vec<&str> = factories.keys().map(String::as_str).collect();
        EtlError::illegal_value(parameter, tag, &legal)
    })
}

impl ComponentRegistry {
    /// Registry without any factory.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            connections: BTreeMap::new(),
            extracts: BTreeMap::new(),
            functions: BTreeMap::new(),
        }
    }

    /// Registry with the built-in connection, extract and function types.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register_connection("sqlite", sqlite_connection);
        registry.register_extract("inline", inline_extract);
        registry.register_extract("sql", sql_extract);
        registry.register_function("arithmetic", |spec, _| Ok(Box::new(Arithmetic::from_spec(spec)?)));
        registry.register_function("concat", |spec, _| Ok(Box::new(Concat::from_spec(spec))));
        registry.register_function("case", |spec, _| Ok(Box::new(ChangeCase::from_spec(spec)?)));
        registry.register_function("constant", |spec, _| Ok(Box::new(Constant::from_spec(spec))));
        registry.register_function("lookup", lookup_function);
        registry
    }

    pub fn register_connection(&mut self, tag: impl Into<String>, factory: ConnectionFactory) {
        self.connections.insert(tag.into(), factory);
    }

    pub fn register_extract(&mut self, tag: impl Into<String>, factory: ExtractFactory) {
        self.extracts.insert(tag.into(), factory);
    }

    pub fn register_function(&mut self, tag: impl Into<String>, factory: FunctionFactory) {
        self.functions.insert(tag.into(), factory);
    }

    /// # Errors
    ///
    /// Returns [`EtlError::Configuration`] listing the registered tags.
    pub fn connection(&self, tag: &str) -> Result<ConnectionFactory> {
        lookup(&self.connections, "connection type", tag)
    }

    /// # Errors
    ///
    /// Returns [`EtlError::Configuration`] listing the registered tags.
    pub fn extract(&self, tag: &str) -> Result<ExtractFactory> {
        lookup(&self.extracts, "extract type", tag)
    }

    /// # Errors
    ///
    /// Returns [`EtlError::Configuration`] listing the registered tags.
    pub fn function(&self, tag: &str) -> Result<FunctionFactory> {
        lookup(&self.functions, "function type", tag)
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("connections", &self.connections.keys().collect::<Vec<_>>())
            .field("extracts", &self.extracts.keys().collect::<Vec<_>>())
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Built-in factories
// ---------------------------------------------------------------------------

/// `path` names the database file; absent or `:memory:` opens a private
/// in-memory database.
fn sqlite_connection(
    connection: &Connection,
    ctx: &ExecutionContext,
) -> Result<Arc<dyn SqlConnection>> {
    let path = match connection.params.get("path") {
        Some(path) => Some(ctx.substitute(path)?),
        None => None,
    };
    let conn = match path.as_deref() {
        None | Some(":memory:") => SqliteConnection::in_memory()?,
        Some(path) => SqliteConnection::open(Path::new(path))?,
    };
    tracing::debug!(
        connection = %connection.locator,
        path = path.as_deref().unwrap_or(":memory:"),
        "Opened SQLite connection"
    );
    Ok(Arc::new(conn))
}

fn inline_extract(extract: &Extract, _ctx: &ExecutionContext) -> Result<Box<dyn Processor>> {
    let schema = Arc::new(Schema::new(extract.columns.clone())?);
    let processor = TableProcessor::from_values(
        extract.locator.to_string(),
        schema,
        extract.rows.clone(),
    )?;
    Ok(Box::new(processor))
}

/// Runs `query` on the extract's connection. Declared columns fix the type
/// of result columns of the same name; others take the type of their first
/// non-null value.
fn sql_extract(extract: &Extract, ctx: &ExecutionContext) -> Result<Box<dyn Processor>> {
    let connection = extract.connection.as_ref().ok_or_else(|| {
        EtlError::configuration(format!("{}: sql extract needs a connection", extract.locator))
    })?;
    let query = extract.query.as_deref().ok_or_else(|| {
        EtlError::configuration(format!("{}: sql extract needs a query", extract.locator))
    })?;
    let query = ctx.substitute(query)?;
    let conn = ctx.connection(connection)?;
    let result = conn.query(&query, &[])?;
    let columns = result
        .columns
        .iter()
        .enumerate()
        .map(|(i, name)| match extract.columns.iter().find(|c| c.name == *name) {
            Some(declared) => declared.clone(),
            None => {
                let inferred = result
                    .rows
                    .iter()
                    .find_map(|row| row.get(i).and_then(Value::value_type))
                    .unwrap_or(ValueType::Text);
                ColumnDef::new(name).with_type(inferred)
            }
        })
        .collect();
    tracing::debug!(
        extract = %extract.locator,
        rows = result.rows.len(),
        "Queried extract rows"
    );
    let processor = TableProcessor::from_values(
        extract.locator.to_string(),
        Arc::new(Schema::new(columns)?),
        result.rows,
    )?;
    Ok(Box::new(processor))
}

/// `source` names the component whose rows feed the lookup table.
fn lookup_function(spec: &FunctionSpec, ctx: &ExecutionContext) -> Result<Box<dyn FunctionKernel>> {
    let source = spec.param("source").ok_or_else(|| {
        EtlError::configuration(format!("Function {}: parameter 'source' is required", spec.name))
    })?;
    let locator = Locator::parse_in(ctx.project().name(), source)?;
    let processor = ctx.processor(&locator)?;
    Ok(Box::new(Lookup::new(spec, processor)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_registered() {
        let registry = ComponentRegistry::default();
        assert!(registry.connection("sqlite").is_ok());
        assert!(registry.extract("inline").is_ok());
        assert!(registry.function("lookup").is_ok());
    }

    #[test]
    fn unknown_tag_lists_registered_ones() {
        let registry = ComponentRegistry::with_builtins();
        let err = registry.extract("csv").err().unwrap();
        assert_eq!(
            err.to_string(),
            "configuration error: Illegal value 'csv' for parameter 'extract type'. \
             Legal values are: inline, sql"
        );
    }

    #[test]
    fn custom_factories_can_be_added() {
        let mut registry = ComponentRegistry::empty();
        assert!(registry.function("constant").is_err());
        registry.register_function("constant", |spec, _| Ok(Box::new(Constant::from_spec(spec))));
        assert!(registry.function("constant").is_ok());
    }
}
