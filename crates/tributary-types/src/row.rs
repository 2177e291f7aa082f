//! Row / column model.
//!
//! A [`Row`] pairs a shared, immutable-by-convention [`Schema`] with the
//! values of one record. Every structural change to a schema assigns it a
//! fresh epoch from a process-wide counter, so consumers that cache
//! per-schema state (bindings, projections) can detect a changed column
//! set by comparing epochs instead of object identity.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{EtlError, Result};
use crate::mode::UpdateMode;
use crate::value::{Value, ValueType};

static NEXT_EPOCH: AtomicU64 = AtomicU64::new(1);

fn next_epoch() -> u64 {
    NEXT_EPOCH.fetch_add(1, Ordering::Relaxed)
}

// ---------------------------------------------------------------------------
// Column definitions
// ---------------------------------------------------------------------------

/// What a column means to its consumers.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum NodeKind {
    /// Plain column as produced by an extract.
    #[default]
    Column,
    /// Reference to a dimension member.
    Coordinate,
    /// Measure. `normalize` names the implicit output column that measure
    /// normalization produces from it.
    Value {
        #[serde(default)]
        normalize: Option<String>,
    },
    /// Tree level with an optional weight column.
    Level {
        #[serde(default)]
        weight: Option<String>,
    },
    /// Attribute belonging to a level.
    Attribute {
        #[serde(default)]
        level: Option<String>,
    },
    /// Column of a relational target with its upsert role.
    Relational {
        #[serde(default)]
        role: UpdateMode,
    },
}

impl NodeKind {
    #[must_use]
    pub fn node_type(&self) -> NodeType {
        match self {
            Self::Column => NodeType::Column,
            Self::Coordinate => NodeType::Coordinate,
            Self::Value { .. } => NodeType::Value,
            Self::Level { .. } => NodeType::Level,
            Self::Attribute { .. } => NodeType::Attribute,
            Self::Relational { .. } => NodeType::Relational,
        }
    }
}

/// Data-less discriminant of [`NodeKind`], used for typed column views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeType {
    Column,
    Coordinate,
    Value,
    Level,
    Attribute,
    Relational,
}

/// Where a column gets its value from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnSource {
    /// Bound at runtime to the named upstream column or function.
    Input(String),
    /// Fixed value, never bound.
    Constant(Value),
}

/// Definition of a single named column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(default)]
    pub kind: NodeKind,
    pub source: ColumnSource,
    #[serde(default)]
    pub value_type: ValueType,
}

impl ColumnDef {
    /// A plain column bound to an input of the same name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            source: ColumnSource::Input(name.clone()),
            name,
            kind: NodeKind::Column,
            value_type: ValueType::Text,
        }
    }

    #[must_use]
    pub fn with_kind(mut self, kind: NodeKind) -> Self {
        self.kind = kind;
        self
    }

    #[must_use]
    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.source = ColumnSource::Input(input.into());
        self
    }

    #[must_use]
    pub fn with_constant(mut self, value: impl Into<Value>) -> Self {
        self.source = ColumnSource::Constant(value.into());
        self
    }

    #[must_use]
    pub fn with_type(mut self, value_type: ValueType) -> Self {
        self.value_type = value_type;
        self
    }

    /// Name of the bound input, `None` for constant columns.
    #[must_use]
    pub fn input_name(&self) -> Option<&str> {
        match &self.source {
            ColumnSource::Input(name) => Some(name),
            ColumnSource::Constant(_) => None,
        }
    }

    #[must_use]
    pub fn is_constant(&self) -> bool {
        matches!(self.source, ColumnSource::Constant(_))
    }

    /// Value a fresh row starts with for this column.
    #[must_use]
    pub fn initial_value(&self) -> Value {
        match &self.source {
            ColumnSource::Constant(v) => v.clone(),
            ColumnSource::Input(_) => Value::Null,
        }
    }
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// Ordered, uniquely named column set.
#[derive(Debug, Clone)]
pub struct Schema {
    epoch: u64,
    columns: Vec<ColumnDef>,
    index: HashMap<String, usize>,
}

impl Schema {
    /// # Errors
    ///
    /// Returns [`EtlError::Configuration`] on a duplicate column name.
    pub fn new(columns: Vec<ColumnDef>) -> Result<Self> {
        let mut index = HashMap::with_capacity(columns.len());
        for (i, column) in columns.iter().enumerate() {
            if index.insert(column.name.clone(), i).is_some() {
                return Err(duplicate_column(&column.name));
            }
        }
        Ok(Self {
            epoch: next_epoch(),
            columns,
            index,
        })
    }

    #[must_use]
    pub fn empty() -> Self {
        Self {
            epoch: next_epoch(),
            columns: Vec::new(),
            index: HashMap::new(),
        }
    }

    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    #[must_use]
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.index_of(name).map(|i| &self.columns[i])
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    fn push(&mut self, column: ColumnDef) -> Result<usize> {
        if self.index.contains_key(&column.name) {
            return Err(duplicate_column(&column.name));
        }
        let idx = self.columns.len();
        self.index.insert(column.name.clone(), idx);
        self.columns.push(column);
        self.epoch = next_epoch();
        Ok(idx)
    }

    fn remove(&mut self, name: &str) -> Option<(usize, ColumnDef)> {
        let idx = self.index.remove(name)?;
        let column = self.columns.remove(idx);
        for (i, c) in self.columns.iter().enumerate().skip(idx) {
            self.index.insert(c.name.clone(), i);
        }
        self.epoch = next_epoch();
        Some((idx, column))
    }
}

fn duplicate_column(name: &str) -> EtlError {
    EtlError::configuration(format!("Duplicate column name '{name}'"))
}

// ---------------------------------------------------------------------------
// Row
// ---------------------------------------------------------------------------

/// One record: a shared schema plus its values.
#[derive(Debug, Clone)]
pub struct Row {
    schema: Arc<Schema>,
    values: Vec<Value>,
}

impl Row {
    /// Row over `schema` with every column at its initial value.
    #[must_use]
    pub fn new(schema: Arc<Schema>) -> Self {
        let values = schema.columns.iter().map(ColumnDef::initial_value).collect();
        Self { schema, values }
    }

    /// # Errors
    ///
    /// Returns [`EtlError::Configuration`] on a duplicate column name.
    pub fn from_columns(columns: Vec<ColumnDef>) -> Result<Self> {
        Ok(Self::new(Arc::new(Schema::new(columns)?)))
    }

    /// Row over the same schema carrying `values`.
    ///
    /// # Errors
    ///
    /// Returns [`EtlError::Runtime`] if the value count does not match.
    pub fn with_values(&self, values: Vec<Value>) -> Result<Self> {
        if values.len() != self.schema.len() {
            return Err(EtlError::runtime(format!(
                "row has {} columns but {} values were supplied",
                self.schema.len(),
                values.len()
            )));
        }
        Ok(Self {
            schema: Arc::clone(&self.schema),
            values,
        })
    }

    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.schema.epoch
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Append a column. Changes the schema epoch.
    ///
    /// # Errors
    ///
    /// Returns [`EtlError::Configuration`] if the name is already taken.
    pub fn add_column(&mut self, column: ColumnDef) -> Result<usize> {
        let initial = column.initial_value();
        let idx = Arc::make_mut(&mut self.schema).push(column)?;
        self.values.push(initial);
        Ok(idx)
    }

    /// Remove a column by name. Changes the schema epoch.
    pub fn remove_column(&mut self, name: &str) -> Option<ColumnDef> {
        self.schema.index_of(name)?;
        let (idx, column) = Arc::make_mut(&mut self.schema).remove(name)?;
        self.values.remove(idx);
        Some(column)
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.schema.column(name)
    }

    /// Column at a 0-based position.
    #[must_use]
    pub fn column_at(&self, index: usize) -> Option<&ColumnDef> {
        self.schema.columns.get(index)
    }

    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.schema.index_of(name)
    }

    /// Columns of one node type, in row order.
    #[must_use]
    pub fn columns_of(&self, node_type: NodeType) -> Vec<&ColumnDef> {
        self.schema
            .columns
            .iter()
            .filter(|c| c.kind.node_type() == node_type)
            .collect()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.schema.names()
    }

    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    #[must_use]
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    #[must_use]
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.index_of(name).map(|i| &self.values[i])
    }

    #[must_use]
    pub fn value_at(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// # Errors
    ///
    /// Returns [`EtlError::Runtime`] if the column does not exist.
    pub fn set_value(&mut self, name: &str, value: Value) -> Result<()> {
        let idx = self
            .index_of(name)
            .ok_or_else(|| EtlError::runtime(format!("Column '{name}' not found in row")))?;
        self.values[idx] = value;
        Ok(())
    }

    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn set_value_at(&mut self, index: usize, value: Value) {
        self.values[index] = value;
    }

    /// Copy sharing the schema. Binding state keyed by epoch stays valid.
    #[must_use]
    pub fn shallow_clone(&self) -> Self {
        self.clone()
    }

    /// Copy with its own schema and a fresh epoch, so that bindings made
    /// against the copy never alias bindings made against the original.
    #[must_use]
    pub fn deep_clone(&self) -> Self {
        let mut schema = Schema::clone(&self.schema);
        schema.epoch = next_epoch();
        Self {
            schema: Arc::new(schema),
            values: self.values.clone(),
        }
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.names().zip(&self.values).enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Row {
        Row::from_columns(vec![
            ColumnDef::new("id").with_kind(NodeKind::Coordinate),
            ColumnDef::new("amount").with_kind(NodeKind::Value { normalize: None }),
            ColumnDef::new("region").with_constant("EU"),
        ])
        .unwrap()
    }

    #[test]
    fn duplicate_column_is_configuration_error() {
        let mut row = sample();
        let err = row.add_column(ColumnDef::new("id")).unwrap_err();
        assert!(matches!(err, EtlError::Configuration(_)));
        assert_eq!(row.len(), 3);
    }

    #[test]
    fn add_column_changes_epoch() {
        let mut row = sample();
        let before = row.epoch();
        row.add_column(ColumnDef::new("extra")).unwrap();
        assert_ne!(row.epoch(), before);
        assert_eq!(row.index_of("extra"), Some(3));
    }

    #[test]
    fn add_column_does_not_touch_shared_schema() {
        let original = sample();
        let mut copy = original.shallow_clone();
        copy.add_column(ColumnDef::new("extra")).unwrap();
        assert_eq!(original.len(), 3);
        assert!(original.column("extra").is_none());
    }

    #[test]
    fn shallow_clone_keeps_epoch_deep_clone_does_not() {
        let row = sample();
        assert_eq!(row.shallow_clone().epoch(), row.epoch());
        let deep = row.deep_clone();
        assert_ne!(deep.epoch(), row.epoch());
        assert_eq!(deep.values(), row.values());
    }

    #[test]
    fn constant_columns_start_with_their_value() {
        let row = sample();
        assert_eq!(row.value("region"), Some(&Value::from("EU")));
        assert!(row.column("region").unwrap().input_name().is_none());
        assert_eq!(row.column("id").unwrap().input_name(), Some("id"));
    }

    #[test]
    fn columns_of_filters_by_node_type() {
        let row = sample();
        let values: Vec<&str> = row
            .columns_of(NodeType::Value)
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(values, vec!["amount"]);
    }

    #[test]
    fn remove_column_reindexes() {
        let mut row = sample();
        row.remove_column("id").unwrap();
        assert_eq!(row.index_of("amount"), Some(0));
        assert_eq!(row.column_at(1).unwrap().name, "region");
        assert_eq!(row.len(), 2);
    }

    #[test]
    fn with_values_checks_length() {
        let row = sample();
        assert!(row.with_values(vec![Value::Int(1)]).is_err());
        let full = row
            .with_values(vec![Value::Int(1), Value::Double(2.0), Value::from("US")])
            .unwrap();
        assert_eq!(full.to_string(), "id=1, amount=2, region=US");
    }
}
