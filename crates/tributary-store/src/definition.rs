//! Description of a single table write.

use std::collections::HashMap;

use tributary_types::{AggregateMode, ColumnDef, LoadMode, NodeKind, Row, UpdateMode, ValueType};

use crate::batch::DEFAULT_BULK_SIZE;
use crate::connection::TableLocator;

/// Name of the auto-generated key column.
pub const INTERNAL_KEY: &str = "__key";

/// Internal helper name derived from `name`, never clashing with user columns.
#[must_use]
pub fn internal_name(name: &str) -> String {
    format!("__{name}")
}

/// Target, write mode, column roles, types and batching of one table write.
///
/// Built once per load execution. Column definitions follow the input row
/// order; roles and types not configured explicitly are taken from the
/// input columns (`last` and the declared value type).
#[derive(Debug, Clone)]
pub struct PersistorDefinition {
    locator: TableLocator,
    mode: LoadMode,
    aggregate: AggregateMode,
    input: Vec<ColumnDef>,
    roles: HashMap<String, UpdateMode>,
    types: HashMap<String, ValueType>,
    bulk_size: usize,
    logging: bool,
    primary_key: Option<String>,
    create_key_column: bool,
}

impl PersistorDefinition {
    #[must_use]
    pub fn new(locator: TableLocator, mode: LoadMode) -> Self {
        Self {
            locator,
            mode,
            aggregate: AggregateMode::None,
            input: Vec::new(),
            roles: HashMap::new(),
            types: HashMap::new(),
            bulk_size: DEFAULT_BULK_SIZE,
            logging: false,
            primary_key: None,
            create_key_column: true,
        }
    }

    /// Scratch table without a generated key, recreated on every open.
    #[must_use]
    pub fn temporary(locator: TableLocator) -> Self {
        let mut definition = Self::new(locator, LoadMode::Temporary);
        definition.create_key_column = false;
        definition
    }

    /// Take the column layout from the row produced by the writing processor.
    pub fn set_input(&mut self, input: &Row) {
        self.input = input.schema().columns().to_vec();
    }

    pub fn set_role(&mut self, column: impl Into<String>, role: UpdateMode) {
        self.roles.insert(column.into(), role);
    }

    pub fn set_type(&mut self, column: impl Into<String>, value_type: ValueType) {
        self.types.insert(column.into(), value_type);
    }

    #[must_use]
    pub fn with_aggregate(mut self, aggregate: AggregateMode) -> Self {
        self.aggregate = aggregate;
        self
    }

    #[must_use]
    pub fn with_bulk_size(mut self, bulk_size: usize) -> Self {
        self.bulk_size = bulk_size;
        self
    }

    #[must_use]
    pub fn with_logging(mut self, logging: bool) -> Self {
        self.logging = logging;
        self
    }

    #[must_use]
    pub fn with_primary_key(mut self, primary_key: Option<String>) -> Self {
        self.primary_key = primary_key;
        self
    }

    #[must_use]
    pub fn with_create_key_column(mut self, create: bool) -> Self {
        self.create_key_column = create;
        self
    }

    #[must_use]
    pub fn locator(&self) -> &TableLocator {
        &self.locator
    }

    #[must_use]
    pub fn mode(&self) -> LoadMode {
        self.mode
    }

    #[must_use]
    pub fn aggregate(&self) -> AggregateMode {
        self.aggregate
    }

    #[must_use]
    pub fn bulk_size(&self) -> usize {
        self.bulk_size
    }

    #[must_use]
    pub fn is_logging(&self) -> bool {
        self.logging
    }

    #[must_use]
    pub fn primary_key(&self) -> Option<&str> {
        self.primary_key.as_deref()
    }

    #[must_use]
    pub fn create_key_column(&self) -> bool {
        self.create_key_column
    }

    /// Relational columns with their effective role and type.
    #[must_use]
    pub fn column_definition(&self) -> Vec<ColumnDef> {
        self.input
            .iter()
            .map(|c| {
                let role = self.roles.get(&c.name).copied().unwrap_or(match c.kind {
                    NodeKind::Relational { role } => role,
                    _ => UpdateMode::default(),
                });
                let value_type = self.types.get(&c.name).copied().unwrap_or(c.value_type);
                ColumnDef::new(&c.name)
                    .with_kind(NodeKind::Relational { role })
                    .with_type(value_type)
            })
            .collect()
    }

    fn columns_with(&self, pred: impl Fn(UpdateMode) -> bool) -> Vec<ColumnDef> {
        self.column_definition()
            .into_iter()
            .filter(|c| matches!(c.kind, NodeKind::Relational { role } if pred(role)))
            .collect()
    }

    /// Columns acting as the logical key.
    #[must_use]
    pub fn keys(&self) -> Vec<ColumnDef> {
        self.columns_with(|r| r == UpdateMode::Key)
    }

    /// Columns recomputed from incoming rows.
    #[must_use]
    pub fn to_set(&self) -> Vec<ColumnDef> {
        self.columns_with(UpdateMode::is_set)
    }

    /// Columns keeping their first value.
    #[must_use]
    pub fn to_keep(&self) -> Vec<ColumnDef> {
        self.columns_with(|r| r == UpdateMode::First)
    }

    /// Whether rows sharing a key have to be combined.
    #[must_use]
    pub fn does_aggregate(&self) -> bool {
        self.aggregate != AggregateMode::None
            && !self.keys().is_empty()
            && (!self.to_set().is_empty() || !self.to_keep().is_empty())
    }
}

/// Role of a relational column definition.
#[must_use]
pub fn role_of(column: &ColumnDef) -> UpdateMode {
    match column.kind {
        NodeKind::Relational { role } => role,
        _ => UpdateMode::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> Row {
        Row::from_columns(vec![
            ColumnDef::new("region"),
            ColumnDef::new("product"),
            ColumnDef::new("amount").with_type(ValueType::Double),
            ColumnDef::new("first_seen"),
        ])
        .unwrap()
    }

    fn definition(aggregate: AggregateMode) -> PersistorDefinition {
        let mut d = PersistorDefinition::new(TableLocator::new("sales"), LoadMode::Add)
            .with_aggregate(aggregate);
        d.set_input(&input());
        d.set_role("region", UpdateMode::Key);
        d.set_role("product", UpdateMode::Key);
        d.set_role("amount", UpdateMode::Sum);
        d.set_role("first_seen", UpdateMode::First);
        d
    }

    fn names(columns: &[ColumnDef]) -> Vec<&str> {
        columns.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn partitions_columns_by_role() {
        let d = definition(AggregateMode::Bulk);
        assert_eq!(names(&d.keys()), vec!["region", "product"]);
        assert_eq!(names(&d.to_set()), vec!["amount"]);
        assert_eq!(names(&d.to_keep()), vec!["first_seen"]);
    }

    #[test]
    fn each_set_role_counted_once() {
        let mut d = definition(AggregateMode::Bulk);
        d.set_role("first_seen", UpdateMode::Sum);
        assert_eq!(names(&d.to_set()), vec!["amount", "first_seen"]);
    }

    #[test]
    fn unconfigured_roles_default_to_last() {
        let mut d = PersistorDefinition::new(TableLocator::new("t"), LoadMode::Insert);
        d.set_input(&input());
        assert!(d.keys().is_empty());
        assert_eq!(d.to_set().len(), 4);
        assert_eq!(role_of(&d.column_definition()[0]), UpdateMode::Last);
    }

    #[test]
    fn type_override_wins() {
        let mut d = definition(AggregateMode::None);
        assert_eq!(d.column_definition()[2].value_type, ValueType::Double);
        d.set_type("amount", ValueType::Integer);
        assert_eq!(d.column_definition()[2].value_type, ValueType::Integer);
    }

    #[test]
    fn aggregation_needs_mode_keys_and_values() {
        assert!(definition(AggregateMode::Bulk).does_aggregate());
        assert!(!definition(AggregateMode::None).does_aggregate());

        let mut no_keys = PersistorDefinition::new(TableLocator::new("t"), LoadMode::Add)
            .with_aggregate(AggregateMode::Row);
        no_keys.set_input(&input());
        assert!(!no_keys.does_aggregate());
    }

    #[test]
    fn temporary_has_no_key_column() {
        let d = PersistorDefinition::temporary(TableLocator::new("scratch"));
        assert_eq!(d.mode(), LoadMode::Temporary);
        assert!(!d.create_key_column());
        assert_eq!(d.bulk_size(), DEFAULT_BULK_SIZE);
    }
}
