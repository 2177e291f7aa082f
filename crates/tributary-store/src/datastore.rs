//! Relational datastore applying a [`PersistorDefinition`].
//!
//! Opening a datastore prepares the target table for the write mode;
//! [`Datastore::write`] routes each row to the statement the effective
//! mode needs and [`Datastore::commit`] finishes the write, including the
//! SQL-side aggregation of bulk mode.

use std::sync::Arc;

use tributary_types::{AggregateMode, ColumnDef, LoadMode, Row, UpdateMode, Value};

use crate::connection::{SqlConnection, TableLocator};
use crate::definition::{internal_name, role_of, PersistorDefinition, INTERNAL_KEY};
use crate::error::Result;
use crate::persistor::GenericPersistor;

pub struct Datastore {
    persistor: GenericPersistor,
    definition: PersistorDefinition,
    columns: Vec<ColumnDef>,
    keys: Vec<ColumnDef>,
    to_set: Vec<ColumnDef>,
    mode: LoadMode,
    temporary: TableLocator,
    initial_rows: u64,
    rows_written: u64,
}

impl Datastore {
    /// Prepare the target table of `definition` for writing.
    ///
    /// Without aggregation the modes `create`, `add`, `insert` and `update`
    /// are downgraded to `fill`. Bulk aggregation stages the existing table
    /// content in a temporary table with a generated key.
    ///
    /// # Errors
    ///
    /// Returns the backend error of any preparation statement.
    pub fn open(conn: Arc<dyn SqlConnection>, definition: PersistorDefinition) -> Result<Self> {
        let mut persistor = GenericPersistor::new(conn);
        persistor.set_bulk_size(definition.bulk_size());
        persistor.set_logging(definition.is_logging());
        let temporary = definition.locator().suffixed(&internal_name("temporary"));
        let mut store = Self {
            persistor,
            mode: definition.mode(),
            columns: definition.column_definition(),
            keys: definition.keys(),
            to_set: definition.to_set(),
            definition,
            temporary,
            initial_rows: 0,
            rows_written: 0,
        };
        store.check_compatibility();
        store.set_writeable()?;
        Ok(store)
    }

    fn check_compatibility(&self) {
        if self.definition.primary_key().is_some() {
            tracing::warn!(table = %self.definition.locator(), "Settings for primary key not supported");
        }
    }

    /// Definition columns, prefixed by the generated key when configured.
    fn external_columns(&self) -> Vec<ColumnDef> {
        let definition = self.definition.column_definition();
        let mut columns = Vec::with_capacity(definition.len() + 1);
        if self.definition.create_key_column() && !definition.iter().any(|c| c.name == INTERNAL_KEY) {
            columns.push(ColumnDef::new(INTERNAL_KEY));
        }
        columns.extend(definition);
        columns
    }

    /// Definition columns, always prefixed by the generated key.
    fn internal_columns(&self) -> Vec<ColumnDef> {
        let definition = self.definition.column_definition();
        let mut columns = Vec::with_capacity(definition.len() + 1);
        if !definition.iter().any(|c| c.name == INTERNAL_KEY) {
            columns.push(ColumnDef::new(INTERNAL_KEY));
        }
        columns.extend(definition);
        columns
    }

    fn set_writeable(&mut self) -> Result<()> {
        let target = self.definition.locator().clone();
        let external = self.external_columns();
        match self.mode {
            LoadMode::Create => self.persistor.create_table(&target, &external)?,
            LoadMode::Temporary => {
                self.persistor.drop_table(&target)?;
                self.persistor.ensure_table(&target, &external)?;
            }
            LoadMode::Update => {
                self.persistor.ensure_table(&target, &external)?;
                self.persistor.delete(&target, &[])?;
            }
            LoadMode::Delete => {}
            LoadMode::Add | LoadMode::Insert | LoadMode::Fill => {
                self.persistor.ensure_table(&target, &external)?;
            }
        }
        if self.mode != LoadMode::Delete {
            self.initial_rows = self.persistor.row_count(&target)?;
        }

        if !self.definition.does_aggregate()
            && matches!(
                self.mode,
                LoadMode::Create | LoadMode::Add | LoadMode::Insert | LoadMode::Update
            )
        {
            tracing::debug!(table = %target, mode = %self.mode, "No aggregation, writing in mode fill");
            self.mode = LoadMode::Fill;
        }

        if self.is_bulk_aggregating() {
            let internal = self.internal_columns();
            let existing = self.persistor.table_columns(&target)?.unwrap_or_default();
            if existing.iter().any(|c| c == INTERNAL_KEY) {
                self.persistor.rename_table(&target, &self.temporary, &internal, true)?;
            } else {
                self.persistor.copy_table(&target, &self.temporary, &internal)?;
            }
        }
        Ok(())
    }

    /// Key columns, or every column when no column has the key role.
    fn logical_keys(&self) -> &[ColumnDef] {
        if self.keys.is_empty() {
            &self.columns
        } else {
            &self.keys
        }
    }

    fn is_bulk_aggregating(&self) -> bool {
        !matches!(self.mode, LoadMode::Fill | LoadMode::Temporary | LoadMode::Delete)
            && self.definition.aggregate() == AggregateMode::Bulk
    }

    /// Mode actually used after the aggregation downgrade.
    #[must_use]
    pub fn effective_mode(&self) -> LoadMode {
        self.mode
    }

    #[must_use]
    pub fn definition(&self) -> &PersistorDefinition {
        &self.definition
    }

    #[must_use]
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Write one row.
    ///
    /// # Errors
    ///
    /// Returns the backend error of the statement or batch.
    pub fn write(&mut self, row: &Row) -> Result<()> {
        let target = self.definition.locator().clone();
        let columns = &self.columns;
        match self.mode {
            LoadMode::Delete => {
                let criteria: Vec<(String, Value)> = self
                    .logical_keys()
                    .iter()
                    .map(|k| (k.name.clone(), row.value(&k.name).cloned().unwrap_or(Value::Null)))
                    .collect();
                self.persistor.delete(&target, &criteria)?;
            }
            LoadMode::Fill | LoadMode::Temporary => self.persistor.insert(&target, columns, row)?,
            _ => match self.definition.aggregate() {
                AggregateMode::Bulk => self.persistor.insert(&self.temporary, columns, row)?,
                AggregateMode::Row => {
                    self.persistor
                        .update(&target, &self.keys, &self.to_set, columns, row)?;
                }
                AggregateMode::None => self.persistor.insert(&target, columns, row)?,
            },
        }
        self.rows_written += 1;
        Ok(())
    }

    /// Finish the write and return the resulting row count of the target.
    ///
    /// # Errors
    ///
    /// Returns the backend error of the final batches or the aggregation.
    pub fn commit(&mut self) -> Result<u64> {
        let target = self.definition.locator().clone();
        if self.is_bulk_aggregating() {
            let temporary = self.temporary.clone();
            self.persistor.commit(&temporary)?;
            let external = self.external_columns();
            self.persistor.ensure_table(&target, &external)?;
            self.persistor.delete(&target, &[])?;
            let sql = self.aggregated_copy_sql(&temporary, &target);
            let inserted = self.persistor.execute(&sql)?;
            tracing::debug!(sql, inserted, "Copied aggregated rows");
            self.persistor.drop_table(&temporary)?;
        }
        self.persistor.commit(&target)?;
        let count = if self.mode == LoadMode::Delete {
            self.persistor.row_count(&target).unwrap_or(0)
        } else {
            self.persistor.row_count(&target)?
        };
        if self.definition.is_logging() {
            tracing::info!(
                table = %target,
                from = self.initial_rows,
                to = count,
                "Number of rows in table changed"
            );
        } else {
            tracing::debug!(table = %target, rows = count, "Rows in datastore");
        }
        Ok(count)
    }

    /// `INSERT .. SELECT` combining all staged rows per key: aggregate
    /// roles use their SQL function, `last` takes the row with the highest
    /// generated key and `first` the row with the lowest.
    fn aggregated_copy_sql(&self, source: &TableLocator, target: &TableLocator) -> String {
        let p = &self.persistor;
        let source_name = p.persistent_name(source);
        let key = p.escape_name(INTERNAL_KEY);
        let max_id = p.escape_name(&internal_name("maxID"));
        let min_id = p.escape_name(&internal_name("minID"));
        let columns = self.definition.column_definition();

        let mut names = Vec::new();
        let mut selects = Vec::new();
        let mut aggregates = Vec::new();
        let mut groups = Vec::new();
        let (mut puts, mut keeps) = (false, false);
        for c in &columns {
            let name = p.escape_name(&c.name);
            let internal = p.escape_name(&internal_name(&c.name));
            let role = role_of(c);
            names.push(name.clone());
            match role {
                UpdateMode::Key => {
                    selects.push(format!("a.{name}"));
                    aggregates.push(name.clone());
                    groups.push(name);
                }
                UpdateMode::Sum | UpdateMode::Min | UpdateMode::Max | UpdateMode::Count | UpdateMode::Avg => {
                    selects.push(format!("a.{internal}"));
                    aggregates.push(format!("{}({name}) AS {internal}", role.aggregate_function()));
                }
                UpdateMode::Last => {
                    puts = true;
                    selects.push(format!("p.{name}"));
                }
                UpdateMode::First => {
                    keeps = true;
                    selects.push(format!("k.{name}"));
                }
            }
        }
        let mut joins = String::new();
        if puts {
            aggregates.push(format!("MAX({key}) AS {max_id}"));
            joins.push_str(&format!(" INNER JOIN {source_name} p ON a.{max_id} = p.{key}"));
        }
        if keeps {
            aggregates.push(format!("MIN({key}) AS {min_id}"));
            joins.push_str(&format!(" INNER JOIN {source_name} k ON a.{min_id} = k.{key}"));
        }
        format!(
            "INSERT INTO {} ({}) SELECT {} FROM (SELECT {} FROM {source_name} GROUP BY {}) a{joins}",
            p.persistent_name(target),
            names.join(", "),
            selects.join(", "),
            aggregates.join(", "),
            groups.join(", "),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::SqliteConnection;
    use tributary_types::ValueType;

    fn input() -> Row {
        Row::from_columns(vec![
            ColumnDef::new("region"),
            ColumnDef::new("amount").with_type(ValueType::Double),
            ColumnDef::new("label"),
            ColumnDef::new("origin"),
        ])
        .unwrap()
    }

    fn row(region: &str, amount: f64, label: &str) -> Row {
        input()
            .with_values(vec![
                Value::from(region),
                Value::Double(amount),
                Value::from(label),
                Value::from(label),
            ])
            .unwrap()
    }

    fn definition(mode: LoadMode, aggregate: AggregateMode) -> PersistorDefinition {
        let mut d = PersistorDefinition::new(TableLocator::new("sales"), mode)
            .with_aggregate(aggregate)
            .with_bulk_size(2);
        d.set_input(&input());
        d.set_role("region", UpdateMode::Key);
        d.set_role("amount", UpdateMode::Sum);
        d.set_role("label", UpdateMode::Last);
        d.set_role("origin", UpdateMode::First);
        d
    }

    fn conn() -> Arc<dyn SqlConnection> {
        Arc::new(SqliteConnection::in_memory().unwrap())
    }

    fn write_all(store: &mut Datastore, rows: &[Row]) {
        for r in rows {
            store.write(r).unwrap();
        }
    }

    fn contents(conn: &Arc<dyn SqlConnection>) -> Vec<Vec<Value>> {
        conn.query(
            "SELECT region, amount, label, origin FROM sales ORDER BY region",
            &[],
        )
        .unwrap()
        .rows
    }

    #[test]
    fn without_aggregation_modes_become_fill() {
        let store = Datastore::open(conn(), definition(LoadMode::Insert, AggregateMode::None)).unwrap();
        assert_eq!(store.effective_mode(), LoadMode::Fill);
    }

    #[test]
    fn fill_writes_every_row() {
        let conn = conn();
        let mut store = Datastore::open(Arc::clone(&conn), definition(LoadMode::Create, AggregateMode::None)).unwrap();
        write_all(&mut store, &[row("EU", 1.0, "a"), row("EU", 2.0, "b"), row("US", 3.0, "c")]);
        assert_eq!(store.commit().unwrap(), 3);
    }

    #[test]
    fn bulk_aggregation_combines_rows_per_key() {
        let conn = conn();
        let mut store =
            Datastore::open(Arc::clone(&conn), definition(LoadMode::Create, AggregateMode::Bulk)).unwrap();
        assert_eq!(store.effective_mode(), LoadMode::Create);
        write_all(&mut store, &[row("EU", 1.0, "a"), row("US", 3.0, "c"), row("EU", 2.0, "b")]);
        assert_eq!(store.commit().unwrap(), 2);
        assert_eq!(
            contents(&conn),
            vec![
                vec![Value::from("EU"), Value::Double(3.0), Value::from("b"), Value::from("a")],
                vec![Value::from("US"), Value::Double(3.0), Value::from("c"), Value::from("c")],
            ]
        );
        assert!(conn
            .table_columns(&TableLocator::new("sales").suffixed(&internal_name("temporary")))
            .unwrap()
            .is_none());
    }

    #[test]
    fn bulk_add_merges_with_existing_content() {
        let conn = conn();
        let mut first =
            Datastore::open(Arc::clone(&conn), definition(LoadMode::Create, AggregateMode::Bulk)).unwrap();
        write_all(&mut first, &[row("EU", 1.0, "a")]);
        first.commit().unwrap();

        let mut second =
            Datastore::open(Arc::clone(&conn), definition(LoadMode::Add, AggregateMode::Bulk)).unwrap();
        write_all(&mut second, &[row("EU", 4.0, "z")]);
        assert_eq!(second.commit().unwrap(), 1);
        assert_eq!(
            contents(&conn),
            vec![vec![Value::from("EU"), Value::Double(5.0), Value::from("z"), Value::from("a")]]
        );
    }

    #[test]
    fn row_aggregation_updates_in_place() {
        let conn = conn();
        let mut store =
            Datastore::open(Arc::clone(&conn), definition(LoadMode::Update, AggregateMode::Row)).unwrap();
        write_all(&mut store, &[row("EU", 1.0, "a"), row("EU", 2.0, "b")]);
        assert_eq!(store.commit().unwrap(), 1);
        let rows = contents(&conn);
        assert_eq!(rows[0][1], Value::Double(3.0));
        assert_eq!(rows[0][2], Value::from("b"));
    }

    #[test]
    fn delete_mode_removes_matching_keys() {
        let conn = conn();
        let mut fill = Datastore::open(Arc::clone(&conn), definition(LoadMode::Create, AggregateMode::None)).unwrap();
        write_all(&mut fill, &[row("EU", 1.0, "a"), row("US", 3.0, "c")]);
        fill.commit().unwrap();

        let mut delete =
            Datastore::open(Arc::clone(&conn), definition(LoadMode::Delete, AggregateMode::None)).unwrap();
        write_all(&mut delete, &[row("EU", 0.0, "")]);
        assert_eq!(delete.commit().unwrap(), 1);
    }

    #[test]
    fn delete_without_key_roles_matches_every_column() {
        let conn = conn();
        let plain = |mode| {
            let mut d = PersistorDefinition::new(TableLocator::new("sales"), mode);
            d.set_input(&input());
            d
        };
        let mut fill = Datastore::open(Arc::clone(&conn), plain(LoadMode::Create)).unwrap();
        write_all(&mut fill, &[row("EU", 1.0, "a"), row("EU", 2.0, "b"), row("US", 3.0, "c")]);
        assert_eq!(fill.commit().unwrap(), 3);

        let mut delete = Datastore::open(Arc::clone(&conn), plain(LoadMode::Delete)).unwrap();
        write_all(&mut delete, &[row("EU", 1.0, "a")]);
        assert_eq!(delete.commit().unwrap(), 2);
        let labels: Vec<Value> = contents(&conn).into_iter().map(|r| r[2].clone()).collect();
        assert_eq!(labels, vec![Value::from("b"), Value::from("c")]);
    }

    #[test]
    fn update_mode_clears_existing_rows() {
        let conn = conn();
        let mut fill = Datastore::open(Arc::clone(&conn), definition(LoadMode::Create, AggregateMode::None)).unwrap();
        write_all(&mut fill, &[row("EU", 1.0, "a"), row("US", 3.0, "c")]);
        fill.commit().unwrap();

        let mut update =
            Datastore::open(Arc::clone(&conn), definition(LoadMode::Update, AggregateMode::None)).unwrap();
        write_all(&mut update, &[row("JP", 1.0, "x")]);
        assert_eq!(update.commit().unwrap(), 1);
    }
}
