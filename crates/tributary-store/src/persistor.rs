//! Generic SQL persistor.
//!
//! Turns rows into DML against any [`SqlConnection`]: table creation from
//! column definitions, batched inserts and deletes with statement reuse
//! per table, keyed updates falling back to inserts, and table copies.

use std::collections::HashMap;
use std::sync::Arc;

use tributary_types::{ColumnDef, Row, UpdateMode, Value};

use crate::batch::{StatementBatch, DEFAULT_BULK_SIZE, DEFAULT_LOG_BLOCK};
use crate::connection::{QueryResult, SqlConnection, TableLocator};
use crate::definition::{role_of, INTERNAL_KEY};
use crate::dialect::{dialect_for, Dialect, MetadataModule};
use crate::error::Result;

pub struct GenericPersistor {
    conn: Arc<dyn SqlConnection>,
    dialect: Box<dyn Dialect>,
    metadata: MetadataModule,
    quote: String,
    plain_names: bool,
    bulk_size: usize,
    logging: bool,
    log_block: u64,
    inserts: HashMap<String, StatementBatch>,
    deletes: HashMap<String, StatementBatch>,
    updates: HashMap<String, String>,
}

impl GenericPersistor {
    /// Persistor using the dialect matching the backend's product name.
    #[must_use]
    pub fn new(conn: Arc<dyn SqlConnection>) -> Self {
        let dialect = dialect_for(&conn.metadata().product_name);
        Self::with_dialect(conn, dialect)
    }

    #[must_use]
    pub fn with_dialect(conn: Arc<dyn SqlConnection>, dialect: Box<dyn Dialect>) -> Self {
        let metadata = MetadataModule::new(dialect.as_ref(), conn.metadata());
        let quote = conn.metadata().identifier_quote.clone();
        Self {
            conn,
            dialect,
            metadata,
            quote,
            plain_names: false,
            bulk_size: DEFAULT_BULK_SIZE,
            logging: false,
            log_block: DEFAULT_LOG_BLOCK,
            inserts: HashMap::new(),
            deletes: HashMap::new(),
            updates: HashMap::new(),
        }
    }

    pub fn set_bulk_size(&mut self, bulk_size: usize) {
        self.bulk_size = bulk_size;
    }

    pub fn set_logging(&mut self, logging: bool) {
        self.logging = logging;
    }

    pub fn set_log_block(&mut self, log_block: u64) {
        self.log_block = log_block;
    }

    /// Use names as given instead of quoting them. Not recommended.
    pub fn set_plain_names(&mut self, plain: bool) {
        self.plain_names = plain;
    }

    #[must_use]
    pub fn connection(&self) -> &Arc<dyn SqlConnection> {
        &self.conn
    }

    // -- naming -------------------------------------------------------------

    #[must_use]
    pub fn escape_name(&self, name: &str) -> String {
        if self.plain_names || self.quote.is_empty() {
            return name.to_string();
        }
        let doubled = format!("{0}{0}", self.quote);
        format!("{q}{}{q}", name.replace(&self.quote, &doubled), q = self.quote)
    }

    #[must_use]
    pub fn persistent_name(&self, table: &TableLocator) -> String {
        match table.schema.as_deref() {
            Some(schema) if !schema.is_empty() => {
                format!("{}.{}", self.escape_name(schema), self.escape_name(&table.table))
            }
            _ => self.escape_name(&table.table),
        }
    }

    fn column_names(&self, columns: &[ColumnDef], include_key: bool) -> Vec<String> {
        columns
            .iter()
            .filter(|c| include_key || c.name != INTERNAL_KEY)
            .map(|c| self.escape_name(&c.name))
            .collect()
    }

    // -- tables -------------------------------------------------------------

    /// Column names of an existing table.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub fn table_columns(&self, table: &TableLocator) -> Result<Option<Vec<String>>> {
        self.conn.table_columns(table)
    }

    fn create_table_internal(&self, table: &TableLocator, columns: &[ColumnDef]) -> Result<()> {
        let name = self.persistent_name(table);
        let defs: Vec<String> = columns
            .iter()
            .map(|c| {
                let escaped = self.escape_name(&c.name);
                if c.name.eq_ignore_ascii_case(INTERNAL_KEY) {
                    self.dialect.generated_key(&escaped)
                } else {
                    match self.metadata.column_type(c.value_type.as_str()) {
                        Some(t) => format!("{escaped} {}", t.type_name),
                        None => escaped,
                    }
                }
            })
            .collect();
        let sql = format!("CREATE TABLE {name} ({})", defs.join(", "));
        self.conn.execute(&sql, &[])?;
        if self.logging {
            tracing::info!(table = name, "Created relational table");
        } else {
            tracing::debug!(table = name, sql, "Created table");
        }
        Ok(())
    }

    /// Drop and recreate `table`.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub fn create_table(&mut self, table: &TableLocator, columns: &[ColumnDef]) -> Result<()> {
        self.drop_table(table)?;
        self.create_table_internal(table, columns)
    }

    /// Create `table` unless it exists. Returns whether it was created.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub fn ensure_table(&mut self, table: &TableLocator, columns: &[ColumnDef]) -> Result<bool> {
        if self.conn.table_columns(table)?.is_some() {
            return Ok(false);
        }
        self.create_table_internal(table, columns)?;
        Ok(true)
    }

    /// Drop `table` if it exists, discarding statements prepared for it.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub fn drop_table(&mut self, table: &TableLocator) -> Result<()> {
        let name = self.persistent_name(table);
        self.inserts.remove(&name);
        self.deletes.remove(&name);
        self.updates.remove(&name);
        self.conn.execute(&format!("DROP TABLE IF EXISTS {name}"), &[])?;
        Ok(())
    }

    /// Create `target` from `columns` and copy the matching columns of
    /// `source` into it. The generated key column is not copied.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub fn copy_table(&mut self, source: &TableLocator, target: &TableLocator, columns: &[ColumnDef]) -> Result<usize> {
        self.create_table(target, columns)?;
        let names = self.column_names(columns, false).join(", ");
        let sql = format!(
            "INSERT INTO {} ({names}) SELECT {names} FROM {}",
            self.persistent_name(target),
            self.persistent_name(source)
        );
        tracing::debug!(%source, %target, "Copying table");
        self.conn.execute(&sql, &[])
    }

    /// Move the content of `source` to `target`, leaving `source` empty or
    /// dropping it.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub fn rename_table(
        &mut self,
        source: &TableLocator,
        target: &TableLocator,
        columns: &[ColumnDef],
        recreate_empty_source: bool,
    ) -> Result<()> {
        self.copy_table(source, target, columns)?;
        if recreate_empty_source {
            self.delete(source, &[])?;
        } else {
            self.drop_table(source)?;
        }
        Ok(())
    }

    // -- DML ----------------------------------------------------------------

    fn batch_for(
        conn: &Arc<dyn SqlConnection>,
        sql: String,
        label: &str,
        bulk_size: usize,
        logging: bool,
        log_block: u64,
    ) -> StatementBatch {
        StatementBatch::new(Arc::clone(conn), sql, label)
            .with_bulk_size(bulk_size)
            .with_logging(logging, log_block)
    }

    /// Queue an insert of `row` restricted to `columns`, creating the
    /// table on first use. The insert statement is reused per table.
    ///
    /// # Errors
    ///
    /// Returns the backend error of table creation or a full batch.
    pub fn insert(&mut self, table: &TableLocator, columns: &[ColumnDef], row: &Row) -> Result<()> {
        let name = self.persistent_name(table);
        if !self.inserts.contains_key(&name) {
            self.ensure_table(table, columns)?;
            let names = self.column_names(columns, false);
            let placeholders = vec!["?"; names.len()].join(", ");
            let sql = format!("INSERT INTO {name} ({}) VALUES ({placeholders})", names.join(", "));
            let batch = Self::batch_for(&self.conn, sql, &name, self.bulk_size, self.logging, self.log_block);
            self.inserts.insert(name.clone(), batch);
        }
        let params = values_of(columns.iter().filter(|c| c.name != INTERNAL_KEY), row);
        match self.inserts.get_mut(&name) {
            Some(batch) => batch.add_batch(params),
            None => Ok(()),
        }
    }

    /// Merge `row` into the row matching its `keys`: `sum` columns are
    /// added, every other column in `to_set` is overwritten. Inserts the
    /// row when nothing matched or no keys are given.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub fn update(
        &mut self,
        table: &TableLocator,
        keys: &[ColumnDef],
        to_set: &[ColumnDef],
        columns: &[ColumnDef],
        row: &Row,
    ) -> Result<()> {
        if to_set.is_empty() {
            return Ok(());
        }
        if keys.is_empty() {
            return self.insert(table, columns, row);
        }
        let name = self.persistent_name(table);
        // Pending inserts must be visible to the update.
        if let Some(batch) = self.inserts.get_mut(&name) {
            batch.flush()?;
        } else {
            self.ensure_table(table, columns)?;
        }
        if !self.updates.contains_key(&name) {
            let sql = self.update_statement(&name, keys, to_set);
            self.updates.insert(name.clone(), sql);
        }
        let mut params = values_of(to_set.iter(), row);
        params.extend(values_of(keys.iter(), row));
        let updated = match self.updates.get(&name) {
            Some(sql) => self.conn.execute(sql, &params)?,
            None => 0,
        };
        if updated == 0 {
            self.insert(table, columns, row)?;
        }
        Ok(())
    }

    fn update_statement(&self, name: &str, keys: &[ColumnDef], to_set: &[ColumnDef]) -> String {
        let sets: Vec<String> = to_set
            .iter()
            .map(|c| {
                let col = self.escape_name(&c.name);
                match role_of(c) {
                    UpdateMode::Sum => format!("{col} = COALESCE({col}, 0) + ?"),
                    UpdateMode::Last => format!("{col} = ?"),
                    other => {
                        tracing::warn!(
                            column = c.name,
                            role = %other,
                            "Aggregation not supported by row-wise update, updating in mode 'last'"
                        );
                        format!("{col} = ?")
                    }
                }
            })
            .collect();
        format!(
            "UPDATE {name} SET {} WHERE {}",
            sets.join(", "),
            self.where_clause(keys.iter().map(|c| c.name.as_str()))
        )
    }

    fn where_clause<'a>(&self, names: impl Iterator<Item = &'a str>) -> String {
        names
            .map(|n| format!("{} = ?", self.escape_name(n)))
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    /// Delete every row matching all `criteria`; no criteria deletes all rows.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub fn delete(&mut self, table: &TableLocator, criteria: &[(String, Value)]) -> Result<usize> {
        let name = self.persistent_name(table);
        let mut sql = format!("DELETE FROM {name}");
        if !criteria.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.where_clause(criteria.iter().map(|(n, _)| n.as_str())));
        }
        let params: Vec<Value> = criteria.iter().map(|(_, v)| v.clone()).collect();
        let deleted = self.conn.execute(&sql, &params)?;
        if deleted > 0 {
            tracing::info!(table = name, deleted, "Deleted records");
        }
        Ok(deleted)
    }

    /// Queue deletion of the rows matching `row` on `keys`.
    ///
    /// # Errors
    ///
    /// Returns the backend error of a full batch.
    pub fn delete_line(&mut self, table: &TableLocator, keys: &[ColumnDef], row: &Row) -> Result<()> {
        let name = self.persistent_name(table);
        if !self.deletes.contains_key(&name) {
            let sql = format!(
                "DELETE FROM {name} WHERE {}",
                self.where_clause(keys.iter().map(|c| c.name.as_str()))
            );
            let batch = Self::batch_for(&self.conn, sql, &name, self.bulk_size, self.logging, self.log_block);
            self.deletes.insert(name.clone(), batch);
        }
        let params = values_of(keys.iter(), row);
        match self.deletes.get_mut(&name) {
            Some(batch) => batch.add_batch(params),
            None => Ok(()),
        }
    }

    /// Recreate (or, with `append`, extend) `table` with all `rows`.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub fn populate(
        &mut self,
        table: &TableLocator,
        columns: &[ColumnDef],
        rows: impl IntoIterator<Item = Row>,
        append: bool,
    ) -> Result<u64> {
        if append {
            self.ensure_table(table, columns)?;
        } else {
            self.create_table(table, columns)?;
        }
        let mut count = 0;
        for row in rows {
            self.insert(table, columns, &row)?;
            count += 1;
        }
        self.commit(table)?;
        Ok(count)
    }

    // -- reads --------------------------------------------------------------

    /// # Errors
    ///
    /// Returns the backend error.
    pub fn query(&self, sql: &str) -> Result<QueryResult> {
        self.conn.query(sql, &[])
    }

    /// All rows of `table`, optionally limited.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub fn table_result(&self, table: &TableLocator, limit: Option<usize>) -> Result<QueryResult> {
        let mut sql = format!("SELECT * FROM {}", self.persistent_name(table));
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        self.conn.query(&sql, &[])
    }

    /// # Errors
    ///
    /// Returns the backend error.
    pub fn row_count(&self, table: &TableLocator) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.persistent_name(table));
        let result = self.conn.query(&sql, &[])?;
        let count = result
            .rows
            .first()
            .and_then(|r| r.first())
            .and_then(|v| v.as_i64().ok())
            .unwrap_or(0);
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Execute a statement built by a caller, e.g. an aggregated copy.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub fn execute(&self, sql: &str) -> Result<usize> {
        self.conn.execute(sql, &[])
    }

    // -- commit -------------------------------------------------------------

    /// Flush and release every statement prepared for `table`.
    ///
    /// # Errors
    ///
    /// Returns the backend error of the final batches.
    pub fn commit(&mut self, table: &TableLocator) -> Result<()> {
        let name = self.persistent_name(table);
        if let Some(mut batch) = self.inserts.remove(&name) {
            batch.flush()?;
        }
        if let Some(mut batch) = self.deletes.remove(&name) {
            batch.flush()?;
        }
        self.updates.remove(&name);
        Ok(())
    }

    /// Flush every pending batch.
    ///
    /// # Errors
    ///
    /// Returns the first backend error.
    pub fn commit_all(&mut self) -> Result<()> {
        for batch in self.inserts.values_mut().chain(self.deletes.values_mut()) {
            batch.flush()?;
        }
        self.inserts.clear();
        self.deletes.clear();
        self.updates.clear();
        Ok(())
    }
}

fn values_of<'a>(columns: impl Iterator<Item = &'a ColumnDef>, row: &Row) -> Vec<Value> {
    columns
        .map(|c| row.value(&c.name).cloned().unwrap_or(Value::Null))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::SqliteConnection;
    use tributary_types::{NodeKind, ValueType};

    fn persistor() -> GenericPersistor {
        let conn: Arc<dyn SqlConnection> = Arc::new(SqliteConnection::in_memory().unwrap());
        GenericPersistor::new(conn)
    }

    fn columns() -> Vec<ColumnDef> {
        vec![
            ColumnDef::new("region").with_kind(NodeKind::Relational { role: UpdateMode::Key }),
            ColumnDef::new("amount")
                .with_kind(NodeKind::Relational { role: UpdateMode::Sum })
                .with_type(ValueType::Double),
        ]
    }

    fn row(region: &str, amount: f64) -> Row {
        Row::from_columns(columns())
            .unwrap()
            .with_values(vec![Value::from(region), Value::Double(amount)])
            .unwrap()
    }

    #[test]
    fn escape_name_doubles_quotes() {
        let p = persistor();
        assert_eq!(p.escape_name("a\"b"), "\"a\"\"b\"");
        assert_eq!(
            p.persistent_name(&TableLocator::new("t").with_schema("main")),
            "\"main\".\"t\""
        );
    }

    #[test]
    fn plain_names_are_not_quoted() {
        let mut p = persistor();
        p.set_plain_names(true);
        assert_eq!(p.escape_name("orders"), "orders");
    }

    #[test]
    fn insert_is_visible_after_commit() {
        let mut p = persistor();
        let table = TableLocator::new("sales");
        p.insert(&table, &columns(), &row("EU", 1.0)).unwrap();
        p.insert(&table, &columns(), &row("US", 2.0)).unwrap();
        assert_eq!(p.row_count(&table).unwrap(), 0);
        p.commit(&table).unwrap();
        assert_eq!(p.row_count(&table).unwrap(), 2);
    }

    #[test]
    fn update_adds_sums_and_inserts_missing_keys() {
        let mut p = persistor();
        let table = TableLocator::new("sales");
        let cols = columns();
        let keys = vec![cols[0].clone()];
        let to_set = vec![cols[1].clone()];
        for (region, amount) in [("EU", 1.0), ("EU", 2.5), ("US", 4.0)] {
            p.update(&table, &keys, &to_set, &cols, &row(region, amount)).unwrap();
        }
        p.commit(&table).unwrap();
        let result = p
            .query("SELECT region, amount FROM sales ORDER BY region")
            .unwrap();
        assert_eq!(
            result.rows,
            vec![
                vec![Value::from("EU"), Value::Double(3.5)],
                vec![Value::from("US"), Value::Double(4.0)],
            ]
        );
    }

    #[test]
    fn delete_with_criteria_and_without() {
        let mut p = persistor();
        let table = TableLocator::new("sales");
        p.populate(&table, &columns(), vec![row("EU", 1.0), row("US", 2.0)], false)
            .unwrap();
        let deleted = p
            .delete(&table, &[("region".to_string(), Value::from("EU"))])
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(p.delete(&table, &[]).unwrap(), 1);
        assert_eq!(p.row_count(&table).unwrap(), 0);
    }

    #[test]
    fn delete_line_is_batched() {
        let mut p = persistor();
        let table = TableLocator::new("sales");
        p.populate(&table, &columns(), vec![row("EU", 1.0), row("US", 2.0)], false)
            .unwrap();
        let keys = vec![columns()[0].clone()];
        p.delete_line(&table, &keys, &row("US", 0.0)).unwrap();
        assert_eq!(p.row_count(&table).unwrap(), 2);
        p.commit(&table).unwrap();
        assert_eq!(p.row_count(&table).unwrap(), 1);
    }

    #[test]
    fn generated_key_column_is_autoincrement() {
        let mut p = persistor();
        let table = TableLocator::new("keyed");
        let mut cols = vec![ColumnDef::new(INTERNAL_KEY)];
        cols.extend(columns());
        p.populate(&table, &cols, vec![row("EU", 1.0), row("US", 2.0)], false)
            .unwrap();
        let result = p.query("SELECT \"__key\" FROM keyed ORDER BY 1").unwrap();
        assert_eq!(result.rows, vec![vec![Value::Int(1)], vec![Value::Int(2)]]);
    }

    #[test]
    fn copy_and_rename_table() {
        let mut p = persistor();
        let source = TableLocator::new("src");
        let target = TableLocator::new("dst");
        p.populate(&source, &columns(), vec![row("EU", 1.0)], false).unwrap();
        p.rename_table(&source, &target, &columns(), true).unwrap();
        assert_eq!(p.row_count(&target).unwrap(), 1);
        assert_eq!(p.row_count(&source).unwrap(), 0);

        p.rename_table(&target, &source, &columns(), false).unwrap();
        assert!(p.table_columns(&target).unwrap().is_none());
        assert_eq!(p.table_result(&source, Some(1)).unwrap().rows.len(), 1);
    }
}
