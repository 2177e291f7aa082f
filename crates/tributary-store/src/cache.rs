//! In-memory table cache.
//!
//! Tables are populated once, all-or-nothing: rows are written to a
//! staging table and only a successful population flips the table to
//! queryable. Readers never observe a partially written table. After the
//! flip the content is immutable until the table is dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tributary_types::{ColumnDef, Row};

use crate::connection::{QueryResult, SqlConnection, TableLocator};
use crate::error::{Result, StoreError};
use crate::persistor::GenericPersistor;
use crate::sqlite::SqliteConnection;

/// Population state of a cached table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Populating,
    Queryable { populated_at: DateTime<Utc>, rows: u64 },
}

pub struct TableCache {
    conn: Arc<dyn SqlConnection>,
    persistor: Mutex<GenericPersistor>,
    tables: Mutex<HashMap<String, CacheState>>,
}

impl TableCache {
    /// Cache backed by a private in-memory `SQLite` database.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the database can't be created.
    pub fn in_memory() -> Result<Self> {
        let conn: Arc<dyn SqlConnection> = Arc::new(SqliteConnection::in_memory()?);
        Ok(Self::new(conn))
    }

    #[must_use]
    pub fn new(conn: Arc<dyn SqlConnection>) -> Self {
        Self {
            persistor: Mutex::new(GenericPersistor::new(Arc::clone(&conn))),
            conn,
            tables: Mutex::new(HashMap::new()),
        }
    }

    fn lock_tables(&self) -> Result<MutexGuard<'_, HashMap<String, CacheState>>> {
        self.tables.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn lock_persistor(&self) -> Result<MutexGuard<'_, GenericPersistor>> {
        self.persistor.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn staging(name: &str) -> TableLocator {
        TableLocator::new(format!("{name}__staging"))
    }

    #[must_use]
    pub fn state(&self, name: &str) -> Option<CacheState> {
        self.tables.lock().ok().and_then(|t| t.get(name).copied())
    }

    #[must_use]
    pub fn is_queryable(&self, name: &str) -> bool {
        matches!(self.state(name), Some(CacheState::Queryable { .. }))
    }

    /// Populate `name` with `rows`, replacing any previous content.
    ///
    /// On failure the previous state of the table is restored and the
    /// staging table is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unsupported`] if the table is already being
    /// populated, or the backend error of the population.
    pub fn populate(
        &self,
        name: &str,
        columns: &[ColumnDef],
        rows: impl IntoIterator<Item = Row>,
    ) -> Result<u64> {
        let previous = {
            let mut tables = self.lock_tables()?;
            let previous = tables.get(name).copied();
            if previous == Some(CacheState::Populating) {
                return Err(StoreError::Unsupported(format!(
                    "cached table {name} is already being populated"
                )));
            }
            tables.insert(name.to_string(), CacheState::Populating);
            previous
        };

        let staging = Self::staging(name);
        let target = TableLocator::new(name);
        let result = self.lock_persistor().and_then(|mut persistor| {
            persistor
                .populate(&staging, columns, rows, false)
                .and_then(|count| {
                    persistor.rename_table(&staging, &target, columns, false)?;
                    Ok(count)
                })
                .inspect_err(|_| {
                    if let Err(e) = persistor.drop_table(&staging) {
                        tracing::warn!(table = name, error = %e, "Failed to drop staging table");
                    }
                })
        });

        let mut tables = self.lock_tables()?;
        match result {
            Ok(count) => {
                tables.insert(
                    name.to_string(),
                    CacheState::Queryable {
                        populated_at: Utc::now(),
                        rows: count,
                    },
                );
                tracing::debug!(table = name, rows = count, "Cached table is queryable");
                Ok(count)
            }
            Err(e) => {
                match previous {
                    Some(state) => tables.insert(name.to_string(), state),
                    None => tables.remove(name),
                };
                Err(e)
            }
        }
    }

    /// All rows of a queryable table.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CacheNotReady`] unless population completed.
    pub fn read(&self, name: &str) -> Result<QueryResult> {
        self.ensure_queryable(name)?;
        let persistor = self.lock_persistor()?;
        persistor.table_result(&TableLocator::new(name), None)
    }

    /// Run `sql` after checking that every table in `tables` is queryable.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CacheNotReady`] or the backend error.
    pub fn query(&self, tables: &[&str], sql: &str) -> Result<QueryResult> {
        for name in tables {
            self.ensure_queryable(name)?;
        }
        self.conn.query(sql, &[])
    }

    fn ensure_queryable(&self, name: &str) -> Result<()> {
        if self.is_queryable(name) {
            Ok(())
        } else {
            Err(StoreError::CacheNotReady(name.to_string()))
        }
    }

    /// Forget and drop a cached table.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub fn drop_table(&self, name: &str) -> Result<()> {
        self.lock_tables()?.remove(name);
        self.lock_persistor()?.drop_table(&TableLocator::new(name))
    }
}
