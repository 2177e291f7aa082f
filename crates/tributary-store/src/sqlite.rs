//! `SQLite`-backed implementation of [`SqlConnection`].
//!
//! Uses a single `Mutex<Connection>` for thread safety. Batches run inside
//! one transaction with a cached prepared statement.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, Connection};
use tributary_types::Value;

use crate::connection::{DatabaseMetadata, QueryResult, SqlConnection, SqlType, TableLocator, TypeInfo};
use crate::error::{self, StoreError};

/// Parameter adapter binding a [`Value`] to a `SQLite` statement.
struct SqlValue<'a>(&'a Value);

impl ToSql for SqlValue<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        use rusqlite::types::Value as Sqlite;
        Ok(match self.0 {
            Value::Null => ToSqlOutput::Owned(Sqlite::Null),
            Value::Bool(b) => ToSqlOutput::Owned(Sqlite::Integer(i64::from(*b))),
            Value::Int(i) => ToSqlOutput::Owned(Sqlite::Integer(*i)),
            Value::Double(d) => ToSqlOutput::Owned(Sqlite::Real(*d)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(d) => Value::Double(d),
        ValueRef::Text(t) | ValueRef::Blob(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
    }
}

fn sqlite_metadata() -> DatabaseMetadata {
    DatabaseMetadata {
        product_name: "SQLite".to_string(),
        identifier_quote: "\"".to_string(),
        type_info: vec![
            TypeInfo::new("BOOLEAN", SqlType::Boolean),
            TypeInfo::new("INTEGER", SqlType::Integer),
            TypeInfo::new("INTEGER", SqlType::BigInt),
            TypeInfo::new("REAL", SqlType::Double),
            TypeInfo::new("TEXT", SqlType::Varchar),
        ],
    }
}

/// `SQLite` connection.
///
/// Create with [`SqliteConnection::open`] for file-backed persistence
/// or [`SqliteConnection::in_memory`] for caches and tests.
pub struct SqliteConnection {
    conn: Mutex<Connection>,
    metadata: DatabaseMetadata,
}

impl SqliteConnection {
    /// Open or create a `SQLite` database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the directory can't be created,
    /// or [`StoreError::Sql`] if the database can't be opened.
    pub fn open(path: &Path) -> error::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)
            .map_err(|e| StoreError::sql(format!("open {}", path.display()), e))?;
        Ok(Self::from_connection(conn))
    }

    /// Create a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sql`] if the database can't be initialized.
    pub fn in_memory() -> error::Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::sql("open :memory:", e))?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            metadata: sqlite_metadata(),
        }
    }

    /// Acquire the connection lock.
    fn lock_conn(&self) -> error::Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn quote(name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

impl SqlConnection for SqliteConnection {
    fn metadata(&self) -> &DatabaseMetadata {
        &self.metadata
    }

    fn execute(&self, sql: &str, params: &[Value]) -> error::Result<usize> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare_cached(sql).map_err(|e| StoreError::sql(sql, e))?;
        stmt.execute(params_from_iter(params.iter().map(SqlValue)))
            .map_err(|e| StoreError::sql(sql, e))
    }

    fn execute_batch(&self, sql: &str, rows: &[Vec<Value>]) -> error::Result<usize> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction().map_err(|e| StoreError::sql(sql, e))?;
        let mut affected = 0;
        {
            let mut stmt = tx.prepare_cached(sql).map_err(|e| StoreError::sql(sql, e))?;
            for row in rows {
                affected += stmt
                    .execute(params_from_iter(row.iter().map(SqlValue)))
                    .map_err(|e| StoreError::sql(sql, e))?;
            }
        }
        tx.commit().map_err(|e| StoreError::sql(sql, e))?;
        Ok(affected)
    }

    fn query(&self, sql: &str, params: &[Value]) -> error::Result<QueryResult> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare_cached(sql).map_err(|e| StoreError::sql(sql, e))?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();
        let mut rows = stmt
            .query(params_from_iter(params.iter().map(SqlValue)))
            .map_err(|e| StoreError::sql(sql, e))?;
        let mut result = QueryResult {
            columns,
            rows: Vec::new(),
        };
        while let Some(row) = rows.next().map_err(|e| StoreError::sql(sql, e))? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(from_sql(row.get_ref(i).map_err(|e| StoreError::sql(sql, e))?));
            }
            result.rows.push(values);
        }
        Ok(result)
    }

    fn table_columns(&self, table: &TableLocator) -> error::Result<Option<Vec<String>>> {
        let sql = match &table.schema {
            Some(schema) => format!("PRAGMA {}.table_info({})", Self::quote(schema), Self::quote(&table.table)),
            None => format!("PRAGMA table_info({})", Self::quote(&table.table)),
        };
        let result = self.query(&sql, &[])?;
        if result.rows.is_empty() {
            return Ok(None);
        }
        let columns = result
            .rows
            .into_iter()
            .filter_map(|mut r| match r.get_mut(1).map(std::mem::take) {
                Some(Value::Text(name)) => Some(name),
                _ => None,
            })
            .collect();
        Ok(Some(columns))
    }
}
