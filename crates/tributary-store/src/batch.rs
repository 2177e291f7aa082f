//! Batched execution of one prepared statement.

use std::sync::Arc;

use tributary_types::Value;

use crate::connection::SqlConnection;
use crate::error::Result;

/// Default number of rows per batch.
pub const DEFAULT_BULK_SIZE: usize = 100;

/// Minimum number of rows between two progress messages.
pub const DEFAULT_LOG_BLOCK: u64 = 10_000;

/// Queues parameter rows for one statement and executes them in batches
/// of `bulk_size`.
///
/// A bulk size below 2 disables batching: every row is executed directly.
/// Rows queued since the last full batch are only written by [`flush`],
/// which callers must invoke at the end of the stream.
///
/// [`flush`]: StatementBatch::flush
pub struct StatementBatch {
    conn: Arc<dyn SqlConnection>,
    sql: String,
    label: String,
    bulk_size: usize,
    logging: bool,
    log_block: u64,
    pending: Vec<Vec<Value>>,
    queued: u64,
    rows_affected: u64,
    batches_executed: u64,
    last_logged: u64,
}

impl StatementBatch {
    #[must_use]
    pub fn new(conn: Arc<dyn SqlConnection>, sql: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            conn,
            sql: sql.into(),
            label: label.into(),
            bulk_size: DEFAULT_BULK_SIZE,
            logging: false,
            log_block: DEFAULT_LOG_BLOCK,
            pending: Vec::new(),
            queued: 0,
            rows_affected: 0,
            batches_executed: 0,
            last_logged: 0,
        }
    }

    #[must_use]
    pub fn with_bulk_size(mut self, bulk_size: usize) -> Self {
        self.bulk_size = bulk_size;
        self
    }

    #[must_use]
    pub fn with_logging(mut self, logging: bool, log_block: u64) -> Self {
        self.logging = logging;
        self.log_block = log_block.max(1);
        self
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    fn is_batching(&self) -> bool {
        self.bulk_size >= 2
    }

    /// Queue one parameter row, executing the batch when it is full.
    ///
    /// # Errors
    ///
    /// Returns the backend error of a failed statement or batch.
    pub fn add_batch(&mut self, params: Vec<Value>) -> Result<()> {
        self.queued += 1;
        if !self.is_batching() {
            let affected = self.conn.execute(&self.sql, &params)?;
            self.rows_affected += affected as u64;
            self.log_progress();
            return Ok(());
        }
        self.pending.push(params);
        if self.pending.len() >= self.bulk_size {
            self.execute_pending()?;
        }
        Ok(())
    }

    /// Execute every queued row. A no-op when nothing is pending.
    ///
    /// # Errors
    ///
    /// Returns the backend error of the failed batch.
    pub fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        self.execute_pending()
    }

    fn execute_pending(&mut self) -> Result<()> {
        let rows = std::mem::take(&mut self.pending);
        let affected = self.conn.execute_batch(&self.sql, &rows)?;
        self.rows_affected += affected as u64;
        self.batches_executed += 1;
        self.log_progress();
        Ok(())
    }

    fn log_progress(&mut self) {
        if self.logging && self.queued - self.last_logged >= self.log_block {
            tracing::info!(target_table = self.label, rows = self.queued, "Rows written");
            self.last_logged = self.queued;
        }
    }

    /// Rows handed to [`add_batch`](Self::add_batch) so far.
    #[must_use]
    pub fn queued(&self) -> u64 {
        self.queued
    }

    /// Rows queued but not yet executed.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn batches_executed(&self) -> u64 {
        self.batches_executed
    }

    #[must_use]
    pub fn rows_affected(&self) -> u64 {
        self.rows_affected
    }
}

impl Drop for StatementBatch {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            tracing::warn!(
                target_table = self.label,
                rows = self.pending.len(),
                "Statement batch dropped with unflushed rows"
            );
        }
    }
}
