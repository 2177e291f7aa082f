//! Pull-based row processors.
//!
//! A [`Processor`] yields a finite sequence of rows. Decorators own exactly
//! one upstream processor, close it when they are closed, and report their
//! own processing time without the time spent upstream.

pub mod coordinate;
pub mod filter;
pub mod recoding;
pub mod table;
pub mod window;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tributary_types::{EtlError, Result, Row, Schema};

pub use coordinate::CoordinateProcessor;
pub use filter::{CompareOp, FilterProcessor, RowPredicate};
pub use recoding::RecodingProcessor;
pub use table::TableProcessor;
pub use window::{RowWindow, WindowProcessor};

/// Default number of rows between two progress messages.
pub const DEFAULT_LOG_BLOCK_SIZE: u64 = 100_000;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Lifecycle of a processor. There is no way back from `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    Uninitialized,
    Initialized,
    Streaming,
    Closed,
}

/// Row count and timing of one processor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessorMetrics {
    pub name: String,
    pub rows: u64,
    /// Time spent in `next`, including upstream processors.
    pub overall: Duration,
    /// Time spent in this processor alone.
    pub own: Duration,
}

/// Cooperative cancellation signal polled between rows.
pub trait Executable: Send + Sync {
    fn is_executable(&self) -> bool;
}

/// Lazy, finite row source.
pub trait Processor: Send {
    fn name(&self) -> &str;

    /// One-time setup. Failure aborts construction of the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`EtlError::Initialization`] or a binding error.
    fn init(&mut self) -> Result<()>;

    /// Next row, `None` at the end of the stream.
    ///
    /// # Errors
    ///
    /// Returns a runtime error raised while producing the row.
    fn next(&mut self) -> Result<Option<Row>>;

    /// Release resources, including the upstream processor.
    fn close(&mut self);

    /// Shape of the rows this processor produces. Valid after `init`.
    fn output_description(&self) -> Arc<Schema>;

    fn metrics(&self) -> ProcessorMetrics;

    fn state(&self) -> ProcessorState;
}

impl std::fmt::Debug for dyn Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor")
            .field("name", &self.name())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Shared bookkeeping
// ---------------------------------------------------------------------------

/// State machine, counters and timing shared by every processor.
#[derive(Debug)]
pub struct ProcessorCore {
    name: String,
    state: ProcessorState,
    exhausted: bool,
    rows: u64,
    overall: Duration,
    log_block_size: u64,
}

impl ProcessorCore {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: ProcessorState::Uninitialized,
            exhausted: false,
            rows: 0,
            overall: Duration::ZERO,
            log_block_size: DEFAULT_LOG_BLOCK_SIZE,
        }
    }

    #[must_use]
    pub fn with_log_block_size(mut self, rows: u64) -> Self {
        self.log_block_size = rows.max(1);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn state(&self) -> ProcessorState {
        self.state
    }

    #[must_use]
    pub fn rows(&self) -> u64 {
        self.rows
    }

    #[must_use]
    pub fn overall(&self) -> Duration {
        self.overall
    }

    /// Move to `Initialized`.
    ///
    /// # Errors
    ///
    /// Returns [`EtlError::Initialization`] unless the processor is new.
    pub fn initialized(&mut self) -> Result<()> {
        if self.state != ProcessorState::Uninitialized {
            return Err(EtlError::initialization(
                &self.name,
                format!("processor is already {:?}", self.state),
            ));
        }
        self.state = ProcessorState::Initialized;
        Ok(())
    }

    /// Start pulling one row. `None` means the stream is over and the
    /// caller must return `Ok(None)` without touching upstream.
    ///
    /// # Errors
    ///
    /// Returns a runtime error when called before `init`.
    pub fn begin(&mut self) -> Result<Option<Instant>> {
        match self.state {
            ProcessorState::Uninitialized => Err(EtlError::runtime(format!(
                "Processor {} used before initialization",
                self.name
            ))),
            ProcessorState::Closed => Ok(None),
            _ if self.exhausted => Ok(None),
            _ => {
                self.state = ProcessorState::Streaming;
                Ok(Some(Instant::now()))
            }
        }
    }

    /// Finish pulling one row started with [`begin`](Self::begin).
    pub fn end(&mut self, started: Instant, row: Option<Row>) -> Option<Row> {
        self.overall += started.elapsed();
        if row.is_some() {
            self.rows += 1;
            if self.rows % self.log_block_size == 0 {
                tracing::info!(processor = self.name, rows = self.rows, "Rows processed");
            }
        } else {
            self.exhausted = true;
        }
        row
    }

    /// Mark the stream as finished early, e.g. after cancellation.
    pub fn exhaust(&mut self) {
        self.exhausted = true;
    }

    /// Move to `Closed`. Returns `false` if it already was.
    pub fn close(&mut self) -> bool {
        if self.state == ProcessorState::Closed {
            return false;
        }
        self.state = ProcessorState::Closed;
        tracing::debug!(
            processor = self.name,
            rows = self.rows,
            overall_ms = self.overall.as_millis(),
            "Processor closed"
        );
        true
    }

    /// Metrics with `own` computed by subtracting nested processor time.
    #[must_use]
    pub fn metrics(&self, nested: Duration) -> ProcessorMetrics {
        ProcessorMetrics {
            name: self.name.clone(),
            rows: self.rows,
            overall: self.overall,
            own: self.overall.saturating_sub(nested),
        }
    }
}

/// Initialise `upstream`, mapping any failure to an initialization error
/// of the decorator named `name`.
pub(crate) fn init_upstream(name: &str, upstream: &mut dyn Processor) -> Result<()> {
    if upstream.state() != ProcessorState::Uninitialized {
        return Ok(());
    }
    upstream.init().map_err(|e| e.into_initialization(name))
}

/// Drain `processor` into a vector. Initialises it if necessary and closes it.
///
/// # Errors
///
/// Returns the first error raised by the processor.
pub fn collect_rows(processor: &mut dyn Processor) -> Result<Vec<Row>> {
    if processor.state() == ProcessorState::Uninitialized {
        processor.init()?;
    }
    let mut rows = Vec::new();
    let result = loop {
        match processor.next() {
            Ok(Some(row)) => rows.push(row),
            Ok(None) => break Ok(rows),
            Err(e) => break Err(e),
        }
    };
    processor.close();
    result
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tributary_types::{ColumnDef, Value, ValueType};

    /// `[id: integer, amount: double]` rows `(1, 10.0), (2, 20.0), ...`.
    pub(crate) fn amounts(n: i64) -> TableProcessor {
        let template = Row::from_columns(vec![
            ColumnDef::new("id").with_type(ValueType::Integer),
            ColumnDef::new("amount").with_type(ValueType::Double),
        ])
        .unwrap();
        let rows = (1..=n)
            .map(|i| {
                #[allow(clippy::cast_precision_loss)]
                let amount = i as f64 * 10.0;
                template
                    .with_values(vec![Value::Int(i), Value::Double(amount)])
                    .unwrap()
            })
            .collect();
        TableProcessor::new("amounts", Arc::clone(template.schema()), rows)
    }

    #[test]
    fn processor_is_object_safe() {
        fn _assert(_: &dyn Processor) {}
    }

    #[test]
    fn next_before_init_fails() {
        let mut p = amounts(1);
        assert!(p.next().is_err());
    }

    #[test]
    fn init_twice_fails() {
        let mut p = amounts(1);
        p.init().unwrap();
        assert!(p.init().is_err());
    }

    #[test]
    fn state_machine_runs_forward() {
        let mut p = amounts(2);
        assert_eq!(p.state(), ProcessorState::Uninitialized);
        p.init().unwrap();
        assert_eq!(p.state(), ProcessorState::Initialized);
        assert!(p.next().unwrap().is_some());
        assert_eq!(p.state(), ProcessorState::Streaming);
        p.close();
        assert_eq!(p.state(), ProcessorState::Closed);
        assert!(p.next().unwrap().is_none());
    }

    #[test]
    fn collect_rows_drains_and_closes() {
        let mut p = amounts(3);
        let rows = collect_rows(&mut p).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(p.state(), ProcessorState::Closed);
        assert_eq!(p.metrics().rows, 3);
    }

    #[test]
    fn own_time_never_exceeds_overall() {
        let mut core = ProcessorCore::new("p");
        core.initialized().unwrap();
        let started = core.begin().unwrap().unwrap();
        core.end(started, None);
        let m = core.metrics(Duration::from_secs(5));
        assert_eq!(m.own, Duration::ZERO);
        assert!(core.begin().unwrap().is_none());
    }
}
