use std::sync::Arc;
use std::vec;

use tributary_types::{EtlError, Result, Row, Schema};

use super::{Processor, ProcessorCore, ProcessorMetrics, ProcessorState};

/// Streams an owned set of rows sharing one schema.
pub struct TableProcessor {
    core: ProcessorCore,
    schema: Arc<Schema>,
    rows: vec::IntoIter<Row>,
}

impl TableProcessor {
    #[must_use]
    pub fn new(name: impl Into<String>, schema: Arc<Schema>, rows: Vec<Row>) -> Self {
        Self {
            core: ProcessorCore::new(name),
            schema,
            rows: rows.into_iter(),
        }
    }

    /// Build rows from raw value vectors.
    ///
    /// # Errors
    ///
    /// Returns [`EtlError::Configuration`] when a row does not have one
    /// value per column.
    pub fn from_values(
        name: impl Into<String>,
        schema: Arc<Schema>,
        values: Vec<Vec<tributary_types::Value>>,
    ) -> Result<Self> {
        let name = name.into();
        let template = Row::new(Arc::clone(&schema));
        let rows = values
            .into_iter()
            .enumerate()
            .map(|(i, v)| {
                template.with_values(v).map_err(|e| {
                    EtlError::configuration(format!("{name}: row {}: {e}", i + 1))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(name, schema, rows))
    }
}

impl Processor for TableProcessor {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn init(&mut self) -> Result<()> {
        self.core.initialized()
    }

    fn next(&mut self) -> Result<Option<Row>> {
        let Some(started) = self.core.begin()? else {
            return Ok(None);
        };
        let row = self.rows.next();
        Ok(self.core.end(started, row))
    }

    fn close(&mut self) {
        if self.core.close() {
            self.rows = Vec::new().into_iter();
        }
    }

    fn output_description(&self) -> Arc<Schema> {
        Arc::clone(&self.schema)
    }

    fn metrics(&self) -> ProcessorMetrics {
        self.core.metrics(std::time::Duration::ZERO)
    }

    fn state(&self) -> ProcessorState {
        self.core.state()
    }
}
