use std::sync::Arc;

use tributary_types::{EtlError, NodeKind, Result, Row, Schema, Value};

use super::{init_upstream, Processor, ProcessorCore, ProcessorMetrics, ProcessorState};

/// Projects a named subset of the upstream columns, in the given order.
///
/// Projected columns become coordinates bound to the upstream column of
/// the same name. The projection is resolved in `init` and re-resolved
/// whenever the upstream schema epoch changes.
pub struct CoordinateProcessor {
    core: ProcessorCore,
    upstream: Box<dyn Processor>,
    names: Vec<String>,
    schema: Arc<Schema>,
    indices: Vec<usize>,
    bound_epoch: Option<u64>,
}

impl CoordinateProcessor {
    #[must_use]
    pub fn new(upstream: Box<dyn Processor>, names: Vec<String>) -> Self {
        Self {
            core: ProcessorCore::new(format!("{}#coordinates", upstream.name())),
            upstream,
            names,
            schema: Arc::new(Schema::empty()),
            indices: Vec::new(),
            bound_epoch: None,
        }
    }

    fn resolve(&mut self, source: &Schema) -> Result<()> {
        let mut columns = Vec::with_capacity(self.names.len());
        let mut indices = Vec::with_capacity(self.names.len());
        for name in &self.names {
            let idx = source.index_of(name).ok_or_else(|| {
                EtlError::runtime(format!(
                    "Coordinate {name} not found in output of {}",
                    self.upstream.name()
                ))
            })?;
            let column = source.columns()[idx]
                .clone()
                .with_kind(NodeKind::Coordinate)
                .with_input(name.clone());
            columns.push(column);
            indices.push(idx);
        }
        self.schema = Arc::new(Schema::new(columns)?);
        self.indices = indices;
        self.bound_epoch = Some(source.epoch());
        Ok(())
    }
}

impl Processor for CoordinateProcessor {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn init(&mut self) -> Result<()> {
        self.core.initialized()?;
        init_upstream(self.core.name(), self.upstream.as_mut())?;
        let source = self.upstream.output_description();
        self.resolve(&source)
            .map_err(|e| e.into_initialization(self.core.name()))
    }

    fn next(&mut self) -> Result<Option<Row>> {
        let Some(started) = self.core.begin()? else {
            return Ok(None);
        };
        let Some(row) = self.upstream.next()? else {
            return Ok(self.core.end(started, None));
        };
        if self.bound_epoch != Some(row.epoch()) {
            let source = Arc::clone(row.schema());
            self.resolve(&source)?;
        }
        let values: Vec<Value> = self
            .indices
            .iter()
            .map(|&i| row.value_at(i).cloned().unwrap_or_default())
            .collect();
        let projected = Row::new(Arc::clone(&self.schema)).with_values(values)?;
        Ok(self.core.end(started, Some(projected)))
    }

    fn close(&mut self) {
        if self.core.close() {
            self.upstream.close();
        }
    }

    fn output_description(&self) -> Arc<Schema> {
        Arc::clone(&self.schema)
    }

    fn metrics(&self) -> ProcessorMetrics {
        self.core.metrics(self.upstream.metrics().overall)
    }

    fn state(&self) -> ProcessorState {
        self.core.state()
    }
}
