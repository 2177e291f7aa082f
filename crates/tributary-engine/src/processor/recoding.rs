use std::sync::Arc;

use tributary_types::{Result, Row, Schema, Value};

use super::{init_upstream, Processor, ProcessorCore, ProcessorMetrics, ProcessorState};

/// Coerces every value to the declared type of its column.
///
/// Values that cannot be converted become `Null`; the row is kept.
pub struct RecodingProcessor {
    core: ProcessorCore,
    upstream: Box<dyn Processor>,
    degraded: u64,
}

impl RecodingProcessor {
    #[must_use]
    pub fn new(upstream: Box<dyn Processor>) -> Self {
        Self {
            core: ProcessorCore::new(format!("{}#recoding", upstream.name())),
            upstream,
            degraded: 0,
        }
    }

    /// Values replaced by `Null` because they could not be converted.
    #[must_use]
    pub fn degraded(&self) -> u64 {
        self.degraded
    }

    fn recode(&mut self, row: Row) -> Row {
        let schema = Arc::clone(row.schema());
        let values: Vec<Value> = row
            .into_values()
            .into_iter()
            .zip(schema.columns())
            .map(|(value, column)| match value.coerce(column.value_type) {
                Ok(v) => v,
                Err(e) => {
                    self.degraded += 1;
                    tracing::warn!(
                        processor = self.core.name(),
                        column = column.name,
                        error = %e,
                        "Value conversion failed, using null"
                    );
                    Value::Null
                }
            })
            .collect();
        let mut recoded = Row::new(schema);
        for (i, v) in values.into_iter().enumerate() {
            recoded.set_value_at(i, v);
        }
        recoded
    }
}

impl Processor for RecodingProcessor {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn init(&mut self) -> Result<()> {
        self.core.initialized()?;
        init_upstream(self.core.name(), self.upstream.as_mut())
    }

    fn next(&mut self) -> Result<Option<Row>> {
        let Some(started) = self.core.begin()? else {
            return Ok(None);
        };
        let row = self.upstream.next()?.map(|r| self.recode(r));
        Ok(self.core.end(started, row))
    }

    fn close(&mut self) {
        if self.core.close() {
            self.upstream.close();
        }
    }

    fn output_description(&self) -> Arc<Schema> {
        self.upstream.output_description()
    }

    fn metrics(&self) -> ProcessorMetrics {
        self.core.metrics(self.upstream.metrics().overall)
    }

    fn state(&self) -> ProcessorState {
        self.core.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::{collect_rows, TableProcessor};
    use tributary_types::{ColumnDef, ValueType};

    #[test]
    fn converts_and_degrades() {
        let schema = Arc::new(
            Schema::new(vec![
                ColumnDef::new("qty").with_type(ValueType::Integer),
                ColumnDef::new("label"),
            ])
            .unwrap(),
        );
        let table = TableProcessor::from_values(
            "raw",
            schema,
            vec![
                vec![Value::from("7"), Value::Int(3)],
                vec![Value::from("seven"), Value::Null],
            ],
        )
        .unwrap();
        let mut p = RecodingProcessor::new(Box::new(table));
        let rows = collect_rows(&mut p).unwrap();
        assert_eq!(rows[0].values(), &[Value::Int(7), Value::from("3")]);
        assert_eq!(rows[1].values(), &[Value::Null, Value::Null]);
        assert_eq!(p.degraded(), 1);
    }
}
