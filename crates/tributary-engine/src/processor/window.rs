use std::sync::Arc;

use tributary_types::{EtlError, Result, Row, Schema};

use super::{init_upstream, Executable, Processor, ProcessorCore, ProcessorMetrics, ProcessorState};

/// Inclusive, 1-based range of input rows to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowWindow {
    start: u64,
    end: Option<u64>,
}

impl Default for RowWindow {
    fn default() -> Self {
        Self { start: 1, end: None }
    }
}

impl RowWindow {
    /// # Errors
    ///
    /// Returns [`EtlError::Configuration`] if `start` is 0 or `end` is
    /// smaller than `start`.
    pub fn new(start: u64, end: Option<u64>) -> Result<Self> {
        if start == 0 {
            return Err(EtlError::configuration(
                "Row window parameter start must be at least 1",
            ));
        }
        if let Some(end) = end {
            if end < start {
                return Err(EtlError::configuration(format!(
                    "Row window {start}..{end}: parameter end can not be smaller than start parameter"
                )));
            }
        }
        Ok(Self { start, end })
    }

    #[must_use]
    pub fn start(&self) -> u64 {
        self.start
    }

    #[must_use]
    pub fn end(&self) -> Option<u64> {
        self.end
    }

    #[must_use]
    pub fn is_unbounded(&self) -> bool {
        self.start == 1 && self.end.is_none()
    }

    #[must_use]
    pub fn contains(&self, row: u64) -> bool {
        row >= self.start && self.end.map_or(true, |end| row <= end)
    }

    fn is_past(&self, row: u64) -> bool {
        self.end.is_some_and(|end| row > end)
    }
}

/// Emits only the upstream rows inside a [`RowWindow`], and stops early
/// when its execution is no longer executable.
pub struct WindowProcessor {
    core: ProcessorCore,
    upstream: Box<dyn Processor>,
    window: RowWindow,
    position: u64,
    executable: Option<Arc<dyn Executable>>,
}

impl WindowProcessor {
    #[must_use]
    pub fn new(upstream: Box<dyn Processor>, window: RowWindow) -> Self {
        Self {
            core: ProcessorCore::new(format!("{}#window", upstream.name())),
            upstream,
            window,
            position: 0,
            executable: None,
        }
    }

    #[must_use]
    pub fn with_executable(mut self, executable: Arc<dyn Executable>) -> Self {
        self.executable = Some(executable);
        self
    }

    fn is_executable(&self) -> bool {
        self.executable.as_ref().map_or(true, |e| e.is_executable())
    }

    fn pull(&mut self) -> Result<Option<Row>> {
        loop {
            if !self.is_executable() {
                tracing::info!(processor = self.core.name(), "Execution stopped, ending stream");
                self.core.exhaust();
                return Ok(None);
            }
            if self.window.is_past(self.position + 1) {
                return Ok(None);
            }
            let Some(row) = self.upstream.next()? else {
                return Ok(None);
            };
            self.position += 1;
            if self.window.contains(self.position) {
                return Ok(Some(row));
            }
        }
    }
}

impl Processor for WindowProcessor {
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
        let row = self.pull()?;
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
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::processor::collect_rows;
    use crate::processor::tests::amounts;
    use tributary_types::Value;

    fn ids(rows: &[Row]) -> Vec<i64> {
        rows.iter()
            .map(|r| r.value("id").unwrap().as_i64().unwrap())
            .collect()
    }

    #[test]
    fn end_before_start_is_rejected() {
        let err = RowWindow::new(5, Some(3)).unwrap_err();
        assert!(matches!(err, EtlError::Configuration(_)));
        assert!(err
            .to_string()
            .contains("parameter end can not be smaller than start parameter"));
    }

    #[test]
    fn start_zero_is_rejected() {
        assert!(RowWindow::new(0, None).is_err());
    }

    #[test]
    fn emits_inclusive_range() {
        let mut p = WindowProcessor::new(Box::new(amounts(10)), RowWindow::new(3, Some(5)).unwrap());
        let rows = collect_rows(&mut p).unwrap();
        assert_eq!(ids(&rows), vec![3, 4, 5]);
    }

    #[test]
    fn stops_pulling_after_end() {
        let mut p = WindowProcessor::new(Box::new(amounts(10)), RowWindow::new(1, Some(2)).unwrap());
        collect_rows(&mut p).unwrap();
        assert_eq!(p.upstream.metrics().rows, 2);
    }

    #[test]
    fn unbounded_window_passes_everything() {
        let window = RowWindow::default();
        assert!(window.is_unbounded());
        let mut p = WindowProcessor::new(Box::new(amounts(4)), window);
        assert_eq!(collect_rows(&mut p).unwrap().len(), 4);
    }

    struct Flag(AtomicBool);

    impl Executable for Flag {
        fn is_executable(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn stops_when_not_executable() {
        let flag = Arc::new(Flag(AtomicBool::new(true)));
        let mut p = WindowProcessor::new(Box::new(amounts(5)), RowWindow::default())
            .with_executable(flag.clone());
        p.init().unwrap();
        assert_eq!(p.next().unwrap().unwrap().value("id"), Some(&Value::Int(1)));
        flag.0.store(false, Ordering::SeqCst);
        assert!(p.next().unwrap().is_none());
        flag.0.store(true, Ordering::SeqCst);
        assert!(p.next().unwrap().is_none());
    }
}
