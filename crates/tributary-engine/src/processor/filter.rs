use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tributary_types::{EtlError, Result, Row, Schema, Value};

use super::{init_upstream, Processor, ProcessorCore, ProcessorMetrics, ProcessorState};

/// Comparison applied by a [`RowPredicate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub const ALL: [CompareOp; 6] = [Self::Eq, Self::Ne, Self::Lt, Self::Le, Self::Gt, Self::Ge];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Lt => "lt",
            Self::Le => "le",
            Self::Gt => "gt",
            Self::Ge => "ge",
        }
    }

    fn holds(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Lt => ordering == Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
            Self::Gt => ordering == Ordering::Greater,
            Self::Ge => ordering != Ordering::Less,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompareOp {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| {
                let legal: Vec<&str> = Self::ALL.iter().map(|op| op.as_str()).collect();
                EtlError::illegal_value("op", s, &legal)
            })
    }
}

/// Accept/reject rule for one column of a row.
///
/// Numeric operands compare numerically, everything else as text. A null
/// column value only satisfies `ne`.
#[derive(Debug, Clone, PartialEq)]
pub struct RowPredicate {
    pub column: String,
    pub op: CompareOp,
    pub value: Value,
}

impl RowPredicate {
    #[must_use]
    pub fn new(column: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    /// # Errors
    ///
    /// Returns [`EtlError::Runtime`] for an unknown column and
    /// [`EtlError::Conversion`] when the operands cannot be compared.
    pub fn accept(&self, row: &Row) -> Result<bool> {
        let actual = row.value(&self.column).ok_or_else(|| {
            EtlError::runtime(format!("Filter column {} not found", self.column))
        })?;
        if actual.is_null() || self.value.is_null() {
            let both = actual.is_null() && self.value.is_null();
            return Ok(match self.op {
                CompareOp::Eq | CompareOp::Le | CompareOp::Ge => both,
                CompareOp::Ne => !both,
                CompareOp::Lt | CompareOp::Gt => false,
            });
        }
        let ordering = match &self.value {
            Value::Int(_) | Value::Double(_) => {
                let left = actual.as_f64()?;
                let right = self.value.as_f64()?;
                left.partial_cmp(&right)
                    .ok_or_else(|| EtlError::conversion(actual, tributary_types::ValueType::Double))?
            }
            Value::Bool(b) => actual.as_bool()?.cmp(b),
            other => actual.to_string().cmp(&other.to_string()),
        };
        Ok(self.op.holds(ordering))
    }
}

/// Keeps the rows accepted by every predicate.
///
/// A predicate that cannot be evaluated rejects the row with a warning.
pub struct FilterProcessor {
    core: ProcessorCore,
    upstream: Box<dyn Processor>,
    predicates: Vec<RowPredicate>,
    rejected: u64,
}

impl FilterProcessor {
    #[must_use]
    pub fn new(upstream: Box<dyn Processor>, predicates: Vec<RowPredicate>) -> Self {
        Self {
            core: ProcessorCore::new(format!("{}#filter", upstream.name())),
            upstream,
            predicates,
            rejected: 0,
        }
    }

    #[must_use]
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    fn accept(&self, row: &Row) -> bool {
        self.predicates.iter().all(|p| match p.accept(row) {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::warn!(
                    processor = self.core.name(),
                    column = p.column,
                    error = %e,
                    "Filter could not be evaluated, rejecting row"
                );
                false
            }
        })
    }
}

impl Processor for FilterProcessor {
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
        let row = loop {
            match self.upstream.next()? {
                Some(row) if self.accept(&row) => break Some(row),
                Some(_) => self.rejected += 1,
                None => break None,
            }
        };
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
