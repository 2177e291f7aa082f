//! Built-in function kernels.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use tributary_types::{EtlError, Result, Value};

use super::{FunctionKernel, FunctionSpec};
use crate::processor::{Processor, ProcessorMetrics, ProcessorState};

fn illegal<T: fmt::Display>(parameter: &str, value: &str, all: &[T]) -> EtlError {
    let legal: Vec<String> = all.iter().map(ToString::to_string).collect();
    let legal: Vec<&str> = legal.iter().map(String::as_str).collect();
    EtlError::illegal_value(parameter, value, &legal)
}

// ---------------------------------------------------------------------------
// arithmetic
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl Operator {
    pub const ALL: [Operator; 4] = [Self::Add, Self::Subtract, Self::Multiply, Self::Divide];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Subtract => "subtract",
            Self::Multiply => "multiply",
            Self::Divide => "divide",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| illegal("operator", s, &Self::ALL))
    }
}

/// Folds all inputs left to right with one operator. Nulls count as 0.
#[derive(Debug)]
pub struct Arithmetic {
    operator: Operator,
}

impl Arithmetic {
    /// # Errors
    ///
    /// Returns [`EtlError::Configuration`] for an unknown `operator`.
    pub fn from_spec(spec: &FunctionSpec) -> Result<Self> {
        let operator = spec.param("operator").unwrap_or("add").parse()?;
        Ok(Self { operator })
    }
}

impl FunctionKernel for Arithmetic {
    fn evaluate(&mut self, args: &[Value]) -> Result<Value> {
        let mut operands = args
            .iter()
            .map(|v| if v.is_null() { Ok(0.0) } else { v.as_f64() });
        let Some(first) = operands.next() else {
            return Ok(Value::Null);
        };
        let mut acc = first?;
        for operand in operands {
            let operand = operand?;
            acc = match self.operator {
                Operator::Add => acc + operand,
                Operator::Subtract => acc - operand,
                Operator::Multiply => acc * operand,
                Operator::Divide => {
                    if operand == 0.0 {
                        return Ok(Value::Null);
                    }
                    acc / operand
                }
            };
        }
        Ok(Value::Double(acc))
    }
}

// ---------------------------------------------------------------------------
// concat
// ---------------------------------------------------------------------------

/// Joins the text form of all inputs with a `separator` (default empty).
#[derive(Debug)]
pub struct Concat {
    separator: String,
}

impl Concat {
    #[must_use]
    pub fn from_spec(spec: &FunctionSpec) -> Self {
        Self {
            separator: spec.param("separator").unwrap_or_default().to_string(),
        }
    }
}

impl FunctionKernel for Concat {
    fn evaluate(&mut self, args: &[Value]) -> Result<Value> {
        let parts: Vec<String> = args.iter().map(ToString::to_string).collect();
        Ok(Value::Text(parts.join(&self.separator)))
    }
}

// ---------------------------------------------------------------------------
// case
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Case {
    Upper,
    Lower,
}

impl Case {
    pub const ALL: [Case; 2] = [Self::Upper, Self::Lower];
}

impl fmt::Display for Case {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Upper => "upper",
            Self::Lower => "lower",
        })
    }
}

/// Upper- or lowercases its first input.
#[derive(Debug)]
pub struct ChangeCase {
    case: Case,
}

impl ChangeCase {
    /// # Errors
    ///
    /// Returns [`EtlError::Configuration`] for an unknown `case`.
    pub fn from_spec(spec: &FunctionSpec) -> Result<Self> {
        let case = match spec.param("case").unwrap_or("upper") {
            "upper" => Case::Upper,
            "lower" => Case::Lower,
            other => return Err(illegal("case", other, &Case::ALL)),
        };
        Ok(Self { case })
    }
}

impl FunctionKernel for ChangeCase {
    fn evaluate(&mut self, args: &[Value]) -> Result<Value> {
        Ok(match args.first() {
            None | Some(Value::Null) => Value::Null,
            Some(v) => {
                let s = v.to_string();
                Value::Text(match self.case {
                    Case::Upper => s.to_uppercase(),
                    Case::Lower => s.to_lowercase(),
                })
            }
        })
    }
}

// ---------------------------------------------------------------------------
// constant
// ---------------------------------------------------------------------------

/// Always returns the `value` parameter, converted to the output type.
#[derive(Debug)]
pub struct Constant {
    value: Value,
}

impl Constant {
    #[must_use]
    pub fn from_spec(spec: &FunctionSpec) -> Self {
        Self {
            value: spec.param("value").map_or(Value::Null, Value::from),
        }
    }
}

impl FunctionKernel for Constant {
    fn evaluate(&mut self, _args: &[Value]) -> Result<Value> {
        Ok(self.value.clone())
    }
}

// ---------------------------------------------------------------------------
// lookup
// ---------------------------------------------------------------------------

/// Maps its first input through a key/value table read from another
/// component. The table is built on first use by draining the child
/// processor; unknown keys yield the `default` parameter or null.
pub struct Lookup {
    processor: Box<dyn Processor>,
    key: String,
    value: String,
    default: Value,
    table: Option<HashMap<String, Value>>,
}

impl Lookup {
    /// # Errors
    ///
    /// Returns [`EtlError::Configuration`] when `key` or `value` is missing.
    pub fn new(spec: &FunctionSpec, processor: Box<dyn Processor>) -> Result<Self> {
        let required = |p: &str| {
            spec.param(p).map(str::to_string).ok_or_else(|| {
                EtlError::configuration(format!(
                    "Function {}: parameter '{p}' is required",
                    spec.name
                ))
            })
        };
        Ok(Self {
            key: required("key")?,
            value: required("value")?,
            default: spec.param("default").map_or(Value::Null, Value::from),
            processor,
            table: None,
        })
    }

    fn build(&mut self) -> Result<HashMap<String, Value>> {
        let started = Instant::now();
        if self.processor.state() == ProcessorState::Uninitialized {
            self.processor.init()?;
        }
        let mut table = HashMap::new();
        while let Some(row) = self.processor.next()? {
            let key = row.value(&self.key).ok_or_else(|| {
                EtlError::runtime(format!("Lookup key column {} not found", self.key))
            })?;
            let value = row.value(&self.value).cloned().ok_or_else(|| {
                EtlError::runtime(format!("Lookup value column {} not found", self.value))
            })?;
            table.entry(key.to_string()).or_insert(value);
        }
        self.processor.close();
        tracing::debug!(
            source = self.processor.name(),
            entries = table.len(),
            elapsed_ms = started.elapsed().as_millis(),
            "Lookup table built"
        );
        Ok(table)
    }
}

impl FunctionKernel for Lookup {
    fn evaluate(&mut self, args: &[Value]) -> Result<Value> {
        if self.table.is_none() {
            self.table = Some(self.build()?);
        }
        let key = args.first().map(ToString::to_string).unwrap_or_default();
        Ok(self
            .table
            .as_ref()
            .and_then(|t| t.get(&key))
            .cloned()
            .unwrap_or_else(|| self.default.clone()))
    }

    fn child_metrics(&self) -> Vec<ProcessorMetrics> {
        vec![self.processor.metrics()]
    }

    fn close(&mut self) {
        self.processor.close();
        self.table = None;
    }
}
