//! Functions computed per row inside a transform.
//!
//! A [`Function`] wraps a [`FunctionKernel`] with its declared inputs, an
//! output type, an optional result cache and a calculation counter. Kernels
//! are created through the component registry from a [`FunctionSpec`].

pub mod builtins;

use std::collections::{BTreeMap, HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tributary_types::{ColumnDef, Locator, Result, Value, ValueType};

use crate::processor::ProcessorMetrics;

/// Default number of results kept by a buffered function.
pub const DEFAULT_CACHE_SIZE: usize = 100;

/// Computation behind a function.
pub trait FunctionKernel: Send {
    /// Compute the result for one set of input values, given in the order
    /// the inputs were declared.
    ///
    /// # Errors
    ///
    /// Returns a conversion or runtime error; the owning [`Function`]
    /// degrades conversion errors to `Null`.
    fn evaluate(&mut self, args: &[Value]) -> Result<Value>;

    /// Processors owned by the kernel, reported separately from the
    /// transform's own time.
    fn child_metrics(&self) -> Vec<ProcessorMetrics> {
        Vec::new()
    }

    fn close(&mut self) {}
}

/// Declarative description of a function inside a transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,
    /// Registry tag of the kernel (`arithmetic`, `lookup`, ...).
    pub kind: String,
    /// Inputs in declaration order: references to upstream columns or
    /// other functions, or constants.
    #[serde(default)]
    pub inputs: Vec<ColumnDef>,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub output_type: ValueType,
    #[serde(default)]
    pub force_eval: bool,
    #[serde(default = "default_buffered")]
    pub buffered: bool,
}

fn default_buffered() -> bool {
    true
}

impl FunctionSpec {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            inputs: Vec::new(),
            params: BTreeMap::new(),
            output_type: ValueType::default(),
            force_eval: false,
            buffered: true,
        }
    }

    /// Input bound to the upstream column or function named `reference`.
    #[must_use]
    pub fn with_input(mut self, name: impl Into<String>, reference: impl Into<String>) -> Self {
        self.inputs.push(ColumnDef::new(name).with_input(reference));
        self
    }

    #[must_use]
    pub fn with_constant(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inputs.push(ColumnDef::new(name).with_constant(value));
        self
    }

    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_output_type(mut self, output_type: ValueType) -> Self {
        self.output_type = output_type;
        self
    }

    #[must_use]
    pub fn with_force_eval(mut self, force_eval: bool) -> Self {
        self.force_eval = force_eval;
        self
    }

    #[must_use]
    pub fn with_buffered(mut self, buffered: bool) -> Self {
        self.buffered = buffered;
        self
    }

    #[must_use]
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Components this function reads from, resolved inside `project`.
    ///
    /// Only the `source` parameter names a component. A `source` naming a
    /// sibling function is not a component dependency and is ignored.
    #[must_use]
    pub fn dependencies(&self, project: &str) -> Vec<Locator> {
        match self.param("source") {
            Some(source) => match Locator::parse_in(project, source) {
                Ok(locator) => vec![locator],
                Err(_) => {
                    tracing::debug!(
                        function = self.name,
                        source,
                        "Function source is not a component, ignoring"
                    );
                    Vec::new()
                }
            },
            None => Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Result cache
// ---------------------------------------------------------------------------

/// Bounded first-in-first-out memo of function results.
#[derive(Debug)]
struct ResultCache {
    capacity: usize,
    order: VecDeque<String>,
    values: HashMap<String, Value>,
}

impl ResultCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            values: HashMap::with_capacity(capacity),
        }
    }

    fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    fn insert(&mut self, key: String, value: Value) {
        if self.capacity == 0 || self.values.contains_key(&key) {
            return;
        }
        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.values.remove(&oldest);
            }
        }
        self.order.push_back(key.clone());
        self.values.insert(key, value);
    }
}

/// Cache key of an argument list. JSON has no representation for
/// non-finite doubles, so argument lists containing one are not cached.
fn cache_key(args: &[Value]) -> Option<String> {
    if args
        .iter()
        .any(|v| matches!(v, Value::Double(d) if !d.is_finite()))
    {
        return None;
    }
    serde_json::to_string(args).ok()
}

// ---------------------------------------------------------------------------
// Function
// ---------------------------------------------------------------------------

/// Runtime instance of a function, owned by one transform processor.
pub struct Function {
    name: String,
    inputs: Vec<ColumnDef>,
    output_type: ValueType,
    force_eval: bool,
    kernel: Box<dyn FunctionKernel>,
    cache: Option<ResultCache>,
    calculations: u64,
}

impl Function {
    #[must_use]
    pub fn new(spec: &FunctionSpec, kernel: Box<dyn FunctionKernel>) -> Self {
        Self {
            name: spec.name.clone(),
            inputs: spec.inputs.clone(),
            output_type: spec.output_type,
            force_eval: spec.force_eval,
            kernel,
            cache: spec.buffered.then(|| ResultCache::new(DEFAULT_CACHE_SIZE)),
            calculations: 0,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn inputs(&self) -> &[ColumnDef] {
        &self.inputs
    }

    #[must_use]
    pub fn output_type(&self) -> ValueType {
        self.output_type
    }

    #[must_use]
    pub fn is_force_eval(&self) -> bool {
        self.force_eval
    }

    /// Number of times the kernel actually computed a result.
    #[must_use]
    pub fn calculations(&self) -> u64 {
        self.calculations
    }

    /// Result for `args`, served from the cache when possible.
    ///
    /// # Errors
    ///
    /// Returns runtime errors of the kernel. Conversion failures are
    /// logged and yield `Null`.
    pub fn evaluate(&mut self, args: Vec<Value>) -> Result<Value> {
        let key = self.cache.as_ref().and_then(|_| cache_key(&args));
        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            if let Some(hit) = cache.get(key) {
                return Ok(hit.clone());
            }
        }
        self.calculations += 1;
        let value = match self
            .kernel
            .evaluate(&args)
            .and_then(|v| v.coerce(self.output_type))
        {
            Ok(v) => v,
            Err(e @ tributary_types::EtlError::Conversion { .. }) => {
                tracing::warn!(function = self.name, error = %e, "Function returned null");
                Value::Null
            }
            Err(e) => return Err(e),
        };
        if let (Some(cache), Some(key)) = (&mut self.cache, key) {
            cache.insert(key, value.clone());
        }
        Ok(value)
    }

    #[must_use]
    pub fn child_metrics(&self) -> Vec<ProcessorMetrics> {
        self.kernel.child_metrics()
    }

    pub fn close(&mut self) {
        self.kernel.close();
    }
}

impl std::fmt::Debug for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("output_type", &self.output_type)
            .field("force_eval", &self.force_eval)
            .field("calculations", &self.calculations)
            .finish_non_exhaustive()
    }
}
