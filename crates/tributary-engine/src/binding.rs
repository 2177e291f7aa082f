//! Column binding for transforms.
//!
//! [`TransformInputProcessor`] resolves every output column and every
//! function input of a transform to either a column of the upstream row, the
//! result of a sibling function, or a constant. Binding happens in two
//! passes: all references are assigned first, then a depth-first walk over
//! the function graph rejects cycles. Bindings are cached per upstream
//! schema epoch and only recomputed when the upstream column set changes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tributary_types::{
    ColumnDef, ColumnSource, EtlError, NodeKind, Result, Row, Schema, Value,
};

use crate::function::Function;
use crate::processor::{
    init_upstream, Processor, ProcessorCore, ProcessorMetrics, ProcessorState,
};

/// Output column of a transform.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputColumn {
    pub column: ColumnDef,
    /// Take the value type from whatever the column is bound to.
    pub inherit_type: bool,
}

impl OutputColumn {
    /// Column whose type is taken from its binding.
    #[must_use]
    pub fn new(column: ColumnDef) -> Self {
        Self {
            column,
            inherit_type: true,
        }
    }

    /// Column keeping its declared type.
    #[must_use]
    pub fn typed(column: ColumnDef) -> Self {
        Self {
            column,
            inherit_type: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Binding {
    Source(usize),
    Function(usize),
    Constant(Value),
    /// Implicit output of measure normalization, always null here.
    Unbound,
}

#[derive(Debug)]
struct BindingPlan {
    epoch: u64,
    outputs: Vec<Binding>,
    inputs: Vec<Vec<Binding>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Visiting,
    Resolved,
}

/// Binds a transform's outputs and functions to its upstream rows.
pub struct TransformInputProcessor {
    core: ProcessorCore,
    transform: String,
    upstream: Box<dyn Processor>,
    functions: Vec<Function>,
    function_index: HashMap<String, usize>,
    outputs: Vec<OutputColumn>,
    schema: Arc<Schema>,
    plan: Option<BindingPlan>,
    rebinds: u64,
}

impl TransformInputProcessor {
    /// # Errors
    ///
    /// Returns [`EtlError::Configuration`] for duplicate function or output
    /// names and for attributes referring to an unknown level.
    pub fn new(
        transform: impl Into<String>,
        upstream: Box<dyn Processor>,
        functions: Vec<Function>,
        outputs: Vec<OutputColumn>,
    ) -> Result<Self> {
        let transform = transform.into();
        let mut function_index = HashMap::with_capacity(functions.len());
        for (i, f) in functions.iter().enumerate() {
            if function_index.insert(f.name().to_string(), i).is_some() {
                return Err(EtlError::configuration(format!(
                    "Duplicate function name '{}' in Transform {transform}",
                    f.name()
                )));
            }
        }
        for output in &outputs {
            if let NodeKind::Attribute { level: Some(level) } = &output.column.kind {
                let is_level = outputs
                    .iter()
                    .any(|o| o.column.name == *level && matches!(o.column.kind, NodeKind::Level { .. }));
                if !is_level {
                    return Err(EtlError::configuration(format!(
                        "Attribute {} in Transform {transform} refers to unknown level {level}",
                        output.column.name
                    )));
                }
            }
        }
        let schema = Arc::new(Schema::new(
            outputs.iter().map(|o| o.column.clone()).collect(),
        )?);
        Ok(Self {
            core: ProcessorCore::new(transform.clone()),
            transform,
            upstream,
            functions,
            function_index,
            outputs,
            schema,
            plan: None,
            rebinds: 0,
        })
    }

    #[must_use]
    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    /// Calculation count of the function named `name`.
    #[must_use]
    pub fn calculations(&self, name: &str) -> Option<u64> {
        self.function_index
            .get(name)
            .map(|&i| self.functions[i].calculations())
    }

    /// How many times the bindings were computed.
    #[must_use]
    pub fn rebinds(&self) -> u64 {
        self.rebinds
    }

    /// Metrics of processors owned by functions.
    #[must_use]
    pub fn function_metrics(&self) -> Vec<ProcessorMetrics> {
        self.functions.iter().flat_map(Function::child_metrics).collect()
    }

    // -- binding ------------------------------------------------------------

    fn find_input(&self, name: &str, source: &Schema) -> Result<Binding> {
        if let Some(&j) = self.function_index.get(name) {
            return Ok(Binding::Function(j));
        }
        if let Some(i) = source.index_of(name) {
            return Ok(Binding::Source(i));
        }
        let normalized = self.outputs.iter().any(|o| {
            matches!(&o.column.kind, NodeKind::Value { normalize: Some(target) } if target == name)
        });
        if normalized {
            return Ok(Binding::Unbound);
        }
        Err(EtlError::binding(name, &self.transform))
    }

    fn bind_column(&self, column: &ColumnDef, source: &Schema) -> Result<Binding> {
        match &column.source {
            ColumnSource::Constant(v) => Ok(Binding::Constant(v.clone())),
            ColumnSource::Input(name) => self.find_input(name, source),
        }
    }

    fn bind_function_input(&self, function: &Function, column: &ColumnDef, source: &Schema) -> Result<Binding> {
        match &column.source {
            ColumnSource::Constant(v) => Ok(Binding::Constant(v.clone())),
            // A function named like its input reads the upstream column.
            ColumnSource::Input(name) if name == function.name() => match source.index_of(name) {
                Some(i) => Ok(Binding::Source(i)),
                None => self.find_input(name, source),
            },
            ColumnSource::Input(name) => self.find_input(name, source),
        }
    }

    fn bind(&self, source: &Schema) -> Result<BindingPlan> {
        let outputs = self
            .outputs
            .iter()
            .map(|o| self.bind_column(&o.column, source))
            .collect::<Result<Vec<_>>>()?;
        for output in &self.outputs {
            if let NodeKind::Level { weight: Some(weight) } = &output.column.kind {
                self.find_input(weight, source)?;
            }
        }
        let inputs = self
            .functions
            .iter()
            .map(|f| {
                f.inputs()
                    .iter()
                    .map(|c| self.bind_function_input(f, c, source))
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;
        self.detect_cycles(&inputs)?;
        Ok(BindingPlan {
            epoch: source.epoch(),
            outputs,
            inputs,
        })
    }

    fn detect_cycles(&self, inputs: &[Vec<Binding>]) -> Result<()> {
        let mut marks = vec![Mark::Unvisited; self.functions.len()];
        for i in 0..self.functions.len() {
            self.visit(i, inputs, &mut marks)?;
        }
        Ok(())
    }

    fn visit(&self, i: usize, inputs: &[Vec<Binding>], marks: &mut [Mark]) -> Result<()> {
        if marks[i] == Mark::Resolved {
            return Ok(());
        }
        marks[i] = Mark::Visiting;
        let function = &self.functions[i];
        for (column, binding) in function.inputs().iter().zip(&inputs[i]) {
            if let Binding::Function(j) = *binding {
                if marks[j] == Mark::Visiting {
                    return Err(EtlError::cyclic(
                        function.name(),
                        column.input_name().unwrap_or(&column.name),
                    ));
                }
                self.visit(j, inputs, marks)?;
            }
        }
        marks[i] = Mark::Resolved;
        Ok(())
    }

    fn rebind(&mut self, source: &Schema) -> Result<()> {
        let plan = self.bind(source)?;
        self.rebinds += 1;
        tracing::debug!(
            transform = self.transform,
            epoch = plan.epoch,
            "Bound transform inputs"
        );
        self.plan = Some(plan);
        Ok(())
    }

    /// Output schema with inherited types resolved against the plan.
    fn resolve_schema(&self, source: &Schema) -> Result<Arc<Schema>> {
        let Some(plan) = &self.plan else {
            return Ok(Arc::clone(&self.schema));
        };
        let columns = self
            .outputs
            .iter()
            .zip(&plan.outputs)
            .map(|(o, binding)| {
                let mut column = o.column.clone();
                if o.inherit_type {
                    match binding {
                        Binding::Source(i) => column.value_type = source.columns()[*i].value_type,
                        Binding::Function(j) => column.value_type = self.functions[*j].output_type(),
                        Binding::Constant(v) => {
                            if let Some(t) = v.value_type() {
                                column.value_type = t;
                            }
                        }
                        Binding::Unbound => {}
                    }
                }
                column
            })
            .collect();
        Ok(Arc::new(Schema::new(columns)?))
    }

    // -- evaluation ---------------------------------------------------------

    fn fill(&mut self, source: &Row) -> Result<Row> {
        if self.plan.as_ref().map(|p| p.epoch) != Some(source.epoch()) {
            let schema = Arc::clone(source.schema());
            self.rebind(&schema)?;
        }
        let Self {
            functions, plan, ..
        } = self;
        let Some(plan) = plan.as_ref() else {
            return Err(EtlError::runtime("transform inputs are not bound"));
        };
        let mut memo: Vec<Option<Value>> = vec![None; functions.len()];
        for j in 0..functions.len() {
            if functions[j].is_force_eval() {
                evaluate(j, functions, &plan.inputs, source, &mut memo)?;
            }
        }
        let values = plan
            .outputs
            .iter()
            .map(|b| resolve(b, functions, &plan.inputs, source, &mut memo))
            .collect::<Result<Vec<_>>>()?;
        Row::new(Arc::clone(&self.schema)).with_values(values)
    }
}

fn resolve(
    binding: &Binding,
    functions: &mut [Function],
    inputs: &[Vec<Binding>],
    source: &Row,
    memo: &mut [Option<Value>],
) -> Result<Value> {
    Ok(match binding {
        Binding::Source(i) => source.value_at(*i).cloned().unwrap_or_default(),
        Binding::Function(j) => evaluate(*j, functions, inputs, source, memo)?,
        Binding::Constant(v) => v.clone(),
        Binding::Unbound => Value::Null,
    })
}

/// Evaluate function `j` at most once per row.
fn evaluate(
    j: usize,
    functions: &mut [Function],
    inputs: &[Vec<Binding>],
    source: &Row,
    memo: &mut [Option<Value>],
) -> Result<Value> {
    if let Some(v) = &memo[j] {
        return Ok(v.clone());
    }
    let args = inputs[j]
        .iter()
        .map(|b| resolve(b, functions, inputs, source, memo))
        .collect::<Result<Vec<_>>>()?;
    let value = functions[j].evaluate(args)?;
    memo[j] = Some(value.clone());
    Ok(value)
}

impl Processor for TransformInputProcessor {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn init(&mut self) -> Result<()> {
        self.core.initialized()?;
        init_upstream(self.core.name(), self.upstream.as_mut())?;
        let source = self.upstream.output_description();
        self.rebind(&source)?;
        self.schema = self.resolve_schema(&source)?;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Row>> {
        let Some(started) = self.core.begin()? else {
            return Ok(None);
        };
        let row = match self.upstream.next()? {
            Some(source) => Some(self.fill(&source)?),
            None => None,
        };
        Ok(self.core.end(started, row))
    }

    fn close(&mut self) {
        if self.core.close() {
            for f in &mut self.functions {
                f.close();
            }
            self.upstream.close();
        }
    }

    fn output_description(&self) -> Arc<Schema> {
        Arc::clone(&self.schema)
    }

    fn metrics(&self) -> ProcessorMetrics {
        let nested: Duration = self.upstream.metrics().overall
            + self
                .function_metrics()
                .iter()
                .map(|m| m.overall)
                .sum::<Duration>();
        self.core.metrics(nested)
    }

    fn state(&self) -> ProcessorState {
        self.core.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::builtins::{Arithmetic, Concat};
    use crate::function::FunctionSpec;
    use crate::processor::tests::amounts;
    use crate::processor::{collect_rows, TableProcessor};
    use tributary_types::ValueType;

    fn arithmetic(spec: FunctionSpec) -> Function {
        let kernel = Arithmetic::from_spec(&spec).unwrap();
        Function::new(&spec, Box::new(kernel))
    }

    fn doubled_spec() -> FunctionSpec {
        FunctionSpec::new("doubled", "arithmetic")
            .with_input("left", "amount")
            .with_constant("right", 2_i64)
            .with_param("operator", "multiply")
            .with_output_type(ValueType::Double)
    }

    fn doubled(force_eval: bool) -> Function {
        arithmetic(doubled_spec().with_force_eval(force_eval))
    }

    fn outputs() -> Vec<OutputColumn> {
        vec![
            OutputColumn::new(ColumnDef::new("id").with_kind(NodeKind::Coordinate)),
            OutputColumn::new(ColumnDef::new("doubled").with_kind(NodeKind::Value { normalize: None })),
        ]
    }

    #[test]
    fn doubles_amounts_in_input_order() {
        let mut p = TransformInputProcessor::new("t", Box::new(amounts(3)), vec![doubled(true)], outputs())
            .unwrap();
        let rows = collect_rows(&mut p).unwrap();
        let got: Vec<(Value, Value)> = rows
            .iter()
            .map(|r| (r.value("id").cloned().unwrap(), r.value("doubled").cloned().unwrap()))
            .collect();
        assert_eq!(
            got,
            vec![
                (Value::Int(1), Value::Double(20.0)),
                (Value::Int(2), Value::Double(40.0)),
                (Value::Int(3), Value::Double(60.0)),
            ]
        );
        assert_eq!(p.calculations("doubled"), Some(3));
        assert_eq!(p.rebinds(), 1);
    }

    #[test]
    fn inherited_types_follow_bindings() {
        let mut p = TransformInputProcessor::new("t", Box::new(amounts(1)), vec![doubled(false)], outputs())
            .unwrap();
        p.init().unwrap();
        let schema = p.output_description();
        assert_eq!(schema.columns()[0].value_type, ValueType::Integer);
        assert_eq!(schema.columns()[1].value_type, ValueType::Double);
    }

    #[test]
    fn unread_lazy_function_is_never_evaluated() {
        let outputs = vec![OutputColumn::new(ColumnDef::new("id"))];
        let mut p = TransformInputProcessor::new("t", Box::new(amounts(3)), vec![doubled(false)], outputs)
            .unwrap();
        collect_rows(&mut p).unwrap();
        assert_eq!(p.calculations("doubled"), Some(0));
    }

    #[test]
    fn force_eval_runs_even_when_unread() {
        let outputs = vec![OutputColumn::new(ColumnDef::new("id"))];
        let mut p = TransformInputProcessor::new("t", Box::new(amounts(3)), vec![doubled(true)], outputs)
            .unwrap();
        collect_rows(&mut p).unwrap();
        assert_eq!(p.calculations("doubled"), Some(3));
    }

    #[test]
    fn shared_function_is_evaluated_once_per_row() {
        let quadrupled = arithmetic(
            FunctionSpec::new("quadrupled", "arithmetic")
                .with_input("a", "doubled")
                .with_input("b", "doubled")
                .with_output_type(ValueType::Double),
        );
        let outputs = vec![
            OutputColumn::new(ColumnDef::new("doubled")),
            OutputColumn::new(ColumnDef::new("quadrupled")),
        ];
        let mut p = TransformInputProcessor::new(
            "t",
            Box::new(amounts(2)),
            vec![arithmetic(doubled_spec().with_buffered(false)), quadrupled],
            outputs,
        )
        .unwrap();
        let rows = collect_rows(&mut p).unwrap();
        assert_eq!(rows[1].value("quadrupled"), Some(&Value::Double(80.0)));
        assert_eq!(p.calculations("doubled"), Some(2));
    }

    #[test]
    fn missing_input_names_input_and_transform() {
        let outputs = vec![OutputColumn::new(ColumnDef::new("region"))];
        let mut p = TransformInputProcessor::new("sales", Box::new(amounts(1)), Vec::new(), outputs).unwrap();
        let err = p.init().unwrap_err();
        assert_eq!(err.to_string(), "Cannot bind to input region in Transform sales");
    }

    #[test]
    fn mutual_function_reference_is_cyclic() {
        let f1 = arithmetic(FunctionSpec::new("f1", "arithmetic").with_input("x", "f2"));
        let f2 = arithmetic(FunctionSpec::new("f2", "arithmetic").with_input("x", "f1"));
        let outputs = vec![OutputColumn::new(ColumnDef::new("id"))];
        let mut p = TransformInputProcessor::new("t", Box::new(amounts(3)), vec![f1, f2], outputs).unwrap();
        let err = p.init().unwrap_err();
        assert!(matches!(err, EtlError::CyclicDependency { .. }));
        assert!(err
            .to_string()
            .starts_with("Cyclic dependency in input of function f"));
        assert_eq!(p.upstream.metrics().rows, 0);
    }

    #[test]
    fn function_chain_without_cycle_binds() {
        let f1 = arithmetic(FunctionSpec::new("f1", "arithmetic").with_input("x", "amount"));
        let f2 = arithmetic(FunctionSpec::new("f2", "arithmetic").with_input("x", "f1"));
        let outputs = vec![OutputColumn::new(ColumnDef::new("f2"))];
        let mut p = TransformInputProcessor::new("t", Box::new(amounts(1)), vec![f1, f2], outputs).unwrap();
        let rows = collect_rows(&mut p).unwrap();
        assert_eq!(rows[0].value("f2"), Some(&Value::Double(10.0)));
    }

    #[test]
    fn function_named_like_its_input_reads_the_column() {
        let amount = arithmetic(
            FunctionSpec::new("amount", "arithmetic")
                .with_input("x", "amount")
                .with_constant("y", 1_i64),
        );
        let outputs = vec![OutputColumn::new(ColumnDef::new("amount"))];
        let mut p = TransformInputProcessor::new("t", Box::new(amounts(1)), vec![amount], outputs).unwrap();
        let rows = collect_rows(&mut p).unwrap();
        assert_eq!(rows[0].value("amount"), Some(&Value::Double(11.0)));
    }

    #[test]
    fn constants_and_normalization_targets_are_not_bound() {
        let outputs = vec![
            OutputColumn::new(ColumnDef::new("source").with_constant("web")),
            OutputColumn::new(ColumnDef::new("amount").with_kind(NodeKind::Value {
                normalize: Some("measure".into()),
            })),
            OutputColumn::new(ColumnDef::new("measure")),
        ];
        let mut p = TransformInputProcessor::new("t", Box::new(amounts(1)), Vec::new(), outputs).unwrap();
        let rows = collect_rows(&mut p).unwrap();
        assert_eq!(
            rows[0].values(),
            &[Value::from("web"), Value::Double(10.0), Value::Null]
        );
    }

    #[test]
    fn rebinds_when_schema_epoch_changes() {
        let first = Row::from_columns(vec![ColumnDef::new("a"), ColumnDef::new("b")]).unwrap();
        let second = Row::from_columns(vec![ColumnDef::new("b"), ColumnDef::new("a")]).unwrap();
        let rows = vec![
            first.with_values(vec![Value::from("a1"), Value::from("b1")]).unwrap(),
            first.with_values(vec![Value::from("a2"), Value::from("b2")]).unwrap(),
            second.with_values(vec![Value::from("b3"), Value::from("a3")]).unwrap(),
        ];
        let table = TableProcessor::new("mixed", Arc::clone(first.schema()), rows);
        let concat_spec = FunctionSpec::new("ab", "concat").with_input("x", "a").with_input("y", "b");
        let concat = Function::new(&concat_spec, Box::new(Concat::from_spec(&concat_spec)));
        let outputs = vec![OutputColumn::new(ColumnDef::new("ab"))];
        let mut p = TransformInputProcessor::new("t", Box::new(table), vec![concat], outputs).unwrap();
        let rows = collect_rows(&mut p).unwrap();
        let got: Vec<String> = rows.iter().map(|r| r.value("ab").unwrap().to_string()).collect();
        assert_eq!(got, vec!["a1b1", "a2b2", "a3b3"]);
        assert_eq!(p.rebinds(), 2);
    }

    #[test]
    fn attribute_must_reference_a_level() {
        let outputs = vec![OutputColumn::new(
            ColumnDef::new("color").with_kind(NodeKind::Attribute {
                level: Some("product".into()),
            }),
        )];
        let err = TransformInputProcessor::new("t", Box::new(amounts(1)), Vec::new(), outputs)
            .err()
            .unwrap();
        assert!(err.to_string().contains("unknown level product"));
    }
}
