//! Serde model of a project YAML file.
//!
//! Enumerated settings are kept as strings here and converted by the
//! helper methods, so the validator can report every illegal value at once.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tributary_types::{
    AggregateMode, ColumnDef, EtlError, LoadMode, NodeKind, Result, UpdateMode, Value, ValueType,
};

use crate::binding::OutputColumn;
use crate::components::SyncMode;
use crate::function::FunctionSpec;
use crate::processor::{CompareOp, RowPredicate, RowWindow};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub version: String,
    pub project: String,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    #[serde(default)]
    pub connections: Vec<ConnectionConfig>,
    #[serde(default)]
    pub extracts: Vec<ExtractConfig>,
    #[serde(default)]
    pub transforms: Vec<TransformConfig>,
    #[serde(default)]
    pub loads: Vec<LoadConfig>,
    #[serde(default)]
    pub jobs: Vec<JobConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub connection: Option<String>,
    #[serde(default)]
    pub columns: Vec<ColumnConfig>,
    #[serde(default)]
    pub rows: Vec<Vec<Value>>,
    pub query: Option<String>,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

/// Column of an extract, input of a function or output of a transform.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnConfig {
    pub name: String,
    /// Column or function to bind to. Defaults to `name`.
    pub input: Option<String>,
    /// Constant value instead of a binding.
    pub value: Option<Value>,
    #[serde(rename = "type")]
    pub value_type: Option<String>,
    /// `column`, `coordinate`, `value`, `level` or `attribute`.
    pub node: Option<String>,
    pub normalize: Option<String>,
    pub weight: Option<String>,
    pub level: Option<String>,
}

const NODES: [&str; 5] = ["column", "coordinate", "value", "level", "attribute"];

impl ColumnConfig {
    /// # Errors
    ///
    /// Returns [`EtlError::Configuration`] for an illegal node or type, or
    /// when both `input` and `value` are given.
    pub fn node_kind(&self) -> Result<NodeKind> {
        Ok(match self.node.as_deref().unwrap_or("column") {
            "column" => NodeKind::Column,
            "coordinate" => NodeKind::Coordinate,
            "value" => NodeKind::Value {
                normalize: self.normalize.clone(),
            },
            "level" => NodeKind::Level {
                weight: self.weight.clone(),
            },
            "attribute" => NodeKind::Attribute {
                level: self.level.clone(),
            },
            other => return Err(EtlError::illegal_value("node", other, &NODES)),
        })
    }

    /// Declared type, if any.
    ///
    /// # Errors
    ///
    /// Returns [`EtlError::Configuration`] for an unknown type name.
    pub fn declared_type(&self) -> Result<Option<ValueType>> {
        self.value_type.as_deref().map(str::parse).transpose()
    }

    /// # Errors
    ///
    /// See [`ColumnConfig::node_kind`].
    pub fn to_column(&self) -> Result<ColumnDef> {
        let mut column = ColumnDef::new(&self.name).with_kind(self.node_kind()?);
        column = match (&self.input, &self.value) {
            (Some(_), Some(_)) => {
                return Err(EtlError::configuration(format!(
                    "Column {}: 'input' and 'value' are mutually exclusive",
                    self.name
                )))
            }
            (Some(input), None) => column.with_input(input.clone()),
            (None, Some(value)) => column.with_constant(value.clone()),
            (None, None) => column,
        };
        if let Some(value_type) = self.declared_type()? {
            column = column.with_type(value_type);
        }
        Ok(column)
    }

    /// Transform output; columns without a declared type inherit one.
    ///
    /// # Errors
    ///
    /// See [`ColumnConfig::node_kind`].
    pub fn to_output(&self) -> Result<OutputColumn> {
        let column = self.to_column()?;
        Ok(if self.value_type.is_some() {
            OutputColumn::typed(column)
        } else {
            OutputColumn::new(column)
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub inputs: Vec<ColumnConfig>,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    pub output_type: Option<String>,
    #[serde(default)]
    pub force_eval: bool,
    #[serde(default = "default_true")]
    pub buffered: bool,
}

fn default_true() -> bool {
    true
}

impl FunctionConfig {
    /// # Errors
    ///
    /// Returns [`EtlError::Configuration`] for illegal input columns or
    /// output type.
    pub fn to_spec(&self) -> Result<FunctionSpec> {
        let mut spec = FunctionSpec::new(&self.name, &self.kind)
            .with_force_eval(self.force_eval)
            .with_buffered(self.buffered);
        spec.inputs = self
            .inputs
            .iter()
            .map(ColumnConfig::to_column)
            .collect::<Result<Vec<_>>>()?;
        spec.params.clone_from(&self.params);
        if let Some(output_type) = &self.output_type {
            spec = spec.with_output_type(output_type.parse()?);
        }
        Ok(spec)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    pub column: String,
    pub op: String,
    #[serde(default)]
    pub value: Value,
}

impl FilterConfig {
    /// # Errors
    ///
    /// Returns [`EtlError::Configuration`] for an unknown operator.
    pub fn to_predicate(&self) -> Result<RowPredicate> {
        let op: CompareOp = self.op.parse()?;
        Ok(RowPredicate::new(&self.column, op, self.value.clone()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformConfig {
    pub name: String,
    /// `extracts.<name>` or `transforms.<name>`.
    pub source: String,
    #[serde(default)]
    pub functions: Vec<FunctionConfig>,
    #[serde(default)]
    pub outputs: Vec<ColumnConfig>,
    #[serde(default)]
    pub filters: Vec<FilterConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    pub name: String,
    pub source: String,
    pub connection: String,
    pub table: Option<String>,
    pub schema: Option<String>,
    pub mode: Option<String>,
    pub aggregate: Option<String>,
    #[serde(default)]
    pub roles: BTreeMap<String, String>,
    #[serde(default)]
    pub types: BTreeMap<String, String>,
    pub bulk_size: Option<usize>,
    #[serde(default)]
    pub logging: bool,
    pub primary_key: Option<String>,
    pub start: Option<u64>,
    pub end: Option<u64>,
    pub columns: Option<Vec<String>>,
}

impl LoadConfig {
    /// # Errors
    ///
    /// Returns [`EtlError::Configuration`] for an unknown mode.
    pub fn mode(&self) -> Result<LoadMode> {
        self.mode.as_deref().map_or(Ok(LoadMode::default()), str::parse)
    }

    /// # Errors
    ///
    /// Returns [`EtlError::Configuration`] for an unknown aggregate mode.
    pub fn aggregate(&self) -> Result<AggregateMode> {
        self.aggregate
            .as_deref()
            .map_or(Ok(AggregateMode::default()), str::parse)
    }

    /// # Errors
    ///
    /// Returns [`EtlError::Configuration`] for the first unknown role.
    pub fn roles(&self) -> Result<BTreeMap<String, UpdateMode>> {
        self.roles
            .iter()
            .map(|(column, role)| Ok((column.clone(), role.parse()?)))
            .collect()
    }

    /// # Errors
    ///
    /// Returns [`EtlError::Configuration`] for the first unknown type.
    pub fn types(&self) -> Result<BTreeMap<String, ValueType>> {
        self.types
            .iter()
            .map(|(column, value_type)| Ok((column.clone(), value_type.parse()?)))
            .collect()
    }

    /// # Errors
    ///
    /// See [`RowWindow::new`].
    pub fn window(&self) -> Result<RowWindow> {
        RowWindow::new(self.start.unwrap_or(1), self.end)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub name: String,
    /// `loads.<name>` or `jobs.<name>`, run in order.
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    #[serde(default = "default_true")]
    pub fail_on_error: bool,
    pub sync_mode: Option<String>,
}

impl JobConfig {
    /// # Errors
    ///
    /// Returns [`EtlError::Configuration`] for an unknown sync mode.
    pub fn sync_mode(&self) -> Result<SyncMode> {
        self.sync_mode
            .as_deref()
            .map_or(Ok(SyncMode::default()), str::parse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_minimal_project() {
        let yaml = r#"
version: "1.0"
project: shop
"#;
        let config: ProjectConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.project, "shop");
        assert!(config.loads.is_empty());
    }

    #[test]
    fn inline_rows_keep_their_scalar_types() {
        let yaml = r#"
name: orders
type: inline
columns:
  - { name: id, type: integer }
rows:
  - [1, 2.5, "x", true, null]
"#;
        let extract: ExtractConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            extract.rows[0],
            vec![
                Value::Int(1),
                Value::Double(2.5),
                Value::from("x"),
                Value::Bool(true),
                Value::Null,
            ]
        );
        assert_eq!(
            extract.columns[0].to_column().unwrap().value_type,
            ValueType::Integer
        );
    }

    #[test]
    fn column_node_kinds() {
        let column = ColumnConfig {
            name: "amount".into(),
            node: Some("value".into()),
            normalize: Some("share".into()),
            ..ColumnConfig::default()
        };
        assert_eq!(
            column.node_kind().unwrap(),
            NodeKind::Value {
                normalize: Some("share".into())
            }
        );
        let bad = ColumnConfig {
            name: "x".into(),
            node: Some("measure".into()),
            ..ColumnConfig::default()
        };
        assert!(bad
            .node_kind()
            .unwrap_err()
            .to_string()
            .contains("column, coordinate, value, level, attribute"));
    }

    #[test]
    fn input_and_value_are_exclusive() {
        let column = ColumnConfig {
            name: "x".into(),
            input: Some("y".into()),
            value: Some(Value::Int(1)),
            ..ColumnConfig::default()
        };
        assert!(column.to_column().is_err());
    }

    #[test]
    fn untyped_outputs_inherit() {
        let typed = ColumnConfig {
            name: "x".into(),
            value_type: Some("double".into()),
            ..ColumnConfig::default()
        };
        assert!(!typed.to_output().unwrap().inherit_type);
        let untyped = ColumnConfig {
            name: "y".into(),
            ..ColumnConfig::default()
        };
        assert!(untyped.to_output().unwrap().inherit_type);
    }

    #[test]
    fn load_defaults() {
        let yaml = r"
name: l
source: transforms.t
connection: db
";
        let load: LoadConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(load.mode().unwrap(), LoadMode::Update);
        assert_eq!(load.aggregate().unwrap(), AggregateMode::None);
        assert!(load.window().unwrap().is_unbounded());
    }
}
