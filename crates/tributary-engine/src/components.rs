//! Project components: connections, extracts, transforms, loads and jobs.
//!
//! Components are plain declarations. Runtime objects (processors,
//! connections, function kernels) are created from them per execution by
//! the [`ExecutionContext`](crate::execution::ExecutionContext).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tributary_types::{
    AggregateMode, ColumnDef, ComponentKind, EtlError, LoadMode, Locator, Result, UpdateMode,
    Value, ValueType,
};

use crate::binding::OutputColumn;
use crate::function::FunctionSpec;
use crate::processor::{RowPredicate, RowWindow};

/// Database connection declaration. `kind` selects the connection factory.
#[derive(Debug, Clone)]
pub struct Connection {
    pub locator: Locator,
    pub kind: String,
    pub params: BTreeMap<String, String>,
}

/// Row source declaration. `kind` selects the extract factory.
#[derive(Debug, Clone)]
pub struct Extract {
    pub locator: Locator,
    pub kind: String,
    pub connection: Option<Locator>,
    pub columns: Vec<ColumnDef>,
    /// Literal rows of an inline extract.
    pub rows: Vec<Vec<Value>>,
    pub query: Option<String>,
    pub params: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct Transform {
    pub locator: Locator,
    pub source: Locator,
    pub functions: Vec<FunctionSpec>,
    pub outputs: Vec<OutputColumn>,
    pub filters: Vec<RowPredicate>,
}

/// Table write declaration.
#[derive(Debug, Clone)]
pub struct Load {
    pub locator: Locator,
    pub source: Locator,
    pub connection: Locator,
    /// Target table; defaults to the component name.
    pub table: Option<String>,
    pub schema: Option<String>,
    pub mode: LoadMode,
    pub aggregate: AggregateMode,
    pub roles: BTreeMap<String, UpdateMode>,
    pub types: BTreeMap<String, ValueType>,
    pub bulk_size: Option<usize>,
    pub logging: bool,
    pub primary_key: Option<String>,
    pub window: RowWindow,
    /// Columns to keep, in order. All source columns when `None`.
    pub columns: Option<Vec<String>>,
}

/// How a job runs its sub-jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    #[default]
    Serial,
    Parallel,
}

impl SyncMode {
    pub const ALL: [SyncMode; 2] = [Self::Serial, Self::Parallel];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Serial => "serial",
            Self::Parallel => "parallel",
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncMode {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| {
                let legal: Vec<&str> = Self::ALL.iter().map(|m| m.as_str()).collect();
                EtlError::illegal_value("sync_mode", s, &legal)
            })
    }
}

/// Ordered list of loads and sub-jobs.
#[derive(Debug, Clone)]
pub struct Job {
    pub locator: Locator,
    pub steps: Vec<Locator>,
    /// Declared defaults, overridden by variables passed to the execution.
    pub variables: BTreeMap<String, String>,
    pub fail_on_error: bool,
    pub sync_mode: SyncMode,
}

impl Job {
    #[must_use]
    pub fn new(locator: Locator, steps: Vec<Locator>) -> Self {
        Self {
            locator,
            steps,
            variables: BTreeMap::new(),
            fail_on_error: true,
            sync_mode: SyncMode::Serial,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Component {
    Connection(Connection),
    Extract(Extract),
    Transform(Transform),
    Load(Load),
    Job(Job),
}

impl Component {
    #[must_use]
    pub fn locator(&self) -> &Locator {
        match self {
            Self::Connection(c) => &c.locator,
            Self::Extract(c) => &c.locator,
            Self::Transform(c) => &c.locator,
            Self::Load(c) => &c.locator,
            Self::Job(c) => &c.locator,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ComponentKind {
        self.locator().kind()
    }

    /// Components this one reads from or runs, in declaration order.
    ///
    /// Dependencies of a transform's functions are listed with the
    /// transform itself.
    #[must_use]
    pub fn dependencies(&self) -> Vec<Locator> {
        match self {
            Self::Connection(_) => Vec::new(),
            Self::Extract(e) => e.connection.iter().cloned().collect(),
            Self::Transform(t) => {
                let project = t.locator.project();
                let mut deps = vec![t.source.clone()];
                for f in &t.functions {
                    for dep in f.dependencies(project) {
                        if !deps.contains(&dep) {
                            deps.push(dep);
                        }
                    }
                }
                deps
            }
            Self::Load(l) => vec![l.source.clone(), l.connection.clone()],
            Self::Job(j) => j.steps.clone(),
        }
    }
}

impl From<Connection> for Component {
    fn from(value: Connection) -> Self {
        Self::Connection(value)
    }
}

impl From<Extract> for Component {
    fn from(value: Extract) -> Self {
        Self::Extract(value)
    }
}

impl From<Transform> for Component {
    fn from(value: Transform) -> Self {
        Self::Transform(value)
    }
}

impl From<Load> for Component {
    fn from(value: Load) -> Self {
        Self::Load(value)
    }
}

impl From<Job> for Component {
    fn from(value: Job) -> Self {
        Self::Job(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(kind: ComponentKind, name: &str) -> Locator {
        Locator::new("p", kind, name)
    }

    #[test]
    fn transform_lists_function_sources_once() {
        let transform = Transform {
            locator: loc(ComponentKind::Transform, "t"),
            source: loc(ComponentKind::Extract, "orders"),
            functions: vec![
                FunctionSpec::new("a", "lookup").with_param("source", "extracts.prices"),
                FunctionSpec::new("b", "lookup").with_param("source", "extracts.prices"),
                FunctionSpec::new("c", "lookup").with_param("source", "extracts.orders"),
            ],
            outputs: Vec::new(),
            filters: Vec::new(),
        };
        let deps: Vec<String> = Component::from(transform)
            .dependencies()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(deps, vec!["p.extracts.orders", "p.extracts.prices"]);
    }

    #[test]
    fn sync_mode_parses_legal_values() {
        assert_eq!("parallel".parse::<SyncMode>().unwrap(), SyncMode::Parallel);
        let err = "async".parse::<SyncMode>().unwrap_err();
        assert!(err.to_string().contains("serial, parallel"));
    }

    #[test]
    fn job_defaults_to_fail_fast() {
        let job = Job::new(loc(ComponentKind::Job, "nightly"), Vec::new());
        assert!(job.fail_on_error);
        assert_eq!(job.sync_mode, SyncMode::Serial);
    }
}
