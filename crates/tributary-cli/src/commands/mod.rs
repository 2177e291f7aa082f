pub mod check;
pub mod deps;
pub mod run;

use std::path::Path;

use anyhow::{Context, Result};
use tributary_engine::{parse_project, ComponentRegistry, Project, ProjectBuilder};
use tributary_types::Locator;

/// Parse, validate and build the project at `path` with the builtin
/// component types.
pub fn load_project(path: &Path) -> Result<Project> {
    let config = parse_project(path)
        .with_context(|| format!("Failed to parse project: {}", path.display()))?;
    ProjectBuilder::new(&ComponentRegistry::with_builtins()).build(&config)
}

/// Resolve a command line target against the project it belongs to.
pub fn resolve_target(project: &Project, target: &str) -> Result<Locator> {
    let locator = Locator::parse_in(project.name(), target)?;
    project
        .component(&locator)
        .with_context(|| format!("Unknown target '{target}'"))?;
    Ok(locator)
}

/// Parse a `NAME=VALUE` pair given to `--var`.
pub fn parse_variable(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected NAME=VALUE, got '{s}'")),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::path::PathBuf;

    pub const PROJECT: &str = r#"
version: "1.0"
project: shop
variables:
  db_path: ":memory:"
connections:
  - name: warehouse
    type: sqlite
    params:
      path: ${db_path}
extracts:
  - name: orders
    type: inline
    columns:
      - { name: id, type: integer }
      - { name: amount, type: double }
    rows:
      - [1, 10.0]
      - [2, 20.0]
transforms:
  - name: doubled
    source: extracts.orders
    functions:
      - name: doubled
        type: arithmetic
        inputs:
          - { name: left, input: amount }
          - { name: right, value: 2 }
        params: { operator: multiply }
    outputs:
      - { name: id }
      - { name: doubled }
  - name: broken
    source: extracts.orders
    outputs:
      - { name: discount }
loads:
  - name: doubled
    source: transforms.doubled
    connection: warehouse
    mode: create
  - name: broken
    source: transforms.broken
    connection: warehouse
    mode: create
jobs:
  - name: nightly
    steps: [loads.doubled]
"#;

    /// Write `yaml` to a project file inside a fresh temp dir.
    pub fn write_project(yaml: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("project.yaml");
        std::fs::write(&path, yaml).unwrap();
        (dir, path)
    }
}
