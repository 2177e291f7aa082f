//! Semantic validation for parsed project configuration values.

use std::collections::{BTreeSet, HashSet};

use anyhow::{bail, Result};
use tributary_types::{ComponentKind, Locator};

use crate::config::types::{ColumnConfig, ProjectConfig};

/// Flag empty and duplicate names of one component kind.
fn validate_names<'a>(
    kind: ComponentKind,
    names: impl Iterator<Item = &'a str>,
    errors: &mut Vec<String>,
) {
    let mut seen = HashSet::new();
    for (i, name) in names.enumerate() {
        if name.trim().is_empty() {
            errors.push(format!("{kind}[{i}] has an empty name"));
        } else if !seen.insert(name) {
            errors.push(format!("Duplicate name '{name}' in {kind}"));
        }
    }
}

fn validate_columns(columns: &[ColumnConfig], context: &str, errors: &mut Vec<String>) {
    let mut seen = HashSet::new();
    for column in columns {
        if !seen.insert(column.name.as_str()) {
            errors.push(format!("{context}: duplicate column '{}'", column.name));
        }
        if let Err(e) = column.to_column() {
            errors.push(format!("{context}: {e}"));
        }
    }
}

/// Declared components by locator, used to resolve references.
struct Declared {
    project: String,
    locators: BTreeSet<Locator>,
}

impl Declared {
    fn new(config: &ProjectConfig) -> Self {
        let project = config.project.clone();
        let mut locators = BTreeSet::new();
        let mut add = |kind, name: &str| {
            locators.insert(Locator::new(&project, kind, name));
        };
        config.connections.iter().for_each(|c| add(ComponentKind::Connection, &c.name));
        config.extracts.iter().for_each(|c| add(ComponentKind::Extract, &c.name));
        config.transforms.iter().for_each(|c| add(ComponentKind::Transform, &c.name));
        config.loads.iter().for_each(|c| add(ComponentKind::Load, &c.name));
        config.jobs.iter().for_each(|c| add(ComponentKind::Job, &c.name));
        Self { project, locators }
    }

    /// Check that `reference` names a declared component of an allowed kind.
    fn check(&self, reference: &str, allowed: &[ComponentKind], context: &str, errors: &mut Vec<String>) {
        match Locator::parse_in(&self.project, reference) {
            Ok(locator) if !allowed.contains(&locator.kind()) => {
                let allowed: Vec<&str> = allowed.iter().map(|k| k.as_str()).collect();
                errors.push(format!(
                    "{context}: '{reference}' must refer to {}",
                    allowed.join(" or ")
                ));
            }
            Ok(locator) if !self.locators.contains(&locator) => {
                errors.push(format!("{context}: '{reference}' is not defined"));
            }
            Ok(_) => {}
            Err(e) => errors.push(format!("{context}: {e}")),
        }
    }

    /// Connection references may omit the `connections.` prefix.
    fn check_connection(&self, name: &str, context: &str, errors: &mut Vec<String>) {
        let reference = if name.contains('.') {
            name.to_string()
        } else {
            format!("{}.{name}", ComponentKind::Connection)
        };
        self.check(&reference, &[ComponentKind::Connection], context, errors);
    }
}

/// Validate a parsed project configuration.
/// Returns `Ok(())` if valid, Err with all validation errors if not.
///
/// # Errors
///
/// Returns an error listing all validation failures found in the project config.
pub fn validate_project(config: &ProjectConfig) -> Result<()> {
    let mut errors = Vec::new();

    if config.version != "1.0" {
        errors.push(format!(
            "Unsupported project version '{}', expected '1.0'",
            config.version
        ));
    }

    if config.project.trim().is_empty() {
        errors.push("Project name must not be empty".to_string());
    } else if config.project.contains('.') {
        errors.push(format!("Project name '{}' must not contain '.'", config.project));
    }

    validate_names(ComponentKind::Connection, config.connections.iter().map(|c| c.name.as_str()), &mut errors);
    validate_names(ComponentKind::Extract, config.extracts.iter().map(|c| c.name.as_str()), &mut errors);
    validate_names(ComponentKind::Transform, config.transforms.iter().map(|c| c.name.as_str()), &mut errors);
    validate_names(ComponentKind::Load, config.loads.iter().map(|c| c.name.as_str()), &mut errors);
    validate_names(ComponentKind::Job, config.jobs.iter().map(|c| c.name.as_str()), &mut errors);

    let declared = Declared::new(config);
    let sources = [ComponentKind::Extract, ComponentKind::Transform];

    for extract in &config.extracts {
        let context = format!("Extract '{}'", extract.name);
        validate_columns(&extract.columns, &context, &mut errors);
        if let Some(connection) = &extract.connection {
            declared.check_connection(connection, &context, &mut errors);
        }
        for (i, row) in extract.rows.iter().enumerate() {
            if row.len() != extract.columns.len() {
                errors.push(format!(
                    "{context}: row {i} has {} values, expected {}",
                    row.len(),
                    extract.columns.len()
                ));
            }
        }
    }

    for transform in &config.transforms {
        let context = format!("Transform '{}'", transform.name);
        declared.check(&transform.source, &sources, &context, &mut errors);
        validate_columns(&transform.outputs, &context, &mut errors);
        if transform.outputs.is_empty() {
            errors.push(format!("{context}: at least one output is required"));
        }
        let mut functions = HashSet::new();
        for function in &transform.functions {
            let context = format!("{context}, function '{}'", function.name);
            if !functions.insert(function.name.as_str()) {
                errors.push(format!("{context}: duplicate function name"));
            }
            if let Err(e) = function.to_spec() {
                errors.push(format!("{context}: {e}"));
            }
            if let Some(source) = function.params.get("source") {
                if Locator::parse_in(&config.project, source).is_ok() {
                    declared.check(source, &sources, &context, &mut errors);
                }
            }
        }
        for filter in &transform.filters {
            if let Err(e) = filter.to_predicate() {
                errors.push(format!("{context}: {e}"));
            }
        }
    }

    for load in &config.loads {
        let context = format!("Load '{}'", load.name);
        declared.check(&load.source, &sources, &context, &mut errors);
        declared.check_connection(&load.connection, &context, &mut errors);
        let checks = [
            load.mode().err(),
            load.aggregate().err(),
            load.roles().err(),
            load.types().err(),
            load.window().err(),
        ];
        for e in checks.into_iter().flatten() {
            errors.push(format!("{context}: {e}"));
        }
        if load.bulk_size == Some(0) {
            errors.push(format!("{context}: bulk_size must be at least 1"));
        }
        if load.columns.as_ref().is_some_and(Vec::is_empty) {
            errors.push(format!("{context}: columns must not be empty when given"));
        }
    }

    for job in &config.jobs {
        let context = format!("Job '{}'", job.name);
        for step in &job.steps {
            declared.check(step, &[ComponentKind::Load, ComponentKind::Job], &context, &mut errors);
        }
        if let Err(e) = job.sync_mode() {
            errors.push(format!("{context}: {e}"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        bail!("Project validation failed:\n  - {}", errors.join("\n  - "));
    }
}
