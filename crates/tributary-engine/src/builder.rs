//! Turns a validated [`ProjectConfig`] into a [`Project`].

use anyhow::{bail, Context, Result};
use tributary_types::{ComponentKind, Locator};

use crate::components::{Connection, Extract, Job, Load, Transform};
use crate::config::types::{ColumnConfig, FilterConfig, FunctionConfig, ProjectConfig};
use crate::config::validate_project;
use crate::project::Project;
use crate::registry::ComponentRegistry;

/// Builds projects against the type tags known to a registry.
#[derive(Debug, Clone, Copy)]
pub struct ProjectBuilder<'a> {
    registry: &'a ComponentRegistry,
}

impl<'a> ProjectBuilder<'a> {
    #[must_use]
    pub fn new(registry: &'a ComponentRegistry) -> Self {
        Self { registry }
    }

    /// Validate `config` and build its project.
    ///
    /// # Errors
    ///
    /// Returns an error listing every validation problem, every unknown
    /// type tag, or the components that depend on themselves.
    pub fn build(&self, config: &ProjectConfig) -> Result<Project> {
        validate_project(config)?;
        self.check_tags(config)?;

        let name = config.project.as_str();
        let locator = |kind, name_in_kind: &str| Locator::new(name, kind, name_in_kind);
        let reference = |s: &str| Locator::parse_in(name, s);
        let connection = |s: &str| {
            if s.contains('.') {
                Locator::parse_in(name, s)
            } else {
                Ok(Locator::new(name, ComponentKind::Connection, s))
            }
        };

        let mut project = Project::new(name);
        for (key, value) in &config.variables {
            project.set_variable(key, value);
        }
        for c in &config.connections {
            project.add(Connection {
                locator: locator(ComponentKind::Connection, &c.name),
                kind: c.kind.clone(),
                params: c.params.clone(),
            })?;
        }
        for e in &config.extracts {
            project.add(Extract {
                locator: locator(ComponentKind::Extract, &e.name),
                kind: e.kind.clone(),
                connection: e.connection.as_deref().map(connection).transpose()?,
                columns: e
                    .columns
                    .iter()
                    .map(ColumnConfig::to_column)
                    .collect::<tributary_types::Result<_>>()?,
                rows: e.rows.clone(),
                query: e.query.clone(),
                params: e.params.clone(),
            })?;
        }
        for t in &config.transforms {
            project.add(Transform {
                locator: locator(ComponentKind::Transform, &t.name),
                source: reference(&t.source)?,
                functions: t
                    .functions
                    .iter()
                    .map(FunctionConfig::to_spec)
                    .collect::<tributary_types::Result<_>>()?,
                outputs: t
                    .outputs
                    .iter()
                    .map(ColumnConfig::to_output)
                    .collect::<tributary_types::Result<_>>()?,
                filters: t
                    .filters
                    .iter()
                    .map(FilterConfig::to_predicate)
                    .collect::<tributary_types::Result<_>>()?,
            })?;
        }
        for l in &config.loads {
            project.add(Load {
                locator: locator(ComponentKind::Load, &l.name),
                source: reference(&l.source)?,
                connection: connection(&l.connection)?,
                table: l.table.clone(),
                schema: l.schema.clone(),
                mode: l.mode()?,
                aggregate: l.aggregate()?,
                roles: l.roles()?,
                types: l.types()?,
                bulk_size: l.bulk_size,
                logging: l.logging,
                primary_key: l.primary_key.clone(),
                window: l.window()?,
                columns: l.columns.clone(),
            })?;
        }
        for j in &config.jobs {
            let mut job = Job::new(
                locator(ComponentKind::Job, &j.name),
                j.steps
                    .iter()
                    .map(|s| reference(s))
                    .collect::<tributary_types::Result<_>>()?,
            );
            job.variables.clone_from(&j.variables);
            job.fail_on_error = j.fail_on_error;
            job.sync_mode = j.sync_mode()?;
            project.add(job)?;
        }

        project
            .validate_acyclic()
            .with_context(|| format!("Project '{name}' has a dependency cycle"))?;
        tracing::debug!(
            project = name,
            components = project.components().count(),
            "Built project"
        );
        Ok(project)
    }

    fn check_tags(&self, config: &ProjectConfig) -> Result<()> {
        let mut errors = Vec::new();
        for c in &config.connections {
            if let Err(e) = self.registry.connection(&c.kind) {
                errors.push(format!("Connection '{}': {e}", c.name));
            }
        }
        for e in &config.extracts {
            if let Err(err) = self.registry.extract(&e.kind) {
                errors.push(format!("Extract '{}': {err}", e.name));
            }
        }
        for t in &config.transforms {
            for f in &t.functions {
                if let Err(e) = self.registry.function(&f.kind) {
                    errors.push(format!("Transform '{}', function '{}': {e}", t.name, f.name));
                }
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            bail!("Unknown component types:\n  - {}", errors.join("\n  - "));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_project_str;
    use crate::components::Component;

    const YAML: &str = r#"
version: "1.0"
project: shop
variables:
  region: eu
connections:
  - name: warehouse
    type: sqlite
extracts:
  - name: orders
    type: inline
    columns:
      - { name: id, type: integer }
      - { name: amount, type: double }
    rows:
      - [1, 10.0]
  - name: prices
    type: inline
    columns:
      - { name: id, type: integer }
      - { name: price }
transforms:
  - name: priced
    source: extracts.orders
    functions:
      - name: price
        type: lookup
        inputs: [{ name: key, input: id }]
        params: { source: extracts.prices, key: id, value: price }
    outputs:
      - { name: id }
      - { name: price }
loads:
  - name: priced
    source: transforms.priced
    connection: warehouse
    roles: { id: key }
jobs:
  - name: nightly
    steps: [loads.priced]
    variables: { region: us }
    sync_mode: parallel
"#;

    #[test]
    fn builds_every_component() {
        let registry = ComponentRegistry::with_builtins();
        let project = ProjectBuilder::new(&registry)
            .build(&parse_project_str(YAML).unwrap())
            .unwrap();
        assert_eq!(project.components().count(), 6);
        assert_eq!(project.variables()["region"], "eu");
        let transform = Locator::new("shop", ComponentKind::Transform, "priced");
        let deps: Vec<String> = project
            .direct_dependencies(&transform)
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(deps, vec!["shop.extracts.orders", "shop.extracts.prices"]);
        let job = Locator::new("shop", ComponentKind::Job, "nightly");
        let Component::Job(job) = project.component(&job).unwrap() else {
            panic!("expected a job");
        };
        assert_eq!(job.variables["region"], "us");
    }

    #[test]
    fn unknown_function_type_is_rejected() {
        let registry = ComponentRegistry::with_builtins();
        let yaml = YAML.replace("type: lookup", "type: regex");
        let err = ProjectBuilder::new(&registry)
            .build(&parse_project_str(&yaml).unwrap())
            .unwrap_err()
            .to_string();
        assert!(err.contains("Transform 'priced', function 'price'"));
        assert!(err.contains("'regex'"));
    }

    #[test]
    fn job_cycle_is_rejected() {
        let registry = ComponentRegistry::with_builtins();
        let yaml = YAML.replace(
            "    steps: [loads.priced]",
            "    steps: [jobs.weekly]\n  - name: weekly\n    steps: [jobs.nightly]",
        );
        let err = ProjectBuilder::new(&registry)
            .build(&parse_project_str(&yaml).unwrap())
            .unwrap_err();
        assert!(format!("{err:#}").contains("Components depend on themselves"));
    }
}
