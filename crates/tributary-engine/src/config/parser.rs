//! Project YAML parsing with environment variable substitution.
//!
//! Environment references use `${env:NAME}` and are resolved before the
//! YAML is parsed. Plain `${name}` references are project variables and are
//! left for the execution to resolve.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

use crate::config::types::ProjectConfig;

static ENV_VAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{env:([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var regex")
});

/// Substitute `${env:VAR_NAME}` patterns with environment variable values.
///
/// # Errors
///
/// Returns an error if any referenced environment variable is not set.
pub fn substitute_env_vars(input: &str) -> Result<String> {
    let mut result = input.to_string();
    let mut errors = Vec::new();

    for cap in ENV_VAR_RE.captures_iter(input) {
        let var_name = &cap[1];
        match std::env::var(var_name) {
            Ok(val) => {
                result = result.replace(&cap[0], &val);
            }
            Err(_) => {
                if !errors.iter().any(|e| e == var_name) {
                    errors.push(var_name.to_string());
                }
            }
        }
    }

    if !errors.is_empty() {
        anyhow::bail!("Missing environment variable(s): {}", errors.join(", "));
    }

    Ok(result)
}

/// Parse a project YAML string (after env var substitution).
///
/// # Errors
///
/// Returns an error if env var substitution fails or the YAML is invalid.
pub fn parse_project_str(yaml_str: &str) -> Result<ProjectConfig> {
    let substituted = substitute_env_vars(yaml_str)?;
    let config: ProjectConfig =
        serde_yaml::from_str(&substituted).context("Failed to parse project YAML")?;
    Ok(config)
}

/// Parse a project YAML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the YAML is invalid.
pub fn parse_project(path: &Path) -> Result<ProjectConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read project file: {}", path.display()))?;
    parse_project_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("TRIB_TEST_DIR", "/var/lib/tributary");
        let input = "path: ${env:TRIB_TEST_DIR}/shop.db";
        let result = substitute_env_vars(input).unwrap();
        assert_eq!(result, "path: /var/lib/tributary/shop.db");
        std::env::remove_var("TRIB_TEST_DIR");
    }

    #[test]
    fn test_project_variables_are_left_alone() {
        let input = "table: sales_${region}";
        assert_eq!(substitute_env_vars(input).unwrap(), input);
    }

    #[test]
    fn test_multiple_missing_env_vars_all_reported() {
        let input = "${env:TRIB_MISSING_X} and ${env:TRIB_MISSING_Y} and ${env:TRIB_MISSING_X}";
        let err_msg = substitute_env_vars(input).unwrap_err().to_string();
        assert_eq!(
            err_msg,
            "Missing environment variable(s): TRIB_MISSING_X, TRIB_MISSING_Y"
        );
    }

    #[test]
    fn test_parse_project_from_string() {
        std::env::set_var("TRIB_TEST_DB", "/tmp/shop.db");
        let yaml = r#"
version: "1.0"
project: shop
variables:
  region: eu
connections:
  - name: warehouse
    type: sqlite
    params:
      path: ${env:TRIB_TEST_DB}
extracts:
  - name: orders
    type: inline
    columns:
      - { name: id, type: integer }
      - { name: amount, type: double }
    rows:
      - [1, 10.0]
loads:
  - name: orders
    source: extracts.orders
    connection: warehouse
    table: orders_${region}
"#;
        let config = parse_project_str(yaml).unwrap();
        assert_eq!(config.connections[0].params["path"], "/tmp/shop.db");
        assert_eq!(config.loads[0].table.as_deref(), Some("orders_${region}"));
        assert_eq!(config.variables["region"], "eu");
        std::env::remove_var("TRIB_TEST_DB");
    }

    #[test]
    fn test_parse_invalid_yaml_errors() {
        let yaml = "this is not: [valid: yaml: {{{}}}";
        assert!(parse_project_str(yaml).is_err());
    }

    #[test]
    fn test_parse_missing_file_names_path() {
        let err = parse_project(Path::new("/nonexistent/project.yaml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/project.yaml"));
    }
}
