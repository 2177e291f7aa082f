use std::path::Path;

use anyhow::Result;
use tributary_engine::Project;
use tributary_types::ComponentKind;

use super::load_project;

/// Execute the `check` command: validate the project and report its contents.
pub fn execute(project_path: &Path) -> Result<()> {
    let project = load_project(project_path)?;
    println!("Project '{}': OK", project.name());
    for line in summary(&project) {
        println!("  {line}");
    }
    Ok(())
}

fn summary(project: &Project) -> Vec<String> {
    ComponentKind::ALL
        .into_iter()
        .map(|kind| {
            let names: Vec<&str> = project
                .components_of(kind)
                .map(|c| c.locator().name())
                .collect();
            let label = format!("{kind}:");
            format!("{label:12} {:3} {}", names.len(), names.join(", "))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{write_project, PROJECT};

    #[test]
    fn test_check_valid_project() {
        let (_dir, path) = write_project(PROJECT);
        execute(&path).unwrap();
        let lines = summary(&load_project(&path).unwrap());
        assert_eq!(lines.len(), 5);
        assert!(lines[2].starts_with("transforms:"));
        assert!(lines[2].ends_with("broken, doubled"));
    }

    #[test]
    fn test_check_reports_validation_errors() {
        let yaml = PROJECT.replace("steps: [loads.doubled]", "steps: [loads.weekly]");
        let (_dir, path) = write_project(&yaml);
        let err = execute(&path).unwrap_err().to_string();
        assert!(err.contains("Project validation failed"));
        assert!(err.contains("'loads.weekly' is not defined"));
    }

    #[test]
    fn test_check_reports_unknown_types() {
        let yaml = PROJECT.replace("type: sqlite", "type: oracle");
        let (_dir, path) = write_project(&yaml);
        let err = execute(&path).unwrap_err().to_string();
        assert!(err.contains("Unknown component types"));
        assert!(err.contains("Connection 'warehouse'"));
    }
}
