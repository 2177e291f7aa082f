use std::path::Path;

use anyhow::Result;
use tributary_engine::Project;
use tributary_types::Locator;

use super::{load_project, resolve_target};

/// Execute the `deps` command: list dependencies or dependents of a component.
///
/// Direct queries print one locator per line. Transitive queries print the
/// reachable sub-graph, one `component -> related, ...` line per entry.
pub fn execute(project_path: &Path, target: &str, dependents: bool, all: bool) -> Result<()> {
    let project = load_project(project_path)?;
    let locator = resolve_target(&project, target)?;
    let lines = lines(&project, &locator, dependents, all);
    if lines.is_empty() {
        let relation = if dependents { "dependents" } else { "dependencies" };
        println!("'{locator}' has no {relation}");
    }
    for line in lines {
        println!("{line}");
    }
    Ok(())
}

fn lines(project: &Project, locator: &Locator, dependents: bool, all: bool) -> Vec<String> {
    let graph = match (dependents, all) {
        (false, false) => return join(&project.direct_dependencies(locator)),
        (true, false) => return join(&project.direct_dependents(locator)),
        (false, true) => project.all_dependencies(locator),
        (true, true) => project.all_dependents(locator),
    };
    graph
        .iter()
        .filter(|(_, related)| !related.is_empty())
        .map(|(component, related)| format!("{component} -> {}", join(related).join(", ")))
        .collect()
}

fn join(locators: &[Locator]) -> Vec<String> {
    locators.iter().map(ToString::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{write_project, PROJECT};

    fn query(project: &Project, target: &str, dependents: bool, all: bool) -> Vec<String> {
        let locator = resolve_target(project, target).unwrap();
        lines(project, &locator, dependents, all)
    }

    #[test]
    fn test_dependencies() {
        let (_dir, path) = write_project(PROJECT);
        let project = load_project(&path).unwrap();
        assert_eq!(query(&project, "jobs.nightly", false, false), vec!["shop.loads.doubled"]);
        assert_eq!(
            query(&project, "jobs.nightly", false, true),
            vec![
                "shop.transforms.doubled -> shop.extracts.orders",
                "shop.loads.doubled -> shop.transforms.doubled, shop.connections.warehouse",
                "shop.jobs.nightly -> shop.loads.doubled",
            ]
        );
    }

    #[test]
    fn test_dependents() {
        let (_dir, path) = write_project(PROJECT);
        let project = load_project(&path).unwrap();
        assert_eq!(
            query(&project, "extracts.orders", true, false),
            vec!["shop.transforms.broken", "shop.transforms.doubled"]
        );
        assert_eq!(
            query(&project, "extracts.orders", true, true),
            vec![
                "shop.extracts.orders -> shop.transforms.broken, shop.transforms.doubled",
                "shop.transforms.broken -> shop.loads.broken",
                "shop.transforms.doubled -> shop.loads.doubled",
                "shop.loads.doubled -> shop.jobs.nightly",
            ]
        );
        assert!(query(&project, "jobs.nightly", true, true).is_empty());
        execute(&path, "jobs.nightly", true, false).unwrap();
    }
}
