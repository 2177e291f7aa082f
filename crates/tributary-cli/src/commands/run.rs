use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tributary_engine::{ComponentRegistry, ExecutionResult, Executor};
use tributary_types::ExecutionStatus;

use super::{load_project, resolve_target};

/// Execute the `run` command: build the project and execute one load or job.
pub fn execute(
    project_path: &Path,
    target: &str,
    variables: BTreeMap<String, String>,
    json: bool,
) -> Result<()> {
    let result = run(project_path, target, variables)?;

    if json {
        println!("{}", to_json(&result));
    } else {
        print_result(&result);
    }

    if result.status >= ExecutionStatus::Errors {
        anyhow::bail!(
            "Execution of '{}' finished with status {}",
            result.locator,
            result.status
        );
    }
    Ok(())
}

fn run(
    project_path: &Path,
    target: &str,
    variables: BTreeMap<String, String>,
) -> Result<ExecutionResult> {
    let project = load_project(project_path)?;
    let locator = resolve_target(&project, target)?;

    tracing::info!(
        project = project.name(),
        target = %locator,
        variables = variables.len(),
        "Project built"
    );

    let executor = Executor::new(Arc::new(project), Arc::new(ComponentRegistry::with_builtins()));
    Ok(executor
        .create_execution(&locator, variables, None)
        .execute("main"))
}

fn print_result(result: &ExecutionResult) {
    println!("Execution {} of '{}': {}", result.id, result.locator, result.status.message());
    println!("  Rows read:       {}", result.stats.rows_read);
    println!("  Rows written:    {}", result.stats.rows_written);
    if result.stats.warnings > 0 {
        println!("  Warnings:        {}", result.stats.warnings);
    }
    if result.stats.errors > 0 {
        println!("  Errors:          {}", result.stats.errors);
    }
    if let Some(error) = &result.stats.first_error {
        println!("  First error:     {error}");
    }
    println!("  Duration:        {:.2}s", result.elapsed.as_secs_f64());
}

fn to_json(result: &ExecutionResult) -> serde_json::Value {
    serde_json::json!({
        "id": result.id,
        "locator": result.locator,
        "status": result.status,
        "code": result.status.code(),
        "stats": result.stats,
        "duration_secs": result.elapsed.as_secs_f64(),
    })
}
