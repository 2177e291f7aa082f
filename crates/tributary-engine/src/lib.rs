//! Processor chains, column binding, project graph and job execution for
//! Tributary projects.
//!
//! A project file is parsed into a [`ProjectConfig`], validated and built
//! into a [`Project`] by a [`ProjectBuilder`]. An [`Executor`] then runs
//! loads and jobs of that project: each load pulls rows through a chain of
//! [`Processor`]s and writes them through the persistence layer.

#![warn(clippy::pedantic)]

pub mod binding;
pub mod builder;
pub mod components;
pub mod config;
pub mod execution;
pub mod function;
pub mod processor;
pub mod project;
pub mod registry;

pub use binding::{OutputColumn, TransformInputProcessor};
pub use builder::ProjectBuilder;
pub use components::{Component, Connection, Extract, Job, Load, SyncMode, Transform};
pub use config::{parse_project, parse_project_str, validate_project, ProjectConfig};
pub use execution::{
    run_parallel, Execution, ExecutionContext, ExecutionResult, ExecutionState, Executor,
};
pub use function::{Function, FunctionKernel, FunctionSpec};
pub use processor::{collect_rows, Processor, ProcessorMetrics, ProcessorState};
pub use project::{DependencyMap, Project};
pub use registry::ComponentRegistry;
