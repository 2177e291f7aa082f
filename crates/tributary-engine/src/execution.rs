//! Executions of loads and jobs.
//!
//! An [`Executor`] turns a locator into an [`Execution`]. Running an
//! execution never returns an error: failures are recorded on its
//! [`ExecutionState`] and summarized in the [`ExecutionResult`]. Loads pull
//! their processor chain row by row into a datastore; jobs run their steps
//! serially and stop at the first failing step when `fail_on_error` is set.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex, PoisonError};
use std::time::{Duration, Instant};

use regex::Regex;
use tributary_store::{Datastore, PersistorDefinition, SqlConnection, TableLocator};
use tributary_types::{
    ComponentKind, EtlError, ExecutionId, ExecutionStats, ExecutionStatus, Locator, Result, Row,
};

use crate::binding::TransformInputProcessor;
use crate::components::{Component, Job, Load, SyncMode, Transform};
use crate::function::{Function, FunctionSpec};
use crate::processor::{
    CoordinateProcessor, Executable, FilterProcessor, Processor, RecodingProcessor,
    WindowProcessor,
};
use crate::project::Project;
use crate::registry::ComponentRegistry;

static VARIABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_.]*)\}").expect("valid variable regex")
});

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Mutable status and counters of one execution.
///
/// Shared between the running execution and anyone who may stop it.
/// Stopping a state also stops every execution started under it.
#[derive(Debug)]
pub struct ExecutionState {
    id: ExecutionId,
    locator: Locator,
    parent: Option<Arc<ExecutionState>>,
    status: Mutex<ExecutionStatus>,
    stopped: AtomicBool,
    rows_read: AtomicU64,
    rows_written: AtomicU64,
    errors: AtomicU64,
    warnings: AtomicU64,
    first_error: Mutex<Option<String>>,
}

impl ExecutionState {
    #[must_use]
    pub fn new(id: ExecutionId, locator: Locator, parent: Option<Arc<ExecutionState>>) -> Self {
        Self {
            id,
            locator,
            parent,
            status: Mutex::new(ExecutionStatus::Queued),
            stopped: AtomicBool::new(false),
            rows_read: AtomicU64::new(0),
            rows_written: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            warnings: AtomicU64::new(0),
            first_error: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn id(&self) -> ExecutionId {
        self.id
    }

    #[must_use]
    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    #[must_use]
    pub fn status(&self) -> ExecutionStatus {
        *lock(&self.status)
    }

    fn set_status(&self, status: ExecutionStatus) {
        *lock(&self.status) = status;
    }

    /// Ask the execution and all its children to stop after the current row.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let mut status = lock(&self.status);
        if !status.is_terminal() {
            *status = ExecutionStatus::Stopping;
        }
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst) || self.parent.as_ref().is_some_and(|p| p.is_stopped())
    }

    pub fn record_error(&self, error: &EtlError) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let mut first = lock(&self.first_error);
        if first.is_none() {
            *first = Some(error.to_string());
        }
    }

    pub fn record_warnings(&self, count: u64) {
        self.warnings.fetch_add(count, Ordering::SeqCst);
    }

    pub fn add_rows(&self, read: u64, written: u64) {
        self.rows_read.fetch_add(read, Ordering::SeqCst);
        self.rows_written.fetch_add(written, Ordering::SeqCst);
    }

    #[must_use]
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn stats(&self) -> ExecutionStats {
        ExecutionStats {
            rows_read: self.rows_read.load(Ordering::SeqCst),
            rows_written: self.rows_written.load(Ordering::SeqCst),
            errors: self.errors(),
            warnings: self.warnings.load(Ordering::SeqCst),
            first_error: lock(&self.first_error).clone(),
        }
    }

    /// Fold the counters of a finished child execution into this one.
    fn absorb(&self, child: &ExecutionStats) {
        self.add_rows(child.rows_read, child.rows_written);
        self.errors.fetch_add(child.errors, Ordering::SeqCst);
        self.record_warnings(child.warnings);
        if let Some(message) = &child.first_error {
            let mut first = lock(&self.first_error);
            if first.is_none() {
                *first = Some(message.clone());
            }
        }
    }

    fn start(&self) {
        self.set_status(ExecutionStatus::Running);
    }

    /// Terminal status from the counters: stopped, errors, warnings or ok.
    fn finish(&self) -> ExecutionStatus {
        let status = if self.is_stopped() {
            ExecutionStatus::Stopped
        } else if self.errors() > 0 {
            ExecutionStatus::Errors
        } else if self.warnings.load(Ordering::SeqCst) > 0 {
            ExecutionStatus::Warnings
        } else {
            ExecutionStatus::Ok
        };
        self.set_status(status);
        status
    }

    fn fail(&self, error: &EtlError, status: ExecutionStatus) {
        self.record_error(error);
        self.set_status(status);
    }
}

impl Executable for ExecutionState {
    fn is_executable(&self) -> bool {
        !self.is_stopped()
    }
}

/// Summary of a finished execution.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub id: ExecutionId,
    pub locator: Locator,
    pub status: ExecutionStatus,
    pub stats: ExecutionStats,
    pub elapsed: Duration,
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Everything a component needs to build its runtime objects.
pub struct ExecutionContext {
    executor: Executor,
    state: Arc<ExecutionState>,
    /// Variables passed to the execution.
    external: BTreeMap<String, String>,
    /// Effective variables: project, then declared, then external.
    variables: BTreeMap<String, String>,
    resolving: Mutex<Vec<Locator>>,
}

impl ExecutionContext {
    #[must_use]
    pub fn project(&self) -> &Project {
        &self.executor.project
    }

    #[must_use]
    pub fn registry(&self) -> &ComponentRegistry {
        &self.executor.registry
    }

    #[must_use]
    pub fn state(&self) -> &Arc<ExecutionState> {
        &self.state
    }

    #[must_use]
    pub fn variables(&self) -> &BTreeMap<String, String> {
        &self.variables
    }

    /// Replace every `${name}` in `text` with the variable's value.
    ///
    /// # Errors
    ///
    /// Returns [`EtlError::Configuration`] naming all undefined variables.
    pub fn substitute(&self, text: &str) -> Result<String> {
        let mut missing = Vec::new();
        let replaced = VARIABLE_RE.replace_all(text, |caps: &regex::Captures<'_>| {
            match self.variables.get(&caps[1]) {
                Some(value) => value.clone(),
                None => {
                    missing.push(caps[1].to_string());
                    caps[0].to_string()
                }
            }
        });
        if missing.is_empty() {
            Ok(replaced.into_owned())
        } else {
            Err(EtlError::configuration(format!(
                "Undefined variable(s) in '{text}': {}",
                missing.join(", ")
            )))
        }
    }

    /// Connection of `locator`, shared across the executor.
    ///
    /// # Errors
    ///
    /// Returns [`EtlError::Creation`] when the locator is not a connection
    /// or its factory fails.
    pub fn connection(&self, locator: &Locator) -> Result<Arc<dyn SqlConnection>> {
        self.executor.connection(locator, self)
    }

    /// Processor chain producing the rows of `locator`.
    ///
    /// # Errors
    ///
    /// Returns [`EtlError::Creation`] when the component is missing, is not
    /// a row source, reads from itself, or any factory fails.
    pub fn processor(&self, locator: &Locator) -> Result<Box<dyn Processor>> {
        {
            let mut resolving = lock(&self.resolving);
            if resolving.contains(locator) {
                return Err(EtlError::creation(locator, "component reads from itself"));
            }
            resolving.push(locator.clone());
        }
        let processor = self.create_processor(locator);
        lock(&self.resolving).retain(|l| l != locator);
        processor
    }

    fn create_processor(&self, locator: &Locator) -> Result<Box<dyn Processor>> {
        match self.project().component(locator)? {
            Component::Extract(extract) => {
                let factory = self
                    .registry()
                    .extract(&extract.kind)
                    .map_err(|e| EtlError::creation(locator, e))?;
                factory(extract, self)
            }
            Component::Transform(transform) => self.transform_processor(transform),
            _ => Err(EtlError::creation(locator, "component is not a row source")),
        }
    }

    fn transform_processor(&self, transform: &Transform) -> Result<Box<dyn Processor>> {
        let source = self.processor(&transform.source)?;
        let functions = transform
            .functions
            .iter()
            .map(|spec| self.function(spec, &transform.locator))
            .collect::<Result<Vec<_>>>()?;
        let processor = TransformInputProcessor::new(
            transform.locator.name(),
            source,
            functions,
            transform.outputs.clone(),
        )?;
        if transform.filters.is_empty() {
            Ok(Box::new(processor))
        } else {
            Ok(Box::new(FilterProcessor::new(
                Box::new(processor),
                transform.filters.clone(),
            )))
        }
    }

    fn function(&self, spec: &FunctionSpec, owner: &Locator) -> Result<Function> {
        let mut spec = spec.clone();
        for value in spec.params.values_mut() {
            *value = self.substitute(value)?;
        }
        let factory = self
            .registry()
            .function(&spec.kind)
            .map_err(|e| EtlError::creation(format!("{owner}.{}", spec.name), e))?;
        let kernel = factory(&spec, self)?;
        Ok(Function::new(&spec, kernel))
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Creates executions for one project.
#[derive(Clone)]
pub struct Executor {
    project: Arc<Project>,
    registry: Arc<ComponentRegistry>,
    connections: Arc<Mutex<HashMap<Locator, Arc<dyn SqlConnection>>>>,
    next_id: Arc<AtomicU64>,
}

impl Executor {
    #[must_use]
    pub fn new(project: Arc<Project>, registry: Arc<ComponentRegistry>) -> Self {
        Self {
            project,
            registry,
            connections: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    #[must_use]
    pub fn project(&self) -> &Arc<Project> {
        &self.project
    }

    fn connection(&self, locator: &Locator, ctx: &ExecutionContext) -> Result<Arc<dyn SqlConnection>> {
        let mut connections = lock(&self.connections);
        if let Some(conn) = connections.get(locator) {
            return Ok(Arc::clone(conn));
        }
        let Component::Connection(connection) = self.project.component(locator)? else {
            return Err(EtlError::creation(locator, "component is not a connection"));
        };
        let factory = self
            .registry
            .connection(&connection.kind)
            .map_err(|e| EtlError::creation(locator, e))?;
        let conn = factory(connection, ctx).map_err(|e| EtlError::creation(locator, e))?;
        connections.insert(locator.clone(), Arc::clone(&conn));
        Ok(conn)
    }

    /// Prepare an execution of the load or job at `locator`.
    ///
    /// Variables resolve with `variables` first, then the job's declared
    /// defaults, then the project's. A locator that does not name a load or
    /// job yields an execution that finishes as `invalid`.
    #[must_use]
    pub fn create_execution(
        &self,
        locator: &Locator,
        variables: BTreeMap<String, String>,
        parent: Option<Arc<ExecutionState>>,
    ) -> Execution {
        let id = ExecutionId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let state = Arc::new(ExecutionState::new(id, locator.clone(), parent));
        let target = self.project.component(locator).and_then(|c| {
            if c.kind().is_executable() {
                Ok(c.clone())
            } else {
                Err(EtlError::creation(locator, format!("{} can not be executed", c.kind())))
            }
        });
        let mut effective = self.project.variables().clone();
        if let Ok(Component::Job(job)) = &target {
            effective.extend(job.variables.clone());
        }
        effective.extend(variables.clone());
        Execution {
            context: ExecutionContext {
                executor: self.clone(),
                state,
                external: variables,
                variables: effective,
                resolving: Mutex::new(Vec::new()),
            },
            target,
        }
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("project", &self.project.name())
            .field("next_id", &self.next_id)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// A prepared run of one load or job.
pub struct Execution {
    context: ExecutionContext,
    target: Result<Component>,
}

impl Execution {
    #[must_use]
    pub fn state(&self) -> &Arc<ExecutionState> {
        &self.context.state
    }

    #[must_use]
    pub fn variables(&self) -> &BTreeMap<String, String> {
        &self.context.variables
    }

    /// Run to completion. Errors are recorded, never returned.
    #[must_use]
    pub fn execute(&self, thread_name: &str) -> ExecutionResult {
        let started = Instant::now();
        let state = &self.context.state;
        let status = match &self.target {
            Err(e) => {
                tracing::error!(
                    execution = %state.id(),
                    locator = %state.locator(),
                    error = %e,
                    "Execution is invalid"
                );
                state.fail(e, ExecutionStatus::Invalid);
                ExecutionStatus::Invalid
            }
            Ok(_) if state.is_stopped() => {
                state.set_status(ExecutionStatus::Stopped);
                ExecutionStatus::Stopped
            }
            Ok(component) => {
                state.start();
                tracing::info!(
                    execution = %state.id(),
                    locator = %state.locator(),
                    thread = thread_name,
                    "Execution started"
                );
                let outcome = match component {
                    Component::Load(load) => execute_load(&self.context, load).map(|_| ()),
                    Component::Job(job) => {
                        execute_job(&self.context, job, thread_name);
                        Ok(())
                    }
                    _ => Err(EtlError::runtime("component can not be executed")),
                };
                match outcome {
                    Ok(()) => state.finish(),
                    Err(e) => {
                        tracing::error!(
                            execution = %state.id(),
                            locator = %state.locator(),
                            error = %e,
                            "Execution failed"
                        );
                        state.fail(&e, ExecutionStatus::Failed);
                        ExecutionStatus::Failed
                    }
                }
            }
        };
        let result = ExecutionResult {
            id: state.id(),
            locator: state.locator().clone(),
            status,
            stats: state.stats(),
            elapsed: started.elapsed(),
        };
        tracing::info!(
            execution = %result.id,
            locator = %result.locator,
            status = %result.status,
            rows_written = result.stats.rows_written,
            errors = result.stats.errors,
            elapsed_ms = result.elapsed.as_millis(),
            "{}",
            result.status.message()
        );
        result
    }
}

/// Run independent executions on one named thread each and wait for all.
///
/// Results are returned in input order.
#[must_use]
pub fn run_parallel(executions: &[Execution]) -> Vec<ExecutionResult> {
    std::thread::scope(|scope| {
        let handles: Vec<_> = executions
            .iter()
            .map(|execution| {
                let name = format!("tributary-{}", execution.state().id().as_u64());
                let spawned = std::thread::Builder::new()
                    .name(name.clone())
                    .spawn_scoped(scope, move || execution.execute(&name));
                (execution, spawned)
            })
            .collect();
        handles
            .into_iter()
            .map(|(execution, spawned)| match spawned {
                Ok(handle) => handle.join().unwrap_or_else(|_| {
                    let state = execution.state();
                    state.fail(&EtlError::runtime("execution thread panicked"), ExecutionStatus::Aborted);
                    ExecutionResult {
                        id: state.id(),
                        locator: state.locator().clone(),
                        status: ExecutionStatus::Aborted,
                        stats: state.stats(),
                        elapsed: Duration::ZERO,
                    }
                }),
                Err(e) => {
                    tracing::warn!(error = %e, "Could not spawn execution thread, running inline");
                    execution.execute("inline")
                }
            })
            .collect()
    })
}

// ---------------------------------------------------------------------------
// Loads and jobs
// ---------------------------------------------------------------------------

/// Pull every row of the load's source into its target table.
///
/// Returns the row count of the target after commit.
fn execute_load(ctx: &ExecutionContext, load: &Load) -> Result<u64> {
    let source = ctx.processor(&load.source)?;
    let executable: Arc<dyn Executable> = Arc::clone(ctx.state()) as Arc<dyn Executable>;
    let mut chain: Box<dyn Processor> =
        Box::new(WindowProcessor::new(source, load.window).with_executable(executable));
    if let Some(columns) = &load.columns {
        chain = Box::new(CoordinateProcessor::new(chain, columns.clone()));
    }
    let mut chain = RecodingProcessor::new(chain);
    chain.init()?;

    let table = match &load.table {
        Some(table) => ctx.substitute(table)?,
        None => load.locator.persistent_table(),
    };
    let mut table = TableLocator::new(table);
    if let Some(schema) = &load.schema {
        table = table.with_schema(ctx.substitute(schema)?);
    }
    let mut definition = PersistorDefinition::new(table, load.mode)
        .with_aggregate(load.aggregate)
        .with_logging(load.logging)
        .with_primary_key(load.primary_key.clone());
    if let Some(bulk_size) = load.bulk_size {
        definition = definition.with_bulk_size(bulk_size);
    }
    definition.set_input(&Row::new(chain.output_description()));
    for (column, role) in &load.roles {
        definition.set_role(column, *role);
    }
    for (column, value_type) in &load.types {
        definition.set_type(column, *value_type);
    }

    let conn = ctx.connection(&load.connection)?;
    let outcome = Datastore::open(conn, definition)
        .map_err(EtlError::from)
        .and_then(|mut store| {
            let mut read = 0;
            while let Some(row) = chain.next()? {
                read += 1;
                store.write(&row)?;
            }
            let count = store.commit()?;
            Ok((read, store.rows_written(), count))
        });
    chain.close();
    let metrics = chain.metrics();
    ctx.state().record_warnings(chain.degraded());
    let (read, written, count) = outcome?;
    ctx.state().add_rows(read, written);
    tracing::info!(
        load = %load.locator,
        rows = read,
        table_rows = count,
        elapsed_ms = metrics.overall.as_millis(),
        "Load finished"
    );
    Ok(count)
}

/// Run the job's steps in order. Step failures are recorded on the job's
/// state.
///
/// A failing load stops the job when the job fails on error. A sub-job
/// stops it when the sub-job itself fails on error and ended invalid or
/// with errors of its own.
fn execute_job(ctx: &ExecutionContext, job: &Job, thread_name: &str) {
    let state = ctx.state();
    for step in &job.steps {
        if state.is_stopped() {
            tracing::info!(job = %job.locator, step = %step, "Job stopped before step");
            break;
        }
        let stop = match step.kind() {
            ComponentKind::Load => {
                let outcome = match ctx.project().component(step) {
                    Ok(Component::Load(load)) => execute_load(ctx, load).map(|_| ()),
                    Ok(_) => Err(EtlError::creation(step, "component is not a load")),
                    Err(e) => Err(e),
                };
                match outcome {
                    Ok(()) => false,
                    Err(e) => {
                        tracing::error!(job = %job.locator, step = %step, error = %e, "Load failed");
                        state.record_error(&e);
                        job.fail_on_error
                    }
                }
            }
            ComponentKind::Job => {
                let fail_on_error = match ctx.project().component(step) {
                    Ok(Component::Job(sub_job)) => {
                        if sub_job.sync_mode == SyncMode::Parallel {
                            tracing::warn!(
                                job = %job.locator,
                                step = %step,
                                "Parallel sub-job execution is not supported, running it serially"
                            );
                        }
                        sub_job.fail_on_error
                    }
                    _ => true,
                };
                let child = ctx.executor.create_execution(
                    step,
                    ctx.external.clone(),
                    Some(Arc::clone(state)),
                );
                let result = child.execute(thread_name);
                state.absorb(&result.stats);
                fail_on_error
                    && (result.status == ExecutionStatus::Invalid || result.stats.errors > 0)
            }
            kind => {
                let e = EtlError::creation(step, format!("{kind} can not be a job step"));
                state.record_error(&e);
                job.fail_on_error
            }
        };
        if stop {
            tracing::warn!(job = %job.locator, step = %step, "Job stopped after failing step");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Connection, Extract};
    use tributary_types::{ColumnDef, Value, ValueType};

    fn loc(kind: ComponentKind, name: &str) -> Locator {
        Locator::new("p", kind, name)
    }

    fn project() -> Project {
        let mut project = Project::new("p");
        project.set_variable("region", "global");
        project
            .add(Connection {
                locator: loc(ComponentKind::Connection, "db"),
                kind: "sqlite".into(),
                params: BTreeMap::new(),
            })
            .unwrap();
        project
            .add(Extract {
                locator: loc(ComponentKind::Extract, "numbers"),
                kind: "inline".into(),
                connection: None,
                columns: vec![ColumnDef::new("n").with_type(ValueType::Integer)],
                rows: (1..=5).map(|i| vec![Value::Int(i)]).collect(),
                query: None,
                params: BTreeMap::new(),
            })
            .unwrap();
        project
    }

    fn executor(project: Project) -> Executor {
        Executor::new(Arc::new(project), Arc::new(ComponentRegistry::with_builtins()))
    }

    #[test]
    fn stopping_a_parent_stops_children() {
        let parent = Arc::new(ExecutionState::new(
            ExecutionId::new(1),
            loc(ComponentKind::Job, "a"),
            None,
        ));
        let child = ExecutionState::new(ExecutionId::new(2), loc(ComponentKind::Job, "b"), Some(Arc::clone(&parent)));
        assert!(child.is_executable());
        parent.stop();
        assert!(!child.is_executable());
        assert_eq!(parent.status(), ExecutionStatus::Stopping);
    }

    #[test]
    fn finish_prefers_errors_over_warnings() {
        let state = ExecutionState::new(ExecutionId::new(1), loc(ComponentKind::Load, "l"), None);
        state.record_warnings(2);
        assert_eq!(state.finish(), ExecutionStatus::Warnings);
        state.record_error(&EtlError::runtime("first"));
        state.record_error(&EtlError::runtime("second"));
        assert_eq!(state.finish(), ExecutionStatus::Errors);
        assert_eq!(state.stats().first_error.as_deref(), Some("first"));
    }

    #[test]
    fn substitution_reports_every_missing_variable() {
        let execution = executor(project()).create_execution(
            &loc(ComponentKind::Job, "missing"),
            BTreeMap::from([("table".to_string(), "sales".to_string())]),
            None,
        );
        let ctx = &execution.context;
        assert_eq!(ctx.substitute("t_${table}_${region}").unwrap(), "t_sales_global");
        let err = ctx.substitute("${a}${b}").unwrap_err();
        assert!(err.to_string().ends_with("a, b"));
    }

    #[test]
    fn missing_component_is_invalid() {
        let result = executor(project())
            .create_execution(&loc(ComponentKind::Job, "missing"), BTreeMap::new(), None)
            .execute("test");
        assert_eq!(result.status, ExecutionStatus::Invalid);
        assert_eq!(result.stats.errors, 1);
    }

    #[test]
    fn extracts_can_not_be_executed() {
        let result = executor(project())
            .create_execution(&loc(ComponentKind::Extract, "numbers"), BTreeMap::new(), None)
            .execute("test");
        assert_eq!(result.status, ExecutionStatus::Invalid);
    }

    #[test]
    fn processor_resolves_extracts() {
        let execution = executor(project()).create_execution(
            &loc(ComponentKind::Job, "missing"),
            BTreeMap::new(),
            None,
        );
        let mut processor = execution
            .context
            .processor(&loc(ComponentKind::Extract, "numbers"))
            .unwrap();
        assert_eq!(crate::processor::collect_rows(processor.as_mut()).unwrap().len(), 5);
        let err = execution
            .context
            .processor(&loc(ComponentKind::Connection, "db"))
            .err()
            .unwrap();
        assert!(err.to_string().contains("not a row source"));
    }

    #[test]
    fn connections_are_shared_by_the_executor() {
        let executor = executor(project());
        let execution = executor.create_execution(&loc(ComponentKind::Job, "x"), BTreeMap::new(), None);
        let a = execution.context.connection(&loc(ComponentKind::Connection, "db")).unwrap();
        let b = execution.context.connection(&loc(ComponentKind::Connection, "db")).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
