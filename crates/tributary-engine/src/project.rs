//! Project model and its dependency graph.
//!
//! A [`Project`] owns every declared component. The map of direct
//! dependencies is computed lazily and memoized until the project is
//! structurally edited. Transitive queries walk that map without expanding
//! through connections, which are structural leaves.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use tributary_types::{ComponentKind, EtlError, Locator, Result};

use crate::components::Component;

/// Component to the components it directly depends on, in declaration order.
pub type DependencyMap = BTreeMap<Locator, Vec<Locator>>;

/// Declared components and variables of one project.
#[derive(Debug)]
pub struct Project {
    name: String,
    variables: BTreeMap<String, String>,
    components: BTreeMap<Locator, Component>,
    /// Memoized maps, indexed by `include_variables`.
    dependency_cache: Mutex<[Option<Arc<DependencyMap>>; 2]>,
}

impl Project {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variables: BTreeMap::new(),
            components: BTreeMap::new(),
            dependency_cache: Mutex::new([None, None]),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Project-level variable defaults.
    #[must_use]
    pub fn variables(&self) -> &BTreeMap<String, String> {
        &self.variables
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(name.into(), value.into());
        self.invalidate();
    }

    /// Add a component.
    ///
    /// # Errors
    ///
    /// Returns [`EtlError::Configuration`] when the locator belongs to
    /// another project or is already taken.
    pub fn add(&mut self, component: impl Into<Component>) -> Result<()> {
        let component = component.into();
        let locator = component.locator().clone();
        if locator.project() != self.name {
            return Err(EtlError::configuration(format!(
                "{locator} does not belong to project {}",
                self.name
            )));
        }
        if self.components.contains_key(&locator) {
            return Err(EtlError::configuration(format!("{locator} is already defined")));
        }
        self.components.insert(locator, component);
        self.invalidate();
        Ok(())
    }

    pub fn remove(&mut self, locator: &Locator) -> Option<Component> {
        let removed = self.components.remove(locator);
        if removed.is_some() {
            self.invalidate();
        }
        removed
    }

    /// # Errors
    ///
    /// Returns [`EtlError::Creation`] when no component has this locator.
    pub fn component(&self, locator: &Locator) -> Result<&Component> {
        self.components
            .get(locator)
            .ok_or_else(|| EtlError::creation(locator, "component not found"))
    }

    /// All components, ordered by kind then name.
    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.components.values()
    }

    pub fn components_of(&self, kind: ComponentKind) -> impl Iterator<Item = &Component> {
        self.components.values().filter(move |c| c.kind() == kind)
    }

    // -- dependency map -----------------------------------------------------

    /// Direct dependencies of every component, computed on first use.
    ///
    /// Both variants currently hold the same content; variable references
    /// are not tracked as dependencies yet.
    #[must_use]
    pub fn dependency_map(&self, include_variables: bool) -> Arc<DependencyMap> {
        let mut cache = self
            .dependency_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let slot = &mut cache[usize::from(include_variables)];
        if let Some(map) = slot {
            return Arc::clone(map);
        }
        let map = Arc::new(self.compute_dependency_map());
        tracing::debug!(
            project = self.name,
            components = map.len(),
            include_variables,
            "Computed dependency map"
        );
        *slot = Some(Arc::clone(&map));
        map
    }

    fn compute_dependency_map(&self) -> DependencyMap {
        self.components
            .iter()
            .map(|(locator, component)| {
                let mut deps: Vec<Locator> = Vec::new();
                for dep in component.dependencies() {
                    if !deps.contains(&dep) {
                        deps.push(dep);
                    }
                }
                (locator.clone(), deps)
            })
            .collect()
    }

    /// Drop the memoized dependency maps.
    pub fn invalidate(&self) {
        let mut cache = self
            .dependency_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *cache = [None, None];
    }

    #[must_use]
    pub fn direct_dependencies(&self, locator: &Locator) -> Vec<Locator> {
        self.dependency_map(false)
            .get(locator)
            .cloned()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn direct_dependents(&self, locator: &Locator) -> Vec<Locator> {
        self.dependency_map(false)
            .iter()
            .filter(|(_, deps)| deps.contains(locator))
            .map(|(l, _)| l.clone())
            .collect()
    }

    /// Dependency sub-graph reachable from `locator`: one entry per
    /// expanded component with its direct dependencies. Connections appear
    /// as dependencies but are not expanded. Empty for unknown locators.
    #[must_use]
    pub fn all_dependencies(&self, locator: &Locator) -> DependencyMap {
        let map = self.dependency_map(false);
        if !map.contains_key(locator) {
            return DependencyMap::new();
        }
        closure(&map, locator)
    }

    /// Dependent sub-graph reachable from `locator`: one entry per expanded
    /// component with its direct dependents, including `locator` itself.
    #[must_use]
    pub fn all_dependents(&self, locator: &Locator) -> DependencyMap {
        closure(&reverse(&self.dependency_map(false)), locator)
    }

    /// Check that no component depends on itself, directly or transitively.
    ///
    /// # Errors
    ///
    /// Returns [`EtlError::Configuration`] naming every such component.
    pub fn validate_acyclic(&self) -> Result<()> {
        let map = self.dependency_map(false);
        let cyclic: Vec<String> = map
            .keys()
            .filter(|l| closure(&map, l).values().flatten().any(|n| n == *l))
            .map(ToString::to_string)
            .collect();
        if cyclic.is_empty() {
            Ok(())
        } else {
            Err(EtlError::configuration(format!(
                "Components depend on themselves: {}",
                cyclic.join(", ")
            )))
        }
    }
}

fn reverse(map: &DependencyMap) -> DependencyMap {
    let mut reversed: DependencyMap = BTreeMap::new();
    for (locator, deps) in map {
        for dep in deps {
            reversed.entry(dep.clone()).or_default().push(locator.clone());
        }
    }
    reversed
}

/// Merge of the direct edges of `start` and of every node reachable from
/// it. Connections reached on the way are not expanded. Each node is
/// expanded once, so cycles terminate.
fn closure(edges: &DependencyMap, start: &Locator) -> DependencyMap {
    let mut merged = DependencyMap::new();
    let mut pending = vec![start.clone()];
    while let Some(node) = pending.pop() {
        if merged.contains_key(&node) {
            continue;
        }
        let next = edges.get(&node).cloned().unwrap_or_default();
        pending.extend(
            next.iter()
                .filter(|n| n.kind() != ComponentKind::Connection && !merged.contains_key(*n))
                .cloned(),
        );
        merged.insert(node, next);
    }
    merged
}
