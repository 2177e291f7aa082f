//! Alias maps: 1-based column index to human-readable name.
//!
//! Several sources can share one alias map; [`AliasMap::join`] merges two
//! alias spaces without index collisions.

use std::collections::HashMap;

use crate::error::Result;
use crate::row::{ColumnDef, Row};

/// One alias with its column and optional default value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasElement {
    pub name: String,
    /// 1-based column index.
    pub column: usize,
    pub default: Option<String>,
}

impl AliasElement {
    #[must_use]
    pub fn new(name: impl Into<String>, column: usize) -> Self {
        Self {
            name: name.into(),
            column,
            default: None,
        }
    }

    #[must_use]
    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Name the alias would get without any explicit mapping.
    fn is_internal_default(&self) -> bool {
        self.name == format!("column{}", self.column)
    }
}

#[derive(Debug, Clone, Default)]
pub struct AliasMap {
    elements: HashMap<String, AliasElement>,
}

impl AliasMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an alias. Conflicts are logged, the new mapping wins.
    pub fn map(&mut self, element: AliasElement) {
        if let Some(existing) = self.elements.get(&element.name) {
            if existing.column == element.column {
                return;
            }
            tracing::error!(
                alias = element.name,
                column = element.column,
                previous = existing.column,
                "Duplicate alias for different columns"
            );
        }
        if let Some(other) = self
            .elements
            .values()
            .find(|e| e.column == element.column && e.name != element.name)
        {
            tracing::error!(
                alias = element.name,
                other = other.name,
                column = element.column,
                "Different aliases reference the same column"
            );
        }
        self.elements.insert(element.name.clone(), element);
    }

    #[must_use]
    pub fn element(&self, alias: &str) -> Option<&AliasElement> {
        let element = self.elements.get(alias);
        if element.is_none() {
            tracing::warn!(alias, "Alias not found");
        }
        element
    }

    #[must_use]
    pub fn has_alias(&self, alias: &str) -> bool {
        self.elements.contains_key(alias)
    }

    #[must_use]
    pub fn has_column(&self, column: usize) -> bool {
        self.elements.values().any(|e| e.column == column)
    }

    /// Column of `alias`, `None` if unknown.
    #[must_use]
    pub fn col(&self, alias: &str) -> Option<usize> {
        self.element(alias).map(|e| e.column)
    }

    /// Alias of `column`, falling back to `default`.
    ///
    /// An empty default expands to `constant<column>`. An explicit default
    /// is preferred over an alias that merely repeats the internal name.
    #[must_use]
    pub fn alias_for(&self, column: usize, default: Option<&str>) -> Option<String> {
        let fallback = || {
            default.map(|d| {
                if d.is_empty() {
                    format!("constant{column}")
                } else {
                    d.to_string()
                }
            })
        };
        match self.elements.values().find(|e| e.column == column) {
            Some(e) if e.is_internal_default() => fallback(),
            Some(e) => Some(e.name.clone()),
            None => fallback(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    #[must_use]
    pub fn has_default_values(&self) -> bool {
        self.elements.values().any(|e| e.default.is_some())
    }

    /// Elements ordered by column, ties broken by name.
    fn ordered(&self) -> Vec<&AliasElement> {
        let mut ordered: Vec<&AliasElement> = self.elements.values().collect();
        ordered.sort_by(|a, b| a.column.cmp(&b.column).then_with(|| a.name.cmp(&b.name)));
        ordered
    }

    /// Alias names ordered by column index.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.ordered().into_iter().map(|e| e.name.clone()).collect()
    }

    /// Move every element `offset` columns to the right.
    pub fn shift(&mut self, offset: usize) {
        for element in self.elements.values_mut() {
            element.column += offset;
        }
    }

    /// Merge `other` into this map.
    ///
    /// Aliases of `other` not present here are appended after this map's
    /// columns; afterwards all columns are renumbered `1..=len` in column
    /// order. Returns the merged names in column order.
    pub fn join(&mut self, other: &AliasMap) -> Vec<String> {
        let offset = self.len();
        for element in other.elements.values() {
            if !self.elements.contains_key(&element.name) {
                let mut shifted = element.clone();
                shifted.column += offset;
                self.map(shifted);
            }
        }
        let names = self.names();
        for (i, name) in names.iter().enumerate() {
            if let Some(element) = self.elements.get_mut(name) {
                element.column = i + 1;
            }
        }
        names
    }

    /// Plain-column row describing the mapped names, in column order.
    ///
    /// # Errors
    ///
    /// Propagates row construction errors.
    pub fn output_description(&self) -> Result<Row> {
        let columns = self
            .ordered()
            .into_iter()
            .map(|e| match &e.default {
                Some(d) => ColumnDef::new(&e.name).with_constant(d.as_str()),
                None => ColumnDef::new(&e.name),
            })
            .collect();
        Row::from_columns(columns)
    }
}

impl FromIterator<AliasElement> for AliasMap {
    fn from_iter<T: IntoIterator<Item = AliasElement>>(iter: T) -> Self {
        let mut map = Self::new();
        for element in iter {
            map.map(element);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use proptest::prelude::*;

    fn map_of(names: &[&str]) -> AliasMap {
        names
            .iter()
            .enumerate()
            .map(|(i, n)| AliasElement::new(*n, i + 1))
            .collect()
    }

    #[test]
    fn map_same_alias_same_column_is_noop() {
        let mut map = map_of(&["a", "b"]);
        map.map(AliasElement::new("a", 1));
        assert_eq!(map.len(), 2);
        assert_eq!(map.col("a"), Some(1));
    }

    #[test]
    fn conflicting_alias_is_replaced_not_fatal() {
        let mut map = map_of(&["a", "b"]);
        map.map(AliasElement::new("a", 5));
        assert_eq!(map.col("a"), Some(5));
    }

    #[test]
    fn alias_for_uses_constant_prefix_on_empty_default() {
        let map = map_of(&["a"]);
        assert_eq!(map.alias_for(1, None), Some("a".into()));
        assert_eq!(map.alias_for(7, Some("")), Some("constant7".into()));
        assert_eq!(map.alias_for(7, None), None);
    }

    #[test]
    fn alias_for_prefers_explicit_default_over_internal_name() {
        let map: AliasMap = [AliasElement::new("column2", 2)].into_iter().collect();
        assert_eq!(map.alias_for(2, Some("amount")), Some("amount".into()));
    }

    #[test]
    fn join_skips_existing_names() {
        let mut a = map_of(&["id", "name"]);
        let b = map_of(&["name", "price"]);
        let names = a.join(&b);
        assert_eq!(names, vec!["id", "name", "price"]);
        assert_eq!(a.col("price"), Some(3));
    }

    #[test]
    fn output_description_carries_defaults() {
        let map: AliasMap = [
            AliasElement::new("b", 2).with_default("x"),
            AliasElement::new("a", 1),
        ]
        .into_iter()
        .collect();
        assert!(map.has_default_values());
        let row = map.output_description().unwrap();
        assert_eq!(row.names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(row.value("b"), Some(&Value::from("x")));
    }

    proptest! {
        #[test]
        fn join_yields_contiguous_permutation(n in 0usize..12, m in 0usize..12) {
            let left: Vec<String> = (0..n).map(|i| format!("a{i}")).collect();
            let right: Vec<String> = (0..m).map(|i| format!("b{i}")).collect();
            let mut a: AliasMap = left.iter().enumerate().map(|(i, s)| AliasElement::new(s, i + 1)).collect();
            let b: AliasMap = right.iter().enumerate().map(|(i, s)| AliasElement::new(s, i + 1)).collect();

            let names = a.join(&b);

            prop_assert_eq!(names.len(), n + m);
            let mut cols: Vec<usize> = names.iter().map(|s| a.col(s).unwrap()).collect();
            cols.sort_unstable();
            prop_assert_eq!(cols, (1..=n + m).collect::<Vec<_>>());
            for (i, name) in right.iter().enumerate() {
                prop_assert_eq!(a.col(name), Some(n + i + 1));
            }
        }
    }
}
