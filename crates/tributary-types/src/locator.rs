//! Hierarchical component addresses (`project.kind.name`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{EtlError, Result};

/// Kind of a top-level project component.
///
/// Variant order is the order in which a project enumerates its model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Connection,
    Extract,
    Transform,
    Load,
    Job,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 5] = [
        Self::Connection,
        Self::Extract,
        Self::Transform,
        Self::Load,
        Self::Job,
    ];

    /// Path segment used in locators (`connections`, `extracts`, ...).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connection => "connections",
            Self::Extract => "extracts",
            Self::Transform => "transforms",
            Self::Load => "loads",
            Self::Job => "jobs",
        }
    }

    /// Whether this kind can be started by an execution.
    #[must_use]
    pub fn is_executable(self) -> bool {
        matches!(self, Self::Load | Self::Job)
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComponentKind {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s || k.as_str().trim_end_matches('s') == s)
            .ok_or_else(|| {
                let legal: Vec<&str> = Self::ALL.iter().map(|k| k.as_str()).collect();
                EtlError::illegal_value("component kind", s, &legal)
            })
    }
}

/// Address of a component inside a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Locator {
    project: String,
    kind: ComponentKind,
    name: String,
}

impl Locator {
    #[must_use]
    pub fn new(project: impl Into<String>, kind: ComponentKind, name: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            kind,
            name: name.into(),
        }
    }

    /// Parse `kind.name` relative to `project`, or a fully qualified
    /// `project.kind.name`.
    ///
    /// # Errors
    ///
    /// Returns [`EtlError::Configuration`] when the text is not a locator.
    pub fn parse_in(project: &str, s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.splitn(2, '.').collect();
        if let [kind, name] = parts.as_slice() {
            if let Ok(kind) = kind.parse::<ComponentKind>() {
                if !name.is_empty() {
                    return Ok(Self::new(project, kind, *name));
                }
            }
        }
        s.parse()
    }

    #[must_use]
    pub fn project(&self) -> &str {
        &self.project
    }

    #[must_use]
    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Table name derived from the component name: lowercase ASCII
    /// alphanumerics with every other character replaced by `_`.
    #[must_use]
    pub fn persistent_table(&self) -> String {
        self.name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    '_'
                }
            })
            .collect()
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project, self.kind, self.name)
    }
}

impl FromStr for Locator {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.splitn(3, '.').collect();
        match parts.as_slice() {
            [project, kind, name] if !project.is_empty() && !name.is_empty() => {
                Ok(Self::new(*project, kind.parse()?, *name))
            }
            _ => Err(EtlError::configuration(format!(
                "'{s}' is not a locator, expected project.kind.name"
            ))),
        }
    }
}

impl TryFrom<String> for Locator {
    type Error = EtlError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Locator> for String {
    fn from(value: Locator) -> Self {
        value.to_string()
    }
}
