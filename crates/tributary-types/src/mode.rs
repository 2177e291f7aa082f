//! Write semantics for loads and relational columns.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{EtlError, Result};

fn parse_enum<T: Copy>(parameter: &str, value: &str, all: &[T], name: fn(T) -> &'static str) -> Result<T> {
    all.iter()
        .copied()
        .find(|v| name(*v).eq_ignore_ascii_case(value))
        .ok_or_else(|| {
            let legal: Vec<&str> = all.iter().map(|v| name(*v)).collect();
            EtlError::illegal_value(parameter, value, &legal)
        })
}

// ---------------------------------------------------------------------------
// Load modes
// ---------------------------------------------------------------------------

/// How a load treats the existing content of its target table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadMode {
    /// Drop and recreate the table.
    Create,
    /// Aggregate new rows into existing ones.
    Add,
    /// Replace the table content.
    #[default]
    Update,
    /// Append rows.
    Insert,
    /// Delete rows matching the key columns.
    Delete,
    /// Append rows without any aggregation.
    Fill,
    /// Throwaway table recreated for every run.
    Temporary,
}

impl LoadMode {
    pub const ALL: [LoadMode; 7] = [
        Self::Create,
        Self::Add,
        Self::Update,
        Self::Insert,
        Self::Delete,
        Self::Fill,
        Self::Temporary,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Add => "add",
            Self::Update => "update",
            Self::Insert => "insert",
            Self::Delete => "delete",
            Self::Fill => "fill",
            Self::Temporary => "temporary",
        }
    }
}

impl fmt::Display for LoadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoadMode {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self> {
        parse_enum("mode", s, &Self::ALL, Self::as_str)
    }
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Where rows sharing a key are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateMode {
    /// Rows are written as they arrive.
    #[default]
    None,
    /// Rows are staged in a temporary table and aggregated in SQL on commit.
    Bulk,
    /// Every row is merged into its target row by an update.
    Row,
}

impl AggregateMode {
    pub const ALL: [AggregateMode; 3] = [Self::None, Self::Bulk, Self::Row];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Bulk => "bulk",
            Self::Row => "row",
        }
    }
}

impl fmt::Display for AggregateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregateMode {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self> {
        parse_enum("aggregate", s, &Self::ALL, Self::as_str)
    }
}

// ---------------------------------------------------------------------------
// Column roles
// ---------------------------------------------------------------------------

/// Role of a relational column in an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateMode {
    /// Part of the logical key.
    Key,
    Sum,
    Min,
    Max,
    /// Latest value wins.
    #[default]
    Last,
    Count,
    Avg,
    /// Earliest value wins.
    First,
}

impl UpdateMode {
    pub const ALL: [UpdateMode; 8] = [
        Self::Key,
        Self::Sum,
        Self::Min,
        Self::Max,
        Self::Last,
        Self::Count,
        Self::Avg,
        Self::First,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Key => "key",
            Self::Sum => "sum",
            Self::Min => "min",
            Self::Max => "max",
            Self::Last => "last",
            Self::Count => "count",
            Self::Avg => "avg",
            Self::First => "first",
        }
    }

    /// Roles whose value is recomputed from incoming rows.
    #[must_use]
    pub fn is_set(self) -> bool {
        matches!(
            self,
            Self::Sum | Self::Min | Self::Max | Self::Last | Self::Count | Self::Avg
        )
    }

    /// SQL aggregate function used by bulk aggregation.
    #[must_use]
    pub fn aggregate_function(self) -> &'static str {
        match self {
            Self::Sum => "SUM",
            Self::Min => "MIN",
            Self::Count => "COUNT",
            Self::Avg => "AVG",
            Self::Key | Self::Max | Self::Last | Self::First => "MAX",
        }
    }
}

impl fmt::Display for UpdateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpdateMode {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self> {
        parse_enum("role", s, &Self::ALL, Self::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_mode_round_trips_through_str() {
        for mode in LoadMode::ALL {
            assert_eq!(mode.as_str().parse::<LoadMode>().unwrap(), mode);
        }
    }

    #[test]
    fn unknown_mode_lists_legal_values() {
        let err = "merge".parse::<LoadMode>().unwrap_err().to_string();
        assert!(
            err.contains("create, add, update, insert, delete, fill, temporary"),
            "got: {err}"
        );
    }

    #[test]
    fn unknown_aggregate_names_parameter() {
        let err = "hash".parse::<AggregateMode>().unwrap_err().to_string();
        assert!(err.contains("'aggregate'"), "got: {err}");
    }

    #[test]
    fn set_roles_exclude_key_and_first() {
        let set: Vec<UpdateMode> = UpdateMode::ALL.into_iter().filter(|m| m.is_set()).collect();
        assert_eq!(
            set,
            vec![
                UpdateMode::Sum,
                UpdateMode::Min,
                UpdateMode::Max,
                UpdateMode::Last,
                UpdateMode::Count,
                UpdateMode::Avg
            ]
        );
    }
}
