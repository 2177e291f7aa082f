//! Shared Tributary row, column, locator, write-mode and error model types.
//!
//! This crate has no I/O and is the dependency root of the workspace.

pub mod alias;
pub mod error;
pub mod locator;
pub mod mode;
pub mod row;
pub mod state;
pub mod value;

pub use alias::{AliasElement, AliasMap};
pub use error::{EtlError, Result};
pub use locator::{ComponentKind, Locator};
pub use mode::{AggregateMode, LoadMode, UpdateMode};
pub use row::{ColumnDef, ColumnSource, NodeKind, NodeType, Row, Schema};
pub use state::{ExecutionId, ExecutionStats, ExecutionStatus};
pub use value::{Value, ValueType};
