//! Error model shared by every Tributary crate.
//!
//! [`EtlError`] classifies failures the way the execution layer needs to
//! react to them: configuration and creation errors abort the affected
//! component, binding and cycle errors abort pipeline construction, and
//! runtime errors are recorded on the execution state of the unit that hit
//! them. Construct via the factory methods.

use std::fmt;

use crate::value::ValueType;

/// Failure raised while configuring, building or running a component.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EtlError {
    /// Bad or missing declarative input. Never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A component could not be instantiated.
    #[error("cannot create {component}: {message}")]
    Creation { component: String, message: String },

    /// Failure inside a component's `init`.
    #[error("failed to initialize {component}: {message}")]
    Initialization { component: String, message: String },

    /// A named input could not be resolved against functions or the source row.
    #[error("Cannot bind to input {input} in Transform {transform}")]
    Binding { input: String, transform: String },

    /// A function chain references itself.
    #[error("Cyclic dependency in input of function {function} detected: {input}")]
    CyclicDependency { function: String, input: String },

    /// A value could not be converted to the requested type.
    #[error("cannot convert '{value}' to {target}")]
    Conversion { value: String, target: ValueType },

    /// Execution-time failure not covered by a more specific variant.
    #[error("{0}")]
    Runtime(String),

    /// Failure reported by the persistence layer, with the SQL text when known.
    #[error("store error: {0}")]
    Store(String),
}

impl EtlError {
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    #[must_use]
    pub fn creation(component: impl fmt::Display, message: impl fmt::Display) -> Self {
        Self::Creation {
            component: component.to_string(),
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn initialization(component: impl fmt::Display, message: impl fmt::Display) -> Self {
        Self::Initialization {
            component: component.to_string(),
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn binding(input: impl Into<String>, transform: impl Into<String>) -> Self {
        Self::Binding {
            input: input.into(),
            transform: transform.into(),
        }
    }

    #[must_use]
    pub fn cyclic(function: impl Into<String>, input: impl Into<String>) -> Self {
        Self::CyclicDependency {
            function: function.into(),
            input: input.into(),
        }
    }

    #[must_use]
    pub fn conversion(value: impl fmt::Display, target: ValueType) -> Self {
        Self::Conversion {
            value: value.to_string(),
            target,
        }
    }

    #[must_use]
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime(message.into())
    }

    /// Configuration error for an enumerated parameter, listing the legal values.
    #[must_use]
    pub fn illegal_value(parameter: &str, value: &str, legal: &[&str]) -> Self {
        Self::Configuration(format!(
            "Illegal value '{value}' for parameter '{parameter}'. Legal values are: {}",
            legal.join(", ")
        ))
    }

    /// Wrap this error as an initialization failure of `component`.
    ///
    /// Initialization errors are passed through unchanged so that nested
    /// components do not stack prefixes.
    #[must_use]
    pub fn into_initialization(self, component: impl fmt::Display) -> Self {
        match self {
            Self::Initialization { .. } => self,
            other => Self::initialization(component, other),
        }
    }

    /// Whether the error aborts construction of a pipeline, as opposed to
    /// a single row or statement.
    #[must_use]
    pub fn is_fatal_for_pipeline(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_)
                | Self::Creation { .. }
                | Self::Initialization { .. }
                | Self::Binding { .. }
                | Self::CyclicDependency { .. }
        )
    }
}

/// Convenience alias used throughout Tributary.
pub type Result<T> = std::result::Result<T, EtlError>;
