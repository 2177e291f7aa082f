//! Generic SQL persistence for Tributary loads.
//!
//! Provides the [`SqlConnection`] trait with a [`SqliteConnection`]
//! implementation, dialect-aware table creation, batched DML through
//! [`GenericPersistor`], the load-mode semantics of [`Datastore`] and an
//! all-or-nothing in-memory [`TableCache`].

#![warn(clippy::pedantic)]

pub mod batch;
pub mod cache;
pub mod connection;
pub mod datastore;
pub mod definition;
pub mod dialect;
pub mod error;
pub mod persistor;
pub mod sqlite;

pub use batch::StatementBatch;
pub use cache::{CacheState, TableCache};
pub use connection::{DatabaseMetadata, QueryResult, SqlConnection, SqlType, TableLocator, TypeInfo};
pub use datastore::Datastore;
pub use definition::PersistorDefinition;
pub use dialect::{Dialect, MetadataModule};
pub use error::StoreError;
pub use persistor::GenericPersistor;
pub use sqlite::SqliteConnection;
