//! Core of chbridge, a guided tool for moving tables between ClickHouse and
//! flat files.
//!
//! This crate holds the transfer workflow controller: the state machine that
//! sequences connection verification, schema discovery, column selection or
//! mapping, and execution of an export or import. Connection handling, file
//! parsing, serialization and bulk insertion live in an external transfer
//! service reached through [`backend::TransferBackend`].
//!
//! # Security Guarantees
//! - Credentials are held in zeroizing containers and never logged
//! - Connection descriptors render without user or credential
//! - Export content is written byte for byte, never reinterpreted
//!
//! # Architecture
//! - Pure state machine: `Workflow::handle` and `Workflow::complete` replace
//!   an immutable snapshot wholesale and return the calls to make
//! - Keyed staleness guard: every response carries the key it was requested
//!   under and is dropped if the selection has moved on
//! - Async driver: `TransferSession` runs calls concurrently and applies
//!   their outcomes one at a time

pub mod backend;
pub mod connection;
pub mod error;
pub mod executor;
pub mod logging;
pub mod mapping;
pub mod models;
pub mod schema_cache;
pub mod security;
pub mod status;
pub mod workflow;

// Re-export commonly used types
pub use backend::{BackendConfig, HttpBackend, TransferBackend};
pub use connection::ConnectionDescriptor;
pub use error::{ChBridgeError, Result};
pub use executor::{ArtifactSink, DirectorySink};
pub use logging::init_logging;
pub use mapping::{ColumnMapping, ColumnSelection, MappingBuilder};
pub use models::{Delimiter, ExportFormat, FilePayload, SchemaDescription, TransferDirection};
pub use schema_cache::{Fetch, SchemaCache};
pub use security::Credential;
pub use status::{Concern, FailureKind, StatusPhase, StatusRecord};
pub use workflow::{Action, ConnectionEdit, TransferSession, Workflow, WorkflowSnapshot};
