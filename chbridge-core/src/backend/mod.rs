//! Contract with the transfer service.
//!
//! Connection handling, file parsing, serialization, and bulk insertion all
//! live behind this boundary. The workflow only issues requests and
//! interprets responses.
//!
//! # Module Structure
//! - `config`: Transport settings (`BackendConfig`)
//! - `http`: REST implementation of [`TransferBackend`]

use crate::Result;
use crate::connection::ConnectionDescriptor;
use crate::mapping::{ColumnMapping, ColumnSelection};
use crate::models::{Delimiter, ExportFormat, FilePayload, SchemaDescription};
use crate::status::FailureKind;
use async_trait::async_trait;

pub mod config;
pub mod http;

pub use config::BackendConfig;
pub use http::HttpBackend;

/// The calls the workflow makes against the transfer service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Connection test
    VerifyConnection,
    /// Database listing
    ListDatabases,
    /// Table listing
    ListTables,
    /// Table description
    DescribeTable,
    /// File analysis
    DescribeFile,
    /// Export execution
    Export,
    /// Import execution
    Import,
}

impl Operation {
    /// Failure classification for this call
    pub const fn failure_kind(self) -> FailureKind {
        match self {
            Self::VerifyConnection | Self::ListDatabases | Self::ListTables => {
                FailureKind::Connectivity
            }
            Self::DescribeTable | Self::DescribeFile => FailureKind::SchemaFetch,
            Self::Export | Self::Import => FailureKind::Execution,
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::VerifyConnection => "Connection test",
            Self::ListDatabases => "Database listing",
            Self::ListTables => "Table listing",
            Self::DescribeTable => "Table description",
            Self::DescribeFile => "File analysis",
            Self::Export => "Export",
            Self::Import => "Import",
        };
        f.write_str(name)
    }
}

/// One-shot export request, assembled right before execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRequest {
    /// Connection with the source database selected
    pub connection: ConnectionDescriptor,
    /// Source table
    pub table: String,
    /// Columns to export, in schema order
    pub columns: ColumnSelection,
    /// Serialization format
    pub format: ExportFormat,
    /// Requested file name
    pub filename: Option<String>,
    /// Whether to emit a header row
    pub include_headers: bool,
}

impl ExportRequest {
    /// `database.table`, or the bare table for the server default database
    pub fn qualified_table(&self) -> String {
        match &self.connection.database {
            Some(database) => format!("{database}.{}", self.table),
            None => self.table.clone(),
        }
    }
}

/// Export result returned by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportResponse {
    /// Serialized content, passed through untouched
    pub content: Vec<u8>,
    /// MIME type of `content`
    pub content_type: String,
    /// File name the service settled on
    pub filename: String,
    /// Number of rows written
    pub rows_exported: u64,
}

/// One-shot import request, assembled right before execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRequest {
    /// File to import
    pub file: FilePayload,
    /// Delimiter to parse the file with
    pub delimiter: Delimiter,
    /// Connection with the target database selected
    pub connection: ConnectionDescriptor,
    /// Target table
    pub table: String,
    /// Create the table when it does not exist
    pub create_table: bool,
    /// Column rename; unmapped entries are skipped by the transport
    pub mapping: ColumnMapping,
}

/// Import result returned by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportResponse {
    /// Human-readable result, shown verbatim
    pub message: String,
    /// Rows inserted, when reported
    pub rows_imported: Option<u64>,
}

/// Transfer service interface with object-safe design.
///
/// Implementations must not retain the connection descriptor beyond the
/// call and must never log its credential.
#[async_trait]
pub trait TransferBackend: Send + Sync {
    /// Checks that the server accepts the connection parameters.
    async fn verify_connection(&self, connection: &ConnectionDescriptor) -> Result<()>;

    /// Lists databases visible to the user.
    async fn list_databases(&self, connection: &ConnectionDescriptor) -> Result<Vec<String>>;

    /// Lists tables of `connection.database`.
    async fn list_tables(&self, connection: &ConnectionDescriptor) -> Result<Vec<String>>;

    /// Describes a table: columns and sample rows, no inferred types.
    async fn describe_table(
        &self,
        connection: &ConnectionDescriptor,
        table: &str,
    ) -> Result<SchemaDescription>;

    /// Parses a file header and preview rows and infers column types.
    async fn describe_file(
        &self,
        file: &FilePayload,
        delimiter: Delimiter,
    ) -> Result<SchemaDescription>;

    /// Runs an export and returns the serialized content.
    async fn export(&self, request: &ExportRequest) -> Result<ExportResponse>;

    /// Runs an import.
    async fn import(&self, request: &ImportRequest) -> Result<ImportResponse>;
}
