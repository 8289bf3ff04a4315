//! Inputs and outputs of the workflow state machine.
//!
//! Operator input arrives as [`Action`]s. Each transition may ask for
//! collaborator calls in the form of [`Effect`]s; running an effect yields a
//! [`Completion`] that is fed back into the workflow and carries the key the
//! call was issued under.

use crate::Result;
use crate::backend::{ExportRequest, ImportRequest, ImportResponse, TransferBackend};
use crate::connection::ConnectionDescriptor;
use crate::executor::{ArtifactSink, ExportOutcome, run_export, run_import};
use crate::models::{Delimiter, ExportFormat, FilePayload, SchemaDescription, TransferDirection};
use crate::schema_cache::{FileKey, TableKey, TablesKey};
use crate::security::Credential;
use crate::status::Concern;
use std::sync::Arc;

/// Edit of a single connection field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEdit {
    /// Server host
    Host(String),
    /// Server port
    Port(u16),
    /// User name
    User(String),
    /// Password or JWT token
    Credential(Credential),
    /// TLS on or off
    SecureChannel(bool),
}

impl ConnectionEdit {
    /// Applies the edit to a descriptor.
    pub(crate) fn apply(self, connection: &mut ConnectionDescriptor) {
        match self {
            Self::Host(host) => connection.host = host,
            Self::Port(port) => connection.port = port,
            Self::User(user) => connection.user = user,
            Self::Credential(credential) => connection.credential = credential,
            Self::SecureChannel(secure) => connection.secure = secure,
        }
    }
}

/// Operator input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Switch between export and import
    SetDirection(TransferDirection),
    /// Change one connection field
    EditConnection(ConnectionEdit),
    /// Verify the connection parameters
    TestConnection,
    /// Pick a database; `None` or blank means the server default
    SelectDatabase(Option<String>),
    /// Pick the export source table
    SelectTable(Option<String>),
    /// Flip one column of the export selection
    ToggleColumn(String),
    /// "Select all" checkbox
    ToggleAllColumns,
    /// Export format
    SetExportFormat(ExportFormat),
    /// Explicit export file name; blank means synthesize one
    SetExportFilename(String),
    /// Header row on or off
    SetIncludeHeaders(bool),
    /// Load a file for import
    LoadFile(FilePayload),
    /// File delimiter
    SetDelimiter(Delimiter),
    /// Import target table
    SetTargetTable(String),
    /// Create the target table when absent
    SetCreateTable(bool),
    /// Rename one file column in the import mapping
    SetMappingTarget {
        /// File column
        source: String,
        /// Target column; blank leaves it unmapped
        target: String,
    },
    /// Run the export or import
    Execute,
    /// Reset a terminal status to idle
    Dismiss(Concern),
}

/// A collaborator call requested by a transition.
#[derive(Debug, Clone)]
pub enum Effect {
    /// Connection test
    VerifyConnection {
        /// Connection revision at request time
        revision: u64,
        /// Parameters to test
        connection: ConnectionDescriptor,
    },
    /// Database listing
    ListDatabases {
        /// Connection revision at request time
        revision: u64,
        /// Connection to list on
        connection: ConnectionDescriptor,
    },
    /// Table listing
    ListTables {
        /// Request key
        key: TablesKey,
        /// Connection with the database set
        connection: ConnectionDescriptor,
    },
    /// Table description
    DescribeTable {
        /// Request key
        key: TableKey,
        /// Connection with the database set
        connection: ConnectionDescriptor,
    },
    /// File analysis
    DescribeFile {
        /// Request key
        key: FileKey,
        /// File content
        file: FilePayload,
    },
    /// Export execution
    Export {
        /// Execution identity
        execution: u64,
        /// Assembled request
        request: ExportRequest,
    },
    /// Import execution
    Import {
        /// Execution identity
        execution: u64,
        /// Assembled request
        request: ImportRequest,
    },
}

/// Outcome of an effect, tagged with the key it was issued under.
#[derive(Debug)]
pub enum Completion {
    /// Connection test finished
    ConnectionVerified {
        /// Connection revision at request time
        revision: u64,
        /// Outcome
        result: Result<()>,
    },
    /// Database listing finished
    DatabasesListed {
        /// Connection revision at request time
        revision: u64,
        /// Outcome
        result: Result<Vec<String>>,
    },
    /// Table listing finished
    TablesListed {
        /// Request key
        key: TablesKey,
        /// Outcome
        result: Result<Vec<String>>,
    },
    /// Table description finished
    TableDescribed {
        /// Request key
        key: TableKey,
        /// Outcome
        result: Result<SchemaDescription>,
    },
    /// File analysis finished
    FileDescribed {
        /// Request key
        key: FileKey,
        /// Outcome
        result: Result<SchemaDescription>,
    },
    /// Export finished
    Exported {
        /// Execution identity
        execution: u64,
        /// Outcome
        result: Result<ExportOutcome>,
    },
    /// Import finished
    Imported {
        /// Execution identity
        execution: u64,
        /// Outcome
        result: Result<ImportResponse>,
    },
}

impl Effect {
    /// Performs the call and packages its outcome.
    pub async fn run(
        self,
        backend: Arc<dyn TransferBackend>,
        sink: Arc<dyn ArtifactSink>,
    ) -> Completion {
        match self {
            Self::VerifyConnection {
                revision,
                connection,
            } => Completion::ConnectionVerified {
                revision,
                result: backend.verify_connection(&connection).await,
            },
            Self::ListDatabases {
                revision,
                connection,
            } => Completion::DatabasesListed {
                revision,
                result: backend.list_databases(&connection).await,
            },
            Self::ListTables { key, connection } => {
                let result = backend.list_tables(&connection).await;
                Completion::TablesListed { key, result }
            }
            Self::DescribeTable { key, connection } => {
                let result = backend.describe_table(&connection, &key.table).await;
                Completion::TableDescribed { key, result }
            }
            Self::DescribeFile { key, file } => {
                let result = backend.describe_file(&file, key.delimiter).await;
                Completion::FileDescribed { key, result }
            }
            Self::Export { execution, request } => Completion::Exported {
                execution,
                result: run_export(backend.as_ref(), sink.as_ref(), &request).await,
            },
            Self::Import { execution, request } => Completion::Imported {
                execution,
                result: run_import(backend.as_ref(), &request).await,
            },
        }
    }
}
