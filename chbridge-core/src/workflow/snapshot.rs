//! The immutable view state published after every transition.

use crate::connection::ConnectionDescriptor;
use crate::mapping::MappingBuilder;
use crate::models::{
    Delimiter, ExportFormat, FileHandle, SchemaDescription, TransferDirection,
};
use crate::schema_cache::{FileKey, SchemaCache, SchemaSource, TableKey, TablesKey};
use crate::status::{StatusBoard, StatusPhase};
use std::sync::Arc;

/// Operator choices for an export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    /// Serialization format
    pub format: ExportFormat,
    /// Explicit file name; blank means synthesize one
    pub filename: String,
    /// Emit a header row
    pub include_headers: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            format: ExportFormat::Csv,
            filename: String::new(),
            include_headers: true,
        }
    }
}

/// Operator choices for an import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOptions {
    /// Loaded file, if any
    pub file: Option<FileHandle>,
    /// Delimiter the file is parsed with
    pub delimiter: Delimiter,
    /// Target table name
    pub target_table: String,
    /// Create the target table when it does not exist
    pub create_table: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            file: None,
            delimiter: Delimiter::Comma,
            target_table: String::new(),
            create_table: true,
        }
    }
}

/// Everything the presentation layer needs to render the workflow.
///
/// Snapshots are never mutated once published; each transition produces a
/// new one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowSnapshot {
    /// Active transfer direction
    pub direction: TransferDirection,
    /// Connection parameters, including the selected database
    pub connection: ConnectionDescriptor,
    /// Bumped on every connection edit
    pub connection_revision: u64,
    /// Whether the current connection parameters passed a test
    pub connection_verified: bool,
    /// Discovery results
    pub cache: SchemaCache,
    /// Source table of an export
    pub selected_table: Option<String>,
    /// Export selection and import mapping
    pub mapping: MappingBuilder,
    /// Export choices
    pub export: ExportOptions,
    /// Import choices
    pub import: ImportOptions,
    /// Connection and transfer status
    pub status: StatusBoard,
}

impl WorkflowSnapshot {
    /// Key a table list for the selected database would be requested under.
    pub fn tables_key(&self) -> Option<TablesKey> {
        self.connection.database.as_ref().map(|database| TablesKey {
            revision: self.connection_revision,
            database: database.clone(),
        })
    }

    /// Key a description of the selected table would be requested under.
    pub fn table_key(&self) -> Option<TableKey> {
        let database = self.connection.database.as_ref()?;
        let table = self.selected_table.as_ref()?;
        Some(TableKey {
            revision: self.connection_revision,
            database: database.clone(),
            table: table.clone(),
        })
    }

    /// Key a description of the loaded file would be requested under.
    pub fn file_key(&self) -> Option<FileKey> {
        self.import.file.as_ref().map(|file| FileKey {
            file: file.id,
            delimiter: self.import.delimiter,
        })
    }

    /// Schema source for the active direction.
    pub fn schema_source(&self) -> Option<SchemaSource> {
        match self.direction {
            TransferDirection::DatabaseToFile => self.table_key().map(SchemaSource::Table),
            TransferDirection::FileToDatabase => self.file_key().map(SchemaSource::File),
        }
    }

    /// The schema of the current source, if fetched.
    ///
    /// A cached schema belonging to any other source is never returned.
    pub fn schema(&self) -> Option<&Arc<SchemaDescription>> {
        let current = self.schema_source()?;
        if self.cache.schema_source() == Some(&current) {
            self.cache.ready_schema()
        } else {
            None
        }
    }

    /// Table list of the selected database, if fetched.
    pub fn tables(&self) -> Option<&[String]> {
        let key = self.tables_key()?;
        if self.cache.tables_key() == Some(&key) {
            self.cache.tables().ready().map(Vec::as_slice)
        } else {
            None
        }
    }

    /// Whether a transfer is in flight.
    pub fn is_running(&self) -> bool {
        self.status.transfer.phase == StatusPhase::Running
    }

    /// Reasons the execute action is withheld; empty when it is available.
    pub fn blockers(&self) -> Vec<&'static str> {
        let mut blockers = Vec::new();
        if self.is_running() {
            blockers.push("a transfer is already running");
        }

        match self.direction {
            TransferDirection::DatabaseToFile => {
                if self.selected_table.is_none() {
                    blockers.push("no table selected");
                }
                if self.mapping.selection().is_empty() {
                    blockers.push("no columns selected");
                }
            }
            TransferDirection::FileToDatabase => {
                if self.import.file.is_none() {
                    blockers.push("no file loaded");
                }
                if self.import.target_table.trim().is_empty() {
                    blockers.push("no target table named");
                }
                if self.mapping.mapping().mapped_count() == 0 {
                    blockers.push("column mapping is empty");
                }
            }
        }

        blockers
    }

    /// Whether the execute action is available.
    pub fn can_execute(&self) -> bool {
        self.blockers().is_empty()
    }
}
