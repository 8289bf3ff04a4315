//! The transfer workflow state machine.
//!
//! Every transition clones the current snapshot, applies one action or one
//! completion, and replaces the shared snapshot wholesale. A rejected action
//! leaves the snapshot untouched.
//!
//! Cascading rules, upstream to downstream:
//! - connection edit: drop verification and listings (and, for exports, the
//!   table, schema and selection)
//! - direction: drop cache, table, file and mapping; re-discover if verified
//! - database (export): drop table list, table, schema and selection; list
//!   tables
//! - table: drop schema and selection; describe table
//! - file or delimiter: drop schema and mapping; describe file
//!
//! Completions are applied only when the key they carry still matches the
//! current selection; anything else is stale and dropped.

use super::action::{Action, Completion, ConnectionEdit, Effect};
use super::snapshot::WorkflowSnapshot;
use crate::Result;
use crate::backend::Operation;
use crate::connection::{ConnectionDescriptor, normalize_database};
use crate::error::ChBridgeError;
use crate::executor::{
    build_export_request, build_import_request, export_failure_message, export_success_message,
    import_failure_message, import_success_message,
};
use crate::mapping::MappingBuilder;
use crate::models::{FileHandle, FileId, FilePayload, SchemaDescription, TransferDirection};
use crate::schema_cache::{Fetch, SchemaSource};
use crate::status::{Concern, StatusPhase, StatusRecord};
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Status message while a connection test is in flight.
pub const TESTING_MESSAGE: &str = "Testing connection...";
/// Status message after a successful connection test.
pub const CONNECTED_MESSAGE: &str = "Connection successful";
/// Status message while an export is in flight.
pub const EXPORTING_MESSAGE: &str = "Exporting data...";
/// Status message while an import is in flight.
pub const IMPORTING_MESSAGE: &str = "Importing data...";

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

fn failure_message(operation: Operation, error: &ChBridgeError) -> String {
    let prefix = match operation {
        Operation::VerifyConnection => "Connection failed: ",
        Operation::ListDatabases => "Failed to fetch databases: ",
        Operation::ListTables => "Failed to fetch tables: ",
        Operation::DescribeTable => "Failed to fetch table schema: ",
        Operation::DescribeFile => "Failed to analyze file: ",
        Operation::Export => return export_failure_message(error),
        Operation::Import => return import_failure_message(error),
    };
    format!("{prefix}{}", error.operator_detail())
}

/// Workflow controller.
///
/// # Example
/// ```rust
/// use chbridge_core::workflow::{Action, Effect, Workflow};
///
/// let mut workflow = Workflow::new();
/// let effects = workflow.handle(Action::TestConnection).unwrap();
///
/// assert!(matches!(effects.as_slice(), [Effect::VerifyConnection { .. }]));
/// assert!(workflow.snapshot().status.connection.phase.is_busy());
/// ```
#[derive(Debug, Clone)]
pub struct Workflow {
    snapshot: Arc<WorkflowSnapshot>,
    next_file_id: u64,
    next_execution: u64,
    pending_execution: Option<u64>,
    clock: fn() -> NaiveDate,
}

impl Default for Workflow {
    fn default() -> Self {
        Self::new()
    }
}

impl Workflow {
    /// Starts a workflow with default connection parameters.
    pub fn new() -> Self {
        Self::with_connection(ConnectionDescriptor::default())
    }

    /// Starts a workflow with the given connection parameters.
    pub fn with_connection(connection: ConnectionDescriptor) -> Self {
        Self {
            snapshot: Arc::new(WorkflowSnapshot {
                connection,
                ..WorkflowSnapshot::default()
            }),
            next_file_id: 0,
            next_execution: 0,
            pending_execution: None,
            clock: today,
        }
    }

    /// Replaces the date source used for default export file names.
    #[must_use]
    pub fn with_clock(mut self, clock: fn() -> NaiveDate) -> Self {
        self.clock = clock;
        self
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Arc<WorkflowSnapshot> {
        Arc::clone(&self.snapshot)
    }

    /// Applies an operator action.
    ///
    /// # Errors
    /// Returns `ActionRejected` when the action is not valid in the current
    /// state; the snapshot is left unchanged in that case.
    pub fn handle(&mut self, action: Action) -> Result<Vec<Effect>> {
        let mut next = (*self.snapshot).clone();
        let effects = self.apply(&mut next, action)?;
        self.snapshot = Arc::new(next);
        Ok(effects)
    }

    /// Applies the outcome of an effect; stale outcomes are dropped.
    pub fn complete(&mut self, completion: Completion) -> Vec<Effect> {
        let mut next = (*self.snapshot).clone();
        match self.resolve(&mut next, completion) {
            Some(effects) => {
                self.snapshot = Arc::new(next);
                effects
            }
            None => Vec::new(),
        }
    }

    fn apply(&mut self, next: &mut WorkflowSnapshot, action: Action) -> Result<Vec<Effect>> {
        debug!(?action, "handling action");

        match action {
            Action::SetDirection(direction) => Ok(set_direction(next, direction)),
            Action::EditConnection(edit) => {
                edit_connection(next, edit);
                Ok(Vec::new())
            }
            Action::TestConnection => test_connection(next),
            Action::SelectDatabase(database) => Ok(select_database(next, database)),
            Action::SelectTable(table) => select_table(next, table),
            Action::ToggleColumn(column) => {
                let schema = export_schema(next)?;
                next.mapping.toggle_column(&column, &schema)?;
                Ok(Vec::new())
            }
            Action::ToggleAllColumns => {
                let schema = export_schema(next)?;
                next.mapping.toggle_all(&schema);
                Ok(Vec::new())
            }
            Action::SetExportFormat(format) => {
                next.export.format = format;
                Ok(Vec::new())
            }
            Action::SetExportFilename(filename) => {
                next.export.filename = filename;
                Ok(Vec::new())
            }
            Action::SetIncludeHeaders(include) => {
                next.export.include_headers = include;
                Ok(Vec::new())
            }
            Action::LoadFile(payload) => self.load_file(next, payload),
            Action::SetDelimiter(delimiter) => {
                if next.import.delimiter == delimiter {
                    return Ok(Vec::new());
                }
                next.import.delimiter = delimiter;
                if next.direction != TransferDirection::FileToDatabase {
                    return Ok(Vec::new());
                }
                Ok(describe_file(next))
            }
            Action::SetTargetTable(table) => {
                next.import.target_table = table;
                Ok(Vec::new())
            }
            Action::SetCreateTable(create) => {
                next.import.create_table = create;
                Ok(Vec::new())
            }
            Action::SetMappingTarget { source, target } => {
                if next.direction != TransferDirection::FileToDatabase || next.schema().is_none() {
                    return Err(ChBridgeError::rejected("no file schema loaded"));
                }
                next.mapping.set_target(&source, target)?;
                Ok(Vec::new())
            }
            Action::Execute => self.execute(next),
            Action::Dismiss(concern) => {
                if next.status.get(concern).phase.is_busy() {
                    return Err(ChBridgeError::rejected(
                        "cannot dismiss a status that is still in progress",
                    ));
                }
                next.status.set(concern, StatusRecord::idle());
                Ok(Vec::new())
            }
        }
    }

    fn load_file(&mut self, next: &mut WorkflowSnapshot, payload: FilePayload) -> Result<Vec<Effect>> {
        if next.direction != TransferDirection::FileToDatabase {
            return Err(ChBridgeError::rejected(
                "files can only be loaded for an import",
            ));
        }

        let id = FileId(self.next_file_id);
        self.next_file_id = self.next_file_id.wrapping_add(1);

        info!(file = %payload.name, bytes = payload.len(), "File loaded");
        next.import.file = Some(FileHandle { id, payload });
        Ok(describe_file(next))
    }

    fn execute(&mut self, next: &mut WorkflowSnapshot) -> Result<Vec<Effect>> {
        let blockers = next.blockers();
        if !blockers.is_empty() {
            return Err(ChBridgeError::rejected(format!(
                "cannot execute: {}",
                blockers.join(", ")
            )));
        }

        let execution = self.next_execution;
        let effect = match next.direction {
            TransferDirection::DatabaseToFile => {
                let request = build_export_request(next, (self.clock)())?;
                next.status
                    .set(Concern::Transfer, StatusRecord::running(EXPORTING_MESSAGE));
                Effect::Export { execution, request }
            }
            TransferDirection::FileToDatabase => {
                let request = build_import_request(next)?;
                next.status
                    .set(Concern::Transfer, StatusRecord::running(IMPORTING_MESSAGE));
                Effect::Import { execution, request }
            }
        };

        self.next_execution = self.next_execution.wrapping_add(1);
        self.pending_execution = Some(execution);
        Ok(vec![effect])
    }

    /// Applies a completion to `next`; `None` means it was stale.
    fn resolve(&mut self, next: &mut WorkflowSnapshot, completion: Completion) -> Option<Vec<Effect>> {
        match completion {
            Completion::ConnectionVerified { revision, result } => {
                if revision != next.connection_revision
                    || next.status.connection.phase != StatusPhase::Testing
                {
                    return stale("connection test", revision);
                }

                match result {
                    Ok(()) => {
                        info!(server = %next.connection, "Connection verified");
                        next.connection_verified = true;
                        next.status
                            .set(Concern::Connection, StatusRecord::success(CONNECTED_MESSAGE));
                        Some(discover(next))
                    }
                    Err(error) => {
                        warn!(server = %next.connection, "Connection test failed: {error}");
                        next.connection_verified = false;
                        next.status.set(
                            Concern::Connection,
                            StatusRecord::error(
                                Operation::VerifyConnection.failure_kind(),
                                failure_message(Operation::VerifyConnection, &error),
                            ),
                        );
                        Some(Vec::new())
                    }
                }
            }

            Completion::DatabasesListed { revision, result } => {
                if revision != next.connection_revision {
                    return stale("database list", revision);
                }
                let result = result.map_err(|e| {
                    warn!("Database listing failed: {e}");
                    failure_message(Operation::ListDatabases, &e)
                });
                next.cache
                    .resolve_databases(revision, result)
                    .then(Vec::new)
                    .or_else(|| stale("database list", revision))
            }

            Completion::TablesListed { key, result } => {
                if next.tables_key().as_ref() != Some(&key) {
                    return stale("table list", &key);
                }
                let result = result.map_err(|e| {
                    warn!(database = %key.database, "Table listing failed: {e}");
                    failure_message(Operation::ListTables, &e)
                });
                next.cache
                    .resolve_tables(&key, result)
                    .then(Vec::new)
                    .or_else(|| stale("table list", &key))
            }

            Completion::TableDescribed { key, result } => {
                let source = SchemaSource::Table(key);
                resolve_schema(next, source, Operation::DescribeTable, result)
            }

            Completion::FileDescribed { key, result } => {
                let source = SchemaSource::File(key);
                resolve_schema(next, source, Operation::DescribeFile, result)
            }

            Completion::Exported { execution, result } => {
                if self.pending_execution != Some(execution) {
                    return stale("export", execution);
                }
                self.pending_execution = None;
                let record = match result {
                    Ok(outcome) => StatusRecord::success(export_success_message(&outcome)),
                    Err(error) => {
                        warn!("Export failed: {error}");
                        StatusRecord::error(
                            Operation::Export.failure_kind(),
                            failure_message(Operation::Export, &error),
                        )
                    }
                };
                next.status.set(Concern::Transfer, record);
                Some(Vec::new())
            }

            Completion::Imported { execution, result } => {
                if self.pending_execution != Some(execution) {
                    return stale("import", execution);
                }
                self.pending_execution = None;
                let record = match result {
                    Ok(response) => StatusRecord::success(import_success_message(&response)),
                    Err(error) => {
                        warn!("Import failed: {error}");
                        StatusRecord::error(
                            Operation::Import.failure_kind(),
                            failure_message(Operation::Import, &error),
                        )
                    }
                };
                next.status.set(Concern::Transfer, record);
                Some(Vec::new())
            }
        }
    }
}

fn stale<K: std::fmt::Debug>(what: &str, key: K) -> Option<Vec<Effect>> {
    debug!(?key, "Dropping stale {what} response");
    None
}

fn set_direction(next: &mut WorkflowSnapshot, direction: TransferDirection) -> Vec<Effect> {
    if next.direction == direction {
        return Vec::new();
    }

    info!(%direction, "Transfer direction changed");
    next.direction = direction;
    next.cache.clear();
    next.selected_table = None;
    next.import.file = None;
    next.mapping.clear();
    discover(next)
}

fn edit_connection(next: &mut WorkflowSnapshot, edit: ConnectionEdit) {
    edit.apply(&mut next.connection);
    next.connection_revision = next.connection_revision.wrapping_add(1);
    next.connection_verified = false;
    next.status.set(Concern::Connection, StatusRecord::idle());

    match next.direction {
        TransferDirection::DatabaseToFile => {
            next.cache.clear();
            next.selected_table = None;
            next.mapping.clear();
        }
        TransferDirection::FileToDatabase => next.cache.clear_listings(),
    }
}

fn test_connection(next: &mut WorkflowSnapshot) -> Result<Vec<Effect>> {
    if next.status.connection.phase == StatusPhase::Testing {
        return Err(ChBridgeError::rejected(
            "a connection test is already in progress",
        ));
    }

    next.connection_verified = false;

    if let Err(error) = next.connection.validate() {
        next.status.set(
            Concern::Connection,
            StatusRecord::error(
                Operation::VerifyConnection.failure_kind(),
                failure_message(Operation::VerifyConnection, &error),
            ),
        );
        return Ok(Vec::new());
    }

    info!(server = %next.connection, "Testing connection");
    next.status
        .set(Concern::Connection, StatusRecord::testing(TESTING_MESSAGE));
    Ok(vec![Effect::VerifyConnection {
        revision: next.connection_revision,
        connection: next.connection.clone(),
    }])
}

fn select_database(next: &mut WorkflowSnapshot, database: Option<String>) -> Vec<Effect> {
    let database = normalize_database(database);
    if next.connection.database == database {
        return Vec::new();
    }

    next.connection.database = database;

    if next.direction == TransferDirection::DatabaseToFile {
        next.cache.clear_tables();
        next.selected_table = None;
        next.mapping.clear();
        return ensure_tables(next);
    }

    Vec::new()
}

fn select_table(next: &mut WorkflowSnapshot, table: Option<String>) -> Result<Vec<Effect>> {
    if next.direction != TransferDirection::DatabaseToFile {
        return Err(ChBridgeError::rejected(
            "a source table can only be selected for an export",
        ));
    }

    let table = table.filter(|t| !t.trim().is_empty());
    if next.selected_table == table {
        return Ok(Vec::new());
    }

    if let Some(name) = &table
        && !next.tables().is_some_and(|tables| tables.contains(name))
    {
        return Err(ChBridgeError::rejected(format!(
            "table '{name}' is not in the current table list"
        )));
    }

    next.selected_table = table;
    next.cache.clear_schema();
    next.mapping.clear();

    let Some(key) = next.table_key() else {
        return Ok(Vec::new());
    };
    next.cache.request_schema(SchemaSource::Table(key.clone()));
    Ok(vec![Effect::DescribeTable {
        key,
        connection: next.connection.clone(),
    }])
}

/// Clears the file schema and mapping and describes the loaded file.
///
/// Without a loaded file nothing is cleared.
fn describe_file(next: &mut WorkflowSnapshot) -> Vec<Effect> {
    let (Some(key), Some(file)) = (next.file_key(), next.import.file.as_ref()) else {
        return Vec::new();
    };
    let file = file.payload.clone();
    next.cache.clear_schema();
    next.mapping.clear();
    next.cache.request_schema(SchemaSource::File(key));
    vec![Effect::DescribeFile { key, file }]
}

/// Database list, plus the table list for an export with a database chosen.
fn discover(next: &mut WorkflowSnapshot) -> Vec<Effect> {
    if !next.connection_verified {
        return Vec::new();
    }

    let revision = next.connection_revision;
    next.cache.request_databases(revision);
    let mut effects = vec![Effect::ListDatabases {
        revision,
        connection: next.connection.clone(),
    }];
    effects.extend(ensure_tables(next));
    effects
}

/// Requests the table list unless it is already loaded or loading for the
/// current key.
fn ensure_tables(next: &mut WorkflowSnapshot) -> Vec<Effect> {
    if next.direction != TransferDirection::DatabaseToFile || !next.connection_verified {
        return Vec::new();
    }
    let Some(key) = next.tables_key() else {
        return Vec::new();
    };

    let current = next.cache.tables_key() == Some(&key)
        && matches!(next.cache.tables(), Fetch::Ready(_) | Fetch::Loading);
    if current {
        return Vec::new();
    }

    next.cache.request_tables(key.clone());
    next.selected_table = None;
    next.mapping.clear();
    vec![Effect::ListTables {
        key,
        connection: next.connection.clone(),
    }]
}

fn export_schema(next: &WorkflowSnapshot) -> Result<Arc<SchemaDescription>> {
    if next.direction != TransferDirection::DatabaseToFile {
        return Err(ChBridgeError::rejected(
            "column selection only applies to an export",
        ));
    }
    next.schema()
        .cloned()
        .ok_or_else(|| ChBridgeError::rejected("no table schema loaded"))
}

fn resolve_schema(
    next: &mut WorkflowSnapshot,
    source: SchemaSource,
    operation: Operation,
    result: Result<SchemaDescription>,
) -> Option<Vec<Effect>> {
    if next.schema_source().as_ref() != Some(&source) {
        return stale("schema", &source);
    }

    let result = result.map(Arc::new).map_err(|e| {
        warn!(?source, "{operation} failed: {e}");
        failure_message(operation, &e)
    });
    let schema = result.as_ref().ok().cloned();

    if !next.cache.resolve_schema(&source, result) {
        return stale("schema", &source);
    }

    if let Some(schema) = schema {
        debug!(columns = schema.column_count(), "Schema ready");
        next.mapping = MappingBuilder::derive(next.direction, &schema);
    }
    Some(Vec::new())
}
