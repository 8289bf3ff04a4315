//! Transfer execution: request assembly, the call itself, and export
//! artifact materialization.
//!
//! Requests are assembled from a snapshot immediately before execution and
//! never outlive the call. Export content is handed to an [`ArtifactSink`]
//! byte for byte.

use crate::Result;
use crate::backend::{ExportRequest, ImportRequest, ImportResponse, TransferBackend};
use crate::error::ChBridgeError;
use crate::models::{ExportFormat, TransferDirection};
use crate::workflow::WorkflowSnapshot;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File name used when a sanitized name comes out empty.
const FALLBACK_FILE_NAME: &str = "export";

/// `{table}_{YYYY-MM-DD}.{ext}`
///
/// # Example
/// ```rust
/// use chbridge_core::executor::default_export_filename;
/// use chbridge_core::models::ExportFormat;
/// use chrono::NaiveDate;
///
/// let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
/// assert_eq!(
///     default_export_filename("events", ExportFormat::Csv, date),
///     "events_2024-05-01.csv"
/// );
/// ```
pub fn default_export_filename(table: &str, format: ExportFormat, date: NaiveDate) -> String {
    format!(
        "{table}_{}.{}",
        date.format("%Y-%m-%d"),
        format.extension()
    )
}

/// The operator's filename, or the synthesized default when blank.
pub fn resolve_export_filename(
    explicit: &str,
    table: &str,
    format: ExportFormat,
    date: NaiveDate,
) -> String {
    let explicit = explicit.trim();
    if explicit.is_empty() {
        default_export_filename(table, format, date)
    } else {
        explicit.to_string()
    }
}

/// Assembles the export request from the current snapshot.
///
/// # Errors
/// Returns an action-rejected error when the snapshot is not an export with
/// a selected table and at least one selected column.
pub fn build_export_request(snapshot: &WorkflowSnapshot, today: NaiveDate) -> Result<ExportRequest> {
    if snapshot.direction != TransferDirection::DatabaseToFile {
        return Err(ChBridgeError::rejected("export is not the active direction"));
    }

    let table = snapshot
        .selected_table
        .clone()
        .ok_or_else(|| ChBridgeError::rejected("no table selected"))?;

    let columns = snapshot.mapping.selection().clone();
    if columns.is_empty() {
        return Err(ChBridgeError::rejected("no columns selected"));
    }

    let options = &snapshot.export;
    Ok(ExportRequest {
        connection: snapshot.connection.clone(),
        filename: Some(resolve_export_filename(
            &options.filename,
            &table,
            options.format,
            today,
        )),
        table,
        columns,
        format: options.format,
        include_headers: options.include_headers,
    })
}

/// Assembles the import request from the current snapshot.
///
/// # Errors
/// Returns an action-rejected error when no file is loaded, no target table
/// is named, or no column is mapped.
pub fn build_import_request(snapshot: &WorkflowSnapshot) -> Result<ImportRequest> {
    if snapshot.direction != TransferDirection::FileToDatabase {
        return Err(ChBridgeError::rejected("import is not the active direction"));
    }

    let options = &snapshot.import;
    let file = options
        .file
        .as_ref()
        .ok_or_else(|| ChBridgeError::rejected("no file loaded"))?;

    let table = options.target_table.trim();
    if table.is_empty() {
        return Err(ChBridgeError::rejected("no target table named"));
    }

    let mapping = snapshot.mapping.mapping().clone();
    if mapping.mapped_count() == 0 {
        return Err(ChBridgeError::rejected("column mapping is empty"));
    }

    Ok(ImportRequest {
        file: file.payload.clone(),
        delimiter: options.delimiter,
        connection: snapshot.connection.clone(),
        table: table.to_string(),
        create_table: options.create_table,
        mapping,
    })
}

/// Export content ready to be handed to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    /// File name resolved by the service
    pub filename: String,
    /// MIME type of `content`
    pub content_type: String,
    /// Serialized rows, untouched
    pub content: Vec<u8>,
}

/// Result of a successful export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOutcome {
    /// File name resolved by the service
    pub filename: String,
    /// Rows written
    pub rows_exported: u64,
    /// Where the artifact was materialized
    pub location: PathBuf,
}

/// Destination for export artifacts.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Stores the artifact and returns where it landed.
    async fn store(&self, artifact: &ExportArtifact) -> Result<PathBuf>;
}

/// Reduces an untrusted file name to one safe path component.
///
/// Directory parts are dropped, reserved and control characters become
/// `_`, and leading dots are stripped so the result is never hidden or a
/// parent reference.
pub fn safe_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.').trim_end_matches(['.', ' ']);

    if cleaned.is_empty() {
        FALLBACK_FILE_NAME.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Writes artifacts into a directory.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    /// Creates a sink writing into `dir`; the directory is created on first
    /// write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Target directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl ArtifactSink for DirectorySink {
    async fn store(&self, artifact: &ExportArtifact) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| ChBridgeError::Io {
                context: format!("Failed to create {}", self.dir.display()),
                source: e,
            })?;

        let path = self.dir.join(safe_file_name(&artifact.filename));
        tokio::fs::write(&path, &artifact.content)
            .await
            .map_err(|e| ChBridgeError::Io {
                context: format!("Failed to write {}", path.display()),
                source: e,
            })?;

        debug!(path = %path.display(), bytes = artifact.content.len(), "artifact written");
        Ok(path)
    }
}

/// Runs an export and materializes its content.
///
/// # Errors
/// Returns the service failure, or an I/O error from the sink.
pub async fn run_export(
    backend: &dyn TransferBackend,
    sink: &dyn ArtifactSink,
    request: &ExportRequest,
) -> Result<ExportOutcome> {
    info!(
        table = %request.qualified_table(),
        format = %request.format,
        columns = request.columns.len(),
        "Starting export"
    );

    let response = backend.export(request).await?;

    // The service normally echoes the requested name; keep ours if it does not.
    let filename = if response.filename.trim().is_empty() {
        request.filename.clone().unwrap_or_else(|| FALLBACK_FILE_NAME.to_string())
    } else {
        response.filename
    };

    let artifact = ExportArtifact {
        filename,
        content_type: response.content_type,
        content: response.content,
    };
    let location = sink.store(&artifact).await?;

    info!(
        rows = response.rows_exported,
        location = %location.display(),
        "Export completed"
    );

    Ok(ExportOutcome {
        filename: artifact.filename,
        rows_exported: response.rows_exported,
        location,
    })
}

/// Runs an import.
///
/// # Errors
/// Returns the service failure.
pub async fn run_import(
    backend: &dyn TransferBackend,
    request: &ImportRequest,
) -> Result<ImportResponse> {
    info!(
        table = %request.table,
        file = %request.file.name,
        mapped = request.mapping.mapped_count(),
        create_table = request.create_table,
        "Starting import"
    );

    let response = backend.import(request).await?;
    info!(rows = ?response.rows_imported, "Import completed");
    Ok(response)
}

/// `Successfully exported {rows} rows to {filename}`
pub fn export_success_message(outcome: &ExportOutcome) -> String {
    format!(
        "Successfully exported {} rows to {}",
        outcome.rows_exported, outcome.filename
    )
}

/// `Export failed: {detail}`
pub fn export_failure_message(error: &ChBridgeError) -> String {
    format!("Export failed: {}", error.operator_detail())
}

/// The service's own message, shown verbatim.
pub fn import_success_message(response: &ImportResponse) -> String {
    response.message.clone()
}

/// `Import failed: {detail}`
pub fn import_failure_message(error: &ChBridgeError) -> String {
    format!("Import failed: {}", error.operator_detail())
}
