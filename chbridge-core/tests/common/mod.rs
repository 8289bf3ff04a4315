//! Shared fixtures for integration tests.

#![allow(dead_code)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use async_trait::async_trait;
use chbridge_core::backend::{
    ExportRequest, ExportResponse, ImportRequest, ImportResponse, Operation, TransferBackend,
};
use chbridge_core::connection::ConnectionDescriptor;
use chbridge_core::error::ChBridgeError;
use chbridge_core::Result;
use chbridge_core::models::{Delimiter, FilePayload, SchemaDescription};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Builds a schema with the given columns and no sample rows.
pub fn schema(columns: &[&str]) -> SchemaDescription {
    SchemaDescription::new(
        columns.iter().map(ToString::to_string).collect(),
        vec![],
        HashMap::new(),
    )
    .unwrap()
}

/// Owned column names.
pub fn names(columns: &[&str]) -> Vec<String> {
    columns.iter().map(ToString::to_string).collect()
}

/// In-memory transfer service with scripted answers.
///
/// Databases map to tables, tables map to schemas. Files are "parsed" by
/// splitting the first line on the delimiter. Delays are virtual when the
/// test runs with a paused clock.
#[derive(Default)]
pub struct ScriptedBackend {
    pub reject_connection: Option<String>,
    pub databases: Vec<String>,
    pub tables: HashMap<String, Vec<String>>,
    pub schemas: HashMap<String, SchemaDescription>,
    pub table_delays: HashMap<String, Duration>,
    pub fail_export: Option<String>,
    pub calls: Mutex<Vec<String>>,
    pub exports: Mutex<Vec<ExportRequest>>,
    pub imports: Mutex<Vec<ImportRequest>>,
}

impl ScriptedBackend {
    /// A service with `analytics.events(id, name, ts)` and `billing.invoices(id, total)`.
    pub fn sample() -> Self {
        Self {
            databases: names(&["analytics", "billing"]),
            tables: HashMap::from([
                ("analytics".to_string(), names(&["events", "sessions"])),
                ("billing".to_string(), names(&["invoices"])),
            ]),
            schemas: HashMap::from([
                ("events".to_string(), schema(&["id", "name", "ts"])),
                ("sessions".to_string(), schema(&["id", "user_id"])),
                ("invoices".to_string(), schema(&["id", "total"])),
            ]),
            ..Self::default()
        }
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Export requests received.
    pub fn exports(&self) -> Vec<ExportRequest> {
        self.exports.lock().unwrap().clone()
    }

    /// Import requests received.
    pub fn imports(&self) -> Vec<ImportRequest> {
        self.imports.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

fn database_of(connection: &ConnectionDescriptor) -> String {
    connection
        .database
        .clone()
        .unwrap_or_else(|| "default".to_string())
}

#[async_trait]
impl TransferBackend for ScriptedBackend {
    async fn verify_connection(&self, connection: &ConnectionDescriptor) -> Result<()> {
        self.record(format!("verify {}", connection.normalized_host()));
        match &self.reject_connection {
            Some(detail) => Err(ChBridgeError::service(
                Operation::VerifyConnection,
                Some(500),
                Some(detail.clone()),
            )),
            None => Ok(()),
        }
    }

    async fn list_databases(&self, _connection: &ConnectionDescriptor) -> Result<Vec<String>> {
        self.record("databases".to_string());
        Ok(self.databases.clone())
    }

    async fn list_tables(&self, connection: &ConnectionDescriptor) -> Result<Vec<String>> {
        let database = database_of(connection);
        self.record(format!("tables {database}"));

        if let Some(delay) = self.table_delays.get(&database) {
            tokio::time::sleep(*delay).await;
        }

        self.tables.get(&database).cloned().ok_or_else(|| {
            ChBridgeError::service(
                Operation::ListTables,
                Some(500),
                Some(format!("Database error: Database {database} doesn't exist")),
            )
        })
    }

    async fn describe_table(
        &self,
        connection: &ConnectionDescriptor,
        table: &str,
    ) -> Result<SchemaDescription> {
        self.record(format!("describe {}.{table}", database_of(connection)));
        self.schemas.get(table).cloned().ok_or_else(|| {
            ChBridgeError::service(Operation::DescribeTable, Some(500), None)
        })
    }

    async fn describe_file(
        &self,
        file: &FilePayload,
        delimiter: Delimiter,
    ) -> Result<SchemaDescription> {
        self.record(format!("analyze {} {:?}", file.name, delimiter));
        let text = String::from_utf8_lossy(&file.bytes);
        let header = text.lines().next().unwrap_or_default();
        if header.is_empty() {
            return Err(ChBridgeError::service(
                Operation::DescribeFile,
                Some(500),
                Some("File schema error: No columns to parse from file".to_string()),
            ));
        }

        let columns: Vec<String> = header
            .split(delimiter.as_str())
            .map(|c| c.trim().to_string())
            .collect();
        let inferred = columns
            .iter()
            .filter(|c| c.as_str() == "id")
            .map(|c| (c.clone(), "Int64".to_string()))
            .collect();
        SchemaDescription::new(columns, vec![], inferred)
    }

    async fn export(&self, request: &ExportRequest) -> Result<ExportResponse> {
        self.record(format!("export {}", request.qualified_table()));
        self.exports.lock().unwrap().push(request.clone());

        if let Some(detail) = &self.fail_export {
            return Err(ChBridgeError::service(
                Operation::Export,
                Some(500),
                Some(detail.clone()),
            ));
        }

        let mut content = String::new();
        if request.include_headers {
            content.push_str(&request.columns.columns().join(","));
            content.push_str("\r\n");
        }
        content.push_str("1,a\r\n2,b\r\n");

        Ok(ExportResponse {
            content: content.into_bytes(),
            content_type: request.format.content_type().to_string(),
            filename: request.filename.clone().unwrap_or_default(),
            rows_exported: 2,
        })
    }

    async fn import(&self, request: &ImportRequest) -> Result<ImportResponse> {
        self.record(format!("import {}", request.table));
        self.imports.lock().unwrap().push(request.clone());

        let rows = String::from_utf8_lossy(&request.file.bytes)
            .lines()
            .skip(1)
            .filter(|line| !line.trim().is_empty())
            .count();
        let rows = u64::try_from(rows).unwrap();
        Ok(ImportResponse {
            message: format!("Successfully imported {rows} rows into {}", request.table),
            rows_imported: Some(rows),
        })
    }
}
