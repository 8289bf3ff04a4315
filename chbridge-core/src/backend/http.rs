//! REST client for the transfer service.
//!
//! Discovery and export calls send the connection as a JSON body; table
//! description, file analysis and import use multipart forms. Failures are
//! answered with `{"detail": ...}`, which becomes the operator-facing detail.

use super::{
    BackendConfig, ExportRequest, ExportResponse, ImportRequest, ImportResponse, Operation,
    TransferBackend,
};
use crate::Result;
use crate::connection::ConnectionDescriptor;
use crate::error::ChBridgeError;
use crate::mapping::ColumnMapping;
use crate::models::{Delimiter, FilePayload, SchemaDescription};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, instrument};

/// Connection as the service expects it.
#[derive(Serialize)]
struct ConnectionWire<'a> {
    host: &'a str,
    port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    database: Option<&'a str>,
    user: &'a str,
    jwt_token: &'a str,
    secure: bool,
}

impl<'a> From<&'a ConnectionDescriptor> for ConnectionWire<'a> {
    fn from(connection: &'a ConnectionDescriptor) -> Self {
        Self {
            host: connection.normalized_host(),
            port: connection.port,
            database: connection.database.as_deref(),
            user: connection.user.as_str(),
            jwt_token: connection.credential.expose(),
            secure: connection.secure,
        }
    }
}

impl std::fmt::Debug for ConnectionWire<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionWire")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("secure", &self.secure)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct ExportBody<'a> {
    connection: ConnectionWire<'a>,
    query: String,
    table_name: &'a str,
    format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    filename: Option<&'a str>,
    include_headers: bool,
    selected_columns: &'a [String],
}

#[derive(Deserialize)]
struct DatabasesWire {
    databases: Vec<String>,
}

#[derive(Deserialize)]
struct TablesWire {
    tables: Vec<String>,
}

#[derive(Deserialize)]
struct SchemaWire {
    columns: Vec<String>,
    #[serde(default)]
    sample_data: Vec<Vec<serde_json::Value>>,
    #[serde(default)]
    inferred_types: HashMap<String, String>,
}

#[derive(Deserialize)]
struct ExportWire {
    filename: String,
    #[serde(default)]
    rows_exported: u64,
    content: String,
    content_type: String,
}

#[derive(Deserialize)]
struct ImportWire {
    message: String,
    #[serde(default)]
    rows_imported: Option<u64>,
}

/// Pulls the operator-facing detail out of a failure body.
///
/// String details are used as-is; structured details (validation errors)
/// are rendered as compact JSON. Bodies without a detail yield `None`.
pub(crate) fn extract_detail(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    match value.get("detail")? {
        serde_json::Value::Null => None,
        serde_json::Value::String(detail) => Some(detail.clone()),
        other => Some(other.to_string()),
    }
}

/// Quotes an identifier for a ClickHouse query.
fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('\\', "\\\\").replace('`', "\\`"))
}

/// `SELECT` statement for an export, restricted to the selected columns.
pub(crate) fn export_query(request: &ExportRequest) -> String {
    let columns = if request.columns.is_empty() {
        "*".to_string()
    } else {
        request
            .columns
            .columns()
            .iter()
            .map(|c| quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let source = match &request.connection.database {
        Some(database) => format!(
            "{}.{}",
            quote_identifier(database),
            quote_identifier(&request.table)
        ),
        None => quote_identifier(&request.table),
    };

    format!("SELECT {columns} FROM {source}")
}

/// File column to target column object; unmapped entries are left out.
pub(crate) fn mapping_json(mapping: &ColumnMapping) -> serde_json::Value {
    let object: serde_json::Map<String, serde_json::Value> = mapping
        .mapped()
        .map(|entry| {
            (
                entry.source.clone(),
                serde_json::Value::String(entry.target.trim().to_string()),
            )
        })
        .collect();
    serde_json::Value::Object(object)
}

fn connection_json(operation: Operation, connection: &ConnectionDescriptor) -> Result<String> {
    serde_json::to_string(&ConnectionWire::from(connection)).map_err(|e| {
        ChBridgeError::Serialization {
            context: format!("{operation} connection parameters"),
            source: e,
        }
    })
}

fn file_part(file: &FilePayload) -> Part {
    Part::bytes(file.bytes.to_vec()).file_name(file.name.clone())
}

/// [`TransferBackend`] speaking the transfer service's REST API.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    config: BackendConfig,
}

impl HttpBackend {
    /// Builds a client for the configured service.
    ///
    /// # Errors
    /// Returns a configuration error if the config is invalid or the HTTP
    /// client cannot be constructed.
    pub fn new(config: BackendConfig) -> Result<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .user_agent(concat!("chbridge/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ChBridgeError::configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    /// Configuration this backend was built with
    pub const fn config(&self) -> &BackendConfig {
        &self.config
    }

    fn post(&self, path: &str) -> Result<reqwest::RequestBuilder> {
        Ok(self.client.post(self.config.endpoint(path)?))
    }

    /// Sends a request and decodes a successful JSON body into `T`.
    async fn call<T: DeserializeOwned>(
        &self,
        operation: Operation,
        request: reqwest::RequestBuilder,
    ) -> Result<T> {
        let response = request
            .send()
            .await
            .map_err(|e| ChBridgeError::transport(operation, e))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| ChBridgeError::transport(operation, e))?;

        if !status.is_success() {
            debug!(%operation, status = status.as_u16(), "transfer service rejected request");
            return Err(ChBridgeError::service(
                operation,
                Some(status.as_u16()),
                extract_detail(&body),
            ));
        }

        serde_json::from_slice(&body)
            .map_err(|e| ChBridgeError::invalid_response(operation, e.to_string()))
    }

    fn schema(operation: Operation, wire: SchemaWire) -> Result<SchemaDescription> {
        SchemaDescription::new(wire.columns, wire.sample_data, wire.inferred_types)
            .map_err(|e| ChBridgeError::invalid_response(operation, e.operator_detail()))
    }
}

#[async_trait]
impl TransferBackend for HttpBackend {
    #[instrument(skip_all, fields(server = %connection))]
    async fn verify_connection(&self, connection: &ConnectionDescriptor) -> Result<()> {
        let request = self
            .post("test-connection")?
            .json(&ConnectionWire::from(connection));
        let _: serde_json::Value = self.call(Operation::VerifyConnection, request).await?;
        Ok(())
    }

    #[instrument(skip_all, fields(server = %connection))]
    async fn list_databases(&self, connection: &ConnectionDescriptor) -> Result<Vec<String>> {
        let request = self
            .post("clickhouse/databases")?
            .json(&ConnectionWire::from(connection));
        let wire: DatabasesWire = self.call(Operation::ListDatabases, request).await?;
        Ok(wire.databases)
    }

    #[instrument(skip_all, fields(server = %connection))]
    async fn list_tables(&self, connection: &ConnectionDescriptor) -> Result<Vec<String>> {
        let request = self
            .post("clickhouse/tables")?
            .json(&ConnectionWire::from(connection));
        let wire: TablesWire = self.call(Operation::ListTables, request).await?;
        Ok(wire.tables)
    }

    #[instrument(skip_all, fields(server = %connection, table = %table))]
    async fn describe_table(
        &self,
        connection: &ConnectionDescriptor,
        table: &str,
    ) -> Result<SchemaDescription> {
        let operation = Operation::DescribeTable;
        let form = Form::new()
            .text("connection", connection_json(operation, connection)?)
            .text("table_name", table.to_string());
        let request = self.post("clickhouse/table-schema")?.multipart(form);

        let wire: SchemaWire = self.call(operation, request).await?;
        // Table descriptions carry no inferred types
        Self::schema(
            operation,
            SchemaWire {
                inferred_types: HashMap::new(),
                ..wire
            },
        )
    }

    #[instrument(skip_all, fields(file = %file.name, bytes = file.len()))]
    async fn describe_file(
        &self,
        file: &FilePayload,
        delimiter: Delimiter,
    ) -> Result<SchemaDescription> {
        let form = Form::new()
            .part("file", file_part(file))
            .text("delimiter", delimiter.as_str());
        let request = self.post("file/schema")?.multipart(form);

        let wire: SchemaWire = self.call(Operation::DescribeFile, request).await?;
        Self::schema(Operation::DescribeFile, wire)
    }

    #[instrument(skip_all, fields(table = %request.qualified_table(), format = %request.format))]
    async fn export(&self, request: &ExportRequest) -> Result<ExportResponse> {
        let body = ExportBody {
            connection: ConnectionWire::from(&request.connection),
            query: export_query(request),
            table_name: &request.table,
            format: request.format.extension(),
            filename: request.filename.as_deref(),
            include_headers: request.include_headers,
            selected_columns: request.columns.columns(),
        };
        let http = self.post("export/clickhouse-to-file")?.json(&body);

        let wire: ExportWire = self.call(Operation::Export, http).await?;
        Ok(ExportResponse {
            content: wire.content.into_bytes(),
            content_type: wire.content_type,
            filename: wire.filename,
            rows_exported: wire.rows_exported,
        })
    }

    #[instrument(skip_all, fields(table = %request.table, file = %request.file.name))]
    async fn import(&self, request: &ImportRequest) -> Result<ImportResponse> {
        let operation = Operation::Import;
        let mapping =
            serde_json::to_string(&mapping_json(&request.mapping)).map_err(|e| {
                ChBridgeError::Serialization {
                    context: "column mapping".to_string(),
                    source: e,
                }
            })?;

        let form = Form::new()
            .part("file", file_part(&request.file))
            .text("delimiter", request.delimiter.as_str())
            .text(
                "connection_data",
                connection_json(operation, &request.connection)?,
            )
            .text("table_name", request.table.clone())
            .text("create_table", request.create_table.to_string())
            .text("column_mapping", mapping);
        let http = self.post("import/file-to-clickhouse")?.multipart(form);

        let wire: ImportWire = self.call(operation, http).await?;
        Ok(ImportResponse {
            message: wire.message,
            rows_imported: wire.rows_imported,
        })
    }
}
