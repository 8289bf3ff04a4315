//! Core data model for the transfer workflow.
//!
//! Schema descriptions are immutable once constructed: a re-fetch replaces
//! the whole value and nothing patches individual fields.

use crate::error::ChBridgeError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Type tag shown for a file column the service did not infer a type for.
pub const DEFAULT_INFERRED_TYPE: &str = "String";

/// Which side of the transfer is the source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferDirection {
    /// Export a ClickHouse table into a flat file
    #[default]
    DatabaseToFile,
    /// Import a flat file into a ClickHouse table
    FileToDatabase,
}

impl std::fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DatabaseToFile => write!(f, "ClickHouse → Flat File"),
            Self::FileToDatabase => write!(f, "Flat File → ClickHouse"),
        }
    }
}

/// Serialization format for exports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Comma separated values
    #[default]
    Csv,
    /// JSON array of rows
    Json,
    /// Tab separated values
    Tsv,
}

impl ExportFormat {
    /// File extension without the dot
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Tsv => "tsv",
        }
    }

    /// MIME type the service labels this format with
    pub const fn content_type(self) -> &'static str {
        match self {
            Self::Csv => "text/csv",
            Self::Json => "application/json",
            Self::Tsv => "text/tab-separated-values",
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = ChBridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "tsv" => Ok(Self::Tsv),
            other => Err(ChBridgeError::configuration(format!(
                "Unsupported format: {other}"
            ))),
        }
    }
}

/// Field delimiter used to parse an uploaded file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Delimiter {
    /// `,`
    #[default]
    Comma,
    /// `\t`
    Tab,
    /// `;`
    Semicolon,
    /// `|`
    Pipe,
}

impl Delimiter {
    /// Every supported delimiter, in the order the options are offered.
    pub const ALL: [Self; 4] = [Self::Comma, Self::Tab, Self::Semicolon, Self::Pipe];

    /// The literal separator sent to the file parser
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Comma => ",",
            Self::Tab => "\t",
            Self::Semicolon => ";",
            Self::Pipe => "|",
        }
    }

    /// Operator-facing label
    pub const fn label(self) -> &'static str {
        match self {
            Self::Comma => "Comma (,)",
            Self::Tab => "Tab (\\t)",
            Self::Semicolon => "Semicolon (;)",
            Self::Pipe => "Pipe (|)",
        }
    }
}

impl std::str::FromStr for Delimiter {
    type Err = ChBridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "," | "comma" => Ok(Self::Comma),
            "\t" | "\\t" | "tab" => Ok(Self::Tab),
            ";" | "semicolon" => Ok(Self::Semicolon),
            "|" | "pipe" => Ok(Self::Pipe),
            other => Err(ChBridgeError::configuration(format!(
                "Unsupported delimiter: {other:?}"
            ))),
        }
    }
}

/// Columns, sample rows, and (file side only) inferred types of a source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaDescription {
    columns: Vec<String>,
    sample_rows: Vec<Vec<serde_json::Value>>,
    inferred_types: HashMap<String, String>,
}

impl SchemaDescription {
    /// Builds a description, enforcing its structural invariants.
    ///
    /// # Errors
    /// Returns an invalid-schema error when column names repeat, a sample
    /// row has the wrong number of cells, or an inferred type names an
    /// unknown column.
    pub fn new(
        columns: Vec<String>,
        sample_rows: Vec<Vec<serde_json::Value>>,
        inferred_types: HashMap<String, String>,
    ) -> crate::Result<Self> {
        let mut seen = HashSet::with_capacity(columns.len());
        for column in &columns {
            if !seen.insert(column.as_str()) {
                return Err(ChBridgeError::invalid_schema(format!(
                    "duplicate column '{column}'"
                )));
            }
        }

        if let Some((index, row)) = sample_rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != columns.len())
        {
            return Err(ChBridgeError::invalid_schema(format!(
                "sample row {index} has {} cells, expected {}",
                row.len(),
                columns.len()
            )));
        }

        if let Some(unknown) = inferred_types.keys().find(|name| !seen.contains(name.as_str())) {
            return Err(ChBridgeError::invalid_schema(format!(
                "inferred type for unknown column '{unknown}'"
            )));
        }

        Ok(Self {
            columns,
            sample_rows,
            inferred_types,
        })
    }

    /// Column names in source order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Preview rows, each with one cell per column
    pub fn sample_rows(&self) -> &[Vec<serde_json::Value>] {
        &self.sample_rows
    }

    /// Type tags inferred by the file parser
    pub const fn inferred_types(&self) -> &HashMap<String, String> {
        &self.inferred_types
    }

    /// Type tag for one column, defaulting to `String`
    pub fn inferred_type(&self, column: &str) -> &str {
        self.inferred_types
            .get(column)
            .map_or(DEFAULT_INFERRED_TYPE, String::as_str)
    }

    /// Whether `column` belongs to this description
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Number of columns
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }
}

/// Identity assigned to every file load.
///
/// Loading the same file twice yields two identities, so a response for the
/// earlier load can never be mistaken for the later one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub u64);

/// Raw content of a file chosen for import.
#[derive(Clone, PartialEq, Eq)]
pub struct FilePayload {
    /// File name as uploaded
    pub name: String,
    /// File bytes, shared between the workflow and in-flight requests
    pub bytes: Arc<[u8]>,
}

impl FilePayload {
    /// Wraps file content
    pub fn new(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Size in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True for an empty file
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl std::fmt::Debug for FilePayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilePayload")
            .field("name", &self.name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// A loaded file together with its load identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandle {
    /// Load identity
    pub id: FileId,
    /// File content
    pub payload: FilePayload,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_schema_description_accepts_consistent_input() {
        let schema = SchemaDescription::new(
            columns(&["id", "name"]),
            vec![vec![json!(1), json!("a")], vec![json!(2), json!("b")]],
            HashMap::from([("id".to_string(), "Int64".to_string())]),
        )
        .unwrap();

        assert_eq!(schema.column_count(), 2);
        assert_eq!(schema.sample_rows().len(), 2);
        assert_eq!(schema.inferred_type("id"), "Int64");
        assert_eq!(schema.inferred_type("name"), DEFAULT_INFERRED_TYPE);
        assert!(schema.has_column("name"));
        assert!(!schema.has_column("email"));
    }

    #[test]
    fn test_schema_description_rejects_duplicate_columns() {
        let result = SchemaDescription::new(columns(&["id", "id"]), vec![], HashMap::new());
        assert!(matches!(result, Err(ChBridgeError::InvalidSchema { .. })));
    }

    #[test]
    fn test_schema_description_rejects_ragged_rows() {
        let result = SchemaDescription::new(
            columns(&["id", "name"]),
            vec![vec![json!(1)]],
            HashMap::new(),
        );
        let error = result.unwrap_err();
        assert!(error.to_string().contains("sample row 0 has 1 cells"));
    }

    #[test]
    fn test_schema_description_rejects_unknown_inferred_type() {
        let result = SchemaDescription::new(
            columns(&["id"]),
            vec![],
            HashMap::from([("ghost".to_string(), "String".to_string())]),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_export_format_metadata() {
        assert_eq!(ExportFormat::Csv.extension(), "csv");
        assert_eq!(ExportFormat::Json.content_type(), "application/json");
        assert_eq!(
            ExportFormat::Tsv.content_type(),
            "text/tab-separated-values"
        );
        assert_eq!("JSON".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert!("xml".parse::<ExportFormat>().is_err());
        assert_eq!(
            serde_json::to_string(&ExportFormat::Tsv).unwrap(),
            "\"tsv\""
        );
    }

    #[test]
    fn test_delimiter_parsing() {
        assert_eq!(",".parse::<Delimiter>().unwrap(), Delimiter::Comma);
        assert_eq!("\\t".parse::<Delimiter>().unwrap(), Delimiter::Tab);
        assert_eq!("tab".parse::<Delimiter>().unwrap(), Delimiter::Tab);
        assert_eq!("|".parse::<Delimiter>().unwrap(), Delimiter::Pipe);
        assert!(":".parse::<Delimiter>().is_err());
        assert_eq!(Delimiter::Tab.as_str(), "\t");
    }

    #[test]
    fn test_file_payload_debug_omits_content() {
        let payload = FilePayload::new("events.csv", b"id,name\n1,secret".to_vec());
        let debug = format!("{payload:?}");
        assert!(debug.contains("events.csv"));
        assert!(!debug.contains("secret"));
        assert_eq!(payload.len(), 16);
    }
}
