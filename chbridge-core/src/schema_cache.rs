//! Last-fetched discovery results.
//!
//! Each slot remembers the key it was requested for. A response is only
//! applied to a slot whose key still matches; everything else is stale.

use crate::models::{Delimiter, FileId, SchemaDescription};
use std::sync::Arc;

/// Progress of one discovery fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetch<T> {
    /// Not requested
    Idle,
    /// Request in flight
    Loading,
    /// Result available
    Ready(T),
    /// Request failed with an operator-facing message
    Failed(String),
}

impl<T> Default for Fetch<T> {
    fn default() -> Self {
        Self::Idle
    }
}

impl<T> Fetch<T> {
    /// The fetched value, if any
    pub const fn ready(&self) -> Option<&T> {
        match self {
            Self::Ready(value) => Some(value),
            _ => None,
        }
    }

    /// Whether the fetch is in flight
    pub const fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    /// Failure message, if the fetch failed
    pub fn failure(&self) -> Option<&str> {
        match self {
            Self::Failed(message) => Some(message),
            _ => None,
        }
    }

    fn from_result(result: Result<T, String>) -> Self {
        match result {
            Ok(value) => Self::Ready(value),
            Err(message) => Self::Failed(message),
        }
    }
}

/// Identity of a table-list request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TablesKey {
    /// Connection revision the request was issued under
    pub revision: u64,
    /// Database whose tables were requested
    pub database: String,
}

/// Identity of a table-description request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableKey {
    /// Connection revision the request was issued under
    pub revision: u64,
    /// Database holding the table
    pub database: String,
    /// Table name
    pub table: String,
}

/// Identity of a file-description request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileKey {
    /// File load identity
    pub file: FileId,
    /// Delimiter the file was parsed with
    pub delimiter: Delimiter,
}

/// Where a cached schema came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SchemaSource {
    /// A ClickHouse table
    Table(TableKey),
    /// An uploaded file
    File(FileKey),
}

#[derive(Debug, Clone, PartialEq)]
struct Slot<K, T> {
    key: Option<K>,
    state: Fetch<T>,
}

impl<K, T> Default for Slot<K, T> {
    fn default() -> Self {
        Self {
            key: None,
            state: Fetch::Idle,
        }
    }
}

impl<K: PartialEq, T> Slot<K, T> {
    fn request(&mut self, key: K) {
        self.key = Some(key);
        self.state = Fetch::Loading;
    }

    fn resolve(&mut self, key: &K, result: Result<T, String>) -> bool {
        if self.key.as_ref() != Some(key) || !self.state.is_loading() {
            return false;
        }
        self.state = Fetch::from_result(result);
        true
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Database list, table list, and schema for the active direction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaCache {
    databases: Slot<u64, Vec<String>>,
    tables: Slot<TablesKey, Vec<String>>,
    schema: Slot<SchemaSource, Arc<SchemaDescription>>,
}

impl SchemaCache {
    /// Database list state
    pub const fn databases(&self) -> &Fetch<Vec<String>> {
        &self.databases.state
    }

    /// Table list state
    pub const fn tables(&self) -> &Fetch<Vec<String>> {
        &self.tables.state
    }

    /// Key the table list belongs to
    pub const fn tables_key(&self) -> Option<&TablesKey> {
        self.tables.key.as_ref()
    }

    /// Schema state
    pub const fn schema(&self) -> &Fetch<Arc<SchemaDescription>> {
        &self.schema.state
    }

    /// Source the schema belongs to
    pub const fn schema_source(&self) -> Option<&SchemaSource> {
        self.schema.key.as_ref()
    }

    /// The schema, when fetched successfully
    pub fn ready_schema(&self) -> Option<&Arc<SchemaDescription>> {
        self.schema.state.ready()
    }

    /// Drops every slot.
    pub fn clear(&mut self) {
        self.databases.clear();
        self.tables.clear();
        self.schema.clear();
    }

    /// Drops the database and table lists; the schema is kept.
    pub fn clear_listings(&mut self) {
        self.databases.clear();
        self.tables.clear();
    }

    /// Drops the table list and everything derived from it.
    pub fn clear_tables(&mut self) {
        self.tables.clear();
        self.schema.clear();
    }

    /// Drops the schema.
    pub fn clear_schema(&mut self) {
        self.schema.clear();
    }

    /// Marks the database list as loading for a connection revision.
    pub fn request_databases(&mut self, revision: u64) {
        self.databases.request(revision);
    }

    /// Marks the table list as loading; the old schema is dropped.
    pub fn request_tables(&mut self, key: TablesKey) {
        self.tables.request(key);
        self.schema.clear();
    }

    /// Marks the schema as loading.
    pub fn request_schema(&mut self, source: SchemaSource) {
        self.schema.request(source);
    }

    /// Applies a database-list response; false if it was stale.
    pub fn resolve_databases(&mut self, revision: u64, result: Result<Vec<String>, String>) -> bool {
        self.databases.resolve(&revision, result)
    }

    /// Applies a table-list response; false if it was stale.
    pub fn resolve_tables(&mut self, key: &TablesKey, result: Result<Vec<String>, String>) -> bool {
        self.tables.resolve(key, result)
    }

    /// Applies a schema response; false if it was stale.
    pub fn resolve_schema(
        &mut self,
        source: &SchemaSource,
        result: Result<Arc<SchemaDescription>, String>,
    ) -> bool {
        self.schema.resolve(source, result)
    }
}
