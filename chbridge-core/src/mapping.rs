//! Column selection (export) and column mapping (import).
//!
//! Both are derived from the current schema description and discarded with
//! it. Operator edits only ever touch the entry they name.

use crate::error::ChBridgeError;
use crate::models::{SchemaDescription, TransferDirection};
use serde::Serialize;

/// Columns chosen for an export, kept in schema order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ColumnSelection {
    columns: Vec<String>,
}

impl ColumnSelection {
    /// Every column of `universe`.
    pub fn full(universe: &[String]) -> Self {
        Self {
            columns: universe.to_vec(),
        }
    }

    /// No columns.
    pub const fn empty() -> Self {
        Self {
            columns: Vec::new(),
        }
    }

    /// Selected columns in schema order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Whether `column` is selected
    pub fn contains(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Number of selected columns
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// True when nothing is selected
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Adds or removes one column.
    ///
    /// # Errors
    /// Rejects columns that are not part of `universe`.
    pub fn toggle(&mut self, column: &str, universe: &[String]) -> crate::Result<()> {
        if !universe.iter().any(|c| c == column) {
            return Err(ChBridgeError::rejected(format!(
                "column '{column}' is not part of the current schema"
            )));
        }

        let selected = !self.contains(column);
        self.columns = universe
            .iter()
            .filter(|c| if c.as_str() == column { selected } else { self.contains(c) })
            .cloned()
            .collect();
        Ok(())
    }
}

/// "Select all" checkbox semantics.
///
/// If every column is selected the result is empty; otherwise (including a
/// partial selection) the result is the full set.
pub fn toggle_all(selection: &ColumnSelection, universe: &[String]) -> ColumnSelection {
    if selection.len() == universe.len() {
        ColumnSelection::empty()
    } else {
        ColumnSelection::full(universe)
    }
}

/// One file column and the ClickHouse column it lands in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappingEntry {
    /// Column name in the file
    pub source: String,
    /// Target column name; blank means unmapped
    pub target: String,
}

impl MappingEntry {
    /// Whether the entry names a target column
    pub fn is_mapped(&self) -> bool {
        !self.target.trim().is_empty()
    }
}

/// File column to ClickHouse column rename, one entry per file column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ColumnMapping {
    entries: Vec<MappingEntry>,
}

impl ColumnMapping {
    /// Maps every column onto itself.
    pub fn identity(columns: &[String]) -> Self {
        Self {
            entries: columns
                .iter()
                .map(|column| MappingEntry {
                    source: column.clone(),
                    target: column.clone(),
                })
                .collect(),
        }
    }

    /// All entries in file column order, mapped or not
    pub fn entries(&self) -> &[MappingEntry] {
        &self.entries
    }

    /// Target for one file column
    pub fn target(&self, source: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.source == source)
            .map(|entry| entry.target.as_str())
    }

    /// Overwrites the target of one file column.
    ///
    /// An empty target is accepted and leaves the column unmapped.
    ///
    /// # Errors
    /// Rejects a source column that is not in the mapping's domain.
    pub fn set_target(&mut self, source: &str, target: impl Into<String>) -> crate::Result<()> {
        let entry = self
            .entries
            .iter_mut()
            .find(|entry| entry.source == source)
            .ok_or_else(|| {
                ChBridgeError::rejected(format!(
                    "file column '{source}' is not part of the current file"
                ))
            })?;
        entry.target = target.into();
        Ok(())
    }

    /// Entries with a non-blank target
    pub fn mapped(&self) -> impl Iterator<Item = &MappingEntry> {
        self.entries.iter().filter(|entry| entry.is_mapped())
    }

    /// Number of entries with a non-blank target
    pub fn mapped_count(&self) -> usize {
        self.mapped().count()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the domain is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Keeps selection and mapping consistent with the current schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MappingBuilder {
    selection: ColumnSelection,
    mapping: ColumnMapping,
}

impl MappingBuilder {
    /// Defaults for a freshly fetched schema: every column selected for
    /// export, identity mapping for import. Prior edits are discarded.
    pub fn derive(direction: TransferDirection, schema: &SchemaDescription) -> Self {
        match direction {
            TransferDirection::DatabaseToFile => Self {
                selection: ColumnSelection::full(schema.columns()),
                mapping: ColumnMapping::default(),
            },
            TransferDirection::FileToDatabase => Self {
                selection: ColumnSelection::empty(),
                mapping: ColumnMapping::identity(schema.columns()),
            },
        }
    }

    /// Export column selection
    pub const fn selection(&self) -> &ColumnSelection {
        &self.selection
    }

    /// Import column mapping
    pub const fn mapping(&self) -> &ColumnMapping {
        &self.mapping
    }

    /// Drops selection and mapping.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Flips one column in the export selection.
    ///
    /// # Errors
    /// Rejects columns outside the schema.
    pub fn toggle_column(&mut self, column: &str, schema: &SchemaDescription) -> crate::Result<()> {
        self.selection.toggle(column, schema.columns())
    }

    /// Applies "select all" checkbox semantics to the export selection.
    pub fn toggle_all(&mut self, schema: &SchemaDescription) {
        self.selection = toggle_all(&self.selection, schema.columns());
    }

    /// Renames one file column in the import mapping.
    ///
    /// # Errors
    /// Rejects columns outside the file's domain.
    pub fn set_target(&mut self, source: &str, target: impl Into<String>) -> crate::Result<()> {
        self.mapping.set_target(source, target)
    }
}
