//! Assembles a [`SchemaCatalog`] from decoded introspection rows.
//!
//! The introspection batch yields column rows first and key rows second.
//! Column rows create tables on first reference; key rows attach to tables
//! that already have columns and resolve their column names against them.

use super::identifier::TableIdentifier;
use super::model::{ColumnDefinition, KeyColumn, KeyDefinition, TableDefinition};
use super::SchemaCatalog;
use crate::error::{CopyError, Result};
use std::collections::BTreeMap;

/// One row of the column result set.
#[derive(Debug, Clone)]
pub struct ColumnRow {
    pub table: TableIdentifier,
    pub column: ColumnDefinition,
}

/// One row of the key result set: a key column plus its key's attributes.
#[derive(Debug, Clone)]
pub struct KeyColumnRow {
    pub table: TableIdentifier,
    pub key_name: String,
    pub is_clustered: bool,
    pub is_primary_key: bool,
    pub is_unique: bool,
    pub is_constraint: bool,
    pub ignore_dup_key: bool,
    pub fill_factor: u8,
    pub pad_index: bool,
    pub allow_row_locks: bool,
    pub allow_page_locks: bool,
    pub column_name: String,
    pub key_ordinal: i32,
    pub is_descending: bool,
}

impl KeyColumnRow {
    fn key_definition(&self) -> KeyDefinition {
        KeyDefinition {
            name: self.key_name.clone(),
            is_clustered: self.is_clustered,
            is_primary_key: self.is_primary_key,
            is_unique: self.is_unique,
            is_constraint: self.is_constraint,
            ignore_dup_key: self.ignore_dup_key,
            fill_factor: self.fill_factor,
            pad_index: self.pad_index,
            allow_row_locks: self.allow_row_locks,
            allow_page_locks: self.allow_page_locks,
            columns: Vec::new(),
        }
    }
}

/// Incremental catalog builder.
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    tables: BTreeMap<TableIdentifier, TableDefinition>,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the table entry for `identifier`.
    fn table_entry(&mut self, identifier: TableIdentifier) -> &mut TableDefinition {
        self.tables
            .entry(identifier)
            .or_insert_with_key(|id| TableDefinition::new(id.clone()))
    }

    /// Add a column, keeping the table's columns ordered by ordinal position.
    pub fn add_column(&mut self, row: ColumnRow) {
        let table = self.table_entry(row.table);
        let pos = table
            .columns
            .partition_point(|c| c.ordinal_position <= row.column.ordinal_position);
        table.columns.insert(pos, row.column);
    }

    /// Attach one key column to its table, creating the key on first sight.
    ///
    /// Fails when the table has no columns, when the column name is unknown,
    /// or when a second, differently named key shows up for the same table.
    pub fn add_key_column(&mut self, row: KeyColumnRow) -> Result<()> {
        let table = match self.tables.get_mut(&row.table) {
            Some(table) if !table.columns.is_empty() => table,
            _ => {
                return Err(CopyError::catalog(format!(
                    "key {} references table {} which has no columns",
                    row.key_name, row.table
                )))
            }
        };

        let column = table.column_index(&row.column_name).ok_or_else(|| {
            CopyError::catalog(format!(
                "key {} references unknown column {} on table {}",
                row.key_name, row.column_name, row.table
            ))
        })?;

        let key = table.key.get_or_insert_with(|| row.key_definition());
        if key.name != row.key_name {
            return Err(CopyError::catalog(format!(
                "table {} has more than one key ({} and {})",
                row.table, key.name, row.key_name
            )));
        }

        let pos = key
            .columns
            .partition_point(|kc| kc.key_ordinal <= row.key_ordinal);
        key.columns.insert(
            pos,
            KeyColumn {
                column,
                is_descending: row.is_descending,
                key_ordinal: row.key_ordinal,
            },
        );
        Ok(())
    }

    pub fn finish(self) -> SchemaCatalog {
        SchemaCatalog::from_map(self.tables)
    }
}
