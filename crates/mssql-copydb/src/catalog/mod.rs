//! In-memory snapshot of the source schema.
//!
//! - [`identifier`]: schema-qualified table names and bracket quoting
//! - [`model`]: table, column and key definitions
//! - [`builder`]: assembly of a catalog from introspection rows
//!
//! A [`SchemaCatalog`] is built once per run from the source database and then
//! handed to the copier by value; nothing mutates it afterwards.

pub mod builder;
pub mod identifier;
pub mod model;

pub use builder::{CatalogBuilder, ColumnRow, KeyColumnRow};
pub use identifier::{quote_ident, quote_literal, TableIdentifier};
pub use model::{ColumnDefinition, KeyColumn, KeyDefinition, SqlType, TableDefinition};

use std::collections::{BTreeMap, BTreeSet};

/// Mapping from table identifier to table definition, iterated in identifier order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaCatalog {
    tables: BTreeMap<TableIdentifier, TableDefinition>,
}

impl SchemaCatalog {
    pub(crate) fn from_map(tables: BTreeMap<TableIdentifier, TableDefinition>) -> Self {
        Self { tables }
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn get(&self, identifier: &TableIdentifier) -> Option<&TableDefinition> {
        self.tables.get(identifier)
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableDefinition> {
        self.tables.values()
    }

    /// Distinct schema names, sorted.
    pub fn schemas(&self) -> BTreeSet<&str> {
        self.tables.keys().map(|id| id.schema()).collect()
    }

    pub fn into_tables(self) -> Vec<TableDefinition> {
        self.tables.into_values().collect()
    }
}

impl FromIterator<TableDefinition> for SchemaCatalog {
    fn from_iter<I: IntoIterator<Item = TableDefinition>>(iter: I) -> Self {
        let tables = iter
            .into_iter()
            .map(|t| (t.identifier.clone(), t))
            .collect();
        Self { tables }
    }
}
