//! Schema-qualified table identifiers and SQL Server identifier quoting.
//!
//! SQL identifiers cannot be passed as statement parameters, so every name
//! that ends up in generated DDL goes through [`quote_ident`]: the name is
//! wrapped in brackets and any closing bracket inside it is doubled.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Quote a SQL Server identifier using brackets.
///
/// # Examples
///
/// ```
/// use mssql_copydb::catalog::quote_ident;
/// assert_eq!(quote_ident("users"), "[users]");
/// assert_eq!(quote_ident("odd]name"), "[odd]]name]");
/// ```
pub fn quote_ident(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Quote a value as an `N'...'` string literal, doubling single quotes.
pub fn quote_literal(value: &str) -> String {
    format!("N'{}'", value.replace('\'', "''"))
}

/// A schema-qualified table name.
///
/// Equality, hashing and ordering are structural over `(schema, name)`, so the
/// identifier can be used directly as a map key. `Display` renders the quoted
/// form, e.g. `[dbo].[Orders]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableIdentifier {
    schema: String,
    name: String,
}

impl TableIdentifier {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fully qualified, bracket-quoted name.
    pub fn quoted(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.name))
    }
}

impl fmt::Display for TableIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.quoted())
    }
}
