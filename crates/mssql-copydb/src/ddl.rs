//! DDL generation for the destination database.
//!
//! Every function here is pure: the same definition always produces the same
//! statement text. Keys and indexes are emitted as a separate statement after
//! `CREATE TABLE` because their `WITH (...)` storage options are not allowed
//! on an inline table constraint.

use crate::catalog::{
    quote_ident, quote_literal, ColumnDefinition, KeyDefinition, SchemaCatalog, TableDefinition,
    TableIdentifier,
};

/// Create `schema` unless it already exists.
pub fn schema_guard(schema: &str) -> String {
    let create = format!("CREATE SCHEMA {}", quote_ident(schema));
    format!(
        "IF SCHEMA_ID({}) IS NULL EXEC({})",
        quote_literal(schema),
        quote_literal(&create)
    )
}

/// `CREATE TABLE` statement with all columns in stored order.
pub fn create_table(table: &TableDefinition) -> String {
    let columns: Vec<String> = table.columns.iter().map(column_definition).collect();
    format!(
        "CREATE TABLE {} ( {} )",
        table.identifier,
        columns.join(", ")
    )
}

/// Definition of a single column inside `CREATE TABLE`.
pub fn column_definition(column: &ColumnDefinition) -> String {
    let mut def = quote_ident(&column.name);

    if let Some(expression) = &column.computed_expression {
        def.push_str(" AS ");
        def.push_str(strip_enclosing_parens(expression));
        return def;
    }

    def.push(' ');
    def.push_str(&column_type(column));
    def.push_str(if column.is_nullable { " NULL" } else { " NOT NULL" });
    if column.is_identity {
        def.push_str(&format!(
            " IDENTITY({},{})",
            column.identity_seed, column.identity_increment
        ));
    }
    def
}

/// Type keyword with its length or precision, and collation if any.
fn column_type(column: &ColumnDefinition) -> String {
    let mut ty = column.sql_type.keyword().to_string();
    if column.size > -1 {
        ty.push_str(&format!("({})", column.size));
    } else if column.is_max_size() {
        ty.push_str("(MAX)");
    } else if column.precision > -1 && column.scale > -1 {
        ty.push_str(&format!("({},{})", column.precision, column.scale));
    }
    if let Some(collation) = &column.collation {
        ty.push_str(" COLLATE ");
        ty.push_str(collation);
    }
    ty
}

/// Key or index statement for the table, if it has one.
pub fn create_key(table: &TableDefinition) -> Option<String> {
    let key = table.key.as_ref()?;
    let columns = key_column_list(table);
    let clustered = if key.is_clustered {
        "CLUSTERED"
    } else {
        "NONCLUSTERED"
    };

    let statement = if key.is_constraint {
        let kind = if key.is_primary_key {
            "PRIMARY KEY"
        } else {
            "UNIQUE"
        };
        format!(
            "ALTER TABLE {} ADD CONSTRAINT {} {} {} ({}) {}",
            table.identifier,
            quote_ident(&key.name),
            kind,
            clustered,
            columns,
            key_options(key)
        )
    } else {
        let unique = if key.is_unique { "UNIQUE " } else { "" };
        format!(
            "CREATE {}{} INDEX {} ON {} ({}) {}",
            unique,
            clustered,
            quote_ident(&key.name),
            table.identifier,
            columns,
            key_options(key)
        )
    };
    Some(statement)
}

/// `WITH (...)` storage options shared by the constraint and index forms.
pub fn key_options(key: &KeyDefinition) -> String {
    let mut options = vec![format!("IGNORE_DUP_KEY={}", on_off(key.ignore_dup_key))];
    if key.fill_factor > 0 {
        options.push(format!("FILLFACTOR={}", key.fill_factor));
    }
    options.push(format!("PAD_INDEX={}", on_off(key.pad_index)));
    options.push(format!("ALLOW_ROW_LOCKS={}", on_off(key.allow_row_locks)));
    options.push(format!("ALLOW_PAGE_LOCKS={}", on_off(key.allow_page_locks)));
    format!("WITH ({})", options.join(","))
}

fn key_column_list(table: &TableDefinition) -> String {
    table
        .key_columns()
        .into_iter()
        .map(|(column, descending)| {
            if descending {
                format!("{} DESC", quote_ident(&column.name))
            } else {
                quote_ident(&column.name)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// `SET IDENTITY_INSERT` toggle for explicit identity values.
pub fn identity_insert(table: &TableIdentifier, enabled: bool) -> String {
    format!("SET IDENTITY_INSERT {} {}", table, on_off(enabled))
}

/// Row projection used to read a table for transfer.
///
/// Computed and rowversion columns are left out. Returns `None` when no column
/// can receive rows.
pub fn select_rows(table: &TableDefinition) -> Option<String> {
    let columns: Vec<String> = table
        .transfer_columns()
        .map(|c| quote_ident(&c.name))
        .collect();
    if columns.is_empty() {
        return None;
    }
    Some(format!(
        "SELECT {} FROM {}",
        columns.join(", "),
        table.identifier
    ))
}

/// Session temp table that receives bulk loads for a table with an identity column.
///
/// TDS bulk load skips identity columns, so rows are staged in a copy of the
/// transferable columns without the identity property and then moved with
/// `INSERT ... SELECT` while `IDENTITY_INSERT` is on.
pub const STAGING_TABLE: &str = "#copydb_stage";

/// Drop any previous staging table and create one shaped like `table`.
pub fn create_staging_table(table: &TableDefinition) -> Option<String> {
    let columns: Vec<String> = table
        .transfer_columns()
        .map(|c| format!("{} {} NULL", quote_ident(&c.name), column_type(c)))
        .collect();
    if columns.is_empty() {
        return None;
    }
    Some(format!(
        "IF OBJECT_ID(N'tempdb..{staging}') IS NOT NULL DROP TABLE {staging}; CREATE TABLE {staging} ( {} )",
        columns.join(", "),
        staging = STAGING_TABLE
    ))
}

/// Move staged rows into `table` and empty the staging table.
pub fn flush_staging_table(table: &TableDefinition) -> Option<String> {
    let columns: Vec<String> = table
        .transfer_columns()
        .map(|c| quote_ident(&c.name))
        .collect();
    if columns.is_empty() {
        return None;
    }
    let columns = columns.join(", ");
    Some(format!(
        "INSERT INTO {} ({}) SELECT {} FROM {staging}; TRUNCATE TABLE {staging}",
        table.identifier,
        columns,
        columns,
        staging = STAGING_TABLE
    ))
}

/// Every statement needed to recreate the catalog, in execution order.
pub fn script(catalog: &SchemaCatalog) -> Vec<String> {
    let mut statements: Vec<String> = catalog.schemas().into_iter().map(schema_guard).collect();
    for table in catalog.tables() {
        statements.push(create_table(table));
        statements.extend(create_key(table));
    }
    statements
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "ON"
    } else {
        "OFF"
    }
}

/// Remove one pair of parentheses enclosing the whole expression.
///
/// SQL Server stores computed column definitions wrapped in parentheses,
/// e.g. `([Amount]*[Qty])`. Parentheses inside bracketed names or string
/// literals are not counted.
fn strip_enclosing_parens(expression: &str) -> &str {
    let trimmed = expression.trim();
    if trimmed.len() < 2 || !trimmed.starts_with('(') || !trimmed.ends_with(')') {
        return trimmed;
    }

    let bytes = trimmed.as_bytes();
    let last = bytes.len() - 1;
    let mut depth = 0usize;
    let mut in_bracket = false;
    let mut in_quote = false;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if in_bracket {
            if b == b']' {
                if bytes.get(i + 1) == Some(&b']') {
                    i += 1;
                } else {
                    in_bracket = false;
                }
            }
        } else if in_quote {
            if b == b'\'' {
                in_quote = false;
            }
        } else {
            match b {
                b'[' => in_bracket = true,
                b'\'' => in_quote = true,
                b'(' => depth += 1,
                b')' => {
                    if depth == 0 {
                        return trimmed;
                    }
                    depth -= 1;
                    if depth == 0 && i != last {
                        return trimmed;
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }

    if depth == 0 && !in_bracket && !in_quote {
        &trimmed[1..last]
    } else {
        trimmed
    }
}
