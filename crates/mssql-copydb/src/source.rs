//! SQL Server source: schema introspection and row reading.

use crate::catalog::{
    CatalogBuilder, ColumnDefinition, ColumnRow, KeyColumnRow, SchemaCatalog, SqlType,
    TableIdentifier,
};
use crate::connection::{MssqlClient, RowStream, SourceConnection};
use crate::error::{CopyError, Result};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use tiberius::{FromSql, Row, TokenRow};
use tracing::{debug, info};

/// Introspection batch: columns of every user table, then the key of every
/// table that has one.
///
/// Alias types resolve to their base type. CLR types (geography, hierarchyid)
/// have no base type row and keep their own name, so the decoder rejects them.
/// The key is the clustered index or constraint when there is one, otherwise
/// the primary key. Included index columns have key ordinal 0 and are left out.
const INTROSPECTION_SQL: &str = r#"
SELECT
    s.name AS SchemaName,
    t.name AS TableName,
    c.name AS ColumnName,
    COALESCE(ty.name, TYPE_NAME(c.user_type_id)) AS [Type],
    CAST(CASE
        WHEN ty.name IN ('nchar', 'nvarchar') AND c.max_length = -1 THEN -1
        WHEN ty.name IN ('nchar', 'nvarchar') THEN c.max_length / 2
        WHEN ty.name IN ('char', 'varchar', 'binary', 'varbinary') THEN c.max_length
        WHEN ty.name IN ('datetime2', 'time', 'datetimeoffset') THEN c.scale
    END AS int) AS Size,
    CAST(CASE WHEN ty.name IN ('decimal', 'numeric') THEN c.precision END AS int) AS [Precision],
    CAST(CASE WHEN ty.name IN ('decimal', 'numeric') THEN c.scale END AS int) AS Scale,
    c.is_nullable AS IsNullable,
    c.is_identity AS IsIdentity,
    CAST(idc.seed_value AS bigint) AS IdentitySeed,
    CAST(idc.increment_value AS bigint) AS IdentityIncrement,
    cc.definition AS Calculation,
    c.column_id AS Position,
    c.collation_name AS Collation
FROM sys.tables t
JOIN sys.schemas s ON s.schema_id = t.schema_id
JOIN sys.columns c ON c.object_id = t.object_id
LEFT JOIN sys.types ty ON ty.user_type_id = c.system_type_id AND ty.is_user_defined = 0
LEFT JOIN sys.identity_columns idc ON idc.object_id = c.object_id AND idc.column_id = c.column_id
LEFT JOIN sys.computed_columns cc ON cc.object_id = c.object_id AND cc.column_id = c.column_id
WHERE t.is_ms_shipped = 0;

WITH chosen AS (
    SELECT
        i.object_id,
        i.index_id,
        ROW_NUMBER() OVER (
            PARTITION BY i.object_id
            ORDER BY CASE WHEN i.type = 1 THEN 0 ELSE 1 END, i.index_id
        ) AS rn
    FROM sys.indexes i
    JOIN sys.tables t ON t.object_id = i.object_id
    WHERE t.is_ms_shipped = 0 AND (i.type = 1 OR i.is_primary_key = 1)
)
SELECT
    s.name AS SchemaName,
    t.name AS TableName,
    i.name AS ConstraintName,
    CAST(CASE WHEN i.type = 1 THEN 1 ELSE 0 END AS bit) AS IsClustered,
    i.is_primary_key AS IsPrimaryKey,
    i.is_unique AS IsUnique,
    CAST(CASE WHEN i.is_primary_key = 1 OR i.is_unique_constraint = 1 THEN 1 ELSE 0 END AS bit) AS IsConstraint,
    i.ignore_dup_key AS IgnoreDupKey,
    CAST(i.fill_factor AS int) AS [FillFactor],
    i.is_padded AS PadIndex,
    i.allow_row_locks AS AllowRowLocks,
    i.allow_page_locks AS AllowPageLocks,
    c.name AS ColumnName,
    CAST(ic.key_ordinal AS int) AS KeyOrdinal,
    ic.is_descending_key AS IsDescending
FROM chosen ch
JOIN sys.indexes i ON i.object_id = ch.object_id AND i.index_id = ch.index_id
JOIN sys.tables t ON t.object_id = i.object_id
JOIN sys.schemas s ON s.schema_id = t.schema_id
JOIN sys.index_columns ic ON ic.object_id = i.object_id AND ic.index_id = i.index_id
JOIN sys.columns c ON c.object_id = ic.object_id AND c.column_id = ic.column_id
WHERE ch.rn = 1 AND ic.key_ordinal > 0;
"#;

/// Read-side connection to the source database.
pub struct MssqlSource {
    client: MssqlClient,
}

impl MssqlSource {
    pub fn new(client: MssqlClient) -> Self {
        Self { client }
    }

    /// Run the introspection batch and build the catalog.
    pub async fn load_catalog(&mut self) -> Result<SchemaCatalog> {
        let mut results = self
            .client
            .simple_query(INTROSPECTION_SQL)
            .await
            .map_err(|e| CopyError::catalog(format!("introspection query failed: {}", e)))?
            .into_results()
            .await
            .map_err(|e| CopyError::catalog(format!("reading introspection results: {}", e)))?
            .into_iter();

        let column_rows = results
            .next()
            .ok_or_else(|| CopyError::catalog("introspection returned no column result set"))?;
        let key_rows = results.next().unwrap_or_default();

        debug!(
            "Introspection returned {} column rows and {} key rows",
            column_rows.len(),
            key_rows.len()
        );

        let mut builder = CatalogBuilder::new();
        for row in &column_rows {
            builder.add_column(decode_column(row)?);
        }
        for row in &key_rows {
            builder.add_key_column(decode_key_column(row)?)?;
        }

        let catalog = builder.finish();
        info!(
            "Loaded {} tables in {} schemas",
            catalog.len(),
            catalog.schemas().len()
        );
        Ok(catalog)
    }
}

#[async_trait]
impl SourceConnection for MssqlSource {
    async fn read_rows<'a>(&'a mut self, query: &str) -> Result<RowStream<'a>> {
        debug!("{}", query);
        let stream = self.client.simple_query(query.to_owned()).await?;
        Ok(stream
            .into_row_stream()
            .map_ok(into_token_row)
            .map_err(CopyError::from)
            .boxed())
    }
}

/// Repackage a received row for bulk load.
fn into_token_row(row: Row) -> TokenRow<'static> {
    let mut token_row = TokenRow::new();
    for value in row {
        token_row.push(value);
    }
    token_row
}

fn decode_column(row: &Row) -> Result<ColumnRow> {
    let table = TableIdentifier::new(
        required::<&str>(row, "SchemaName")?,
        required::<&str>(row, "TableName")?,
    );
    let sql_type: SqlType = required::<&str>(row, "Type")?.parse()?;

    let mut column = ColumnDefinition::new(
        required::<&str>(row, "ColumnName")?,
        sql_type,
        required::<i32>(row, "Position")?,
    );
    column.size = optional::<i32>(row, "Size")?.unwrap_or(-1);
    column.precision = optional::<i32>(row, "Precision")?.unwrap_or(-1);
    column.scale = optional::<i32>(row, "Scale")?.unwrap_or(-1);
    column.is_nullable = required::<bool>(row, "IsNullable")?;
    column.is_identity = required::<bool>(row, "IsIdentity")?;
    column.identity_seed = optional::<i64>(row, "IdentitySeed")?.unwrap_or(0);
    column.identity_increment = optional::<i64>(row, "IdentityIncrement")?.unwrap_or(0);
    column.computed_expression = optional::<&str>(row, "Calculation")?.map(str::to_string);
    column.collation = optional::<&str>(row, "Collation")?.map(str::to_string);

    Ok(ColumnRow { table, column })
}

fn decode_key_column(row: &Row) -> Result<KeyColumnRow> {
    let fill_factor = required::<i32>(row, "FillFactor")?;
    let fill_factor = u8::try_from(fill_factor)
        .ok()
        .filter(|f| *f <= 100)
        .ok_or_else(|| CopyError::catalog(format!("invalid fill factor {}", fill_factor)))?;

    Ok(KeyColumnRow {
        table: TableIdentifier::new(
            required::<&str>(row, "SchemaName")?,
            required::<&str>(row, "TableName")?,
        ),
        key_name: required::<&str>(row, "ConstraintName")?.to_string(),
        is_clustered: required(row, "IsClustered")?,
        is_primary_key: required(row, "IsPrimaryKey")?,
        is_unique: required(row, "IsUnique")?,
        is_constraint: required(row, "IsConstraint")?,
        ignore_dup_key: required(row, "IgnoreDupKey")?,
        fill_factor,
        pad_index: required(row, "PadIndex")?,
        allow_row_locks: required(row, "AllowRowLocks")?,
        allow_page_locks: required(row, "AllowPageLocks")?,
        column_name: required::<&str>(row, "ColumnName")?.to_string(),
        key_ordinal: required(row, "KeyOrdinal")?,
        is_descending: required(row, "IsDescending")?,
    })
}

fn optional<'a, T: FromSql<'a>>(row: &'a Row, name: &str) -> Result<Option<T>> {
    row.try_get::<T, _>(name)
        .map_err(|e| CopyError::catalog(format!("column {}: {}", name, e)))
}

fn required<'a, T: FromSql<'a>>(row: &'a Row, name: &str) -> Result<T> {
    optional(row, name)?
        .ok_or_else(|| CopyError::catalog(format!("unexpected NULL in column {}", name)))
}
