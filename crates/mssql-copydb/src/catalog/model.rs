//! Table, column and key metadata types.

use super::identifier::TableIdentifier;
use crate::error::{CopyError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// SQL Server system column types supported by the copier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlType {
    BigInt,
    Binary,
    Bit,
    Char,
    Date,
    DateTime,
    DateTime2,
    DateTimeOffset,
    Decimal,
    Float,
    Image,
    Int,
    Money,
    NChar,
    NText,
    Numeric,
    NVarChar,
    Real,
    SmallDateTime,
    SmallInt,
    SmallMoney,
    SqlVariant,
    Text,
    Time,
    Timestamp,
    TinyInt,
    UniqueIdentifier,
    VarBinary,
    VarChar,
    Xml,
}

impl SqlType {
    /// Lowercase type keyword as written in DDL.
    pub fn keyword(self) -> &'static str {
        match self {
            SqlType::BigInt => "bigint",
            SqlType::Binary => "binary",
            SqlType::Bit => "bit",
            SqlType::Char => "char",
            SqlType::Date => "date",
            SqlType::DateTime => "datetime",
            SqlType::DateTime2 => "datetime2",
            SqlType::DateTimeOffset => "datetimeoffset",
            SqlType::Decimal => "decimal",
            SqlType::Float => "float",
            SqlType::Image => "image",
            SqlType::Int => "int",
            SqlType::Money => "money",
            SqlType::NChar => "nchar",
            SqlType::NText => "ntext",
            SqlType::Numeric => "numeric",
            SqlType::NVarChar => "nvarchar",
            SqlType::Real => "real",
            SqlType::SmallDateTime => "smalldatetime",
            SqlType::SmallInt => "smallint",
            SqlType::SmallMoney => "smallmoney",
            SqlType::SqlVariant => "sql_variant",
            SqlType::Text => "text",
            SqlType::Time => "time",
            SqlType::Timestamp => "timestamp",
            SqlType::TinyInt => "tinyint",
            SqlType::UniqueIdentifier => "uniqueidentifier",
            SqlType::VarBinary => "varbinary",
            SqlType::VarChar => "varchar",
            SqlType::Xml => "xml",
        }
    }

    /// Variable-length text/binary types that accept a `(MAX)` length.
    pub fn supports_max_length(self) -> bool {
        matches!(self, SqlType::VarChar | SqlType::NVarChar | SqlType::VarBinary)
    }
}

impl FromStr for SqlType {
    type Err = CopyError;

    fn from_str(s: &str) -> Result<Self> {
        let ty = match s.to_ascii_lowercase().as_str() {
            "bigint" => SqlType::BigInt,
            "binary" => SqlType::Binary,
            "bit" => SqlType::Bit,
            "char" => SqlType::Char,
            "date" => SqlType::Date,
            "datetime" => SqlType::DateTime,
            "datetime2" => SqlType::DateTime2,
            "datetimeoffset" => SqlType::DateTimeOffset,
            "decimal" => SqlType::Decimal,
            "float" => SqlType::Float,
            "image" => SqlType::Image,
            "int" => SqlType::Int,
            "money" => SqlType::Money,
            "nchar" => SqlType::NChar,
            "ntext" => SqlType::NText,
            "numeric" => SqlType::Numeric,
            "nvarchar" | "sysname" => SqlType::NVarChar,
            "real" => SqlType::Real,
            "smalldatetime" => SqlType::SmallDateTime,
            "smallint" => SqlType::SmallInt,
            "smallmoney" => SqlType::SmallMoney,
            "sql_variant" => SqlType::SqlVariant,
            "text" => SqlType::Text,
            "time" => SqlType::Time,
            "timestamp" | "rowversion" => SqlType::Timestamp,
            "tinyint" => SqlType::TinyInt,
            "uniqueidentifier" => SqlType::UniqueIdentifier,
            "varbinary" => SqlType::VarBinary,
            "varchar" => SqlType::VarChar,
            "xml" => SqlType::Xml,
            other => {
                return Err(CopyError::catalog(format!(
                    "unsupported column type '{}'",
                    other
                )))
            }
        };
        Ok(ty)
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    /// Column name.
    pub name: String,

    /// Column type.
    pub sql_type: SqlType,

    /// Declared length (-1 when no explicit length, or MAX for varchar/nvarchar/varbinary).
    pub size: i32,

    /// Numeric precision (-1 when not applicable).
    pub precision: i32,

    /// Numeric scale (-1 when not applicable).
    pub scale: i32,

    /// Whether the column allows NULL.
    pub is_nullable: bool,

    /// Whether the column is an identity column.
    pub is_identity: bool,

    pub identity_seed: i64,

    pub identity_increment: i64,

    /// Expression of a computed column, as stored by the server.
    pub computed_expression: Option<String>,

    /// Ordinal position (1-based).
    pub ordinal_position: i32,

    pub collation: Option<String>,
}

impl ColumnDefinition {
    /// A physical, nullable, non-identity column with no length, precision or scale.
    pub fn new(name: impl Into<String>, sql_type: SqlType, ordinal_position: i32) -> Self {
        Self {
            name: name.into(),
            sql_type,
            size: -1,
            precision: -1,
            scale: -1,
            is_nullable: true,
            is_identity: false,
            identity_seed: 0,
            identity_increment: 0,
            computed_expression: None,
            ordinal_position,
            collation: None,
        }
    }

    /// True for `varchar(MAX)`, `nvarchar(MAX)` and `varbinary(MAX)` columns.
    pub fn is_max_size(&self) -> bool {
        self.size == -1 && self.sql_type.supports_max_length()
    }

    /// Computed columns are generated by the server and never receive rows.
    pub fn is_computed(&self) -> bool {
        self.computed_expression.is_some()
    }
}

/// One column of a key or index, referencing the owning table's column list by position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyColumn {
    /// Index into [`TableDefinition::columns`].
    pub column: usize,

    pub is_descending: bool,

    /// Position within the key (1-based).
    pub key_ordinal: i32,
}

/// The clustering construct of a table: a primary key, unique constraint or index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyDefinition {
    pub name: String,
    pub is_clustered: bool,
    pub is_primary_key: bool,
    pub is_unique: bool,

    /// Created with `ALTER TABLE ... ADD CONSTRAINT` rather than `CREATE INDEX`.
    pub is_constraint: bool,

    pub ignore_dup_key: bool,

    /// 0 means the server default.
    pub fill_factor: u8,

    pub pad_index: bool,
    pub allow_row_locks: bool,
    pub allow_page_locks: bool,

    /// Key columns in key order.
    pub columns: Vec<KeyColumn>,
}

/// Table metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDefinition {
    pub identifier: TableIdentifier,

    /// Column definitions ordered by ordinal position.
    pub columns: Vec<ColumnDefinition>,

    pub key: Option<KeyDefinition>,
}

impl TableDefinition {
    pub fn new(identifier: TableIdentifier) -> Self {
        Self {
            identifier,
            columns: Vec::new(),
            key: None,
        }
    }

    /// Whether any column is an identity column.
    pub fn has_identity(&self) -> bool {
        self.columns.iter().any(|c| c.is_identity)
    }

    /// Position of the column named `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, index: usize) -> Option<&ColumnDefinition> {
        self.columns.get(index)
    }

    /// Columns that receive transferred rows. Computed and rowversion columns
    /// are generated by the server and left out.
    pub fn transfer_columns(&self) -> impl Iterator<Item = &ColumnDefinition> {
        self.columns
            .iter()
            .filter(|c| !c.is_computed() && c.sql_type != SqlType::Timestamp)
    }

    /// Key columns paired with their column definitions, in key order.
    pub fn key_columns(&self) -> Vec<(&ColumnDefinition, bool)> {
        self.key
            .iter()
            .flat_map(|k| k.columns.iter())
            .filter_map(|kc| self.column(kc.column).map(|c| (c, kc.is_descending)))
            .collect()
    }
}
