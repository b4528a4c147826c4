//! SQL spelling per target engine.
//!
//! Redshift is the production target. SQLite runs the same catalog locally
//! and in tests: it has no distribution or sort keys, no `IDENTITY`, no
//! `COPY`, and different date functions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::catalog::{CopySpec, JsonFormat};
use crate::error::Error;
use crate::schema::{ColumnDef, ColumnType, CreateMode, DistStyle, TableDef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Redshift,
    Sqlite,
}

/// Calendar fields of the time dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeField {
    Hour,
    Day,
    Week,
    Month,
    Year,
    Weekday,
}

impl TimeField {
    pub const ALL: [TimeField; 6] = [
        TimeField::Hour,
        TimeField::Day,
        TimeField::Week,
        TimeField::Month,
        TimeField::Year,
        TimeField::Weekday,
    ];

    /// Column name in the `time` table.
    pub fn column(self) -> &'static str {
        match self {
            TimeField::Hour => "hour",
            TimeField::Day => "day",
            TimeField::Week => "week",
            TimeField::Month => "month",
            TimeField::Year => "year",
            TimeField::Weekday => "weekday",
        }
    }
}

/// Escape a string literal by doubling single quotes.
pub fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

impl Dialect {
    pub fn as_str(self) -> &'static str {
        match self {
            Dialect::Redshift => "redshift",
            Dialect::Sqlite => "sqlite",
        }
    }

    fn column_type(self, ty: ColumnType) -> String {
        match ty {
            ColumnType::Varchar(Some(n)) => format!("VARCHAR({n})"),
            ColumnType::Varchar(None) => match self {
                // Redshift's bare VARCHAR is 256 bytes.
                Dialect::Redshift => "VARCHAR(MAX)".into(),
                Dialect::Sqlite => "VARCHAR".into(),
            },
            ColumnType::Char(n) => format!("CHAR({n})"),
            ColumnType::Integer => "INTEGER".into(),
            ColumnType::BigInt => "BIGINT".into(),
            ColumnType::Decimal => "DECIMAL".into(),
            ColumnType::Float => "FLOAT".into(),
            ColumnType::Numeric => "NUMERIC".into(),
            ColumnType::Timestamp => "TIMESTAMP".into(),
        }
    }

    fn column_def(self, col: &ColumnDef) -> String {
        let mut parts = vec![col.name.clone()];
        match (self, col.identity) {
            (Dialect::Sqlite, true) => {
                parts.push("INTEGER PRIMARY KEY AUTOINCREMENT".into());
                return parts.join(" ");
            }
            (Dialect::Redshift, true) => {
                parts.push(self.column_type(col.ty));
                parts.push("IDENTITY(0,1)".into());
            }
            (_, false) => parts.push(self.column_type(col.ty)),
        }
        if col.not_null {
            parts.push("NOT NULL".into());
        }
        if col.primary_key {
            parts.push("PRIMARY KEY".into());
        }
        if self == Dialect::Redshift {
            if col.sort_key {
                parts.push("SORTKEY".into());
            }
            if col.dist_key {
                parts.push("DISTKEY".into());
            }
        }
        if let Some(fk) = &col.references {
            parts.push(format!("REFERENCES {}({})", fk.table, fk.column));
        }
        parts.join(" ")
    }

    pub fn create_table(self, table: &TableDef) -> String {
        let head = match table.create_mode {
            CreateMode::Strict => "CREATE TABLE",
            CreateMode::IfNotExists => "CREATE TABLE IF NOT EXISTS",
        };
        let cols: Vec<String> = table
            .columns
            .iter()
            .map(|c| format!("    {}", self.column_def(c)))
            .collect();
        let mut sql = format!("{head} {} (\n{}\n)", table.name, cols.join(",\n"));
        if let (Dialect::Redshift, Some(style)) = (self, table.dist_style) {
            sql.push_str(match style {
                DistStyle::Even => " DISTSTYLE EVEN",
                DistStyle::All => " DISTSTYLE ALL",
                DistStyle::Key => " DISTSTYLE KEY",
            });
        }
        sql
    }

    pub fn drop_table(self, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {table}")
    }

    /// `INSERT INTO`, or SQLite's `INSERT OR IGNORE INTO` when duplicate
    /// keys are to be skipped. Redshift does not enforce keys at all.
    pub fn insert_into(self, table: &str, skip_duplicates: bool) -> String {
        match (self, skip_duplicates) {
            (Dialect::Sqlite, true) => format!("INSERT OR IGNORE INTO {table}"),
            _ => format!("INSERT INTO {table}"),
        }
    }

    /// Timestamp from an epoch-milliseconds integer expression.
    pub fn epoch_millis_to_timestamp(self, expr: &str) -> String {
        match self {
            Dialect::Redshift => format!("TIMESTAMP 'epoch' + {expr} / 1000 * INTERVAL '1 second'"),
            Dialect::Sqlite => format!("datetime({expr} / 1000, 'unixepoch')"),
        }
    }

    pub fn extract(self, field: TimeField, expr: &str) -> String {
        match self {
            Dialect::Redshift => {
                let part = match field {
                    TimeField::Hour => "hour",
                    TimeField::Day => "day",
                    TimeField::Week => "week",
                    TimeField::Month => "month",
                    TimeField::Year => "year",
                    TimeField::Weekday => "dow",
                };
                format!("EXTRACT({part} FROM {expr})")
            }
            Dialect::Sqlite => {
                let fmt = match field {
                    TimeField::Hour => "%H",
                    TimeField::Day => "%d",
                    // ISO week, as EXTRACT returns it: day of year of the
                    // week's Thursday, counted in sevens.
                    TimeField::Week => {
                        return format!(
                            "CAST((strftime('%j', date({expr}, '-3 days', 'weekday 4')) - 1) / 7 + 1 AS INTEGER)"
                        )
                    }
                    TimeField::Month => "%m",
                    TimeField::Year => "%Y",
                    TimeField::Weekday => "%w",
                };
                format!("CAST(strftime('{fmt}', {expr}) AS INTEGER)")
            }
        }
    }

    /// Bulk-load text. SQLite has no COPY; its text is a comment and the
    /// executor loads the `CopySpec` itself.
    pub fn copy(self, spec: &CopySpec) -> String {
        let format = match &spec.format {
            JsonFormat::Auto => quote_literal("auto"),
            JsonFormat::JsonPaths(path) => quote_literal(path),
        };
        match self {
            Dialect::Redshift => format!(
                "COPY {} FROM {} REGION {} IAM_ROLE {} COMPUPDATE OFF STATUPDATE OFF FORMAT AS JSON {}",
                spec.table,
                quote_literal(&spec.source),
                quote_literal(&spec.region),
                quote_literal(spec.role_arn.as_str()),
                format
            ),
            Dialect::Sqlite => format!(
                "-- load {} from {} as json {}",
                spec.table,
                quote_literal(&spec.source),
                format
            ),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redshift" => Ok(Dialect::Redshift),
            "sqlite" => Ok(Dialect::Sqlite),
            other => Err(Error::UnknownDialect(other.to_string())),
        }
    }
}
