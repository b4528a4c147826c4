//! The star schema: two staging tables, one fact table, four dimensions.
//!
//! Table definitions are dialect-neutral; `Dialect` decides how each column
//! attribute is spelled (or dropped).

use serde::{Deserialize, Serialize};

pub const STAGING_EVENTS: &str = "staging_events";
pub const STAGING_SONGS: &str = "staging_songs";
pub const SONGPLAYS: &str = "songplays";
pub const USERS: &str = "users";
pub const SONGS: &str = "songs";
pub const ARTISTS: &str = "artists";
pub const TIME: &str = "time";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Varchar(Option<u32>),
    Char(u32),
    Integer,
    BigInt,
    Decimal,
    Float,
    Numeric,
    Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    Staging,
    Fact,
    Dimension,
}

/// Whether `CREATE TABLE` tolerates an existing table.
///
/// Staging tables are created strictly: a second create without a drop fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreateMode {
    Strict,
    IfNotExists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistStyle {
    Even,
    All,
    Key,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub table: String,
    pub column: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub ty: ColumnType,
    pub not_null: bool,
    pub primary_key: bool,
    /// Auto-generated surrogate key.
    pub identity: bool,
    pub sort_key: bool,
    pub dist_key: bool,
    pub references: Option<ForeignKey>,
}

impl ColumnDef {
    pub fn new(name: &str, ty: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            ty,
            not_null: false,
            primary_key: false,
            identity: false,
            sort_key: false,
            dist_key: false,
            references: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn identity(mut self) -> Self {
        self.identity = true;
        self
    }

    pub fn sort_key(mut self) -> Self {
        self.sort_key = true;
        self
    }

    pub fn dist_key(mut self) -> Self {
        self.dist_key = true;
        self
    }

    pub fn references(mut self, table: &str, column: &str) -> Self {
        self.references = Some(ForeignKey {
            table: table.to_string(),
            column: column.to_string(),
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    pub kind: TableKind,
    pub create_mode: CreateMode,
    pub dist_style: Option<DistStyle>,
    pub columns: Vec<ColumnDef>,
}

impl TableDef {
    fn new(name: &str, kind: TableKind, columns: Vec<ColumnDef>) -> Self {
        let create_mode = match kind {
            TableKind::Staging => CreateMode::Strict,
            TableKind::Fact | TableKind::Dimension => CreateMode::IfNotExists,
        };
        Self {
            name: name.to_string(),
            kind,
            create_mode,
            dist_style: None,
            columns,
        }
    }

    fn dist_style(mut self, style: DistStyle) -> Self {
        self.dist_style = Some(style);
        self
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Tables this one references, in column order, without duplicates.
    pub fn parents(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for fk in self.columns.iter().filter_map(|c| c.references.as_ref()) {
            if !out.contains(&fk.table.as_str()) {
                out.push(fk.table.as_str());
            }
        }
        out
    }
}

pub fn staging_events() -> TableDef {
    use ColumnType::*;
    TableDef::new(
        STAGING_EVENTS,
        TableKind::Staging,
        vec![
            ColumnDef::new("artist", Varchar(None)),
            ColumnDef::new("auth", Varchar(None)),
            ColumnDef::new("firstName", Varchar(None)),
            ColumnDef::new("gender", Char(1)),
            ColumnDef::new("itemInSession", Integer),
            ColumnDef::new("lastName", Varchar(None)),
            ColumnDef::new("length", Decimal),
            ColumnDef::new("level", Varchar(None)),
            ColumnDef::new("location", Varchar(None)),
            ColumnDef::new("method", Varchar(None)),
            ColumnDef::new("page", Varchar(None)),
            ColumnDef::new("registration", Float),
            ColumnDef::new("sessionId", Integer),
            ColumnDef::new("song", Varchar(None)),
            ColumnDef::new("status", Integer),
            // epoch milliseconds
            ColumnDef::new("ts", BigInt),
            ColumnDef::new("userAgent", Varchar(None)),
            ColumnDef::new("userId", Integer),
        ],
    )
}

pub fn staging_songs() -> TableDef {
    use ColumnType::*;
    TableDef::new(
        STAGING_SONGS,
        TableKind::Staging,
        vec![
            ColumnDef::new("num_songs", Integer),
            ColumnDef::new("artist_id", Varchar(None)),
            ColumnDef::new("artist_latitude", Decimal),
            ColumnDef::new("artist_longitude", Decimal),
            ColumnDef::new("artist_location", Varchar(None)),
            ColumnDef::new("artist_name", Varchar(None)),
            ColumnDef::new("song_id", Varchar(None)),
            ColumnDef::new("title", Varchar(None)),
            ColumnDef::new("duration", Decimal),
            ColumnDef::new("year", Integer),
        ],
    )
}

pub fn users() -> TableDef {
    use ColumnType::*;
    TableDef::new(
        USERS,
        TableKind::Dimension,
        vec![
            ColumnDef::new("user_id", Integer).sort_key().primary_key(),
            ColumnDef::new("first_name", Varchar(None)).not_null(),
            ColumnDef::new("last_name", Varchar(None)).not_null(),
            ColumnDef::new("gender", Char(1)),
            ColumnDef::new("level", Varchar(None)).not_null(),
        ],
    )
    .dist_style(DistStyle::All)
}

pub fn artists() -> TableDef {
    use ColumnType::*;
    TableDef::new(
        ARTISTS,
        TableKind::Dimension,
        vec![
            ColumnDef::new("artist_id", Varchar(Some(60))).sort_key().primary_key(),
            ColumnDef::new("name", Varchar(Some(100))).not_null(),
            ColumnDef::new("location", Varchar(Some(300))),
            ColumnDef::new("latitude", Decimal),
            ColumnDef::new("longitude", Decimal),
        ],
    )
    .dist_style(DistStyle::All)
}

pub fn songs() -> TableDef {
    use ColumnType::*;
    TableDef::new(
        SONGS,
        TableKind::Dimension,
        vec![
            ColumnDef::new("song_id", Varchar(None)).sort_key().primary_key(),
            ColumnDef::new("title", Varchar(None)).not_null(),
            ColumnDef::new("artist_id", Varchar(None))
                .not_null()
                .dist_key()
                .references(ARTISTS, "artist_id"),
            ColumnDef::new("year", Integer).not_null(),
            ColumnDef::new("duration", Decimal).not_null(),
        ],
    )
}

pub fn time() -> TableDef {
    use ColumnType::*;
    TableDef::new(
        TIME,
        TableKind::Dimension,
        vec![
            ColumnDef::new("start_time", Timestamp).not_null().primary_key().sort_key(),
            ColumnDef::new("hour", Numeric).not_null(),
            ColumnDef::new("day", Numeric).not_null(),
            ColumnDef::new("week", Numeric).not_null(),
            ColumnDef::new("month", Numeric).not_null(),
            ColumnDef::new("year", Numeric).not_null(),
            ColumnDef::new("weekday", Numeric).not_null(),
        ],
    )
    .dist_style(DistStyle::All)
}

pub fn songplays() -> TableDef {
    use ColumnType::*;
    TableDef::new(
        SONGPLAYS,
        TableKind::Fact,
        vec![
            ColumnDef::new("songplay_id", Integer).identity().primary_key(),
            ColumnDef::new("start_time", Timestamp).not_null().sort_key(),
            ColumnDef::new("user_id", Integer)
                .not_null()
                .references(USERS, "user_id"),
            ColumnDef::new("level", Varchar(None)),
            ColumnDef::new("song_id", Varchar(None))
                .not_null()
                .references(SONGS, "song_id"),
            ColumnDef::new("artist_id", Varchar(None))
                .not_null()
                .references(ARTISTS, "artist_id"),
            ColumnDef::new("session_id", Integer).not_null(),
            ColumnDef::new("location", Varchar(None)),
            ColumnDef::new("user_agent", Varchar(None)),
        ],
    )
}

/// All seven tables, parents before children.
pub fn star_schema() -> Vec<TableDef> {
    vec![
        staging_events(),
        staging_songs(),
        users(),
        artists(),
        songs(),
        time(),
        songplays(),
    ]
}
