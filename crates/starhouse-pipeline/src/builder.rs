//! Build the catalog from explicit settings.
//!
//! Nothing here reads configuration or the environment; callers pass
//! everything in, so the same settings always render the same SQL.

use tracing::debug;

use starhouse_core::config::PipelineConfig;
use starhouse_core::id::RoleArn;

use crate::catalog::{Catalog, CopySpec, JsonFormat, Phase, Statement};
use crate::dialect::{Dialect, TimeField};
use crate::error::{Error, Result};
use crate::schema::{self, TableDef, ARTISTS, SONGPLAYS, SONGS, STAGING_EVENTS, STAGING_SONGS, TIME, USERS};

/// Inputs of [`build_catalog`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogSettings {
    pub dialect: Dialect,
    pub log_data: String,
    /// JSONPaths file for the event logs; `None` maps columns automatically.
    pub log_jsonpath: Option<String>,
    pub song_data: String,
    pub region: String,
    pub role_arn: RoleArn,
}

impl CatalogSettings {
    pub fn from_config(cfg: &PipelineConfig, dialect: Dialect) -> Self {
        Self {
            dialect,
            log_data: cfg.sources.log_data.clone(),
            log_jsonpath: cfg.sources.log_jsonpath.clone(),
            song_data: cfg.sources.song_data.clone(),
            region: cfg.region.clone(),
            role_arn: cfg.role_arn.clone(),
        }
    }

    fn validate(&self) -> Result<()> {
        let blank = [
            ("log_data", self.log_data.as_str()),
            ("song_data", self.song_data.as_str()),
            ("region", self.region.as_str()),
            ("role_arn", self.role_arn.as_str()),
        ]
        .into_iter()
        .find(|(_, v)| v.trim().is_empty());
        match blank {
            Some((key, _)) => Err(Error::Settings(format!("'{key}' is empty"))),
            None => Ok(()),
        }
    }
}

/// Insert order: dimensions the fact table references, the fact table,
/// then the time dimension derived from the fact table.
pub const INSERT_ORDER: [&str; 5] = [USERS, ARTISTS, SONGS, SONGPLAYS, TIME];

pub fn build_catalog(settings: &CatalogSettings) -> Result<Catalog> {
    settings.validate()?;
    let d = settings.dialect;
    let tables = schema::star_schema();

    // Children before parents.
    let drop = tables
        .iter()
        .rev()
        .map(|t| Statement::new(Phase::Drop, &t.name, d.drop_table(&t.name)))
        .collect();

    let create = tables
        .iter()
        .map(|t| Statement::new(Phase::Create, &t.name, d.create_table(t)))
        .collect();

    let events_format = match &settings.log_jsonpath {
        Some(path) => JsonFormat::JsonPaths(path.clone()),
        None => JsonFormat::Auto,
    };
    let copy = vec![
        copy_statement(settings, &schema::staging_events(), &settings.log_data, events_format),
        copy_statement(settings, &schema::staging_songs(), &settings.song_data, JsonFormat::Auto),
    ];

    let insert = INSERT_ORDER
        .iter()
        .map(|table| Statement::new(Phase::Insert, table, insert_sql(d, table)))
        .collect();

    let catalog = Catalog {
        dialect: d,
        drop,
        create,
        copy,
        insert,
    };
    debug!(dialect = %d, statements = catalog.len(), hash = %catalog.hash(), "built catalog");
    Ok(catalog)
}

fn copy_statement(settings: &CatalogSettings, table: &TableDef, source: &str, format: JsonFormat) -> Statement {
    let spec = CopySpec {
        table: table.name.clone(),
        columns: table.column_names(),
        source: source.to_string(),
        format,
        region: settings.region.clone(),
        role_arn: settings.role_arn.clone(),
    };
    let mut stmt = Statement::new(Phase::Copy, &table.name, settings.dialect.copy(&spec));
    stmt.copy = Some(spec);
    stmt
}

fn insert_sql(d: Dialect, table: &str) -> String {
    match table {
        USERS => format!(
            "{} (user_id, first_name, last_name, gender, level)\n\
             SELECT DISTINCT se.userId, se.firstName, se.lastName, se.gender, se.level\n\
             FROM {STAGING_EVENTS} se\n\
             WHERE se.userId IS NOT NULL",
            d.insert_into(USERS, true)
        ),
        ARTISTS => format!(
            "{} (artist_id, name, location, latitude, longitude)\n\
             SELECT DISTINCT ss.artist_id, ss.artist_name, ss.artist_location, ss.artist_latitude, ss.artist_longitude\n\
             FROM {STAGING_SONGS} ss\n\
             WHERE ss.artist_id IS NOT NULL",
            d.insert_into(ARTISTS, true)
        ),
        SONGS => format!(
            "{} (song_id, title, artist_id, year, duration)\n\
             SELECT DISTINCT ss.song_id, ss.title, ss.artist_id, ss.year, ss.duration\n\
             FROM {STAGING_SONGS} ss\n\
             WHERE ss.song_id IS NOT NULL",
            d.insert_into(SONGS, true)
        ),
        SONGPLAYS => format!(
            "{} (start_time, user_id, level, song_id, artist_id, session_id, location, user_agent)\n\
             SELECT DISTINCT {} AS start_time, se.userId, se.level, ss.song_id, ss.artist_id, se.sessionId, se.location, se.userAgent\n\
             FROM {STAGING_EVENTS} se\n\
             JOIN {STAGING_SONGS} ss ON ss.artist_name = se.artist AND ss.title = se.song\n\
             WHERE se.userId IS NOT NULL",
            d.insert_into(SONGPLAYS, false),
            d.epoch_millis_to_timestamp("se.ts")
        ),
        TIME => {
            let fields: Vec<String> = TimeField::ALL
                .iter()
                .map(|f| format!("{} AS {}", d.extract(*f, "sp.start_time"), f.column()))
                .collect();
            let columns: Vec<&str> = TimeField::ALL.iter().map(|f| f.column()).collect();
            format!(
                "{} (start_time, {})\n\
                 SELECT DISTINCT sp.start_time, {}\n\
                 FROM {SONGPLAYS} sp",
                d.insert_into(TIME, true),
                columns.join(", "),
                fields.join(", ")
            )
        }
        // INSERT_ORDER only names the five tables above.
        other => format!("-- no transform for {other}"),
    }
}
