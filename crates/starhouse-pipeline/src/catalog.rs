//! The statement catalog: four ordered phases of rendered SQL.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use starhouse_core::hash::{hash_statements, Hash256};
use starhouse_core::id::RoleArn;

use crate::dialect::Dialect;
use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Drop,
    Create,
    Copy,
    Insert,
}

impl Phase {
    pub const ALL: [Phase; 4] = [Phase::Drop, Phase::Create, Phase::Copy, Phase::Insert];

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Drop => "drop",
            Phase::Create => "create",
            Phase::Copy => "copy",
            Phase::Insert => "insert",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Phase::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::UnknownPhase(s.to_string()))
    }
}

/// How JSON fields map onto the target columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "path", rename_all = "snake_case")]
pub enum JsonFormat {
    Auto,
    /// Location of a JSONPaths file.
    JsonPaths(String),
}

/// A bulk load, kept alongside its rendered COPY text so executors without
/// a native COPY can perform it themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopySpec {
    pub table: String,
    /// Target columns, in table order.
    pub columns: Vec<String>,
    pub source: String,
    pub format: JsonFormat,
    pub region: String,
    pub role_arn: RoleArn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    pub phase: Phase,
    pub table: String,
    pub sql: String,
    pub copy: Option<CopySpec>,
}

impl Statement {
    pub(crate) fn new(phase: Phase, table: &str, sql: String) -> Self {
        Self {
            phase,
            table: table.to_string(),
            sql,
            copy: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub dialect: Dialect,
    pub drop: Vec<Statement>,
    pub create: Vec<Statement>,
    pub copy: Vec<Statement>,
    pub insert: Vec<Statement>,
}

impl Catalog {
    pub fn phase(&self, phase: Phase) -> &[Statement] {
        match phase {
            Phase::Drop => &self.drop,
            Phase::Create => &self.create,
            Phase::Copy => &self.copy,
            Phase::Insert => &self.insert,
        }
    }

    /// Every statement, phase by phase.
    pub fn statements(&self) -> impl Iterator<Item = &Statement> {
        Phase::ALL.into_iter().flat_map(move |p| self.phase(p).iter())
    }

    pub fn len(&self) -> usize {
        self.statements().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Table names in the order `phase` touches them.
    pub fn tables(&self, phase: Phase) -> Vec<&str> {
        self.phase(phase).iter().map(|s| s.table.as_str()).collect()
    }

    pub fn find(&self, phase: Phase, table: &str) -> Option<&Statement> {
        self.phase(phase).iter().find(|s| s.table == table)
    }

    /// Stable fingerprint of the rendered SQL, recorded in run manifests.
    pub fn hash(&self) -> Hash256 {
        hash_statements(self.statements().map(|s| s.sql.as_str()))
    }

    /// The whole catalog as one script, each phase under a comment header.
    pub fn render_script(&self) -> String {
        let mut out = format!("-- dialect: {}\n", self.dialect);
        for phase in Phase::ALL {
            out.push_str(&format!("\n-- phase: {phase}\n"));
            for stmt in self.phase(phase) {
                out.push_str(stmt.sql.trim_end());
                out.push_str(";\n");
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_parse_and_order() {
        assert_eq!("COPY".parse::<Phase>().unwrap(), Phase::Copy);
        assert!("load".parse::<Phase>().is_err());
        let mut sorted = Phase::ALL;
        sorted.sort();
        assert_eq!(sorted, Phase::ALL);
    }

    #[test]
    fn json_format_serializes_with_mode_tag() {
        let v = serde_json::to_value(JsonFormat::JsonPaths("s3://b/p.json".into())).unwrap();
        assert_eq!(v["mode"], "json_paths");
        assert_eq!(v["path"], "s3://b/p.json");
    }
}
