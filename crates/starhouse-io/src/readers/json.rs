//! JSON documents → rows.
//!
//! Source objects hold either one JSON object (song metadata) or one object
//! per line (event logs); both are read with the same streaming deserializer.
//! Columns are filled either automatically (object key matches the column
//! name, ignoring ASCII case) or by a JSONPaths file whose expressions are
//! applied in column order.

use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Parse every top-level JSON object in `bytes`.
///
/// `origin` only labels errors.
pub fn read_json_documents(origin: &str, bytes: &[u8]) -> Result<Vec<Map<String, Value>>> {
    let mut out = Vec::new();
    for item in serde_json::Deserializer::from_slice(bytes).into_iter::<Value>() {
        match item.map_err(|e| Error::json(origin, e))? {
            Value::Object(obj) => out.push(obj),
            other => {
                return Err(Error::JsonPaths(format!(
                    "{origin}: expected JSON objects, found {}",
                    type_name(&other)
                )))
            }
        }
    }
    Ok(out)
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
}

/// A parsed JSONPaths file: `{"jsonpaths": ["$['artist']", "$.auth", ...]}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPaths {
    paths: Vec<Vec<Segment>>,
}

impl JsonPaths {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let doc: Value = serde_json::from_slice(bytes).map_err(|e| Error::json("jsonpaths", e))?;
        let list = doc
            .get("jsonpaths")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::JsonPaths("missing top-level 'jsonpaths' array".into()))?;
        let paths = list
            .iter()
            .map(|p| {
                p.as_str()
                    .ok_or_else(|| Error::JsonPaths(format!("path expression must be a string: {p}")))
                    .and_then(parse_expression)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { paths })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Evaluate every expression against `doc`; absent values become null.
    pub fn project(&self, doc: &Map<String, Value>) -> Vec<Value> {
        self.paths
            .iter()
            .map(|segments| {
                let mut cur: Option<&Value> = None;
                for (i, seg) in segments.iter().enumerate() {
                    cur = match (i, seg, cur) {
                        (0, Segment::Key(k), _) => doc.get(k),
                        (_, Segment::Key(k), Some(Value::Object(o))) => o.get(k),
                        (_, Segment::Index(n), Some(Value::Array(a))) => a.get(*n),
                        _ => None,
                    };
                    if cur.is_none() {
                        break;
                    }
                }
                cur.cloned().unwrap_or(Value::Null)
            })
            .collect()
    }
}

fn parse_expression(expr: &str) -> Result<Vec<Segment>> {
    let bad = |why: &str| Error::JsonPaths(format!("'{expr}': {why}"));
    let mut rest = expr
        .trim()
        .strip_prefix('$')
        .ok_or_else(|| bad("must start with '$'"))?;
    let mut segments = Vec::new();

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix('.') {
            let end = after.find(['.', '[']).unwrap_or(after.len());
            let name = &after[..end];
            if name.is_empty() {
                return Err(bad("empty member name"));
            }
            segments.push(Segment::Key(name.to_string()));
            rest = &after[end..];
        } else if let Some(after) = rest.strip_prefix('[') {
            let close = after.find(']').ok_or_else(|| bad("unclosed '['"))?;
            let inner = after[..close].trim();
            let quoted = inner
                .strip_prefix('\'')
                .and_then(|s| s.strip_suffix('\''))
                .or_else(|| inner.strip_prefix('"').and_then(|s| s.strip_suffix('"')));
            match quoted {
                Some(name) => segments.push(Segment::Key(name.to_string())),
                None => {
                    let n = inner
                        .parse::<usize>()
                        .map_err(|_| bad("bracket must hold a quoted name or an index"))?;
                    segments.push(Segment::Index(n));
                }
            }
            rest = &after[close + 1..];
        } else {
            return Err(bad("expected '.' or '['"));
        }
    }

    match segments.first() {
        Some(Segment::Key(_)) => Ok(segments),
        Some(Segment::Index(_)) => Err(bad("root must be an object member")),
        None => Err(bad("selects the whole document")),
    }
}

/// How a JSON document fills a row of the target table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnMapping {
    /// Column `c` takes the top-level key equal to `c` ignoring ASCII case.
    Auto,
    Paths(JsonPaths),
}

impl ColumnMapping {
    /// Build the row for `columns` (target table order).
    pub fn row(&self, doc: &Map<String, Value>, columns: &[String]) -> Result<Vec<Value>> {
        match self {
            ColumnMapping::Auto => Ok(columns
                .iter()
                .map(|c| {
                    doc.iter()
                        .find(|(k, _)| k.eq_ignore_ascii_case(c))
                        .map(|(_, v)| v.clone())
                        .unwrap_or(Value::Null)
                })
                .collect()),
            ColumnMapping::Paths(paths) => {
                if paths.len() != columns.len() {
                    return Err(Error::JsonPaths(format!(
                        "{} expressions for {} columns",
                        paths.len(),
                        columns.len()
                    )));
                }
                Ok(paths.project(doc))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_single_and_line_delimited_documents() {
        let one = br#"{"song_id": "S1", "title": "Hey"}"#;
        assert_eq!(read_json_documents("one", one).unwrap().len(), 1);

        let many = b"{\"a\":1}\n{\"a\":2}\n\n{\"a\":3}\n";
        let docs = read_json_documents("many", many).unwrap();
        assert_eq!(docs.len(), 3);
        assert_eq!(docs[2]["a"], json!(3));
    }

    #[test]
    fn non_object_documents_are_rejected() {
        assert!(read_json_documents("arr", b"[1,2]").is_err());
        assert!(matches!(
            read_json_documents("broken", b"{\"a\":"),
            Err(Error::Json { .. })
        ));
    }

    #[test]
    fn jsonpaths_project_in_order() {
        let paths = JsonPaths::parse(
            br#"{"jsonpaths": ["$['artist']", "$.auth", "$['tags'][1]", "$.geo.lat"]}"#,
        )
        .unwrap();
        let doc = json!({"artist": "A", "tags": ["x", "y"], "geo": {"lat": 1.5}});
        let row = paths.project(doc.as_object().unwrap());
        assert_eq!(row, vec![json!("A"), Value::Null, json!("y"), json!(1.5)]);
    }

    #[test]
    fn malformed_expressions_fail() {
        for bad in ["artist", "$", "$[0]", "$['a'", "$..x"] {
            let doc = format!(r#"{{"jsonpaths": ["{}"]}}"#, bad.replace('"', "\\\""));
            assert!(JsonPaths::parse(doc.as_bytes()).is_err(), "accepted {bad}");
        }
    }

    #[test]
    fn auto_mapping_ignores_case() {
        let doc = json!({"firstName": "Ada", "userId": 7});
        let cols = vec!["firstname".to_string(), "userid".to_string(), "gender".to_string()];
        let row = ColumnMapping::Auto.row(doc.as_object().unwrap(), &cols).unwrap();
        assert_eq!(row, vec![json!("Ada"), json!(7), Value::Null]);
    }

    #[test]
    fn paths_mapping_checks_column_count() {
        let paths = JsonPaths::parse(br#"{"jsonpaths": ["$.a"]}"#).unwrap();
        let doc = json!({"a": 1});
        let cols = vec!["a".to_string(), "b".to_string()];
        assert!(ColumnMapping::Paths(paths)
            .row(doc.as_object().unwrap(), &cols)
            .is_err());
    }
}
