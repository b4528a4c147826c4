use std::fs;
use std::path::{Path, PathBuf};

use url::Url;

use super::{ObjectEntry, SourceStore};
use crate::error::{Error, Result};

/// Local filesystem store (rooted at the host filesystem).
///
/// Hidden files (`.DS_Store`, `.gitkeep`, ...) are never listed.
#[derive(Debug, Clone, Default)]
pub struct FsStorage;

impl FsStorage {
    pub fn new() -> Self {
        Self
    }
}

/// Turn `file:///x/y` or a bare path into a filesystem path.
pub(super) fn local_path(uri: &str) -> Result<PathBuf> {
    if uri.starts_with("file://") {
        let url = Url::parse(uri).map_err(|e| Error::Config(format!("bad file URI '{uri}': {e}")))?;
        url.to_file_path()
            .map_err(|_| Error::Config(format!("file URI '{uri}' has no local path")))
    } else {
        Ok(PathBuf::from(uri))
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

fn visit_dirs(dir: &Path, results: &mut Vec<ObjectEntry>) -> std::io::Result<()> {
    if dir.is_dir() {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if is_hidden(&path) {
                continue;
            }
            if path.is_dir() {
                visit_dirs(&path, results)?;
            } else {
                push_file(&path, results)?;
            }
        }
    }
    Ok(())
}

fn push_file(path: &Path, results: &mut Vec<ObjectEntry>) -> std::io::Result<()> {
    if let Some(s) = path.to_str() {
        results.push(ObjectEntry {
            path: s.to_string(),
            size: fs::metadata(path)?.len(),
        });
    }
    Ok(())
}

impl SourceStore for FsStorage {
    fn list(&self, prefix: &str) -> Result<Vec<ObjectEntry>> {
        let prefix_path = local_path(prefix)?;
        let mut results = Vec::new();

        if prefix_path.is_file() {
            push_file(&prefix_path, &mut results)?;
        } else if prefix_path.is_dir() {
            visit_dirs(&prefix_path, &mut results)?;
        } else {
            // Partial name: match siblings that start with the last component.
            let (Some(parent), Some(stem)) = (
                prefix_path.parent(),
                prefix_path.file_name().and_then(|n| n.to_str()),
            ) else {
                return Ok(results);
            };
            let parent = if parent.as_os_str().is_empty() {
                Path::new(".")
            } else {
                parent
            };
            if !parent.is_dir() {
                return Ok(results);
            }
            for entry in fs::read_dir(parent)? {
                let path = entry?.path();
                let matches = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with(stem))
                    .unwrap_or(false);
                if !matches || is_hidden(&path) {
                    continue;
                }
                if path.is_dir() {
                    visit_dirs(&path, &mut results)?;
                } else {
                    push_file(&path, &mut results)?;
                }
            }
        }

        results.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(results)
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        let p = local_path(path)?;
        fs::read(&p).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(path.to_string()),
            _ => Error::Io(e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("starhouse-fs-tests-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn lists_recursively_and_skips_hidden() {
        let dir = temp_dir("recursive");
        fs::create_dir_all(dir.join("A/B")).unwrap();
        fs::write(dir.join("A/B/song1.json"), b"{}").unwrap();
        fs::write(dir.join("A/song2.json"), b"{\"a\":1}").unwrap();
        fs::write(dir.join("A/.DS_Store"), b"junk").unwrap();

        let store = FsStorage::new();
        let entries = store.list(dir.to_str().unwrap()).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].path.ends_with("song1.json"));
        assert_eq!(entries[1].size, 7);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn partial_prefix_matches_siblings() {
        let dir = temp_dir("prefix");
        fs::write(dir.join("log_2018.json"), b"{}").unwrap();
        fs::write(dir.join("log_2019.json"), b"{}").unwrap();
        fs::write(dir.join("other.json"), b"{}").unwrap();

        let store = FsStorage::new();
        let prefix = format!("{}/log_", dir.display());
        assert_eq!(store.list(&prefix).unwrap().len(), 2);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn file_uri_is_accepted_and_missing_read_is_not_found() {
        let dir = temp_dir("uri");
        fs::write(dir.join("x.json"), b"{}").unwrap();
        let store = FsStorage::new();
        let uri = format!("file://{}", dir.join("x.json").display());
        assert_eq!(store.read(&uri).unwrap(), b"{}");
        assert!(matches!(
            store.read(dir.join("nope.json").to_str().unwrap()),
            Err(Error::NotFound(_))
        ));
        let _ = fs::remove_dir_all(&dir);
    }
}
