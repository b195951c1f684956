//! Persisted identity -> class index table.
//!
//! Indices are assigned to the lexicographically sorted set of identities, so
//! a given folder always produces the same table. Once the file exists it is
//! loaded verbatim; checkpoints trained against it stay valid as long as the
//! file is kept.

use crate::types::{DatasetError, DatasetResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const TABLE_VERSION: u32 = 1;
const ORDERING: &str = "lexicographic";

/// File name used for `dataset`'s table inside the label folder.
pub fn table_file_name(dataset: &str) -> String {
    format!("{dataset}writer_index_table.json")
}

#[derive(Debug, Serialize, Deserialize)]
struct TableFile {
    version: u32,
    ordering: String,
    writers: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityIndexTable {
    path: PathBuf,
    writers: BTreeMap<String, usize>,
    by_index: Vec<String>,
}

impl IdentityIndexTable {
    /// Load the table at `path`, or build it from `identities` and persist it.
    pub fn build_or_load<I, S>(path: &Path, identities: I) -> DatasetResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if path.exists() {
            let table = Self::load(path)?;
            debug!(path = %path.display(), writers = table.len(), "loaded index table");
            return Ok(table);
        }
        let table = Self::from_identities(path, identities);
        table.persist()?;
        info!(path = %path.display(), writers = table.len(), "created index table");
        Ok(table)
    }

    pub fn load(path: &Path) -> DatasetResult<Self> {
        let raw = fs::read(path).map_err(|e| DatasetError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let file: TableFile = serde_json::from_slice(&raw).map_err(|e| DatasetError::Json {
            path: path.to_path_buf(),
            source: e,
        })?;
        if file.version != TABLE_VERSION {
            return Err(DatasetError::InvalidTable {
                path: path.to_path_buf(),
                msg: format!("unsupported version {}", file.version),
            });
        }
        if file.ordering != ORDERING {
            return Err(DatasetError::InvalidTable {
                path: path.to_path_buf(),
                msg: format!("unsupported ordering {:?}", file.ordering),
            });
        }
        let mut by_index = vec![None; file.writers.len()];
        for (identity, &idx) in &file.writers {
            match by_index.get_mut(idx) {
                Some(slot) if slot.is_none() => *slot = Some(identity.clone()),
                _ => {
                    return Err(DatasetError::InvalidTable {
                        path: path.to_path_buf(),
                        msg: format!("index {idx} for {identity:?} is duplicated or out of range"),
                    })
                }
            }
        }
        Ok(Self {
            path: path.to_path_buf(),
            writers: file.writers,
            by_index: by_index.into_iter().flatten().collect(),
        })
    }

    fn from_identities<I, S>(path: &Path, identities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let sorted: BTreeSet<String> = identities
            .into_iter()
            .map(|s| s.as_ref().to_string())
            .collect();
        let by_index: Vec<String> = sorted.into_iter().collect();
        let writers = by_index
            .iter()
            .enumerate()
            .map(|(idx, id)| (id.clone(), idx))
            .collect();
        Self {
            path: path.to_path_buf(),
            writers,
            by_index,
        }
    }

    /// Write to a sibling temp file, then rename over the target.
    fn persist(&self) -> DatasetResult<()> {
        let io_err = |path: &Path, e: std::io::Error| DatasetError::Io {
            path: path.to_path_buf(),
            source: e,
        };
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
            }
        }
        let file = TableFile {
            version: TABLE_VERSION,
            ordering: ORDERING.to_string(),
            writers: self.writers.clone(),
        };
        let body = serde_json::to_vec_pretty(&file).map_err(|e| DatasetError::Json {
            path: self.path.clone(),
            source: e,
        })?;
        let tmp = self
            .path
            .with_extension(format!("json.tmp.{}", std::process::id()));
        let mut f = fs::File::create(&tmp).map_err(|e| io_err(&tmp, e))?;
        f.write_all(&body).map_err(|e| io_err(&tmp, e))?;
        f.sync_all().map_err(|e| io_err(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| io_err(&self.path, e))?;
        Ok(())
    }

    /// Fail if any of `identities` has no index.
    pub fn ensure_covers<I, S>(&self, identities: I) -> DatasetResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let missing: BTreeSet<String> = identities
            .into_iter()
            .map(|id| id.as_ref().to_string())
            .filter(|id| !self.writers.contains_key(id))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(DatasetError::Coverage {
                path: self.path.clone(),
                missing: missing.into_iter().collect(),
            })
        }
    }

    pub fn index_of(&self, identity: &str) -> DatasetResult<usize> {
        self.writers
            .get(identity)
            .copied()
            .ok_or_else(|| DatasetError::Lookup {
                identity: identity.to_string(),
            })
    }

    pub fn identity_of(&self, index: usize) -> Option<&str> {
        self.by_index.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_index.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Identities in index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.by_index.iter().enumerate().map(|(i, s)| (i, s.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_follow_sorted_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(table_file_name("X"));
        let table = IdentityIndexTable::build_or_load(&path, ["b", "a", "c", "a"]).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.index_of("a").unwrap(), 0);
        assert_eq!(table.index_of("b").unwrap(), 1);
        assert_eq!(table.index_of("c").unwrap(), 2);
        assert_eq!(table.identity_of(2), Some("c"));
        assert!(path.exists());
    }

    #[test]
    fn existing_file_wins_over_new_listing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(table_file_name("X"));
        let first = IdentityIndexTable::build_or_load(&path, ["m", "n"]).unwrap();
        let second = IdentityIndexTable::build_or_load(&path, ["a", "m", "n"]).unwrap();
        assert_eq!(first, second);
        assert!(matches!(
            second.index_of("a"),
            Err(DatasetError::Lookup { .. })
        ));
    }

    #[test]
    fn coverage_reports_missing_identities() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(table_file_name("X"));
        let table = IdentityIndexTable::build_or_load(&path, ["m", "n"]).unwrap();
        table.ensure_covers(["n", "m"]).unwrap();
        match table.ensure_covers(["m", "z", "q"]) {
            Err(DatasetError::Coverage { missing, .. }) => assert_eq!(missing, vec!["q", "z"]),
            other => panic!("expected coverage error, got {other:?}"),
        }
    }

    #[test]
    fn non_dense_table_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(
            &path,
            r#"{"version":1,"ordering":"lexicographic","writers":{"a":0,"b":2}}"#,
        )
        .unwrap();
        assert!(matches!(
            IdentityIndexTable::load(&path),
            Err(DatasetError::InvalidTable { .. })
        ));
    }

    #[test]
    fn no_temp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(table_file_name("Y"));
        IdentityIndexTable::build_or_load(&path, ["a"]).unwrap();
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec![table_file_name("Y")]);
    }
}
