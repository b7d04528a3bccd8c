//! Durable progress records
//!
//! Progress is split into independent JSON records under one directory:
//!
//! ```text
//! data/
//! ├── processed.json        # settled deposit tx ids
//! ├── low_water.json        # per-account low-water marks
//! ├── in_flight.json        # sweep journal
//! └── reset_audit.jsonl     # one line per operator reset
//! ```
//!
//! Every record is replaced atomically: write `.<name>.tmp`, fsync, rename
//! over the target, fsync the directory. A crash leaves either the old or
//! the new record. Missing records load as empty.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::StoreError;
use super::types::ProgressState;
use crate::core_types::{Timestamp, TxId, UserId};

pub const PROCESSED_FILE: &str = "processed.json";
pub const LOW_WATER_FILE: &str = "low_water.json";
pub const IN_FLIGHT_FILE: &str = "in_flight.json";
pub const RESET_AUDIT_FILE: &str = "reset_audit.jsonl";

/// One operator reset, appended to the audit log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetAudit {
    pub id: Uuid,
    pub at: DateTime<Utc>,
    pub operator: String,
    pub reason: String,
    pub settled_cleared: usize,
    pub marks_cleared: usize,
}

/// Durable storage for [`ProgressState`]
///
/// `commit` must leave each record either fully old or fully new.
pub trait ProgressStore: Send + Sync {
    fn load(&self) -> Result<ProgressState, StoreError>;

    fn commit(&self, state: &ProgressState) -> Result<(), StoreError>;

    fn append_audit(&self, entry: &ResetAudit) -> Result<(), StoreError>;
}

/// File-backed progress store
pub struct FileProgressStore {
    dir: PathBuf,
}

impl FileProgressStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Read all reset audit entries (oldest first)
    pub fn audit_log(&self) -> Result<Vec<ResetAudit>, StoreError> {
        let path = self.path(RESET_AUDIT_FILE);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| {
                serde_json::from_str(l).map_err(|source| StoreError::Corrupt {
                    path: path.clone(),
                    source,
                })
            })
            .collect()
    }
}

impl ProgressStore for FileProgressStore {
    fn load(&self) -> Result<ProgressState, StoreError> {
        let settled: BTreeSet<TxId> = read_json_or_default(&self.path(PROCESSED_FILE))?;
        let low_water: BTreeMap<UserId, Timestamp> =
            read_json_or_default(&self.path(LOW_WATER_FILE))?;
        let in_flight = read_json_or_default(&self.path(IN_FLIGHT_FILE))?;

        let mut state = ProgressState {
            low_water,
            settled,
            in_flight,
        };

        let stale = state.drop_stale_in_flight();
        if stale > 0 {
            tracing::info!(count = stale, "Dropped journal entries of settled deposits");
        }

        tracing::info!(
            settled = state.settled.len(),
            accounts = state.low_water.len(),
            in_flight = state.in_flight.len(),
            dir = %self.dir.display(),
            "Progress loaded"
        );

        Ok(state)
    }

    /// Settled set first: once it is on disk the deposit can never be swept
    /// again, whatever happens to the other two writes.
    fn commit(&self, state: &ProgressState) -> Result<(), StoreError> {
        write_json_atomic(&self.path(PROCESSED_FILE), &state.settled)?;
        write_json_atomic(&self.path(LOW_WATER_FILE), &state.low_water)?;
        write_json_atomic(&self.path(IN_FLIGHT_FILE), &state.in_flight)?;
        Ok(())
    }

    fn append_audit(&self, entry: &ResetAudit) -> Result<(), StoreError> {
        let path = self.path(RESET_AUDIT_FILE);
        let io_err = |source| StoreError::Io {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(&self.dir).map_err(io_err)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io_err)?;

        let line = serde_json::to_string(entry).map_err(|source| StoreError::Corrupt {
            path: path.clone(),
            source,
        })?;
        writeln!(file, "{}", line).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        Ok(())
    }
}

/// Load a JSON record; a missing file is the empty value
pub fn read_json_or_default<T>(path: &Path) -> Result<T, StoreError>
where
    T: DeserializeOwned + Default,
{
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    serde_json::from_reader(BufReader::new(file)).map_err(|source| StoreError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}

/// Replace `path` with the JSON encoding of `value`, atomically
///
/// 1. Write `.{name}.tmp` next to the target
/// 2. fsync the temp file
/// 3. Rename over the target
/// 4. fsync the directory so the rename itself is durable
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(io_err)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "record".to_string());
    let tmp_path = dir.join(format!(".{}.tmp", file_name));

    {
        let file = File::create(&tmp_path).map_err(io_err)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, value).map_err(|source| {
            StoreError::Corrupt {
                path: path.to_path_buf(),
                source,
            }
        })?;
        writer.flush().map_err(io_err)?;
        writer.get_ref().sync_all().map_err(io_err)?;
    }

    fs::rename(&tmp_path, path).map_err(io_err)?;

    #[cfg(unix)]
    {
        File::open(dir)
            .and_then(|d| d.sync_all())
            .map_err(io_err)?;
    }

    Ok(())
}
