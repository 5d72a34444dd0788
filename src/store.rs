//! Persistence for instruction tables, history blobs and thresholds.
//!
//! Stores are keyed by username. Callers must not run two enroll/login
//! operations for the same user at once: a login reads, then rewrites, both
//! the table and the history with no version check.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::encoder::InstructionTable;
use crate::Error;

/// Reference value per feature; read-only configuration.
pub type ThresholdVector = Vec<f64>;

/// Backing storage for per-user state.
pub trait Store {
    /// Load the instruction table, `None` if the user is unknown.
    fn get_table(&self, username: &str) -> Result<Option<InstructionTable>, Error>;

    /// Replace the instruction table.
    fn put_table(&mut self, username: &str, table: &InstructionTable) -> Result<(), Error>;

    /// Remove the instruction table, if any.
    fn delete_table(&mut self, username: &str) -> Result<(), Error>;

    /// Load the encrypted history blob, `None` if absent.
    fn get_history(&self, username: &str) -> Result<Option<Vec<u8>>, Error>;

    /// Replace the encrypted history blob.
    fn put_history(&mut self, username: &str, blob: &[u8]) -> Result<(), Error>;

    /// Remove the history blob, if any.
    fn delete_history(&mut self, username: &str) -> Result<(), Error>;

    /// Threshold vector shared by all users.
    fn threshold_vector(&self) -> Result<ThresholdVector, Error>;

    /// Replace table and history together.
    ///
    /// On error neither is changed. The default writes the table first and
    /// puts the previous table back if the history write fails; stores that
    /// can stage both writes should override it.
    fn put_state(
        &mut self,
        username: &str,
        table: &InstructionTable,
        blob: &[u8],
    ) -> Result<(), Error> {
        let previous = self.get_table(username)?;
        self.put_table(username, table)?;
        if let Err(e) = self.put_history(username, blob) {
            let restored = match previous {
                Some(old) => self.put_table(username, &old),
                None => self.delete_table(username),
            };
            if let Err(restore) = restored {
                warn!(username = %username, error = %restore, "Could not restore table");
            }
            return Err(e);
        }
        Ok(())
    }
}

/// Parse a threshold vector: the first non-empty line, whitespace-separated.
pub fn parse_thresholds(text: &str) -> Result<ThresholdVector, Error> {
    let line = text
        .lines()
        .find(|line| !line.trim().is_empty())
        .ok_or_else(|| Error::InvalidInput("Threshold file is empty".into()))?;
    line.split_whitespace()
        .map(|field| {
            field
                .parse::<f64>()
                .map_err(|e| Error::InvalidInput(format!("Bad threshold {:?}: {}", field, e)))
        })
        .collect()
}

/// In-process store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    thresholds: ThresholdVector,
    tables: HashMap<String, InstructionTable>,
    histories: HashMap<String, Vec<u8>>,
}

impl MemoryStore {
    /// Empty store with the given thresholds.
    pub fn new(thresholds: ThresholdVector) -> Self {
        Self {
            thresholds,
            ..Self::default()
        }
    }

    /// Number of users with a table.
    pub fn user_count(&self) -> usize {
        self.tables.len()
    }
}

impl Store for MemoryStore {
    fn get_table(&self, username: &str) -> Result<Option<InstructionTable>, Error> {
        Ok(self.tables.get(username).cloned())
    }

    fn put_table(&mut self, username: &str, table: &InstructionTable) -> Result<(), Error> {
        self.tables.insert(username.to_string(), table.clone());
        Ok(())
    }

    fn delete_table(&mut self, username: &str) -> Result<(), Error> {
        self.tables.remove(username);
        Ok(())
    }

    fn get_history(&self, username: &str) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.histories.get(username).cloned())
    }

    fn put_history(&mut self, username: &str, blob: &[u8]) -> Result<(), Error> {
        self.histories.insert(username.to_string(), blob.to_vec());
        Ok(())
    }

    fn delete_history(&mut self, username: &str) -> Result<(), Error> {
        self.histories.remove(username);
        Ok(())
    }

    fn threshold_vector(&self) -> Result<ThresholdVector, Error> {
        Ok(self.thresholds.clone())
    }

    fn put_state(
        &mut self,
        username: &str,
        table: &InstructionTable,
        blob: &[u8],
    ) -> Result<(), Error> {
        self.tables.insert(username.to_string(), table.clone());
        self.histories.insert(username.to_string(), blob.to_vec());
        Ok(())
    }
}

/// Directory-backed store.
///
/// Layout: `<dir>/threshold`, `<dir>/<user>.table` (text rows) and
/// `<dir>/<user>.history` (ciphertext).
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Use `dir`, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, Error> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Root directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write the threshold file.
    pub fn write_thresholds(&self, thresholds: &[f64]) -> Result<(), Error> {
        let line = thresholds
            .iter()
            .map(f64::to_string)
            .collect::<Vec<_>>()
            .join(" ");
        fs::write(self.dir.join("threshold"), line + "\n")?;
        Ok(())
    }

    fn user_path(&self, username: &str, extension: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", username, extension))
    }
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, Error> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn remove_optional(path: &Path) -> Result<(), Error> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

/// Write through a temporary file so a table or blob is replaced whole.
fn write_replace(path: &Path, bytes: &[u8]) -> Result<(), Error> {
    let tmp = tmp_path(path);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

impl Store for FileStore {
    fn get_table(&self, username: &str) -> Result<Option<InstructionTable>, Error> {
        let Some(bytes) = read_optional(&self.user_path(username, "table"))? else {
            return Ok(None);
        };
        let text = String::from_utf8(bytes)
            .map_err(|_| Error::Storage(format!("Table for {} is not UTF-8", username)))?;
        InstructionTable::from_text(&text).map(Some)
    }

    fn put_table(&mut self, username: &str, table: &InstructionTable) -> Result<(), Error> {
        write_replace(&self.user_path(username, "table"), table.to_text().as_bytes())
    }

    fn delete_table(&mut self, username: &str) -> Result<(), Error> {
        remove_optional(&self.user_path(username, "table"))
    }

    fn get_history(&self, username: &str) -> Result<Option<Vec<u8>>, Error> {
        read_optional(&self.user_path(username, "history"))
    }

    fn put_history(&mut self, username: &str, blob: &[u8]) -> Result<(), Error> {
        write_replace(&self.user_path(username, "history"), blob)
    }

    fn delete_history(&mut self, username: &str) -> Result<(), Error> {
        remove_optional(&self.user_path(username, "history"))
    }

    /// Stages both files before renaming either. If the history rename
    /// fails the previous table file is written back.
    fn put_state(
        &mut self,
        username: &str,
        table: &InstructionTable,
        blob: &[u8],
    ) -> Result<(), Error> {
        let table_path = self.user_path(username, "table");
        let history_path = self.user_path(username, "history");
        let (table_tmp, history_tmp) = (tmp_path(&table_path), tmp_path(&history_path));

        let staged = fs::write(&table_tmp, table.to_text().as_bytes())
            .and_then(|()| fs::write(&history_tmp, blob));
        if let Err(e) = staged {
            remove_optional(&table_tmp)?;
            remove_optional(&history_tmp)?;
            return Err(e.into());
        }

        let previous = read_optional(&table_path)?;
        if let Err(e) = fs::rename(&table_tmp, &table_path) {
            remove_optional(&table_tmp)?;
            remove_optional(&history_tmp)?;
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&history_tmp, &history_path) {
            remove_optional(&history_tmp)?;
            let restored = match previous {
                Some(bytes) => write_replace(&table_path, &bytes),
                None => remove_optional(&table_path),
            };
            if let Err(restore) = restored {
                warn!(username = %username, error = %restore, "Could not restore table");
            }
            return Err(e.into());
        }
        Ok(())
    }

    fn threshold_vector(&self) -> Result<ThresholdVector, Error> {
        let path = self.dir.join("threshold");
        let text = fs::read_to_string(&path)?;
        parse_thresholds(&text)
    }
}
