//! JSON snapshots of a [`MemoryStore`].

use crate::error::{StorageError, StorageResult};
use crate::store::{MemoryStore, Table};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    version: u32,
    tables: BTreeMap<String, Table>,
}

impl MemoryStore {
    /// Writes the committed contents of the store to `path`.
    ///
    /// Changes of an open transaction are not included. The file is written
    /// next to its destination and renamed into place, so an interrupted
    /// save leaves any previous snapshot intact.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save_snapshot(&self, path: &Path) -> StorageResult<()> {
        let snapshot = SnapshotFile {
            version: SNAPSHOT_VERSION,
            tables: self.committed_tables(),
        };
        let staging = path.with_extension("tmp");
        {
            let mut writer = BufWriter::new(File::create(&staging)?);
            serde_json::to_writer(&mut writer, &snapshot)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&staging, path)?;
        tracing::debug!(path = %path.display(), tables = snapshot.tables.len(), "snapshot saved");
        Ok(())
    }

    /// Opens a store from a snapshot written by [`MemoryStore::save_snapshot`].
    ///
    /// # Errors
    ///
    /// Returns `Corrupted` for an unsupported version or inconsistent id
    /// sequences, and an I/O or encoding error if the file cannot be read.
    pub fn load_snapshot(path: &Path) -> StorageResult<Self> {
        let reader = BufReader::new(File::open(path)?);
        let snapshot: SnapshotFile = serde_json::from_reader(reader)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(StorageError::Corrupted(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }
        for (name, table) in &snapshot.tables {
            let highest = table
                .rows
                .iter()
                .filter_map(|r| r.get(&table.id_field).as_int())
                .max();
            if highest.is_some_and(|id| id > table.next_id) {
                return Err(StorageError::Corrupted(format!(
                    "table {name} holds ids beyond its sequence"
                )));
            }
        }
        tracing::debug!(path = %path.display(), tables = snapshot.tables.len(), "snapshot loaded");
        Ok(Self::from_tables(snapshot.tables))
    }
}
