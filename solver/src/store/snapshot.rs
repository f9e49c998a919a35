//! Whole-array snapshots of a value store.
//!
//! A snapshot is the [`ValueFile`](super::ValueFile) format on its own: `num_states`
//! big-endian f64, no header. Saving flushes the store first so the snapshot
//! includes every value written so far.
//!
//! Loading for analysis uses a zero-copy `memmap2` view instead of a store.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::time::Instant;

use memmap2::Mmap;

use super::{check_index, ValueStore};
use crate::constants::BYTES_PER_VALUE;
use crate::error::StoreError;
use crate::game::TurnGame;

/// Flush `store` and stream every value to a fresh file at `path`.
pub fn save_snapshot(store: &dyn ValueStore, path: impl AsRef<Path>) -> Result<(), StoreError> {
    let path = path.as_ref();
    let start = Instant::now();
    store.flush()?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| StoreError::io("create directory for", path, e))?;
    }
    let file = File::create(path).map_err(|e| StoreError::io("create", path, e))?;
    let mut out = BufWriter::with_capacity(1 << 20, file);
    store.write_values(&mut out)?;
    out.into_inner()
        .map_err(|e| StoreError::io("write", path, e.into_error()))?
        .sync_all()
        .map_err(|e| StoreError::io("sync", path, e))?;

    tracing::info!(
        path = %path.display(),
        values = store.len(),
        bytes = store.len() * BYTES_PER_VALUE,
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        "saved value snapshot"
    );
    Ok(())
}

/// Replace every value in `store` with the snapshot at `path`.
pub fn load_snapshot(store: &dyn ValueStore, path: impl AsRef<Path>) -> Result<(), StoreError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| StoreError::io("open", path, e))?;
    let found = file
        .metadata()
        .map_err(|e| StoreError::io("stat", path, e))?
        .len();
    let expected = store.len() * BYTES_PER_VALUE;
    if found != expected {
        return Err(StoreError::SnapshotSize {
            path: path.to_path_buf(),
            expected,
            found,
        });
    }
    let mut input = BufReader::with_capacity(1 << 20, file);
    store.read_values(&mut input)?;
    tracing::info!(path = %path.display(), values = store.len(), "loaded value snapshot");
    Ok(())
}

/// Read-only memory-mapped snapshot.
pub struct MappedValues {
    mmap: Mmap,
    num_states: u64,
}

impl MappedValues {
    pub fn open(path: impl AsRef<Path>, num_states: u64) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let start = Instant::now();
        let file = File::open(path).map_err(|e| StoreError::io("open", path, e))?;
        let found = file
            .metadata()
            .map_err(|e| StoreError::io("stat", path, e))?
            .len();
        let expected = num_states * BYTES_PER_VALUE;
        if found != expected {
            return Err(StoreError::SnapshotSize {
                path: path.to_path_buf(),
                expected,
                found,
            });
        }
        // SAFETY: the map is read-only and the snapshot is not rewritten while
        // a view is open.
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| StoreError::io("map", path, e))?;
        tracing::debug!(
            path = %path.display(),
            num_states,
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "mapped value snapshot"
        );
        Ok(Self { mmap, num_states })
    }

    #[inline]
    pub fn len(&self) -> u64 {
        self.num_states
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_states == 0
    }

    #[inline]
    pub fn get(&self, index: u64) -> Result<f64, StoreError> {
        check_index(index, self.num_states)?;
        let at = (index * BYTES_PER_VALUE) as usize;
        let mut raw = [0u8; BYTES_PER_VALUE as usize];
        raw.copy_from_slice(&self.mmap[at..at + BYTES_PER_VALUE as usize]);
        Ok(f64::from_be_bytes(raw))
    }

    pub fn value_of<G: TurnGame>(&self, game: &G, state: &G::State) -> Result<f64, StoreError> {
        self.get(game.index_of(state))
    }
}
