//! State-value storage.
//!
//! Every back end implements [`ValueStore`]: a thread-safe `index -> f64` map
//! with write-back semantics. Pick by size:
//!
//! | Back end | Residency | Use |
//! |----------|-----------|-----|
//! | [`MemoryStore`] | all values in RAM | small games, tests |
//! | [`DirectFileStore`] | none, one seek per access | tiny RAM budgets, verification |
//! | [`CachedFileStore`] | `num_lines × line_length` values | large games |
//!
//! File-backed stores share the [`ValueFile`] layout: big-endian f64 per index,
//! no header. [`snapshot`] moves whole value arrays between stores and files.

pub mod cache;
pub mod file;
pub mod memory;
pub mod policy;
pub mod snapshot;

use std::io::{Read, Write};

use crate::error::StoreError;
use crate::game::TurnGame;

pub use cache::{CacheGeometry, CacheStats, CachedFileStore};
pub use file::{DirectFileStore, ValueFile};
pub use memory::MemoryStore;
pub use policy::{
    FarthestLine, LeastRecentlyUsed, LineView, NearestLine, ReplacementPolicy, RoundRobin,
};
pub use snapshot::{load_snapshot, save_snapshot, MappedValues};

pub trait ValueStore: Send + Sync {
    /// Number of indices the store holds.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, index: u64) -> Result<f64, StoreError>;

    fn set(&self, index: u64, value: f64) -> Result<(), StoreError>;

    /// Write back everything not yet on durable storage.
    fn flush(&self) -> Result<(), StoreError>;

    /// Stream every value, in index order, as big-endian f64.
    fn write_values(&self, out: &mut dyn Write) -> Result<(), StoreError>;

    /// Replace every value from a stream in the [`ValueStore::write_values`] format.
    fn read_values(&self, input: &mut dyn Read) -> Result<(), StoreError>;

    /// Value of a game state.
    fn value_of<G: TurnGame>(&self, game: &G, state: &G::State) -> Result<f64, StoreError>
    where
        Self: Sized,
    {
        self.get(game.index_of(state))
    }
}

#[inline]
pub(crate) fn check_index(index: u64, len: u64) -> Result<(), StoreError> {
    if index < len {
        Ok(())
    } else {
        Err(StoreError::IndexOutOfRange { index, len })
    }
}

impl<S: ValueStore + ?Sized> ValueStore for &S {
    fn len(&self) -> u64 {
        (**self).len()
    }

    fn get(&self, index: u64) -> Result<f64, StoreError> {
        (**self).get(index)
    }

    fn set(&self, index: u64, value: f64) -> Result<(), StoreError> {
        (**self).set(index, value)
    }

    fn flush(&self) -> Result<(), StoreError> {
        (**self).flush()
    }

    fn write_values(&self, out: &mut dyn Write) -> Result<(), StoreError> {
        (**self).write_values(out)
    }

    fn read_values(&self, input: &mut dyn Read) -> Result<(), StoreError> {
        (**self).read_values(input)
    }
}
