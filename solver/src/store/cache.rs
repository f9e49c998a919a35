//! Line-mapped write-back cache over a [`ValueFile`].
//!
//! ## Layout
//!
//! Index `i` belongs to file block `line = i / line_length` at
//! `offset = i % line_length`. A fixed set of slots holds resident blocks; a
//! `line -> slot` map finds them. A miss takes the first empty slot, or asks the
//! [`ReplacementPolicy`] for a victim, writes the victim back if dirty, loads
//! the wanted block and remaps. At most one slot ever holds a given line.
//!
//! ## Locking
//!
//! One mutex guards the slot table, the map and the file handle together, so
//! lookups, loads and evictions from concurrent workers never interleave.
//! I/O errors are returned, never replaced by a zero.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;

use parking_lot::Mutex;

use super::file::ValueFile;
use super::policy::{LeastRecentlyUsed, LineView, ReplacementPolicy};
use super::{check_index, ValueStore};
use crate::error::StoreError;

/// Shape of a cached store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheGeometry {
    pub num_states: u64,
    /// Values per cache line.
    pub line_length: usize,
    /// Resident cache lines.
    pub num_lines: usize,
}

impl CacheGeometry {
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.line_length == 0 {
            return Err(StoreError::Geometry("line_length must be at least 1".into()));
        }
        if self.num_lines == 0 {
            return Err(StoreError::Geometry("num_lines must be at least 1".into()));
        }
        Ok(())
    }

    /// Number of file blocks, counting a partial final block.
    pub fn total_lines(&self) -> u64 {
        self.num_states.div_ceil(self.line_length as u64)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub write_backs: u64,
}

struct CacheLine {
    line: Option<u64>,
    dirty: bool,
    last_used: u64,
    data: Box<[f64]>,
}

struct CacheTable<P> {
    file: ValueFile,
    geometry: CacheGeometry,
    slots: Vec<CacheLine>,
    line_map: HashMap<u64, usize>,
    policy: P,
    clock: u64,
    stats: CacheStats,
    views: Vec<LineView>,
}

impl<P: ReplacementPolicy> CacheTable<P> {
    /// Values actually stored in `line` (the final line may be partial).
    fn line_span(&self, line: u64) -> usize {
        let first = line * self.geometry.line_length as u64;
        (self.geometry.num_states - first).min(self.geometry.line_length as u64) as usize
    }

    /// Slot holding the block for `index`, loading it on a miss.
    fn find(&mut self, index: u64) -> Result<(usize, usize), StoreError> {
        let line_len = self.geometry.line_length as u64;
        let line = index / line_len;
        let offset = (index % line_len) as usize;
        self.clock += 1;

        if let Some(&slot) = self.line_map.get(&line) {
            self.stats.hits += 1;
            self.slots[slot].last_used = self.clock;
            return Ok((slot, offset));
        }

        self.stats.misses += 1;
        let slot = self.replace_slot(line)?;
        let span = self.line_span(line);
        let data = &mut self.slots[slot].data;
        self.file.read_block(line * line_len, &mut data[..span])?;
        data[span..].fill(0.0);

        if let Some(old) = self.slots[slot].line.replace(line) {
            self.line_map.remove(&old);
        }
        self.line_map.insert(line, slot);
        self.slots[slot].dirty = false;
        self.slots[slot].last_used = self.clock;
        Ok((slot, offset))
    }

    /// Free a slot for `wanted`: an empty one if any, else the policy's victim
    /// after writing it back.
    fn replace_slot(&mut self, wanted: u64) -> Result<usize, StoreError> {
        if let Some(empty) = self.slots.iter().position(|s| s.line.is_none()) {
            tracing::trace!(slot = empty, line = wanted, "filling empty cache slot");
            return Ok(empty);
        }

        self.views.clear();
        self.views.extend(self.slots.iter().map(|s| LineView {
            line: s.line.unwrap_or(u64::MAX),
            dirty: s.dirty,
            last_used: s.last_used,
        }));
        let victim = self.policy.choose_victim(&self.views, wanted);
        assert!(
            victim < self.slots.len(),
            "replacement policy chose slot {victim} of {}",
            self.slots.len()
        );

        self.stats.evictions += 1;
        if self.slots[victim].dirty {
            self.write_back(victim)?;
        }
        Ok(victim)
    }

    fn write_back(&mut self, slot: usize) -> Result<(), StoreError> {
        let Some(line) = self.slots[slot].line else {
            return Ok(());
        };
        let span = self.line_span(line);
        let first = line * self.geometry.line_length as u64;
        self.file.write_block(first, &self.slots[slot].data[..span])?;
        self.slots[slot].dirty = false;
        self.stats.write_backs += 1;
        Ok(())
    }

    fn flush_all(&mut self) -> Result<(), StoreError> {
        let mut dirty: Vec<(u64, usize)> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.dirty)
            .filter_map(|(slot, s)| s.line.map(|l| (l, slot)))
            .collect();
        dirty.sort_unstable();
        for (_, slot) in dirty {
            self.write_back(slot)?;
        }
        Ok(())
    }

    /// Forget every resident line without writing it back.
    fn invalidate(&mut self) {
        for s in &mut self.slots {
            s.line = None;
            s.dirty = false;
        }
        self.line_map.clear();
    }
}

/// Paged value store: a bounded number of file blocks resident at a time.
pub struct CachedFileStore<P = LeastRecentlyUsed> {
    geometry: CacheGeometry,
    table: Mutex<CacheTable<P>>,
}

impl CachedFileStore<LeastRecentlyUsed> {
    /// Open with the default least-recently-used policy.
    pub fn open_lru(
        path: impl AsRef<Path>,
        geometry: CacheGeometry,
        initialize: bool,
    ) -> Result<Self, StoreError> {
        Self::open(path, geometry, initialize, LeastRecentlyUsed)
    }
}

impl<P: ReplacementPolicy> CachedFileStore<P> {
    pub fn open(
        path: impl AsRef<Path>,
        geometry: CacheGeometry,
        initialize: bool,
        policy: P,
    ) -> Result<Self, StoreError> {
        geometry.validate()?;
        let file = ValueFile::open(path, geometry.num_states, initialize)?;
        let slots = (0..geometry.num_lines)
            .map(|_| CacheLine {
                line: None,
                dirty: false,
                last_used: 0,
                data: vec![0.0; geometry.line_length].into_boxed_slice(),
            })
            .collect();
        tracing::debug!(
            path = %file.path().display(),
            num_states = geometry.num_states,
            line_length = geometry.line_length,
            num_lines = geometry.num_lines,
            total_lines = geometry.total_lines(),
            "opened cached value store"
        );
        Ok(Self {
            geometry,
            table: Mutex::new(CacheTable {
                file,
                geometry,
                slots,
                line_map: HashMap::with_capacity(geometry.num_lines),
                policy,
                clock: 0,
                stats: CacheStats::default(),
                views: Vec::with_capacity(geometry.num_lines),
            }),
        })
    }

    pub fn geometry(&self) -> CacheGeometry {
        self.geometry
    }

    pub fn stats(&self) -> CacheStats {
        self.table.lock().stats
    }

    /// Resident line ids, ascending.
    pub fn resident_lines(&self) -> Vec<u64> {
        let table = self.table.lock();
        let mut lines: Vec<u64> = table.line_map.keys().copied().collect();
        lines.sort_unstable();
        lines
    }
}

impl<P: ReplacementPolicy> ValueStore for CachedFileStore<P> {
    fn len(&self) -> u64 {
        self.geometry.num_states
    }

    fn get(&self, index: u64) -> Result<f64, StoreError> {
        check_index(index, self.geometry.num_states)?;
        let mut table = self.table.lock();
        let (slot, offset) = table.find(index)?;
        Ok(table.slots[slot].data[offset])
    }

    fn set(&self, index: u64, value: f64) -> Result<(), StoreError> {
        check_index(index, self.geometry.num_states)?;
        let mut table = self.table.lock();
        let (slot, offset) = table.find(index)?;
        let line = &mut table.slots[slot];
        line.data[offset] = value;
        line.dirty = true;
        Ok(())
    }

    fn flush(&self) -> Result<(), StoreError> {
        let mut table = self.table.lock();
        let _span = tracing::debug_span!("CachedFileStore::flush").entered();
        table.flush_all()?;
        table.file.sync()
    }

    fn write_values(&self, out: &mut dyn Write) -> Result<(), StoreError> {
        let mut table = self.table.lock();
        table.flush_all()?;
        table.file.copy_to(out)
    }

    fn read_values(&self, input: &mut dyn Read) -> Result<(), StoreError> {
        let mut table = self.table.lock();
        table.invalidate();
        table.file.copy_from(input)
    }
}
