//! Fully resident value store.
//!
//! One atomic slot per state holding the f64 bit pattern, so concurrent workers
//! read and write without a lock. Workers never write the same index from two
//! threads within a layer, and the layer barrier orders writes before the next
//! layer's reads, so relaxed ordering is enough.

use std::io::{BufReader, BufWriter, Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};

use super::{check_index, ValueStore};
use crate::constants::BYTES_PER_VALUE;
use crate::error::StoreError;

#[derive(Debug)]
pub struct MemoryStore {
    values: Vec<AtomicU64>,
}

impl MemoryStore {
    /// A store of `len` zeros.
    pub fn new(len: u64) -> Self {
        let zero = 0.0f64.to_bits();
        Self {
            values: (0..len).map(|_| AtomicU64::new(zero)).collect(),
        }
    }

    pub fn from_values(values: &[f64]) -> Self {
        Self {
            values: values.iter().map(|v| AtomicU64::new(v.to_bits())).collect(),
        }
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.values
            .into_iter()
            .map(|v| f64::from_bits(v.into_inner()))
            .collect()
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.values
            .iter()
            .map(|v| f64::from_bits(v.load(Ordering::Relaxed)))
            .collect()
    }
}

impl ValueStore for MemoryStore {
    fn len(&self) -> u64 {
        self.values.len() as u64
    }

    #[inline]
    fn get(&self, index: u64) -> Result<f64, StoreError> {
        check_index(index, self.len())?;
        Ok(f64::from_bits(self.values[index as usize].load(Ordering::Relaxed)))
    }

    #[inline]
    fn set(&self, index: u64, value: f64) -> Result<(), StoreError> {
        check_index(index, self.len())?;
        self.values[index as usize].store(value.to_bits(), Ordering::Relaxed);
        Ok(())
    }

    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn write_values(&self, out: &mut dyn Write) -> Result<(), StoreError> {
        let mut w = BufWriter::new(out);
        for v in &self.values {
            let bits = v.load(Ordering::Relaxed);
            w.write_all(&f64::from_bits(bits).to_be_bytes())
                .map_err(|e| StoreError::stream("write", e))?;
        }
        w.flush().map_err(|e| StoreError::stream("write", e))
    }

    fn read_values(&self, input: &mut dyn Read) -> Result<(), StoreError> {
        let mut r = BufReader::new(input);
        let mut buf = [0u8; BYTES_PER_VALUE as usize];
        for v in &self.values {
            r.read_exact(&mut buf)
                .map_err(|e| StoreError::stream("read", e))?;
            v.store(f64::from_be_bytes(buf).to_bits(), Ordering::Relaxed);
        }
        Ok(())
    }
}
