//! The backing value file and the uncached store built directly on it.
//!
//! Format: `num_states` big-endian f64 values, value `i` at byte `8 * i`, no
//! header. Opening a file that is too short zero-fills the missing tail;
//! opening with `initialize` zero-fills the whole value region. Both use one
//! large zero buffer rather than per-value writes.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::{check_index, ValueStore};
use crate::constants::{BYTES_PER_VALUE, ZERO_FILL_BUFFER_BYTES};
use crate::error::StoreError;

/// Raw positional access to a value file. Not synchronized; stores wrap it in a lock.
pub struct ValueFile {
    file: File,
    path: PathBuf,
    num_states: u64,
    scratch: Vec<u8>,
}

impl ValueFile {
    pub fn open(
        path: impl AsRef<Path>,
        num_states: u64,
        initialize: bool,
    ) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let _span = tracing::debug_span!("ValueFile::open", path = %path.display(), num_states)
            .entered();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StoreError::io("create directory for", &path, e))?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| StoreError::io("open", &path, e))?;

        let mut vf = Self {
            file,
            path,
            num_states,
            scratch: Vec::new(),
        };

        let needed = num_states * BYTES_PER_VALUE;
        let existing = vf
            .file
            .metadata()
            .map_err(|e| StoreError::io("stat", &vf.path, e))?
            .len();
        if initialize {
            vf.zero_fill(0, needed)?;
        } else if existing < needed {
            tracing::info!(
                path = %vf.path.display(),
                existing,
                needed,
                "value file shorter than state count, zero-extending"
            );
            vf.zero_fill(existing, needed)?;
        }
        Ok(vf)
    }

    fn zero_fill(&mut self, from: u64, to: u64) -> Result<(), StoreError> {
        if from >= to {
            return Ok(());
        }
        let zeros = vec![0u8; ZERO_FILL_BUFFER_BYTES];
        self.file
            .seek(SeekFrom::Start(from))
            .map_err(|e| StoreError::io("seek", &self.path, e))?;
        let mut remaining = to - from;
        while remaining > 0 {
            let chunk = remaining.min(zeros.len() as u64) as usize;
            self.file
                .write_all(&zeros[..chunk])
                .map_err(|e| StoreError::io("zero-fill", &self.path, e))?;
            remaining -= chunk as u64;
        }
        Ok(())
    }

    #[inline]
    pub fn num_states(&self) -> u64 {
        self.num_states
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read `out.len()` consecutive values starting at index `first`.
    pub fn read_block(&mut self, first: u64, out: &mut [f64]) -> Result<(), StoreError> {
        let bytes = out.len() * BYTES_PER_VALUE as usize;
        self.scratch.resize(bytes, 0);
        self.file
            .seek(SeekFrom::Start(first * BYTES_PER_VALUE))
            .map_err(|e| StoreError::io("seek", &self.path, e))?;
        self.file
            .read_exact(&mut self.scratch)
            .map_err(|e| StoreError::io("read", &self.path, e))?;
        let mut raw = [0u8; BYTES_PER_VALUE as usize];
        for (v, chunk) in out.iter_mut().zip(self.scratch.chunks_exact(raw.len())) {
            raw.copy_from_slice(chunk);
            *v = f64::from_be_bytes(raw);
        }
        Ok(())
    }

    /// Write `values` to consecutive indices starting at `first`.
    pub fn write_block(&mut self, first: u64, values: &[f64]) -> Result<(), StoreError> {
        self.scratch.clear();
        for v in values {
            self.scratch.extend_from_slice(&v.to_be_bytes());
        }
        self.file
            .seek(SeekFrom::Start(first * BYTES_PER_VALUE))
            .map_err(|e| StoreError::io("seek", &self.path, e))?;
        self.file
            .write_all(&self.scratch)
            .map_err(|e| StoreError::io("write", &self.path, e))
    }

    pub fn read_value(&mut self, index: u64) -> Result<f64, StoreError> {
        let mut v = [0.0];
        self.read_block(index, &mut v)?;
        Ok(v[0])
    }

    pub fn write_value(&mut self, index: u64, value: f64) -> Result<(), StoreError> {
        self.write_block(index, &[value])
    }

    /// Stream the whole value region to `out`.
    pub fn copy_to(&mut self, out: &mut dyn Write) -> Result<(), StoreError> {
        let needed = self.num_states * BYTES_PER_VALUE;
        self.file
            .seek(SeekFrom::Start(0))
            .map_err(|e| StoreError::io("seek", &self.path, e))?;
        let copied = io::copy(&mut (&mut self.file).take(needed), out)
            .map_err(|e| StoreError::io("copy out of", &self.path, e))?;
        if copied != needed {
            return Err(StoreError::io(
                "copy out of",
                &self.path,
                io::Error::new(io::ErrorKind::UnexpectedEof, "value file truncated"),
            ));
        }
        out.flush().map_err(|e| StoreError::stream("write", e))
    }

    /// Overwrite the whole value region from `input`.
    pub fn copy_from(&mut self, input: &mut dyn Read) -> Result<(), StoreError> {
        let needed = self.num_states * BYTES_PER_VALUE;
        self.file
            .seek(SeekFrom::Start(0))
            .map_err(|e| StoreError::io("seek", &self.path, e))?;
        let copied = io::copy(&mut input.take(needed), &mut self.file)
            .map_err(|e| StoreError::io("copy into", &self.path, e))?;
        if copied != needed {
            return Err(StoreError::stream(
                "read",
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("stream ended after {copied} of {needed} bytes"),
                ),
            ));
        }
        Ok(())
    }

    pub fn sync(&self) -> Result<(), StoreError> {
        self.file
            .sync_data()
            .map_err(|e| StoreError::io("sync", &self.path, e))
    }
}

/// Uncached file store: every access seeks the backing file.
pub struct DirectFileStore {
    file: Mutex<ValueFile>,
    num_states: u64,
}

impl DirectFileStore {
    pub fn open(
        path: impl AsRef<Path>,
        num_states: u64,
        initialize: bool,
    ) -> Result<Self, StoreError> {
        Ok(Self {
            file: Mutex::new(ValueFile::open(path, num_states, initialize)?),
            num_states,
        })
    }
}

impl ValueStore for DirectFileStore {
    fn len(&self) -> u64 {
        self.num_states
    }

    fn get(&self, index: u64) -> Result<f64, StoreError> {
        check_index(index, self.num_states)?;
        self.file.lock().read_value(index)
    }

    fn set(&self, index: u64, value: f64) -> Result<(), StoreError> {
        check_index(index, self.num_states)?;
        self.file.lock().write_value(index, value)
    }

    fn flush(&self) -> Result<(), StoreError> {
        self.file.lock().sync()
    }

    fn write_values(&self, out: &mut dyn Write) -> Result<(), StoreError> {
        self.file.lock().copy_to(out)
    }

    fn read_values(&self, input: &mut dyn Read) -> Result<(), StoreError> {
        self.file.lock().copy_from(input)
    }
}
