//! Error types shared across the store, the queue and the solve pipeline.
//!
//! Store and queue failures are fatal to a run and propagate to the caller.
//! Fixed-point iteration overruns are not errors; they are logged and counted
//! in the [`crate::pipeline::SolveReport`].

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to {op} value file {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to {op} value stream: {source}")]
    Stream {
        op: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("state index {index} out of range (store holds {len} states)")]
    IndexOutOfRange { index: u64, len: u64 },
    #[error("invalid cache geometry: {0}")]
    Geometry(String),
    #[error("snapshot {} holds {found} bytes, expected {expected}", path.display())]
    SnapshotSize {
        path: PathBuf,
        expected: u64,
        found: u64,
    },
}

impl StoreError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        StoreError::Io {
            op,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn stream(op: &'static str, source: io::Error) -> Self {
        StoreError::Stream { op, source }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("{op} called by a thread that is not the bound producer")]
    NotProducer { op: &'static str },
    #[error("queue already has a bound producer")]
    ProducerAlreadyBound,
    #[error("queue was aborted")]
    Aborted,
    #[error("queue already finished")]
    Finished,
    #[error("invalid queue bounds: {0}")]
    InvalidBounds(String),
}

#[derive(Debug, Error)]
pub enum SolveError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error("malformed turn graph for anchor {anchor}: {detail}")]
    TurnGraph { anchor: String, detail: String },
    #[error("invalid solver configuration: {0}")]
    Config(String),
    #[error("a solver thread panicked")]
    WorkerPanicked,
}
