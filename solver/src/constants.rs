//! Engine constants and defaults.
//!
//! Backing-file layout: value `i` lives at byte offset `i * BYTES_PER_VALUE`,
//! encoded as a big-endian IEEE-754 f64. There is no header.

/// Size of one stored value in bytes.
pub const BYTES_PER_VALUE: u64 = 8;

/// Size of the zero buffer used when pre-extending a backing file (1 MiB).
pub const ZERO_FILL_BUFFER_BYTES: usize = 1 << 20;

/// Default number of values per cache line (32 KiB per line).
pub const DEFAULT_LINE_LENGTH: usize = 4096;

/// Default number of resident cache lines (8 MiB of values at the default line length).
pub const DEFAULT_CACHE_LINES: usize = 256;

/// Default capacity of the producer/worker hand-off queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Queue length at or below which a stalled producer is woken.
pub const DEFAULT_QUEUE_LOW_WATER: usize = 512;

/// Default worker count when neither config nor environment says otherwise.
pub const DEFAULT_THREADS: usize = 8;

/// Iteration budget for the per-anchor fixed-point search.
///
/// Secant steps on the piecewise-linear turn equations normally land on the
/// fixed point in under ten evaluations; 30 is the safety bound.
pub const DEFAULT_MAX_ITERATIONS: u32 = 30;

/// First trial value for an anchor's own value.
pub const DEFAULT_INITIAL_ESTIMATE: f64 = 1.0;

/// Convergence tolerance on `|x - f(x)|`. Zero means exact equality.
pub const DEFAULT_TOLERANCE: f64 = 0.0;

/// Minimum seconds between two progress lines inside one layer.
pub const PROGRESS_REPORT_INTERVAL_SECS: f64 = 0.5;
