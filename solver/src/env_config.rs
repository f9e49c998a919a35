//! Solver configuration and the environment reads shared by the binaries.
//!
//! Resolution order: [`SolverConfig::default`], then the JSON file named by
//! `RETRO_CONFIG` (missing keys keep their defaults), then individual `RETRO_*`
//! variables. Thread count falls back to `RAYON_NUM_THREADS` and
//! `OMP_NUM_THREADS` when `RETRO_THREADS` is unset.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::SolveError;
use crate::fixed_point::FixedPointConfig;
use crate::pipeline::Driver;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Worker threads (queue consumers, or rayon pool size).
    pub threads: usize,
    pub driver: Driver,
    pub queue_capacity: usize,
    /// A stalled producer resumes once the queue drains to this length.
    pub queue_low_water: usize,
    /// Values per cache line for file-backed stores.
    pub line_length: usize,
    pub cache_lines: usize,
    pub initial_estimate: f64,
    pub max_iterations: u32,
    pub tolerance: f64,
    /// Solve one of each mirrored anchor pair and copy the value to the twin.
    pub use_symmetry: bool,
    /// Flush the store after every layer barrier.
    pub flush_each_layer: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            threads: DEFAULT_THREADS,
            driver: Driver::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            queue_low_water: DEFAULT_QUEUE_LOW_WATER,
            line_length: DEFAULT_LINE_LENGTH,
            cache_lines: DEFAULT_CACHE_LINES,
            initial_estimate: DEFAULT_INITIAL_ESTIMATE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tolerance: DEFAULT_TOLERANCE,
            use_symmetry: true,
            flush_each_layer: false,
        }
    }
}

impl SolverConfig {
    /// Defaults, overlaid with `RETRO_CONFIG` and `RETRO_*` variables.
    pub fn from_env() -> Result<Self, SolveError> {
        let mut cfg = match std::env::var_os("RETRO_CONFIG") {
            Some(path) => Self::from_json_file(Path::new(&path))?,
            None => Self::default(),
        };

        if let Some(threads) = env_threads()? {
            cfg.threads = threads;
        }
        if let Some(v) = env_parse("RETRO_CACHE_LINES")? {
            cfg.cache_lines = v;
        }
        if let Some(v) = env_parse("RETRO_LINE_LENGTH")? {
            cfg.line_length = v;
        }
        if let Some(v) = env_parse("RETRO_MAX_ITERATIONS")? {
            cfg.max_iterations = v;
        }
        if let Some(v) = env_parse("RETRO_TOLERANCE")? {
            cfg.tolerance = v;
        }
        if let Some(v) = env_flag("RETRO_FLUSH_EACH_LAYER")? {
            cfg.flush_each_layer = v;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, SolveError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| SolveError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json(&text)
            .map_err(|e| SolveError::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_json(text: &str) -> Result<Self, SolveError> {
        serde_json::from_str(text).map_err(|e| SolveError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), SolveError> {
        let fail = |msg: String| Err(SolveError::Config(msg));
        if self.threads == 0 {
            return fail("threads must be at least 1".into());
        }
        if self.queue_capacity == 0 {
            return fail("queue_capacity must be at least 1".into());
        }
        if self.queue_low_water >= self.queue_capacity {
            return fail(format!(
                "queue_low_water ({}) must be below queue_capacity ({})",
                self.queue_low_water, self.queue_capacity
            ));
        }
        if self.line_length == 0 || self.cache_lines == 0 {
            return fail("line_length and cache_lines must be at least 1".into());
        }
        if self.max_iterations == 0 {
            return fail("max_iterations must be at least 1".into());
        }
        if self.tolerance.is_nan() || self.tolerance < 0.0 {
            return fail(format!("tolerance must be non-negative, got {}", self.tolerance));
        }
        if !self.initial_estimate.is_finite() {
            return fail("initial_estimate must be finite".into());
        }
        Ok(())
    }

    pub fn fixed_point(&self) -> FixedPointConfig {
        FixedPointConfig {
            initial_estimate: self.initial_estimate,
            max_iterations: self.max_iterations,
            tolerance: self.tolerance,
        }
    }
}

pub(crate) fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>, SolveError>
where
    T::Err: std::fmt::Display,
{
    first_parsed(&[name], |n| std::env::var(n).ok())
}

/// Parse the first variable in `names` that is set. Later names are not read.
fn first_parsed<T: FromStr>(
    names: &[&str],
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Option<T>, SolveError>
where
    T::Err: std::fmt::Display,
{
    for &name in names {
        if let Some(raw) = lookup(name) {
            return raw
                .trim()
                .parse()
                .map(Some)
                .map_err(|e| SolveError::Config(format!("{name}={raw:?}: {e}")));
        }
    }
    Ok(None)
}

const THREAD_VARS: [&str; 3] = ["RETRO_THREADS", "RAYON_NUM_THREADS", "OMP_NUM_THREADS"];

fn env_threads() -> Result<Option<usize>, SolveError> {
    first_parsed(&THREAD_VARS, |n| std::env::var(n).ok())
}

fn env_flag(name: &str) -> Result<Option<bool>, SolveError> {
    match std::env::var(name) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" | "" => Ok(Some(false)),
            _ => Err(SolveError::Config(format!("{name}={raw:?} is not a boolean"))),
        },
        Err(_) => Ok(None),
    }
}

/// Read `RETRO_BASE_PATH` (default `"."`) and make it the working directory.
pub fn init_base_path() -> Result<PathBuf, SolveError> {
    let base_path = std::env::var("RETRO_BASE_PATH").unwrap_or_else(|_| ".".to_string());
    let path = PathBuf::from(&base_path);
    std::env::set_current_dir(&path)
        .map_err(|e| SolveError::Config(format!("cannot change directory to {base_path}: {e}")))?;
    if let Ok(cwd) = std::env::current_dir() {
        tracing::info!(base_path = %base_path, cwd = %cwd.display(), "working directory set");
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = SolverConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.threads, 8);
        assert_eq!(cfg.driver, Driver::StagedQueue);
        assert_eq!(cfg.fixed_point(), FixedPointConfig::default());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg =
            SolverConfig::from_json(r#"{ "threads": 2, "driver": "rayon", "tolerance": 1e-12 }"#)
                .unwrap();
        assert_eq!(cfg.threads, 2);
        assert_eq!(cfg.driver, Driver::Rayon);
        assert_eq!(cfg.tolerance, 1e-12);
        assert_eq!(cfg.cache_lines, DEFAULT_CACHE_LINES);
        assert!(cfg.use_symmetry);
    }

    #[test]
    fn bad_bounds_are_rejected() {
        let cfg = SolverConfig {
            queue_capacity: 4,
            queue_low_water: 4,
            ..SolverConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(SolveError::Config(_))));

        let cfg = SolverConfig {
            tolerance: f64::NAN,
            ..SolverConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn unknown_driver_is_a_config_error() {
        assert!(SolverConfig::from_json(r#"{ "driver": "gpu" }"#).is_err());
    }

    #[test]
    fn thread_fallbacks_are_read_only_when_unset() {
        let env = |pairs: &'static [(&'static str, &'static str)]| {
            move |name: &str| {
                pairs
                    .iter()
                    .find(|(k, _)| *k == name)
                    .map(|(_, v)| v.to_string())
            }
        };

        let set = env(&[("RETRO_THREADS", "3"), ("RAYON_NUM_THREADS", "lots")]);
        assert_eq!(first_parsed::<usize>(&THREAD_VARS, set).unwrap(), Some(3));

        let fallback = env(&[("OMP_NUM_THREADS", "5")]);
        assert_eq!(first_parsed::<usize>(&THREAD_VARS, fallback).unwrap(), Some(5));

        let broken = env(&[("RAYON_NUM_THREADS", "lots"), ("OMP_NUM_THREADS", "5")]);
        assert!(matches!(
            first_parsed::<usize>(&THREAD_VARS, broken),
            Err(SolveError::Config(_))
        ));

        assert_eq!(first_parsed::<usize>(&THREAD_VARS, env(&[])).unwrap(), None);
    }
}
