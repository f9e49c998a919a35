//! Per-layer anchor census and throttled progress logging.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use rayon::prelude::*;

use crate::constants::PROGRESS_REPORT_INTERVAL_SECS;
use crate::game::TurnGame;

/// Anchor count of every layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayerCensus {
    pub per_layer: Vec<u64>,
    pub total: u64,
}

impl LayerCensus {
    /// Count anchors per layer, layers in parallel.
    pub fn take<G: TurnGame>(game: &G) -> Self {
        let per_layer: Vec<u64> = (0..game.layer_count())
            .into_par_iter()
            .map(|layer| game.anchors(layer).count() as u64)
            .collect();
        let total = per_layer.iter().sum();
        Self { per_layer, total }
    }
}

/// Tracks completed anchors across the run and logs at most every
/// [`PROGRESS_REPORT_INTERVAL_SECS`].
pub struct Progress {
    census: LayerCensus,
    completed: AtomicU64,
    start_time: Instant,
    last_report: Mutex<Instant>,
}

impl Progress {
    pub fn new(census: LayerCensus) -> Self {
        let now = Instant::now();
        Self {
            census,
            completed: AtomicU64::new(0),
            start_time: now,
            last_report: Mutex::new(now),
        }
    }

    pub fn census(&self) -> &LayerCensus {
        &self.census
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Count one finished anchor; called from worker threads.
    pub fn anchor_done(&self, layer: usize) {
        let completed = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
        // skip instead of queueing behind another reporter
        let Some(mut last) = self.last_report.try_lock() else {
            return;
        };
        let now = Instant::now();
        if now.duration_since(*last).as_secs_f64() < PROGRESS_REPORT_INTERVAL_SECS {
            return;
        }
        *last = now;
        drop(last);

        let (rate, eta) = self.rate_and_eta(completed);
        tracing::info!(
            layer,
            completed,
            total = self.census.total,
            pct = format_args!("{:.1}", self.percent(completed)),
            rate = format_args!("{rate:.0}"),
            eta_s = format_args!("{eta:.1}"),
            "solving"
        );
    }

    /// Log a finished layer.
    pub fn layer_done(&self, layer: usize, layer_seconds: f64) {
        let completed = self.completed();
        let (rate, eta) = self.rate_and_eta(completed);
        tracing::info!(
            layer,
            anchors = self.census.per_layer.get(layer).copied().unwrap_or(0),
            layer_s = format_args!("{layer_seconds:.3}"),
            elapsed_s = format_args!("{:.1}", self.start_time.elapsed().as_secs_f64()),
            pct = format_args!("{:.1}", self.percent(completed)),
            rate = format_args!("{rate:.0}"),
            eta_s = format_args!("{eta:.1}"),
            "layer complete"
        );
    }

    fn percent(&self, completed: u64) -> f64 {
        if self.census.total == 0 {
            100.0
        } else {
            completed as f64 / self.census.total as f64 * 100.0
        }
    }

    /// Anchors per second so far, and seconds left at that rate.
    fn rate_and_eta(&self, completed: u64) -> (f64, f64) {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if completed == 0 || elapsed <= 0.0 {
            return (0.0, 0.0);
        }
        let rate = completed as f64 / elapsed;
        let left = self.census.total.saturating_sub(completed);
        (rate, left as f64 / rate)
    }
}
