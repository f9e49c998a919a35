//! Layer-by-layer retrograde sweep over every anchor of a game.
//!
//! Layers are solved in increasing order; every anchor in layer `k` reads only
//! final values and anchors of layers `< k`, so anchors within one layer are
//! independent and run in parallel. Two drivers share the per-anchor step:
//!
//! - [`Driver::StagedQueue`]: the calling thread enumerates anchors into a
//!   bounded [`StagedQueue`]; `threads` scoped workers consume it. The layer
//!   barrier is [`StagedQueue::end_stage`].
//! - [`Driver::Rayon`]: each layer is a `par_bridge` sweep on a dedicated pool;
//!   the end of the parallel loop is the barrier.
//!
//! Both produce bit-identical stores for any thread count: an anchor's value
//! depends only on lower layers, never on scheduling.

pub mod progress;
pub mod staged_queue;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::env_config::SolverConfig;
use crate::error::{SolveError, StoreError};
use crate::fixed_point::{Convergence, FixedPointConfig};
use crate::game::TurnGame;
use crate::store::{MemoryStore, ValueStore};
use crate::turn::solve_anchor;

pub use progress::{LayerCensus, Progress};
pub use staged_queue::{QueuePhase, StagedQueue};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Driver {
    #[default]
    StagedQueue,
    Rayon,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct LayerReport {
    pub layer: usize,
    pub anchors: u64,
    /// Anchors whose turn graph was solved.
    pub solved: u64,
    /// Anchors filled in from their mirrored twin.
    pub mirrored: u64,
    pub terminal: u64,
    pub unreachable: u64,
    /// Fixed-point evaluations summed over solved anchors.
    pub iterations: u64,
    pub max_iterations: u32,
    pub iteration_limit_hits: u64,
    pub seconds: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SolveReport {
    pub driver: Driver,
    pub threads: usize,
    pub num_states: u64,
    pub anchors: u64,
    pub solved: u64,
    pub mirrored: u64,
    pub terminal: u64,
    pub unreachable: u64,
    pub iterations: u64,
    pub iteration_limit_hits: u64,
    pub seconds: f64,
    pub layers: Vec<LayerReport>,
}

impl SolveReport {
    fn push_layer(&mut self, layer: LayerReport) {
        self.anchors += layer.anchors;
        self.solved += layer.solved;
        self.mirrored += layer.mirrored;
        self.terminal += layer.terminal;
        self.unreachable += layer.unreachable;
        self.iterations += layer.iterations;
        self.iteration_limit_hits += layer.iteration_limit_hits;
        self.layers.push(layer);
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::io("create directory for", path, e))?;
        }
        let file = File::create(path).map_err(|e| StoreError::io("create", path, e))?;
        let mut out = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut out, self)
            .map_err(|e| StoreError::io("write report", path, e.into()))?;
        out.flush()
            .map_err(|e| StoreError::io("write report", path, e))
    }
}

/// Lock-free per-layer tallies, taken and reset at every layer barrier.
#[derive(Default)]
struct LayerCounters {
    anchors: AtomicU64,
    solved: AtomicU64,
    mirrored: AtomicU64,
    terminal: AtomicU64,
    unreachable: AtomicU64,
    iterations: AtomicU64,
    max_iterations: AtomicU32,
    iteration_limit_hits: AtomicU64,
}

impl LayerCounters {
    fn take(&self, layer: usize, seconds: f64) -> LayerReport {
        let take = |c: &AtomicU64| c.swap(0, Ordering::Relaxed);
        LayerReport {
            layer,
            anchors: take(&self.anchors),
            solved: take(&self.solved),
            mirrored: take(&self.mirrored),
            terminal: take(&self.terminal),
            unreachable: take(&self.unreachable),
            iterations: take(&self.iterations),
            max_iterations: self.max_iterations.swap(0, Ordering::Relaxed),
            iteration_limit_hits: take(&self.iteration_limit_hits),
            seconds,
        }
    }
}

/// Everything a worker needs, shared by reference across threads.
struct Sweep<'a, G, V: ?Sized> {
    game: &'a G,
    store: &'a V,
    use_symmetry: bool,
    fixed_point: FixedPointConfig,
    counters: LayerCounters,
    progress: Progress,
}

impl<G, V> Sweep<'_, G, V>
where
    G: TurnGame,
    V: ValueStore + ?Sized,
{
    /// Resolve one anchor and write its value (and its mirror's).
    fn process(&self, layer: usize, anchor: G::State) -> Result<(), SolveError> {
        let game = self.game;
        let c = &self.counters;
        c.anchors.fetch_add(1, Ordering::Relaxed);

        if !game.is_reachable(&anchor) {
            c.unreachable.fetch_add(1, Ordering::Relaxed);
            self.progress.anchor_done(layer);
            return Ok(());
        }

        let index = game.index_of(&anchor);
        if game.is_final(&anchor) {
            self.store.set(index, game.final_value(&anchor))?;
            c.terminal.fetch_add(1, Ordering::Relaxed);
            self.progress.anchor_done(layer);
            return Ok(());
        }

        // An unreachable twin is never solved, so it cannot stand in for this one.
        let twin = if self.use_symmetry {
            game.mirror(&anchor)
                .filter(|m| game.is_reachable(m))
                .map(|m| game.index_of(&m))
                .filter(|&m| m != index)
        } else {
            None
        };
        if matches!(twin, Some(m) if m < index) {
            c.mirrored.fetch_add(1, Ordering::Relaxed);
            self.progress.anchor_done(layer);
            return Ok(());
        }

        let solution = solve_anchor(game, self.store, &anchor, &self.fixed_point)?;
        tracing::debug!(
            ?anchor,
            index,
            value = solution.value,
            iterations = solution.iterations,
            "anchor solved"
        );
        self.store.set(index, solution.value)?;
        if let Some(m) = twin {
            self.store.set(m, solution.value)?;
        }

        c.solved.fetch_add(1, Ordering::Relaxed);
        c.iterations
            .fetch_add(solution.iterations as u64, Ordering::Relaxed);
        c.max_iterations
            .fetch_max(solution.iterations, Ordering::Relaxed);
        if solution.convergence == Convergence::IterationLimit {
            c.iteration_limit_hits.fetch_add(1, Ordering::Relaxed);
        }
        self.progress.anchor_done(layer);
        Ok(())
    }

    fn finish_layer(
        &self,
        layer: usize,
        started: Instant,
        flush: bool,
        report: &mut SolveReport,
    ) -> Result<(), SolveError> {
        if flush {
            self.store.flush()?;
        }
        let seconds = started.elapsed().as_secs_f64();
        let layer_report = self.counters.take(layer, seconds);
        if layer_report.iteration_limit_hits > 0 {
            tracing::warn!(
                layer,
                hits = layer_report.iteration_limit_hits,
                "anchors hit the iteration limit"
            );
        }
        report.push_layer(layer_report);
        self.progress.layer_done(layer, seconds);
        Ok(())
    }
}

/// Solve every anchor of `game` into `store`.
///
/// Values already in `store` for states the sweep never writes are left alone.
/// The store is flushed before returning.
pub fn solve<G, V>(game: &G, store: &V, cfg: &SolverConfig) -> Result<SolveReport, SolveError>
where
    G: TurnGame,
    V: ValueStore + ?Sized,
{
    cfg.validate()?;
    if store.len() < game.num_states() {
        return Err(SolveError::Config(format!(
            "store holds {} values but the game has {} states",
            store.len(),
            game.num_states()
        )));
    }

    let start = Instant::now();
    let census = LayerCensus::take(game);
    tracing::info!(
        driver = ?cfg.driver,
        threads = cfg.threads,
        layers = game.layer_count(),
        anchors = census.total,
        num_states = game.num_states(),
        "starting retrograde sweep"
    );

    let sweep = Sweep {
        game,
        store,
        use_symmetry: cfg.use_symmetry,
        fixed_point: cfg.fixed_point(),
        counters: LayerCounters::default(),
        progress: Progress::new(census),
    };
    let mut report = SolveReport {
        driver: cfg.driver,
        threads: cfg.threads,
        num_states: game.num_states(),
        ..SolveReport::default()
    };

    match cfg.driver {
        Driver::StagedQueue => run_staged(&sweep, cfg, &mut report)?,
        Driver::Rayon => run_rayon(&sweep, cfg, &mut report)?,
    }

    store.flush()?;
    report.seconds = start.elapsed().as_secs_f64();
    tracing::info!(
        solved = report.solved,
        mirrored = report.mirrored,
        terminal = report.terminal,
        unreachable = report.unreachable,
        iteration_limit_hits = report.iteration_limit_hits,
        seconds = format_args!("{:.3}", report.seconds),
        "retrograde sweep complete"
    );
    Ok(report)
}

/// Solve into a fresh [`MemoryStore`].
pub fn solve_in_memory<G: TurnGame>(
    game: &G,
    cfg: &SolverConfig,
) -> Result<(MemoryStore, SolveReport), SolveError> {
    let store = MemoryStore::new(game.num_states());
    let report = solve(game, &store, cfg)?;
    Ok((store, report))
}

/// Aborts the queue if a worker unwinds, so the producer never waits on it.
struct AbortOnPanic<'a, T>(&'a StagedQueue<T>);

impl<T> Drop for AbortOnPanic<'_, T> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.abort();
        }
    }
}

fn run_staged<G, V>(
    sweep: &Sweep<'_, G, V>,
    cfg: &SolverConfig,
    report: &mut SolveReport,
) -> Result<(), SolveError>
where
    G: TurnGame,
    V: ValueStore + ?Sized,
{
    let queue: StagedQueue<(usize, G::State)> =
        StagedQueue::new(cfg.threads, cfg.queue_capacity, cfg.queue_low_water)?;
    let first_error: Mutex<Option<SolveError>> = Mutex::new(None);

    let produced = std::thread::scope(|s| {
        let mut workers = Vec::with_capacity(cfg.threads);
        let mut spawn_error = None;
        for worker in 0..cfg.threads {
            let queue = &queue;
            let first_error = &first_error;
            let spawned = std::thread::Builder::new()
                .name(format!("retro-worker-{worker}"))
                .spawn_scoped(s, move || {
                    let _guard = AbortOnPanic(queue);
                    while let Some((layer, anchor)) = queue.dequeue() {
                        if let Err(e) = sweep.process(layer, anchor) {
                            tracing::error!(worker, error = %e, "worker failed, aborting sweep");
                            first_error.lock().get_or_insert(e);
                            queue.abort();
                            break;
                        }
                    }
                });
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    spawn_error = Some(e);
                    break;
                }
            }
        }

        let produced = match spawn_error {
            Some(e) => Err(SolveError::Config(format!("cannot spawn worker thread: {e}"))),
            None => produce(sweep, &queue, cfg, report),
        };
        if produced.is_err() {
            queue.abort();
        }

        let mut panicked = false;
        for handle in workers {
            panicked |= handle.join().is_err();
        }
        if panicked {
            return Err(SolveError::WorkerPanicked);
        }
        produced
    });

    if let Some(e) = first_error.into_inner() {
        return Err(e);
    }
    produced
}

fn produce<G, V>(
    sweep: &Sweep<'_, G, V>,
    queue: &StagedQueue<(usize, G::State)>,
    cfg: &SolverConfig,
    report: &mut SolveReport,
) -> Result<(), SolveError>
where
    G: TurnGame,
    V: ValueStore + ?Sized,
{
    queue.bind_producer()?;
    for layer in 0..sweep.game.layer_count() {
        let started = Instant::now();
        for anchor in sweep.game.anchors(layer) {
            queue.enqueue((layer, anchor))?;
        }
        queue.end_stage()?;
        sweep.finish_layer(layer, started, cfg.flush_each_layer, report)?;
    }
    queue.finish()?;
    Ok(())
}

fn run_rayon<G, V>(
    sweep: &Sweep<'_, G, V>,
    cfg: &SolverConfig,
    report: &mut SolveReport,
) -> Result<(), SolveError>
where
    G: TurnGame,
    V: ValueStore + ?Sized,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(cfg.threads)
        .thread_name(|i| format!("retro-rayon-{i}"))
        .build()
        .map_err(|e| SolveError::Config(format!("cannot build thread pool: {e}")))?;

    for layer in 0..sweep.game.layer_count() {
        let started = Instant::now();
        let swept = panic::catch_unwind(AssertUnwindSafe(|| {
            pool.install(|| {
                sweep
                    .game
                    .anchors(layer)
                    .par_bridge()
                    .try_for_each(|anchor| sweep.process(layer, anchor))
            })
        }));
        match swept {
            Ok(result) => result?,
            Err(_) => return Err(SolveError::WorkerPanicked),
        }
        sweep.finish_layer(layer, started, cfg.flush_each_layer, report)?;
    }
    Ok(())
}
