//! # Retrograde: value solver for layered stochastic turn games
//!
//! Computes the value of every turn-start state (anchor) of a dice game in
//! which a player keeps rolling until they stop or bust, using **retrograde
//! analysis** over layers of anchors.
//!
//! ## Algorithm overview
//!
//! | Stage | Module | Description |
//! |-------|--------|-------------|
//! | Index | [`index`], [`game`] | Rule module maps states to dense `u64` indices and partitions anchors into layers |
//! | Turn | [`turn`], [`fixed_point`] | Per anchor: enumerate the turn graph once, then find `x = f(x)` with secant steps |
//! | Sweep | [`pipeline`] | Layers in dependency order; anchors inside a layer in parallel; barrier between layers |
//! | Store | [`store`] | Values keyed by index: in memory, or a big-endian f64 file behind a line cache |
//!
//! ## Why a fixed point
//!
//! Busting returns the board to the anchor, so an anchor's value appears in
//! its own turn equation. Within a turn everything else is acyclic: one
//! backward pass over the turn graph gives `f(x)` for any anchor estimate
//! `x`. The anchor value is the fixed point of that map.
//!
//! ## Layers
//!
//! Layer 0 holds the anchors closest to the end of the game. An anchor in layer
//! `k` only reads final values and anchors of layers below `k`, so the
//! pipeline solves layer 0 first and never revisits a layer.
//!
//! ## Bundled game
//!
//! [`games::ColumnRace`] is a one-pair solitaire Can't Stop used by the
//! `precompute` binary and the tests.

pub mod constants;
pub mod env_config;
pub mod error;
pub mod fixed_point;
pub mod game;
pub mod games;
pub mod index;
pub mod pipeline;
pub mod store;
pub mod turn;

pub use env_config::SolverConfig;
pub use error::{QueueError, SolveError, StoreError};
pub use fixed_point::{Convergence, FixedPoint, FixedPointConfig};
pub use game::{Objective, TurnGame};
pub use pipeline::{solve, solve_in_memory, Driver, LayerReport, SolveReport};
pub use store::ValueStore;
pub use turn::{solve_anchor, TurnAnalysis, TurnGraph, TurnSolution};
