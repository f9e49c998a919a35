//! The contract a game-rule module fulfils so the engine can solve it.
//!
//! A [`TurnGame`] has two nested structures:
//!
//! - **Anchors** (turn-start states) are partitioned into layers. An anchor in
//!   layer `k` depends only on final values and on anchors in layers `< k`, so
//!   the pipeline resolves layer 0 first and never revisits a layer.
//! - **Turn positions**: inside one turn the player keeps rolling or stops.
//!   Rolling can bust back to the anchor, which is what makes the per-turn value
//!   equations self-referential. Everything the turn solver needs about one
//!   turn comes from [`TurnGame::turn_positions`], [`TurnGame::rolls`] and
//!   [`TurnGame::legal_moves`].

use std::fmt::Debug;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

/// What the values mean and how choices combine them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    /// Expected number of turns to finish; every turn costs 1, the player minimizes.
    ExpectedTurns,
    /// Probability of winning; turns are free, the player maximizes.
    WinProbability,
}

impl Objective {
    /// Value added to an anchor for starting a turn.
    #[inline]
    pub fn turn_cost(self) -> f64 {
        match self {
            Objective::ExpectedTurns => 1.0,
            Objective::WinProbability => 0.0,
        }
    }

    /// The preferred of two values.
    #[inline]
    pub fn better(self, a: f64, b: f64) -> f64 {
        match self {
            Objective::ExpectedTurns => a.min(b),
            Objective::WinProbability => a.max(b),
        }
    }

    /// True when `candidate` is strictly preferred over `incumbent`.
    #[inline]
    pub fn prefers(self, candidate: f64, incumbent: f64) -> bool {
        match self {
            Objective::ExpectedTurns => candidate < incumbent,
            Objective::WinProbability => candidate > incumbent,
        }
    }

    /// Identity element for [`Objective::better`].
    #[inline]
    pub fn worst(self) -> f64 {
        match self {
            Objective::ExpectedTurns => f64::INFINITY,
            Objective::WinProbability => f64::NEG_INFINITY,
        }
    }
}

/// A layered stochastic turn game.
///
/// Index invariants: `state_at(index_of(s)) == s` for every representable state
/// and `index_of(state_at(i)) == i` for every `i < num_states()`.
pub trait TurnGame: Sync {
    type State: Clone + Eq + Hash + Debug + Send + Sync;
    type Roll: Debug + Send + Sync;

    // ── combinatorial index ───────────────────────────────────────────

    /// Number of indexable states (highest index + 1), reachable or not.
    fn num_states(&self) -> u64;

    fn index_of(&self, state: &Self::State) -> u64;

    fn state_at(&self, index: u64) -> Self::State;

    fn layer_count(&self) -> usize;

    fn layer_of(&self, anchor: &Self::State) -> usize;

    /// Fresh, complete, duplicate-free enumeration of one layer's anchors.
    fn anchors(&self, layer: usize) -> Box<dyn Iterator<Item = Self::State> + Send + '_>;

    /// May return true for unreachable states; must not return false for reachable ones.
    fn is_reachable(&self, _state: &Self::State) -> bool {
        true
    }

    // ── rules ─────────────────────────────────────────────────────────

    fn objective(&self) -> Objective {
        Objective::ExpectedTurns
    }

    fn is_final(&self, state: &Self::State) -> bool;

    fn final_value(&self, state: &Self::State) -> f64;

    /// Value-preserving reflection of a state, if the game has one.
    fn mirror(&self, _state: &Self::State) -> Option<Self::State> {
        None
    }

    /// Chance outcomes of one roll with their probabilities (summing to 1).
    fn rolls(&self) -> &[(Self::Roll, f64)];

    /// Every position reachable from `anchor` during one turn, excluding the
    /// anchor itself, in non-decreasing order of progress made this turn.
    fn turn_positions(&self, anchor: &Self::State) -> Vec<Self::State>;

    /// Positions the player may move to from `position` after `roll`, in a turn
    /// that started at `anchor`. Empty means the roll busts. Every target must
    /// be strictly further along than `position`.
    fn legal_moves(
        &self,
        anchor: &Self::State,
        position: &Self::State,
        roll: &Self::Roll,
    ) -> Vec<Self::State>;

    /// The anchor the next turn starts from when the player stops at `position`.
    fn end_turn(&self, position: &Self::State) -> Self::State {
        position.clone()
    }
}
