//! Column race: a solitaire, one-pair variant of Can't Stop.
//!
//! Two dice with `sides` faces are rolled; their sum picks one of the
//! `2 * sides - 1` columns. Column lengths grow by two toward the middle sum,
//! starting from `min_length` at the outer sums. A roll advances the picked
//! column by one space when the column is incomplete and either it already
//! moved this turn or fewer than `markers_per_turn` columns have moved.
//! Otherwise the turn busts and the board falls back to the anchor. The game
//! ends once `columns_to_win` columns are complete; values are expected turns
//! to finish.
//!
//! Layer of a board = spaces left to climb over all columns. Every non-bust
//! turn climbs at least one space, so turn-end boards always sit in a lower
//! layer than their anchor.

use serde::{Deserialize, Serialize};

use crate::env_config::env_parse;
use crate::error::SolveError;
use crate::game::{Objective, TurnGame};
use crate::index::{BoundedCompositions, MixedRadix, Subsets};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaceRules {
    pub sides: u32,
    /// Length of the two outermost columns.
    pub min_length: u32,
    pub markers_per_turn: usize,
    pub columns_to_win: usize,
}

impl Default for RaceRules {
    fn default() -> Self {
        Self {
            sides: 4,
            min_length: 2,
            markers_per_turn: 2,
            columns_to_win: 2,
        }
    }
}

impl RaceRules {
    pub fn num_columns(&self) -> usize {
        (2 * self.sides).saturating_sub(1) as usize
    }

    pub fn column_lengths(&self) -> Vec<u32> {
        let mid = self.sides as i64 - 1;
        (0..self.num_columns() as i64)
            .map(|c| self.min_length + 2 * (mid - (c - mid).abs()) as u32)
            .collect()
    }

    pub fn validate(&self) -> Result<(), SolveError> {
        let fail = |msg: String| Err(SolveError::Config(msg));
        if self.sides == 0 {
            return fail("race needs dice with at least one side".into());
        }
        if self.min_length == 0 {
            return fail("columns need at least one space".into());
        }
        if self.markers_per_turn == 0 {
            return fail("markers_per_turn must be at least 1".into());
        }
        if self.columns_to_win == 0 || self.columns_to_win > self.num_columns() {
            return fail(format!(
                "columns_to_win must be in 1..={}, got {}",
                self.num_columns(),
                self.columns_to_win
            ));
        }
        Ok(())
    }

    /// Defaults overlaid with `RETRO_RACE_SIDES`, `RETRO_RACE_MIN_LENGTH`,
    /// `RETRO_RACE_MARKERS` and `RETRO_RACE_COLUMNS_TO_WIN`.
    pub fn from_env() -> Result<Self, SolveError> {
        let mut rules = Self::default();
        if let Some(v) = env_parse("RETRO_RACE_SIDES")? {
            rules.sides = v;
        }
        if let Some(v) = env_parse("RETRO_RACE_MIN_LENGTH")? {
            rules.min_length = v;
        }
        if let Some(v) = env_parse("RETRO_RACE_MARKERS")? {
            rules.markers_per_turn = v;
        }
        if let Some(v) = env_parse("RETRO_RACE_COLUMNS_TO_WIN")? {
            rules.columns_to_win = v;
        }
        rules.validate()?;
        Ok(rules)
    }
}

/// Spaces climbed in each column, outermost low sum first.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RaceState(pub Vec<u32>);

impl RaceState {
    pub fn positions(&self) -> &[u32] {
        &self.0
    }
}

pub struct ColumnRace {
    rules: RaceRules,
    lengths: Vec<u32>,
    total_length: u32,
    index: MixedRadix,
    /// Column picked by each dice sum, with its probability.
    rolls: Vec<(usize, f64)>,
}

impl ColumnRace {
    pub fn new(rules: RaceRules) -> Result<Self, SolveError> {
        rules.validate()?;
        let lengths = rules.column_lengths();
        let total_length = lengths.iter().sum();
        let index = MixedRadix::new(lengths.iter().map(|&l| l + 1).collect());

        let faces = rules.sides as usize;
        let mut ways = vec![0u32; rules.num_columns()];
        for a in 0..faces {
            for b in 0..faces {
                ways[a + b] += 1;
            }
        }
        let outcomes = (faces * faces) as f64;
        let rolls = ways
            .iter()
            .enumerate()
            .map(|(column, &w)| (column, w as f64 / outcomes))
            .collect();

        Ok(Self {
            rules,
            lengths,
            total_length,
            index,
            rolls,
        })
    }

    pub fn rules(&self) -> &RaceRules {
        &self.rules
    }

    pub fn lengths(&self) -> &[u32] {
        &self.lengths
    }

    /// The empty board.
    pub fn start(&self) -> RaceState {
        RaceState(vec![0; self.lengths.len()])
    }

    pub fn completed_columns(&self, state: &RaceState) -> usize {
        state
            .0
            .iter()
            .zip(&self.lengths)
            .filter(|(p, l)| p >= l)
            .count()
    }

    fn spaces_left(&self, state: &RaceState) -> u32 {
        state
            .0
            .iter()
            .zip(&self.lengths)
            .map(|(p, l)| l - p)
            .sum()
    }

    fn columns_moved(anchor: &RaceState, position: &RaceState) -> usize {
        anchor
            .0
            .iter()
            .zip(&position.0)
            .filter(|(a, p)| p > a)
            .count()
    }
}

impl TurnGame for ColumnRace {
    type State = RaceState;
    type Roll = usize;

    fn num_states(&self) -> u64 {
        self.index.len()
    }

    fn index_of(&self, state: &RaceState) -> u64 {
        self.index.encode(&state.0)
    }

    fn state_at(&self, index: u64) -> RaceState {
        RaceState(self.index.decode(index))
    }

    fn layer_count(&self) -> usize {
        self.total_length as usize + 1
    }

    fn layer_of(&self, anchor: &RaceState) -> usize {
        self.spaces_left(anchor) as usize
    }

    fn anchors(&self, layer: usize) -> Box<dyn Iterator<Item = RaceState> + Send + '_> {
        let climbed = self.total_length.checked_sub(layer as u32);
        match climbed {
            Some(climbed) => Box::new(
                BoundedCompositions::new(self.lengths.clone(), climbed).map(RaceState),
            ),
            None => Box::new(std::iter::empty()),
        }
    }

    fn is_reachable(&self, state: &RaceState) -> bool {
        self.completed_columns(state) <= self.rules.columns_to_win
    }

    fn objective(&self) -> Objective {
        Objective::ExpectedTurns
    }

    fn is_final(&self, state: &RaceState) -> bool {
        self.completed_columns(state) >= self.rules.columns_to_win
    }

    fn final_value(&self, _state: &RaceState) -> f64 {
        0.0
    }

    fn mirror(&self, state: &RaceState) -> Option<RaceState> {
        let mut reflected = state.0.clone();
        reflected.reverse();
        Some(RaceState(reflected))
    }

    fn rolls(&self) -> &[(usize, f64)] {
        &self.rolls
    }

    fn turn_positions(&self, anchor: &RaceState) -> Vec<RaceState> {
        let open: Vec<usize> = (0..self.lengths.len())
            .filter(|&c| anchor.0[c] < self.lengths[c])
            .collect();

        // (spaces climbed this turn, board)
        let mut positions: Vec<(u32, RaceState)> = Vec::new();
        for k in 1..=self.rules.markers_per_turn.min(open.len()) {
            for subset in Subsets::new(open.len(), k) {
                let columns: Vec<usize> = subset.iter().map(|&i| open[i]).collect();
                // every chosen column climbs at least once
                let extra: Vec<u32> = columns
                    .iter()
                    .map(|&c| self.lengths[c] - anchor.0[c] - 1)
                    .collect();
                let max_extra: u32 = extra.iter().sum();
                for total in 0..=max_extra {
                    for climb in BoundedCompositions::new(extra.clone(), total) {
                        let mut board = anchor.clone();
                        for (&c, d) in columns.iter().zip(&climb) {
                            board.0[c] += d + 1;
                        }
                        if self.is_reachable(&board) {
                            positions.push((total + k as u32, board));
                        }
                    }
                }
            }
        }
        positions.sort_by_key(|(climbed, _)| *climbed);
        positions.into_iter().map(|(_, board)| board).collect()
    }

    fn legal_moves(&self, anchor: &RaceState, position: &RaceState, roll: &usize) -> Vec<RaceState> {
        let c = *roll;
        if position.0[c] >= self.lengths[c] {
            return Vec::new();
        }
        let already_moving = position.0[c] > anchor.0[c];
        if !already_moving && Self::columns_moved(anchor, position) >= self.rules.markers_per_turn {
            return Vec::new();
        }
        let mut next = position.clone();
        next.0[c] += 1;
        vec![next]
    }
}
