//! One turn as a small acyclic graph, solved for its anchor value.
//!
//! Slot 0 is the anchor; later slots are the turn positions in non-decreasing
//! progress, so every legal move points to a higher slot and a single backward
//! pass evaluates the whole turn for a given anchor estimate. Busting is the
//! only way back to slot 0, and it enters the pass as the estimate itself.

use std::collections::HashMap;
use std::fmt::Debug;

use crate::error::SolveError;
use crate::fixed_point::{self, Convergence, FixedPointConfig};
use crate::game::{Objective, TurnGame};
use crate::store::ValueStore;

/// Legal targets of one roll from one slot.
#[derive(Clone, Debug)]
struct RollEdge {
    probability: f64,
    targets: Vec<u32>,
}

#[derive(Clone, Debug)]
pub struct TurnGraph<S> {
    objective: Objective,
    positions: Vec<S>,
    edges: Vec<Vec<RollEdge>>,
    bust_probability: Vec<f64>,
    stop_values: Vec<f64>,
    is_final: Vec<bool>,
    values: Vec<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TurnSolution {
    pub value: f64,
    pub iterations: u32,
    pub convergence: Convergence,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Choice {
    Stop,
    Roll,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PositionDecision<S> {
    pub position: S,
    /// Value after the final evaluation pass.
    pub value: f64,
    pub stop_value: f64,
    pub choice: Choice,
    pub bust_probability: f64,
}

/// Solved turn plus the roll-or-stop decision at every intermediate position.
#[derive(Clone, Debug, PartialEq)]
pub struct TurnAnalysis<S> {
    pub anchor: S,
    pub solution: TurnSolution,
    pub decisions: Vec<PositionDecision<S>>,
}

impl<S: Clone + Eq + std::hash::Hash + Debug> TurnGraph<S> {
    /// Enumerate the turn starting at `anchor` and resolve its moves and stop values.
    pub fn build<G, V>(game: &G, store: &V, anchor: &S) -> Result<Self, SolveError>
    where
        G: TurnGame<State = S>,
        V: ValueStore + ?Sized,
    {
        let mut positions = Vec::new();
        positions.push(anchor.clone());
        positions.extend(game.turn_positions(anchor));

        let mut slot_of: HashMap<&S, u32> = HashMap::with_capacity(positions.len());
        for (slot, p) in positions.iter().enumerate() {
            if slot_of.insert(p, slot as u32).is_some() {
                return Err(malformed(anchor, format!("position {p:?} listed twice")));
            }
        }

        let rolls = game.rolls();
        let n = positions.len();
        let mut edges = Vec::with_capacity(n);
        let mut bust_probability = vec![0.0; n];
        let mut stop_values = vec![game.objective().worst(); n];
        let mut is_final = vec![false; n];

        for (slot, position) in positions.iter().enumerate() {
            let mut slot_edges = Vec::new();
            if slot > 0 && game.is_final(position) {
                is_final[slot] = true;
                stop_values[slot] = game.final_value(position);
                edges.push(slot_edges);
                continue;
            }
            if slot > 0 {
                let next_anchor = game.end_turn(position);
                stop_values[slot] = store.get(game.index_of(&next_anchor))?;
            }

            for (roll, probability) in rolls {
                let moves = game.legal_moves(anchor, position, roll);
                if moves.is_empty() {
                    bust_probability[slot] += probability;
                    continue;
                }
                let mut targets = Vec::with_capacity(moves.len());
                for target in &moves {
                    let Some(&t) = slot_of.get(target) else {
                        return Err(malformed(
                            anchor,
                            format!("{position:?} on {roll:?} moves to unlisted position {target:?}"),
                        ));
                    };
                    if t as usize <= slot {
                        return Err(malformed(
                            anchor,
                            format!("{position:?} on {roll:?} moves back to {target:?}"),
                        ));
                    }
                    targets.push(t);
                }
                slot_edges.push(RollEdge {
                    probability: *probability,
                    targets,
                });
            }
            edges.push(slot_edges);
        }
        drop(slot_of);

        Ok(Self {
            objective: game.objective(),
            values: vec![0.0; n],
            positions,
            edges,
            bust_probability,
            stop_values,
            is_final,
        })
    }

    /// Number of slots, anchor included.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn anchor(&self) -> &S {
        &self.positions[0]
    }

    /// Anchor value implied by the anchor estimate `x`.
    pub fn evaluate(&mut self, x: f64) -> f64 {
        let objective = self.objective;
        for slot in (0..self.positions.len()).rev() {
            if self.is_final[slot] {
                self.values[slot] = self.stop_values[slot];
                continue;
            }
            let mut cont = self.bust_probability[slot] * x;
            for edge in &self.edges[slot] {
                let best = edge
                    .targets
                    .iter()
                    .map(|&t| self.values[t as usize])
                    .fold(objective.worst(), |a, b| objective.better(a, b));
                cont += edge.probability * best;
            }
            self.values[slot] = if slot == 0 {
                objective.turn_cost() + cont
            } else {
                objective.better(cont, self.stop_values[slot])
            };
        }
        self.values[0]
    }

    pub fn solve(&mut self, cfg: &FixedPointConfig) -> TurnSolution {
        let fp = fixed_point::solve(|x| self.evaluate(x), cfg);
        if fp.convergence == Convergence::IterationLimit {
            tracing::warn!(
                anchor = ?self.positions[0],
                iterations = fp.iterations,
                value = fp.value,
                "turn value did not converge within the iteration budget"
            );
        }
        TurnSolution {
            value: fp.value,
            iterations: fp.iterations,
            convergence: fp.convergence,
        }
    }

    /// Solve, then report the roll-or-stop choice at each intermediate position.
    pub fn analyze(&mut self, cfg: &FixedPointConfig) -> TurnAnalysis<S> {
        let solution = self.solve(cfg);
        // leave `values` consistent with the accepted anchor value
        self.evaluate(solution.value);

        let decisions = (1..self.positions.len())
            .filter(|&slot| !self.is_final[slot])
            .map(|slot| {
                let value = self.values[slot];
                let stop_value = self.stop_values[slot];
                let choice = if self.objective.prefers(value, stop_value) {
                    Choice::Roll
                } else {
                    Choice::Stop
                };
                PositionDecision {
                    position: self.positions[slot].clone(),
                    value,
                    stop_value,
                    choice,
                    bust_probability: self.bust_probability[slot],
                }
            })
            .collect();

        TurnAnalysis {
            anchor: self.positions[0].clone(),
            solution,
            decisions,
        }
    }
}

fn malformed<S: Debug>(anchor: &S, detail: String) -> SolveError {
    SolveError::TurnGraph {
        anchor: format!("{anchor:?}"),
        detail,
    }
}

/// Value of one anchor given solved values for everything it depends on.
pub fn solve_anchor<G, V>(
    game: &G,
    store: &V,
    anchor: &G::State,
    cfg: &FixedPointConfig,
) -> Result<TurnSolution, SolveError>
where
    G: TurnGame,
    V: ValueStore + ?Sized,
{
    if game.is_final(anchor) {
        return Ok(TurnSolution {
            value: game.final_value(anchor),
            iterations: 1,
            convergence: Convergence::FixedPoint,
        });
    }
    let mut graph = TurnGraph::build(game, store, anchor)?;
    Ok(graph.solve(cfg))
}
