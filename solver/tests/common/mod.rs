//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use retrograde::{SolverConfig, TurnGame};

/// Two mirrored lanes of three rungs. A board `(lane, left)` has `left` rungs
/// still to climb; `left == 0` finishes the game. Every roll is a coin flip:
/// heads climbs one rung, tails busts.
pub struct Ladder {
    rolls: Vec<(bool, f64)>,
    /// Make every move point back at the anchor.
    pub backwards: bool,
    /// Restrict reachability to one lane.
    pub only_lane: Option<u32>,
}

impl Ladder {
    pub fn new() -> Self {
        Self {
            rolls: vec![(true, 0.5), (false, 0.5)],
            backwards: false,
            only_lane: None,
        }
    }
}

/// (lane, rungs left)
pub type Rung = (u32, u32);

pub const LANES: u32 = 2;
pub const RUNGS: u32 = 3;

impl TurnGame for Ladder {
    type State = Rung;
    type Roll = bool;

    fn num_states(&self) -> u64 {
        (LANES * RUNGS) as u64
    }

    fn index_of(&self, s: &Rung) -> u64 {
        (s.0 * RUNGS + s.1) as u64
    }

    fn state_at(&self, index: u64) -> Rung {
        ((index / RUNGS as u64) as u32, (index % RUNGS as u64) as u32)
    }

    fn layer_count(&self) -> usize {
        RUNGS as usize
    }

    fn layer_of(&self, s: &Rung) -> usize {
        s.1 as usize
    }

    fn anchors(&self, layer: usize) -> Box<dyn Iterator<Item = Rung> + Send + '_> {
        Box::new((0..LANES).map(move |lane| (lane, layer as u32)))
    }

    fn is_reachable(&self, s: &Rung) -> bool {
        self.only_lane.map_or(true, |lane| s.0 == lane)
    }

    fn is_final(&self, s: &Rung) -> bool {
        s.1 == 0
    }

    fn final_value(&self, _: &Rung) -> f64 {
        0.0
    }

    fn mirror(&self, s: &Rung) -> Option<Rung> {
        Some((LANES - 1 - s.0, s.1))
    }

    fn rolls(&self) -> &[(bool, f64)] {
        &self.rolls
    }

    fn turn_positions(&self, anchor: &Rung) -> Vec<Rung> {
        (0..anchor.1).rev().map(|left| (anchor.0, left)).collect()
    }

    fn legal_moves(&self, anchor: &Rung, position: &Rung, heads: &bool) -> Vec<Rung> {
        if self.backwards {
            return vec![*anchor];
        }
        if *heads && position.1 > 0 {
            vec![(position.0, position.1 - 1)]
        } else {
            Vec::new()
        }
    }
}

/// Small, fast configuration for tests.
pub fn test_config(threads: usize) -> SolverConfig {
    SolverConfig {
        threads,
        queue_capacity: 8,
        queue_low_water: 2,
        line_length: 7,
        cache_lines: 3,
        ..SolverConfig::default()
    }
}
