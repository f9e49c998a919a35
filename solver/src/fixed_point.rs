//! Secant iteration for self-referential turn values.
//!
//! A turn's value `x` appears on both sides of its equation (busting returns
//! to the anchor), so the turn solver evaluates `f(x)` for trial values and
//! looks for `x = f(x)`. Trial sequence: the initial estimate, then `f` of it,
//! then secant steps through the last two `(x, f(x))` pairs. For the piecewise
//! linear `f` of a turn graph the secant step lands on the fixed point as soon
//! as both pairs sit on the same linear piece.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_INITIAL_ESTIMATE, DEFAULT_MAX_ITERATIONS, DEFAULT_TOLERANCE};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixedPointConfig {
    pub initial_estimate: f64,
    /// Evaluations of `f` before giving up; at least 1.
    pub max_iterations: u32,
    /// Accept `x` when `|x - f(x)| <= tolerance`.
    pub tolerance: f64,
}

impl Default for FixedPointConfig {
    fn default() -> Self {
        Self {
            initial_estimate: DEFAULT_INITIAL_ESTIMATE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

/// Why the iteration stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Convergence {
    FixedPoint,
    /// A trial value came up a second time; the iteration is cycling and the
    /// last `f(x)` is accepted.
    Repeated,
    /// Budget exhausted. The last `f(x)` is used anyway.
    IterationLimit,
}

impl Convergence {
    #[inline]
    pub fn converged(self) -> bool {
        !matches!(self, Convergence::IterationLimit)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FixedPoint {
    /// `f` of the last trial value.
    pub value: f64,
    pub iterations: u32,
    pub convergence: Convergence,
    /// Every `(x, f(x))` pair, in evaluation order.
    pub trace: Vec<(f64, f64)>,
}

/// Next trial from the last two evaluated pairs.
fn secant_step((x1, y1): (f64, f64), (x2, y2): (f64, f64)) -> f64 {
    let slope = (y2 - y1) / (x2 - x1);
    let intercept = y1 - slope * x1;
    if y1 == y2 || slope == 1.0 {
        return y2;
    }
    let next = intercept / (1.0 - slope);
    if next.is_finite() {
        next
    } else {
        y2
    }
}

/// Find `x` with `x = f(x)`.
pub fn solve(mut f: impl FnMut(f64) -> f64, cfg: &FixedPointConfig) -> FixedPoint {
    let max_iterations = cfg.max_iterations.max(1);
    let mut trace: Vec<(f64, f64)> = Vec::with_capacity(max_iterations.min(64) as usize);
    let mut visited: HashSet<u64> = HashSet::new();
    let mut x = cfg.initial_estimate;

    loop {
        let y = f(x);
        trace.push((x, y));
        let iterations = trace.len() as u32;

        // normalize -0.0 so it collides with 0.0
        let repeated = !visited.insert((x + 0.0).to_bits());
        let convergence = if (x - y).abs() <= cfg.tolerance {
            Some(Convergence::FixedPoint)
        } else if repeated {
            Some(Convergence::Repeated)
        } else if iterations >= max_iterations {
            Some(Convergence::IterationLimit)
        } else {
            None
        };

        if let Some(convergence) = convergence {
            return FixedPoint {
                value: y,
                iterations,
                convergence,
                trace,
            };
        }

        x = match trace.as_slice() {
            [.., prev, last] => secant_step(*prev, *last),
            _ => y,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_map_converges_in_three_steps() {
        let fp = solve(|x| 1.0 + 0.5 * x, &FixedPointConfig::default());
        assert_eq!(fp.convergence, Convergence::FixedPoint);
        assert_eq!(fp.value, 2.0);
        assert_eq!(fp.iterations, 3);
        let xs: Vec<f64> = fp.trace.iter().map(|&(x, _)| x).collect();
        assert_eq!(xs, vec![1.0, 1.5, 2.0]);
    }

    #[test]
    fn initial_fixed_point_takes_one_evaluation() {
        let fp = solve(|_| 1.0, &FixedPointConfig::default());
        assert_eq!(fp.iterations, 1);
        assert_eq!(fp.convergence, Convergence::FixedPoint);
    }

    #[test]
    fn piecewise_map_finds_the_active_piece() {
        // min of two lines; the fixed point 4 lies on the second piece
        let f = |x: f64| (2.0 + 0.5 * x).min(0.8 + 0.8 * x);
        let fp = solve(f, &FixedPointConfig::default());
        assert!(fp.convergence.converged());
        assert!((fp.value - 4.0).abs() < 1e-12, "{fp:?}");
    }

    #[test]
    fn cycling_trials_stop_as_repeated() {
        // step function: 1 -> 3 -> 2 -> back to 1
        let mut calls = 0;
        let fp = solve(
            |x| {
                calls += 1;
                if x == 1.0 {
                    3.0
                } else {
                    1.0
                }
            },
            &FixedPointConfig::default(),
        );
        assert_eq!(fp.convergence, Convergence::Repeated);
        assert_eq!(fp.iterations, calls);
        assert!(fp.iterations <= 4);
    }

    #[test]
    fn budget_exhaustion_is_soft() {
        let cfg = FixedPointConfig {
            max_iterations: 2,
            ..FixedPointConfig::default()
        };
        let fp = solve(|x| x + 1.0, &cfg);
        assert_eq!(fp.convergence, Convergence::IterationLimit);
        assert_eq!(fp.iterations, 2);
        assert_eq!(fp.value, 3.0);
    }

    #[test]
    fn tolerance_accepts_near_fixed_points() {
        let cfg = FixedPointConfig {
            tolerance: 0.6,
            ..FixedPointConfig::default()
        };
        let fp = solve(|x| 1.0 + 0.5 * x, &cfg);
        assert_eq!(fp.iterations, 1);
        assert_eq!(fp.value, 1.5);
    }
}
