//! Cache-line replacement policies.
//!
//! The cache calls [`ReplacementPolicy::choose_victim`] only when every slot is
//! occupied. The policy sees one [`LineView`] per slot and returns the slot to
//! evict; write-back of a dirty victim and the reload are the cache's job.

/// Read-only view of an occupied cache slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineView {
    /// File-relative block number held in the slot.
    pub line: u64,
    pub dirty: bool,
    /// Access stamp; larger is more recent.
    pub last_used: u64,
}

pub trait ReplacementPolicy: Send {
    /// Pick a slot index in `0..lines.len()` to evict so that `wanted` can be loaded.
    fn choose_victim(&mut self, lines: &[LineView], wanted: u64) -> usize;
}

/// Evict the slot touched longest ago.
#[derive(Clone, Copy, Debug, Default)]
pub struct LeastRecentlyUsed;

impl ReplacementPolicy for LeastRecentlyUsed {
    fn choose_victim(&mut self, lines: &[LineView], _wanted: u64) -> usize {
        lines
            .iter()
            .enumerate()
            .min_by_key(|(_, l)| l.last_used)
            .map(|(slot, _)| slot)
            .unwrap_or(0)
    }
}

/// Evict slots in cyclic order, ignoring use.
#[derive(Clone, Copy, Debug, Default)]
pub struct RoundRobin {
    next: usize,
}

impl ReplacementPolicy for RoundRobin {
    fn choose_victim(&mut self, lines: &[LineView], _wanted: u64) -> usize {
        if lines.is_empty() {
            return 0;
        }
        let slot = self.next % lines.len();
        self.next = slot + 1;
        slot
    }
}

/// Evict the resident line closest to the wanted one in file order.
///
/// Suits sweeps that move monotonically through the index space: the nearest
/// line is the one the sweep has just finished with.
#[derive(Clone, Copy, Debug, Default)]
pub struct NearestLine;

impl ReplacementPolicy for NearestLine {
    fn choose_victim(&mut self, lines: &[LineView], wanted: u64) -> usize {
        lines
            .iter()
            .enumerate()
            .min_by_key(|(_, l)| (l.line.abs_diff(wanted), l.last_used))
            .map(|(slot, _)| slot)
            .unwrap_or(0)
    }
}

/// Evict the resident line farthest from the wanted one in file order.
#[derive(Clone, Copy, Debug, Default)]
pub struct FarthestLine;

impl ReplacementPolicy for FarthestLine {
    fn choose_victim(&mut self, lines: &[LineView], wanted: u64) -> usize {
        lines
            .iter()
            .enumerate()
            .max_by_key(|(_, l)| (l.line.abs_diff(wanted), u64::MAX - l.last_used))
            .map(|(slot, _)| slot)
            .unwrap_or(0)
    }
}

impl ReplacementPolicy for Box<dyn ReplacementPolicy> {
    fn choose_victim(&mut self, lines: &[LineView], wanted: u64) -> usize {
        (**self).choose_victim(lines, wanted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(line: u64, last_used: u64) -> LineView {
        LineView {
            line,
            dirty: false,
            last_used,
        }
    }

    #[test]
    fn lru_picks_oldest_stamp() {
        let lines = [view(7, 30), view(2, 10), view(9, 20)];
        assert_eq!(LeastRecentlyUsed.choose_victim(&lines, 4), 1);
    }

    #[test]
    fn round_robin_cycles() {
        let lines = [view(0, 0), view(1, 0), view(2, 0)];
        let mut rr = RoundRobin::default();
        let picks: Vec<usize> = (0..5).map(|_| rr.choose_victim(&lines, 9)).collect();
        assert_eq!(picks, vec![0, 1, 2, 0, 1]);
    }

    #[test]
    fn distance_policies() {
        let lines = [view(1, 5), view(10, 1), view(4, 2)];
        assert_eq!(NearestLine.choose_victim(&lines, 5), 2);
        assert_eq!(FarthestLine.choose_victim(&lines, 5), 1);
    }

    #[test]
    fn distance_ties_prefer_older_line() {
        let lines = [view(3, 8), view(7, 2)];
        assert_eq!(NearestLine.choose_victim(&lines, 5), 1);
        assert_eq!(FarthestLine.choose_victim(&lines, 5), 1);
    }
}
