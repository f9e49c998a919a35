//! Combinatorial indexing helpers for game-rule modules.
//!
//! - [`MixedRadix`]: dense bijection between digit vectors and `u64` indices.
//!   Digit 0 has place value 1, digit `i` has place value `Π_{j<i} radix[j]`.
//! - [`BoundedCompositions`]: every digit vector with per-digit bounds and a
//!   fixed digit sum. A game whose layers are "spaces moved so far" enumerates
//!   one layer with one of these.
//! - [`Subsets`]: k-subsets of `0..n`, used to pick which columns move in a turn.
//!
//! All iterators are lazy and restartable: construct a new one to start over.

/// Mixed-radix positional encoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MixedRadix {
    radices: Vec<u32>,
    place: Vec<u64>,
    len: u64,
}

impl MixedRadix {
    /// Panics if a radix is zero or the product overflows `u64`.
    pub fn new(radices: Vec<u32>) -> Self {
        let mut place = Vec::with_capacity(radices.len());
        let mut len: u64 = 1;
        for (i, &r) in radices.iter().enumerate() {
            assert!(r > 0, "radix {i} is zero");
            place.push(len);
            len = len
                .checked_mul(r as u64)
                .unwrap_or_else(|| panic!("mixed-radix index space overflows u64 at digit {i}"));
        }
        Self { radices, place, len }
    }

    /// Number of representable indices (`highest index + 1`).
    #[inline]
    pub fn len(&self) -> u64 {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn digits(&self) -> usize {
        self.radices.len()
    }

    #[inline]
    pub fn radices(&self) -> &[u32] {
        &self.radices
    }

    #[inline]
    pub fn place_value(&self, digit: usize) -> u64 {
        self.place[digit]
    }

    /// Encode a digit vector. Panics on a wrong length or an out-of-range digit.
    pub fn encode(&self, digits: &[u32]) -> u64 {
        assert_eq!(
            digits.len(),
            self.radices.len(),
            "digit vector has {} digits, expected {}",
            digits.len(),
            self.radices.len()
        );
        let mut index = 0u64;
        for (i, (&d, &r)) in digits.iter().zip(&self.radices).enumerate() {
            assert!(d < r, "digit {i} = {d} out of range for radix {r}");
            index += d as u64 * self.place[i];
        }
        index
    }

    /// Decode an index into a fresh digit vector. Panics if `index >= len()`.
    pub fn decode(&self, index: u64) -> Vec<u32> {
        let mut digits = vec![0; self.radices.len()];
        self.decode_into(index, &mut digits);
        digits
    }

    pub fn decode_into(&self, index: u64, digits: &mut [u32]) {
        assert!(
            index < self.len,
            "index {index} out of range (highest index {})",
            self.len - 1
        );
        assert_eq!(digits.len(), self.radices.len());
        let mut rest = index;
        for i in (0..self.radices.len()).rev() {
            digits[i] = (rest / self.place[i]) as u32;
            rest %= self.place[i];
        }
    }

    /// Single digit of an index without decoding the rest.
    #[inline]
    pub fn digit(&self, index: u64, digit: usize) -> u32 {
        ((index / self.place[digit]) % self.radices[digit] as u64) as u32
    }
}

/// Lexicographic walk over all `d` with `d[i] <= bounds[i]` and `Σ d = total`.
#[derive(Clone, Debug)]
pub struct BoundedCompositions {
    bounds: Vec<u32>,
    current: Option<Vec<u32>>,
}

impl BoundedCompositions {
    pub fn new(bounds: Vec<u32>, total: u32) -> Self {
        let mut first = vec![0; bounds.len()];
        let current = if fill_from_end(&bounds, &mut first, 0, total) {
            Some(first)
        } else {
            None
        };
        Self { bounds, current }
    }

    /// Number of compositions, computed without enumerating them.
    pub fn count(bounds: &[u32], total: u32) -> u64 {
        let total = total as usize;
        let mut ways = vec![0u64; total + 1];
        ways[0] = 1;
        for &b in bounds {
            let mut next = vec![0u64; total + 1];
            for (sum, &w) in ways.iter().enumerate() {
                if w == 0 {
                    continue;
                }
                for d in 0..=b as usize {
                    if sum + d > total {
                        break;
                    }
                    next[sum + d] += w;
                }
            }
            ways = next;
        }
        ways[total]
    }

    fn advance(&mut self) {
        let Some(cur) = self.current.as_mut() else {
            return;
        };
        let n = cur.len();
        let mut suffix = 0u32;
        // rightmost digit that can take one unit from the suffix behind it
        for i in (0..n).rev() {
            if suffix > 0 && cur[i] < self.bounds[i] {
                cur[i] += 1;
                let filled = fill_from_end(&self.bounds, cur, i + 1, suffix - 1);
                debug_assert!(filled, "suffix held {suffix} before refill");
                return;
            }
            suffix += cur[i];
        }
        self.current = None;
    }
}

/// Put `amount` into `digits[start..]`, as far right as possible. Returns false
/// if the digits cannot hold it.
fn fill_from_end(bounds: &[u32], digits: &mut [u32], start: usize, amount: u32) -> bool {
    let mut rest = amount;
    for i in (start..digits.len()).rev() {
        let d = rest.min(bounds[i]);
        digits[i] = d;
        rest -= d;
    }
    rest == 0
}

impl Iterator for BoundedCompositions {
    type Item = Vec<u32>;

    fn next(&mut self) -> Option<Vec<u32>> {
        let out = self.current.clone()?;
        self.advance();
        Some(out)
    }
}

/// k-subsets of `0..n` in lexicographic order.
#[derive(Clone, Debug)]
pub struct Subsets {
    n: usize,
    current: Option<Vec<usize>>,
}

impl Subsets {
    pub fn new(n: usize, k: usize) -> Self {
        let current = (k <= n).then(|| (0..k).collect());
        Self { n, current }
    }
}

impl Iterator for Subsets {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        let out = self.current.clone()?;
        let cur = self.current.as_mut()?;
        let k = cur.len();
        let mut i = k;
        loop {
            if i == 0 {
                self.current = None;
                break;
            }
            i -= 1;
            if cur[i] < self.n - k + i {
                cur[i] += 1;
                for j in i + 1..k {
                    cur[j] = cur[j - 1] + 1;
                }
                break;
            }
        }
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn mixed_radix_round_trips_every_index() {
        let mr = MixedRadix::new(vec![3, 5, 2, 4]);
        assert_eq!(mr.len(), 120);
        for i in 0..mr.len() {
            let d = mr.decode(i);
            assert_eq!(mr.encode(&d), i);
            for (k, &digit) in d.iter().enumerate() {
                assert_eq!(mr.digit(i, k), digit);
            }
        }
    }

    #[test]
    fn first_digit_is_least_significant() {
        let mr = MixedRadix::new(vec![4, 3]);
        assert_eq!(mr.encode(&[1, 0]), 1);
        assert_eq!(mr.encode(&[0, 1]), 4);
        assert_eq!(mr.place_value(1), 4);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn encode_rejects_large_digit() {
        MixedRadix::new(vec![2, 2]).encode(&[2, 0]);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn decode_rejects_large_index() {
        MixedRadix::new(vec![2, 2]).decode(4);
    }

    #[test]
    fn compositions_match_brute_force() {
        let bounds = vec![2, 0, 3, 1];
        let mr = MixedRadix::new(bounds.iter().map(|b| b + 1).collect());
        for total in 0..=7 {
            let walked: Vec<Vec<u32>> = BoundedCompositions::new(bounds.clone(), total).collect();
            let unique: HashSet<Vec<u32>> = walked.iter().cloned().collect();
            assert_eq!(unique.len(), walked.len(), "duplicates at total {total}");

            let brute: HashSet<Vec<u32>> = (0..mr.len())
                .map(|i| mr.decode(i))
                .filter(|d| d.iter().sum::<u32>() == total)
                .collect();
            assert_eq!(unique, brute, "total {total}");
            assert_eq!(
                BoundedCompositions::count(&bounds, total),
                brute.len() as u64
            );
        }
    }

    #[test]
    fn compositions_are_lexicographic() {
        let walked: Vec<Vec<u32>> = BoundedCompositions::new(vec![2, 2, 2], 3).collect();
        let mut sorted = walked.clone();
        sorted.sort();
        assert_eq!(walked, sorted);
        assert_eq!(walked.first(), Some(&vec![0, 1, 2]));
        assert_eq!(walked.last(), Some(&vec![2, 1, 0]));
    }

    #[test]
    fn impossible_total_yields_nothing() {
        assert_eq!(BoundedCompositions::new(vec![1, 1], 3).count(), 0);
        assert_eq!(BoundedCompositions::count(&[1, 1], 3), 0);
    }

    #[test]
    fn subsets_enumerate_binomial_count() {
        let all: Vec<Vec<usize>> = Subsets::new(5, 3).collect();
        assert_eq!(all.len(), 10);
        assert_eq!(all[0], vec![0, 1, 2]);
        assert_eq!(all[9], vec![2, 3, 4]);
        assert_eq!(Subsets::new(3, 0).count(), 1);
        assert_eq!(Subsets::new(2, 3).count(), 0);
    }
}
