//! N-choose-K counting and enumeration
//!
//! Used by round-robin tournaments to list every possible heat line-up.

/// Number of ways of choosing `k` distinct items out of `n`.
///
/// `k` is clamped to `[0, n]`. Computed incrementally as a product of ranges,
/// saturating at `u64::MAX` when the count does not fit.
pub fn choose(n: usize, k: usize) -> u64 {
    checked_choose(n, k).unwrap_or(u64::MAX)
}

/// [`choose`], or `None` if the count overflows `u64`.
pub fn checked_choose(n: usize, k: usize) -> Option<u64> {
    let k = k.min(n);
    let k = k.min(n - k);
    let (n, k) = (n as u128, k as u128);
    let mut result: u128 = 1;
    for i in 1..=k {
        // Exact at every step: result * (n-k+i) is divisible by i. The partial
        // results only grow, so once one overflows the final count does too.
        result = result.checked_mul(n - k + i)? / i;
        if result > u128::from(u64::MAX) {
            return None;
        }
    }
    u64::try_from(result).ok()
}

/// Every k-subset of `{0..n}` in lexicographic order.
///
/// Each subset is strictly increasing. `k` is clamped to `[0, n]`, so
/// `combinations(n, 0)` yields a single empty subset.
pub fn combinations(n: usize, k: usize) -> Vec<Vec<usize>> {
    Combinations::new(n, k).collect()
}

/// Lazy, restartable enumeration of k-subsets of `{0..n}`.
///
/// Produces the same sequence as choose-or-skip backtracking: the leftmost
/// index varies slowest.
#[derive(Clone, Debug)]
pub struct Combinations {
    n: usize,
    indices: Vec<usize>,
    done: bool,
}

impl Combinations {
    pub fn new(n: usize, k: usize) -> Self {
        let k = k.min(n);
        Self {
            n,
            indices: (0..k).collect(),
            done: false,
        }
    }

    /// Restart from the first subset.
    pub fn reset(&mut self) {
        let k = self.indices.len();
        self.indices = (0..k).collect();
        self.done = false;
    }
}

impl Iterator for Combinations {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let current = self.indices.clone();

        // Advance: find the rightmost index that can still move right.
        let k = self.indices.len();
        let mut i = k;
        loop {
            if i == 0 {
                self.done = true;
                break;
            }
            i -= 1;
            if self.indices[i] < self.n - k + i {
                self.indices[i] += 1;
                for j in i + 1..k {
                    self.indices[j] = self.indices[j - 1] + 1;
                }
                break;
            }
        }

        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_choose_known_values() {
        assert_eq!(choose(4, 2), 6);
        assert_eq!(choose(7, 3), 35);
        assert_eq!(choose(10, 0), 1);
        assert_eq!(choose(10, 10), 1);
        assert_eq!(choose(52, 5), 2_598_960);
    }

    #[test]
    fn test_choose_clamps_k() {
        assert_eq!(choose(5, 9), 1);
        assert_eq!(choose(0, 3), 1);
    }

    #[test]
    fn test_choose_large_does_not_overflow() {
        assert_eq!(choose(60, 30), 118_264_581_564_861_424);
    }

    #[test]
    fn test_choose_saturates_past_u64() {
        // C(100, 50) is about 1.0e29.
        assert_eq!(checked_choose(100, 50), None);
        assert_eq!(choose(100, 50), u64::MAX);
        assert_eq!(choose(1000, 500), u64::MAX);
        // C(67, 33) still fits, though its partial products do not fit in u64.
        assert_eq!(checked_choose(67, 33), Some(14_226_520_737_620_288_370));
        assert_eq!(checked_choose(68, 34), None);
    }

    #[test]
    fn test_combinations_lexicographic() {
        let c = combinations(4, 2);
        assert_eq!(
            c,
            vec![
                vec![0, 1],
                vec![0, 2],
                vec![0, 3],
                vec![1, 2],
                vec![1, 3],
                vec![2, 3],
            ]
        );
    }

    #[test]
    fn test_combinations_match_choose() {
        for n in 0..=9 {
            for k in 0..=n {
                let all = combinations(n, k);
                assert_eq!(all.len() as u64, choose(n, k), "n={} k={}", n, k);
                for subset in &all {
                    assert_eq!(subset.len(), k);
                    assert!(subset.windows(2).all(|w| w[0] < w[1]));
                    assert!(subset.iter().all(|&i| i < n));
                }
            }
        }
    }

    #[test]
    fn test_combinations_edge_cases() {
        assert_eq!(combinations(3, 0), vec![Vec::<usize>::new()]);
        assert_eq!(combinations(0, 0), vec![Vec::<usize>::new()]);
        assert_eq!(combinations(3, 3), vec![vec![0, 1, 2]]);
        assert_eq!(combinations(2, 5), vec![vec![0, 1]]);
    }

    #[test]
    fn test_combinations_restartable() {
        let mut iter = Combinations::new(5, 3);
        let first: Vec<_> = iter.by_ref().collect();
        assert!(iter.next().is_none());
        iter.reset();
        let second: Vec<_> = iter.collect();
        assert_eq!(first, second);
    }
}
