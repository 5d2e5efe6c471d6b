//! Archetype ranking.
//!
//! Every set of `k` distinct archetype ordinals (drawn from
//! `0..MAX_ARCHETYPE_COMPONENTS`) maps to a unique rank in
//! `0..C(MAX, k)` through the combinatorial number system:
//!
//! ```text
//! rank({x_0 < x_1 < ... < x_{k-1}}) = sum C(x_i, i + 1)
//! ```
//!
//! `(k, rank)` therefore identifies a bucket without hashing the set.

use crate::config::MAX_ARCHETYPE_COMPONENTS;
use once_cell::sync::Lazy;

const N: usize = MAX_ARCHETYPE_COMPONENTS + 1;

static BINOMIALS: Lazy<[[u32; N]; N]> = Lazy::new(|| {
    let mut table = [[0u32; N]; N];
    for n in 0..N {
        table[n][0] = 1;
        for k in 1..=n {
            table[n][k] = table[n - 1][k - 1] + if k < n { table[n - 1][k] } else { 0 };
        }
    }
    table
});

/// `C(n, k)`, zero when `k > n`. Both arguments must be at most
/// `MAX_ARCHETYPE_COMPONENTS`.
pub fn binomial(n: usize, k: usize) -> usize {
    if k > n {
        return 0;
    }
    BINOMIALS[n][k] as usize
}

/// Number of distinct `k`-component archetypes.
pub fn combination_count(k: usize) -> usize {
    binomial(MAX_ARCHETYPE_COMPONENTS, k)
}

/// Rank of a strictly ascending ordinal set.
pub fn rank(ordinals: &[usize]) -> usize {
    debug_assert!(
        ordinals.windows(2).all(|w| w[0] < w[1]),
        "ordinals must be strictly ascending"
    );
    ordinals
        .iter()
        .enumerate()
        .map(|(i, &x)| binomial(x, i + 1))
        .sum()
}

/// Inverse of [`rank`]: the ascending ordinal set of size `k` at `rank`.
pub fn unrank(mut rank: usize, k: usize) -> Vec<usize> {
    debug_assert!(rank < combination_count(k).max(1));
    let mut ordinals = vec![0; k];
    let mut upper = MAX_ARCHETYPE_COMPONENTS;
    for i in (0..k).rev() {
        // largest x with C(x, i + 1) <= rank
        let mut x = upper;
        while x > i && binomial(x - 1, i + 1) > rank {
            x -= 1;
        }
        let x = x - 1;
        ordinals[i] = x;
        rank -= binomial(x, i + 1);
        upper = x;
    }
    ordinals
}

/// Ascending ordinals of the bits set in an archetype membership mask.
pub fn ordinals_of_mask(mask: u32) -> impl Iterator<Item = usize> {
    (0..MAX_ARCHETYPE_COMPONENTS).filter(move |&bit| mask & (1 << bit) != 0)
}
