//! Reciprocal-best pair selection on a finished cross-match.

use crate::matcher::{MISSING, MatchResult};

/// Partition of catalog-1 points into mutual pairs and the rest.
#[derive(Debug, Clone, Default)]
pub struct BestPairs {
    /// Catalog-1 side of each mutual pair.
    pub id1: Vec<usize>,
    /// Catalog-2 side, aligned with `id1`.
    pub id2: Vec<usize>,
    /// Catalog-1 points whose nearest neighbor does not point back.
    pub lost: Vec<usize>,
}

/// Keep only mutual nearest pairs: `(i, j)` such that `j` is `i`'s primary
/// neighbor and `i` is `j`'s reverse nearest. Everything else lands in
/// `lost`.
pub fn reciprocal_best(res: &MatchResult) -> BestPairs {
    let n1 = res.id.ncols();

    let mut pairs = BestPairs {
        id1: Vec::with_capacity(n1),
        id2: Vec::with_capacity(n1),
        lost: Vec::new(),
    };

    for i in 0..n1 {
        let j = if res.id.nrows() > 0 {
            res.id[[0, i]]
        } else {
            MISSING
        };
        if j != MISSING && res.rid[j] == i {
            pairs.id1.push(i);
            pairs.id2.push(j);
        } else {
            pairs.lost.push(i);
        }
    }

    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::{MatchParams, crossmatch};
    use ndarray::array;

    #[test]
    fn mutual_and_lost_are_classified() {
        // Point 0 and its neighbor designate each other; point 1's nearest
        // does not point back.
        let res = MatchResult {
            id: array![[2, 2]],
            d: array![[1.0, 5.0]],
            rid: vec![9, 9, 0],
            rd: vec![0.5, 0.5, 1.0],
        };

        let pairs = reciprocal_best(&res);
        assert_eq!(pairs.id1, vec![0]);
        assert_eq!(pairs.id2, vec![2]);
        assert_eq!(pairs.lost, vec![1]);
    }

    #[test]
    fn missing_primary_is_lost() {
        let res = MatchResult {
            id: array![[MISSING]],
            d: array![[f64::INFINITY]],
            rid: vec![],
            rd: vec![],
        };

        let pairs = reciprocal_best(&res);
        assert!(pairs.id1.is_empty());
        assert_eq!(pairs.lost, vec![0]);
    }

    #[test]
    fn partition_sums_to_the_first_catalog() {
        let mut state: u64 = 987;
        let mut rng = move || -> f64 {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state as f64) / (u64::MAX as f64)
        };

        let n = 300;
        let mut ra1 = Vec::with_capacity(n);
        let mut dec1 = Vec::with_capacity(n);
        let mut ra2 = Vec::with_capacity(n);
        let mut dec2 = Vec::with_capacity(n);
        for _ in 0..n {
            ra1.push(40.0 + rng() * 2.0);
            dec1.push(-20.0 + rng() * 2.0);
            ra2.push(40.0 + rng() * 2.0);
            dec2.push(-20.0 + rng() * 2.0);
        }

        let res = crossmatch(&ra1, &dec1, &ra2, &dec2, &MatchParams::default()).unwrap();
        let pairs = reciprocal_best(&res);

        assert_eq!(pairs.id1.len(), pairs.id2.len());
        assert_eq!(pairs.id1.len() + pairs.lost.len(), n);
        for (&i, &j) in pairs.id1.iter().zip(&pairs.id2) {
            assert_eq!(res.id[[0, i]], j);
            assert_eq!(res.rid[j], i);
        }
    }
}
