use std::cmp::Ordering;
use std::collections::HashMap;

/// Rank-fusion damping constant
pub const RRF_K: f32 = 60.0;

/// Reciprocal Rank Fusion of a sparse and a dense ranking
///
/// `score(d) = (1 - alpha) / (K + sparse_rank + 1) + alpha / (K + dense_rank + 1)`
///
/// `alpha = 0` is pure sparse, `alpha = 1` pure dense.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RrfFusion {
    k: f32,
    alpha: f32,
}

impl RrfFusion {
    /// `alpha` is clamped to `[0, 1]`
    pub fn new(alpha: f32) -> Self {
        Self::with_k(alpha, RRF_K)
    }

    pub fn with_k(alpha: f32, k: f32) -> Self {
        Self {
            k,
            alpha: alpha.clamp(0.0, 1.0),
        }
    }

    pub const fn alpha(&self) -> f32 {
        self.alpha
    }

    /// Fuse two rankings of ids, best first
    ///
    /// Equal fused scores keep first-seen order (sparse list, then dense).
    pub fn fuse<S: AsRef<str>, D: AsRef<str>>(&self, sparse: &[S], dense: &[D]) -> Vec<(String, f32)> {
        let mut fused: Vec<(String, f32)> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        let sparse_weight = 1.0 - self.alpha;
        let ranked = sparse
            .iter()
            .map(AsRef::as_ref)
            .enumerate()
            .map(|(rank, id)| (id, sparse_weight, rank))
            .chain(
                dense
                    .iter()
                    .map(AsRef::as_ref)
                    .enumerate()
                    .map(|(rank, id)| (id, self.alpha, rank)),
            );

        for (id, weight, rank) in ranked {
            let contribution = weight / (self.k + rank as f32 + 1.0);
            match positions.get(id) {
                Some(&pos) => fused[pos].1 += contribution,
                None => {
                    positions.insert(id.to_string(), fused.len());
                    fused.push((id.to_string(), contribution));
                }
            }
        }

        fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        fused
    }
}

impl Default for RrfFusion {
    fn default() -> Self {
        Self::new(0.5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn crossed_rankings_sum_both_contributions() {
        let fusion = RrfFusion::new(0.5);
        let fused = fusion.fuse(&["c1", "c2"], &["c2", "c1"]);

        let c1 = 0.5 / 61.0 + 0.5 / 62.0;
        let c2 = 0.5 / 62.0 + 0.5 / 61.0;
        let scores: HashMap<_, _> = fused.iter().cloned().collect();
        assert!((scores["c1"] - c1).abs() < 1e-7);
        assert!((scores["c2"] - c2).abs() < 1e-7);
        assert_eq!(fused.len(), 2);
    }

    #[test]
    fn dense_weight_favours_dense_order() {
        let fused = RrfFusion::new(0.8).fuse(&["a", "b"], &["b", "a"]);
        assert_eq!(fused[0].0, "b");
    }

    #[test]
    fn alpha_is_clamped() {
        assert_eq!(RrfFusion::new(3.0).alpha(), 1.0);
        assert_eq!(RrfFusion::new(-1.0).alpha(), 0.0);
    }

    fn ids(prefix: &str, n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{prefix}{i}")).collect()
    }

    proptest! {
        #[test]
        fn pure_sparse_matches_sparse_order(n in 1usize..20, m in 0usize..20) {
            let sparse = ids("s", n);
            let dense = ids("d", m);
            let fused = RrfFusion::new(0.0).fuse(&sparse, &dense);
            let head: Vec<String> = fused.iter().take(n).map(|(id, _)| id.clone()).collect();
            prop_assert_eq!(head, sparse);
        }

        #[test]
        fn pure_dense_matches_dense_order(n in 0usize..20, m in 1usize..20) {
            let sparse = ids("s", n);
            let dense = ids("d", m);
            let fused = RrfFusion::new(1.0).fuse(&sparse, &dense);
            let head: Vec<String> = fused.iter().take(m).map(|(id, _)| id.clone()).collect();
            prop_assert_eq!(head, dense);
        }
    }
}
