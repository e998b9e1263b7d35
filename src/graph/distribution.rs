//! Vertex distribution: which rank owns which global id.
//!
//! The same [`VertexDistribution`] value must drive both the construction
//! step (which range a rank owns) and relabeling (which rank owns a ghost);
//! relabeling checks that the two agree.

use crate::graph_error::GraphError;
use std::ops::Range;

/// Mapping from global vertex id to owning rank.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VertexDistribution {
    /// Contiguous blocks of `per_rank = ceil(n / nprocs)` ids; the last
    /// ranks may own fewer (or zero) vertices.
    Uniform { n: u64, nprocs: usize, per_rank: u64 },
    /// Rank `r` owns `[bounds[r], bounds[r + 1])`; `bounds` has `nprocs + 1`
    /// non-decreasing entries starting at 0 and ending at `n`.
    Explicit { bounds: Vec<u64> },
}

impl VertexDistribution {
    /// Uniform block distribution of `n` ids over `nprocs` ranks.
    pub fn uniform(n: u64, nprocs: usize) -> Self {
        let nprocs = nprocs.max(1);
        let per_rank = n.div_ceil(nprocs as u64).max(1);
        VertexDistribution::Uniform {
            n,
            nprocs,
            per_rank,
        }
    }

    /// Explicit boundary table, e.g. `[0, 5, 9, 16]` for three ranks.
    /// `rank` is the calling rank, reported in errors.
    pub fn explicit(bounds: Vec<u64>, rank: usize) -> Result<Self, GraphError> {
        let invalid = |detail: String| GraphError::InvalidInput {
            rank,
            op: "vertex_distribution",
            detail,
        };
        if bounds.len() < 2 {
            return Err(invalid(format!(
                "boundary table needs at least 2 entries, got {}",
                bounds.len()
            )));
        }
        if bounds[0] != 0 {
            return Err(invalid(format!("boundary table starts at {}", bounds[0])));
        }
        if let Some(i) = bounds.windows(2).position(|w| w[0] > w[1]) {
            return Err(invalid(format!("boundary table decreases at {i}")));
        }
        Ok(VertexDistribution::Explicit { bounds })
    }

    pub fn nprocs(&self) -> usize {
        match self {
            VertexDistribution::Uniform { nprocs, .. } => *nprocs,
            VertexDistribution::Explicit { bounds } => bounds.len() - 1,
        }
    }

    /// Global vertex count.
    pub fn n(&self) -> u64 {
        match self {
            VertexDistribution::Uniform { n, .. } => *n,
            VertexDistribution::Explicit { bounds } => bounds[bounds.len() - 1],
        }
    }

    /// Global ids owned by `rank`.
    pub fn local_range(&self, rank: usize) -> Range<u64> {
        match self {
            VertexDistribution::Uniform { n, per_rank, .. } => {
                let start = (rank as u64).saturating_mul(*per_rank).min(*n);
                start..(start + per_rank).min(*n)
            }
            VertexDistribution::Explicit { bounds } => {
                let last = bounds.len() - 1;
                bounds[rank.min(last)]..bounds[(rank + 1).min(last)]
            }
        }
    }

    /// Owning rank of `gid`.
    ///
    /// For an explicit table this is the rank whose lower bound is the
    /// greatest one not exceeding `gid`; empty ranges are skipped.
    #[inline]
    pub fn owner_of(&self, gid: u64) -> usize {
        match self {
            VertexDistribution::Uniform {
                nprocs, per_rank, ..
            } => ((gid / per_rank) as usize).min(nprocs - 1),
            VertexDistribution::Explicit { bounds } => {
                let nprocs = bounds.len() - 1;
                bounds
                    .partition_point(|&b| b <= gid)
                    .saturating_sub(1)
                    .min(nprocs - 1)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_table_resolves_by_predecessor() {
        let d = VertexDistribution::explicit(vec![0, 5, 9, 16], 0).unwrap();
        assert_eq!(d.nprocs(), 3);
        assert_eq!(d.owner_of(7), 1);
        assert_eq!(d.owner_of(0), 0);
        assert_eq!(d.owner_of(4), 0);
        assert_eq!(d.owner_of(5), 1);
        assert_eq!(d.owner_of(9), 2);
        assert_eq!(d.owner_of(15), 2);
        assert_eq!(d.local_range(1), 5..9);
    }

    #[test]
    fn explicit_table_skips_empty_ranks() {
        let d = VertexDistribution::explicit(vec![0, 4, 4, 10], 0).unwrap();
        assert_eq!(d.owner_of(3), 0);
        assert_eq!(d.owner_of(4), 2);
        assert!(d.local_range(1).is_empty());
    }

    #[test]
    fn uniform_blocks_match_ranges() {
        let d = VertexDistribution::uniform(16, 4);
        for rank in 0..4 {
            let r = d.local_range(rank);
            assert_eq!(r, (4 * rank as u64)..(4 * rank as u64 + 4));
            assert!(r.clone().all(|gid| d.owner_of(gid) == rank));
        }

        let d = VertexDistribution::uniform(10, 4);
        assert_eq!(d.local_range(3), 9..10);
        assert_eq!(d.owner_of(9), 3);
    }

    #[test]
    fn malformed_tables_are_rejected() {
        assert!(VertexDistribution::explicit(vec![0], 0).is_err());
        assert!(VertexDistribution::explicit(vec![1, 4], 0).is_err());
        assert!(VertexDistribution::explicit(vec![0, 6, 4], 0).is_err());
        let err = VertexDistribution::explicit(vec![2, 4], 3).unwrap_err();
        assert!(matches!(err, GraphError::InvalidInput { rank: 3, .. }));
    }
}
