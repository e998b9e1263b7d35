//! Inputs handed to the construction routines by a generator or reader.
//!
//! All buffers are moved into the graph; nothing is copied back.

use super::distribution::VertexDistribution;

/// A local edge record: source and destination global ids, maybe a weight.
pub trait EdgeRecord: Sync {
    fn src(&self) -> u64;
    fn dst(&self) -> u64;
    fn weight(&self) -> Option<i32> {
        None
    }
}

impl EdgeRecord for (u64, u64) {
    #[inline]
    fn src(&self) -> u64 {
        self.0
    }
    #[inline]
    fn dst(&self) -> u64 {
        self.1
    }
}

impl EdgeRecord for (u64, u64, i32) {
    #[inline]
    fn src(&self) -> u64 {
        self.0
    }
    #[inline]
    fn dst(&self) -> u64 {
        self.1
    }
    #[inline]
    fn weight(&self) -> Option<i32> {
        Some(self.2)
    }
}

/// Per-vertex weight vectors, `num_weights` values per local vertex.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VertexWeightInput {
    pub num_weights: usize,
    pub values: Vec<i32>,
}

/// Generator output: this rank owns `[n_offset, n_offset + n_local)` and
/// every edge's source lies in that range.
#[derive(Clone, Debug, Default)]
pub struct GeneratedEdges<E = (u64, u64)> {
    pub n: u64,
    pub m: u64,
    pub n_local: u64,
    pub n_offset: u64,
    pub edges: Vec<E>,
}

/// Generator output with a weight per edge and optional vertex weights.
#[derive(Clone, Debug, Default)]
pub struct WeightedGeneratedEdges {
    pub edges: GeneratedEdges<(u64, u64, i32)>,
    pub vert_weights: Option<VertexWeightInput>,
}

impl<E> GeneratedEdges<E> {
    pub fn new(n: u64, m: u64, n_local: u64, n_offset: u64, edges: Vec<E>) -> Self {
        Self {
            n,
            m,
            n_local,
            n_offset,
            edges,
        }
    }

    /// Edges for `rank`, with the owned range taken from `dist`.
    pub fn for_rank(dist: &VertexDistribution, rank: usize, m: u64, edges: Vec<E>) -> Self {
        let range = dist.local_range(rank);
        Self::new(dist.n(), m, range.end - range.start, range.start, edges)
    }

    /// Number of local edges.
    pub fn m_local(&self) -> u64 {
        self.edges.len() as u64
    }
}

/// Pre-built CSR arrays for this rank.
///
/// `global_ids` lists the owned ids (any order) for distributed input and is
/// left empty for serial input, where local index equals global id.
#[derive(Clone, Debug, Default)]
pub struct CsrInput {
    pub n: u64,
    pub m: u64,
    pub offsets: Vec<u64>,
    pub adjacency: Vec<u64>,
    pub global_ids: Vec<u64>,
    pub vert_weights: Option<VertexWeightInput>,
    pub edge_weights: Option<Vec<i32>>,
}

impl CsrInput {
    /// Number of local vertices implied by the offsets.
    pub fn n_local(&self) -> u64 {
        self.offsets.len().saturating_sub(1) as u64
    }
}
