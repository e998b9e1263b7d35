//! The per-rank distributed graph store.
//!
//! A [`DistributedGraph`] holds one rank's slice of a global graph:
//! - owned vertices `[0, n_local)` with CSR out-adjacency
//!   (`out_degree_list`, `out_edges`) and their global ids (`local_unmap`);
//! - ghost vertices `[n_local, n_total)`, referenced by the adjacency but
//!   owned elsewhere, with their global ids, owning ranks and degrees;
//! - the global id → local index map that inverts both ranges;
//! - optional vertex and edge weights with globally reduced sums and maxima.
//!
//! The store is populated once by a routine in [`build`], rewritten in place by
//! [`relabel`] and [`ghost_sync`], and released by [`DistributedGraph::clear`].

pub mod build;
pub mod distribution;
pub mod ghost_sync;
pub mod input;
pub mod relabel;
pub mod stats;

use crate::comm::{Communicator, DistContext};
use crate::config::GraphConfig;
use crate::debug_invariants::DebugInvariants;
use crate::graph_error::GraphError;
use crate::map::FastMap;
use std::time::Instant;

pub use stats::MaxDegreeVert;

/// Per-vertex weights, `num_weights` values per vertex, row-major.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VertexWeights {
    pub num_weights: usize,
    pub values: Vec<i32>,
    /// Global sum per dimension.
    pub sums: Vec<i64>,
    /// Global max per dimension.
    pub maxes: Vec<i32>,
}

impl VertexWeights {
    /// Weights of local vertex `v`.
    #[inline]
    pub fn of(&self, v: u64) -> &[i32] {
        let start = v as usize * self.num_weights;
        &self.values[start..start + self.num_weights]
    }
}

/// One weight per local edge, parallel to `out_edges`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EdgeWeights {
    pub values: Vec<i32>,
    /// Global sum.
    pub sum: i64,
    /// Global max.
    pub max: i32,
}

/// One rank's slice of the distributed graph.
#[derive(Clone, Debug, Default)]
pub struct DistributedGraph {
    pub(crate) ctx: DistContext,
    pub(crate) n: u64,
    pub(crate) m: u64,
    pub(crate) n_local: u64,
    pub(crate) m_local: u64,
    pub(crate) n_offset: u64,
    pub(crate) n_ghost: u64,
    pub(crate) n_total: u64,
    /// True when ownership is the contiguous range starting at `n_offset`.
    pub(crate) contiguous: bool,
    /// True once `out_edges` holds local indices rather than global ids.
    pub(crate) edges_local: bool,

    pub(crate) out_edges: Vec<u64>,
    pub(crate) out_degree_list: Vec<u64>,
    pub(crate) local_unmap: Vec<u64>,
    pub(crate) ghost_unmap: Option<Box<[u64]>>,
    pub(crate) ghost_tasks: Option<Box<[u64]>>,
    pub(crate) ghost_degrees: Vec<u64>,
    pub(crate) map: FastMap,

    pub(crate) vert_weights: Option<VertexWeights>,
    pub(crate) edge_weights: Option<EdgeWeights>,
    pub(crate) max_degree_vert: Option<MaxDegreeVert>,
}

impl DistributedGraph {
    pub fn context(&self) -> DistContext {
        self.ctx
    }
    pub fn n(&self) -> u64 {
        self.n
    }
    pub fn m(&self) -> u64 {
        self.m
    }
    pub fn n_local(&self) -> u64 {
        self.n_local
    }
    pub fn m_local(&self) -> u64 {
        self.m_local
    }
    pub fn n_offset(&self) -> u64 {
        self.n_offset
    }
    pub fn n_ghost(&self) -> u64 {
        self.n_ghost
    }
    pub fn n_total(&self) -> u64 {
        self.n_total
    }

    /// Neighbour references of every local vertex, back to back.
    pub fn out_edges(&self) -> &[u64] {
        &self.out_edges
    }

    /// CSR offsets, length `n_local + 1`.
    pub fn out_degree_list(&self) -> &[u64] {
        &self.out_degree_list
    }

    /// Local index → global id for owned vertices.
    pub fn local_unmap(&self) -> &[u64] {
        &self.local_unmap
    }

    /// Ghost index (offset by `n_local`) → global id; `None` without ghosts.
    pub fn ghost_unmap(&self) -> Option<&[u64]> {
        self.ghost_unmap.as_deref()
    }

    /// Ghost index (offset by `n_local`) → owning rank; `None` without ghosts.
    pub fn ghost_tasks(&self) -> Option<&[u64]> {
        self.ghost_tasks.as_deref()
    }

    /// Ghost index (offset by `n_local`) → degree on the owner.
    /// Empty until [`ghost_sync::get_ghost_degrees`] ran.
    pub fn ghost_degrees(&self) -> &[u64] {
        &self.ghost_degrees
    }

    pub fn map(&self) -> &FastMap {
        &self.map
    }

    pub fn vert_weights(&self) -> Option<&VertexWeights> {
        self.vert_weights.as_ref()
    }

    pub fn edge_weights(&self) -> Option<&EdgeWeights> {
        self.edge_weights.as_ref()
    }

    pub fn num_vert_weights(&self) -> usize {
        self.vert_weights.as_ref().map_or(0, |w| w.num_weights)
    }

    pub fn num_edge_weights(&self) -> usize {
        usize::from(self.edge_weights.is_some())
    }

    /// Result of the last [`stats::get_max_degree_vert`] call.
    pub fn max_degree_vert(&self) -> Option<MaxDegreeVert> {
        self.max_degree_vert
    }

    /// True once neighbour references are local indices.
    pub fn is_relabeled(&self) -> bool {
        self.edges_local
    }

    /// Out-degree of local vertex `v`.
    #[inline]
    pub fn out_degree(&self, v: u64) -> u64 {
        let v = v as usize;
        self.out_degree_list[v + 1] - self.out_degree_list[v]
    }

    /// Neighbour references of local vertex `v`.
    #[inline]
    pub fn out_vertices(&self, v: u64) -> &[u64] {
        let v = v as usize;
        &self.out_edges[self.out_degree_list[v] as usize..self.out_degree_list[v + 1] as usize]
    }

    /// Edge weights of local vertex `v`, parallel to [`Self::out_vertices`].
    pub fn out_weights(&self, v: u64) -> Option<&[i32]> {
        let w = self.edge_weights.as_ref()?;
        let v = v as usize;
        Some(&w.values[self.out_degree_list[v] as usize..self.out_degree_list[v + 1] as usize])
    }

    /// True when `local` indexes a ghost.
    #[inline]
    pub fn is_ghost(&self, local: u64) -> bool {
        local >= self.n_local && local < self.n_total
    }

    /// Global id of a local index (owned or ghost).
    pub fn global_id(&self, local: u64) -> Option<u64> {
        if local < self.n_local {
            self.local_unmap.get(local as usize).copied()
        } else {
            self.ghost_unmap()?
                .get((local - self.n_local) as usize)
                .copied()
        }
    }

    /// Local index of a global id this rank knows about.
    pub fn local_index(&self, gid: u64) -> Option<u64> {
        self.map.get(gid)
    }

    /// Owning rank of a ghost.
    pub fn ghost_owner(&self, local: u64) -> Option<u64> {
        if !self.is_ghost(local) {
            return None;
        }
        self.ghost_tasks()?.get((local - self.n_local) as usize).copied()
    }

    /// Degree of a ghost as reported by its owner.
    pub fn ghost_degree(&self, local: u64) -> Option<u64> {
        if !self.is_ghost(local) {
            return None;
        }
        self.ghost_degrees.get((local - self.n_local) as usize).copied()
    }

    /// Release every array and clear the map. Safe to call repeatedly and
    /// on graphs that never had ghosts.
    pub fn clear(&mut self) {
        log::debug!("Task {} clear_graph() start", self.ctx.rank);
        self.map.clear();
        let ctx = self.ctx;
        *self = DistributedGraph {
            ctx,
            ..Default::default()
        };
        log::debug!("Task {} clear_graph() success", ctx.rank);
    }

    fn inconsistency(&self, detail: String) -> GraphError {
        GraphError::LookupInconsistency {
            rank: self.ctx.rank,
            op: "validate_invariants",
            detail,
        }
    }
}

/// Free-function form of [`DistributedGraph::clear`].
pub fn clear_graph(g: &mut DistributedGraph) {
    g.clear();
}

impl DebugInvariants for DistributedGraph {
    fn validate_invariants(&self) -> Result<(), GraphError> {
        let n_local = self.n_local as usize;
        let m_local = self.m_local as usize;

        if self.out_degree_list.len() != n_local + 1 {
            return Err(self.inconsistency(format!(
                "out_degree_list has {} entries, expected {}",
                self.out_degree_list.len(),
                n_local + 1
            )));
        }
        if self.out_degree_list[0] != 0 || self.out_degree_list[n_local] != self.m_local {
            return Err(self.inconsistency(format!(
                "out_degree_list spans {}..{}, expected 0..{}",
                self.out_degree_list[0], self.out_degree_list[n_local], self.m_local
            )));
        }
        if let Some(i) = self.out_degree_list.windows(2).position(|w| w[0] > w[1]) {
            return Err(self.inconsistency(format!("out_degree_list decreases at {i}")));
        }
        if self.out_edges.len() != m_local || self.local_unmap.len() != n_local {
            return Err(self.inconsistency(format!(
                "out_edges/local_unmap lengths {}/{} != m_local/n_local {}/{}",
                self.out_edges.len(),
                self.local_unmap.len(),
                m_local,
                n_local
            )));
        }
        if self.n_total != self.n_local + self.n_ghost {
            return Err(self.inconsistency("n_total != n_local + n_ghost".into()));
        }

        let n_ghost = self.n_ghost as usize;
        match (self.ghost_unmap(), self.ghost_tasks()) {
            (None, None) if n_ghost == 0 => {}
            (Some(u), Some(t)) if n_ghost > 0 && u.len() == n_ghost && t.len() == n_ghost => {
                if let Some(&r) = t.iter().find(|&&r| r as usize >= self.ctx.nprocs) {
                    return Err(self.inconsistency(format!("ghost owner rank {r} out of range")));
                }
            }
            _ => {
                return Err(self.inconsistency(format!(
                    "ghost arrays do not match n_ghost = {n_ghost}"
                )));
            }
        }
        if !self.ghost_degrees.is_empty() && self.ghost_degrees.len() != n_ghost {
            return Err(self.inconsistency(format!(
                "ghost_degrees has {} entries, expected {n_ghost}",
                self.ghost_degrees.len()
            )));
        }

        if let Some(w) = &self.vert_weights {
            if w.values.len() != n_local * w.num_weights
                || w.sums.len() != w.num_weights
                || w.maxes.len() != w.num_weights
            {
                return Err(self.inconsistency("vertex weight arrays mis-sized".into()));
            }
        }
        if let Some(w) = &self.edge_weights {
            if w.values.len() != m_local {
                return Err(self.inconsistency("edge weight array mis-sized".into()));
            }
        }

        if self.edges_local {
            if let Some(&e) = self.out_edges.iter().find(|&&e| e >= self.n_total) {
                return Err(self.inconsistency(format!(
                    "edge target {e} outside [0, {})",
                    self.n_total
                )));
            }
            for (i, &gid) in self.local_unmap.iter().enumerate() {
                if self.map.get(gid) != Some(i as u64) {
                    return Err(self.inconsistency(format!(
                        "map[{gid}] = {:?}, expected owned index {i}",
                        self.map.get(gid)
                    )));
                }
            }
            for (j, &gid) in self.ghost_unmap().unwrap_or_default().iter().enumerate() {
                let want = self.n_local + j as u64;
                if self.map.get(gid) != Some(want) {
                    return Err(self.inconsistency(format!(
                        "map[{gid}] = {:?}, expected ghost index {want}",
                        self.map.get(gid)
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Step entry/exit logging plus optional wall-clock timing after a barrier.
pub(crate) struct StepTimer {
    op: &'static str,
    rank: usize,
    debug: bool,
    start: Option<Instant>,
}

impl StepTimer {
    pub(crate) fn start<C>(comm: &C, cfg: &GraphConfig, op: &'static str) -> Result<Self, GraphError>
    where
        C: Communicator + ?Sized,
    {
        let rank = comm.rank();
        if cfg.debug {
            log::debug!("Task {rank} {op}() start");
        }
        let start = if cfg.verbose {
            comm.barrier()?;
            Some(Instant::now())
        } else {
            None
        };
        Ok(Self {
            op,
            rank,
            debug: cfg.debug,
            start,
        })
    }

    pub(crate) fn finish(self) {
        if let Some(start) = self.start {
            log::info!(
                "Task {} {}() {:9.6} (s)",
                self.rank,
                self.op,
                start.elapsed().as_secs_f64()
            );
        }
        if self.debug {
            log::debug!("Task {} {}() success", self.rank, self.op);
        }
    }
}
