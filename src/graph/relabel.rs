//! Ghost discovery: rewrite global-id neighbour references as local indices.
//!
//! Owned vertices keep `[0, n_local)`. Every other id met while scanning
//! `out_edges` becomes a ghost and receives the next free index from
//! `n_local` upward, in first-seen order. The scan is sequential; the ghost
//! *set* and owner ranks do not depend on it, only the integers do. With
//! [`GraphConfig::canonical_ghost_order`] the ghosts are re-indexed by
//! ascending global id afterwards, so the integers are stable too.

use super::distribution::VertexDistribution;
use super::{DistributedGraph, StepTimer};
use crate::comm::{agree, Communicator, DistContext};
use crate::config::GraphConfig;
use crate::debug_invariants::check_step;
use crate::graph_error::{try_zeroed, GraphError};
use crate::map::FastMap;
use rayon::prelude::*;

const OP: &str = "relabel_edges";

fn invalid(rank: usize, detail: String) -> GraphError {
    GraphError::InvalidInput { rank, op: OP, detail }
}

fn inconsistent(rank: usize, detail: String) -> GraphError {
    GraphError::LookupInconsistency { rank, op: OP, detail }
}

/// Check that `dist` describes the ownership `g` was built with.
fn check_coupling(
    g: &DistributedGraph,
    dist: &VertexDistribution,
    ctx: DistContext,
) -> Result<(), GraphError> {
    let rank = ctx.rank;
    if dist.nprocs() != ctx.nprocs || g.ctx != ctx {
        return Err(invalid(
            rank,
            format!(
                "distribution over {} ranks, graph built for {}, caller has {}",
                dist.nprocs(),
                g.ctx.nprocs,
                ctx.nprocs
            ),
        ));
    }
    if dist.n() != g.n {
        return Err(invalid(
            rank,
            format!("distribution covers {} ids, graph has n = {}", dist.n(), g.n),
        ));
    }
    if g.contiguous {
        let owned = g.n_offset..g.n_offset + g.n_local;
        let expected = dist.local_range(rank);
        if owned != expected {
            return Err(invalid(
                rank,
                format!("graph owns {owned:?} but the distribution assigns {expected:?}"),
            ));
        }
    } else if let Some(&gid) = g
        .local_unmap
        .par_iter()
        .find_any(|&&gid| gid >= g.n || dist.owner_of(gid) != rank)
    {
        return Err(invalid(
            rank,
            format!("owned id {gid} is assigned to another rank by the distribution"),
        ));
    }
    Ok(())
}

/// Relabel `g` in place without any communication.
///
/// A serial graph (identity map) is already relabeled and is left untouched.
pub fn relabel_edges_local(
    g: &mut DistributedGraph,
    dist: &VertexDistribution,
    ctx: DistContext,
    cfg: &GraphConfig,
) -> Result<(), GraphError> {
    let rank = ctx.rank;
    check_coupling(g, dist, ctx)?;
    if g.edges_local {
        if g.map.is_identity() {
            return Ok(());
        }
        return Err(invalid(rank, "edges are already relabeled".into()));
    }

    let n_local = g.n_local;
    let capacity = 2 * (g.m_local + g.n_local) as usize;
    let mut map = FastMap::try_init(capacity).ok_or(GraphError::AllocationFailure {
        rank,
        op: OP,
        what: "map",
    })?;

    for (i, &gid) in g.local_unmap.iter().enumerate() {
        if let Some(prev) = map.insert(gid, i as u64) {
            return Err(invalid(
                rank,
                format!("global id {gid} owned twice (local {prev} and {i})"),
            ));
        }
    }

    // `g` is only written once every check below has passed.
    let mut out_edges = try_zeroed::<u64>(g.out_edges.len(), rank, OP, "relabeled edges")?;
    let mut next = n_local;
    for (slot, &gid) in out_edges.iter_mut().zip(&g.out_edges) {
        let (idx, fresh) = map.get_or_assign(gid, next);
        if fresh {
            next += 1;
        }
        *slot = idx;
    }

    let n_ghost = map.num_unique() as u64;
    if cfg.canonical_ghost_order && n_ghost > 0 {
        canonicalize(rank, n_local, &mut map, &mut out_edges)?;
    }

    let (ghost_unmap, ghost_tasks) = if n_ghost > 0 {
        let unmap = ghost_unmap_of(rank, n_local, &map)?;
        let tasks = ghost_tasks_of(rank, g.n, dist, &unmap)?;
        (Some(unmap.into_boxed_slice()), Some(tasks.into_boxed_slice()))
    } else {
        (None, None)
    };

    g.out_edges = out_edges;
    g.map = map;
    g.n_ghost = n_ghost;
    g.n_total = n_local + n_ghost;
    g.ghost_unmap = ghost_unmap;
    g.ghost_tasks = ghost_tasks;
    g.ghost_degrees = Vec::new();
    g.edges_local = true;

    if cfg.debug {
        log::debug!("Task {rank} {OP}() n_ghost {n_ghost}");
    }
    Ok(())
}

/// Re-index ghosts by ascending global id and patch the adjacency.
fn canonicalize(
    rank: usize,
    n_local: u64,
    map: &mut FastMap,
    out_edges: &mut [u64],
) -> Result<(), GraphError> {
    let mut sorted = map.unique_keys().to_vec();
    sorted.par_sort_unstable();
    let mut remap = try_zeroed::<u64>(sorted.len(), rank, OP, "ghost remap")?;
    for (j, &gid) in sorted.iter().enumerate() {
        let old = map
            .get(gid)
            .filter(|&idx| idx >= n_local)
            .ok_or_else(|| inconsistent(rank, format!("ghost {gid} vanished from the map")))?;
        let new = n_local + j as u64;
        remap[(old - n_local) as usize] = new;
        map.insert(gid, new);
    }
    out_edges.par_iter_mut().for_each(|e| {
        if *e >= n_local {
            *e = remap[(*e - n_local) as usize];
        }
    });
    map.set_unique_keys(sorted);
    Ok(())
}

/// `ghost_unmap[j]` is the global id whose map entry is `n_local + j`.
fn ghost_unmap_of(rank: usize, n_local: u64, map: &FastMap) -> Result<Vec<u64>, GraphError> {
    let keys = map.unique_keys();
    let mut unmap = try_zeroed::<u64>(keys.len(), rank, OP, "ghost_unmap")?;
    unmap
        .par_iter_mut()
        .zip(keys.par_iter())
        .enumerate()
        .try_for_each(|(j, (slot, &gid))| match map.get(gid) {
            Some(idx) if idx == n_local + j as u64 => {
                *slot = gid;
                Ok(())
            }
            other => Err(inconsistent(
                rank,
                format!("ghost {gid} maps to {other:?}, expected {}", n_local + j as u64),
            )),
        })?;
    Ok(unmap)
}

fn ghost_tasks_of(
    rank: usize,
    n: u64,
    dist: &VertexDistribution,
    ghost_unmap: &[u64],
) -> Result<Vec<u64>, GraphError> {
    let mut tasks = try_zeroed::<u64>(ghost_unmap.len(), rank, OP, "ghost_tasks")?;
    tasks
        .par_iter_mut()
        .zip(ghost_unmap.par_iter())
        .try_for_each(|(slot, &gid)| {
            if gid >= n {
                return Err(invalid(rank, format!("neighbour id {gid} >= n = {n}")));
            }
            let owner = dist.owner_of(gid);
            if owner == rank {
                return Err(invalid(
                    rank,
                    format!("neighbour {gid} belongs to this rank but is not owned locally"),
                ));
            }
            *slot = owner as u64;
            Ok(())
        })?;
    Ok(tasks)
}

/// Discover ghosts and relabel `g` on every rank. Collective.
pub fn relabel_edges<C>(
    g: &mut DistributedGraph,
    dist: &VertexDistribution,
    comm: &C,
    cfg: &GraphConfig,
) -> Result<(), GraphError>
where
    C: Communicator + ?Sized,
{
    let timer = StepTimer::start(comm, cfg, OP)?;
    let local = relabel_edges_local(g, dist, comm.context(), cfg);
    agree(comm, OP, local)?;
    check_step(comm, cfg, &*g, OP)?;
    timer.finish();
    Ok(())
}
