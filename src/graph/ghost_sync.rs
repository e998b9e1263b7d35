//! Fetch a per-vertex value computed on each ghost's owner.
//!
//! The protocol runs in four phases, each a rayon call or a single-threaded
//! step on the calling thread:
//! 1. **tally**: every worker counts records per destination rank over its
//!    share of the owned vertices and merges the tally into [`SendCounts`];
//! 2. **allocate**: the send buffer is laid out from the merged counts;
//! 3. **fill**: workers stage `(global id, value)` records per destination
//!    and flush them into the buffer;
//! 4. **exchange + scatter**: the calling thread runs the all-to-all, then
//!    the received records are written to their ghost slots in parallel.
//!
//! Collectives never run inside a rayon closure.

use super::{DistributedGraph, StepTimer};
use crate::comm::exchange::{exchange_vertex_data, SendBuffer, SendCounts, ThreadStage};
use crate::comm::wire::WireVertexDatum;
use crate::comm::{agree, Communicator};
use crate::config::{GhostSyncPolicy, GraphConfig};
use crate::debug_invariants::check_step;
use crate::graph_error::GraphError;
use itertools::Itertools;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Which owned vertices a [`GhostSyncPolicy::Broadcast`] sync sends.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Senders {
    All,
    /// Skip vertices without out-edges; receivers keep 0 for them.
    WithOutEdges,
}

/// Call `f` once per rank that must receive owned vertex `v`.
fn for_each_target(
    g: &DistributedGraph,
    policy: GhostSyncPolicy,
    senders: Senders,
    v: u64,
    mut f: impl FnMut(usize),
) {
    match policy {
        GhostSyncPolicy::Broadcast => {
            if senders == Senders::All || g.out_degree(v) > 0 {
                (0..g.ctx.nprocs).filter(|&r| r != g.ctx.rank).for_each(f);
            }
        }
        GhostSyncPolicy::Neighbors => {
            let Some(tasks) = g.ghost_tasks() else {
                return;
            };
            g.out_vertices(v)
                .iter()
                .filter(|&&u| u >= g.n_local)
                .map(|&u| tasks[(u - g.n_local) as usize] as usize)
                .sorted_unstable()
                .dedup()
                .for_each(&mut f);
        }
    }
}

fn tally(g: &DistributedGraph, policy: GhostSyncPolicy, senders: Senders) -> Vec<usize> {
    let nprocs = g.ctx.nprocs;
    let counts = SendCounts::new(nprocs);
    (0..g.n_local)
        .into_par_iter()
        .fold(
            || vec![0u64; nprocs],
            |mut local, v| {
                for_each_target(g, policy, senders, v, |dst| local[dst] += 1);
                local
            },
        )
        .for_each(|local| counts.merge(&local));
    counts.snapshot()
}

fn fill<F>(
    g: &DistributedGraph,
    cfg: &GraphConfig,
    op: &'static str,
    senders: Senders,
    value_of: &F,
) -> Result<SendBuffer, GraphError>
where
    F: Fn(u64) -> u64 + Sync,
{
    let nprocs = g.ctx.nprocs;
    let policy = cfg.ghost_sync;
    let counts = tally(g, policy, senders);
    let buf = SendBuffer::allocate(g.ctx.rank, &counts).map_err(|e| match e {
        GraphError::AllocationFailure { rank, what, .. } => {
            GraphError::AllocationFailure { rank, op, what }
        }
        other => other,
    })?;

    (0..g.n_local)
        .into_par_iter()
        .try_fold(
            || ThreadStage::new(nprocs, cfg.stage_capacity),
            |mut stage, v| {
                let record = WireVertexDatum::new(g.local_unmap[v as usize], value_of(v));
                let mut pushed = Ok(());
                for_each_target(g, policy, senders, v, |dst| {
                    if pushed.is_ok() {
                        pushed = stage.push(dst, record, &buf);
                    }
                });
                pushed.map(|()| stage)
            },
        )
        .try_for_each(|stage| {
            let mut stage = stage?;
            stage.flush_all(&buf)
        })?;

    buf.check_full()?;
    Ok(buf)
}

fn scatter(
    g: &DistributedGraph,
    policy: GhostSyncPolicy,
    op: &'static str,
    records: &[WireVertexDatum],
) -> Result<Vec<u64>, GraphError> {
    let rank = g.ctx.rank;
    let n_local = g.n_local;
    let n_ghost = g.n_ghost as usize;
    let inconsistent = |detail: String| GraphError::LookupInconsistency { rank, op, detail };

    let mut slots = Vec::new();
    slots
        .try_reserve_exact(n_ghost)
        .map_err(GraphError::alloc(rank, op, "ghost values"))?;
    slots.extend((0..n_ghost).map(|_| AtomicU64::new(0)));
    let mut seen = Vec::new();
    seen.try_reserve_exact(n_ghost)
        .map_err(GraphError::alloc(rank, op, "ghost values"))?;
    seen.extend((0..n_ghost).map(|_| AtomicBool::new(false)));

    records.par_iter().try_for_each(|rec| {
        let gid = rec.gid();
        match g.map.get(gid) {
            Some(idx) if idx >= n_local && idx < g.n_total => {
                let j = (idx - n_local) as usize;
                slots[j].store(rec.value(), Ordering::Relaxed);
                seen[j].store(true, Ordering::Relaxed);
                Ok(())
            }
            Some(idx) => Err(inconsistent(format!(
                "received owned vertex {gid} (local index {idx})"
            ))),
            None if policy == GhostSyncPolicy::Broadcast => Ok(()),
            None => Err(inconsistent(format!("received {gid}, which is not a ghost here"))),
        }
    })?;

    // Broadcast may skip sink owners, whose ghosts keep 0. Neighbors must
    // cover every ghost.
    if policy == GhostSyncPolicy::Neighbors {
        if let Some(j) = seen.iter().position(|s| !s.load(Ordering::Relaxed)) {
            let gid = g.ghost_unmap().map_or(0, |u| u[j]);
            return Err(inconsistent(format!(
                "ghost {gid} received no value; is the adjacency symmetric?"
            )));
        }
    }
    Ok(slots.into_iter().map(AtomicU64::into_inner).collect())
}

fn sync_with<C, F>(
    g: &DistributedGraph,
    comm: &C,
    cfg: &GraphConfig,
    op: &'static str,
    senders: Senders,
    value_of: F,
) -> Result<Vec<u64>, GraphError>
where
    C: Communicator + ?Sized,
    F: Fn(u64) -> u64 + Sync,
{
    let rank = comm.rank();
    let ready = if !g.edges_local {
        Err(GraphError::InvalidInput {
            rank,
            op,
            detail: "graph must be relabeled before ghost synchronization".into(),
        })
    } else if g.ctx != comm.context() {
        Err(GraphError::InvalidInput {
            rank,
            op,
            detail: format!("graph built for {:?}, communicator is {:?}", g.ctx, comm.context()),
        })
    } else {
        Ok(())
    };
    agree(comm, op, ready)?;

    let buf = agree(comm, op, fill(g, cfg, op, senders, &value_of))?;
    let mut recv = exchange_vertex_data(comm, buf)?;
    if cfg.debug {
        log::debug!(
            "Task {rank} {op}() received {} records for {} ghosts",
            recv.total_recv(),
            g.n_ghost
        );
    }
    let values = scatter(g, cfg.ghost_sync, op, &recv.records);
    recv.clear();
    agree(comm, op, values)
}

/// Values of `value_of(v)` on each ghost's owner, indexed by ghost
/// (`local - n_local`). Collective; `g` must be relabeled.
///
/// Every ghost gets its owner's value, including ghosts whose owner has no
/// out-edges.
pub fn sync_ghost_attribute<C, F>(
    g: &DistributedGraph,
    comm: &C,
    cfg: &GraphConfig,
    value_of: F,
) -> Result<Vec<u64>, GraphError>
where
    C: Communicator + ?Sized,
    F: Fn(u64) -> u64 + Sync,
{
    const OP: &str = "sync_ghost_attribute";
    let timer = StepTimer::start(comm, cfg, OP)?;
    let values = sync_with(g, comm, cfg, OP, Senders::All, value_of)?;
    timer.finish();
    Ok(values)
}

/// Fill `ghost_degrees` with each ghost's out-degree on its owner. Collective.
///
/// Owners do not send vertices of degree 0, which is also the value an
/// unsent ghost reads.
pub fn get_ghost_degrees<C>(
    g: &mut DistributedGraph,
    comm: &C,
    cfg: &GraphConfig,
) -> Result<(), GraphError>
where
    C: Communicator + ?Sized,
{
    const OP: &str = "get_ghost_degrees";
    let timer = StepTimer::start(comm, cfg, OP)?;
    let graph: &DistributedGraph = g;
    let degrees = sync_with(graph, comm, cfg, OP, Senders::WithOutEdges, |v| {
        graph.out_degree(v)
    })?;
    g.ghost_degrees = degrees;
    check_step(comm, cfg, &*g, OP)?;
    timer.finish();
    Ok(())
}
