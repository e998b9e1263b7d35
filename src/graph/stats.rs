//! Global statistics and synthetic weights.

use super::build::reduce_weights;
use super::{DistributedGraph, EdgeWeights, StepTimer, VertexWeights};
use crate::comm::{agree, Communicator, ReduceOp};
use crate::config::GraphConfig;
use crate::debug_invariants::check_step;
use crate::graph_error::{try_zeroed, GraphError};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// The vertex of globally maximal out-degree; ties go to the smallest id.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaxDegreeVert {
    pub vert: u64,
    pub degree: u64,
}

/// Find the highest-degree vertex across all ranks and cache it on `g`.
///
/// Each rank reports its first vertex of maximal degree; the global maximum
/// degree is reduced first, then the smallest id among the ranks that reach
/// it. When no vertex anywhere has an out-edge, `vert` is `u64::MAX` and
/// `degree` is 0. Collective.
pub fn get_max_degree_vert<C>(
    g: &mut DistributedGraph,
    comm: &C,
    cfg: &GraphConfig,
) -> Result<MaxDegreeVert, GraphError>
where
    C: Communicator + ?Sized,
{
    const OP: &str = "get_max_degree_vert";
    let timer = StepTimer::start(comm, cfg, OP)?;

    let mut best: Option<(u64, u64)> = None;
    for v in 0..g.n_local {
        let degree = g.out_degree(v);
        if degree > 0 && best.is_none_or(|(d, _)| degree > d) {
            best = Some((degree, g.local_unmap[v as usize]));
        }
    }

    let mut degree = [best.map_or(0, |(d, _)| d)];
    comm.all_reduce_u64(&mut degree, ReduceOp::Max)?;
    let mut vert = [match best {
        Some((d, gid)) if d == degree[0] => gid,
        _ => u64::MAX,
    }];
    comm.all_reduce_u64(&mut vert, ReduceOp::Min)?;

    let found = MaxDegreeVert {
        vert: vert[0],
        degree: degree[0],
    };
    g.max_degree_vert = Some(found);
    if cfg.verbose {
        log::info!(
            "Task {} {OP}() vert {} degree {}",
            comm.rank(),
            found.vert,
            found.degree
        );
    }
    timer.finish();
    Ok(found)
}

fn saturate(x: u64) -> i32 {
    i32::try_from(x).unwrap_or(i32::MAX)
}

fn synthetic_weights(
    g: &DistributedGraph,
    num_vert_weights: usize,
    op: &'static str,
) -> Result<(VertexWeights, EdgeWeights), GraphError> {
    let rank = g.ctx.rank;
    let invalid = |detail: String| GraphError::InvalidInput { rank, op, detail };
    if !(2..=3).contains(&num_vert_weights) {
        return Err(invalid(format!(
            "{num_vert_weights} vertex weight dimensions requested, expected 2 or 3"
        )));
    }
    if num_vert_weights == 3 {
        if !g.edges_local {
            return Err(invalid("neighbour degree weights need a relabeled graph".into()));
        }
        if g.n_ghost > 0 && g.ghost_degrees.len() as u64 != g.n_ghost {
            return Err(invalid(
                "neighbour degree weights need ghost degrees; run get_ghost_degrees first".into(),
            ));
        }
    }

    let n_local = g.n_local as usize;
    let mut values = try_zeroed::<i32>(n_local * num_vert_weights, rank, op, "vertex weights")?;
    values
        .par_chunks_mut(num_vert_weights)
        .enumerate()
        .for_each(|(v, row)| {
            let v = v as u64;
            row[0] = 1;
            row[1] = saturate(g.out_degree(v));
            if let Some(nbr) = row.get_mut(2) {
                let sum: u64 = g
                    .out_vertices(v)
                    .iter()
                    .map(|&u| {
                        if u < g.n_local {
                            g.out_degree(u)
                        } else {
                            g.ghost_degrees[(u - g.n_local) as usize]
                        }
                    })
                    .sum();
                *nbr = saturate(sum);
            }
        });

    let mut unit = try_zeroed::<i32>(g.m_local as usize, rank, op, "edge weights")?;
    unit.par_iter_mut().for_each(|w| *w = 1);

    Ok((
        VertexWeights {
            num_weights: num_vert_weights,
            values,
            ..Default::default()
        },
        EdgeWeights {
            values: unit,
            ..Default::default()
        },
    ))
}

/// Replace the graph's weights with synthetic ones for testing partitioners.
///
/// Dimensions are `1` and out-degree, plus the sum of neighbour out-degrees
/// when `num_vert_weights == 3`; every edge weighs 1. Collective.
pub fn set_weights_graph<C>(
    g: &mut DistributedGraph,
    comm: &C,
    num_vert_weights: usize,
    cfg: &GraphConfig,
) -> Result<(), GraphError>
where
    C: Communicator + ?Sized,
{
    const OP: &str = "set_weights_graph";
    let timer = StepTimer::start(comm, cfg, OP)?;
    let (vw, ew) = agree(comm, OP, synthetic_weights(g, num_vert_weights, OP))?;
    g.vert_weights = Some(vw);
    g.edge_weights = Some(ew);
    reduce_weights(comm, OP, g)?;
    check_step(comm, cfg, &*g, OP)?;
    timer.finish();
    Ok(())
}

/// Per-rank snapshot for logs and reports.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GraphSummary {
    pub rank: usize,
    pub nprocs: usize,
    pub n: u64,
    pub m: u64,
    pub n_local: u64,
    pub m_local: u64,
    pub n_ghost: u64,
    pub n_total: u64,
    pub relabeled: bool,
    pub num_vert_weights: usize,
    pub num_edge_weights: usize,
    pub max_degree_vert: Option<MaxDegreeVert>,
}

impl GraphSummary {
    pub fn of(g: &DistributedGraph) -> Self {
        Self {
            rank: g.ctx.rank,
            nprocs: g.ctx.nprocs,
            n: g.n,
            m: g.m,
            n_local: g.n_local,
            m_local: g.m_local,
            n_ghost: g.n_ghost,
            n_total: g.n_total,
            relabeled: g.edges_local,
            num_vert_weights: g.num_vert_weights(),
            num_edge_weights: g.num_edge_weights(),
            max_degree_vert: g.max_degree_vert,
        }
    }
}
