//! Construction of the local CSR adjacency.
//!
//! Generator input goes through a two-pass counting sort:
//! 1. count edges per local source (parallel, atomic buckets);
//! 2. prefix-sum the counts into `out_degree_list`;
//! 3. copy the offsets into per-source cursors;
//! 4. scatter every destination (and weight) to its source's cursor
//!    (sequential, so equal-source edges keep their input order).
//!
//! Pre-built CSR input is validated and moved in as is. Every constructor
//! finishes with a cooperative agreement, so a rank that fails locally
//! makes all ranks return an error instead of leaving peers blocked in the
//! weight reductions that follow.

use super::input::{CsrInput, EdgeRecord, GeneratedEdges, VertexWeightInput, WeightedGeneratedEdges};
use super::{DistributedGraph, EdgeWeights, StepTimer, VertexWeights};
use crate::comm::{agree, Communicator, DistContext, ReduceOp};
use crate::config::GraphConfig;
use crate::debug_invariants::check_step;
use crate::graph_error::{try_zeroed, GraphError};
use crate::map::FastMap;
use rayon::prelude::*;
use std::sync::atomic::{AtomicU64, Ordering};

struct Csr {
    out_edges: Vec<u64>,
    out_degree_list: Vec<u64>,
    edge_weights: Option<Vec<i32>>,
}

fn invalid(ctx: DistContext, op: &'static str, detail: String) -> GraphError {
    GraphError::InvalidInput {
        rank: ctx.rank,
        op,
        detail,
    }
}

fn counting_sort<E: EdgeRecord>(
    ctx: DistContext,
    op: &'static str,
    n_local: u64,
    n_offset: u64,
    edges: &[E],
    weighted: bool,
) -> Result<Csr, GraphError> {
    let rank = ctx.rank;
    let nl = n_local as usize;
    let m_local = edges.len();

    let mut out_edges = try_zeroed::<u64>(m_local, rank, op, "graph edge storage")?;
    let mut out_degree_list = try_zeroed::<u64>(nl + 1, rank, op, "graph edge storage")?;
    let mut edge_weights = if weighted {
        Some(try_zeroed::<i32>(m_local, rank, op, "edge weights")?)
    } else {
        None
    };
    let mut temp_counts = Vec::new();
    temp_counts
        .try_reserve_exact(nl)
        .map_err(GraphError::alloc(rank, op, "graph edge storage"))?;
    temp_counts.extend((0..nl).map(|_| AtomicU64::new(0)));

    edges.par_iter().enumerate().try_for_each(|(i, e)| {
        let src = e.src();
        match src.checked_sub(n_offset).filter(|&s| s < n_local) {
            Some(s) => {
                temp_counts[s as usize].fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            None => Err(invalid(
                ctx,
                op,
                format!(
                    "edge {i} source {src} outside owned range [{n_offset}, {})",
                    n_offset + n_local
                ),
            )),
        }
    })?;

    for i in 0..nl {
        out_degree_list[i + 1] = out_degree_list[i] + temp_counts[i].load(Ordering::Relaxed);
    }
    drop(temp_counts);
    let mut cursors = try_zeroed::<u64>(nl, rank, op, "graph edge storage")?;
    cursors.copy_from_slice(&out_degree_list[..nl]);

    for e in edges {
        let s = (e.src() - n_offset) as usize;
        let pos = cursors[s] as usize;
        out_edges[pos] = e.dst();
        if let Some(w) = edge_weights.as_mut() {
            w[pos] = e.weight().unwrap_or(1);
        }
        cursors[s] += 1;
    }

    Ok(Csr {
        out_edges,
        out_degree_list,
        edge_weights,
    })
}

/// `local_unmap[i] = i + n_offset`, clamped to `n - 1` for generators that
/// over-allocate the last rank.
fn contiguous_unmap(
    ctx: DistContext,
    op: &'static str,
    n: u64,
    n_local: u64,
    n_offset: u64,
) -> Result<Vec<u64>, GraphError> {
    let mut unmap = try_zeroed::<u64>(n_local as usize, ctx.rank, op, "unmap")?;
    let last = n.saturating_sub(1);
    unmap
        .par_iter_mut()
        .enumerate()
        .for_each(|(i, gid)| *gid = (i as u64 + n_offset).min(last));
    Ok(unmap)
}

fn check_vertex_weights(
    ctx: DistContext,
    op: &'static str,
    n_local: u64,
    input: Option<VertexWeightInput>,
) -> Result<Option<VertexWeights>, GraphError> {
    let Some(VertexWeightInput {
        num_weights,
        values,
    }) = input
    else {
        return Ok(None);
    };
    if num_weights == 0 {
        return Ok(None);
    }
    let want = n_local as usize * num_weights;
    if values.len() != want {
        return Err(invalid(
            ctx,
            op,
            format!(
                "{} vertex weights for {n_local} vertices x {num_weights} dimensions",
                values.len()
            ),
        ));
    }
    Ok(Some(VertexWeights {
        num_weights,
        values,
        sums: Vec::new(),
        maxes: Vec::new(),
    }))
}

fn from_generated<E: EdgeRecord>(
    ctx: DistContext,
    op: &'static str,
    input: GeneratedEdges<E>,
    weighted: bool,
    serial: bool,
) -> Result<DistributedGraph, GraphError> {
    let GeneratedEdges {
        n,
        m,
        n_local,
        n_offset,
        edges,
    } = input;
    if serial && n_offset != 0 {
        return Err(invalid(ctx, op, format!("serial input with n_offset {n_offset}")));
    }
    let csr = counting_sort(ctx, op, n_local, n_offset, &edges, weighted)?;
    let m_local = edges.len() as u64;
    drop(edges);
    let local_unmap = contiguous_unmap(ctx, op, n, n_local, n_offset)?;

    let mut g = DistributedGraph {
        ctx,
        n,
        m,
        n_local,
        m_local,
        n_offset,
        n_total: n_local,
        contiguous: true,
        out_edges: csr.out_edges,
        out_degree_list: csr.out_degree_list,
        local_unmap,
        edge_weights: csr.edge_weights.map(|values| EdgeWeights {
            values,
            ..Default::default()
        }),
        ..Default::default()
    };
    if serial {
        g.map = FastMap::init_identity(n);
        g.edges_local = true;
    }
    Ok(g)
}

fn from_csr(
    ctx: DistContext,
    op: &'static str,
    input: CsrInput,
    serial: bool,
) -> Result<DistributedGraph, GraphError> {
    let n_local = input.n_local();
    let CsrInput {
        n,
        m,
        offsets,
        adjacency,
        global_ids,
        vert_weights,
        edge_weights,
    } = input;

    if offsets.is_empty() || offsets[0] != 0 {
        return Err(invalid(ctx, op, "CSR offsets must start with 0".into()));
    }
    if let Some(i) = offsets.windows(2).position(|w| w[0] > w[1]) {
        return Err(invalid(ctx, op, format!("CSR offsets decrease at {i}")));
    }
    let m_local = adjacency.len() as u64;
    if offsets[offsets.len() - 1] != m_local {
        return Err(invalid(
            ctx,
            op,
            format!(
                "CSR offsets end at {} but adjacency holds {m_local} entries",
                offsets[offsets.len() - 1]
            ),
        ));
    }
    if let Some(w) = &edge_weights {
        if w.len() != adjacency.len() {
            return Err(invalid(
                ctx,
                op,
                format!("{} edge weights for {m_local} edges", w.len()),
            ));
        }
    }
    let vert_weights = check_vertex_weights(ctx, op, n_local, vert_weights)?;

    let local_unmap = if serial {
        if let Some(&e) = adjacency.iter().find(|&&e| e >= n) {
            return Err(invalid(ctx, op, format!("serial adjacency entry {e} >= n = {n}")));
        }
        contiguous_unmap(ctx, op, n, n_local, 0)?
    } else {
        if global_ids.len() as u64 != n_local {
            return Err(invalid(
                ctx,
                op,
                format!("{} global ids for {n_local} vertices", global_ids.len()),
            ));
        }
        global_ids
    };

    Ok(DistributedGraph {
        ctx,
        n,
        m,
        n_local,
        m_local,
        n_offset: 0,
        n_total: n_local,
        contiguous: serial,
        edges_local: serial,
        out_edges: adjacency,
        out_degree_list: offsets,
        local_unmap,
        map: if serial {
            FastMap::init_identity(n)
        } else {
            FastMap::Empty
        },
        vert_weights,
        edge_weights: edge_weights.map(|values| EdgeWeights {
            values,
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// A reduced maximum, or 0 when no rank had a value.
fn max_or_zero(x: i64) -> i32 {
    i32::try_from(x).unwrap_or(0)
}

/// Globally reduce weight sums and maxima. Collective.
///
/// Maxima are over the actual weights, so they may be negative; with no
/// weights anywhere they are 0.
pub(crate) fn reduce_weights<C>(
    comm: &C,
    op: &'static str,
    g: &mut DistributedGraph,
) -> Result<(), GraphError>
where
    C: Communicator + ?Sized,
{
    // Every rank must agree on the weight layout before reducing over it.
    let shape = [g.num_vert_weights() as u64, g.num_edge_weights() as u64];
    let (mut hi, mut lo) = (shape, shape);
    comm.all_reduce_u64(&mut hi, ReduceOp::Max)?;
    comm.all_reduce_u64(&mut lo, ReduceOp::Min)?;
    if hi != lo {
        return Err(GraphError::InvalidInput {
            rank: comm.rank(),
            op,
            detail: format!(
                "ranks disagree on weight layout: local {shape:?}, range {lo:?}..={hi:?}"
            ),
        });
    }

    if let Some(w) = g.vert_weights.as_mut() {
        let k = w.num_weights;
        let mut sums = vec![0i64; k];
        // Ranks without vertices contribute i64::MIN to the max.
        let mut maxes = vec![i64::MIN; k];
        for row in w.values.chunks_exact(k) {
            for (d, &x) in row.iter().enumerate() {
                sums[d] += i64::from(x);
                maxes[d] = maxes[d].max(i64::from(x));
            }
        }
        comm.all_reduce_i64(&mut sums, ReduceOp::Sum)?;
        comm.all_reduce_i64(&mut maxes, ReduceOp::Max)?;
        w.sums = sums;
        w.maxes = maxes.into_iter().map(max_or_zero).collect();
    }

    if let Some(w) = g.edge_weights.as_mut() {
        let mut sum = [w.values.par_iter().map(|&x| i64::from(x)).sum::<i64>()];
        let mut max = [w.values.par_iter().map(|&x| i64::from(x)).max().unwrap_or(i64::MIN)];
        comm.all_reduce_i64(&mut sum, ReduceOp::Sum)?;
        comm.all_reduce_i64(&mut max, ReduceOp::Max)?;
        w.sum = sum[0];
        w.max = max_or_zero(max[0]);
    }
    Ok(())
}

fn finish<C>(
    comm: &C,
    cfg: &GraphConfig,
    op: &'static str,
    local: Result<DistributedGraph, GraphError>,
    timer: StepTimer,
) -> Result<DistributedGraph, GraphError>
where
    C: Communicator + ?Sized,
{
    let mut g = agree(comm, op, local)?;
    reduce_weights(comm, op, &mut g)?;
    check_step(comm, cfg, &g, op)?;
    timer.finish();
    Ok(g)
}

/// Unweighted generator input on a rank owning `[n_offset, n_offset + n_local)`.
pub fn create_graph<C>(
    input: GeneratedEdges,
    comm: &C,
    cfg: &GraphConfig,
) -> Result<DistributedGraph, GraphError>
where
    C: Communicator + ?Sized,
{
    const OP: &str = "create_graph";
    let timer = StepTimer::start(comm, cfg, OP)?;
    let local = from_generated(comm.context(), OP, input, false, false);
    finish(comm, cfg, OP, local, timer)
}

/// Build this rank's CSR from generator input without communicating.
///
/// No agreement or weight reduction takes place; pair it with
/// [`super::relabel::relabel_edges_local`] for per-rank experiments.
pub fn create_graph_local(
    input: GeneratedEdges,
    ctx: DistContext,
) -> Result<DistributedGraph, GraphError> {
    from_generated(ctx, "create_graph", input, false, false)
}

/// Weighted generator input: `(src, dst, weight)` triples plus optional
/// vertex weights.
pub fn create_graph_weighted<C>(
    input: WeightedGeneratedEdges,
    comm: &C,
    cfg: &GraphConfig,
) -> Result<DistributedGraph, GraphError>
where
    C: Communicator + ?Sized,
{
    const OP: &str = "create_graph_weighted";
    let timer = StepTimer::start(comm, cfg, OP)?;
    let ctx = comm.context();
    let local = from_generated(ctx, OP, input.edges, true, false).and_then(|mut g| {
        g.vert_weights = check_vertex_weights(ctx, OP, g.n_local, input.vert_weights)?;
        Ok(g)
    });
    finish(comm, cfg, OP, local, timer)
}

/// Single-rank input: `n_offset = 0`, no ghosts, identity map over `n`.
pub fn create_graph_serial<C>(
    input: GeneratedEdges,
    comm: &C,
    cfg: &GraphConfig,
) -> Result<DistributedGraph, GraphError>
where
    C: Communicator + ?Sized,
{
    const OP: &str = "create_graph_serial";
    let timer = StepTimer::start(comm, cfg, OP)?;
    let local = from_generated(comm.context(), OP, input, false, true);
    finish(comm, cfg, OP, local, timer)
}

/// Single-rank weighted input.
pub fn create_graph_serial_weighted<C>(
    input: WeightedGeneratedEdges,
    comm: &C,
    cfg: &GraphConfig,
) -> Result<DistributedGraph, GraphError>
where
    C: Communicator + ?Sized,
{
    const OP: &str = "create_graph_serial_weighted";
    let timer = StepTimer::start(comm, cfg, OP)?;
    let ctx = comm.context();
    let local = from_generated(ctx, OP, input.edges, true, true).and_then(|mut g| {
        g.vert_weights = check_vertex_weights(ctx, OP, g.n_local, input.vert_weights)?;
        Ok(g)
    });
    finish(comm, cfg, OP, local, timer)
}

/// Pre-built CSR with explicit global ids, moved into the graph.
/// Neighbour references are global ids until relabeling.
pub fn create_graph_from_csr<C>(
    input: CsrInput,
    comm: &C,
    cfg: &GraphConfig,
) -> Result<DistributedGraph, GraphError>
where
    C: Communicator + ?Sized,
{
    const OP: &str = "create_graph";
    let timer = StepTimer::start(comm, cfg, OP)?;
    let local = from_csr(comm.context(), OP, input, false);
    finish(comm, cfg, OP, local, timer)
}

/// Pre-built single-rank CSR; local index equals global id.
pub fn create_graph_serial_from_csr<C>(
    input: CsrInput,
    comm: &C,
    cfg: &GraphConfig,
) -> Result<DistributedGraph, GraphError>
where
    C: Communicator + ?Sized,
{
    const OP: &str = "create_graph_serial";
    let timer = StepTimer::start(comm, cfg, OP)?;
    let local = from_csr(comm.context(), OP, input, true);
    finish(comm, cfg, OP, local, timer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::NoComm;
    use crate::debug_invariants::DebugInvariants;

    #[test]
    fn counting_sort_groups_by_source_in_input_order() {
        // owned ids 10..14
        let edges = vec![(12, 1), (10, 7), (12, 3), (13, 0), (10, 8)];
        let input = GeneratedEdges::new(20, 5, 4, 10, edges);
        let g = create_graph(input, &NoComm, &GraphConfig::default()).unwrap();
        assert_eq!(g.out_degree_list(), &[0, 2, 2, 4, 5]);
        assert_eq!(g.out_edges(), &[7, 8, 1, 3, 0]);
        assert_eq!(g.local_unmap(), &[10, 11, 12, 13]);
        assert!(!g.is_relabeled());
        assert!(g.validate_invariants().is_ok());
    }

    #[test]
    fn unmap_clamps_overallocated_range() {
        let input = GeneratedEdges::<(u64, u64)>::new(10, 0, 4, 8, vec![]);
        let g = create_graph(input, &NoComm, &GraphConfig::default()).unwrap();
        assert_eq!(g.local_unmap(), &[8, 9, 9, 9]);
    }

    #[test]
    fn out_of_range_source_is_invalid_input() {
        let input = GeneratedEdges::new(10, 1, 2, 0, vec![(5, 1)]);
        let err = create_graph(input, &NoComm, &GraphConfig::default()).unwrap_err();
        assert!(matches!(err, GraphError::InvalidInput { op: "create_graph", .. }));
    }

    #[test]
    fn serial_graph_has_no_ghosts_and_identity_map() {
        let edges = vec![(0, 1), (1, 2), (2, 0), (0, 2)];
        let g = create_graph_serial(
            GeneratedEdges::new(3, 4, 3, 0, edges),
            &NoComm,
            &GraphConfig::verified(),
        )
        .unwrap();
        assert_eq!(g.n_ghost(), 0);
        assert_eq!(g.n_total(), 3);
        assert!(g.ghost_unmap().is_none());
        assert!(g.ghost_tasks().is_none());
        assert!(g.map().is_identity());
        assert_eq!(g.out_vertices(0), &[1, 2]);
    }

    #[test]
    fn weighted_construction_keeps_weights_parallel_to_edges() {
        let input = WeightedGeneratedEdges {
            edges: GeneratedEdges::new(4, 3, 2, 0, vec![(1, 3, 7), (0, 2, 5), (1, 0, 2)]),
            vert_weights: Some(VertexWeightInput {
                num_weights: 2,
                values: vec![1, 4, 3, 2],
            }),
        };
        let g = create_graph_weighted(input, &NoComm, &GraphConfig::verified()).unwrap();
        assert_eq!(g.out_vertices(1), &[3, 0]);
        assert_eq!(g.out_weights(1), Some(&[7, 2][..]));
        assert_eq!(g.out_weights(0), Some(&[5][..]));
        let ew = g.edge_weights().unwrap();
        assert_eq!((ew.sum, ew.max), (14, 7));
        let vw = g.vert_weights().unwrap();
        assert_eq!(vw.sums, vec![4, 6]);
        assert_eq!(vw.maxes, vec![3, 4]);
        assert_eq!(vw.of(1), &[3, 2]);
    }

    #[test]
    fn mis_sized_vertex_weights_are_rejected() {
        let input = WeightedGeneratedEdges {
            edges: GeneratedEdges::new(4, 0, 2, 0, vec![]),
            vert_weights: Some(VertexWeightInput {
                num_weights: 2,
                values: vec![1, 2, 3],
            }),
        };
        assert!(create_graph_serial_weighted(input, &NoComm, &GraphConfig::default()).is_err());
    }

    #[test]
    fn csr_input_is_moved_in_and_validated() {
        let good = CsrInput {
            n: 8,
            m: 3,
            offsets: vec![0, 2, 3],
            adjacency: vec![5, 7, 6],
            global_ids: vec![4, 5],
            ..Default::default()
        };
        let g = create_graph_from_csr(good.clone(), &NoComm, &GraphConfig::default()).unwrap();
        assert_eq!(g.local_unmap(), &[4, 5]);
        assert_eq!(g.n_offset(), 0);
        assert_eq!(g.out_vertices(0), &[5, 7]);

        let bad = CsrInput {
            offsets: vec![0, 2, 4],
            ..good.clone()
        };
        assert!(create_graph_from_csr(bad, &NoComm, &GraphConfig::default()).is_err());

        let bad_ids = CsrInput {
            global_ids: vec![4],
            ..good
        };
        assert!(create_graph_from_csr(bad_ids, &NoComm, &GraphConfig::default()).is_err());
    }

    #[test]
    fn serial_csr_reduces_weights() {
        let input = CsrInput {
            n: 3,
            m: 2,
            offsets: vec![0, 1, 2, 2],
            adjacency: vec![1, 2],
            vert_weights: Some(VertexWeightInput {
                num_weights: 1,
                values: vec![2, 9, 4],
            }),
            edge_weights: Some(vec![3, 1]),
            ..Default::default()
        };
        let g = create_graph_serial_from_csr(input, &NoComm, &GraphConfig::verified()).unwrap();
        assert_eq!(g.vert_weights().unwrap().sums, vec![15]);
        assert_eq!(g.vert_weights().unwrap().maxes, vec![9]);
        assert_eq!(g.num_edge_weights(), 1);
        assert!(g.is_relabeled());
    }

    #[test]
    fn negative_weight_maxima_are_kept() {
        let input = WeightedGeneratedEdges {
            edges: GeneratedEdges::new(2, 1, 2, 0, vec![(0, 1, -5)]),
            vert_weights: Some(VertexWeightInput {
                num_weights: 1,
                values: vec![-3, -7],
            }),
        };
        let g = create_graph_serial_weighted(input, &NoComm, &GraphConfig::verified()).unwrap();
        assert_eq!(g.vert_weights().unwrap().maxes, vec![-3]);
        assert_eq!(g.vert_weights().unwrap().sums, vec![-10]);
        let ew = g.edge_weights().unwrap();
        assert_eq!((ew.sum, ew.max), (-5, -5));
    }

    #[test]
    fn empty_weights_reduce_to_zero_max() {
        let input = WeightedGeneratedEdges {
            edges: GeneratedEdges::new(0, 0, 0, 0, vec![]),
            vert_weights: Some(VertexWeightInput {
                num_weights: 2,
                values: vec![],
            }),
        };
        let g = create_graph_weighted(input, &NoComm, &GraphConfig::default()).unwrap();
        assert_eq!(g.vert_weights().unwrap().maxes, vec![0, 0]);
        assert_eq!(g.edge_weights().unwrap().max, 0);
    }
}
