#![allow(dead_code)]
use dist_graph::prelude::*;

/// Run `f` once per rank of a fresh `size`-rank group, each on its own thread.
/// Results come back in rank order.
pub fn run_ranks<R: Send>(size: usize, f: impl Fn(&ThreadComm) -> R + Sync) -> Vec<R> {
    let comms = ThreadComm::group(size);
    std::thread::scope(|s| {
        let handles: Vec<_> = comms.iter().map(|c| s.spawn(|| f(c))).collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("rank thread panicked"))
            .collect()
    })
}

/// Directed ring `i -> i + 1 mod n`.
pub fn directed_ring(n: u64) -> Vec<(u64, u64)> {
    (0..n).map(|i| (i, (i + 1) % n)).collect()
}

/// Undirected ring, both directions of every edge.
pub fn undirected_ring(n: u64) -> Vec<(u64, u64)> {
    (0..n)
        .flat_map(|i| [(i, (i + 1) % n), (i, (i + n - 1) % n)])
        .collect()
}

/// The edges of `all` whose source `rank` owns under `dist`.
pub fn local_edges(
    dist: &VertexDistribution,
    rank: usize,
    all: &[(u64, u64)],
) -> GeneratedEdges {
    let range = dist.local_range(rank);
    let edges = all
        .iter()
        .copied()
        .filter(|(s, _)| range.contains(s))
        .collect();
    GeneratedEdges::for_rank(dist, rank, all.len() as u64, edges)
}

/// Neighbour global ids of local vertex `v`, reverse-mapped and sorted.
pub fn neighbor_gids(g: &DistributedGraph, v: u64) -> Vec<u64> {
    let mut out: Vec<u64> = g
        .out_vertices(v)
        .iter()
        .map(|&u| g.global_id(u).expect("dangling local index"))
        .collect();
    out.sort_unstable();
    out
}
