mod util;
use dist_graph::prelude::*;
use proptest::prelude::*;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, BTreeSet};
use util::*;

fn random_edges(n: u64, m: usize, seed: u64) -> Vec<(u64, u64)> {
    let mut rng = SmallRng::seed_from_u64(seed);
    (0..m)
        .map(|_| (rng.gen_range(0..n), rng.gen_range(0..n)))
        .collect()
}

fn build(comm: &ThreadComm, n: u64, edges: &[(u64, u64)]) -> DistributedGraph {
    let cfg = GraphConfig::verified();
    let dist = VertexDistribution::uniform(n, comm.size());
    let mut g = create_graph(local_edges(&dist, comm.rank(), edges), comm, &cfg).unwrap();
    relabel_edges(&mut g, &dist, comm, &cfg).unwrap();
    get_ghost_degrees(&mut g, comm, &cfg).unwrap();
    g
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn csr_recovers_every_input_neighbor(
        n in 1u64..40,
        m in 0usize..120,
        nprocs in 1usize..5,
        seed in any::<u64>(),
    ) {
        let edges = random_edges(n, m, seed);
        let graphs = run_ranks(nprocs, |comm| build(comm, n, &edges));

        let mut want: BTreeMap<u64, Vec<u64>> = BTreeMap::new();
        for &(s, d) in &edges {
            want.entry(s).or_default().push(d);
        }
        let mut degree = vec![0u64; n as usize];
        for &(s, _) in &edges {
            degree[s as usize] += 1;
        }

        let mut seen_vertices = 0;
        for g in &graphs {
            prop_assert_eq!(g.out_degree_list()[g.n_local() as usize], g.m_local());
            seen_vertices += g.n_local();
            for v in 0..g.n_local() {
                let gid = g.local_unmap()[v as usize];
                let mut expect = want.get(&gid).cloned().unwrap_or_default();
                expect.sort_unstable();
                prop_assert_eq!(neighbor_gids(g, v), expect);
                prop_assert_eq!(g.local_index(gid), Some(v));
            }
        }
        prop_assert_eq!(seen_vertices, n);
        prop_assert_eq!(graphs.iter().map(|g| g.m_local()).sum::<u64>(), m as u64);

        for (rank, g) in graphs.iter().enumerate() {
            let dist = VertexDistribution::uniform(n, nprocs);
            let owned = dist.local_range(rank);
            let expected: BTreeSet<u64> = edges
                .iter()
                .filter(|(s, d)| owned.contains(s) && !owned.contains(d))
                .map(|&(_, d)| d)
                .collect();
            let ghosts = g.ghost_unmap().unwrap_or_default();
            prop_assert_eq!(ghosts.iter().copied().collect::<BTreeSet<_>>(), expected);
            prop_assert_eq!(ghosts.len() as u64, g.n_ghost());
            for (j, &gid) in ghosts.iter().enumerate() {
                let local = g.n_local() + j as u64;
                prop_assert_eq!(g.local_index(gid), Some(local));
                prop_assert_eq!(g.ghost_owner(local), Some(dist.owner_of(gid) as u64));
                prop_assert_eq!(g.ghost_degree(local), Some(degree[gid as usize]));
            }
        }
    }

    #[test]
    fn explicit_owner_is_the_range_containing_the_id(
        cuts in prop::collection::vec(0u64..64, 1..6),
        gid in 0u64..64,
    ) {
        let mut cuts = cuts;
        cuts.sort_unstable();
        let mut bounds = vec![0];
        bounds.extend(cuts);
        bounds.push(64);
        let dist = VertexDistribution::explicit(bounds, 0).unwrap();
        let owner = dist.owner_of(gid);
        prop_assert!(dist.local_range(owner).contains(&gid));
    }
}
