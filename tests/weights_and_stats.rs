mod util;
use dist_graph::graph::input::VertexWeightInput;
use dist_graph::prelude::*;
use serial_test::serial;
use util::*;

fn weighted_input(dist: &VertexDistribution, rank: usize) -> WeightedGeneratedEdges {
    let range = dist.local_range(rank);
    let edges: Vec<(u64, u64, i32)> = range
        .clone()
        .map(|i| (i, (i + 1) % dist.n(), i as i32 + 1))
        .collect();
    let values: Vec<i32> = range.flat_map(|i| [1, i as i32]).collect();
    WeightedGeneratedEdges {
        edges: GeneratedEdges::for_rank(dist, rank, dist.n(), edges),
        vert_weights: Some(VertexWeightInput {
            num_weights: 2,
            values,
        }),
    }
}

#[test]
#[serial]
fn weight_sums_and_maxima_are_global() {
    let out = run_ranks(4, |comm| {
        let dist = VertexDistribution::uniform(16, comm.size());
        let g = create_graph_weighted(weighted_input(&dist, comm.rank()), comm, &GraphConfig::verified())
            .unwrap();
        (
            g.vert_weights().cloned().unwrap(),
            g.edge_weights().cloned().unwrap(),
        )
    });
    for (vw, ew) in out {
        assert_eq!(vw.sums, vec![16, 120]);
        assert_eq!(vw.maxes, vec![1, 15]);
        assert_eq!(ew.sum, 136);
        assert_eq!(ew.max, 16);
    }
}

#[test]
#[serial]
fn negative_maxima_ignore_ranks_without_vertices() {
    let out = run_ranks(3, |comm| {
        // ranks 0 and 1 own one vertex each, rank 2 owns none
        let dist = VertexDistribution::uniform(2, comm.size());
        let range = dist.local_range(comm.rank());
        let edges: Vec<(u64, u64, i32)> = range.clone().map(|i| (i, 1 - i, -4 - i as i32)).collect();
        let values: Vec<i32> = range.map(|i| -3 - 4 * i as i32).collect();
        let input = WeightedGeneratedEdges {
            edges: GeneratedEdges::for_rank(&dist, comm.rank(), 2, edges),
            vert_weights: Some(VertexWeightInput {
                num_weights: 1,
                values,
            }),
        };
        let g = create_graph_weighted(input, comm, &GraphConfig::verified()).unwrap();
        (
            g.vert_weights().cloned().unwrap(),
            g.edge_weights().cloned().unwrap(),
        )
    });
    for (vw, ew) in out {
        assert_eq!(vw.sums, vec![-10]);
        assert_eq!(vw.maxes, vec![-3]);
        assert_eq!((ew.sum, ew.max), (-9, -4));
    }
}

#[test]
#[serial]
fn ranks_disagreeing_on_weight_layout_all_fail() {
    let results = run_ranks(2, |comm| {
        let dist = VertexDistribution::uniform(8, comm.size());
        let mut input = weighted_input(&dist, comm.rank());
        if comm.rank() == 1 {
            input.vert_weights = None;
        }
        create_graph_weighted(input, comm, &GraphConfig::default()).map(|_| ())
    });
    for r in results {
        assert!(matches!(r, Err(GraphError::InvalidInput { .. })));
    }
}

#[test]
#[serial]
fn max_degree_tie_goes_to_smallest_global_id() {
    let mut edges = undirected_ring(16);
    // degree 3 at gids 13 and 6, on different ranks
    edges.push((13, 0));
    edges.push((6, 0));
    let found = run_ranks(4, |comm| {
        let cfg = GraphConfig::default();
        let dist = VertexDistribution::uniform(16, comm.size());
        let mut g = create_graph(local_edges(&dist, comm.rank(), &edges), comm, &cfg).unwrap();
        let found = get_max_degree_vert(&mut g, comm, &cfg).unwrap();
        assert_eq!(g.max_degree_vert(), Some(found));
        found
    });
    for f in found {
        assert_eq!((f.vert, f.degree), (6, 3));
    }
}

#[test]
#[serial]
fn synthetic_weights_see_remote_degrees() {
    let ring = undirected_ring(16);
    let out = run_ranks(4, |comm| {
        let cfg = GraphConfig::verified();
        let dist = VertexDistribution::uniform(16, comm.size());
        let mut g = create_graph(local_edges(&dist, comm.rank(), &ring), comm, &cfg).unwrap();
        relabel_edges(&mut g, &dist, comm, &cfg).unwrap();
        get_ghost_degrees(&mut g, comm, &cfg).unwrap();
        set_weights_graph(&mut g, comm, 3, &cfg).unwrap();
        let summary = GraphSummary::of(&g);
        (g.vert_weights().cloned().unwrap(), summary)
    });
    for (vw, summary) in out {
        assert!(vw.values.chunks(3).all(|row| row == [1, 2, 4]));
        assert_eq!(vw.sums, vec![16, 32, 64]);
        assert_eq!(vw.maxes, vec![1, 2, 4]);
        assert_eq!(summary.num_vert_weights, 3);
        assert_eq!(summary.num_edge_weights, 1);
        assert_eq!(summary.n_ghost, 2);
    }
}

#[test]
#[serial]
fn neighbour_degree_weights_require_ghost_degrees() {
    let ring = undirected_ring(16);
    let results = run_ranks(2, |comm| {
        let cfg = GraphConfig::default();
        let dist = VertexDistribution::uniform(16, comm.size());
        let mut g = create_graph(local_edges(&dist, comm.rank(), &ring), comm, &cfg)?;
        relabel_edges(&mut g, &dist, comm, &cfg)?;
        set_weights_graph(&mut g, comm, 3, &cfg)
    });
    for r in results {
        assert!(matches!(r, Err(GraphError::InvalidInput { op: "set_weights_graph", .. })));
    }
}

#[test]
fn summary_round_trips_through_json() {
    let ring = directed_ring(8);
    let g = create_graph_serial(
        GeneratedEdges::new(8, 8, 8, 0, ring),
        &NoComm,
        &GraphConfig::default(),
    )
    .unwrap();
    let json = serde_json::to_string(&GraphSummary::of(&g)).unwrap();
    let v: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(v["rank"], 0);
    assert_eq!(v["m_local"], 8);
    assert_eq!(v["relabeled"], true);
    assert!(v["max_degree_vert"].is_null());
}
