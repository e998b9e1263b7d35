#![cfg_attr(docsrs, feature(doc_cfg))]
//! # dist-graph
//!
//! dist-graph is the distributed graph core of a parallel label-propagation
//! partitioner. Each rank owns a slice of the global vertices, stores their
//! out-adjacency in CSR form, and tracks the *ghost* vertices its adjacency
//! references on other ranks.
//!
//! ## Features
//! - Counting-sort CSR construction from generator edges or pre-built CSR arrays
//! - Ghost discovery and relabeling into a dense local index space
//! - Two-phase ghost attribute synchronization (tally, fill, all-to-all, scatter)
//! - Pluggable communication backends (serial, in-process threads, MPI)
//! - Cooperative failure agreement so one rank's error never strands its peers
//!   inside a collective
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! dist-graph = "0.3"
//! # features = ["mpi-support"]
//! ```
//!
//! A typical pipeline on every rank:
//!
//! ```ignore
//! let dist = VertexDistribution::uniform(n, comm.size());
//! let mut g = create_graph(edges, &comm, &cfg)?;
//! relabel_edges(&mut g, &dist, &comm, &cfg)?;
//! get_ghost_degrees(&mut g, &comm, &cfg)?;
//! ```

pub mod comm;
pub mod config;
pub mod debug_invariants;
pub mod graph;
pub mod graph_error;
pub mod map;

pub use debug_invariants::DebugInvariants;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::comm::{Communicator, DistContext, NoComm, ReduceOp, ThreadComm};
    #[cfg(feature = "mpi-support")]
    pub use crate::comm::MpiComm;
    pub use crate::config::{GhostSyncPolicy, GraphConfig};
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::graph::build::{
        create_graph, create_graph_from_csr, create_graph_serial, create_graph_serial_from_csr,
        create_graph_serial_weighted, create_graph_weighted,
    };
    pub use crate::graph::distribution::VertexDistribution;
    pub use crate::graph::ghost_sync::{get_ghost_degrees, sync_ghost_attribute};
    pub use crate::graph::input::{CsrInput, GeneratedEdges, WeightedGeneratedEdges};
    pub use crate::graph::relabel::relabel_edges;
    pub use crate::graph::stats::{get_max_degree_vert, set_weights_graph, GraphSummary};
    pub use crate::graph::DistributedGraph;
    pub use crate::graph_error::GraphError;
    pub use crate::map::FastMap;
}
