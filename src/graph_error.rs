//! GraphError: unified error type for dist-graph public APIs.
//!
//! Every fallible operation names the rank it ran on and the step that
//! failed, so a diagnostic from any rank identifies where the job went wrong.

use std::collections::TryReserveError;
use thiserror::Error;

/// Unified error type for distributed graph operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// A dynamic array the graph needs could not be reserved.
    #[error("Task {rank} {op}(): unable to allocate {what}")]
    AllocationFailure {
        rank: usize,
        op: &'static str,
        what: &'static str,
    },
    /// An internal index/map invariant was violated; the graph is corrupt.
    #[error("Task {rank} {op}(): lookup inconsistency: {detail}")]
    LookupInconsistency {
        rank: usize,
        op: &'static str,
        detail: String,
    },
    /// Caller-supplied input does not describe a valid local graph.
    #[error("Task {rank} {op}(): invalid input: {detail}")]
    InvalidInput {
        rank: usize,
        op: &'static str,
        detail: String,
    },
    /// The communication backend failed or returned malformed data.
    #[error("Task {rank}: communication error: {detail}")]
    Comm { rank: usize, detail: String },
    /// Another rank reported a failure during `op`; this rank aborted with it.
    #[error("Task {rank} {op}(): aborted because a peer rank failed")]
    PeerFailure { rank: usize, op: &'static str },
}

impl GraphError {
    /// Map a failed `try_reserve` into an [`GraphError::AllocationFailure`].
    pub fn alloc(rank: usize, op: &'static str, what: &'static str) -> impl FnOnce(TryReserveError) -> Self {
        move |_| GraphError::AllocationFailure { rank, op, what }
    }

    /// Rank that raised the error.
    pub fn rank(&self) -> usize {
        match self {
            GraphError::AllocationFailure { rank, .. }
            | GraphError::LookupInconsistency { rank, .. }
            | GraphError::InvalidInput { rank, .. }
            | GraphError::Comm { rank, .. }
            | GraphError::PeerFailure { rank, .. } => *rank,
        }
    }
}

/// Reserve a zero-filled vector of `len` elements, reporting allocation failure.
pub(crate) fn try_zeroed<T: Copy + Default>(
    len: usize,
    rank: usize,
    op: &'static str,
    what: &'static str,
) -> Result<Vec<T>, GraphError> {
    let mut v = Vec::new();
    v.try_reserve_exact(len).map_err(GraphError::alloc(rank, op, what))?;
    v.resize(len, T::default());
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_rank_and_step() {
        let e = GraphError::AllocationFailure {
            rank: 3,
            op: "create_graph",
            what: "graph edge storage",
        };
        assert_eq!(
            e.to_string(),
            "Task 3 create_graph(): unable to allocate graph edge storage"
        );
        assert_eq!(e.rank(), 3);
    }

    #[test]
    fn huge_reservation_fails_cleanly() {
        let r = try_zeroed::<u64>(usize::MAX / 4, 1, "relabel_edges", "ghost unmaps");
        assert!(matches!(
            r,
            Err(GraphError::AllocationFailure { rank: 1, op: "relabel_edges", .. })
        ));
    }
}
