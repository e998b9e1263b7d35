//! Thin façade over collective message passing between ranks.
//!
//! The graph core only needs a handful of collectives: a variable-count
//! all-to-all of byte slices, element-wise all-reduce on integer vectors, and
//! a barrier. Backends:
//! - [`NoComm`]: a single rank, everything is local.
//! - [`ThreadComm`]: P ranks running as threads of one process (tests, demos).
//! - `MpiComm` (feature `mpi-support`): one rank per MPI process.
//!
//! Every rank must issue the same collectives in the same order. A rank that
//! fails locally must still take part in the next collective; [`agree`] is the
//! point where such failures are made visible to every peer.

pub mod exchange;
#[cfg(feature = "mpi-support")]
mod mpi_comm;
mod thread_comm;
pub mod wire;

#[cfg(feature = "mpi-support")]
pub use mpi_comm::MpiComm;
pub use thread_comm::ThreadComm;

use crate::graph_error::GraphError;
use bytemuck::Pod;
use num_traits::PrimInt;
use serde::{Deserialize, Serialize};

/// Rank and rank count of the calling process, passed explicitly to every step.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DistContext {
    pub rank: usize,
    pub nprocs: usize,
}

impl DistContext {
    pub fn new(rank: usize, nprocs: usize) -> Self {
        Self { rank, nprocs }
    }

    /// The single-rank context.
    pub fn serial() -> Self {
        Self::new(0, 1)
    }
}

impl Default for DistContext {
    fn default() -> Self {
        DistContext::serial()
    }
}

/// Element-wise reduction applied by [`Communicator::all_reduce_u64`] and friends.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReduceOp {
    Sum,
    Max,
    Min,
}

impl ReduceOp {
    #[inline]
    pub fn apply<T: PrimInt>(self, a: T, b: T) -> T {
        match self {
            ReduceOp::Sum => a + b,
            ReduceOp::Max => a.max(b),
            ReduceOp::Min => a.min(b),
        }
    }

    /// Fold `other` into `acc` element-wise.
    pub fn fold_into<T: PrimInt>(self, acc: &mut [T], other: &[T]) {
        for (a, &b) in acc.iter_mut().zip(other) {
            *a = self.apply(*a, b);
        }
    }
}

/// Blocking collective communication interface.
pub trait Communicator {
    /// This process's rank.
    fn rank(&self) -> usize;

    /// Number of participating ranks.
    fn size(&self) -> usize;

    /// Rank/size pair for code that must not touch the communicator.
    fn context(&self) -> DistContext {
        DistContext::new(self.rank(), self.size())
    }

    /// Variable-count all-to-all. `send` holds the bytes for rank 0, then
    /// rank 1, …; `send_counts[r]` is the byte count for rank `r`.
    /// Returns the per-source byte counts and the concatenated payload.
    fn all_to_all_bytes(
        &self,
        send_counts: &[usize],
        send: &[u8],
    ) -> Result<(Vec<usize>, Vec<u8>), GraphError>;

    /// In-place element-wise all-reduce.
    fn all_reduce_u64(&self, values: &mut [u64], op: ReduceOp) -> Result<(), GraphError>;

    /// In-place element-wise all-reduce.
    fn all_reduce_i64(&self, values: &mut [i64], op: ReduceOp) -> Result<(), GraphError>;

    /// Block until every rank arrived.
    fn barrier(&self) -> Result<(), GraphError>;
}

/// Compile-time no-op comm for pure serial runs.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_to_all_bytes(
        &self,
        send_counts: &[usize],
        send: &[u8],
    ) -> Result<(Vec<usize>, Vec<u8>), GraphError> {
        check_counts(0, 1, send_counts, send.len())?;
        Ok((vec![send.len()], send.to_vec()))
    }

    fn all_reduce_u64(&self, _values: &mut [u64], _op: ReduceOp) -> Result<(), GraphError> {
        Ok(())
    }

    fn all_reduce_i64(&self, _values: &mut [i64], _op: ReduceOp) -> Result<(), GraphError> {
        Ok(())
    }

    fn barrier(&self) -> Result<(), GraphError> {
        Ok(())
    }
}

pub(crate) fn check_counts(
    rank: usize,
    size: usize,
    send_counts: &[usize],
    len: usize,
) -> Result<(), GraphError> {
    if send_counts.len() != size {
        return Err(GraphError::Comm {
            rank,
            detail: format!("expected {size} send counts, got {}", send_counts.len()),
        });
    }
    let total: usize = send_counts.iter().sum();
    if total != len {
        return Err(GraphError::Comm {
            rank,
            detail: format!("send counts sum to {total} bytes but buffer holds {len}"),
        });
    }
    Ok(())
}

/// Typed all-to-all: `counts[r]` records of `data` go to rank `r`.
/// Returns per-source record counts and the received records.
pub fn all_to_all_varcount<T, C>(
    comm: &C,
    counts: &[usize],
    data: &[T],
) -> Result<(Vec<usize>, Vec<T>), GraphError>
where
    T: Pod,
    C: Communicator + ?Sized,
{
    let width = std::mem::size_of::<T>();
    let byte_counts: Vec<usize> = counts.iter().map(|&c| c * width).collect();
    let (recv_bytes, payload) = comm.all_to_all_bytes(&byte_counts, bytemuck::cast_slice(data))?;

    if payload.len() % width != 0 || recv_bytes.iter().any(|&b| b % width != 0) {
        return Err(GraphError::Comm {
            rank: comm.rank(),
            detail: format!(
                "received {} bytes, not a multiple of the {width}-byte record",
                payload.len()
            ),
        });
    }
    let mut records = vec![T::zeroed(); payload.len() / width];
    bytemuck::cast_slice_mut(&mut records).copy_from_slice(&payload);
    Ok((recv_bytes.into_iter().map(|b| b / width).collect(), records))
}

/// Make a local outcome collective: every rank learns whether any rank failed.
///
/// The failing rank gets its own error back; every other rank gets
/// [`GraphError::PeerFailure`]. Must be called by all ranks.
pub fn agree<C, T>(comm: &C, op: &'static str, local: Result<T, GraphError>) -> Result<T, GraphError>
where
    C: Communicator + ?Sized,
{
    let mut flag = [u64::from(local.is_err())];
    comm.all_reduce_u64(&mut flag, ReduceOp::Max)?;
    match local {
        Err(e) => {
            log::error!("{e}");
            Err(e)
        }
        Ok(_) if flag[0] != 0 => {
            log::error!("Task {} {op}(): a peer rank failed, aborting", comm.rank());
            Err(GraphError::PeerFailure {
                rank: comm.rank(),
                op,
            })
        }
        ok => ok,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_comm_all_to_all_returns_own_payload() {
        let (counts, recv) = all_to_all_varcount(&NoComm, &[3], &[7u64, 8, 9]).unwrap();
        assert_eq!(counts, vec![3]);
        assert_eq!(recv, vec![7, 8, 9]);
    }

    #[test]
    fn no_comm_rejects_mismatched_counts() {
        let err = NoComm.all_to_all_bytes(&[4, 4], &[0u8; 8]).unwrap_err();
        assert!(matches!(err, GraphError::Comm { rank: 0, .. }));
    }

    #[test]
    fn agree_passes_through_single_rank() {
        assert_eq!(agree(&NoComm, "step", Ok(5)).unwrap(), 5);
        let e = GraphError::InvalidInput {
            rank: 0,
            op: "step",
            detail: "bad".into(),
        };
        assert_eq!(agree::<_, ()>(&NoComm, "step", Err(e.clone())), Err(e));
    }

    #[test]
    fn reduce_ops_fold_elementwise() {
        let mut acc = [1u64, 9, 4];
        ReduceOp::Max.fold_into(&mut acc, &[3, 2, 4]);
        assert_eq!(acc, [3, 9, 4]);
        ReduceOp::Sum.fold_into(&mut acc, &[1, 1, 1]);
        assert_eq!(acc, [4, 10, 5]);
        let mut neg = [-2i64, 5];
        ReduceOp::Min.fold_into(&mut neg, &[-7, 6]);
        assert_eq!(neg, [-7, 5]);
    }
}
