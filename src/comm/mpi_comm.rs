//! MPI backend (feature = "mpi-support").

use super::{check_counts, Communicator, ReduceOp};
use crate::graph_error::GraphError;
use mpi::collective::SystemOperation;
use mpi::datatype::{Partition, PartitionMut};
use mpi::topology::SimpleCommunicator;
use mpi::traits::{Communicator as _, CommunicatorCollectives};
use mpi::Count;

/// One rank of an MPI communicator.
pub struct MpiComm {
    world: SimpleCommunicator,
    rank: usize,
    size: usize,
}

impl MpiComm {
    pub fn new(world: SimpleCommunicator) -> Self {
        let rank = world.rank() as usize;
        let size = world.size() as usize;
        Self { world, rank, size }
    }

    /// The wrapped MPI communicator.
    pub fn world(&self) -> &SimpleCommunicator {
        &self.world
    }

    fn to_counts(&self, counts: &[usize]) -> Result<Vec<Count>, GraphError> {
        counts
            .iter()
            .map(|&c| {
                Count::try_from(c).map_err(|_| GraphError::Comm {
                    rank: self.rank,
                    detail: format!("message of {c} bytes exceeds MPI count range"),
                })
            })
            .collect()
    }
}

fn displacements(counts: &[Count]) -> Vec<Count> {
    counts
        .iter()
        .scan(0, |acc, &x| {
            let old = *acc;
            *acc += x;
            Some(old)
        })
        .collect()
}

fn system_op(op: ReduceOp) -> SystemOperation {
    match op {
        ReduceOp::Sum => SystemOperation::sum(),
        ReduceOp::Max => SystemOperation::max(),
        ReduceOp::Min => SystemOperation::min(),
    }
}

impl Communicator for MpiComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn all_to_all_bytes(
        &self,
        send_counts: &[usize],
        send: &[u8],
    ) -> Result<(Vec<usize>, Vec<u8>), GraphError> {
        check_counts(self.rank, self.size, send_counts, send.len())?;
        let counts = self.to_counts(send_counts)?;

        // First send around the counts, then the payload.
        let mut recv_counts: Vec<Count> = vec![0; self.size];
        self.world.all_to_all_into(&counts[..], &mut recv_counts[..]);

        let total: usize = recv_counts.iter().map(|&c| c as usize).sum();
        let mut recv = vec![0u8; total];
        let send_displs = displacements(&counts);
        let recv_displs = displacements(&recv_counts);
        {
            let send_partition = Partition::new(send, &counts[..], &send_displs[..]);
            let mut recv_partition =
                PartitionMut::new(&mut recv[..], &recv_counts[..], &recv_displs[..]);
            self.world
                .all_to_all_varcount_into(&send_partition, &mut recv_partition);
        }
        Ok((recv_counts.iter().map(|&c| c as usize).collect(), recv))
    }

    fn all_reduce_u64(&self, values: &mut [u64], op: ReduceOp) -> Result<(), GraphError> {
        let local = values.to_vec();
        self.world.all_reduce_into(&local[..], values, system_op(op));
        Ok(())
    }

    fn all_reduce_i64(&self, values: &mut [i64], op: ReduceOp) -> Result<(), GraphError> {
        let local = values.to_vec();
        self.world.all_reduce_into(&local[..], values, system_op(op));
        Ok(())
    }

    fn barrier(&self) -> Result<(), GraphError> {
        self.world.barrier();
        Ok(())
    }
}
