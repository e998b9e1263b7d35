//! In-process backend: P ranks as threads sharing one mailbox.
//!
//! Each collective call on a rank bumps that rank's epoch counter. Because all
//! ranks issue collectives in the same order, the i-th call on every rank
//! carries the same epoch, and `(src, dst, epoch)` names a message uniquely.

use super::{check_counts, Communicator, ReduceOp};
use crate::graph_error::GraphError;
use bytes::Bytes;
use dashmap::DashMap;
use num_traits::PrimInt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

type Key = (usize, usize, u64); // (src, dst, epoch)

/// How long a rank waits for a peer before reporting a hung collective.
const RECV_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug)]
struct Mailbox {
    size: usize,
    slots: DashMap<Key, Bytes>,
}

/// One rank's handle into a group created by [`ThreadComm::group`].
#[derive(Debug)]
pub struct ThreadComm {
    rank: usize,
    mailbox: Arc<Mailbox>,
    epoch: AtomicU64,
}

impl ThreadComm {
    /// Create `size` connected handles, one per rank, in rank order.
    pub fn group(size: usize) -> Vec<ThreadComm> {
        let mailbox = Arc::new(Mailbox {
            size,
            slots: DashMap::new(),
        });
        (0..size)
            .map(|rank| ThreadComm {
                rank,
                mailbox: Arc::clone(&mailbox),
                epoch: AtomicU64::new(0),
            })
            .collect()
    }

    fn next_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::Relaxed)
    }

    fn post(&self, dst: usize, epoch: u64, payload: Bytes) {
        self.mailbox.slots.insert((self.rank, dst, epoch), payload);
    }

    fn take(&self, src: usize, epoch: u64) -> Result<Bytes, GraphError> {
        let key = (src, self.rank, epoch);
        let start = Instant::now();
        loop {
            if let Some((_, bytes)) = self.mailbox.slots.remove(&key) {
                return Ok(bytes);
            }
            if start.elapsed() > RECV_TIMEOUT {
                return Err(GraphError::Comm {
                    rank: self.rank,
                    detail: format!("timed out waiting for rank {src} (collective #{epoch})"),
                });
            }
            std::thread::yield_now();
        }
    }

    /// Send `payload` to every rank and collect every rank's payload, in rank order.
    fn all_gather(&self, payload: Bytes) -> Result<Vec<Bytes>, GraphError> {
        let epoch = self.next_epoch();
        for dst in 0..self.mailbox.size {
            self.post(dst, epoch, payload.clone());
        }
        (0..self.mailbox.size)
            .map(|src| self.take(src, epoch))
            .collect()
    }

    fn all_reduce<T: PrimInt + bytemuck::Pod>(
        &self,
        values: &mut [T],
        op: ReduceOp,
    ) -> Result<(), GraphError> {
        let payload = Bytes::copy_from_slice(bytemuck::cast_slice(values));
        let contributions = self.all_gather(payload)?;
        let mut acc: Option<Vec<T>> = None;
        for (src, bytes) in contributions.iter().enumerate() {
            if bytes.len() != std::mem::size_of_val(values) {
                return Err(GraphError::Comm {
                    rank: self.rank,
                    detail: format!(
                        "rank {src} reduced {} bytes, expected {}",
                        bytes.len(),
                        std::mem::size_of_val(values)
                    ),
                });
            }
            let mut part = vec![T::zero(); values.len()];
            bytemuck::cast_slice_mut(&mut part).copy_from_slice(bytes);
            match acc.as_mut() {
                None => acc = Some(part),
                Some(a) => op.fold_into(a, &part),
            }
        }
        if let Some(a) = acc {
            values.copy_from_slice(&a);
        }
        Ok(())
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.mailbox.size
    }

    fn all_to_all_bytes(
        &self,
        send_counts: &[usize],
        send: &[u8],
    ) -> Result<(Vec<usize>, Vec<u8>), GraphError> {
        check_counts(self.rank, self.mailbox.size, send_counts, send.len())?;
        let epoch = self.next_epoch();
        let whole = Bytes::copy_from_slice(send);
        let mut start = 0;
        for (dst, &count) in send_counts.iter().enumerate() {
            self.post(dst, epoch, whole.slice(start..start + count));
            start += count;
        }

        let mut recv_counts = Vec::with_capacity(self.mailbox.size);
        let mut recv = Vec::new();
        for src in 0..self.mailbox.size {
            let bytes = self.take(src, epoch)?;
            recv_counts.push(bytes.len());
            recv.extend_from_slice(&bytes);
        }
        Ok((recv_counts, recv))
    }

    fn all_reduce_u64(&self, values: &mut [u64], op: ReduceOp) -> Result<(), GraphError> {
        self.all_reduce(values, op)
    }

    fn all_reduce_i64(&self, values: &mut [i64], op: ReduceOp) -> Result<(), GraphError> {
        self.all_reduce(values, op)
    }

    fn barrier(&self) -> Result<(), GraphError> {
        self.all_gather(Bytes::new()).map(|_| ())
    }
}
