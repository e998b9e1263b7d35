//! Buffer bookkeeping for the tally → allocate → fill → exchange pattern.
//!
//! 1. Workers tally how many records go to each rank and merge their local
//!    tallies into a shared [`SendCounts`] with atomic adds.
//! 2. One thread turns the merged counts into a [`SendBuffer`] whose slice
//!    for rank `r` starts at the prefix sum of the counts before it.
//! 3. Workers stage records per destination in a private [`ThreadStage`] and
//!    flush full stages into the shared buffer; the buffer lock is taken once
//!    per flush, not per record.
//! 4. One thread calls [`exchange_vertex_data`] to move everything.

use super::wire::WireVertexDatum;
use super::{all_to_all_varcount, Communicator};
use crate::graph_error::GraphError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

const OP: &str = "exchange_vert_data";

/// Per-destination record counts, safe to accumulate from many threads.
#[derive(Debug)]
pub struct SendCounts {
    per_rank: Vec<AtomicU64>,
}

impl SendCounts {
    pub fn new(nprocs: usize) -> Self {
        Self {
            per_rank: (0..nprocs).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    /// Add a worker's private tally.
    pub fn merge(&self, local: &[u64]) {
        for (slot, &n) in self.per_rank.iter().zip(local) {
            if n > 0 {
                slot.fetch_add(n, Ordering::Relaxed);
            }
        }
    }

    /// Current totals. Only meaningful once all workers merged.
    pub fn snapshot(&self) -> Vec<usize> {
        self.per_rank
            .iter()
            .map(|c| c.load(Ordering::Relaxed) as usize)
            .collect()
    }

    /// Zero every counter for reuse.
    pub fn reset(&self) {
        for c in &self.per_rank {
            c.store(0, Ordering::Relaxed);
        }
    }
}

#[derive(Debug)]
struct Fill {
    data: Vec<WireVertexDatum>,
    cursors: Vec<usize>,
}

/// Contiguous send buffer laid out by destination rank.
#[derive(Debug)]
pub struct SendBuffer {
    rank: usize,
    offsets: Vec<usize>,
    fill: Mutex<Fill>,
}

impl SendBuffer {
    /// Size the buffer from finalized per-rank counts.
    pub fn allocate(rank: usize, counts: &[usize]) -> Result<Self, GraphError> {
        let mut offsets = Vec::with_capacity(counts.len() + 1);
        offsets.push(0);
        for &c in counts {
            offsets.push(offsets[offsets.len() - 1] + c);
        }
        let total = offsets[counts.len()];
        let mut data = Vec::new();
        data.try_reserve_exact(total)
            .map_err(GraphError::alloc(rank, OP, "send buffer"))?;
        data.resize(total, WireVertexDatum::default());
        let cursors = offsets[..counts.len()].to_vec();
        Ok(Self {
            rank,
            offsets,
            fill: Mutex::new(Fill { data, cursors }),
        })
    }

    /// Number of destination ranks.
    pub fn nprocs(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Copy `records` into the next free slots of `dst`'s slice.
    pub fn flush(&self, dst: usize, records: &[WireVertexDatum]) -> Result<(), GraphError> {
        if records.is_empty() {
            return Ok(());
        }
        let mut fill = self.fill.lock();
        let start = fill.cursors[dst];
        let end = start + records.len();
        if end > self.offsets[dst + 1] {
            return Err(GraphError::LookupInconsistency {
                rank: self.rank,
                op: OP,
                detail: format!(
                    "rank {dst} slice overflows: {end} > {} (fill disagrees with tally)",
                    self.offsets[dst + 1]
                ),
            });
        }
        fill.data[start..end].copy_from_slice(records);
        fill.cursors[dst] = end;
        Ok(())
    }

    /// Every slice must be exactly full before the exchange.
    pub fn check_full(&self) -> Result<(), GraphError> {
        check_cursors(self.rank, &self.offsets, &self.fill.lock().cursors)
    }

    /// Finish filling and hand out the per-rank counts and records.
    pub fn into_parts(self) -> Result<(Vec<usize>, Vec<WireVertexDatum>), GraphError> {
        let SendBuffer {
            rank,
            offsets,
            fill,
        } = self;
        let Fill { data, cursors } = fill.into_inner();
        check_cursors(rank, &offsets, &cursors)?;
        let counts = offsets.windows(2).map(|w| w[1] - w[0]).collect();
        Ok((counts, data))
    }
}

fn check_cursors(rank: usize, offsets: &[usize], cursors: &[usize]) -> Result<(), GraphError> {
    for (dst, &cur) in cursors.iter().enumerate() {
        if cur != offsets[dst + 1] {
            return Err(GraphError::LookupInconsistency {
                rank,
                op: OP,
                detail: format!(
                    "rank {dst} slice short: filled to {cur}, expected {}",
                    offsets[dst + 1]
                ),
            });
        }
    }
    Ok(())
}

/// A worker's private per-destination staging area.
#[derive(Debug)]
pub struct ThreadStage {
    queues: Vec<Vec<WireVertexDatum>>,
    capacity: usize,
}

impl ThreadStage {
    pub fn new(nprocs: usize, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            queues: (0..nprocs).map(|_| Vec::with_capacity(capacity)).collect(),
            capacity,
        }
    }

    /// Stage one record, flushing `dst`'s queue when it is full.
    pub fn push(
        &mut self,
        dst: usize,
        record: WireVertexDatum,
        buf: &SendBuffer,
    ) -> Result<(), GraphError> {
        let q = &mut self.queues[dst];
        q.push(record);
        if q.len() >= self.capacity {
            buf.flush(dst, q)?;
            q.clear();
        }
        Ok(())
    }

    /// Flush every non-empty queue.
    pub fn flush_all(&mut self, buf: &SendBuffer) -> Result<(), GraphError> {
        for (dst, q) in self.queues.iter_mut().enumerate() {
            buf.flush(dst, q)?;
            q.clear();
        }
        Ok(())
    }
}

/// Records received from all ranks.
#[derive(Debug, Default)]
pub struct RecvBuffer {
    pub counts: Vec<usize>,
    pub records: Vec<WireVertexDatum>,
}

impl RecvBuffer {
    pub fn total_recv(&self) -> usize {
        self.records.len()
    }

    /// Release the receive storage.
    pub fn clear(&mut self) {
        self.counts = Vec::new();
        self.records = Vec::new();
    }
}

/// All-to-all exchange of a fully filled send buffer.
pub fn exchange_vertex_data<C>(comm: &C, send: SendBuffer) -> Result<RecvBuffer, GraphError>
where
    C: Communicator + ?Sized,
{
    let (counts, data) = send.into_parts()?;
    let (counts, records) = all_to_all_varcount(comm, &counts, &data)?;
    Ok(RecvBuffer { counts, records })
}
