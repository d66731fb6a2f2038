use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use arrow::compute::concat_batches;
use arrow::record_batch::RecordBatch;
use dfq_common::metrics::global_metrics;
use dfq_common::{DfqError, Result};

use crate::config::{CacheConfig, CacheKind};
use crate::entry::CacheEntry;

/// Bounded, typed batch queue connecting two kernels.
///
/// All operations are thread-safe; producers and consumers run on distinct
/// kernel threads. One mutex guards the queue state and one condition
/// variable serves both directions: consumers wait for entries, producers
/// wait for flow-control headroom, and every state change issues a
/// `notify_all`.
///
/// A producer blocks in [`CacheChannel::push`] while either active threshold
/// axis is at capacity. A consumer blocks in [`CacheChannel::pull`] until an
/// entry is available or the channel has closed. The channel closes once a
/// sentinel has been received from every expected producer; pending pulls
/// then drain remaining entries and report end-of-stream.
#[derive(Debug)]
pub struct CacheChannel {
    config: CacheConfig,
    label: String,
    state: Mutex<ChannelState>,
    cond: Condvar,
}

#[derive(Debug)]
struct ChannelState {
    partitions: Vec<VecDeque<CacheEntry>>,
    depth: usize,
    bytes: u64,
    next_sequence: u64,
    expected_producers: usize,
    sentinels_received: usize,
    closed: bool,
}

impl CacheChannel {
    /// Create a channel with the given per-edge configuration.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self::with_label(config, "cache".to_string())
    }

    /// Create a channel labeled for logs and metrics (`"<src>-><dst>"`).
    #[must_use]
    pub fn with_label(config: CacheConfig, label: String) -> Self {
        let num_partitions = match config.kind {
            CacheKind::ForEach => config.num_partitions.max(1),
            _ => 1,
        };
        Self {
            config,
            label,
            state: Mutex::new(ChannelState {
                partitions: (0..num_partitions).map(|_| VecDeque::new()).collect(),
                depth: 0,
                bytes: 0,
                next_sequence: 0,
                expected_producers: 1,
                sentinels_received: 0,
                closed: false,
            }),
            cond: Condvar::new(),
        }
    }

    /// Channel configuration chosen at link time.
    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Backing policy of this channel.
    #[must_use]
    pub fn kind(&self) -> CacheKind {
        self.config.kind
    }

    /// Number of independent sub-queues.
    #[must_use]
    pub fn num_partitions(&self) -> usize {
        match self.config.kind {
            CacheKind::ForEach => self.config.num_partitions.max(1),
            _ => 1,
        }
    }

    /// Label used in logs and metrics.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Register one additional expected producer. The channel only closes
    /// after a sentinel from every registered producer.
    pub fn add_producer(&self) {
        let mut state = self.state.lock().expect("cache channel mutex");
        state.expected_producers += 1;
    }

    /// Entries currently queued (sentinels excluded).
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().expect("cache channel mutex").depth
    }

    /// Whether no entries are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Byte weight currently queued.
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        self.state.lock().expect("cache channel mutex").bytes
    }

    /// Whether all expected producers have finished.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().expect("cache channel mutex").closed
    }

    /// Enqueue a batch on partition 0, blocking while flow control is at
    /// capacity. Batches pushed after close are discarded.
    pub fn push(&self, batch: RecordBatch) -> Result<()> {
        self.push_to(0, batch)
    }

    /// Enqueue a batch on the indexed partition of a FOR_EACH channel.
    pub fn push_to(&self, partition: usize, batch: RecordBatch) -> Result<()> {
        let mut state = self.lock_partition(partition)?;
        loop {
            if state.closed {
                // The consumer side is gone; the entry has nowhere to go.
                return Ok(());
            }
            let batches_full = self.config.batches_axis_blocks()
                && state.depth >= self.config.flow_control_batches_threshold as usize;
            let bytes_full = self.config.bytes_axis_blocks()
                && state.bytes >= self.config.flow_control_bytes_threshold;
            if !batches_full && !bytes_full {
                break;
            }
            state = self.cond.wait(state).expect("cache channel mutex");
        }

        let sequence = state.next_sequence;
        state.next_sequence += 1;
        let entry = CacheEntry::new(sequence, batch);
        state.depth += 1;
        state.bytes += entry.size_bytes();
        state.partitions[partition].push_back(entry);
        global_metrics().set_cache_depth(&self.label, state.depth as u64, state.bytes);
        self.cond.notify_all();
        Ok(())
    }

    /// Dequeue the next batch, blocking until one is available or the
    /// channel is closed and drained. `Ok(None)` is end-of-stream.
    ///
    /// For CONCATENATING channels the returned batch is the concatenation of
    /// all currently queued batches, bounded by the byte threshold.
    pub fn pull(&self) -> Result<Option<RecordBatch>> {
        match self.config.kind {
            CacheKind::Simple => self.pull_partition(0),
            CacheKind::Concatenating => self.pull_concatenated(),
            CacheKind::ForEach => Err(DfqError::InvalidConfig(format!(
                "channel {}: pull on a FOR_EACH channel requires a partition index",
                self.label
            ))),
        }
    }

    /// Dequeue the next batch from the indexed partition.
    pub fn pull_from(&self, partition: usize) -> Result<Option<RecordBatch>> {
        self.check_partition(partition)?;
        self.pull_partition(partition)
    }

    /// Record one producer's end-of-stream. A sentinel entry is appended to
    /// every partition; once every expected producer has sent its sentinel
    /// the channel closes and pending pulls drain to end-of-stream.
    pub fn push_sentinel(&self) {
        let mut state = self.state.lock().expect("cache channel mutex");
        for partition in 0..state.partitions.len() {
            let sequence = state.next_sequence;
            state.next_sequence += 1;
            state.partitions[partition].push_back(CacheEntry::sentinel(sequence));
        }
        state.sentinels_received += 1;
        if state.sentinels_received >= state.expected_producers {
            state.closed = true;
        }
        global_metrics().inc_cache_sentinels(&self.label);
        self.cond.notify_all();
    }

    /// Force-close the channel without waiting for producer sentinels.
    ///
    /// Used for abort: pending pulls drain queued entries and then report
    /// end-of-stream; later pushes are discarded.
    pub fn close(&self) {
        let mut state = self.state.lock().expect("cache channel mutex");
        state.closed = true;
        self.cond.notify_all();
    }

    fn lock_partition(&self, partition: usize) -> Result<std::sync::MutexGuard<'_, ChannelState>> {
        self.check_partition(partition)?;
        Ok(self.state.lock().expect("cache channel mutex"))
    }

    fn check_partition(&self, partition: usize) -> Result<()> {
        if partition >= self.num_partitions() {
            return Err(DfqError::InvalidConfig(format!(
                "channel {}: partition {partition} out of range ({} partitions)",
                self.label,
                self.num_partitions()
            )));
        }
        Ok(())
    }

    fn pull_partition(&self, partition: usize) -> Result<Option<RecordBatch>> {
        let mut state = self.state.lock().expect("cache channel mutex");
        loop {
            Self::discard_leading_sentinels(&mut state, partition);
            if let Some(entry) = state.partitions[partition].pop_front() {
                state.depth -= 1;
                state.bytes -= entry.size_bytes();
                global_metrics().set_cache_depth(&self.label, state.depth as u64, state.bytes);
                self.cond.notify_all();
                return Ok(entry.into_batch());
            }
            if state.closed {
                return Ok(None);
            }
            state = self.cond.wait(state).expect("cache channel mutex");
        }
    }

    fn pull_concatenated(&self) -> Result<Option<RecordBatch>> {
        let bound = self.config.flow_control_bytes_threshold;
        let mut state = self.state.lock().expect("cache channel mutex");
        let mut staged: Vec<RecordBatch> = Vec::new();
        let mut staged_bytes: u64 = 0;
        loop {
            Self::discard_leading_sentinels(&mut state, 0);
            let front_size = state.partitions[0].front().map(CacheEntry::size_bytes);
            let Some(size) = front_size else {
                if state.closed {
                    break;
                }
                state = self.cond.wait(state).expect("cache channel mutex");
                continue;
            };
            // The first batch is always taken; further batches join the
            // concatenation while they fit under the byte bound.
            let take = if staged.is_empty() {
                true
            } else if bound == 0 {
                false
            } else if bound == u64::MAX {
                true
            } else {
                staged_bytes + size <= bound
            };
            if !take {
                break;
            }
            let entry = state.partitions[0]
                .pop_front()
                .expect("front observed under lock");
            state.depth -= 1;
            state.bytes -= size;
            staged_bytes += size;
            if let Some(batch) = entry.into_batch() {
                staged.push(batch);
            }
            if state.partitions[0].is_empty()
                || state.partitions[0]
                    .front()
                    .map(CacheEntry::is_sentinel)
                    .unwrap_or(false)
            {
                break;
            }
        }
        global_metrics().set_cache_depth(&self.label, state.depth as u64, state.bytes);
        self.cond.notify_all();
        drop(state);

        if staged.is_empty() {
            return Ok(None);
        }
        if staged.len() == 1 {
            return Ok(staged.pop());
        }
        let schema = staged[0].schema();
        let merged = concat_batches(&schema, &staged).map_err(|e| {
            DfqError::Kernel(format!(
                "channel {}: concatenating queued batches failed: {e}",
                self.label
            ))
        })?;
        Ok(Some(merged))
    }

    fn discard_leading_sentinels(state: &mut ChannelState, partition: usize) {
        while state.partitions[partition]
            .front()
            .map(CacheEntry::is_sentinel)
            .unwrap_or(false)
        {
            state.partitions[partition].pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    use arrow::array::Int64Array;
    use arrow_schema::{DataType, Field, Schema};

    use super::*;

    fn batch(values: &[i64]) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![Field::new("v", DataType::Int64, false)]));
        RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(values.to_vec()))])
            .expect("test batch")
    }

    fn first_value(batch: &RecordBatch) -> i64 {
        batch
            .column(0)
            .as_any()
            .downcast_ref::<Int64Array>()
            .expect("int column")
            .value(0)
    }

    #[test]
    fn simple_channel_is_fifo() {
        let chan = CacheChannel::new(CacheConfig::simple());
        for v in 0..5 {
            chan.push(batch(&[v])).unwrap();
        }
        chan.push_sentinel();
        for v in 0..5 {
            let got = chan.pull().unwrap().expect("entry");
            assert_eq!(first_value(&got), v);
        }
        assert!(chan.pull().unwrap().is_none());
        assert!(chan.is_closed());
    }

    #[test]
    fn pull_drains_remaining_entries_after_close() {
        let chan = CacheChannel::new(CacheConfig::simple());
        chan.push(batch(&[1])).unwrap();
        chan.push(batch(&[2])).unwrap();
        chan.push_sentinel();
        assert!(chan.is_closed());
        assert_eq!(first_value(&chan.pull().unwrap().unwrap()), 1);
        assert_eq!(first_value(&chan.pull().unwrap().unwrap()), 2);
        assert!(chan.pull().unwrap().is_none());
    }

    #[test]
    fn channel_closes_only_after_all_producer_sentinels() {
        let chan = CacheChannel::new(CacheConfig::simple());
        chan.add_producer();
        chan.push(batch(&[7])).unwrap();
        chan.push_sentinel();
        assert!(!chan.is_closed());
        chan.push(batch(&[8])).unwrap();
        chan.push_sentinel();
        assert!(chan.is_closed());
        assert_eq!(first_value(&chan.pull().unwrap().unwrap()), 7);
        assert_eq!(first_value(&chan.pull().unwrap().unwrap()), 8);
        assert!(chan.pull().unwrap().is_none());
    }

    #[test]
    fn producer_blocks_at_batch_threshold_until_consumer_pulls() {
        let chan = Arc::new(CacheChannel::new(CacheConfig::simple_throttled(
            2,
            u64::MAX,
        )));
        let third_push_done = Arc::new(AtomicBool::new(false));

        let producer = {
            let chan = Arc::clone(&chan);
            let done = Arc::clone(&third_push_done);
            thread::spawn(move || {
                for v in 0..3 {
                    chan.push(batch(&[v])).unwrap();
                }
                done.store(true, Ordering::SeqCst);
                chan.push_sentinel();
            })
        };

        // Give the producer time to fill the channel and hit the threshold.
        thread::sleep(Duration::from_millis(50));
        assert!(!third_push_done.load(Ordering::SeqCst));
        assert_eq!(chan.len(), 2);

        assert!(chan.pull().unwrap().is_some());
        producer.join().unwrap();
        assert!(third_push_done.load(Ordering::SeqCst));
        assert!(chan.pull().unwrap().is_some());
        assert!(chan.pull().unwrap().is_some());
        assert!(chan.pull().unwrap().is_none());
    }

    #[test]
    fn depth_never_exceeds_batch_threshold() {
        let chan = Arc::new(CacheChannel::new(CacheConfig::simple_throttled(
            3,
            u64::MAX,
        )));
        let producer = {
            let chan = Arc::clone(&chan);
            thread::spawn(move || {
                for v in 0..20 {
                    chan.push(batch(&[v])).unwrap();
                }
                chan.push_sentinel();
            })
        };
        let mut seen = 0;
        loop {
            assert!(chan.len() <= 3);
            match chan.pull().unwrap() {
                Some(b) => {
                    assert_eq!(first_value(&b), seen);
                    seen += 1;
                    thread::sleep(Duration::from_millis(1));
                }
                None => break,
            }
        }
        assert_eq!(seen, 20);
        producer.join().unwrap();
    }

    #[test]
    fn concatenating_channel_coalesces_queued_batches() {
        let chan = CacheChannel::new(CacheConfig::concatenating(u32::MAX, u64::MAX));
        chan.push(batch(&[1, 2])).unwrap();
        chan.push(batch(&[3])).unwrap();
        chan.push(batch(&[4, 5, 6])).unwrap();
        chan.push_sentinel();
        let merged = chan.pull().unwrap().expect("coalesced batch");
        assert_eq!(merged.num_rows(), 6);
        assert!(chan.pull().unwrap().is_none());
    }

    #[test]
    fn concatenating_channel_with_zero_bytes_degenerates_to_simple() {
        let chan = CacheChannel::new(CacheConfig::concatenating(u32::MAX, 0));
        chan.push(batch(&[1, 2])).unwrap();
        chan.push(batch(&[3])).unwrap();
        chan.push_sentinel();
        assert_eq!(chan.pull().unwrap().unwrap().num_rows(), 2);
        assert_eq!(chan.pull().unwrap().unwrap().num_rows(), 1);
        assert!(chan.pull().unwrap().is_none());
    }

    #[test]
    fn concatenating_channel_respects_byte_bound() {
        let one = batch(&[1]);
        let per_batch = one.get_array_memory_size() as u64;
        // Bound admits roughly two batches per pull.
        let chan = CacheChannel::new(CacheConfig::concatenating(u32::MAX, per_batch * 2));
        for v in 0..4 {
            chan.push(batch(&[v])).unwrap();
        }
        chan.push_sentinel();
        let first = chan.pull().unwrap().unwrap();
        assert!(first.num_rows() <= 2);
        let mut total = first.num_rows();
        while let Some(b) = chan.pull().unwrap() {
            total += b.num_rows();
        }
        assert_eq!(total, 4);
    }

    #[test]
    fn for_each_partitions_are_independent_fifos() {
        let chan = CacheChannel::new(CacheConfig::for_each(2, u32::MAX, u64::MAX));
        chan.push_to(0, batch(&[10])).unwrap();
        chan.push_to(1, batch(&[20])).unwrap();
        chan.push_to(0, batch(&[11])).unwrap();
        chan.push_sentinel();

        assert_eq!(first_value(&chan.pull_from(0).unwrap().unwrap()), 10);
        assert_eq!(first_value(&chan.pull_from(1).unwrap().unwrap()), 20);
        assert_eq!(first_value(&chan.pull_from(0).unwrap().unwrap()), 11);
        assert!(chan.pull_from(0).unwrap().is_none());
        assert!(chan.pull_from(1).unwrap().is_none());
    }

    #[test]
    fn for_each_rejects_bare_pull_and_bad_partitions() {
        let chan = CacheChannel::new(CacheConfig::for_each(2, u32::MAX, u64::MAX));
        assert!(chan.pull().is_err());
        assert!(chan.push_to(5, batch(&[1])).is_err());
        assert!(chan.pull_from(2).is_err());
    }

    #[test]
    fn close_aborts_blocked_consumers_and_discards_late_pushes() {
        let chan = Arc::new(CacheChannel::new(CacheConfig::simple()));
        let consumer = {
            let chan = Arc::clone(&chan);
            thread::spawn(move || chan.pull().unwrap())
        };
        thread::sleep(Duration::from_millis(20));
        chan.close();
        assert!(consumer.join().unwrap().is_none());
        // Late pushes are silently dropped.
        chan.push(batch(&[1])).unwrap();
        assert_eq!(chan.len(), 0);
    }
}
