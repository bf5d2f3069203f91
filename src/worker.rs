//! Worker stage: normalize records, gate by length, batch-merge masks.
//!
//! Workers are pure consumers: no I/O, no errors. Each worker accumulates a
//! local `code → mask` batch (bitwise OR, so duplicates within a file
//! collapse to one bit) and drains it into the sharded table when the batch
//! reaches the flush threshold, and once more when the channel closes. The
//! batch is the contention lever: one shard-lock acquisition per *distinct
//! batched code* instead of one per record.
//!
//! When the stop signal is raised the worker keeps receiving but stops
//! processing, so blocked readers drain instead of deadlocking on a full
//! channel.

use crate::cancel::StopSignal;
use crate::reader::Record;
use crate::table::{BatchMap, ShardedTable};
use crate::util::trim_ascii;
use crate::{MAX_CODE_LEN, MIN_CODE_LEN};

use crossbeam_channel::Receiver;

/// Counters a worker returns on join.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct WorkerStats {
    /// Records dequeued from the channel, gated or not.
    pub seen: u64,
    /// Records that passed the trim-and-length gate.
    pub accepted: u64,
}

/// Consumes the record channel until it closes, merging into `table`.
pub(crate) fn run_worker(
    records: &Receiver<Record>,
    table: &ShardedTable,
    flush_threshold: usize,
    stop: &StopSignal,
) -> WorkerStats {
    let mut stats = WorkerStats::default();
    let mut batch = BatchMap::with_capacity(flush_threshold.min(8192));

    for record in records.iter() {
        stats.seen += 1;
        if stop.is_set() {
            // Drain-only mode: keep the channel moving, discard the work.
            continue;
        }

        let code = trim_ascii(&record.bytes);
        let len = code.len();
        if !(MIN_CODE_LEN..=MAX_CODE_LEN).contains(&len) {
            continue;
        }
        stats.accepted += 1;

        match batch.get_mut(code) {
            Some(mask) => *mask |= record.mask,
            None => {
                // Reuse the record's allocation when trimming was a no-op.
                let key: Box<[u8]> = if len == record.bytes.len() {
                    record.bytes
                } else {
                    code.into()
                };
                batch.insert(key, record.mask);
            }
        }

        if batch.len() >= flush_threshold {
            table.merge_batch(&mut batch);
        }
    }

    if !batch.is_empty() {
        table.merge_batch(&mut batch);
    }
    stats
}
