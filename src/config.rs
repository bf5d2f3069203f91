//! Build configuration.
//!
//! Plain struct with conservative defaults; environmental problems surface
//! as [`BuildError`](crate::BuildError), structural misuse panics in
//! [`BuildConfig::validate`]. Profile with your workload before tuning.

/// Default shard count for the aggregation table.
///
/// 256 shards keep expected per-merge contention below half a percent under
/// uniform hashing and moderate worker counts, at negligible memory cost.
pub const DEFAULT_SHARD_COUNT: usize = 256;

/// Default worker-local batch size that triggers a flush to the table.
pub const DEFAULT_FLUSH_THRESHOLD: usize = 8192;

/// Default cap on a single input line (bytes).
pub const DEFAULT_MAX_LINE_BYTES: usize = 64 * 1024;

/// Record-channel capacity contributed per input file when `channel_capacity`
/// is left at auto.
pub const CHANNEL_CAPACITY_PER_FILE: usize = 2048;

/// Default presence threshold: a code must appear in at least this many
/// distinct files to validate.
pub const DEFAULT_VALIDITY_THRESHOLD: u32 = 2;

/// Configuration for one build run.
///
/// # Defaults
///
/// | Parameter | Default | Rationale |
/// |-----------|---------|-----------|
/// | `worker_count` | `num_cpus::get().max(1)` | Match hardware parallelism |
/// | `shard_count` | 256 | Contention ≤ ~0.4% per merge; power of two |
/// | `batch_flush_threshold` | 8192 | Amortize shard locks ~3-4 orders of magnitude |
/// | `channel_capacity` | 0 (auto: 2048 × files) | Backpressure without starving readers |
/// | `max_line_bytes` | 64 KiB | Generous for codes; bounds a hostile input |
/// | `validity_threshold` | 2 | "Present in ≥ 2 of 3 files" rule |
///
/// # Memory Planning
///
/// Peak transient memory ≈ `channel_capacity × average line length`
/// plus `worker_count × batch_flush_threshold` batch entries plus the
/// sharded table itself.
#[derive(Clone, Debug)]
pub struct BuildConfig {
    /// Number of worker threads consuming the record channel.
    ///
    /// Workers are CPU-bound (trim, hash, merge); more than the core count
    /// rarely helps. Lower-bounded at 1 by `validate`.
    pub worker_count: usize,

    /// Number of independently locked shards in the aggregation table.
    ///
    /// Must be positive. A power of two lets routing use a bitmask instead
    /// of a modulo; other values work but reduce slower.
    pub shard_count: usize,

    /// Worker-local batch size that triggers a flush into the shards.
    ///
    /// Larger batches mean fewer lock acquisitions but more worker-local
    /// memory and a longer tail flush on channel close.
    pub batch_flush_threshold: usize,

    /// Bound on the shared record channel. Use 0 for auto
    /// (`CHANNEL_CAPACITY_PER_FILE × file count`).
    ///
    /// The bound is the backpressure mechanism: slow workers throttle fast
    /// readers instead of buffering the input in memory.
    pub channel_capacity: usize,

    /// Cap on a single input line, in bytes. Exceeding it fails the build.
    pub max_line_bytes: usize,

    /// Minimum number of distinct files a code must appear in.
    ///
    /// Kept as a parameter of the finalization sweep rather than a constant
    /// buried in it, so the rule can be generalized with the mask width.
    pub validity_threshold: u32,

    /// Test seam: the worker with this index panics before consuming any
    /// records, so the panic-to-`InternalPanic` path can be exercised
    /// deterministically.
    #[cfg(test)]
    pub(crate) inject_worker_panic: Option<usize>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            worker_count: num_cpus::get().max(1),
            shard_count: DEFAULT_SHARD_COUNT,
            batch_flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            channel_capacity: 0, // auto
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            validity_threshold: DEFAULT_VALIDITY_THRESHOLD,
            #[cfg(test)]
            inject_worker_panic: None,
        }
    }
}

impl BuildConfig {
    /// Validate structural sanity.
    ///
    /// # Panics
    ///
    /// Panics on zero worker, shard, batch, or line-cap values, and on a
    /// threshold outside `1..=PresenceMask::BITS`. These are programmer
    /// errors, not runtime conditions.
    pub fn validate(&self) {
        assert!(self.worker_count > 0, "worker_count must be > 0");
        assert!(self.shard_count > 0, "shard_count must be > 0");
        assert!(
            self.batch_flush_threshold > 0,
            "batch_flush_threshold must be > 0"
        );
        assert!(self.max_line_bytes > 0, "max_line_bytes must be > 0");
        assert!(
            (1..=crate::table::PresenceMask::BITS).contains(&self.validity_threshold),
            "validity_threshold must be in 1..=32"
        );

        #[cfg(debug_assertions)]
        if !self.shard_count.is_power_of_two() {
            eprintln!(
                "[config] Warning: shard_count ({}) is not a power of two; \
                 shard routing falls back to modulo.",
                self.shard_count
            );
        }
    }

    /// Resolve the record-channel bound for a given file count.
    pub(crate) fn channel_capacity_for(&self, file_count: usize) -> usize {
        if self.channel_capacity > 0 {
            self.channel_capacity
        } else {
            CHANNEL_CAPACITY_PER_FILE * file_count.max(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let cfg = BuildConfig::default();
        cfg.validate();
        assert!(cfg.worker_count >= 1);
        assert_eq!(cfg.shard_count, DEFAULT_SHARD_COUNT);
    }

    #[test]
    fn auto_channel_capacity_scales_with_files() {
        let cfg = BuildConfig::default();
        assert_eq!(cfg.channel_capacity_for(3), 3 * CHANNEL_CAPACITY_PER_FILE);

        let fixed = BuildConfig {
            channel_capacity: 64,
            ..BuildConfig::default()
        };
        assert_eq!(fixed.channel_capacity_for(3), 64);
    }

    #[test]
    #[should_panic(expected = "shard_count must be > 0")]
    fn zero_shards_rejected() {
        let cfg = BuildConfig {
            shard_count: 0,
            ..BuildConfig::default()
        };
        cfg.validate();
    }

    #[test]
    #[should_panic(expected = "validity_threshold")]
    fn oversized_threshold_rejected() {
        let cfg = BuildConfig {
            validity_threshold: 33,
            ..BuildConfig::default()
        };
        cfg.validate();
    }
}
