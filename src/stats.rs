//! Summary counters for a build run.

/// Counters aggregated by the orchestrator over one `build` invocation.
///
/// Diagnostic only: none of these affect membership. `codes_tracked` counts
/// every distinct code that survived the length gate in at least one file;
/// `codes_validated` counts the subset that met the presence threshold.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BuildStats {
    /// Input files processed.
    pub files: u64,
    /// Lines scanned across all readers (including empty and filtered lines).
    pub lines_read: u64,
    /// Records workers dequeued from the channel (non-empty lines), counted
    /// before the trim-and-length gate.
    pub records_seen: u64,
    /// Records that passed the trim-and-length gate in the workers.
    pub records_accepted: u64,
    /// Distinct codes present in the aggregation table before the sweep.
    pub codes_tracked: u64,
    /// Codes selected by the finalization sweep.
    pub codes_validated: u64,
}
