//! Concurrent promo-code ingestion and validation.
//!
//! Ingests a fixed set of three code files (plain text or gzip, one code per
//! line, possibly multi-gigabyte), determines which codes are valid, and
//! serves constant-time membership queries. A code is valid iff its trimmed
//! length is in `[8, 10]` and it appears in at least two of the three files.
//!
//! Build flow:
//! 1) One reader thread per file streams lines onto a bounded channel,
//!    decompressing `.gz` inputs transparently.
//! 2) A pool of workers trims, length-gates, and accumulates per-code
//!    presence masks in local batches.
//! 3) Batches flush into a sharded table (`code → mask`, bitwise OR under
//!    per-shard locks).
//! 4) After all threads join, a single-threaded sweep selects codes whose
//!    mask popcount meets the threshold and freezes them into a [`Validator`].
//!
//! ```no_run
//! use promo_sieve::build;
//!
//! let validator = build("/data/promo-codes")?;
//! if validator.is_valid_code("SUMMER25X") {
//!     // apply the discount
//! }
//! # Ok::<(), promo_sieve::BuildError>(())
//! ```
//!
//! Builds are one-shot and independent: each call returns an owned
//! [`Validator`]; share one across consumers with `Arc`. There is no hidden
//! process-wide instance and no reset protocol.

mod build;
mod cancel;
mod config;
mod error;
mod reader;
mod stats;
pub mod table;
mod util;
mod validator;
mod worker;

pub use build::{build, build_with_cancel, build_with_config, REQUIRED_FILE_COUNT};
pub use cancel::CancelToken;
pub use config::{
    BuildConfig, CHANNEL_CAPACITY_PER_FILE, DEFAULT_FLUSH_THRESHOLD, DEFAULT_MAX_LINE_BYTES,
    DEFAULT_SHARD_COUNT, DEFAULT_VALIDITY_THRESHOLD,
};
pub use error::BuildError;
pub use stats::BuildStats;
pub use table::{PresenceMask, ShardedTable, MAX_FILES};
pub use validator::{CodeValidator, Validator};

/// Minimum accepted code length, after ASCII-whitespace trimming.
pub const MIN_CODE_LEN: usize = 8;

/// Maximum accepted code length, after ASCII-whitespace trimming.
pub const MAX_CODE_LEN: usize = 10;
