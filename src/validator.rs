//! Query surface: the immutable validated-code set.

use crate::stats::BuildStats;
use crate::util::trim_ascii;
use crate::{MAX_CODE_LEN, MIN_CODE_LEN};

use ahash::AHashSet;

/// Membership capability consumers depend on.
///
/// The HTTP and order collaborators take this trait (usually as
/// `Arc<dyn CodeValidator>`) rather than the concrete [`Validator`], so
/// tests can substitute a trivial in-memory implementation and the core
/// never leaks its table representation.
pub trait CodeValidator: Send + Sync {
    /// `true` iff the code, after the same trim-and-length filter applied
    /// during ingestion, is in the validated set.
    fn is_valid_code(&self, code: &[u8]) -> bool;
}

/// Immutable set of validated codes produced by a successful build.
///
/// Frozen at construction: queries are pure hash-set probes, thread-safe
/// under any number of concurrent readers, and blind to filesystem changes
/// after the build. Share across consumers via `Arc` — there is no hidden
/// process-wide instance.
pub struct Validator {
    codes: AHashSet<Box<[u8]>>,
    stats: BuildStats,
}

impl Validator {
    pub(crate) fn new(codes: AHashSet<Box<[u8]>>, stats: BuildStats) -> Self {
        Self { codes, stats }
    }

    /// Constant-time membership query.
    ///
    /// The length window is checked first so out-of-window codes never touch
    /// the set. Accepts anything byte-like; `&str` callers pass through
    /// unchanged (`impl AsRef<[u8]>`).
    pub fn is_valid_code(&self, code: impl AsRef<[u8]>) -> bool {
        let code = trim_ascii(code.as_ref());
        let len = code.len();
        if !(MIN_CODE_LEN..=MAX_CODE_LEN).contains(&len) {
            return false;
        }
        self.codes.contains(code)
    }

    /// Cardinality of the validated set. Diagnostic.
    pub fn validated_count(&self) -> usize {
        self.codes.len()
    }

    /// Counters from the build that produced this validator.
    pub fn stats(&self) -> &BuildStats {
        &self.stats
    }
}

impl CodeValidator for Validator {
    fn is_valid_code(&self, code: &[u8]) -> bool {
        Validator::is_valid_code(self, code)
    }
}

impl std::fmt::Debug for Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validator")
            .field("validated_count", &self.codes.len())
            .field("stats", &self.stats)
            .finish()
    }
}
