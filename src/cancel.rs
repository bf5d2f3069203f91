//! Cooperative cancellation for the build phase.
//!
//! Readers consult the stop state between buffer refills, not per line, so
//! the check stays off the hot path. Cancellation is advisory: a build that
//! observes it drains its channels, joins its threads, and fails with
//! `BuildError::Cancelled`; partial results are discarded.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag a caller can raise to abandon an in-flight build.
///
/// Clones observe the same flag. The token outlives the build; raising it
/// after the build completed is a no-op.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the flag. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Combined stop condition consulted by readers and workers.
///
/// Two inputs feed it: the caller's [`CancelToken`] and the internal abort
/// flag a failing reader raises so its siblings stop early. Stages observing
/// the signal stop *quietly*; the orchestrator decides after joining whether
/// the cause was an error or an external cancellation.
#[derive(Clone, Debug)]
pub(crate) struct StopSignal {
    abort: Arc<AtomicBool>,
    token: CancelToken,
}

impl StopSignal {
    pub(crate) fn new(token: CancelToken) -> Self {
        Self {
            abort: Arc::new(AtomicBool::new(false)),
            token,
        }
    }

    /// Raised by a reader on critical error; siblings stop at their next check.
    pub(crate) fn raise_abort(&self) {
        self.abort.store(true, Ordering::Relaxed);
    }

    pub(crate) fn is_set(&self) -> bool {
        self.abort.load(Ordering::Relaxed) || self.token.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_clones_share_state() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn stop_signal_tracks_both_inputs() {
        let token = CancelToken::new();
        let stop = StopSignal::new(token.clone());
        assert!(!stop.is_set());

        stop.raise_abort();
        assert!(stop.is_set());

        let stop2 = StopSignal::new(token.clone());
        assert!(!stop2.is_set());
        token.cancel();
        assert!(stop2.is_set());
    }
}
