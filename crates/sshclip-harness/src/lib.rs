//! Shared fixtures for the end-to-end and reconnect-simulation tests: a
//! deterministic [`Environment`] whose clock is controlled by the test and
//! whose sleeps resolve immediately, so tests exercising the agent's
//! backoff logic run instantly instead of waiting on real wall-clock time.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sshclip_core::Environment;

/// A test environment with a manually-advanced Unix-nanos clock and
/// instantaneous sleeps.
///
/// Every clone shares the same underlying counter, mirroring how
/// [`sshclip_core::SystemEnv`] reads one shared system clock.
#[derive(Clone)]
pub struct TestEnv {
    nanos: Arc<AtomicI64>,
}

impl TestEnv {
    /// Create a test environment whose clock starts at zero.
    #[must_use]
    pub fn new() -> Self {
        Self { nanos: Arc::new(AtomicI64::new(0)) }
    }

    /// Advance the simulated Unix-nanos clock by `delta`, returning the new
    /// value.
    pub fn advance(&self, delta: i64) -> i64 {
        self.nanos.fetch_add(delta, Ordering::Relaxed) + delta
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for TestEnv {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn unix_nanos(&self) -> i64 {
        self.nanos.load(Ordering::Relaxed)
    }

    async fn sleep(&self, _duration: Duration) {}
}
