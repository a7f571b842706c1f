//! Environment abstraction for deterministic testing.
//!
//! Decouples the store and the agent's supervisor from system resources
//! (time, randomness). Lets tests drive a simulated clock and a seeded RNG
//! while production code uses the real ones.

use std::time::Duration;

/// Abstract environment providing time and async sleep.
///
/// Implementations must guarantee `now()` never goes backwards and
/// `unix_nanos()` is non-decreasing across calls within one process.
pub trait Environment: Clone + Send + Sync + 'static {
    /// The specific instant type used by this environment.
    ///
    /// Production environments use `std::time::Instant`; simulation
    /// environments use a virtual instant.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current monotonic time, used for backoff scheduling.
    fn now(&self) -> Self::Instant;

    /// Nanoseconds since the Unix epoch, used for `created_at_nanos`
    /// timestamps recorded on every register write.
    fn unix_nanos(&self) -> i64;

    /// Sleeps for the specified duration.
    ///
    /// This is the only async method in the trait; it should only be used by
    /// driver code (the supervisor's backoff loop), never by store logic.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;
}

/// Production environment using system time and the OS RNG.
#[derive(Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    #[allow(clippy::disallowed_methods)]
    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    #[allow(clippy::disallowed_methods, clippy::expect_used)]
    fn unix_nanos(&self) -> i64 {
        let elapsed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("invariant: system clock is after the Unix epoch");
        i64::try_from(elapsed.as_nanos()).unwrap_or(i64::MAX)
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}
