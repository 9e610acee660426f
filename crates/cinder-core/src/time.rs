//! Monotonic time utilities.
//!
//! All TTL bookkeeping uses microseconds on a process-local monotonic
//! clock. Anchoring to a lazily-initialized `Instant` keeps timestamps
//! in a plain `u64` instead of a 16-byte `Instant` per heap slot.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

static ORIGIN: OnceLock<Instant> = OnceLock::new();

/// Returns the clock origin all timestamps are measured from.
pub fn origin() -> Instant {
    *ORIGIN.get_or_init(Instant::now)
}

/// Returns current monotonic time in microseconds since [`origin`].
#[inline]
pub fn now_us() -> u64 {
    origin().elapsed().as_micros() as u64
}

/// Converts a microsecond timestamp back to an `Instant`.
#[inline]
pub fn instant_at(us: u64) -> Instant {
    origin() + Duration::from_micros(us)
}
