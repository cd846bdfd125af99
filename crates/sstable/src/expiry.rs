//! Process-local monotonic clock for TTL deadlines.

use std::sync::OnceLock;
use std::time::Instant;

use crate::format::{EXPIRATION_NOT_SET, EXPIRATION_TOMBSTONE};

fn epoch() -> Instant {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    *EPOCH.get_or_init(Instant::now)
}

/// Milliseconds on the process-local monotonic clock.
///
/// Starts at 2, so the reserved expiration encodings 0 (no TTL) and
/// 1 (tombstone) can never be produced as deadlines.
pub fn now_ms() -> u64 {
    epoch().elapsed().as_millis() as u64 + 2
}

/// Whether a stored expiration marks the entry as dead: tombstones always,
/// deadlines once they have passed.
pub fn is_expired(expiration_ms: u64) -> bool {
    match expiration_ms {
        EXPIRATION_NOT_SET => false,
        EXPIRATION_TOMBSTONE => true,
        deadline => deadline <= now_ms(),
    }
}

/// True only for a real TTL deadline that has passed. Tombstones and unset
/// expirations are not deadlines; the merge drop rule treats them
/// differently.
pub fn is_deadline_expired(expiration_ms: u64) -> bool {
    expiration_ms > EXPIRATION_TOMBSTONE && expiration_ms <= now_ms()
}
