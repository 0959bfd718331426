//! Process-wide modification clock.
//!
//! Every entry and artifact is stamped from this clock. Readings are unique and
//! strictly increasing across threads, so "newer than" comparisons between
//! timestamps taken anywhere in the process are well defined.

use crate::types::Timestamp;
use std::sync::atomic::{AtomicU64, Ordering};

static CLOCK: AtomicU64 = AtomicU64::new(1);

/// Take the next reading.
pub fn tick() -> Timestamp {
    Timestamp(CLOCK.fetch_add(1, Ordering::SeqCst))
}

/// Latest reading handed out so far (without advancing the clock).
pub fn last() -> Timestamp {
    Timestamp(CLOCK.load(Ordering::SeqCst).saturating_sub(1))
}
