//! Bounded-poll helpers so deadline math lives in one place.

use crate::hal::Clock;

/// An absolute point on the microsecond clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at_us: u64,
}

impl Deadline {
    pub fn after_us<C: Clock + ?Sized>(clock: &C, budget_us: u64) -> Self {
        Deadline {
            at_us: clock.now_us().saturating_add(budget_us),
        }
    }

    pub fn after_ms<C: Clock + ?Sized>(clock: &C, budget_ms: u64) -> Self {
        Self::after_us(clock, budget_ms * 1_000)
    }

    pub fn reached<C: Clock + ?Sized>(&self, clock: &C) -> bool {
        clock.now_us() >= self.at_us
    }
}

/// Busy-poll `pred` until it holds or the deadline passes. Returns whether
/// the predicate ever held.
pub fn poll_until<C, F>(clock: &C, deadline: Deadline, mut pred: F) -> bool
where
    C: Clock + ?Sized,
    F: FnMut() -> bool,
{
    loop {
        if pred() {
            return true;
        }
        if deadline.reached(clock) {
            return false;
        }
    }
}
