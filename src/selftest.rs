//! Rail voltage self-test: confirm the three monitored rails sit at their
//! expected level before any pulse is fired.

use crate::hal::{Clock, Rail, RailSampler};
use crate::poll::Deadline;

/// Absolute budget for all three rails to converge.
pub const SELF_TEST_BUDGET_MS: u64 = 1_500;

pub const ADC_VREF: f32 = 3.3;
pub const ADC_COUNTS: f32 = 4096.0;

/// All three rails idle at eMMC I/O level.
pub const RAIL_TARGET_V: f32 = 1.8;
pub const RAIL_TOLERANCE_V: f32 = 0.2;

/// One bit per rail, set once that rail has read in tolerance. Bits are
/// only ever OR-ed in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RailCheckMask(u8);

impl RailCheckMask {
    pub const fn empty() -> Self {
        RailCheckMask(0)
    }

    pub fn pass(&mut self, rail: Rail) {
        self.0 |= rail.bit();
    }

    pub const fn passed(self, rail: Rail) -> bool {
        self.0 & rail.bit() != 0
    }

    pub const fn complete(self) -> bool {
        self.0 == 0b111
    }
}

/// Window test on a raw 12-bit sample, inclusive at both ends.
pub fn accepts(raw: u16, target_v: f32, tolerance_v: f32) -> bool {
    let volts = raw as f32 * ADC_VREF / ADC_COUNTS;
    volts >= target_v - tolerance_v && volts <= target_v + tolerance_v
}

/// Poll all three rails until every one has passed or the budget elapses.
/// On timeout the first never-passing rail in index order is the error.
pub fn run<H: Clock + RailSampler>(hal: &mut H) -> Result<RailCheckMask, Rail> {
    let deadline = Deadline::after_ms(hal, SELF_TEST_BUDGET_MS);
    let mut mask = RailCheckMask::empty();

    while !deadline.reached(hal) && !mask.complete() {
        for rail in Rail::ALL {
            if !mask.passed(rail) && accepts(hal.sample(rail), RAIL_TARGET_V, RAIL_TOLERANCE_V) {
                mask.pass(rail);
            }
        }
    }

    for rail in Rail::ALL {
        if !mask.passed(rail) {
            error!("self-test: rail {} never reached tolerance", rail.index());
            return Err(rail);
        }
    }
    debug!("self-test passed");
    Ok(mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::SimHal;
    use proptest::prelude::*;

    #[test]
    fn accepts_is_inclusive_at_both_window_edges() {
        // 1986 * 3.3 / 4096 is the first count at or above 1.6 V;
        // 2482 the last at or below 2.0 V.
        assert!(!accepts(1985, RAIL_TARGET_V, RAIL_TOLERANCE_V));
        assert!(accepts(1986, RAIL_TARGET_V, RAIL_TOLERANCE_V));
        assert!(accepts(2482, RAIL_TARGET_V, RAIL_TOLERANCE_V));
        assert!(!accepts(2483, RAIL_TARGET_V, RAIL_TOLERANCE_V));
        // Nominal 1.8 V.
        assert!(accepts(2234, RAIL_TARGET_V, RAIL_TOLERANCE_V));
        assert!(!accepts(0, RAIL_TARGET_V, RAIL_TOLERANCE_V));
        assert!(!accepts(4095, RAIL_TARGET_V, RAIL_TOLERANCE_V));
    }

    proptest! {
        /// The acceptance window is one contiguous run of counts.
        #[test]
        fn acceptance_window_is_contiguous(a in 0u16..4096, b in 0u16..4096, c in 0u16..4096) {
            let mut raws = [a, b, c];
            raws.sort_unstable();
            let [lo, mid, hi] = raws;
            if accepts(lo, RAIL_TARGET_V, RAIL_TOLERANCE_V)
                && accepts(hi, RAIL_TARGET_V, RAIL_TOLERANCE_V)
            {
                prop_assert!(accepts(mid, RAIL_TARGET_V, RAIL_TOLERANCE_V));
            }
        }
    }

    #[test]
    fn passes_when_all_rails_are_good() {
        let mut hal = SimHal::new();
        let mask = run(&mut hal).unwrap();
        assert!(mask.complete());
        // Early exit, nowhere near the budget.
        assert!(hal.now_us() < SELF_TEST_BUDGET_MS * 1_000 / 2);
    }

    #[test]
    fn waits_for_a_slow_rail_within_budget() {
        let mut hal = SimHal::new();
        hal.rail_good_after_us[Rail::Command.index() as usize] = 800_000;
        let mask = run(&mut hal).unwrap();
        assert!(mask.complete());
        assert!(hal.now_us() >= 800_000);
        assert!(hal.now_us() < SELF_TEST_BUDGET_MS * 1_000);
    }

    #[test]
    fn reports_first_failing_rail_in_index_order() {
        let mut hal = SimHal::new();
        hal.rail_good_after_us[Rail::Reset.index() as usize] = u64::MAX;
        hal.rail_good_after_us[Rail::Data.index() as usize] = u64::MAX;
        assert_eq!(run(&mut hal), Err(Rail::Reset));
    }

    #[test]
    fn timeout_lands_just_past_the_budget() {
        let mut hal = SimHal::new();
        hal.rail_good_after_us[Rail::Data.index() as usize] = u64::MAX;
        assert_eq!(run(&mut hal), Err(Rail::Data));
        let budget_us = SELF_TEST_BUDGET_MS * 1_000;
        assert!(hal.now_us() >= budget_us);
        // No more than one polling pass of overshoot.
        assert!(hal.now_us() < budget_us + 1_000);
    }

    #[test]
    fn mask_only_accumulates() {
        let mut mask = RailCheckMask::empty();
        assert!(!mask.complete());
        mask.pass(Rail::Data);
        assert!(mask.passed(Rail::Data));
        assert!(!mask.passed(Rail::Reset));
        mask.pass(Rail::Reset);
        mask.pass(Rail::Command);
        assert!(mask.complete());
    }
}
