//! Hardware capability traits.
//!
//! The core never touches a register: time, ADC sampling, the indicator,
//! and power sequencing all go through these traits, with one
//! implementation per board class. The persisted-store, fuse, glitch and
//! payload contracts are the external collaborators the orchestrator
//! drives; their internals (flash layout, pulse physics, eMMC protocol)
//! live outside this crate.

use crate::pins;

/// Monotonic microsecond clock with blocking delays. Delays always run to
/// completion; there is no cancellation anywhere in this firmware.
pub trait Clock {
    fn now_us(&self) -> u64;
    fn sleep_us(&mut self, us: u64);
    fn sleep_ms(&mut self, ms: u64) {
        self.sleep_us(ms * 1_000);
    }
}

/// A monitored voltage rail on the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Rail {
    Reset = 0,
    Command = 1,
    Data = 2,
}

impl Rail {
    /// Validation order is fixed: the first never-passing rail in this
    /// order is the one reported.
    pub const ALL: [Rail; 3] = [Rail::Reset, Rail::Command, Rail::Data];

    pub const fn index(self) -> u8 {
        self as u8
    }

    pub const fn bit(self) -> u8 {
        1 << self.index()
    }

    pub const fn pin(self) -> u8 {
        match self {
            Rail::Reset => pins::PIN_RST,
            Rail::Command => pins::PIN_CMD,
            Rail::Data => pins::PIN_DAT,
        }
    }
}

/// Raw 12-bit ADC reads of the rail taps.
pub trait RailSampler {
    fn sample(&mut self, rail: Rail) -> u16;
}

/// The single RGB indicator. `0` blanks it.
pub trait Indicator {
    fn put_pixel(&mut self, rgb: u32);
}

/// Core regulator setpoints used by the sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CoreVoltage {
    /// Signaling level, enough for 48 MHz.
    V0_95,
    /// Full-speed attack level.
    V1_30,
    /// Lowest the regulator goes; only valid just before deep sleep.
    Minimum,
}

/// Clock, regulator and pin-quiescing capabilities consumed by the power
/// sequencer. `deep_sleep` is the terminal state: it must never return and
/// must leave the chip recoverable only by a physical power cycle.
pub trait PowerControl {
    fn set_sys_clock_khz(&mut self, khz: u32);
    fn set_core_voltage(&mut self, level: CoreVoltage);
    /// Stop every programmable-I/O state machine.
    fn stop_pio(&mut self);
    fn pull_down(&mut self, pin: u8);
    fn disable_pulls(&mut self, pin: u8);
    /// Isolate the pad: output-disable on, input-enable off.
    fn quiesce_pin(&mut self, pin: u8);
    fn deep_sleep(&mut self) -> !;
}

/// Board identity facts resolved at bring-up by the variant-detection
/// collaborator.
pub trait Board {
    fn led_pin(&self) -> u8;
    /// Separate supply pin for the addressable LED, if the carrier has one.
    fn power_pin(&self) -> Option<u8>;
    /// Compact carriers share the LED pin with the addressable part and
    /// keep it connected through the halt.
    fn quiesce_led_on_halt(&self) -> bool;
    fn watchdog_caused_reboot(&self) -> bool;
    /// Operator pulled the force-rewrite strap during bring-up.
    fn force_rewrite_asserted(&mut self) -> bool;
    /// Block until the target's boot device should be responding.
    fn wait_for_boot(&mut self, budget_us: u64);
    /// Expected boot slot for the fuse-parity comparison.
    fn boot_slot(&self) -> u32;
}

/// Persisted (offset, weight) records, best-first. Survives reboots; the
/// only in-boot mutation is one append on the success path.
pub trait RecordStore {
    /// Restart best-first traversal from the top.
    fn rewind(&mut self);
    /// Next-best untried candidate, or `None` once exhausted.
    fn next_best(&mut self) -> Option<i32>;
    fn append(&mut self, offset: i32);
}

/// Non-volatile attempt counter and the rollback/boot-slot fuse.
pub trait FuseBank {
    fn count(&self) -> u32;
    /// Record that an attempt cycle started this boot.
    fn increment(&mut self);
    /// Flip the boot-slot fuse. One-way.
    fn burn(&mut self);
    /// True until the first attempt cycle has ever been recorded.
    fn first_boot(&self) -> bool;
}

/// Low-level pulse driver. Owns the physics and the width-convergence
/// heuristic; the orchestrator only threads `width` through unchanged
/// between calls.
pub trait GlitchDriver {
    fn attempt(&mut self, offset: i32, width: &mut i32, max_tries: u8) -> bool;
    /// Fill `out` with a fresh randomized offset list for one exploration
    /// round.
    fn fill_random_offsets(&mut self, out: &mut [i32]);
}

/// Payload/config injection channel into the target's boot storage.
pub trait PayloadChannel {
    fn write_payload(&mut self) -> bool;
    fn init_config(&mut self);
    fn is_configured(&mut self) -> bool;
    /// Cheap probe that the injected payload is still in place.
    fn fast_check(&mut self) -> bool;
}
