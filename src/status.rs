//! Status signal encoder.
//!
//! The indicator is the only diagnostic channel the operator has, so the
//! pulse timing below is a protocol, not a cosmetic choice: a human reads
//! long/short pulses back into a bit pattern. Every constant derives from
//! the 500 ms base unit and each pulse+pause pair totals exactly one base
//! unit, which is what makes the rhythm countable.

use crate::hal::{Board, Clock, Indicator, PowerControl, Rail};
use crate::power;

/// Base unit of the blink protocol, milliseconds.
pub const BLINK_TIME_MS: u64 = 500;
/// A 0 bit: 20% of the base unit on.
pub const SHORT_TIME_MS: u64 = BLINK_TIME_MS * 2 / 10;
pub const SHORT_PAUSE_MS: u64 = (BLINK_TIME_MS - SHORT_TIME_MS) / 2;
/// A 1 bit: 80% of the base unit on.
pub const LONG_TIME_MS: u64 = BLINK_TIME_MS * 8 / 10;
pub const LONG_PAUSE_MS: u64 = (BLINK_TIME_MS - LONG_TIME_MS) / 2;
/// Gap between repeats of a multi-bit code.
pub const PAUSE_BETWEEN_MS: u64 = 1_500;
/// Blanked lead-in before the first repeat of a multi-bit code.
pub const PAUSE_BEFORE_MS: u64 = 500;
/// Multi-bit codes repeat this many times; one-bit codes show once.
pub const CODE_REPEATS: u32 = 3;

pub const PIX_OFF: u32 = 0;
pub const PIX_GREEN: u32 = 0x00_20_00;
pub const PIX_RED: u32 = 0x20_00_00;
pub const PIX_WHITE: u32 = 0x20_20_20;

/// An (error pattern, significant bit count) pair. Fully determines the
/// visible pulse sequence; there is no other state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StatusCode {
    pub err: u32,
    pub bits: u32,
}

impl StatusCode {
    /// One double-length success pulse, shown once.
    pub const SUCCESS: StatusCode = StatusCode { err: 0, bits: 1 };
    /// One long error pulse, shown once.
    pub const BOOT_CONSISTENCY: StatusCode = StatusCode { err: 1, bits: 1 };
    /// Three long pulses, repeated.
    pub const ATTEMPTS_EXHAUSTED: StatusCode = StatusCode { err: 7, bits: 3 };

    /// Two-bit rail index, repeated.
    pub const fn rail_failure(rail: Rail) -> StatusCode {
        StatusCode {
            err: rail.index() as u32,
            bits: 2,
        }
    }
}

/// Render `code` on the indicator. Pure timing over `Clock` + `Indicator`,
/// so the pulse train is checkable against a simulated clock.
pub fn blink<H: Clock + Indicator>(hal: &mut H, code: StatusCode) {
    let StatusCode { err, bits } = code;

    if bits != 1 {
        hal.put_pixel(PIX_OFF);
        hal.sleep_ms(PAUSE_BEFORE_MS);
    }

    for repeat in 0..CODE_REPEATS {
        for i in 0..bits {
            let is_long = err & (1 << (bits - i - 1)) != 0;
            hal.sleep_ms(if is_long { LONG_PAUSE_MS } else { SHORT_PAUSE_MS });

            // The lone zero of a one-bit code is the success pulse: double
            // short, success color.
            let success = bits == 1 && !is_long;
            hal.put_pixel(if success { PIX_WHITE } else { PIX_RED });
            hal.sleep_ms(if is_long {
                LONG_TIME_MS
            } else if success {
                SHORT_TIME_MS * 2
            } else {
                SHORT_TIME_MS
            });
            hal.put_pixel(PIX_OFF);

            let last_bit = i == bits - 1;
            let last_repeat = repeat == CODE_REPEATS - 1;
            if !last_bit || !last_repeat {
                hal.sleep_ms(if is_long { LONG_PAUSE_MS } else { SHORT_PAUSE_MS });
            }
            if last_bit && !last_repeat {
                hal.sleep_ms(PAUSE_BETWEEN_MS);
            }
        }

        // One-shot codes are never repeated.
        if bits == 1 {
            break;
        }
    }
}

/// Terminal signaling path: quiesce everything but the indicator, render
/// the code, then power down permanently.
pub fn signal_and_halt<H>(hal: &mut H, code: StatusCode) -> !
where
    H: Clock + Indicator + PowerControl + Board,
{
    info!("terminal status err={} bits={}", code.err, code.bits);
    power::quiesce_for_signal(hal);
    blink(hal, code);
    power::halt(hal)
}
