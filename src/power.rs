//! Power/pin sequencer: the one-way ramp every code path ends on.

use crate::hal::{Board, CoreVoltage, PowerControl};
use crate::pins;

/// System clock while signaling; full speed is pointless once the attack
/// is over.
pub const SIGNAL_CLOCK_KHZ: u32 = 48_000;

/// System clock during the attack. The pulse spin loops are calibrated
/// against this rate, so bring-up sets it before the first attempt.
pub const ATTACK_CLOCK_KHZ: u32 = 200_000;

/// Raise clock and core voltage to the attack operating point. The
/// regulator needs the short settle before the clock steps up.
pub fn raise_for_attack<H: PowerControl + crate::hal::Clock>(hal: &mut H) {
    hal.set_core_voltage(CoreVoltage::V1_30);
    hal.sleep_us(100);
    hal.set_sys_clock_khz(ATTACK_CLOCK_KHZ);
}

/// Quiesce every pin except the indicator and its supply, stop the PIO
/// blocks, and drop clock and core voltage to the signaling floor.
/// Idempotent.
pub fn quiesce_for_signal<H: PowerControl + Board>(hal: &mut H) {
    for pin in 0..=pins::PIN_MAX {
        if pin == hal.led_pin() || Some(pin) == hal.power_pin() {
            continue;
        }
        if pins::GLITCH_PINS.contains(&pin) {
            hal.pull_down(pin);
        } else {
            hal.disable_pulls(pin);
        }
        hal.quiesce_pin(pin);
    }
    hal.stop_pio();
    hal.set_sys_clock_khz(SIGNAL_CLOCK_KHZ);
    hal.set_core_voltage(CoreVoltage::V0_95);
}

/// Quiesce the indicator pins too and enter permanent deep sleep. Only a
/// physical power cycle comes back from this.
pub fn halt<H: PowerControl + Board>(hal: &mut H) -> ! {
    if hal.quiesce_led_on_halt() {
        hal.quiesce_pin(hal.led_pin());
    }
    if let Some(pin) = hal.power_pin() {
        hal.quiesce_pin(pin);
    }
    hal.set_core_voltage(CoreVoltage::Minimum);
    hal.deep_sleep()
}
