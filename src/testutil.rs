//! Simulated HAL and collaborators for host tests. The clock is virtual:
//! sleeps advance it exactly, and every `now_us` read or ADC sample
//! charges a small fixed cost so bounded polls make progress.

use std::cell::Cell;
use std::rc::Rc;
use std::vec::Vec;

use crate::hal::{
    Board, Clock, CoreVoltage, FuseBank, GlitchDriver, Indicator, PayloadChannel, PowerControl,
    Rail, RailSampler, RecordStore,
};

/// Raw count for a rail sitting at nominal 1.8 V.
pub const GOOD_RAW: u16 = 2234;

pub struct SimHal {
    now: Cell<u64>,
    /// Charged on every `now_us` read.
    pub poll_cost_us: u64,
    /// Charged on every ADC sample.
    pub sample_cost_us: u64,
    /// (timestamp_us, rgb) for every indicator write.
    pub pixels: Vec<(u64, u32)>,
    pub samples_taken: usize,
    /// Per rail: virtual time after which samples read in tolerance.
    pub rail_good_after_us: [u64; 3],
    pub watchdog_rebooted: bool,
    pub force_pin_asserted: bool,
    pub boot_slot_no: u32,
    pub led_pin_no: u8,
    pub power_pin_no: Option<u8>,
    pub quiesce_led: bool,
    pub quiesced: Vec<u8>,
    pub pulled_down: Vec<u8>,
    pub pulls_disabled: Vec<u8>,
    pub pio_stopped: bool,
    pub clock_khz: Option<u32>,
    pub core_voltage: Option<CoreVoltage>,
}

impl SimHal {
    pub fn new() -> Self {
        SimHal {
            now: Cell::new(0),
            poll_cost_us: 50,
            sample_cost_us: 100,
            pixels: Vec::new(),
            samples_taken: 0,
            rail_good_after_us: [0; 3],
            watchdog_rebooted: false,
            force_pin_asserted: false,
            boot_slot_no: 0,
            led_pin_no: 16,
            power_pin_no: Some(11),
            quiesce_led: true,
            quiesced: Vec::new(),
            pulled_down: Vec::new(),
            pulls_disabled: Vec::new(),
            pio_stopped: false,
            clock_khz: None,
            core_voltage: None,
        }
    }
}

impl Clock for SimHal {
    fn now_us(&self) -> u64 {
        let t = self.now.get();
        self.now.set(t + self.poll_cost_us);
        t
    }

    fn sleep_us(&mut self, us: u64) {
        self.now.set(self.now.get() + us);
    }
}

impl RailSampler for SimHal {
    fn sample(&mut self, rail: Rail) -> u16 {
        let t = self.now.get();
        self.now.set(t + self.sample_cost_us);
        self.samples_taken += 1;
        if t >= self.rail_good_after_us[rail.index() as usize] {
            GOOD_RAW
        } else {
            0
        }
    }
}

impl Indicator for SimHal {
    fn put_pixel(&mut self, rgb: u32) {
        self.pixels.push((self.now.get(), rgb));
    }
}

impl PowerControl for SimHal {
    fn set_sys_clock_khz(&mut self, khz: u32) {
        self.clock_khz = Some(khz);
    }

    fn set_core_voltage(&mut self, level: CoreVoltage) {
        self.core_voltage = Some(level);
    }

    fn stop_pio(&mut self) {
        self.pio_stopped = true;
    }

    fn pull_down(&mut self, pin: u8) {
        self.pulled_down.push(pin);
    }

    fn disable_pulls(&mut self, pin: u8) {
        self.pulls_disabled.push(pin);
    }

    fn quiesce_pin(&mut self, pin: u8) {
        self.quiesced.push(pin);
    }

    fn deep_sleep(&mut self) -> ! {
        panic!("deep sleep entered");
    }
}

impl Board for SimHal {
    fn led_pin(&self) -> u8 {
        self.led_pin_no
    }

    fn power_pin(&self) -> Option<u8> {
        self.power_pin_no
    }

    fn quiesce_led_on_halt(&self) -> bool {
        self.quiesce_led
    }

    fn watchdog_caused_reboot(&self) -> bool {
        self.watchdog_rebooted
    }

    fn force_rewrite_asserted(&mut self) -> bool {
        self.force_pin_asserted
    }

    fn wait_for_boot(&mut self, budget_us: u64) {
        self.sleep_us(budget_us);
    }

    fn boot_slot(&self) -> u32 {
        self.boot_slot_no
    }
}

/// Weight-ordered record store kept in memory. Appends gain the highest
/// weight so the latest winner replays first, matching the persisted
/// store's best-first contract.
pub struct SimRecords {
    entries: Vec<(i32, i32)>,
    order: Vec<usize>,
    cursor: usize,
    pub appended: Vec<i32>,
    /// `rewind` calls observed after construction.
    pub rewinds: usize,
}

impl SimRecords {
    pub fn new(entries: &[(i32, i32)]) -> Self {
        let mut store = SimRecords {
            entries: entries.to_vec(),
            order: Vec::new(),
            cursor: 0,
            appended: Vec::new(),
            rewinds: 0,
        };
        store.rewind();
        store.rewinds = 0;
        store
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl RecordStore for SimRecords {
    fn rewind(&mut self) {
        self.rewinds += 1;
        let mut order: Vec<usize> = (0..self.entries.len()).collect();
        order.sort_by_key(|&i| core::cmp::Reverse(self.entries[i].1));
        self.order = order;
        self.cursor = 0;
    }

    fn next_best(&mut self) -> Option<i32> {
        let &index = self.order.get(self.cursor)?;
        self.cursor += 1;
        Some(self.entries[index].0)
    }

    fn append(&mut self, offset: i32) {
        let top = self.entries.iter().map(|&(_, w)| w).max().unwrap_or(0);
        self.entries.push((offset, top + 1));
        self.appended.push(offset);
    }
}

pub struct SimFuses {
    pub attempts: u32,
    pub increments: u32,
    pub burns: u32,
}

impl SimFuses {
    pub fn new() -> Self {
        SimFuses {
            attempts: 0,
            increments: 0,
            burns: 0,
        }
    }
}

impl FuseBank for SimFuses {
    fn count(&self) -> u32 {
        self.attempts
    }

    fn increment(&mut self) {
        self.attempts += 1;
        self.increments += 1;
    }

    fn burn(&mut self) {
        self.burns += 1;
    }

    fn first_boot(&self) -> bool {
        self.attempts == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    pub offset: i32,
    pub width_in: i32,
    pub width_out: i32,
    pub max_tries: u8,
}

/// Scripted glitch driver: fails until the configured call number, and
/// optionally nudges `width` by a fixed step each call.
pub struct SimGlitch {
    pub attempts: Vec<Attempt>,
    succeed_on_call: Option<usize>,
    width_step: i32,
    calls: Rc<Cell<usize>>,
    random_rounds: usize,
}

impl SimGlitch {
    pub fn never() -> Self {
        SimGlitch {
            attempts: Vec::new(),
            succeed_on_call: None,
            width_step: 0,
            calls: Rc::new(Cell::new(0)),
            random_rounds: 0,
        }
    }

    pub fn succeed_on_call(n: usize) -> Self {
        let mut driver = Self::never();
        driver.succeed_on_call = Some(n);
        driver
    }

    pub fn with_width_step(mut self, step: i32) -> Self {
        self.width_step = step;
        self
    }

    /// Shared call counter, for asserting ordering against other mocks.
    pub fn call_counter(&self) -> Rc<Cell<usize>> {
        Rc::clone(&self.calls)
    }
}

impl GlitchDriver for SimGlitch {
    fn attempt(&mut self, offset: i32, width: &mut i32, max_tries: u8) -> bool {
        self.calls.set(self.calls.get() + 1);
        let width_in = *width;
        *width += self.width_step;
        self.attempts.push(Attempt {
            offset,
            width_in,
            width_out: *width,
            max_tries,
        });
        self.succeed_on_call == Some(self.calls.get())
    }

    fn fill_random_offsets(&mut self, out: &mut [i32]) {
        // Deterministic stand-in for the driver's randomizer: distinct
        // offsets per round, disjoint from the seeded record offsets.
        self.random_rounds += 1;
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = 2_000 + (self.random_rounds as i32) * 100 + i as i32;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadCall {
    Write,
    InitConfig,
    IsConfigured,
    FastCheck,
}

pub struct SimPayload {
    pub fast_check_ok: bool,
    pub configured: bool,
    pub write_ok: bool,
    pub calls: Vec<PayloadCall>,
    /// Glitch-attempt count observed at each `write_payload`, when wired.
    pub write_seen_attempts: Vec<usize>,
    pub attempt_counter: Option<Rc<Cell<usize>>>,
}

impl SimPayload {
    pub fn healthy() -> Self {
        SimPayload {
            fast_check_ok: true,
            configured: true,
            write_ok: true,
            calls: Vec::new(),
            write_seen_attempts: Vec::new(),
            attempt_counter: None,
        }
    }
}

impl PayloadChannel for SimPayload {
    fn write_payload(&mut self) -> bool {
        self.calls.push(PayloadCall::Write);
        let seen = self.attempt_counter.as_ref().map_or(0, |counter| counter.get());
        self.write_seen_attempts.push(seen);
        self.write_ok
    }

    fn init_config(&mut self) {
        self.calls.push(PayloadCall::InitConfig);
    }

    fn is_configured(&mut self) -> bool {
        self.calls.push(PayloadCall::IsConfigured);
        self.configured
    }

    fn fast_check(&mut self) -> bool {
        self.calls.push(PayloadCall::FastCheck);
        self.fast_check_ok
    }
}
