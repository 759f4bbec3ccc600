//! Bench firmware for the glitch control core on an RP2040 carrier.
//!
//! Wires the board layer to bench-grade collaborators: a RAM-backed
//! record store, scratch-register fuse counters and a GPIO pulse driver.
//! Production glitch, payload and fuse drivers live outside this crate;
//! this binary exists to exercise the full attempt loop on real hardware.

#![cfg_attr(all(target_arch = "arm", target_os = "none"), no_std)]
#![cfg_attr(all(target_arch = "arm", target_os = "none"), no_main)]

#[cfg(all(target_arch = "arm", target_os = "none"))]
mod fw {
    use cortex_m_rt::entry;
    use panic_halt as _;
    use rp2040_hal as hal;

    use glitch_fw::board::{rp2040, BoardConfig, Rp2040Board};
    use glitch_fw::hal::{Clock, FuseBank, GlitchDriver, PayloadChannel, RecordStore};
    use glitch_fw::orchestrator::Context;
    use glitch_fw::pins;
    use glitch_fw::poll::Deadline;
    use glitch_fw::power;
    use glitch_fw::status;

    #[link_section = ".boot2"]
    #[used]
    pub static BOOT2: [u8; 256] = rp2040_boot2::BOOT_LOADER_W25Q080;

    const XOSC_HZ: u32 = 12_000_000;

    /// Sense line that goes high when the target leaves its stock boot
    /// path on the bench fixture.
    const SENSE_PIN: u8 = 5;
    const SENSE_BUDGET_US: u64 = 20_000;

    const RECORD_SLOTS: usize = 16;
    // The handed-out bitmap below must cover every slot.
    const _: () = assert!(RECORD_SLOTS <= u16::BITS as usize);

    /// RAM-backed record store: same best-first contract as the flash
    /// store, minus persistence across power cycles.
    struct RamRecords {
        entries: [(i32, i32); RECORD_SLOTS],
        used: usize,
        handed: u16,
    }

    impl RamRecords {
        fn new() -> Self {
            RamRecords {
                entries: [(0, 0); RECORD_SLOTS],
                used: 0,
                handed: 0,
            }
        }
    }

    impl RecordStore for RamRecords {
        fn rewind(&mut self) {
            self.handed = 0;
        }

        fn next_best(&mut self) -> Option<i32> {
            let mut best: Option<(usize, i32)> = None;
            for (i, &(_, weight)) in self.entries[..self.used].iter().enumerate() {
                if self.handed & (1 << i) != 0 {
                    continue;
                }
                if best.map_or(true, |(_, w)| weight > w) {
                    best = Some((i, weight));
                }
            }
            let (index, _) = best?;
            self.handed |= 1 << index;
            Some(self.entries[index].0)
        }

        fn append(&mut self, offset: i32) {
            if self.used < RECORD_SLOTS {
                let top = self.entries[..self.used]
                    .iter()
                    .map(|&(_, w)| w)
                    .max()
                    .unwrap_or(0);
                self.entries[self.used] = (offset, top + 1);
                self.used += 1;
            }
        }
    }

    /// Attempt counter in the watchdog scratch registers: survives the
    /// watchdog reboots that matter for the boot-consistency guard.
    struct ScratchFuses;

    const SCRATCH_ATTEMPTS: u32 = 0x4005_800c;
    const SCRATCH_FUSE: u32 = 0x4005_8010;

    fn scratch_read(addr: u32) -> u32 {
        unsafe { core::ptr::read_volatile(addr as *const u32) }
    }

    fn scratch_write(addr: u32, value: u32) {
        unsafe { core::ptr::write_volatile(addr as *mut u32, value) }
    }

    impl FuseBank for ScratchFuses {
        fn count(&self) -> u32 {
            scratch_read(SCRATCH_ATTEMPTS)
        }

        fn increment(&mut self) {
            scratch_write(SCRATCH_ATTEMPTS, self.count().wrapping_add(1));
        }

        fn burn(&mut self) {
            scratch_write(SCRATCH_FUSE, scratch_read(SCRATCH_FUSE) ^ 1);
        }

        fn first_boot(&self) -> bool {
            self.count() == 0
        }
    }

    /// Clock view over a borrowed timer, for deadline math only.
    struct Spin<'a>(&'a hal::Timer);

    impl Clock for Spin<'_> {
        fn now_us(&self) -> u64 {
            self.0.get_counter().ticks()
        }

        fn sleep_us(&mut self, us: u64) {
            let until = self.now_us() + us;
            while self.now_us() < until {
                cortex_m::asm::nop();
            }
        }
    }

    /// GPIO bench glitcher: opens the MOSFET gate for `width` core-clock
    /// spins at `offset` microseconds past the reset release, then polls
    /// the sense line. Widens the pulse a step per failed try.
    struct BenchGlitch {
        timer: hal::Timer,
        gate_pin: u8,
        rng: u32,
    }

    impl BenchGlitch {
        fn new(timer: hal::Timer, gate_pin: u8) -> Self {
            let seed = timer.get_counter().ticks() as u32 | 1;
            BenchGlitch {
                timer,
                gate_pin,
                rng: seed,
            }
        }

        fn next_rand(&mut self) -> u32 {
            // xorshift32
            let mut x = self.rng;
            x ^= x << 13;
            x ^= x >> 17;
            x ^= x << 5;
            self.rng = x;
            x
        }

        fn fire(&mut self, offset: i32, width: i32) -> bool {
            // Release the target's reset, line the pulse up, fire.
            let clock = Spin(&self.timer);
            rp2040::drive_pin(pins::PIN_RST, true);
            let deadline = Deadline::after_us(&clock, offset.max(0) as u64);
            while !deadline.reached(&clock) {
                cortex_m::asm::nop();
            }
            rp2040::drive_pin(self.gate_pin, true);
            for _ in 0..width.max(1) {
                cortex_m::asm::nop();
            }
            rp2040::drive_pin(self.gate_pin, false);
            rp2040::release_pin(pins::PIN_RST);

            let sense = Deadline::after_us(&clock, SENSE_BUDGET_US);
            glitch_fw::poll::poll_until(&clock, sense, || rp2040::read_pin(SENSE_PIN))
        }
    }

    impl GlitchDriver for BenchGlitch {
        fn attempt(&mut self, offset: i32, width: &mut i32, max_tries: u8) -> bool {
            for _ in 0..max_tries {
                if self.fire(offset, *width) {
                    return true;
                }
                // Convergence heuristic is the driver's to own; the bench
                // one just widens slowly.
                *width += 2;
            }
            false
        }

        fn fill_random_offsets(&mut self, out: &mut [i32]) {
            for slot in out.iter_mut() {
                *slot = 800 + (self.next_rand() % 1_200) as i32;
            }
        }
    }

    /// Bench fixture has no boot storage to inject into.
    struct BenchPayload;

    impl PayloadChannel for BenchPayload {
        fn write_payload(&mut self) -> bool {
            true
        }

        fn init_config(&mut self) {}

        fn is_configured(&mut self) -> bool {
            true
        }

        fn fast_check(&mut self) -> bool {
            true
        }
    }

    #[entry]
    fn main() -> ! {
        let mut pac = hal::pac::Peripherals::take().unwrap();

        let watchdog_rebooted = pac.WATCHDOG.reason.read().timer().bit_is_set()
            || pac.WATCHDOG.reason.read().force().bit_is_set();
        let mut watchdog = hal::Watchdog::new(pac.WATCHDOG);

        let clocks = hal::clocks::init_clocks_and_plls(
            XOSC_HZ,
            pac.XOSC,
            pac.CLOCKS,
            pac.PLL_SYS,
            pac.PLL_USB,
            &mut pac.RESETS,
            &mut watchdog,
        )
        .ok()
        .unwrap();
        let timer = hal::Timer::new(pac.TIMER, &mut pac.RESETS, &clocks);

        // Bench fixture: stock Pico with its discrete LED.
        let cfg = BoardConfig {
            led_pin: 25,
            power_pin: None,
            plain_led: true,
            quiesce_led_on_halt: true,
            force_pin: 1,
            boot_slot: 0,
            ws_program_offset: 0,
        };
        let mut board = Rp2040Board::new(timer, cfg, watchdog_rebooted);
        // The pulse spin loops assume the attack operating point, so step
        // up from the post-init defaults before the first attempt.
        power::raise_for_attack(&mut board);

        let mut records = RamRecords::new();
        let mut fuses = ScratchFuses;
        let mut glitch = BenchGlitch::new(timer, pins::GLITCH_PIN_PICO);
        let mut payload = BenchPayload;

        let outcome = {
            let mut cx = Context::new(
                &mut board,
                &mut records,
                &mut fuses,
                &mut glitch,
                &mut payload,
            );
            cx.run()
        };

        status::signal_and_halt(&mut board, outcome.status())
    }
}

#[cfg(not(all(target_arch = "arm", target_os = "none")))]
fn main() {
    // The firmware entry only exists on the embedded target.
}
