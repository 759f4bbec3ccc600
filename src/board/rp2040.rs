//! RP2040 implementation of the hardware capability traits.
//!
//! Timekeeping and bring-up go through `rp2040-hal`; pad isolation, ADC
//! one-shots, the PIO-driven indicator and the power-down ramp are direct
//! register writes, all confined to this module.

use rp2040_hal as hal;

use crate::hal::{
    Board, Clock, CoreVoltage, Indicator, PowerControl, Rail, RailSampler,
};

const ATOMIC_SET: u32 = 0x2000;
const ATOMIC_CLR: u32 = 0x3000;

const PADS_BANK0_BASE: u32 = 0x4001_c000;
const PAD_OD: u32 = 1 << 7;
const PAD_IE: u32 = 1 << 6;
const PAD_PUE: u32 = 1 << 3;
const PAD_PDE: u32 = 1 << 2;
const PAD_DRIVE_12MA: u32 = 0b11 << 4;

const SIO_GPIO_IN: u32 = 0xd000_0004;
const SIO_GPIO_OUT_SET: u32 = 0xd000_0014;
const SIO_GPIO_OUT_CLR: u32 = 0xd000_0018;
const SIO_GPIO_OE_SET: u32 = 0xd000_0024;
const SIO_GPIO_OE_CLR: u32 = 0xd000_0028;

const IO_BANK0_BASE: u32 = 0x4001_4000;
const GPIO_FUNC_SIO: u32 = 5;
const GPIO_FUNC_PIO0: u32 = 6;

const ADC_CS: u32 = 0x4004_c000;
const ADC_RESULT: u32 = 0x4004_c004;
const ADC_CS_EN: u32 = 1;
const ADC_CS_START_ONCE: u32 = 1 << 2;
const ADC_CS_READY: u32 = 1 << 8;
const ADC_CS_AINSEL_LSB: u32 = 12;

const PIO0_BASE: u32 = 0x5020_0000;
const PIO1_BASE: u32 = 0x5030_0000;
const PIO_CTRL: u32 = 0x000;
const PIO_FSTAT: u32 = 0x004;
const PIO_TXF3: u32 = 0x01c;
const PIO_FSTAT_TXFULL_SM3: u32 = 1 << (16 + 3);
const PIO_CTRL_SM3_ENABLE: u32 = 1 << 3;
const PIO_CTRL_SM3_RESTART: u32 = 1 << 7;
const PIO_CTRL_SM3_CLKDIV_RESTART: u32 = 1 << 11;
const PIO_SM3_CLKDIV: u32 = 0x110;
const PIO_SM3_EXECCTRL: u32 = 0x114;
const PIO_SM3_SHIFTCTRL: u32 = 0x118;
const PIO_SM3_INSTR: u32 = 0x120;
const PIO_SM3_PINCTRL: u32 = 0x124;

/// Serial-LED program shape: 4 instructions wrapping over all of them,
/// 10 state-machine cycles per 800 kHz bit.
const WS_PROGRAM_LEN: u32 = 4;
const WS_BIT_HZ: u32 = 800_000;
const WS_CYCLES_PER_BIT: u32 = 10;
/// `set pindirs, 1`, with SET mapped at the LED pin.
const WS_SET_PINDIRS_OUTPUT: u32 = 0xe081;

const CLK_SYS_CTRL: u32 = 0x4000_803c;
const CLK_SYS_SRC_AUX: u32 = 1;
const CLK_SYS_AUXSRC_MASK: u32 = 0b111 << 5;
const CLK_SYS_AUXSRC_PLL_USB: u32 = 1 << 5;

const PLL_SYS_CS: u32 = 0x4002_8000;
const PLL_SYS_CS_LOCK: u32 = 1 << 31;
const PLL_SYS_FBDIV_INT: u32 = 0x4002_8008;
const PLL_SYS_PRIM: u32 = 0x4002_800c;

const VREG_CTRL: u32 = 0x4006_4000;
const VREG_BOD: u32 = 0x4006_4004;
const VREG_EN: u32 = 1;
const VREG_VSEL_LSB: u32 = 4;

const ROSC_CTRL: u32 = 0x4006_0000;
const XOSC_CTRL: u32 = 0x4002_4000;
/// Magic ENABLE-field value that stops the oscillator.
const OSC_DISABLE: u32 = 0x00d1_e000;

#[inline]
fn reg_write(addr: u32, value: u32) {
    unsafe { core::ptr::write_volatile(addr as *mut u32, value) }
}

#[inline]
fn reg_read(addr: u32) -> u32 {
    unsafe { core::ptr::read_volatile(addr as *const u32) }
}

#[inline]
fn reg_set(addr: u32, bits: u32) {
    reg_write(addr + ATOMIC_SET, bits);
}

#[inline]
fn reg_clr(addr: u32, bits: u32) {
    reg_write(addr + ATOMIC_CLR, bits);
}

fn pad_reg(pin: u8) -> u32 {
    PADS_BANK0_BASE + 4 + ((pin as u32) << 2)
}

fn gpio_ctrl_reg(pin: u8) -> u32 {
    IO_BANK0_BASE + 4 + ((pin as u32) << 3)
}

/// Drive a pin high through SIO, selecting the SIO function first.
pub fn drive_pin(pin: u8, high: bool) {
    reg_write(gpio_ctrl_reg(pin), GPIO_FUNC_SIO);
    let mask = 1u32 << pin;
    reg_write(if high { SIO_GPIO_OUT_SET } else { SIO_GPIO_OUT_CLR }, mask);
    reg_write(SIO_GPIO_OE_SET, mask);
}

pub fn release_pin(pin: u8) {
    reg_write(SIO_GPIO_OE_CLR, 1u32 << pin);
}

pub fn read_pin(pin: u8) -> bool {
    reg_read(SIO_GPIO_IN) & (1 << pin) != 0
}

/// Isolate the pad entirely: output-disable on, input-enable off.
fn pad_isolate(pin: u8) {
    reg_set(pad_reg(pin), PAD_OD);
    reg_clr(pad_reg(pin), PAD_IE);
}

fn pad_connect(pin: u8) {
    reg_clr(pad_reg(pin), PAD_OD);
    reg_set(pad_reg(pin), PAD_IE);
}

/// Facts about the carrier, resolved by the variant-detection collaborator
/// before the core starts.
#[derive(Clone, Copy)]
pub struct BoardConfig {
    pub led_pin: u8,
    /// Supply pin for the addressable LED, if the carrier routes one.
    pub power_pin: Option<u8>,
    /// Discrete single-color LED instead of an addressable part.
    pub plain_led: bool,
    /// Compact carriers keep the LED pad connected through the halt.
    pub quiesce_led_on_halt: bool,
    /// Operator strap for forcing a payload rewrite.
    pub force_pin: u8,
    pub boot_slot: u32,
    /// Instruction offset of the preloaded serial-LED PIO program.
    pub ws_program_offset: u8,
}

pub struct Rp2040Board {
    timer: hal::Timer,
    cfg: BoardConfig,
    watchdog_rebooted: bool,
    led_powered: bool,
    /// Last rate programmed through `set_sys_clock_khz`; the serial-LED
    /// divider is derived from it.
    sysclk_khz: u32,
}

impl Rp2040Board {
    pub fn new(timer: hal::Timer, cfg: BoardConfig, watchdog_rebooted: bool) -> Self {
        reg_set(ADC_CS, ADC_CS_EN);
        Rp2040Board {
            timer,
            cfg,
            watchdog_rebooted,
            led_powered: false,
            // hal::clocks::init_clocks_and_plls default until retuned.
            sysclk_khz: 125_000,
        }
    }

    /// Rebind SM3 to the preloaded serial-LED program. Done per frame: the
    /// divider tracks whatever clk_sys currently runs at, and the halt path
    /// may have stopped the state machine since the last pixel.
    fn bind_led_sm(&mut self) {
        let offset = self.cfg.ws_program_offset as u32;
        let pin = self.cfg.led_pin as u32;
        let div = (self.sysclk_khz * 1_000 / (WS_BIT_HZ * WS_CYCLES_PER_BIT)).max(1);
        reg_write(PIO0_BASE + PIO_SM3_CLKDIV, div << 16);
        reg_write(
            PIO0_BASE + PIO_SM3_EXECCTRL,
            ((offset + WS_PROGRAM_LEN - 1) << 12) | (offset << 7),
        );
        // FIFOs joined towards TX, autopull at 24 bits, shift left.
        reg_write(
            PIO0_BASE + PIO_SM3_SHIFTCTRL,
            (1 << 30) | (24 << 25) | (1 << 17),
        );
        // Side-set drives the LED pin; SET maps there too so the forced
        // pindir instruction lands on the same pad.
        reg_write(
            PIO0_BASE + PIO_SM3_PINCTRL,
            (1 << 29) | (1 << 26) | (pin << 10) | (pin << 5),
        );
        reg_write(gpio_ctrl_reg(self.cfg.led_pin), GPIO_FUNC_PIO0);
        reg_set(
            PIO0_BASE + PIO_CTRL,
            PIO_CTRL_SM3_RESTART | PIO_CTRL_SM3_CLKDIV_RESTART,
        );
        reg_write(PIO0_BASE + PIO_SM3_INSTR, WS_SET_PINDIRS_OUTPUT);
        // An unconditional jmp encodes as the target address itself.
        reg_write(PIO0_BASE + PIO_SM3_INSTR, offset);
    }

    fn push_grb(&mut self, word: u32) {
        self.bind_led_sm();
        reg_set(PIO0_BASE + PIO_CTRL, PIO_CTRL_SM3_ENABLE);
        while reg_read(PIO0_BASE + PIO_FSTAT) & PIO_FSTAT_TXFULL_SM3 != 0 {}
        reg_write(PIO0_BASE + PIO_TXF3, word);
        // Let the state machine clock the frame out before stopping it.
        self.sleep_us(30);
        reg_clr(PIO0_BASE + PIO_CTRL, PIO_CTRL_SM3_ENABLE);
    }
}

impl Clock for Rp2040Board {
    fn now_us(&self) -> u64 {
        self.timer.get_counter().ticks()
    }

    fn sleep_us(&mut self, us: u64) {
        let until = self.now_us().saturating_add(us);
        while self.now_us() < until {
            cortex_m::asm::nop();
        }
    }
}

impl RailSampler for Rp2040Board {
    fn sample(&mut self, rail: Rail) -> u16 {
        let pin = rail.pin();
        pad_connect(pin);
        reg_clr(ADC_CS, 0b111 << ADC_CS_AINSEL_LSB);
        reg_set(
            ADC_CS,
            ((pin as u32 - 26) << ADC_CS_AINSEL_LSB) | ADC_CS_START_ONCE,
        );
        while reg_read(ADC_CS) & ADC_CS_READY == 0 {}
        let raw = (reg_read(ADC_RESULT) & 0xfff) as u16;
        pad_isolate(pin);
        raw
    }
}

impl Indicator for Rp2040Board {
    fn put_pixel(&mut self, rgb: u32) {
        if self.cfg.plain_led {
            // Discrete LED: any nonzero color is simply "on".
            drive_pin(self.cfg.led_pin, rgb != 0);
            return;
        }

        if !self.led_powered {
            if let Some(pwr) = self.cfg.power_pin {
                reg_set(pad_reg(pwr), PAD_DRIVE_12MA);
                drive_pin(pwr, true);
                self.sleep_us(100);
            }
            self.led_powered = true;
        }

        let red = (rgb >> 16) & 0xff;
        let green = (rgb >> 8) & 0xff;
        let blue = rgb & 0xff;
        let grb = (green << 16) | (red << 8) | blue;
        self.push_grb(grb << 8);
    }
}

impl PowerControl for Rp2040Board {
    fn set_sys_clock_khz(&mut self, khz: u32) {
        // Glitchless switch: park clk_sys on the reference clock before
        // touching the PLLs or the aux mux, then hand it back.
        match khz {
            crate::power::ATTACK_CLOCK_KHZ => {
                reg_clr(CLK_SYS_CTRL, CLK_SYS_SRC_AUX);
                // 12 MHz crystal * 100 = 1200 MHz VCO, /6 /1 = 200 MHz.
                reg_write(PLL_SYS_FBDIV_INT, 100);
                reg_write(PLL_SYS_PRIM, (6 << 16) | (1 << 12));
                while reg_read(PLL_SYS_CS) & PLL_SYS_CS_LOCK == 0 {}
                // Aux source 0 is the system PLL.
                reg_clr(CLK_SYS_CTRL, CLK_SYS_AUXSRC_MASK);
                reg_set(CLK_SYS_CTRL, CLK_SYS_SRC_AUX);
            }
            crate::power::SIGNAL_CLOCK_KHZ => {
                // The 48 MHz signaling floor comes off the USB PLL, which
                // init left running and locked.
                reg_clr(CLK_SYS_CTRL, CLK_SYS_SRC_AUX);
                reg_clr(CLK_SYS_CTRL, CLK_SYS_AUXSRC_MASK);
                reg_set(CLK_SYS_CTRL, CLK_SYS_AUXSRC_PLL_USB);
                reg_set(CLK_SYS_CTRL, CLK_SYS_SRC_AUX);
            }
            other => {
                warn!("unsupported clk_sys request: {} kHz", other);
                return;
            }
        }
        self.sysclk_khz = khz;
    }

    fn set_core_voltage(&mut self, level: CoreVoltage) {
        let vsel = match level {
            CoreVoltage::V0_95 => 0b1000,
            CoreVoltage::V1_30 => 0b1111,
            CoreVoltage::Minimum => 0b0000,
        };
        reg_write(VREG_CTRL, VREG_EN | (vsel << VREG_VSEL_LSB));
    }

    fn stop_pio(&mut self) {
        reg_clr(PIO0_BASE + PIO_CTRL, 0xf);
        reg_clr(PIO1_BASE + PIO_CTRL, 0xf);
    }

    fn pull_down(&mut self, pin: u8) {
        reg_set(pad_reg(pin), PAD_PDE);
        reg_clr(pad_reg(pin), PAD_PUE);
    }

    fn disable_pulls(&mut self, pin: u8) {
        reg_clr(pad_reg(pin), PAD_PUE | PAD_PDE);
    }

    fn quiesce_pin(&mut self, pin: u8) {
        pad_isolate(pin);
    }

    fn deep_sleep(&mut self) -> ! {
        // Reference clock, brownout off, ring oscillator off, regulator
        // floor, crystal off. Nothing executes past the wfi but the loop
        // keeps the compiler honest.
        reg_clr(CLK_SYS_CTRL, CLK_SYS_SRC_AUX);
        reg_clr(VREG_BOD, 1);
        reg_write(ROSC_CTRL, OSC_DISABLE);
        reg_write(VREG_CTRL, VREG_EN);
        reg_write(XOSC_CTRL, OSC_DISABLE);
        loop {
            cortex_m::asm::wfi();
        }
    }
}

impl Board for Rp2040Board {
    fn led_pin(&self) -> u8 {
        self.cfg.led_pin
    }

    fn power_pin(&self) -> Option<u8> {
        self.cfg.power_pin
    }

    fn quiesce_led_on_halt(&self) -> bool {
        self.cfg.quiesce_led_on_halt
    }

    fn watchdog_caused_reboot(&self) -> bool {
        self.watchdog_rebooted
    }

    fn force_rewrite_asserted(&mut self) -> bool {
        // Strap reads low when the operator ties it to ground.
        let pin = self.cfg.force_pin;
        pad_connect(pin);
        reg_set(pad_reg(pin), PAD_PUE);
        reg_clr(pad_reg(pin), PAD_PDE);
        self.sleep_us(1_000);
        let asserted = !read_pin(pin);
        self.disable_pulls(pin);
        pad_isolate(pin);
        asserted
    }

    fn wait_for_boot(&mut self, budget_us: u64) {
        self.sleep_us(budget_us);
    }

    fn boot_slot(&self) -> u32 {
        self.cfg.boot_slot
    }
}
