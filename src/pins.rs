//! Fixed pin assignments shared by the core and the board layer.

/// Reset rail tap, ADC0.
pub const PIN_RST: u8 = 26;
/// Command rail tap, ADC1.
pub const PIN_CMD: u8 = 27;
/// Data rail tap, ADC2.
pub const PIN_DAT: u8 = 28;

/// Glitch MOSFET gates, one per supported carrier board routing. These must
/// be held low while quiescing, never floated; a floating gate can fire the
/// pulse during power-down.
pub const GLITCH_PIN_PICO: u8 = 6;
pub const GLITCH_PIN_XIAO: u8 = 2;
pub const GLITCH_PIN_WS: u8 = 9;
pub const GLITCH_PIN_ITSY: u8 = 7;

pub const GLITCH_PINS: [u8; 4] = [
    GLITCH_PIN_PICO,
    GLITCH_PIN_XIAO,
    GLITCH_PIN_WS,
    GLITCH_PIN_ITSY,
];

/// Highest user-accessible GPIO on the bank.
pub const PIN_MAX: u8 = 29;
