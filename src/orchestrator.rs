//! Attempt orchestrator: the once-per-boot control sequence.

use crate::error::{Fatal, Outcome};
use crate::hal::{
    Board, Clock, FuseBank, GlitchDriver, Indicator, PayloadChannel, RailSampler, RecordStore,
};
use crate::search::{self, SearchState};
use crate::selftest;
use crate::status::{PIX_GREEN, PIX_OFF, PIX_WHITE};

/// How long after self-test to wait for the target's boot device to start
/// answering, microseconds.
pub const BOOT_SETTLE_US: u64 = 2_490;

/// Settle after a successful pulse so in-flight trigger/readback
/// operations finish before persistence.
pub const SUCCESS_SETTLE_US: u64 = 100;
pub const SUCCESS_BLANK_MS: u64 = 50;
pub const SUCCESS_SHOW_MS: u64 = 200;

/// Coarse phase of the boot; `Halted` is terminal and only reachable
/// through the signaling path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerState {
    Booting,
    SelfTesting,
    RewritingPayload,
    Searching,
    Signaling,
    Halted,
}

/// Everything one boot touches, collected up front: the board HAL plus
/// the four external collaborators. No ambient globals.
pub struct Context<'a, H, R, F, G, P>
where
    H: Clock + Indicator + RailSampler + Board,
    R: RecordStore,
    F: FuseBank,
    G: GlitchDriver,
    P: PayloadChannel,
{
    pub hal: &'a mut H,
    pub records: &'a mut R,
    pub fuses: &'a mut F,
    pub glitch: &'a mut G,
    pub payload: &'a mut P,
    pub state: PowerState,
    pub search: SearchState,
}

impl<'a, H, R, F, G, P> Context<'a, H, R, F, G, P>
where
    H: Clock + Indicator + RailSampler + Board,
    R: RecordStore,
    F: FuseBank,
    G: GlitchDriver,
    P: PayloadChannel,
{
    pub fn new(
        hal: &'a mut H,
        records: &'a mut R,
        fuses: &'a mut F,
        glitch: &'a mut G,
        payload: &'a mut P,
    ) -> Self {
        Context {
            hal,
            records,
            fuses,
            glitch,
            payload,
            state: PowerState::Booting,
            search: SearchState::new(),
        }
    }

    fn enter(&mut self, state: PowerState) {
        debug!("phase {} -> {}", self.state, state);
        self.state = state;
    }

    /// White while writing, green once done, then refresh the config.
    pub(crate) fn rewrite_payload(&mut self) {
        let prev = self.state;
        self.enter(PowerState::RewritingPayload);
        self.hal.put_pixel(PIX_WHITE);
        if !self.payload.write_payload() {
            warn!("payload write reported failure");
        }
        self.hal.put_pixel(PIX_GREEN);
        self.payload.init_config();
        self.enter(prev);
    }

    /// Run one boot's attempt cycle to its decision. The caller signals
    /// the returned outcome and halts; nothing here returns control to a
    /// non-terminal path.
    pub fn run(&mut self) -> Outcome {
        // A watchdog reboot with no attempt ever recorded means the state
        // machine never reached the search on a boot we did not see.
        // Impossible unless persistence is broken; stop immediately.
        if self.hal.watchdog_caused_reboot() && self.fuses.first_boot() {
            return Outcome::Fatal(Fatal::BootConsistency);
        }

        // Sample the force strap before the indicator starts driving
        // current through the shared pad.
        let force_rewrite = self.hal.force_rewrite_asserted();

        self.hal.put_pixel(PIX_GREEN);
        self.enter(PowerState::SelfTesting);
        if let Err(rail) = selftest::run(self.hal) {
            return Outcome::Fatal(Fatal::RailValidation(rail));
        }

        self.hal.wait_for_boot(BOOT_SETTLE_US);

        let intact = self.payload.fast_check();
        let reconfigure = force_rewrite || !self.payload.is_configured();
        if !intact || reconfigure {
            self.rewrite_payload();
        }

        self.enter(PowerState::Searching);
        self.fuses.increment();
        let found = search::run(self);

        self.enter(PowerState::Signaling);
        match found {
            Some(offset) => {
                info!(
                    "glitched at offset {} width {} in {}",
                    offset, self.search.width, self.search.tier
                );
                self.record_success(offset);
                Outcome::Success { offset }
            }
            None => Outcome::Fatal(Fatal::AttemptsExhausted),
        }
    }

    /// Success choreography: let the hardware settle, force a visible
    /// all-clear, then persist. Persistence is the last thing before the
    /// terminal signal so a power cut can only lose this boot's own write.
    fn record_success(&mut self, offset: i32) {
        self.hal.sleep_us(SUCCESS_SETTLE_US);
        self.hal.put_pixel(PIX_OFF);
        self.hal.sleep_ms(SUCCESS_BLANK_MS);
        self.hal.put_pixel(PIX_WHITE);
        self.hal.sleep_ms(SUCCESS_SHOW_MS);

        // Attempt parity doubles as the rollback/boot-slot marker; flip
        // the fuse only when it disagrees with the slot we booted for.
        if (self.fuses.count() & 1) != self.hal.boot_slot() {
            self.fuses.burn();
        }
        self.records.append(offset);
    }
}
