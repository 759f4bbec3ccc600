//! Terminal outcome taxonomy. Nothing here is recoverable: every variant
//! maps to a status code that is signaled exactly once before halt.

use thiserror::Error;

use crate::hal::Rail;
use crate::status::StatusCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Fatal {
    /// A rail never reached tolerance inside the self-test budget.
    #[error("rail {0:?} out of tolerance")]
    RailValidation(Rail),
    /// The watchdog fired before any attempt cycle was ever recorded; that
    /// state should be impossible.
    #[error("watchdog reboot before first recorded attempt")]
    BootConsistency,
    /// Every search tier ran dry.
    #[error("all glitch search tiers exhausted")]
    AttemptsExhausted,
}

impl Fatal {
    pub const fn status(self) -> StatusCode {
        match self {
            Fatal::RailValidation(rail) => StatusCode::rail_failure(rail),
            Fatal::BootConsistency => StatusCode::BOOT_CONSISTENCY,
            Fatal::AttemptsExhausted => StatusCode::ATTEMPTS_EXHAUSTED,
        }
    }
}

/// What one boot's attempt cycle came to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Outcome {
    /// A pulse at this offset diverted the target's boot.
    Success { offset: i32 },
    Fatal(Fatal),
}

impl Outcome {
    pub const fn status(&self) -> StatusCode {
        match self {
            Outcome::Success { .. } => StatusCode::SUCCESS,
            Outcome::Fatal(fatal) => fatal.status(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_codes_match_protocol() {
        assert_eq!(
            Fatal::RailValidation(Rail::Reset).status(),
            StatusCode { err: 0, bits: 2 }
        );
        assert_eq!(
            Fatal::RailValidation(Rail::Command).status(),
            StatusCode { err: 1, bits: 2 }
        );
        assert_eq!(
            Fatal::RailValidation(Rail::Data).status(),
            StatusCode { err: 2, bits: 2 }
        );
        assert_eq!(Fatal::BootConsistency.status(), StatusCode { err: 1, bits: 1 });
        assert_eq!(
            Fatal::AttemptsExhausted.status(),
            StatusCode { err: 7, bits: 3 }
        );
    }

    #[test]
    fn success_is_the_one_bit_zero_code() {
        assert_eq!(
            Outcome::Success { offset: 812 }.status(),
            StatusCode { err: 0, bits: 1 }
        );
    }
}
