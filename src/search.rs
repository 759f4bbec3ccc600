//! Tiered search over glitch timing offsets.
//!
//! One boot gets three tiers, strictly in order: replay what worked
//! before, explore random offsets, then rewrite the payload and give the
//! best few records one more chance. A single adaptive pulse `width`
//! threads through every attempt in the boot; the driver may adjust it as
//! convergence feedback and the value is never reset between tiers.

use crate::hal::{
    Board, Clock, FuseBank, GlitchDriver, Indicator, PayloadChannel, RailSampler, RecordStore,
};
use crate::orchestrator::Context;

/// Seed pulse width for the first attempt of a boot.
pub const INITIAL_WIDTH: i32 = 140;

/// Entries in one random exploration round.
pub const OFFSET_CNT: usize = 32;

/// Tier A: passes over the record store.
pub const RECORD_PASSES: u32 = 2;
/// Tier A: low-level tries per candidate.
pub const RECORD_TRIES: u8 = 2;
/// Tier B: random exploration rounds.
pub const RANDOM_ROUNDS: u32 = 2;
/// Tier B: low-level tries per random offset.
pub const RANDOM_TRIES: u8 = 3;
/// Tier C: best candidates retried after the forced rewrite, from one
/// traversal of the store.
pub const POST_REWRITE_CANDIDATES: u32 = 3;
/// Tier C: low-level tries per candidate.
pub const POST_REWRITE_TRIES: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Tier {
    RecordReplay,
    RandomExploration,
    PostRewriteReplay,
}

/// Live search parameters for one boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SearchState {
    /// Offset of the most recent attempt.
    pub offset: i32,
    /// Shared adaptive pulse width, mutated only by the glitch driver.
    pub width: i32,
    pub tier: Tier,
}

impl SearchState {
    pub const fn new() -> Self {
        SearchState {
            offset: 0,
            width: INITIAL_WIDTH,
            tier: Tier::RecordReplay,
        }
    }
}

impl Default for SearchState {
    fn default() -> Self {
        Self::new()
    }
}

/// One best-first pass over the record store. Returns the winning offset
/// if an attempt lands.
fn replay_pass<H, R, F, G, P>(cx: &mut Context<'_, H, R, F, G, P>, tries: u8) -> Option<i32>
where
    H: Clock + Indicator + RailSampler + Board,
    R: RecordStore,
    F: FuseBank,
    G: GlitchDriver,
    P: PayloadChannel,
{
    cx.records.rewind();
    while let Some(offset) = cx.records.next_best() {
        cx.search.offset = offset;
        if cx.glitch.attempt(offset, &mut cx.search.width, tries) {
            return Some(offset);
        }
    }
    None
}

/// Run the tiers to first success or total exhaustion, tracking progress
/// in `cx.search`.
pub fn run<H, R, F, G, P>(cx: &mut Context<'_, H, R, F, G, P>) -> Option<i32>
where
    H: Clock + Indicator + RailSampler + Board,
    R: RecordStore,
    F: FuseBank,
    G: GlitchDriver,
    P: PayloadChannel,
{
    cx.search = SearchState::new();
    for pass in 0..RECORD_PASSES {
        debug!("tier A pass {}", pass);
        if let Some(offset) = replay_pass(cx, RECORD_TRIES) {
            return Some(offset);
        }
    }

    cx.search.tier = Tier::RandomExploration;
    for round in 0..RANDOM_ROUNDS {
        debug!("tier B round {}", round);
        let mut offsets = [0i32; OFFSET_CNT];
        cx.glitch.fill_random_offsets(&mut offsets);
        for &offset in offsets.iter() {
            cx.search.offset = offset;
            if cx.glitch.attempt(offset, &mut cx.search.width, RANDOM_TRIES) {
                return Some(offset);
            }
        }
    }

    // Last resort: the payload itself may be the problem. After the
    // rewrite only the few best records get another look; a full replay
    // already failed twice.
    cx.search.tier = Tier::PostRewriteReplay;
    cx.rewrite_payload();
    cx.records.rewind();
    for _ in 0..POST_REWRITE_CANDIDATES {
        let Some(offset) = cx.records.next_best() else {
            break;
        };
        cx.search.offset = offset;
        if cx.glitch.attempt(offset, &mut cx.search.width, POST_REWRITE_TRIES) {
            return Some(offset);
        }
    }

    None
}
