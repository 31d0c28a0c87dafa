//! Phase machine for the reduction cycle.
//!
//! ```text
//! PREPARE → EMIT → REDUCE(1) … REDUCE(R) → FINALIZE → BROADCAST → RELINK ─┐
//!            ▲                                                            │
//!            └────────────────────────────────────────────────────────────┘
//! ```
//!
//! PREPARE runs once. REDUCE self-loops until its round counter reaches
//! `R`; with `R = 0` EMIT goes straight to FINALIZE. The table does not
//! depend on `k`, only on `R`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// One stage of the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Prepare,
    Emit,
    Reduce,
    Finalize,
    Broadcast,
    Relink,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::Prepare,
        Phase::Emit,
        Phase::Reduce,
        Phase::Finalize,
        Phase::Broadcast,
        Phase::Relink,
    ];

    /// Stable numeric code, used in snapshots.
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Phase::Prepare => "PREPARE",
            Phase::Emit => "EMIT",
            Phase::Reduce => "REDUCE",
            Phase::Finalize => "FINALIZE",
            Phase::Broadcast => "BROADCAST",
            Phase::Relink => "RELINK",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Phase::Prepare => "Prepare processors...",
            Phase::Emit => "Output gist from processors...",
            Phase::Reduce => "Up-tree competition...",
            Phase::Finalize => "Generating final answer...",
            Phase::Broadcast => "Down-tree broadcasting...",
            Phase::Relink => "Updating processor links...",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u8> for Phase {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self, Error> {
        Phase::ALL
            .get(code as usize)
            .copied()
            .ok_or_else(|| Error::UnknownPhase(code.to_string()))
    }
}

impl FromStr for Phase {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        Phase::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnknownPhase(s.to_string()))
    }
}

/// Transition function.
///
/// `round` is only meaningful in REDUCE (1-based); other phases carry 0.
/// A REDUCE round above `total_rounds` is a caller bug.
pub fn advance(phase: Phase, round: u32, total_rounds: u32) -> (Phase, u32) {
    debug_assert!(phase != Phase::Reduce || (1..=total_rounds).contains(&round));
    match phase {
        Phase::Prepare => (Phase::Emit, 0),
        Phase::Emit if total_rounds > 0 => (Phase::Reduce, 1),
        Phase::Emit => (Phase::Finalize, 0),
        Phase::Reduce if round < total_rounds => (Phase::Reduce, round + 1),
        Phase::Reduce => (Phase::Finalize, 0),
        Phase::Finalize => (Phase::Broadcast, 0),
        Phase::Broadcast => (Phase::Relink, 0),
        Phase::Relink => (Phase::Emit, 0),
    }
}

/// The current position in the cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseMachine {
    phase: Phase,
    round: u32,
    total_rounds: u32,
    cycle: u64,
}

impl Default for PhaseMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseMachine {
    /// A machine at PREPARE. `R` is unknown until PREPARE learns `k`.
    pub fn new() -> Self {
        Self { phase: Phase::Prepare, round: 0, total_rounds: 0, cycle: 0 }
    }

    /// Resume at an arbitrary position.
    pub fn resume(phase: Phase, round: u32, total_rounds: u32, cycle: u64) -> Self {
        Self { phase, round, total_rounds, cycle }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn total_rounds(&self) -> u32 {
        self.total_rounds
    }

    /// Completed RELINKs.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn set_total_rounds(&mut self, total_rounds: u32) {
        self.total_rounds = total_rounds;
    }

    pub fn peek_next(&self) -> (Phase, u32) {
        advance(self.phase, self.round, self.total_rounds)
    }

    /// Move to the next phase and return it.
    pub fn advance(&mut self) -> Phase {
        if self.phase == Phase::Relink {
            self.cycle += 1;
        }
        (self.phase, self.round) = self.peek_next();
        self.phase
    }
}
