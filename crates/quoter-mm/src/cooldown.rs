//! Per-side fill cooldown / recovery state machine.
//!
//! ```text
//! NORMAL --fill--> COOLDOWN --cooldown elapsed--> RECOVERY --recovery elapsed--> NORMAL
//!                     ^                               |
//!                     +------------- fill ------------+   (a fill always restarts COOLDOWN)
//! ```
//!
//! COOLDOWN holds the side (no quote). RECOVERY quotes it at a widened
//! spread. The machine only looks at the instants it is handed, so tests
//! drive it without a clock.

use std::fmt;
use std::time::{Duration, Instant};

/// Phase of one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Normal,
    Cooldown,
    Recovery,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "NORMAL"),
            Self::Cooldown => write!(f, "COOLDOWN"),
            Self::Recovery => write!(f, "RECOVERY"),
        }
    }
}

impl Phase {
    /// Numeric code for gauges.
    pub fn code(&self) -> i64 {
        match self {
            Self::Normal => 0,
            Self::Cooldown => 1,
            Self::Recovery => 2,
        }
    }
}

/// A phase change produced by [`CooldownMachine::advance`] or
/// [`CooldownMachine::on_fill`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTransition {
    pub from: Phase,
    pub to: Phase,
    pub at: Instant,
}

/// Cooldown/recovery machine for one side.
#[derive(Debug, Clone)]
pub struct CooldownMachine {
    phase: Phase,
    phase_entered_at: Option<Instant>,
    cooldown: Duration,
    recovery: Duration,
}

impl CooldownMachine {
    pub fn new(cooldown: Duration, recovery: Duration) -> Self {
        Self {
            phase: Phase::Normal,
            phase_entered_at: None,
            cooldown,
            recovery,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn phase_entered_at(&self) -> Option<Instant> {
        self.phase_entered_at
    }

    /// A fill on this side. Enters (or restarts) COOLDOWN at `at`.
    pub fn on_fill(&mut self, at: Instant) -> PhaseTransition {
        let from = self.phase;
        self.phase = Phase::Cooldown;
        self.phase_entered_at = Some(at);
        PhaseTransition {
            from,
            to: Phase::Cooldown,
            at,
        }
    }

    /// Apply elapsed time up to `now`.
    ///
    /// Walks through every phase whose window has expired, so a long gap
    /// can go COOLDOWN -> RECOVERY -> NORMAL in one call. Each phase is
    /// entered at the instant its predecessor expired, not at `now`.
    pub fn advance(&mut self, now: Instant) -> Vec<PhaseTransition> {
        let mut transitions = Vec::new();
        loop {
            let Some(entered) = self.phase_entered_at else {
                break;
            };
            let window = match self.phase {
                Phase::Normal => break,
                Phase::Cooldown => self.cooldown,
                Phase::Recovery => self.recovery,
            };
            if now.saturating_duration_since(entered) < window {
                break;
            }
            let at = entered + window;
            let from = self.phase;
            let to = match from {
                Phase::Cooldown => Phase::Recovery,
                _ => Phase::Normal,
            };
            self.phase = to;
            self.phase_entered_at = if to == Phase::Normal { None } else { Some(at) };
            transitions.push(PhaseTransition { from, to, at });
        }
        transitions
    }

    /// Time left in the current phase at `now`.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        let entered = self.phase_entered_at?;
        let window = match self.phase {
            Phase::Normal => return None,
            Phase::Cooldown => self.cooldown,
            Phase::Recovery => self.recovery,
        };
        Some(window.saturating_sub(now.saturating_duration_since(entered)))
    }
}
