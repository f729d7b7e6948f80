//! Idle time accounting.
//!
//! The accumulator is the only state that survives between ticks. It is
//! deliberately not persisted: a restart starts a fresh idle window.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "ticks")]
pub enum IdlePhase {
    Active,
    Idling(u64),
    ShuttingDown,
}

impl IdlePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdlePhase::Active => "active",
            IdlePhase::Idling(_) => "idling",
            IdlePhase::ShuttingDown => "shutting_down",
        }
    }
}

/// What the session should do after recording one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickDecision {
    Active,
    Idle { consecutive: u64, elapsed: Duration },
    /// The threshold was crossed on this tick. Returned exactly once.
    Shutdown { elapsed: Duration },
    /// Ticks after the shutdown decision are ignored.
    Finished,
}

#[derive(Debug, Clone)]
pub struct IdleAccumulator {
    threshold: Duration,
    consecutive_idle: u64,
    idle_elapsed: Duration,
    last_activity: DateTime<Utc>,
    phase: IdlePhase,
}

impl IdleAccumulator {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            consecutive_idle: 0,
            idle_elapsed: Duration::ZERO,
            last_activity: Utc::now(),
            phase: IdlePhase::Active,
        }
    }

    /// Records one tick that covered `interval` of wall time.
    pub fn record(&mut self, is_active: bool, interval: Duration) -> TickDecision {
        if self.phase == IdlePhase::ShuttingDown {
            return TickDecision::Finished;
        }

        if is_active {
            self.consecutive_idle = 0;
            self.idle_elapsed = Duration::ZERO;
            self.last_activity = Utc::now();
            self.phase = IdlePhase::Active;
            return TickDecision::Active;
        }

        self.consecutive_idle += 1;
        self.idle_elapsed = self.idle_elapsed.saturating_add(interval);

        if self.idle_elapsed >= self.threshold {
            self.phase = IdlePhase::ShuttingDown;
            return TickDecision::Shutdown {
                elapsed: self.idle_elapsed,
            };
        }

        self.phase = IdlePhase::Idling(self.consecutive_idle);
        TickDecision::Idle {
            consecutive: self.consecutive_idle,
            elapsed: self.idle_elapsed,
        }
    }

    pub fn consecutive_idle(&self) -> u64 {
        self.consecutive_idle
    }

    pub fn idle_elapsed(&self) -> Duration {
        self.idle_elapsed
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    pub fn phase(&self) -> IdlePhase {
        self.phase
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    pub fn is_finished(&self) -> bool {
        self.phase == IdlePhase::ShuttingDown
    }
}
