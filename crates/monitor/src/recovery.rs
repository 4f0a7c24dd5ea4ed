/// Bounded counter for consecutive re-login attempts.
///
/// The counter is checked before every attempt, incremented as the
/// attempt starts, and reset to zero the moment an attempt succeeds.
#[derive(Debug)]
pub struct Recovery {
    attempts: u32,
    max_attempts: u32,
    gave_up: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryState {
    Idle,
    Retrying(u32),
    GaveUp,
}

impl Recovery {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempts: 0,
            max_attempts,
            gave_up: false,
        }
    }

    /// Claim the next attempt slot. Returns the 1-based attempt number,
    /// or `None` once the bound is exhausted.
    pub fn begin_attempt(&mut self) -> Option<u32> {
        if self.attempts >= self.max_attempts {
            self.gave_up = true;
            return None;
        }
        self.attempts += 1;
        Some(self.attempts)
    }

    pub fn record_success(&mut self) {
        self.attempts = 0;
        self.gave_up = false;
    }

    pub fn state(&self) -> RecoveryState {
        if self.gave_up {
            RecoveryState::GaveUp
        } else if self.attempts == 0 {
            RecoveryState::Idle
        } else {
            RecoveryState::Retrying(self.attempts)
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}
