use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffKind {
    Linear,
    Exponential,
}

/// Delay schedule between attempts. Delays never decrease as the attempt
/// number grows and are capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub kind: BackoffKind,
    pub base: Duration,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::linear(Duration::from_secs(1))
    }
}

impl Backoff {
    pub const fn linear(base: Duration) -> Self {
        Self {
            kind: BackoffKind::Linear,
            base,
            max: Duration::from_secs(30),
        }
    }

    pub const fn exponential(base: Duration) -> Self {
        Self {
            kind: BackoffKind::Exponential,
            base,
            max: Duration::from_secs(30),
        }
    }

    pub const fn with_max(mut self, max: Duration) -> Self {
        self.max = max;
        self
    }

    /// Delay to wait after the `attempt`-th failure (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let delay = match self.kind {
            BackoffKind::Linear => self.base.saturating_mul(attempt),
            BackoffKind::Exponential => {
                let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
                self.base.saturating_mul(factor)
            }
        };
        delay.min(self.max)
    }
}
