//! Backoff delay policies.
//!
//! A [`Delayer`] yields the pause before each retry. Randomness goes through
//! [`DurationRandomizer`] so jittered sequences are reproducible in tests.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE: Duration = Duration::from_millis(500);
pub const DEFAULT_UPPER_LIMIT: Duration = Duration::from_secs(5);
pub const DEFAULT_LOWER_LIMIT: Duration = Duration::ZERO;

/// Produces successive backoff durations. Stateful: each call advances.
pub trait Delayer: Send {
    fn next_delay(&mut self) -> Duration;
}

/// Source of uniformly random durations.
pub trait DurationRandomizer: Send + Sync {
    /// Uniform duration in the inclusive range `[low, high]`.
    fn between(&self, low: Duration, high: Duration) -> Duration;
}

/// [`DurationRandomizer`] backed by the thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandomizer;

impl DurationRandomizer for ThreadRandomizer {
    fn between(&self, low: Duration, high: Duration) -> Duration {
        if high <= low {
            return low;
        }
        let low = nanos(low);
        let high = nanos(high);
        Duration::from_nanos(rand::thread_rng().gen_range(low..=high))
    }
}

fn nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

/// Whole milliseconds, saturating at `u64::MAX`.
pub fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Always the same delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Constant(pub Duration);

impl Delayer for Constant {
    fn next_delay(&mut self) -> Duration {
        self.0
    }
}

/// How [`ExponentialJitter`] randomizes the current delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Jitter {
    /// Current delay unchanged.
    #[default]
    None,
    /// Uniform in `[0, current]`.
    Full,
    /// `current/2 + uniform(0, current/2)`.
    Equal,
    /// Next current becomes `base + uniform(0, current*3)`, capped; that value is returned.
    Decorrelated,
}

/// Exponential backoff with optional jitter.
///
/// The current delay starts at `base` capped by the upper limit, resolved on
/// the first [`Delayer::next_delay`] so builder order does not matter. Every call returns a candidate derived
/// from the current delay (floored at the lower limit) and then doubles the
/// current delay up to the upper limit. [`Jitter::Decorrelated`] instead
/// advances first and returns the advanced value.
#[derive(Clone)]
pub struct ExponentialJitter {
    base: Duration,
    upper_limit: Duration,
    lower_limit: Duration,
    jitter: Jitter,
    /// `None` until the first delay is handed out.
    current: Option<Duration>,
    randomizer: Arc<dyn DurationRandomizer>,
}

impl Default for ExponentialJitter {
    fn default() -> Self {
        Self {
            base: DEFAULT_BASE,
            upper_limit: DEFAULT_UPPER_LIMIT,
            lower_limit: DEFAULT_LOWER_LIMIT,
            jitter: Jitter::None,
            current: None,
            randomizer: Arc::new(ThreadRandomizer),
        }
    }
}

impl ExponentialJitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed delay. Restarts the sequence.
    pub fn with_base(mut self, base: Duration) -> Self {
        self.base = base;
        self.current = None;
        self
    }

    /// Cap on the current delay. Restarts the sequence.
    pub fn with_upper_limit(mut self, upper_limit: Duration) -> Self {
        self.upper_limit = upper_limit;
        self.current = None;
        self
    }

    pub fn with_lower_limit(mut self, lower_limit: Duration) -> Self {
        self.lower_limit = lower_limit;
        self
    }

    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_randomizer(mut self, randomizer: Arc<dyn DurationRandomizer>) -> Self {
        self.randomizer = randomizer;
        self
    }

    pub fn jitter(&self) -> Jitter {
        self.jitter
    }

    fn current(&self) -> Duration {
        self.current.unwrap_or_else(|| self.base.min(self.upper_limit))
    }

    fn candidate(&self) -> Duration {
        let current = self.current();
        match self.jitter {
            Jitter::None | Jitter::Decorrelated => current,
            Jitter::Full => self.randomizer.between(Duration::ZERO, current),
            Jitter::Equal => {
                let half = current / 2;
                half + self.randomizer.between(Duration::ZERO, half)
            }
        }
    }

    fn advance(&mut self) {
        let current = self.current();
        let next = match self.jitter {
            Jitter::Decorrelated => {
                let spread = self
                    .randomizer
                    .between(Duration::ZERO, current.saturating_mul(3));
                self.base.saturating_add(spread)
            }
            _ => current.saturating_mul(2),
        };
        self.current = Some(next.min(self.upper_limit));
    }
}

impl Delayer for ExponentialJitter {
    fn next_delay(&mut self) -> Duration {
        if self.jitter == Jitter::Decorrelated {
            self.advance();
            return self.candidate().max(self.lower_limit);
        }
        let delay = self.candidate().max(self.lower_limit);
        self.advance();
        delay
    }
}
