use std::time::Duration;

/// Reconnect delay policy.
///
/// The first few retries are near-instant so a backend restart goes unnoticed,
/// later ones grow exponentially up to `max_delay`. After `max_attempts` retries
/// one long `cooldown` wait is inserted and the sequence starts over.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    /// delays for the first attempts, indexed by attempt number
    pub fast_delays: Vec<Duration>,
    /// delay of the first attempt after the fast ones
    pub base: Duration,
    /// growth factor per attempt after the fast ones
    pub factor: f64,
    /// upper bound of a single delay
    pub max_delay: Duration,
    /// attempts before the cooldown wait
    pub max_attempts: u32,
    /// wait inserted once `max_attempts` is reached
    pub cooldown: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            fast_delays: vec![
                Duration::from_millis(25),
                Duration::from_millis(50),
                Duration::from_millis(100),
            ],
            base: Duration::from_millis(1000),
            factor: 1.5,
            max_delay: Duration::from_millis(5000),
            max_attempts: 5,
            cooldown: Duration::from_secs(10),
        }
    }
}

/// A scheduled retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Retry {
    pub delay: Duration,
    pub cooldown: bool,
}

impl Backoff {
    /// Delay before the retry with given attempt number.
    pub fn delay(&self, attempt: u32) -> Duration {
        if let Some(delay) = self.fast_delays.get(attempt as usize) {
            return *delay;
        }

        let exp = attempt.saturating_sub(self.fast_delays.len() as u32);
        let exp = i32::try_from(exp).unwrap_or(i32::MAX);

        let ms = self.base.as_secs_f64() * 1000.0 * self.factor.powi(exp);
        let max_ms = self.max_delay.as_secs_f64() * 1000.0;

        Duration::from_millis(ms.min(max_ms).round() as u64)
    }

    /// Pick the next retry and advance the attempt counter.
    pub(crate) fn next(&self, attempts: &mut u32) -> Retry {
        if *attempts >= self.max_attempts {
            *attempts = 0;
            return Retry {
                delay: self.cooldown,
                cooldown: true,
            };
        }

        let delay = self.delay(*attempts);
        *attempts += 1;

        Retry {
            delay,
            cooldown: false,
        }
    }
}
