use std::time::Duration;

use rand::Rng;

/// When and how the session replaces a closed delta channel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Fraction of the delay randomized in both directions (0.2 = ±20%).
    pub jitter: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

impl ReconnectPolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }
}

/// Exponential backoff state across consecutive failed connections.
#[derive(Clone, Debug)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempt: u32,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Attempts made since the last successful connection.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay before the next attempt, without jitter.
    pub fn base_delay(&self) -> Duration {
        let factor = self.policy.multiplier.max(1.0).powi(self.attempt.min(64) as i32);
        let secs = self.policy.initial_delay.as_secs_f64() * factor;
        Duration::from_secs_f64(secs.min(self.policy.max_delay.as_secs_f64()))
    }

    /// Delay for the next attempt with jitter applied; advances the attempt
    /// counter. `None` when reconnecting is disabled.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.policy.enabled {
            return None;
        }
        let base = self.base_delay().as_secs_f64();
        let jitter = self.policy.jitter.clamp(0.0, 1.0);
        let spread = if jitter > 0.0 {
            rand::thread_rng().gen_range(-jitter..=jitter)
        } else {
            0.0
        };
        self.attempt = self.attempt.saturating_add(1);
        Some(Duration::from_secs_f64((base * (1.0 + spread)).max(0.0)))
    }

    /// Called once a connection reaches Open.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
