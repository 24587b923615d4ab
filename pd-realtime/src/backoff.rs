//! Reconnect delay policy.

use std::time::Duration;

use pd_core::config::RealtimeConfig;

/// Configuration for socket reconnection behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect attempt.
    pub base_delay: Duration,
    /// Maximum delay cap for exponential backoff.
    pub max_delay: Duration,
    /// Growth factor per attempt. 1.0 keeps the delay fixed.
    pub multiplier: f64,
    /// Jitter factor (0.0 to 1.0) added to each delay.
    pub jitter_factor: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.3,
        }
    }
}

impl ReconnectConfig {
    /// A fixed delay with no jitter.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            base_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
            jitter_factor: 0.0,
        }
    }

    pub fn from_config(config: &RealtimeConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.reconnect_base_ms),
            max_delay: Duration::from_millis(config.reconnect_max_ms),
            multiplier: config.reconnect_multiplier.max(1.0),
            jitter_factor: config.reconnect_jitter.clamp(0.0, 1.0),
        }
    }

    /// Same policy without jitter, for deterministic schedules.
    pub fn without_jitter(mut self) -> Self {
        self.jitter_factor = 0.0;
        self
    }

    /// Calculate the delay before reconnect attempt `attempt` (1-based).
    ///
    /// Sequence with defaults: 1s, 2s, 4s, 8s, 16s, capped at 30s, each
    /// spread by +/- 30% jitter and never above the cap.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_secs_f64();
        let max = self.max_delay.as_secs_f64().max(base);
        let exponent = attempt.saturating_sub(1).min(64) as i32;

        let exponential = (base * self.multiplier.powi(exponent)).min(max);

        let jitter_range = exponential * self.jitter_factor;
        let jitter = if jitter_range > 0.0 {
            (rand::random::<f64>() * 2.0 - 1.0) * jitter_range
        } else {
            0.0
        };
        let delay = (exponential + jitter).clamp(0.0, max);

        Duration::from_secs_f64(delay)
    }
}
