//! Reconnect policy: whether to retry, and after how long.
//!
//! Delays grow geometrically by 1.5x from the configured base and are
//! capped at [`MAX_RECONNECT_DELAY`]. There is no jitter; the same inputs
//! always give the same schedule.

use std::time::Duration;

use crate::ChannelConfig;
use crate::config::MAX_RECONNECT_DELAY;

/// Growth factor between consecutive delays.
pub const BACKOFF_FACTOR: f64 = 1.5;

/// Returns `true` if another attempt may be scheduled.
///
/// `attempt` is the number of attempts already made since the last
/// successful open.
pub fn should_reconnect(attempt: u32, max_attempts: u32, enabled: bool) -> bool {
    enabled && attempt < max_attempts
}

/// Delay before the given attempt (1-based; 0 is treated as 1).
///
/// `min(base * 1.5^(attempt - 1), cap)`, rounded to the nearest
/// millisecond.
pub fn next_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let exponent = attempt.max(1) - 1;
    let base_ms = base.as_millis() as f64;
    let cap_ms = cap.as_millis() as f64;
    // powi takes i32; anything past that is far beyond the cap anyway.
    let exponent = i32::try_from(exponent).unwrap_or(i32::MAX);
    let raw = base_ms * BACKOFF_FACTOR.powi(exponent);
    Duration::from_millis(raw.min(cap_ms).round() as u64)
}

/// The retry settings of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    pub max_attempts: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl ReconnectPolicy {
    pub fn from_config(config: &ChannelConfig) -> Self {
        Self {
            enabled: config.auto_reconnect,
            max_attempts: config.reconnect_attempts,
            base: config.reconnect_interval(),
            cap: MAX_RECONNECT_DELAY,
        }
    }

    pub fn should_reconnect(&self, attempt: u32) -> bool {
        should_reconnect(attempt, self.max_attempts, self.enabled)
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        next_delay(attempt, self.base, self.cap)
    }
}

/// Payload of the `reconnect` event: one scheduled retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectAttempt {
    /// 1-based attempt number.
    pub attempt: u32,
    pub max_attempts: u32,
    /// How long until the retry fires.
    pub delay: Duration,
}
