//! Channel configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ChannelError;

/// Environment variable consulted for the default endpoint.
pub const URL_ENV: &str = "CHAIRLINK_URL";

/// Endpoint used when neither the caller nor the environment provides one.
pub const DEFAULT_URL: &str = "ws://localhost:8000/ws";

/// Upper bound on any single reconnect delay.
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_millis(30_000);

/// Settings for a [`Channel`](crate::Channel).
///
/// Every field has a default, so a config can be deserialized from a
/// partial document or built up with the `with_*` methods:
///
/// ```
/// use chairlink::ChannelConfig;
///
/// let config = ChannelConfig::new("ws://clinic.local/ws")
///     .with_auto_connect(false)
///     .with_reconnect_attempts(3);
/// assert_eq!(config.reconnect_interval_ms, 2000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Endpoint address, e.g. `ws://localhost:8000/ws`.
    #[serde(default = "default_url")]
    pub url: String,

    /// Open the connection as soon as the channel is built.
    #[serde(default = "default_true")]
    pub auto_connect: bool,

    /// Retry automatically after an unplanned close.
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,

    /// Retry budget between two successful opens.
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,

    /// Base delay before the first retry. Later retries grow by 1.5x,
    /// up to [`MAX_RECONNECT_DELAY`].
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
}

fn default_url() -> String {
    std::env::var(URL_ENV)
        .ok()
        .filter(|url| !url.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_URL.to_string())
}

fn default_true() -> bool {
    true
}

fn default_reconnect_attempts() -> u32 {
    10
}

fn default_reconnect_interval_ms() -> u64 {
    2000
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            auto_connect: true,
            auto_reconnect: true,
            reconnect_attempts: default_reconnect_attempts(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
        }
    }
}

impl ChannelConfig {
    /// Defaults with an explicit endpoint.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_auto_connect(mut self, enabled: bool) -> Self {
        self.auto_connect = enabled;
        self
    }

    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    pub fn with_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.reconnect_attempts = attempts;
        self
    }

    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval_ms =
            u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// The base reconnect delay as a [`Duration`].
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    /// Rejects settings the channel cannot work with.
    ///
    /// The URL itself is checked by the transport when it opens, so a
    /// syntactically odd endpoint still produces a status of `error`
    /// rather than a build failure.
    pub fn validate(&self) -> Result<(), ChannelError> {
        if self.url.trim().is_empty() {
            return Err(ChannelError::Config("url must not be empty".into()));
        }
        if self.reconnect_interval_ms == 0 {
            return Err(ChannelError::Config(
                "reconnect_interval_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
