#![forbid(unsafe_code)]

use std::time::Duration;

/// Default refresh period of detail pages.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10_000);
/// Shortest interval the loop will run with.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);
pub const DEFAULT_REDIRECT: &str = "/models";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    /// Where callers should navigate once a polled resource is gone.
    pub redirect_to: String,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self { interval: DEFAULT_POLL_INTERVAL, redirect_to: DEFAULT_REDIRECT.to_string() }
    }
}

impl PollConfig {
    /// Read `RUNBOARD_POLL_INTERVAL_MS` and `RUNBOARD_REDIRECT`, falling back to defaults.
    pub fn from_env() -> Self {
        let interval = std::env::var("RUNBOARD_POLL_INTERVAL_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_POLL_INTERVAL);
        let redirect_to = std::env::var("RUNBOARD_REDIRECT").unwrap_or_else(|_| DEFAULT_REDIRECT.to_string());
        Self { interval, redirect_to }
    }
}
