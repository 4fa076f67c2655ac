//! Configuration for the sync engine.

use std::time::Duration;

/// Which remote content universe the engine talks to.
///
/// Switching modes requires cancelling any in-flight sync and rebuilding
/// the engine; the two universes have independent versions and cursors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentMode {
    /// Published content.
    #[default]
    Delivery,
    /// Draft content, visible before publishing.
    Preview,
}

impl ContentMode {
    /// URL path segment for this mode.
    pub fn path_segment(&self) -> &'static str {
        match self {
            ContentMode::Delivery => "delivery",
            ContentMode::Preview => "preview",
        }
    }
}

/// Order in which one sync cycle runs its two phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncOrder {
    /// Merge remote changes first, then push local edits. The default:
    /// a push never races an in-flight pull's writes.
    #[default]
    PullThenPush,
    /// Push local edits first, then merge remote changes.
    PushThenPull,
}

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Locale applied to records the remote payload leaves unlocalized.
    pub locale: String,
    /// Remote content universe.
    pub mode: ContentMode,
    /// Phase ordering inside one cycle.
    pub order: SyncOrder,
    /// Maximum number of items per pull page.
    pub pull_page_size: u32,
    /// Retry policy for the asset processing poll loop.
    pub poll: RetryConfig,
}

impl SyncConfig {
    /// Creates a configuration with the given locale.
    pub fn new(locale: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            mode: ContentMode::Delivery,
            order: SyncOrder::PullThenPush,
            pull_page_size: 100,
            poll: RetryConfig::default(),
        }
    }

    /// Sets the content mode.
    pub fn with_mode(mut self, mode: ContentMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the phase ordering.
    pub fn with_order(mut self, order: SyncOrder) -> Self {
        self.order = order;
        self
    }

    /// Sets the pull page size.
    pub fn with_pull_page_size(mut self, size: u32) -> Self {
        self.pull_page_size = size;
        self
    }

    /// Sets the asset poll retry policy.
    pub fn with_poll(mut self, poll: RetryConfig) -> Self {
        self.poll = poll;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("en-US")
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts.
    pub max_attempts: u32,
    /// Initial delay between attempts.
    pub initial_delay: Duration,
    /// Maximum delay between attempts.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Creates a retry configuration with the given attempt budget.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }

    /// A policy with the given budget and no delays, for tests.
    pub fn zero_delay(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Calculates the delay before a given attempt (0-indexed). The first
    /// attempt has no delay.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base = self.initial_delay.as_secs_f64()
            * self
                .backoff_multiplier
                .powi(attempt.saturating_sub(1) as i32);
        Duration::from_secs_f64(base.min(self.max_delay.as_secs_f64()))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(6)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builder() {
        let config = SyncConfig::new("de-DE")
            .with_mode(ContentMode::Preview)
            .with_order(SyncOrder::PushThenPull)
            .with_pull_page_size(25);

        assert_eq!(config.locale, "de-DE");
        assert_eq!(config.mode, ContentMode::Preview);
        assert_eq!(config.order, SyncOrder::PushThenPull);
        assert_eq!(config.pull_page_size, 25);
    }

    #[test]
    fn mode_path_segments() {
        assert_eq!(ContentMode::Delivery.path_segment(), "delivery");
        assert_eq!(ContentMode::Preview.path_segment(), "preview");
    }

    #[test]
    fn retry_delay_backoff() {
        let policy = RetryConfig::new(5)
            .with_initial_delay(Duration::from_millis(100))
            .with_backoff_multiplier(2.0);

        assert_eq!(policy.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(400));
    }

    #[test]
    fn retry_delay_respects_max() {
        let policy = RetryConfig::new(10)
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5))
            .with_backoff_multiplier(10.0);

        assert_eq!(policy.delay_for_attempt(6), Duration::from_secs(5));
    }

    #[test]
    fn zero_delay_policy_never_sleeps() {
        let policy = RetryConfig::zero_delay(4);
        for attempt in 0..4 {
            assert_eq!(policy.delay_for_attempt(attempt), Duration::ZERO);
        }
    }
}
