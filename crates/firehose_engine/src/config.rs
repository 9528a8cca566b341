//! Configuration for the subscriber.

use crate::error::{SubscribeError, SubscribeResult};
use std::time::Duration;
use url::Url;

/// Configuration for a firehose subscription.
#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    /// Subscription endpoint (a `ws://` or `wss://` URL).
    pub endpoint: String,
    /// Sequence to resume from at startup, when known.
    pub start_cursor: Option<u64>,
    /// Collection prefixes whose records should be resolved.
    ///
    /// An empty list resolves every collection.
    pub collections: Vec<String>,
    /// Reconnect backoff behavior.
    pub backoff: BackoffConfig,
    /// A connection with no frames for this long is treated as dead.
    pub idle_timeout: Duration,
}

impl SubscriberConfig {
    /// Creates a configuration for the given endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            start_cursor: None,
            collections: Vec::new(),
            backoff: BackoffConfig::default(),
            idle_timeout: Duration::from_secs(60),
        }
    }

    /// Sets the cursor to resume from at startup.
    pub fn with_start_cursor(mut self, cursor: u64) -> Self {
        self.start_cursor = Some(cursor);
        self
    }

    /// Adds a collection prefix to the resolution filter.
    pub fn with_collection(mut self, prefix: impl Into<String>) -> Self {
        self.collections.push(prefix.into());
        self
    }

    /// Sets the backoff configuration.
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets the idle timeout.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Builds the subscription URL, attaching the cursor query
    /// parameter when a resume point is known.
    ///
    /// # Errors
    ///
    /// [`SubscribeError::Config`] when the endpoint does not parse as a
    /// URL. This is checked once at session startup.
    pub fn subscription_url(&self, cursor: Option<u64>) -> SubscribeResult<Url> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| SubscribeError::config(format!("invalid endpoint: {e}")))?;
        if let Some(cursor) = cursor {
            url.query_pairs_mut()
                .append_pair("cursor", &cursor.to_string());
        }
        Ok(url)
    }
}

/// Configuration for reconnect backoff.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the first reconnect attempt.
    pub min_delay: Duration,
    /// Cap on the delay between attempts.
    pub max_delay: Duration,
    /// Growth factor between consecutive attempts.
    pub multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
    /// A connection that stays subscribed this long resets the attempt
    /// counter, so the next failure starts from `min_delay` again.
    pub stability_threshold: Duration,
}

impl BackoffConfig {
    /// Creates a backoff configuration with the given delay bounds.
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            min_delay,
            max_delay,
            multiplier: 2.0,
            add_jitter: true,
            stability_threshold: Duration::from_secs(30),
        }
    }

    /// Sets the growth multiplier.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Disables jitter (deterministic delays, mainly for tests).
    pub fn without_jitter(mut self) -> Self {
        self.add_jitter = false;
        self
    }

    /// Sets the stability threshold.
    pub fn with_stability_threshold(mut self, threshold: Duration) -> Self {
        self.stability_threshold = threshold;
        self
    }

    /// Calculates the delay before reconnect attempt `attempt`
    /// (0-indexed): capped exponential growth from `min_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = self.min_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64());

        if self.add_jitter {
            // Up to 25% jitter.
            let jitter = capped * 0.25 * pseudo_jitter();
            Duration::from_secs_f64(capped + jitter)
        } else {
            Duration::from_secs_f64(capped)
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60))
    }
}

/// Cheap clock-derived jitter; avoids pulling in an RNG for a value
/// that only needs to decorrelate reconnect storms.
fn pseudo_jitter() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    f64::from(nanos % 1000) / 1000.0
}
