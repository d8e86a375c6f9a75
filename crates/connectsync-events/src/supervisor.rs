//! Supervised restarts of the consume loop.
//!
//! Transient transport faults re-open the message source after an
//! exponential backoff. The attempt budget resets whenever a run manages to
//! commit at least one message, so only a sustained outage is fatal.

use rand::Rng;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::consume::{ConsumeLoop, LoopFault};
use crate::error::EventError;
use crate::source::SourceFactory;

/// Configuration for reconnect behavior.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Consecutive restarts allowed before giving up.
    pub max_attempts: u32,
    /// Delay before the first restart.
    pub initial_delay: Duration,
    /// Maximum delay between restarts.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add up to 25% jitter to delays.
    pub jitter: bool,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl ReconnectPolicy {
    /// Calculate delay for a given attempt (0-indexed), never above
    /// `max_delay`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base_delay =
            self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);

        let max_ms = self.max_delay.as_millis() as f64;
        let delay_ms = base_delay.min(max_ms);

        let final_delay = if self.jitter {
            let jitter_factor = 1.0 + rand::thread_rng().gen_range(0.0..0.25);
            (delay_ms * jitter_factor).min(max_ms)
        } else {
            delay_ms
        };

        Duration::from_millis(final_delay as u64)
    }
}

/// Runs a [`ConsumeLoop`] against sources from a [`SourceFactory`],
/// re-opening the source after transient faults.
#[derive(Debug, Clone, Default)]
pub struct Supervisor {
    policy: ReconnectPolicy,
}

impl Supervisor {
    #[must_use]
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy }
    }

    /// Run until a terminal fault, which is returned.
    ///
    /// A fault is terminal when it is not transient or when the restart
    /// budget is exhausted.
    pub async fn run<F: SourceFactory>(&self, factory: &F, consume: &ConsumeLoop) -> EventError {
        let mut failures = 0u32;

        loop {
            let fault = match factory.open().await {
                Ok(mut source) => consume.run(&mut source).await,
                Err(error) => LoopFault {
                    error,
                    processed: 0,
                },
            };

            if fault.processed > 0 {
                failures = 0;
            }

            if !fault.error.is_transient() {
                error!(error = %fault.error, "Consumer stopped on non-retryable fault");
                return fault.error;
            }

            if failures >= self.policy.max_attempts {
                error!(
                    error = %fault.error,
                    attempts = failures,
                    "Reconnect attempts exhausted"
                );
                return fault.error;
            }

            let delay = self.policy.delay_for(failures);
            failures += 1;
            warn!(
                attempt = failures,
                max_attempts = self.policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %fault.error,
                "Restarting consumer after transient fault"
            );
            tokio::time::sleep(delay).await;
            info!(attempt = failures, "Re-opening message source");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_grows_exponentially_and_caps() {
        let policy = ReconnectPolicy {
            max_attempts: 10,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
            backoff_multiplier: 2.0,
            jitter: false,
        };

        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
        assert_eq!(policy.delay_for(4), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(30), Duration::from_millis(1000));
    }

    #[test]
    fn test_jitter_stays_within_quarter() {
        let policy = ReconnectPolicy {
            initial_delay: Duration::from_millis(1000),
            jitter: true,
            ..ReconnectPolicy::default()
        };

        for _ in 0..50 {
            let delay = policy.delay_for(0);
            assert!(delay >= Duration::from_millis(1000));
            assert!(delay <= Duration::from_millis(1250));
        }
    }

    #[test]
    fn test_jitter_never_exceeds_max_delay() {
        let policy = ReconnectPolicy {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
            jitter: true,
            ..ReconnectPolicy::default()
        };

        for _ in 0..50 {
            assert_eq!(policy.delay_for(10), Duration::from_millis(1000));
            let near_cap = policy.delay_for(3);
            assert!(near_cap >= Duration::from_millis(800));
            assert!(near_cap <= Duration::from_millis(1000));
        }
    }
}
