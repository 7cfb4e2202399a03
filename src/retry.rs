//! Centralized Retry & Backoff
//! Mission: One place that knows how to retry a transient failure so adapters don't each
//! reinvent it (spec.md §9).

use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::error::VenueError;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    /// 3 attempts, 0.5/1/2s backoff, matching spec.md §7's
    /// `TransientVenueError` retry schedule.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_backoff.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let delay = if self.jitter {
            let mut rng = rand::thread_rng();
            base * rng.gen_range(0.85..1.15)
        } else {
            base
        };
        Duration::from_secs_f64(delay.max(0.0))
    }
}

/// Runs `op` up to `policy.max_attempts` times. Only `VenueError::Transient`
/// is retried; a permanent error returns immediately. Exhausting all
/// attempts returns the last error seen.
pub async fn retry<T, F, Fut>(policy: RetryPolicy, venue: &str, mut op: F) -> Result<T, VenueError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, VenueError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt + 1 < policy.max_attempts => {
                let delay = policy.backoff_for_attempt(attempt);
                warn!(venue, attempt, delay_ms = delay.as_millis() as u64, "retrying after transient error: {err}");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                debug!(venue, attempt, "giving up: {err}");
                return Err(err);
            }
        }
    }
}
