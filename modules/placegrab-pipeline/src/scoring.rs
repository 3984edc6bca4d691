use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Duration as ChronoDuration, Local, TimeZone};
use tracing::{debug, info};

use crate::traits::CounterStore;

/// Daily score accumulator gating the reward ad.
///
/// Score and threshold both expire at the next local midnight. Each time
/// the score reaches the threshold, the caller is told to show an ad and
/// the threshold moves up by `step`.
pub struct RewardGovernor {
    store: Arc<dyn CounterStore>,
    initial_threshold: f64,
    step: f64,
}

impl RewardGovernor {
    pub fn new(store: Arc<dyn CounterStore>, initial_threshold: f64, step: f64) -> Self {
        Self {
            store,
            initial_threshold,
            step,
        }
    }

    /// Add to today's score. Returns whether an ad should be shown.
    pub async fn add_score(&self, user: &str, amount: f64) -> Result<bool> {
        let ttl = ttl_until_midnight(Local::now());
        let score_key = format!("user_score:{user}");
        let target_key = format!("ad_target:{user}");

        self.store
            .set_if_absent(&target_key, &self.initial_threshold.to_string(), ttl)
            .await?;
        self.store.set_if_absent(&score_key, "0", ttl).await?;

        let score = self.store.incr_by_float(&score_key, amount).await?;
        let target = self
            .store
            .get(&target_key)
            .await?
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(self.initial_threshold);

        if score < target {
            return Ok(false);
        }

        // The raise goes through the store atomically; a result other than
        // `target + step` means a concurrent request raised it first.
        let next = self.store.incr_by_float(&target_key, self.step).await?;
        if (next - (target + self.step)).abs() > f64::EPSILON * next.abs().max(1.0) {
            self.store.incr_by_float(&target_key, -self.step).await?;
            debug!(user, score, "reward threshold already raised by another request");
            return Ok(false);
        }

        info!(user, score, next_target = next, "reward threshold crossed");
        Ok(true)
    }
}

/// Time left until the next local midnight, never less than one second.
pub fn ttl_until_midnight<Tz: TimeZone>(now: DateTime<Tz>) -> Duration {
    let tomorrow = now.date_naive() + ChronoDuration::days(1);
    let midnight = tomorrow
        .and_hms_opt(0, 0, 0)
        .and_then(|naive| now.timezone().from_local_datetime(&naive).earliest());

    let secs = match midnight {
        Some(midnight) => (midnight.naive_utc() - now.naive_utc()).num_seconds(),
        None => 24 * 3600,
    };
    Duration::from_secs(secs.max(1) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};

    #[test]
    fn ttl_runs_to_next_midnight() {
        let kst = FixedOffset::east_opt(9 * 3600).unwrap();
        let now = kst.with_ymd_and_hms(2025, 5, 1, 23, 0, 0).unwrap();
        assert_eq!(ttl_until_midnight(now), Duration::from_secs(3600));

        let now = kst.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap();
        assert_eq!(ttl_until_midnight(now), Duration::from_secs(24 * 3600));
    }

    #[test]
    fn ttl_is_at_least_one_second() {
        let now = Utc.with_ymd_and_hms(2025, 5, 1, 23, 59, 59).unwrap();
        assert_eq!(ttl_until_midnight(now), Duration::from_secs(1));
    }
}
