use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

use crate::traits::CounterStore;

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Throttled,
    Blocked,
}

#[derive(Debug, Clone, Copy)]
pub struct GovernorLimits {
    pub rate_ceiling: i64,
    pub rate_window: Duration,
    pub failure_threshold: i64,
    pub failure_window: Duration,
    pub block_duration: Duration,
}

/// Per-user fixed rate window plus a failure-streak circuit breaker.
///
/// All state lives in the shared [`CounterStore`]; every counter is created
/// with `set_if_absent` carrying its TTL and only then incremented, so the
/// expiry is attached before the first increment is visible.
pub struct AbuseGovernor {
    store: Arc<dyn CounterStore>,
    limits: GovernorLimits,
}

fn block_key(user: &str) -> String {
    format!("block:{user}")
}

fn rate_key(user: &str) -> String {
    format!("rate_limit:{user}")
}

fn fail_key(user: &str) -> String {
    format!("fail_count:{user}")
}

impl AbuseGovernor {
    pub fn new(store: Arc<dyn CounterStore>, limits: GovernorLimits) -> Self {
        Self { store, limits }
    }

    pub async fn admit(&self, user: &str) -> Result<Admission> {
        if self.store.get(&block_key(user)).await?.is_some() {
            info!(user, "request rejected: user blocked");
            return Ok(Admission::Blocked);
        }

        // Rejected requests never touch the counter.
        let key = rate_key(user);
        let seen = self
            .store
            .get(&key)
            .await?
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0);
        if seen >= self.limits.rate_ceiling {
            info!(user, count = seen, "request rejected: rate window full");
            return Ok(Admission::Throttled);
        }

        self.store
            .set_if_absent(&key, "0", self.limits.rate_window)
            .await?;
        let count = self.store.incr(&key).await?;
        if count > self.limits.rate_ceiling {
            info!(user, count, "request rejected: rate window full");
            return Ok(Admission::Throttled);
        }

        Ok(Admission::Allowed)
    }

    /// Count a failed analysis; reaching the threshold blocks the user and
    /// clears the streak.
    pub async fn record_failure(&self, user: &str) -> Result<()> {
        let key = fail_key(user);
        self.store
            .set_if_absent(&key, "0", self.limits.failure_window)
            .await?;
        let streak = self.store.incr(&key).await?;

        if streak >= self.limits.failure_threshold {
            warn!(user, streak, "failure threshold reached, blocking user");
            self.store
                .set(&block_key(user), "1", self.limits.block_duration)
                .await?;
            self.store.delete(&key).await?;
        }
        Ok(())
    }

    pub async fn record_success(&self, user: &str) -> Result<()> {
        self.store.delete(&fail_key(user)).await
    }
}
