//! Background jobs, shared by the scheduler and the manual trigger routes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use kindred_shared::clients::redis::RedisClient;
use kindred_shared::middleware::record_job;

use crate::error::{MatchingError, MatchingResult};
use crate::matching::lifecycle::{DeliveryReport, MatchLifecycle};
use crate::matching::orchestrator::{RunSummary, WeeklyMatcher};
use crate::ports::RunLock;

/// Upper bound on one weekly run; the lock lapses on its own if a replica dies
/// mid-run.
const RUN_LOCK_TTL: Duration = Duration::from_secs(6 * 3600);

/// Due notifications handled per drain.
pub const DRAIN_BATCH: usize = 100;

fn run_lock_key(week_of: &str) -> String {
    format!("matching:run:{week_of}")
}

pub struct RedisRunLock {
    redis: RedisClient,
}

impl RedisRunLock {
    pub fn new(redis: RedisClient) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl RunLock for RedisRunLock {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> anyhow::Result<Option<String>> {
        let token = uuid::Uuid::now_v7().to_string();
        let acquired = self.redis.set_nx(key, &token, ttl.as_secs().max(1)).await?;
        Ok(acquired.then_some(token))
    }

    async fn release(&self, key: &str, token: &str) -> anyhow::Result<()> {
        if !self.redis.del_if_eq(key, token).await? {
            tracing::warn!(%key, "run lock lapsed before release");
        }
        Ok(())
    }
}

fn outcome<T, E>(result: &Result<T, E>) -> &'static str {
    if result.is_ok() {
        "ok"
    } else {
        "error"
    }
}

pub struct Jobs {
    matcher: Arc<WeeklyMatcher>,
    lifecycle: Arc<MatchLifecycle>,
    lock: Arc<dyn RunLock>,
}

impl Jobs {
    pub fn new(matcher: Arc<WeeklyMatcher>, lifecycle: Arc<MatchLifecycle>, lock: Arc<dyn RunLock>) -> Self {
        Self {
            matcher,
            lifecycle,
            lock,
        }
    }

    /// Runs the weekly match for the cycle containing `now` unless another run
    /// for that cycle holds the lock.
    pub async fn weekly_run(&self, now: DateTime<Utc>) -> MatchingResult<RunSummary> {
        let started = Instant::now();
        let week_of = self.matcher.week_at(now).label();
        let key = run_lock_key(&week_of);

        let Some(token) = self.lock.try_acquire(&key, RUN_LOCK_TTL).await? else {
            tracing::warn!(%week_of, "weekly run already in progress, skipping");
            record_job("weekly_run", "locked", started);
            return Err(MatchingError::RunInProgress(week_of));
        };

        let result = self.matcher.run(now).await;
        if let Err(e) = self.lock.release(&key, &token).await {
            tracing::error!(%week_of, error = %e, "failed to release run lock");
        }

        record_job("weekly_run", outcome(&result), started);
        match &result {
            Ok(summary) => tracing::info!(
                week_of = %summary.week_of,
                matched = summary.matched,
                skipped_error = summary.skipped_error,
                "weekly run job finished"
            ),
            Err(e) => tracing::error!(%week_of, error = %e, "weekly run aborted"),
        }
        result
    }

    pub async fn expire_sweep(&self, now: DateTime<Utc>) -> MatchingResult<usize> {
        let started = Instant::now();
        let result = self.lifecycle.expire_sweep(now).await;
        record_job("expire_sweep", outcome(&result), started);
        result
    }

    pub async fn drain_notifications(&self, now: DateTime<Utc>) -> MatchingResult<DeliveryReport> {
        let started = Instant::now();
        let result = self.lifecycle.deliver_due_notifications(now, DRAIN_BATCH).await;
        record_job("drain_notifications", outcome(&result), started);
        result
    }
}
