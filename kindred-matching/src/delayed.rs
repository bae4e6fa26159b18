//! Delayed side effects, kept in a Redis sorted set scored by due time.
//!
//! Tasks carry only identifiers. Whatever precondition made a task worth
//! scheduling is re-checked when it is executed, not when it is queued.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use kindred_shared::clients::redis::RedisClient;

use crate::ports::DelayedQueue;

const DELAYED_KEY: &str = "matching:delayed";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DelayedTask {
    UnreadMessageEmail { match_id: Uuid, recipient: Uuid },
}

pub struct RedisDelayedQueue {
    redis: RedisClient,
}

impl RedisDelayedQueue {
    pub fn new(redis: RedisClient) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl DelayedQueue for RedisDelayedQueue {
    /// Scheduling an identical task again moves its due time instead of
    /// queueing a duplicate.
    async fn schedule(&self, task: &DelayedTask, due_at: DateTime<Utc>) -> anyhow::Result<()> {
        let member = serde_json::to_string(task)?;
        self.redis
            .zadd(DELAYED_KEY, &member, due_at.timestamp_millis() as f64)
            .await?;
        Ok(())
    }

    async fn take_due(&self, now: DateTime<Utc>, limit: usize) -> anyhow::Result<Vec<DelayedTask>> {
        let limit = isize::try_from(limit).unwrap_or(isize::MAX);
        let members = self
            .redis
            .zrange_by_score(DELAYED_KEY, now.timestamp_millis() as f64, limit)
            .await?;

        let mut claimed = Vec::with_capacity(members.len());
        for member in members {
            // ZREM is the claim: only one drainer sees `true` for a member.
            if !self.redis.zrem(DELAYED_KEY, &member).await? {
                continue;
            }
            match serde_json::from_str::<DelayedTask>(&member) {
                Ok(task) => claimed.push(task),
                Err(e) => tracing::warn!(error = %e, %member, "dropping undecodable delayed task"),
            }
        }
        Ok(claimed)
    }
}
