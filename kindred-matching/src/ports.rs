//! Boundaries between the matching core and the systems around it.
//!
//! Postgres, the reasoning model, RabbitMQ, Redis, and the messaging service
//! all sit behind these traits, so the weekly run and the lifecycle transitions
//! can be exercised against in-memory doubles.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::clients::llm::ModelError;
use crate::delayed::DelayedTask;
use crate::matching::date_plan::TargetLocation;
use crate::matching::scorer::CompatibilityReport;
use crate::models::{
    DateOutcome, Decision, NewDateOutcome, NewWeeklyMatch, PassReasonKind, PhotoStatus, Side,
    UserProfile, VenueSuggestion, WeeklyMatch,
};

#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Profiles whose `match_key` marks them live (approved photo, not on
    /// vacation) and whose account is approved.
    async fn load_matchable_profiles(&self) -> anyhow::Result<Vec<UserProfile>>;

    async fn get_profile(&self, id: Uuid) -> anyhow::Result<Option<UserProfile>>;

    /// Ends every vacation whose `vacation_until` is at or before `now`.
    async fn release_expired_vacations(&self, now: DateTime<Utc>) -> anyhow::Result<usize>;

    async fn set_photo_status(&self, id: Uuid, status: PhotoStatus) -> anyhow::Result<Option<UserProfile>>;

    async fn set_vacation(
        &self,
        id: Uuid,
        on: bool,
        until: Option<DateTime<Utc>>,
    ) -> anyhow::Result<Option<UserProfile>>;

    async fn update_narrative(
        &self,
        id: Uuid,
        bio: &str,
        looking_for: &str,
        embedding: Vec<f32>,
    ) -> anyhow::Result<Option<UserProfile>>;
}

/// Every WeeklyMatch mutation is a single conditional write, so two racing
/// requests can never both win the same transition.
#[async_trait]
pub trait MatchStore: Send + Sync {
    async fn matches_for_week(&self, week_of: &str) -> anyhow::Result<Vec<WeeklyMatch>>;

    /// Participant pairs of every match whose `week_of` is at or after `week_of`.
    async fn pairs_since(&self, week_of: &str) -> anyhow::Result<Vec<(Uuid, Uuid)>>;

    /// Persists the match and stamps `last_matched_at` on both participants.
    async fn insert_match(&self, new: NewWeeklyMatch) -> anyhow::Result<WeeklyMatch>;

    async fn get_match(&self, id: Uuid) -> anyhow::Result<Option<WeeklyMatch>>;

    async fn match_for_user(&self, user_id: Uuid, week_of: &str) -> anyhow::Result<Option<WeeklyMatch>>;

    /// Records `decision` for `side` only while that side is still pending.
    /// `None` means the side had already answered.
    async fn record_response(
        &self,
        id: Uuid,
        side: Side,
        decision: Decision,
        at: DateTime<Utc>,
    ) -> anyhow::Result<Option<WeeklyMatch>>;

    /// Flips `mutual_match` to true when both sides are interested. Returns
    /// `true` only for the call that performed the flip.
    async fn mark_mutual(&self, id: Uuid) -> anyhow::Result<bool>;

    /// `sent` matches past `expires_at` become `expired`. Returns the count.
    async fn expire_due(&self, now: DateTime<Utc>) -> anyhow::Result<usize>;

    async fn mark_completed(&self, id: Uuid) -> anyhow::Result<bool>;

    /// Sets `contact_exchanged_at` if unset. `true` only for the first caller.
    async fn mark_contact_exchanged(&self, id: Uuid, at: DateTime<Utc>) -> anyhow::Result<bool>;

    /// Sets `last_notification_email_sent_at = at` if it is unset or not later
    /// than `cutoff`. `true` when the stamp was taken.
    async fn stamp_notification_email(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
        cutoff: DateTime<Utc>,
    ) -> anyhow::Result<bool>;

    async fn append_pass_reason(
        &self,
        match_id: Uuid,
        user_id: Uuid,
        reason: PassReasonKind,
        at: DateTime<Utc>,
    ) -> anyhow::Result<()>;

    /// `None` when this user already submitted feedback for the match.
    async fn insert_outcome(&self, outcome: NewDateOutcome) -> anyhow::Result<Option<DateOutcome>>;

    async fn outcomes_for_match(&self, match_id: Uuid) -> anyhow::Result<Vec<DateOutcome>>;

    async fn all_outcomes(&self) -> anyhow::Result<Vec<DateOutcome>>;
}

/// Structured-output reasoning model. Implementations must fail with
/// `ModelError::Malformed` instead of returning partial data.
#[async_trait]
pub trait ReasoningModel: Send + Sync {
    async fn score(
        &self,
        model: &str,
        a: &UserProfile,
        b: &UserProfile,
    ) -> Result<CompatibilityReport, ModelError>;

    async fn starters(
        &self,
        model: &str,
        a: &UserProfile,
        b: &UserProfile,
    ) -> Result<Vec<String>, ModelError>;
}

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError>;
}

#[async_trait]
pub trait VenueDirectory: Send + Sync {
    /// Best active venue for the location, if any.
    async fn suggest(&self, location: &TargetLocation) -> anyhow::Result<Option<VenueSuggestion>>;
}

/// Outbound notices. Fire-and-forget: delivery failures are logged by the
/// implementation and never surface to the matching core.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn weekly_match_ready(&self, m: &WeeklyMatch, recipient: Uuid);
    async fn mutual_match(&self, m: &WeeklyMatch, recipient: Uuid);
    async fn second_date_contact(&self, m: &WeeklyMatch, recipient: Uuid);
    async fn unread_message_email(&self, m: &WeeklyMatch, recipient: Uuid);
}

#[async_trait]
pub trait DelayedQueue: Send + Sync {
    async fn schedule(&self, task: &DelayedTask, due_at: DateTime<Utc>) -> anyhow::Result<()>;

    /// Claims and returns up to `limit` tasks due at or before `now`. A claimed
    /// task is never handed to another caller.
    async fn take_due(&self, now: DateTime<Utc>, limit: usize) -> anyhow::Result<Vec<DelayedTask>>;
}

/// Read-only view into the chat service's message state.
#[async_trait]
pub trait ChatInbox: Send + Sync {
    async fn has_unread(&self, match_id: Uuid, recipient: Uuid) -> anyhow::Result<bool>;
}

/// Mutual exclusion for jobs that must not overlap across replicas.
#[async_trait]
pub trait RunLock: Send + Sync {
    /// A holder token when this caller now holds `key`, `None` when someone
    /// else does. The hold lapses after `ttl`.
    async fn try_acquire(&self, key: &str, ttl: std::time::Duration) -> anyhow::Result<Option<String>>;

    /// Drops the hold only if `token` still owns it; a hold that lapsed and
    /// was taken by another run is left alone.
    async fn release(&self, key: &str, token: &str) -> anyhow::Result<()>;
}
