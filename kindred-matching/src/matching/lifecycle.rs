//! Everything that happens to a WeeklyMatch after the run created it.
//!
//! Transitions go through single conditional writes in the store, so the
//! checks here decide which error to report and the store decides who won.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::delayed::DelayedTask;
use crate::error::{MatchingError, MatchingResult};
use crate::models::{
    DateOutcome, Decision, MatchView, NewDateOutcome, OutcomeTag, PassReasonKind, ResponseState,
    WeeklyMatch,
};
use crate::ports::{ChatInbox, DelayedQueue, MatchStore, Notifier};
use crate::week::MatchWeek;

const MAX_NOTES_CHARS: usize = 2_000;
/// Back-off before a failed delayed notification is tried again.
const REQUEUE_DELAY_MINS: i64 = 1;

#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    pub tz: Tz,
    pub unread_email_delay: Duration,
    pub email_throttle: Duration,
}

impl LifecycleSettings {
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        Ok(Self {
            tz: config.tz()?,
            unread_email_delay: Duration::minutes(config.unread_email_delay_mins),
            email_throttle: Duration::minutes(config.email_throttle_mins),
        })
    }
}

#[derive(Debug, Clone)]
pub struct OutcomeSubmission {
    pub date_happened: bool,
    pub rating: Option<i32>,
    pub would_meet_again: bool,
    pub notes: Option<String>,
    pub tags: Vec<OutcomeTag>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutcomeReceipt {
    pub outcome: DateOutcome,
    /// Both sides are in and both want to meet again.
    pub second_date: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub skipped: usize,
    /// Tasks that hit an error and were scheduled again.
    pub requeued: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SecondDateMetric {
    /// Matches where both participants submitted feedback.
    pub completed_pairs: usize,
    /// Of those, pairs where both would meet again.
    pub second_dates: usize,
    pub rate: f64,
}

pub struct MatchLifecycle {
    matches: Arc<dyn MatchStore>,
    notifier: Arc<dyn Notifier>,
    queue: Arc<dyn DelayedQueue>,
    inbox: Arc<dyn ChatInbox>,
    settings: LifecycleSettings,
}

impl MatchLifecycle {
    pub fn new(
        matches: Arc<dyn MatchStore>,
        notifier: Arc<dyn Notifier>,
        queue: Arc<dyn DelayedQueue>,
        inbox: Arc<dyn ChatInbox>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            matches,
            notifier,
            queue,
            inbox,
            settings,
        }
    }

    async fn load(&self, match_id: Uuid) -> MatchingResult<WeeklyMatch> {
        self.matches
            .get_match(match_id)
            .await?
            .ok_or(MatchingError::MatchNotFound)
    }

    pub async fn current_match(&self, user_id: Uuid, now: DateTime<Utc>) -> MatchingResult<Option<MatchView>> {
        let week_of = MatchWeek::containing(now, self.settings.tz).label();
        let found = self.matches.match_for_user(user_id, &week_of).await?;
        Ok(found.and_then(|m| m.view_for(user_id)))
    }

    /// Repeating the recorded answer is a no-op; changing it is rejected.
    pub async fn respond(
        &self,
        match_id: Uuid,
        user_id: Uuid,
        decision: Decision,
        pass_reason: Option<PassReasonKind>,
        now: DateTime<Utc>,
    ) -> MatchingResult<WeeklyMatch> {
        if pass_reason.is_some() && decision != Decision::Passed {
            return Err(MatchingError::Validation(
                "a pass reason can only accompany a pass".into(),
            ));
        }

        let current = self.load(match_id).await?;
        let side = current
            .side_of(user_id)
            .ok_or(MatchingError::UnauthorizedParticipant)?;

        if let Some(settled) = already_answered(&current, side, decision)? {
            // A repeat can finish a mutual flip an earlier attempt left undone.
            return self.settle_mutual(settled).await;
        }
        if current.window_closed(now) {
            return Err(MatchingError::MatchExpired);
        }

        let Some(updated) = self
            .matches
            .record_response(match_id, side, decision, now)
            .await?
        else {
            // Lost a race against a concurrent submission from the same side.
            let latest = self.load(match_id).await?;
            let settled = already_answered(&latest, side, decision)?
                .ok_or(MatchingError::AlreadyResponded)?;
            return self.settle_mutual(settled).await;
        };

        tracing::info!(%match_id, %user_id, %decision, "match response recorded");

        if decision == Decision::Passed {
            if let Some(reason) = pass_reason {
                self.matches
                    .append_pass_reason(match_id, user_id, reason, now)
                    .await?;
            }
        }

        self.settle_mutual(updated).await
    }

    /// Flips `mutual_match` when both sides are interested. The conditional
    /// write lets exactly one caller send the notices.
    async fn settle_mutual(&self, mut m: WeeklyMatch) -> MatchingResult<WeeklyMatch> {
        if m.mutual_match || !m.both_interested() {
            return Ok(m);
        }
        if self.matches.mark_mutual(m.id).await? {
            tracing::info!(match_id = %m.id, "mutual match");
            metrics::counter!("kindred_matching_mutual_matches_total").increment(1);
            for recipient in m.participants() {
                self.notifier.mutual_match(&m, recipient).await;
            }
        }
        m.mutual_match = true;
        Ok(m)
    }

    pub async fn expire_sweep(&self, now: DateTime<Utc>) -> MatchingResult<usize> {
        let expired = self.matches.expire_due(now).await?;
        tracing::info!(expired, "expire sweep finished");
        metrics::counter!("kindred_matching_expired_total").increment(expired as u64);
        Ok(expired)
    }

    pub async fn submit_outcome(
        &self,
        match_id: Uuid,
        user_id: Uuid,
        submission: OutcomeSubmission,
        now: DateTime<Utc>,
    ) -> MatchingResult<OutcomeReceipt> {
        validate_submission(&submission)?;

        let m = self.load(match_id).await?;
        if m.side_of(user_id).is_none() {
            return Err(MatchingError::UnauthorizedParticipant);
        }
        if !m.mutual_match {
            return Err(MatchingError::NotMutual);
        }

        let inserted = self
            .matches
            .insert_outcome(NewDateOutcome {
                match_id,
                user_id,
                date_happened: submission.date_happened,
                rating: submission.rating,
                would_meet_again: submission.would_meet_again,
                notes: submission.notes,
                tags: submission.tags,
            })
            .await?;

        let Some(outcome) = inserted else {
            // A resubmission still finishes whatever an earlier attempt left
            // undone after its feedback row was committed.
            self.settle_outcomes(&m, now).await?;
            return Err(MatchingError::OutcomeAlreadySubmitted);
        };

        let second_date = self.settle_outcomes(&m, now).await?;
        Ok(OutcomeReceipt {
            outcome,
            second_date,
        })
    }

    /// Completes the match once both outcomes are in and sends the contact
    /// exchange when both would meet again. Returns whether it is a second
    /// date. Safe to repeat.
    async fn settle_outcomes(&self, m: &WeeklyMatch, now: DateTime<Utc>) -> MatchingResult<bool> {
        let outcomes = self.matches.outcomes_for_match(m.id).await?;
        let both_in = m
            .participants()
            .iter()
            .all(|id| outcomes.iter().any(|o| o.user_id == *id));
        if !both_in {
            return Ok(false);
        }

        self.matches.mark_completed(m.id).await?;
        let second_date = outcomes.iter().all(|o| o.would_meet_again);
        // The conditional stamp lets exactly one of two racing submissions
        // send the contact exchange.
        if second_date && self.matches.mark_contact_exchanged(m.id, now).await? {
            tracing::info!(match_id = %m.id, "second date, exchanging contact details");
            metrics::counter!("kindred_matching_second_dates_total").increment(1);
            for recipient in m.participants() {
                self.notifier.second_date_contact(m, recipient).await;
            }
        }
        Ok(second_date)
    }

    /// Chat is open to participants of a mutual match until the window closes.
    pub async fn ensure_chat_open(
        &self,
        match_id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> MatchingResult<WeeklyMatch> {
        let m = self.load(match_id).await?;
        if m.side_of(user_id).is_none() {
            return Err(MatchingError::UnauthorizedParticipant);
        }
        if !m.mutual_match {
            return Err(MatchingError::NotMutual);
        }
        if m.window_closed(now) {
            return Err(MatchingError::MatchExpired);
        }
        Ok(m)
    }

    /// Queues an "unread message" email for `recipient`. Whether it is sent is
    /// decided when the task comes due.
    pub async fn schedule_unread_email(
        &self,
        match_id: Uuid,
        sender: Uuid,
        recipient: Uuid,
        now: DateTime<Utc>,
    ) -> MatchingResult<DateTime<Utc>> {
        let m = self.ensure_chat_open(match_id, sender, now).await?;
        if m.partner_of(sender) != Some(recipient) {
            return Err(MatchingError::UnauthorizedParticipant);
        }
        let due_at = now + self.settings.unread_email_delay;
        self.queue
            .schedule(&DelayedTask::UnreadMessageEmail { match_id, recipient }, due_at)
            .await?;
        Ok(due_at)
    }

    pub async fn deliver_due_notifications(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> MatchingResult<DeliveryReport> {
        let mut report = DeliveryReport::default();
        for task in self.queue.take_due(now, limit).await? {
            let attempt = match &task {
                DelayedTask::UnreadMessageEmail { match_id, recipient } => {
                    self.deliver_unread_email(*match_id, *recipient, now).await
                }
            };
            match attempt {
                Ok(true) => report.delivered += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    // The task was already claimed; put it back for the next drain.
                    tracing::warn!(?task, error = %e, "delayed notification failed, requeueing");
                    self.queue.schedule(&task, now + Duration::minutes(REQUEUE_DELAY_MINS)).await?;
                    report.requeued += 1;
                }
            }
        }
        if report.delivered + report.skipped + report.requeued > 0 {
            tracing::debug!(
                delivered = report.delivered,
                skipped = report.skipped,
                requeued = report.requeued,
                "delayed notifications drained"
            );
        }
        Ok(report)
    }

    async fn deliver_unread_email(
        &self,
        match_id: Uuid,
        recipient: Uuid,
        now: DateTime<Utc>,
    ) -> MatchingResult<bool> {
        let Some(m) = self.matches.get_match(match_id).await? else {
            return Ok(false);
        };
        if !m.mutual_match || m.window_closed(now) || m.side_of(recipient).is_none() {
            return Ok(false);
        }
        match self.inbox.has_unread(match_id, recipient).await {
            Ok(true) => {}
            Ok(false) => return Ok(false),
            Err(e) => {
                tracing::warn!(%match_id, error = %e, "unread check failed, dropping email");
                return Ok(false);
            }
        }
        let cutoff = now - self.settings.email_throttle;
        if !self
            .matches
            .stamp_notification_email(match_id, now, cutoff)
            .await?
        {
            tracing::debug!(%match_id, "unread email throttled");
            return Ok(false);
        }
        self.notifier.unread_message_email(&m, recipient).await;
        Ok(true)
    }

    pub async fn second_date_metric(&self) -> MatchingResult<SecondDateMetric> {
        let outcomes = self.matches.all_outcomes().await?;
        let mut by_match: HashMap<Uuid, Vec<&DateOutcome>> = HashMap::new();
        for outcome in &outcomes {
            by_match.entry(outcome.match_id).or_default().push(outcome);
        }

        let mut metric = SecondDateMetric::default();
        for pair in by_match.values().filter(|rows| rows.len() >= 2) {
            metric.completed_pairs += 1;
            if pair.iter().all(|o| o.would_meet_again) {
                metric.second_dates += 1;
            }
        }
        if metric.completed_pairs > 0 {
            metric.rate = metric.second_dates as f64 / metric.completed_pairs as f64;
        }
        Ok(metric)
    }
}

/// `Some` when `side` already holds exactly `decision`, `Err` when it holds a
/// different answer, `None` while it is still pending.
fn already_answered(
    m: &WeeklyMatch,
    side: crate::models::Side,
    decision: Decision,
) -> MatchingResult<Option<WeeklyMatch>> {
    match m.response_of(side) {
        ResponseState::Pending => Ok(None),
        recorded if recorded == ResponseState::from(decision) => Ok(Some(m.clone())),
        _ => Err(MatchingError::AlreadyResponded),
    }
}

fn validate_submission(submission: &OutcomeSubmission) -> MatchingResult<()> {
    if let Some(rating) = submission.rating {
        if !(1..=5).contains(&rating) {
            return Err(MatchingError::Validation("rating must be between 1 and 5".into()));
        }
    }
    if submission
        .notes
        .as_ref()
        .is_some_and(|n| n.chars().count() > MAX_NOTES_CHARS)
    {
        return Err(MatchingError::Validation(format!(
            "notes must be at most {MAX_NOTES_CHARS} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConversationStarters, MatchStatus};
    use crate::testing::{new_match, utc, MemoryQueue, MemoryStore, Notice, RecordingNotifier, StubInbox};

    struct Harness {
        store: Arc<MemoryStore>,
        notifier: Arc<RecordingNotifier>,
        inbox: Arc<StubInbox>,
        lifecycle: MatchLifecycle,
        m: WeeklyMatch,
    }

    // Wednesday of the 2026-10-12 week; the window closes 2026-10-17T03:59Z.
    fn now() -> DateTime<Utc> {
        utc("2026-10-14T15:00:00Z")
    }

    fn after_window() -> DateTime<Utc> {
        utc("2026-10-17T05:00:00Z")
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let inbox = Arc::new(StubInbox::new(true));
        let m = new_match(Uuid::new_v4(), Uuid::new_v4(), utc("2026-10-17T03:59:00Z"));
        store.seed(m.clone());
        let lifecycle = MatchLifecycle::new(
            store.clone(),
            notifier.clone(),
            Arc::new(MemoryQueue::default()),
            inbox.clone(),
            LifecycleSettings {
                tz: chrono_tz::America::New_York,
                unread_email_delay: Duration::minutes(30),
                email_throttle: Duration::hours(6),
            },
        );
        Harness {
            store,
            notifier,
            inbox,
            lifecycle,
            m,
        }
    }

    impl Harness {
        async fn make_mutual(&self) {
            for user in self.m.participants() {
                self.lifecycle
                    .respond(self.m.id, user, Decision::Interested, None, now())
                    .await
                    .unwrap();
            }
        }

        fn stored(&self) -> WeeklyMatch {
            self.store.get(self.m.id)
        }
    }

    fn submission(would_meet_again: bool) -> OutcomeSubmission {
        OutcomeSubmission {
            date_happened: true,
            rating: Some(4),
            would_meet_again,
            notes: None,
            tags: vec![OutcomeTag::GreatConversation],
        }
    }

    #[tokio::test]
    async fn mutual_interest_notifies_each_side_exactly_once() {
        let h = harness();
        let [a, b] = h.m.participants();

        let after_a = h.lifecycle.respond(h.m.id, a, Decision::Interested, None, now()).await.unwrap();
        assert!(!after_a.mutual_match);
        let after_b = h.lifecycle.respond(h.m.id, b, Decision::Interested, None, now()).await.unwrap();
        assert!(after_b.mutual_match);
        assert_eq!(h.notifier.count(Notice::Mutual), 2);

        // Re-submitting from either side changes nothing and sends nothing.
        h.lifecycle.respond(h.m.id, a, Decision::Interested, None, now()).await.unwrap();
        h.lifecycle.respond(h.m.id, b, Decision::Interested, None, now()).await.unwrap();
        assert_eq!(h.notifier.count(Notice::Mutual), 2);
        assert!(h.stored().mutual_match);
    }

    #[tokio::test]
    async fn same_response_twice_is_a_no_op() {
        let h = harness();
        let a = h.m.user_id;
        let first = h.lifecycle.respond(h.m.id, a, Decision::Passed, None, now()).await.unwrap();
        let later = now() + Duration::hours(1);
        let second = h.lifecycle.respond(h.m.id, a, Decision::Passed, None, later).await.unwrap();
        assert_eq!(first.user_responded_at, second.user_responded_at);
        assert_eq!(h.stored().user_responded_at, first.user_responded_at);
    }

    #[tokio::test]
    async fn changing_a_response_is_rejected() {
        let h = harness();
        let a = h.m.user_id;
        h.lifecycle.respond(h.m.id, a, Decision::Interested, None, now()).await.unwrap();
        let err = h
            .lifecycle
            .respond(h.m.id, a, Decision::Passed, None, now())
            .await
            .unwrap_err();
        assert!(matches!(err, MatchingError::AlreadyResponded));
        assert_eq!(h.stored().user_response, ResponseState::Interested);
    }

    #[tokio::test]
    async fn outsiders_cannot_respond() {
        let h = harness();
        let err = h
            .lifecycle
            .respond(h.m.id, Uuid::new_v4(), Decision::Interested, None, now())
            .await
            .unwrap_err();
        assert!(matches!(err, MatchingError::UnauthorizedParticipant));

        let err = h
            .lifecycle
            .respond(Uuid::new_v4(), h.m.user_id, Decision::Interested, None, now())
            .await
            .unwrap_err();
        assert!(matches!(err, MatchingError::MatchNotFound));
    }

    #[tokio::test]
    async fn one_sided_pass_never_becomes_mutual() {
        let h = harness();
        let [a, b] = h.m.participants();
        h.lifecycle
            .respond(h.m.id, a, Decision::Passed, Some(PassReasonKind::DifferentGoals), now())
            .await
            .unwrap();
        h.lifecycle.respond(h.m.id, b, Decision::Interested, None, now()).await.unwrap();
        assert!(!h.stored().mutual_match);

        h.lifecycle.expire_sweep(after_window()).await.unwrap();
        let stored = h.stored();
        assert!(!stored.mutual_match);
        assert_eq!(stored.status, MatchStatus::Expired);
        assert_eq!(h.notifier.count(Notice::Mutual), 0);
        assert_eq!(h.store.pass_reasons(), vec![(a, PassReasonKind::DifferentGoals)]);
    }

    #[tokio::test]
    async fn pass_reason_requires_a_pass() {
        let h = harness();
        let err = h
            .lifecycle
            .respond(h.m.id, h.m.user_id, Decision::Interested, Some(PassReasonKind::Other), now())
            .await
            .unwrap_err();
        assert!(matches!(err, MatchingError::Validation(_)));
        assert_eq!(h.stored().user_response, ResponseState::Pending);
    }

    #[tokio::test]
    async fn responding_after_the_window_is_rejected() {
        let h = harness();
        let err = h
            .lifecycle
            .respond(h.m.id, h.m.user_id, Decision::Interested, None, after_window())
            .await
            .unwrap_err();
        assert!(matches!(err, MatchingError::MatchExpired));
    }

    #[tokio::test]
    async fn sweep_expires_only_past_due_matches_and_never_reopens() {
        let h = harness();
        let future = new_match(Uuid::new_v4(), Uuid::new_v4(), utc("2026-10-24T03:59:00Z"));
        h.store.seed(future.clone());

        assert_eq!(h.lifecycle.expire_sweep(after_window()).await.unwrap(), 1);
        assert_eq!(h.stored().status, MatchStatus::Expired);
        assert_eq!(h.store.get(future.id).status, MatchStatus::Sent);

        // A second sweep, or a late response, leaves the expired match alone.
        assert_eq!(h.lifecycle.expire_sweep(after_window()).await.unwrap(), 0);
        let _ = h
            .lifecycle
            .respond(h.m.id, h.m.user_id, Decision::Interested, None, now())
            .await;
        assert_eq!(h.stored().status, MatchStatus::Expired);
    }

    #[tokio::test]
    async fn mutual_flag_survives_expiry_and_repeats() {
        let h = harness();
        h.make_mutual().await;
        h.lifecycle.expire_sweep(after_window()).await.unwrap();
        let _ = h
            .lifecycle
            .respond(h.m.id, h.m.user_id, Decision::Passed, None, after_window())
            .await;
        assert!(h.stored().mutual_match);
    }

    #[tokio::test]
    async fn feedback_requires_a_mutual_match() {
        let h = harness();
        let err = h
            .lifecycle
            .submit_outcome(h.m.id, h.m.user_id, submission(true), now())
            .await
            .unwrap_err();
        assert!(matches!(err, MatchingError::NotMutual));
    }

    #[tokio::test]
    async fn both_yes_exchanges_contacts_once() {
        let h = harness();
        h.make_mutual().await;
        let [a, b] = h.m.participants();

        let first = h.lifecycle.submit_outcome(h.m.id, a, submission(true), now()).await.unwrap();
        assert!(!first.second_date);
        assert_eq!(h.notifier.count(Notice::SecondDate), 0);

        let second = h.lifecycle.submit_outcome(h.m.id, b, submission(true), now()).await.unwrap();
        assert!(second.second_date);
        assert_eq!(h.notifier.count(Notice::SecondDate), 2);
        assert_eq!(h.stored().status, MatchStatus::Completed);
        assert!(h.stored().contact_exchanged_at.is_some());

        let err = h
            .lifecycle
            .submit_outcome(h.m.id, b, submission(true), now())
            .await
            .unwrap_err();
        assert!(matches!(err, MatchingError::OutcomeAlreadySubmitted));
        assert_eq!(h.notifier.count(Notice::SecondDate), 2);
    }

    #[tokio::test]
    async fn one_no_means_no_contact_exchange() {
        let h = harness();
        h.make_mutual().await;
        let [a, b] = h.m.participants();
        h.lifecycle.submit_outcome(h.m.id, a, submission(true), now()).await.unwrap();
        let receipt = h.lifecycle.submit_outcome(h.m.id, b, submission(false), now()).await.unwrap();
        assert!(!receipt.second_date);
        assert_eq!(h.notifier.count(Notice::SecondDate), 0);
        assert_eq!(h.stored().status, MatchStatus::Completed);
    }

    #[tokio::test]
    async fn rating_must_be_one_to_five() {
        let h = harness();
        h.make_mutual().await;
        let mut bad = submission(true);
        bad.rating = Some(6);
        let err = h
            .lifecycle
            .submit_outcome(h.m.id, h.m.user_id, bad, now())
            .await
            .unwrap_err();
        assert!(matches!(err, MatchingError::Validation(_)));
    }

    #[tokio::test]
    async fn chat_opens_on_mutual_and_closes_with_the_window() {
        let h = harness();
        let a = h.m.user_id;
        let err = h.lifecycle.ensure_chat_open(h.m.id, a, now()).await.unwrap_err();
        assert!(matches!(err, MatchingError::NotMutual));

        h.make_mutual().await;
        assert!(h.lifecycle.ensure_chat_open(h.m.id, a, now()).await.is_ok());

        let err = h.lifecycle.ensure_chat_open(h.m.id, a, after_window()).await.unwrap_err();
        assert!(matches!(err, MatchingError::MatchExpired));

        let err = h
            .lifecycle
            .ensure_chat_open(h.m.id, Uuid::new_v4(), now())
            .await
            .unwrap_err();
        assert!(matches!(err, MatchingError::UnauthorizedParticipant));
    }

    #[tokio::test]
    async fn unread_email_is_rechecked_and_throttled_at_delivery() {
        let h = harness();
        h.make_mutual().await;
        let [a, b] = h.m.participants();

        let due = h.lifecycle.schedule_unread_email(h.m.id, a, b, now()).await.unwrap();
        assert_eq!(due, now() + Duration::minutes(30));

        // Not due yet.
        let early = h.lifecycle.deliver_due_notifications(now(), 10).await.unwrap();
        assert_eq!(early, DeliveryReport::default());

        let report = h.lifecycle.deliver_due_notifications(due, 10).await.unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(h.notifier.count(Notice::UnreadEmail), 1);

        // Inside the throttle window nothing more goes out.
        let again = due + Duration::minutes(5);
        h.lifecycle.schedule_unread_email(h.m.id, b, a, again).await.unwrap();
        let report = h
            .lifecycle
            .deliver_due_notifications(again + Duration::minutes(30), 10)
            .await
            .unwrap();
        assert_eq!(report.skipped, 1);

        // Once read, a due task is dropped.
        h.inbox.set_unread(false);
        let later = due + Duration::hours(7);
        h.lifecycle.schedule_unread_email(h.m.id, a, b, later).await.unwrap();
        let report = h
            .lifecycle
            .deliver_due_notifications(later + Duration::minutes(30), 10)
            .await
            .unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(h.notifier.count(Notice::UnreadEmail), 1);
    }

    #[tokio::test]
    async fn unread_email_only_targets_the_partner() {
        let h = harness();
        h.make_mutual().await;
        let err = h
            .lifecycle
            .schedule_unread_email(h.m.id, h.m.user_id, Uuid::new_v4(), now())
            .await
            .unwrap_err();
        assert!(matches!(err, MatchingError::UnauthorizedParticipant));
    }

    #[tokio::test]
    async fn repeated_interest_finishes_an_interrupted_mutual_flip() {
        let h = harness();
        let [a, b] = h.m.participants();
        h.lifecycle.respond(h.m.id, a, Decision::Interested, None, now()).await.unwrap();

        h.store.fail_once("mark_mutual");
        let err = h
            .lifecycle
            .respond(h.m.id, b, Decision::Interested, None, now())
            .await
            .unwrap_err();
        assert!(matches!(err, MatchingError::Store(_)));
        assert!(h.stored().both_interested());
        assert!(!h.stored().mutual_match);

        let retried = h.lifecycle.respond(h.m.id, b, Decision::Interested, None, now()).await.unwrap();
        assert!(retried.mutual_match);
        assert!(h.stored().mutual_match);
        assert_eq!(h.notifier.count(Notice::Mutual), 2);

        // Further repeats stay quiet.
        h.lifecycle.respond(h.m.id, a, Decision::Interested, None, now()).await.unwrap();
        assert_eq!(h.notifier.count(Notice::Mutual), 2);
    }

    #[tokio::test]
    async fn resubmitted_feedback_finishes_an_interrupted_contact_exchange() {
        let h = harness();
        h.make_mutual().await;
        let [a, b] = h.m.participants();
        h.lifecycle.submit_outcome(h.m.id, a, submission(true), now()).await.unwrap();

        h.store.fail_once("mark_contact_exchanged");
        let err = h
            .lifecycle
            .submit_outcome(h.m.id, b, submission(true), now())
            .await
            .unwrap_err();
        assert!(matches!(err, MatchingError::Store(_)));
        assert_eq!(h.notifier.count(Notice::SecondDate), 0);

        let err = h
            .lifecycle
            .submit_outcome(h.m.id, b, submission(true), now())
            .await
            .unwrap_err();
        assert!(matches!(err, MatchingError::OutcomeAlreadySubmitted));
        assert_eq!(h.notifier.count(Notice::SecondDate), 2);
        assert!(h.stored().contact_exchanged_at.is_some());
    }

    #[tokio::test]
    async fn failed_delivery_is_requeued_without_losing_later_tasks() {
        let h = harness();
        h.make_mutual().await;
        let [a, b] = h.m.participants();

        let mut other = new_match(Uuid::new_v4(), Uuid::new_v4(), h.m.expires_at);
        other.user_response = ResponseState::Interested;
        other.match_response = ResponseState::Interested;
        other.mutual_match = true;
        h.store.seed(other.clone());

        let due = h.lifecycle.schedule_unread_email(h.m.id, a, b, now()).await.unwrap();
        h.lifecycle
            .schedule_unread_email(other.id, other.user_id, other.match_user_id, now())
            .await
            .unwrap();

        h.store.fail_once("get_match");
        let first = h.lifecycle.deliver_due_notifications(due, 10).await.unwrap();
        assert_eq!(
            first,
            DeliveryReport {
                delivered: 1,
                skipped: 0,
                requeued: 1
            }
        );

        let second = h
            .lifecycle
            .deliver_due_notifications(due + Duration::minutes(REQUEUE_DELAY_MINS), 10)
            .await
            .unwrap();
        assert_eq!(second.delivered, 1);
        assert_eq!(h.notifier.count(Notice::UnreadEmail), 2);
    }

    #[tokio::test]
    async fn second_date_rate_counts_complete_pairs() {
        let h = harness();
        h.make_mutual().await;
        let [a, b] = h.m.participants();
        h.lifecycle.submit_outcome(h.m.id, a, submission(true), now()).await.unwrap();
        h.lifecycle.submit_outcome(h.m.id, b, submission(true), now()).await.unwrap();

        let metric = h.lifecycle.second_date_metric().await.unwrap();
        assert_eq!(metric.completed_pairs, 1);
        assert_eq!(metric.second_dates, 1);
        assert!((metric.rate - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn current_match_hides_starters_until_mutual() {
        let h = harness();
        let a = h.m.user_id;

        let view = h.lifecycle.current_match(a, now()).await.unwrap().unwrap();
        assert_eq!(view.partner_id, h.m.match_user_id);
        assert!(view.conversation_starters.is_none());

        h.make_mutual().await;
        let view = h.lifecycle.current_match(a, now()).await.unwrap().unwrap();
        assert!(matches!(view.conversation_starters, Some(ConversationStarters::Ready(_))));

        assert!(h.lifecycle.current_match(Uuid::new_v4(), now()).await.unwrap().is_none());
    }
}
