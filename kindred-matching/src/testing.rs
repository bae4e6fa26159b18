//! In-memory doubles for the ports, shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::clients::llm::ModelError;
use crate::delayed::DelayedTask;
use crate::matching::date_plan::TargetLocation;
use crate::matching::eligibility::{live_key, match_key, LIVE_KEY_PREFIX};
use crate::matching::index::EMBEDDING_DIMENSIONS;
use crate::matching::scorer::{CompatibilityReport, DimensionScores};
use crate::models::*;
use crate::ports::*;

pub fn utc(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .expect("valid rfc3339")
        .with_timezone(&Utc)
}

/// Full-width embedding whose leading components are `head`.
pub fn embedding(head: &[f32]) -> Vec<f32> {
    let mut v = vec![0.0; EMBEDDING_DIMENSIONS];
    v[..head.len()].copy_from_slice(head);
    v
}

/// An approved, live profile accepting ages 18 to 99.
pub fn profile(age: i32, gender: &str, interested_in: &str) -> UserProfile {
    let id = Uuid::new_v4();
    let now = Utc::now();
    UserProfile {
        id,
        auth_provider_id: format!("auth|{id}"),
        email: format!("{id}@example.com"),
        age,
        gender: gender.to_string(),
        interested_in: interested_in.to_string(),
        min_age: 18,
        max_age: 99,
        bio: "I spend weekends on long trail runs and evenings cooking for friends.".into(),
        looking_for: "Someone curious and kind who likes slow Sunday mornings.".into(),
        interests: vec!["hiking".into(), "cooking".into(), "jazz".into()],
        embedding: Some(embedding(&[1.0])),
        account_status: AccountStatus::Approved,
        photo_status: PhotoStatus::Approved,
        photo_resubmissions: 0,
        vacation_mode: false,
        vacation_until: None,
        match_key: live_key(gender),
        city: Some("Brooklyn".into()),
        latitude: None,
        longitude: None,
        last_matched_at: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn report(score: i32) -> CompatibilityReport {
    CompatibilityReport {
        score,
        explanation: "You both recharge outdoors and care about long dinners with friends. \
                      Your pace of life lines up well."
            .into(),
        dimension_scores: Some(DimensionScores {
            values: 20,
            lifestyle: 20,
            interests: 15,
            communication: 15,
            relationship_vision: 8,
        }),
        red_flags: Vec::new(),
    }
}

/// A `sent` match in the 2026-10-12 week with starters and a venue.
pub fn new_match(user_id: Uuid, match_user_id: Uuid, expires_at: DateTime<Utc>) -> WeeklyMatch {
    WeeklyMatch {
        id: Uuid::now_v7(),
        user_id,
        match_user_id,
        week_of: "2026-10-12".into(),
        compatibility_score: 80,
        explanation: report(80).explanation,
        dimension_scores: report(80).dimension_scores,
        red_flags: Vec::new(),
        conversation_starters: ConversationStarters::Ready([
            "Which trail should we try first?".into(),
            "What is your signature dish?".into(),
            "Best live show you have seen?".into(),
        ]),
        venue: Some(default_venue()),
        user_response: ResponseState::Pending,
        user_responded_at: None,
        match_response: ResponseState::Pending,
        match_responded_at: None,
        mutual_match: false,
        status: MatchStatus::Sent,
        date_scheduled: false,
        scheduled_for: None,
        sent_at: utc("2026-10-12T13:00:00Z"),
        expires_at,
        last_notification_email_sent_at: None,
        contact_exchanged_at: None,
    }
}

fn default_venue() -> VenueSuggestion {
    VenueSuggestion {
        name: "Lantern Coffee".into(),
        address: "12 Atlantic Ave, Brooklyn".into(),
        place_id: "place-lantern".into(),
        description: "Quiet corner tables and good pour-overs.".into(),
        rating: Some(4.6),
    }
}

// --- store ---

#[derive(Default)]
pub struct MemoryStore {
    profiles: Mutex<Vec<UserProfile>>,
    matches: Mutex<Vec<WeeklyMatch>>,
    pass_reasons: Mutex<Vec<PassReason>>,
    outcomes: Mutex<Vec<DateOutcome>>,
    failures: Mutex<Vec<&'static str>>,
}

impl MemoryStore {
    pub fn with_profiles(profiles: Vec<UserProfile>) -> Self {
        Self {
            profiles: Mutex::new(profiles),
            ..Self::default()
        }
    }

    /// The next call to `operation` fails with a connection error.
    pub fn fail_once(&self, operation: &'static str) {
        self.failures.lock().unwrap().push(operation);
    }

    fn injected(&self, operation: &'static str) -> anyhow::Result<()> {
        let mut failures = self.failures.lock().unwrap();
        match failures.iter().position(|op| *op == operation) {
            Some(i) => {
                failures.remove(i);
                Err(anyhow::anyhow!("connection reset during {operation}"))
            }
            None => Ok(()),
        }
    }

    pub fn seed(&self, m: WeeklyMatch) {
        self.matches.lock().unwrap().push(m);
    }

    pub fn matches(&self) -> Vec<WeeklyMatch> {
        self.matches.lock().unwrap().clone()
    }

    pub fn get(&self, id: Uuid) -> WeeklyMatch {
        self.matches
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .expect("seeded match")
    }

    pub fn profile(&self, id: Uuid) -> UserProfile {
        self.profiles
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .expect("seeded profile")
    }

    pub fn pass_reasons(&self) -> Vec<(Uuid, PassReasonKind)> {
        self.pass_reasons
            .lock()
            .unwrap()
            .iter()
            .map(|r| (r.user_id, r.reason))
            .collect()
    }

    fn update_profile(&self, id: Uuid, f: impl FnOnce(&mut UserProfile)) -> Option<UserProfile> {
        let mut profiles = self.profiles.lock().unwrap();
        let p = profiles.iter_mut().find(|p| p.id == id)?;
        f(p);
        p.match_key = match_key(p.photo_status, p.vacation_mode, &p.gender);
        Some(p.clone())
    }

    fn update_match<T>(&self, id: Uuid, f: impl FnOnce(&mut WeeklyMatch) -> T) -> Option<T> {
        let mut matches = self.matches.lock().unwrap();
        matches.iter_mut().find(|m| m.id == id).map(f)
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn load_matchable_profiles(&self) -> anyhow::Result<Vec<UserProfile>> {
        Ok(self
            .profiles
            .lock()
            .unwrap()
            .iter()
            .filter(|p| {
                p.account_status == AccountStatus::Approved && p.match_key.starts_with(LIVE_KEY_PREFIX)
            })
            .cloned()
            .collect())
    }

    async fn get_profile(&self, id: Uuid) -> anyhow::Result<Option<UserProfile>> {
        Ok(self.profiles.lock().unwrap().iter().find(|p| p.id == id).cloned())
    }

    async fn release_expired_vacations(&self, now: DateTime<Utc>) -> anyhow::Result<usize> {
        let due: Vec<Uuid> = self
            .profiles
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.vacation_mode && p.vacation_until.is_some_and(|u| u <= now))
            .map(|p| p.id)
            .collect();
        for id in &due {
            self.update_profile(*id, |p| {
                p.vacation_mode = false;
                p.vacation_until = None;
            });
        }
        Ok(due.len())
    }

    async fn set_photo_status(&self, id: Uuid, status: PhotoStatus) -> anyhow::Result<Option<UserProfile>> {
        Ok(self.update_profile(id, |p| p.photo_status = status))
    }

    async fn set_vacation(
        &self,
        id: Uuid,
        on: bool,
        until: Option<DateTime<Utc>>,
    ) -> anyhow::Result<Option<UserProfile>> {
        Ok(self.update_profile(id, |p| {
            p.vacation_mode = on;
            p.vacation_until = if on { until } else { None };
        }))
    }

    async fn update_narrative(
        &self,
        id: Uuid,
        bio: &str,
        looking_for: &str,
        embedding: Vec<f32>,
    ) -> anyhow::Result<Option<UserProfile>> {
        Ok(self.update_profile(id, |p| {
            p.bio = bio.to_string();
            p.looking_for = looking_for.to_string();
            p.embedding = Some(embedding);
        }))
    }
}

#[async_trait]
impl MatchStore for MemoryStore {
    async fn matches_for_week(&self, week_of: &str) -> anyhow::Result<Vec<WeeklyMatch>> {
        Ok(self
            .matches
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.week_of == week_of)
            .cloned()
            .collect())
    }

    async fn pairs_since(&self, week_of: &str) -> anyhow::Result<Vec<(Uuid, Uuid)>> {
        Ok(self
            .matches
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.week_of.as_str() >= week_of)
            .map(|m| (m.user_id, m.match_user_id))
            .collect())
    }

    async fn insert_match(&self, new: NewWeeklyMatch) -> anyhow::Result<WeeklyMatch> {
        self.injected("insert_match")?;
        let m = WeeklyMatch {
            id: new.id,
            user_id: new.user_id,
            match_user_id: new.match_user_id,
            week_of: new.week_of,
            compatibility_score: new.compatibility_score,
            explanation: new.explanation,
            dimension_scores: new.dimension_scores,
            red_flags: new.red_flags,
            conversation_starters: new.conversation_starters,
            venue: new.venue,
            user_response: ResponseState::Pending,
            user_responded_at: None,
            match_response: ResponseState::Pending,
            match_responded_at: None,
            mutual_match: false,
            status: MatchStatus::Sent,
            date_scheduled: false,
            scheduled_for: None,
            sent_at: new.sent_at,
            expires_at: new.expires_at,
            last_notification_email_sent_at: None,
            contact_exchanged_at: None,
        };
        for id in m.participants() {
            self.update_profile(id, |p| p.last_matched_at = Some(m.sent_at));
        }
        self.matches.lock().unwrap().push(m.clone());
        Ok(m)
    }

    async fn get_match(&self, id: Uuid) -> anyhow::Result<Option<WeeklyMatch>> {
        self.injected("get_match")?;
        Ok(self.matches.lock().unwrap().iter().find(|m| m.id == id).cloned())
    }

    async fn match_for_user(&self, user_id: Uuid, week_of: &str) -> anyhow::Result<Option<WeeklyMatch>> {
        Ok(self
            .matches
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.week_of == week_of && m.side_of(user_id).is_some())
            .cloned())
    }

    async fn record_response(
        &self,
        id: Uuid,
        side: Side,
        decision: Decision,
        at: DateTime<Utc>,
    ) -> anyhow::Result<Option<WeeklyMatch>> {
        Ok(self
            .update_match(id, |m| {
                let (response, responded_at) = match side {
                    Side::Initiator => (&mut m.user_response, &mut m.user_responded_at),
                    Side::Recipient => (&mut m.match_response, &mut m.match_responded_at),
                };
                if *response != ResponseState::Pending {
                    return None;
                }
                *response = decision.into();
                *responded_at = Some(at);
                Some(m.clone())
            })
            .flatten())
    }

    async fn mark_mutual(&self, id: Uuid) -> anyhow::Result<bool> {
        self.injected("mark_mutual")?;
        Ok(self
            .update_match(id, |m| {
                if m.mutual_match || !m.both_interested() {
                    return false;
                }
                m.mutual_match = true;
                true
            })
            .unwrap_or(false))
    }

    async fn expire_due(&self, now: DateTime<Utc>) -> anyhow::Result<usize> {
        let mut matches = self.matches.lock().unwrap();
        let mut count = 0;
        for m in matches.iter_mut() {
            if m.status == MatchStatus::Sent && m.expires_at < now {
                m.status = MatchStatus::Expired;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn mark_completed(&self, id: Uuid) -> anyhow::Result<bool> {
        Ok(self
            .update_match(id, |m| {
                let changed = m.status != MatchStatus::Completed;
                m.status = MatchStatus::Completed;
                changed
            })
            .unwrap_or(false))
    }

    async fn mark_contact_exchanged(&self, id: Uuid, at: DateTime<Utc>) -> anyhow::Result<bool> {
        self.injected("mark_contact_exchanged")?;
        Ok(self
            .update_match(id, |m| {
                if m.contact_exchanged_at.is_some() {
                    return false;
                }
                m.contact_exchanged_at = Some(at);
                true
            })
            .unwrap_or(false))
    }

    async fn stamp_notification_email(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
        cutoff: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        Ok(self
            .update_match(id, |m| {
                if m.last_notification_email_sent_at.is_some_and(|last| last > cutoff) {
                    return false;
                }
                m.last_notification_email_sent_at = Some(at);
                true
            })
            .unwrap_or(false))
    }

    async fn append_pass_reason(
        &self,
        match_id: Uuid,
        user_id: Uuid,
        reason: PassReasonKind,
        at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        self.pass_reasons.lock().unwrap().push(PassReason {
            id: Uuid::now_v7(),
            match_id,
            user_id,
            reason,
            created_at: at,
        });
        Ok(())
    }

    async fn insert_outcome(&self, outcome: NewDateOutcome) -> anyhow::Result<Option<DateOutcome>> {
        let mut outcomes = self.outcomes.lock().unwrap();
        if outcomes
            .iter()
            .any(|o| o.match_id == outcome.match_id && o.user_id == outcome.user_id)
        {
            return Ok(None);
        }
        let row = DateOutcome {
            id: Uuid::now_v7(),
            match_id: outcome.match_id,
            user_id: outcome.user_id,
            date_happened: outcome.date_happened,
            rating: outcome.rating,
            would_meet_again: outcome.would_meet_again,
            notes: outcome.notes,
            tags: outcome.tags,
            created_at: Utc::now(),
        };
        outcomes.push(row.clone());
        Ok(Some(row))
    }

    async fn outcomes_for_match(&self, match_id: Uuid) -> anyhow::Result<Vec<DateOutcome>> {
        Ok(self
            .outcomes
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.match_id == match_id)
            .cloned()
            .collect())
    }

    async fn all_outcomes(&self) -> anyhow::Result<Vec<DateOutcome>> {
        Ok(self.outcomes.lock().unwrap().clone())
    }
}

// --- reasoning model ---

/// Replays queued results per model name; once a queue runs dry every call
/// succeeds with a plausible answer.
#[derive(Default)]
pub struct ScriptedModel {
    scores: Mutex<HashMap<String, VecDeque<Result<CompatibilityReport, ModelError>>>>,
    starters: Mutex<VecDeque<Result<Vec<String>, ModelError>>>,
    score_calls: Mutex<Vec<String>>,
    delay: Mutex<Option<Duration>>,
    model_delays: Mutex<HashMap<String, Duration>>,
}

impl ScriptedModel {
    pub fn push_score(&self, model: &str, result: Result<CompatibilityReport, ModelError>) {
        self.scores
            .lock()
            .unwrap()
            .entry(model.to_string())
            .or_default()
            .push_back(result);
    }

    pub fn push_starters(&self, result: Result<Vec<String>, ModelError>) {
        self.starters.lock().unwrap().push_back(result);
    }

    pub fn score_calls(&self) -> Vec<String> {
        self.score_calls.lock().unwrap().clone()
    }

    /// Every score call sleeps this long before answering.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Score calls against `model` alone sleep this long before answering.
    pub fn set_delay_for(&self, model: &str, delay: Duration) {
        self.model_delays.lock().unwrap().insert(model.to_string(), delay);
    }
}

#[async_trait]
impl ReasoningModel for ScriptedModel {
    async fn score(
        &self,
        model: &str,
        _a: &UserProfile,
        _b: &UserProfile,
    ) -> Result<CompatibilityReport, ModelError> {
        self.score_calls.lock().unwrap().push(model.to_string());
        let delay = self
            .model_delays
            .lock()
            .unwrap()
            .get(model)
            .copied()
            .or(*self.delay.lock().unwrap());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self
            .scores
            .lock()
            .unwrap()
            .get_mut(model)
            .and_then(VecDeque::pop_front);
        scripted.unwrap_or_else(|| Ok(report(75)))
    }

    async fn starters(
        &self,
        _model: &str,
        _a: &UserProfile,
        _b: &UserProfile,
    ) -> Result<Vec<String>, ModelError> {
        let scripted = self.starters.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(vec![
                "Which trail near the city is worth the early alarm?".into(),
                "What dish do you cook when friends come over?".into(),
                "Which jazz record would you put on first?".into(),
            ])
        })
    }
}

#[derive(Default)]
pub struct StaticEmbedder;

#[async_trait]
impl Embedder for StaticEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        Ok(embedding(&[text.len() as f32, 1.0]))
    }
}

// --- venues ---

pub struct FixedVenues {
    venue: Option<VenueSuggestion>,
    fail: bool,
}

impl FixedVenues {
    pub fn with_default() -> Self {
        Self {
            venue: Some(default_venue()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self { venue: None, fail: true }
    }
}

#[async_trait]
impl VenueDirectory for FixedVenues {
    async fn suggest(&self, _location: &TargetLocation) -> anyhow::Result<Option<VenueSuggestion>> {
        if self.fail {
            anyhow::bail!("venue directory offline");
        }
        Ok(self.venue.clone())
    }
}

// --- notifications ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    WeeklyMatch,
    Mutual,
    SecondDate,
    UnreadEmail,
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(Notice, Uuid, Uuid)>>,
}

impl RecordingNotifier {
    pub fn count(&self, kind: Notice) -> usize {
        self.sent.lock().unwrap().iter().filter(|(k, _, _)| *k == kind).count()
    }

    fn record(&self, kind: Notice, m: &WeeklyMatch, recipient: Uuid) {
        self.sent.lock().unwrap().push((kind, m.id, recipient));
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn weekly_match_ready(&self, m: &WeeklyMatch, recipient: Uuid) {
        self.record(Notice::WeeklyMatch, m, recipient);
    }

    async fn mutual_match(&self, m: &WeeklyMatch, recipient: Uuid) {
        self.record(Notice::Mutual, m, recipient);
    }

    async fn second_date_contact(&self, m: &WeeklyMatch, recipient: Uuid) {
        self.record(Notice::SecondDate, m, recipient);
    }

    async fn unread_message_email(&self, m: &WeeklyMatch, recipient: Uuid) {
        self.record(Notice::UnreadEmail, m, recipient);
    }
}

// --- delayed queue / inbox ---

#[derive(Default)]
pub struct MemoryQueue {
    tasks: Mutex<Vec<(DelayedTask, DateTime<Utc>)>>,
}

#[async_trait]
impl DelayedQueue for MemoryQueue {
    async fn schedule(&self, task: &DelayedTask, due_at: DateTime<Utc>) -> anyhow::Result<()> {
        let mut tasks = self.tasks.lock().unwrap();
        tasks.retain(|(queued, _)| queued != task);
        tasks.push((task.clone(), due_at));
        Ok(())
    }

    async fn take_due(&self, now: DateTime<Utc>, limit: usize) -> anyhow::Result<Vec<DelayedTask>> {
        let mut tasks = self.tasks.lock().unwrap();
        tasks.sort_by_key(|(_, due)| *due);
        let ready = tasks.iter().take_while(|(_, due)| *due <= now).count().min(limit);
        Ok(tasks.drain(..ready).map(|(task, _)| task).collect())
    }
}

pub struct StubInbox {
    unread: AtomicBool,
}

impl StubInbox {
    pub fn new(unread: bool) -> Self {
        Self {
            unread: AtomicBool::new(unread),
        }
    }

    pub fn set_unread(&self, unread: bool) {
        self.unread.store(unread, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChatInbox for StubInbox {
    async fn has_unread(&self, _match_id: Uuid, _recipient: Uuid) -> anyhow::Result<bool> {
        Ok(self.unread.load(Ordering::SeqCst))
    }
}

// --- run lock ---

#[derive(Default)]
pub struct MemoryLock {
    held: Mutex<HashMap<String, String>>,
    issued: Mutex<Vec<(String, String)>>,
    released: Mutex<Vec<(String, String)>>,
}

impl MemoryLock {
    /// Marks `key` as held by some other run.
    pub fn hold(&self, key: &str) {
        self.held.lock().unwrap().insert(key.to_string(), "elsewhere".into());
    }

    pub fn is_held(&self, key: &str) -> bool {
        self.held.lock().unwrap().contains_key(key)
    }

    /// The hold on `key` expires as if its TTL ran out.
    pub fn lapse(&self, key: &str) {
        self.held.lock().unwrap().remove(key);
    }

    pub fn issued(&self) -> Vec<(String, String)> {
        self.issued.lock().unwrap().clone()
    }

    pub fn released(&self) -> Vec<(String, String)> {
        self.released.lock().unwrap().clone()
    }
}

#[async_trait]
impl RunLock for MemoryLock {
    async fn try_acquire(&self, key: &str, _ttl: Duration) -> anyhow::Result<Option<String>> {
        let mut held = self.held.lock().unwrap();
        if held.contains_key(key) {
            return Ok(None);
        }
        let token = Uuid::now_v7().to_string();
        held.insert(key.to_string(), token.clone());
        self.issued.lock().unwrap().push((key.to_string(), token.clone()));
        Ok(Some(token))
    }

    async fn release(&self, key: &str, token: &str) -> anyhow::Result<()> {
        self.released.lock().unwrap().push((key.to_string(), token.to_string()));
        let mut held = self.held.lock().unwrap();
        if held.get(key).map(String::as_str) == Some(token) {
            held.remove(key);
        }
        Ok(())
    }
}
