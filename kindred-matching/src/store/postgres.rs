use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use kindred_shared::clients::db::DbPool;

use crate::matching::eligibility::{match_key, LIVE_KEY_PREFIX};
use crate::models::{
    AccountStatus, ConversationStarters, DateOutcome, Decision, MatchStatus, NewDateOutcome,
    NewWeeklyMatch, PassReasonKind, PhotoStatus, ResponseState, Side, UserProfile, VenueSuggestion,
    WeeklyMatch,
};
use crate::ports::{MatchStore, ProfileStore};
use crate::schema::{date_outcomes, pass_reasons, profiles, weekly_matches};

/// Diesel-backed store for profiles, matches, and feedback. Queries run on
/// the blocking pool so the runtime threads stay free.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn run<T, F>(&self, f: F) -> anyhow::Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> anyhow::Result<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(|e| {
                tracing::error!(error = %e, "failed to get db connection");
                anyhow::anyhow!("database connection error: {e}")
            })?;
            f(&mut conn)
        })
        .await?
    }
}

// --- rows ---

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = profiles)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct ProfileRow {
    id: Uuid,
    auth_provider_id: String,
    email: String,
    age: i32,
    gender: String,
    interested_in: String,
    min_age: i32,
    max_age: i32,
    bio: String,
    looking_for: String,
    interests: Vec<String>,
    embedding: Option<Vec<f32>>,
    account_status: String,
    photo_status: String,
    photo_resubmissions: i32,
    vacation_mode: bool,
    vacation_until: Option<DateTime<Utc>>,
    match_key: String,
    city: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    last_matched_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProfileRow> for UserProfile {
    type Error = anyhow::Error;

    fn try_from(row: ProfileRow) -> anyhow::Result<Self> {
        Ok(Self {
            id: row.id,
            auth_provider_id: row.auth_provider_id,
            email: row.email,
            age: row.age,
            gender: row.gender,
            interested_in: row.interested_in,
            min_age: row.min_age,
            max_age: row.max_age,
            bio: row.bio,
            looking_for: row.looking_for,
            interests: row.interests,
            embedding: row.embedding,
            account_status: row.account_status.parse::<AccountStatus>().map_err(anyhow::Error::msg)?,
            photo_status: row.photo_status.parse::<PhotoStatus>().map_err(anyhow::Error::msg)?,
            photo_resubmissions: row.photo_resubmissions,
            vacation_mode: row.vacation_mode,
            vacation_until: row.vacation_until,
            match_key: row.match_key,
            city: row.city,
            latitude: row.latitude,
            longitude: row.longitude,
            last_matched_at: row.last_matched_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = weekly_matches)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct MatchRow {
    id: Uuid,
    user_id: Uuid,
    match_user_id: Uuid,
    week_of: String,
    compatibility_score: i32,
    explanation: String,
    dimension_scores: Option<serde_json::Value>,
    red_flags: Vec<String>,
    conversation_starters: Option<Vec<String>>,
    venue_name: Option<String>,
    venue_address: Option<String>,
    venue_place_id: Option<String>,
    venue_description: Option<String>,
    venue_rating: Option<f32>,
    user_response: String,
    user_responded_at: Option<DateTime<Utc>>,
    match_response: String,
    match_responded_at: Option<DateTime<Utc>>,
    mutual_match: bool,
    status: String,
    date_scheduled: bool,
    scheduled_for: Option<DateTime<Utc>>,
    sent_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    last_notification_email_sent_at: Option<DateTime<Utc>>,
    contact_exchanged_at: Option<DateTime<Utc>>,
}

impl TryFrom<MatchRow> for WeeklyMatch {
    type Error = anyhow::Error;

    fn try_from(row: MatchRow) -> anyhow::Result<Self> {
        let venue = match (row.venue_name, row.venue_address, row.venue_place_id) {
            (Some(name), Some(address), Some(place_id)) => Some(VenueSuggestion {
                name,
                address,
                place_id,
                description: row.venue_description.unwrap_or_default(),
                rating: row.venue_rating,
            }),
            _ => None,
        };
        let dimension_scores = row
            .dimension_scores
            .map(serde_json::from_value)
            .transpose()?;

        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            match_user_id: row.match_user_id,
            week_of: row.week_of,
            compatibility_score: row.compatibility_score,
            explanation: row.explanation,
            dimension_scores,
            red_flags: row.red_flags,
            conversation_starters: ConversationStarters::from_stored(row.conversation_starters),
            venue,
            user_response: row.user_response.parse::<ResponseState>().map_err(anyhow::Error::msg)?,
            user_responded_at: row.user_responded_at,
            match_response: row.match_response.parse::<ResponseState>().map_err(anyhow::Error::msg)?,
            match_responded_at: row.match_responded_at,
            mutual_match: row.mutual_match,
            status: row.status.parse::<MatchStatus>().map_err(anyhow::Error::msg)?,
            date_scheduled: row.date_scheduled,
            scheduled_for: row.scheduled_for,
            sent_at: row.sent_at,
            expires_at: row.expires_at,
            last_notification_email_sent_at: row.last_notification_email_sent_at,
            contact_exchanged_at: row.contact_exchanged_at,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = weekly_matches)]
struct NewMatchRow {
    id: Uuid,
    user_id: Uuid,
    match_user_id: Uuid,
    week_of: String,
    compatibility_score: i32,
    explanation: String,
    dimension_scores: Option<serde_json::Value>,
    red_flags: Vec<String>,
    conversation_starters: Option<Vec<String>>,
    venue_name: Option<String>,
    venue_address: Option<String>,
    venue_place_id: Option<String>,
    venue_description: Option<String>,
    venue_rating: Option<f32>,
    sent_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl TryFrom<NewWeeklyMatch> for NewMatchRow {
    type Error = anyhow::Error;

    fn try_from(new: NewWeeklyMatch) -> anyhow::Result<Self> {
        let dimension_scores = new
            .dimension_scores
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;
        let starters = new.conversation_starters.to_stored();
        let venue = new.venue;
        Ok(Self {
            id: new.id,
            user_id: new.user_id,
            match_user_id: new.match_user_id,
            week_of: new.week_of,
            compatibility_score: new.compatibility_score,
            explanation: new.explanation,
            dimension_scores,
            red_flags: new.red_flags,
            conversation_starters: starters,
            venue_name: venue.as_ref().map(|v| v.name.clone()),
            venue_address: venue.as_ref().map(|v| v.address.clone()),
            venue_place_id: venue.as_ref().map(|v| v.place_id.clone()),
            venue_description: venue.as_ref().map(|v| v.description.clone()),
            venue_rating: venue.and_then(|v| v.rating),
            sent_at: new.sent_at,
            expires_at: new.expires_at,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = pass_reasons)]
struct NewPassReasonRow {
    id: Uuid,
    match_id: Uuid,
    user_id: Uuid,
    reason: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = date_outcomes)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct OutcomeRow {
    id: Uuid,
    match_id: Uuid,
    user_id: Uuid,
    date_happened: bool,
    rating: Option<i32>,
    would_meet_again: bool,
    notes: Option<String>,
    tags: Vec<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<OutcomeRow> for DateOutcome {
    type Error = anyhow::Error;

    fn try_from(row: OutcomeRow) -> anyhow::Result<Self> {
        let tags = row
            .tags
            .iter()
            .map(|t| t.parse().map_err(anyhow::Error::msg))
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Self {
            id: row.id,
            match_id: row.match_id,
            user_id: row.user_id,
            date_happened: row.date_happened,
            rating: row.rating,
            would_meet_again: row.would_meet_again,
            notes: row.notes,
            tags,
            created_at: row.created_at,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = date_outcomes)]
struct NewOutcomeRow {
    id: Uuid,
    match_id: Uuid,
    user_id: Uuid,
    date_happened: bool,
    rating: Option<i32>,
    would_meet_again: bool,
    notes: Option<String>,
    tags: Vec<String>,
}

fn to_profiles(rows: Vec<ProfileRow>) -> anyhow::Result<Vec<UserProfile>> {
    rows.into_iter().map(UserProfile::try_from).collect()
}

fn to_matches(rows: Vec<MatchRow>) -> anyhow::Result<Vec<WeeklyMatch>> {
    rows.into_iter().map(WeeklyMatch::try_from).collect()
}

/// Locks the profile row, applies `change`, and rewrites `match_key` from the
/// resulting photo status, vacation flag, and gender in the same transaction.
fn mutate_profile(
    conn: &mut PgConnection,
    id: Uuid,
    change: impl FnOnce(&mut PgConnection) -> QueryResult<usize>,
) -> anyhow::Result<Option<UserProfile>> {
    conn.transaction::<_, anyhow::Error, _>(|conn| {
        let locked: Option<Uuid> = profiles::table
            .find(id)
            .select(profiles::id)
            .for_update()
            .first(conn)
            .optional()?;
        if locked.is_none() {
            return Ok(None);
        }
        change(conn)?;

        let fresh = profiles::table
            .find(id)
            .select(ProfileRow::as_select())
            .first(conn)?;
        let photo_status = fresh.photo_status.parse::<PhotoStatus>().map_err(anyhow::Error::msg)?;
        let key = match_key(photo_status, fresh.vacation_mode, &fresh.gender);

        let row = diesel::update(profiles::table.find(id))
            .set((profiles::match_key.eq(key), profiles::updated_at.eq(Utc::now())))
            .returning(ProfileRow::as_returning())
            .get_result(conn)?;
        Ok(Some(UserProfile::try_from(row)?))
    })
}

#[async_trait]
impl ProfileStore for PgStore {
    async fn load_matchable_profiles(&self) -> anyhow::Result<Vec<UserProfile>> {
        self.run(|conn| {
            let rows = profiles::table
                .filter(profiles::match_key.like(format!("{LIVE_KEY_PREFIX}%")))
                .filter(profiles::account_status.eq(AccountStatus::Approved.as_str()))
                .select(ProfileRow::as_select())
                .load(conn)?;
            to_profiles(rows)
        })
        .await
    }

    async fn get_profile(&self, id: Uuid) -> anyhow::Result<Option<UserProfile>> {
        self.run(move |conn| {
            profiles::table
                .find(id)
                .select(ProfileRow::as_select())
                .first(conn)
                .optional()?
                .map(UserProfile::try_from)
                .transpose()
        })
        .await
    }

    async fn release_expired_vacations(&self, now: DateTime<Utc>) -> anyhow::Result<usize> {
        self.run(move |conn| {
            let due: Vec<Uuid> = profiles::table
                .filter(profiles::vacation_mode.eq(true))
                .filter(profiles::vacation_until.le(now))
                .select(profiles::id)
                .load(conn)?;
            for &id in &due {
                mutate_profile(conn, id, |conn| {
                    diesel::update(profiles::table.find(id))
                        .set((
                            profiles::vacation_mode.eq(false),
                            profiles::vacation_until.eq(None::<DateTime<Utc>>),
                        ))
                        .execute(conn)
                })?;
            }
            if !due.is_empty() {
                tracing::info!(count = due.len(), "vacations ended");
            }
            Ok(due.len())
        })
        .await
    }

    async fn set_photo_status(&self, id: Uuid, status: PhotoStatus) -> anyhow::Result<Option<UserProfile>> {
        self.run(move |conn| {
            mutate_profile(conn, id, |conn| {
                diesel::update(profiles::table.find(id))
                    .set(profiles::photo_status.eq(status.as_str()))
                    .execute(conn)
            })
        })
        .await
    }

    async fn set_vacation(
        &self,
        id: Uuid,
        on: bool,
        until: Option<DateTime<Utc>>,
    ) -> anyhow::Result<Option<UserProfile>> {
        let until = if on { until } else { None };
        self.run(move |conn| {
            mutate_profile(conn, id, |conn| {
                diesel::update(profiles::table.find(id))
                    .set((profiles::vacation_mode.eq(on), profiles::vacation_until.eq(until)))
                    .execute(conn)
            })
        })
        .await
    }

    async fn update_narrative(
        &self,
        id: Uuid,
        bio: &str,
        looking_for: &str,
        embedding: Vec<f32>,
    ) -> anyhow::Result<Option<UserProfile>> {
        let bio = bio.to_string();
        let looking_for = looking_for.to_string();
        self.run(move |conn| {
            mutate_profile(conn, id, |conn| {
                diesel::update(profiles::table.find(id))
                    .set((
                        profiles::bio.eq(bio),
                        profiles::looking_for.eq(looking_for),
                        profiles::embedding.eq(Some(embedding)),
                    ))
                    .execute(conn)
            })
        })
        .await
    }
}

#[async_trait]
impl MatchStore for PgStore {
    async fn matches_for_week(&self, week_of: &str) -> anyhow::Result<Vec<WeeklyMatch>> {
        let week_of = week_of.to_string();
        self.run(move |conn| {
            let rows = weekly_matches::table
                .filter(weekly_matches::week_of.eq(week_of))
                .select(MatchRow::as_select())
                .load(conn)?;
            to_matches(rows)
        })
        .await
    }

    async fn pairs_since(&self, week_of: &str) -> anyhow::Result<Vec<(Uuid, Uuid)>> {
        let week_of = week_of.to_string();
        self.run(move |conn| {
            // `YYYY-MM-DD` labels order the same as the dates they name.
            Ok(weekly_matches::table
                .filter(weekly_matches::week_of.ge(week_of))
                .select((weekly_matches::user_id, weekly_matches::match_user_id))
                .load(conn)?)
        })
        .await
    }

    async fn insert_match(&self, new: NewWeeklyMatch) -> anyhow::Result<WeeklyMatch> {
        let row = NewMatchRow::try_from(new)?;
        self.run(move |conn| {
            conn.transaction::<_, anyhow::Error, _>(|conn| {
                let inserted = diesel::insert_into(weekly_matches::table)
                    .values(&row)
                    .returning(MatchRow::as_returning())
                    .get_result(conn)?;
                diesel::update(
                    profiles::table.filter(profiles::id.eq_any([inserted.user_id, inserted.match_user_id])),
                )
                .set(profiles::last_matched_at.eq(inserted.sent_at))
                .execute(conn)?;
                WeeklyMatch::try_from(inserted)
            })
        })
        .await
    }

    async fn get_match(&self, id: Uuid) -> anyhow::Result<Option<WeeklyMatch>> {
        self.run(move |conn| {
            weekly_matches::table
                .find(id)
                .select(MatchRow::as_select())
                .first(conn)
                .optional()?
                .map(WeeklyMatch::try_from)
                .transpose()
        })
        .await
    }

    async fn match_for_user(&self, user_id: Uuid, week_of: &str) -> anyhow::Result<Option<WeeklyMatch>> {
        let week_of = week_of.to_string();
        self.run(move |conn| {
            weekly_matches::table
                .filter(weekly_matches::week_of.eq(week_of))
                .filter(
                    weekly_matches::user_id
                        .eq(user_id)
                        .or(weekly_matches::match_user_id.eq(user_id)),
                )
                .order(weekly_matches::sent_at.desc())
                .select(MatchRow::as_select())
                .first(conn)
                .optional()?
                .map(WeeklyMatch::try_from)
                .transpose()
        })
        .await
    }

    async fn record_response(
        &self,
        id: Uuid,
        side: Side,
        decision: Decision,
        at: DateTime<Utc>,
    ) -> anyhow::Result<Option<WeeklyMatch>> {
        let pending = ResponseState::Pending.as_str();
        let value = ResponseState::from(decision).as_str();
        self.run(move |conn| {
            let row = match side {
                Side::Initiator => diesel::update(
                    weekly_matches::table
                        .find(id)
                        .filter(weekly_matches::user_response.eq(pending)),
                )
                .set((
                    weekly_matches::user_response.eq(value),
                    weekly_matches::user_responded_at.eq(Some(at)),
                ))
                .returning(MatchRow::as_returning())
                .get_result(conn)
                .optional()?,
                Side::Recipient => diesel::update(
                    weekly_matches::table
                        .find(id)
                        .filter(weekly_matches::match_response.eq(pending)),
                )
                .set((
                    weekly_matches::match_response.eq(value),
                    weekly_matches::match_responded_at.eq(Some(at)),
                ))
                .returning(MatchRow::as_returning())
                .get_result(conn)
                .optional()?,
            };
            row.map(WeeklyMatch::try_from).transpose()
        })
        .await
    }

    async fn mark_mutual(&self, id: Uuid) -> anyhow::Result<bool> {
        let interested = ResponseState::Interested.as_str();
        self.run(move |conn| {
            let updated = diesel::update(
                weekly_matches::table
                    .find(id)
                    .filter(weekly_matches::mutual_match.eq(false))
                    .filter(weekly_matches::user_response.eq(interested))
                    .filter(weekly_matches::match_response.eq(interested)),
            )
            .set(weekly_matches::mutual_match.eq(true))
            .execute(conn)?;
            Ok(updated == 1)
        })
        .await
    }

    async fn expire_due(&self, now: DateTime<Utc>) -> anyhow::Result<usize> {
        self.run(move |conn| {
            Ok(diesel::update(
                weekly_matches::table
                    .filter(weekly_matches::status.eq(MatchStatus::Sent.as_str()))
                    .filter(weekly_matches::expires_at.lt(now)),
            )
            .set(weekly_matches::status.eq(MatchStatus::Expired.as_str()))
            .execute(conn)?)
        })
        .await
    }

    async fn mark_completed(&self, id: Uuid) -> anyhow::Result<bool> {
        let completed = MatchStatus::Completed.as_str();
        self.run(move |conn| {
            let updated = diesel::update(
                weekly_matches::table
                    .find(id)
                    .filter(weekly_matches::status.ne(completed)),
            )
            .set(weekly_matches::status.eq(completed))
            .execute(conn)?;
            Ok(updated == 1)
        })
        .await
    }

    async fn mark_contact_exchanged(&self, id: Uuid, at: DateTime<Utc>) -> anyhow::Result<bool> {
        self.run(move |conn| {
            let updated = diesel::update(
                weekly_matches::table
                    .find(id)
                    .filter(weekly_matches::contact_exchanged_at.is_null()),
            )
            .set(weekly_matches::contact_exchanged_at.eq(Some(at)))
            .execute(conn)?;
            Ok(updated == 1)
        })
        .await
    }

    async fn stamp_notification_email(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
        cutoff: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        self.run(move |conn| {
            let updated = diesel::update(
                weekly_matches::table.find(id).filter(
                    weekly_matches::last_notification_email_sent_at
                        .is_null()
                        .or(weekly_matches::last_notification_email_sent_at.le(cutoff)),
                ),
            )
            .set(weekly_matches::last_notification_email_sent_at.eq(Some(at)))
            .execute(conn)?;
            Ok(updated == 1)
        })
        .await
    }

    async fn append_pass_reason(
        &self,
        match_id: Uuid,
        user_id: Uuid,
        reason: PassReasonKind,
        at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let row = NewPassReasonRow {
            id: Uuid::now_v7(),
            match_id,
            user_id,
            reason: reason.to_string(),
            created_at: at,
        };
        self.run(move |conn| {
            diesel::insert_into(pass_reasons::table)
                .values(&row)
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn insert_outcome(&self, outcome: NewDateOutcome) -> anyhow::Result<Option<DateOutcome>> {
        let row = NewOutcomeRow {
            id: Uuid::now_v7(),
            match_id: outcome.match_id,
            user_id: outcome.user_id,
            date_happened: outcome.date_happened,
            rating: outcome.rating,
            would_meet_again: outcome.would_meet_again,
            notes: outcome.notes,
            tags: outcome.tags.iter().map(ToString::to_string).collect(),
        };
        self.run(move |conn| {
            diesel::insert_into(date_outcomes::table)
                .values(&row)
                .on_conflict((date_outcomes::match_id, date_outcomes::user_id))
                .do_nothing()
                .returning(OutcomeRow::as_returning())
                .get_result(conn)
                .optional()?
                .map(DateOutcome::try_from)
                .transpose()
        })
        .await
    }

    async fn outcomes_for_match(&self, match_id: Uuid) -> anyhow::Result<Vec<DateOutcome>> {
        self.run(move |conn| {
            date_outcomes::table
                .filter(date_outcomes::match_id.eq(match_id))
                .select(OutcomeRow::as_select())
                .load(conn)?
                .into_iter()
                .map(DateOutcome::try_from)
                .collect()
        })
        .await
    }

    async fn all_outcomes(&self) -> anyhow::Result<Vec<DateOutcome>> {
        self.run(|conn| {
            date_outcomes::table
                .select(OutcomeRow::as_select())
                .load(conn)?
                .into_iter()
                .map(DateOutcome::try_from)
                .collect()
        })
        .await
    }
}
