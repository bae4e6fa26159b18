//! Profile mutations owned by matching: every write keeps `match_key` current,
//! and narrative edits regenerate the embedding.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::clients::llm::ModelError;
use crate::error::{MatchingError, MatchingResult};
use crate::matching::retry::{call_with_retries, RetryPolicy};
use crate::models::{narrative_text, PhotoStatus, UserProfile};
use crate::ports::{Embedder, ProfileStore};

pub const BIO_WORDS: (usize, usize) = (50, 300);
pub const LOOKING_FOR_WORDS: (usize, usize) = (20, 100);

pub struct ProfileService {
    store: Arc<dyn ProfileStore>,
    embedder: Arc<dyn Embedder>,
    policy: RetryPolicy,
}

fn check_words(field: &str, text: &str, (min, max): (usize, usize)) -> MatchingResult<()> {
    let words = text.split_whitespace().count();
    if words < min || words > max {
        return Err(MatchingError::Validation(format!(
            "{field} must be {min}-{max} words, got {words}"
        )));
    }
    Ok(())
}

impl ProfileService {
    pub fn new(store: Arc<dyn ProfileStore>, embedder: Arc<dyn Embedder>, policy: RetryPolicy) -> Self {
        Self {
            store,
            embedder,
            policy,
        }
    }

    pub async fn update_narrative(
        &self,
        user_id: Uuid,
        bio: &str,
        looking_for: &str,
    ) -> MatchingResult<UserProfile> {
        check_words("bio", bio, BIO_WORDS)?;
        check_words("looking_for", looking_for, LOOKING_FOR_WORDS)?;

        let text = narrative_text(bio, looking_for);
        let embedding = call_with_retries(&self.policy, "embed", || self.embedder.embed(&text))
            .await
            .map_err(|err| match err {
                ModelError::Transient(reason) => MatchingError::ProviderTransient(reason),
                ModelError::Malformed(reason) | ModelError::Fatal(reason) => MatchingError::Provider(reason),
            })?;

        let updated = self
            .store
            .update_narrative(user_id, bio.trim(), looking_for.trim(), embedding)
            .await?
            .ok_or(MatchingError::ProfileNotFound)?;
        tracing::info!(%user_id, "profile narrative updated, embedding regenerated");
        Ok(updated)
    }

    pub async fn set_vacation(
        &self,
        user_id: Uuid,
        on: bool,
        until: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> MatchingResult<UserProfile> {
        if on && until.is_some_and(|u| u <= now) {
            return Err(MatchingError::Validation("vacation end must be in the future".into()));
        }
        let updated = self
            .store
            .set_vacation(user_id, on, until)
            .await?
            .ok_or(MatchingError::ProfileNotFound)?;
        tracing::info!(%user_id, vacation = on, match_key = %updated.match_key, "vacation mode changed");
        Ok(updated)
    }

    pub async fn set_photo_status(&self, user_id: Uuid, status: PhotoStatus) -> MatchingResult<UserProfile> {
        let updated = self
            .store
            .set_photo_status(user_id, status)
            .await?
            .ok_or(MatchingError::ProfileNotFound)?;
        tracing::info!(%user_id, %status, match_key = %updated.match_key, "photo status changed");
        Ok(updated)
    }
}
