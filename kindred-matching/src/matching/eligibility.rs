//! Who can be matched this week, and the partition key that scopes the search.

use std::collections::HashSet;

use uuid::Uuid;

use crate::matching::index::EMBEDDING_DIMENSIONS;
use crate::models::{AccountStatus, PhotoStatus, UserProfile};

/// `interested_in` values that accept every gender.
const OPEN_PREFERENCES: [&str; 3] = ["everyone", "any", "all"];

/// Composite partition key over photo status, vacation flag, and gender,
/// e.g. `approved:active:woman`. Stored on the profile and recomputed in the
/// same write as any of its inputs.
pub fn match_key(photo_status: PhotoStatus, vacation_mode: bool, gender: &str) -> String {
    let availability = if vacation_mode { "away" } else { "active" };
    format!("{photo_status}:{availability}:{}", normalize_gender(gender))
}

/// Key of the partition holding matchable users of `gender`.
pub fn live_key(gender: &str) -> String {
    match_key(PhotoStatus::Approved, false, gender)
}

/// Prefix shared by every matchable partition.
pub const LIVE_KEY_PREFIX: &str = "approved:active:";

pub fn normalize_gender(gender: &str) -> String {
    gender.trim().to_lowercase()
}

/// Whether someone who is `interested_in` would accept a person of `gender`.
pub fn accepts_gender(interested_in: &str, gender: &str) -> bool {
    let wanted = normalize_gender(interested_in);
    OPEN_PREFERENCES.contains(&wanted.as_str()) || wanted == normalize_gender(gender)
}

/// Profile-level eligibility, ignoring this week's assignments.
pub fn is_matchable(profile: &UserProfile) -> bool {
    profile.account_status == AccountStatus::Approved
        && profile.photo_status == PhotoStatus::Approved
        && !profile.vacation_mode
        && profile
            .embedding
            .as_ref()
            .is_some_and(|e| e.len() == EMBEDDING_DIMENSIONS)
}

/// Eligible users not yet matched in the current week, ordered by id so a run
/// is deterministic.
pub fn eligible_users<'a>(
    population: &'a [UserProfile],
    matched_this_week: &HashSet<Uuid>,
) -> Vec<&'a UserProfile> {
    let mut eligible: Vec<&UserProfile> = population
        .iter()
        .filter(|p| is_matchable(p) && !matched_this_week.contains(&p.id))
        .collect();
    eligible.sort_by_key(|p| p.id);
    eligible
}
