//! Venue and conversation-starter generation for a new pair.
//!
//! Neither part is allowed to block match creation: a failed generation
//! degrades to `ConversationStarters::Unavailable` and no venue.

use std::sync::Arc;

use crate::clients::llm::ModelError;
use crate::matching::retry::{call_with_retries, RetryPolicy};
use crate::models::{ConversationStarters, UserProfile, VenueSuggestion};
use crate::ports::{ReasoningModel, VenueDirectory};

pub const STARTER_COUNT: usize = 3;

/// Words that mark a starter as being about looks.
const APPEARANCE_WORDS: &[&str] = &[
    "appearance", "attractive", "beautiful", "body", "cute", "eyes", "gorgeous", "handsome",
    "hair", "height", "hot", "looks", "outfit", "pretty", "sexy", "smile", "tall", "weight",
];

#[derive(Debug, Clone, PartialEq)]
pub struct TargetLocation {
    pub city: Option<String>,
    pub coordinates: Option<(f64, f64)>,
}

impl TargetLocation {
    /// Midpoint of both members when both shared coordinates, otherwise
    /// whichever coordinates exist, plus the initiator's city.
    pub fn between(a: &UserProfile, b: &UserProfile) -> Self {
        let coordinates = match (a.coordinates(), b.coordinates()) {
            (Some((lat_a, lon_a)), Some((lat_b, lon_b))) => {
                Some(((lat_a + lat_b) / 2.0, (lon_a + lon_b) / 2.0))
            }
            (one, other) => one.or(other),
        };
        Self {
            city: a.city.clone().or_else(|| b.city.clone()),
            coordinates,
        }
    }
}

const EARTH_RADIUS_KM: f64 = 6371.0;

pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

/// Exactly three non-empty starters, none of them about appearance.
pub fn validate_starters(raw: Vec<String>) -> Result<[String; STARTER_COUNT], String> {
    let starters: Vec<String> = raw.into_iter().map(|s| s.trim().to_string()).collect();
    if starters.iter().any(String::is_empty) {
        return Err("empty starter".into());
    }
    for starter in &starters {
        let lowered = starter.to_lowercase();
        let mentions_looks = lowered
            .split(|c: char| !c.is_alphanumeric())
            .any(|word| APPEARANCE_WORDS.contains(&word));
        if mentions_looks {
            return Err(format!("starter references appearance: {starter:?}"));
        }
    }
    let count = starters.len();
    <[String; STARTER_COUNT]>::try_from(starters)
        .map_err(|_| format!("expected {STARTER_COUNT} starters, got {count}"))
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatePlan {
    pub starters: ConversationStarters,
    pub venue: Option<VenueSuggestion>,
}

pub struct DatePlanner {
    model: Arc<dyn ReasoningModel>,
    venues: Arc<dyn VenueDirectory>,
    starters_model: String,
    policy: RetryPolicy,
}

impl DatePlanner {
    pub fn new(
        model: Arc<dyn ReasoningModel>,
        venues: Arc<dyn VenueDirectory>,
        starters_model: impl Into<String>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            model,
            venues,
            starters_model: starters_model.into(),
            policy,
        }
    }

    pub async fn plan(&self, a: &UserProfile, b: &UserProfile) -> DatePlan {
        let location = TargetLocation::between(a, b);
        let (starters, venue) = tokio::join!(self.starters(a, b), self.venue(&location));
        DatePlan { starters, venue }
    }

    async fn starters(&self, a: &UserProfile, b: &UserProfile) -> ConversationStarters {
        let result = call_with_retries(&self.policy, "starters", || async {
            let raw = self.model.starters(&self.starters_model, a, b).await?;
            validate_starters(raw).map_err(ModelError::Malformed)
        })
        .await;

        match result {
            Ok(items) => ConversationStarters::Ready(items),
            Err(err) => {
                tracing::warn!(user_id = %a.id, match_user_id = %b.id, error = %err, "conversation starters unavailable");
                metrics::counter!("kindred_matching_starters_unavailable_total").increment(1);
                ConversationStarters::Unavailable
            }
        }
    }

    async fn venue(&self, location: &TargetLocation) -> Option<VenueSuggestion> {
        match self.venues.suggest(location).await {
            Ok(venue) => venue,
            Err(e) => {
                tracing::warn!(error = %e, city = ?location.city, "venue lookup failed");
                None
            }
        }
    }
}
