use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::matching::scorer::DimensionScores;

/// Closed string-backed enum: serde, `Display`, and `FromStr` all use the same
/// snake_case spelling that is stored in the VARCHAR columns.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(format!("unknown {} value: {s}", stringify!($name))),
                }
            }
        }
    };
}

text_enum!(AccountStatus {
    Pending => "pending",
    Waitlisted => "waitlisted",
    Approved => "approved",
    Rejected => "rejected",
});

text_enum!(PhotoStatus {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
});

text_enum!(
    /// One side's answer to a weekly match.
    ResponseState {
        Pending => "pending",
        Interested => "interested",
        Passed => "passed",
    }
);

text_enum!(
    /// What a participant may submit. `pending` is only ever the initial state.
    Decision {
        Interested => "interested",
        Passed => "passed",
    }
);

text_enum!(
    /// Record lifecycle stage, orthogonal to `mutual_match`.
    MatchStatus {
        Sent => "sent",
        Expired => "expired",
        Completed => "completed",
    }
);

text_enum!(PassReasonKind {
    NotMyType => "not_my_type",
    DifferentGoals => "different_goals",
    Distance => "distance",
    AgeGap => "age_gap",
    NoChemistry => "no_chemistry",
    SeeingSomeone => "seeing_someone",
    Other => "other",
});

text_enum!(OutcomeTag {
    GreatConversation => "great_conversation",
    SharedValues => "shared_values",
    PhysicalChemistry => "physical_chemistry",
    Awkward => "awkward",
    NoShow => "no_show",
    Late => "late",
    FeltUnsafe => "felt_unsafe",
    DifferentThanProfile => "different_than_profile",
});

impl From<Decision> for ResponseState {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Interested => ResponseState::Interested,
            Decision::Passed => ResponseState::Passed,
        }
    }
}

// --- UserProfile ---

#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub auth_provider_id: String,
    pub email: String,
    pub age: i32,
    pub gender: String,
    pub interested_in: String,
    pub min_age: i32,
    pub max_age: i32,
    pub bio: String,
    pub looking_for: String,
    pub interests: Vec<String>,
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
    pub account_status: AccountStatus,
    pub photo_status: PhotoStatus,
    pub photo_resubmissions: i32,
    pub vacation_mode: bool,
    pub vacation_until: Option<DateTime<Utc>>,
    pub match_key: String,
    pub city: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub last_matched_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    /// Text the embedding and the reasoning model both work from.
    pub fn narrative(&self) -> String {
        narrative_text(&self.bio, &self.looking_for)
    }

    pub fn accepts_age(&self, age: i32) -> bool {
        (self.min_age..=self.max_age).contains(&age)
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.latitude.zip(self.longitude)
    }
}

pub fn narrative_text(bio: &str, looking_for: &str) -> String {
    format!("{}\n\nLooking for: {}", bio.trim(), looking_for.trim())
}

// --- WeeklyMatch ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// `user_id` column.
    Initiator,
    /// `match_user_id` column.
    Recipient,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueSuggestion {
    pub name: String,
    pub address: String,
    pub place_id: String,
    pub description: String,
    pub rating: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "items", rename_all = "snake_case")]
pub enum ConversationStarters {
    Ready([String; 3]),
    Unavailable,
}

impl ConversationStarters {
    pub fn from_stored(stored: Option<Vec<String>>) -> Self {
        match stored.map(<[String; 3]>::try_from) {
            Some(Ok(items)) => Self::Ready(items),
            _ => Self::Unavailable,
        }
    }

    pub fn to_stored(&self) -> Option<Vec<String>> {
        match self {
            Self::Ready(items) => Some(items.to_vec()),
            Self::Unavailable => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WeeklyMatch {
    pub id: Uuid,
    pub user_id: Uuid,
    pub match_user_id: Uuid,
    pub week_of: String,
    pub compatibility_score: i32,
    pub explanation: String,
    pub dimension_scores: Option<DimensionScores>,
    pub red_flags: Vec<String>,
    pub conversation_starters: ConversationStarters,
    pub venue: Option<VenueSuggestion>,
    pub user_response: ResponseState,
    pub user_responded_at: Option<DateTime<Utc>>,
    pub match_response: ResponseState,
    pub match_responded_at: Option<DateTime<Utc>>,
    pub mutual_match: bool,
    pub status: MatchStatus,
    pub date_scheduled: bool,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub sent_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_notification_email_sent_at: Option<DateTime<Utc>>,
    pub contact_exchanged_at: Option<DateTime<Utc>>,
}

impl WeeklyMatch {
    pub fn side_of(&self, user_id: Uuid) -> Option<Side> {
        if user_id == self.user_id {
            Some(Side::Initiator)
        } else if user_id == self.match_user_id {
            Some(Side::Recipient)
        } else {
            None
        }
    }

    pub fn partner_of(&self, user_id: Uuid) -> Option<Uuid> {
        match self.side_of(user_id)? {
            Side::Initiator => Some(self.match_user_id),
            Side::Recipient => Some(self.user_id),
        }
    }

    pub fn response_of(&self, side: Side) -> ResponseState {
        match side {
            Side::Initiator => self.user_response,
            Side::Recipient => self.match_response,
        }
    }

    pub fn participants(&self) -> [Uuid; 2] {
        [self.user_id, self.match_user_id]
    }

    pub fn both_interested(&self) -> bool {
        self.user_response == ResponseState::Interested
            && self.match_response == ResponseState::Interested
    }

    /// The response window is closed once the sweep ran or `expires_at` passed,
    /// whichever comes first.
    pub fn window_closed(&self, now: DateTime<Utc>) -> bool {
        self.status == MatchStatus::Expired || now > self.expires_at
    }

    /// What `viewer` is allowed to see. Starters stay hidden until both sides
    /// said yes.
    pub fn view_for(&self, viewer: Uuid) -> Option<MatchView> {
        let side = self.side_of(viewer)?;
        let (mine, theirs) = match side {
            Side::Initiator => (self.user_response, self.match_response),
            Side::Recipient => (self.match_response, self.user_response),
        };
        Some(MatchView {
            id: self.id,
            partner_id: self.partner_of(viewer)?,
            week_of: self.week_of.clone(),
            compatibility_score: self.compatibility_score,
            explanation: self.explanation.clone(),
            dimension_scores: self.dimension_scores.clone(),
            venue: self.venue.clone(),
            my_response: mine,
            partner_responded: theirs != ResponseState::Pending,
            mutual_match: self.mutual_match,
            conversation_starters: self
                .mutual_match
                .then(|| self.conversation_starters.clone()),
            status: self.status,
            expires_at: self.expires_at,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchView {
    pub id: Uuid,
    pub partner_id: Uuid,
    pub week_of: String,
    pub compatibility_score: i32,
    pub explanation: String,
    pub dimension_scores: Option<DimensionScores>,
    pub venue: Option<VenueSuggestion>,
    pub my_response: ResponseState,
    pub partner_responded: bool,
    pub mutual_match: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_starters: Option<ConversationStarters>,
    pub status: MatchStatus,
    pub expires_at: DateTime<Utc>,
}

/// Everything the orchestrator decided for one pair; the store assigns nothing
/// but persistence.
#[derive(Debug, Clone)]
pub struct NewWeeklyMatch {
    pub id: Uuid,
    pub user_id: Uuid,
    pub match_user_id: Uuid,
    pub week_of: String,
    pub compatibility_score: i32,
    pub explanation: String,
    pub dimension_scores: Option<DimensionScores>,
    pub red_flags: Vec<String>,
    pub conversation_starters: ConversationStarters,
    pub venue: Option<VenueSuggestion>,
    pub sent_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

// --- PassReason / DateOutcome ---

#[derive(Debug, Clone, Serialize)]
pub struct PassReason {
    pub id: Uuid,
    pub match_id: Uuid,
    pub user_id: Uuid,
    pub reason: PassReasonKind,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DateOutcome {
    pub id: Uuid,
    pub match_id: Uuid,
    pub user_id: Uuid,
    pub date_happened: bool,
    pub rating: Option<i32>,
    pub would_meet_again: bool,
    pub notes: Option<String>,
    pub tags: Vec<OutcomeTag>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDateOutcome {
    pub match_id: Uuid,
    pub user_id: Uuid,
    pub date_happened: bool,
    pub rating: Option<i32>,
    pub would_meet_again: bool,
    pub notes: Option<String>,
    pub tags: Vec<OutcomeTag>,
}
