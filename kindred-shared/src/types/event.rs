use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// RabbitMQ Event envelope wrapping all domain events.
///
/// Routing key format: `kindred.{domain}.{entity}.{action}`
/// Example: `kindred.matching.match.mutual`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event<T: Serialize> {
    pub id: Uuid,
    pub source: String,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub data: T,
}

impl<T: Serialize> Event<T> {
    pub fn new(source: impl Into<String>, event_type: impl Into<String>, data: T) -> Self {
        Self {
            id: Uuid::now_v7(),
            source: source.into(),
            event_type: event_type.into(),
            timestamp: Utc::now(),
            correlation_id: None,
            user_id: None,
            data,
        }
    }

    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_correlation(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }
}

/// RabbitMQ routing keys
pub mod routing_keys {
    pub const MATCHING_WEEKLY_MATCH_SENT: &str = "kindred.matching.weekly_match.sent";
    pub const MATCHING_MATCH_MUTUAL: &str = "kindred.matching.match.mutual";
    pub const MATCHING_SECOND_DATE_CONTACT: &str = "kindred.matching.second_date.contact_exchange";
    pub const MATCHING_MESSAGE_UNREAD_EMAIL: &str = "kindred.matching.message.unread_email";
}

/// Event data payloads. Each notice is addressed to a single recipient; a pair
/// produces two events.
pub mod payloads {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct WeeklyMatchSent {
        pub match_id: Uuid,
        pub recipient_id: Uuid,
        pub partner_id: Uuid,
        pub week_of: String,
        pub compatibility_score: i32,
        pub expires_at: DateTime<Utc>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct MutualMatch {
        pub match_id: Uuid,
        pub recipient_id: Uuid,
        pub partner_id: Uuid,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct SecondDateContactExchange {
        pub match_id: Uuid,
        pub recipient_id: Uuid,
        pub partner_id: Uuid,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct UnreadMessageEmail {
        pub match_id: Uuid,
        pub recipient_id: Uuid,
        pub partner_id: Uuid,
    }
}
