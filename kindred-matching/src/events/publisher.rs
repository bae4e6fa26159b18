use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use kindred_shared::clients::rabbitmq::RabbitMQClient;
use kindred_shared::types::event::{payloads, routing_keys, Event};

use crate::models::WeeklyMatch;
use crate::ports::Notifier;

const SOURCE: &str = "kindred-matching";

/// Publishes one event per recipient; the notification service turns those
/// into email and push.
pub struct EventNotifier {
    rabbitmq: RabbitMQClient,
}

impl EventNotifier {
    pub fn new(rabbitmq: RabbitMQClient) -> Self {
        Self { rabbitmq }
    }

    async fn publish<T: Serialize + Send + Sync>(
        &self,
        routing_key: &'static str,
        m: &WeeklyMatch,
        recipient: Uuid,
        data: T,
    ) {
        let event = Event::new(SOURCE, routing_key, data)
            .with_user(recipient)
            .with_correlation(m.id);

        if let Err(e) = self.rabbitmq.publish(routing_key, &event).await {
            tracing::error!(error = %e, match_id = %m.id, %recipient, routing_key, "failed to publish event");
        }
    }
}

fn partner(m: &WeeklyMatch, recipient: Uuid) -> Uuid {
    m.partner_of(recipient).unwrap_or(recipient)
}

#[async_trait]
impl Notifier for EventNotifier {
    async fn weekly_match_ready(&self, m: &WeeklyMatch, recipient: Uuid) {
        let data = payloads::WeeklyMatchSent {
            match_id: m.id,
            recipient_id: recipient,
            partner_id: partner(m, recipient),
            week_of: m.week_of.clone(),
            compatibility_score: m.compatibility_score,
            expires_at: m.expires_at,
        };
        self.publish(routing_keys::MATCHING_WEEKLY_MATCH_SENT, m, recipient, data)
            .await;
    }

    async fn mutual_match(&self, m: &WeeklyMatch, recipient: Uuid) {
        let data = payloads::MutualMatch {
            match_id: m.id,
            recipient_id: recipient,
            partner_id: partner(m, recipient),
        };
        self.publish(routing_keys::MATCHING_MATCH_MUTUAL, m, recipient, data)
            .await;
    }

    async fn second_date_contact(&self, m: &WeeklyMatch, recipient: Uuid) {
        let data = payloads::SecondDateContactExchange {
            match_id: m.id,
            recipient_id: recipient,
            partner_id: partner(m, recipient),
        };
        self.publish(routing_keys::MATCHING_SECOND_DATE_CONTACT, m, recipient, data)
            .await;
    }

    async fn unread_message_email(&self, m: &WeeklyMatch, recipient: Uuid) {
        let data = payloads::UnreadMessageEmail {
            match_id: m.id,
            recipient_id: recipient,
            partner_id: partner(m, recipient),
        };
        self.publish(routing_keys::MATCHING_MESSAGE_UNREAD_EMAIL, m, recipient, data)
            .await;
    }
}
