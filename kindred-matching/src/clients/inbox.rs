use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use crate::ports::ChatInbox;

/// Asks the messaging service whether `recipient` still has unread messages
/// in the chat attached to a match.
pub struct HttpChatInbox {
    http: reqwest::Client,
    base_url: String,
}

impl HttpChatInbox {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Deserialize)]
struct UnreadResponse {
    unread_count: u64,
}

#[async_trait]
impl ChatInbox for HttpChatInbox {
    async fn has_unread(&self, match_id: Uuid, recipient: Uuid) -> anyhow::Result<bool> {
        let url = format!(
            "{}/internal/matches/{match_id}/unread/{recipient}",
            self.base_url
        );
        let response = self.http.get(&url).send().await?.error_for_status()?;
        let body: UnreadResponse = response.json().await?;
        Ok(body.unread_count > 0)
    }
}
