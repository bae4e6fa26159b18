//! OpenAI-compatible chat-completions client with schema-constrained output.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::matching::scorer::CompatibilityReport;
use crate::models::UserProfile;
use crate::ports::ReasoningModel;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    /// Rate limits, 5xx, timeouts, dropped connections. Worth retrying.
    #[error("transient provider error: {0}")]
    Transient(String),
    /// The response did not satisfy the requested schema.
    #[error("malformed model output: {0}")]
    Malformed(String),
    #[error("provider error: {0}")]
    Fatal(String),
}

impl ModelError {
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let detail = format!("{status}: {}", truncate(body, 300));
        if status == StatusCode::TOO_MANY_REQUESTS
            || status == StatusCode::REQUEST_TIMEOUT
            || status.is_server_error()
        {
            ModelError::Transient(detail)
        } else {
            ModelError::Fatal(detail)
        }
    }
}

impl From<reqwest::Error> for ModelError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            ModelError::Transient(err.to_string())
        } else if err.is_decode() {
            ModelError::Malformed(err.to_string())
        } else {
            ModelError::Fatal(err.to_string())
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[derive(Clone)]
pub struct LlmClient {
    pub(crate) http: reqwest::Client,
    pub(crate) base_url: String,
    pub(crate) api_key: String,
    pub(crate) embedding_model: String,
}

impl LlmClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        embedding_model: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            embedding_model: embedding_model.into(),
        }
    }

    pub(crate) async fn post_json(&self, path: &str, body: &Value) -> Result<Value, ModelError> {
        let response = self
            .http
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::from_status(status, &body));
        }
        Ok(response.json::<Value>().await?)
    }

    async fn complete_json<T: DeserializeOwned>(
        &self,
        model: &str,
        system: &str,
        user: String,
        schema_name: &str,
        schema: Value,
    ) -> Result<T, ModelError> {
        let body = json!({
            "model": model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": { "name": schema_name, "strict": true, "schema": schema },
            },
        });
        let raw = self.post_json("/chat/completions", &body).await?;
        parse_completion(raw)
    }
}

#[derive(Deserialize)]
struct Completion {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
    refusal: Option<String>,
}

fn parse_completion<T: DeserializeOwned>(raw: Value) -> Result<T, ModelError> {
    let completion: Completion = serde_json::from_value(raw)
        .map_err(|e| ModelError::Malformed(format!("unexpected completion shape: {e}")))?;
    let choice = completion
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ModelError::Malformed("no choices returned".into()))?;

    if let Some(refusal) = choice.message.refusal {
        return Err(ModelError::Malformed(format!("model refused: {refusal}")));
    }
    if choice.finish_reason.as_deref() == Some("length") {
        return Err(ModelError::Malformed("output truncated".into()));
    }
    let content = choice
        .message
        .content
        .ok_or_else(|| ModelError::Malformed("empty content".into()))?;
    serde_json::from_str(&content).map_err(|e| ModelError::Malformed(e.to_string()))
}

const SCORE_SYSTEM_PROMPT: &str = "You are a matchmaker for a curated dating service. \
Assess long-term compatibility of two members from their own words. \
Score 0-100 overall, split across values (max 25), lifestyle (max 25), interests (max 20), \
communication (max 20) and relationship vision (max 10). \
Write a warm multi-paragraph explanation addressed to both members. \
List concrete red flags only when the texts genuinely conflict.";

const STARTERS_SYSTEM_PROMPT: &str = "You write first-date conversation starters. \
Return exactly three open questions grounded in interests the two members share or that \
complement each other. Never mention looks, bodies or clothing, never raise anything either \
member lists as a dealbreaker, and avoid generic cliches.";

fn describe(profile: &UserProfile) -> String {
    format!(
        "Age: {}\nInterests: {}\n{}",
        profile.age,
        profile.interests.join(", "),
        profile.narrative()
    )
}

fn pair_prompt(a: &UserProfile, b: &UserProfile) -> String {
    format!("Member A\n{}\n\nMember B\n{}", describe(a), describe(b))
}

fn score_schema() -> Value {
    let dimension = |max: i32| json!({ "type": "integer", "minimum": 0, "maximum": max });
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["score", "explanation", "dimensionScores", "redFlags"],
        "properties": {
            "score": { "type": "integer", "minimum": 0, "maximum": 100 },
            "explanation": { "type": "string" },
            "dimensionScores": {
                "type": "object",
                "additionalProperties": false,
                "required": ["values", "lifestyle", "interests", "communication", "relationshipVision"],
                "properties": {
                    "values": dimension(25),
                    "lifestyle": dimension(25),
                    "interests": dimension(20),
                    "communication": dimension(20),
                    "relationshipVision": dimension(10),
                },
            },
            "redFlags": { "type": "array", "items": { "type": "string" } },
        },
    })
}

fn starters_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["starters"],
        "properties": {
            "starters": {
                "type": "array",
                "minItems": 3,
                "maxItems": 3,
                "items": { "type": "string" },
            },
        },
    })
}

#[derive(Deserialize)]
struct StartersPayload {
    starters: Vec<String>,
}

#[async_trait]
impl ReasoningModel for LlmClient {
    async fn score(
        &self,
        model: &str,
        a: &UserProfile,
        b: &UserProfile,
    ) -> Result<CompatibilityReport, ModelError> {
        let report: CompatibilityReport = self
            .complete_json(model, SCORE_SYSTEM_PROMPT, pair_prompt(a, b), "compatibility_report", score_schema())
            .await?;
        report.validate().map_err(ModelError::Malformed)?;
        Ok(report)
    }

    async fn starters(
        &self,
        model: &str,
        a: &UserProfile,
        b: &UserProfile,
    ) -> Result<Vec<String>, ModelError> {
        let payload: StartersPayload = self
            .complete_json(model, STARTERS_SYSTEM_PROMPT, pair_prompt(a, b), "conversation_starters", starters_schema())
            .await?;
        Ok(payload.starters)
    }
}
