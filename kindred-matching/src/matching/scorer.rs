//! Compatibility scoring through the reasoning model.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::clients::llm::ModelError;
use crate::error::{MatchingError, MatchingResult};
use crate::matching::retry::{call_with_retries, RetryPolicy};
use crate::models::UserProfile;
use crate::ports::ReasoningModel;

pub const MAX_VALUES: i32 = 25;
pub const MAX_LIFESTYLE: i32 = 25;
pub const MAX_INTERESTS: i32 = 20;
pub const MAX_COMMUNICATION: i32 = 20;
pub const MAX_RELATIONSHIP_VISION: i32 = 10;

const MIN_EXPLANATION_CHARS: usize = 40;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DimensionScores {
    pub values: i32,
    pub lifestyle: i32,
    pub interests: i32,
    pub communication: i32,
    pub relationship_vision: i32,
}

impl DimensionScores {
    fn validate(&self) -> Result<(), String> {
        let checks = [
            ("values", self.values, MAX_VALUES),
            ("lifestyle", self.lifestyle, MAX_LIFESTYLE),
            ("interests", self.interests, MAX_INTERESTS),
            ("communication", self.communication, MAX_COMMUNICATION),
            ("relationshipVision", self.relationship_vision, MAX_RELATIONSHIP_VISION),
        ];
        for (name, value, max) in checks {
            if !(0..=max).contains(&value) {
                return Err(format!("{name} score {value} outside 0..={max}"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompatibilityReport {
    pub score: i32,
    pub explanation: String,
    #[serde(default)]
    pub dimension_scores: Option<DimensionScores>,
    #[serde(default)]
    pub red_flags: Vec<String>,
}

impl CompatibilityReport {
    /// Rejects anything that must never be persisted.
    pub fn validate(&self) -> Result<(), String> {
        if !(0..=100).contains(&self.score) {
            return Err(format!("score {} outside 0..=100", self.score));
        }
        if self.explanation.trim().chars().count() < MIN_EXPLANATION_CHARS {
            return Err("explanation too short".into());
        }
        if let Some(dimensions) = &self.dimension_scores {
            dimensions.validate()?;
        }
        Ok(())
    }
}

pub struct CompatibilityScorer {
    model: Arc<dyn ReasoningModel>,
    primary_model: String,
    fallback_model: String,
    policy: RetryPolicy,
}

impl CompatibilityScorer {
    pub fn new(
        model: Arc<dyn ReasoningModel>,
        primary_model: impl Into<String>,
        fallback_model: impl Into<String>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            model,
            primary_model: primary_model.into(),
            fallback_model: fallback_model.into(),
            policy,
        }
    }

    /// Primary model with the full retry policy; once transient retries are
    /// exhausted the fallback model gets a single attempt.
    pub async fn score(&self, a: &UserProfile, b: &UserProfile) -> MatchingResult<CompatibilityReport> {
        let primary = self.attempt(&self.primary_model, &self.policy, a, b).await;
        let result = match primary {
            Err(ModelError::Transient(reason)) => {
                tracing::warn!(
                    model = %self.fallback_model,
                    %reason,
                    "primary model exhausted, trying fallback"
                );
                metrics::counter!("kindred_matching_scorer_fallbacks_total").increment(1);
                self.attempt(&self.fallback_model, &self.policy.single_attempt(), a, b)
                    .await
            }
            other => other,
        };

        result.map_err(|err| match err {
            ModelError::Malformed(reason) => MatchingError::MalformedScoreResponse(reason),
            ModelError::Transient(reason) => MatchingError::ProviderTransient(reason),
            ModelError::Fatal(reason) => MatchingError::Provider(reason),
        })
    }

    async fn attempt(
        &self,
        model: &str,
        policy: &RetryPolicy,
        a: &UserProfile,
        b: &UserProfile,
    ) -> Result<CompatibilityReport, ModelError> {
        call_with_retries(policy, "score", || async {
            let report = self.model.score(model, a, b).await?;
            report.validate().map_err(ModelError::Malformed)?;
            Ok(report)
        })
        .await
    }
}
