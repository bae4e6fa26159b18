use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::clients::llm::{LlmClient, ModelError};
use crate::matching::index::EMBEDDING_DIMENSIONS;
use crate::ports::Embedder;

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
}

fn first_embedding(raw: serde_json::Value) -> Result<Vec<f32>, ModelError> {
    let parsed: EmbeddingResponse =
        serde_json::from_value(raw).map_err(|e| ModelError::Malformed(e.to_string()))?;
    let embedding = parsed
        .data
        .into_iter()
        .next()
        .map(|item| item.embedding)
        .ok_or_else(|| ModelError::Malformed("no embedding returned".into()))?;
    if embedding.len() != EMBEDDING_DIMENSIONS {
        return Err(ModelError::Malformed(format!(
            "expected {EMBEDDING_DIMENSIONS} dimensions, got {}",
            embedding.len()
        )));
    }
    Ok(embedding)
}

#[async_trait]
impl Embedder for LlmClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        let body = json!({
            "model": self.embedding_model,
            "input": text,
            "dimensions": EMBEDDING_DIMENSIONS,
        });
        let raw = self.post_json("/embeddings", &body).await?;
        first_embedding(raw)
    }
}
