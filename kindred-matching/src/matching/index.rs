//! Profile embedding store, partitioned by `match_key`.

use std::collections::HashMap;
use std::ops::RangeInclusive;

use uuid::Uuid;

use crate::models::UserProfile;

pub const EMBEDDING_DIMENSIONS: usize = 1536;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub user_id: Uuid,
    pub similarity: f32,
}

/// Nearest-neighbour search scoped to one partition and an age range.
pub trait VectorSearch {
    /// Up to `limit` neighbours, most similar first.
    fn nearest(
        &self,
        query: &[f32],
        partition: &str,
        ages: RangeInclusive<i32>,
        limit: usize,
    ) -> Vec<Neighbor>;

    fn partitions(&self) -> Vec<&str>;
}

struct IndexEntry {
    user_id: Uuid,
    age: i32,
    embedding: Vec<f32>,
    norm: f32,
}

/// Exact cosine search over an in-memory snapshot of one run's population.
/// Weekly volume is small enough that a linear scan per partition is cheap.
#[derive(Default)]
pub struct PartitionedIndex {
    partitions: HashMap<String, Vec<IndexEntry>>,
}

impl PartitionedIndex {
    pub fn build<'a>(profiles: impl IntoIterator<Item = &'a UserProfile>) -> Self {
        let mut partitions: HashMap<String, Vec<IndexEntry>> = HashMap::new();
        for profile in profiles {
            let Some(embedding) = profile.embedding.as_ref() else {
                continue;
            };
            if embedding.len() != EMBEDDING_DIMENSIONS {
                tracing::warn!(user_id = %profile.id, dims = embedding.len(), "skipping embedding with wrong dimension");
                continue;
            }
            partitions
                .entry(profile.match_key.clone())
                .or_default()
                .push(IndexEntry {
                    user_id: profile.id,
                    age: profile.age,
                    norm: norm(embedding),
                    embedding: embedding.clone(),
                });
        }
        Self { partitions }
    }
}

impl VectorSearch for PartitionedIndex {
    fn nearest(
        &self,
        query: &[f32],
        partition: &str,
        ages: RangeInclusive<i32>,
        limit: usize,
    ) -> Vec<Neighbor> {
        let Some(entries) = self.partitions.get(partition) else {
            return Vec::new();
        };
        let query_norm = norm(query);

        let mut neighbors: Vec<Neighbor> = entries
            .iter()
            .filter(|e| ages.contains(&e.age))
            .map(|e| Neighbor {
                user_id: e.user_id,
                similarity: cosine(query, query_norm, &e.embedding, e.norm),
            })
            .collect();

        neighbors.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        neighbors.truncate(limit);
        neighbors
    }

    fn partitions(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.partitions.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}

fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

fn cosine(a: &[f32], a_norm: f32, b: &[f32], b_norm: f32) -> f32 {
    if a.len() != b.len() || a_norm == 0.0 || b_norm == 0.0 {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    dot / (a_norm * b_norm)
}
