//! Picks one partner for one user.
//!
//! Hard filters: mutual orientation, mutual age range, nobody already matched
//! this week, no repeat of a recent pairing. Among the survivors the highest
//! cosine similarity wins; ties go to whoever has waited longest since their
//! last match, then to the lower user id.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::error::{MatchingError, MatchingResult};
use crate::matching::eligibility::{accepts_gender, LIVE_KEY_PREFIX};
use crate::matching::index::VectorSearch;
use crate::models::UserProfile;

/// Unordered pairs that were matched inside the lookback window.
#[derive(Debug, Default, Clone)]
pub struct RecentPairs(HashSet<(Uuid, Uuid)>);

fn pair_key(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a < b { (a, b) } else { (b, a) }
}

impl RecentPairs {
    pub fn from_pairs(pairs: impl IntoIterator<Item = (Uuid, Uuid)>) -> Self {
        Self(pairs.into_iter().map(|(a, b)| pair_key(a, b)).collect())
    }

    pub fn contains(&self, a: Uuid, b: Uuid) -> bool {
        self.0.contains(&pair_key(a, b))
    }

    pub fn insert(&mut self, a: Uuid, b: Uuid) {
        self.0.insert(pair_key(a, b));
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub user_id: Uuid,
    pub similarity: f32,
}

pub struct CandidateSelector<'a, V: VectorSearch> {
    index: &'a V,
    profiles: &'a HashMap<Uuid, &'a UserProfile>,
}

impl<'a, V: VectorSearch> CandidateSelector<'a, V> {
    pub fn new(index: &'a V, profiles: &'a HashMap<Uuid, &'a UserProfile>) -> Self {
        Self { index, profiles }
    }

    pub fn select(
        &self,
        user: &UserProfile,
        matched: &HashSet<Uuid>,
        recent: &RecentPairs,
    ) -> MatchingResult<Candidate> {
        let query = user
            .embedding
            .as_deref()
            .ok_or(MatchingError::NoEligibleCandidate)?;

        let mut survivors: Vec<(Candidate, &UserProfile)> = Vec::new();
        for partition in self.target_partitions(user) {
            let neighbors = self.index.nearest(
                query,
                partition,
                user.min_age..=user.max_age,
                usize::MAX,
            );
            for neighbor in neighbors {
                let Some(other) = self.profiles.get(&neighbor.user_id).copied() else {
                    continue;
                };
                if other.id == user.id
                    || matched.contains(&other.id)
                    || !accepts_gender(&other.interested_in, &user.gender)
                    || !other.accepts_age(user.age)
                    || recent.contains(user.id, other.id)
                {
                    continue;
                }
                survivors.push((
                    Candidate {
                        user_id: other.id,
                        similarity: neighbor.similarity,
                    },
                    other,
                ));
            }
        }

        survivors
            .into_iter()
            .min_by(|(a, pa), (b, pb)| rank(a, pa, b, pb))
            .map(|(candidate, _)| candidate)
            .ok_or(MatchingError::NoEligibleCandidate)
    }

    /// Live partitions whose gender the user is interested in.
    fn target_partitions(&self, user: &UserProfile) -> Vec<&'a str> {
        self.index
            .partitions()
            .into_iter()
            .filter(|key| {
                key.strip_prefix(LIVE_KEY_PREFIX)
                    .is_some_and(|gender| accepts_gender(&user.interested_in, gender))
            })
            .collect()
    }
}

/// `Less` means "better candidate".
fn rank(a: &Candidate, pa: &UserProfile, b: &Candidate, pb: &UserProfile) -> Ordering {
    b.similarity
        .total_cmp(&a.similarity)
        // `None` (never matched) sorts first, then the oldest last match.
        .then_with(|| pa.last_matched_at.cmp(&pb.last_matched_at))
        .then_with(|| pa.id.cmp(&pb.id))
}
