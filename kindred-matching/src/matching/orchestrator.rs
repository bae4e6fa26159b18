//! One weekly matching run.
//!
//! Users are visited in id order. Every created pair is added to the
//! run-local `matched` set before the next user is considered, so a run can
//! never book anyone twice. A run for a week that already has matches picks
//! up where the earlier run stopped.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{MatchingError, MatchingResult};
use crate::matching::date_plan::DatePlanner;
use crate::matching::eligibility::eligible_users;
use crate::matching::index::PartitionedIndex;
use crate::matching::retry::RetryPolicy;
use crate::matching::scorer::CompatibilityScorer;
use crate::matching::selector::{CandidateSelector, RecentPairs};
use crate::models::{NewWeeklyMatch, UserProfile, WeeklyMatch};
use crate::ports::{MatchStore, Notifier, ProfileStore};
use crate::week::MatchWeek;

#[derive(Debug, Clone)]
pub struct RunSettings {
    pub tz: Tz,
    pub repeat_lookback_weeks: u32,
    pub pair_timeout: Duration,
}

impl RunSettings {
    /// The pair deadline is never shorter than the model calls it wraps: the
    /// primary exhausting its retries, the fallback's single attempt, and
    /// starter generation.
    pub fn from_config(config: &AppConfig, policy: &RetryPolicy) -> anyhow::Result<Self> {
        let floor = pair_budget(policy);
        let configured = config.pair_timeout();
        if configured < floor {
            tracing::warn!(
                configured_secs = configured.as_secs(),
                floor_secs = floor.as_secs(),
                "pair timeout shorter than the retry policy allows, raising it"
            );
        }
        Ok(Self {
            tz: config.tz()?,
            repeat_lookback_weeks: config.repeat_lookback_weeks,
            pair_timeout: configured.max(floor),
        })
    }
}

fn pair_budget(policy: &RetryPolicy) -> Duration {
    let scoring = policy.exhaustion_time() + policy.single_attempt().exhaustion_time();
    scoring + policy.exhaustion_time()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub week_of: String,
    /// Matchable users in the population at run time.
    pub eligible: usize,
    /// Pairs created by this run.
    pub matched: usize,
    pub skipped_no_candidate: usize,
    pub skipped_error: usize,
    /// Users that already had a match for this week when the run started.
    pub already_matched: usize,
    pub vacations_released: usize,
}

pub struct WeeklyMatcher {
    profiles: Arc<dyn ProfileStore>,
    matches: Arc<dyn MatchStore>,
    scorer: CompatibilityScorer,
    planner: DatePlanner,
    notifier: Arc<dyn Notifier>,
    settings: RunSettings,
}

impl WeeklyMatcher {
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        matches: Arc<dyn MatchStore>,
        scorer: CompatibilityScorer,
        planner: DatePlanner,
        notifier: Arc<dyn Notifier>,
        settings: RunSettings,
    ) -> Self {
        Self {
            profiles,
            matches,
            scorer,
            planner,
            notifier,
            settings,
        }
    }

    pub fn week_at(&self, now: DateTime<Utc>) -> MatchWeek {
        MatchWeek::containing(now, self.settings.tz)
    }

    /// Only failures to load the population abort the run; per-pair failures,
    /// including a failed insert, are counted and skipped.
    pub async fn run(&self, now: DateTime<Utc>) -> MatchingResult<RunSummary> {
        let week = self.week_at(now);
        let week_of = week.label();
        let mut summary = RunSummary {
            week_of: week_of.clone(),
            ..RunSummary::default()
        };

        summary.vacations_released = self.profiles.release_expired_vacations(now).await?;
        let population = self.profiles.load_matchable_profiles().await?;

        let mut matched: HashSet<Uuid> = self
            .matches
            .matches_for_week(&week_of)
            .await?
            .iter()
            .flat_map(WeeklyMatch::participants)
            .collect();

        let lookback = week.weeks_back(self.settings.repeat_lookback_weeks).label();
        let mut recent = RecentPairs::from_pairs(self.matches.pairs_since(&lookback).await?);

        let eligible = eligible_users(&population, &HashSet::new());
        summary.eligible = eligible.len();
        summary.already_matched = eligible.iter().filter(|p| matched.contains(&p.id)).count();

        let index = PartitionedIndex::build(eligible.iter().copied());
        let by_id: HashMap<Uuid, &UserProfile> = eligible.iter().map(|p| (p.id, *p)).collect();
        let selector = CandidateSelector::new(&index, &by_id);

        tracing::info!(
            %week_of,
            eligible = summary.eligible,
            already_matched = summary.already_matched,
            "weekly matching run started"
        );

        for user in &eligible {
            if matched.contains(&user.id) {
                continue;
            }

            let candidate = match selector.select(user, &matched, &recent) {
                Ok(candidate) => candidate,
                Err(MatchingError::NoEligibleCandidate) => {
                    tracing::info!(user_id = %user.id, %week_of, "no eligible candidate this week");
                    summary.skipped_no_candidate += 1;
                    continue;
                }
                Err(e) => {
                    tracing::warn!(user_id = %user.id, error = %e, "candidate selection failed");
                    summary.skipped_error += 1;
                    continue;
                }
            };
            let Some(partner) = by_id.get(&candidate.user_id).copied() else {
                summary.skipped_error += 1;
                continue;
            };

            let new_match = match self.prepare_pair(user, partner, &week, now).await {
                Ok(new_match) => new_match,
                Err(e) => {
                    tracing::warn!(
                        user_id = %user.id,
                        match_user_id = %partner.id,
                        error = %e,
                        "pair abandoned for this week"
                    );
                    summary.skipped_error += 1;
                    continue;
                }
            };

            let created = match self.matches.insert_match(new_match).await {
                Ok(created) => created,
                Err(e) => {
                    tracing::warn!(
                        user_id = %user.id,
                        match_user_id = %partner.id,
                        error = %e,
                        "failed to persist pair, skipping"
                    );
                    summary.skipped_error += 1;
                    continue;
                }
            };
            matched.insert(created.user_id);
            matched.insert(created.match_user_id);
            recent.insert(created.user_id, created.match_user_id);
            summary.matched += 1;

            tracing::info!(
                match_id = %created.id,
                user_id = %created.user_id,
                match_user_id = %created.match_user_id,
                score = created.compatibility_score,
                similarity = candidate.similarity,
                "weekly match created"
            );

            for recipient in created.participants() {
                self.notifier.weekly_match_ready(&created, recipient).await;
            }
        }

        metrics::counter!("kindred_matching_pairs_total", "outcome" => "matched")
            .increment(summary.matched as u64);
        metrics::counter!("kindred_matching_pairs_total", "outcome" => "no_candidate")
            .increment(summary.skipped_no_candidate as u64);
        metrics::counter!("kindred_matching_pairs_total", "outcome" => "error")
            .increment(summary.skipped_error as u64);

        tracing::info!(
            %week_of,
            matched = summary.matched,
            skipped_no_candidate = summary.skipped_no_candidate,
            skipped_error = summary.skipped_error,
            "weekly matching run finished"
        );
        Ok(summary)
    }

    /// Scoring and date planning under the per-pair deadline. Persisting is
    /// left outside the deadline so a cancelled pair can never leave a row
    /// the run does not know about.
    async fn prepare_pair(
        &self,
        user: &UserProfile,
        partner: &UserProfile,
        week: &MatchWeek,
        now: DateTime<Utc>,
    ) -> MatchingResult<NewWeeklyMatch> {
        let work = async {
            let report = self.scorer.score(user, partner).await?;
            let plan = self.planner.plan(user, partner).await;
            Ok::<_, MatchingError>((report, plan))
        };
        let (report, plan) = tokio::time::timeout(self.settings.pair_timeout, work)
            .await
            .map_err(|_| MatchingError::PairTimeout(self.settings.pair_timeout))??;

        Ok(NewWeeklyMatch {
            id: Uuid::now_v7(),
            user_id: user.id,
            match_user_id: partner.id,
            week_of: week.label(),
            compatibility_score: report.score,
            explanation: report.explanation,
            dimension_scores: report.dimension_scores,
            red_flags: report.red_flags,
            conversation_starters: plan.starters,
            venue: plan.venue,
            sent_at: now,
            expires_at: week.expires_at(),
        })
    }
}
