//! # R4R Engine
//!
//! A reciprocal-review ("review-for-review") risk analysis engine for
//! trust-reputation graphs.
//!
//! ## Features
//!
//! - **Reciprocal Pair Detection**: Hash-indexed matching of mutual review
//!   pairs with quick-reciprocation classification
//! - **Network Analysis**: Weighted interaction graph over a user's review
//!   network with cluster ("pod") detection
//! - **Multi-Factor Scoring**: Auditable R4R score with capped base,
//!   volume and account-age multipliers, and a fast-reciprocation penalty
//! - **Risk Classification**: Deterministic Low/Moderate/High/Critical
//!   banding over the 0.0-1.0 score range
//! - **Batch Analysis**: Bounded-concurrency network scans with per-member
//!   timeouts and failure isolation
//! - **Report Caching**: Injectable TTL cache to absorb dashboard polling
//!
//! The engine is a pure function of the fetched review/vouch records plus
//! its configuration: fetching from the reputation provider is the only
//! suspending step, and every pipeline stage after normalization is a
//! synchronous transformation.

pub mod cache;
pub mod network;
pub mod pairs;
pub mod provider;
pub mod report;
pub mod scoring;

pub use cache::ReportCache;
pub use network::{ClusterThresholds, InteractionGraph, NetworkConnection, SuspiciousGroup};
pub use pairs::ReviewPair;
pub use provider::{RawReview, ReputationProvider, StaticProvider};
pub use report::{
    HighRiskReviewer, PatternAnalysis, R4rAnalysisReport, R4rSummary, ReviewTotals,
};
pub use scoring::{RiskLevel, ScoreBreakdown, ScoringConfig};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Analysis errors surfaced across the engine boundary.
///
/// Structured so the UI can tell "no data" (`NotFound`) from "computation
/// failed" and render an empty state versus a retry affordance.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum AnalysisError {
    #[error("userkey not known to provider: {0}")]
    NotFound(String),

    #[error("malformed provider record: {0}")]
    DataFormat(String),

    #[error("analysis of {userkey} exceeded the {budget_secs}s budget")]
    Timeout { userkey: String, budget_secs: u64 },

    #[error("upstream provider failure: {0}")]
    Upstream(String),
}

impl AnalysisError {
    /// True when the failure means the user has no data, not that the
    /// computation failed.
    pub fn is_no_data(&self) -> bool {
        matches!(self, AnalysisError::NotFound(_))
    }

    /// True when the caller may reasonably retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AnalysisError::Timeout { .. } | AnalysisError::Upstream(_)
        )
    }
}

/// Review sentiment as normalized from the provider.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ReviewSentiment {
    Positive,
    Neutral,
    Negative,
}

/// A normalized review record. Immutable once fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: String,
    pub author_userkey: String,
    pub subject_userkey: String,
    pub sentiment: ReviewSentiment,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One direction of a user's vouch activity.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct VouchSide {
    pub count: u32,
    pub amount: f64,
}

/// Aggregate vouch totals; vouches are never analyzed individually.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct VouchStats {
    pub given: VouchSide,
    pub received: VouchSide,
}

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub scoring: ScoringConfig,
    pub clusters: ClusterThresholds,
    /// Two reviews this close together count as a quick reciprocal.
    pub quick_reciprocal_window_hours: i64,
    /// Hard wall-clock budget for a single analysis.
    pub analysis_timeout_secs: u64,
    /// Concurrent provider fetches during a batch scan.
    pub max_concurrent_fetches: usize,
    /// Freshness window for single-user reports.
    pub single_report_ttl_secs: i64,
    /// Freshness window for batch-produced reports.
    pub network_report_ttl_secs: i64,
    /// Pause before the single internal retry of an upstream failure.
    pub upstream_retry_backoff_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scoring: ScoringConfig::default(),
            clusters: ClusterThresholds::default(),
            quick_reciprocal_window_hours: 24,
            analysis_timeout_secs: 60,
            max_concurrent_fetches: 4,
            single_report_ttl_secs: 120,
            network_report_ttl_secs: 600,
            upstream_retry_backoff_ms: 250,
        }
    }
}

/// Outcome of a batch network analysis: per-member reports or failures.
///
/// One member's failure never aborts its siblings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkAnalysisOutcome {
    pub per_user: HashMap<String, Result<R4rAnalysisReport, AnalysisError>>,
}

impl NetworkAnalysisOutcome {
    pub fn get(&self, userkey: &str) -> Option<&Result<R4rAnalysisReport, AnalysisError>> {
        self.per_user.get(userkey)
    }

    pub fn completed(&self) -> usize {
        self.per_user.values().filter(|r| r.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.per_user.len() - self.completed()
    }
}

/// Normalized records for one userkey, ready for the pipeline.
struct MemberRecords {
    received: Vec<Review>,
    given: Vec<Review>,
    vouches: VouchStats,
    account_age_days: Option<u32>,
}

/// Run a fallible provider call, retrying once on upstream failure.
async fn retry_once<T, F, Fut>(backoff: StdDuration, mut op: F) -> Result<T, AnalysisError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, AnalysisError>>,
{
    match op().await {
        Err(AnalysisError::Upstream(detail)) => {
            warn!(%detail, "upstream failure, retrying once");
            tokio::time::sleep(backoff).await;
            op().await
        }
        other => other,
    }
}

/// Fetch and normalize everything the pipeline needs for one userkey.
///
/// The four provider calls run concurrently; each gets one internal
/// retry on upstream failure.
async fn fetch_member<P: ReputationProvider>(
    provider: &P,
    config: &EngineConfig,
    userkey: &str,
) -> Result<MemberRecords, AnalysisError> {
    let backoff = StdDuration::from_millis(config.upstream_retry_backoff_ms);
    let (received, given, vouches, age) = tokio::join!(
        retry_once(backoff, || provider.reviews_received(userkey)),
        retry_once(backoff, || provider.reviews_given(userkey)),
        retry_once(backoff, || provider.vouches(userkey)),
        retry_once(backoff, || provider.account_age_days(userkey)),
    );

    let received = provider::normalize_reviews(&received?)?;
    let given = provider::normalize_reviews(&given?)?;

    Ok(MemberRecords {
        received,
        given,
        vouches: vouches?,
        account_age_days: age?,
    })
}

/// The reciprocal-review risk analysis engine.
///
/// Stateless per invocation: concurrent analyses for different userkeys
/// share nothing but the provider and the optional cache collaborator.
pub struct R4rEngine<P> {
    provider: Arc<P>,
    config: EngineConfig,
    cache: Option<Arc<ReportCache>>,
    analyses_run: AtomicU64,
    cache_hits: AtomicU64,
}

impl<P: ReputationProvider + 'static> R4rEngine<P> {
    /// Create an engine with default configuration and no cache.
    pub fn new(provider: P) -> Self {
        Self::with_config(provider, EngineConfig::default())
    }

    pub fn with_config(provider: P, config: EngineConfig) -> Self {
        Self {
            provider: Arc::new(provider),
            config,
            cache: None,
            analyses_run: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
        }
    }

    /// Attach a report cache.
    pub fn with_cache(mut self, cache: Arc<ReportCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Full single-user analysis.
    pub async fn analyze(&self, userkey: &str) -> Result<R4rAnalysisReport, AnalysisError> {
        if let Some(report) = self.cached(userkey) {
            debug!(userkey, "returning cached report");
            return Ok(report);
        }

        let records = self.fetch_with_budget(userkey).await?;
        let report = self.build_report(userkey, &records, true, None);
        self.analyses_run.fetch_add(1, Ordering::Relaxed);

        if let Some(cache) = &self.cache {
            cache.insert(
                report.clone(),
                Duration::seconds(self.config.single_report_ttl_secs),
            );
        }

        info!(
            userkey,
            score = report.r4r_score,
            level = %report.risk_level,
            pairs = report.review_pairs.len(),
            "analysis complete"
        );
        Ok(report)
    }

    /// Cheap dashboard subset. Never runs the cluster detector.
    pub async fn summarize(&self, userkey: &str) -> Result<R4rSummary, AnalysisError> {
        if let Some(report) = self.cached(userkey) {
            return Ok(report.summary());
        }

        let records = self.fetch_with_budget(userkey).await?;
        let report = self.build_report(userkey, &records, false, None);
        self.analyses_run.fetch_add(1, Ordering::Relaxed);
        Ok(report.summary())
    }

    /// Batch analysis over a set of userkeys with bounded concurrency.
    ///
    /// Fetches fan out onto a task set gated by a semaphore; each member
    /// runs under its own wall-clock budget, and a member's timeout or
    /// failure leaves its siblings untouched. All members' pairs feed one
    /// shared interaction graph, so cliques spanning counterparts of
    /// counterparts surface here even though a single-user analysis
    /// cannot see them.
    pub async fn analyze_network(&self, userkeys: &[String]) -> NetworkAnalysisOutcome {
        let mut seen = HashSet::new();
        let unique: Vec<String> = userkeys
            .iter()
            .filter(|k| seen.insert(k.as_str()))
            .cloned()
            .collect();

        // Fresh cached reports are reused as-is.
        let mut ready: HashMap<String, R4rAnalysisReport> = HashMap::new();
        let mut to_fetch = Vec::new();
        for userkey in unique {
            match self.cached(&userkey) {
                Some(report) => {
                    ready.insert(userkey, report);
                }
                None => to_fetch.push(userkey),
            }
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_fetches.max(1)));
        let mut tasks: JoinSet<(String, Result<MemberRecords, AnalysisError>)> = JoinSet::new();

        for userkey in to_fetch {
            let provider = Arc::clone(&self.provider);
            let config = self.config.clone();
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let budget = config.analysis_timeout_secs;
                let result = match timeout(
                    StdDuration::from_secs(budget),
                    fetch_member(provider.as_ref(), &config, &userkey),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(AnalysisError::Timeout {
                        userkey: userkey.clone(),
                        budget_secs: budget,
                    }),
                };
                (userkey, result)
            });
        }

        let mut fetched: HashMap<String, MemberRecords> = HashMap::new();
        let mut failures: HashMap<String, AnalysisError> = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((userkey, Ok(records))) => {
                    fetched.insert(userkey, records);
                }
                Ok((userkey, Err(err))) => {
                    warn!(%userkey, %err, "batch member failed");
                    failures.insert(userkey, err);
                }
                Err(err) => warn!(%err, "batch member task panicked"),
            }
        }

        // Pair detection per member, then one shared graph across the batch.
        let quick_window = Duration::hours(self.config.quick_reciprocal_window_hours);
        let mut member_pairs: HashMap<String, Vec<ReviewPair>> = HashMap::new();
        for (userkey, records) in &fetched {
            let pairs =
                pairs::detect_pairs(userkey, &records.received, &records.given, quick_window);
            member_pairs.insert(userkey.clone(), pairs);
        }

        let mut graph = InteractionGraph::new();
        for (userkey, pairs) in &member_pairs {
            for pair in pairs {
                graph.add_pair(userkey, &pair.counterpart_userkey, pair);
            }
        }
        for (userkey, report) in &ready {
            for pair in &report.review_pairs {
                graph.add_pair(userkey, &pair.counterpart_userkey, pair);
            }
        }
        let groups = graph.detect_groups(&self.config.clusters);
        debug!(
            groups = groups.len(),
            edges = graph.edge_count(),
            "batch cluster detection complete"
        );

        // Scores for the sibling high-risk ranking.
        let mut scores: HashMap<String, (f64, RiskLevel)> = HashMap::new();
        for (userkey, records) in &fetched {
            let pairs = &member_pairs[userkey];
            let inputs = scoring::ScoreInputs {
                total_reviews_received: records.received.len(),
                reciprocal_reviews: pairs.len(),
                quick_reciprocal_count: pairs.iter().filter(|p| p.is_quick_reciprocal).count(),
                account_age_days: records.account_age_days,
            };
            let breakdown = scoring::compute_breakdown(&inputs, &self.config.scoring);
            scores.insert(
                userkey.clone(),
                (
                    breakdown.final_score,
                    RiskLevel::classify(breakdown.final_score, &self.config.scoring),
                ),
            );
        }
        for (userkey, report) in &ready {
            scores.insert(userkey.clone(), (report.r4r_score, report.risk_level));
        }

        let mut per_user: HashMap<String, Result<R4rAnalysisReport, AnalysisError>> =
            HashMap::new();
        for (userkey, records) in fetched {
            let pairs = member_pairs.remove(&userkey).unwrap_or_default();
            let connections =
                network::build_connections(&userkey, &records.received, &records.given, &pairs);
            let member_groups: Vec<SuspiciousGroup> = groups
                .iter()
                .filter(|g| g.members.iter().any(|m| *m == userkey))
                .cloned()
                .collect();
            let siblings = scores
                .iter()
                .filter(|(key, _)| *key != &userkey)
                .map(|(key, (score, level))| HighRiskReviewer {
                    userkey: key.clone(),
                    r4r_score: *score,
                    risk_level: *level,
                });
            let high_risk = report::rank_high_risk_reviewers(siblings, &self.config.scoring);

            let member_report = report::assemble_report(
                &userkey,
                &records.received,
                &records.given,
                records.vouches,
                records.account_age_days,
                pairs,
                connections,
                member_groups,
                Some(high_risk),
                &self.config.scoring,
            );
            self.analyses_run.fetch_add(1, Ordering::Relaxed);

            if let Some(cache) = &self.cache {
                cache.insert(
                    member_report.clone(),
                    Duration::seconds(self.config.network_report_ttl_secs),
                );
            }
            per_user.insert(userkey, Ok(member_report));
        }
        for (userkey, report) in ready {
            per_user.insert(userkey, Ok(report));
        }
        for (userkey, err) in failures {
            per_user.insert(userkey, Err(err));
        }

        NetworkAnalysisOutcome { per_user }
    }

    /// Engine counters.
    pub fn stats(&self) -> HashMap<String, u64> {
        let mut stats = HashMap::new();
        stats.insert(
            "analyses_run".to_string(),
            self.analyses_run.load(Ordering::Relaxed),
        );
        stats.insert(
            "cache_hits".to_string(),
            self.cache_hits.load(Ordering::Relaxed),
        );
        stats
    }

    fn cached(&self, userkey: &str) -> Option<R4rAnalysisReport> {
        let report = self.cache.as_ref()?.get(userkey)?;
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        Some(report)
    }

    async fn fetch_with_budget(&self, userkey: &str) -> Result<MemberRecords, AnalysisError> {
        let budget = self.config.analysis_timeout_secs;
        timeout(
            StdDuration::from_secs(budget),
            fetch_member(self.provider.as_ref(), &self.config, userkey),
        )
        .await
        .map_err(|_| AnalysisError::Timeout {
            userkey: userkey.to_string(),
            budget_secs: budget,
        })?
    }

    /// Run the synchronous pipeline stages over fetched records.
    fn build_report(
        &self,
        userkey: &str,
        records: &MemberRecords,
        include_clusters: bool,
        high_risk: Option<Vec<HighRiskReviewer>>,
    ) -> R4rAnalysisReport {
        let quick_window = Duration::hours(self.config.quick_reciprocal_window_hours);
        let pairs = pairs::detect_pairs(userkey, &records.received, &records.given, quick_window);
        let connections =
            network::build_connections(userkey, &records.received, &records.given, &pairs);

        let groups = if include_clusters {
            let mut graph = InteractionGraph::new();
            for pair in &pairs {
                graph.add_pair(userkey, &pair.counterpart_userkey, pair);
            }
            graph.detect_groups(&self.config.clusters)
        } else {
            Vec::new()
        };

        report::assemble_report(
            userkey,
            &records.received,
            &records.given,
            records.vouches,
            records.account_age_days,
            pairs,
            connections,
            groups,
            high_risk,
            &self.config.scoring,
        )
    }
}
