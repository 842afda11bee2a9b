//! Report assembly: the final self-contained analysis output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::network::{NetworkConnection, SuspiciousGroup};
use crate::pairs::ReviewPair;
use crate::scoring::{self, RiskLevel, ScoreBreakdown, ScoreInputs, ScoringConfig};
use crate::{Review, VouchStats};

/// Cross-pair pattern flags surfaced to the dashboard.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PatternAnalysis {
    /// Two or more pairs completed inside the quick window.
    pub has_time_patterns: bool,
    /// Two or more pairs flagged by the comment-similarity heuristic.
    pub has_content_patterns: bool,
    pub has_suspicious_groups: bool,
}

/// Another account in the target's network whose own score clears the
/// High threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HighRiskReviewer {
    pub userkey: String,
    pub r4r_score: f64,
    pub risk_level: RiskLevel,
}

/// Review and reciprocity counters for one userkey.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ReviewTotals {
    pub reviews_received: usize,
    pub reviews_given: usize,
    pub reciprocal_reviews: usize,
    pub reciprocal_percentage: f64,
    pub quick_reciprocal_count: usize,
    pub quick_reciprocal_percentage: f64,
}

/// The full R4R analysis for one userkey.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct R4rAnalysisReport {
    pub analysis_id: Uuid,
    pub userkey: String,
    pub totals: ReviewTotals,
    pub vouches: VouchStats,
    pub account_age_days: Option<u32>,
    pub r4r_score: f64,
    pub risk_level: RiskLevel,
    pub review_pairs: Vec<ReviewPair>,
    pub network_connections: Vec<NetworkConnection>,
    pub suspicious_groups: Vec<SuspiciousGroup>,
    pub pattern_analysis: PatternAnalysis,
    /// Populated only when a multi-user network scan was requested.
    pub high_risk_reviewers: Option<Vec<HighRiskReviewer>>,
    pub score_breakdown: ScoreBreakdown,
    pub analyzed_at: DateTime<Utc>,
}

impl R4rAnalysisReport {
    /// The cheap subset the dashboard polls for.
    pub fn summary(&self) -> R4rSummary {
        R4rSummary {
            userkey: self.userkey.clone(),
            r4r_score: self.r4r_score,
            risk_level: self.risk_level,
            totals: self.totals,
        }
    }

    /// Risk is High or Critical.
    pub fn is_flagged(&self) -> bool {
        self.risk_level >= RiskLevel::High
    }

    /// Worth a human look: elevated risk or any detected group.
    pub fn requires_review(&self) -> bool {
        self.risk_level >= RiskLevel::Moderate || !self.suspicious_groups.is_empty()
    }

    /// Export as pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Dashboard summary: score, level, and totals only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct R4rSummary {
    pub userkey: String,
    pub r4r_score: f64,
    pub risk_level: RiskLevel,
    pub totals: ReviewTotals,
}

/// Compose the final report from the pipeline stages' output.
///
/// Zero reviews received is an explicit case, not an error: all counters
/// stay at zero, the lists stay empty, and the risk level is Low.
#[allow(clippy::too_many_arguments)]
pub fn assemble_report(
    userkey: &str,
    received: &[Review],
    given: &[Review],
    vouches: VouchStats,
    account_age_days: Option<u32>,
    review_pairs: Vec<ReviewPair>,
    network_connections: Vec<NetworkConnection>,
    suspicious_groups: Vec<SuspiciousGroup>,
    high_risk_reviewers: Option<Vec<HighRiskReviewer>>,
    config: &ScoringConfig,
) -> R4rAnalysisReport {
    let reciprocal_reviews = review_pairs.len();
    let quick_reciprocal_count = review_pairs
        .iter()
        .filter(|p| p.is_quick_reciprocal)
        .count();
    let similar_comment_pairs = review_pairs.iter().filter(|p| p.comments_similar).count();

    let totals = ReviewTotals {
        reviews_received: received.len(),
        reviews_given: given.len(),
        reciprocal_reviews,
        reciprocal_percentage: scoring::percentage(reciprocal_reviews, received.len()),
        quick_reciprocal_count,
        quick_reciprocal_percentage: scoring::percentage(quick_reciprocal_count, received.len()),
    };

    let inputs = ScoreInputs {
        total_reviews_received: received.len(),
        reciprocal_reviews,
        quick_reciprocal_count,
        account_age_days,
    };
    let score_breakdown = scoring::compute_breakdown(&inputs, config);
    let r4r_score = score_breakdown.final_score;
    let risk_level = RiskLevel::classify(r4r_score, config);

    let pattern_analysis = PatternAnalysis {
        has_time_patterns: quick_reciprocal_count >= 2,
        has_content_patterns: similar_comment_pairs >= 2,
        has_suspicious_groups: !suspicious_groups.is_empty(),
    };

    R4rAnalysisReport {
        analysis_id: Uuid::new_v4(),
        userkey: userkey.to_string(),
        totals,
        vouches,
        account_age_days,
        r4r_score,
        risk_level,
        review_pairs,
        network_connections,
        suspicious_groups,
        pattern_analysis,
        high_risk_reviewers,
        score_breakdown,
        analyzed_at: Utc::now(),
    }
}

/// Rank network accounts whose score clears the High threshold, highest
/// first.
pub fn rank_high_risk_reviewers(
    candidates: impl IntoIterator<Item = HighRiskReviewer>,
    config: &ScoringConfig,
) -> Vec<HighRiskReviewer> {
    let mut ranked: Vec<HighRiskReviewer> = candidates
        .into_iter()
        .filter(|c| c.r4r_score >= config.high_risk_threshold)
        .collect();
    ranked.sort_by(|a, b| {
        b.r4r_score
            .partial_cmp(&a.r4r_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.userkey.cmp(&b.userkey))
    });
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pairs::detect_pairs;
    use crate::ReviewSentiment;
    use chrono::{Duration, TimeZone, Utc};

    fn review(author: &str, subject: &str, hours: i64) -> Review {
        Review {
            id: format!("{author}-{subject}-{hours}"),
            author_userkey: author.to_string(),
            subject_userkey: subject.to_string(),
            sentiment: ReviewSentiment::Positive,
            comment: None,
            created_at: Utc.timestamp_opt(1_700_000_000 + hours * 3600, 0).unwrap(),
        }
    }

    fn assemble(received: &[Review], given: &[Review]) -> R4rAnalysisReport {
        let config = ScoringConfig::default();
        let pairs = detect_pairs("alice", received, given, Duration::hours(24));
        let connections = crate::network::build_connections("alice", received, given, &pairs);
        assemble_report(
            "alice",
            received,
            given,
            VouchStats::default(),
            Some(400),
            pairs,
            connections,
            Vec::new(),
            None,
            &config,
        )
    }

    #[test]
    fn test_zero_activity_report() {
        let report = assemble(&[], &[]);

        assert_eq!(report.totals.reviews_received, 0);
        assert_eq!(report.totals.reciprocal_percentage, 0.0);
        assert_eq!(report.r4r_score, 0.0);
        assert_eq!(report.risk_level, RiskLevel::Low);
        assert!(report.review_pairs.is_empty());
        assert!(report.network_connections.is_empty());
        assert!(!report.pattern_analysis.has_time_patterns);
        assert!(!report.is_flagged());
        assert!(!report.requires_review());
    }

    #[test]
    fn test_totals_and_percentages() {
        let received = vec![
            review("bob", "alice", 0),
            review("carol", "alice", 0),
            review("dave", "alice", 0),
            review("erin", "alice", 0),
        ];
        let given = vec![
            review("alice", "bob", 1),
            review("alice", "carol", 72),
        ];

        let report = assemble(&received, &given);
        assert_eq!(report.totals.reviews_received, 4);
        assert_eq!(report.totals.reviews_given, 2);
        assert_eq!(report.totals.reciprocal_reviews, 2);
        assert!((report.totals.reciprocal_percentage - 50.0).abs() < 1e-9);
        assert_eq!(report.totals.quick_reciprocal_count, 1);
        assert!((report.totals.quick_reciprocal_percentage - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_time_pattern_flag_needs_two_quick_pairs() {
        let received = vec![review("bob", "alice", 0), review("carol", "alice", 0)];
        let one_quick = vec![review("alice", "bob", 1)];
        let report = assemble(&received, &one_quick);
        assert!(!report.pattern_analysis.has_time_patterns);

        let two_quick = vec![review("alice", "bob", 1), review("alice", "carol", 2)];
        let report = assemble(&received, &two_quick);
        assert!(report.pattern_analysis.has_time_patterns);
    }

    #[test]
    fn test_content_pattern_flag() {
        // Empty comments on both sides of both pairs trip the heuristic.
        let received = vec![review("bob", "alice", 0), review("carol", "alice", 0)];
        let given = vec![review("alice", "bob", 1), review("alice", "carol", 2)];
        let report = assemble(&received, &given);
        assert!(report.pattern_analysis.has_content_patterns);
    }

    #[test]
    fn test_summary_matches_report() {
        let received = vec![review("bob", "alice", 0)];
        let given = vec![review("alice", "bob", 1)];
        let report = assemble(&received, &given);

        let summary = report.summary();
        assert_eq!(summary.userkey, report.userkey);
        assert_eq!(summary.r4r_score, report.r4r_score);
        assert_eq!(summary.risk_level, report.risk_level);
        assert_eq!(
            summary.totals.reciprocal_reviews,
            report.totals.reciprocal_reviews
        );
    }

    #[test]
    fn test_json_export() {
        let received = vec![review("bob", "alice", 0)];
        let given = vec![review("alice", "bob", 1)];
        let report = assemble(&received, &given);

        let json = report.to_json().unwrap();
        assert!(json.contains("\"userkey\": \"alice\""));
        assert!(json.contains("score_breakdown"));
        assert!(json.contains("calculation"));
    }

    #[test]
    fn test_rank_high_risk_reviewers_filters_and_sorts() {
        let config = ScoringConfig::default();
        let candidates = vec![
            HighRiskReviewer {
                userkey: "low".to_string(),
                r4r_score: 0.2,
                risk_level: RiskLevel::Low,
            },
            HighRiskReviewer {
                userkey: "critical".to_string(),
                r4r_score: 0.9,
                risk_level: RiskLevel::Critical,
            },
            HighRiskReviewer {
                userkey: "high".to_string(),
                r4r_score: 0.6,
                risk_level: RiskLevel::High,
            },
        ];

        let ranked = rank_high_risk_reviewers(candidates, &config);
        let keys: Vec<_> = ranked.iter().map(|r| r.userkey.as_str()).collect();
        assert_eq!(keys, vec!["critical", "high"]);
    }

    #[test]
    fn test_requires_review_on_group_even_at_low_risk() {
        let received = vec![review("bob", "alice", 0)];
        let given: Vec<Review> = Vec::new();
        let config = ScoringConfig::default();
        let group = SuspiciousGroup {
            group_id: Uuid::new_v4(),
            members: vec!["alice".into(), "bob".into(), "carol".into()],
            interaction_count: 6,
            avg_time_gap_hours: 1.0,
        };

        let report = assemble_report(
            "alice",
            &received,
            &given,
            VouchStats::default(),
            Some(400),
            Vec::new(),
            Vec::new(),
            vec![group],
            None,
            &config,
        );
        assert_eq!(report.risk_level, RiskLevel::Low);
        assert!(report.pattern_analysis.has_suspicious_groups);
        assert!(report.requires_review());
        assert!(!report.is_flagged());
    }
}
