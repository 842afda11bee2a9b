//! Reciprocal review pair detection.
//!
//! A pair is two reviews between the same two users, one in each
//! direction. Pairs completed inside the quick window, with aligned
//! sentiment, or with interchangeable comments score higher.

use chrono::Duration;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{Review, ReviewSentiment};

/// Score weight for a pair completed inside the quick window.
pub const QUICK_RECIPROCAL_WEIGHT: u8 = 40;

/// Score weight when both reviews are positive.
pub const MUTUAL_POSITIVE_WEIGHT: u8 = 20;

/// Score weight when both reviews are negative.
pub const MUTUAL_NEGATIVE_WEIGHT: u8 = 10;

/// Score weight when both comments are near-empty or template-like.
pub const SIMILAR_COMMENT_WEIGHT: u8 = 10;

/// Comments shorter than this (after trimming) count as near-empty.
const NEAR_EMPTY_COMMENT_LEN: usize = 12;

/// A detected reciprocal review pair, ordered internally by timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewPair {
    /// The other user in the pair (never the analysis target).
    pub counterpart_userkey: String,
    pub earlier: Review,
    pub later: Review,
    /// True by construction; kept for the report shape.
    pub is_reciprocal: bool,
    pub is_quick_reciprocal: bool,
    /// Gap between the two reviews in seconds.
    pub time_gap_seconds: i64,
    /// Suspicion score on a 0-100 scale.
    pub suspicious_score: u8,
    /// Whether the comment-similarity heuristic fired.
    pub comments_similar: bool,
}

impl ReviewPair {
    pub fn time_gap(&self) -> Duration {
        Duration::seconds(self.time_gap_seconds)
    }
}

/// Detect reciprocal pairs for `target` given its received and given reviews.
///
/// Given reviews are indexed by counterpart, so the scan is linear in the
/// two input sizes rather than their product. Within a counterpart bucket
/// each received review is matched to the nearest-in-time unused given
/// review; no review participates in two pairs.
pub fn detect_pairs(
    target: &str,
    received: &[Review],
    given: &[Review],
    quick_window: Duration,
) -> Vec<ReviewPair> {
    // Index given reviews by their subject (the counterpart).
    let mut given_index: HashMap<&str, Vec<&Review>> = HashMap::new();
    for review in given {
        if review.author_userkey == target && review.subject_userkey != target {
            given_index
                .entry(review.subject_userkey.as_str())
                .or_default()
                .push(review);
        }
    }
    for bucket in given_index.values_mut() {
        bucket.sort_by_key(|r| r.created_at);
    }

    let mut received_by_author: HashMap<&str, Vec<&Review>> = HashMap::new();
    for review in received {
        if review.subject_userkey == target && review.author_userkey != target {
            received_by_author
                .entry(review.author_userkey.as_str())
                .or_default()
                .push(review);
        }
    }

    let mut pairs = Vec::new();
    for (counterpart, mut incoming) in received_by_author {
        let Some(outgoing) = given_index.get(counterpart) else {
            continue;
        };
        incoming.sort_by_key(|r| r.created_at);
        let mut used = vec![false; outgoing.len()];

        for review in incoming {
            let mut best: Option<(usize, i64)> = None;
            for (idx, candidate) in outgoing.iter().enumerate() {
                if used[idx] {
                    continue;
                }
                let gap = (candidate.created_at - review.created_at)
                    .num_seconds()
                    .abs();
                if best.map_or(true, |(_, best_gap)| gap < best_gap) {
                    best = Some((idx, gap));
                }
            }
            if let Some((idx, _)) = best {
                used[idx] = true;
                pairs.push(build_pair(counterpart, review, outgoing[idx], quick_window));
            }
        }
    }

    // Hash map ordering is arbitrary; fix it so identical input yields an
    // identical report.
    pairs.sort_by(|a, b| {
        a.counterpart_userkey
            .cmp(&b.counterpart_userkey)
            .then(a.earlier.created_at.cmp(&b.earlier.created_at))
    });
    pairs
}

fn build_pair(
    counterpart: &str,
    received: &Review,
    given: &Review,
    quick_window: Duration,
) -> ReviewPair {
    let (earlier, later) = if received.created_at <= given.created_at {
        (received.clone(), given.clone())
    } else {
        (given.clone(), received.clone())
    };

    let time_gap_seconds = (later.created_at - earlier.created_at).num_seconds();
    let is_quick_reciprocal = time_gap_seconds <= quick_window.num_seconds();
    let comments_similar =
        comments_look_templated(earlier.comment.as_deref(), later.comment.as_deref());

    let mut score = 0u8;
    if is_quick_reciprocal {
        score = score.saturating_add(QUICK_RECIPROCAL_WEIGHT);
    }
    match (earlier.sentiment, later.sentiment) {
        (ReviewSentiment::Positive, ReviewSentiment::Positive) => {
            score = score.saturating_add(MUTUAL_POSITIVE_WEIGHT);
        }
        (ReviewSentiment::Negative, ReviewSentiment::Negative) => {
            score = score.saturating_add(MUTUAL_NEGATIVE_WEIGHT);
        }
        _ => {}
    }
    if comments_similar {
        score = score.saturating_add(SIMILAR_COMMENT_WEIGHT);
    }

    ReviewPair {
        counterpart_userkey: counterpart.to_string(),
        earlier,
        later,
        is_reciprocal: true,
        is_quick_reciprocal,
        time_gap_seconds,
        suspicious_score: score.min(100),
        comments_similar,
    }
}

/// True when both comments are near-empty or read like exchange-filler
/// ("great guy", "awesome work!!").
fn comments_look_templated(a: Option<&str>, b: Option<&str>) -> bool {
    fn generic(comment: Option<&str>) -> bool {
        let Some(text) = comment else {
            return true;
        };
        let trimmed = text.trim();
        if trimmed.len() < NEAR_EMPTY_COMMENT_LEN {
            return true;
        }
        let template = Regex::new(
            r"(?i)^(great|good|nice|awesome|excellent|amazing|best|top|solid|cool)\s+(guy|work|job|trader|person|dude|service|experience|project|team)[\s!.]*$",
        )
        .unwrap();
        template.is_match(trimmed)
    }

    generic(a) && generic(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn review(author: &str, subject: &str, hours: i64, sentiment: ReviewSentiment) -> Review {
        Review {
            id: format!("{author}-{subject}-{hours}"),
            author_userkey: author.to_string(),
            subject_userkey: subject.to_string(),
            sentiment,
            comment: Some("A thoughtful writeup of the collaboration we had".to_string()),
            created_at: Utc.timestamp_opt(1_700_000_000 + hours * 3600, 0).unwrap(),
        }
    }

    fn window() -> Duration {
        Duration::hours(24)
    }

    #[test]
    fn test_detects_reciprocal_pair() {
        let received = vec![review("bob", "alice", 0, ReviewSentiment::Positive)];
        let given = vec![review("alice", "bob", 5, ReviewSentiment::Positive)];

        let pairs = detect_pairs("alice", &received, &given, window());
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].counterpart_userkey, "bob");
        assert!(pairs[0].is_reciprocal);
        assert!(pairs[0].is_quick_reciprocal);
        assert_eq!(pairs[0].time_gap_seconds, 5 * 3600);
    }

    #[test]
    fn test_no_pair_without_common_counterpart() {
        let received = vec![review("bob", "alice", 0, ReviewSentiment::Positive)];
        let given = vec![review("alice", "carol", 5, ReviewSentiment::Positive)];

        let pairs = detect_pairs("alice", &received, &given, window());
        assert!(pairs.is_empty());
    }

    #[test]
    fn test_detection_is_symmetric() {
        let a_to_b = review("alice", "bob", 0, ReviewSentiment::Positive);
        let b_to_a = review("bob", "alice", 10, ReviewSentiment::Positive);

        // From Alice's perspective.
        let from_alice = detect_pairs(
            "alice",
            std::slice::from_ref(&b_to_a),
            std::slice::from_ref(&a_to_b),
            window(),
        );
        // From Bob's perspective the same two records swap roles.
        let from_bob = detect_pairs(
            "bob",
            std::slice::from_ref(&a_to_b),
            std::slice::from_ref(&b_to_a),
            window(),
        );

        assert_eq!(from_alice.len(), 1);
        assert_eq!(from_bob.len(), 1);
        assert_eq!(
            from_alice[0].time_gap_seconds,
            from_bob[0].time_gap_seconds
        );
        assert_eq!(from_alice[0].earlier.id, from_bob[0].earlier.id);
        assert_eq!(from_alice[0].later.id, from_bob[0].later.id);
    }

    #[test]
    fn test_slow_reciprocal_is_not_quick() {
        let received = vec![review("bob", "alice", 0, ReviewSentiment::Positive)];
        let given = vec![review("alice", "bob", 72, ReviewSentiment::Positive)];

        let pairs = detect_pairs("alice", &received, &given, window());
        assert_eq!(pairs.len(), 1);
        assert!(!pairs[0].is_quick_reciprocal);
    }

    #[test]
    fn test_gap_exactly_at_window_is_quick() {
        let received = vec![review("bob", "alice", 0, ReviewSentiment::Positive)];
        let given = vec![review("alice", "bob", 24, ReviewSentiment::Positive)];

        let pairs = detect_pairs("alice", &received, &given, window());
        assert!(pairs[0].is_quick_reciprocal);
    }

    #[test]
    fn test_score_components_add_up() {
        // Quick + both positive + templated comments = 40 + 20 + 10.
        let mut received = review("bob", "alice", 0, ReviewSentiment::Positive);
        received.comment = Some("great guy".to_string());
        let mut given = review("alice", "bob", 2, ReviewSentiment::Positive);
        given.comment = Some("awesome work!!".to_string());

        let pairs = detect_pairs("alice", &[received], &[given], window());
        assert_eq!(pairs[0].suspicious_score, 70);
        assert!(pairs[0].comments_similar);
    }

    #[test]
    fn test_mixed_sentiment_scores_lower() {
        let received = vec![review("bob", "alice", 0, ReviewSentiment::Positive)];
        let given = vec![review("alice", "bob", 2, ReviewSentiment::Negative)];

        let pairs = detect_pairs("alice", &received, &given, window());
        assert_eq!(pairs[0].suspicious_score, QUICK_RECIPROCAL_WEIGHT);
    }

    #[test]
    fn test_mutual_negative_scores_between() {
        let received = vec![review("bob", "alice", 0, ReviewSentiment::Negative)];
        let given = vec![review("alice", "bob", 2, ReviewSentiment::Negative)];

        let pairs = detect_pairs("alice", &received, &given, window());
        assert_eq!(
            pairs[0].suspicious_score,
            QUICK_RECIPROCAL_WEIGHT + MUTUAL_NEGATIVE_WEIGHT
        );
    }

    #[test]
    fn test_missing_comments_count_as_similar() {
        let mut received = review("bob", "alice", 0, ReviewSentiment::Neutral);
        received.comment = None;
        let mut given = review("alice", "bob", 2, ReviewSentiment::Neutral);
        given.comment = None;

        let pairs = detect_pairs("alice", &[received], &[given], window());
        assert!(pairs[0].comments_similar);
        assert_eq!(
            pairs[0].suspicious_score,
            QUICK_RECIPROCAL_WEIGHT + SIMILAR_COMMENT_WEIGHT
        );
    }

    #[test]
    fn test_substantial_comments_are_not_similar() {
        let received = vec![review("bob", "alice", 0, ReviewSentiment::Neutral)];
        let given = vec![review("alice", "bob", 2, ReviewSentiment::Neutral)];

        let pairs = detect_pairs("alice", &received, &given, window());
        assert!(!pairs[0].comments_similar);
    }

    #[test]
    fn test_each_given_review_used_once() {
        // Two received from bob, one given back: only one pair forms.
        let received = vec![
            review("bob", "alice", 0, ReviewSentiment::Positive),
            review("bob", "alice", 48, ReviewSentiment::Positive),
        ];
        let given = vec![review("alice", "bob", 1, ReviewSentiment::Positive)];

        let pairs = detect_pairs("alice", &received, &given, window());
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].time_gap_seconds, 3600);
    }

    #[test]
    fn test_nearest_in_time_matching() {
        // Bob reviewed Alice twice; Alice answered twice. Each received
        // review should pick the closer given review.
        let received = vec![
            review("bob", "alice", 0, ReviewSentiment::Positive),
            review("bob", "alice", 100, ReviewSentiment::Positive),
        ];
        let given = vec![
            review("alice", "bob", 2, ReviewSentiment::Positive),
            review("alice", "bob", 101, ReviewSentiment::Positive),
        ];

        let pairs = detect_pairs("alice", &received, &given, window());
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].time_gap_seconds, 2 * 3600);
        assert_eq!(pairs[1].time_gap_seconds, 3600);
    }

    #[test]
    fn test_output_order_is_deterministic() {
        let received = vec![
            review("dave", "alice", 0, ReviewSentiment::Positive),
            review("bob", "alice", 0, ReviewSentiment::Positive),
            review("carol", "alice", 0, ReviewSentiment::Positive),
        ];
        let given = vec![
            review("alice", "bob", 1, ReviewSentiment::Positive),
            review("alice", "carol", 1, ReviewSentiment::Positive),
            review("alice", "dave", 1, ReviewSentiment::Positive),
        ];

        let pairs = detect_pairs("alice", &received, &given, window());
        let counterparts: Vec<_> = pairs
            .iter()
            .map(|p| p.counterpart_userkey.as_str())
            .collect();
        assert_eq!(counterparts, vec!["bob", "carol", "dave"]);
    }
}
