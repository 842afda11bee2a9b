//! Reputation provider boundary and record normalization.
//!
//! Raw records arrive from the upstream reputation API with every field
//! optional; normalization enforces the load-bearing fields (author,
//! subject, timestamp) and defaults the rest.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::warn;

use crate::{AnalysisError, Review, ReviewSentiment, VouchStats};

/// A review record as returned by the upstream provider, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawReview {
    pub id: Option<String>,
    pub author_userkey: Option<String>,
    pub subject_userkey: Option<String>,
    pub sentiment: Option<String>,
    pub comment: Option<String>,
    /// Unix timestamp in seconds.
    pub created_at: Option<i64>,
}

/// Source of normalized review and vouch records for a userkey.
///
/// All methods are async to support network-backed providers. Errors use
/// the engine taxonomy: `NotFound` for unknown userkeys, `Upstream` for
/// unreachable or failing providers.
#[async_trait]
pub trait ReputationProvider: Send + Sync {
    /// Reviews where the userkey is the subject.
    async fn reviews_received(&self, userkey: &str) -> Result<Vec<RawReview>, AnalysisError>;

    /// Reviews where the userkey is the author.
    async fn reviews_given(&self, userkey: &str) -> Result<Vec<RawReview>, AnalysisError>;

    /// Aggregate vouch counts and amounts for the userkey.
    async fn vouches(&self, userkey: &str) -> Result<VouchStats, AnalysisError>;

    /// Account age in days, when the provider knows it.
    async fn account_age_days(&self, userkey: &str) -> Result<Option<u32>, AnalysisError>;
}

/// Normalize a single raw record.
///
/// Fails with `DataFormat` when `author_userkey`, `subject_userkey`, or
/// `created_at` is absent or unparseable. A missing id is synthesized from
/// the load-bearing fields so identical input always yields identical
/// records.
pub fn normalize_review(raw: &RawReview) -> Result<Review, AnalysisError> {
    let author = raw
        .author_userkey
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AnalysisError::DataFormat("review missing author_userkey".to_string()))?;
    let subject = raw
        .subject_userkey
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AnalysisError::DataFormat("review missing subject_userkey".to_string()))?;
    let seconds = raw
        .created_at
        .ok_or_else(|| AnalysisError::DataFormat("review missing created_at".to_string()))?;
    let created_at = Utc
        .timestamp_opt(seconds, 0)
        .single()
        .ok_or_else(|| AnalysisError::DataFormat(format!("invalid timestamp: {seconds}")))?;

    let sentiment = match raw.sentiment.as_deref() {
        Some(value) => parse_sentiment(value),
        None => ReviewSentiment::Neutral,
    };

    let id = raw
        .id
        .clone()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| format!("{author}:{subject}:{seconds}"));

    Ok(Review {
        id,
        author_userkey: author.to_string(),
        subject_userkey: subject.to_string(),
        sentiment,
        comment: raw.comment.clone().filter(|c| !c.trim().is_empty()),
        created_at,
    })
}

fn parse_sentiment(value: &str) -> ReviewSentiment {
    match value.to_ascii_lowercase().as_str() {
        "positive" => ReviewSentiment::Positive,
        "negative" => ReviewSentiment::Negative,
        _ => ReviewSentiment::Neutral,
    }
}

/// Normalize a fetched batch, skipping malformed records.
///
/// Each malformed record is logged and dropped. When more than half of the
/// batch is malformed the provider itself is considered broken and the
/// whole fetch escalates to `Upstream`.
pub fn normalize_reviews(raw: &[RawReview]) -> Result<Vec<Review>, AnalysisError> {
    let mut reviews = Vec::with_capacity(raw.len());
    let mut skipped = 0usize;

    for record in raw {
        match normalize_review(record) {
            Ok(review) => reviews.push(review),
            Err(AnalysisError::DataFormat(detail)) => {
                skipped += 1;
                warn!(%detail, "skipping malformed review record");
            }
            Err(other) => return Err(other),
        }
    }

    if skipped * 2 > raw.len() {
        return Err(AnalysisError::Upstream(format!(
            "{skipped} of {} review records malformed",
            raw.len()
        )));
    }

    Ok(reviews)
}

/// In-memory provider backed by seeded records.
///
/// Used by tests and the demo; a userkey must be registered before any
/// records can be attached, and unregistered lookups return `NotFound`.
#[derive(Debug, Default)]
pub struct StaticProvider {
    known: HashSet<String>,
    received: HashMap<String, Vec<RawReview>>,
    given: HashMap<String, Vec<RawReview>>,
    vouches: HashMap<String, VouchStats>,
    ages: HashMap<String, u32>,
}

impl StaticProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a userkey with a known account age.
    pub fn add_user(&mut self, userkey: &str, account_age_days: u32) {
        self.known.insert(userkey.to_string());
        self.ages.insert(userkey.to_string(), account_age_days);
    }

    /// Register a userkey whose account age is unknown to the provider.
    pub fn add_user_without_age(&mut self, userkey: &str) {
        self.known.insert(userkey.to_string());
    }

    pub fn push_received(&mut self, userkey: &str, review: RawReview) {
        self.received
            .entry(userkey.to_string())
            .or_default()
            .push(review);
    }

    pub fn push_given(&mut self, userkey: &str, review: RawReview) {
        self.given
            .entry(userkey.to_string())
            .or_default()
            .push(review);
    }

    pub fn set_vouches(&mut self, userkey: &str, vouches: VouchStats) {
        self.vouches.insert(userkey.to_string(), vouches);
    }

    /// Seed both sides of a review in one call: `author` reviews `subject`.
    ///
    /// The record lands in the subject's received list and the author's
    /// given list, the way a shared fetch batch would see it.
    pub fn seed_review(
        &mut self,
        author: &str,
        subject: &str,
        sentiment: &str,
        comment: Option<&str>,
        created_at: i64,
    ) {
        let review = RawReview {
            id: Some(format!("rev-{author}-{subject}-{created_at}")),
            author_userkey: Some(author.to_string()),
            subject_userkey: Some(subject.to_string()),
            sentiment: Some(sentiment.to_string()),
            comment: comment.map(str::to_string),
            created_at: Some(created_at),
        };
        self.push_received(subject, review.clone());
        self.push_given(author, review);
    }

    fn check_known(&self, userkey: &str) -> Result<(), AnalysisError> {
        if self.known.contains(userkey) {
            Ok(())
        } else {
            Err(AnalysisError::NotFound(userkey.to_string()))
        }
    }
}

#[async_trait]
impl ReputationProvider for StaticProvider {
    async fn reviews_received(&self, userkey: &str) -> Result<Vec<RawReview>, AnalysisError> {
        self.check_known(userkey)?;
        Ok(self.received.get(userkey).cloned().unwrap_or_default())
    }

    async fn reviews_given(&self, userkey: &str) -> Result<Vec<RawReview>, AnalysisError> {
        self.check_known(userkey)?;
        Ok(self.given.get(userkey).cloned().unwrap_or_default())
    }

    async fn vouches(&self, userkey: &str) -> Result<VouchStats, AnalysisError> {
        self.check_known(userkey)?;
        Ok(self.vouches.get(userkey).copied().unwrap_or_default())
    }

    async fn account_age_days(&self, userkey: &str) -> Result<Option<u32>, AnalysisError> {
        self.check_known(userkey)?;
        Ok(self.ages.get(userkey).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(author: &str, subject: &str, created_at: i64) -> RawReview {
        RawReview {
            id: Some("rev-1".to_string()),
            author_userkey: Some(author.to_string()),
            subject_userkey: Some(subject.to_string()),
            sentiment: Some("positive".to_string()),
            comment: Some("Solid experience working together".to_string()),
            created_at: Some(created_at),
        }
    }

    #[test]
    fn test_normalize_complete_record() {
        let review = normalize_review(&raw("alice", "bob", 1_700_000_000)).unwrap();
        assert_eq!(review.author_userkey, "alice");
        assert_eq!(review.subject_userkey, "bob");
        assert_eq!(review.sentiment, ReviewSentiment::Positive);
        assert_eq!(review.created_at.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_missing_author_is_data_format_error() {
        let mut record = raw("alice", "bob", 1_700_000_000);
        record.author_userkey = None;
        let err = normalize_review(&record).unwrap_err();
        assert!(matches!(err, AnalysisError::DataFormat(_)));
    }

    #[test]
    fn test_missing_created_at_is_data_format_error() {
        let mut record = raw("alice", "bob", 1_700_000_000);
        record.created_at = None;
        let err = normalize_review(&record).unwrap_err();
        assert!(matches!(err, AnalysisError::DataFormat(_)));
    }

    #[test]
    fn test_missing_sentiment_defaults_to_neutral() {
        let mut record = raw("alice", "bob", 1_700_000_000);
        record.sentiment = None;
        let review = normalize_review(&record).unwrap();
        assert_eq!(review.sentiment, ReviewSentiment::Neutral);
    }

    #[test]
    fn test_unknown_sentiment_defaults_to_neutral() {
        let mut record = raw("alice", "bob", 1_700_000_000);
        record.sentiment = Some("ecstatic".to_string());
        let review = normalize_review(&record).unwrap();
        assert_eq!(review.sentiment, ReviewSentiment::Neutral);
    }

    #[test]
    fn test_missing_id_is_synthesized_deterministically() {
        let mut record = raw("alice", "bob", 1_700_000_000);
        record.id = None;
        let first = normalize_review(&record).unwrap();
        let second = normalize_review(&record).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.id, "alice:bob:1700000000");
    }

    #[test]
    fn test_blank_comment_becomes_none() {
        let mut record = raw("alice", "bob", 1_700_000_000);
        record.comment = Some("   ".to_string());
        let review = normalize_review(&record).unwrap();
        assert!(review.comment.is_none());
    }

    #[test]
    fn test_batch_skips_malformed_minority() {
        let good = raw("alice", "bob", 1_700_000_000);
        let mut bad = raw("carol", "bob", 1_700_000_100);
        bad.subject_userkey = None;

        let reviews =
            normalize_reviews(&[good.clone(), good.clone(), good, bad]).unwrap();
        assert_eq!(reviews.len(), 3);
    }

    #[test]
    fn test_batch_escalates_when_majority_malformed() {
        let good = raw("alice", "bob", 1_700_000_000);
        let mut bad = raw("carol", "bob", 1_700_000_100);
        bad.created_at = None;

        let err = normalize_reviews(&[good, bad.clone(), bad]).unwrap_err();
        assert!(matches!(err, AnalysisError::Upstream(_)));
    }

    #[tokio::test]
    async fn test_static_provider_not_found() {
        let provider = StaticProvider::new();
        let err = provider.reviews_received("ghost").await.unwrap_err();
        assert!(matches!(err, AnalysisError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_static_provider_seed_review_lands_on_both_sides() {
        let mut provider = StaticProvider::new();
        provider.add_user("alice", 400);
        provider.add_user("bob", 400);
        provider.seed_review("alice", "bob", "positive", Some("Great collab"), 1_700_000_000);

        assert_eq!(provider.reviews_received("bob").await.unwrap().len(), 1);
        assert_eq!(provider.reviews_given("alice").await.unwrap().len(), 1);
        assert!(provider.reviews_received("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_static_provider_age_lookup() {
        let mut provider = StaticProvider::new();
        provider.add_user("alice", 400);
        provider.add_user_without_age("bob");

        assert_eq!(provider.account_age_days("alice").await.unwrap(), Some(400));
        assert_eq!(provider.account_age_days("bob").await.unwrap(), None);
    }
}
