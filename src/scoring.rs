//! Aggregate R4R scoring and risk classification.
//!
//! The score is an explicit, auditable formula rather than a black box:
//! the breakdown carries every intermediate value, a rationale per
//! factor, and the rendered arithmetic, because the UI shows all of it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Scoring constants. The shipped values are defaults, not physical
/// constants; deployments tune them here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Cap on the reciprocity base score. Raw reciprocity alone cannot
    /// push a score into the Critical band.
    pub base_score_cap: f64,
    /// Below this many received reviews the volume discount applies.
    pub low_volume_threshold: usize,
    /// Above this many received reviews the volume premium applies.
    pub high_volume_threshold: usize,
    pub low_volume_multiplier: f64,
    pub normal_volume_multiplier: f64,
    pub high_volume_multiplier: f64,
    /// Accounts younger than this many days get the new-account premium.
    pub new_account_days: u32,
    /// Accounts older than this many days get the established discount.
    pub established_account_days: u32,
    pub new_account_multiplier: f64,
    pub normal_account_multiplier: f64,
    pub established_account_multiplier: f64,
    /// Weight of the fast-reciprocation penalty term.
    pub quick_penalty_weight: f64,
    pub moderate_risk_threshold: f64,
    pub high_risk_threshold: f64,
    pub critical_risk_threshold: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            base_score_cap: 0.70,
            low_volume_threshold: 5,
            high_volume_threshold: 20,
            low_volume_multiplier: 0.6,
            normal_volume_multiplier: 1.0,
            high_volume_multiplier: 1.15,
            new_account_days: 30,
            established_account_days: 180,
            new_account_multiplier: 1.2,
            normal_account_multiplier: 1.0,
            established_account_multiplier: 0.9,
            quick_penalty_weight: 0.25,
            moderate_risk_threshold: 0.25,
            high_risk_threshold: 0.50,
            critical_risk_threshold: 0.75,
        }
    }
}

/// Discrete risk classification over the 0.0-1.0 score range.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
    Critical,
}

impl RiskLevel {
    /// Classify a score. Total over [0, 1]; boundary values fall into the
    /// upper band.
    pub fn classify(score: f64, config: &ScoringConfig) -> Self {
        if score >= config.critical_risk_threshold {
            RiskLevel::Critical
        } else if score >= config.high_risk_threshold {
            RiskLevel::High
        } else if score >= config.moderate_risk_threshold {
            RiskLevel::Moderate
        } else {
            RiskLevel::Low
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "Low"),
            RiskLevel::Moderate => write!(f, "Moderate"),
            RiskLevel::High => write!(f, "High"),
            RiskLevel::Critical => write!(f, "Critical"),
        }
    }
}

/// Counters the scorer operates on.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreInputs {
    pub total_reviews_received: usize,
    pub reciprocal_reviews: usize,
    pub quick_reciprocal_count: usize,
    /// None when the provider does not know the account age.
    pub account_age_days: Option<u32>,
}

/// Every intermediate of the score formula, plus the narrative the UI
/// renders alongside the final number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub uncapped_base_score: f64,
    pub capped_base_score: f64,
    pub volume_multiplier: f64,
    pub account_age_multiplier: f64,
    pub time_penalty: f64,
    pub final_score: f64,
    pub base_note: String,
    pub volume_note: String,
    pub age_note: String,
    pub time_note: String,
    /// Rendered arithmetic for the final score.
    pub calculation: String,
}

/// Percentage of `part` in `whole`, defined as 0 when `whole` is 0.
pub fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Compute the aggregate R4R score with its full breakdown.
pub fn compute_breakdown(inputs: &ScoreInputs, config: &ScoringConfig) -> ScoreBreakdown {
    let reciprocal_pct = percentage(inputs.reciprocal_reviews, inputs.total_reviews_received);
    let quick_pct = percentage(inputs.quick_reciprocal_count, inputs.total_reviews_received);

    let uncapped_base_score = reciprocal_pct / 100.0;
    let capped_base_score = uncapped_base_score.min(config.base_score_cap);
    let base_note = format!(
        "{:.1}% of received reviews are reciprocal; base contribution capped at {:.2} so raw reciprocity alone cannot signal Critical",
        reciprocal_pct, config.base_score_cap
    );

    let (volume_multiplier, volume_note) = if inputs.total_reviews_received
        < config.low_volume_threshold
    {
        (
            config.low_volume_multiplier,
            format!(
                "{} received reviews (under {}): x{:.2}, too little data to be confident",
                inputs.total_reviews_received,
                config.low_volume_threshold,
                config.low_volume_multiplier
            ),
        )
    } else if inputs.total_reviews_received > config.high_volume_threshold {
        (
            config.high_volume_multiplier,
            format!(
                "{} received reviews (over {}): x{:.2}, a sustained pattern at scale",
                inputs.total_reviews_received,
                config.high_volume_threshold,
                config.high_volume_multiplier
            ),
        )
    } else {
        (
            config.normal_volume_multiplier,
            format!(
                "{} received reviews (between {} and {}): x{:.2}, neutral volume weight",
                inputs.total_reviews_received,
                config.low_volume_threshold,
                config.high_volume_threshold,
                config.normal_volume_multiplier
            ),
        )
    };

    let (account_age_multiplier, age_note) = match inputs.account_age_days {
        Some(days) if days < config.new_account_days => (
            config.new_account_multiplier,
            format!(
                "account is {days} days old (under {}): x{:.2}, reciprocity among brand-new accounts is more suspicious",
                config.new_account_days, config.new_account_multiplier
            ),
        ),
        Some(days) if days > config.established_account_days => (
            config.established_account_multiplier,
            format!(
                "account is {days} days old (over {}): x{:.2}, established-account discount",
                config.established_account_days, config.established_account_multiplier
            ),
        ),
        Some(days) => (
            config.normal_account_multiplier,
            format!("account is {days} days old: x{:.2}, neutral age weight", config.normal_account_multiplier),
        ),
        None => (
            config.established_account_multiplier,
            format!(
                "account age unknown: defaulting to the established tier, x{:.2}",
                config.established_account_multiplier
            ),
        ),
    };

    let time_penalty = quick_pct / 100.0 * config.quick_penalty_weight;
    let time_note = format!(
        "{:.1}% of received reviews were reciprocated within the quick window: +{:.3} fast-reciprocation penalty",
        quick_pct, time_penalty
    );

    let final_score = (capped_base_score * volume_multiplier * account_age_multiplier
        + time_penalty)
        .clamp(0.0, 1.0);

    let calculation = format!(
        "clamp({:.2} * {:.2} * {:.2} + {:.3}, 0, 1) = {:.3}",
        capped_base_score, volume_multiplier, account_age_multiplier, time_penalty, final_score
    );

    ScoreBreakdown {
        uncapped_base_score,
        capped_base_score,
        volume_multiplier,
        account_age_multiplier,
        time_penalty,
        final_score,
        base_note,
        volume_note,
        age_note,
        time_note,
        calculation,
    }
}
