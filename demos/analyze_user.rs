//! R4R analysis example
//!
//! This example seeds an in-memory reputation provider with an organic
//! reviewer, a review-for-review ring, and an inactive account, then runs
//! single-user, summary, and batch network analyses.

use r4r_engine::{R4rEngine, ReportCache, StaticProvider};
use std::sync::Arc;

const HOUR: i64 = 3600;
const BASE_TS: i64 = 1_730_000_000;

fn seed_provider() -> StaticProvider {
    let mut provider = StaticProvider::new();

    // An established account with mostly organic activity.
    provider.add_user("organic", 700);
    for (i, counterpart) in ["pat", "quinn", "remy", "sasha", "toni"].iter().enumerate() {
        provider.add_user(counterpart, 500);
        provider.seed_review(
            counterpart,
            "organic",
            "positive",
            Some("Shipped exactly what we agreed on, communication was clear throughout"),
            BASE_TS + i as i64 * 90 * HOUR,
        );
    }
    // One slow, genuine reciprocal exchange.
    provider.seed_review(
        "organic",
        "pat",
        "positive",
        Some("Worked with them twice now, both times went smoothly"),
        BASE_TS + 400 * HOUR,
    );

    // A brand-new ring exchanging quick templated reviews.
    let ring = ["ring-a", "ring-b", "ring-c"];
    for member in ring {
        provider.add_user(member, 7);
    }
    for i in 0..ring.len() {
        for j in (i + 1)..ring.len() {
            let ts = BASE_TS + (i * 3 + j) as i64 * 20 * HOUR;
            provider.seed_review(ring[i], ring[j], "positive", Some("great guy"), ts);
            provider.seed_review(ring[j], ring[i], "positive", Some("nice work"), ts + 2 * HOUR);
        }
    }

    // No activity at all.
    provider.add_user("lurker", 90);

    provider
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    println!("=== Reciprocal-Review Risk Analysis ===\n");

    let cache = Arc::new(ReportCache::new());
    let engine = R4rEngine::new(seed_provider()).with_cache(Arc::clone(&cache));

    // Example 1: organic account
    println!("1. Analyzing an organic account");
    let report = engine.analyze("organic").await.unwrap();
    println!("   Userkey: {}", report.userkey);
    println!("   Reviews received: {}", report.totals.reviews_received);
    println!(
        "   Reciprocal: {} ({:.1}%)",
        report.totals.reciprocal_reviews, report.totals.reciprocal_percentage
    );
    println!("   R4R score: {:.3}", report.r4r_score);
    println!("   Risk level: {}", report.risk_level);
    println!("   Flagged: {}", report.is_flagged());
    println!();

    // Example 2: ring member with the full breakdown narrative
    println!("2. Analyzing a ring member");
    let report = engine.analyze("ring-a").await.unwrap();
    println!("   Userkey: {}", report.userkey);
    println!("   R4R score: {:.3}", report.r4r_score);
    println!("   Risk level: {}", report.risk_level);
    println!("   Score breakdown:");
    println!("     - {}", report.score_breakdown.base_note);
    println!("     - {}", report.score_breakdown.volume_note);
    println!("     - {}", report.score_breakdown.age_note);
    println!("     - {}", report.score_breakdown.time_note);
    println!("     = {}", report.score_breakdown.calculation);
    println!();

    // Example 3: inactive account is an explicit case, not an error
    println!("3. Analyzing an account with no reviews");
    let report = engine.analyze("lurker").await.unwrap();
    println!("   Reviews received: {}", report.totals.reviews_received);
    println!("   R4R score: {:.3}", report.r4r_score);
    println!("   Risk level: {}", report.risk_level);
    println!();

    // Example 4: cheap dashboard summary (cluster detector never runs)
    println!("4. Dashboard summary");
    let summary = engine.summarize("organic").await.unwrap();
    println!(
        "   {} -> {:.3} ({})",
        summary.userkey, summary.r4r_score, summary.risk_level
    );
    println!();

    // Example 5: batch network scan over the ring. A fresh engine, so
    // every member is recomputed against the shared interaction graph
    // instead of reusing the reports cached above.
    println!("5. Batch network scan");
    let batch_engine = R4rEngine::new(seed_provider());
    let keys: Vec<String> = ["ring-a", "ring-b", "ring-c", "organic"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let outcome = batch_engine.analyze_network(&keys).await;
    println!(
        "   Completed: {}, failed: {}",
        outcome.completed(),
        outcome.failed()
    );
    for key in ["ring-a", "ring-b", "ring-c", "organic"] {
        match outcome.get(key).unwrap() {
            Ok(report) => {
                let groups = report.suspicious_groups.len();
                let high_risk = report
                    .high_risk_reviewers
                    .as_ref()
                    .map_or(0, |list| list.len());
                println!(
                    "   {} -> {:.3} ({}), groups: {}, high-risk peers: {}",
                    report.userkey, report.r4r_score, report.risk_level, groups, high_risk
                );
            }
            Err(err) => println!("   {key} -> error: {err}"),
        }
    }
    println!();

    // Example 6: unknown userkey surfaces a structured error
    println!("6. Unknown userkey");
    match engine.analyze("nobody").await {
        Ok(_) => println!("   unexpected success"),
        Err(err) => println!("   error: {err} (no data: {})", err.is_no_data()),
    }
    println!();

    println!("=== Engine Statistics ===");
    for (key, value) in engine.stats() {
        println!("   {}: {}", key, value);
    }
}
