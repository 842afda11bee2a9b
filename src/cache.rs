//! Injectable TTL cache for computed reports.
//!
//! The cache is an explicit collaborator handed to the engine, never
//! module-level state, so the engine stays testable without time mocking
//! beyond this boundary. Entries expire; nothing refreshes on a timer.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::report::R4rAnalysisReport;

#[derive(Debug, Clone)]
struct CacheEntry {
    report: R4rAnalysisReport,
    expires_at: DateTime<Utc>,
}

/// Thread-safe report cache keyed by userkey.
#[derive(Debug, Default)]
pub struct ReportCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl ReportCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a report if present and still fresh.
    pub fn get(&self, userkey: &str) -> Option<R4rAnalysisReport> {
        let entries = self.entries.read().ok()?;
        let entry = entries.get(userkey)?;
        if entry.expires_at <= Utc::now() {
            return None;
        }
        Some(entry.report.clone())
    }

    /// Store a report with the given freshness window.
    pub fn insert(&self, report: R4rAnalysisReport, ttl: Duration) {
        let entry = CacheEntry {
            expires_at: Utc::now() + ttl,
            report,
        };
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(entry.report.userkey.clone(), entry);
        }
    }

    /// Drop entries whose freshness window has passed.
    pub fn purge_expired(&self) {
        let now = Utc::now();
        if let Ok(mut entries) = self.entries.write() {
            entries.retain(|_, entry| entry.expires_at > now);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
