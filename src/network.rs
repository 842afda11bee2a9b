//! Review-network graph construction and cluster detection.
//!
//! Connections aggregate a target's interactions per counterpart; the
//! interaction graph collects pair-weighted edges between arbitrary users
//! so a batch analysis can surface cliques beyond the direct neighborhood.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use uuid::Uuid;

use crate::pairs::ReviewPair;
use crate::Review;

/// Thresholds for suspicious group detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterThresholds {
    /// Minimum member count for a group to be reported.
    pub min_group_size: usize,
    /// Minimum reciprocal pairs on an edge for it to count.
    pub min_edge_pairs: u32,
    /// Minimum mean pair suspicion score on an edge for it to count.
    pub min_edge_mean_score: f64,
}

impl Default for ClusterThresholds {
    fn default() -> Self {
        Self {
            min_group_size: 3,
            min_edge_pairs: 2,
            min_edge_mean_score: 50.0,
        }
    }
}

/// Aggregated view of one counterpart in the target's review network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConnection {
    pub userkey: String,
    /// Reviews exchanged with the target in either direction.
    pub interaction_count: u32,
    /// Reciprocal pairs formed with the target.
    pub reciprocal_count: u32,
    /// Mean gap across this counterpart's pairs, in hours.
    pub avg_time_gap_hours: f64,
    /// Mean of this counterpart's pair suspicion scores.
    pub suspicious_score: f64,
}

/// A densely mutual-reviewing group of three or more accounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuspiciousGroup {
    pub group_id: Uuid,
    /// Member userkeys, sorted.
    pub members: Vec<String>,
    /// Reciprocal pairs summed over the group's qualifying edges.
    pub interaction_count: u32,
    /// Mean pair gap over the group's qualifying edges, in hours.
    pub avg_time_gap_hours: f64,
}

/// Build per-counterpart connections for `target`, deduplicated by userkey.
pub fn build_connections(
    target: &str,
    received: &[Review],
    given: &[Review],
    pairs: &[ReviewPair],
) -> Vec<NetworkConnection> {
    let mut interactions: HashMap<&str, u32> = HashMap::new();
    for review in received {
        if review.subject_userkey == target && review.author_userkey != target {
            *interactions.entry(review.author_userkey.as_str()).or_default() += 1;
        }
    }
    for review in given {
        if review.author_userkey == target && review.subject_userkey != target {
            *interactions.entry(review.subject_userkey.as_str()).or_default() += 1;
        }
    }

    struct PairAccumulator {
        count: u32,
        gap_seconds: i64,
        score: u32,
    }
    let mut per_counterpart: HashMap<&str, PairAccumulator> = HashMap::new();
    for pair in pairs {
        let entry = per_counterpart
            .entry(pair.counterpart_userkey.as_str())
            .or_insert(PairAccumulator {
                count: 0,
                gap_seconds: 0,
                score: 0,
            });
        entry.count += 1;
        entry.gap_seconds += pair.time_gap_seconds;
        entry.score += u32::from(pair.suspicious_score);
    }

    let mut connections: Vec<NetworkConnection> = interactions
        .into_iter()
        .map(|(userkey, interaction_count)| {
            let (reciprocal_count, avg_time_gap_hours, suspicious_score) =
                match per_counterpart.get(userkey) {
                    Some(acc) if acc.count > 0 => (
                        acc.count,
                        acc.gap_seconds as f64 / acc.count as f64 / 3600.0,
                        f64::from(acc.score) / f64::from(acc.count),
                    ),
                    _ => (0, 0.0, 0.0),
                };
            NetworkConnection {
                userkey: userkey.to_string(),
                interaction_count,
                reciprocal_count,
                avg_time_gap_hours,
                suspicious_score,
            }
        })
        .collect();

    connections.sort_by(|a, b| {
        b.suspicious_score
            .partial_cmp(&a.suspicious_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.interaction_count.cmp(&a.interaction_count))
            .then(a.userkey.cmp(&b.userkey))
    });
    connections
}

#[derive(Debug, Clone, Default)]
struct EdgeStats {
    pair_count: u32,
    total_gap_seconds: i64,
    total_score: u32,
}

impl EdgeStats {
    fn mean_score(&self) -> f64 {
        if self.pair_count == 0 {
            0.0
        } else {
            f64::from(self.total_score) / f64::from(self.pair_count)
        }
    }
}

/// Weighted interaction graph keyed by unordered userkey pair.
#[derive(Debug, Clone, Default)]
pub struct InteractionGraph {
    edges: HashMap<(String, String), EdgeStats>,
}

impl InteractionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a reciprocal pair between two users.
    pub fn add_pair(&mut self, a: &str, b: &str, pair: &ReviewPair) {
        if a == b {
            return;
        }
        let key = if a <= b {
            (a.to_string(), b.to_string())
        } else {
            (b.to_string(), a.to_string())
        };
        let edge = self.edges.entry(key).or_default();
        edge.pair_count += 1;
        edge.total_gap_seconds += pair.time_gap_seconds;
        edge.total_score += u32::from(pair.suspicious_score);
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Find suspicious groups: connected components of at least
    /// `min_group_size` users over edges carrying `min_edge_pairs`+
    /// pairs with a mean suspicion of `min_edge_mean_score`+.
    ///
    /// BFS over an adjacency list, so cost stays linear in qualifying
    /// edges rather than quadratic in users.
    pub fn detect_groups(&self, thresholds: &ClusterThresholds) -> Vec<SuspiciousGroup> {
        let qualifying: Vec<(&str, &str, &EdgeStats)> = self
            .edges
            .iter()
            .filter(|(_, stats)| {
                stats.pair_count >= thresholds.min_edge_pairs
                    && stats.mean_score() >= thresholds.min_edge_mean_score
            })
            .map(|((a, b), stats)| (a.as_str(), b.as_str(), stats))
            .collect();

        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
        for &(a, b, _) in &qualifying {
            adjacency.entry(a).or_default().push(b);
            adjacency.entry(b).or_default().push(a);
        }

        let mut visited: HashSet<&str> = HashSet::new();
        let mut groups = Vec::new();

        let mut nodes: Vec<&str> = adjacency.keys().copied().collect();
        nodes.sort_unstable();

        for start in nodes {
            if visited.contains(start) {
                continue;
            }
            let mut component: HashSet<&str> = HashSet::new();
            let mut queue = VecDeque::from([start]);
            while let Some(current) = queue.pop_front() {
                if !visited.insert(current) {
                    continue;
                }
                component.insert(current);
                if let Some(neighbors) = adjacency.get(current) {
                    for &neighbor in neighbors {
                        if !visited.contains(neighbor) {
                            queue.push_back(neighbor);
                        }
                    }
                }
            }

            if component.len() < thresholds.min_group_size {
                continue;
            }

            let mut interaction_count = 0u32;
            let mut total_gap_seconds = 0i64;
            for &(a, b, stats) in &qualifying {
                if component.contains(a) && component.contains(b) {
                    interaction_count += stats.pair_count;
                    total_gap_seconds += stats.total_gap_seconds;
                }
            }
            let avg_time_gap_hours = if interaction_count > 0 {
                total_gap_seconds as f64 / f64::from(interaction_count) / 3600.0
            } else {
                0.0
            };

            let mut members: Vec<String> = component.iter().map(|m| m.to_string()).collect();
            members.sort_unstable();

            groups.push(SuspiciousGroup {
                group_id: Uuid::new_v4(),
                members,
                interaction_count,
                avg_time_gap_hours,
            });
        }

        groups
    }
}
