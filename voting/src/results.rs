//! Candidate rankings.
//!
//! [`compute_results`] is pure. [`ResultsAggregator`] wraps it with the
//! store fetch and caches the whole structure for a short TTL, so results
//! are eventually consistent: a vote shows up once its invalidation lands
//! or the TTL runs out, whichever comes first.

use crate::cache_aside::{CacheAside, Fetcher};
use crate::consistency::bounded;
use crate::error::Result;
use crate::keys::KeyNamespace;
use crate::model::{CandidateAggregate, CandidateId};
use crate::providers::{CacheClient, Clock, VoterStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

/// Vote-share bucket labels, highest first.
pub const DISTRIBUTION_LABELS: [&str; 5] = ["50%+", "25-50%", "10-25%", "1-10%", "<1%"];

/// One ranked candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    /// 1-based position.
    pub rank: u32,
    /// Identifier.
    pub id: CandidateId,
    /// Display name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Team size.
    pub member_count: u32,
    /// Finalized votes.
    pub vote_count: u64,
    /// Share of all votes, 0-100. Unrounded.
    pub percentage: f64,
    /// Most recent vote.
    pub last_vote_at: Option<DateTime<Utc>>,
}

/// Number of candidates whose share falls in one range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionBucket {
    /// Range label.
    pub label: String,
    /// Candidates in range.
    pub count: usize,
    /// `count` over all candidates, 0-1.
    pub fraction: f64,
}

/// Full ranking snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResults {
    /// All candidates, best first.
    pub entries: Vec<RankedCandidate>,
    /// Rank 1, only when it has at least one vote.
    pub winner: Option<RankedCandidate>,
    /// First three entries.
    pub top3: Vec<RankedCandidate>,
    /// Share histogram, in [`DISTRIBUTION_LABELS`] order.
    pub distribution: Vec<DistributionBucket>,
    /// Denominator used for percentages.
    pub total_votes: u64,
    /// When the snapshot was computed.
    pub computed_at: DateTime<Utc>,
}

/// Vote count of one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateTotal {
    /// Identifier.
    pub id: CandidateId,
    /// Display name.
    pub name: String,
    /// Finalized votes.
    pub vote_count: u64,
}

/// Vote counts without ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTotals {
    /// All finalized votes.
    pub total_votes: u64,
    /// Per-candidate counts.
    pub candidates: Vec<CandidateTotal>,
}

impl From<&RankedResults> for VoteTotals {
    fn from(results: &RankedResults) -> Self {
        Self {
            total_votes: results.total_votes,
            candidates: results
                .entries
                .iter()
                .map(|entry| CandidateTotal {
                    id: entry.id,
                    name: entry.name.clone(),
                    vote_count: entry.vote_count,
                })
                .collect(),
        }
    }
}

fn compare(a: &CandidateAggregate, b: &CandidateAggregate) -> Ordering {
    b.vote_count
        .cmp(&a.vote_count)
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.id.cmp(&b.id))
}

#[allow(clippy::cast_precision_loss)]
fn percentage(votes: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        votes as f64 / total as f64 * 100.0
    }
}

fn bucket_index(percentage: f64) -> usize {
    if percentage >= 50.0 {
        0
    } else if percentage >= 25.0 {
        1
    } else if percentage >= 10.0 {
        2
    } else if percentage >= 1.0 {
        3
    } else {
        4
    }
}

/// Rank candidates.
///
/// Order is vote count descending, ties by name ascending (then id, so the
/// order is total). Percentages are `votes / total_votes * 100`, zero when
/// there are no votes.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use voting_core::model::{CandidateAggregate, CandidateId};
/// use voting_core::results::compute_results;
///
/// let tally = |id, name: &str, votes| CandidateAggregate {
///     id: CandidateId(id),
///     name: name.into(),
///     description: String::new(),
///     member_count: 1,
///     vote_count: votes,
///     last_vote_at: None,
/// };
/// let results = compute_results(vec![tally(1, "A", 10), tally(2, "B", 20), tally(3, "C", 20)], 50, Utc::now());
/// let names: Vec<_> = results.entries.iter().map(|e| e.name.as_str()).collect();
/// assert_eq!(names, ["B", "C", "A"]);
/// assert_eq!(results.winner.map(|w| w.name).as_deref(), Some("B"));
/// ```
#[must_use]
pub fn compute_results(
    mut tallies: Vec<CandidateAggregate>,
    total_votes: u64,
    computed_at: DateTime<Utc>,
) -> RankedResults {
    tallies.sort_by(compare);

    let entries: Vec<RankedCandidate> = tallies
        .into_iter()
        .zip(1u32..)
        .map(|(tally, rank)| RankedCandidate {
            rank,
            id: tally.id,
            percentage: percentage(tally.vote_count, total_votes),
            name: tally.name,
            description: tally.description,
            member_count: tally.member_count,
            vote_count: tally.vote_count,
            last_vote_at: tally.last_vote_at,
        })
        .collect();

    let mut counts = [0usize; DISTRIBUTION_LABELS.len()];
    for entry in &entries {
        counts[bucket_index(entry.percentage)] += 1;
    }
    #[allow(clippy::cast_precision_loss)]
    let distribution = DISTRIBUTION_LABELS
        .iter()
        .zip(counts)
        .map(|(label, count)| DistributionBucket {
            label: (*label).to_string(),
            count,
            fraction: if entries.is_empty() {
                0.0
            } else {
                count as f64 / entries.len() as f64
            },
        })
        .collect();

    RankedResults {
        winner: entries.first().filter(|e| e.vote_count > 0).cloned(),
        top3: entries.iter().take(3).cloned().collect(),
        entries,
        distribution,
        total_votes,
        computed_at,
    }
}

struct ResultsFetcher<'a, S> {
    store: &'a S,
    timeout: Duration,
    now: DateTime<Utc>,
}

impl<S: VoterStore> Fetcher<RankedResults> for ResultsFetcher<'_, S> {
    async fn fetch(&self) -> Result<Option<RankedResults>> {
        let tallies = bounded(self.timeout, "candidate_tallies", self.store.candidate_tallies()).await?;
        let total = bounded(self.timeout, "total_votes", self.store.total_votes()).await?;
        Ok(Some(compute_results(tallies, total, self.now)))
    }
}

/// Cached rankings.
pub struct ResultsAggregator<S, C> {
    store: Arc<S>,
    aside: CacheAside<C>,
    keys: KeyNamespace,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    store_timeout: Duration,
}

impl<S, C> ResultsAggregator<S, C>
where
    S: VoterStore,
    C: CacheClient + Clone + 'static,
{
    /// Create an aggregator.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        aside: CacheAside<C>,
        keys: KeyNamespace,
        clock: Arc<dyn Clock>,
        ttl: Duration,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            aside,
            keys,
            clock,
            ttl,
            store_timeout,
        }
    }

    /// Current rankings, from cache when fresh.
    ///
    /// # Errors
    ///
    /// Returns `VotingError::Store` if the cache misses and the store fails.
    pub async fn results(&self) -> Result<RankedResults> {
        let fetcher = ResultsFetcher {
            store: self.store.as_ref(),
            timeout: self.store_timeout,
            now: self.clock.now(),
        };
        let results = self
            .aside
            .get_or_fetch(&self.keys.results(), self.ttl, &fetcher)
            .await?;
        // The fetcher always yields a value
        Ok(results.unwrap_or_else(|| compute_results(Vec::new(), 0, fetcher.now)))
    }

    /// Vote counts, without forcing a ranking recompute.
    ///
    /// # Errors
    ///
    /// Returns `VotingError::Store` if the cache misses and the store fails.
    pub async fn totals(&self) -> Result<VoteTotals> {
        if let Some(cached) = self.aside.read::<RankedResults>(&self.keys.results()).await {
            return Ok(VoteTotals::from(&cached));
        }

        let tallies = bounded(self.store_timeout, "candidate_tallies", self.store.candidate_tallies()).await?;
        let total_votes = bounded(self.store_timeout, "total_votes", self.store.total_votes()).await?;
        Ok(VoteTotals {
            total_votes,
            candidates: tallies
                .into_iter()
                .map(|tally| CandidateTotal {
                    id: tally.id,
                    name: tally.name,
                    vote_count: tally.vote_count,
                })
                .collect(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tally(id: u32, name: &str, votes: u64) -> CandidateAggregate {
        CandidateAggregate {
            id: CandidateId(id),
            name: name.to_string(),
            description: String::new(),
            member_count: 4,
            vote_count: votes,
            last_vote_at: None,
        }
    }

    #[test]
    fn test_ranking_ties_broken_by_name() {
        let results = compute_results(
            vec![tally(1, "A", 10), tally(3, "C", 20), tally(2, "B", 20)],
            50,
            Utc::now(),
        );

        let order: Vec<(u32, &str)> = results
            .entries
            .iter()
            .map(|e| (e.rank, e.name.as_str()))
            .collect();
        assert_eq!(order, [(1, "B"), (2, "C"), (3, "A")]);
        assert!((results.entries[0].percentage - 40.0).abs() < 1e-9);
        assert!((results.entries[2].percentage - 20.0).abs() < 1e-9);
        let sum: f64 = results.entries.iter().map(|e| e.percentage).sum();
        assert!((sum - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_votes_has_no_winner() {
        let results = compute_results(vec![tally(1, "A", 0), tally(2, "B", 0)], 0, Utc::now());
        assert!(results.winner.is_none());
        assert!(results.entries.iter().all(|e| e.percentage == 0.0));
        assert_eq!(results.distribution[4].count, 2);
        assert!((results.distribution[4].fraction - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_tallies() {
        let results = compute_results(Vec::new(), 0, Utc::now());
        assert!(results.entries.is_empty());
        assert!(results.top3.is_empty());
        assert_eq!(results.distribution.len(), DISTRIBUTION_LABELS.len());
        assert!(results.distribution.iter().all(|b| b.fraction == 0.0));
    }

    #[test]
    fn test_distribution_bucket_edges() {
        assert_eq!(bucket_index(100.0), 0);
        assert_eq!(bucket_index(50.0), 0);
        assert_eq!(bucket_index(49.99), 1);
        assert_eq!(bucket_index(25.0), 1);
        assert_eq!(bucket_index(10.0), 2);
        assert_eq!(bucket_index(1.0), 3);
        assert_eq!(bucket_index(0.99), 4);
    }

    #[test]
    fn test_top3_and_totals_projection() {
        let results = compute_results(
            vec![tally(1, "A", 1), tally(2, "B", 2), tally(3, "C", 3), tally(4, "D", 4)],
            10,
            Utc::now(),
        );
        let top: Vec<&str> = results.top3.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(top, ["D", "C", "B"]);

        let totals = VoteTotals::from(&results);
        assert_eq!(totals.total_votes, 10);
        assert_eq!(totals.candidates.len(), 4);
    }

    proptest! {
        #[test]
        fn prop_percentages_sum_to_100(votes in prop::collection::vec(0u64..10_000, 1..20)) {
            let total: u64 = votes.iter().sum();
            let tallies = votes
                .iter()
                .enumerate()
                .map(|(i, v)| tally(u32::try_from(i).unwrap() + 1, &format!("c{i}"), *v))
                .collect();
            let results = compute_results(tallies, total, Utc::now());

            let sum: f64 = results.entries.iter().map(|e| e.percentage).sum();
            if total == 0 {
                prop_assert!(sum == 0.0);
                prop_assert!(results.winner.is_none());
            } else {
                prop_assert!((sum - 100.0).abs() < 1e-6);
                prop_assert!(results.winner.is_some());
            }

            let bucketed: usize = results.distribution.iter().map(|b| b.count).sum();
            prop_assert_eq!(bucketed, votes.len());
        }

        #[test]
        fn prop_ranks_are_sequential_and_sorted(votes in prop::collection::vec(0u64..100, 0..20)) {
            let total: u64 = votes.iter().sum();
            let tallies = votes
                .iter()
                .enumerate()
                .map(|(i, v)| tally(u32::try_from(i).unwrap() + 1, &format!("c{i:02}"), *v))
                .collect();
            let results = compute_results(tallies, total, Utc::now());

            for (i, pair) in results.entries.windows(2).enumerate() {
                prop_assert_eq!(pair[0].rank as usize, i + 1);
                prop_assert!(pair[0].vote_count >= pair[1].vote_count);
                if pair[0].vote_count == pair[1].vote_count {
                    prop_assert!(pair[0].name <= pair[1].name);
                }
            }
        }
    }
}
