//! Groups per-source candidates that describe the same security.
//!
//! ISIN equality is authoritative. Candidates without an ISIN fall back to a
//! name-similarity test restricted to members listed on the same exchange.

use crate::core::equity::{CanonicalCandidate, MatchEvidence};
use crate::core::similarity::{NameSimilarity, TokenSetRatio};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.90;

#[derive(Debug, Clone, PartialEq)]
pub struct ClusterMember {
    pub candidate: CanonicalCandidate,
    pub evidence: MatchEvidence,
}

/// Candidates judged to denote one security, in the order they joined.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityCluster {
    pub isin: Option<String>,
    pub members: Vec<ClusterMember>,
}

impl IdentityCluster {
    fn seeded(candidate: CanonicalCandidate, evidence: MatchEvidence) -> Self {
        Self {
            isin: candidate.isin.clone(),
            members: vec![ClusterMember {
                candidate,
                evidence,
            }],
        }
    }

    pub fn candidates(&self) -> impl Iterator<Item = &CanonicalCandidate> {
        self.members.iter().map(|m| &m.candidate)
    }
}

pub struct IdentityMatcher {
    scorer: Arc<dyn NameSimilarity>,
    threshold: f64,
}

impl Default for IdentityMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_SIMILARITY_THRESHOLD)
    }
}

impl IdentityMatcher {
    pub fn new(threshold: f64) -> Self {
        Self::with_scorer(Arc::new(TokenSetRatio), threshold)
    }

    pub fn with_scorer(scorer: Arc<dyn NameSimilarity>, threshold: f64) -> Self {
        Self { scorer, threshold }
    }

    pub fn cluster(&self, candidates: Vec<CanonicalCandidate>) -> Vec<IdentityCluster> {
        let total = candidates.len();
        let (with_isin, without_isin): (Vec<_>, Vec<_>) =
            candidates.into_iter().partition(|c| c.isin.is_some());

        let mut clusters: Vec<IdentityCluster> = Vec::new();
        let mut by_isin: HashMap<String, usize> = HashMap::new();

        for candidate in with_isin {
            let Some(isin) = candidate.isin.clone() else {
                continue;
            };
            match by_isin.get(&isin) {
                Some(&index) => clusters[index].members.push(ClusterMember {
                    candidate,
                    evidence: MatchEvidence::Isin,
                }),
                None => {
                    by_isin.insert(isin, clusters.len());
                    clusters.push(IdentityCluster::seeded(candidate, MatchEvidence::Isin));
                }
            }
        }

        for candidate in without_isin {
            match self.best_cluster(&clusters, &candidate) {
                Some((index, score)) => {
                    debug!(
                        symbol = %candidate.symbol,
                        source = %candidate.source,
                        score,
                        "Joined cluster by name similarity"
                    );
                    clusters[index].members.push(ClusterMember {
                        candidate,
                        evidence: MatchEvidence::Similarity(score),
                    });
                }
                None => clusters.push(IdentityCluster::seeded(candidate, MatchEvidence::Seed)),
            }
        }

        for cluster in &mut clusters {
            if cluster.isin.is_none() && cluster.members.len() == 1 {
                cluster.members[0].evidence = MatchEvidence::Unmatched;
            }
        }

        info!(
            "Clustered {} candidates into {} identities",
            total,
            clusters.len()
        );
        clusters
    }

    /// Highest-scoring cluster at or above the threshold; exact ties go to
    /// the lexicographically smallest ISIN, then to the earliest cluster.
    fn best_cluster(
        &self,
        clusters: &[IdentityCluster],
        candidate: &CanonicalCandidate,
    ) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;

        for (index, cluster) in clusters.iter().enumerate() {
            let Some(score) = cluster
                .candidates()
                .filter(|member| member.exchange == candidate.exchange)
                .map(|member| self.scorer.score(&candidate.name, &member.name))
                .reduce(f64::max)
            else {
                continue;
            };
            if score < self.threshold {
                continue;
            }

            let better = match best {
                None => true,
                Some((current, current_score)) => {
                    score > current_score
                        || (score == current_score
                            && isin_precedes(&cluster.isin, &clusters[current].isin))
                }
            };
            if better {
                best = Some((index, score));
            }
        }

        best
    }
}

fn isin_precedes(a: &Option<String>, b: &Option<String>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a < b,
        (Some(_), None) => true,
        _ => false,
    }
}
