//! Collapses an identity cluster into one [`EquityProfile`].

use crate::core::currency::ExchangeRateSnapshot;
use crate::core::equity::{
    CanonicalCandidate, EquityProfile, MonetaryField, SourceTag, UnresolvedField,
};
use crate::core::matcher::{ClusterMember, IdentityCluster};
use tracing::{debug, warn};

/// Fixed ranking of feeds, most trusted first. Feeds missing from the list
/// rank after every listed feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourcePriority {
    ranked: Vec<String>,
}

impl SourcePriority {
    pub fn new<I, S>(ranked: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ranked: ranked.into_iter().map(Into::into).collect(),
        }
    }

    /// Appends the `sources` not ranked yet, in the order given. Used with
    /// feed declaration order so unlisted feeds rank after every listed feed
    /// and among themselves as declared.
    pub fn then<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for source in sources {
            let source = source.into();
            if !self.ranked.contains(&source) {
                self.ranked.push(source);
            }
        }
        self
    }

    pub fn rank(&self, source: &str) -> usize {
        self.ranked
            .iter()
            .position(|s| s == source)
            .unwrap_or(self.ranked.len())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MergeEngine {
    priority: SourcePriority,
}

impl MergeEngine {
    pub fn new(priority: SourcePriority) -> Self {
        Self { priority }
    }

    /// Ranks sources missing from the priority list by declaration order.
    pub fn with_declared_sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.priority = self.priority.then(sources);
        self
    }

    /// Members sorted by source rank; equal ranks keep their cluster order.
    fn by_priority<'a>(&self, cluster: &'a IdentityCluster) -> Vec<&'a ClusterMember> {
        let mut members: Vec<&ClusterMember> = cluster.members.iter().collect();
        members.sort_by_key(|m| self.priority.rank(&m.candidate.source));
        members
    }

    /// Identity fields come from the sole ISIN-bearing member when there is
    /// exactly one, otherwise from the most frequent value. Monetary fields
    /// come from the highest-priority member whose value converts into the
    /// snapshot's base currency.
    pub fn merge(&self, cluster: &IdentityCluster, rates: &ExchangeRateSnapshot) -> EquityProfile {
        let members = self.by_priority(cluster);
        let candidates: Vec<&CanonicalCandidate> = members.iter().map(|m| &m.candidate).collect();

        let with_isin: Vec<&&CanonicalCandidate> =
            candidates.iter().filter(|c| c.isin.is_some()).collect();
        let (isin, symbol, exchange, name) = match with_isin.as_slice() {
            [authority] => (
                authority.isin.clone(),
                authority.symbol.clone(),
                authority.exchange.clone(),
                authority.name.clone(),
            ),
            _ => (
                most_frequent(candidates.iter().filter_map(|c| c.isin.as_deref())),
                most_frequent(candidates.iter().map(|c| c.symbol.as_str())).unwrap_or_default(),
                most_frequent(candidates.iter().map(|c| c.exchange.as_str())).unwrap_or_default(),
                most_frequent(candidates.iter().map(|c| c.name.as_str())).unwrap_or_default(),
            ),
        };

        let mut mics: Vec<String> = Vec::new();
        let mut trading_currencies: Vec<String> = Vec::new();
        for candidate in &candidates {
            for mic in &candidate.mics {
                if !mics.contains(mic) {
                    mics.push(mic.clone());
                }
            }
            if !trading_currencies.contains(&candidate.currency) {
                trading_currencies.push(candidate.currency.clone());
            }
        }

        let mut profile = EquityProfile {
            isin,
            symbol,
            exchange,
            name,
            currency: rates.base().to_string(),
            mics,
            trading_currencies,
            price: None,
            market_cap: None,
            sources: members
                .iter()
                .map(|m| SourceTag {
                    source: m.candidate.source.clone(),
                    evidence: m.evidence,
                })
                .collect(),
            unresolved: Vec::new(),
        };

        for field in MonetaryField::ALL {
            let mut failed_currencies: Vec<String> = Vec::new();
            let mut merged = None;

            for candidate in &candidates {
                let Some(amount) = candidate.monetary(field) else {
                    continue;
                };
                match rates.convert(amount, &candidate.currency) {
                    Ok(value) => {
                        merged = Some(value);
                        break;
                    }
                    Err(e) => {
                        debug!(
                            source = %candidate.source,
                            %field,
                            "Skipping value: {}",
                            e
                        );
                        if !failed_currencies.contains(&candidate.currency) {
                            failed_currencies.push(candidate.currency.clone());
                        }
                    }
                }
            }

            if merged.is_none() && !failed_currencies.is_empty() {
                warn!(
                    "{} for {} left empty, no rate for {:?}",
                    field,
                    profile.key(),
                    failed_currencies
                );
                profile.unresolved.push(UnresolvedField {
                    field,
                    currencies: failed_currencies,
                });
            }
            profile.set_monetary(field, merged);
        }

        profile
    }
}

/// Most common value; ties go to the value seen first.
fn most_frequent<'a>(values: impl Iterator<Item = &'a str>) -> Option<String> {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for value in values {
        match counts.iter_mut().find(|(v, _)| *v == value) {
            Some((_, count)) => *count += 1,
            None => counts.push((value, 1)),
        }
    }

    let mut best: Option<(&str, usize)> = None;
    for (value, count) in counts {
        if best.is_none_or(|(_, top)| count > top) {
            best = Some((value, count));
        }
    }
    best.map(|(value, _)| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::equity::MatchEvidence;
    use rust_decimal::Decimal;
    use std::collections::HashMap;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn rates() -> ExchangeRateSnapshot {
        ExchangeRateSnapshot::with_rates(
            "USD",
            HashMap::from([
                ("EUR".to_string(), dec("0.5")),
                ("GBP".to_string(), dec("0.8")),
            ]),
        )
    }

    fn candidate(source: &str, isin: Option<&str>, currency: &str) -> CanonicalCandidate {
        CanonicalCandidate {
            isin: isin.map(str::to_string),
            symbol: "AIR".to_string(),
            exchange: "XPAR".to_string(),
            name: "AIRBUS".to_string(),
            currency: currency.to_string(),
            mics: vec!["XPAR".to_string()],
            price: None,
            market_cap: None,
            source: source.to_string(),
        }
    }

    fn cluster(members: Vec<CanonicalCandidate>) -> IdentityCluster {
        IdentityCluster {
            isin: members.iter().find_map(|c| c.isin.clone()),
            members: members
                .into_iter()
                .map(|candidate| ClusterMember {
                    evidence: if candidate.isin.is_some() {
                        MatchEvidence::Isin
                    } else {
                        MatchEvidence::Similarity(0.95)
                    },
                    candidate,
                })
                .collect(),
        }
    }

    #[test]
    fn test_source_priority_rank() {
        let priority = SourcePriority::new(["euronext", "lse"]);
        assert_eq!(priority.rank("euronext"), 0);
        assert_eq!(priority.rank("lse"), 1);
        assert_eq!(priority.rank("xetra"), 2);
        assert_eq!(priority.rank("vendor"), 2);
    }

    #[test]
    fn test_declared_sources_rank_after_listed_ones() {
        let priority = SourcePriority::new(["lse"]).then(["xetra", "lse", "euronext"]);
        assert_eq!(priority.rank("lse"), 0);
        assert_eq!(priority.rank("xetra"), 1);
        assert_eq!(priority.rank("euronext"), 2);
        assert_eq!(priority.rank("vendor"), 3);
    }

    #[test]
    fn test_highest_priority_price_wins_after_conversion() {
        let mut a = candidate("a", Some("NL0000235190"), "EUR");
        a.price = Some(dec("100"));
        let mut b = candidate("b", Some("NL0000235190"), "GBP");
        b.price = Some(dec("90"));

        let engine = MergeEngine::new(SourcePriority::new(["a", "b"]));
        let profile = engine.merge(&cluster(vec![b, a]), &rates());

        assert_eq!(profile.price, Some(dec("200.00")));
        assert_eq!(profile.currency, "USD");
        assert_eq!(profile.source_names(), vec!["a", "b"]);
        assert_eq!(profile.trading_currencies, vec!["EUR".to_string(), "GBP".to_string()]);
    }

    #[test]
    fn test_missing_market_cap_falls_through() {
        let mut a = candidate("a", Some("NL0000235190"), "EUR");
        a.price = Some(dec("100"));
        let mut b = candidate("b", Some("NL0000235190"), "GBP");
        b.market_cap = Some(dec("800"));

        let engine = MergeEngine::new(SourcePriority::new(["a", "b"]));
        let profile = engine.merge(&cluster(vec![a, b]), &rates());

        assert_eq!(profile.price, Some(dec("200.00")));
        assert_eq!(profile.market_cap, Some(dec("1000.00")));
    }

    #[test]
    fn test_unavailable_rate_falls_through_to_next_source() {
        let mut a = candidate("a", Some("NL0000235190"), "CHF");
        a.price = Some(dec("100"));
        let mut b = candidate("b", Some("NL0000235190"), "GBP");
        b.price = Some(dec("90"));

        let engine = MergeEngine::new(SourcePriority::new(["a", "b"]));
        let profile = engine.merge(&cluster(vec![a, b]), &rates());

        assert_eq!(profile.price, Some(dec("112.50")));
        assert!(profile.unresolved.is_empty());
    }

    #[test]
    fn test_all_conversions_failing_is_reported() {
        let mut a = candidate("a", Some("NL0000235190"), "CHF");
        a.price = Some(dec("100"));

        let profile = MergeEngine::default().merge(&cluster(vec![a]), &rates());

        assert_eq!(profile.price, None);
        assert_eq!(
            profile.unresolved,
            vec![UnresolvedField {
                field: MonetaryField::Price,
                currencies: vec!["CHF".to_string()],
            }]
        );
    }

    #[test]
    fn test_absent_fields_are_omitted_not_zeroed() {
        let a = candidate("a", Some("NL0000235190"), "EUR");
        let profile = MergeEngine::default().merge(&cluster(vec![a]), &rates());
        assert_eq!(profile.price, None);
        assert_eq!(profile.market_cap, None);
        assert!(profile.unresolved.is_empty());
    }

    #[test]
    fn test_sole_isin_member_supplies_identity() {
        let mut authority = candidate("low", Some("NL0000235190"), "EUR");
        authority.name = "AIRBUS SE".to_string();
        let fuzzy_one = candidate("a", None, "EUR");
        let fuzzy_two = candidate("b", None, "EUR");

        let engine = MergeEngine::new(SourcePriority::new(["a", "b", "low"]));
        let profile = engine.merge(&cluster(vec![authority, fuzzy_one, fuzzy_two]), &rates());

        assert_eq!(profile.isin.as_deref(), Some("NL0000235190"));
        assert_eq!(profile.name, "AIRBUS SE");
        assert_eq!(profile.source_names(), vec!["a", "b", "low"]);
    }

    #[test]
    fn test_most_frequent_identity_with_priority_tie_break() {
        let mut a = candidate("a", None, "EUR");
        a.name = "AIRBUS GROUP".to_string();
        let mut b = candidate("b", None, "EUR");
        b.name = "AIRBUS".to_string();
        let mut c = candidate("c", None, "EUR");
        c.name = "AIRBUS".to_string();

        let engine = MergeEngine::new(SourcePriority::new(["a", "b", "c"]));
        let profile = engine.merge(&cluster(vec![a.clone(), b.clone(), c]), &rates());
        assert_eq!(profile.name, "AIRBUS");
        assert_eq!(profile.isin, None);

        let profile = engine.merge(&cluster(vec![b, a]), &rates());
        assert_eq!(profile.name, "AIRBUS GROUP");
    }

    #[test]
    fn test_mics_are_unioned_in_priority_order() {
        let mut a = candidate("a", Some("NL0000235190"), "EUR");
        a.mics = vec!["XPAR".to_string()];
        let mut b = candidate("b", Some("NL0000235190"), "EUR");
        b.mics = vec!["XETR".to_string(), "XPAR".to_string()];

        let engine = MergeEngine::new(SourcePriority::new(["b", "a"]));
        let profile = engine.merge(&cluster(vec![a, b]), &rates());
        assert_eq!(profile.mics, vec!["XETR".to_string(), "XPAR".to_string()]);
    }

    #[test]
    fn test_most_frequent() {
        assert_eq!(most_frequent(["x", "y", "y"].into_iter()), Some("y".to_string()));
        assert_eq!(most_frequent(["x", "y"].into_iter()), Some("x".to_string()));
        assert_eq!(most_frequent(std::iter::empty()), None);
    }
}
