//! Record types flowing through the pipeline: raw vendor payloads, validated
//! per-source candidates and the final merged profiles.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::Display;

/// An untyped vendor payload tagged with the feed it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub source: String,
    pub fields: Map<String, Value>,
}

impl RawRecord {
    pub fn new(source: &str, fields: Map<String, Value>) -> Self {
        Self {
            source: source.to_string(),
            fields,
        }
    }

    /// Builds a record from a JSON value; anything other than an object is
    /// kept as an empty field map so the resolver can reject it per record.
    pub fn from_value(source: &str, value: Value) -> Self {
        match value {
            Value::Object(fields) => Self::new(source, fields),
            _ => Self::new(source, Map::new()),
        }
    }

    /// Looks up a field by a dotted path, e.g. `overview.lastPrice`.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.fields.get(parts.next()?)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }
}

/// Monetary fields subject to base-currency conversion during merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonetaryField {
    Price,
    MarketCap,
}

impl MonetaryField {
    pub const ALL: [MonetaryField; 2] = [MonetaryField::Price, MonetaryField::MarketCap];
}

impl Display for MonetaryField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                MonetaryField::Price => "price",
                MonetaryField::MarketCap => "market_cap",
            }
        )
    }
}

/// The validated, per-source view of one security.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalCandidate {
    pub isin: Option<String>,
    pub symbol: String,
    pub exchange: String,
    pub name: String,
    pub currency: String,
    pub mics: Vec<String>,
    pub price: Option<Decimal>,
    pub market_cap: Option<Decimal>,
    pub source: String,
}

impl CanonicalCandidate {
    pub fn monetary(&self, field: MonetaryField) -> Option<Decimal> {
        match field {
            MonetaryField::Price => self.price,
            MonetaryField::MarketCap => self.market_cap,
        }
    }
}

/// How a contributing record came to be part of its identity cluster.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "score", rename_all = "snake_case")]
pub enum MatchEvidence {
    /// Grouped by exact ISIN equality.
    Isin,
    /// First member of a cluster without an ISIN.
    Seed,
    /// Joined through the name/exchange similarity test.
    Similarity(f64),
    /// Lone record without an ISIN; carried through as low confidence.
    Unmatched,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceTag {
    pub source: String,
    pub evidence: MatchEvidence,
}

/// A monetary field left empty because no contributing rate could be found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedField {
    pub field: MonetaryField,
    pub currencies: Vec<String>,
}

/// The merged, base-currency record for one real-world security.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isin: Option<String>,
    pub symbol: String,
    pub exchange: String,
    pub name: String,
    pub currency: String,
    pub mics: Vec<String>,
    pub trading_currencies: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_cap: Option<Decimal>,
    pub sources: Vec<SourceTag>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unresolved: Vec<UnresolvedField>,
}

impl EquityProfile {
    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.source.as_str()).collect()
    }

    pub fn is_low_confidence(&self) -> bool {
        self.sources
            .iter()
            .all(|s| s.evidence == MatchEvidence::Unmatched)
    }

    /// Stable identity key used by stores: ISIN when known, otherwise
    /// `symbol@exchange:name`. Unmatched listings can share a ticker and
    /// venue, so the name is part of the fallback.
    pub fn key(&self) -> String {
        match &self.isin {
            Some(isin) => isin.clone(),
            None => format!("{}@{}:{}", self.symbol, self.exchange, self.name),
        }
    }

    pub(crate) fn set_monetary(&mut self, field: MonetaryField, value: Option<Decimal>) {
        match field {
            MonetaryField::Price => self.price = value,
            MonetaryField::MarketCap => self.market_cap = value,
        }
    }
}
