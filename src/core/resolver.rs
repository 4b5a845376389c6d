//! Turns untyped vendor payloads into validated [`CanonicalCandidate`]s.
//!
//! The resolver is the only place that deals with vendor field names and
//! stringly-typed values. It is pure: no I/O, and every failure is scoped to
//! the record being resolved.

use crate::core::equity::{CanonicalCandidate, RawRecord};
use crate::core::error::{AggregationError, Result};
use crate::core::isin;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::debug;

/// Currencies quoted in minor units: (code as sent by vendors, major code, divisor).
const MINOR_UNIT_CURRENCIES: [(&str, &str, i64); 5] = [
    ("GBX", "GBP", 100),
    ("GBp", "GBP", 100),
    ("ZAC", "ZAR", 100),
    ("ZAc", "ZAR", 100),
    ("ILA", "ILS", 100),
];

/// Field layout of one vendor's payloads. Keys may be dotted paths into
/// nested objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSchema {
    pub name_key: String,
    pub symbol_key: String,
    pub isin_key: Option<String>,
    pub exchange_key: Option<String>,
    pub mics_key: Option<String>,
    pub currency_key: String,
    pub price_key: Option<String>,
    pub market_cap_key: Option<String>,
    pub default_exchange: Option<String>,
}

/// Built-in payload layouts, selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaKind {
    Euronext,
    Lse,
    Xetra,
    #[default]
    Canonical,
}

impl SchemaKind {
    pub fn schema(self) -> FeedSchema {
        let key = |k: &str| Some(k.to_string());
        match self {
            SchemaKind::Euronext => FeedSchema {
                name_key: "name".to_string(),
                symbol_key: "symbol".to_string(),
                isin_key: key("isin"),
                exchange_key: None,
                mics_key: key("mics"),
                currency_key: "currency".to_string(),
                price_key: key("last_price"),
                market_cap_key: None,
                default_exchange: None,
            },
            SchemaKind::Lse => FeedSchema {
                name_key: "issuername".to_string(),
                symbol_key: "tidm".to_string(),
                isin_key: key("isin"),
                exchange_key: None,
                mics_key: key("mics"),
                currency_key: "currency".to_string(),
                price_key: key("lastprice"),
                market_cap_key: key("marketcapitalization"),
                default_exchange: key("XLON"),
            },
            SchemaKind::Xetra => FeedSchema {
                name_key: "name".to_string(),
                symbol_key: "wkn".to_string(),
                isin_key: key("isin"),
                exchange_key: None,
                mics_key: key("mic"),
                currency_key: "currency".to_string(),
                price_key: key("overview.lastPrice"),
                market_cap_key: key("key_data.marketCapitalisation"),
                default_exchange: key("XETR"),
            },
            SchemaKind::Canonical => FeedSchema {
                name_key: "name".to_string(),
                symbol_key: "symbol".to_string(),
                isin_key: key("isin"),
                exchange_key: key("exchange"),
                mics_key: key("mics"),
                currency_key: "currency".to_string(),
                price_key: key("price"),
                market_cap_key: key("market_cap"),
                default_exchange: None,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordResolver {
    schemas: HashMap<String, FeedSchema>,
    fallback: FeedSchema,
}

impl Default for RecordResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordResolver {
    /// A resolver that reads every source with the canonical layout.
    pub fn new() -> Self {
        Self {
            schemas: HashMap::new(),
            fallback: SchemaKind::Canonical.schema(),
        }
    }

    pub fn with_schema(mut self, source: &str, schema: FeedSchema) -> Self {
        self.schemas.insert(source.to_string(), schema);
        self
    }

    fn schema_for(&self, source: &str) -> &FeedSchema {
        self.schemas.get(source).unwrap_or(&self.fallback)
    }

    pub fn resolve(&self, raw: &RawRecord) -> Result<CanonicalCandidate> {
        let schema = self.schema_for(&raw.source);
        let invalid = |reason: String| AggregationError::invalid_record(&raw.source, reason);

        let name = text(raw.get_path(&schema.name_key))
            .map(|n| normalise_name(&n))
            .filter(|n| !n.is_empty())
            .ok_or_else(|| invalid(format!("missing {}", schema.name_key)))?;

        let symbol = text(raw.get_path(&schema.symbol_key))
            .map(|s| s.to_uppercase())
            .ok_or_else(|| invalid(format!("missing {}", schema.symbol_key)))?;

        let isin = match schema.isin_key.as_deref().and_then(|k| text(raw.get_path(k))) {
            Some(value) => {
                let value = value.to_uppercase();
                if !isin::is_valid(&value) {
                    return Err(invalid(format!("ISIN {value} fails validation")));
                }
                Some(value)
            }
            None => None,
        };

        let mut mics = match schema.mics_key.as_deref() {
            Some(key) => parse_mics(raw.get_path(key)).map_err(&invalid)?,
            None => Vec::new(),
        };

        let explicit_exchange = schema
            .exchange_key
            .as_deref()
            .and_then(|k| text(raw.get_path(k)))
            .map(|e| e.to_uppercase());
        let exchange = match explicit_exchange.or_else(|| mics.first().cloned()) {
            Some(exchange) => exchange,
            None => {
                let default = schema
                    .default_exchange
                    .clone()
                    .ok_or_else(|| invalid("no exchange or MIC".to_string()))?;
                mics.push(default.clone());
                default
            }
        };

        let raw_currency = text(raw.get_path(&schema.currency_key))
            .ok_or_else(|| invalid(format!("missing {}", schema.currency_key)))?;
        let (currency, divisor) = normalise_currency(&raw_currency).map_err(&invalid)?;

        let monetary = |key: &Option<String>| -> Result<Option<Decimal>> {
            let Some(key) = key.as_deref() else {
                return Ok(None);
            };
            let value = parse_decimal(raw.get_path(key))
                .map_err(|e| invalid(format!("{key}: {e}")))?;
            Ok(value.map(|v| v / divisor))
        };
        let price = monetary(&schema.price_key)?;
        let market_cap = monetary(&schema.market_cap_key)?;

        debug!(
            source = %raw.source,
            symbol = %symbol,
            exchange = %exchange,
            has_isin = isin.is_some(),
            "Resolved vendor record"
        );

        Ok(CanonicalCandidate {
            isin,
            symbol,
            exchange,
            name,
            currency,
            mics,
            price,
            market_cap,
            source: raw.source.clone(),
        })
    }

    /// True when the vendor supplied a non-blank ISIN field.
    pub fn has_isin(&self, raw: &RawRecord) -> bool {
        self.schema_for(&raw.source)
            .isin_key
            .as_deref()
            .and_then(|k| text(raw.get_path(k)))
            .is_some()
    }

    /// Best-effort `(name, exchange)` pair for identifier lookup, read with
    /// the same rules as [`RecordResolver::resolve`] but without validation.
    pub fn lookup_key(&self, raw: &RawRecord) -> Option<(String, String)> {
        let schema = self.schema_for(&raw.source);
        let name = text(raw.get_path(&schema.name_key)).map(|n| normalise_name(&n))?;
        let exchange = schema
            .exchange_key
            .as_deref()
            .and_then(|k| text(raw.get_path(k)))
            .or_else(|| {
                schema
                    .mics_key
                    .as_deref()
                    .and_then(|k| parse_mics(raw.get_path(k)).ok())
                    .and_then(|mics| mics.into_iter().next())
            })
            .or_else(|| schema.default_exchange.clone())?;
        Some((name, exchange.to_uppercase()))
    }

    /// Returns a copy of `raw` carrying `isin` in the schema's ISIN field.
    pub fn with_isin(&self, raw: &RawRecord, isin: &str) -> RawRecord {
        let mut enriched = raw.clone();
        if let Some(key) = self.schema_for(&raw.source).isin_key.as_deref() {
            enriched
                .fields
                .insert(key.to_string(), Value::String(isin.to_string()));
        }
        enriched
    }
}

/// Trimmed, non-empty text for string or numeric JSON values.
fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Punctuation becomes whitespace, runs of whitespace collapse, and the
/// result is uppercased.
pub fn normalise_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

fn normalise_currency(raw: &str) -> std::result::Result<(String, Decimal), String> {
    // `GBp` and `GBP` differ only by case, so mixed-case codes match exactly.
    let minor = MINOR_UNIT_CURRENCIES
        .iter()
        .find(|(code, _, _)| *code == raw)
        .or_else(|| {
            MINOR_UNIT_CURRENCIES.iter().find(|(code, _, _)| {
                code.chars().all(|c| c.is_ascii_uppercase()) && code.eq_ignore_ascii_case(raw)
            })
        });
    if let Some((_, major, divisor)) = minor {
        return Ok((major.to_string(), Decimal::from(*divisor)));
    }

    let code = raw.to_uppercase();
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase()) {
        Ok((code, Decimal::ONE))
    } else {
        Err(format!("invalid currency code {raw:?}"))
    }
}

fn parse_mics(value: Option<&Value>) -> std::result::Result<Vec<String>, String> {
    let values: Vec<&Value> = match value {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items.iter().collect(),
        Some(other) => vec![other],
    };

    let mut mics: Vec<String> = Vec::new();
    for item in values {
        let Some(mic) = text(Some(item)).map(|m| m.to_uppercase()) else {
            continue;
        };
        if mic.len() != 4 || !mic.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(format!("invalid MIC code {mic:?}"));
        }
        if !mics.contains(&mic) {
            mics.push(mic);
        }
    }
    Ok(mics)
}

/// Parses a non-negative decimal from a JSON number or a string using either
/// US (`1,234.5`) or European (`1.234,5`) separators.
pub fn parse_decimal(value: Option<&Value>) -> std::result::Result<Option<Decimal>, String> {
    let raw = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) => return Err(format!("unexpected value {other}")),
    };
    if raw.is_empty() {
        return Ok(None);
    }

    let unsigned = raw.strip_prefix('+').unwrap_or(&raw);
    if unsigned.starts_with('-') {
        return Err(format!("negative value {raw:?} not allowed"));
    }

    if unsigned.contains(['e', 'E']) {
        return Decimal::from_scientific(unsigned)
            .map(Some)
            .map_err(|e| format!("invalid number {raw:?}: {e}"));
    }

    let normalised = match (unsigned.rfind(','), unsigned.rfind('.')) {
        (Some(comma), Some(dot)) if comma < dot => unsigned.replace(',', ""),
        (Some(_), Some(_)) => unsigned.replace('.', "").replacen(',', ".", 1),
        (Some(_), None) => unsigned.replacen(',', ".", 1),
        _ => unsigned.to_string(),
    };

    let well_formed = !normalised.is_empty()
        && normalised.chars().all(|c| c.is_ascii_digit() || c == '.')
        && normalised.matches('.').count() <= 1
        && !normalised.starts_with('.')
        && !normalised.ends_with('.');
    if !well_formed {
        return Err(format!("invalid number {raw:?}"));
    }

    Decimal::from_str(&normalised)
        .map(Some)
        .map_err(|e| format!("invalid number {raw:?}: {e}"))
}
