use crate::errors::{EngineError, EngineResult};
use crate::models::contract::{format_expiry_code, OptionContract, OptionSide};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// One option's market data, attached to its parsed contract.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Quote {
    pub symbol: String,
    pub contract: OptionContract,
    /// Annualized mark implied vol as a fraction (0.55 = 55%).
    pub mark_iv: f64,
    /// Signed delta as a fraction.
    pub delta: f64,
}

impl Quote {
    pub fn new(symbol: &str, mark_iv: f64, delta: f64) -> EngineResult<Self> {
        if !mark_iv.is_finite() || !delta.is_finite() {
            return Err(EngineError::Parse(format!(
                "{symbol}: non-finite quote (iv={mark_iv}, delta={delta})"
            )));
        }
        Ok(Self {
            symbol: symbol.to_string(),
            contract: OptionContract::parse(symbol)?,
            mark_iv,
            delta,
        })
    }
}

/// A contract left out of this cycle, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SkippedContract {
    pub symbol: String,
    pub reason: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ExpiryInfo {
    pub expiry: DateTime<Utc>,
    pub code: String,
    /// Days to expiry rounded to one decimal, as displayed.
    pub days: f64,
}

/// All quotes of one expiry, keyed by `(strike, side)`.
#[derive(Debug, Clone)]
pub struct ExpiryChain {
    pub expiry: DateTime<Utc>,
    quotes: BTreeMap<(Decimal, OptionSide), Quote>,
}

impl ExpiryChain {
    pub fn new(expiry: DateTime<Utc>) -> Self {
        Self {
            expiry,
            quotes: BTreeMap::new(),
        }
    }

    /// Insert a quote. Quotes for other expiries are rejected.
    pub fn insert(&mut self, quote: Quote) -> EngineResult<()> {
        if quote.contract.expiry != self.expiry {
            return Err(EngineError::InvalidArgument(format!(
                "{} does not expire at {}",
                quote.symbol, self.expiry
            )));
        }
        let key = (quote.contract.strike, quote.contract.side);
        if let Some(prev) = self.quotes.insert(key, quote) {
            tracing::warn!(symbol = %prev.symbol, "duplicate quote replaced");
        }
        Ok(())
    }

    #[inline]
    pub fn find(&self, strike: Decimal, side: OptionSide) -> Option<&Quote> {
        self.quotes.get(&(strike, side))
    }

    /// Calls in ascending strike order.
    pub fn calls(&self) -> impl Iterator<Item = &Quote> {
        self.quotes
            .values()
            .filter(|q| q.contract.side == OptionSide::Call)
    }

    /// Distinct strikes (either side), ascending.
    pub fn strikes(&self) -> Vec<Decimal> {
        let mut strikes: Vec<Decimal> = self.quotes.keys().map(|(k, _)| *k).collect();
        strikes.dedup();
        strikes
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    pub fn code(&self) -> String {
        format_expiry_code(self.expiry.date_naive())
    }
}

/// Quote snapshot for one base asset, grouped by expiry.
#[derive(Debug, Clone, Default)]
pub struct OptionChain {
    expiries: BTreeMap<DateTime<Utc>, ExpiryChain>,
}

impl OptionChain {
    pub fn from_quotes(quotes: impl IntoIterator<Item = Quote>) -> Self {
        let mut chain = Self::default();
        for quote in quotes {
            let expiry = quote.contract.expiry;
            let slot = chain
                .expiries
                .entry(expiry)
                .or_insert_with(|| ExpiryChain::new(expiry));
            if let Err(e) = slot.insert(quote) {
                tracing::warn!(error = %e, "quote not added to chain");
            }
        }
        chain
    }

    /// Expiries still open at `now`, soonest first.
    pub fn expiries(&self, now: DateTime<Utc>) -> Vec<ExpiryInfo> {
        self.expiries
            .values()
            .filter(|e| e.expiry > now)
            .map(|e| ExpiryInfo {
                expiry: e.expiry,
                code: e.code(),
                days: ((e.expiry - now).num_milliseconds() as f64 / 8_640_000.0).round() / 10.0,
            })
            .collect()
    }

    /// The requested expiry date, or the soonest unexpired one.
    pub fn select(&self, requested: Option<NaiveDate>, now: DateTime<Utc>) -> EngineResult<&ExpiryChain> {
        match requested {
            Some(date) => {
                let found = self
                    .expiries
                    .values()
                    .find(|e| e.expiry.date_naive() == date)
                    .ok_or_else(|| {
                        EngineError::Lookup(format!("no listed expiry {}", format_expiry_code(date)))
                    })?;
                if found.expiry <= now {
                    return Err(EngineError::Lookup(format!(
                        "expiry {} has passed",
                        found.code()
                    )));
                }
                Ok(found)
            }
            None => self
                .expiries
                .values()
                .find(|e| e.expiry > now)
                .ok_or_else(|| EngineError::Lookup("no unexpired expiry listed".into())),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.expiries.is_empty()
    }
}
