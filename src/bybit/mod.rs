pub mod client;
pub mod types;

use crate::chain::{OptionChain, Quote, SkippedContract};
use crate::errors::{EngineError, EngineResult};
use client::BybitClient;
use rust_decimal::Decimal;
use types::OptionTicker;

/// One fetch: spot plus the parsed option chain for a base coin.
#[derive(Debug, Clone)]
pub struct MarketSnapshot {
    pub spot: Decimal,
    pub chain: OptionChain,
    pub skipped: Vec<SkippedContract>,
}

/// Fetch option tickers then spot. Both must succeed for the snapshot to be
/// usable; the caller retries on its next scheduled cycle.
pub async fn fetch_market(
    client: &BybitClient,
    base_coin: &str,
    excluded_settle_tag: &str,
) -> EngineResult<MarketSnapshot> {
    let tickers = client.get_option_tickers(base_coin).await?;
    let spot = client.get_spot_price(base_coin).await?;

    let (chain, skipped) = build_chain(tickers, excluded_settle_tag);
    if chain.is_empty() {
        return Err(EngineError::MarketData(format!(
            "no usable {base_coin} option quotes ({} skipped)",
            skipped.len()
        )));
    }

    tracing::debug!(
        base = base_coin,
        spot = %spot,
        skipped = skipped.len(),
        "market snapshot fetched"
    );

    Ok(MarketSnapshot { spot, chain, skipped })
}

/// Drop other-settlement contracts, parse the rest. Unparseable tickers are
/// reported, never fatal.
pub fn build_chain(
    tickers: Vec<OptionTicker>,
    excluded_settle_tag: &str,
) -> (OptionChain, Vec<SkippedContract>) {
    let mut skipped = Vec::new();
    let mut quotes = Vec::with_capacity(tickers.len());

    for t in tickers {
        if !excluded_settle_tag.is_empty() && t.symbol.contains(excluded_settle_tag) {
            continue;
        }
        let parsed = match (t.mark_iv_f64(), t.delta_f64()) {
            (Some(iv), Some(delta)) => Quote::new(&t.symbol, iv, delta),
            _ => Err(EngineError::Parse(format!("{}: missing markIv or delta", t.symbol))),
        };
        match parsed {
            Ok(q) => quotes.push(q),
            Err(e) => {
                tracing::warn!(symbol = %t.symbol, error = %e, "ticker skipped");
                skipped.push(SkippedContract {
                    symbol: t.symbol,
                    reason: e.to_string(),
                });
            }
        }
    }

    (OptionChain::from_quotes(quotes), skipped)
}
