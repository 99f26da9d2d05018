use super::types::*;
use crate::errors::{EngineError, EngineResult};
use reqwest::Client;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Bybit v5 public market-data client. All methods return Result, never panic.
#[derive(Clone)]
pub struct BybitClient {
    client: Client,
    base_url: String,
}

impl BybitClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .pool_max_idle_per_host(4)
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn public_get<T: serde::de::DeserializeOwned>(&self, path: &str) -> EngineResult<T> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.client.get(&url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(EngineError::MarketData(format!("GET {path}: HTTP {status}: {body}")));
        }

        let envelope = resp
            .json::<ApiResponse<T>>()
            .await
            .map_err(|e| EngineError::MarketData(format!("GET {path}: {e}")))?;

        if envelope.ret_code != 0 {
            return Err(EngineError::MarketData(format!(
                "GET {path}: retCode {} {}",
                envelope.ret_code,
                envelope.ret_msg.unwrap_or_default()
            )));
        }

        envelope
            .result
            .ok_or_else(|| EngineError::MarketData(format!("GET {path}: empty result")))
    }

    fn tickers_path(category: &str, base_coin: Option<&str>, symbol: Option<&str>) -> String {
        let mut parts: smallvec::SmallVec<[String; 3]> = smallvec::SmallVec::new();
        parts.push(format!("category={category}"));
        if let Some(b) = base_coin { parts.push(format!("baseCoin={b}")); }
        if let Some(s) = symbol { parts.push(format!("symbol={s}")); }
        format!("/v5/market/tickers?{}", parts.join("&"))
    }

    /// Every listed option on `base_coin`, all expiries and settle coins.
    pub async fn get_option_tickers(&self, base_coin: &str) -> EngineResult<Vec<OptionTicker>> {
        let path = Self::tickers_path("option", Some(base_coin), None);
        let list: TickerList<OptionTicker> = self.public_get(&path).await?;
        Ok(list.list)
    }

    /// Last traded spot price of `{base_coin}USDT`.
    pub async fn get_spot_price(&self, base_coin: &str) -> EngineResult<Decimal> {
        let symbol = format!("{base_coin}USDT");
        let path = Self::tickers_path("spot", None, Some(&symbol));
        let list: TickerList<SpotTicker> = self.public_get(&path).await?;

        let last = list
            .list
            .first()
            .and_then(|t| t.last_price.as_deref())
            .ok_or_else(|| EngineError::MarketData(format!("no spot ticker for {symbol}")))?;

        let price = Decimal::from_str(last.trim())
            .map_err(|e| EngineError::MarketData(format!("invalid spot price {last:?}: {e}")))?;
        if price <= Decimal::ZERO {
            return Err(EngineError::MarketData(format!("invalid spot price: {price}")));
        }
        Ok(price)
    }
}
