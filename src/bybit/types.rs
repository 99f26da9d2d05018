use serde::{Deserialize, Serialize};

// ── Envelope ──

/// Every v5 response: `{ "retCode": 0, "retMsg": "OK", "result": {...} }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub ret_code: i64,
    pub ret_msg: Option<String>,
    pub result: Option<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerList<T> {
    #[allow(dead_code)]
    pub category: Option<String>,
    #[serde(default = "Vec::new")]
    pub list: Vec<T>,
}

// ── Tickers ──

/// `category=option` ticker. Numbers arrive as strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionTicker {
    pub symbol: String,
    pub mark_iv: Option<String>,
    pub delta: Option<String>,
}

impl OptionTicker {
    #[inline]
    pub fn mark_iv_f64(&self) -> Option<f64> {
        parse_number(self.mark_iv.as_deref()?)
    }

    #[inline]
    pub fn delta_f64(&self) -> Option<f64> {
        parse_number(self.delta.as_deref()?)
    }
}

/// `category=spot` ticker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpotTicker {
    #[allow(dead_code)]
    pub symbol: String,
    pub last_price: Option<String>,
}

#[inline]
fn parse_number(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}
