use crate::errors::{EngineError, EngineResult};
use crate::models::contract;
use chrono::NaiveDate;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub base_coin: String,
    pub expiry: Option<NaiveDate>,
    pub refresh_interval: Duration,
    pub bybit_base_url: String,
    pub excluded_settle_tag: String,
    pub model: ModelConfig,
    pub server_port: Option<u16>,
}

/// Numeric policy values for the touch model and the KDE.
#[derive(Debug, Clone, Copy)]
pub struct ModelConfig {
    pub risk_free_rate: f64,
    pub kde_neighbors: usize,
    pub kde_bandwidth_scale: f64,
    /// Round days-to-expiry to one decimal before the touch model sees it,
    /// so model output lines up with the displayed day counts.
    pub legacy_day_rounding: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            risk_free_rate: 0.05,
            kde_neighbors: 2,
            kde_bandwidth_scale: 0.8,
            legacy_day_rounding: true,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> EngineResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup. `from_env` feeds it the process
    /// environment; tests feed it a fixed map.
    pub fn from_lookup<F>(lookup: F) -> EngineResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let base_coin = var_or("BASE_COIN", "BTC").trim().to_uppercase();
        if base_coin.is_empty() {
            return Err(EngineError::Config("BASE_COIN must not be empty".into()));
        }

        let expiry = match lookup("OPTIONS_EXPIRY").filter(|s| !s.trim().is_empty()) {
            Some(code) => Some(
                contract::parse_expiry_code(code.trim())
                    .map_err(|e| EngineError::Config(format!("OPTIONS_EXPIRY: {e}")))?,
            ),
            None => None,
        };

        let refresh_secs = var_or("REFRESH_INTERVAL_SECS", "60")
            .parse::<u64>()
            .map_err(|e| EngineError::Config(format!("REFRESH_INTERVAL_SECS: {e}")))?;
        if refresh_secs == 0 {
            return Err(EngineError::Config("REFRESH_INTERVAL_SECS must be > 0".into()));
        }

        let risk_free_rate = var_or("RISK_FREE_RATE", "0.05")
            .parse::<f64>()
            .map_err(|e| EngineError::Config(format!("RISK_FREE_RATE: {e}")))?;
        if !risk_free_rate.is_finite() {
            return Err(EngineError::Config("RISK_FREE_RATE must be finite".into()));
        }

        let kde_neighbors = var_or("KDE_NEIGHBORS", "2")
            .parse::<usize>()
            .map_err(|e| EngineError::Config(format!("KDE_NEIGHBORS: {e}")))?;
        if kde_neighbors == 0 {
            return Err(EngineError::Config("KDE_NEIGHBORS must be >= 1".into()));
        }

        let kde_bandwidth_scale = var_or("KDE_BANDWIDTH_SCALE", "0.8")
            .parse::<f64>()
            .map_err(|e| EngineError::Config(format!("KDE_BANDWIDTH_SCALE: {e}")))?;
        if !(kde_bandwidth_scale.is_finite() && kde_bandwidth_scale > 0.0) {
            return Err(EngineError::Config("KDE_BANDWIDTH_SCALE must be > 0".into()));
        }

        let legacy_day_rounding = var_or("LEGACY_DAY_ROUNDING", "true")
            .parse::<bool>()
            .map_err(|e| EngineError::Config(format!("LEGACY_DAY_ROUNDING: {e}")))?;

        let server_port = match lookup("SERVER_PORT").filter(|s| !s.trim().is_empty()) {
            Some(p) => Some(
                p.trim()
                    .parse::<u16>()
                    .map_err(|e| EngineError::Config(format!("SERVER_PORT: {e}")))?,
            ),
            None => None,
        };

        Ok(Self {
            base_coin,
            expiry,
            refresh_interval: Duration::from_secs(refresh_secs),
            bybit_base_url: var_or("BYBIT_BASE_URL", "https://api.bybit.com"),
            excluded_settle_tag: var_or("EXCLUDED_SETTLE_TAG", "USDT"),
            model: ModelConfig {
                risk_free_rate,
                kde_neighbors,
                kde_bandwidth_scale,
                legacy_day_rounding,
            },
            server_port,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(cfg.base_coin, "BTC");
        assert_eq!(cfg.refresh_interval, Duration::from_secs(60));
        assert_eq!(cfg.model.risk_free_rate, 0.05);
        assert_eq!(cfg.model.kde_neighbors, 2);
        assert_eq!(cfg.model.kde_bandwidth_scale, 0.8);
        assert!(cfg.model.legacy_day_rounding);
        assert!(cfg.expiry.is_none());
        assert!(cfg.server_port.is_none());
    }

    #[test]
    fn test_overrides() {
        let cfg = AppConfig::from_lookup(lookup_from(&[
            ("BASE_COIN", " eth "),
            ("OPTIONS_EXPIRY", "27DEC26"),
            ("REFRESH_INTERVAL_SECS", "15"),
            ("KDE_NEIGHBORS", "3"),
            ("SERVER_PORT", "3001"),
        ]))
        .unwrap();
        assert_eq!(cfg.base_coin, "ETH");
        assert_eq!(cfg.expiry, NaiveDate::from_ymd_opt(2026, 12, 27));
        assert_eq!(cfg.refresh_interval, Duration::from_secs(15));
        assert_eq!(cfg.model.kde_neighbors, 3);
        assert_eq!(cfg.server_port, Some(3001));
    }

    #[test]
    fn test_rejects_bad_values() {
        for (key, value) in [
            ("REFRESH_INTERVAL_SECS", "0"),
            ("KDE_NEIGHBORS", "0"),
            ("KDE_BANDWIDTH_SCALE", "-1"),
            ("RISK_FREE_RATE", "abc"),
            ("OPTIONS_EXPIRY", "32XYZ26"),
        ] {
            let res = AppConfig::from_lookup(lookup_from(&[(key, value)]));
            assert!(
                matches!(res, Err(EngineError::Config(_))),
                "{key}={value} should be a config error"
            );
        }
    }
}
