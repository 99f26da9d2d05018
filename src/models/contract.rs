use crate::errors::{EngineError, EngineResult};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;

/// Field delimiter in venue option symbols: `BTC-27DEC26-100000-C[-USDT]`.
const SYMBOL_DELIMITER: char = '-';

/// All expiries settle at the same wall-clock hour so that time-to-expiry
/// compares consistently across contracts.
const EXPIRY_HOUR_UTC: u32 = 8;

const MONTHS: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionSide {
    Call,
    Put,
}

impl OptionSide {
    pub fn from_char(c: char) -> EngineResult<Self> {
        match c {
            'C' => Ok(Self::Call),
            'P' => Ok(Self::Put),
            other => Err(EngineError::InvalidSide(other)),
        }
    }
}

impl std::fmt::Display for OptionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Call => write!(f, "call"),
            Self::Put => write!(f, "put"),
        }
    }
}

/// A listed option, parsed out of its venue symbol.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct OptionContract {
    /// Underlying asset, e.g. `BTC`.
    pub base: String,
    /// Settlement instant, always `EXPIRY_HOUR_UTC`:00 UTC on the listed date.
    pub expiry: DateTime<Utc>,
    /// Exact strike. Kept decimal so call/put pairing by strike is exact.
    pub strike: Decimal,
    pub side: OptionSide,
}

impl OptionContract {
    /// Parse `BASE-EXPIRY-STRIKE-SIDE[-suffix]`.
    pub fn parse(symbol: &str) -> EngineResult<Self> {
        let fields: Vec<&str> = symbol.split(SYMBOL_DELIMITER).collect();
        if fields.len() < 4 || fields[..4].iter().any(|f| f.is_empty()) {
            return Err(EngineError::Parse(format!(
                "{symbol}: expected BASE-EXPIRY-STRIKE-SIDE"
            )));
        }

        let date = parse_expiry_code(fields[1]).map_err(|e| match e {
            EngineError::Parse(msg) => EngineError::Parse(format!("{symbol}: {msg}")),
            other => other,
        })?;
        let expiry = date
            .and_hms_opt(EXPIRY_HOUR_UTC, 0, 0)
            .ok_or_else(|| EngineError::Parse(format!("{symbol}: invalid expiry time")))?
            .and_utc();

        let strike = parse_strike(fields[2])
            .map_err(|e| EngineError::Parse(format!("{symbol}: {e}")))?;

        // Only the first character carries the side (`C`, `CALL`, ...).
        let side_char = fields[3]
            .chars()
            .next()
            .ok_or_else(|| EngineError::Parse(format!("{symbol}: empty side")))?;
        let side = OptionSide::from_char(side_char)?;

        Ok(Self {
            base: fields[0].to_string(),
            expiry,
            strike,
            side,
        })
    }

    /// Fractional days between `now` and expiry. Negative once expired.
    #[inline]
    pub fn days_to_expiry(&self, now: DateTime<Utc>) -> f64 {
        (self.expiry - now).num_milliseconds() as f64 / 86_400_000.0
    }
}

/// Parse a `dMMMyy` expiry field (`1JAN26`, `27dec26`).
pub fn parse_expiry_code(code: &str) -> EngineResult<NaiveDate> {
    let digits = code.chars().take_while(|c| c.is_ascii_digit()).count();
    if !(1..=2).contains(&digits) || code.len() != digits + 5 || !code.is_ascii() {
        return Err(EngineError::Parse(format!("invalid expiry {code:?}, expected dMMMyy")));
    }

    let day: u32 = code[..digits]
        .parse()
        .map_err(|_| EngineError::Parse(format!("invalid expiry day in {code:?}")))?;

    let month_str = code[digits..digits + 3].to_ascii_uppercase();
    let month = MONTHS
        .iter()
        .position(|m| *m == month_str)
        .ok_or_else(|| EngineError::Parse(format!("invalid expiry month in {code:?}")))?
        as u32
        + 1;

    let yy: i32 = code[digits + 3..]
        .parse()
        .map_err(|_| EngineError::Parse(format!("invalid expiry year in {code:?}")))?;

    NaiveDate::from_ymd_opt(2000 + yy, month, day)
        .ok_or_else(|| EngineError::Parse(format!("no such date {code:?}")))
}

/// Expiry in venue notation, e.g. `1JAN26`.
pub fn format_expiry_code(date: NaiveDate) -> String {
    format!(
        "{}{}{:02}",
        date.day(),
        MONTHS[date.month0() as usize],
        date.year() % 100
    )
}

fn parse_strike(field: &str) -> Result<Decimal, String> {
    if field.starts_with(['-', '+']) {
        return Err(format!("invalid strike {field:?}"));
    }
    let strike = Decimal::from_str(field).map_err(|e| format!("invalid strike {field:?}: {e}"))?;
    if strike <= Decimal::ZERO {
        return Err(format!("strike must be > 0, got {field}"));
    }
    Ok(strike.normalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_call() {
        let c = OptionContract::parse("BTC-1JAN26-50000-C").unwrap();
        assert_eq!(c.base, "BTC");
        assert_eq!(c.expiry, Utc.with_ymd_and_hms(2026, 1, 1, 8, 0, 0).unwrap());
        assert_eq!(c.strike, dec!(50000));
        assert_eq!(c.side, OptionSide::Call);
    }

    #[test]
    fn test_parse_put_with_suffix() {
        let c = OptionContract::parse("ETH-27DEC26-3250.5-P-USDT").unwrap();
        assert_eq!(c.expiry, Utc.with_ymd_and_hms(2026, 12, 27, 8, 0, 0).unwrap());
        assert_eq!(c.strike, dec!(3250.5));
        assert_eq!(c.side, OptionSide::Put);
    }

    #[test]
    fn test_strike_equality_is_exact() {
        let a = OptionContract::parse("BTC-1JAN26-0.30-C").unwrap();
        let b = OptionContract::parse("BTC-1JAN26-0.3-P").unwrap();
        assert_eq!(a.strike, b.strike);
        assert_eq!(a.strike.to_string(), "0.3");
    }

    #[test]
    fn test_malformed_symbols() {
        for symbol in [
            "BTC-1JAN26-50000",
            "BTC--50000-C",
            "BTC-1XYZ26-50000-C",
            "BTC-31FEB26-50000-C",
            "BTC-1JAN2026-50000-C",
            "BTC-1JAN26-abc-C",
            "BTC-1JAN26--5-C",
            "BTC-1JAN26-0-C",
        ] {
            let res = OptionContract::parse(symbol);
            assert!(matches!(res, Err(EngineError::Parse(_))), "{symbol} should fail to parse");
        }
    }

    #[test]
    fn test_bad_side_is_distinct_error() {
        let res = OptionContract::parse("BTC-1JAN26-50000-X");
        assert!(matches!(res, Err(EngineError::InvalidSide('X'))));
    }

    #[test]
    fn test_expiry_code_roundtrip() {
        let date = parse_expiry_code("5mar27").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2027, 3, 5).unwrap());
        assert_eq!(format_expiry_code(date), "5MAR27");
    }

    #[test]
    fn test_days_to_expiry() {
        let c = OptionContract::parse("BTC-3JAN26-50000-C").unwrap();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 20, 0, 0).unwrap();
        assert!((c.days_to_expiry(now) - 1.5).abs() < 1e-9);
    }
}
