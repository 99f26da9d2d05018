/// Domain-specific error types for the probability engine.
/// The refresh loop must:
/// - Skip a single bad contract and keep the rest of the cycle
/// - Keep the last published snapshot when a whole cycle fails
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid option side: {0:?}")]
    InvalidSide(char),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("domain error: {0}")]
    Domain(String),

    #[error("lookup error: {0}")]
    Lookup(String),

    #[error("range error: {0}")]
    Range(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("market data error: {0}")]
    MarketData(String),

    #[error("config error: {0}")]
    Config(String),
}

impl EngineError {
    /// Errors scoped to one contract. The cycle reports them and moves on.
    #[inline]
    pub fn is_contract_scoped(&self) -> bool {
        matches!(
            self,
            EngineError::Parse(_)
                | EngineError::InvalidSide(_)
                | EngineError::InvalidArgument(_)
                | EngineError::Domain(_)
                | EngineError::Lookup(_)
        )
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(e: reqwest::Error) -> Self {
        EngineError::Network(e.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Parse(e.to_string())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
