use crate::chain::{ExpiryInfo, SkippedContract};
use crate::config::AppConfig;
use crate::models::ProbabilityMode;
use chrono::{DateTime, Utc};
use portable_atomic::{AtomicU64, Ordering};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

// ── Presentation rows ──

/// One strike of the chain table. Values only; formatting is the consumer's.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ChainRow {
    pub strike: Decimal,
    pub call_touch_pct: Option<f64>,
    pub call_delta_pct: Option<f64>,
    /// Sign-flipped so both sides read as a probability.
    pub put_delta_pct: Option<f64>,
    pub put_touch_pct: Option<f64>,
    pub mark_iv_pct: Option<f64>,
}

// ── Chart series ──

/// One bar of the interval chart. `center` is on the strike-index axis, so
/// the bar for interval `i` sits at `i + 0.5`.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct IntervalBar {
    pub label: String,
    pub low: Decimal,
    pub high: Decimal,
    pub mass_per_unit_price: f64,
    pub center: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct CurvePoint {
    pub price: f64,
    pub position: f64,
    pub density: f64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ChartSeries {
    pub mode: ProbabilityMode,
    pub bars: Vec<IntervalBar>,
    /// Spot on the strike-index axis; None when spot lies outside the strikes.
    pub spot_marker: Option<f64>,
    /// Spot on the bar axis, where bar `i` is centred at `i`.
    pub spot_bar_marker: Option<f64>,
    pub kde_mode_marker: f64,
    pub curve: Vec<CurvePoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct ModeSummary {
    pub mode: ProbabilityMode,
    /// KDE mode rounded to a whole price unit.
    pub kde_mode_price: f64,
    /// (mode - spot) / spot * 100
    pub deviation_pct: f64,
}

// ── Snapshot (sent via watch channel) ──

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct RefreshSnapshot {
    pub cycle: u64,
    pub generated_at: Option<DateTime<Utc>>,
    pub base_coin: String,
    pub expiry: Option<DateTime<Utc>>,
    pub expiry_code: String,
    pub days_to_expiry: f64,
    pub spot: Decimal,
    pub expiries: Vec<ExpiryInfo>,
    pub rows: Vec<ChainRow>,
    pub charts: Vec<ChartSeries>,
    pub summary: Vec<ModeSummary>,
    pub skipped: Vec<SkippedContract>,
}

// ── Messages OUT of the loop ──

#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "type")]
pub enum WsMessage {
    #[serde(rename = "snapshot")]
    Snapshot { snapshot: Box<RefreshSnapshot> },

    #[serde(rename = "cycle_failed")]
    CycleFailed { cycle: u64, reason: String },
}

// ── Performance Counters (lock-free) ──

pub struct PerfCounters {
    pub cycles_started: AtomicU64,
    pub cycles_completed: AtomicU64,
    pub cycles_failed: AtomicU64,
    pub contracts_skipped: AtomicU64,
    pub ws_messages_sent: AtomicU64,
}

impl PerfCounters {
    pub fn new() -> Self {
        Self {
            cycles_started: AtomicU64::new(0),
            cycles_completed: AtomicU64::new(0),
            cycles_failed: AtomicU64::new(0),
            contracts_skipped: AtomicU64::new(0),
            ws_messages_sent: AtomicU64::new(0),
        }
    }
}

// ── Application shared state (channels, not locks) ──

pub struct AppState {
    pub config: AppConfig,

    // Loop -> API: last successful snapshot (watch = single producer, multi consumer)
    pub snapshot_tx: watch::Sender<RefreshSnapshot>,
    pub snapshot_rx: watch::Receiver<RefreshSnapshot>,

    // Loop -> API: event stream (broadcast for WS clients)
    pub ws_tx: broadcast::Sender<WsMessage>,

    // Lock-free performance counters
    pub counters: PerfCounters,
}

impl AppState {
    pub fn new(config: AppConfig) -> Arc<Self> {
        let (ws_tx, _) = broadcast::channel(64);
        let (snapshot_tx, snapshot_rx) = watch::channel(RefreshSnapshot {
            base_coin: config.base_coin.clone(),
            ..RefreshSnapshot::default()
        });

        Arc::new(Self {
            config,
            snapshot_tx,
            snapshot_rx,
            ws_tx,
            counters: PerfCounters::new(),
        })
    }

    /// Replace the published snapshot and notify WS clients.
    pub fn publish(&self, snapshot: RefreshSnapshot) {
        self.broadcast(WsMessage::Snapshot {
            snapshot: Box::new(snapshot.clone()),
        });
        let _ = self.snapshot_tx.send(snapshot);
    }

    #[inline]
    pub fn broadcast(&self, msg: WsMessage) {
        self.counters.ws_messages_sent.fetch_add(1, Ordering::Relaxed);
        let _ = self.ws_tx.send(msg);
    }
}
