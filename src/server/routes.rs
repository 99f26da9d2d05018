use crate::state::{AppState, RefreshSnapshot};
use axum::extract::State;
use axum::response::Json;
use std::sync::Arc;

/// GET /api/snapshot -- last successful refresh (from watch channel, no lock)
pub async fn get_snapshot(State(state): State<Arc<AppState>>) -> Json<RefreshSnapshot> {
    let snapshot = state.snapshot_rx.borrow().clone();
    Json(snapshot)
}

/// GET /api/counters -- refresh counters (lock-free reads)
pub async fn get_counters(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    use portable_atomic::Ordering::Relaxed;
    Json(serde_json::json!({
        "cycles_started": state.counters.cycles_started.load(Relaxed),
        "cycles_completed": state.counters.cycles_completed.load(Relaxed),
        "cycles_failed": state.counters.cycles_failed.load(Relaxed),
        "contracts_skipped": state.counters.contracts_skipped.load(Relaxed),
        "ws_messages_sent": state.counters.ws_messages_sent.load(Relaxed),
    }))
}
