mod bybit;
mod cancel;
mod chain;
mod config;
mod errors;
mod models;
mod pipeline;
mod server;
mod state;

use crate::bybit::client::BybitClient;
use crate::errors::EngineResult;
use crate::pipeline::Pipeline;
use crate::state::*;
use chrono::{DateTime, Utc};
use portable_atomic::Ordering;
use std::sync::Arc;
use tokio::sync::watch;

#[tokio::main]
async fn main() {
    // Structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("touchprob starting");

    let cfg = match config::AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("config error: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        base = %cfg.base_coin,
        expiry = ?cfg.expiry,
        interval_secs = cfg.refresh_interval.as_secs(),
        "config loaded"
    );

    let app_state = AppState::new(cfg.clone());
    let client = BybitClient::new(&cfg.bybit_base_url);

    // ── Spawn tasks ──

    // 1. Cancellation sources: ENTER (stdin thread) and ctrl-c
    let (cancel_tx, cancel_rx) = cancel::channel();
    cancel::spawn_stdin_listener(cancel_tx.clone());
    cancel::spawn_ctrl_c_listener(cancel_tx);

    // 2. Optional HTTP + WS snapshot server
    if let Some(port) = cfg.server_port {
        let server_state = app_state.clone();
        tokio::spawn(async move {
            server::serve(server_state, port).await;
        });
    }

    // 3. Refresh loop runs on the main task. Returning ends the process; the
    //    stdin thread is not joined, so a pending read cannot block exit.
    run_refresh_loop(app_state, client, cancel_rx).await;

    tracing::info!("touchprob stopped");
}

/// Fetch, compute, publish, wait. A failed cycle is logged and the last good
/// snapshot stays published; the next cycle starts on schedule.
async fn run_refresh_loop(
    state: Arc<AppState>,
    client: BybitClient,
    mut cancel_rx: watch::Receiver<bool>,
) {
    let pipeline = Pipeline::new(&state.config.model);
    let mut cycle: u64 = 0;

    loop {
        if *cancel_rx.borrow() {
            break;
        }

        cycle += 1;
        state.counters.cycles_started.fetch_add(1, Ordering::Relaxed);

        let result = run_cycle(&state, &client, &pipeline, cycle, Utc::now()).await;
        record_cycle(&state, cycle, result);

        if cancel::wait_or_cancel(state.config.refresh_interval, &mut cancel_rx).await {
            break;
        }
    }

    tracing::info!(cycles = cycle, "refresh loop shutting down");
}

/// Publish a good cycle. A failed one only bumps counters and notifies WS
/// clients; the previous snapshot stays in the watch channel.
fn record_cycle(state: &AppState, cycle: u64, result: EngineResult<RefreshSnapshot>) {
    match result {
        Ok(snapshot) => {
            state.counters.cycles_completed.fetch_add(1, Ordering::Relaxed);
            state
                .counters
                .contracts_skipped
                .fetch_add(snapshot.skipped.len() as u64, Ordering::Relaxed);
            log_snapshot(&snapshot);
            state.publish(snapshot);
        }
        Err(e) => {
            tracing::warn!(cycle, error = %e, "refresh cycle failed, keeping last snapshot");
            state.counters.cycles_failed.fetch_add(1, Ordering::Relaxed);
            state.broadcast(WsMessage::CycleFailed {
                cycle,
                reason: e.to_string(),
            });
        }
    }
}

/// One full refresh: fetch market, pick the expiry, run the pipeline.
async fn run_cycle(
    state: &AppState,
    client: &BybitClient,
    pipeline: &Pipeline,
    cycle: u64,
    now: DateTime<Utc>,
) -> EngineResult<RefreshSnapshot> {
    let cfg = &state.config;
    let market = bybit::fetch_market(client, &cfg.base_coin, &cfg.excluded_settle_tag).await?;
    let expiries = market.chain.expiries(now);
    let selected = market.chain.select(cfg.expiry, now)?;
    tracing::debug!(expiry = %selected.code(), quotes = selected.len(), "expiry selected");

    let output = pipeline.run(selected, market.spot, now)?;

    let days_to_expiry = expiries
        .iter()
        .find(|e| e.expiry == selected.expiry)
        .map(|e| e.days)
        .unwrap_or(0.0);

    let mut skipped = market.skipped;
    skipped.extend(output.skipped);

    Ok(RefreshSnapshot {
        cycle,
        generated_at: Some(now),
        base_coin: cfg.base_coin.clone(),
        expiry: Some(selected.expiry),
        expiry_code: selected.code(),
        days_to_expiry,
        spot: market.spot,
        expiries,
        rows: output.rows,
        charts: output.charts,
        summary: output.summary,
        skipped,
    })
}

fn log_snapshot(snapshot: &RefreshSnapshot) {
    tracing::info!(
        cycle = snapshot.cycle,
        expiry = %snapshot.expiry_code,
        days = snapshot.days_to_expiry,
        spot = %snapshot.spot,
        strikes = snapshot.rows.len(),
        skipped = snapshot.skipped.len(),
        "refresh complete"
    );

    for s in &snapshot.summary {
        tracing::info!(
            mode = %s.mode,
            kde_mode = s.kde_mode_price,
            deviation_pct = s.deviation_pct,
            "kde mode"
        );
    }

    let listed: Vec<String> = snapshot
        .expiries
        .iter()
        .map(|e| format!("{} ({:.1}d)", e.code, e.days))
        .collect();
    tracing::info!(expiries = %listed.join(", "), "available expiries");
}
