use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Single-writer cancellation flag. Listeners flip it to `true` once; the
/// refresh loop only reads it.
pub fn channel() -> (Arc<watch::Sender<bool>>, watch::Receiver<bool>) {
    let (tx, rx) = watch::channel(false);
    (Arc::new(tx), rx)
}

/// Cancel on ENTER. Runs on a plain OS thread: a blocked stdin read there
/// does not hold the runtime open at shutdown.
pub fn spawn_stdin_listener(cancel_tx: Arc<watch::Sender<bool>>) {
    let spawned = std::thread::Builder::new()
        .name("stdin-listener".into())
        .spawn(move || watch_for_enter(std::io::stdin().lock(), &cancel_tx));
    if let Err(e) = spawned {
        tracing::warn!(error = %e, "stdin listener not started, ctrl-c only");
    }
}

/// Block until one line is read, then cancel. EOF (no terminal, `</dev/null`)
/// only ends the listener. Returns true when it cancelled.
fn watch_for_enter<R: BufRead>(mut reader: R, cancel_tx: &watch::Sender<bool>) -> bool {
    let mut line = String::new();
    match reader.read_line(&mut line) {
        Ok(0) => {
            tracing::info!("stdin closed, ENTER cancel disabled");
            false
        }
        Ok(_) => {
            tracing::info!("enter pressed, stopping after this cycle");
            let _ = cancel_tx.send(true);
            true
        }
        Err(e) => {
            tracing::warn!(error = %e, "stdin read failed, ENTER cancel disabled");
            false
        }
    }
}

/// Cancel on ctrl-c.
pub fn spawn_ctrl_c_listener(cancel_tx: Arc<watch::Sender<bool>>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("ctrl-c received, stopping");
            let _ = cancel_tx.send(true);
        }
    });
}

/// Sleep for `delay` unless cancelled first. Returns true when cancelled.
pub async fn wait_or_cancel(delay: Duration, cancel_rx: &mut watch::Receiver<bool>) -> bool {
    if *cancel_rx.borrow() {
        return true;
    }

    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return false,
            changed = cancel_rx.changed() => {
                match changed {
                    Ok(()) if *cancel_rx.borrow() => return true,
                    Ok(()) => continue,
                    // Every sender gone: nobody can cancel any more.
                    Err(_) => {
                        (&mut sleep).await;
                        return false;
                    }
                }
            }
        }
    }
}
