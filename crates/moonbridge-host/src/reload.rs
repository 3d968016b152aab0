use tokio::sync::watch;
use tracing::info;

/// Reload signal type (empty - just signals that a reload is requested)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReloadSignal;

/// Create a reload signal channel and spawn a SIGUSR2 handler
///
/// The receiver sees `Some(ReloadSignal)` each time SIGUSR2 arrives. The
/// handler task exits once the receiver is dropped. Must be called from within
/// a tokio runtime.
#[cfg(unix)]
pub fn setup_reload_signal() -> watch::Receiver<Option<ReloadSignal>> {
    let (reload_tx, reload_rx) = watch::channel(None);

    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigusr2 = match signal(SignalKind::user_defined2()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(target: "scripting", "Failed to register SIGUSR2 handler: {}", e);
                return;
            }
        };

        loop {
            tokio::select! {
                _ = reload_tx.closed() => {
                    info!(target: "scripting", "Reload signal receiver dropped, shutting down SIGUSR2 handler");
                    break;
                }
                received = sigusr2.recv() => {
                    if received.is_none() {
                        break;
                    }
                    info!(target: "scripting", "Received SIGUSR2 - triggering script reload");
                    if reload_tx.send(Some(ReloadSignal)).is_err() {
                        break;
                    }
                }
            }
        }
    });

    reload_rx
}

/// Create a reload signal channel (non-Unix platforms don't support SIGUSR2)
#[cfg(not(unix))]
pub fn setup_reload_signal() -> watch::Receiver<Option<ReloadSignal>> {
    let (reload_tx, reload_rx) = watch::channel(None);
    tracing::warn!(target: "scripting", "SIGUSR2 reload not supported on this platform");

    // Keep the sender alive until the receiver goes away
    tokio::spawn(async move {
        reload_tx.closed().await;
    });
    reload_rx
}

/// Take a pending reload request, if any, and mark it as handled
pub fn take_reload(rx: &mut watch::Receiver<Option<ReloadSignal>>) -> bool {
    match rx.has_changed() {
        Ok(true) => rx.borrow_and_update().is_some(),
        _ => false,
    }
}
