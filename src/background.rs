use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

use crate::state::State;

fn log_final_metrics(state: &State) {
    info!(
        messages = state.metrics.message_count.load(Ordering::Relaxed),
        summaries = state.metrics.summary_count.load(Ordering::Relaxed),
        errors = state.metrics.error_count.load(Ordering::Relaxed),
        cached = state.memory.len(),
        "Shutting down; recent turns are process-local and are dropped"
    );
}

pub(crate) fn spawn_shutdown_handler(state: &Arc<State>) {
    // SIGINT / Ctrl-C
    {
        let state = Arc::clone(state);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received");
                log_final_metrics(&state);
                std::process::exit(0);
            }
        });
    }

    // SIGTERM (Unix only)
    #[cfg(unix)]
    {
        let state = Arc::clone(state);
        tokio::spawn(async move {
            let Ok(mut sig) =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            else {
                tracing::warn!("Failed to register SIGTERM handler");
                return;
            };
            sig.recv().await;
            info!("SIGTERM received");
            log_final_metrics(&state);
            std::process::exit(0);
        });
    }
}
