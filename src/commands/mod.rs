use std::sync::atomic::Ordering;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::constants::{
    MEMORY_OFF_REPLY, MEMORY_ON_REPLY, NOTHING_REMEMBERED_REPLY, RESET_REPLY,
    SAVE_FAILED_NOTICE, SUMMARY_EMPTY_PLACEHOLDER, UNKNOWN_COMMAND_REPLY,
};
use crate::error::AppError;
use crate::memory::{summarize, Identity, Role};
use crate::state::State;
use crate::telegram::parse_command;


fn cmd_help() -> String {
    "I answer your messages and keep a short memory of our conversation.\n\
     \n\
     /privacy - show what I remember about you\n\
     /memory_off - stop remembering this chat\n\
     /memory_on - start remembering again\n\
     /reset or /forget - erase my memory of you in this chat\n\
     /status - bot status"
        .to_string()
}

fn cmd_status(state: &State) -> String {
    let uptime = state.metrics.start_time.elapsed();
    let hours = uptime.as_secs() / 3600;
    let mins = (uptime.as_secs() % 3600) / 60;
    let count = state.metrics.message_count.load(Ordering::Relaxed);
    let summaries = state.metrics.summary_count.load(Ordering::Relaxed);
    let errors = state.metrics.error_count.load(Ordering::Relaxed);
    let cached = state.memory.len();
    let latency = state.avg_latency_ms();
    format!(
        "membot status\n\
         Uptime: {hours}h {mins}m\n\
         Model: {}\n\
         Messages: {count}\n\
         Summaries: {summaries}\n\
         Cached conversations: {cached}\n\
         Errors: {errors}\n\
         Avg latency: {latency:.0}ms",
        state.config.model
    )
}

fn cmd_reset(state: &State, identity: Identity) -> Result<String, AppError> {
    state.store.delete(identity)?;
    state.memory.reset(identity);
    state.memory.evict(identity);
    info!(identity = %identity, "Memory reset");
    Ok(RESET_REPLY.to_string())
}

fn cmd_privacy(state: &State, identity: Identity) -> Result<String, AppError> {
    let stored = state.store.load(identity)?;
    state.memory.refresh(identity, &stored);
    let current = state.memory.snapshot(identity);
    if current.summary.is_empty() && current.turns.is_empty() {
        return Ok(NOTHING_REMEMBERED_REPLY.to_string());
    }
    let summary = if current.summary.is_empty() {
        SUMMARY_EMPTY_PLACEHOLDER
    } else {
        current.summary.as_str()
    };
    Ok(format!("What I remember (summary):\n{summary}"))
}

fn cmd_set_memory(state: &State, identity: Identity, enabled: bool) -> Result<String, AppError> {
    let stored = state.store.load(identity)?;
    state.store.save(identity, &stored.summary, enabled)?;
    state.memory.refresh(identity, &stored);
    state.memory.set_memory_enabled(identity, enabled);
    info!(identity = %identity, enabled, "Memory toggled");
    Ok(if enabled { MEMORY_ON_REPLY } else { MEMORY_OFF_REPLY }.to_string())
}

/// Run a slash command. Returns None when `text` is not a command.
pub(crate) fn handle_command(state: &State, identity: Identity, text: &str) -> Option<String> {
    let (name, _args) = parse_command(text)?;
    let result = match name {
        "start" | "help" => Ok(cmd_help()),
        "status" => Ok(cmd_status(state)),
        "reset" | "forget" => cmd_reset(state, identity),
        "privacy" => cmd_privacy(state, identity),
        "memory_on" => cmd_set_memory(state, identity, true),
        "memory_off" => cmd_set_memory(state, identity, false),
        _ => Ok(UNKNOWN_COMMAND_REPLY.to_string()),
    };
    Some(result.unwrap_or_else(|e| {
        error!(identity = %identity, command = name, error = %e, "Command failed");
        state.record_error();
        e.user_reply().to_string()
    }))
}

pub(crate) async fn handle_message(
    state: &State,
    identity: Identity,
    text: &str,
) -> Result<(), AppError> {
    let lock = state.memory.lock_for(identity);
    let result = {
        let _guard = lock.lock().await;
        process_message(state, identity, text).await
    };
    drop(lock);
    state.memory.prune_lock(identity);
    result
}

/// Runs with the identity's lock held.
async fn process_message(state: &State, identity: Identity, text: &str) -> Result<(), AppError> {
    if let Some(response) = handle_command(state, identity, text) {
        state.send_message(identity.chat_id, &response).await?;
        return Ok(());
    }
    state.metrics.message_count.fetch_add(1, Ordering::Relaxed);

    let stored = match state.store.load(identity) {
        Ok(s) => s,
        Err(e) => {
            error!(identity = %identity, error = %e, "Failed to load memory");
            state.record_error();
            return state.send_message(identity.chat_id, e.user_reply()).await;
        }
    };
    debug!(identity = %identity, updated_at = ?stored.updated_at, "Memory loaded");
    state.memory.refresh(identity, &stored);
    let request = state.memory.build_request(identity, text);

    let _ = state.set_typing(identity.chat_id).await;
    let call_start = Instant::now();
    let result = state.model.complete(&request).await;
    state.record_latency(call_start.elapsed().as_millis() as u64);

    let answer = match result {
        Ok(answer) => answer,
        Err(e) => {
            if matches!(e, AppError::QuotaExceeded) {
                warn!(identity = %identity, "Model quota exceeded");
            } else {
                error!(identity = %identity, error = %e, "Model call failed");
            }
            state.record_error();
            return state.send_message(identity.chat_id, e.user_reply()).await;
        }
    };

    state.memory.record_turn(identity, Role::User, text);
    state.memory.record_turn(identity, Role::Assistant, &answer);

    let mut persist = true;
    if state.memory.is_summarization_due(identity) {
        match summarize(&state.memory, identity, state.model.as_ref()).await {
            Ok(_) => {
                state.metrics.summary_count.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                warn!(
                    identity = %identity,
                    error = %e,
                    "Summarization failed, keeping recent turns"
                );
                state.record_error();
                persist = false;
            }
        }
    }

    let mut save_failed = false;
    if persist {
        let current = state.memory.snapshot(identity);
        if let Err(e) = state
            .store
            .save(identity, &current.summary, current.memory_enabled)
        {
            error!(identity = %identity, error = %e, "Failed to save memory");
            state.record_error();
            save_failed = true;
        }
    }

    info!(identity = %identity, response_len = answer.len(), "Reply sent");
    state.send_long_message(identity.chat_id, &answer).await?;
    if save_failed {
        state.send_message(identity.chat_id, SAVE_FAILED_NOTICE).await?;
    }
    Ok(())
}
