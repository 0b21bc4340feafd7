use tracing::{debug, info};

use super::store::{ConversationState, Identity, MemoryStore};
use super::turns::ChatMessage;
use crate::constants::{PREVIOUS_SUMMARY_LABEL, RECENT_TURNS_LABEL, SUMMARY_INSTRUCTION};
use crate::error::AppError;
use crate::traits::ModelBackend;

pub(crate) fn build_summary_prompt(state: &ConversationState) -> Vec<ChatMessage> {
    let mut prompt = vec![ChatMessage::system(SUMMARY_INSTRUCTION)];
    if !state.summary.is_empty() {
        prompt.push(ChatMessage::user(format!(
            "{PREVIOUS_SUMMARY_LABEL}\n{}",
            state.summary
        )));
    }
    prompt.push(ChatMessage::user(RECENT_TURNS_LABEL));
    prompt.extend(state.turns.iter().cloned());
    prompt
}

/// Fold the identity's recent turns into a new summary and return it.
///
/// Backend errors are returned untouched and leave the state as it was. On
/// success the buffer and counter are reset even if the summary came back empty.
pub(crate) async fn summarize(
    memory: &MemoryStore,
    identity: Identity,
    backend: &dyn ModelBackend,
) -> Result<String, AppError> {
    let state = memory.snapshot(identity);
    if state.turns.is_empty() {
        debug!(identity = %identity, "Nothing to summarize");
        return Ok(state.summary);
    }

    let prompt = build_summary_prompt(&state);
    let response = backend.complete(&prompt).await?;
    let summary = response.trim().to_string();
    memory.apply_summary(identity, summary.clone());
    info!(
        identity = %identity,
        turns = state.turns.len(),
        summary_len = summary.len(),
        "Conversation summarized"
    );
    Ok(summary)
}
