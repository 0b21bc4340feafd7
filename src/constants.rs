/// Recent turns kept verbatim per identity.
pub(crate) const MAX_TURNS: usize = 10;
/// Recorded turns between two summarizations.
pub(crate) const SUMMARIZE_EVERY: u32 = 12;

pub(crate) const MAX_TELEGRAM_MSG_LEN: usize = 4096;
pub(crate) const SPLIT_SEND_DELAY_MS: u64 = 200;
pub(crate) const LOG_PREVIEW_LEN: usize = 80;

pub(crate) const DEFAULT_SYSTEM_PROMPT: &str = "Answer briefly and to the point.";
pub(crate) const MEMORY_LABEL: &str = "Memory (summary):";

pub(crate) const SUMMARY_INSTRUCTION: &str = "Compress the dialogue into memory. \
     Keep only facts, goals, constraints and important decisions. \
     Use only the material given below and do not invent anything. \
     Write 5-15 bullet points in the language of the conversation.";
pub(crate) const PREVIOUS_SUMMARY_LABEL: &str = "Previous summary:";
pub(crate) const RECENT_TURNS_LABEL: &str = "Recent turns:";

pub(crate) const QUOTA_REPLY: &str = "⚠️ No API quota available right now. Check billing/limits.";
pub(crate) const BACKEND_FAILURE_REPLY: &str =
    "Sorry, I couldn't get a reply right now. Please try again in a moment.";
pub(crate) const STORAGE_FAILURE_REPLY: &str =
    "Memory storage is unavailable right now. Please try again later.";
pub(crate) const SAVE_FAILED_NOTICE: &str =
    "Note: I couldn't save my memory of this conversation just now.";
pub(crate) const GENERIC_FAILURE_REPLY: &str = "Something went wrong. Please try again.";
pub(crate) const EMPTY_ANSWER_REPLY: &str = "(empty reply)";

pub(crate) const RESET_REPLY: &str = "Okay. I cleared your memory in this chat.";
pub(crate) const NOTHING_REMEMBERED_REPLY: &str = "Right now I don't remember anything.";
pub(crate) const SUMMARY_EMPTY_PLACEHOLDER: &str = "(summary is still empty)";
pub(crate) const MEMORY_OFF_REPLY: &str = "Okay. Memory is turned off for this chat.";
pub(crate) const MEMORY_ON_REPLY: &str = "Okay. Memory is turned on for this chat.";
pub(crate) const UNKNOWN_COMMAND_REPLY: &str = "Unknown command. Send /help for the list.";
