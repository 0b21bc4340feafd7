mod background;
mod commands;
mod constants;
mod error;
mod helpers;
mod memory;
mod state;
mod telegram;
mod traits;

use clap::Parser;
use reqwest::Client;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, Instrument};

use crate::error::AppError;
use crate::helpers::truncate;
use crate::memory::{MemoryStore, SqliteStore};
use crate::state::{ArrivalOrder, Config, Metrics, State};
use crate::traits::{OpenAiBackend, TelegramApiImpl};

#[derive(Parser)]
#[command(name = "membot", about = "Telegram chat bot with a rolling per-user memory")]
struct Args {
    /// Telegram bot token
    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    telegram_token: String,

    /// API key for the chat-completions endpoint
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_key: String,

    /// Model name sent with every completion request
    #[arg(long, default_value = "gpt-4.1-mini", env = "MEMBOT_MODEL")]
    model: String,

    /// SQLite file holding summaries and memory flags (default: ~/.config/membot/memory.db)
    #[arg(long, env = "MEMBOT_DB_PATH")]
    db_path: Option<PathBuf>,

    /// System instruction prepended to every request
    #[arg(long, env = "MEMBOT_SYSTEM_PROMPT")]
    system_prompt: Option<String>,

    /// Telegram Bot API base URL
    #[arg(long, default_value = "https://api.telegram.org", env = "MEMBOT_TELEGRAM_URL")]
    telegram_url: String,

    /// Chat-completions base URL
    #[arg(long, default_value = "https://api.openai.com/v1", env = "MEMBOT_OPENAI_URL")]
    openai_url: String,

    /// Long-polling timeout for getUpdates, in seconds
    #[arg(long, default_value_t = 30, env = "MEMBOT_POLL_TIMEOUT")]
    poll_timeout: u64,

    /// Timeout for each model request, in seconds
    #[arg(long, default_value_t = 120, env = "MEMBOT_REQUEST_TIMEOUT")]
    request_timeout: u64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("membot=info")),
        )
        .init();

    let args = Args::parse();
    let state = match build_state(args) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!("Startup failed: {e}");
            std::process::exit(1);
        }
    };

    info!(
        model = %state.config.model,
        db = %state.config.db_path.display(),
        "membot starting"
    );
    background::spawn_shutdown_handler(&state);

    let mut offset = 0i64;
    let mut backoff = 1u64;
    loop {
        match poll_once(&state, offset).await {
            Ok(next) => {
                offset = next;
                backoff = 1;
            }
            Err(e) => {
                error!("Polling error: {e}, retrying in {backoff}s...");
                tokio::time::sleep(Duration::from_secs(backoff)).await;
                backoff = (backoff * 2).min(60);
            }
        }
    }
}

fn build_state(args: Args) -> Result<State, AppError> {
    let config = Config {
        model: args.model,
        telegram_url: args.telegram_url.trim_end_matches('/').to_string(),
        openai_url: args.openai_url.trim_end_matches('/').to_string(),
        db_path: args.db_path.unwrap_or_else(memory::default_db_path),
        poll_timeout_secs: args.poll_timeout,
        request_timeout: Duration::from_secs(args.request_timeout),
    };

    let store = SqliteStore::open(&config.db_path)?;

    let telegram_http = Client::builder().build()?;
    let model_http = Client::builder().timeout(config.request_timeout).build()?;
    let system_prompt = args
        .system_prompt
        .unwrap_or_else(|| constants::DEFAULT_SYSTEM_PROMPT.to_string());

    Ok(State {
        memory: MemoryStore::new(system_prompt),
        store: Box::new(store),
        chat_api: Box::new(TelegramApiImpl {
            http: telegram_http,
            api_url: config.telegram_url.clone(),
            token: args.telegram_token,
        }),
        model: Box::new(OpenAiBackend {
            http: model_http,
            api_url: config.openai_url.clone(),
            api_key: args.openai_key,
            model: config.model.clone(),
        }),
        metrics: Metrics::new(),
        order: ArrivalOrder::default(),
        config,
    })
}

/// Fetch one batch of updates, spawn a handler per message, and return the next offset.
async fn poll_once(state: &Arc<State>, offset: i64) -> Result<i64, AppError> {
    let updates = state
        .chat_api
        .get_updates(offset, state.config.poll_timeout_secs)
        .await?;
    let mut next = offset;

    for update in &updates {
        if let Some(id) = telegram::update_id(update) {
            next = next.max(id + 1);
        }
        let Some(parsed) = telegram::parse_update(update) else {
            debug!("Skipping non-text update");
            continue;
        };

        let identity = parsed.identity();
        info!(
            identity = %identity,
            user = %parsed.user_name,
            "Message: {}",
            truncate(&parsed.text, constants::LOG_PREVIEW_LEN)
        );

        let state = Arc::clone(state);
        let mut ticket = state.order.take(identity);
        let span = tracing::info_span!("update", request_id = %uuid::Uuid::new_v4());
        tokio::spawn(
            async move {
                ticket.ready().await;
                if let Err(e) = commands::handle_message(&state, identity, &parsed.text).await {
                    error!(identity = %identity, error = %e, "Error handling message");
                    state.record_error();
                    let _ = state
                        .send_message(identity.chat_id, e.user_reply())
                        .await;
                }
                state.order.finish(ticket);
            }
            .instrument(span),
        );
    }

    Ok(next)
}
