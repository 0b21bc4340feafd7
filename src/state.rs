use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

use crate::constants::{EMPTY_ANSWER_REPLY, MAX_TELEGRAM_MSG_LEN, SPLIT_SEND_DELAY_MS};
use crate::error::AppError;
use crate::helpers::split_message;
use crate::memory::{DurableStore, Identity, MemoryStore};
use crate::traits::{ChatApi, ModelBackend};

/// Immutable configuration set at startup from CLI args.
pub(crate) struct Config {
    pub(crate) model: String,
    pub(crate) telegram_url: String,
    pub(crate) openai_url: String,
    pub(crate) db_path: PathBuf,
    pub(crate) poll_timeout_secs: u64,
    pub(crate) request_timeout: Duration,
}

/// Runtime metrics (atomic counters).
pub(crate) struct Metrics {
    pub(crate) start_time: Instant,
    pub(crate) message_count: AtomicU64,
    pub(crate) summary_count: AtomicU64,
    pub(crate) error_count: AtomicU64,
    pub(crate) latency_sum_ms: AtomicU64,
    pub(crate) latency_count: AtomicU64,
}

impl Metrics {
    pub(crate) fn new() -> Self {
        Self {
            start_time: Instant::now(),
            message_count: AtomicU64::new(0),
            summary_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            latency_sum_ms: AtomicU64::new(0),
            latency_count: AtomicU64::new(0),
        }
    }
}

/// Keeps updates for one identity in the order they were polled.
///
/// `take` is called synchronously from the poll loop. Each ticket waits for
/// the previous ticket of the same identity to be dropped.
#[derive(Default)]
pub(crate) struct ArrivalOrder {
    next_seq: AtomicU64,
    tails: DashMap<Identity, (u64, oneshot::Receiver<()>)>,
}

pub(crate) struct Ticket {
    identity: Identity,
    seq: u64,
    previous: Option<oneshot::Receiver<()>>,
    _done: oneshot::Sender<()>,
}

impl Ticket {
    /// Resolves once every earlier ticket for this identity is finished.
    pub(crate) async fn ready(&mut self) {
        if let Some(previous) = self.previous.take() {
            // Err means the sender was dropped, which is the release signal.
            let _ = previous.await;
        }
    }
}

impl ArrivalOrder {
    pub(crate) fn take(&self, identity: Identity) -> Ticket {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let (done, rx) = oneshot::channel();
        let previous = self.tails.insert(identity, (seq, rx)).map(|(_, rx)| rx);
        Ticket {
            identity,
            seq,
            previous,
            _done: done,
        }
    }

    /// Release a ticket. The tail entry is removed if no later ticket was taken.
    pub(crate) fn finish(&self, ticket: Ticket) {
        self.tails
            .remove_if(&ticket.identity, |_, (seq, _)| *seq == ticket.seq);
    }

    pub(crate) fn pending(&self) -> usize {
        self.tails.len()
    }
}

pub(crate) struct State {
    pub(crate) config: Config,
    pub(crate) metrics: Metrics,
    pub(crate) order: ArrivalOrder,
    pub(crate) memory: MemoryStore,
    pub(crate) store: Box<dyn DurableStore>,
    pub(crate) chat_api: Box<dyn ChatApi>,
    pub(crate) model: Box<dyn ModelBackend>,
}

impl State {
    pub(crate) fn record_latency(&self, duration_ms: u64) {
        self.metrics.latency_sum_ms.fetch_add(duration_ms, Ordering::Relaxed);
        self.metrics.latency_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn avg_latency_ms(&self) -> f64 {
        let count = self.metrics.latency_count.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        self.metrics.latency_sum_ms.load(Ordering::Relaxed) as f64 / count as f64
    }

    pub(crate) fn record_error(&self) {
        self.metrics.error_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) async fn send_message(&self, chat_id: i64, message: &str) -> Result<(), AppError> {
        self.chat_api.send_msg(chat_id, message).await
    }

    pub(crate) async fn send_long_message(
        &self,
        chat_id: i64,
        message: &str,
    ) -> Result<(), AppError> {
        if message.trim().is_empty() {
            return self.send_message(chat_id, EMPTY_ANSWER_REPLY).await;
        }
        let parts = split_message(message, MAX_TELEGRAM_MSG_LEN);
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(Duration::from_millis(SPLIT_SEND_DELAY_MS)).await;
            }
            self.send_message(chat_id, part).await?;
        }
        Ok(())
    }

    pub(crate) async fn set_typing(&self, chat_id: i64) -> Result<(), AppError> {
        self.chat_api.set_typing(chat_id).await
    }
}
