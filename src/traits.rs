use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::error::AppError;
use crate::helpers::truncate;
use crate::memory::ChatMessage;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait ChatApi: Send + Sync {
    /// Long-poll for updates after `offset`. Returns the raw update objects.
    async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Value>, AppError>;
    async fn send_msg(&self, chat_id: i64, message: &str) -> Result<(), AppError>;
    async fn set_typing(&self, chat_id: i64) -> Result<(), AppError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait ModelBackend: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, AppError>;
}

pub(crate) struct TelegramApiImpl {
    pub(crate) http: Client,
    pub(crate) api_url: String,
    pub(crate) token: String,
}

impl TelegramApiImpl {
    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.token, method)
    }

    /// Unwrap the `{"ok": .., "result": ..}` envelope of a Bot API reply.
    async fn call(&self, req: reqwest::RequestBuilder) -> Result<Value, AppError> {
        let resp = req.send().await?;
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        if !status.is_success() || !body["ok"].as_bool().unwrap_or(false) {
            let description = body["description"].as_str().unwrap_or("no description");
            return Err(AppError::Telegram(format!("{status}: {description}")));
        }
        Ok(body["result"].clone())
    }
}

#[async_trait]
impl ChatApi for TelegramApiImpl {
    async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Value>, AppError> {
        let body = serde_json::json!({
            "offset": offset,
            "timeout": timeout_secs,
            "allowed_updates": ["message"],
        });
        let req = self
            .http
            .post(self.method_url("getUpdates"))
            .timeout(Duration::from_secs(timeout_secs + 10))
            .json(&body);
        let result = self.call(req).await?;
        Ok(result.as_array().cloned().unwrap_or_default())
    }

    async fn send_msg(&self, chat_id: i64, message: &str) -> Result<(), AppError> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": message,
        });
        let req = self.http.post(self.method_url("sendMessage")).json(&body);
        if let Err(e) = self.call(req).await {
            error!(chat_id, error = %e, "Telegram send failed");
            return Err(e);
        }
        Ok(())
    }

    async fn set_typing(&self, chat_id: i64) -> Result<(), AppError> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "action": "typing",
        });
        let req = self.http.post(self.method_url("sendChatAction")).json(&body);
        if let Err(e) = self.call(req).await {
            debug!("Typing indicator failed: {e}");
        }
        Ok(())
    }
}

/// OpenAI-compatible chat-completions backend.
pub(crate) struct OpenAiBackend {
    pub(crate) http: Client,
    pub(crate) api_url: String,
    pub(crate) api_key: String,
    pub(crate) model: String,
}

#[async_trait]
impl ModelBackend for OpenAiBackend {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, AppError> {
        let url = format!("{}/chat/completions", self.api_url);
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
        });
        debug!(model = %self.model, messages = messages.len(), "Chat completion request");

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!(model = %self.model, "Chat completion rate limited");
            return Err(AppError::QuotaExceeded);
        }
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(AppError::Model(format!(
                "HTTP {} - {}",
                status.as_u16(),
                truncate(&text, 200)
            )));
        }

        let parsed: Value = serde_json::from_str(&text)?;
        let choice = parsed["choices"]
            .as_array()
            .and_then(|c| c.first())
            .ok_or_else(|| AppError::Model("no choices in response".to_string()))?;
        Ok(choice["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string())
    }
}
