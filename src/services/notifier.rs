use crate::config::{AppConfig, TelegramCredentials};
use crate::models::{AppError, AppResult, Slot};
use reqwest::Client;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Upper bound for one outbound message, in characters. Kept below Telegram's 4096.
pub const MESSAGE_CHUNK_LIMIT: usize = 3500;

/// Formats slot alerts and sends them to the bot endpoint, or logs them in dry-run mode.
pub struct NotificationDispatcher {
    client: Client,
    config: Arc<AppConfig>,
}

impl NotificationDispatcher {
    pub fn new(config: Arc<AppConfig>) -> AppResult<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { client, config })
    }

    pub async fn notify_slots(&self, slots: &[Slot], checked_at: &str) -> AppResult<()> {
        let message = format_slots_message(slots, checked_at, &self.config.calendar_url);
        self.send(&message).await
    }

    pub async fn notify_startup(&self) -> AppResult<()> {
        self.send(&format_startup_message(&self.config)).await
    }

    /// Sends `text` as one message per chunk, in order. Stops at the first failed chunk.
    pub async fn send(&self, text: &str) -> AppResult<()> {
        let chunks = chunk_message(text, MESSAGE_CHUNK_LIMIT);
        let credentials = match (&self.config.telegram, self.config.dry_run) {
            (Some(credentials), false) => credentials,
            _ => {
                for (index, chunk) in chunks.iter().enumerate() {
                    info!(chunk = index + 1, of = chunks.len(), "[dry-run] notification:\n{}", chunk);
                }
                return Ok(());
            }
        };

        for chunk in &chunks {
            self.deliver(credentials, chunk).await?;
        }
        info!(chunks = chunks.len(), "notification delivered");
        Ok(())
    }

    async fn deliver(&self, credentials: &TelegramCredentials, text: &str) -> AppResult<()> {
        let url = format!(
            "{}/bot{}/sendMessage",
            self.config.telegram_api_base, credentials.bot_token
        );
        let response = self
            .client
            .post(&url)
            .json(&json!({
                "chat_id": credentials.chat_id,
                "text": text,
                "disable_web_page_preview": true,
            }))
            .send()
            .await
            .map_err(|e| AppError::transport("bot sendMessage endpoint", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Delivery {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

pub fn format_slots_message(slots: &[Slot], checked_at: &str, source_url: &str) -> String {
    let mut lines = vec![format!("New reservation slots available ({})", slots.len())];
    for slot in slots {
        lines.push(String::new());
        lines.push(format!("Plan: {} (ID: {})", slot.plan_label, slot.plan_id));
        lines.push(format!("Date: {}", slot.date));
    }
    lines.push(String::new());
    lines.push(format!("Checked at: {}", checked_at));
    lines.push(source_url.to_string());
    lines.join("\n")
}

pub fn format_startup_message(config: &AppConfig) -> String {
    let plans = if config.plan_ids.is_empty() {
        "all listed plans".to_string()
    } else {
        config
            .plan_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    };
    [
        "Slot watcher started".to_string(),
        format!("Plans: {}", plans),
        format!("Months ahead: {}", config.months_ahead),
        format!("Poll interval: {}s", config.poll_interval.as_secs_f64()),
        config.calendar_url.clone(),
    ]
    .join("\n")
}

/// Splits on line boundaries so that every chunk has at most `limit` characters.
/// A single line longer than `limit` is cut into `limit`-sized pieces.
pub fn chunk_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    if text.chars().count() <= limit {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current: Option<(String, usize)> = None;

    for line in text.split('\n') {
        let line_len = line.chars().count();

        if line_len > limit {
            if let Some((chunk, _)) = current.take() {
                chunks.push(chunk);
            }
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(limit) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }

        let fits = matches!(&current, Some((_, len)) if *len + 1 + line_len <= limit);
        if fits {
            if let Some((chunk, len)) = current.as_mut() {
                chunk.push('\n');
                chunk.push_str(line);
                *len += 1 + line_len;
            }
        } else {
            if let Some((chunk, _)) = current.take() {
                chunks.push(chunk);
            }
            current = Some((line.to_string(), line_len));
        }
    }

    if let Some((chunk, _)) = current {
        chunks.push(chunk);
    }
    chunks
}
