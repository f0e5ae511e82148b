use crate::models::{AppError, AppResult};
use crate::utils::validation::{parse_plan_ids, validate_positive, validate_url};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 45_000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 20_000;
pub const DEFAULT_MONTHS_AHEAD: u32 = 1;
pub const DEFAULT_DEBUG_PREVIEW_CHARS: usize = 500;
pub const DEFAULT_STATE_FILE: &str = "slot-watcher-state.json";
pub const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Settings as they arrive from the file/environment layers, before validation.
#[derive(Debug, Default, Deserialize)]
struct RawSettings {
    calendar_url: Option<String>,
    ajax_url: Option<String>,
    event_id: Option<String>,
    telegram_bot_token: Option<String>,
    telegram_chat_id: Option<String>,
    telegram_api_base: Option<String>,
    poll_interval_ms: Option<u64>,
    request_timeout_ms: Option<u64>,
    months_ahead: Option<u32>,
    plan_ids: Option<String>,
    dry_run: Option<bool>,
    startup_notice: Option<bool>,
    debug_responses: Option<bool>,
    debug_preview_chars: Option<usize>,
    state_file: Option<String>,
    user_agent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelegramCredentials {
    pub bot_token: String,
    pub chat_id: String,
}

/// Immutable runtime configuration, built once at startup and passed by reference.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub calendar_url: String,
    pub ajax_url: String,
    /// `None` means detect it from the landing page.
    pub event_id: Option<String>,
    pub telegram: Option<TelegramCredentials>,
    pub telegram_api_base: String,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub months_ahead: u32,
    /// Empty means every plan the site lists.
    pub plan_ids: Vec<u32>,
    pub dry_run: bool,
    pub startup_notice: bool,
    pub debug_responses: bool,
    pub debug_preview_chars: usize,
    pub state_file: PathBuf,
    pub user_agent: String,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl AppConfig {
    /// Reads `slot-watcher.{toml,json,yaml}` if present, then the process environment.
    pub fn load() -> AppResult<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("slot-watcher").required(false))
            .add_source(config::Environment::default())
            .build()
            .map_err(|e| AppError::Config(e.to_string()))?;
        Self::from_settings(&settings)
    }

    pub fn from_settings(settings: &config::Config) -> AppResult<Self> {
        let raw: RawSettings = settings
            .clone()
            .try_deserialize()
            .map_err(|e| AppError::Config(e.to_string()))?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawSettings) -> AppResult<Self> {
        let calendar_url = non_empty(raw.calendar_url)
            .ok_or_else(|| AppError::Config("CALENDAR_URL is required".to_string()))?;
        validate_url(&calendar_url)?;

        let ajax_url = non_empty(raw.ajax_url).unwrap_or_else(|| calendar_url.clone());
        validate_url(&ajax_url)?;

        let telegram_api_base = non_empty(raw.telegram_api_base)
            .unwrap_or_else(|| DEFAULT_TELEGRAM_API_BASE.to_string());
        validate_url(&telegram_api_base)?;

        let poll_interval_ms = raw.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS);
        validate_positive("POLL_INTERVAL_MS", poll_interval_ms)?;
        let request_timeout_ms = raw.request_timeout_ms.unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS);
        validate_positive("REQUEST_TIMEOUT_MS", request_timeout_ms)?;
        let months_ahead = raw.months_ahead.unwrap_or(DEFAULT_MONTHS_AHEAD);
        validate_positive("MONTHS_AHEAD", u64::from(months_ahead))?;

        let plan_ids = match raw.plan_ids {
            Some(list) => parse_plan_ids(&list)?,
            None => Vec::new(),
        };

        let dry_run = raw.dry_run.unwrap_or(false);
        let telegram = match (non_empty(raw.telegram_bot_token), non_empty(raw.telegram_chat_id)) {
            (Some(bot_token), Some(chat_id)) => Some(TelegramCredentials { bot_token, chat_id }),
            _ => None,
        };
        if !dry_run && telegram.is_none() {
            return Err(AppError::Config(
                "TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID are required unless DRY_RUN is set".to_string(),
            ));
        }

        Ok(Self {
            calendar_url,
            ajax_url,
            event_id: non_empty(raw.event_id),
            telegram,
            telegram_api_base: telegram_api_base.trim_end_matches('/').to_string(),
            poll_interval: Duration::from_millis(poll_interval_ms),
            request_timeout: Duration::from_millis(request_timeout_ms),
            months_ahead,
            plan_ids,
            dry_run,
            startup_notice: raw.startup_notice.unwrap_or(true),
            debug_responses: raw.debug_responses.unwrap_or(false),
            debug_preview_chars: raw.debug_preview_chars.unwrap_or(DEFAULT_DEBUG_PREVIEW_CHARS),
            state_file: PathBuf::from(
                non_empty(raw.state_file).unwrap_or_else(|| DEFAULT_STATE_FILE.to_string()),
            ),
            user_agent: non_empty(raw.user_agent).unwrap_or_else(|| {
                format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
            }),
        })
    }

    /// Minimal dry-run configuration pointed at `calendar_url`, for tests and local runs.
    pub fn dry_run_for(calendar_url: &str, ajax_url: &str) -> Self {
        Self {
            calendar_url: calendar_url.to_string(),
            ajax_url: ajax_url.to_string(),
            event_id: None,
            telegram: None,
            telegram_api_base: DEFAULT_TELEGRAM_API_BASE.to_string(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            months_ahead: DEFAULT_MONTHS_AHEAD,
            plan_ids: Vec::new(),
            dry_run: true,
            startup_notice: true,
            debug_responses: false,
            debug_preview_chars: DEFAULT_DEBUG_PREVIEW_CHARS,
            state_file: PathBuf::from(DEFAULT_STATE_FILE),
            user_agent: format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        }
    }
}
