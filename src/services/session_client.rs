use crate::config::AppConfig;
use crate::models::{AppError, AppResult, SessionContext};
use crate::services::markup::extract_input_value;
use chrono::NaiveDate;
use reqwest::header::{COOKIE, SET_COOKIE};
use reqwest::{Client, Response};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Drives the per-cycle conversation with the reservation site: landing page,
/// category selection, then one calendar request per plan and month.
pub struct SessionClient {
    client: Client,
    config: Arc<AppConfig>,
}

/// Response body after cookies have been folded into the session.
struct Page {
    status: u16,
    body: String,
}

impl SessionClient {
    pub fn new(config: Arc<AppConfig>) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client, config })
    }

    /// GETs the calendar page and starts a session from its cookies and hidden token fields.
    /// Returns the session together with the landing HTML.
    pub async fn open_session(&self) -> AppResult<(SessionContext, String)> {
        let url = &self.config.calendar_url;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::transport(url, e))?;

        let mut session = SessionContext::default();
        let page = self.read_page("landing page", url, response, &mut session).await?;
        if !(200..300).contains(&page.status) {
            return Err(AppError::UpstreamStatus {
                context: format!("landing page {}", url),
                status: page.status,
            });
        }

        session.refresh_tokens(
            extract_input_value(&page.body, "_csrfToken"),
            extract_input_value(&page.body, "_Token[fields]"),
            extract_input_value(&page.body, "_Token[unlocked]"),
        );
        debug!(cookie_len = session.cookie.len(), "opened upstream session");
        Ok((session, page.body))
    }

    /// Submits the empty-category search, trying the ajax endpoint and then the page endpoint.
    /// Only a non-2xx answer moves on to the next endpoint.
    pub async fn select_category(&self, session: &mut SessionContext, event_id: &str) -> AppResult<String> {
        let mut form = vec![
            ("_method", "POST".to_string()),
            ("_csrfToken", session.csrf_token.clone()),
            ("event", event_id.to_string()),
            ("category", String::new()),
            ("search", "exec".to_string()),
        ];
        if !session.token_fields.is_empty() {
            form.push(("_Token[fields]", session.token_fields.clone()));
            form.push(("_Token[unlocked]", session.token_unlocked.clone()));
        }

        let mut candidates = vec![self.config.ajax_url.as_str()];
        if self.config.calendar_url != self.config.ajax_url {
            candidates.push(self.config.calendar_url.as_str());
        }

        let mut last_error = None;
        for url in candidates {
            let page = self.post_form("category selection", url, session, &form).await?;
            if (200..300).contains(&page.status) {
                return Ok(unwrap_html(&page.body));
            }
            warn!(url, status = page.status, "category selection rejected");
            last_error = Some(AppError::UpstreamStatus {
                context: format!("category selection at {}", url),
                status: page.status,
            });
        }

        Err(last_error.unwrap_or_else(|| AppError::Discovery("no category endpoint configured".to_string())))
    }

    /// Requests the month view around `date`. `plan_id = None` leaves the plan field out,
    /// which the site answers with the unfiltered plan list.
    pub async fn fetch_calendar(
        &self,
        session: &mut SessionContext,
        event_id: &str,
        plan_id: Option<u32>,
        date: NaiveDate,
    ) -> AppResult<String> {
        let mut form = vec![
            ("_method", "POST".to_string()),
            ("_csrfToken", session.csrf_token.clone()),
            ("event", event_id.to_string()),
        ];
        if let Some(plan_id) = plan_id {
            form.push(("plan", plan_id.to_string()));
        }
        form.push(("date", date.format("%Y/%m/%d").to_string()));
        form.push(("disp_type", "month".to_string()));
        form.push(("_Token[fields]", session.token_fields.clone()));
        form.push(("_Token[unlocked]", session.token_unlocked.clone()));

        let url = self.config.ajax_url.clone();
        let plan = plan_id.map_or_else(|| "<none>".to_string(), |id| id.to_string());
        let label = format!("calendar plan={} date={}", plan, date);
        let page = self.post_form(&label, &url, session, &form).await?;
        if !(200..300).contains(&page.status) {
            return Err(AppError::UpstreamStatus {
                context: format!("calendar of plan {}", plan),
                status: page.status,
            });
        }
        Ok(unwrap_html(&page.body))
    }

    async fn post_form(
        &self,
        label: &str,
        url: &str,
        session: &mut SessionContext,
        form: &[(&str, String)],
    ) -> AppResult<Page> {
        let mut request = self.client.post(url).form(form);
        if !session.cookie.is_empty() {
            request = request.header(COOKIE, session.cookie.as_str());
        }
        if !session.csrf_token.is_empty() {
            request = request.header("X-CSRF-Token", session.csrf_token.as_str());
        }
        if url == self.config.ajax_url {
            request = request.header("X-Requested-With", "XMLHttpRequest");
        }

        let response = request.send().await.map_err(|e| AppError::transport(url, e))?;
        self.read_page(label, url, response, session).await
    }

    /// Status and body of `response`. Cookies are only taken from 2xx answers; the body
    /// preview is logged whatever the status.
    async fn read_page(
        &self,
        label: &str,
        url: &str,
        response: Response,
        session: &mut SessionContext,
    ) -> AppResult<Page> {
        let status = response.status().as_u16();
        if (200..300).contains(&status) {
            let issued: Vec<String> = response
                .headers()
                .get_all(SET_COOKIE)
                .iter()
                .filter_map(|value| value.to_str().ok().map(str::to_string))
                .collect();
            session.absorb_set_cookies(issued);
        }
        let body = response.text().await.map_err(|e| AppError::transport(url, e))?;
        self.log_preview(label, status, &body);
        Ok(Page { status, body })
    }

    fn log_preview(&self, label: &str, status: u16, body: &str) {
        if !self.config.debug_responses {
            return;
        }
        let preview: String = body.chars().take(self.config.debug_preview_chars).collect();
        let truncated = if preview.len() < body.len() { "…" } else { "" };
        info!(status, len = body.len(), "{} response: {}{}", label, preview, truncated);
    }
}

/// Returns the `html` member of a `{"html": "..."}` envelope, or the body unchanged.
pub fn unwrap_html(body: &str) -> String {
    let trimmed = body.trim_start();
    if trimmed.starts_with('{') {
        if let Ok(serde_json::Value::Object(envelope)) = serde_json::from_str::<serde_json::Value>(trimmed) {
            if let Some(serde_json::Value::String(html)) = envelope.get("html") {
                return html.clone();
            }
        }
    }
    body.to_string()
}
