use crate::config::AppConfig;
use crate::models::{AppError, AppResult, Plan, Slot};
use crate::services::markup::{extract_input_value, parse_available_dates, parse_plans, parse_selected_value};
use crate::services::SessionClient;
use chrono::{Months, NaiveDate};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Walks every target plan across the configured month window and reports what is open now.
pub struct SlotDiscoveryService {
    client: SessionClient,
    config: Arc<AppConfig>,
}

impl SlotDiscoveryService {
    pub fn new(config: Arc<AppConfig>) -> AppResult<Self> {
        Ok(Self {
            client: SessionClient::new(config.clone())?,
            config,
        })
    }

    /// Currently available slots, unique by key, ordered by date then plan id.
    /// Requests are issued one at a time.
    pub async fn discover(&self, today: NaiveDate) -> AppResult<Vec<Slot>> {
        let (mut session, landing) = self.client.open_session().await?;
        let event_id = self.resolve_event_id(&landing)?;

        let category_html = self.client.select_category(&mut session, &event_id).await?;
        session.refresh_tokens(
            extract_input_value(&category_html, "_csrfToken"),
            extract_input_value(&category_html, "_Token[fields]"),
            extract_input_value(&category_html, "_Token[unlocked]"),
        );

        let mut catalog = parse_plans(&category_html);
        if self.config.plan_ids.is_empty() {
            let probe = self
                .client
                .fetch_calendar(&mut session, &event_id, None, today)
                .await?;
            let probed = parse_plans(&probe);
            if !probed.is_empty() {
                catalog = probed;
            }
        }
        debug!(plans = catalog.len(), "plan catalog parsed");

        let targets = resolve_target_plans(&self.config.plan_ids, &catalog);
        if targets.is_empty() {
            return Err(AppError::Discovery("no target plans found".to_string()));
        }

        let mut found = Vec::new();
        for plan in &targets {
            for offset in 0..self.config.months_ahead {
                let probe_date = add_months(today, offset);
                let html = self
                    .client
                    .fetch_calendar(&mut session, &event_id, Some(plan.id), probe_date)
                    .await?;
                let dates = parse_available_dates(&html, probe_date);
                debug!(plan = plan.id, month = %probe_date.format("%Y-%m"), open = dates.len(), "calendar parsed");
                found.extend(dates.into_iter().map(|date| Slot::new(plan, date)));
            }
        }

        let slots = normalize_slots(found);
        info!(plans = targets.len(), slots = slots.len(), "discovery finished");
        Ok(slots)
    }

    fn resolve_event_id(&self, landing: &str) -> AppResult<String> {
        if let Some(event_id) = &self.config.event_id {
            return Ok(event_id.clone());
        }
        let detected = parse_selected_value(landing, "event");
        if detected.is_empty() {
            return Err(AppError::Discovery(
                "EVENT_ID is not configured and the landing page has no selected event".to_string(),
            ));
        }
        debug!(event = %detected, "event id taken from landing page");
        Ok(detected)
    }
}

/// Plans to poll. An allow-list is intersected with the catalog; when nothing overlaps,
/// the allow-listed ids are used as-is with generic labels.
pub fn resolve_target_plans(allow_list: &[u32], catalog: &[Plan]) -> Vec<Plan> {
    if allow_list.is_empty() {
        return catalog.to_vec();
    }

    let matched: Vec<Plan> = catalog
        .iter()
        .filter(|plan| allow_list.contains(&plan.id))
        .cloned()
        .collect();
    if matched.is_empty() {
        warn!(?allow_list, "allow-listed plans missing from catalog, polling them by id");
        return allow_list.iter().map(|id| Plan::synthetic(*id)).collect();
    }

    let missing: Vec<u32> = allow_list
        .iter()
        .copied()
        .filter(|id| !matched.iter().any(|plan| plan.id == *id))
        .collect();
    if !missing.is_empty() {
        warn!(?missing, "allow-listed plans not offered right now");
    }
    matched
}

/// Same day-of-month `months` later, clamped to the end of shorter months.
pub fn add_months(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_add_months(Months::new(months)).unwrap_or(date)
}

/// Drops repeated keys (first wins) and orders by date, then plan id.
pub fn normalize_slots(slots: Vec<Slot>) -> Vec<Slot> {
    let mut keys = HashSet::new();
    let mut unique: Vec<Slot> = slots
        .into_iter()
        .filter(|slot| keys.insert(slot.key.clone()))
        .collect();
    unique.sort_by(|a, b| a.date.cmp(&b.date).then(a.plan_id.cmp(&b.plan_id)));
    unique
}
