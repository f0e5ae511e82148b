use crate::config::AppConfig;
use crate::models::{AppResult, Slot, WatcherState};
use crate::services::{NotificationDispatcher, SlotDiscoveryService, StateStore};
use chrono::{Local, NaiveDate, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleOutcome {
    pub available: usize,
    pub notified: Vec<Slot>,
}

/// Runs discovery on a fixed cadence and alerts once per newly seen slot.
/// Cycles never overlap: the next sleep starts only after the previous cycle finished.
pub struct SlotWatcher {
    config: Arc<AppConfig>,
    discovery: SlotDiscoveryService,
    dispatcher: NotificationDispatcher,
    store: StateStore,
    state: WatcherState,
}

impl SlotWatcher {
    pub fn new(config: Arc<AppConfig>) -> AppResult<Self> {
        let store = StateStore::new(config.state_file.clone());
        let state = store.load();
        info!(path = %store.path().display(), seen = state.len(), "watcher state loaded");
        Ok(Self {
            discovery: SlotDiscoveryService::new(config.clone())?,
            dispatcher: NotificationDispatcher::new(config.clone())?,
            store,
            state,
            config,
        })
    }

    pub fn state(&self) -> &WatcherState {
        &self.state
    }

    /// Sends the startup notice. Failures are logged and never stop the watcher.
    pub async fn startup_probe(&self) {
        match self.dispatcher.notify_startup().await {
            Ok(()) => info!("startup notice sent"),
            Err(e) => error!(error = %e, "startup notice failed"),
        }
    }

    pub async fn run_cycle(&mut self) -> AppResult<CycleOutcome> {
        self.run_cycle_on(Local::now().date_naive()).await
    }

    /// One poll: discover, keep unseen slots (marking them seen), notify, then persist.
    /// Slots are marked before delivery, so a failed delivery is not retried.
    pub async fn run_cycle_on(&mut self, today: NaiveDate) -> AppResult<CycleOutcome> {
        let available = self.discovery.discover(today).await?;
        let fresh = self.state.take_new(&available, Utc::now());

        if !fresh.is_empty() {
            let checked_at = Local::now().format("%Y-%m-%d %H:%M:%S %:z").to_string();
            self.dispatcher.notify_slots(&fresh, &checked_at).await?;
            self.store.save(&self.state)?;
        }

        Ok(CycleOutcome {
            available: available.len(),
            notified: fresh,
        })
    }

    /// Polls until `shutdown` flips to `true` or its sender goes away.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        if self.config.startup_notice {
            self.startup_probe().await;
        }

        loop {
            if *shutdown.borrow() {
                break;
            }

            let span = info_span!("cycle", id = %Uuid::new_v4());
            match self.run_cycle().instrument(span).await {
                Ok(outcome) => info!(
                    available = outcome.available,
                    new = outcome.notified.len(),
                    "cycle finished"
                ),
                Err(e) => error!(error = %e, "cycle failed"),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = shutdown.changed() => break,
            }
        }
        info!("watcher stopped");
    }
}
