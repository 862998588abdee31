use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use log::{error, info};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::{
    availability::{AvailabilityEngine, SessionCache},
    error::SessionResult,
    history::CheckHistory,
    model::Website,
    notifier::Outbox,
    slot_parser::Slot,
};

const NOTIFIED_SLOTS_LIMIT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckIntervals {
    pub day: Duration,
    pub night: Duration,
}

impl CheckIntervals {
    /// Pause before the next check, depending on the site's local time.
    pub fn pause_at(&self, website: &Website, now: DateTime<Utc>) -> Duration {
        if website.is_night_time(now) {
            self.night
        } else {
            self.day
        }
    }
}

/// The one lane that checks a site. It owns the engine and the session
/// cache, so checks of the site never overlap.
pub struct CheckLane {
    website: Website,
    engine: AvailabilityEngine,
    cache: SessionCache,
    intervals: CheckIntervals,
    history: Arc<Mutex<CheckHistory>>,
    outbox: Outbox,
    chat_ids: Vec<i64>,
}

impl CheckLane {
    pub fn new(
        website: Website,
        engine: AvailabilityEngine,
        intervals: CheckIntervals,
        history: Arc<Mutex<CheckHistory>>,
        outbox: Outbox,
        chat_ids: Vec<i64>,
    ) -> Self {
        Self {
            website,
            engine,
            cache: SessionCache::default(),
            intervals,
            history,
            outbox,
            chat_ids,
        }
    }

    /// Checks, sleeps, repeats. Cancelling drops the in-flight check.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("Check lane for {} started", self.website.name);
        loop {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => break,
                outcome = self.engine.check_availability(&self.website, &mut self.cache) => outcome,
            };
            self.record(outcome, Utc::now()).await;

            let pause = self.intervals.pause_at(&self.website, Utc::now());
            info!("Next check of {} in {}s", self.website.name, pause.as_secs());
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }
        info!("Check lane for {} stopped", self.website.name);
    }

    async fn record(&self, outcome: SessionResult<Vec<Slot>>, at: DateTime<Utc>) {
        let mut history = self.history.lock().await;
        match outcome {
            Ok(slots) => {
                info!("Found {} available slots for {}", slots.len(), self.website.name);
                history.push(at, &format!("Found {} slots", slots.len()));
                history.record_success();
                if !slots.is_empty() {
                    let text = slots_message(&self.website, &slots);
                    for chat_id in &self.chat_ids {
                        self.outbox.post(*chat_id, text.clone());
                    }
                }
            }
            Err(err) => {
                error!("Check of {} failed: {err}", self.website.name);
                history.push(at, &err.to_string());
                history.record_failure();
            }
        }
    }
}

pub fn slots_message(website: &Website, slots: &[Slot]) -> String {
    let mut lines = vec![format!(
        "Found {} available slots on {}/ !!!",
        slots.len(),
        website.base_url
    )];
    lines.extend(
        slots
            .iter()
            .take(NOTIFIED_SLOTS_LIMIT)
            .map(|slot| format!("* {slot}")),
    );
    if slots.len() > NOTIFIED_SLOTS_LIMIT {
        lines.push(format!("... and {} more", slots.len() - NOTIFIED_SLOTS_LIMIT));
    }
    lines.join("\n")
}
