use std::collections::VecDeque;

use chrono::{DateTime, SecondsFormat, Utc};

const CAPACITY: usize = 100;
// Telegram rejects messages over 4096 characters.
const SUMMARY_CHECKS_LIMIT: usize = 3900;

/// Outcomes of the most recent checks plus running counters.
#[derive(Debug, Default)]
pub struct CheckHistory {
    entries: VecDeque<String>,
    total: u64,
    successful: u64,
}

impl CheckHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, at: DateTime<Utc>, message: &str) {
        while self.entries.len() >= CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(format!(
            "Check at {}: {message}",
            at.to_rfc3339_opts(SecondsFormat::Secs, true)
        ));
    }

    pub fn record_success(&mut self) {
        self.successful += 1;
        self.total += 1;
    }

    pub fn record_failure(&mut self) {
        self.total += 1;
    }

    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn stats(&self) -> String {
        let rate = self.successful * 100 / self.total.max(1);
        format!(
            "Successful attempts: {}/{} ({rate}%)",
            self.successful, self.total
        )
    }

    /// Reply to `/log`: the newest checks that fit in one message, then stats.
    pub fn summary(&self) -> String {
        let checks = self
            .entries()
            .map(|entry| format!("* {entry}"))
            .collect::<Vec<_>>()
            .join("\n");
        let length = checks.chars().count();
        let checks: String = checks
            .chars()
            .skip(length.saturating_sub(SUMMARY_CHECKS_LIMIT))
            .collect();
        format!("Last checks:\n{checks}\n\n{}", self.stats())
    }
}
