use std::{fmt, sync::LazyLock};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use scraper::{Html, Selector};

use crate::{
    error::{SessionError, SessionResult},
    text_manipulators::{extract_text, normalize_whitespace},
};

static SLOT_PANEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("#ctl00_MainContent_RadioButtonList1").unwrap());
static LABEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("label").unwrap());
// e.g. "07.05.2024 9:00 (Окно 3)"
static SLOT_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{2}\.\d{2}\.\d{4}) (\d{1,2}:\d{2}) \((.*)\)$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Slot {
    pub date_time: NaiveDateTime,
    pub description: String,
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({})",
            self.date_time.format("%Y-%m-%d %H:%M"),
            self.description
        )
    }
}

/// Slots of the radio-button panel in document order.
pub fn parse_slots(document: &Html) -> SessionResult<Vec<Slot>> {
    let panel = document
        .select(&SLOT_PANEL)
        .next()
        .ok_or(SessionError::SlotPanelNotFound)?;

    panel
        .select(&LABEL)
        .map(|label| parse_label(&normalize_whitespace(&extract_text(label))))
        .collect()
}

fn parse_label(text: &str) -> SessionResult<Slot> {
    let format_error = || SessionError::SlotFormat(text.to_string());
    let caps = SLOT_LABEL.captures(text).ok_or_else(format_error)?;

    let date = NaiveDate::parse_from_str(&caps[1], "%d.%m.%Y").map_err(|_| format_error())?;
    let time = NaiveTime::parse_from_str(&caps[2], "%H:%M").map_err(|_| format_error())?;

    Ok(Slot {
        date_time: date.and_time(time),
        description: caps[3].to_string(),
    })
}
