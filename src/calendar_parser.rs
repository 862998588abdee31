use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::{
    error::{SessionError, SessionResult},
    text_manipulators::{child_elements, extract_text, normalize_whitespace},
};

static CALENDAR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("#ctl00_MainContent_Calendar").unwrap());
static MONTH_TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td[align=center]").unwrap());
static MONTH_YEAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(.+) (\d{4})$").unwrap());
static POSTBACK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^javascript:__doPostBack\('([^']*)','([^']*)'\)$").unwrap()
});

const MONTHS: [&str; 12] = [
    "январь",
    "февраль",
    "март",
    "апрель",
    "май",
    "июнь",
    "июль",
    "август",
    "сентябрь",
    "октябрь",
    "ноябрь",
    "декабрь",
];

/// One in-month day of the calendar widget.
///
/// `event_target`/`event_argument` only make sense together with the page
/// state of the page this day was parsed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub disabled: bool,
    pub selected: bool,
    pub event_target: String,
    pub event_argument: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarInfo {
    month: u32,
    year: i32,
    days: Vec<CalendarDay>,
    selected: usize,
}

impl CalendarInfo {
    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn days(&self) -> &[CalendarDay] {
        &self.days
    }

    /// Days that are not disabled, in document order.
    pub fn available_days(&self) -> Vec<&CalendarDay> {
        self.days.iter().filter(|day| !day.disabled).collect()
    }

    pub fn selected_day(&self) -> &CalendarDay {
        &self.days[self.selected]
    }
}

pub fn parse_calendar(document: &Html) -> SessionResult<CalendarInfo> {
    let calendar = document
        .select(&CALENDAR)
        .next()
        .ok_or(SessionError::CalendarWidgetNotFound)?;

    let rows = table_rows(calendar);
    let header = rows
        .first()
        .ok_or_else(|| SessionError::CalendarHeaderFormat(String::new()))?;
    let (month, year) = month_and_year(*header)?;

    // Row 1 holds weekday names.
    let mut days = Vec::new();
    for row in rows.iter().skip(2) {
        for cell in child_elements(*row).filter(|cell| cell.value().name() == "td") {
            if let Some(day) = parse_day(cell, month, year)? {
                days.push(day);
            }
        }
    }

    let selected_indexes: Vec<usize> = days
        .iter()
        .enumerate()
        .filter(|(_, day)| day.selected)
        .map(|(index, _)| index)
        .collect();
    let [selected] = selected_indexes[..] else {
        return Err(SessionError::SelectedDayCount(selected_indexes.len()));
    };

    Ok(CalendarInfo {
        month,
        year,
        days,
        selected,
    })
}

/// Direct rows of a table, looking through an implicit `tbody`.
fn table_rows(table: ElementRef) -> Vec<ElementRef> {
    child_elements(table)
        .flat_map(|child| match child.value().name() {
            "tbody" | "thead" => child_elements(child).collect(),
            _ => vec![child],
        })
        .filter(|row| row.value().name() == "tr")
        .collect()
}

fn month_and_year(header: ElementRef) -> SessionResult<(u32, i32)> {
    let title = header
        .select(&MONTH_TITLE)
        .next()
        .map(|cell| normalize_whitespace(&extract_text(cell)))
        .unwrap_or_default();
    let caps = MONTH_YEAR
        .captures(&title)
        .ok_or_else(|| SessionError::CalendarHeaderFormat(title.clone()))?;

    let month_name = caps[1].to_lowercase();
    let month = MONTHS
        .iter()
        .position(|name| *name == month_name)
        .ok_or_else(|| SessionError::UnknownMonth(caps[1].to_string()))?;
    let year = caps[2]
        .parse()
        .map_err(|_| SessionError::CalendarHeaderFormat(title.clone()))?;

    Ok((month as u32 + 1, year))
}

/// `None` for cells of the neighbouring months.
fn parse_day(cell: ElementRef, month: u32, year: i32) -> SessionResult<Option<CalendarDay>> {
    let cell_text = normalize_whitespace(&extract_text(cell));
    let link = child_elements(cell)
        .find(|child| child.value().name() == "a")
        .ok_or_else(|| SessionError::UnexpectedPostbackFormat(cell_text.clone()))?;

    let style = link.value().attr("style").unwrap_or_default();
    if style.contains("Gray") {
        return Ok(None);
    }

    let href = link.value().attr("href").unwrap_or_default();
    let caps = POSTBACK
        .captures(href)
        .ok_or_else(|| SessionError::UnexpectedPostbackFormat(href.to_string()))?;

    let date = cell_text
        .parse()
        .ok()
        .and_then(|day| NaiveDate::from_ymd_opt(year, month, day))
        .ok_or_else(|| SessionError::UnexpectedPage(format!("calendar day cell '{cell_text}'")))?;

    Ok(Some(CalendarDay {
        date,
        disabled: cell.value().attr("disabled") == Some("disabled"),
        selected: style.contains("White"),
        event_target: caps[1].to_string(),
        event_argument: caps[2].to_string(),
    }))
}
