use std::sync::LazyLock;

use log::debug;
use scraper::{Html, Selector};

static VIEW_STATE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("input#__VIEWSTATE").unwrap());
static EVENT_VALIDATION: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("input#__EVENTVALIDATION").unwrap());
static PREVIOUS_PAGE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("input#__PREVIOUSPAGE").unwrap());

/// Hidden WebForms fields that must be echoed back on the next postback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageState {
    pub event_validation: String,
    pub view_state: String,
    pub previous_page: String,
}

impl PageState {
    pub fn from_html(html: &str) -> Self {
        extract_page_state(&Html::parse_document(html))
    }
}

/// Absent inputs become empty strings.
pub fn extract_page_state(document: &Html) -> PageState {
    let state = PageState {
        event_validation: hidden_value(document, &EVENT_VALIDATION),
        view_state: hidden_value(document, &VIEW_STATE),
        previous_page: hidden_value(document, &PREVIOUS_PAGE),
    };
    debug!(
        "page state: viewstate {} chars, eventvalidation {} chars, previouspage '{}'",
        state.view_state.len(),
        state.event_validation.len(),
        state.previous_page
    );
    state
}

fn hidden_value(document: &Html, selector: &Selector) -> String {
    document
        .select(selector)
        .next()
        .and_then(|input| input.value().attr("value"))
        .unwrap_or_default()
        .to_string()
}
