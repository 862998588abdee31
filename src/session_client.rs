use std::sync::{Arc, LazyLock};

use log::{debug, info};
use regex::Regex;
use scraper::{Html, Selector};

use crate::{
    calendar_parser::parse_calendar,
    captcha_locator::{CaptchaLocator, LocatedCaptcha},
    captcha_solver::CaptchaSolver,
    config::SiteMarkers,
    error::{SessionError, SessionResult},
    form::{
        CALENDAR_DAY, FormValues, LOGIN, ORDER_STATUS, ORDER_STATUS_CONFIRM, PASSPORT_TYPE,
        QUEUE_REQUEST,
    },
    model::{Order, OrderRoute, SessionInfo, UserInfo},
    page_state::{PageState, extract_page_state},
    requests::{SiteRequest, SiteResponse, Transport},
    slot_parser::{Slot, parse_slots},
    text_manipulators::{contains_own_text, find_own_text, own_text_nodes},
};

pub const LOGIN_PATH: &str = "/queue/visitor.aspx";
pub const ORDER_LIST_PATH: &str = "/queue/Rlist.aspx";
pub const PASSPORT_TYPE_PATH: &str = "/queue/bpssp.aspx";
pub const ORDER_INFO_PATH: &str = "/queue/orderinfo.aspx";
pub const CALENDAR_PATH: &str = "/queue/SPCalendar.aspx";

static ERROR_LABEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("#ctl00_MainContent_lblCodeErr").unwrap());
static LOGIN_EMAIL_FIELD: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("#ctl00_MainContent_txtEmail").unwrap());
static CALENDAR_WIDGET: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("#ctl00_MainContent_Calendar").unwrap());
static ORDER_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Номер заявки - (\d+)").unwrap());
static ORDER_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Защитный код - (\w+)").unwrap());

/// What the site answered to a submitted login or order-status form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Menu,
    WrongCaptcha,
    DataError(String),
    MenuMissing,
}

/// What a GET of the calendar page landed on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalendarPage {
    LoginForm,
    Blocked,
    NoCalendar,
    NoFreeTime,
    Calendar,
}

/// Walks the site's postback workflow. Every method is one leg of it and
/// carries the session cookie and the freshest page state along.
pub struct SessionClient {
    transport: Arc<dyn Transport>,
    captcha_locator: CaptchaLocator,
    captcha_solver: CaptchaSolver,
    markers: SiteMarkers,
}

impl SessionClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        captcha_locator: CaptchaLocator,
        captcha_solver: CaptchaSolver,
        markers: SiteMarkers,
    ) -> Self {
        Self {
            transport,
            captcha_locator,
            captcha_solver,
            markers,
        }
    }

    /// Logs in with `user`, solving the login captcha on the way.
    pub async fn start_session(&self, base_url: &str, user: UserInfo) -> SessionResult<SessionInfo> {
        let login_url = format!("{base_url}{LOGIN_PATH}");
        let page = self.fetch(SiteRequest::get(&login_url)).await?.text();
        let state = PageState::from_html(&page);
        let LocatedCaptcha { session_id, image } =
            self.captcha_locator.locate(base_url, &page).await?;
        let code = self.captcha_solver.solve(&image).await?;

        info!(
            "Submitting login form for {} {} with captcha {code} and session {session_id}",
            user.first_name, user.last_name
        );
        let form = FormValues::with_state(&state)
            .user(&user)
            .captcha_code(&code)
            .render(&LOGIN)?;
        let response = self
            .fetch(SiteRequest::post(&login_url, form).with_session(&session_id))
            .await?;

        match inspect_login_response(&response.text(), &self.markers) {
            LoginOutcome::Menu => Ok(SessionInfo {
                session_id,
                base_url: base_url.to_string(),
                user,
            }),
            LoginOutcome::WrongCaptcha => Err(SessionError::WrongCaptcha { code, image }),
            LoginOutcome::DataError(text) => Err(SessionError::DataValidation(text)),
            LoginOutcome::MenuMissing => Err(SessionError::MenuNotFound),
        }
    }

    /// Chooses the order type and returns the path the site redirects to.
    pub async fn pass_to_order_page(
        &self,
        session: &SessionInfo,
        route: OrderRoute,
    ) -> SessionResult<String> {
        match route {
            OrderRoute::Queue { consulate_type } => {
                info!("Requesting a queue slot for {consulate_type}");
                let path = format!("{ORDER_LIST_PATH}?nm={consulate_type}");
                self.submit_queue_request(session, &path).await
            }
            OrderRoute::PassportTenYears { consulate_type } => {
                info!("Choosing the ten-year passport for {consulate_type}");
                let url = session.url(&format!("{PASSPORT_TYPE_PATH}?nm={consulate_type}"));
                let state = self.fetch_state(session, &url).await?;
                let choice = format!("{consulate_type};PSSP");
                let form = FormValues::with_state(&state)
                    .choice(&choice)
                    .render(&PASSPORT_TYPE)?;
                let response = self
                    .fetch(SiteRequest::post(&url, form).with_session(&session.session_id))
                    .await?;
                self.expect_redirect(&response, "choosing the passport type")?;

                self.submit_queue_request(session, ORDER_LIST_PATH).await
            }
        }
    }

    /// All slots currently offered on the calendar page.
    pub async fn check_slots(
        &self,
        session: &SessionInfo,
        calendar_path: &str,
    ) -> SessionResult<Vec<Slot>> {
        info!("Checking slots at {calendar_path} with session {}", session.session_id);
        let url = session.url(calendar_path);
        let response = self
            .fetch(SiteRequest::get(&url).with_session(&session.session_id))
            .await?;
        if response.is_redirect() {
            return Err(SessionError::SessionExpired(format!(
                "redirected to {}",
                response.location().unwrap_or_default()
            )));
        }

        let page = response.text();
        match classify_calendar_page(&page, &self.markers) {
            CalendarPage::LoginForm => Err(SessionError::SessionExpired(
                "landed on the login form".to_string(),
            )),
            CalendarPage::Blocked => Err(SessionError::AccountBlocked),
            CalendarPage::NoCalendar => Err(SessionError::UnexpectedPage(
                "calendar widget is not on the page".to_string(),
            )),
            CalendarPage::NoFreeTime => {
                info!("No free time at {calendar_path}");
                Ok(Vec::new())
            }
            CalendarPage::Calendar => {
                info!("Calendar has free time, collecting slots");
                self.collect_slots(session, &url, &page).await
            }
        }
    }

    /// Reads the waitlist order the site issued on `order_path`.
    pub async fn parse_order(&self, session: &SessionInfo, order_path: &str) -> SessionResult<Order> {
        info!("Reading the order at {order_path}");
        let page = self
            .fetch(SiteRequest::get(session.url(order_path)).with_session(&session.session_id))
            .await?
            .text();
        let order = find_order(&page, &self.markers)?;
        info!("Got order {}", order.order_number);
        Ok(order)
    }

    /// Opens a fresh session through the order-status lookup. Returns it with
    /// the calendar path the site redirects to.
    pub async fn start_checking_order(
        &self,
        base_url: &str,
        user: UserInfo,
        order: &Order,
    ) -> SessionResult<(SessionInfo, String)> {
        let url = format!("{base_url}{ORDER_INFO_PATH}");
        let page = self.fetch(SiteRequest::get(&url)).await?.text();
        let state = PageState::from_html(&page);
        let LocatedCaptcha { session_id, image } =
            self.captcha_locator.locate(base_url, &page).await?;
        let code = self.captcha_solver.solve(&image).await?;

        info!("Submitting order status form with captcha {code} and session {session_id}");
        let form = FormValues::with_state(&state)
            .order(order)
            .captcha_code(&code)
            .render(&ORDER_STATUS)?;
        let response = self
            .fetch(SiteRequest::post(&url, form).with_session(&session_id))
            .await?;
        if response.status != 200 {
            return Err(SessionError::UnexpectedResponse {
                status: response.status,
                step: "submitting the order status form",
            });
        }

        let page = response.text();
        let state = {
            let document = Html::parse_document(&page);
            if let Some(text) = error_label_text(&document) {
                if text.contains(&self.markers.wrong_captcha) {
                    return Err(SessionError::WrongCaptcha { code, image });
                }
                return Err(SessionError::DataValidation(text));
            }
            if contains_own_text(&document, &self.markers.order_unconfirmed) {
                return Err(SessionError::OrderNotConfirmed);
            }
            extract_page_state(&document)
        };

        debug!("Confirming the order status");
        let form = FormValues::with_state(&state).render(&ORDER_STATUS_CONFIRM)?;
        let response = self
            .fetch(SiteRequest::post(&url, form).with_session(&session_id))
            .await?;
        let calendar_path = match response.location() {
            Some(location) if response.is_redirect() => location.to_string(),
            _ => {
                return Err(SessionError::UnexpectedResponse {
                    status: response.status,
                    step: "confirming the order status",
                });
            }
        };
        info!("Calendar path: {calendar_path}");

        Ok((
            SessionInfo {
                session_id,
                base_url: base_url.to_string(),
                user,
            },
            calendar_path,
        ))
    }

    async fn fetch(&self, request: SiteRequest) -> SessionResult<SiteResponse> {
        self.transport.execute(request).await
    }

    async fn fetch_state(&self, session: &SessionInfo, url: &str) -> SessionResult<PageState> {
        let page = self
            .fetch(SiteRequest::get(url).with_session(&session.session_id))
            .await?
            .text();
        Ok(PageState::from_html(&page))
    }

    async fn submit_queue_request(&self, session: &SessionInfo, path: &str) -> SessionResult<String> {
        let url = session.url(path);
        let state = self.fetch_state(session, &url).await?;
        let form = FormValues::with_state(&state).render(&QUEUE_REQUEST)?;
        let response = self
            .fetch(SiteRequest::post(&url, form).with_session(&session.session_id))
            .await?;
        let location = self.expect_redirect(&response, "submitting the queue request")?;
        info!("Order path: {location}");
        Ok(location)
    }

    fn expect_redirect(&self, response: &SiteResponse, step: &'static str) -> SessionResult<String> {
        if let (true, Some(location)) = (response.is_redirect(), response.location()) {
            return Ok(location.to_string());
        }
        let document = Html::parse_document(&response.text());
        if contains_own_text(&document, &self.markers.too_many_requests) {
            return Err(SessionError::TooManyRequests);
        }
        Err(SessionError::UnexpectedResponse {
            status: response.status,
            step,
        })
    }

    async fn collect_slots(
        &self,
        session: &SessionInfo,
        url: &str,
        page: &str,
    ) -> SessionResult<Vec<Slot>> {
        let (calendar, mut state, mut slots) = {
            let document = Html::parse_document(page);
            (
                parse_calendar(&document)?,
                extract_page_state(&document),
                parse_slots(&document)?,
            )
        };
        let selected = calendar.selected_day();
        info!(
            "Calendar {:02}.{}: {} available days, {} slots on selected {}",
            calendar.month(),
            calendar.year(),
            calendar.available_days().len(),
            slots.len(),
            selected.date
        );

        for day in calendar.available_days() {
            if day.date == selected.date {
                continue;
            }
            debug!("Requesting slots for {}", day.date);
            let form = FormValues::with_state(&state)
                .postback(&day.event_target, &day.event_argument)
                .render(&CALENDAR_DAY)?;
            let response = self
                .fetch(SiteRequest::post(url, form).with_session(&session.session_id))
                .await?;
            if response.is_redirect() {
                return Err(SessionError::SessionExpired(format!(
                    "redirected while requesting {}",
                    day.date
                )));
            }

            let page = response.text();
            let day_slots = {
                let document = Html::parse_document(&page);
                state = extract_page_state(&document);
                match classify_document(&document, &self.markers) {
                    CalendarPage::LoginForm => {
                        return Err(SessionError::SessionExpired(format!(
                            "landed on the login form while requesting {}",
                            day.date
                        )));
                    }
                    CalendarPage::Blocked => return Err(SessionError::AccountBlocked),
                    _ if contains_own_text(&document, &self.markers.no_free_time) => Vec::new(),
                    _ => parse_slots(&document)?,
                }
            };
            debug!("Found {} slots on {}", day_slots.len(), day.date);
            slots.extend(day_slots);
        }

        info!("Collected {} slots", slots.len());
        Ok(slots)
    }
}

fn error_label_text(document: &Html) -> Option<String> {
    let label = document.select(&ERROR_LABEL).next()?;
    let text = own_text_nodes(label)
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    (!text.is_empty()).then_some(text)
}

pub fn inspect_login_response(page: &str, markers: &SiteMarkers) -> LoginOutcome {
    let document = Html::parse_document(page);
    if let Some(text) = error_label_text(&document) {
        if text.contains(&markers.wrong_captcha) {
            return LoginOutcome::WrongCaptcha;
        }
        return LoginOutcome::DataError(text);
    }
    if contains_own_text(&document, &markers.menu) {
        LoginOutcome::Menu
    } else {
        LoginOutcome::MenuMissing
    }
}

pub fn classify_calendar_page(page: &str, markers: &SiteMarkers) -> CalendarPage {
    classify_document(&Html::parse_document(page), markers)
}

fn classify_document(document: &Html, markers: &SiteMarkers) -> CalendarPage {
    if document.select(&LOGIN_EMAIL_FIELD).next().is_some() {
        CalendarPage::LoginForm
    } else if contains_own_text(document, &markers.blocked) {
        CalendarPage::Blocked
    } else if document.select(&CALENDAR_WIDGET).next().is_none() {
        CalendarPage::NoCalendar
    } else if contains_own_text(document, &markers.no_free_time) {
        CalendarPage::NoFreeTime
    } else {
        CalendarPage::Calendar
    }
}

pub fn find_order(page: &str, markers: &SiteMarkers) -> SessionResult<Order> {
    let document = Html::parse_document(page);
    let info = find_own_text(&document, &markers.waitlist_order).ok_or(SessionError::OrderNotFound)?;
    let lines = own_text_nodes(info);

    let capture = |regex: &Regex| {
        lines
            .iter()
            .find_map(|line| regex.captures(line))
            .map(|caps| caps[1].to_string())
    };
    match (capture(&ORDER_NUMBER), capture(&ORDER_CODE)) {
        (Some(order_number), Some(code)) => Ok(Order { order_number, code }),
        _ => Err(SessionError::OrderFormat(lines)),
    }
}
